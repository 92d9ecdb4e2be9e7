//! Lights and the light manager.
//!
//! Lights live in the scene graph as node contents. Each frame the renderer
//! gathers them into a [`LightManager`], which writes one light per program
//! into the `light_position` / `light_color` uniforms.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Transform, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LevelError, RenderError},
    level::{EntityId, Level, NodeContent},
    scene_graph,
    uniform::{LIGHT_COLOR, LIGHT_POSITION, UniformBlock, UniformValue},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightKind {
    #[default]
    Point,
    /// `light_position` carries the direction the light shines in.
    Directional,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightDesc {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Default for LightDesc {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vector3<f32>,
    /// Color premultiplied by intensity.
    pub color: Vector3<f32>,
}

impl Light {
    pub fn from_desc(desc: &LightDesc, world: &Matrix4<f32>) -> Self {
        let position = match desc.kind {
            LightKind::Point => world.transform_point(Point3::origin()).to_vec(),
            LightKind::Directional => {
                let direction = world.transform_vector(Vector3::new(0.0, 0.0, -1.0));
                if direction.magnitude2() > 0.0 {
                    direction.normalize()
                } else {
                    direction
                }
            }
        };
        Self {
            kind: desc.kind,
            position,
            color: Vector3::from(desc.color) * desc.intensity,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LightManager {
    lights: Vec<Light>,
}

impl LightManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every light under the default root, in traversal order.
    pub fn from_level(level: &Level, elapsed: f64) -> Result<Self, LevelError> {
        let mut lights = Vec::new();
        scene_graph::visit(
            level,
            level.default_root_scene_node_id(),
            elapsed,
            &mut |_: EntityId, node, world| {
                if let NodeContent::Light(desc) = &node.content {
                    lights.push(Light::from_desc(desc, world));
                }
                Ok(())
            },
        )?;
        Ok(Self { lights })
    }

    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Writes light `slot` into the block's light uniforms.
    pub fn apply(&self, slot: usize, uniforms: &mut UniformBlock) -> Result<(), RenderError> {
        let light = self.lights.get(slot).ok_or(RenderError::LightSlot {
            slot,
            count: self.lights.len(),
        })?;
        uniforms.replace(LIGHT_POSITION, UniformValue::from(light.position));
        uniforms.replace(LIGHT_COLOR, UniformValue::from(light.color));
        Ok(())
    }
}
