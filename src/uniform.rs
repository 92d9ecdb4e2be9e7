//! Program uniforms.
//!
//! A program declares the uniforms it consumes. Declarations either carry a
//! fixed value from the level description or name one of the per-frame
//! values the renderer provides ([`BUILTIN_UNIFORMS`]).

use cgmath::{Matrix4, SquareMatrix, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;

pub const PROJECTION: &str = "projection";
pub const VIEW: &str = "view";
pub const MODEL: &str = "model";
pub const CAMERA_POSITION: &str = "camera_position";
pub const CAMERA_FRONT: &str = "camera_front";
pub const CAMERA_RIGHT: &str = "camera_right";
pub const CAMERA_UP: &str = "camera_up";
pub const DELTA_TIME: &str = "delta_time";
pub const TIME: &str = "time";
pub const LIGHT_POSITION: &str = "light_position";
pub const LIGHT_COLOR: &str = "light_color";

/// Names the renderer fills in every frame.
pub const BUILTIN_UNIFORMS: &[&str] = &[
    PROJECTION,
    VIEW,
    MODEL,
    CAMERA_POSITION,
    CAMERA_FRONT,
    CAMERA_RIGHT,
    CAMERA_UP,
    DELTA_TIME,
    TIME,
    LIGHT_POSITION,
    LIGHT_COLOR,
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_UNIFORMS.contains(&name)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column major.
    Mat4([[f32; 4]; 4]),
}

impl From<Matrix4<f32>> for UniformValue {
    fn from(m: Matrix4<f32>) -> Self {
        UniformValue::Mat4(m.into())
    }
}

impl From<Vector3<f32>> for UniformValue {
    fn from(v: Vector3<f32>) -> Self {
        UniformValue::Vec3(v.into())
    }
}

impl From<f32> for UniformValue {
    fn from(f: f32) -> Self {
        UniformValue::Float(f)
    }
}

/// One declared uniform. `value` is `None` for built-in names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<UniformValue>,
}

impl UniformDecl {
    pub fn builtin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
        }
    }
}

/// Values shared by every draw of a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameUniforms {
    pub projection: Matrix4<f32>,
    pub view: Matrix4<f32>,
    pub camera_position: Vector3<f32>,
    pub camera_front: Vector3<f32>,
    pub camera_right: Vector3<f32>,
    pub camera_up: Vector3<f32>,
    pub delta_time: f32,
    pub time: f32,
}

impl FrameUniforms {
    pub fn new(camera: &Camera, delta_time: f64, time: f64) -> Self {
        Self {
            projection: camera.projection(),
            view: camera.view(),
            camera_position: camera.position,
            camera_front: camera.front,
            camera_right: camera.right(),
            camera_up: camera.true_up(),
            delta_time: delta_time as f32,
            time: time as f32,
        }
    }
}

/// Resolved uniform values for a single draw, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformBlock {
    values: Vec<(String, UniformValue)>,
}

impl UniformBlock {
    /// Resolves `decls` against `frame` and the draw's model matrix.
    pub fn resolve(decls: &[UniformDecl], frame: &FrameUniforms, model: Matrix4<f32>) -> Self {
        let values = decls
            .iter()
            .filter_map(|decl| {
                let value = match &decl.value {
                    Some(value) => value.clone(),
                    None => match decl.name.as_str() {
                        PROJECTION => frame.projection.into(),
                        VIEW => frame.view.into(),
                        MODEL => model.into(),
                        CAMERA_POSITION => frame.camera_position.into(),
                        CAMERA_FRONT => frame.camera_front.into(),
                        CAMERA_RIGHT => frame.camera_right.into(),
                        CAMERA_UP => frame.camera_up.into(),
                        DELTA_TIME => frame.delta_time.into(),
                        TIME => frame.time.into(),
                        // Written by the light manager.
                        LIGHT_POSITION | LIGHT_COLOR => UniformValue::Vec3([0.0; 3]),
                        _ => return None,
                    },
                };
                Some((decl.name.clone(), value))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Overwrites `name` if the program declared it. Returns whether it did.
    pub fn replace(&mut self, name: &str, value: UniformValue) -> bool {
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            projection: Matrix4::identity(),
            view: Matrix4::identity(),
            camera_position: Vector3::new(0.0, 0.0, 0.0),
            camera_front: Vector3::new(0.0, 0.0, -1.0),
            camera_right: Vector3::new(1.0, 0.0, 0.0),
            camera_up: Vector3::new(0.0, 1.0, 0.0),
            delta_time: 0.0,
            time: 0.0,
        }
    }
}
