//! Scene graph transforms and traversal.
//!
//! Scene nodes are stored flat in the [`Level`] and linked by id. A node's
//! local transform is either a fixed matrix or a small closed set of
//! time-driven animations, so it can be written back to a level description
//! and compared in tests. World transforms are computed on demand by walking
//! up the parent chain; nothing is cached between frames.
//!
//! The parent/child graph is acyclic by construction (parents must exist
//! before their children are added). Traversal relies on that and does not
//! check for cycles.

use cgmath::{InnerSpace, Matrix4, Quaternion, Rad, Rotation3, SquareMatrix, Vector3, Zero};

use crate::{
    error::LevelError,
    level::{EntityId, Level, SceneNode},
};

/// Local transform of a scene node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeTransform {
    Fixed(Matrix4<f32>),
    /// `translation * rotation(axis, rate * t) * scale`, with `t` in seconds.
    Animated {
        translation: Vector3<f32>,
        rotation_axis: Vector3<f32>,
        /// Radians per second.
        rotation_rate: f32,
        scale: Vector3<f32>,
    },
}

impl NodeTransform {
    pub fn identity() -> Self {
        NodeTransform::Fixed(Matrix4::identity())
    }

    /// Local matrix at `elapsed` seconds. Pure: same input, same output.
    pub fn local(&self, elapsed: f64) -> Matrix4<f32> {
        match self {
            NodeTransform::Fixed(matrix) => *matrix,
            NodeTransform::Animated {
                translation,
                rotation_axis,
                rotation_rate,
                scale,
            } => {
                let rotation = if rotation_axis.is_zero() {
                    Quaternion::new(1.0, 0.0, 0.0, 0.0)
                } else {
                    let angle = Rad((*rotation_rate as f64 * elapsed) as f32);
                    Quaternion::from_axis_angle(rotation_axis.normalize(), angle)
                };
                Matrix4::from_translation(*translation)
                    * Matrix4::from(rotation)
                    * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z)
            }
        }
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// World transform of `id`: the product of local transforms from the root down.
pub fn world_transform(level: &Level, id: EntityId, elapsed: f64) -> Result<Matrix4<f32>, LevelError> {
    let mut world = Matrix4::identity();
    let mut current = id;
    while !current.is_null() {
        let node = level.scene_node(current)?;
        world = node.transform.local(elapsed) * world;
        current = node.parent;
    }
    Ok(world)
}

/// Depth-first, pre-order walk of the subtree under `root`.
///
/// `visitor` gets every node with its world transform, children in insertion
/// order. The walk stops at the first error.
pub fn visit(
    level: &Level,
    root: EntityId,
    elapsed: f64,
    visitor: &mut dyn FnMut(EntityId, &SceneNode, &Matrix4<f32>) -> Result<(), LevelError>,
) -> Result<(), LevelError> {
    let root_node = level.scene_node(root)?;
    let base = world_transform(level, root_node.parent, elapsed)?;
    visit_node(level, root, &base, elapsed, visitor)
}

fn visit_node(
    level: &Level,
    id: EntityId,
    parent_world: &Matrix4<f32>,
    elapsed: f64,
    visitor: &mut dyn FnMut(EntityId, &SceneNode, &Matrix4<f32>) -> Result<(), LevelError>,
) -> Result<(), LevelError> {
    let node = level.scene_node(id)?;
    let world = parent_world * node.transform.local(elapsed);
    visitor(id, node, &world)?;
    for &child in &node.children {
        visit_node(level, child, &world, elapsed, visitor)?;
    }
    Ok(())
}

/// Ids of the subtree under `root` in traversal order, `root` first.
pub fn subtree(level: &Level, root: EntityId) -> Result<Vec<EntityId>, LevelError> {
    let mut ids = Vec::new();
    visit(level, root, 0.0, &mut |id, _, _| {
        ids.push(id);
        Ok(())
    })?;
    Ok(ids)
}
