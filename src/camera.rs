//! Cameras.
//!
//! Right handed, Y up, looking down -Z by default. Projection matrices use
//! the OpenGL clip-space convention; backends with a different depth range
//! convert on their side.

use cgmath::{Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Transform, Vector3};
use serde::{Deserialize, Serialize};

/// Camera parameters as declared on a scene node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDesc {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub front: [f32; 3],
    pub up: [f32; 3],
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            fov_degrees: 65.0,
            near: 0.1,
            far: 1000.0,
            front: [0.0, 0.0, -1.0],
            up: [0.0, 1.0, 0.0],
        }
    }
}

impl CameraDesc {
    /// Rejects parameters without a perspective projection: the field of
    /// view must lie in (0, 180) degrees, `0 < near < far`, and `front` and
    /// `up` must span a plane.
    pub fn validate(&self) -> Result<(), String> {
        check_frustum(self.fov_degrees, self.near, self.far)?;
        let front = Vector3::from(self.front);
        let up = Vector3::from(self.up);
        if !(front.magnitude2() > 0.0 && up.magnitude2() > 0.0) {
            return Err("front and up must be non-zero".to_string());
        }
        if !(front.normalize().cross(up.normalize()).magnitude2() > 1e-8) {
            return Err(format!("front {:?} is parallel to up {:?}", self.front, self.up));
        }
        Ok(())
    }
}

fn check_frustum(fov_degrees: f32, near: f32, far: f32) -> Result<(), String> {
    if !(fov_degrees > 0.0 && fov_degrees < 180.0) {
        return Err(format!("fov_degrees {} is outside (0, 180)", fov_degrees));
    }
    if !(near > 0.0) {
        return Err(format!("near {} must be positive", near));
    }
    if !(far > near && far.is_finite()) {
        return Err(format!("far {} must be finite and beyond near {}", far, near));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vector3<f32>,
    pub front: Vector3<f32>,
    pub up: Vector3<f32>,
    pub fov: Deg<f32>,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Places `desc` with the world transform of the node that carries it.
    pub fn from_desc(desc: &CameraDesc, world: &Matrix4<f32>, aspect: f32) -> Self {
        let position = world.transform_point(Point3::origin()).to_vec();
        let front = world.transform_vector(Vector3::from(desc.front)).normalize();
        let up = world.transform_vector(Vector3::from(desc.up)).normalize();
        Self {
            position,
            front,
            up,
            fov: Deg(desc.fov_degrees),
            aspect,
            near: desc.near,
            far: desc.far,
        }
    }

    pub fn right(&self) -> Vector3<f32> {
        self.front.cross(self.up).normalize()
    }

    /// Up vector re-orthogonalised against front and right.
    pub fn true_up(&self) -> Vector3<f32> {
        self.right().cross(self.front).normalize()
    }

    pub fn view(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(Point3::from_vec(self.position), self.front, self.up)
    }

    /// Same rules as [`CameraDesc::validate`], applied after placement.
    pub fn validate(&self) -> Result<(), String> {
        check_frustum(self.fov.0, self.near, self.far)?;
        if !(self.aspect > 0.0 && self.aspect.is_finite()) {
            return Err(format!("aspect {} must be positive", self.aspect));
        }
        let axes = [self.position, self.front, self.up];
        if axes.iter().any(|v| !(v.x.is_finite() && v.y.is_finite() && v.z.is_finite())) {
            return Err("the node transform collapses the camera axes".to_string());
        }
        if !(self.front.cross(self.up).magnitude2() > 1e-8) {
            return Err("front is parallel to up".to_string());
        }
        Ok(())
    }

    /// Panics unless [`Camera::validate`] passes.
    pub fn projection(&self) -> Matrix4<f32> {
        cgmath::perspective(self.fov, self.aspect, self.near, self.far)
    }

    pub fn set_aspect(&mut self, size: [u32; 2]) {
        self.aspect = size[0].max(1) as f32 / size[1].max(1) as f32;
    }
}

impl Default for Camera {
    fn default() -> Self {
        let desc = CameraDesc::default();
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            front: desc.front.into(),
            up: desc.up.into(),
            fov: Deg(desc.fov_degrees),
            aspect: 16.0 / 9.0,
            near: desc.near,
            far: desc.far,
        }
    }
}
