//! Planar containment and rim projection.
//!
//! Zones are vertical cylinders: containment only looks at the horizontal
//! (x, z) plane and ignores height (y).

use serde::{Deserialize, Serialize};

/// Position in metres, y up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance to `other` in the horizontal plane.
    pub fn planar_distance(&self, other: Vec3) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn lerp(&self, other: Vec3, t: f32) -> Vec3 {
        Vec3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }
}

/// True when `point` lies inside the infinite vertical cylinder of `radius`
/// around `center`. The boundary counts as inside.
pub fn in_cylinder(point: Vec3, center: Vec3, radius: f32) -> bool {
    let dx = point.x - center.x;
    let dz = point.z - center.z;
    dx * dx + dz * dz <= radius * radius
}

/// Projects `point` radially onto the rim of the circle of `radius` around
/// `center`, keeping the point's height.
///
/// A point sitting on the axis has no direction; it maps to the rim on +x.
pub fn project_to_rim(point: Vec3, center: Vec3, radius: f32) -> Vec3 {
    let dx = point.x - center.x;
    let dz = point.z - center.z;
    let dist = (dx * dx + dz * dz).sqrt();
    if dist < 1e-6 {
        return Vec3::new(center.x + radius, point.y, center.z);
    }
    let scale = radius / dist;
    Vec3::new(center.x + dx * scale, point.y, center.z + dz * scale)
}
