use serde::{Deserialize, Serialize};

/// The actor's position in the world plus its horizontal facing angle.
///
/// `yaw` is in radians, with 0 facing the +z axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
}

impl Pose {
    /// Creates a pose at the given coordinates.
    pub fn new(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self { x, y, z, yaw }
    }

    /// The pose an actor ends up with after arriving at `target`, keeping its heading.
    pub fn arrived_at(&self, target: Target) -> Self {
        Self {
            x: f64::from(target.x),
            y: f64::from(target.y),
            z: f64::from(target.z),
            yaw: self.yaw,
        }
    }
}

/// A resolved block coordinate handed to the navigation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Target {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}
