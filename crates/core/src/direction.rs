//! Turns a symbolic or angular direction into a concrete block target.
//!
//! Headings follow the avatar's yaw convention: a yaw of 0 faces +z and the
//! forward vector for yaw `θ` is `(-sin θ, cos θ)` on the (x, z) plane.

use crate::{
    pose::{Pose, Target},
    record::Rejection,
};
use std::str::FromStr;

/// Distance used when a move command does not carry a usable block count.
pub const DEFAULT_BLOCKS: f64 = 10.0;

/// World-aligned directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinal {
    North,
    South,
    East,
    West,
}

/// Directions measured from where the actor is currently facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relative {
    Forward,
    Back,
    Left,
    Right,
}

impl FromStr for Cardinal {
    type Err = Rejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "north" => Ok(Cardinal::North),
            "south" => Ok(Cardinal::South),
            "east" => Ok(Cardinal::East),
            "west" => Ok(Cardinal::West),
            _ => Err(Rejection::UnknownDirection),
        }
    }
}

impl FromStr for Relative {
    type Err = Rejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forward" => Ok(Relative::Forward),
            "back" => Ok(Relative::Back),
            "left" => Ok(Relative::Left),
            "right" => Ok(Relative::Right),
            _ => Err(Rejection::UnknownDirection),
        }
    }
}

/// A validated direction, ready to be applied to a pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Heading {
    /// Absolute yaw in degrees.
    Yaw(f64),
    Cardinal(Cardinal),
    Relative(Relative),
}

/// The direction fields of a move command as they arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectionSpec {
    /// The `direction` keyword, if it was a string.
    pub direction: Option<String>,
    /// The `yawDeg` angle, if it was a number. Takes precedence over `direction`.
    pub yaw_deg: Option<f64>,
}

impl DirectionSpec {
    pub fn keyword(direction: &str) -> Self {
        Self {
            direction: Some(direction.to_string()),
            yaw_deg: None,
        }
    }

    pub fn yaw(degrees: f64) -> Self {
        Self {
            direction: None,
            yaw_deg: Some(degrees),
        }
    }

    /// Validates the direction without needing a pose.
    pub fn heading(&self) -> Result<Heading, Rejection> {
        if let Some(degrees) = self.yaw_deg {
            return Ok(Heading::Yaw(degrees));
        }
        let word = self
            .direction
            .as_deref()
            .ok_or(Rejection::UnknownDirection)?;
        if let Ok(cardinal) = word.parse::<Cardinal>() {
            return Ok(Heading::Cardinal(cardinal));
        }
        word.parse::<Relative>().map(Heading::Relative)
    }
}

/// Forward unit vector for a yaw given in radians.
fn forward(yaw: f64) -> (f64, f64) {
    (-yaw.sin(), yaw.cos())
}

impl Heading {
    /// The raw (x, z) heading vector, before normalization.
    pub fn vector(&self, pose: &Pose) -> (f64, f64) {
        match *self {
            Heading::Yaw(degrees) => forward(degrees.to_radians()),
            Heading::Cardinal(Cardinal::North) => (0.0, -1.0),
            Heading::Cardinal(Cardinal::South) => (0.0, 1.0),
            Heading::Cardinal(Cardinal::East) => (1.0, 0.0),
            Heading::Cardinal(Cardinal::West) => (-1.0, 0.0),
            Heading::Relative(relative) => {
                let (fx, fz) = forward(pose.yaw);
                match relative {
                    Relative::Forward => (fx, fz),
                    Relative::Back => (-fx, -fz),
                    Relative::Left => (-fz, fx),
                    Relative::Right => (fz, -fx),
                }
            }
        }
    }

    /// Projects `blocks` along this heading from `pose` and snaps to the block grid.
    ///
    /// Fails when a coordinate does not fit the grid.
    pub fn target_from(&self, pose: &Pose, blocks: Option<f64>) -> Result<Target, Rejection> {
        let (vx, vz) = self.vector(pose);
        let len = vx.hypot(vz);
        let len = if len == 0.0 { 1.0 } else { len };
        let blocks = effective_blocks(blocks);

        Ok(Target {
            x: to_block(round_half_up(pose.x + vx / len * blocks))?,
            y: to_block(pose.y.floor())?,
            z: to_block(round_half_up(pose.z + vz / len * blocks))?,
        })
    }
}

/// The block count actually travelled: `blocks` when it is a finite positive number.
pub fn effective_blocks(blocks: Option<f64>) -> f64 {
    match blocks {
        Some(n) if n.is_finite() && n > 0.0 => n,
        _ => DEFAULT_BLOCKS,
    }
}

// Halves round toward +inf, so -2.5 becomes -2.
fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// Converts an already integral coordinate, refusing values `i32` cannot hold.
fn to_block(v: f64) -> Result<i32, Rejection> {
    if (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&v) {
        Ok(v as i32)
    } else {
        Err(Rejection::TargetOutOfRange)
    }
}

/// Resolves a requested direction against the current pose.
pub fn resolve(pose: &Pose, spec: &DirectionSpec, blocks: Option<f64>) -> Result<Target, Rejection> {
    spec.heading()?.target_from(pose, blocks)
}
