use nalgebra::{Isometry3, Vector3};
use serde::Serialize;

/// Positional plausibility region for any pose estimate.
///
/// Derived at startup from the grid extent and the configured height band;
/// a pose whose position leaves this box is treated as tracking loss, not
/// as a usable estimate.
#[derive(Clone, Copy, Debug)]
pub struct PoseBounds {
    pub min_height: f64,
    pub max_height: f64,
    pub max_abs_x: f64,
    pub max_abs_y: f64,
}

impl PoseBounds {
    pub fn allows(&self, pose: &Isometry3<f64>) -> bool {
        let t = pose.translation.vector;
        t.z >= self.min_height
            && t.z <= self.max_height
            && t.x.abs() <= self.max_abs_x
            && t.y.abs() <= self.max_abs_y
    }
}

/// Seconds. Frame and realignment stamps share one monotonic clock.
pub type Timestamp = f64;

/// Whether the fused pose is trustworthy enough to publish.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TrackingState {
    Tracking,
    Lost,
}

/// Timestamped world→body pose with the twist derived from consecutive
/// odometry updates. Produced once per frame while tracking.
#[derive(Clone, Debug, Serialize)]
pub struct FusedPoseEstimate {
    pub stamp: Timestamp,
    pub world_from_body: Isometry3<f64>,
    /// Body-frame linear velocity (m/s).
    pub linear_velocity: Vector3<f64>,
    /// Body-frame angular velocity (rad/s).
    pub angular_velocity: Vector3<f64>,
    /// Scalar uncertainty: latest odometry per-pixel error, floored to a
    /// small positive value so downstream covariance is never exactly zero.
    pub uncertainty: f64,
}
