//! Pose/twist fusion and the Tracking/Lost state machine.
//!
//! The continuous odometry pose stream updates the fused estimate and
//! yields the twist by differencing consecutive stamped poses. Accepted
//! grid alignments and external realignment poses go through the manual
//! path instead: they replace the pose outright without feeding the twist,
//! so a discrete correction jump never shows up as a velocity spike.

use crate::types::{FusedPoseEstimate, Timestamp, TrackingState};
use log::{debug, warn};
use nalgebra::{Isometry3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FusionOptions {
    /// Odometry per-pixel error beyond which tracking is declared lost.
    pub max_odometry_error: f64,
    /// Seconds without an accepted alignment before tracking is lost.
    pub max_realignment_age: f64,
    /// Plausible height band for any pose estimate (metres).
    pub min_height: f64,
    pub max_height: f64,
    /// Horizontal slack beyond the grid half-extent (metres).
    pub bounds_margin: f64,
    /// Floor substituted when the reported error is exactly zero.
    pub uncertainty_floor: f64,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            max_odometry_error: 10.0,
            max_realignment_age: 3.0,
            min_height: 0.1,
            max_height: 10.0,
            bounds_margin: 0.5,
            uncertainty_floor: 1e-5,
        }
    }
}

/// Fused world→body pose plus derived twist and tracking state.
pub struct FusedState {
    tracking: TrackingState,
    pose: Option<(Isometry3<f64>, Timestamp)>,
    /// Body-frame (linear, angular) velocity from the last pose pair.
    twist: Option<(Vector3<f64>, Vector3<f64>)>,
}

impl FusedState {
    /// Start tracking optimistically from a provided initial guess.
    pub fn new(initial_world_from_body: Isometry3<f64>, stamp: Timestamp) -> Self {
        Self {
            tracking: TrackingState::Tracking,
            pose: Some((initial_world_from_body, stamp)),
            twist: None,
        }
    }

    pub fn tracking(&self) -> TrackingState {
        self.tracking
    }

    pub fn set_lost(&mut self) {
        if self.tracking != TrackingState::Lost {
            self.tracking = TrackingState::Lost;
        }
    }

    pub fn set_tracking(&mut self) {
        self.tracking = TrackingState::Tracking;
    }

    pub fn pose(&self) -> Option<&(Isometry3<f64>, Timestamp)> {
        self.pose.as_ref()
    }

    /// Continuous update from the odometry stream.
    ///
    /// Identical or out-of-order stamps are rejected wholesale: a zero or
    /// negative time delta can neither update the twist nor order the
    /// history.
    pub fn update_pose(&mut self, world_from_body: Isometry3<f64>, stamp: Timestamp) {
        if let Some((prev_pose, prev_stamp)) = self.pose {
            let dt = stamp - prev_stamp;
            if dt <= 0.0 {
                warn!("FusedState::update_pose non-increasing stamp {stamp} <= {prev_stamp}, ignored");
                return;
            }
            self.twist = Some(derive_twist(&prev_pose, &world_from_body, dt));
        }
        self.pose = Some((world_from_body, stamp));
    }

    /// Instantaneous replacement by an alignment or realignment pose.
    ///
    /// The jump is not treated as a velocity sample: the twist keeps its
    /// last derived value and the next continuous update differences
    /// against the corrected pose.
    pub fn manual_update(&mut self, world_from_body: Isometry3<f64>, stamp: Timestamp) {
        debug!("FusedState::manual_update discrete pose replacement at {stamp}");
        self.pose = Some((world_from_body, stamp));
    }

    /// Publishable estimate; `None` until both pose and twist are known.
    ///
    /// `error` is the latest odometry per-pixel error; an exact zero is
    /// floored so downstream covariance never degenerates.
    pub fn estimate(&self, error: Option<f64>, floor: f64) -> Option<FusedPoseEstimate> {
        let (pose, stamp) = self.pose?;
        let (linear, angular) = self.twist?;
        let raw = error.unwrap_or(floor);
        let uncertainty = if raw == 0.0 { floor } else { raw };
        Some(FusedPoseEstimate {
            stamp,
            world_from_body: pose,
            linear_velocity: linear,
            angular_velocity: angular,
            uncertainty,
        })
    }
}

fn derive_twist(
    prev: &Isometry3<f64>,
    next: &Isometry3<f64>,
    dt: f64,
) -> (Vector3<f64>, Vector3<f64>) {
    let v_world = (next.translation.vector - prev.translation.vector) / dt;
    let linear = next.rotation.inverse() * v_world;
    let angular = (prev.rotation.inverse() * next.rotation).scaled_axis() / dt;
    (linear, angular)
}
