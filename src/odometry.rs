//! Frame-to-frame planar feature odometry.
//!
//! Tracks a set of 2-D features assumed to lie on the ground plane. Each
//! feature carries the 3-D plane position inferred from its pixel under
//! the pose at which it was (re)anchored; after the point tracker advances
//! the pixels, a seeded pose-from-points solve explains the motion. The
//! feature set is exclusively owned here: features are dropped when their
//! track is lost or their ray no longer reaches the plane in front of the
//! camera, and replenished from fresh detections after each solve.

use crate::camera::{self, Intrinsics};
use crate::image::ImageU8;
use crate::pnp::PnpSolver;
use crate::types::Timestamp;
use crate::vision::PointTracker;
use log::{debug, warn};
use nalgebra::{Isometry3, Point2, Point3};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct OdometryOptions {
    /// Minimum surviving features required to attempt a pose solve.
    pub min_tracked_features: usize,
    /// Feature count the replenish step tops the set up to.
    pub target_features: usize,
    /// Minimum pixel separation of a fresh detection from kept features.
    pub min_feature_separation: f64,
}

impl Default for OdometryOptions {
    fn default() -> Self {
        Self {
            min_tracked_features: 8,
            target_features: 60,
            min_feature_separation: 8.0,
        }
    }
}

/// A tracked pixel and its anchored ground-plane position.
#[derive(Clone, Debug)]
pub struct TrackedFeature {
    pub px: Point2<f64>,
    pub world: Point3<f64>,
}

/// Planar visual odometry state: the continuous pose source of the fusion
/// layer.
pub struct PlanarOdometry {
    options: OdometryOptions,
    features: Vec<TrackedFeature>,
    world_from_cam: Isometry3<f64>,
    error: Option<f64>,
    last_realignment: Option<Timestamp>,
    /// Calibration of the most recent frame, for depth refreshes that
    /// happen outside the frame callback (external realignment).
    last_intrinsics: Option<Intrinsics>,
}

impl PlanarOdometry {
    pub fn new(options: OdometryOptions, initial_world_from_cam: Isometry3<f64>) -> Self {
        Self {
            options,
            features: Vec::new(),
            world_from_cam: initial_world_from_cam,
            error: None,
            last_realignment: None,
            last_intrinsics: None,
        }
    }

    /// Record the calibration of the frame being processed.
    pub fn set_intrinsics(&mut self, intrinsics: Intrinsics) {
        self.last_intrinsics = Some(intrinsics);
    }

    /// Current camera pose in the world frame.
    pub fn pose(&self) -> &Isometry3<f64> {
        &self.world_from_cam
    }

    /// Per-pixel reprojection error of the latest solve.
    pub fn error(&self) -> Option<f64> {
        self.error
    }

    pub fn features(&self) -> &[TrackedFeature] {
        &self.features
    }

    /// Advance the odometry by one frame: re-anchor plane positions under
    /// the current pose, flow the pixels, and solve for the new pose.
    ///
    /// Returns `true` when a supported pose was produced. `false` means
    /// insufficient features or a failed solve; the stored pose is then
    /// left untouched.
    pub fn advance<T: PointTracker, S: PnpSolver>(
        &mut self,
        tracker: &mut T,
        image: &ImageU8<'_>,
        intrinsics: &Intrinsics,
        solver: &S,
    ) -> bool {
        if self.features.is_empty() {
            warn!("PlanarOdometry::advance no features to track");
            return false;
        }

        // Anchor 3-D positions from the pre-motion pixels and pose, then
        // let the tracker move the pixels into the new frame.
        self.update_feature_depths(intrinsics);
        self.track_features(tracker, image);

        if self.features.len() < self.options.min_tracked_features {
            warn!(
                "PlanarOdometry::advance only {} features survive tracking, need {}",
                self.features.len(),
                self.options.min_tracked_features
            );
            return false;
        }

        let world: Vec<Point3<f64>> = self.features.iter().map(|f| f.world).collect();
        let pixels: Vec<Point2<f64>> = self.features.iter().map(|f| f.px).collect();
        let seed = self.world_from_cam.inverse();
        let Some(cam_from_world) = solver.solve(&world, &pixels, intrinsics, Some(&seed)) else {
            warn!("PlanarOdometry::advance pose solve failed");
            return false;
        };

        self.world_from_cam = cam_from_world.inverse();
        self.error = reprojection_error(&self.features, &cam_from_world, intrinsics);
        // Re-anchor under the solved pose so next frame differences against it.
        self.update_feature_depths(intrinsics);
        debug!(
            "PlanarOdometry::advance solved with {} features, error {:?}",
            self.features.len(),
            self.error
        );
        true
    }

    /// Top the feature set up to the configured target with detections
    /// that pass the planar back-projection test.
    pub fn replenish<T: PointTracker>(
        &mut self,
        tracker: &mut T,
        image: &ImageU8<'_>,
        intrinsics: &Intrinsics,
    ) {
        if self.features.len() >= self.options.target_features {
            return;
        }
        let existing: Vec<Point2<f64>> = self.features.iter().map(|f| f.px).collect();
        let wanted = self.options.target_features - self.features.len();
        let fresh = tracker.detect(image, &existing, wanted);

        let min_sep_sq = self.options.min_feature_separation.powi(2);
        let mut added = 0usize;
        for px in fresh {
            if self
                .features
                .iter()
                .any(|f| (f.px - px).norm_squared() < min_sep_sq)
            {
                continue;
            }
            match camera::ray_to_plane(&px, &self.world_from_cam, intrinsics) {
                Some(world) => {
                    self.features.push(TrackedFeature { px, world });
                    added += 1;
                }
                None => {
                    debug!("PlanarOdometry::replenish detection off the ground plane, skipped");
                }
            }
        }
        debug!(
            "PlanarOdometry::replenish added {added}, tracking {}",
            self.features.len()
        );
    }

    /// Force-set the pose (accepted alignment or external realignment),
    /// re-anchor all feature depths under it and reset the staleness clock.
    pub fn update_pose(&mut self, world_from_cam: Isometry3<f64>, stamp: Timestamp) {
        self.world_from_cam = world_from_cam;
        self.update_feature_depths_current();
        self.last_realignment = Some(stamp);
    }

    /// Seconds since the last accepted realignment. Self-initializes on
    /// the first query so dataset playback does not start lost.
    pub fn time_since_realignment(&mut self, now: Timestamp) -> f64 {
        match self.last_realignment {
            Some(t) => now - t,
            None => {
                debug!("PlanarOdometry::time_since_realignment starting staleness clock");
                self.last_realignment = Some(now);
                0.0
            }
        }
    }

    fn track_features<T: PointTracker>(&mut self, tracker: &mut T, image: &ImageU8<'_>) {
        let pixels: Vec<Point2<f64>> = self.features.iter().map(|f| f.px).collect();
        let tracked = tracker.track(image, &pixels);
        debug_assert_eq!(tracked.len(), self.features.len());

        let mut kept = Vec::with_capacity(self.features.len());
        for (feature, new_px) in self.features.drain(..).zip(tracked) {
            if let Some(px) = new_px {
                kept.push(TrackedFeature { px, ..feature });
            }
        }
        self.features = kept;
    }

    /// Recompute every feature's plane position from its pixel under the
    /// current pose, dropping features whose ray misses the plane.
    fn update_feature_depths(&mut self, intrinsics: &Intrinsics) {
        let pose = self.world_from_cam;
        let before = self.features.len();
        self.features.retain_mut(|f| {
            match camera::ray_to_plane(&f.px, &pose, intrinsics) {
                Some(world) => {
                    f.world = world;
                    true
                }
                None => false,
            }
        });
        let dropped = before - self.features.len();
        if dropped > 0 {
            debug!("PlanarOdometry dropped {dropped} features off the ground plane");
        }
    }

    fn update_feature_depths_current(&mut self) {
        // Before the first frame there is no calibration and no features;
        // nothing to refresh.
        if let Some(k) = self.last_intrinsics {
            self.update_feature_depths(&k);
        }
    }
}

fn reprojection_error(
    features: &[TrackedFeature],
    cam_from_world: &Isometry3<f64>,
    intrinsics: &Intrinsics,
) -> Option<f64> {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for f in features {
        if let Some(px) = camera::project(&f.world, cam_from_world, intrinsics) {
            sum_sq += (px - f.px).norm_squared();
            count += 1;
        }
    }
    (count > 0).then(|| (sum_sq / count as f64).sqrt())
}
