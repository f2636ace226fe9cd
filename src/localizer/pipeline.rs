use crate::align::GridAligner;
use crate::camera::Intrinsics;
use crate::corners::{self, PolarLine};
use crate::fusion::FusedState;
use crate::grid::GridModel;
use crate::image::ImageU8;
use crate::odometry::PlanarOdometry;
use crate::pnp::{IterativePnp, PnpSolver};
use crate::types::{FusedPoseEstimate, PoseBounds, Timestamp, TrackingState};
use crate::vision::{LineDetector, PointTracker};

use super::options::LocalizerParams;
use log::{debug, info, warn};
use nalgebra::{Isometry3, Point2};

/// Grid localizer: owns both estimators, the fusion state machine and the
/// collaborator backends.
pub struct Localizer<L, T, S = IterativePnp> {
    params: LocalizerParams,
    model: GridModel,
    aligner: GridAligner,
    bounds: PoseBounds,
    odometry: PlanarOdometry,
    fused: FusedState,
    line_detector: L,
    tracker: T,
    solver: S,
    detected_corners: Vec<Point2<f64>>,
    odometry_initialized: bool,
}

impl<L: LineDetector, T: PointTracker> Localizer<L, T, IterativePnp> {
    /// Build a localizer with the default pose-from-points solver, seeded
    /// with an initial world→body pose guess.
    pub fn new(
        params: LocalizerParams,
        line_detector: L,
        tracker: T,
        initial_world_from_body: Isometry3<f64>,
    ) -> Self {
        Self::with_solver(
            params,
            line_detector,
            tracker,
            IterativePnp::default(),
            initial_world_from_body,
        )
    }
}

impl<L: LineDetector, T: PointTracker, S: PnpSolver> Localizer<L, T, S> {
    pub fn with_solver(
        params: LocalizerParams,
        line_detector: L,
        tracker: T,
        solver: S,
        initial_world_from_body: Isometry3<f64>,
    ) -> Self {
        let model = GridModel::new(&params.grid);
        let bounds = PoseBounds {
            min_height: params.fusion.min_height,
            max_height: params.fusion.max_height,
            max_abs_x: model.half_extent_x() + params.fusion.bounds_margin,
            max_abs_y: model.half_extent_y() + params.fusion.bounds_margin,
        };
        let aligner = GridAligner::new(params.align);
        let odometry = PlanarOdometry::new(
            params.odometry,
            initial_world_from_body * params.cam_in_body,
        );
        let fused = FusedState::new(initial_world_from_body, 0.0);
        Self {
            params,
            model,
            aligner,
            bounds,
            odometry,
            fused,
            line_detector,
            tracker,
            solver,
            detected_corners: Vec::new(),
            odometry_initialized: false,
        }
    }

    pub fn tracking(&self) -> TrackingState {
        self.fused.tracking()
    }

    /// Latest fused world→body pose and its stamp.
    pub fn fused_pose(&self) -> Option<&(Isometry3<f64>, Timestamp)> {
        self.fused.pose()
    }

    pub fn grid_model(&self) -> &GridModel {
        &self.model
    }

    /// Candidate corners extracted from the most recent frame.
    pub fn detected_corners(&self) -> &[Point2<f64>] {
        &self.detected_corners
    }

    /// Process one camera frame.
    ///
    /// `kmtx` is the native row-major 3×3 calibration of the camera; the
    /// frame itself arrives downscaled by the configured
    /// `inverse_image_scale`. Returns the fused estimate while tracking,
    /// `None` while lost or before the twist is available.
    pub fn on_frame(
        &mut self,
        image: &ImageU8<'_>,
        kmtx: &[f64; 9],
        stamp: Timestamp,
    ) -> Option<FusedPoseEstimate> {
        if self.fused.tracking() == TrackingState::Lost {
            warn!("Localizer::on_frame tracking lost, waiting for a realignment pose");
        }

        let intrinsics = self.frame_intrinsics(kmtx, image);
        self.odometry.set_intrinsics(intrinsics);

        let good_vo = self.advance_odometry(image, &intrinsics);
        self.odometry
            .replenish(&mut self.tracker, image, &intrinsics);

        if good_vo {
            let world_from_body = self.odometry.pose() * self.params.cam_in_body.inverse();
            self.fused.update_pose(world_from_body, stamp);
            if let Some(error) = self.odometry.error() {
                if error > self.params.fusion.max_odometry_error {
                    warn!("Localizer::on_frame lost tracking: odometry error {error:.3}px too high");
                    self.fused.set_lost();
                }
            }
        } else if self.odometry_initialized {
            warn!("Localizer::on_frame lost tracking: odometry failed");
            self.fused.set_lost();
        }

        self.detect_corners(image, &intrinsics);
        let recovered = self.attempt_alignment(&intrinsics, stamp);

        // Final plausibility and staleness gates.
        if let Some((pose, _)) = self.fused.pose() {
            if !self.bounds.allows(pose) {
                warn!("Localizer::on_frame lost tracking: pose in an extreme position");
                self.fused.set_lost();
            }
        }
        let age = self.odometry.time_since_realignment(stamp);
        if age > self.params.fusion.max_realignment_age {
            warn!("Localizer::on_frame lost tracking: no accepted alignment for {age:.2}s");
            self.fused.set_lost();
        }

        if self.fused.tracking() == TrackingState::Tracking && !recovered {
            self.fused
                .estimate(self.odometry.error(), self.params.fusion.uncertainty_floor)
        } else {
            // A recovery frame is withheld so a discrete correction never
            // surfaces as velocity.
            None
        }
    }

    /// Accept an external realignment pose as ground truth.
    ///
    /// Both the odometry pose and the fused pose are force-set to it,
    /// bypassing the continuous update path, and tracking resumes.
    pub fn on_external_realignment(&mut self, world_from_body: Isometry3<f64>, stamp: Timestamp) {
        info!("Localizer::on_external_realignment pose received, tracking reset");
        self.odometry
            .update_pose(world_from_body * self.params.cam_in_body, stamp);
        self.fused.manual_update(world_from_body, stamp);
        self.fused.set_tracking();
    }

    fn frame_intrinsics(&self, kmtx: &[f64; 9], image: &ImageU8<'_>) -> Intrinsics {
        Intrinsics::from_k(kmtx, image.w, image.h)
            .with_image_scale(self.params.inverse_image_scale)
    }

    fn advance_odometry(&mut self, image: &ImageU8<'_>, intrinsics: &Intrinsics) -> bool {
        if self.odometry.features().is_empty() {
            warn!("Localizer::on_frame odometry has no features yet");
            return false;
        }
        let good = self
            .odometry
            .advance(&mut self.tracker, image, intrinsics, &self.solver);
        if good && !self.odometry_initialized {
            self.odometry_initialized = true;
            info!("Localizer::on_frame odometry initialized");
        }
        good
    }

    fn detect_corners(&mut self, image: &ImageU8<'_>, intrinsics: &Intrinsics) {
        let lines: Vec<PolarLine> = self.line_detector.detect_lines(image);
        if lines.is_empty() {
            warn!("Localizer::on_frame no lines detected, clearing stale corners");
            self.detected_corners.clear();
            return;
        }
        self.detected_corners = corners::intersect_lines(
            &lines,
            intrinsics.width,
            intrinsics.height,
            self.params.parallel_threshold,
        );
        debug!(
            "Localizer::on_frame {} lines -> {} corner candidates",
            lines.len(),
            self.detected_corners.len()
        );
    }

    /// Run the grid alignment; returns whether this frame recovered from a
    /// lost state (in which case publication is suppressed).
    fn attempt_alignment(&mut self, intrinsics: &Intrinsics, stamp: Timestamp) -> bool {
        if self.detected_corners.is_empty() {
            warn!("Localizer::on_frame no detected corners, grid alignment skipped");
            return false;
        }

        let guess = *self.odometry.pose();
        let alignment = self.aligner.align(
            &self.model,
            &self.detected_corners,
            &guess,
            intrinsics,
            &self.bounds,
            &self.solver,
        );
        if !alignment.accepted {
            info!("Localizer::on_frame grid alignment not accepted");
            return false;
        }

        info!(
            "Localizer::on_frame grid alignment accepted, error {:?}px",
            alignment.error
        );
        self.odometry.update_pose(alignment.world_from_cam, stamp);
        let world_from_body = alignment.world_from_cam * self.params.cam_in_body.inverse();
        self.fused.manual_update(world_from_body, stamp);

        if self.fused.tracking() == TrackingState::Lost {
            info!("Localizer::on_frame regained tracking from an internal grid alignment");
            self.fused.set_tracking();
            return true;
        }
        false
    }
}
