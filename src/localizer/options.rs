//! Parameter record for the whole localizer.
//!
//! Supplied once at construction and immutable afterwards; every
//! threshold referenced by the estimation pipeline lives here. Defaults
//! describe a metre-scale indoor grid observed by a downward camera.

use crate::align::AlignOptions;
use crate::fusion::FusionOptions;
use crate::grid::GridOptions;
use crate::odometry::OdometryOptions;
use nalgebra::Isometry3;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct LocalizerParams {
    /// Painted grid geometry.
    pub grid: GridOptions,
    /// Factor by which the host downscales frames before delivery; the
    /// native calibration is divided by it to match.
    pub inverse_image_scale: f64,
    /// Determinant threshold below which two polar lines count as
    /// parallel during corner extraction.
    pub parallel_threshold: f64,
    /// Alignment loop thresholds.
    pub align: AlignOptions,
    /// Planar odometry feature budget.
    pub odometry: OdometryOptions,
    /// Fusion gates and staleness bound.
    pub fusion: FusionOptions,
    /// Pose of the camera in the body frame (camera→body transform).
    pub cam_in_body: Isometry3<f64>,
}

impl Default for LocalizerParams {
    fn default() -> Self {
        Self {
            grid: GridOptions::default(),
            inverse_image_scale: 1.0,
            parallel_threshold: 0.2,
            align: AlignOptions::default(),
            odometry: OdometryOptions::default(),
            fusion: FusionOptions::default(),
            cam_in_body: Isometry3::identity(),
        }
    }
}
