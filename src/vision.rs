//! Capabilities the host must supply from its vision library.
//!
//! The localizer is generic over these traits so any backend (OpenCV,
//! kornia, a test fake) can slot in. Implementations own whatever internal
//! state their backend needs (previous frames, pyramids, detector masks).

use crate::corners::PolarLine;
use crate::image::ImageU8;
use nalgebra::Point2;

/// Straight-line detection on a grayscale frame.
///
/// The implementation is expected to run its own preprocessing (blur, edge
/// detection) and return lines in polar `(ρ, θ)` form. An empty result is
/// meaningful: the frame contributes no corners.
pub trait LineDetector {
    fn detect_lines(&mut self, image: &ImageU8<'_>) -> Vec<PolarLine>;
}

/// Frame-to-frame point tracking plus salient-point detection.
pub trait PointTracker {
    /// Track `points` from the previously seen frame into `image`.
    ///
    /// Returns one entry per input point, in order; `None` marks a track
    /// that could not be re-acquired.
    fn track(&mut self, image: &ImageU8<'_>, points: &[Point2<f64>]) -> Vec<Option<Point2<f64>>>;

    /// Detect up to `count` fresh salient points, steering clear of the
    /// `avoid` set (typically the currently tracked features).
    fn detect(
        &mut self,
        image: &ImageU8<'_>,
        avoid: &[Point2<f64>],
        count: usize,
    ) -> Vec<Point2<f64>>;
}
