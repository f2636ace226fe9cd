//! Model↔observation correspondences and their robust aggregate statistics.
//!
//! A [`Match`] ties one 3-D model corner to its reprojection under a pose
//! hypothesis and to the detected corner assigned to it. A [`MatchSet`] is
//! the ordered collection one alignment iteration works on: it reports the
//! per-pixel error (RMS of residuals) and prunes outliers with a max-norm
//! filter keyed off that error.
//!
//! Assignment is a greedy nearest-neighbour search, not a bijection: every
//! projected model corner takes the best of its k nearest detections, so
//! one detection may serve several model corners and no distance cutoff is
//! applied here. Outlier rejection is the alignment loop's job.

use crate::camera::{self, Intrinsics};
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Isometry3, Point2, Point3};

/// Number of nearest detections considered per projected model corner.
const KNN_CANDIDATES: usize = 4;

/// One model corner under a pose hypothesis.
#[derive(Clone, Debug)]
pub struct Match {
    /// Model corner in world coordinates (z = 0).
    pub world: Point3<f64>,
    /// Reprojection of `world` under the current hypothesis.
    pub projected: Point2<f64>,
    /// Detected corner assigned to this model corner.
    pub observed: Point2<f64>,
}

impl Match {
    /// Euclidean pixel distance between reprojection and observation.
    #[inline]
    pub fn residual(&self) -> f64 {
        (self.projected - self.observed).norm()
    }
}

/// Ordered collection of matches for one alignment iteration.
#[derive(Clone, Debug, Default)]
pub struct MatchSet {
    pub matches: Vec<Match>,
}

impl MatchSet {
    /// Project every model corner visible under `cam_from_world`.
    ///
    /// The observation of each match starts at the reprojection itself and
    /// is meaningless until [`MatchSet::assign_nearest`] has run.
    pub fn project_model(
        corners: &[Point3<f64>],
        cam_from_world: &Isometry3<f64>,
        intrinsics: &Intrinsics,
    ) -> Self {
        let matches = corners
            .iter()
            .filter_map(|corner| {
                camera::project(corner, cam_from_world, intrinsics).map(|px| Match {
                    world: *corner,
                    projected: px,
                    observed: px,
                })
            })
            .collect();
        Self { matches }
    }

    /// Assign each projected corner the best of its k nearest detections.
    pub fn assign_nearest(&mut self, detected: &[Point2<f64>]) {
        if detected.is_empty() || self.matches.is_empty() {
            return;
        }

        let mut tree: KdTree<f64, 2> = KdTree::new();
        for (i, pt) in detected.iter().enumerate() {
            tree.add(&[pt.x, pt.y], i as u64);
        }

        for m in &mut self.matches {
            let neighbours = tree.nearest_n::<SquaredEuclidean>(
                &[m.projected.x, m.projected.y],
                KNN_CANDIDATES.min(detected.len()),
            );

            let mut best = None;
            let mut best_norm = f64::MAX;
            for n in neighbours {
                let candidate = detected[n.item as usize];
                let norm = (m.projected - candidate).norm();
                if norm < best_norm {
                    best_norm = norm;
                    best = Some(candidate);
                }
            }
            if let Some(obs) = best {
                m.observed = obs;
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Root-mean-square residual in pixels, `None` for an empty set.
    pub fn per_pixel_error(&self) -> Option<f64> {
        if self.matches.is_empty() {
            return None;
        }
        let sum_sq: f64 = self.matches.iter().map(|m| m.residual().powi(2)).sum();
        Some((sum_sq / self.matches.len() as f64).sqrt())
    }

    /// Keep matches whose residual is at most `multiplier` times the
    /// current per-pixel error. For `multiplier ≥ 1` the retained subset
    /// never has a larger per-pixel error than the full set.
    pub fn max_norm_filter(&self, multiplier: f64) -> MatchSet {
        let Some(ppe) = self.per_pixel_error() else {
            return MatchSet::default();
        };
        let cutoff = multiplier * ppe;
        let matches = self
            .matches
            .iter()
            .filter(|m| m.residual() <= cutoff)
            .cloned()
            .collect();
        MatchSet { matches }
    }

    /// Model points in match order, for the pose solver.
    pub fn world_points(&self) -> Vec<Point3<f64>> {
        self.matches.iter().map(|m| m.world).collect()
    }

    /// Assigned observations in match order, for the pose solver.
    pub fn observed_points(&self) -> Vec<Point2<f64>> {
        self.matches.iter().map(|m| m.observed).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn set_from_residuals(residuals: &[f64]) -> MatchSet {
        let matches = residuals
            .iter()
            .map(|&r| Match {
                world: Point3::origin(),
                projected: Point2::new(0.0, 0.0),
                observed: Point2::new(r, 0.0),
            })
            .collect();
        MatchSet { matches }
    }

    #[test]
    fn per_pixel_error_is_rms() {
        let set = set_from_residuals(&[3.0, 4.0]);
        let expected = ((9.0 + 16.0) / 2.0_f64).sqrt();
        assert_relative_eq!(set.per_pixel_error().unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn empty_set_has_no_error() {
        assert!(MatchSet::default().per_pixel_error().is_none());
    }

    #[test]
    fn max_norm_filter_never_increases_error() {
        let set = set_from_residuals(&[0.5, 1.0, 1.5, 2.0, 40.0]);
        let full = set.per_pixel_error().unwrap();
        let filtered = set.max_norm_filter(2.0);
        assert!(filtered.len() < set.len());
        assert!(filtered.per_pixel_error().unwrap() <= full);
    }

    #[test]
    fn max_norm_filter_keeps_clean_sets_intact() {
        let set = set_from_residuals(&[1.0, 1.0, 1.0]);
        assert_eq!(set.max_norm_filter(2.0).len(), 3);
    }

    #[test]
    fn assignment_is_greedy_not_bijective() {
        // Two projected corners, one detection: both must claim it.
        let mut set = MatchSet {
            matches: vec![
                Match {
                    world: Point3::new(0.0, 0.0, 0.0),
                    projected: Point2::new(10.0, 10.0),
                    observed: Point2::new(10.0, 10.0),
                },
                Match {
                    world: Point3::new(1.0, 0.0, 0.0),
                    projected: Point2::new(200.0, 200.0),
                    observed: Point2::new(200.0, 200.0),
                },
            ],
        };
        let detected = [Point2::new(12.0, 10.0)];
        set.assign_nearest(&detected);
        assert_eq!(set.matches[0].observed, detected[0]);
        assert_eq!(set.matches[1].observed, detected[0]);
    }

    #[test]
    fn assignment_picks_nearest_of_candidates() {
        let mut set = MatchSet {
            matches: vec![Match {
                world: Point3::origin(),
                projected: Point2::new(50.0, 50.0),
                observed: Point2::new(50.0, 50.0),
            }],
        };
        let detected = [
            Point2::new(80.0, 50.0),
            Point2::new(52.0, 50.0),
            Point2::new(50.0, 58.0),
            Point2::new(10.0, 10.0),
            Point2::new(51.0, 49.0),
        ];
        set.assign_nearest(&detected);
        assert_eq!(set.matches[0].observed, Point2::new(51.0, 49.0));
    }
}
