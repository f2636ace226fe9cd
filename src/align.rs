//! Robust grid alignment: the project/match/solve loop ("grid ICP").
//!
//! One invocation per frame with detected corners. The loop alternates
//! correspondence search against the projected grid model with a seeded
//! pose-from-points solve on the robust subset, then runs a final battery
//! of acceptance gates. Every early exit is tagged not-accepted and hands
//! back the caller's original hypothesis untouched — an unconverged or
//! poorly supported pose must never masquerade as an improvement.

use crate::camera::Intrinsics;
use crate::grid::GridModel;
use crate::matching::MatchSet;
use crate::pnp::PnpSolver;
use crate::types::PoseBounds;
use log::{debug, warn};
use nalgebra::{Isometry3, Point2};
use serde::{Deserialize, Serialize};

/// Thresholds of the alignment loop and its acceptance gates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AlignOptions {
    /// Iteration cap of the project/match/solve loop.
    pub max_iterations: usize,
    /// Per-pixel-error delta below which the loop has converged.
    pub convergence_delta: f64,
    /// Solve on the robust subset instead of every match.
    pub use_max_norm: bool,
    /// Residual cutoff as a multiple of the current per-pixel error.
    pub max_norm_multiplier: f64,
    /// Robust-subset size below which an iteration aborts the attempt.
    pub min_initial_matches: usize,
    /// Robust-subset size required by the final gate.
    pub min_final_matches: usize,
    /// Minimum surviving/total match ratio at the final gate.
    pub min_inlier_ratio: f64,
    /// Maximum accepted per-pixel error (pixels).
    pub max_error: f64,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            convergence_delta: 0.01,
            use_max_norm: true,
            max_norm_multiplier: 2.0,
            min_initial_matches: 12,
            min_final_matches: 12,
            min_inlier_ratio: 0.5,
            max_error: 5.0,
        }
    }
}

/// Why an alignment attempt was not accepted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rejection {
    NoVisibleCorners,
    TooFewMatches { found: usize, minimum: usize },
    SolveFailed,
    LowInlierRatio { ratio: f64, minimum: f64 },
    ErrorTooHigh { error: f64, maximum: f64 },
    OutOfBounds,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NoVisibleCorners => {
                write!(f, "no grid corners project into the image")
            }
            Rejection::TooFewMatches { found, minimum } => {
                write!(f, "{found} robust matches, need {minimum}")
            }
            Rejection::SolveFailed => write!(f, "pose-from-points solve failed"),
            Rejection::LowInlierRatio { ratio, minimum } => {
                write!(f, "inlier ratio {ratio:.3} below {minimum:.3}")
            }
            Rejection::ErrorTooHigh { error, maximum } => {
                write!(f, "per-pixel error {error:.3}px above {maximum:.3}px")
            }
            Rejection::OutOfBounds => write!(f, "pose outside positional bounds"),
        }
    }
}

impl std::error::Error for Rejection {}

/// Outcome of one alignment attempt.
///
/// When `accepted` is false, `world_from_cam` is the caller's original
/// hypothesis and `error` is `None` — the input pose was not improved.
#[derive(Clone, Debug)]
pub struct Alignment {
    pub world_from_cam: Isometry3<f64>,
    pub accepted: bool,
    pub error: Option<f64>,
    pub rejection: Option<Rejection>,
}

impl Alignment {
    fn rejected(guess: &Isometry3<f64>, why: Rejection) -> Self {
        Self {
            world_from_cam: *guess,
            accepted: false,
            error: None,
            rejection: Some(why),
        }
    }
}

/// Iterative grid-model aligner.
pub struct GridAligner {
    options: AlignOptions,
}

impl GridAligner {
    pub fn new(options: AlignOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AlignOptions {
        &self.options
    }

    /// Refine `guess_world_from_cam` against the detected corner set.
    pub fn align<S: PnpSolver>(
        &self,
        model: &GridModel,
        detected: &[Point2<f64>],
        guess_world_from_cam: &Isometry3<f64>,
        intrinsics: &Intrinsics,
        bounds: &PoseBounds,
        solver: &S,
    ) -> Alignment {
        let opts = &self.options;
        if detected.is_empty() {
            let why = Rejection::TooFewMatches {
                found: 0,
                minimum: opts.min_initial_matches,
            };
            warn!("GridAligner::align no detected corners: {why}");
            return Alignment::rejected(guess_world_from_cam, why);
        }
        let mut cam_from_world = guess_world_from_cam.inverse();

        let mut matches = self.correspondences(model, detected, &cam_from_world, intrinsics);
        let Some(mut last_error) = matches.per_pixel_error() else {
            warn!("GridAligner::align {}", Rejection::NoVisibleCorners);
            return Alignment::rejected(guess_world_from_cam, Rejection::NoVisibleCorners);
        };
        debug!("GridAligner::align initial error {last_error:.3}px");

        let mut converged = false;
        for iteration in 0..opts.max_iterations {
            let solve_set = if opts.use_max_norm {
                let subset = matches.max_norm_filter(opts.max_norm_multiplier);
                debug!(
                    "GridAligner::align iter {iteration}: {} of {} matches survive max-norm",
                    subset.len(),
                    matches.len()
                );
                if subset.len() < opts.min_initial_matches {
                    let why = Rejection::TooFewMatches {
                        found: subset.len(),
                        minimum: opts.min_initial_matches,
                    };
                    warn!("GridAligner::align {why}");
                    return Alignment::rejected(guess_world_from_cam, why);
                }
                subset
            } else {
                matches.clone()
            };

            let Some(refined) = solver.solve(
                &solve_set.world_points(),
                &solve_set.observed_points(),
                intrinsics,
                Some(&cam_from_world),
            ) else {
                warn!("GridAligner::align {}", Rejection::SolveFailed);
                return Alignment::rejected(guess_world_from_cam, Rejection::SolveFailed);
            };
            cam_from_world = refined;

            matches = self.correspondences(model, detected, &cam_from_world, intrinsics);
            let Some(error) = matches.per_pixel_error() else {
                warn!("GridAligner::align {}", Rejection::NoVisibleCorners);
                return Alignment::rejected(guess_world_from_cam, Rejection::NoVisibleCorners);
            };
            debug!("GridAligner::align iter {iteration}: error {error:.3}px");

            if (error - last_error).abs() < opts.convergence_delta {
                converged = true;
                break;
            }
            last_error = error;
        }
        if !converged {
            debug!("GridAligner::align iteration cap reached, gating final state");
        }

        // Final robust filter and acceptance gates.
        let survivors = matches.max_norm_filter(opts.max_norm_multiplier);
        if survivors.len() < opts.min_final_matches {
            let why = Rejection::TooFewMatches {
                found: survivors.len(),
                minimum: opts.min_final_matches,
            };
            warn!("GridAligner::align {why}");
            return Alignment::rejected(guess_world_from_cam, why);
        }

        let ratio = survivors.len() as f64 / matches.len() as f64;
        if ratio < opts.min_inlier_ratio {
            let why = Rejection::LowInlierRatio {
                ratio,
                minimum: opts.min_inlier_ratio,
            };
            warn!("GridAligner::align {why}");
            return Alignment::rejected(guess_world_from_cam, why);
        }

        let Some(error) = survivors.per_pixel_error() else {
            warn!("GridAligner::align {}", Rejection::NoVisibleCorners);
            return Alignment::rejected(guess_world_from_cam, Rejection::NoVisibleCorners);
        };
        if error > opts.max_error {
            let why = Rejection::ErrorTooHigh {
                error,
                maximum: opts.max_error,
            };
            warn!("GridAligner::align {why}");
            return Alignment::rejected(guess_world_from_cam, why);
        }

        let world_from_cam = cam_from_world.inverse();
        if !bounds.allows(&world_from_cam) {
            warn!("GridAligner::align {}", Rejection::OutOfBounds);
            return Alignment::rejected(guess_world_from_cam, Rejection::OutOfBounds);
        }

        debug!("GridAligner::align accepted with error {error:.3}px");
        Alignment {
            world_from_cam,
            accepted: true,
            error: Some(error),
            rejection: None,
        }
    }

    fn correspondences(
        &self,
        model: &GridModel,
        detected: &[Point2<f64>],
        cam_from_world: &Isometry3<f64>,
        intrinsics: &Intrinsics,
    ) -> MatchSet {
        let mut matches = MatchSet::project_model(model.corners(), cam_from_world, intrinsics);
        matches.assign_nearest(detected);
        matches
    }
}
