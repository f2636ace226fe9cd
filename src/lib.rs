#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod config;
pub mod image;
pub mod localizer;
pub mod types;
pub mod vision;

// Estimation internals – public for hosts that want to drive the pieces
// individually (custom pipelines, tooling, tests).
pub mod align;
pub mod camera;
pub mod corners;
pub mod fusion;
pub mod grid;
pub mod matching;
pub mod odometry;
pub mod pnp;

// --- High-level re-exports -------------------------------------------------

// Main entry points: localizer + results.
pub use crate::localizer::{Localizer, LocalizerParams};
pub use crate::types::{FusedPoseEstimate, TrackingState};

// Frequently needed building blocks.
pub use crate::align::{Alignment, GridAligner};
pub use crate::grid::{GridModel, GridOptions};
pub use crate::image::ImageU8;
pub use crate::pnp::{IterativePnp, PnpSolver};

/// Small prelude for quick experiments.
pub mod prelude {
    pub use crate::image::ImageU8;
    pub use crate::vision::{LineDetector, PointTracker};
    pub use crate::{FusedPoseEstimate, Localizer, LocalizerParams, TrackingState};
}
