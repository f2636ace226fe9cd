//! Localizer orchestrating the per-frame estimation pipeline.
//!
//! Control flow per incoming frame:
//! - planar feature odometry advances using the new image and feeds the
//!   continuous fusion path,
//! - the line-detector collaborator produces polar lines, intersected into
//!   candidate corners,
//! - the grid aligner attempts to refine the odometry pose against the
//!   detected corners,
//! - the fusion layer merges whichever estimate is trustworthy, runs the
//!   plausibility and staleness gates, and (while tracking) emits a
//!   pose + twist estimate.
//!
//! Processing is frame-synchronous and run-to-completion: the only
//! entry points are [`Localizer::on_frame`] and
//! [`Localizer::on_external_realignment`], and all mutable state lives
//! behind `&mut self`, so no locking is needed as long as the host does
//! not interleave the callbacks.

pub mod options;
mod pipeline;

pub use options::LocalizerParams;
pub use pipeline::Localizer;
