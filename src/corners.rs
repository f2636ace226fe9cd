//! Candidate corner extraction from detected lines.
//!
//! Line detection itself is a collaborator capability
//! ([`crate::vision::LineDetector`]); this module turns its polar-form
//! output into an unordered set of candidate corner pixels by intersecting
//! every non-parallel line pair.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Line in polar form: `x·cosθ + y·sinθ = ρ`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolarLine {
    pub rho: f64,
    pub theta: f64,
}

impl PolarLine {
    pub fn new(rho: f64, theta: f64) -> Self {
        Self { rho, theta }
    }
}

#[inline]
fn in_bounds(pt: &Point2<f64>, width: f64, height: f64) -> bool {
    pt.x >= 0.0 && pt.y >= 0.0 && pt.x <= width && pt.y <= height
}

/// Intersect every pair of lines, keeping in-bounds intersection points.
///
/// Pairs whose determinant `|cosθ₁·sinθ₂ − sinθ₁·cosθ₂|` falls below
/// `parallel_threshold` are skipped: near-parallel lines produce unstable
/// intersections far outside the grid. The output order follows the pair
/// enumeration and carries no meaning.
pub fn intersect_lines(
    lines: &[PolarLine],
    width: f64,
    height: f64,
    parallel_threshold: f64,
) -> Vec<Point2<f64>> {
    let mut points = Vec::new();
    if lines.len() < 2 {
        return points;
    }

    for i in 0..lines.len() - 1 {
        for j in i + 1..lines.len() {
            let (ct1, st1) = (lines[i].theta.cos(), lines[i].theta.sin());
            let (ct2, st2) = (lines[j].theta.cos(), lines[j].theta.sin());

            let det = ct1 * st2 - st1 * ct2;
            if det.abs() < parallel_threshold {
                continue;
            }

            let (r1, r2) = (lines[i].rho, lines[j].rho);
            let pt = Point2::new((st2 * r1 - st1 * r2) / det, (-ct2 * r1 + ct1 * r2) / det);

            if in_bounds(&pt, width, height) {
                points.push(pt);
            }
        }
    }

    points
}
