//! Static model of the painted ground grid.
//!
//! The grid is a `width` × `height` cell lattice with double-thickness
//! border lines and thinner interior lines, centred on the world origin in
//! the z = 0 plane. [`GridModel::new`] enumerates the expected painted
//! corner points once at startup; the ordered corner list is the only part
//! that participates in alignment. The quad list describes the painted
//! bands and floor for rendering/visualization and is data only.
//!
//! Corner placement depends on the junction class of each line crossing:
//! the four outer corners, T-junctions along the horizontal and vertical
//! borders, and interior `+` crossings each carry a distinct offset
//! pattern built from half line thicknesses. [`JunctionKind`] names the
//! classes so each pattern is testable on its own.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Geometry of the painted grid. Immutable after startup.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GridOptions {
    /// Number of cells along x.
    pub width: u32,
    /// Number of cells along y.
    pub height: u32,
    /// Cell pitch (metres).
    pub spacing: f64,
    /// Half thickness of interior painted lines (metres).
    pub inner_line_thickness: f64,
    /// Half thickness of border painted lines (metres).
    pub outer_line_thickness: f64,
    /// Extra floor margin around the outermost lines (metres).
    pub boundary_padding: f64,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            width: 5,
            height: 5,
            spacing: 1.0,
            inner_line_thickness: 0.02,
            outer_line_thickness: 0.05,
            boundary_padding: 0.5,
        }
    }
}

/// Class of a grid line crossing, derived from its integer line indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JunctionKind {
    /// One of the four outer corners of the double border.
    Corner,
    /// Interior vertical line meeting the top or bottom border.
    EdgeHorizontal,
    /// Interior horizontal line meeting the left or right border.
    EdgeVertical,
    /// Interior `+` crossing of two inner lines.
    Cross,
}

impl JunctionKind {
    /// Classify the crossing of vertical line `xi` and horizontal line `yi`
    /// on a grid with `width` × `height` cells (line indices run `0..=width`
    /// and `0..=height`).
    pub fn classify(xi: u32, yi: u32, width: u32, height: u32) -> Self {
        let x_border = xi == 0 || xi == width;
        let y_border = yi == 0 || yi == height;
        match (x_border, y_border) {
            (true, true) => JunctionKind::Corner,
            (false, true) => JunctionKind::EdgeHorizontal,
            (true, false) => JunctionKind::EdgeVertical,
            (false, false) => JunctionKind::Cross,
        }
    }
}

/// Colored quadrilateral of the painted pattern (rendering only).
#[derive(Clone, Debug, Serialize)]
pub struct Quad {
    pub color: [u8; 3],
    pub vertices: [Point2<f64>; 4],
}

pub const COLOR_WHITE: [u8; 3] = [255, 255, 255];
pub const COLOR_FLOOR: [u8; 3] = [60, 60, 60];

/// Expected corner points and painted quads of the grid. Built once;
/// process-wide read-only state.
#[derive(Clone, Debug)]
pub struct GridModel {
    options: GridOptions,
    corners: Vec<Point3<f64>>,
    quads: Vec<Quad>,
}

impl GridModel {
    pub fn new(options: &GridOptions) -> Self {
        let corners = generate_corners(options);
        let quads = generate_quads(options);
        Self {
            options: *options,
            corners,
            quads,
        }
    }

    /// Ordered expected corner points, all at z = 0.
    pub fn corners(&self) -> &[Point3<f64>] {
        &self.corners
    }

    /// Painted floor and line bands for visualization.
    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    /// Half extent of the lattice along x (metres), padding excluded.
    pub fn half_extent_x(&self) -> f64 {
        self.options.width as f64 * self.options.spacing / 2.0
    }

    /// Half extent of the lattice along y (metres), padding excluded.
    pub fn half_extent_y(&self) -> f64 {
        self.options.height as f64 * self.options.spacing / 2.0
    }
}

/// Corner offsets for one junction, in the fixed order the model uses.
/// Corners sit half an inner/outer thickness away from the line centre.
fn junction_offsets(kind: JunctionKind, xi: u32, yi: u32, ilt: f64, olt: f64) -> Vec<(f64, f64)> {
    let ho = olt / 2.0;
    let hi = ilt / 2.0;
    match kind {
        JunctionKind::Corner => match (xi == 0, yi == 0) {
            // Each outer corner contributes its outside and inside point.
            (true, true) => vec![(-ho, -ho), (ho, ho)],
            (false, true) => vec![(ho, -ho), (-ho, ho)],
            (false, false) => vec![(ho, ho), (-ho, -ho)],
            (true, false) => vec![(-ho, ho), (ho, -ho)],
        },
        JunctionKind::EdgeHorizontal => {
            // T against the top/bottom border: both corners sit on the
            // inward face of the border band.
            let dy = if yi == 0 { ho } else { -ho };
            vec![(-hi, dy), (hi, dy)]
        }
        JunctionKind::EdgeVertical => {
            let dx = if xi == 0 { ho } else { -ho };
            vec![(dx, hi), (dx, -hi)]
        }
        JunctionKind::Cross => vec![(hi, hi), (-hi, hi), (-hi, -hi), (hi, -hi)],
    }
}

fn generate_corners(options: &GridOptions) -> Vec<Point3<f64>> {
    let min_x = -(options.width as f64 * options.spacing / 2.0);
    let min_y = -(options.height as f64 * options.spacing / 2.0);

    let mut corners = Vec::new();
    for xi in 0..=options.width {
        let x = min_x + xi as f64 * options.spacing;
        for yi in 0..=options.height {
            let y = min_y + yi as f64 * options.spacing;
            let kind = JunctionKind::classify(xi, yi, options.width, options.height);
            for (dx, dy) in junction_offsets(
                kind,
                xi,
                yi,
                options.inner_line_thickness,
                options.outer_line_thickness,
            ) {
                corners.push(Point3::new(x + dx, y + dy, 0.0));
            }
        }
    }
    corners
}

fn generate_quads(options: &GridOptions) -> Vec<Quad> {
    let min_x = -(options.width as f64 * options.spacing / 2.0);
    let max_x = -min_x;
    let min_y = -(options.height as f64 * options.spacing / 2.0);
    let max_y = -min_y;
    let pad = options.boundary_padding;

    let mut quads = vec![Quad {
        color: COLOR_FLOOR,
        vertices: [
            Point2::new(max_x + pad, max_y + pad),
            Point2::new(min_x - pad, max_y + pad),
            Point2::new(min_x - pad, min_y - pad),
            Point2::new(max_x + pad, min_y - pad),
        ],
    }];

    for xi in 0..=options.width {
        let x = min_x + xi as f64 * options.spacing;
        let t = if xi == 0 || xi == options.width {
            options.outer_line_thickness
        } else {
            options.inner_line_thickness
        };
        quads.push(Quad {
            color: COLOR_WHITE,
            vertices: [
                Point2::new(x - t, max_y),
                Point2::new(x + t, max_y),
                Point2::new(x + t, min_y),
                Point2::new(x - t, min_y),
            ],
        });
    }

    for yi in 0..=options.height {
        let y = min_y + yi as f64 * options.spacing;
        let t = if yi == 0 || yi == options.height {
            options.outer_line_thickness
        } else {
            options.inner_line_thickness
        };
        quads.push(Quad {
            color: COLOR_WHITE,
            vertices: [
                Point2::new(max_x, y - t),
                Point2::new(max_x, y + t),
                Point2::new(min_x, y + t),
                Point2::new(min_x, y - t),
            ],
        });
    }

    quads
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_by_five_corner_count() {
        let model = GridModel::new(&GridOptions::default());
        // 4 corners × 2 + 2×4 horizontal tees × 2 + 2×4 vertical tees × 2
        // + 16 crossings × 4.
        assert_eq!(model.corners().len(), 104);
    }

    #[test]
    fn regeneration_is_deterministic() {
        let options = GridOptions::default();
        let a = GridModel::new(&options);
        let b = GridModel::new(&options);
        assert_eq!(a.corners().len(), b.corners().len());
        for (pa, pb) in a.corners().iter().zip(b.corners()) {
            assert_eq!(pa, pb, "corner lists must match exactly");
        }
    }

    #[test]
    fn all_corners_on_ground_plane() {
        let model = GridModel::new(&GridOptions::default());
        assert!(model.corners().iter().all(|c| c.z == 0.0));
    }

    #[test]
    fn junction_classification() {
        assert_eq!(JunctionKind::classify(0, 0, 5, 5), JunctionKind::Corner);
        assert_eq!(JunctionKind::classify(5, 0, 5, 5), JunctionKind::Corner);
        assert_eq!(
            JunctionKind::classify(2, 0, 5, 5),
            JunctionKind::EdgeHorizontal
        );
        assert_eq!(
            JunctionKind::classify(5, 3, 5, 5),
            JunctionKind::EdgeVertical
        );
        assert_eq!(JunctionKind::classify(2, 3, 5, 5), JunctionKind::Cross);
    }

    #[test]
    fn edge_offsets_point_inward() {
        // Top border tee: corners sit above the border centre line.
        let offs = junction_offsets(JunctionKind::EdgeHorizontal, 2, 0, 0.02, 0.05);
        assert!(offs.iter().all(|&(_, dy)| dy > 0.0));
        // Bottom border tee: below.
        let offs = junction_offsets(JunctionKind::EdgeHorizontal, 2, 5, 0.02, 0.05);
        assert!(offs.iter().all(|&(_, dy)| dy < 0.0));
        // Left border tee: to the right.
        let offs = junction_offsets(JunctionKind::EdgeVertical, 0, 2, 0.02, 0.05);
        assert!(offs.iter().all(|&(dx, _)| dx > 0.0));
    }

    #[test]
    fn corners_stay_within_padded_extent() {
        let options = GridOptions::default();
        let model = GridModel::new(&options);
        let ex = model.half_extent_x() + options.outer_line_thickness;
        let ey = model.half_extent_y() + options.outer_line_thickness;
        for c in model.corners() {
            assert!(c.x.abs() <= ex && c.y.abs() <= ey, "corner escaped: {c:?}");
        }
    }
}
