//! Shared synthetic ground-grid scene for the integration tests.
//!
//! The vision collaborators are replaced by analytic fakes that render a
//! known true camera pose: the line detector projects the grid line
//! centrelines of the current pose, and the point tracker flows pixels
//! through the ground plane from the previous pose to the current one.
//! Tests steer both fakes through one shared [`Scene`] handle.

use grid_localizer::camera::{self, Intrinsics};
use grid_localizer::corners::PolarLine;
use grid_localizer::grid::GridOptions;
use grid_localizer::image::ImageU8;
use grid_localizer::vision::{LineDetector, PointTracker};
use nalgebra::{Isometry3, Point2, Point3, Translation3, UnitQuaternion, Vector2, Vector3};
use std::cell::RefCell;
use std::rc::Rc;

pub const KMTX: [f64; 9] = [400.0, 0.0, 320.0, 0.0, 400.0, 240.0, 0.0, 0.0, 1.0];
pub const IMAGE_W: usize = 640;
pub const IMAGE_H: usize = 480;

pub fn intrinsics() -> Intrinsics {
    Intrinsics::from_k(&KMTX, IMAGE_W, IMAGE_H)
}

/// A 4 × 4 half-metre grid with hairline paint, small enough to sit fully
/// inside the view from two metres up. The junction corner clusters
/// collapse to sub-pixel size, so line crossings stand in for detections.
pub fn small_grid() -> GridOptions {
    GridOptions {
        width: 4,
        height: 4,
        spacing: 0.5,
        inner_line_thickness: 0.002,
        outer_line_thickness: 0.002,
        boundary_padding: 0.25,
    }
}

/// Camera at `(x, y, height)` looking straight down, optical x along
/// world x.
pub fn downward_pose(x: f64, y: f64, height: f64) -> Isometry3<f64> {
    let rot = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI);
    Isometry3::from_parts(Translation3::new(x, y, height), rot)
}

/// The fakes never read pixels; any buffer of the right shape will do.
pub fn blank_frame() -> Vec<u8> {
    vec![0u8; IMAGE_W * IMAGE_H]
}

pub fn image_of(buffer: &[u8]) -> ImageU8<'_> {
    ImageU8 {
        w: IMAGE_W,
        h: IMAGE_H,
        stride: IMAGE_W,
        data: buffer,
    }
}

/// Polar line through two pixel points.
pub fn polar_through(a: &Point2<f64>, b: &Point2<f64>) -> PolarLine {
    let d = b - a;
    let mut n = Vector2::new(d.y, -d.x).normalize();
    let mut rho = n.x * a.x + n.y * a.y;
    if rho < 0.0 {
        rho = -rho;
        n = -n;
    }
    PolarLine::new(rho, n.y.atan2(n.x))
}

/// Ground truth shared by both fakes.
pub struct Scene {
    /// True camera pose of the frame being processed.
    pub pose: Isometry3<f64>,
    /// True camera pose of the previous frame (tracking reference).
    pub prev_pose: Isometry3<f64>,
    /// Whether the painted grid is visible to the line detector.
    pub lines_visible: bool,
}

impl Scene {
    /// Move the true camera; the old pose becomes the tracking reference.
    pub fn advance_to(&mut self, pose: Isometry3<f64>) {
        self.prev_pose = self.pose;
        self.pose = pose;
    }
}

pub type SceneHandle = Rc<RefCell<Scene>>;

pub fn scene(initial_pose: Isometry3<f64>) -> SceneHandle {
    Rc::new(RefCell::new(Scene {
        pose: initial_pose,
        prev_pose: initial_pose,
        lines_visible: true,
    }))
}

/// Line detector fake: projects every grid line of the true pose.
pub struct GridLineFake {
    pub scene: SceneHandle,
    pub grid: GridOptions,
    pub k: Intrinsics,
}

impl LineDetector for GridLineFake {
    fn detect_lines(&mut self, _image: &ImageU8<'_>) -> Vec<PolarLine> {
        let scene = self.scene.borrow();
        if !scene.lines_visible {
            return Vec::new();
        }
        let cam_from_world = scene.pose.inverse();
        let half_x = self.grid.width as f64 * self.grid.spacing / 2.0;
        let half_y = self.grid.height as f64 * self.grid.spacing / 2.0;

        let mut lines = Vec::new();
        for xi in 0..=self.grid.width {
            let x = -half_x + xi as f64 * self.grid.spacing;
            let ends = [Point3::new(x, -half_y, 0.0), Point3::new(x, half_y, 0.0)];
            push_line(&mut lines, &ends, &cam_from_world, &self.k);
        }
        for yi in 0..=self.grid.height {
            let y = -half_y + yi as f64 * self.grid.spacing;
            let ends = [Point3::new(-half_x, y, 0.0), Point3::new(half_x, y, 0.0)];
            push_line(&mut lines, &ends, &cam_from_world, &self.k);
        }
        lines
    }
}

fn push_line(
    out: &mut Vec<PolarLine>,
    ends: &[Point3<f64>; 2],
    cam_from_world: &Isometry3<f64>,
    k: &Intrinsics,
) {
    let a = camera::project(&ends[0], cam_from_world, k);
    let b = camera::project(&ends[1], cam_from_world, k);
    if let (Some(a), Some(b)) = (a, b) {
        out.push(polar_through(&a, &b));
    }
}

/// Point tracker fake: exact optical flow of the ground plane between the
/// previous and current true pose, plus a pixel lattice for detection.
pub struct PlaneFlowFake {
    pub scene: SceneHandle,
    pub k: Intrinsics,
}

impl PointTracker for PlaneFlowFake {
    fn track(&mut self, _image: &ImageU8<'_>, points: &[Point2<f64>]) -> Vec<Option<Point2<f64>>> {
        let scene = self.scene.borrow();
        let cam_from_world = scene.pose.inverse();
        points
            .iter()
            .map(|px| {
                camera::ray_to_plane(px, &scene.prev_pose, &self.k)
                    .and_then(|w| camera::project(&w, &cam_from_world, &self.k))
            })
            .collect()
    }

    fn detect(
        &mut self,
        _image: &ImageU8<'_>,
        avoid: &[Point2<f64>],
        count: usize,
    ) -> Vec<Point2<f64>> {
        let step = 48.0;
        let mut out = Vec::new();
        let mut y = step;
        while y < IMAGE_H as f64 && out.len() < count {
            let mut x = step;
            while x < IMAGE_W as f64 && out.len() < count {
                let px = Point2::new(x, y);
                if !avoid.iter().any(|p| (p - px).norm() < 10.0) {
                    out.push(px);
                }
                x += step;
            }
            y += step;
        }
        out
    }
}
