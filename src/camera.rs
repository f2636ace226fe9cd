//! Pinhole projection model shared by every estimator in the crate.
//!
//! Frame conventions follow `T_C_W` naming: `cam_from_world` maps world
//! points into the camera frame, `world_from_cam` is its inverse (the pose
//! of the camera in the world). The ground grid lives in the world z = 0
//! plane. All operations are pure functions of a pose plus intrinsics.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-12;

/// Pinhole intrinsics valid for one image size.
///
/// Rebuilt per frame from the calibration message so a changed image scale
/// or recalibration is picked up immediately.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
}

impl Intrinsics {
    /// Build from a row-major 3×3 K matrix and the image size it is valid for.
    pub fn from_k(k: &[f64; 9], width: usize, height: usize) -> Self {
        Self {
            fx: k[0],
            fy: k[4],
            cx: k[2],
            cy: k[5],
            width: width as f64,
            height: height as f64,
        }
    }

    /// Calibration rescaled for a frame downscaled by `scale`. The stored
    /// size is that of the delivered frame and stays untouched.
    pub fn with_image_scale(mut self, scale: f64) -> Self {
        let inv = 1.0 / scale;
        self.fx *= inv;
        self.fy *= inv;
        self.cx *= inv;
        self.cy *= inv;
        self
    }

    #[inline]
    pub fn contains(&self, px: &Point2<f64>) -> bool {
        px.x >= 0.0 && px.y >= 0.0 && px.x <= self.width && px.y <= self.height
    }
}

/// Project a world point into the image.
///
/// `None` when the point sits behind the camera (camera-frame z ≤ 0, with a
/// near-zero guard so no ±inf pixel is ever produced) or projects outside
/// the image bounds.
pub fn project(
    point: &Point3<f64>,
    cam_from_world: &Isometry3<f64>,
    intrinsics: &Intrinsics,
) -> Option<Point2<f64>> {
    let p = cam_from_world * point;
    if p.z <= EPS {
        return None;
    }
    let px = Point2::new(
        intrinsics.fx * (p.x / p.z) + intrinsics.cx,
        intrinsics.fy * (p.y / p.z) + intrinsics.cy,
    );
    intrinsics.contains(&px).then_some(px)
}

/// Back-project a pixel and intersect the ray with the world z = 0 plane.
///
/// `None` when the ray is parallel to the plane or the intersection lies
/// behind the camera along the ray (`dt ≤ 0`).
pub fn ray_to_plane(
    px: &Point2<f64>,
    world_from_cam: &Isometry3<f64>,
    intrinsics: &Intrinsics,
) -> Option<Point3<f64>> {
    let ray_cam = Vector3::new(
        (px.x - intrinsics.cx) / intrinsics.fx,
        (px.y - intrinsics.cy) / intrinsics.fy,
        1.0,
    );
    let origin = world_from_cam.translation.vector;
    let dir = world_from_cam.rotation * ray_cam;
    if dir.z.abs() <= EPS {
        return None;
    }
    // z(t) = origin.z + dir.z * t = 0
    let dt = -origin.z / dir.z;
    if dt <= 0.0 {
        return None;
    }
    Some(Point3::from(origin + dir * dt))
}

/// World-plane homography `R − (t·nᵀ)/|t_z|` for the ground normal
/// n = (0, 0, 1). Auxiliary rendering path only; the alignment loop never
/// uses it.
pub fn ground_homography(cam_from_world: &Isometry3<f64>) -> Option<Matrix3<f64>> {
    let r = cam_from_world.rotation.to_rotation_matrix();
    let t = cam_from_world.translation.vector;
    if t.z.abs() <= EPS {
        return None;
    }
    let n = Vector3::new(0.0, 0.0, 1.0);
    Some(r.matrix() - (t * n.transpose()) / t.z.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    fn downward_camera(height: f64) -> Isometry3<f64> {
        // Camera at (0, 0, height) looking straight down at the grid plane.
        let rot = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI);
        Isometry3::from_parts(Translation3::new(0.0, 0.0, height), rot)
    }

    fn test_intrinsics() -> Intrinsics {
        Intrinsics {
            fx: 400.0,
            fy: 400.0,
            cx: 320.0,
            cy: 240.0,
            width: 640.0,
            height: 480.0,
        }
    }

    #[test]
    fn project_ray_round_trip() {
        let world_from_cam = downward_camera(2.0);
        let cam_from_world = world_from_cam.inverse();
        let k = test_intrinsics();

        let point = Point3::new(0.3, -0.2, 0.0);
        let px = project(&point, &cam_from_world, &k).expect("point should be visible");
        let back = ray_to_plane(&px, &world_from_cam, &k).expect("ray should reach the plane");

        assert!((back - point).norm() < 1e-9, "round trip drifted: {back:?}");
    }

    #[test]
    fn image_scale_divides_calibration_only() {
        let k = test_intrinsics().with_image_scale(2.0);
        assert_eq!(k.fx, 200.0);
        assert_eq!(k.cx, 160.0);
        assert_eq!(k.width, 640.0);
    }

    #[test]
    fn project_rejects_points_behind_camera() {
        let cam_from_world = downward_camera(2.0).inverse();
        let k = test_intrinsics();
        // Above the camera: maps behind the downward-looking view.
        assert!(project(&Point3::new(0.0, 0.0, 5.0), &cam_from_world, &k).is_none());
    }

    #[test]
    fn project_rejects_out_of_bounds() {
        let cam_from_world = downward_camera(1.0).inverse();
        let k = test_intrinsics();
        assert!(project(&Point3::new(50.0, 0.0, 0.0), &cam_from_world, &k).is_none());
    }

    #[test]
    fn ray_to_plane_rejects_diverging_ray() {
        // Camera looking up: rays never reach the ground in front of it.
        let world_from_cam = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 2.0),
            UnitQuaternion::identity(),
        );
        let k = test_intrinsics();
        assert!(ray_to_plane(&Point2::new(320.0, 240.0), &world_from_cam, &k).is_none());
    }

    #[test]
    fn homography_requires_height() {
        let mut pose = downward_camera(2.0).inverse();
        assert!(ground_homography(&pose).is_some());
        pose.translation.vector.z = 0.0;
        assert!(ground_homography(&pose).is_none());
    }
}
