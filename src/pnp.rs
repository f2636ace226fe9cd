//! Calibrated pose-from-points solving.
//!
//! The estimators only require the [`PnpSolver`] capability: given 3D↔2D
//! correspondences, intrinsics and a seed pose, produce a refined
//! `cam_from_world`. [`IterativePnp`] is the default implementation, a
//! seeded Gauss-Newton minimizer of pixel reprojection error with
//! Levenberg damping on SE(3). Hosts with a preferred solver (OpenCV,
//! EPnP, ...) can substitute their own through the trait.

use crate::camera::Intrinsics;
use log::debug;
use nalgebra::{
    Isometry3, Matrix6, Point2, Point3, Translation3, UnitQuaternion, Vector2, Vector3, Vector6,
};

/// Calibrated perspective pose solve from 3D↔2D correspondences.
pub trait PnpSolver {
    /// Solve for `cam_from_world` given ≥ 4 non-degenerate correspondences.
    ///
    /// `seed` accelerates and stabilizes convergence for iterative
    /// implementations; `None` leaves the starting point to the solver.
    fn solve(
        &self,
        world: &[Point3<f64>],
        image: &[Point2<f64>],
        intrinsics: &Intrinsics,
        seed: Option<&Isometry3<f64>>,
    ) -> Option<Isometry3<f64>>;
}

/// Seeded Gauss-Newton reprojection minimizer with Levenberg damping.
///
/// Parameterizes the update as a left-multiplicative `(δt, δω)` twist, so
/// each accepted step applies `T ← exp(δ)·T`. Points that fall behind the
/// camera during iteration are skipped; the solve fails if fewer than four
/// usable correspondences remain.
#[derive(Clone, Copy, Debug)]
pub struct IterativePnp {
    pub max_iterations: usize,
    /// Step-norm threshold that terminates the iteration.
    pub tolerance: f64,
}

impl Default for IterativePnp {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 1e-10,
        }
    }
}

const MIN_CORRESPONDENCES: usize = 4;
const DEPTH_EPS: f64 = 1e-9;

struct NormalEquations {
    hessian: Matrix6<f64>,
    gradient: Vector6<f64>,
    cost: f64,
    used: usize,
}

fn accumulate(
    world: &[Point3<f64>],
    image: &[Point2<f64>],
    k: &Intrinsics,
    pose: &Isometry3<f64>,
) -> NormalEquations {
    let mut hessian = Matrix6::zeros();
    let mut gradient = Vector6::zeros();
    let mut cost = 0.0;
    let mut used = 0;

    for (pw, px) in world.iter().zip(image) {
        let p = pose * pw;
        if p.z <= DEPTH_EPS {
            continue;
        }
        let inv_z = 1.0 / p.z;
        let u = k.fx * p.x * inv_z + k.cx;
        let v = k.fy * p.y * inv_z + k.cy;
        let r = Vector2::new(u - px.x, v - px.y);

        // d(u,v)/dp for the pinhole model.
        let du = Vector3::new(k.fx * inv_z, 0.0, -k.fx * p.x * inv_z * inv_z);
        let dv = Vector3::new(0.0, k.fy * inv_z, -k.fy * p.y * inv_z * inv_z);
        // dp/dδ = [I | -[p]×] for the left-multiplicative twist.
        let p_hat = Vector3::new(p.x, p.y, p.z).cross_matrix();

        let mut j_u = Vector6::zeros();
        let mut j_v = Vector6::zeros();
        for c in 0..3 {
            j_u[c] = du[c];
            j_v[c] = dv[c];
        }
        let du_rot = -du.transpose() * p_hat;
        let dv_rot = -dv.transpose() * p_hat;
        for c in 0..3 {
            j_u[3 + c] = du_rot[c];
            j_v[3 + c] = dv_rot[c];
        }

        hessian += j_u * j_u.transpose() + j_v * j_v.transpose();
        gradient += j_u * r.x + j_v * r.y;
        cost += r.norm_squared();
        used += 1;
    }

    NormalEquations {
        hessian,
        gradient,
        cost,
        used,
    }
}

fn apply_step(pose: &Isometry3<f64>, step: &Vector6<f64>) -> Isometry3<f64> {
    let dt = Translation3::new(step[0], step[1], step[2]);
    let dr = UnitQuaternion::from_scaled_axis(Vector3::new(step[3], step[4], step[5]));
    Isometry3::from_parts(dt, dr) * pose
}

impl PnpSolver for IterativePnp {
    fn solve(
        &self,
        world: &[Point3<f64>],
        image: &[Point2<f64>],
        intrinsics: &Intrinsics,
        seed: Option<&Isometry3<f64>>,
    ) -> Option<Isometry3<f64>> {
        if world.len() < MIN_CORRESPONDENCES || world.len() != image.len() {
            return None;
        }

        let mut pose = seed.copied().unwrap_or_else(Isometry3::identity);
        let mut lambda = 1e-3;
        let mut current = accumulate(world, image, intrinsics, &pose);
        if current.used < MIN_CORRESPONDENCES {
            debug!(
                "IterativePnp::solve seed leaves only {} usable points",
                current.used
            );
            return None;
        }

        for _ in 0..self.max_iterations {
            let mut stepped = false;
            // A few damping retries per outer iteration.
            for _ in 0..5 {
                let mut damped = current.hessian;
                for d in 0..6 {
                    damped[(d, d)] += lambda * current.hessian[(d, d)].max(1e-12);
                }
                let Some(chol) = damped.cholesky() else {
                    lambda *= 10.0;
                    continue;
                };
                let step = chol.solve(&(-current.gradient));
                let candidate = apply_step(&pose, &step);
                let next = accumulate(world, image, intrinsics, &candidate);

                if next.used >= MIN_CORRESPONDENCES && next.cost < current.cost {
                    let converged = step.norm() < self.tolerance;
                    pose = candidate;
                    current = next;
                    lambda = (lambda * 0.5).max(1e-12);
                    stepped = true;
                    if converged {
                        return Some(pose);
                    }
                    break;
                }
                lambda *= 10.0;
            }
            if !stepped {
                // Damping exhausted: already at (or numerically stuck near)
                // the minimum for this data.
                break;
            }
        }

        Some(pose)
    }
}
