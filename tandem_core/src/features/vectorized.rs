// tandem_core/src/features/vectorized.rs

use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

use crate::error::PlannerError;
use crate::features::{check_params, VectorizedFeature};
use crate::trajectory::Trajectory;

/// Regularizer added to the goal-distance denominator so the gradient stays
/// finite exactly at the goal. The cost value itself is exact.
pub(crate) const DIST_REG: f64 = 1e-2;

// --- Gaussian Kernel Primitive ---

/// The shared 2-D radial basis: `exp(-((dx/a)^2 + (dy/b)^2))`.
///
/// Symmetric in the sign of the offset, which is what makes the collision
/// cost agent-order invariant.
#[derive(Debug, Clone, Copy)]
pub struct GaussianKernel {
    a: f64,
    b: f64,
}

impl GaussianKernel {
    pub fn new(a: f64, b: f64) -> Self {
        assert!(a > 0.0 && b > 0.0, "GaussianKernel: half-widths must be positive");
        Self { a, b }
    }

    pub fn cost(&self, dx: f64, dy: f64) -> f64 {
        let xs = dx / self.a;
        let ys = dy / self.b;
        (-(xs * xs + ys * ys)).exp()
    }

    /// Gradient w.r.t. the offset components.
    pub fn grad(&self, dx: f64, dy: f64) -> Vector2<f64> {
        let c = self.cost(dx, dy);
        Vector2::new(
            -2.0 * dx / (self.a * self.a) * c,
            -2.0 * dy / (self.b * self.b) * c,
        )
    }

    /// Hessian w.r.t. the offset components. Even in the offset sign, like
    /// the kernel itself.
    pub fn hess(&self, dx: f64, dy: f64) -> Matrix2<f64> {
        let c = self.cost(dx, dy);
        let a2 = self.a * self.a;
        let b2 = self.b * self.b;
        let cross = 4.0 * dx * dy / (a2 * b2) * c;
        Matrix2::new(
            (4.0 * dx * dx / (a2 * a2) - 2.0 / a2) * c,
            cross,
            cross,
            (4.0 * dy * dy / (b2 * b2) - 2.0 / b2) * c,
        )
    }
}

// --- Per-Timestep Features ---
// All features assume the two trajectories share one horizon; the
// probabilistic aggregator validates that once per call.

/// Collision avoidance: the Gaussian kernel applied to the time-aligned
/// robot-human position offset, with both half-widths set to the
/// interaction radius.
#[derive(Debug, Clone)]
pub struct Collision {
    kernel: GaussianKernel,
}

impl Collision {
    pub fn new(radius: f64) -> Self {
        Self {
            kernel: GaussianKernel::new(radius, radius),
        }
    }
}

impl VectorizedFeature for Collision {
    fn name(&self) -> &'static str {
        "Collision"
    }

    fn compute(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DVector<f64>, PlannerError> {
        let horizon = robot.horizon();
        let x_r = robot.x()?;
        let x_h = human.x()?;
        let n_xr = robot.state_size();
        let n_xh = human.state_size();

        let mut costs = DVector::zeros(horizon);
        for t in 0..horizon {
            let dx = x_r[t * n_xr] - x_h[t * n_xh];
            let dy = x_r[t * n_xr + 1] - x_h[t * n_xh + 1];
            costs[t] = self.kernel.cost(dx, dy);
        }
        Ok(costs)
    }

    fn grad_ur(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let horizon = robot.horizon();
        let x_r = robot.x()?;
        let x_h = human.x()?;
        let ju = robot.ju()?;
        let n_xr = robot.state_size();
        let n_xh = human.state_size();
        let cols = robot.traj_control_size();

        // Offset from the robot's side; row t chains the kernel gradient
        // through the robot's position sensitivity rows at t.
        let mut grad = DMatrix::zeros(horizon, cols);
        for t in 0..horizon {
            let dx = x_r[t * n_xr] - x_h[t * n_xh];
            let dy = x_r[t * n_xr + 1] - x_h[t * n_xh + 1];
            let g = self.kernel.grad(dx, dy);
            let pos_rows = ju.view((t * n_xr, 0), (2, cols));
            grad.row_mut(t).copy_from(&(g.transpose() * pos_rows));
        }
        Ok(grad)
    }

    fn grad_uh(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let horizon = human.horizon();
        let x_r = robot.x()?;
        let x_h = human.x()?;
        let ju = human.ju()?;
        let n_xr = robot.state_size();
        let n_xh = human.state_size();
        let cols = human.traj_control_size();

        // Same kernel, offset sign flipped to the human's side.
        let mut grad = DMatrix::zeros(horizon, cols);
        for t in 0..horizon {
            let dx = x_h[t * n_xh] - x_r[t * n_xr];
            let dy = x_h[t * n_xh + 1] - x_r[t * n_xr + 1];
            let g = self.kernel.grad(dx, dy);
            let pos_rows = ju.view((t * n_xh, 0), (2, cols));
            grad.row_mut(t).copy_from(&(g.transpose() * pos_rows));
        }
        Ok(grad)
    }
}

/// Human control effort: squared norm of the first two control components
/// at each timestep (acceleration magnitude for the double integrator).
#[derive(Debug, Clone)]
pub struct HumanEffort;

impl VectorizedFeature for HumanEffort {
    fn name(&self) -> &'static str {
        "HumanEffort"
    }

    fn compute(
        &self,
        _robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DVector<f64>, PlannerError> {
        let horizon = human.horizon();
        let n_uh = human.control_size();
        let u = human.u();

        let mut costs = DVector::zeros(horizon);
        for t in 0..horizon {
            let s = t * n_uh;
            costs[t] = u[s] * u[s] + u[s + 1] * u[s + 1];
        }
        Ok(costs)
    }

    fn grad_ur(
        &self,
        robot: &Trajectory,
        _human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        // No robot dependence.
        Ok(DMatrix::zeros(robot.horizon(), robot.traj_control_size()))
    }

    fn grad_uh(
        &self,
        _robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let horizon = human.horizon();
        let n_uh = human.control_size();
        let u = human.u();

        // Row t touches only the two control entries of step t.
        let mut grad = DMatrix::zeros(horizon, human.traj_control_size());
        for t in 0..horizon {
            let s = t * n_uh;
            grad[(t, s)] = 2.0 * u[s];
            grad[(t, s + 1)] = 2.0 * u[s + 1];
        }
        Ok(grad)
    }
}

/// Goal attainment: zero everywhere except the final timestep, which pays
/// the Euclidean distance from the human's final position to a fixed goal.
#[derive(Debug, Clone)]
pub struct HumanGoal {
    goal: Vector2<f64>,
}

impl HumanGoal {
    pub fn new(goal_x: f64, goal_y: f64) -> Self {
        Self {
            goal: Vector2::new(goal_x, goal_y),
        }
    }
}

impl VectorizedFeature for HumanGoal {
    fn name(&self) -> &'static str {
        "HumanGoal"
    }

    fn compute(
        &self,
        _robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DVector<f64>, PlannerError> {
        let x = human.x()?;
        let last = human.traj_state_size() - human.state_size();
        let dx = x[last] - self.goal[0];
        let dy = x[last + 1] - self.goal[1];

        let mut costs = DVector::zeros(human.horizon());
        costs[human.horizon() - 1] = (dx * dx + dy * dy).sqrt();
        Ok(costs)
    }

    fn grad_ur(
        &self,
        robot: &Trajectory,
        _human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        // No robot dependence.
        Ok(DMatrix::zeros(robot.horizon(), robot.traj_control_size()))
    }

    fn grad_uh(
        &self,
        _robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let x = human.x()?;
        let ju = human.ju()?;
        let horizon = human.horizon();
        let cols = human.traj_control_size();
        let last = human.traj_state_size() - human.state_size();

        let dx = x[last] - self.goal[0];
        let dy = x[last + 1] - self.goal[1];
        let d = (dx * dx + dy * dy).sqrt() + DIST_REG;
        let n_hat = Vector2::new(dx / d, dy / d);

        // Only the last row is nonzero.
        let mut grad = DMatrix::zeros(horizon, cols);
        let pos_rows = ju.view((last, 0), (2, cols));
        grad.row_mut(horizon - 1)
            .copy_from(&(n_hat.transpose() * pos_rows));
        Ok(grad)
    }
}

// --- Construction Registry ---

/// Builds a per-timestep feature from its registry name and a flat numeric
/// parameter list.
///
/// Known names: `"HumanEffort"` (no parameters), `"Collision"` (interaction
/// radius), `"HumanGoal"` (goal x, goal y).
pub fn create(
    feature_type: &str,
    params: &[f64],
) -> Result<Arc<dyn VectorizedFeature>, PlannerError> {
    match feature_type {
        "HumanEffort" => Ok(Arc::new(HumanEffort)),
        "Collision" => {
            check_params(feature_type, params, 1)?;
            Ok(Arc::new(Collision::new(params[0])))
        }
        "HumanGoal" => {
            check_params(feature_type, params, 2)?;
            Ok(Arc::new(HumanGoal::new(params[0], params[1])))
        }
        other => Err(PlannerError::UnknownFeatureType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::ModelKind;
    use crate::types::{Control, State};
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const FD_STEP: f64 = 1e-6;
    const GRAD_EPSILON: f64 = 1e-5;
    // The regularized denominator shifts the analytic goal gradient away
    // from the true derivative by O(reg / distance); tests keep the goal
    // far enough away that this slack covers it.
    const GOAL_GRAD_EPSILON: f64 = 5e-3;

    fn rolled_out(kind: ModelKind, horizon: usize, dt: f64, x0: &[f64], u: &[f64]) -> Trajectory {
        let mut traj = Trajectory::new(kind, horizon, dt).unwrap();
        traj.update(&State::from_vec(x0.to_vec()), &Control::from_vec(u.to_vec()));
        traj.compute_jacobian().unwrap();
        traj
    }

    fn random_pair(seed: u64, horizon: usize, dt: f64) -> (Trajectory, Trajectory) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut draw = |len: usize| -> Vec<f64> {
            (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
        };

        let robot = rolled_out(
            ModelKind::Differential,
            horizon,
            dt,
            &draw(3),
            &draw(horizon * 2),
        );
        let human = rolled_out(
            ModelKind::ConstAcc,
            horizon,
            dt,
            &draw(4),
            &draw(horizon * 2),
        );
        (robot, human)
    }

    fn fd_grad_wrt_human(
        feature: &dyn VectorizedFeature,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> DMatrix<f64> {
        let mut pert = human.clone();
        let u0 = human.u().clone();
        let mut fd = DMatrix::zeros(human.horizon(), human.traj_control_size());

        for j in 0..fd.ncols() {
            let mut u_plus = u0.clone();
            let mut u_minus = u0.clone();
            u_plus[j] += FD_STEP;
            u_minus[j] -= FD_STEP;

            pert.update_control(&u_plus);
            let c_plus = feature.compute(robot, &pert).unwrap();
            pert.update_control(&u_minus);
            let c_minus = feature.compute(robot, &pert).unwrap();

            fd.set_column(j, &((c_plus - c_minus) / (2.0 * FD_STEP)));
        }
        fd
    }

    fn fd_grad_wrt_robot(
        feature: &dyn VectorizedFeature,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> DMatrix<f64> {
        let mut pert = robot.clone();
        let u0 = robot.u().clone();
        let mut fd = DMatrix::zeros(robot.horizon(), robot.traj_control_size());

        for j in 0..fd.ncols() {
            let mut u_plus = u0.clone();
            let mut u_minus = u0.clone();
            u_plus[j] += FD_STEP;
            u_minus[j] -= FD_STEP;

            pert.update_control(&u_plus);
            let c_plus = feature.compute(&pert, human).unwrap();
            pert.update_control(&u_minus);
            let c_minus = feature.compute(&pert, human).unwrap();

            fd.set_column(j, &((c_plus - c_minus) / (2.0 * FD_STEP)));
        }
        fd
    }

    fn assert_matrix_eq(lhs: &DMatrix<f64>, rhs: &DMatrix<f64>, epsilon: f64) {
        assert_eq!(lhs.shape(), rhs.shape());
        for i in 0..lhs.nrows() {
            for j in 0..lhs.ncols() {
                assert_abs_diff_eq!(lhs[(i, j)], rhs[(i, j)], epsilon = epsilon);
            }
        }
    }

    #[test]
    fn registry_rejects_unknown_and_short_parameter_lists() {
        assert_eq!(
            create("Banana", &[]).unwrap_err(),
            PlannerError::UnknownFeatureType("Banana".to_string())
        );
        assert_eq!(
            create("Collision", &[]).unwrap_err(),
            PlannerError::InvalidFeatureParameters {
                feature: "Collision".to_string(),
                expected: 1,
                got: 0,
            }
        );
        assert_eq!(
            create("HumanGoal", &[4.0]).unwrap_err(),
            PlannerError::InvalidFeatureParameters {
                feature: "HumanGoal".to_string(),
                expected: 2,
                got: 1,
            }
        );
    }

    #[test]
    fn registry_builds_every_known_feature() {
        for (name, params) in [
            ("HumanEffort", vec![]),
            ("Collision", vec![0.5]),
            ("HumanGoal", vec![1.0, 2.0]),
        ] {
            let feature = create(name, &params).unwrap();
            assert_eq!(feature.name(), name);
        }
    }

    #[test]
    fn effort_is_zero_for_zero_control() {
        let horizon = 5;
        let robot = rolled_out(ModelKind::ConstAcc, horizon, 0.5, &[0.0; 4], &[0.0; 10]);
        let human = rolled_out(ModelKind::ConstAcc, horizon, 0.5, &[10.0, 0.0, 0.0, 0.0], &[0.0; 10]);

        let costs = HumanEffort.compute(&robot, &human).unwrap();
        assert_eq!(costs.iter().filter(|c| **c != 0.0).count(), 0);
    }

    #[test]
    fn effort_gradients_match_finite_differences() {
        let (robot, human) = random_pair(3, 5, 0.4);
        let feature = HumanEffort;

        let fd_h = fd_grad_wrt_human(&feature, &robot, &human);
        assert_matrix_eq(&feature.grad_uh(&robot, &human).unwrap(), &fd_h, GRAD_EPSILON);

        // Effort never depends on the robot.
        let grad_r = feature.grad_ur(&robot, &human).unwrap();
        assert_eq!(grad_r.iter().filter(|v| **v != 0.0).count(), 0);
    }

    #[test]
    fn collision_is_negligible_at_ten_times_the_radius() {
        // Robot at the origin, human ten meters away, radius two: the
        // kernel value is exp(-25) at every step.
        let horizon = 5;
        let robot = rolled_out(ModelKind::ConstAcc, horizon, 0.5, &[0.0; 4], &[0.0; 10]);
        let human = rolled_out(ModelKind::ConstAcc, horizon, 0.5, &[10.0, 0.0, 0.0, 0.0], &[0.0; 10]);

        let costs = Collision::new(2.0).compute(&robot, &human).unwrap();
        assert_eq!(costs.len(), horizon);
        for t in 0..horizon {
            assert!(costs[t] < 1e-9, "costs[{t}] = {}", costs[t]);
        }
    }

    #[test]
    fn collision_is_symmetric_under_agent_swap() {
        let (robot, human) = random_pair(5, 6, 0.3);
        let feature = Collision::new(1.5);

        let forward = feature.compute(&robot, &human).unwrap();
        let swapped = feature.compute(&human, &robot).unwrap();
        for t in 0..forward.len() {
            assert_abs_diff_eq!(forward[t], swapped[t], epsilon = 1e-12);
        }
    }

    #[test]
    fn collision_gradients_match_finite_differences() {
        // Overlapping starts so the kernel is far from saturated.
        let robot = rolled_out(
            ModelKind::Differential,
            4,
            0.4,
            &[0.3, -0.2, 0.5],
            &[0.4, 0.1, -0.3, 0.2, 0.5, -0.1, 0.2, 0.3],
        );
        let human = rolled_out(
            ModelKind::ConstAcc,
            4,
            0.4,
            &[-0.4, 0.5, 0.2, -0.3],
            &[0.1, -0.2, 0.3, 0.1, -0.4, 0.2, 0.0, 0.1],
        );
        let feature = Collision::new(1.0);

        let fd_r = fd_grad_wrt_robot(&feature, &robot, &human);
        assert_matrix_eq(&feature.grad_ur(&robot, &human).unwrap(), &fd_r, GRAD_EPSILON);

        let fd_h = fd_grad_wrt_human(&feature, &robot, &human);
        assert_matrix_eq(&feature.grad_uh(&robot, &human).unwrap(), &fd_h, GRAD_EPSILON);
    }

    #[test]
    fn goal_cost_is_terminal_only_and_exact() {
        let horizon = 5;
        let robot = rolled_out(ModelKind::ConstAcc, horizon, 0.5, &[0.0; 4], &[0.0; 10]);
        // Human parked at (10, 0); goal at (10, 3) -> distance 3.
        let human = rolled_out(ModelKind::ConstAcc, horizon, 0.5, &[10.0, 0.0, 0.0, 0.0], &[0.0; 10]);

        let costs = HumanGoal::new(10.0, 3.0).compute(&robot, &human).unwrap();
        for t in 0..horizon - 1 {
            assert_eq!(costs[t], 0.0);
        }
        assert_abs_diff_eq!(costs[horizon - 1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn goal_gradient_is_terminal_only_and_matches_finite_differences() {
        let (robot, human) = random_pair(9, 5, 0.4);
        // Keep the goal far away so the regularizer slack stays small.
        let feature = HumanGoal::new(12.0, -9.0);

        let grad = feature.grad_uh(&robot, &human).unwrap();
        for t in 0..human.horizon() - 1 {
            assert_eq!(grad.row(t).iter().filter(|v| **v != 0.0).count(), 0);
        }

        let fd = fd_grad_wrt_human(&feature, &robot, &human);
        assert_matrix_eq(&grad, &fd, GOAL_GRAD_EPSILON);
    }

    #[test]
    fn goal_gradient_is_finite_at_the_goal() {
        let horizon = 4;
        let robot = rolled_out(ModelKind::ConstAcc, horizon, 0.5, &[0.0; 4], &[0.0; 8]);
        let human = rolled_out(ModelKind::ConstAcc, horizon, 0.5, &[2.0, 1.0, 0.0, 0.0], &[0.0; 8]);

        // The human never moves, so its final position is exactly the goal.
        let feature = HumanGoal::new(2.0, 1.0);
        assert_eq!(feature.compute(&robot, &human).unwrap()[horizon - 1], 0.0);

        let grad = feature.grad_uh(&robot, &human).unwrap();
        assert!(grad.iter().all(|v| v.is_finite()));
    }
}
