// tandem_core/src/features/scalar.rs

use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Vector2};

use crate::dynamics::ModelKind;
use crate::error::PlannerError;
use crate::features::vectorized::{GaussianKernel, DIST_REG};
use crate::features::{check_params, Feature, HumanFeature};
use crate::trajectory::Trajectory;
use crate::types::Control;

// Scalar features accumulate over the whole horizon and feed the
// LinearCost / HumanCost compositions. The human-capable ones chain the
// exact second derivative of their integrand through the position (or
// control) sensitivities; for the linear double-integrator human model this
// is the complete Hessian.

// --- Human-Side Features (Hessian-Bearing) ---

/// Accumulated squared human velocity, read from the velocity components of
/// the double-integrator state layout.
#[derive(Debug, Clone)]
pub struct HumanVelCost;

impl HumanVelCost {
    // Undefined for state layouts without velocity rows. The pairing is
    // reachable from scenario input, so it surfaces as a typed error.
    fn require_velocity_states(human: &Trajectory) -> Result<(), PlannerError> {
        if human.kind() != ModelKind::ConstAcc {
            return Err(PlannerError::invalid_config(
                "HumanVel requires a velocity-bearing human state layout (ConstAcc)",
            ));
        }
        Ok(())
    }

    fn velocity_jacobian(human: &Trajectory) -> Result<DMatrix<f64>, PlannerError> {
        Self::require_velocity_states(human)?;
        let ju = human.ju()?;
        let n_x = human.state_size();
        let cols = human.traj_control_size();

        let mut jv = DMatrix::zeros(2 * human.horizon(), cols);
        for t in 0..human.horizon() {
            jv.view_mut((2 * t, 0), (2, cols))
                .copy_from(&ju.view((t * n_x + 2, 0), (2, cols)));
        }
        Ok(jv)
    }
}

impl Feature for HumanVelCost {
    fn name(&self) -> &'static str {
        "HumanVel"
    }

    fn compute(&self, _robot: &Trajectory, human: &Trajectory) -> Result<f64, PlannerError> {
        Self::require_velocity_states(human)?;
        let x = human.x()?;
        let n_x = human.state_size();

        let mut cost = 0.0;
        for t in 0..human.horizon() {
            let s = t * n_x;
            cost += x[s + 2] * x[s + 2] + x[s + 3] * x[s + 3];
        }
        Ok(cost)
    }

    fn grad_ur(&self, robot: &Trajectory, _human: &Trajectory) -> Result<Control, PlannerError> {
        Ok(Control::zeros(robot.traj_control_size()))
    }

    fn grad_uh(&self, _robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        Self::require_velocity_states(human)?;
        let x = human.x()?;
        let ju = human.ju()?;
        let n_x = human.state_size();
        let cols = human.traj_control_size();

        let mut grad = Control::zeros(cols);
        for t in 0..human.horizon() {
            let s = t * n_x;
            let v = Vector2::new(x[s + 2], x[s + 3]);
            let jv = ju.view((s + 2, 0), (2, cols));
            grad += jv.transpose() * (2.0 * v);
        }
        Ok(grad)
    }

    fn as_human(&self) -> Option<&dyn HumanFeature> {
        Some(self)
    }
}

impl HumanFeature for HumanVelCost {
    fn hessian_uh(
        &self,
        _robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let jv = Self::velocity_jacobian(human)?;
        Ok(jv.transpose() * jv * 2.0)
    }

    fn hessian_uh_ur(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        Ok(DMatrix::zeros(
            human.traj_control_size(),
            robot.traj_control_size(),
        ))
    }
}

/// Accumulated squared human control (acceleration for the double
/// integrator), over the first two control components of each step.
#[derive(Debug, Clone)]
pub struct HumanAccCost;

impl Feature for HumanAccCost {
    fn name(&self) -> &'static str {
        "HumanAcc"
    }

    fn compute(&self, _robot: &Trajectory, human: &Trajectory) -> Result<f64, PlannerError> {
        let u = human.u();
        let n_u = human.control_size();

        let mut cost = 0.0;
        for t in 0..human.horizon() {
            let s = t * n_u;
            cost += u[s] * u[s] + u[s + 1] * u[s + 1];
        }
        Ok(cost)
    }

    fn grad_ur(&self, robot: &Trajectory, _human: &Trajectory) -> Result<Control, PlannerError> {
        Ok(Control::zeros(robot.traj_control_size()))
    }

    fn grad_uh(&self, _robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        let u = human.u();
        let n_u = human.control_size();

        let mut grad = Control::zeros(human.traj_control_size());
        for t in 0..human.horizon() {
            let s = t * n_u;
            grad[s] = 2.0 * u[s];
            grad[s + 1] = 2.0 * u[s + 1];
        }
        Ok(grad)
    }

    fn as_human(&self) -> Option<&dyn HumanFeature> {
        Some(self)
    }
}

impl HumanFeature for HumanAccCost {
    fn hessian_uh(
        &self,
        _robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let n_u = human.control_size();
        let len = human.traj_control_size();

        let mut hess = DMatrix::zeros(len, len);
        for t in 0..human.horizon() {
            let s = t * n_u;
            hess[(s, s)] = 2.0;
            hess[(s + 1, s + 1)] = 2.0;
        }
        Ok(hess)
    }

    fn hessian_uh_ur(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        Ok(DMatrix::zeros(
            human.traj_control_size(),
            robot.traj_control_size(),
        ))
    }
}

/// Euclidean distance from the human's final position to a fixed goal. The
/// value is exact; derivatives regularize the distance denominator.
#[derive(Debug, Clone)]
pub struct HumanGoalCost {
    goal: Vector2<f64>,
}

impl HumanGoalCost {
    pub fn new(goal_x: f64, goal_y: f64) -> Self {
        Self {
            goal: Vector2::new(goal_x, goal_y),
        }
    }

    /// Final-position offset and regularized distance.
    fn terminal_offset(&self, human: &Trajectory) -> Result<(Vector2<f64>, f64), PlannerError> {
        let x = human.x()?;
        let last = human.traj_state_size() - human.state_size();
        let diff = Vector2::new(x[last] - self.goal[0], x[last + 1] - self.goal[1]);
        Ok((diff, diff.norm() + DIST_REG))
    }
}

impl Feature for HumanGoalCost {
    fn name(&self) -> &'static str {
        "HumanGoal"
    }

    fn compute(&self, _robot: &Trajectory, human: &Trajectory) -> Result<f64, PlannerError> {
        let (diff, _) = self.terminal_offset(human)?;
        Ok(diff.norm())
    }

    fn grad_ur(&self, robot: &Trajectory, _human: &Trajectory) -> Result<Control, PlannerError> {
        Ok(Control::zeros(robot.traj_control_size()))
    }

    fn grad_uh(&self, _robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        let (diff, d_reg) = self.terminal_offset(human)?;
        let ju = human.ju()?;
        let last = human.traj_state_size() - human.state_size();
        let cols = human.traj_control_size();

        let n_hat = diff / d_reg;
        let pos_rows = ju.view((last, 0), (2, cols));
        Ok(pos_rows.transpose() * n_hat)
    }

    fn as_human(&self) -> Option<&dyn HumanFeature> {
        Some(self)
    }
}

impl HumanFeature for HumanGoalCost {
    fn hessian_uh(
        &self,
        _robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let (diff, d_reg) = self.terminal_offset(human)?;
        let ju = human.ju()?;
        let last = human.traj_state_size() - human.state_size();
        let cols = human.traj_control_size();

        // Hessian of the distance: (I - n n^T) / d, regularized like the
        // gradient.
        let n_hat = DVector::from_vec(vec![diff[0] / d_reg, diff[1] / d_reg]);
        let m = (DMatrix::identity(2, 2) - &n_hat * n_hat.transpose()) / d_reg;
        let jp = ju.view((last, 0), (2, cols)).clone_owned();
        Ok(jp.transpose() * m * jp)
    }

    fn hessian_uh_ur(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        Ok(DMatrix::zeros(
            human.traj_control_size(),
            robot.traj_control_size(),
        ))
    }
}

/// Accumulated Gaussian collision penalty between the two agents.
#[derive(Debug, Clone)]
pub struct CollisionCost {
    kernel: GaussianKernel,
}

impl CollisionCost {
    pub fn new(radius: f64) -> Self {
        Self {
            kernel: GaussianKernel::new(radius, radius),
        }
    }
}

impl Feature for CollisionCost {
    fn name(&self) -> &'static str {
        "Collision"
    }

    fn compute(&self, robot: &Trajectory, human: &Trajectory) -> Result<f64, PlannerError> {
        let x_r = robot.x()?;
        let x_h = human.x()?;
        let n_xr = robot.state_size();
        let n_xh = human.state_size();

        let mut cost = 0.0;
        for t in 0..robot.horizon() {
            let dx = x_r[t * n_xr] - x_h[t * n_xh];
            let dy = x_r[t * n_xr + 1] - x_h[t * n_xh + 1];
            cost += self.kernel.cost(dx, dy);
        }
        Ok(cost)
    }

    fn grad_ur(&self, robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        let x_r = robot.x()?;
        let x_h = human.x()?;
        let ju = robot.ju()?;
        let n_xr = robot.state_size();
        let n_xh = human.state_size();
        let cols = robot.traj_control_size();

        let mut grad = Control::zeros(cols);
        for t in 0..robot.horizon() {
            let dx = x_r[t * n_xr] - x_h[t * n_xh];
            let dy = x_r[t * n_xr + 1] - x_h[t * n_xh + 1];
            let g = self.kernel.grad(dx, dy);
            let jp = ju.view((t * n_xr, 0), (2, cols));
            grad += jp.transpose() * g;
        }
        Ok(grad)
    }

    fn grad_uh(&self, robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        let x_r = robot.x()?;
        let x_h = human.x()?;
        let ju = human.ju()?;
        let n_xr = robot.state_size();
        let n_xh = human.state_size();
        let cols = human.traj_control_size();

        let mut grad = Control::zeros(cols);
        for t in 0..human.horizon() {
            let dx = x_h[t * n_xh] - x_r[t * n_xr];
            let dy = x_h[t * n_xh + 1] - x_r[t * n_xr + 1];
            let g = self.kernel.grad(dx, dy);
            let jp = ju.view((t * n_xh, 0), (2, cols));
            grad += jp.transpose() * g;
        }
        Ok(grad)
    }

    fn as_human(&self) -> Option<&dyn HumanFeature> {
        Some(self)
    }
}

impl HumanFeature for CollisionCost {
    fn hessian_uh(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let x_r = robot.x()?;
        let x_h = human.x()?;
        let ju = human.ju()?;
        let n_xr = robot.state_size();
        let n_xh = human.state_size();
        let cols = human.traj_control_size();

        let mut hess = DMatrix::zeros(cols, cols);
        for t in 0..human.horizon() {
            let dx = x_h[t * n_xh] - x_r[t * n_xr];
            let dy = x_h[t * n_xh + 1] - x_r[t * n_xr + 1];
            let m = self.kernel.hess(dx, dy);
            let jp = ju.view((t * n_xh, 0), (2, cols)).clone_owned();
            hess += jp.transpose() * m * &jp;
        }
        Ok(hess)
    }

    fn hessian_uh_ur(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let x_r = robot.x()?;
        let x_h = human.x()?;
        let ju_h = human.ju()?;
        let ju_r = robot.ju()?;
        let n_xr = robot.state_size();
        let n_xh = human.state_size();
        let h_cols = human.traj_control_size();
        let r_cols = robot.traj_control_size();

        // The offset enters the two agents with opposite signs, hence the
        // minus on the cross term.
        let mut hess = DMatrix::zeros(h_cols, r_cols);
        for t in 0..human.horizon() {
            let dx = x_h[t * n_xh] - x_r[t * n_xr];
            let dy = x_h[t * n_xh + 1] - x_r[t * n_xr + 1];
            let m = self.kernel.hess(dx, dy);
            let jp_h = ju_h.view((t * n_xh, 0), (2, h_cols)).clone_owned();
            let jp_r = ju_r.view((t * n_xr, 0), (2, r_cols)).clone_owned();
            hess -= jp_h.transpose() * m * jp_r;
        }
        Ok(hess)
    }
}

// --- Robot-Side Features (First Derivatives Only) ---

/// Accumulated squared robot control.
#[derive(Debug, Clone)]
pub struct RobotControlCost;

impl Feature for RobotControlCost {
    fn name(&self) -> &'static str {
        "RobotControl"
    }

    fn compute(&self, robot: &Trajectory, _human: &Trajectory) -> Result<f64, PlannerError> {
        Ok(robot.u().norm_squared())
    }

    fn grad_ur(&self, robot: &Trajectory, _human: &Trajectory) -> Result<Control, PlannerError> {
        Ok(robot.u() * 2.0)
    }

    fn grad_uh(&self, _robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        Ok(Control::zeros(human.traj_control_size()))
    }
}

/// Euclidean distance from the robot's final position to a fixed goal.
#[derive(Debug, Clone)]
pub struct RobotGoalCost {
    goal: Vector2<f64>,
}

impl RobotGoalCost {
    pub fn new(goal_x: f64, goal_y: f64) -> Self {
        Self {
            goal: Vector2::new(goal_x, goal_y),
        }
    }
}

impl Feature for RobotGoalCost {
    fn name(&self) -> &'static str {
        "RobotGoal"
    }

    fn compute(&self, robot: &Trajectory, _human: &Trajectory) -> Result<f64, PlannerError> {
        let x = robot.x()?;
        let last = robot.traj_state_size() - robot.state_size();
        let dx = x[last] - self.goal[0];
        let dy = x[last + 1] - self.goal[1];
        Ok((dx * dx + dy * dy).sqrt())
    }

    fn grad_ur(&self, robot: &Trajectory, _human: &Trajectory) -> Result<Control, PlannerError> {
        let x = robot.x()?;
        let ju = robot.ju()?;
        let last = robot.traj_state_size() - robot.state_size();
        let cols = robot.traj_control_size();

        let diff = Vector2::new(x[last] - self.goal[0], x[last + 1] - self.goal[1]);
        let n_hat = diff / (diff.norm() + DIST_REG);
        let pos_rows = ju.view((last, 0), (2, cols));
        Ok(pos_rows.transpose() * n_hat)
    }

    fn grad_uh(&self, _robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        Ok(Control::zeros(human.traj_control_size()))
    }
}

// --- Construction Registry ---

/// Builds a scalar feature from its registry name and a flat numeric
/// parameter list.
///
/// Known names: `"HumanVel"`, `"HumanAcc"`, `"RobotControl"` (no
/// parameters), `"Collision"` (interaction radius), `"HumanGoal"` and
/// `"RobotGoal"` (goal x, goal y).
pub fn create(feature_type: &str, params: &[f64]) -> Result<Arc<dyn Feature>, PlannerError> {
    match feature_type {
        "HumanVel" => Ok(Arc::new(HumanVelCost)),
        "HumanAcc" => Ok(Arc::new(HumanAccCost)),
        "HumanGoal" => {
            check_params(feature_type, params, 2)?;
            Ok(Arc::new(HumanGoalCost::new(params[0], params[1])))
        }
        "Collision" => {
            check_params(feature_type, params, 1)?;
            Ok(Arc::new(CollisionCost::new(params[0])))
        }
        "RobotControl" => Ok(Arc::new(RobotControlCost)),
        "RobotGoal" => {
            check_params(feature_type, params, 2)?;
            Ok(Arc::new(RobotGoalCost::new(params[0], params[1])))
        }
        other => Err(PlannerError::UnknownFeatureType(other.to_string())),
    }
}
