// tandem_core/src/dynamics.rs

use std::fmt::Debug;
use std::sync::Arc;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::types::{Control, State};

// --- DYNAMICS MODEL TRAIT ---
// Discrete-time state-transition model of one agent: `x_next = f(x, u)`.
/// A per-step dynamics model together with its local derivatives.
///
/// `forward_dyn` is the discrete map itself, with no integrator underneath,
/// and `grad_x`/`grad_u` must be the exact Jacobians of that map at the
/// given point. The trajectory rollout and the control-sensitivity
/// recursion are built entirely on these three calls.
///
/// Implementations are stateless beyond the fixed timestep and are shared
/// immutably (`Arc`) across every trajectory of the same model type.
pub trait DynamicsModel: Debug + Send + Sync {
    /// Length of the state vector `x` for this model.
    fn state_dim(&self) -> usize;

    /// Length of the control vector `u` for this model.
    fn control_dim(&self) -> usize;

    /// The fixed timestep this model was built with.
    fn dt(&self) -> f64;

    /// One exact step: `x_next = f(x, u)`.
    fn forward_dyn(&self, x: &State, u: &Control) -> State;

    /// Jacobian `A = ∂f/∂x` evaluated at `(x, u)`.
    fn grad_x(&self, x: &State, u: &Control) -> DMatrix<f64>;

    /// Jacobian `B = ∂f/∂u` evaluated at `(x, u)`.
    fn grad_u(&self, x: &State, u: &Control) -> DMatrix<f64>;
}

/// Serializable tag selecting one of the supported dynamics variants.
///
/// Scenario/config files name agents by this tag; `build` turns it into a
/// shareable model instance once the timestep is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Constant-acceleration double integrator: state `[px, py, vx, vy]`,
    /// control `[ax, ay]`. The usual model for a tracked human.
    ConstAcc,
    /// Differential-drive kinematics: state `[px, py, theta]`, control
    /// `[v, omega]`. The usual model for the robot base.
    Differential,
}

impl ModelKind {
    /// State dimension of the variant, available before a model is built.
    pub fn state_dim(self) -> usize {
        match self {
            ModelKind::ConstAcc => 4,
            ModelKind::Differential => 3,
        }
    }

    /// Control dimension of the variant.
    pub fn control_dim(self) -> usize {
        match self {
            ModelKind::ConstAcc => 2,
            ModelKind::Differential => 2,
        }
    }

    /// Builds the dynamics object for this tag with the given timestep.
    pub fn build(self, dt: f64) -> Arc<dyn DynamicsModel> {
        match self {
            ModelKind::ConstAcc => Arc::new(ConstAccDynamics::new(dt)),
            ModelKind::Differential => Arc::new(DifferentialDynamics::new(dt)),
        }
    }
}

// --- Constant-Acceleration Double Integrator ---

/// Double integrator driven by a piecewise-constant acceleration command.
#[derive(Debug, Clone)]
pub struct ConstAccDynamics {
    dt: f64,
}

impl ConstAccDynamics {
    pub fn new(dt: f64) -> Self {
        assert!(dt > 0.0, "ConstAccDynamics: dt must be positive");
        Self { dt }
    }

    const STATE_DIM: usize = 4;
    const CONTROL_DIM: usize = 2;
}

impl DynamicsModel for ConstAccDynamics {
    fn state_dim(&self) -> usize {
        Self::STATE_DIM
    }

    fn control_dim(&self) -> usize {
        Self::CONTROL_DIM
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    /// x = [px, py, vx, vy], u = [ax, ay]
    /// p' = p + v*dt + 0.5*a*dt², v' = v + a*dt
    fn forward_dyn(&self, x: &State, u: &Control) -> State {
        assert_eq!(x.len(), Self::STATE_DIM);
        assert_eq!(u.len(), Self::CONTROL_DIM);

        let dt = self.dt;
        let half_dt2 = 0.5 * dt * dt;

        State::from_vec(vec![
            x[0] + x[2] * dt + u[0] * half_dt2,
            x[1] + x[3] * dt + u[1] * half_dt2,
            x[2] + u[0] * dt,
            x[3] + u[1] * dt,
        ])
    }

    fn grad_x(&self, x: &State, u: &Control) -> DMatrix<f64> {
        assert_eq!(x.len(), Self::STATE_DIM);
        assert_eq!(u.len(), Self::CONTROL_DIM);

        // Identity plus the dt-scaled velocity coupling.
        let mut a_mat = DMatrix::identity(Self::STATE_DIM, Self::STATE_DIM);
        a_mat[(0, 2)] = self.dt; // dpx'/dvx
        a_mat[(1, 3)] = self.dt; // dpy'/dvy
        a_mat
    }

    fn grad_u(&self, x: &State, u: &Control) -> DMatrix<f64> {
        assert_eq!(x.len(), Self::STATE_DIM);
        assert_eq!(u.len(), Self::CONTROL_DIM);

        let dt = self.dt;
        let half_dt2 = 0.5 * dt * dt;

        let mut b_mat = DMatrix::zeros(Self::STATE_DIM, Self::CONTROL_DIM);
        b_mat[(0, 0)] = half_dt2; // dpx'/dax
        b_mat[(1, 1)] = half_dt2; // dpy'/day
        b_mat[(2, 0)] = dt; // dvx'/dax
        b_mat[(3, 1)] = dt; // dvy'/day
        b_mat
    }
}

// --- Differential-Drive Kinematics ---

/// Unicycle-style kinematic model commanded by linear and angular velocity.
#[derive(Debug, Clone)]
pub struct DifferentialDynamics {
    dt: f64,
}

impl DifferentialDynamics {
    pub fn new(dt: f64) -> Self {
        assert!(dt > 0.0, "DifferentialDynamics: dt must be positive");
        Self { dt }
    }

    const STATE_DIM: usize = 3;
    const CONTROL_DIM: usize = 2;
}

impl DynamicsModel for DifferentialDynamics {
    fn state_dim(&self) -> usize {
        Self::STATE_DIM
    }

    fn control_dim(&self) -> usize {
        Self::CONTROL_DIM
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    /// x = [px, py, theta], u = [v, omega]
    /// p' = p + v*(cos theta, sin theta)*dt, theta' = theta + omega*dt
    fn forward_dyn(&self, x: &State, u: &Control) -> State {
        assert_eq!(x.len(), Self::STATE_DIM);
        assert_eq!(u.len(), Self::CONTROL_DIM);

        let dt = self.dt;
        let theta = x[2];

        State::from_vec(vec![
            x[0] + u[0] * theta.cos() * dt,
            x[1] + u[0] * theta.sin() * dt,
            x[2] + u[1] * dt,
        ])
    }

    fn grad_x(&self, x: &State, u: &Control) -> DMatrix<f64> {
        assert_eq!(x.len(), Self::STATE_DIM);
        assert_eq!(u.len(), Self::CONTROL_DIM);

        let dt = self.dt;
        let theta = x[2];
        let v = u[0];

        // f1 = px + v*cos(theta)*dt -> df1/dtheta = -v*sin(theta)*dt
        // f2 = py + v*sin(theta)*dt -> df2/dtheta =  v*cos(theta)*dt
        let mut a_mat = DMatrix::identity(Self::STATE_DIM, Self::STATE_DIM);
        a_mat[(0, 2)] = -v * theta.sin() * dt;
        a_mat[(1, 2)] = v * theta.cos() * dt;
        a_mat
    }

    fn grad_u(&self, x: &State, u: &Control) -> DMatrix<f64> {
        assert_eq!(x.len(), Self::STATE_DIM);
        assert_eq!(u.len(), Self::CONTROL_DIM);

        let dt = self.dt;
        let theta = x[2];

        let mut b_mat = DMatrix::zeros(Self::STATE_DIM, Self::CONTROL_DIM);
        b_mat[(0, 0)] = theta.cos() * dt; // dpx'/dv
        b_mat[(1, 0)] = theta.sin() * dt; // dpy'/dv
        b_mat[(2, 1)] = dt; // dtheta'/domega
        b_mat
    }
}
