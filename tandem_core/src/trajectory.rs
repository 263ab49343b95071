// tandem_core/src/trajectory.rs

use std::sync::Arc;

use nalgebra::DMatrix;
use tracing::debug;

use crate::dynamics::{DynamicsModel, ModelKind};
use crate::error::PlannerError;
use crate::types::{Control, State};

/// Freshness of a trajectory's derived buffers.
///
/// The predicted states `x` and the sensitivity matrix `Ju` are only valid
/// for the `(x0, u)` they were computed from. Any mutation drops back to
/// `RolledOut` (states fresh, Jacobian stale), so a stale read is a typed
/// error instead of a silently wrong gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// Nothing computed yet; `x` and `Ju` are meaningless zeros.
    Uninitialized,
    /// `x` matches the current `(x0, u)`; `Ju` does not.
    RolledOut,
    /// Both `x` and `Ju` match the current `(x0, u)`.
    JacobianCurrent,
}

/// A discretized agent trajectory: initial state, flattened control sequence,
/// and the derived predicted states and control-sensitivity matrix.
///
/// The state sequence `x` (length `T*nX`) is the exact rollout of `u`
/// (length `T*nU`) from `x0` under the model selected at construction.
/// `Ju` is the full Jacobian `∂x/∂u` of shape `(T*nX) × (T*nU)`, laid out in
/// `nX × nU` blocks: block `(t1, t2)` is the sensitivity of the state at
/// `t1` to the control applied at `t2`.
///
/// Cloning deep-copies every buffer; the dynamics object itself is immutable
/// and shared between clones.
#[derive(Debug, Clone)]
pub struct Trajectory {
    x0: State,
    u: Control,
    x: State,
    ju: DMatrix<f64>,
    kind: ModelKind,
    horizon: usize,
    dt: f64,
    model: Arc<dyn DynamicsModel>,
    sync: SyncState,
}

impl Trajectory {
    /// Allocates a zeroed trajectory for the given model tag.
    ///
    /// The buffers are sized from the model's state/control dimensions; no
    /// rollout is performed, so `x`/`Ju` reads fail until `update` (and
    /// `compute_jacobian`) have been called.
    pub fn new(kind: ModelKind, horizon: usize, dt: f64) -> Result<Self, PlannerError> {
        if horizon == 0 {
            return Err(PlannerError::invalid_config("trajectory horizon must be >= 1"));
        }
        if dt <= 0.0 {
            return Err(PlannerError::invalid_config("trajectory dt must be positive"));
        }

        let model = kind.build(dt);
        let n_x = model.state_dim();
        let n_u = model.control_dim();

        Ok(Self {
            x0: State::zeros(n_x),
            u: Control::zeros(horizon * n_u),
            x: State::zeros(horizon * n_x),
            ju: DMatrix::zeros(horizon * n_x, horizon * n_u),
            kind,
            horizon,
            dt,
            model,
            sync: SyncState::Uninitialized,
        })
    }

    // --- Dimension accessors (always valid) ---

    pub fn state_size(&self) -> usize {
        self.model.state_dim()
    }

    pub fn control_size(&self) -> usize {
        self.model.control_dim()
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Length of the flattened state sequence, `T * nX`.
    pub fn traj_state_size(&self) -> usize {
        self.horizon * self.state_size()
    }

    /// Length of the flattened control sequence, `T * nU`.
    pub fn traj_control_size(&self) -> usize {
        self.horizon * self.control_size()
    }

    // --- Raw inputs (always valid) ---

    pub fn x0(&self) -> &State {
        &self.x0
    }

    pub fn u(&self) -> &Control {
        &self.u
    }

    // --- Derived buffers (checked) ---

    /// The predicted state sequence. Fails until a rollout has been run.
    pub fn x(&self) -> Result<&State, PlannerError> {
        if self.sync == SyncState::Uninitialized {
            return Err(PlannerError::StaleTrajectory { what: "x" });
        }
        Ok(&self.x)
    }

    /// The control-sensitivity matrix `∂x/∂u`. Fails until
    /// `compute_jacobian` has been run for the current `(x0, u)`.
    pub fn ju(&self) -> Result<&DMatrix<f64>, PlannerError> {
        if self.sync != SyncState::JacobianCurrent {
            return Err(PlannerError::StaleTrajectory { what: "Ju" });
        }
        Ok(&self.ju)
    }

    // --- Mutation ---

    /// Assigns a new initial state and control sequence, then rolls the
    /// states out. Any previously computed `Ju` becomes stale.
    pub fn update(&mut self, x0: &State, u: &Control) {
        assert_eq!(x0.len(), self.state_size(), "Trajectory::update: x0 size");
        assert_eq!(u.len(), self.traj_control_size(), "Trajectory::update: u size");

        self.x0.copy_from(x0);
        self.u.copy_from(u);
        self.rollout();
    }

    /// Assigns a new control sequence keeping the current initial state.
    pub fn update_control(&mut self, u: &Control) {
        assert_eq!(u.len(), self.traj_control_size(), "Trajectory::update_control: u size");

        self.u.copy_from(u);
        self.rollout();
    }

    fn rollout(&mut self) {
        let n_x = self.state_size();

        let mut x_last = self.x0.clone();
        for t in 0..self.horizon {
            let u_t = self.control_at(t);
            let x_next = self.model.forward_dyn(&x_last, &u_t);
            self.x.rows_mut(t * n_x, n_x).copy_from(&x_next);
            x_last = x_next;
        }

        self.sync = SyncState::RolledOut;
    }

    /// Fills `Ju` with the exact chain-rule sensitivity of every state to
    /// every control.
    ///
    /// Block `(t, t)` is the local control Jacobian `B_t` evaluated at the
    /// state entering step `t`; block `(t1, t2)` for `t1 > t2` is
    /// `A_{t1} · Ju[t1-1, t2]` with `A_{t1}` the local state Jacobian at
    /// step `t1`. Blocks with `t1 < t2` stay zero: a later control cannot
    /// affect an earlier state. This is `O(T²)` block multiplications and is
    /// the dominant cost of each optimizer iteration.
    pub fn compute_jacobian(&mut self) -> Result<(), PlannerError> {
        if self.sync == SyncState::Uninitialized {
            return Err(PlannerError::StaleTrajectory { what: "x" });
        }

        let n_x = self.state_size();
        let n_u = self.control_size();
        let horizon = self.horizon;

        // Local Jacobians once per step; both are evaluated at the state
        // entering step t and the control applied at t.
        let mut a_mats = Vec::with_capacity(horizon);
        let mut b_mats = Vec::with_capacity(horizon);
        for t in 0..horizon {
            let entering = self.state_entering(t);
            let u_t = self.control_at(t);
            a_mats.push(self.model.grad_x(&entering, &u_t));
            b_mats.push(self.model.grad_u(&entering, &u_t));
        }

        self.ju.fill(0.0);
        for t2 in 0..horizon {
            self.ju
                .view_mut((t2 * n_x, t2 * n_u), (n_x, n_u))
                .copy_from(&b_mats[t2]);

            for t1 in (t2 + 1)..horizon {
                let prev = self
                    .ju
                    .view(((t1 - 1) * n_x, t2 * n_u), (n_x, n_u))
                    .clone_owned();
                let block = &a_mats[t1] * &prev;
                self.ju
                    .view_mut((t1 * n_x, t2 * n_u), (n_x, n_u))
                    .copy_from(&block);
            }
        }

        self.sync = SyncState::JacobianCurrent;
        debug!(horizon, "recomputed trajectory control sensitivity");
        Ok(())
    }

    // --- Internal helpers ---

    /// State fed into step `t`: `x0` for the first step, else the predicted
    /// state at `t - 1`. Only meaningful once rolled out.
    fn state_entering(&self, t: usize) -> State {
        let n_x = self.state_size();
        if t == 0 {
            self.x0.clone()
        } else {
            self.x.rows((t - 1) * n_x, n_x).clone_owned()
        }
    }

    fn control_at(&self, t: usize) -> Control {
        let n_u = self.control_size();
        self.u.rows(t * n_u, n_u).clone_owned()
    }
}
