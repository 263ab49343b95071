// tandem_core/src/belief.rs

use std::fmt::Debug;

use nalgebra::{DMatrix, DVector};

use crate::error::PlannerError;
use crate::trajectory::Trajectory;
use crate::types::IntentType;

/// One belief evaluation over a planning horizon.
#[derive(Debug, Clone)]
pub struct BeliefUpdate {
    /// Probability of the human-priority hypothesis at each timestep,
    /// length `T`.
    pub prob_hp: DVector<f64>,
    /// Jacobian of `prob_hp` w.r.t. the robot's flattened control, shape
    /// `T x (T*nUr)`. Zero for models whose belief ignores the robot plan.
    pub jac_ur: DMatrix<f64>,
}

/// Full-form belief model consumed by the probabilistic cost.
///
/// The model owns whatever prior state it keeps between planning cycles;
/// within one cost evaluation every input is passed explicitly. `human_ref`
/// is the reference/predicted human trajectory the model conditions on,
/// supplied by the caller and distinct from either intent hypothesis.
pub trait BeliefModel: Debug + Send + Sync {
    fn update_belief(
        &self,
        robot: &Trajectory,
        human_ref: &Trajectory,
        comm_action: i32,
        comm_time: f64,
        current_time: f64,
    ) -> Result<BeliefUpdate, PlannerError>;
}

/// Simplified belief model: a single scalar probability derived from the
/// communication signal alone, with no trajectory dependence.
pub trait ScalarBeliefModel: Debug + Send + Sync {
    fn update_belief(&self, comm_action: i32, comm_time: f64, current_time: f64) -> f64;
}

/// Reference implementation of the simplified form.
///
/// A communicated intent pulls the belief to `p_comm` (or its complement)
/// and the excess over the neutral prior decays exponentially with time
/// constant `tau`. With nothing communicated the belief is the neutral 0.5.
#[derive(Debug, Clone)]
pub struct ExpDecayBelief {
    p_comm: f64,
    tau: f64,
}

impl ExpDecayBelief {
    pub fn new(p_comm: f64, tau: f64) -> Result<Self, PlannerError> {
        if !(0.5..=1.0).contains(&p_comm) {
            return Err(PlannerError::invalid_config(
                "ExpDecayBelief: p_comm must lie in [0.5, 1]",
            ));
        }
        if tau <= 0.0 {
            return Err(PlannerError::invalid_config(
                "ExpDecayBelief: tau must be positive",
            ));
        }
        Ok(Self { p_comm, tau })
    }
}

impl ScalarBeliefModel for ExpDecayBelief {
    fn update_belief(&self, comm_action: i32, comm_time: f64, current_time: f64) -> f64 {
        let target = match IntentType::from_comm_action(comm_action) {
            Some(IntentType::HumanPriority) => self.p_comm,
            Some(IntentType::RobotPriority) => 1.0 - self.p_comm,
            None => return 0.5,
        };

        // A communication timestamped in the future has not decayed at all.
        let elapsed = (current_time - comm_time).max(0.0);
        0.5 + (target - 0.5) * (-elapsed / self.tau).exp()
    }
}
