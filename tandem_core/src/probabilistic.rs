// tandem_core/src/probabilistic.rs

use std::sync::Arc;

use nalgebra::DVector;
use tracing::debug;

use crate::belief::{BeliefModel, ScalarBeliefModel};
use crate::costs::{LinearCost, VectorizedCost};
use crate::error::PlannerError;
use crate::trajectory::Trajectory;
use crate::types::Control;

/// Total cost and the three gradients the optimizer steps on.
#[derive(Debug, Clone)]
pub struct CostOutput {
    pub cost: f64,
    /// Gradient w.r.t. the robot control, length `T*nUr`.
    pub grad_ur: Control,
    /// Gradient w.r.t. the human-priority hypothesis control, `T*nUh`.
    pub grad_hp: Control,
    /// Gradient w.r.t. the robot-priority hypothesis control, `T*nUh`.
    pub grad_rp: Control,
}

fn check_horizons(robot: &Trajectory, others: &[&Trajectory]) -> Result<(), PlannerError> {
    for traj in others {
        if traj.horizon() != robot.horizon() {
            return Err(PlannerError::invalid_config(
                "all trajectories in a probabilistic cost must share one horizon",
            ));
        }
    }
    Ok(())
}

// --- Full Form: Per-Timestep Belief With Robot-Control Sensitivity ---

/// Belief-weighted mixture of the interaction cost under the two intent
/// hypotheses.
///
/// Non-interactive features contribute once; interactive per-timestep
/// features are evaluated against each hypothesis and mixed by the belief
/// probability timestep by timestep. Because the belief model also reports
/// how the probability moves with the robot plan, the robot gradient
/// internalizes the effect of robot behavior on the human's inferred
/// intent.
///
/// The per-hypothesis weighted cost vectors of the most recent call are
/// retained for diagnostics only; correctness never depends on them.
#[derive(Debug, Clone)]
pub struct ProbabilisticCost {
    non_interactive: LinearCost,
    interactive: VectorizedCost,
    belief: Arc<dyn BeliefModel>,
    last_costs_hp: Option<DVector<f64>>,
    last_costs_rp: Option<DVector<f64>>,
}

impl ProbabilisticCost {
    pub fn new(
        non_interactive: LinearCost,
        interactive: VectorizedCost,
        belief: Arc<dyn BeliefModel>,
    ) -> Self {
        Self {
            non_interactive,
            interactive,
            belief,
            last_costs_hp: None,
            last_costs_rp: None,
        }
    }

    /// The weighted per-hypothesis cost vectors of the most recent
    /// `compute` call, `(costs_hp, costs_rp)`.
    pub fn last_hypothesis_costs(&self) -> Option<(&DVector<f64>, &DVector<f64>)> {
        self.last_costs_hp.as_ref().zip(self.last_costs_rp.as_ref())
    }

    /// Evaluates the mixture cost and all three gradients.
    ///
    /// `human_ref` is the reference/predicted human trajectory handed to
    /// the belief model; it is supplied explicitly by the caller and is
    /// never silently aliased to one of the hypotheses.
    pub fn compute(
        &mut self,
        robot: &Trajectory,
        human_hp: &Trajectory,
        human_rp: &Trajectory,
        human_ref: &Trajectory,
        comm_action: i32,
        comm_time: f64,
        current_time: f64,
    ) -> Result<CostOutput, PlannerError> {
        check_horizons(robot, &[human_hp, human_rp, human_ref])?;
        let horizon = robot.horizon();

        // Hypothesis-independent part, evaluated once.
        let mut cost = self.non_interactive.compute(robot, human_hp)?;

        // Weighted per-timestep cost of each hypothesis.
        let costs_hp = self.interactive.compute(robot, human_hp)?;
        let costs_rp = self.interactive.compute(robot, human_rp)?;

        let update =
            self.belief
                .update_belief(robot, human_ref, comm_action, comm_time, current_time)?;
        assert_eq!(update.prob_hp.len(), horizon, "belief probability length");
        assert_eq!(
            update.jac_ur.shape(),
            (horizon, robot.traj_control_size()),
            "belief Jacobian shape"
        );

        let prob_hp = update.prob_hp;
        let prob_rp = DVector::from_element(horizon, 1.0) - &prob_hp;

        cost += prob_hp.dot(&costs_hp) + prob_rp.dot(&costs_rp);

        // Robot gradient, three terms: the non-interactive features' own
        // gradient, the belief shift induced by the robot plan, and the
        // probability-weighted per-hypothesis gradients.
        let mut grad_ur = self.non_interactive.grad_ur(robot, human_hp)?;
        grad_ur += update.jac_ur.transpose() * (&costs_hp - &costs_rp);
        grad_ur += self.interactive.grad_ur(robot, human_hp)?.transpose() * &prob_hp;
        grad_ur += self.interactive.grad_ur(robot, human_rp)?.transpose() * &prob_rp;

        // Each hypothesis's human control only reaches its own evaluation.
        let grad_hp = self.interactive.grad_uh(robot, human_hp)?.transpose() * &prob_hp;
        let grad_rp = self.interactive.grad_uh(robot, human_rp)?.transpose() * &prob_rp;

        debug!(
            cost,
            cost_hp = costs_hp.sum(),
            cost_rp = costs_rp.sum(),
            "probabilistic cost evaluated"
        );

        self.last_costs_hp = Some(costs_hp);
        self.last_costs_rp = Some(costs_rp);

        Ok(CostOutput {
            cost,
            grad_ur,
            grad_hp,
            grad_rp,
        })
    }
}

// --- Simplified Form: One Scalar Probability ---

/// The simplified aggregator: a single scalar probability weights the
/// summed hypothesis costs, and the belief has no robot-control
/// dependence, so the belief-shift gradient term vanishes by construction.
#[derive(Debug, Clone)]
pub struct ProbabilisticCostSimplified {
    non_interactive: LinearCost,
    interactive: VectorizedCost,
    belief: Arc<dyn ScalarBeliefModel>,
    last_costs_hp: Option<DVector<f64>>,
    last_costs_rp: Option<DVector<f64>>,
}

impl ProbabilisticCostSimplified {
    pub fn new(
        non_interactive: LinearCost,
        interactive: VectorizedCost,
        belief: Arc<dyn ScalarBeliefModel>,
    ) -> Self {
        Self {
            non_interactive,
            interactive,
            belief,
            last_costs_hp: None,
            last_costs_rp: None,
        }
    }

    pub fn last_hypothesis_costs(&self) -> Option<(&DVector<f64>, &DVector<f64>)> {
        self.last_costs_hp.as_ref().zip(self.last_costs_rp.as_ref())
    }

    pub fn compute(
        &mut self,
        robot: &Trajectory,
        human_hp: &Trajectory,
        human_rp: &Trajectory,
        comm_action: i32,
        comm_time: f64,
        current_time: f64,
    ) -> Result<CostOutput, PlannerError> {
        check_horizons(robot, &[human_hp, human_rp])?;
        let horizon = robot.horizon();

        let p = self.belief.update_belief(comm_action, comm_time, current_time);
        debug_assert!((0.0..=1.0).contains(&p));

        let mut cost = self.non_interactive.compute(robot, human_hp)?;
        let costs_hp = self.interactive.compute(robot, human_hp)?;
        let costs_rp = self.interactive.compute(robot, human_rp)?;

        cost += p * costs_hp.sum() + (1.0 - p) * costs_rp.sum();

        let prob_hp = DVector::from_element(horizon, p);
        let prob_rp = DVector::from_element(horizon, 1.0 - p);

        let mut grad_ur = self.non_interactive.grad_ur(robot, human_hp)?;
        grad_ur += self.interactive.grad_ur(robot, human_hp)?.transpose() * &prob_hp;
        grad_ur += self.interactive.grad_ur(robot, human_rp)?.transpose() * &prob_rp;

        let grad_hp = self.interactive.grad_uh(robot, human_hp)?.transpose() * &prob_hp;
        let grad_rp = self.interactive.grad_uh(robot, human_rp)?.transpose() * &prob_rp;

        debug!(cost, p, "simplified probabilistic cost evaluated");

        self.last_costs_hp = Some(costs_hp);
        self.last_costs_rp = Some(costs_rp);

        Ok(CostOutput {
            cost,
            grad_ur,
            grad_hp,
            grad_rp,
        })
    }
}
