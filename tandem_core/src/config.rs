// tandem_core/src/config.rs

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::belief::{BeliefModel, ScalarBeliefModel};
use crate::costs::{LinearCost, VectorizedCost};
use crate::dynamics::ModelKind;
use crate::error::PlannerError;
use crate::features::{scalar, vectorized};
use crate::probabilistic::{ProbabilisticCost, ProbabilisticCostSimplified};
use crate::trajectory::Trajectory;

// --- Problem Dimensions ---

/// The horizon, step size and dynamics models a planning problem is posed
/// over. Both agents share `horizon` and `dt`; state and control widths
/// are implied by the model tags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProblemConfig {
    pub horizon: usize,
    pub dt: f64,
    pub robot_model: ModelKind,
    pub human_model: ModelKind,
}

impl ProblemConfig {
    pub fn validate(&self) -> Result<(), PlannerError> {
        if self.horizon == 0 {
            return Err(PlannerError::invalid_config("horizon must be at least 1"));
        }
        if self.dt <= 0.0 {
            return Err(PlannerError::invalid_config("dt must be positive"));
        }
        Ok(())
    }

    pub fn robot_trajectory(&self) -> Result<Trajectory, PlannerError> {
        Trajectory::new(self.robot_model, self.horizon, self.dt)
    }

    pub fn human_trajectory(&self) -> Result<Trajectory, PlannerError> {
        Trajectory::new(self.human_model, self.horizon, self.dt)
    }
}

// --- Cost Assembly ---

/// One feature entry in a cost table: registry name, weight, and the
/// flat parameter list the registry hands to the feature constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureSpec {
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub params: Vec<f64>,
}

/// The two feature tables of a probabilistic cost, plus the evaluation
/// mode shared by both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    #[serde(default)]
    pub non_interactive: Vec<FeatureSpec>,
    #[serde(default)]
    pub interactive: Vec<FeatureSpec>,
    #[serde(default)]
    pub parallel: bool,
}

impl CostConfig {
    fn build_parts(&self) -> Result<(LinearCost, VectorizedCost), PlannerError> {
        let mut non_interactive = LinearCost::new();
        non_interactive.set_parallel(self.parallel);
        for spec in &self.non_interactive {
            non_interactive.add_feature(spec.weight, scalar::create(&spec.name, &spec.params)?);
        }

        let mut interactive = VectorizedCost::new();
        interactive.set_parallel(self.parallel);
        for spec in &self.interactive {
            interactive.add_feature(spec.weight, vectorized::create(&spec.name, &spec.params)?);
        }

        Ok((non_interactive, interactive))
    }

    pub fn build_probabilistic(
        &self,
        belief: Arc<dyn BeliefModel>,
    ) -> Result<ProbabilisticCost, PlannerError> {
        let (non_interactive, interactive) = self.build_parts()?;
        Ok(ProbabilisticCost::new(non_interactive, interactive, belief))
    }

    pub fn build_probabilistic_simplified(
        &self,
        belief: Arc<dyn ScalarBeliefModel>,
    ) -> Result<ProbabilisticCostSimplified, PlannerError> {
        let (non_interactive, interactive) = self.build_parts()?;
        Ok(ProbabilisticCostSimplified::new(
            non_interactive,
            interactive,
            belief,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::{BeliefUpdate, ExpDecayBelief};
    use crate::types::{Control, State};
    use approx::assert_abs_diff_eq;
    use nalgebra::{DMatrix, DVector};

    fn spec(name: &str, weight: f64, params: &[f64]) -> FeatureSpec {
        FeatureSpec {
            name: name.to_string(),
            weight,
            params: params.to_vec(),
        }
    }

    fn problem() -> ProblemConfig {
        ProblemConfig {
            horizon: 5,
            dt: 0.5,
            robot_model: ModelKind::Differential,
            human_model: ModelKind::ConstAcc,
        }
    }

    #[test]
    fn validate_rejects_degenerate_dimensions() {
        let mut cfg = problem();
        assert!(cfg.validate().is_ok());

        cfg.horizon = 0;
        assert!(matches!(cfg.validate(), Err(PlannerError::InvalidConfig(_))));

        cfg.horizon = 5;
        cfg.dt = 0.0;
        assert!(matches!(cfg.validate(), Err(PlannerError::InvalidConfig(_))));
    }

    #[test]
    fn trajectory_constructors_follow_the_model_tags() {
        let cfg = problem();

        let robot = cfg.robot_trajectory().unwrap();
        assert_eq!(robot.kind(), ModelKind::Differential);
        assert_eq!(robot.state_size(), 3);
        assert_eq!(robot.horizon(), 5);
        assert_abs_diff_eq!(robot.dt(), 0.5);

        let human = cfg.human_trajectory().unwrap();
        assert_eq!(human.kind(), ModelKind::ConstAcc);
        assert_eq!(human.control_size(), 2);
    }

    #[test]
    fn unknown_feature_names_are_rejected() {
        let cfg = CostConfig {
            non_interactive: vec![spec("RobotControl", 1.0, &[])],
            interactive: vec![spec("Teleport", 1.0, &[])],
            parallel: false,
        };
        let belief = Arc::new(ExpDecayBelief::new(0.9, 2.0).unwrap());
        assert!(matches!(
            cfg.build_probabilistic_simplified(belief),
            Err(PlannerError::UnknownFeatureType(name)) if name == "Teleport"
        ));
    }

    #[test]
    fn wrong_parameter_counts_are_rejected() {
        let cfg = CostConfig {
            non_interactive: vec![spec("RobotGoal", 1.0, &[4.0])],
            interactive: Vec::new(),
            parallel: false,
        };
        let belief = Arc::new(ExpDecayBelief::new(0.9, 2.0).unwrap());
        assert!(matches!(
            cfg.build_probabilistic_simplified(belief),
            Err(PlannerError::InvalidFeatureParameters {
                expected: 2,
                got: 1,
                ..
            })
        ));
    }

    #[test]
    fn human_vel_on_a_unicycle_human_is_rejected_at_evaluation() {
        // This pairing is expressible in a scenario file; the assembled
        // cost must refuse it with a typed error, never abort.
        let problem = ProblemConfig {
            horizon: 5,
            dt: 0.5,
            robot_model: ModelKind::Differential,
            human_model: ModelKind::Differential,
        };
        let mut robot = problem.robot_trajectory().unwrap();
        robot.update(
            &State::from_vec(vec![0.0, 0.0, 0.3]),
            &Control::from_vec(vec![0.4; 10]),
        );
        robot.compute_jacobian().unwrap();
        let mut human = problem.human_trajectory().unwrap();
        human.update(
            &State::from_vec(vec![2.0, 1.0, -0.2]),
            &Control::from_vec(vec![0.1; 10]),
        );
        human.compute_jacobian().unwrap();

        let cfg = CostConfig {
            non_interactive: vec![spec("HumanVel", 1.0, &[])],
            interactive: Vec::new(),
            parallel: false,
        };
        let mut cost = cfg
            .build_probabilistic_simplified(Arc::new(ExpDecayBelief::new(0.9, 2.0).unwrap()))
            .unwrap();

        assert!(matches!(
            cost.compute(&robot, &human, &human, -1, 0.0, 0.0),
            Err(PlannerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn assembled_cost_matches_manual_composition() {
        let problem = problem();
        let mut robot = problem.robot_trajectory().unwrap();
        robot.update(
            &State::from_vec(vec![0.0, 0.0, 0.3]),
            &Control::from_vec(vec![0.4; 10]),
        );
        robot.compute_jacobian().unwrap();
        let mut human = problem.human_trajectory().unwrap();
        human.update(
            &State::from_vec(vec![2.0, 1.0, -0.2, 0.1]),
            &Control::from_vec(vec![-0.1; 10]),
        );
        human.compute_jacobian().unwrap();

        let cfg = CostConfig {
            non_interactive: vec![
                spec("RobotControl", 0.2, &[]),
                spec("RobotGoal", 0.7, &[4.0, 4.0]),
            ],
            interactive: vec![
                spec("Collision", 1.5, &[1.0]),
                spec("HumanEffort", 0.3, &[]),
            ],
            parallel: false,
        };

        let belief = Arc::new(ExpDecayBelief::new(0.9, 2.0).unwrap());
        let mut built = cfg.build_probabilistic_simplified(belief.clone()).unwrap();

        let mut non_interactive = LinearCost::new();
        non_interactive.add_feature(0.2, scalar::create("RobotControl", &[]).unwrap());
        non_interactive.add_feature(0.7, scalar::create("RobotGoal", &[4.0, 4.0]).unwrap());
        let mut interactive = VectorizedCost::new();
        interactive.add_feature(1.5, vectorized::create("Collision", &[1.0]).unwrap());
        interactive.add_feature(0.3, vectorized::create("HumanEffort", &[]).unwrap());
        let mut manual = ProbabilisticCostSimplified::new(non_interactive, interactive, belief);

        let a = built.compute(&robot, &human, &human, 1, 0.0, 1.0).unwrap();
        let b = manual.compute(&robot, &human, &human, 1, 0.0, 1.0).unwrap();
        assert_eq!(a.cost, b.cost);
        assert_eq!(a.grad_ur, b.grad_ur);

        // The parallel flag changes scheduling only, never the numbers.
        let mut parallel_cfg = cfg.clone();
        parallel_cfg.parallel = true;
        let mut parallel_built = parallel_cfg
            .build_probabilistic_simplified(Arc::new(ExpDecayBelief::new(0.9, 2.0).unwrap()))
            .unwrap();
        let c = parallel_built.compute(&robot, &human, &human, 1, 0.0, 1.0).unwrap();
        assert_eq!(a.cost, c.cost);
        assert_eq!(a.grad_ur, c.grad_ur);
    }

    #[derive(Debug)]
    struct NeutralBelief;

    impl BeliefModel for NeutralBelief {
        fn update_belief(
            &self,
            robot: &Trajectory,
            _human_ref: &Trajectory,
            _comm_action: i32,
            _comm_time: f64,
            _current_time: f64,
        ) -> Result<BeliefUpdate, PlannerError> {
            Ok(BeliefUpdate {
                prob_hp: DVector::from_element(robot.horizon(), 0.5),
                jac_ur: DMatrix::zeros(robot.horizon(), robot.traj_control_size()),
            })
        }
    }

    #[test]
    fn full_aggregator_builds_from_the_same_tables() {
        let problem = problem();
        let mut robot = problem.robot_trajectory().unwrap();
        robot.update(
            &State::from_vec(vec![0.0, 0.0, 0.0]),
            &Control::from_vec(vec![0.2; 10]),
        );
        robot.compute_jacobian().unwrap();
        let mut human = problem.human_trajectory().unwrap();
        human.update(
            &State::from_vec(vec![1.5, 0.5, 0.0, 0.0]),
            &Control::from_vec(vec![0.0; 10]),
        );
        human.compute_jacobian().unwrap();

        let cfg = CostConfig {
            non_interactive: vec![spec("RobotControl", 0.2, &[])],
            interactive: vec![spec("Collision", 1.0, &[1.0])],
            parallel: false,
        };
        let mut cost = cfg.build_probabilistic(Arc::new(NeutralBelief)).unwrap();

        let out = cost
            .compute(&robot, &human, &human, &human, -1, 0.0, 0.0)
            .unwrap();
        assert!(out.cost.is_finite());
        assert_eq!(out.grad_ur.len(), robot.traj_control_size());
        assert_eq!(out.grad_hp.len(), human.traj_control_size());
    }
}
