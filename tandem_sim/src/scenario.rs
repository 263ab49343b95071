// tandem_sim/src/scenario.rs

use std::path::Path;

use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::Deserialize;

use tandem_core::prelude::*;

/// Root of the data parsed from a scenario TOML file.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub problem: ProblemConfig,
    pub robot: RobotScenario,
    pub human: HumanScenario,
    pub belief: BeliefScenario,
    pub cost: CostConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RobotScenario {
    /// Initial state, laid out per the robot model tag.
    pub start: Vec<f64>,
    /// One control step, broadcast across the horizon as the initial guess.
    pub u_init: Vec<f64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct HumanScenario {
    pub start: Vec<f64>,
    /// One control step per hypothesis, broadcast across the horizon. The
    /// hypotheses share the start state and differ only in these controls.
    pub u_hp: Vec<f64>,
    pub u_rp: Vec<f64>,
}

/// Belief parameters plus the communication state at planning time.
/// `comm_time` is on the planning clock, whose "now" is 0; a communication
/// some seconds ago therefore carries a negative timestamp.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BeliefScenario {
    pub p_comm: f64,
    pub tau: f64,
    #[serde(default = "no_communication")]
    pub comm_action: i32,
    #[serde(default)]
    pub comm_time: f64,
}

fn no_communication() -> i32 {
    -1
}

pub fn load(path: &Path) -> Result<Scenario, figment::Error> {
    Figment::new().merge(Toml::file(path)).extract()
}

/// Tiles one control step across the horizon.
fn broadcast(step: &[f64], horizon: usize) -> Control {
    let len = step.len() * horizon;
    Control::from_iterator(len, step.iter().copied().cycle().take(len))
}

impl Scenario {
    /// Checks every dimension against the model tags. The trajectory
    /// builders below assume this has passed.
    pub fn validate(&self) -> Result<(), PlannerError> {
        self.problem.validate()?;

        let check = |what: &str, got: usize, want: usize| {
            if got == want {
                Ok(())
            } else {
                Err(PlannerError::invalid_config(format!(
                    "{what} has {got} entries, the model wants {want}"
                )))
            }
        };

        let robot_model = self.problem.robot_model;
        let human_model = self.problem.human_model;
        check("robot.start", self.robot.start.len(), robot_model.state_dim())?;
        check("robot.u_init", self.robot.u_init.len(), robot_model.control_dim())?;
        check("human.start", self.human.start.len(), human_model.state_dim())?;
        check("human.u_hp", self.human.u_hp.len(), human_model.control_dim())?;
        check("human.u_rp", self.human.u_rp.len(), human_model.control_dim())?;

        // ExpDecayBelief::new re-checks these; catching them here points
        // the message at the scenario file instead of the model.
        if !(0.5..=1.0).contains(&self.belief.p_comm) || self.belief.tau <= 0.0 {
            return Err(PlannerError::invalid_config(
                "belief.p_comm must lie in [0.5, 1] and belief.tau must be positive",
            ));
        }
        Ok(())
    }

    /// The robot plan seeded with the broadcast initial guess, rolled out
    /// with its sensitivity matrix ready.
    pub fn robot_trajectory(&self) -> Result<Trajectory, PlannerError> {
        let mut traj = self.problem.robot_trajectory()?;
        traj.update(
            &State::from_vec(self.robot.start.clone()),
            &broadcast(&self.robot.u_init, self.problem.horizon),
        );
        traj.compute_jacobian()?;
        Ok(traj)
    }

    /// The two human-intent hypothesis trajectories, `(hp, rp)`.
    pub fn human_hypotheses(&self) -> Result<(Trajectory, Trajectory), PlannerError> {
        let start = State::from_vec(self.human.start.clone());

        let mut hp = self.problem.human_trajectory()?;
        hp.update(&start, &broadcast(&self.human.u_hp, self.problem.horizon));
        hp.compute_jacobian()?;

        let mut rp = self.problem.human_trajectory()?;
        rp.update(&start, &broadcast(&self.human.u_rp, self.problem.horizon));
        rp.compute_jacobian()?;

        Ok((hp, rp))
    }

    pub fn belief_model(&self) -> Result<ExpDecayBelief, PlannerError> {
        ExpDecayBelief::new(self.belief.p_comm, self.belief.tau)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
        [problem]
        horizon = 6
        dt = 0.5
        robot_model = "Differential"
        human_model = "ConstAcc"

        [robot]
        start = [0.0, -3.0, 1.5707963]
        u_init = [0.5, 0.0]

        [human]
        start = [-3.0, 0.0, 0.8, 0.0]
        u_hp = [0.05, 0.0]
        u_rp = [-0.35, 0.0]

        [belief]
        p_comm = 0.9
        tau = 2.0

        [cost]
        parallel = false

        [[cost.non_interactive]]
        name = "RobotControl"
        weight = 0.5

        [[cost.interactive]]
        name = "Collision"
        weight = 10.0
        params = [0.8]
    "#;

    #[test]
    fn scenario_parses_with_defaults() {
        let scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        scenario.validate().unwrap();
        assert_eq!(scenario.belief.comm_action, -1);
        assert_eq!(scenario.belief.comm_time, 0.0);
        assert_eq!(scenario.cost.non_interactive.len(), 1);
        assert_eq!(scenario.cost.interactive.len(), 1);
    }

    #[test]
    fn trajectories_are_rolled_out_and_differentiated() {
        let scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        scenario.validate().unwrap();

        let robot = scenario.robot_trajectory().unwrap();
        assert_eq!(robot.u().len(), 12);
        assert!(robot.x().is_ok());
        assert!(robot.ju().is_ok());

        let (hp, rp) = scenario.human_hypotheses().unwrap();
        assert_eq!(hp.x0(), rp.x0());
        assert!(hp.u() != rp.u());
    }

    #[test]
    fn validate_catches_dimension_slips() {
        let mut scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        scenario.robot.start.pop();
        assert!(matches!(
            scenario.validate(),
            Err(PlannerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_catches_belief_parameters_out_of_range() {
        let mut scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        scenario.belief.p_comm = 0.3;
        assert!(matches!(
            scenario.validate(),
            Err(PlannerError::InvalidConfig(_))
        ));
    }
}
