// tandem_sim/src/main.rs

mod cli;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tandem_core::prelude::*;

/// The planning clock's "now". Scenario communication timestamps are
/// relative to this.
const PLAN_TIME: f64 = 0.0;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    run(cli)
}

fn run(cli: cli::Cli) -> Result<()> {
    let mut scenario = scenario::load(&cli.scenario)
        .with_context(|| format!("loading scenario {}", cli.scenario.display()))?;
    scenario.validate().context("scenario failed validation")?;
    if cli.parallel {
        scenario.cost.parallel = true;
    }

    let mut robot = scenario.robot_trajectory()?;
    let (human_hp, human_rp) = scenario.human_hypotheses()?;
    let belief = std::sync::Arc::new(scenario.belief_model()?);
    let mut cost = scenario.cost.build_probabilistic_simplified(belief.clone())?;

    let comm_action = scenario.belief.comm_action;
    let comm_time = scenario.belief.comm_time;
    let p_hp = belief.update_belief(comm_action, comm_time, PLAN_TIME);
    info!(
        horizon = scenario.problem.horizon,
        dt = scenario.problem.dt,
        p_hp,
        "scenario ready"
    );

    // Fixed-step gradient descent on the flattened robot controls. Every
    // step re-rolls the trajectory and re-derives the control sensitivity
    // before the cost and its gradients are evaluated; the two human
    // hypotheses stay fixed as predictions.
    let mut u = robot.u().clone_owned();
    let mut initial_cost = None;
    for iter in 0..cli.iterations {
        robot.update_control(&u);
        robot.compute_jacobian()?;
        let out = cost.compute(&robot, &human_hp, &human_rp, comm_action, comm_time, PLAN_TIME)?;
        initial_cost.get_or_insert(out.cost);
        info!(iter, cost = out.cost, grad_norm = out.grad_ur.norm(), "descent step");
        u.axpy(-cli.learning_rate, &out.grad_ur, 1.0);
    }

    robot.update_control(&u);
    robot.compute_jacobian()?;
    let out = cost.compute(&robot, &human_hp, &human_rp, comm_action, comm_time, PLAN_TIME)?;
    if let Some(first) = initial_cost {
        if out.cost > first {
            warn!(
                first,
                last = out.cost,
                "cost went up over the run; lower the learning rate"
            );
        }
    }

    print_plan(&robot, out.cost, p_hp)?;
    Ok(())
}

fn print_plan(robot: &Trajectory, cost: f64, p_hp: f64) -> Result<()> {
    let xs = robot.x()?;
    let u = robot.u();
    let (nx, nu) = (robot.state_size(), robot.control_size());

    println!("final cost {cost:.4}, belief p_hp {p_hp:.3}");
    println!(
        "robot plan ({} steps of {:.2} s):",
        robot.horizon(),
        robot.dt()
    );
    for t in 0..robot.horizon() {
        let controls: Vec<String> = (0..nu).map(|k| format!("{:6.3}", u[t * nu + k])).collect();
        println!(
            "  t{:02}  pos ({:7.3}, {:7.3})  u [{}]",
            t + 1,
            xs[t * nx],
            xs[t * nx + 1],
            controls.join(", ")
        );
    }
    Ok(())
}
