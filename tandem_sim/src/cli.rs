// tandem_sim/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Tandem: belief-aware trajectory planning for human-robot crossings.
///
/// Loads a scenario file, then runs a fixed-step gradient descent on the
/// robot control sequence while the two human-intent hypothesis
/// trajectories stay fixed as predictions.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(
        short,
        long,
        default_value = "tandem_sim/assets/scenarios/hallway_crossing.toml"
    )]
    pub scenario: PathBuf,

    /// Number of gradient descent iterations.
    #[arg(long, default_value_t = 60)]
    pub iterations: usize,

    /// Fixed descent step size.
    #[arg(long, default_value_t = 0.05)]
    pub learning_rate: f64,

    /// Evaluate cost features in parallel regardless of the scenario setting.
    #[arg(long, default_value_t = false)]
    pub parallel: bool,
}
