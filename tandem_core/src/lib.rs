// tandem_core/src/lib.rs

//! Cost and trajectory machinery for belief-aware human-robot interaction
//! planning: rollout dynamics with control sensitivities, interaction cost
//! features with analytic gradients, and the probabilistic aggregation that
//! weighs the competing human-intent hypotheses.

pub mod belief;
pub mod config;
pub mod costs;
pub mod dynamics;
pub mod error;
pub mod features;
pub mod prelude;
pub mod probabilistic;
pub mod trajectory;
pub mod types;
