// tandem_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::belief::{BeliefModel, BeliefUpdate, ScalarBeliefModel};
pub use crate::costs::SingleTrajectoryCost;
pub use crate::dynamics::DynamicsModel;
pub use crate::features::{Feature, HumanFeature, VectorizedFeature};

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::dynamics::ModelKind;
pub use crate::error::PlannerError;
pub use crate::trajectory::Trajectory;
pub use crate::types::{Control, IntentType, State};

// --- Cost Composition ---
pub use crate::costs::{
    HumanCost, LinearCost, SingleTrajectoryCostHuman, SingleTrajectoryCostRobot, VectorizedCost,
};
pub use crate::probabilistic::{CostOutput, ProbabilisticCost, ProbabilisticCostSimplified};

// --- Configuration & Assembly ---
pub use crate::config::{CostConfig, FeatureSpec, ProblemConfig};

// --- Concrete Model Implementations (Export common ones for convenience) ---
pub use crate::belief::ExpDecayBelief;
pub use crate::dynamics::{ConstAccDynamics, DifferentialDynamics};
