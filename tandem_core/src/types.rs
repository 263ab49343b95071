// tandem_core/src/types.rs

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

// --- Core Type Aliases ---
// Flattened over the horizon where the context calls for it: a trajectory's
// state sequence is a single DVector of length T*nX, its control sequence a
// single DVector of length T*nU.
pub type State = DVector<f64>;
pub type Control = DVector<f64>;

/// The two competing hypotheses about how the human resolves the interaction.
///
/// `HumanPriority`: the human proceeds as if unconstrained by the robot.
/// `RobotPriority`: the human yields and lets the robot pass first.
/// A communicated intent (`comm_action`) is the integer value of one of
/// these variants; a negative `comm_action` means nothing was communicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentType {
    HumanPriority,
    RobotPriority,
}

impl IntentType {
    /// Integer encoding used on the communication channel.
    pub fn as_comm_action(self) -> i32 {
        match self {
            IntentType::HumanPriority => 0,
            IntentType::RobotPriority => 1,
        }
    }

    /// Decodes a communicated action; `None` for anything not a known intent
    /// (in particular the conventional "nothing communicated" value -1).
    pub fn from_comm_action(action: i32) -> Option<Self> {
        match action {
            0 => Some(IntentType::HumanPriority),
            1 => Some(IntentType::RobotPriority),
            _ => None,
        }
    }
}
