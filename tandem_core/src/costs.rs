// tandem_core/src/costs.rs

use std::fmt::Debug;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::error::PlannerError;
use crate::features::{Feature, VectorizedFeature};
use crate::trajectory::Trajectory;
use crate::types::Control;

// --- Linear Composition of Scalar Features ---

/// An ordered list of `(weight, feature)` pairs evaluated as a weighted sum.
///
/// Features are independent and never mutated, so evaluation is a pure map
/// over the list. With `parallel` set the map runs on the rayon pool; the
/// per-feature results are still reduced in feature order, so both paths
/// produce bit-identical sums.
#[derive(Debug, Clone, Default)]
pub struct LinearCost {
    weights: Vec<f64>,
    features: Vec<Arc<dyn Feature>>,
    parallel: bool,
}

impl LinearCost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the composition from co-indexed weight and feature lists.
    pub fn with_features(
        weights: Vec<f64>,
        features: Vec<Arc<dyn Feature>>,
    ) -> Result<Self, PlannerError> {
        if weights.len() != features.len() {
            return Err(PlannerError::DimensionMismatch {
                weights: weights.len(),
                features: features.len(),
            });
        }
        Ok(Self {
            weights,
            features,
            parallel: false,
        })
    }

    /// Appends one `(weight, feature)` pair; the lists stay co-indexed.
    pub fn add_feature(&mut self, weight: f64, feature: Arc<dyn Feature>) {
        self.weights.push(weight);
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// One result per feature, in feature order regardless of the
    /// evaluation path.
    fn feature_terms<T, F>(&self, eval: F) -> Result<Vec<T>, PlannerError>
    where
        T: Send,
        F: Fn(&dyn Feature) -> Result<T, PlannerError> + Send + Sync,
    {
        if self.parallel {
            self.features.par_iter().map(|f| eval(f.as_ref())).collect()
        } else {
            self.features.iter().map(|f| eval(f.as_ref())).collect()
        }
    }

    pub fn compute(&self, robot: &Trajectory, human: &Trajectory) -> Result<f64, PlannerError> {
        let terms = self.feature_terms(|f| f.compute(robot, human))?;
        Ok(self.weights.iter().zip(&terms).map(|(w, c)| w * c).sum())
    }

    pub fn grad_ur(&self, robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        let terms = self.feature_terms(|f| f.grad_ur(robot, human))?;
        let mut grad = Control::zeros(robot.traj_control_size());
        for (w, g) in self.weights.iter().zip(terms) {
            grad += g * *w;
        }
        Ok(grad)
    }

    pub fn grad_uh(&self, robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        let terms = self.feature_terms(|f| f.grad_uh(robot, human))?;
        let mut grad = Control::zeros(human.traj_control_size());
        for (w, g) in self.weights.iter().zip(terms) {
            grad += g * *w;
        }
        Ok(grad)
    }
}

// --- Human Cost Model ---

/// A linear composition restricted to Hessian-bearing features, extending
/// the weighted sum to second derivatives.
///
/// The capability is checked when a feature is added, so a composition that
/// constructed successfully can always deliver its Hessians.
#[derive(Debug, Clone, Default)]
pub struct HumanCost {
    base: LinearCost,
}

impl HumanCost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_features(
        weights: Vec<f64>,
        features: Vec<Arc<dyn Feature>>,
    ) -> Result<Self, PlannerError> {
        let base = LinearCost::with_features(weights, features)?;
        for feature in &base.features {
            if feature.as_human().is_none() {
                return Err(PlannerError::unsupported(feature.name()));
            }
        }
        Ok(Self { base })
    }

    /// Appends a feature, rejecting any without Hessian support.
    pub fn add_feature(&mut self, weight: f64, feature: Arc<dyn Feature>) -> Result<(), PlannerError> {
        if feature.as_human().is_none() {
            return Err(PlannerError::unsupported(feature.name()));
        }
        self.base.add_feature(weight, feature);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.base.set_parallel(parallel);
    }

    pub fn compute(&self, robot: &Trajectory, human: &Trajectory) -> Result<f64, PlannerError> {
        self.base.compute(robot, human)
    }

    pub fn grad_ur(&self, robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        self.base.grad_ur(robot, human)
    }

    pub fn grad_uh(&self, robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError> {
        self.base.grad_uh(robot, human)
    }

    /// Weighted sum of the feature Hessians w.r.t. the human control.
    pub fn hessian_uh(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let terms = self.base.feature_terms(|f| {
            let human_view = f.as_human().ok_or_else(|| PlannerError::unsupported(f.name()))?;
            human_view.hessian_uh(robot, human)
        })?;

        let len = human.traj_control_size();
        let mut hess = DMatrix::zeros(len, len);
        for (w, h) in self.base.weights.iter().zip(terms) {
            hess += h * *w;
        }
        Ok(hess)
    }

    /// Weighted sum of the mixed feature Hessians, human then robot control.
    pub fn hessian_uh_ur(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let terms = self.base.feature_terms(|f| {
            let human_view = f.as_human().ok_or_else(|| PlannerError::unsupported(f.name()))?;
            human_view.hessian_uh_ur(robot, human)
        })?;

        let mut hess = DMatrix::zeros(human.traj_control_size(), robot.traj_control_size());
        for (w, h) in self.base.weights.iter().zip(terms) {
            hess += h * *w;
        }
        Ok(hess)
    }
}

// --- Linear Composition of Per-Timestep Features ---

/// The per-timestep counterpart of `LinearCost`: a weighted sum of
/// length-`T` cost vectors and of their `T x (T*nU)` gradient matrices.
#[derive(Debug, Clone, Default)]
pub struct VectorizedCost {
    weights: Vec<f64>,
    features: Vec<Arc<dyn VectorizedFeature>>,
    parallel: bool,
}

impl VectorizedCost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_features(
        weights: Vec<f64>,
        features: Vec<Arc<dyn VectorizedFeature>>,
    ) -> Result<Self, PlannerError> {
        if weights.len() != features.len() {
            return Err(PlannerError::DimensionMismatch {
                weights: weights.len(),
                features: features.len(),
            });
        }
        Ok(Self {
            weights,
            features,
            parallel: false,
        })
    }

    pub fn add_feature(&mut self, weight: f64, feature: Arc<dyn VectorizedFeature>) {
        self.weights.push(weight);
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    fn feature_terms<T, F>(&self, eval: F) -> Result<Vec<T>, PlannerError>
    where
        T: Send,
        F: Fn(&dyn VectorizedFeature) -> Result<T, PlannerError> + Send + Sync,
    {
        if self.parallel {
            self.features.par_iter().map(|f| eval(f.as_ref())).collect()
        } else {
            self.features.iter().map(|f| eval(f.as_ref())).collect()
        }
    }

    /// Weighted per-timestep cost vector, length `T`.
    pub fn compute(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DVector<f64>, PlannerError> {
        let terms = self.feature_terms(|f| f.compute(robot, human))?;
        let mut costs = DVector::zeros(robot.horizon());
        for (w, c) in self.weights.iter().zip(terms) {
            costs += c * *w;
        }
        Ok(costs)
    }

    pub fn grad_ur(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let terms = self.feature_terms(|f| f.grad_ur(robot, human))?;
        let mut grad = DMatrix::zeros(robot.horizon(), robot.traj_control_size());
        for (w, g) in self.weights.iter().zip(terms) {
            grad += g * *w;
        }
        Ok(grad)
    }

    pub fn grad_uh(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError> {
        let terms = self.feature_terms(|f| f.grad_uh(robot, human))?;
        let mut grad = DMatrix::zeros(human.horizon(), human.traj_control_size());
        for (w, g) in self.weights.iter().zip(terms) {
            grad += g * *w;
        }
        Ok(grad)
    }
}

// --- Single-Trajectory Adapters ---

/// A cost over one free trajectory, the other agent held constant.
///
/// The adapter capability used by alternating best-response schemes: the
/// frozen side is replaced between optimization rounds via
/// `set_trajectory_data`, never during an evaluation.
pub trait SingleTrajectoryCost: Debug + Send + Sync {
    /// Replaces the frozen trajectory (deep copy).
    fn set_trajectory_data(&mut self, traj: &Trajectory);

    fn compute(&self, traj: &Trajectory) -> Result<f64, PlannerError>;

    /// Gradient w.r.t. the free trajectory's flattened control.
    fn grad(&self, traj: &Trajectory) -> Result<Control, PlannerError>;
}

/// Optimizes the robot; the human trajectory is frozen.
#[derive(Debug, Clone)]
pub struct SingleTrajectoryCostRobot {
    cost: LinearCost,
    frozen_human: Trajectory,
}

impl SingleTrajectoryCostRobot {
    pub fn new(cost: LinearCost, human: Trajectory) -> Self {
        Self {
            cost,
            frozen_human: human,
        }
    }
}

impl SingleTrajectoryCost for SingleTrajectoryCostRobot {
    fn set_trajectory_data(&mut self, traj: &Trajectory) {
        self.frozen_human = traj.clone();
    }

    fn compute(&self, traj: &Trajectory) -> Result<f64, PlannerError> {
        self.cost.compute(traj, &self.frozen_human)
    }

    fn grad(&self, traj: &Trajectory) -> Result<Control, PlannerError> {
        self.cost.grad_ur(traj, &self.frozen_human)
    }
}

/// Optimizes the human; the robot trajectory is frozen. Built over a
/// `HumanCost` so the single-argument Hessians stay available.
#[derive(Debug, Clone)]
pub struct SingleTrajectoryCostHuman {
    cost: HumanCost,
    frozen_robot: Trajectory,
}

impl SingleTrajectoryCostHuman {
    pub fn new(cost: HumanCost, robot: Trajectory) -> Self {
        Self {
            cost,
            frozen_robot: robot,
        }
    }

    pub fn hessian_uh(&self, traj: &Trajectory) -> Result<DMatrix<f64>, PlannerError> {
        self.cost.hessian_uh(&self.frozen_robot, traj)
    }

    pub fn hessian_uh_ur(&self, traj: &Trajectory) -> Result<DMatrix<f64>, PlannerError> {
        self.cost.hessian_uh_ur(&self.frozen_robot, traj)
    }
}

impl SingleTrajectoryCost for SingleTrajectoryCostHuman {
    fn set_trajectory_data(&mut self, traj: &Trajectory) {
        self.frozen_robot = traj.clone();
    }

    fn compute(&self, traj: &Trajectory) -> Result<f64, PlannerError> {
        self.cost.compute(&self.frozen_robot, traj)
    }

    fn grad(&self, traj: &Trajectory) -> Result<Control, PlannerError> {
        self.cost.grad_uh(&self.frozen_robot, traj)
    }
}
