// tandem_core/src/features/mod.rs

use std::fmt::Debug;

use nalgebra::{DMatrix, DVector};

use crate::error::PlannerError;
use crate::trajectory::Trajectory;
use crate::types::Control;

/// A scalar interaction feature: a named, parametrized pure function over a
/// (robot, human) trajectory pair.
///
/// Features never mutate a trajectory and carry no per-trajectory state, so
/// one instance can be shared (`Arc`) across any number of cost
/// compositions and evaluated from multiple threads at once.
///
/// Gradients are taken w.r.t. the flattened control sequence of the named
/// agent (`ur` robot, `uh` human) and require that agent's sensitivity
/// matrix to be current; a stale trajectory surfaces as a typed error, never
/// as a wrong number.
pub trait Feature: Debug + Send + Sync {
    /// The registry name of this feature.
    fn name(&self) -> &'static str;

    fn compute(&self, robot: &Trajectory, human: &Trajectory) -> Result<f64, PlannerError>;

    /// Gradient w.r.t. the robot's flattened control, length `T*nUr`.
    fn grad_ur(&self, robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError>;

    /// Gradient w.r.t. the human's flattened control, length `T*nUh`.
    fn grad_uh(&self, robot: &Trajectory, human: &Trajectory) -> Result<Control, PlannerError>;

    /// Capability query: the second-order (Hessian-bearing) view of this
    /// feature, if it has one. Features that can appear in a human cost
    /// model return `Some(self)`; everything else keeps the default.
    fn as_human(&self) -> Option<&dyn HumanFeature> {
        None
    }
}

/// A feature usable inside the human's own cost model: in addition to the
/// first derivatives it exposes the exact second derivatives needed for
/// local quadratic models of the human's response.
pub trait HumanFeature: Feature {
    /// Hessian w.r.t. the human control, shape `(T*nUh) x (T*nUh)`.
    fn hessian_uh(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError>;

    /// Mixed Hessian, human control then robot control, shape
    /// `(T*nUh) x (T*nUr)`.
    fn hessian_uh_ur(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError>;
}

/// A per-timestep feature: produces a length-`T` cost vector instead of a
/// scalar, so a belief model can reweight each timestep independently.
///
/// Gradient matrices have one row per timestep; row `t` is the gradient of
/// the cost at `t` w.r.t. the named agent's full flattened control.
pub trait VectorizedFeature: Debug + Send + Sync {
    /// The registry name of this feature.
    fn name(&self) -> &'static str;

    fn compute(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DVector<f64>, PlannerError>;

    /// Per-timestep gradients w.r.t. the robot control, shape `T x (T*nUr)`.
    fn grad_ur(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError>;

    /// Per-timestep gradients w.r.t. the human control, shape `T x (T*nUh)`.
    fn grad_uh(
        &self,
        robot: &Trajectory,
        human: &Trajectory,
    ) -> Result<DMatrix<f64>, PlannerError>;
}

/// Registry-side validation: a parameter list shorter than a feature
/// requires is rejected up front, never read out of bounds.
pub(crate) fn check_params(
    feature: &str,
    params: &[f64],
    expected: usize,
) -> Result<(), PlannerError> {
    if params.len() < expected {
        return Err(PlannerError::InvalidFeatureParameters {
            feature: feature.to_string(),
            expected,
            got: params.len(),
        });
    }
    Ok(())
}

pub mod scalar;
pub mod vectorized;
