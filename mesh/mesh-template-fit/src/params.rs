//! Fitting and solver configuration.

use crate::{FitError, FitResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of the bound-constrained minimizer run once per outer iteration.
///
/// # Example
///
/// ```
/// use mesh_template_fit::SolverParams;
///
/// let solver = SolverParams::new()
///     .with_max_evaluations(250)
///     .with_bounds(-10.0, 10.0);
/// assert_eq!(solver.max_evaluations, 250);
/// assert_eq!(solver.bounds, Some([-10.0, 10.0]));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverParams {
    /// Function-value convergence factor (default: 1e7).
    ///
    /// The solver stops once the relative reduction of the objective falls
    /// below `convergence_factor * f64::EPSILON`. Typical values are 1e12 for
    /// low accuracy, 1e7 for moderate and 10 for very high accuracy.
    pub convergence_factor: f64,

    /// Stop when the largest projected-gradient component is below this (default: 1e-5).
    pub projected_gradient_tolerance: f64,

    /// Cap on objective evaluations per solve (default: 100).
    pub max_evaluations: usize,

    /// Number of correction pairs kept by L-BFGS (default: 5).
    pub history: usize,

    /// Optional `[lower, upper]` box applied to every parameter (default: unbounded).
    pub bounds: Option<[f64; 2]>,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            convergence_factor: Self::DEFAULT_CONVERGENCE_FACTOR,
            projected_gradient_tolerance: Self::DEFAULT_PROJECTED_GRADIENT_TOLERANCE,
            max_evaluations: Self::DEFAULT_MAX_EVALUATIONS,
            history: Self::DEFAULT_HISTORY,
            bounds: None,
        }
    }
}

impl SolverParams {
    /// Default function-value convergence factor.
    pub const DEFAULT_CONVERGENCE_FACTOR: f64 = 1e7;

    /// Default projected-gradient tolerance.
    pub const DEFAULT_PROJECTED_GRADIENT_TOLERANCE: f64 = 1e-5;

    /// Default evaluation cap.
    pub const DEFAULT_MAX_EVALUATIONS: usize = 100;

    /// Default L-BFGS memory.
    pub const DEFAULT_HISTORY: usize = 5;

    /// Creates solver parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the function-value convergence factor.
    #[must_use]
    pub const fn with_convergence_factor(mut self, factor: f64) -> Self {
        self.convergence_factor = factor;
        self
    }

    /// Sets the projected-gradient tolerance.
    #[must_use]
    pub const fn with_projected_gradient_tolerance(mut self, tolerance: f64) -> Self {
        self.projected_gradient_tolerance = tolerance;
        self
    }

    /// Sets the evaluation cap.
    #[must_use]
    pub const fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    /// Sets the L-BFGS memory.
    #[must_use]
    pub const fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    /// Restricts every parameter to `[lower, upper]`.
    #[must_use]
    pub const fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.bounds = Some([lower, upper]);
        self
    }

    /// Removes any box constraint.
    #[must_use]
    pub const fn unbounded(mut self) -> Self {
        self.bounds = None;
        self
    }

    /// Absolute function-value tolerance implied by the convergence factor.
    #[must_use]
    pub fn function_tolerance(&self) -> f64 {
        self.convergence_factor * f64::EPSILON
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] naming the first bad field.
    pub fn validate(&self) -> FitResult<()> {
        if !(self.convergence_factor.is_finite() && self.convergence_factor >= 0.0) {
            return Err(FitError::invalid(
                "convergence_factor",
                format!("must be finite and non-negative, got {}", self.convergence_factor),
            ));
        }
        if !(self.projected_gradient_tolerance.is_finite()
            && self.projected_gradient_tolerance >= 0.0)
        {
            return Err(FitError::invalid(
                "projected_gradient_tolerance",
                format!(
                    "must be finite and non-negative, got {}",
                    self.projected_gradient_tolerance
                ),
            ));
        }
        if self.max_evaluations == 0 {
            return Err(FitError::invalid("max_evaluations", "must be at least 1"));
        }
        if self.history == 0 {
            return Err(FitError::invalid("history", "must be at least 1"));
        }
        if let Some([lower, upper]) = self.bounds {
            if lower.is_nan() || upper.is_nan() || lower > upper {
                return Err(FitError::invalid(
                    "bounds",
                    format!("lower bound {lower} must not exceed upper bound {upper}"),
                ));
            }
            if lower > 0.0 || upper < 1.0 {
                return Err(FitError::invalid(
                    "bounds",
                    format!("box [{lower}, {upper}] excludes the identity deformation"),
                ));
            }
        }
        Ok(())
    }
}

/// Parameters for non-rigid template fitting.
///
/// The defaults reproduce the usual schedule: ten outer iterations, data
/// weight 1, regularization and rigidity starting at 1000 and halved after
/// every iteration.
///
/// # Examples
///
/// ```
/// use mesh_template_fit::FitParams;
///
/// let params = FitParams::new()
///     .with_max_iterations(5)
///     .with_max_correspondence_distance(2.5)
///     .with_max_correspondence_angle(60.0);
///
/// assert_eq!(params.max_iterations, 5);
/// assert!(params.validate().is_ok());
/// ```
///
/// Weights can be set to zero to drop a term entirely:
///
/// ```
/// use mesh_template_fit::FitParams;
///
/// let params = FitParams::new().with_rigidity_weight(0.0);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitParams {
    /// Weight of the data term (default: 1.0). Fixed across iterations.
    pub data_weight: f64,

    /// Initial weight of the regularization term (default: 1000.0).
    pub regularization_weight: f64,

    /// Initial weight of the rigidity term (default: 1000.0).
    pub rigidity_weight: f64,

    /// Multiplier applied to regularization and rigidity weights after
    /// each outer iteration (default: 0.5).
    pub weight_decay: f64,

    /// Number of outer iterations (default: 10).
    pub max_iterations: usize,

    /// Correspondences farther than this are rejected (default: 15.0).
    pub max_correspondence_distance: f64,

    /// Correspondences whose normals deviate more than this many degrees
    /// are rejected (default: 80.0).
    pub max_correspondence_angle: f64,

    /// Settings for the per-iteration minimizer.
    pub solver: SolverParams,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            data_weight: Self::DEFAULT_DATA_WEIGHT,
            regularization_weight: Self::DEFAULT_REGULARIZATION_WEIGHT,
            rigidity_weight: Self::DEFAULT_RIGIDITY_WEIGHT,
            weight_decay: Self::DEFAULT_WEIGHT_DECAY,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            max_correspondence_distance: Self::DEFAULT_MAX_CORRESPONDENCE_DISTANCE,
            max_correspondence_angle: Self::DEFAULT_MAX_CORRESPONDENCE_ANGLE,
            solver: SolverParams::default(),
        }
    }
}

impl FitParams {
    /// Default data weight.
    pub const DEFAULT_DATA_WEIGHT: f64 = 1.0;

    /// Default initial regularization weight.
    pub const DEFAULT_REGULARIZATION_WEIGHT: f64 = 1000.0;

    /// Default initial rigidity weight.
    pub const DEFAULT_RIGIDITY_WEIGHT: f64 = 1000.0;

    /// Default per-iteration weight multiplier.
    pub const DEFAULT_WEIGHT_DECAY: f64 = 0.5;

    /// Default number of outer iterations.
    pub const DEFAULT_MAX_ITERATIONS: usize = 10;

    /// Default maximum correspondence distance, in mesh units.
    pub const DEFAULT_MAX_CORRESPONDENCE_DISTANCE: f64 = 15.0;

    /// Default maximum correspondence normal angle, in degrees.
    pub const DEFAULT_MAX_CORRESPONDENCE_ANGLE: f64 = 80.0;

    /// Creates fitting parameters with default values.
    ///
    /// # Examples
    ///
    /// ```
    /// use mesh_template_fit::FitParams;
    ///
    /// let params = FitParams::new();
    /// assert_eq!(params.max_iterations, 10);
    /// assert_eq!(params.solver.max_evaluations, 100);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data weight.
    #[must_use]
    pub const fn with_data_weight(mut self, weight: f64) -> Self {
        self.data_weight = weight;
        self
    }

    /// Sets the initial regularization weight.
    #[must_use]
    pub const fn with_regularization_weight(mut self, weight: f64) -> Self {
        self.regularization_weight = weight;
        self
    }

    /// Sets the initial rigidity weight.
    #[must_use]
    pub const fn with_rigidity_weight(mut self, weight: f64) -> Self {
        self.rigidity_weight = weight;
        self
    }

    /// Sets the per-iteration weight multiplier.
    #[must_use]
    pub const fn with_weight_decay(mut self, decay: f64) -> Self {
        self.weight_decay = decay;
        self
    }

    /// Sets the number of outer iterations.
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Sets the maximum correspondence distance.
    #[must_use]
    pub const fn with_max_correspondence_distance(mut self, distance: f64) -> Self {
        self.max_correspondence_distance = distance;
        self
    }

    /// Sets the maximum correspondence normal angle in degrees.
    #[must_use]
    pub const fn with_max_correspondence_angle(mut self, degrees: f64) -> Self {
        self.max_correspondence_angle = degrees;
        self
    }

    /// Replaces the solver settings.
    #[must_use]
    pub const fn with_solver(mut self, solver: SolverParams) -> Self {
        self.solver = solver;
        self
    }

    /// Returns the `(regularization, rigidity)` weights used in outer iteration `iteration`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mesh_template_fit::FitParams;
    ///
    /// let params = FitParams::new();
    /// assert_eq!(params.weights_at(0), (1000.0, 1000.0));
    /// assert_eq!(params.weights_at(2), (250.0, 250.0));
    /// ```
    #[must_use]
    pub fn weights_at(&self, iteration: usize) -> (f64, f64) {
        let factor = (0..iteration).fold(1.0, |acc, _| acc * self.weight_decay);
        (
            self.regularization_weight * factor,
            self.rigidity_weight * factor,
        )
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::InvalidParameter`] naming the first bad field.
    pub fn validate(&self) -> FitResult<()> {
        for (name, value) in [
            ("data_weight", self.data_weight),
            ("regularization_weight", self.regularization_weight),
            ("rigidity_weight", self.rigidity_weight),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(FitError::invalid(
                    name,
                    format!("weight must be finite and non-negative, got {value}"),
                ));
            }
        }
        if !(self.weight_decay.is_finite() && self.weight_decay > 0.0 && self.weight_decay <= 1.0)
        {
            return Err(FitError::invalid(
                "weight_decay",
                format!("must lie in (0, 1], got {}", self.weight_decay),
            ));
        }
        if self.max_iterations == 0 {
            return Err(FitError::invalid("max_iterations", "must be at least 1"));
        }
        if self.max_correspondence_distance.is_nan() || self.max_correspondence_distance <= 0.0 {
            return Err(FitError::invalid(
                "max_correspondence_distance",
                format!("must be positive, got {}", self.max_correspondence_distance),
            ));
        }
        if !(self.max_correspondence_angle > 0.0 && self.max_correspondence_angle <= 180.0) {
            return Err(FitError::invalid(
                "max_correspondence_angle",
                format!(
                    "must lie in (0, 180] degrees, got {}",
                    self.max_correspondence_angle
                ),
            ));
        }
        self.solver.validate()
    }
}
