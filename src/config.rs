//! Configuration types for ring tree construction.

use crate::error::{Error, Result};

/// Default starting tolerance for weighted region sizing, as a fraction of
/// the parent region.
pub const DEFAULT_MAGNITUDE_TOLERANCE: f64 = 1e-6;

/// Factor applied to the tolerance after an infeasible attempt.
pub const DEFAULT_TOLERANCE_GROWTH: f64 = 10.0;

/// Largest multiple of the initial tolerance that will be attempted.
pub const DEFAULT_MAX_TOLERANCE_MULTIPLIER: f64 = 10_000.0;

/// Configuration for building ring trees.
#[derive(Debug, Clone)]
pub struct RingBuildConfig {
    /// Tolerance used for the first partitioning attempt at every node.
    pub initial_magnitude_tolerance: f64,

    /// Multiplier applied to the tolerance on each retry.
    pub tolerance_growth: f64,

    /// Ceiling on the tolerance, expressed as a multiple of the initial one.
    pub max_tolerance_multiplier: f64,

    /// Build independent subtrees of the ring parent on separate threads.
    pub parallel: bool,
}

impl Default for RingBuildConfig {
    fn default() -> Self {
        Self {
            initial_magnitude_tolerance: DEFAULT_MAGNITUDE_TOLERANCE,
            tolerance_growth: DEFAULT_TOLERANCE_GROWTH,
            max_tolerance_multiplier: DEFAULT_MAX_TOLERANCE_MULTIPLIER,
            parallel: false,
        }
    }
}

impl RingBuildConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the starting magnitude tolerance.
    pub fn with_initial_magnitude_tolerance(mut self, tolerance: f64) -> Self {
        self.initial_magnitude_tolerance = tolerance;
        self
    }

    /// Set the tolerance growth factor.
    pub fn with_tolerance_growth(mut self, growth: f64) -> Self {
        self.tolerance_growth = growth;
        self
    }

    /// Set the tolerance ceiling as a multiple of the initial tolerance.
    pub fn with_max_tolerance_multiplier(mut self, multiplier: f64) -> Self {
        self.max_tolerance_multiplier = multiplier;
        self
    }

    /// Enable or disable parallel subtree builds.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The largest tolerance that will be attempted.
    pub fn max_magnitude_tolerance(&self) -> f64 {
        self.initial_magnitude_tolerance * self.max_tolerance_multiplier
    }

    /// The sequence of tolerances tried at each node, smallest first.
    ///
    /// The ceiling itself is the last attempt. A small epsilon absorbs
    /// floating point drift from repeated multiplication.
    pub fn tolerance_schedule(&self) -> Vec<f64> {
        let ceiling = self.max_magnitude_tolerance() * (1.0 + 1e-9);
        let mut schedule = Vec::new();
        let mut tolerance = self.initial_magnitude_tolerance;
        while tolerance <= ceiling {
            schedule.push(tolerance);
            tolerance *= self.tolerance_growth;
        }
        schedule
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_magnitude_tolerance.is_finite() && self.initial_magnitude_tolerance > 0.0) {
            return Err(Error::Config(format!(
                "initial magnitude tolerance must be positive, got {}",
                self.initial_magnitude_tolerance
            )));
        }
        if !(self.tolerance_growth.is_finite() && self.tolerance_growth > 1.0) {
            return Err(Error::Config(format!(
                "tolerance growth must be greater than 1, got {}",
                self.tolerance_growth
            )));
        }
        if !(self.max_tolerance_multiplier.is_finite() && self.max_tolerance_multiplier >= 1.0) {
            return Err(Error::Config(format!(
                "max tolerance multiplier must be at least 1, got {}",
                self.max_tolerance_multiplier
            )));
        }
        Ok(())
    }
}
