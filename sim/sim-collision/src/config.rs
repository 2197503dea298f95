//! Configuration types for broadphases, the GJK detector and the dispatcher.
//!
//! Every config has a `Default`, a few named presets, `with_*` builder
//! methods, and a `validate()` that constructors call before building
//! anything.

use nalgebra::Point3;

use crate::error::{CollisionError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest proxy count the quantized sweep can address with `u16` edge indices.
pub const AXIS_SWEEP_MAX_HANDLES: usize = 32_766;

/// Configuration of the quantized sweep-and-prune broadphase.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisSweepConfig {
    /// Minimum corner of the quantization domain. Points below are clamped.
    pub world_min: Point3<f64>,
    /// Maximum corner of the quantization domain. Points above are clamped.
    pub world_max: Point3<f64>,
    /// Maximum number of live proxies.
    pub max_handles: usize,
    /// Mirror proxies into a dynamic tree to answer AABB and ray queries.
    pub raycast_accelerator: bool,
}

impl Default for AxisSweepConfig {
    fn default() -> Self {
        Self {
            world_min: Point3::new(-1000.0, -1000.0, -1000.0),
            world_max: Point3::new(1000.0, 1000.0, 1000.0),
            max_handles: 16_384,
            raycast_accelerator: true,
        }
    }
}

impl AxisSweepConfig {
    /// Create a config for the given world bounds.
    #[must_use]
    pub fn with_world_bounds(world_min: Point3<f64>, world_max: Point3<f64>) -> Self {
        Self {
            world_min,
            world_max,
            ..Default::default()
        }
    }

    /// Small scene preset: ±100 world, 1024 proxies.
    #[must_use]
    pub fn small_scene() -> Self {
        Self {
            world_min: Point3::new(-100.0, -100.0, -100.0),
            world_max: Point3::new(100.0, 100.0, 100.0),
            max_handles: 1024,
            ..Default::default()
        }
    }

    /// Set the proxy capacity.
    #[must_use]
    pub fn max_handles(mut self, max_handles: usize) -> Self {
        self.max_handles = max_handles;
        self
    }

    /// Disable the ray/AABB query accelerator.
    #[must_use]
    pub fn without_accelerator(mut self) -> Self {
        self.raycast_accelerator = false;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_handles == 0 || self.max_handles > AXIS_SWEEP_MAX_HANDLES {
            return Err(CollisionError::invalid_config(format!(
                "max_handles must be in 1..={AXIS_SWEEP_MAX_HANDLES}, got {}",
                self.max_handles
            )));
        }
        for i in 0..3 {
            let (lo, hi) = (self.world_min[i], self.world_max[i]);
            if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                return Err(CollisionError::invalid_config(format!(
                    "world bounds must be finite with min < max on every axis (axis {i}: {lo} .. {hi})"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration of the brute-force broadphase.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimpleBroadphaseConfig {
    /// Maximum number of live proxies.
    pub max_proxies: usize,
}

impl Default for SimpleBroadphaseConfig {
    fn default() -> Self {
        Self { max_proxies: 16_384 }
    }
}

impl SimpleBroadphaseConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_proxies == 0 {
            return Err(CollisionError::invalid_config("max_proxies must be > 0"));
        }
        Ok(())
    }
}

/// Configuration of the dynamic-tree broadphase.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DbvtBroadphaseConfig {
    /// Fattening applied to leaf volumes when they are refit.
    pub margin: f64,
    /// Velocity prediction factor applied along the direction of motion.
    pub prediction: f64,
    /// Percent of fixed-tree leaves re-inserted per pass while it settles.
    pub fixed_update_percent: usize,
    /// Percent of dynamic-tree leaves re-inserted per pass.
    pub dynamic_update_percent: usize,
    /// Percent of the pair array validated per pass.
    pub cleanup_percent: usize,
    /// Only discover pairs in `calculate_overlapping_pairs`, never on
    /// create or move.
    pub deferred_collide: bool,
    /// Maximum number of live proxies (`None` for unbounded).
    pub max_proxies: Option<usize>,
}

impl Default for DbvtBroadphaseConfig {
    fn default() -> Self {
        Self {
            margin: 0.05,
            prediction: 0.0,
            fixed_update_percent: 1,
            dynamic_update_percent: 0,
            cleanup_percent: 10,
            deferred_collide: false,
            max_proxies: None,
        }
    }
}

impl DbvtBroadphaseConfig {
    /// Accelerator preset: pairs are never reported on create/move.
    #[must_use]
    pub fn accelerator() -> Self {
        Self {
            deferred_collide: true,
            ..Default::default()
        }
    }

    /// Set the leaf margin.
    #[must_use]
    pub fn margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Set the velocity prediction factor.
    #[must_use]
    pub fn prediction(mut self, prediction: f64) -> Self {
        self.prediction = prediction;
        self
    }

    /// Defer pair discovery to `calculate_overlapping_pairs`.
    #[must_use]
    pub fn deferred(mut self) -> Self {
        self.deferred_collide = true;
        self
    }

    /// Bound the number of live proxies.
    #[must_use]
    pub fn max_proxies(mut self, max_proxies: usize) -> Self {
        self.max_proxies = Some(max_proxies);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(CollisionError::invalid_config(
                "margin must be finite and non-negative",
            ));
        }
        if !self.prediction.is_finite() || self.prediction < 0.0 {
            return Err(CollisionError::invalid_config(
                "prediction must be finite and non-negative",
            ));
        }
        for (name, value) in [
            ("fixed_update_percent", self.fixed_update_percent),
            ("dynamic_update_percent", self.dynamic_update_percent),
            ("cleanup_percent", self.cleanup_percent),
        ] {
            if value > 100 {
                return Err(CollisionError::invalid_config(format!(
                    "{name} must be <= 100, got {value}"
                )));
            }
        }
        if self.max_proxies == Some(0) {
            return Err(CollisionError::invalid_config("max_proxies must be > 0"));
        }
        Ok(())
    }
}

/// Configuration of the GJK pair detector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GjkConfig {
    /// Most iterations the loop runs; reaching it returns the best result
    /// so far.
    pub max_iterations: usize,
    /// Minimum relative squared-distance improvement to keep iterating.
    pub relative_error_squared: f64,
    /// Margin-adjusted distance below which a degenerate exit is re-solved
    /// by the penetration solver.
    pub degenerate_penetration_threshold: f64,
    /// Re-solve degenerate near-contact exits with the penetration solver.
    pub catch_degeneracies: bool,
}

impl Default for GjkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            relative_error_squared: 1.0e-6,
            degenerate_penetration_threshold: 0.01,
            catch_degeneracies: true,
        }
    }
}

impl GjkConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(CollisionError::invalid_config("max_iterations must be > 0"));
        }
        if !(self.relative_error_squared > 0.0 && self.relative_error_squared < 1.0) {
            return Err(CollisionError::invalid_config(
                "relative_error_squared must be in (0, 1)",
            ));
        }
        if !self.degenerate_penetration_threshold.is_finite() {
            return Err(CollisionError::invalid_config(
                "degenerate_penetration_threshold must be finite",
            ));
        }
        Ok(())
    }
}

/// Configuration of the collision dispatcher.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DispatcherConfig {
    /// Separation below which contact points are still reported.
    pub contact_breaking_threshold: f64,
    /// GJK settings for convex pairs.
    pub gjk: GjkConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            contact_breaking_threshold: 0.02,
            gjk: GjkConfig::default(),
        }
    }
}

impl DispatcherConfig {
    /// Set the contact breaking threshold.
    #[must_use]
    pub fn contact_breaking_threshold(mut self, threshold: f64) -> Self {
        self.contact_breaking_threshold = threshold;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.contact_breaking_threshold.is_finite() || self.contact_breaking_threshold < 0.0 {
            return Err(CollisionError::invalid_config(
                "contact_breaking_threshold must be finite and non-negative",
            ));
        }
        self.gjk.validate()
    }
}

/// Broad-phase algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BroadPhaseAlgorithm {
    /// Quantized incremental sweep-and-prune.
    #[default]
    AxisSweep,
    /// Brute force O(n²).
    Simple,
    /// Dynamic bounding volume tree.
    Dbvt,
}

/// Configuration for the [`BroadPhaseDetector`](crate::BroadPhaseDetector) façade.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BroadPhaseConfig {
    /// Algorithm to use.
    pub algorithm: BroadPhaseAlgorithm,
    /// Settings when `algorithm` is [`BroadPhaseAlgorithm::AxisSweep`].
    pub axis_sweep: AxisSweepConfig,
    /// Settings when `algorithm` is [`BroadPhaseAlgorithm::Simple`].
    pub simple: SimpleBroadphaseConfig,
    /// Settings when `algorithm` is [`BroadPhaseAlgorithm::Dbvt`].
    pub dbvt: DbvtBroadphaseConfig,
}

impl BroadPhaseConfig {
    /// Select an algorithm with default settings.
    #[must_use]
    pub fn with_algorithm(algorithm: BroadPhaseAlgorithm) -> Self {
        Self {
            algorithm,
            ..Default::default()
        }
    }

    /// Validate the settings of the selected algorithm.
    pub fn validate(&self) -> Result<()> {
        match self.algorithm {
            BroadPhaseAlgorithm::AxisSweep => self.axis_sweep.validate(),
            BroadPhaseAlgorithm::Simple => self.simple.validate(),
            BroadPhaseAlgorithm::Dbvt => self.dbvt.validate(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(AxisSweepConfig::default().validate().is_ok());
        assert!(AxisSweepConfig::small_scene().validate().is_ok());
        assert!(SimpleBroadphaseConfig::default().validate().is_ok());
        assert!(DbvtBroadphaseConfig::default().validate().is_ok());
        assert!(GjkConfig::default().validate().is_ok());
        assert!(DispatcherConfig::default().validate().is_ok());
        assert!(BroadPhaseConfig::default().validate().is_ok());
    }

    #[test]
    fn test_axis_sweep_rejects_bad_bounds() {
        let config = AxisSweepConfig::with_world_bounds(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 10.0),
        );
        assert!(config.validate().unwrap_err().is_config_error());

        let config = AxisSweepConfig::default().max_handles(AXIS_SWEEP_MAX_HANDLES + 1);
        assert!(config.validate().is_err());

        let config = AxisSweepConfig::default().max_handles(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dbvt_rejects_bad_percentages() {
        let config = DbvtBroadphaseConfig {
            cleanup_percent: 150,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DbvtBroadphaseConfig::default().margin(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dbvt_defaults() {
        let config = DbvtBroadphaseConfig::default();
        assert_eq!(config.margin, 0.05);
        assert_eq!(config.prediction, 0.0);
        assert_eq!(config.fixed_update_percent, 1);
        assert_eq!(config.dynamic_update_percent, 0);
        assert_eq!(config.cleanup_percent, 10);
        assert!(!config.deferred_collide);
        assert!(DbvtBroadphaseConfig::accelerator().deferred_collide);
    }

    #[test]
    fn test_gjk_defaults() {
        let config = GjkConfig::default();
        assert_eq!(config.max_iterations, 1000);
        assert_eq!(config.relative_error_squared, 1.0e-6);
    }
}
