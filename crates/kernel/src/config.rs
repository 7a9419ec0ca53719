use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest accepted fixed step. Shorter steps vanish against the frame
/// accumulator in f64 and the sub-step loop would never drain it.
pub const MIN_FIXED_STEP: f32 = 1e-6;

/// How far the simulation advances per sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "TimeStepRepr", into = "TimeStepRepr")]
pub enum TimeStep {
    /// Uniform sub-steps of this many seconds, driven by the accumulator.
    Fixed(f32),
    /// One step per frame using the (clamped) frame delta.
    Vary,
}

impl TimeStep {
    pub fn is_vary(&self) -> bool {
        matches!(self, Self::Vary)
    }

    /// The fixed sub-step length, if any.
    pub fn fixed(&self) -> Option<f32> {
        match self {
            Self::Fixed(dt) => Some(*dt),
            Self::Vary => None,
        }
    }
}

impl Default for TimeStep {
    fn default() -> Self {
        Self::Fixed(1.0 / 60.0)
    }
}

/// On-disk form: a number of seconds or the keyword `"vary"`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TimeStepRepr {
    Seconds(f32),
    Keyword(TimeStepKeyword),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TimeStepKeyword {
    Vary,
}

impl From<TimeStepRepr> for TimeStep {
    fn from(repr: TimeStepRepr) -> Self {
        match repr {
            TimeStepRepr::Seconds(dt) => Self::Fixed(dt),
            TimeStepRepr::Keyword(TimeStepKeyword::Vary) => Self::Vary,
        }
    }
}

impl From<TimeStep> for TimeStepRepr {
    fn from(step: TimeStep) -> Self {
        match step {
            TimeStep::Fixed(dt) => Self::Seconds(dt),
            TimeStep::Vary => Self::Keyword(TimeStepKeyword::Vary),
        }
    }
}

/// Stepper and solver configuration.
///
/// Field names follow the camelCase config surface when (de)serialized.
/// Missing fields take their defaults, which track the engine's own solver
/// defaults (an `erp` of 0.24 is the engine's contact stiffness at 60 Hz).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    pub time_step: TimeStep,
    pub paused: bool,
    pub interpolate: bool,
    pub max_stabilization_iterations: usize,
    pub max_velocity_friction_iterations: usize,
    pub max_velocity_iterations: usize,
    pub prediction_distance: f32,
    /// Contact error reduction parameter, in `(0, 1)`.
    pub erp: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            time_step: TimeStep::default(),
            paused: false,
            interpolate: true,
            max_stabilization_iterations: 2,
            max_velocity_friction_iterations: 4,
            max_velocity_iterations: 4,
            prediction_distance: 0.002,
            erp: 0.24,
        }
    }
}

/// A configuration field that can change between two applied configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    Gravity,
    TimeStep,
    Paused,
    Interpolate,
    MaxStabilizationIterations,
    MaxVelocityFrictionIterations,
    MaxVelocityIterations,
    PredictionDistance,
    Erp,
}

impl ConfigField {
    /// Whether the field lives on the World (as opposed to the stepper).
    pub fn is_world_field(&self) -> bool {
        !matches!(self, Self::TimeStep | Self::Paused | Self::Interpolate)
    }
}

/// Fields that differ between the last-applied config and a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    pub changed: Vec<ConfigField>,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn contains(&self, field: ConfigField) -> bool {
        self.changed.contains(&field)
    }

    /// Changed fields that must be written into a live World.
    pub fn world_fields(&self) -> impl Iterator<Item = ConfigField> + '_ {
        self.changed.iter().copied().filter(ConfigField::is_world_field)
    }
}

impl PhysicsConfig {
    /// Reject values that would hang the accumulator loop or break the solver.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let TimeStep::Fixed(dt) = self.time_step {
            if !dt.is_finite() || dt < MIN_FIXED_STEP {
                return Err(ConfigError::InvalidTimeStep(dt));
            }
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::NonFiniteGravity(self.gravity));
        }
        if self.max_velocity_iterations == 0 {
            return Err(ConfigError::ZeroVelocityIterations);
        }
        if !self.prediction_distance.is_finite() || self.prediction_distance < 0.0 {
            return Err(ConfigError::InvalidPredictionDistance(
                self.prediction_distance,
            ));
        }
        if !(self.erp > 0.0 && self.erp < 1.0) {
            return Err(ConfigError::InvalidErp(self.erp));
        }
        Ok(())
    }

    /// Fields of `next` that differ from `self`.
    pub fn diff(&self, next: &PhysicsConfig) -> ConfigDiff {
        let mut changed = Vec::new();
        let mut check = |differs: bool, field| {
            if differs {
                changed.push(field);
            }
        };
        check(self.gravity != next.gravity, ConfigField::Gravity);
        check(self.time_step != next.time_step, ConfigField::TimeStep);
        check(self.paused != next.paused, ConfigField::Paused);
        check(self.interpolate != next.interpolate, ConfigField::Interpolate);
        check(
            self.max_stabilization_iterations != next.max_stabilization_iterations,
            ConfigField::MaxStabilizationIterations,
        );
        check(
            self.max_velocity_friction_iterations != next.max_velocity_friction_iterations,
            ConfigField::MaxVelocityFrictionIterations,
        );
        check(
            self.max_velocity_iterations != next.max_velocity_iterations,
            ConfigField::MaxVelocityIterations,
        );
        check(
            self.prediction_distance != next.prediction_distance,
            ConfigField::PredictionDistance,
        );
        check(self.erp != next.erp, ConfigField::Erp);
        ConfigDiff { changed }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, choosing the format from the extension
    /// (`.yaml`/`.yml` or `.json`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config = match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text)?,
            Some("json") => Self::from_json_str(&text)?,
            _ => return Err(ConfigError::UnknownFormat(path.to_path_buf())),
        };
        tracing::debug!(path = %path.display(), time_step = ?config.time_step, "loaded physics config");
        Ok(config)
    }
}
