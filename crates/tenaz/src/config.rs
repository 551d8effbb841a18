//! Engine configuration.
//!
//! All durations are written in milliseconds in the serialized form, e.g.
//!
//! ```yaml
//! poll_interval_ms: 100
//! timeout_per_locator_ms: 2000
//! ambiguity: reject
//! retry:
//!   max_attempts: 3
//!   initial_delay_ms: 500
//! visual:
//!   fuzzy_threshold: 0.8
//!   scales: [0.8, 1.0, 1.25]
//! log:
//!   filter: "tenaz=debug"
//!   json: false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::result::{TenazError, TenazResult};
use crate::retry::RetryPolicy;
use crate::structural::AmbiguityPolicy;
use crate::wait::{DEFAULT_LOCATOR_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STABILITY_INTERVAL_MS};

/// Serde helper: `Duration` as integer milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Tunables for the visual fallback pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Minimum normalized edit similarity for an OCR region to match
    pub fuzzy_threshold: f32,
    /// Minimum correlation score for a template match
    pub template_min_score: f32,
    /// Template scales to search
    pub scales: Vec<f32>,
    /// Minimum final confidence for a visual match
    pub confidence_floor: f32,
    /// Candidates closer than this in confidence are tie-broken by position
    pub tie_epsilon: f32,
    /// Gaussian sigma for denoising (0 disables)
    pub denoise_sigma: f32,
    /// Frames wider than this are downscaled before matching
    pub max_frame_width: u32,
    /// Pixels of context added around a candidate before classification
    pub classify_padding: u32,
    /// Confidence factor when a type is expected but the classifier is unsure
    pub unknown_type_penalty: f32,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.8,
            template_min_score: 0.75,
            scales: vec![0.8, 1.0, 1.25],
            confidence_floor: 0.6,
            tie_epsilon: 0.02,
            denoise_sigma: 0.6,
            max_frame_width: 1600,
            classify_padding: 6,
            unknown_type_penalty: 0.85,
        }
    }
}

impl VisualConfig {
    /// Check the invariants
    ///
    /// # Errors
    ///
    /// Returns error if any score is outside 0.0-1.0, no scale is positive,
    /// or the frame width is zero.
    pub fn validate(&self) -> TenazResult<()> {
        let unit = [
            ("fuzzy_threshold", self.fuzzy_threshold),
            ("template_min_score", self.template_min_score),
            ("confidence_floor", self.confidence_floor),
            ("tie_epsilon", self.tie_epsilon),
            ("unknown_type_penalty", self.unknown_type_penalty),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("visual.{name} must be within 0.0-1.0, got {value}")));
            }
        }
        if self.scales.is_empty() || self.scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(invalid("visual.scales must be non-empty and positive".into()));
        }
        if self.denoise_sigma < 0.0 || !self.denoise_sigma.is_finite() {
            return Err(invalid("visual.denoise_sigma must be >= 0".into()));
        }
        if self.max_frame_width == 0 {
            return Err(invalid("visual.max_frame_width must be > 0".into()));
        }
        Ok(())
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `"tenaz=debug"`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "tenaz=info".to_string(),
            json: false,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between structural queries
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    /// Default polling budget per structural locator
    #[serde(rename = "timeout_per_locator_ms", with = "duration_ms")]
    pub timeout_per_locator: Duration,
    /// Interval between the two bounding-box samples before acting
    #[serde(rename = "stability_interval_ms", with = "duration_ms")]
    pub stability_interval: Duration,
    /// What to do with multiple structural matches
    pub ambiguity: AmbiguityPolicy,
    /// Whether requests fall back to visual resolution by default
    pub visual_fallback: bool,
    /// Default outer retry policy
    pub retry: RetryPolicy,
    /// Visual pipeline tunables
    pub visual: VisualConfig,
    /// Logging
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout_per_locator: Duration::from_millis(DEFAULT_LOCATOR_TIMEOUT_MS),
            stability_interval: Duration::from_millis(DEFAULT_STABILITY_INTERVAL_MS),
            ambiguity: AmbiguityPolicy::Reject,
            visual_fallback: false,
            retry: RetryPolicy::single_pass(),
            visual: VisualConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> TenazResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> TenazResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_path(path: impl AsRef<Path>) -> TenazResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            other => Err(invalid(format!(
                "unsupported config extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> TenazResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Check the invariants
    ///
    /// # Errors
    ///
    /// Returns error if the poll interval is zero or any nested section is
    /// invalid.
    pub fn validate(&self) -> TenazResult<()> {
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval_ms must be > 0".into()));
        }
        self.retry.validate()?;
        self.visual.validate()?;
        tracing_subscriber::EnvFilter::try_new(&self.log.filter)
            .map_err(|e| invalid(format!("log.filter is not a valid filter: {e}")))?;
        Ok(())
    }
}

fn invalid(message: String) -> TenazError {
    TenazError::InvalidConfig { message }
}
