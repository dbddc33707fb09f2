use serde::Deserialize;

use crate::error::MatchError;
use crate::pipeline::DEFAULT_BATCH_SIZE;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MatchConfig {
    pub name: String,
    /// Minimum score for auto-accepted matches.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Inline,
    Threaded,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => write!(f, "inline"),
            Self::Threaded => write!(f, "threaded"),
        }
    }
}

fn default_threshold() -> f64 {
    0.8
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl MatchConfig {
    pub fn from_toml(input: &str) -> Result<Self, MatchError> {
        let config: MatchConfig =
            toml::from_str(input).map_err(|e| MatchError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.name.is_empty() {
            return Err(MatchError::ConfigValidation("name must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(MatchError::ConfigValidation(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.batch_size == 0 {
            return Err(MatchError::ConfigValidation(
                "batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
