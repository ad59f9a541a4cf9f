//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tunables shared by every rule of one [`Actions`](crate::actions::Actions)
/// registry. Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Move the last match of a cut-off search to the front of the lists
    /// it was found in, so the next search starts there.
    pub locality: bool,
    /// Deepest negative-pattern nesting a rule may use.
    pub max_negative_depth: usize,
    /// Upper bound on rewrites performed by one `apply_repeatedly` call.
    pub max_repeat: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locality: true,
            max_negative_depth: 31,
            max_repeat: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_repeat == 0 {
            return Err(Error::Config("max_repeat must be at least 1".into()));
        }
        Ok(())
    }
}
