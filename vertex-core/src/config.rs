//! Graph Configuration
//!
//! Process-wide switches for the engine. A [`GraphConfig`] can be built in
//! code, deserialized from any serde format, or read from the environment.

use serde::{Deserialize, Serialize};

/// Environment variable enabling debug tracing.
pub const DEBUG_ENV: &str = "VERTEX_DEBUG";

/// Environment variable enabling timing collection.
pub const GATHER_PERFORMANCE_ENV: &str = "VERTEX_GATHER_PERFORMANCE";

/// Engine-wide switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Emit a debug line for every vertex invocation.
    pub debug_mode: bool,

    /// Record elapsed time of every vertex evaluation.
    pub gather_performance: bool,
}

impl GraphConfig {
    /// Read the configuration from `VERTEX_DEBUG` and
    /// `VERTEX_GATHER_PERFORMANCE`. Unset variables mean `false`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).is_some_and(|value| parse_flag(&value));
        Self {
            debug_mode: flag(DEBUG_ENV),
            gather_performance: flag(GATHER_PERFORMANCE_ENV),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
