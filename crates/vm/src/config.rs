//! Runtime limits and seeding.

use serde::Deserialize;

/// Limits that turn runaway scripts into runtime errors.
///
/// Deserializes from the `[runtime]` table of a project file; missing
/// keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Instructions one playhead may execute in a single tick.
    pub max_steps_per_tick: usize,
    /// Deepest allowed nesting of user function calls.
    pub max_call_depth: usize,
    /// Seed for `random`. Unseeded worlds draw from OS entropy.
    pub seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps_per_tick: 100_000,
            max_call_depth: 256,
            seed: None,
        }
    }
}
