//! Optimizer configuration aggregated from defaults and environment variables.
//!
//! Resolved once per compilation and passed by reference into every phase.
//! Nothing here is global: two compilations in one process may run with
//! different settings.

use crate::opt::worklist::DEFAULT_SEED;

/// Environment variable overriding the worklist seed.
pub const ENV_SEED: &str = "SON_SEED";
/// Environment variable toggling fixpoint re-verification.
pub const ENV_VERIFY: &str = "SON_VERIFY";

/// Default bound on worklist steps per compilation.
pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

// =============================================================================
// Optimizer Configuration
// =============================================================================

/// Settings for the worklist engine and the code motion phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptConfig {
    /// Seed for the worklist's random pop order.
    pub seed: u64,

    /// Re-walk the whole graph after the worklist drains and fail if any
    /// node would still change.
    pub verify: bool,

    /// Worklist steps before the engine gives up with an internal error.
    pub max_steps: usize,

    /// Give loops without an exit a synthetic one before code motion.
    pub force_exits: bool,
}

impl Default for OptConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            verify: cfg!(debug_assertions),
            max_steps: DEFAULT_MAX_STEPS,
            force_exits: true,
        }
    }
}

impl OptConfig {
    /// Defaults overridden by `SON_SEED` and `SON_VERIFY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(seed) = lookup(ENV_SEED).and_then(|v| v.trim().parse::<u64>().ok()) {
            config.seed = seed;
        }
        if let Some(verify) = lookup(ENV_VERIFY).map(|v| Self::parse_bool(&v)) {
            config.verify = verify;
        }
        config
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_force_exits(mut self, force_exits: bool) -> Self {
        self.force_exits = force_exits;
        self
    }

    #[inline]
    fn parse_bool(v: &str) -> bool {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |k| {
            vars.iter()
                .find(|(name, _)| *name == k)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_default_config() {
        let config = OptConfig::default();
        assert_eq!(config.seed, 123);
        assert!(config.force_exits);
        assert_eq!(config.verify, cfg!(debug_assertions));
    }

    #[test]
    fn test_seed_from_env() {
        let config = OptConfig::from_lookup(lookup(&[(ENV_SEED, "99")]));
        assert_eq!(config.seed, 99);
    }

    #[test]
    fn test_bad_seed_keeps_default() {
        let config = OptConfig::from_lookup(lookup(&[(ENV_SEED, "nope")]));
        assert_eq!(config.seed, DEFAULT_SEED);
    }

    #[test]
    fn test_verify_truthy_values() {
        for v in ["1", "true", "YES", " on "] {
            let config = OptConfig::from_lookup(lookup(&[(ENV_VERIFY, v)]));
            assert!(config.verify, "{v:?} should enable verification");
        }
        for v in ["0", "false", "off", ""] {
            let config = OptConfig::from_lookup(lookup(&[(ENV_VERIFY, v)]));
            assert!(!config.verify, "{v:?} should disable verification");
        }
    }

    #[test]
    fn test_builder_methods() {
        let config = OptConfig::default()
            .with_seed(7)
            .with_verify(true)
            .with_max_steps(10)
            .with_force_exits(false);
        assert_eq!(config.seed, 7);
        assert!(config.verify);
        assert_eq!(config.max_steps, 10);
        assert!(!config.force_exits);
    }
}
