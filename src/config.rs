/*
    ABSTRACT: Runtime configuration for the message buses. Hosts can embed `BusConfig` in their
    own serde config files, or read it from the process environment.
*/
use crate::error::{BusError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable holding the `FailurePolicy` (`lenient` or `strict`)
pub const FAILURE_POLICY_ENV: &str = "MISSIVE_FAILURE_POLICY";
/// Environment variable toggling panic isolation (`true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off`)
pub const ISOLATE_PANICS_ENV: &str = "MISSIVE_ISOLATE_PANICS";

/// How `send` reports listeners that failed
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Failures are logged and counted in the `DispatchOutcome`; `send` still succeeds
    #[default]
    Lenient,
    /// Failures are logged and returned as `BusError::Dispatch` once every listener has run
    Strict,
}

impl FromStr for FailurePolicy {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(FailurePolicy::Lenient),
            "strict" => Ok(FailurePolicy::Strict),
            other => Err(BusError::InvalidConfig(format!(
                "unknown failure policy `{}`",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Lenient => f.write_str("lenient"),
            FailurePolicy::Strict => f.write_str("strict"),
        }
    }
}

/// Configuration shared by both bus flavours
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub failure_policy: FailurePolicy,
    /// Catch listener panics and treat them as failures instead of unwinding into the publisher
    pub isolate_panics: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Lenient,
            isolate_panics: true,
        }
    }
}

impl BusConfig {
    /// Default configuration with `FailurePolicy::Strict`
    pub fn strict() -> Self {
        Self::default().with_failure_policy(FailurePolicy::Strict)
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_isolate_panics(mut self, isolate_panics: bool) -> Self {
        self.isolate_panics = isolate_panics;
        self
    }

    /// Builds a configuration from `MISSIVE_FAILURE_POLICY` and `MISSIVE_ISOLATE_PANICS`,
    /// falling back to the defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(policy) = lookup(FAILURE_POLICY_ENV) {
            config.failure_policy = policy.parse()?;
        }
        if let Some(isolate) = lookup(ISOLATE_PANICS_ENV) {
            config.isolate_panics = parse_flag(ISOLATE_PANICS_ENV, &isolate)?;
        }
        Ok(config)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BusError::InvalidConfig(format!(
            "{} expects a boolean, got `{}`",
            key, other
        ))),
    }
}
