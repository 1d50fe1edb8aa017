//! Environment providers - where a child's inherited environment comes from
//!
//! Tasks without an explicit `KEY=VALUE` override inherit whatever the queue's
//! provider returns. The ambient provider reads the real process environment;
//! the fixed provider lets callers (and tests) pin it.

use crate::{Error, Result};
use std::ffi::OsString;

/// Source of the environment handed to children that do not override it
pub trait EnvironmentProvider {
    /// Variables in the order they should be applied
    fn vars(&self) -> Vec<(OsString, OsString)>;
}

/// Reads the environment of the current process at spawn time
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientEnvironment;

impl EnvironmentProvider for AmbientEnvironment {
    fn vars(&self) -> Vec<(OsString, OsString)> {
        std::env::vars_os().collect()
    }
}

/// A fixed set of variables, independent of the real process environment
#[derive(Debug, Clone, Default)]
pub struct FixedEnvironment {
    vars: Vec<(OsString, OsString)>,
}

impl FixedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `KEY=VALUE` entries, rejecting malformed ones
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut env = Self::new();
        for entry in entries {
            let (key, value) = parse_env_entry(entry.as_ref())?;
            env = env.with_var(key, value);
        }
        Ok(env)
    }

    pub fn with_var(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.vars.push((key.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl EnvironmentProvider for FixedEnvironment {
    fn vars(&self) -> Vec<(OsString, OsString)> {
        self.vars.clone()
    }
}

/// Split a `KEY=VALUE` entry at the first `=`.
///
/// The key must be non-empty; the value may be empty or contain further `=`.
pub fn parse_env_entry(entry: &str) -> Result<(&str, &str)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(Error::InvalidEnv(entry.to_string())),
    }
}

/// Validate every entry of an environment override
pub fn validate_env_entries<S: AsRef<str>>(entries: &[S]) -> Result<()> {
    entries
        .iter()
        .try_for_each(|entry| parse_env_entry(entry.as_ref()).map(|_| ()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_entry() {
        assert_eq!(parse_env_entry("PATH=/usr/bin").unwrap(), ("PATH", "/usr/bin"));
        assert_eq!(parse_env_entry("EMPTY=").unwrap(), ("EMPTY", ""));
        assert_eq!(parse_env_entry("A=b=c").unwrap(), ("A", "b=c"));
        assert!(parse_env_entry("NOVALUE").is_err());
        assert!(parse_env_entry("=value").is_err());
    }

    #[test]
    fn test_validate_env_entries() {
        assert!(validate_env_entries(&["A=1", "B=2"]).is_ok());
        assert!(validate_env_entries::<&str>(&[]).is_ok());
        assert!(matches!(
            validate_env_entries(&["A=1", "broken"]),
            Err(Error::InvalidEnv(entry)) if entry == "broken"
        ));
    }

    #[test]
    fn test_fixed_environment() {
        let env = FixedEnvironment::from_entries(["HOME=/tmp", "LANG=C"]).unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(
            env.vars(),
            vec![
                (OsString::from("HOME"), OsString::from("/tmp")),
                (OsString::from("LANG"), OsString::from("C")),
            ]
        );
    }

    #[test]
    fn test_ambient_environment_sees_process_vars() {
        let vars = AmbientEnvironment.vars();
        let expected: Vec<_> = std::env::vars_os().collect();
        assert_eq!(vars.len(), expected.len());
    }
}
