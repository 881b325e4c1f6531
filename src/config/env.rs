//! Environment lookup used as the fallback configuration source.

use std::collections::HashMap;

/// Source of environment values.
///
/// Production code reads the process environment through [`ProcessEnv`];
/// tests hand the resolver a plain map so they never touch global state.
pub trait EnvSource: Send + Sync {
    /// Returns the value for `key`, treating empty values as unset.
    fn var(&self, key: &str) -> Option<String>;

    /// Returns the first non-empty value among `keys`.
    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.var(key))
    }
}

/// Reads from the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|value| !value.is_empty()).cloned()
    }
}
