//! Environment-variable providers.

use std::collections::HashMap;

/// Read-only source of environment variables.
pub trait EnvProvider: Send + Sync {
    /// Look up `key`. Unset and non-unicode values are `None`.
    fn get(&self, key: &str) -> Option<String>;
}

/// The current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvProvider for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A fixed set of variables, independent of the process environment.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for MapEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvProvider for MapEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_env() {
        let env = MapEnv::new().with("HOME", "/home/runner");
        assert_eq!(env.get("HOME").as_deref(), Some("/home/runner"));
        assert!(env.get("MISSING").is_none());
    }

    #[test]
    fn test_map_env_from_iter() {
        let env: MapEnv = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(env.get("B").as_deref(), Some("2"));
    }

    #[test]
    fn test_process_env_reads_path() {
        // PATH is set in every environment the tests run in.
        assert!(ProcessEnv.get("PATH").is_some());
        assert!(ProcessEnv
            .get("PROCEXEC_TEST_SURELY_UNSET_VARIABLE")
            .is_none());
    }
}
