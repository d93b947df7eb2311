use std::collections::BTreeMap;
use std::collections::HashMap;
use std::process::Command;

/// Extra environment variables handed to server processes.
///
/// Entries are kept sorted so logs and spawned commands see them in a stable
/// order. Variables not listed here are inherited from the test process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment(BTreeMap<String, String>);

impl Environment {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets a variable, replacing any earlier value for the same name.
    ///
    /// ```
    /// use stan_harness::Environment;
    ///
    /// let mut env = Environment::new();
    /// env.set("STAN_CLUSTER_ID", "test-cluster");
    /// assert_eq!(env.get("STAN_CLUSTER_ID"), Some("test-cluster"));
    /// ```
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Merges `other` into this set; `other` wins on conflicts.
    pub fn extend(&mut self, other: Environment) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Exports every variable onto `command`
    pub fn apply(&self, command: &mut Command) {
        command.envs(&self.0);
    }

    /// Consumes the set, returning the sorted variable map
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<HashMap<String, String>> for Environment {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
