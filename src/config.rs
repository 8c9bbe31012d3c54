// ABOUTME: Host configuration surface read by the interpreter and the
// construction of the CONFIG object exposed to build files

use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// The typed configuration the host passes in. The string map `values`
/// carries arbitrary build config (typically uppercased keys like `ARCH`);
/// the typed fields are the ones the interpreter itself consults.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Default build timeout applied when a rule does not set one.
    pub build_timeout: Duration,
    /// Default test timeout applied when neither a timeout nor a size is
    /// given.
    pub test_timeout: Duration,
    /// Timeout applied to every `exec()` invocation.
    pub exec_timeout: Duration,
    /// Whether build actions are sandboxed by default.
    pub build_sandbox: bool,
    /// Whether test actions are sandboxed by default.
    pub test_sandbox: bool,
    /// Labels that permit a target to opt out of sandboxing; a target
    /// turning sandboxing off must carry one of these.
    pub sandbox_excludable_labels: Vec<String>,
    /// Named test sizes and the test timeout each implies.
    pub sizes: BTreeMap<String, Duration>,
    /// Arbitrary string build config surfaced through CONFIG.
    pub values: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let mut sizes = BTreeMap::new();
        sizes.insert("small".to_owned(), Duration::from_secs(60));
        sizes.insert("medium".to_owned(), Duration::from_secs(300));
        sizes.insert("large".to_owned(), Duration::from_secs(900));
        sizes.insert("enormous".to_owned(), Duration::from_secs(3600));
        BuildConfig {
            build_timeout: Duration::from_secs(600),
            test_timeout: Duration::from_secs(600),
            exec_timeout: Duration::from_secs(60),
            build_sandbox: false,
            test_sandbox: false,
            sandbox_excludable_labels: Vec::new(),
            sizes,
            values: BTreeMap::new(),
        }
    }
}

impl BuildConfig {
    /// The base mapping of the CONFIG object. The typed fields exposed to
    /// build files are whitelisted here explicitly; everything else comes
    /// from `values`.
    pub fn config_base(&self) -> Arc<HashMap<String, Value>> {
        let mut base = HashMap::with_capacity(self.values.len() + 2);
        for (k, v) in &self.values {
            base.insert(k.clone(), Value::string(v));
        }
        base.insert("BUILD_SANDBOX".to_owned(), Value::Bool(self.build_sandbox));
        base.insert("TEST_SANDBOX".to_owned(), Value::Bool(self.test_sandbox));
        Arc::new(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_base_includes_values_and_flags() {
        let mut cfg = BuildConfig::default();
        cfg.values.insert("ARCH".to_owned(), "amd64".to_owned());
        cfg.build_sandbox = true;
        let base = cfg.config_base();
        assert_eq!(base.get("ARCH"), Some(&Value::string("amd64")));
        assert_eq!(base.get("BUILD_SANDBOX"), Some(&Value::Bool(true)));
        assert_eq!(base.get("TEST_SANDBOX"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_default_sizes_present() {
        let cfg = BuildConfig::default();
        assert!(cfg.sizes.contains_key("small"));
        assert!(cfg.sizes["small"] < cfg.sizes["enormous"]);
    }
}
