//! Rate limit policies and the named policy table.
//!
//! Each guarded operation (registration, password change, ...) is checked
//! against its own policy. The table starts from built-in presets and can be
//! overridden from a YAML document:
//!
//! ```yaml
//! policies:
//!   registration:
//!     window_ms: 3600000
//!     max_attempts: 3
//!     block_duration_ms: 7200000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{MarketguardError, Result};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Name of the account registration preset.
pub const REGISTRATION: &str = "registration";
/// Name of the password change preset.
pub const PASSWORD_CHANGE: &str = "password_change";
/// Name of the login preset.
pub const LOGIN: &str = "login";
/// Name of the general API preset.
pub const API: &str = "api";

/// Limits applied to one guarded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Length of the counting window
    pub window: Duration,
    /// Attempts allowed within one window
    pub max_attempts: u32,
    /// Hard block length once the quota is exceeded; twice the window if unset
    pub block_duration: Option<Duration>,
    /// Explicit identity override, usually an authenticated user id
    pub identifier: Option<String>,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max_attempts: u32) -> Self {
        Self {
            window,
            max_attempts,
            block_duration: None,
            identifier: None,
        }
    }

    pub fn with_block_duration(mut self, block_duration: Duration) -> Self {
        self.block_duration = Some(block_duration);
        self
    }

    /// Key this policy on an authenticated identifier instead of the address.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// The block length actually applied.
    pub fn effective_block_duration(&self) -> Duration {
        self.block_duration
            .unwrap_or_else(|| self.window.saturating_mul(2))
    }

    /// 3 attempts per hour, 2 hour block.
    pub fn registration() -> Self {
        Self::new(HOUR, 3).with_block_duration(2 * HOUR)
    }

    /// 3 attempts per hour, 2 hour block, keyed by the authenticated user.
    pub fn password_change(user_id: impl Into<String>) -> Self {
        Self::new(HOUR, 3)
            .with_block_duration(2 * HOUR)
            .with_identifier(user_id)
    }

    /// 5 attempts per 15 minutes, 30 minute block.
    pub fn login() -> Self {
        Self::new(15 * MINUTE, 5).with_block_duration(30 * MINUTE)
    }

    /// 100 requests per 15 minutes, 30 minute block.
    pub fn api() -> Self {
        Self::new(15 * MINUTE, 100).with_block_duration(30 * MINUTE)
    }
}

/// Serialized form of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Counting window in milliseconds
    pub window_ms: u64,
    /// Attempts allowed per window
    pub max_attempts: u32,
    /// Block length in milliseconds
    #[serde(default)]
    pub block_duration_ms: Option<u64>,
}

impl PolicyRule {
    fn validate(&self, name: &str) -> Result<()> {
        if self.window_ms == 0 {
            return Err(MarketguardError::Policy(format!(
                "policy '{}' has a zero-length window",
                name
            )));
        }
        Ok(())
    }
}

impl From<&PolicyRule> for RateLimitPolicy {
    fn from(rule: &PolicyRule) -> Self {
        Self {
            window: Duration::from_millis(rule.window_ms),
            max_attempts: rule.max_attempts,
            block_duration: rule.block_duration_ms.map(Duration::from_millis),
            identifier: None,
        }
    }
}

/// Top level shape of a policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: HashMap<String, PolicyRule>,
}

/// Named policies available to callers.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<String, RateLimitPolicy>,
}

impl PolicyTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding the built-in presets.
    ///
    /// The password change preset is stored without an identifier; callers
    /// attach the user id per request.
    pub fn with_presets() -> Self {
        let mut table = Self::new();
        table.insert(REGISTRATION, RateLimitPolicy::registration());
        table.insert(PASSWORD_CHANGE, RateLimitPolicy::new(HOUR, 3).with_block_duration(2 * HOUR));
        table.insert(LOGIN, RateLimitPolicy::login());
        table.insert(API, RateLimitPolicy::api());
        table
    }

    /// Parse policies from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PolicyFile = serde_yaml::from_str(yaml).map_err(|e| {
            MarketguardError::Policy(format!("Failed to parse policy table: {}", e))
        })?;

        let mut table = Self::new();
        for (name, rule) in &file.policies {
            rule.validate(name)?;
            table.insert(name.clone(), RateLimitPolicy::from(rule));
        }
        Ok(table)
    }

    /// Load policies from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Add or replace a policy.
    pub fn insert(&mut self, name: impl Into<String>, policy: RateLimitPolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// Overlay another table; its entries win.
    pub fn merge(&mut self, other: PolicyTable) {
        self.policies.extend(other.policies);
    }

    pub fn get(&self, name: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_block_is_twice_the_window() {
        let policy = RateLimitPolicy::new(Duration::from_secs(10), 1);
        assert_eq!(policy.effective_block_duration(), Duration::from_secs(20));

        let huge = RateLimitPolicy::new(Duration::MAX, 1);
        assert_eq!(huge.effective_block_duration(), Duration::MAX);

        let policy = policy.with_block_duration(Duration::from_secs(3));
        assert_eq!(policy.effective_block_duration(), Duration::from_secs(3));
    }

    #[test]
    fn test_presets() {
        let registration = RateLimitPolicy::registration();
        assert_eq!(registration.max_attempts, 3);
        assert_eq!(registration.window, HOUR);
        assert_eq!(registration.effective_block_duration(), 2 * HOUR);

        let password = RateLimitPolicy::password_change("user-7");
        assert_eq!(password.identifier.as_deref(), Some("user-7"));

        let login = RateLimitPolicy::login();
        assert_eq!(login.max_attempts, 5);
        assert_eq!(login.window, Duration::from_secs(900));
        assert_eq!(login.effective_block_duration(), Duration::from_secs(1800));

        assert_eq!(RateLimitPolicy::api().max_attempts, 100);
    }

    #[test]
    fn test_table_presets() {
        let table = PolicyTable::with_presets();
        assert_eq!(table.len(), 4);
        assert!(table.get(PASSWORD_CHANGE).unwrap().identifier.is_none());
        assert!(table.get("checkout").is_none());
    }

    #[test]
    fn test_parse_policy_yaml() {
        let yaml = r#"
policies:
  registration:
    window_ms: 1000
    max_attempts: 2
    block_duration_ms: 5000
  listing_create:
    window_ms: 60000
    max_attempts: 10
"#;
        let table = PolicyTable::from_yaml(yaml).unwrap();
        assert_eq!(table.len(), 2);

        let registration = table.get(REGISTRATION).unwrap();
        assert_eq!(registration.window, Duration::from_millis(1000));
        assert_eq!(registration.block_duration, Some(Duration::from_millis(5000)));

        let listing = table.get("listing_create").unwrap();
        assert_eq!(listing.block_duration, None);
        assert_eq!(listing.effective_block_duration(), Duration::from_secs(120));
    }

    #[test]
    fn test_merge_overrides_presets() {
        let mut table = PolicyTable::with_presets();
        let overrides = PolicyTable::from_yaml(
            r#"
policies:
  login:
    window_ms: 60000
    max_attempts: 10
"#,
        )
        .unwrap();
        table.merge(overrides);

        assert_eq!(table.len(), 4);
        assert_eq!(table.get(LOGIN).unwrap().max_attempts, 10);
        assert_eq!(table.get(REGISTRATION).unwrap().max_attempts, 3);
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = r#"
policies:
  broken:
    window_ms: 0
    max_attempts: 1
"#;
        let err = PolicyTable::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, MarketguardError::Policy(_)));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        assert!(PolicyTable::from_yaml("policies: [1, 2").is_err());
    }
}
