//! Tracking-disabled predicate
//!
//! Tracking is off when the visitor has opted out through local storage, or
//! when an allow-list of domains is configured and the page host is not on it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Local-storage key whose presence disables tracking
pub const OPT_OUT_KEY: &str = "umami.disabled";

/// Key/value storage seam (the page's local storage)
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
}

/// Key/value storage held in memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_item(&self, key: &str, value: &str) {
        self.items.lock().insert(key.to_string(), value.to_string());
    }

    pub fn remove_item(&self, key: &str) {
        self.items.lock().remove(key);
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }
}

/// Decides whether reports may leave the page
#[derive(Clone)]
pub struct TrackingPolicy {
    storage: Option<Arc<dyn KeyValueStorage>>,
    domains: Vec<String>,
    hostname: String,
}

impl TrackingPolicy {
    /// `storage` is `None` when the page has no local storage at all.
    pub fn new(
        storage: Option<Arc<dyn KeyValueStorage>>,
        domains: Vec<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            domains,
            hostname: hostname.into(),
        }
    }

    /// A policy that never disables tracking.
    pub fn allow_all(hostname: impl Into<String>) -> Self {
        Self::new(None, vec![], hostname)
    }

    pub fn is_disabled(&self) -> bool {
        let opted_out = self
            .storage
            .as_ref()
            .and_then(|s| s.get_item(OPT_OUT_KEY))
            .is_some_and(|v| !v.is_empty());

        opted_out || (!self.domains.is_empty() && !self.domains.contains(&self.hostname))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_storage_no_domains_is_enabled() {
        assert!(!TrackingPolicy::allow_all("example.com").is_disabled());
    }

    #[test]
    fn test_opt_out_flag_disables() {
        let storage = Arc::new(MemoryStorage::new());
        let policy = TrackingPolicy::new(Some(storage.clone()), vec![], "example.com");
        assert!(!policy.is_disabled());

        storage.set_item(OPT_OUT_KEY, "1");
        assert!(policy.is_disabled());

        storage.set_item(OPT_OUT_KEY, "");
        assert!(!policy.is_disabled());

        storage.remove_item(OPT_OUT_KEY);
        assert!(!policy.is_disabled());
    }

    #[test]
    fn test_domain_allow_list() {
        let domains = vec!["example.com".to_string(), "www.example.com".to_string()];

        let policy = TrackingPolicy::new(None, domains.clone(), "www.example.com");
        assert!(!policy.is_disabled());

        let policy = TrackingPolicy::new(None, domains, "staging.example.com");
        assert!(policy.is_disabled());
    }
}
