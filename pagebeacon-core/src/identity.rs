//! Visitor identity persistence
//!
//! The visitor identifier lives in a long-lived cookie so reports from the
//! same browser correlate across sessions. Where the cookie actually lives is
//! up to the host: [`CookieJar`] is the seam, with an in-memory jar for pages
//! and tests and a JSON-file jar for the CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cookie holding the visitor identifier
pub const VISITOR_COOKIE: &str = "growthIQ-trid";

/// Lifetime of the visitor cookie
pub const VISITOR_COOKIE_DAYS: i64 = 1000;

/// SameSite policy of a cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "strict",
            SameSite::Lax => "lax",
            SameSite::None => "none",
        }
    }
}

/// A cookie as written by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub expires: DateTime<Utc>,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Cookie {
    /// A root-path, secure, strict cookie expiring `days` from now.
    pub fn persistent(name: &str, value: &str, domain: &str, days: i64) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            expires: Utc::now() + Duration::days(days),
            path: "/".to_string(),
            domain: domain.to_string(),
            secure: true,
            same_site: SameSite::Strict,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    /// Render the cookie the way it is assigned to `document.cookie`.
    pub fn to_header_string(&self) -> String {
        let mut out = format!(
            "{}={};expires={};path={}; domain={};",
            self.name,
            self.value,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            self.path,
            self.domain,
        );
        if self.secure {
            out.push_str(" secure;");
        }
        out.push_str(&format!(" sameSite={};", self.same_site.as_str()));
        out
    }
}

/// Iterate `name=value` pairs of a `document.cookie`-style header.
fn header_pairs(header: &str) -> impl Iterator<Item = (&str, &str)> + '_ {
    header.split(';').filter_map(|raw| {
        let cookie = raw.trim_start_matches(' ');
        cookie.split_once('=')
    })
}

/// Read one cookie value out of a `document.cookie`-style header.
///
/// The first matching entry wins; a missing cookie reads as an empty string.
pub fn cookie_value(header: &str, name: &str) -> String {
    header_pairs(header)
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

/// Persistence seam for cookies
pub trait CookieJar: Send + Sync {
    /// Current value of a live (unexpired) cookie.
    fn get(&self, name: &str) -> Option<String>;

    /// Store or replace a cookie.
    fn set(&self, cookie: Cookie) -> Result<()>;
}

/// Cookie jar held in memory
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, Cookie>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a jar from a `document.cookie`-style header.
    ///
    /// Seeded cookies get the default visitor lifetime.
    pub fn from_header(header: &str, domain: &str) -> Self {
        let mut cookies = HashMap::new();
        for (name, _) in header_pairs(header) {
            if cookies.contains_key(name) {
                continue;
            }
            let value = cookie_value(header, name);
            cookies.insert(
                name.to_string(),
                Cookie::persistent(name, &value, domain, VISITOR_COOKIE_DAYS),
            );
        }
        Self {
            cookies: Mutex::new(cookies),
        }
    }

    /// Full cookie record, including attributes.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies.lock().get(name).cloned()
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let now = Utc::now();
        self.cookies
            .lock()
            .get(name)
            .filter(|c| !c.is_expired(now))
            .map(|c| c.value.clone())
    }

    fn set(&self, cookie: Cookie) -> Result<()> {
        self.cookies.lock().insert(cookie.name.clone(), cookie);
        Ok(())
    }
}

/// Cookie jar persisted as a JSON file
///
/// The whole jar is rewritten on every `set`.
#[derive(Debug)]
pub struct FileCookieJar {
    path: PathBuf,
    cookies: Mutex<HashMap<String, Cookie>>,
}

impl FileCookieJar {
    /// Open a jar, starting empty if the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let cookies = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            cookies: Mutex::new(cookies),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CookieJar for FileCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let now = Utc::now();
        self.cookies
            .lock()
            .get(name)
            .filter(|c| !c.is_expired(now))
            .map(|c| c.value.clone())
    }

    fn set(&self, cookie: Cookie) -> Result<()> {
        let mut cookies = self.cookies.lock();
        cookies.insert(cookie.name.clone(), cookie);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&*cookies)?;
        std::fs::write(&self.path, content)
            .map_err(|e| Error::Storage(format!("failed to write {:?}: {}", self.path, e)))
    }
}

/// Reads and writes the durable visitor identifier
#[derive(Clone)]
pub struct IdentityStore {
    jar: Arc<dyn CookieJar>,
    hostname: String,
}

impl IdentityStore {
    pub fn new(jar: Arc<dyn CookieJar>, hostname: impl Into<String>) -> Self {
        Self {
            jar,
            hostname: hostname.into(),
        }
    }

    /// The stored identifier, or an empty string if none exists.
    pub fn get_identity(&self) -> String {
        self.jar.get(VISITOR_COOKIE).unwrap_or_default()
    }

    /// Write a fresh identifier if none is stored yet.
    pub fn ensure_identity(&self) {
        if self.get_identity().is_empty() {
            let id = uuid::Uuid::new_v4().to_string();
            tracing::debug!(visitor = %id, "Generated visitor identifier");
            self.write(&id);
        }
    }

    /// Host-supplied identifier. Anything but a JSON string is ignored.
    pub fn save_identity(&self, candidate: &serde_json::Value) {
        match candidate.as_str() {
            Some(id) => self.write(id),
            None => tracing::debug!("Ignoring non-string visitor identifier"),
        }
    }

    fn write(&self, id: &str) {
        let cookie = Cookie::persistent(VISITOR_COOKIE, id, &self.hostname, VISITOR_COOKIE_DAYS);
        if let Err(e) = self.jar.set(cookie) {
            tracing::warn!(error = %e, "Failed to persist visitor identifier");
        }
    }
}
