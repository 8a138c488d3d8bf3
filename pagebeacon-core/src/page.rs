//! Page snapshot types
//!
//! [`PageEnvironment`] is what the host reports about the document at
//! startup. [`TrackedPageState`] is the mutable view the watchers keep up to
//! date afterwards.

use serde::{Deserialize, Serialize};

use crate::urls::normalize_url;

/// Document ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

/// Static facts about the page, captured once by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEnvironment {
    /// Full location href at startup
    pub href: String,
    /// Location hostname
    pub hostname: String,
    /// `document.referrer`
    #[serde(default)]
    pub referrer: String,
    /// `document.title`
    #[serde(default)]
    pub title: Option<String>,
    pub screen_width: u32,
    pub screen_height: u32,
    /// `navigator.language`
    pub language: String,
}

impl PageEnvironment {
    /// `"{width}x{height}"`
    pub fn screen(&self) -> String {
        format!("{}x{}", self.screen_width, self.screen_height)
    }
}

/// Current url, referrer and title as seen by the watchers.
///
/// `current_url` and `current_referrer` are only written by the navigation
/// watcher, `current_title` only by the title watcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedPageState {
    pub current_url: String,
    pub current_referrer: String,
    pub current_title: Option<String>,
}

impl TrackedPageState {
    pub fn from_environment(env: &PageEnvironment, exclude_search: bool) -> Self {
        // A referrer equal to our own hostname carries no information
        let current_referrer = if env.referrer != env.hostname {
            env.referrer.clone()
        } else {
            String::new()
        };

        Self {
            current_url: normalize_url(&env.href, exclude_search),
            current_referrer,
            current_title: env.title.clone(),
        }
    }

    /// Record a navigation; returns `true` if the normalized url changed.
    pub fn navigate(&mut self, url: &str, exclude_search: bool) -> bool {
        self.current_referrer = std::mem::take(&mut self.current_url);
        self.current_url = normalize_url(url, exclude_search);
        self.current_url != self.current_referrer
    }
}
