//! Report payloads
//!
//! [`EventPayload`] matches the schema the collection endpoint expects under
//! the `payload` key. Absent optional fields are omitted rather than sent as
//! empty strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::identity::IdentityStore;
use crate::page::{PageEnvironment, TrackedPageState};
use crate::urls::encode_field;

/// Event data extracted from element attributes
pub type EventData = BTreeMap<String, String>;

/// Snapshot of the reportable page state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Website identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    pub hostname: String,

    /// `"{width}x{height}"`
    pub screen: String,

    pub language: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Visitor identifier (empty if none has been stored)
    #[serde(rename = "userTrackID")]
    pub user_track_id: String,

    /// Custom event name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Custom event data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl EventPayload {
    /// Attach a custom event name and data.
    pub fn with_event(mut self, name: &str, data: Option<serde_json::Value>) -> Self {
        self.name = Some(name.to_string());
        self.data = data;
        self
    }
}

/// Builds payloads from static page facts, tracked state and identity
#[derive(Clone)]
pub struct PayloadBuilder {
    website: Option<String>,
    hostname: String,
    screen: String,
    language: String,
    tag: Option<String>,
    identity: IdentityStore,
}

impl PayloadBuilder {
    pub fn new(config: &TrackerConfig, env: &PageEnvironment, identity: IdentityStore) -> Self {
        Self {
            website: config.website_id.clone(),
            hostname: env.hostname.clone(),
            screen: env.screen(),
            language: env.language.clone(),
            tag: config.tag.clone().filter(|t| !t.is_empty()),
            identity,
        }
    }

    pub fn build(&self, state: &TrackedPageState) -> EventPayload {
        EventPayload {
            website: self.website.clone(),
            hostname: self.hostname.clone(),
            screen: self.screen.clone(),
            language: self.language.clone(),
            title: encode_field(state.current_title.as_deref()),
            url: encode_field(Some(&state.current_url)),
            referrer: encode_field(Some(&state.current_referrer)),
            tag: self.tag.clone(),
            user_track_id: self.identity.get_identity(),
            name: None,
            data: None,
        }
    }
}
