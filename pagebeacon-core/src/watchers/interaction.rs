//! Declarative click tracking
//!
//! One document-level capturing click handler. Elements opt in with a
//! `data-umami-event` attribute and carry event data as
//! `data-umami-event-<key>` attributes. For same-tab links the default
//! navigation is prevented and replayed once the report has settled.
//!
//! ```text
//! Clicked ──► EventReportInFlight ──► NavigationTriggered
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::dom::{Document, Element, NodeId};
use crate::payload::EventData;
use crate::tracker::{spawn_report, Tracker};

/// Attribute naming the event an element reports
pub const EVENT_NAME_ATTRIBUTE: &str = "data-umami-event";

/// Prefix of attributes carrying event data
pub const EVENT_DATA_PREFIX: &str = "data-umami-event-";

/// How many levels (the clicked element included) are searched for a link
/// or button
pub const MAX_SEARCH_DEPTH: usize = 10;

/// Mouse button number of the middle button
const MIDDLE_BUTTON: i16 = 1;

/// Performs real navigation (`location.href = ...`)
pub trait Navigator: Send + Sync {
    fn navigate(&self, href: &str);
}

/// A click as seen by the capturing listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub target: NodeId,
    pub button: i16,
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
}

impl ClickEvent {
    /// Plain primary-button click on `target`
    pub fn primary(target: NodeId) -> Self {
        Self {
            target,
            button: 0,
            ctrl_key: false,
            shift_key: false,
            meta_key: false,
        }
    }

    fn is_modified(&self) -> bool {
        self.ctrl_key || self.shift_key || self.meta_key || self.button == MIDDLE_BUTTON
    }
}

/// What the click handler decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickDisposition {
    /// Not trackable; the browser proceeds untouched
    Ignored,
    /// Event reported, nothing deferred
    Reported,
    /// Default navigation prevented; `href` is opened after the report settles
    NavigationDeferred { href: String },
    /// Link leaves the tab; reported while the browser navigates
    ExternalNavigation,
}

/// Result of handling one click
#[derive(Debug)]
pub struct ClickOutcome {
    /// Set before any report is started
    pub default_prevented: bool,
    pub disposition: ClickDisposition,
    /// The in-flight report (and deferred navigation)
    pub task: Option<JoinHandle<()>>,
}

impl ClickOutcome {
    fn ignored() -> Self {
        Self {
            default_prevented: false,
            disposition: ClickDisposition::Ignored,
            task: None,
        }
    }
}

fn is_special_tag(el: &Element) -> bool {
    matches!(el.tag_name(), "A" | "BUTTON")
}

/// Collect `data-umami-event-<key>` attributes into event data.
///
/// The key is the run of word characters and hyphens after the prefix.
pub fn extract_event_data(el: &Element) -> EventData {
    el.attributes()
        .filter_map(|(name, value)| {
            let rest = name.strip_prefix(EVENT_DATA_PREFIX)?;
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
                .unwrap_or(rest.len());
            let key = &rest[..end];
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// A trackable element's name and data
struct TrackedElement {
    name: String,
    data: EventData,
}

impl TrackedElement {
    fn from_element(el: &Element) -> Option<Self> {
        let name = el.get_attribute(EVENT_NAME_ATTRIBUTE).filter(|n| !n.is_empty())?;
        Some(Self {
            name: name.to_string(),
            data: extract_event_data(el),
        })
    }
}

/// Reports clicks on declaratively marked elements
#[derive(Clone)]
pub struct InteractionWatcher {
    tracker: Tracker,
    navigator: Arc<dyn Navigator>,
}

impl InteractionWatcher {
    pub fn new(tracker: Tracker, navigator: Arc<dyn Navigator>) -> Self {
        Self { tracker, navigator }
    }

    /// Handle a click.
    ///
    /// `default_prevented` is decided synchronously; reporting and any
    /// deferred navigation happen on the returned task. Without a tokio
    /// runtime nothing is reported and the default action is left alone.
    pub fn handle_click(&self, doc: &Document, event: &ClickEvent) -> ClickOutcome {
        let candidate = match doc.closest(event.target, MAX_SEARCH_DEPTH, is_special_tag) {
            Some(node) => node,
            None => {
                // Marked elements that are neither links nor buttons
                return match TrackedElement::from_element(doc.element(event.target)) {
                    Some(tracked) => self.report(tracked, ClickDisposition::Reported),
                    None => ClickOutcome::ignored(),
                };
            }
        };

        let el = doc.element(candidate);
        let Some(tracked) = TrackedElement::from_element(el) else {
            return ClickOutcome::ignored();
        };

        if el.tag_name() != "A" {
            return self.report(tracked, ClickDisposition::Reported);
        }

        let Some(href) = el.get_attribute("href").filter(|h| !h.is_empty()) else {
            return ClickOutcome::ignored();
        };

        let external = el.get_attribute("target") == Some("_blank") || event.is_modified();
        if external {
            return self.report(tracked, ClickDisposition::ExternalNavigation);
        }

        self.report(
            tracked,
            ClickDisposition::NavigationDeferred {
                href: href.to_string(),
            },
        )
    }

    fn report(&self, tracked: TrackedElement, disposition: ClickDisposition) -> ClickOutcome {
        let default_prevented = matches!(disposition, ClickDisposition::NavigationDeferred { .. });
        let tracker = self.tracker.clone();
        let navigator = self.navigator.clone();
        let deferred = match &disposition {
            ClickDisposition::NavigationDeferred { href } => Some(href.clone()),
            _ => None,
        };

        let task = spawn_report(async move {
            let data = serde_json::to_value(&tracked.data).ok();
            tracker.track_event(&tracked.name, data).await;

            // Navigation follows completion, not success
            if let Some(href) = deferred {
                tracing::trace!(href = %href, "Resuming deferred navigation");
                navigator.navigate(&href);
            }
        });
        let Some(task) = task else {
            return ClickOutcome::ignored();
        };

        ClickOutcome {
            default_prevented,
            disposition,
            task: Some(task),
        }
    }
}
