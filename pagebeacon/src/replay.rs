//! Scripted browsing sessions
//!
//! A replay file is a JSON list of steps, each an object with a single key:
//!
//! ```json
//! [
//!   {"navigate": "/pricing"},
//!   {"title": "Pricing"},
//!   {"event": {"name": "signup", "data": {"plan": "pro"}}},
//!   {"click": {"tag": "a", "attributes": {"href": "/docs", "data-umami-event": "docs"}}},
//!   {"wait": 500}
//! ]
//! ```
//!
//! Steps go through the same watchers an instrumented page arms, including
//! the real navigation report delay.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pagebeacon_core::dom::Document;
use pagebeacon_core::watchers::{
    ClickDisposition, ClickEvent, History, InstrumentedHistory, MemoryHistory,
    NavigationObserver, NavigationWatcher, Navigator, TitleMutation,
};
use pagebeacon_core::{HostGlobals, Lifecycle, PageEnvironment, ReadyState, Tracker};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;

/// One scripted action
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// `history.pushState` to this url
    Navigate(String),
    /// `history.replaceState` to this url
    Replace(String),
    /// New document title text
    Title(String),
    /// Direct `track(name, data)` call
    Event {
        name: String,
        #[serde(default)]
        data: Option<Value>,
    },
    /// Click on a freshly appended element
    Click {
        #[serde(default = "default_click_tag")]
        tag: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
        #[serde(default)]
        ctrl_key: bool,
    },
    /// Direct `identify(data)` call
    Identify(Value),
    /// Pause in milliseconds
    Wait(u64),
}

fn default_click_tag() -> String {
    "button".to_string()
}

/// Load steps from a replay file
pub fn load_steps(path: &Path) -> Result<Vec<Step>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read replay file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse replay file {}", path.display()))
}

/// What a replay did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub navigations: usize,
    pub events: usize,
    pub final_url: String,
}

/// Navigation observer that keeps the scheduled reports so the replay can
/// wait for them before exiting
struct PendingReports {
    watcher: NavigationWatcher,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl NavigationObserver for PendingReports {
    fn on_route_change(&self, url: Option<&str>) {
        if let Some(task) = self.watcher.route_changed(url) {
            self.pending.lock().push(task);
        }
    }
}

/// Deferred link navigations are logged; there is no page to leave.
struct LoggedNavigator;

impl Navigator for LoggedNavigator {
    fn navigate(&self, href: &str) {
        tracing::info!(href = %href, "Following deferred link");
    }
}

/// Run `steps` against a page described by `env`.
pub async fn run(tracker: Tracker, env: &PageEnvironment, steps: &[Step]) -> Result<ReplaySummary> {
    let mut doc = Document::new();
    let title_node = doc.append_element(doc.head(), "title");
    if let Some(title) = &env.title {
        doc.set_text(title_node, title);
    }

    let mut globals = HostGlobals::new();
    let mut lifecycle = Lifecycle::start(
        tracker.clone(),
        &doc,
        Arc::new(LoggedNavigator),
        &mut globals,
        ReadyState::Complete,
    );
    if let Some(initial) = lifecycle.take_initial_report() {
        initial.await.context("initial page view task failed")?;
    }

    let observer = lifecycle.navigation().map(|watcher| {
        Arc::new(PendingReports {
            watcher: watcher.clone(),
            pending: Mutex::new(Vec::new()),
        })
    });
    let mut history: Box<dyn History> = match &observer {
        Some(observer) => Box::new(InstrumentedHistory::new(
            MemoryHistory::new(&env.href),
            observer.clone() as Arc<dyn NavigationObserver>,
        )),
        None => Box::new(MemoryHistory::new(&env.href)),
    };

    let mut summary = ReplaySummary::default();

    for (index, step) in steps.iter().enumerate() {
        tracing::debug!(index, step = ?step, "Replaying step");
        match step {
            Step::Navigate(url) => history.push_state(Value::Null, "", Some(url)),
            Step::Replace(url) => history.replace_state(Value::Null, "", Some(url)),
            Step::Title(text) => {
                doc.set_text(title_node, text);
                if let Some(watcher) = lifecycle.title() {
                    watcher.on_mutations(&[TitleMutation::of(&doc, title_node)]);
                }
            }
            Step::Event { name, data } => {
                tracker.track_event(name, data.clone()).await;
                summary.events += 1;
            }
            Step::Click {
                tag,
                attributes,
                ctrl_key,
            } => {
                let target = doc.append_element(doc.body(), tag);
                for (name, value) in attributes {
                    doc.set_attribute(target, name, value);
                }
                let Some(interaction) = lifecycle.interaction() else {
                    continue;
                };
                let click = ClickEvent {
                    ctrl_key: *ctrl_key,
                    ..ClickEvent::primary(target)
                };
                let outcome = interaction.handle_click(&doc, &click);
                if outcome.disposition != ClickDisposition::Ignored {
                    summary.events += 1;
                }
                if let Some(task) = outcome.task {
                    task.await.context("click report task failed")?;
                }
            }
            Step::Identify(data) => {
                tracker.identify(data.clone()).await;
            }
            Step::Wait(millis) => tokio::time::sleep(Duration::from_millis(*millis)).await,
        }
    }

    if let Some(observer) = &observer {
        let pending = std::mem::take(&mut *observer.pending.lock());
        summary.navigations = pending.len();
        for task in pending {
            task.await.context("page view task failed")?;
        }
    }

    summary.final_url = tracker.page_state().current_url;
    Ok(summary)
}
