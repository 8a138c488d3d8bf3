//! Single-page-application route change detection
//!
//! The host's router (or [`InstrumentedHistory`] around its history object)
//! calls [`NavigationObserver::on_route_change`] with the target url before
//! performing the navigation. Each real url change schedules its own
//! delayed page view; nothing is coalesced or cancelled.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::tracker::{spawn_report, Tracker};

/// Delay between a route change and its page view report
pub const NAVIGATION_REPORT_DELAY: Duration = Duration::from_millis(300);

/// Receives route changes from the host's router
pub trait NavigationObserver: Send + Sync {
    /// `url` is `None` when the history call carried no url.
    fn on_route_change(&self, url: Option<&str>);
}

/// Turns route changes into delayed page view reports
#[derive(Clone)]
pub struct NavigationWatcher {
    tracker: Tracker,
    delay: Duration,
}

impl NavigationWatcher {
    pub fn new(tracker: Tracker) -> Self {
        Self::with_delay(tracker, NAVIGATION_REPORT_DELAY)
    }

    pub fn with_delay(tracker: Tracker, delay: Duration) -> Self {
        Self { tracker, delay }
    }

    /// Handle a route change, returning the scheduled report if the
    /// normalized url changed.
    ///
    /// The tracked state is updated even when no runtime is available to
    /// run the report.
    pub fn route_changed(&self, url: Option<&str>) -> Option<JoinHandle<()>> {
        let url = url?;
        if !self.tracker.record_navigation(url) {
            return None;
        }

        let tracker = self.tracker.clone();
        let delay = self.delay;
        spawn_report(async move {
            tokio::time::sleep(delay).await;
            tracker.track_page_view().await;
        })
    }
}

impl NavigationObserver for NavigationWatcher {
    fn on_route_change(&self, url: Option<&str>) {
        // The report task runs detached
        let _ = self.route_changed(url);
    }
}

/// The two history mutation primitives
pub trait History {
    fn push_state(&mut self, state: Value, title: &str, url: Option<&str>);
    fn replace_state(&mut self, state: Value, title: &str, url: Option<&str>);
}

/// History wrapper that notifies an observer before each push/replace
pub struct InstrumentedHistory<H> {
    inner: H,
    observer: Arc<dyn NavigationObserver>,
}

impl<H: History> InstrumentedHistory<H> {
    pub fn new(inner: H, observer: Arc<dyn NavigationObserver>) -> Self {
        Self { inner, observer }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: History> History for InstrumentedHistory<H> {
    fn push_state(&mut self, state: Value, title: &str, url: Option<&str>) {
        self.observer.on_route_change(url);
        self.inner.push_state(state, title, url);
    }

    fn replace_state(&mut self, state: Value, title: &str, url: Option<&str>) {
        self.observer.on_route_change(url);
        self.inner.replace_state(state, title, url);
    }
}

/// History kept in memory: a stack of urls with a cursor
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    entries: Vec<String>,
    index: usize,
}

impl MemoryHistory {
    pub fn new(initial_url: &str) -> Self {
        Self {
            entries: vec![initial_url.to_string()],
            index: 0,
        }
    }

    pub fn current(&self) -> &str {
        &self.entries[self.index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl History for MemoryHistory {
    fn push_state(&mut self, _state: Value, _title: &str, url: Option<&str>) {
        let next = url.unwrap_or(self.current()).to_string();
        self.entries.truncate(self.index + 1);
        self.entries.push(next);
        self.index += 1;
    }

    fn replace_state(&mut self, _state: Value, _title: &str, url: Option<&str>) {
        if let Some(url) = url {
            self.entries[self.index] = url.to_string();
        }
    }
}
