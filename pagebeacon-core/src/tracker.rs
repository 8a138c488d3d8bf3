//! Tracker context and host-facing API
//!
//! A [`Tracker`] owns everything the watchers share: the tracked page state,
//! the payload builder, the identity store and the reporter. It is cheap to
//! clone; every clone refers to the same state.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::TrackerConfig;
use crate::identity::{CookieJar, IdentityStore};
use crate::page::{PageEnvironment, TrackedPageState};
use crate::payload::{EventPayload, PayloadBuilder};
use crate::policy::{KeyValueStorage, TrackingPolicy};
use crate::reporter::{Ack, Reporter};
use crate::transport::{ReportKind, Transport};

/// External collaborators a tracker is wired to
pub struct Services {
    pub transport: Arc<dyn Transport>,
    pub cookies: Arc<dyn CookieJar>,
    /// `None` when the page has no local storage
    pub storage: Option<Arc<dyn KeyValueStorage>>,
}

/// What to report through [`Tracker::track`]
pub enum TrackInput {
    /// The current page state
    PageView,
    /// A named custom event on top of the current page state
    Event { name: String, data: Option<Value> },
    /// A caller-supplied payload, sent unchanged
    Custom(Value),
    /// A payload derived from the current page state
    Build(Box<dyn FnOnce(EventPayload) -> EventPayload + Send>),
}

struct Context {
    exclude_search: bool,
    auto_track: bool,
    state: Mutex<TrackedPageState>,
    builder: PayloadBuilder,
    identity: IdentityStore,
    reporter: Reporter,
    initialized: AtomicBool,
}

/// Shared tracker state and the `track` / `identify` entry points
#[derive(Clone)]
pub struct Tracker {
    ctx: Arc<Context>,
}

impl Tracker {
    pub fn new(config: &TrackerConfig, env: &PageEnvironment, services: Services) -> Self {
        let identity = IdentityStore::new(services.cookies, env.hostname.clone());
        let policy = TrackingPolicy::new(services.storage, config.domains.clone(), &env.hostname);

        let ctx = Context {
            exclude_search: config.exclude_search,
            auto_track: config.auto_track,
            state: Mutex::new(TrackedPageState::from_environment(env, config.exclude_search)),
            builder: PayloadBuilder::new(config, env, identity.clone()),
            identity,
            reporter: Reporter::new(services.transport, policy),
            initialized: AtomicBool::new(false),
        };

        Self { ctx: Arc::new(ctx) }
    }

    pub fn auto_track(&self) -> bool {
        self.ctx.auto_track
    }

    pub fn is_disabled(&self) -> bool {
        self.ctx.reporter.is_disabled()
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.ctx.identity
    }

    pub fn reporter(&self) -> &Reporter {
        &self.ctx.reporter
    }

    /// Copy of the tracked url, referrer and title.
    pub fn page_state(&self) -> TrackedPageState {
        self.ctx.state.lock().clone()
    }

    /// Snapshot of the current page as a report payload.
    pub fn payload(&self) -> EventPayload {
        let state = self.ctx.state.lock();
        self.ctx.builder.build(&state)
    }

    pub async fn track(&self, input: TrackInput) -> Option<Ack> {
        match input {
            TrackInput::PageView => self.track_page_view().await,
            TrackInput::Event { name, data } => self.track_event(&name, data).await,
            TrackInput::Custom(payload) => self.send(&payload, ReportKind::Event).await,
            TrackInput::Build(build) => {
                let payload = build(self.payload());
                self.send(&payload, ReportKind::Event).await
            }
        }
    }

    pub async fn track_page_view(&self) -> Option<Ack> {
        let payload = self.payload();
        tracing::debug!(url = ?payload.url, "Reporting page view");
        self.send(&payload, ReportKind::Event).await
    }

    /// Report a named event. Only object or array data is kept.
    pub async fn track_event(&self, name: &str, data: Option<Value>) -> Option<Ack> {
        let data = data.filter(|d| d.is_object() || d.is_array());
        let payload = self.payload().with_event(name, data);
        tracing::debug!(event = %name, "Reporting custom event");
        self.send(&payload, ReportKind::Event).await
    }

    /// Attach visitor data to the current page state.
    pub async fn identify(&self, data: Value) -> Option<Ack> {
        let mut payload = self.payload();
        payload.data = Some(data);
        self.send(&payload, ReportKind::Identify).await
    }

    /// Host hook for a known user identifier. Non-strings are ignored.
    pub fn save_user_id(&self, candidate: &Value) {
        self.ctx.identity.save_identity(candidate);
    }

    async fn send<P>(&self, payload: &P, kind: ReportKind) -> Option<Ack>
    where
        P: serde::Serialize + Sync + ?Sized,
    {
        self.ctx.reporter.send(payload, kind).await
    }

    /// Apply a navigation to the tracked state; `true` if the url changed.
    pub(crate) fn record_navigation(&self, url: &str) -> bool {
        let mut state = self.ctx.state.lock();
        let changed = state.navigate(url, self.ctx.exclude_search);
        tracing::trace!(
            url = %state.current_url,
            referrer = %state.current_referrer,
            changed,
            "Route change"
        );
        changed
    }

    pub(crate) fn record_title(&self, title: Option<String>) {
        self.ctx.state.lock().current_title = title;
    }

    /// Flip the initialized flag; `true` only for the first caller.
    pub(crate) fn mark_initialized(&self) -> bool {
        self.ctx
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Run `report` on the current tokio runtime.
///
/// Called outside a runtime the report is dropped with a warning.
pub(crate) fn spawn_report<F>(report: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(runtime) => Some(runtime.spawn(report)),
        Err(_) => {
            tracing::warn!("No async runtime, dropping report");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::identity::MemoryCookieJar;
    use crate::transport::RecordingTransport;
    use serde_json::json;

    pub(crate) fn page_env() -> PageEnvironment {
        PageEnvironment {
            href: "https://example.com/start".to_string(),
            hostname: "example.com".to_string(),
            referrer: String::new(),
            title: Some("Start".to_string()),
            screen_width: 1280,
            screen_height: 720,
            language: "en-GB".to_string(),
        }
    }

    pub(crate) fn tracker_with(
        config: TrackerConfig,
        transport: Arc<RecordingTransport>,
    ) -> Tracker {
        Tracker::new(
            &config,
            &page_env(),
            Services {
                transport,
                cookies: Arc::new(MemoryCookieJar::new()),
                storage: None,
            },
        )
    }

    pub(crate) fn tracker() -> (Arc<RecordingTransport>, Tracker) {
        let transport = Arc::new(RecordingTransport::new());
        let config = TrackerConfig {
            website_id: Some("site-1".to_string()),
            ..Default::default()
        };
        (transport.clone(), tracker_with(config, transport))
    }

    #[tokio::test]
    async fn test_track_variants() {
        let (transport, tracker) = tracker();

        tracker.track(TrackInput::PageView).await;
        tracker
            .track(TrackInput::Event {
                name: "signup".to_string(),
                data: Some(json!({"plan": "pro"})),
            })
            .await;
        tracker
            .track(TrackInput::Custom(json!({"website": "other", "url": "/x"})))
            .await;
        tracker
            .track(TrackInput::Build(Box::new(|mut p| {
                p.url = Some("/rewritten".to_string());
                p
            })))
            .await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0].payload["url"], "/start");
        assert!(requests[0].payload.get("name").is_none());
        assert_eq!(requests[1].payload["name"], "signup");
        assert_eq!(requests[1].payload["data"]["plan"], "pro");
        assert_eq!(requests[2].payload, json!({"website": "other", "url": "/x"}));
        assert_eq!(requests[3].payload["url"], "/rewritten");
        assert_eq!(requests[3].payload["website"], "site-1");
    }

    #[tokio::test]
    async fn test_scalar_event_data_is_dropped() {
        let (transport, tracker) = tracker();
        tracker.track_event("clicked", Some(json!("scalar"))).await;
        assert!(transport.requests()[0].payload.get("data").is_none());
    }

    #[tokio::test]
    async fn test_identify_uses_identify_kind() {
        let (transport, tracker) = tracker();
        tracker.identify(json!({"plan": "team"})).await;

        let request = &transport.requests()[0];
        assert_eq!(request.kind, ReportKind::Identify);
        assert_eq!(request.payload["data"]["plan"], "team");
        assert_eq!(request.payload["url"], "/start");
    }

    #[test]
    fn test_save_user_id_flows_into_payload() {
        let (_, tracker) = tracker();
        tracker.save_user_id(&json!("user-7"));
        tracker.save_user_id(&json!(7));
        assert_eq!(tracker.payload().user_track_id, "user-7");
    }

    #[test]
    fn test_mark_initialized_once() {
        let (_, tracker) = tracker();
        let clone = tracker.clone();
        assert!(tracker.mark_initialized());
        assert!(!clone.mark_initialized());
    }
}
