//! Startup wiring
//!
//! [`Lifecycle::start`] installs the host globals, arms the watchers when
//! auto-tracking is on and tracking is allowed, and sends exactly one initial
//! page view once the document is complete.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::dom::Document;
use crate::identity::IdentityStore;
use crate::page::ReadyState;
use crate::tracker::Tracker;
use crate::watchers::{InteractionWatcher, NavigationWatcher, Navigator, TitleWatcher};

/// Global holding the `track` / `identify` API
pub const TRACKER_GLOBAL: &str = "umami";

/// Global holding the user identifier hook
pub const SAVE_USER_ID_GLOBAL: &str = "saveUserID";

/// A value occupying a page global
#[derive(Clone)]
pub enum GlobalEntry {
    Tracker(Tracker),
    SaveUserId(IdentityStore),
    /// Something the host page put there itself
    Foreign(Value),
}

/// Page-global namespace shared with the host
#[derive(Default, Clone)]
pub struct HostGlobals {
    entries: HashMap<String, GlobalEntry>,
}

impl HostGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `entry` under `name` unless something is already there.
    pub fn install(&mut self, name: &str, entry: GlobalEntry) -> bool {
        if self.entries.contains_key(name) {
            tracing::debug!(global = %name, "Global already defined, leaving it untouched");
            return false;
        }
        self.entries.insert(name.to_string(), entry);
        true
    }

    pub fn get(&self, name: &str) -> Option<&GlobalEntry> {
        self.entries.get(name)
    }

    /// The tracker installed as [`TRACKER_GLOBAL`], if it is ours.
    pub fn tracker(&self) -> Option<&Tracker> {
        match self.get(TRACKER_GLOBAL)? {
            GlobalEntry::Tracker(tracker) => Some(tracker),
            _ => None,
        }
    }

    /// Call the [`SAVE_USER_ID_GLOBAL`] hook; `false` if it is not ours.
    pub fn save_user_id(&self, candidate: &Value) -> bool {
        match self.get(SAVE_USER_ID_GLOBAL) {
            Some(GlobalEntry::SaveUserId(identity)) => {
                identity.save_identity(candidate);
                true
            }
            _ => false,
        }
    }
}

/// Armed watchers plus the initial page view guard
pub struct Lifecycle {
    tracker: Tracker,
    navigation: Option<NavigationWatcher>,
    title: Option<TitleWatcher>,
    interaction: Option<InteractionWatcher>,
    initial_report: Option<JoinHandle<()>>,
}

impl Lifecycle {
    /// Wire the tracker into the page. Must be called from within a tokio
    /// runtime.
    ///
    /// `ready_state` is the document's state right now; later transitions go
    /// through [`Lifecycle::on_ready_state_change`].
    pub fn start(
        tracker: Tracker,
        doc: &Document,
        navigator: Arc<dyn Navigator>,
        globals: &mut HostGlobals,
        ready_state: ReadyState,
    ) -> Self {
        globals.install(TRACKER_GLOBAL, GlobalEntry::Tracker(tracker.clone()));
        globals.install(
            SAVE_USER_ID_GLOBAL,
            GlobalEntry::SaveUserId(tracker.identity().clone()),
        );

        let mut lifecycle = Self {
            tracker: tracker.clone(),
            navigation: None,
            title: None,
            interaction: None,
            initial_report: None,
        };

        if !tracker.auto_track() || tracker.is_disabled() {
            tracing::debug!(
                auto_track = tracker.auto_track(),
                "Automatic tracking not armed"
            );
            return lifecycle;
        }

        lifecycle.navigation = Some(NavigationWatcher::new(tracker.clone()));
        lifecycle.title = TitleWatcher::attach(tracker.clone(), doc);
        lifecycle.interaction = Some(InteractionWatcher::new(tracker.clone(), navigator));
        tracker.identity().ensure_identity();

        tracing::info!(
            title_watcher = lifecycle.title.is_some(),
            "Tracker armed"
        );

        lifecycle.initial_report = lifecycle.on_ready_state_change(ready_state);
        lifecycle
    }

    /// Ready-state listener. Sends the initial page view the first time the
    /// document is complete.
    ///
    /// Outside a tokio runtime the page stays uninitialized, so a later
    /// call from within one still sends it.
    pub fn on_ready_state_change(&self, state: ReadyState) -> Option<JoinHandle<()>> {
        if self.navigation.is_none() || state != ReadyState::Complete {
            return None;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No async runtime, initial page view not sent");
            return None;
        };
        if !self.tracker.mark_initialized() {
            return None;
        }

        let tracker = self.tracker.clone();
        Some(runtime.spawn(async move {
            tracker.track_page_view().await;
        }))
    }

    /// The initial page view, if it was sent during `start`.
    pub fn take_initial_report(&mut self) -> Option<JoinHandle<()>> {
        self.initial_report.take()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn is_armed(&self) -> bool {
        self.navigation.is_some()
    }

    pub fn navigation(&self) -> Option<&NavigationWatcher> {
        self.navigation.as_ref()
    }

    pub fn title(&self) -> Option<&TitleWatcher> {
        self.title.as_ref()
    }

    pub fn interaction(&self) -> Option<&InteractionWatcher> {
        self.interaction.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::tracker::tests::{tracker, tracker_with};
    use crate::transport::RecordingTransport;
    use serde_json::json;

    struct NoopNavigator;

    impl Navigator for NoopNavigator {
        fn navigate(&self, _href: &str) {}
    }

    fn start(tracker: Tracker, globals: &mut HostGlobals, state: ReadyState) -> Lifecycle {
        Lifecycle::start(tracker, &Document::new(), Arc::new(NoopNavigator), globals, state)
    }

    #[tokio::test]
    async fn test_initial_page_view_when_already_complete() {
        let (transport, tracker) = tracker();
        let mut lifecycle = start(tracker.clone(), &mut HostGlobals::new(), ReadyState::Complete);

        assert!(lifecycle.is_armed());
        assert!(!tracker.identity().get_identity().is_empty());
        lifecycle.take_initial_report().unwrap().await.unwrap();
        assert_eq!(transport.request_count(), 1);

        // Later listener calls never double-report
        assert!(lifecycle.on_ready_state_change(ReadyState::Complete).is_none());
    }

    #[tokio::test]
    async fn test_initial_page_view_waits_for_complete() {
        let (transport, tracker) = tracker();
        let mut lifecycle = start(tracker, &mut HostGlobals::new(), ReadyState::Loading);
        assert!(lifecycle.take_initial_report().is_none());

        assert!(lifecycle.on_ready_state_change(ReadyState::Interactive).is_none());
        let first = lifecycle.on_ready_state_change(ReadyState::Complete).unwrap();
        assert!(lifecycle.on_ready_state_change(ReadyState::Complete).is_none());
        first.await.unwrap();

        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_initial_page_view_waits_for_a_runtime() {
        let (transport, tracker) = tracker();
        let mut lifecycle = start(tracker, &mut HostGlobals::new(), ReadyState::Complete);
        assert!(lifecycle.is_armed());
        assert!(lifecycle.take_initial_report().is_none());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let report = lifecycle.on_ready_state_change(ReadyState::Complete).unwrap();
            report.await.unwrap();
        });
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_auto_track_off_arms_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let config = TrackerConfig {
            auto_track: false,
            ..Default::default()
        };
        let tracker = tracker_with(config, transport.clone());
        let mut globals = HostGlobals::new();
        let lifecycle = start(tracker.clone(), &mut globals, ReadyState::Complete);

        assert!(!lifecycle.is_armed());
        assert!(lifecycle.interaction().is_none());
        assert!(lifecycle.on_ready_state_change(ReadyState::Complete).is_none());
        assert_eq!(tracker.identity().get_identity(), "");

        // The host API still works
        globals.tracker().unwrap().track_event("manual", None).await;
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_tracking_arms_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let config = TrackerConfig {
            domains: vec!["elsewhere.org".to_string()],
            ..Default::default()
        };
        let tracker = tracker_with(config, transport.clone());
        let lifecycle = start(tracker, &mut HostGlobals::new(), ReadyState::Complete);

        assert!(!lifecycle.is_armed());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_globals_are_never_overwritten() {
        let (_, tracker) = tracker();
        let mut globals = HostGlobals::new();
        globals.install(TRACKER_GLOBAL, GlobalEntry::Foreign(json!("host-owned")));

        start(tracker.clone(), &mut globals, ReadyState::Loading);

        assert!(globals.tracker().is_none());
        assert!(matches!(
            globals.get(TRACKER_GLOBAL),
            Some(GlobalEntry::Foreign(_))
        ));

        assert!(globals.save_user_id(&json!("from-host")));
        assert!(globals.save_user_id(&json!(12)));
        assert_eq!(tracker.identity().get_identity(), "from-host");
    }

    #[tokio::test]
    async fn test_title_watcher_armed_only_with_title_element() {
        let (_, tracker) = tracker();
        let mut doc = Document::new();
        doc.append_element(doc.head(), "title");

        let lifecycle = Lifecycle::start(
            tracker,
            &doc,
            Arc::new(NoopNavigator),
            &mut HostGlobals::new(),
            ReadyState::Loading,
        );
        assert!(lifecycle.title().is_some());
        assert!(lifecycle.navigation().is_some());
    }
}
