//! End-to-end page session tests
//!
//! These drive a tracker the way a host page would: start the lifecycle,
//! navigate through the instrumented history, mutate the title and click
//! marked elements, then inspect what reached the collector.

use std::sync::Arc;
use std::time::Duration;

use pagebeacon_core::dom::Document;
use pagebeacon_core::identity::{MemoryCookieJar, VISITOR_COOKIE};
use pagebeacon_core::policy::{MemoryStorage, OPT_OUT_KEY};
use pagebeacon_core::transport::{RecordingTransport, ReportKind};
use pagebeacon_core::watchers::{
    ClickEvent, History, InstrumentedHistory, MemoryHistory, Navigator, TitleMutation,
};
use pagebeacon_core::{
    HostGlobals, Lifecycle, PageEnvironment, ReadyState, Services, Tracker, TrackerConfig,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

#[derive(Default)]
struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, href: &str) {
        self.visits.lock().push(href.to_string());
    }
}

struct Page {
    transport: Arc<RecordingTransport>,
    storage: Arc<MemoryStorage>,
    cookies: Arc<MemoryCookieJar>,
    navigator: Arc<RecordingNavigator>,
    doc: Document,
    globals: HostGlobals,
}

impl Page {
    fn new(transport: RecordingTransport) -> Self {
        pagebeacon_core::logging::init_test();

        let mut doc = Document::new();
        let title = doc.append_element(doc.head(), "title");
        doc.set_text(title, "Welcome");

        Self {
            transport: Arc::new(transport),
            storage: Arc::new(MemoryStorage::new()),
            cookies: Arc::new(MemoryCookieJar::new()),
            navigator: Arc::new(RecordingNavigator::default()),
            doc,
            globals: HostGlobals::new(),
        }
    }

    fn env() -> PageEnvironment {
        PageEnvironment {
            href: "https://shop.example.com/?utm_source=mail".to_string(),
            hostname: "shop.example.com".to_string(),
            referrer: "https://mail.example.net/".to_string(),
            title: Some("Welcome".to_string()),
            screen_width: 1440,
            screen_height: 900,
            language: "fr-FR".to_string(),
        }
    }

    fn config() -> TrackerConfig {
        let attrs = [
            ("src", "https://stats.example.com/script.js"),
            ("data-website-id", "94db1cb1-74f4-4a40-ad6c-962362670409"),
            ("data-tag", "spring-sale"),
            ("data-domains", "shop.example.com, example.com"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        TrackerConfig::from_script_attributes(&attrs)
    }

    fn start(&mut self, state: ReadyState) -> Lifecycle {
        let tracker = Tracker::new(
            &Self::config(),
            &Self::env(),
            Services {
                transport: self.transport.clone(),
                cookies: self.cookies.clone(),
                storage: Some(self.storage.clone()),
            },
        );
        Lifecycle::start(
            tracker,
            &self.doc,
            self.navigator.clone(),
            &mut self.globals,
            state,
        )
    }

    fn payloads(&self) -> Vec<Value> {
        self.transport
            .requests()
            .into_iter()
            .map(|r| r.payload)
            .collect()
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_session() {
    let transport = RecordingTransport::new();
    for token in ["tok-1", "tok-2", "tok-3"] {
        transport.reply_with(token);
    }
    let mut page = Page::new(transport);
    let mut lifecycle = page.start(ReadyState::Complete);
    lifecycle.take_initial_report().unwrap().await.unwrap();

    // Initial page view
    let initial = &page.payloads()[0];
    assert_eq!(initial["website"], "94db1cb1-74f4-4a40-ad6c-962362670409");
    assert_eq!(initial["hostname"], "shop.example.com");
    assert_eq!(initial["screen"], "1440x900");
    assert_eq!(initial["language"], "fr-FR");
    assert_eq!(initial["url"], "/?utm_source=mail");
    assert_eq!(initial["referrer"], "https://mail.example.net/");
    assert_eq!(initial["title"], "Welcome");
    assert_eq!(initial["tag"], "spring-sale");
    let visitor = page.cookies.cookie(VISITOR_COOKIE).unwrap().value;
    assert_eq!(initial["userTrackID"], visitor.as_str());

    // SPA navigation; the title changes before the delayed report fires
    let navigation = Arc::new(lifecycle.navigation().unwrap().clone());
    let mut history = InstrumentedHistory::new(MemoryHistory::new("/"), navigation);
    history.push_state(Value::Null, "", Some("/products/42"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let title_node = page.doc.title_element().unwrap();
    page.doc.set_text(title_node, "Product 42");
    lifecycle
        .title()
        .unwrap()
        .on_mutations(&[TitleMutation::of(&page.doc, title_node)]);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let view = &page.payloads()[1];
    assert_eq!(view["url"], "/products/42");
    assert_eq!(view["referrer"], "/?utm_source=mail");
    assert_eq!(view["title"], "Product%2042");

    // Click on a marked button nested in markup
    let button = page.doc.append_element(page.doc.body(), "button");
    page.doc.set_attribute(button, "data-umami-event", "add-to-cart");
    page.doc.set_attribute(button, "data-umami-event-sku", "42");
    page.doc.set_attribute(button, "data-umami-event-color", "blue");
    let icon = page.doc.append_element(button, "svg");

    let outcome = lifecycle
        .interaction()
        .unwrap()
        .handle_click(&page.doc, &ClickEvent::primary(icon));
    outcome.task.unwrap().await.unwrap();

    let click = &page.payloads()[2];
    assert_eq!(click["name"], "add-to-cart");
    assert_eq!(click["data"], json!({"sku": "42", "color": "blue"}));
    assert_eq!(click["url"], "/products/42");

    // Each request echoes the token from the response before it
    let tokens: Vec<_> = page
        .transport
        .requests()
        .into_iter()
        .map(|r| r.cache_token)
        .collect();
    assert_eq!(
        tokens,
        vec![None, Some("tok-1".to_string()), Some("tok-2".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_deferred_link_click_through_globals() {
    let mut page = Page::new(RecordingTransport::gated());
    let lifecycle = page.start(ReadyState::Loading);

    let link = page.doc.append_element(page.doc.body(), "a");
    page.doc.set_attribute(link, "href", "/checkout");
    page.doc.set_attribute(link, "data-umami-event", "checkout");

    let outcome = lifecycle
        .interaction()
        .unwrap()
        .handle_click(&page.doc, &ClickEvent::primary(link));
    assert!(outcome.default_prevented);

    // Host code identifying the visitor while the click report is in flight
    let tracker = page.globals.tracker().unwrap().clone();
    let identify = tokio::spawn(async move { tracker.identify(json!({"tier": "gold"})).await });

    tokio::task::yield_now().await;
    assert!(page.navigator.visits.lock().is_empty());

    page.transport.release(2);
    outcome.task.unwrap().await.unwrap();
    identify.await.unwrap();

    assert_eq!(*page.navigator.visits.lock(), vec!["/checkout".to_string()]);
    let kinds: Vec<_> = page.transport.requests().iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&ReportKind::Identify));
    assert!(kinds.contains(&ReportKind::Event));
}

#[tokio::test(start_paused = true)]
async fn test_opted_out_visitor_sends_nothing() {
    let mut page = Page::new(RecordingTransport::new());
    page.storage.set_item(OPT_OUT_KEY, "1");
    let lifecycle = page.start(ReadyState::Complete);

    assert!(!lifecycle.is_armed());
    let tracker = page.globals.tracker().unwrap().clone();
    tracker.track_page_view().await;
    tracker.track_event("manual", Some(json!({"a": 1}))).await;
    tracker.identify(json!({})).await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(page.transport.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_save_user_id_global_replaces_generated_identity() {
    let mut page = Page::new(RecordingTransport::new());
    let mut lifecycle = page.start(ReadyState::Loading);
    let generated = page.cookies.cookie(VISITOR_COOKIE).unwrap().value;
    assert!(!generated.is_empty());

    assert!(page.globals.save_user_id(&json!("crm-1234")));
    assert!(page.globals.save_user_id(&json!({"id": "ignored"})));

    let report = lifecycle.on_ready_state_change(ReadyState::Complete).unwrap();
    report.await.unwrap();
    assert!(lifecycle.take_initial_report().is_none());
    assert_eq!(page.payloads()[0]["userTrackID"], "crm-1234");
}
