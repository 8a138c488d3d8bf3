//! # pagebeacon-core
//!
//! Core library for pagebeacon - a page-view and interaction beacon.
//!
//! This library provides:
//! - Route change detection for single-page applications
//! - Title tracking and declarative click tracking
//! - Visitor identity persistence and dedupe-token handling
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A [`Tracker`] is the shared context. Watchers hold clones of it:
//! - **Navigation:** route changes update url/referrer and schedule a page view
//! - **Title:** title mutations update the tracked title
//! - **Interaction:** clicks on marked elements report custom events
//!
//! Every report goes through the [`Reporter`], which honors the opt-out
//! policy and never surfaces delivery failures to the page.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagebeacon_core::identity::MemoryCookieJar;
//! use pagebeacon_core::transport::HttpTransport;
//! use pagebeacon_core::{Config, PageEnvironment, Services, Tracker};
//!
//! # async fn run() -> pagebeacon_core::Result<()> {
//! let config = Config::load()?;
//! let transport = HttpTransport::new(&config.tracker.endpoint()?)?;
//! let env = PageEnvironment {
//!     href: "https://example.com/".to_string(),
//!     hostname: "example.com".to_string(),
//!     referrer: String::new(),
//!     title: Some("Home".to_string()),
//!     screen_width: 1920,
//!     screen_height: 1080,
//!     language: "en-US".to_string(),
//! };
//! let tracker = Tracker::new(
//!     &config.tracker,
//!     &env,
//!     Services {
//!         transport: Arc::new(transport),
//!         cookies: Arc::new(MemoryCookieJar::new()),
//!         storage: None,
//!     },
//! );
//! tracker.track_page_view().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, TrackerConfig};
pub use error::{Error, Result, TransportError};
pub use lifecycle::{HostGlobals, Lifecycle};
pub use page::{PageEnvironment, ReadyState, TrackedPageState};
pub use payload::{EventData, EventPayload};
pub use reporter::{Ack, Reporter};
pub use tracker::{Services, TrackInput, Tracker};

// Public modules
pub mod config;
pub mod dom;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod logging;
pub mod page;
pub mod payload;
pub mod policy;
pub mod reporter;
pub mod tracker;
pub mod transport;
pub mod urls;
pub mod watchers;
