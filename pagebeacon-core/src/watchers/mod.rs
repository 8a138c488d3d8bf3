//! Page watchers
//!
//! Each watcher holds a [`Tracker`](crate::tracker::Tracker) clone and
//! writes exactly one part of the tracked state: navigation owns url and
//! referrer, title owns the title, interaction only reads.

pub mod interaction;
pub mod navigation;
pub mod title;

pub use interaction::{ClickDisposition, ClickEvent, ClickOutcome, InteractionWatcher, Navigator};
pub use navigation::{
    History, InstrumentedHistory, MemoryHistory, NavigationObserver, NavigationWatcher,
};
pub use title::{TitleMutation, TitleWatcher};
