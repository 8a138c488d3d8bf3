//! Document title tracking
//!
//! Pages often set their title after rendering a route. The host forwards
//! mutation batches observed on the `head > title` element and the watcher
//! copies the new text into the tracked state. Without a title element the
//! watcher is never created and the initial title is kept.

use crate::dom::{Document, NodeId};
use crate::tracker::Tracker;

/// One observed mutation of the title element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMutation {
    /// Text content of the mutation target, if it had one
    pub target_text: Option<String>,
}

impl TitleMutation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            target_text: Some(text.into()),
        }
    }

    /// Mutation record for the current state of `node`.
    pub fn of(doc: &Document, node: NodeId) -> Self {
        Self::new(doc.element(node).text())
    }
}

/// Keeps the tracked title in sync with the title element
#[derive(Clone)]
pub struct TitleWatcher {
    tracker: Tracker,
    node: NodeId,
}

impl TitleWatcher {
    /// Watch the document's title element; `None` if it has none.
    pub fn attach(tracker: Tracker, doc: &Document) -> Option<Self> {
        let node = doc.title_element()?;
        Some(Self { tracker, node })
    }

    /// The observed title element
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Apply a batch of mutation records. The first record wins.
    pub fn on_mutations(&self, records: &[TitleMutation]) {
        let title = records.first().and_then(|r| r.target_text.clone());
        tracing::trace!(title = ?title, "Title changed");
        self.tracker.record_title(title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::tests::tracker;

    #[test]
    fn test_inert_without_title_element() {
        let (_, tracker) = tracker();
        assert!(TitleWatcher::attach(tracker.clone(), &Document::new()).is_none());
        assert_eq!(tracker.page_state().current_title.as_deref(), Some("Start"));
    }

    #[test]
    fn test_first_record_wins() {
        let (_, tracker) = tracker();
        let mut doc = Document::new();
        let title = doc.append_element(doc.head(), "title");
        let watcher = TitleWatcher::attach(tracker.clone(), &doc).unwrap();
        assert_eq!(watcher.node(), title);

        doc.set_text(title, "Pricing");
        watcher.on_mutations(&[TitleMutation::of(&doc, title), TitleMutation::new("Later")]);
        assert_eq!(tracker.page_state().current_title.as_deref(), Some("Pricing"));
        assert_eq!(tracker.payload().title.as_deref(), Some("Pricing"));
    }

    #[test]
    fn test_empty_batch_clears_title() {
        let (_, tracker) = tracker();
        let mut doc = Document::new();
        doc.append_element(doc.head(), "title");
        let watcher = TitleWatcher::attach(tracker.clone(), &doc).unwrap();

        watcher.on_mutations(&[]);
        assert_eq!(tracker.page_state().current_title, None);
        assert_eq!(tracker.payload().title, None);
    }
}
