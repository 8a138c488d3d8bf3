//! Minimal element tree
//!
//! Just enough of a document for instrumentation: tag names, attributes,
//! parent links and text. Hosts mirror the parts of their DOM that matter
//! (clickable elements and the `head > title` node) into a [`Document`].

/// Handle to a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// An element: upper-case tag name, ordered attributes, text content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag_name: String,
    attributes: Vec<(String, String)>,
    text: String,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag_name: tag.to_ascii_uppercase(),
            attributes: Vec::new(),
            text: String::new(),
        }
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.attributes
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(key, _)| key.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn set_attribute(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attributes.push((name, value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    element: Element,
}

/// Arena of elements rooted at `<html>`
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    head: NodeId,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// `<html><head></head><body></body></html>`
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                element: Element::new("html"),
            }],
            head: NodeId(0),
            body: NodeId(0),
        };
        let root = doc.root();
        doc.head = doc.append_element(root, "head");
        doc.body = doc.append_element(root, "body");
        doc
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Append a new element as the last child of `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            element: Element::new(tag),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        self.nodes[id.0].element.set_attribute(name, value);
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id.0].element.text = text.to_string();
    }

    pub fn element(&self, id: NodeId) -> &Element {
        &self.nodes[id.0].element
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// The `head > title` element, if any.
    pub fn title_element(&self) -> Option<NodeId> {
        self.children(self.head)
            .iter()
            .copied()
            .find(|&id| self.element(id).tag_name() == "TITLE")
    }

    /// Check `id` and up to `max_depth - 1` ancestors for a matching element.
    pub fn closest(
        &self,
        id: NodeId,
        max_depth: usize,
        predicate: impl Fn(&Element) -> bool,
    ) -> Option<NodeId> {
        let mut current = Some(id);
        for _ in 0..max_depth {
            let node = current?;
            if predicate(self.element(node)) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_skeleton() {
        let doc = Document::new();
        assert_eq!(doc.element(doc.root()).tag_name(), "HTML");
        assert_eq!(doc.element(doc.head()).tag_name(), "HEAD");
        assert_eq!(doc.parent(doc.body()), Some(doc.root()));
        assert_eq!(doc.title_element(), None);
    }

    #[test]
    fn test_attributes_are_case_insensitive() {
        let mut doc = Document::new();
        let link = doc.append_element(doc.body(), "a");
        doc.set_attribute(link, "HREF", "/one");
        doc.set_attribute(link, "href", "/two");

        let el = doc.element(link);
        assert_eq!(el.tag_name(), "A");
        assert_eq!(el.get_attribute("Href"), Some("/two"));
        assert_eq!(el.attribute_names().collect::<Vec<_>>(), vec!["href"]);
    }

    #[test]
    fn test_title_element_lookup() {
        let mut doc = Document::new();
        let body_title = doc.append_element(doc.body(), "title");
        assert_eq!(doc.title_element(), None);

        let title = doc.append_element(doc.head(), "title");
        doc.set_text(title, "Hello");
        assert_eq!(doc.title_element(), Some(title));
        assert_ne!(doc.title_element(), Some(body_title));
        assert_eq!(doc.element(title).text(), "Hello");
    }

    #[test]
    fn test_closest_respects_depth() {
        let mut doc = Document::new();
        let button = doc.append_element(doc.body(), "button");
        let mut inner = button;
        for _ in 0..3 {
            inner = doc.append_element(inner, "span");
        }

        let is_button = |el: &Element| el.tag_name() == "BUTTON";
        assert_eq!(doc.closest(inner, 4, is_button), Some(button));
        assert_eq!(doc.closest(inner, 3, is_button), None);
        assert_eq!(doc.closest(doc.body(), 10, is_button), None);
    }
}
