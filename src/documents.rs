//! XML instance documents
//!
//! Instance documents are parsed with quick-xml into an arena of element
//! nodes. Each node keeps its resolved name, attributes, direct text, the
//! namespaces in scope and its position in the source, and is addressed by a
//! [`NodeId`]. [`Document::events`] walks the arena as a pull cursor of
//! start/end events in document order.

use crate::error::{Error, Result, SourceLocation};
use crate::namespaces::{NamespaceContext, QName, XMLNS_NAMESPACE};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::sync::Arc;
use url::Url;

/// Index of an element node in its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Reference to an element or one of its attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    /// Element node
    Element(NodeId),
    /// Attribute of an element, by position in the element's attribute list
    Attribute(NodeId, usize),
}

impl NodeRef {
    /// The element owning this node
    pub fn element(&self) -> NodeId {
        match self {
            NodeRef::Element(id) | NodeRef::Attribute(id, _) => *id,
        }
    }
}

/// Attribute of an element node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Resolved attribute name
    pub name: QName,
    /// Attribute name as written in the document
    pub raw_name: String,
    /// Attribute value with entities expanded
    pub value: String,
}

/// XML element in the document arena
#[derive(Debug, Clone)]
pub struct ElementNode {
    /// Element qualified name
    pub name: QName,
    /// Element attributes, namespace declarations excluded
    pub attributes: Vec<Attribute>,
    /// Child element nodes
    pub children: Vec<NodeId>,
    /// Parent element
    pub parent: Option<NodeId>,
    /// Concatenated character data of the direct text children
    pub text: String,
    /// Whether the element has any direct text or CDATA child
    pub has_text_child: bool,
    /// Namespaces in scope on this element
    pub namespaces: Arc<NamespaceContext>,
    /// Position of the start tag
    pub location: SourceLocation,
}

impl ElementNode {
    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    /// Get an attribute value by qualified name
    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| &a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Whether the element has element children
    pub fn has_child_elements(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether the direct text holds anything besides whitespace
    pub fn has_significant_text(&self) -> bool {
        self.text.chars().any(|c| !matches!(c, ' ' | '\t' | '\n' | '\r'))
    }
}

/// Pull-cursor event over a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    /// Start of an element
    Start(NodeId),
    /// End of an element
    End(NodeId),
}

/// XML document as an arena of element nodes
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<ElementNode>,
    root: Option<NodeId>,
    /// Base URI used to resolve relative schema locations
    pub base_uri: Option<Url>,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an XML document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse(xml)
    }

    /// Parse an XML document from a string and remember its URI
    pub fn from_string_with_uri(xml: &str, uri: Url) -> Result<Self> {
        let mut doc = Self::parse(xml)?;
        let uri_str = uri.to_string();
        for node in &mut doc.nodes {
            node.location.uri = Some(uri_str.clone());
        }
        doc.base_uri = Some(uri);
        Ok(doc)
    }

    /// Parse an XML document from text
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let lines = LineIndex::new(xml);

        let mut doc = Document::new();
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            let position = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = doc.open_element(&e, &stack, lines.tag_location(position))?;
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    doc.open_element(&e, &stack, lines.tag_location(position))?;
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Text(e)) => {
                    if let Some(&current) = stack.last() {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                        doc.append_text(current, &text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(&current) = stack.last() {
                        let raw = e.into_inner();
                        let text = std::str::from_utf8(&raw)
                            .map_err(|e| Error::Xml(format!("Invalid CDATA section: {}", e)))?;
                        doc.append_text(current, text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {} // comments, processing instructions, declarations
            }
        }

        if !stack.is_empty() {
            return Err(Error::Xml("Unexpected end of document".to_string()));
        }
        if doc.root.is_none() {
            return Err(Error::Xml("Document has no root element".to_string()));
        }

        Ok(doc)
    }

    fn open_element(
        &mut self,
        start: &BytesStart,
        stack: &[NodeId],
        location: SourceLocation,
    ) -> Result<NodeId> {
        let parent = stack.last().copied();
        if parent.is_none() && self.root.is_some() {
            return Err(Error::Xml("Document has more than one root element".to_string()));
        }

        let name_bytes = start.name();
        let raw_name = std::str::from_utf8(name_bytes.as_ref())
            .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
            .to_string();

        let inherited = match parent {
            Some(p) => Arc::clone(&self.nodes[p.0].namespaces),
            None => Arc::new(NamespaceContext::new()),
        };
        let mut declared: Option<NamespaceContext> = None;
        let mut raw_attributes = Vec::new();

        for attr_result in start.attributes() {
            let attr = attr_result
                .map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
            let attr_name = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
                .to_string();
            let attr_value = attr
                .unescape_value()
                .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
                .to_string();

            if attr_name == "xmlns" {
                declared
                    .get_or_insert_with(|| (*inherited).clone())
                    .set_default_namespace(attr_value);
            } else if let Some(prefix) = attr_name.strip_prefix("xmlns:") {
                declared
                    .get_or_insert_with(|| (*inherited).clone())
                    .add_prefix(prefix, attr_value);
            } else {
                raw_attributes.push((attr_name, attr_value));
            }
        }

        let namespaces = match declared {
            Some(ctx) => Arc::new(ctx),
            None => inherited,
        };

        let name = namespaces
            .resolve(&raw_name)
            .map_err(|e| Error::Xml(format!("Element '{}': {}", raw_name, e)))?;

        let mut attributes = Vec::with_capacity(raw_attributes.len());
        for (raw, value) in raw_attributes {
            let attr_name = namespaces
                .resolve_attribute(&raw)
                .map_err(|e| Error::Xml(format!("Attribute '{}': {}", raw, e)))?;
            if attr_name.is_in(XMLNS_NAMESPACE) {
                continue;
            }
            if attributes.iter().any(|a: &Attribute| a.name == attr_name) {
                return Err(Error::Xml(format!(
                    "Duplicate attribute '{}' on element '{}'",
                    attr_name, raw_name
                )));
            }
            attributes.push(Attribute {
                name: attr_name,
                raw_name: raw,
                value,
            });
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(ElementNode {
            name,
            attributes,
            children: Vec::new(),
            parent,
            text: String::new(),
            has_text_child: false,
            namespaces,
            location,
        });

        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.root = Some(id),
        }
        Ok(id)
    }

    fn append_text(&mut self, id: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        let node = &mut self.nodes[id.0];
        node.text.push_str(text);
        node.has_text_child = true;
    }

    /// Get the root element
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Get an element node
    pub fn node(&self, id: NodeId) -> &ElementNode {
        &self.nodes[id.0]
    }

    /// Number of element nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the document has no elements
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get an attribute of an element by position
    pub fn attribute(&self, id: NodeId, index: usize) -> Option<&Attribute> {
        self.nodes.get(id.0).and_then(|n| n.attributes.get(index))
    }

    /// String value of an element (descendant text) or attribute
    pub fn string_value(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Attribute(id, index) => self
                .attribute(id, index)
                .map(|a| a.value.clone())
                .unwrap_or_default(),
            NodeRef::Element(id) => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        if node.children.is_empty() {
            out.push_str(&node.text);
            return;
        }
        // Interleaving of text and children is not kept, text comes first
        out.push_str(&node.text);
        for &child in &node.children {
            self.collect_text(child, out);
        }
    }

    /// Element path of a node, e.g. `/root/child`
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            parts.push(self.node(n).name.local_name.clone());
            current = self.node(n).parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Pull cursor over start and end events in document order
    pub fn events(&self) -> DocumentEvents<'_> {
        DocumentEvents {
            document: self,
            stack: Vec::new(),
            started: false,
        }
    }
}

/// Iterator returned by [`Document::events`]
#[derive(Debug)]
pub struct DocumentEvents<'a> {
    document: &'a Document,
    // (element, index of the next child to visit)
    stack: Vec<(NodeId, usize)>,
    started: bool,
}

impl Iterator for DocumentEvents<'_> {
    type Item = NodeEvent;

    fn next(&mut self) -> Option<NodeEvent> {
        if !self.started {
            self.started = true;
            let root = self.document.root?;
            self.stack.push((root, 0));
            return Some(NodeEvent::Start(root));
        }

        let (id, next_child) = self.stack.last_mut()?;
        let node = self.document.node(*id);
        if let Some(&child) = node.children.get(*next_child) {
            *next_child += 1;
            self.stack.push((child, 0));
            Some(NodeEvent::Start(child))
        } else {
            let id = *id;
            self.stack.pop();
            Some(NodeEvent::End(id))
        }
    }
}

/// Byte offset to line/column conversion
struct LineIndex<'a> {
    text: &'a [u8],
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            text: text.as_bytes(),
            starts,
        }
    }

    /// Location of the `<` opening a tag read from `offset`
    fn tag_location(&self, offset: usize) -> SourceLocation {
        let at_open = self.text.get(offset) == Some(&b'<');
        if !at_open && offset > 0 && self.text.get(offset - 1) == Some(&b'<') {
            return self.location(offset - 1);
        }
        self.location(offset)
    }

    fn location(&self, offset: usize) -> SourceLocation {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let column = offset - self.starts[line] + 1;
        SourceLocation::new(line as u64 + 1, column as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::XSI_NAMESPACE;

    #[test]
    fn test_parse_simple_xml() {
        let xml = r#"<root><child>text</child></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.node(doc.root().unwrap());
        assert_eq!(root.local_name(), "root");
        assert_eq!(root.children.len(), 1);
        let child = doc.node(root.children[0]);
        assert_eq!(child.local_name(), "child");
        assert_eq!(child.text, "text");
        assert!(child.has_text_child);
    }

    #[test]
    fn test_parse_with_namespaces() {
        let xml = r#"<p:root xmlns:p="urn:p" xmlns="urn:d" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true" a="1"><c/></p:root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.node(doc.root().unwrap());
        assert_eq!(root.name, QName::namespaced("urn:p", "root"));
        assert_eq!(root.attributes.len(), 2);
        assert_eq!(root.attribute(&QName::namespaced(XSI_NAMESPACE, "nil")), Some("true"));
        assert_eq!(root.attribute(&QName::local("a")), Some("1"));
        let child = doc.node(root.children[0]);
        assert_eq!(child.name, QName::namespaced("urn:d", "c"));
    }

    #[test]
    fn test_unbound_prefix_is_rejected() {
        assert!(Document::from_string("<x:root/>").is_err());
    }

    #[test]
    fn test_events_in_document_order() {
        let doc = Document::from_string("<a><b/><c><d/></c></a>").unwrap();
        let names: Vec<String> = doc
            .events()
            .map(|e| match e {
                NodeEvent::Start(id) => format!("+{}", doc.node(id).local_name()),
                NodeEvent::End(id) => format!("-{}", doc.node(id).local_name()),
            })
            .collect();
        assert_eq!(names, vec!["+a", "+b", "-b", "+c", "+d", "-d", "-c", "-a"]);
    }

    #[test]
    fn test_locations() {
        let doc = Document::from_string("<a>\n  <b/>\n</a>").unwrap();
        let root = doc.node(doc.root().unwrap());
        let b = doc.node(root.children[0]);
        assert_eq!(root.location, SourceLocation::new(1, 1));
        assert_eq!(b.location, SourceLocation::new(2, 3));
        assert!(!root.has_significant_text());
    }

    #[test]
    fn test_string_value_and_paths() {
        let doc = Document::from_string("<a x='1'><b>hi</b><b>there</b></a>").unwrap();
        let root = doc.root().unwrap();
        assert_eq!(doc.string_value(NodeRef::Element(root)), "hithere");
        assert_eq!(doc.string_value(NodeRef::Attribute(root, 0)), "1");
        let second = doc.node(root).children[1];
        assert_eq!(doc.path(second), "/a/b");
    }

    #[test]
    fn test_duplicate_root_rejected() {
        assert!(Document::from_string("<a/><b/>").is_err());
    }
}
