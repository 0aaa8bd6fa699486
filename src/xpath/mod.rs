//! XPath Support for XML Schema
//!
//! Identity constraints select their target nodes and field values with a
//! small subset of XPath. The validator only depends on the
//! [`PathEvaluator`] trait; [`IdentityPathEvaluator`] implements the subset
//! allowed for xs:selector and xs:field over a [`Document`].
//!
//! ## Limitations
//!
//! Predicates, reverse axes and functions are not supported.

mod selectors;

pub use selectors::{split_path, ElementSelector, IdentityPath, NameTest, PathStep, PathStepKind};

use crate::documents::{Document, NodeId, NodeRef};
use crate::error::Result;
use crate::namespaces::NamespaceContext;
use std::collections::BTreeSet;

/// Selects nodes of a document with a path expression
pub trait PathEvaluator {
    /// Evaluate `path` with `context` as context node
    ///
    /// `fields` allows a final attribute step. Results are in document order
    /// without duplicates.
    fn select(
        &self,
        document: &Document,
        context: NodeId,
        path: &str,
        namespaces: &NamespaceContext,
        fields: bool,
    ) -> Result<Vec<NodeRef>>;
}

/// Evaluator for the identity constraint path subset
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPathEvaluator;

impl IdentityPathEvaluator {
    /// Create an evaluator
    pub fn new() -> Self {
        Self
    }

    /// Evaluate an already parsed expression
    pub fn evaluate(
        &self,
        document: &Document,
        context: NodeId,
        selector: &ElementSelector,
    ) -> Vec<NodeRef> {
        let mut results = BTreeSet::new();
        for path in &selector.paths {
            let mut current: Vec<NodeId> = if path.descendant {
                let mut all = Vec::new();
                descendants_or_self(document, context, &mut all);
                all
            } else {
                vec![context]
            };

            for step in &path.steps {
                match step.kind {
                    PathStepKind::SelfNode => {}
                    PathStepKind::Child => {
                        current = current
                            .iter()
                            .flat_map(|id| document.node(*id).children.iter().copied())
                            .filter(|child| passes(step, document, *child))
                            .collect();
                    }
                    PathStepKind::Attribute => {
                        for id in &current {
                            for (index, attribute) in
                                document.node(*id).attributes.iter().enumerate()
                            {
                                if step.test.as_ref().map_or(true, |t| t.matches(&attribute.name)) {
                                    results.insert(NodeRef::Attribute(*id, index));
                                }
                            }
                        }
                        current.clear();
                    }
                }
            }
            results.extend(current.into_iter().map(NodeRef::Element));
        }
        results.into_iter().collect()
    }
}

impl PathEvaluator for IdentityPathEvaluator {
    fn select(
        &self,
        document: &Document,
        context: NodeId,
        path: &str,
        namespaces: &NamespaceContext,
        fields: bool,
    ) -> Result<Vec<NodeRef>> {
        let selector = ElementSelector::parse(path, namespaces, fields)?;
        Ok(self.evaluate(document, context, &selector))
    }
}

fn passes(step: &PathStep, document: &Document, node: NodeId) -> bool {
    step.test
        .as_ref()
        .map_or(true, |t| t.matches(&document.node(node).name))
}

fn descendants_or_self(document: &Document, node: NodeId, out: &mut Vec<NodeId>) {
    out.push(node);
    for &child in &document.node(node).children {
        descendants_or_self(document, child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<r xmlns:p="urn:p">
        <item id="1"><name>a</name></item>
        <group><item id="2"/><p:item id="3"/></group>
    </r>"#;

    fn select(path: &str, fields: bool) -> Vec<NodeRef> {
        let doc = Document::from_string(XML).unwrap();
        let mut ns = NamespaceContext::new();
        ns.add_prefix("p", "urn:p");
        IdentityPathEvaluator::new()
            .select(&doc, doc.root().unwrap(), path, &ns, fields)
            .unwrap()
    }

    #[test]
    fn test_child_and_descendant_steps() {
        assert_eq!(select("item", false).len(), 1);
        assert_eq!(select(".//item", false).len(), 2);
        assert_eq!(select(".//p:item", false).len(), 1);
        assert_eq!(select("group/*", false).len(), 2);
        assert_eq!(select("item | group/item", false).len(), 2);
        assert_eq!(select(".", false), vec![NodeRef::Element(NodeId(0))]);
    }

    #[test]
    fn test_field_steps() {
        let ids = select(".//@id", true);
        assert_eq!(ids.len(), 3);
        assert!(matches!(ids[0], NodeRef::Attribute(_, 0)));
        assert_eq!(select("item/name", true).len(), 1);
        assert!(select("item/@missing", true).is_empty());
    }

    #[test]
    fn test_results_are_deduplicated() {
        assert_eq!(select("item | item", false).len(), 1);
    }
}
