//! XSD Identity Constraints
//!
//! This module implements identity constraints for XML Schema:
//! - xs:unique - Ensures values are unique within scope
//! - xs:key - Like unique, but all field values must be present
//! - xs:keyref - References a key/unique constraint (foreign key)
//!
//! The schema side is [`IdentityConstraint`]; [`TargetNode`] and
//! [`KeyTable`] hold the per-document results used to check them.

use crate::documents::NodeId;
use crate::namespaces::{NamespaceContext, QName};
use crate::validators::builtins::XsdValue;
use crate::validators::schemas::{IdentityConstraintId, TypeRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Kind of identity constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityConstraintKind {
    /// Field tuples are unique where complete
    Unique,
    /// Field tuples are complete and unique
    Key,
    /// Field tuples reference a key or unique constraint
    KeyRef,
}

impl std::fmt::Display for IdentityConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::Key => write!(f, "key"),
            Self::KeyRef => write!(f, "keyref"),
        }
    }
}

/// A unique, key or keyref constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConstraint {
    /// Qualified name
    pub name: QName,
    /// Kind
    pub kind: IdentityConstraintKind,
    /// Selector path expression
    pub selector: String,
    /// Field path expressions
    pub fields: Vec<String>,
    /// Referenced key or unique constraint (keyref only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refer: Option<QName>,
    /// Prefix bindings in scope of the declaration
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub namespaces: IndexMap<String, String>,
    /// Namespace of unprefixed names in the paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath_default_namespace: Option<String>,
}

impl IdentityConstraint {
    /// Create a constraint
    pub fn new(
        name: QName,
        kind: IdentityConstraintKind,
        selector: impl Into<String>,
        fields: Vec<String>,
    ) -> Self {
        Self {
            name,
            kind,
            selector: selector.into(),
            fields,
            refer: None,
            namespaces: IndexMap::new(),
            xpath_default_namespace: None,
        }
    }

    /// Unique constraint
    pub fn unique<I, S>(name: QName, selector: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            IdentityConstraintKind::Unique,
            selector,
            fields.into_iter().map(Into::into).collect(),
        )
    }

    /// Key constraint
    pub fn key<I, S>(name: QName, selector: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            IdentityConstraintKind::Key,
            selector,
            fields.into_iter().map(Into::into).collect(),
        )
    }

    /// Keyref constraint referring to `refer`
    pub fn keyref<I, S>(name: QName, refer: QName, selector: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut constraint = Self::new(
            name,
            IdentityConstraintKind::KeyRef,
            selector,
            fields.into_iter().map(Into::into).collect(),
        );
        constraint.refer = Some(refer);
        constraint
    }

    /// Bind a prefix used in the paths
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    /// Namespace context for evaluating the paths
    pub fn namespace_context(&self) -> NamespaceContext {
        let mut context = NamespaceContext::new();
        for (prefix, uri) in &self.namespaces {
            context.add_prefix(prefix.as_str(), uri.as_str());
        }
        if let Some(ns) = &self.xpath_default_namespace {
            context.set_default_namespace(ns.as_str());
        }
        context
    }
}

// =============================================================================
// Evaluation results
// =============================================================================

/// The value of one field of a target node
#[derive(Debug, Clone)]
pub struct FieldValue {
    /// Normalized text of the field node
    pub text: String,
    /// Type the field node was validated against
    pub type_ref: TypeRef,
    /// Typed value
    pub value: XsdValue,
}

impl FieldValue {
    /// Typed equality; integers compare equal to decimals of the same value
    pub fn equals(&self, other: &FieldValue) -> bool {
        self.value.value_equals(&other.value)
    }
}

/// A node selected by a constraint's selector with its field values
#[derive(Debug, Clone)]
pub struct TargetNode {
    /// The selected node
    pub node: NodeId,
    /// One entry per field, None when the field selected nothing
    pub fields: Vec<Option<FieldValue>>,
}

impl TargetNode {
    /// Whether every field is present
    pub fn is_complete(&self) -> bool {
        self.fields.iter().all(Option::is_some)
    }

    /// Whether both nodes are complete and all fields are equal
    pub fn same_tuple(&self, other: &TargetNode) -> bool {
        self.is_complete()
            && other.is_complete()
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| matches!((a, b), (Some(a), Some(b)) if a.equals(b)))
    }

    /// Field texts joined for messages
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|f| match f {
                Some(f) => format!("\"{}\"", f.text),
                None => "<absent>".to_string(),
            })
            .collect();
        format!("({})", parts.join(", "))
    }
}

/// Target nodes recorded for a key or unique constraint in one scope
#[derive(Debug, Clone)]
pub struct KeyTable {
    /// The constraint
    pub constraint: IdentityConstraintId,
    /// The element declaring the constraint
    pub scope: NodeId,
    /// Recorded target nodes
    pub targets: Vec<TargetNode>,
}

impl KeyTable {
    /// Whether a complete tuple equal to `target` is recorded
    pub fn contains(&self, target: &TargetNode) -> bool {
        self.targets.iter().any(|t| t.same_tuple(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::builtins::BuiltinType;
    use rust_decimal::Decimal;

    fn field(text: &str, value: XsdValue) -> Option<FieldValue> {
        Some(FieldValue {
            text: text.to_string(),
            type_ref: TypeRef::Builtin(BuiltinType::String),
            value,
        })
    }

    #[test]
    fn test_constraint_builders() {
        let key = IdentityConstraint::key(QName::local("k"), "item", ["@id"]);
        assert_eq!(key.kind, IdentityConstraintKind::Key);
        assert_eq!(key.fields, vec!["@id".to_string()]);

        let keyref = IdentityConstraint::keyref(QName::local("r"), QName::local("k"), "ref", ["@to"])
            .with_namespace("p", "urn:p");
        assert_eq!(keyref.refer, Some(QName::local("k")));
        assert_eq!(keyref.namespace_context().get_namespace("p"), Some("urn:p"));
    }

    #[test]
    fn test_tuple_equality_is_typed() {
        let a = TargetNode {
            node: NodeId(1),
            fields: vec![field("1", XsdValue::Integer(1))],
        };
        let b = TargetNode {
            node: NodeId(2),
            fields: vec![field("1.0", XsdValue::Decimal(Decimal::new(10, 1)))],
        };
        let c = TargetNode {
            node: NodeId(3),
            fields: vec![field("1", XsdValue::String("1".into()))],
        };
        assert!(a.same_tuple(&b));
        assert!(!a.same_tuple(&c));
    }

    #[test]
    fn test_incomplete_tuples_never_match() {
        let a = TargetNode {
            node: NodeId(1),
            fields: vec![field("x", XsdValue::String("x".into())), None],
        };
        assert!(!a.is_complete());
        assert!(!a.same_tuple(&a.clone()));
        assert_eq!(a.describe(), "(\"x\", <absent>)");
    }
}
