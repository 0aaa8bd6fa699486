//! XSD Wildcards
//!
//! This module implements wildcards for XSD element and attribute content:
//! - xs:any - allows any element from specified namespaces
//! - xs:anyAttribute - allows any attribute from specified namespaces
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#Wildcards

use crate::error::ParseError;
use crate::namespaces::QName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProcessContents {
    /// Validate strictly - element/attribute must be declared
    #[default]
    Strict,
    /// Validate if declaration found, otherwise accept
    Lax,
    /// Skip validation entirely
    Skip,
}

impl ProcessContents {
    /// Parse from string value
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessContents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Namespace constraint for wildcards
///
/// The empty string stands for "no namespace".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NamespaceConstraint {
    /// Any namespace is allowed (##any)
    #[default]
    Any,
    /// Any namespace except the target namespace and no namespace (##other)
    Other {
        /// The target namespace to exclude
        target_namespace: Option<String>,
    },
    /// Specific set of allowed namespaces
    Enumeration(BTreeSet<String>),
    /// Set of disallowed namespaces (XSD 1.1 notNamespace)
    Not(BTreeSet<String>),
}

fn namespace_list(
    value: &str,
    target_namespace: Option<&str>,
    attribute: &str,
) -> Result<BTreeSet<String>, ParseError> {
    value
        .split_whitespace()
        .map(|ns| match ns {
            "##local" => Ok(String::new()),
            "##targetNamespace" => Ok(target_namespace.unwrap_or_default().to_string()),
            s if s.starts_with("##") => Err(ParseError::new(format!(
                "wrong value '{}' in '{}' attribute",
                s, attribute
            ))),
            uri => Ok(uri.to_string()),
        })
        .collect()
}

impl NamespaceConstraint {
    /// Create from the value of a `namespace` attribute
    pub fn from_namespace_attr(
        value: &str,
        target_namespace: Option<&str>,
    ) -> Result<Self, ParseError> {
        match value.trim() {
            "##any" => Ok(Self::Any),
            "##other" => Ok(Self::Other {
                target_namespace: target_namespace.map(String::from),
            }),
            other => Ok(Self::Enumeration(namespace_list(
                other,
                target_namespace,
                "namespace",
            )?)),
        }
    }

    /// Create from the value of a `notNamespace` attribute
    pub fn from_not_namespace_attr(
        value: &str,
        target_namespace: Option<&str>,
    ) -> Result<Self, ParseError> {
        Ok(Self::Not(namespace_list(value, target_namespace, "notNamespace")?))
    }

    /// Enumeration of the given namespaces
    pub fn enumeration<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enumeration(namespaces.into_iter().map(Into::into).collect())
    }

    /// Check if a namespace (empty for none) is allowed by this constraint
    pub fn is_allowed(&self, namespace: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Other { target_namespace } => {
                !namespace.is_empty() && target_namespace.as_deref() != Some(namespace)
            }
            Self::Enumeration(set) => set.contains(namespace),
            Self::Not(set) => !set.contains(namespace),
        }
    }
}

/// An element or attribute wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Wildcard {
    /// Namespace constraint
    #[serde(default)]
    pub namespace: NamespaceConstraint,
    /// How matched content is validated
    #[serde(default)]
    pub process_contents: ProcessContents,
}

impl Wildcard {
    /// Create a wildcard
    pub fn new(namespace: NamespaceConstraint, process_contents: ProcessContents) -> Self {
        Self {
            namespace,
            process_contents,
        }
    }

    /// ##any wildcard
    pub fn any(process_contents: ProcessContents) -> Self {
        Self::new(NamespaceConstraint::Any, process_contents)
    }

    /// Check if a namespace is allowed
    pub fn is_namespace_allowed(&self, namespace: Option<&str>) -> bool {
        self.namespace.is_allowed(namespace.unwrap_or_default())
    }

    /// Check if a qualified name is matched
    pub fn matches(&self, name: &QName) -> bool {
        self.is_namespace_allowed(name.namespace.as_deref())
    }
}
