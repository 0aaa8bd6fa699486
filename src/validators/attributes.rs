//! XSD Attribute declarations, uses and groups
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#cAttribute_Declarations

use crate::namespaces::QName;
use crate::validators::elements::ValueConstraint;
use crate::validators::schemas::{AttributeGroupId, AttributeId, TypeRef};
use crate::validators::wildcards::Wildcard;
use serde::{Deserialize, Serialize};

/// An attribute declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDecl {
    /// Qualified name
    pub name: QName,
    /// Simple type of the value
    #[serde(default = "TypeRef::any_simple_type")]
    pub type_ref: TypeRef,
    /// Default or fixed value of the declaration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_constraint: Option<ValueConstraint>,
}

impl AttributeDecl {
    /// Create a declaration
    pub fn new(name: QName, type_ref: TypeRef) -> Self {
        Self {
            name,
            type_ref,
            value_constraint: None,
        }
    }

    /// Set the value constraint
    pub fn with_value_constraint(mut self, constraint: ValueConstraint) -> Self {
        self.value_constraint = Some(constraint);
        self
    }
}

/// Attribute use mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttributeUseMode {
    /// The attribute must be present
    Required,
    /// The attribute may be present
    #[default]
    Optional,
    /// The attribute must not be present
    Prohibited,
}

impl AttributeUseMode {
    /// Parse from the `use` attribute value
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "required" => Some(Self::Required),
            "optional" => Some(Self::Optional),
            "prohibited" => Some(Self::Prohibited),
            _ => None,
        }
    }
}

/// Binding of an attribute declaration to a complex type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeUse {
    /// The declaration
    pub attribute: AttributeId,
    /// Use mode
    #[serde(default, rename = "use")]
    pub use_mode: AttributeUseMode,
    /// Value constraint of the use, overrides the declaration's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_constraint: Option<ValueConstraint>,
}

impl AttributeUse {
    /// Optional use
    pub fn optional(attribute: AttributeId) -> Self {
        Self {
            attribute,
            use_mode: AttributeUseMode::Optional,
            value_constraint: None,
        }
    }

    /// Required use
    pub fn required(attribute: AttributeId) -> Self {
        Self {
            use_mode: AttributeUseMode::Required,
            ..Self::optional(attribute)
        }
    }

    /// Prohibited use
    pub fn prohibited(attribute: AttributeId) -> Self {
        Self {
            use_mode: AttributeUseMode::Prohibited,
            ..Self::optional(attribute)
        }
    }

    /// Set the value constraint
    pub fn with_value_constraint(mut self, constraint: ValueConstraint) -> Self {
        self.value_constraint = Some(constraint);
        self
    }
}

/// A named attribute group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeGroup {
    /// Qualified name
    pub name: QName,
    /// Attribute uses
    #[serde(default)]
    pub attribute_uses: Vec<AttributeUse>,
    /// Nested attribute group references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_groups: Vec<AttributeGroupId>,
    /// Attribute wildcard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_wildcard: Option<Wildcard>,
}

impl AttributeGroup {
    /// Create an empty group
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attribute_uses: Vec::new(),
            attribute_groups: Vec::new(),
            attribute_wildcard: None,
        }
    }

    /// Add an attribute use
    pub fn with_attribute(mut self, attribute_use: AttributeUse) -> Self {
        self.attribute_uses.push(attribute_use);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::builtins::BuiltinType;

    #[test]
    fn test_use_modes() {
        assert_eq!(AttributeUseMode::from_str("required"), Some(AttributeUseMode::Required));
        assert_eq!(AttributeUseMode::from_str("maybe"), None);
        assert_eq!(AttributeUse::required(AttributeId(0)).use_mode, AttributeUseMode::Required);
        assert_eq!(
            AttributeUse::prohibited(AttributeId(1)).use_mode,
            AttributeUseMode::Prohibited
        );
    }

    #[test]
    fn test_attribute_use_json() {
        let u: AttributeUse = serde_json::from_str(r#"{"attribute": 2, "use": "Required"}"#).unwrap();
        assert_eq!(u, AttributeUse::required(AttributeId(2)));

        let decl: AttributeDecl = serde_json::from_str(r#"{"name": "lang"}"#).unwrap();
        assert_eq!(decl.type_ref, TypeRef::Builtin(BuiltinType::AnySimpleType));
    }
}
