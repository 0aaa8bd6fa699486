//! XSD Element declarations
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#Element_Declarations

use crate::namespaces::QName;
use crate::validators::complex_types::DerivationMethod;
use crate::validators::schemas::{IdentityConstraintId, TypeRef};
use serde::{Deserialize, Serialize};

/// Kind of a value constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueConstraintKind {
    /// Used when the instance provides no value
    Default,
    /// The instance value must equal this value
    Fixed,
}

/// Default or fixed value of an element or attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueConstraint {
    /// Default or fixed
    pub kind: ValueConstraintKind,
    /// Lexical value
    pub value: String,
}

impl ValueConstraint {
    /// Default value constraint
    pub fn default_value(value: impl Into<String>) -> Self {
        Self {
            kind: ValueConstraintKind::Default,
            value: value.into(),
        }
    }

    /// Fixed value constraint
    pub fn fixed(value: impl Into<String>) -> Self {
        Self {
            kind: ValueConstraintKind::Fixed,
            value: value.into(),
        }
    }

    /// Whether this is a fixed value
    pub fn is_fixed(&self) -> bool {
        self.kind == ValueConstraintKind::Fixed
    }
}

/// Derivation methods an element disallows for `xsi:type` substitution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DerivationSet {
    /// Types derived by extension are blocked
    #[serde(default)]
    pub extension: bool,
    /// Types derived by restriction are blocked
    #[serde(default)]
    pub restriction: bool,
}

impl DerivationSet {
    /// Parse a `block` attribute value
    pub fn parse(value: &str) -> Self {
        let mut set = Self::default();
        for token in value.split_whitespace() {
            match token {
                "#all" => {
                    set.extension = true;
                    set.restriction = true;
                }
                "extension" => set.extension = true,
                "restriction" => set.restriction = true,
                _ => {}
            }
        }
        set
    }

    /// Whether the method is blocked
    pub fn blocks(&self, method: DerivationMethod) -> bool {
        match method {
            DerivationMethod::Extension => self.extension,
            DerivationMethod::Restriction => self.restriction,
        }
    }
}

/// An element declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDecl {
    /// Qualified name
    pub name: QName,
    /// Declared type
    #[serde(default = "TypeRef::any_type")]
    pub type_ref: TypeRef,
    /// Whether `xsi:nil` is allowed
    #[serde(default)]
    pub nillable: bool,
    /// Abstract elements cannot appear in instances
    #[serde(default)]
    pub is_abstract: bool,
    /// Default or fixed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_constraint: Option<ValueConstraint>,
    /// Identity constraints scoped to this element
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identity_constraints: Vec<IdentityConstraintId>,
    /// Disallowed `xsi:type` substitutions
    #[serde(default)]
    pub disallowed_substitutions: DerivationSet,
}

impl ElementDecl {
    /// Create a declaration
    pub fn new(name: QName, type_ref: TypeRef) -> Self {
        Self {
            name,
            type_ref,
            nillable: false,
            is_abstract: false,
            value_constraint: None,
            identity_constraints: Vec::new(),
            disallowed_substitutions: DerivationSet::default(),
        }
    }

    /// Allow `xsi:nil`
    pub fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    /// Mark abstract
    pub fn abstract_element(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Set the value constraint
    pub fn with_value_constraint(mut self, constraint: ValueConstraint) -> Self {
        self.value_constraint = Some(constraint);
        self
    }

    /// Attach an identity constraint
    pub fn with_identity_constraint(mut self, constraint: IdentityConstraintId) -> Self {
        self.identity_constraints.push(constraint);
        self
    }

    /// Block substitutions
    pub fn blocking(mut self, blocked: DerivationSet) -> Self {
        self.disallowed_substitutions = blocked;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_set_parse() {
        let all = DerivationSet::parse("#all");
        assert!(all.blocks(DerivationMethod::Extension));
        assert!(all.blocks(DerivationMethod::Restriction));

        let ext = DerivationSet::parse("extension substitution");
        assert!(ext.blocks(DerivationMethod::Extension));
        assert!(!ext.blocks(DerivationMethod::Restriction));
    }

    #[test]
    fn test_element_json_defaults() {
        let decl: ElementDecl = serde_json::from_str(r#"{"name": "{urn:a}root"}"#).unwrap();
        assert_eq!(decl.type_ref, TypeRef::AnyType);
        assert!(!decl.nillable);
        assert_eq!(decl.disallowed_substitutions, DerivationSet::default());
    }

    #[test]
    fn test_value_constraint() {
        assert!(ValueConstraint::fixed("1").is_fixed());
        assert!(!ValueConstraint::default_value("1").is_fixed());
    }
}
