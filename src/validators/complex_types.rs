//! XSD Complex Type definitions
//!
//! Complex types carry a content type (empty, simple, element-only or mixed),
//! attribute uses and an optional attribute wildcard. The deterministic
//! content automaton is built on first use and cached on the definition.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#Complex_Type_Definitions

use crate::namespaces::QName;
use crate::validators::attributes::AttributeUse;
use crate::validators::automaton::Automaton;
use crate::validators::models::ContentLabel;
use crate::validators::particles::Particle;
use crate::validators::schemas::{AttributeGroupId, TypeRef};
use crate::validators::wildcards::Wildcard;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Derivation method of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DerivationMethod {
    /// Derived by extension
    Extension,
    /// Derived by restriction
    #[default]
    Restriction,
}

/// Content variety of a complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentVariety {
    /// No character or element content
    Empty,
    /// Character content of a simple type
    Simple,
    /// Child elements, whitespace only text
    ElementOnly,
    /// Child elements interleaved with text
    Mixed,
}

/// Content type of a complex type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    /// Variety
    pub variety: ContentVariety,
    /// Content model for element-only and mixed content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub particle: Option<Particle>,
    /// Type of simple content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_type: Option<TypeRef>,
}

impl ContentType {
    /// Empty content
    pub fn empty() -> Self {
        Self {
            variety: ContentVariety::Empty,
            particle: None,
            simple_type: None,
        }
    }

    /// Simple content of the given type
    pub fn simple(simple_type: TypeRef) -> Self {
        Self {
            variety: ContentVariety::Simple,
            particle: None,
            simple_type: Some(simple_type),
        }
    }

    /// Element-only content
    pub fn element_only(particle: Particle) -> Self {
        Self {
            variety: ContentVariety::ElementOnly,
            particle: Some(particle),
            simple_type: None,
        }
    }

    /// Mixed content
    pub fn mixed(particle: Option<Particle>) -> Self {
        Self {
            variety: ContentVariety::Mixed,
            particle,
            simple_type: None,
        }
    }
}

/// A complex type definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexTypeDef {
    /// Name, None for anonymous types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<QName>,
    /// Base type
    #[serde(default = "TypeRef::any_type")]
    pub base: TypeRef,
    /// How this type derives from its base
    #[serde(default)]
    pub derivation: DerivationMethod,
    /// Abstract types cannot be used directly by instances
    #[serde(default)]
    pub is_abstract: bool,
    /// Content type
    pub content: ContentType,
    /// Attribute uses declared directly on the type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_uses: Vec<AttributeUse>,
    /// Referenced attribute groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_groups: Vec<AttributeGroupId>,
    /// Attribute wildcard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_wildcard: Option<Wildcard>,
    #[serde(skip)]
    pub(crate) automaton: OnceCell<Automaton<ContentLabel>>,
}

impl ComplexTypeDef {
    /// Create a type deriving from anyType by restriction
    pub fn new(content: ContentType) -> Self {
        Self {
            name: None,
            base: TypeRef::AnyType,
            derivation: DerivationMethod::Restriction,
            is_abstract: false,
            content,
            attribute_uses: Vec::new(),
            attribute_groups: Vec::new(),
            attribute_wildcard: None,
            automaton: OnceCell::new(),
        }
    }

    /// Set the name
    pub fn named(mut self, name: QName) -> Self {
        self.name = Some(name);
        self
    }

    /// Set base type and derivation method
    pub fn derived_from(mut self, base: TypeRef, derivation: DerivationMethod) -> Self {
        self.base = base;
        self.derivation = derivation;
        self
    }

    /// Mark the type abstract
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Add an attribute use
    pub fn with_attribute(mut self, attribute_use: AttributeUse) -> Self {
        self.attribute_uses.push(attribute_use);
        self
    }

    /// Reference an attribute group
    pub fn with_attribute_group(mut self, group: AttributeGroupId) -> Self {
        self.attribute_groups.push(group);
        self
    }

    /// Set the attribute wildcard
    pub fn with_attribute_wildcard(mut self, wildcard: Wildcard) -> Self {
        self.attribute_wildcard = Some(wildcard);
        self
    }

    pub(crate) fn reset_caches(&mut self) {
        self.automaton = OnceCell::new();
    }
}
