//! XSD Simple Type definitions
//!
//! User-defined simple types: an atomic restriction, a list or a union, with
//! the facets declared at this derivation step. Inherited facets are merged
//! lazily by [`Schema::merged_facets`](crate::validators::Schema::merged_facets).

use crate::namespaces::QName;
use crate::validators::facets::{Facet, FacetSet};
use crate::validators::schemas::TypeRef;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Variety of a simple type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimpleVariety {
    /// Restriction of an atomic type
    Atomic,
    /// Whitespace separated list of items
    List {
        /// Item type
        item_type: TypeRef,
    },
    /// Union of member types, tried in order
    Union {
        /// Member types
        member_types: Vec<TypeRef>,
    },
}

/// A simple type definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleTypeDef {
    /// Name, None for anonymous types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<QName>,
    /// Base type
    pub base: TypeRef,
    /// Variety
    pub variety: SimpleVariety,
    /// Facets declared on this type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(skip)]
    pub(crate) merged: OnceCell<Arc<FacetSet>>,
}

impl SimpleTypeDef {
    /// Atomic restriction of `base`
    pub fn atomic(base: TypeRef) -> Self {
        Self {
            name: None,
            base,
            variety: SimpleVariety::Atomic,
            facets: Vec::new(),
            merged: OnceCell::new(),
        }
    }

    /// List of `item_type`
    pub fn list(item_type: TypeRef) -> Self {
        Self {
            variety: SimpleVariety::List { item_type },
            ..Self::atomic(TypeRef::any_simple_type())
        }
    }

    /// Union of `member_types`
    pub fn union(member_types: Vec<TypeRef>) -> Self {
        Self {
            variety: SimpleVariety::Union { member_types },
            ..Self::atomic(TypeRef::any_simple_type())
        }
    }

    /// Restriction of a list or union type, keeping its variety
    pub fn restriction_of(base: TypeRef, variety: SimpleVariety) -> Self {
        Self {
            variety,
            ..Self::atomic(base)
        }
    }

    /// Set the name
    pub fn named(mut self, name: QName) -> Self {
        self.name = Some(name);
        self
    }

    /// Add a facet
    pub fn with_facet(mut self, facet: Facet) -> Self {
        self.facets.push(facet);
        self
    }

    /// Whether this is a list type
    pub fn is_list(&self) -> bool {
        matches!(self.variety, SimpleVariety::List { .. })
    }

    /// Whether this is a union type
    pub fn is_union(&self) -> bool {
        matches!(self.variety, SimpleVariety::Union { .. })
    }

    pub(crate) fn reset_caches(&mut self) {
        self.merged = OnceCell::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::builtins::BuiltinType;
    use crate::validators::facets::FacetKind;

    #[test]
    fn test_constructors() {
        let list = SimpleTypeDef::list(TypeRef::Builtin(BuiltinType::Int));
        assert!(list.is_list());
        assert_eq!(list.base, TypeRef::any_simple_type());

        let atomic = SimpleTypeDef::atomic(TypeRef::Builtin(BuiltinType::String))
            .named(QName::local("code"))
            .with_facet(Facet::new(FacetKind::MaxLength, "4"));
        assert_eq!(atomic.facets.len(), 1);
        assert_eq!(atomic.name, Some(QName::local("code")));
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "name": "{urn:t}small",
            "base": {"Builtin": "Int"},
            "variety": "Atomic",
            "facets": [{"kind": "MaxInclusive", "value": "10"}]
        }"#;
        let def: SimpleTypeDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.name, Some(QName::namespaced("urn:t", "small")));
        assert_eq!(def.facets[0].kind, FacetKind::MaxInclusive);
    }
}
