//! XML Schema validators
//!
//! Schema components live in a [`Schema`] arena and refer to each other by
//! typed ids. Content models compile to deterministic automata, simple
//! types are checked by the [`TypeChecker`], and [`ValidatingReader`]
//! validates instance documents against the whole.

pub mod attributes;
pub mod automaton;
pub mod builtins;
pub mod complex_types;
pub mod document_validation;
pub mod elements;
pub mod facets;
pub mod helpers;
pub mod identities;
pub mod merger;
pub mod models;
pub mod particles;
pub mod schemas;
pub mod simple_types;
pub mod type_checker;
pub mod validation;
pub mod wildcards;

pub use attributes::{AttributeDecl, AttributeGroup, AttributeUse, AttributeUseMode};
pub use automaton::{Automaton, InputMatcher, StateId, StateType};
pub use builtins::{BuiltinType, XsdValue};
pub use complex_types::{ComplexTypeDef, ContentType, ContentVariety, DerivationMethod};
pub use document_validation::{validate, ValidatingReader, ValidationReport, ValidatorOptions};
pub use elements::{DerivationSet, ElementDecl, ValueConstraint, ValueConstraintKind};
pub use facets::{Facet, FacetKind, FacetSet, WhiteSpace};
pub use identities::{IdentityConstraint, IdentityConstraintKind};
pub use models::ContentLabel;
pub use particles::{Compositor, ModelGroup, Occurs, Particle, Term};
pub use schemas::{
    AttributeGroupId, AttributeId, ComplexTypeId, ElementId, IdentityConstraintId, ModelGroupId,
    Notation, NotationId, Schema, SchemaBuilder, SimpleTypeId, TypeRef, WildcardId,
};
pub use simple_types::{SimpleTypeDef, SimpleVariety};
pub use type_checker::{IdKind, TypeChecker};
pub use validation::{Annotations, Declaration, NodeAnnotation, ValidationContext};
pub use wildcards::{NamespaceConstraint, ProcessContents, Wildcard};
