//! Compiled schema
//!
//! A [`Schema`] is an arena of schema components addressed by typed indices.
//! Components refer to each other only through these indices, so recursive
//! content models and type hierarchies need no shared ownership. A schema is
//! immutable once built and is shared between validation runs as
//! `Arc<Schema>`; the only interior state is a set of write-once caches
//! (merged facets, content automata).
//!
//! Schemas are produced by [`SchemaBuilder`] or read back from their JSON
//! form with [`Schema::from_json`].

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::namespaces::{QName, XSD_NAMESPACE};
use crate::validators::attributes::{AttributeDecl, AttributeGroup, AttributeUse};
use crate::validators::automaton::Automaton;
use crate::validators::builtins::BuiltinType;
use crate::validators::complex_types::{ComplexTypeDef, ContentVariety, DerivationMethod};
use crate::validators::elements::{DerivationSet, ElementDecl};
use crate::validators::facets::{Facet, FacetSet};
use crate::validators::identities::IdentityConstraint;
use crate::validators::models::{build_content_automaton, ContentLabel};
use crate::validators::particles::{ModelGroup, Particle, Term};
use crate::validators::simple_types::{SimpleTypeDef, SimpleVariety};
use crate::validators::wildcards::Wildcard;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub usize);

        impl $name {
            /// Position in the arena
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

arena_id!(
    /// Index of an element declaration
    ElementId
);
arena_id!(
    /// Index of an attribute declaration
    AttributeId
);
arena_id!(
    /// Index of a simple type definition
    SimpleTypeId
);
arena_id!(
    /// Index of a complex type definition
    ComplexTypeId
);
arena_id!(
    /// Index of a model group
    ModelGroupId
);
arena_id!(
    /// Index of an element wildcard
    WildcardId
);
arena_id!(
    /// Index of an identity constraint
    IdentityConstraintId
);
arena_id!(
    /// Index of an attribute group
    AttributeGroupId
);
arena_id!(
    /// Index of a notation declaration
    NotationId
);

/// Reference to a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    /// xs:anyType
    AnyType,
    /// A built-in simple type
    Builtin(BuiltinType),
    /// A user-defined simple type
    Simple(SimpleTypeId),
    /// A user-defined complex type
    Complex(ComplexTypeId),
}

impl TypeRef {
    /// xs:anyType
    pub fn any_type() -> Self {
        TypeRef::AnyType
    }

    /// xs:anySimpleType
    pub fn any_simple_type() -> Self {
        TypeRef::Builtin(BuiltinType::AnySimpleType)
    }

    /// Whether this is a simple type
    pub fn is_simple(&self) -> bool {
        matches!(self, TypeRef::Builtin(_) | TypeRef::Simple(_))
    }

    /// Whether this is a complex type (anyType included)
    pub fn is_complex(&self) -> bool {
        !self.is_simple()
    }
}

impl From<BuiltinType> for TypeRef {
    fn from(builtin: BuiltinType) -> Self {
        TypeRef::Builtin(builtin)
    }
}

/// A notation declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notation {
    /// Qualified name
    pub name: QName,
    /// Public identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<String>,
    /// System identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// A compiled schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    /// Target namespace of the main schema document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    pub(crate) elements: Vec<ElementDecl>,
    pub(crate) attributes: Vec<AttributeDecl>,
    pub(crate) simple_types: Vec<SimpleTypeDef>,
    pub(crate) complex_types: Vec<ComplexTypeDef>,
    pub(crate) model_groups: Vec<ModelGroup>,
    pub(crate) wildcards: Vec<Wildcard>,
    pub(crate) identity_constraints: Vec<IdentityConstraint>,
    pub(crate) attribute_groups: Vec<AttributeGroup>,
    pub(crate) notations: Vec<Notation>,
    pub(crate) global_elements: IndexMap<QName, ElementId>,
    pub(crate) global_attributes: IndexMap<QName, AttributeId>,
    pub(crate) global_types: IndexMap<QName, TypeRef>,
    pub(crate) global_groups: IndexMap<QName, ModelGroupId>,
    pub(crate) global_attribute_groups: IndexMap<QName, AttributeGroupId>,
    pub(crate) global_identity_constraints: IndexMap<QName, IdentityConstraintId>,
    pub(crate) global_notations: IndexMap<QName, NotationId>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Component access
    // =========================================================================

    /// Element declaration by index
    pub fn element(&self, id: ElementId) -> &ElementDecl {
        &self.elements[id.0]
    }

    /// Attribute declaration by index
    pub fn attribute(&self, id: AttributeId) -> &AttributeDecl {
        &self.attributes[id.0]
    }

    /// Simple type by index
    pub fn simple_type(&self, id: SimpleTypeId) -> &SimpleTypeDef {
        &self.simple_types[id.0]
    }

    /// Complex type by index
    pub fn complex_type(&self, id: ComplexTypeId) -> &ComplexTypeDef {
        &self.complex_types[id.0]
    }

    /// Model group by index
    pub fn model_group(&self, id: ModelGroupId) -> &ModelGroup {
        &self.model_groups[id.0]
    }

    /// Element wildcard by index
    pub fn wildcard(&self, id: WildcardId) -> &Wildcard {
        &self.wildcards[id.0]
    }

    /// Identity constraint by index
    pub fn identity_constraint(&self, id: IdentityConstraintId) -> &IdentityConstraint {
        &self.identity_constraints[id.0]
    }

    /// Attribute group by index
    pub fn attribute_group(&self, id: AttributeGroupId) -> &AttributeGroup {
        &self.attribute_groups[id.0]
    }

    /// Notation by index
    pub fn notation(&self, id: NotationId) -> &Notation {
        &self.notations[id.0]
    }

    // =========================================================================
    // Lookup by name
    // =========================================================================

    /// Global element declaration
    pub fn element_by_name(&self, name: &QName) -> Option<ElementId> {
        self.global_elements.get(name).copied()
    }

    /// Global attribute declaration
    pub fn attribute_by_name(&self, name: &QName) -> Option<AttributeId> {
        self.global_attributes.get(name).copied()
    }

    /// Global type, built-in types and xs:anyType included
    pub fn type_by_name(&self, name: &QName) -> Option<TypeRef> {
        if let Some(t) = self.global_types.get(name) {
            return Some(*t);
        }
        if name.is_in(XSD_NAMESPACE) {
            if name.local_name == "anyType" {
                return Some(TypeRef::AnyType);
            }
            return BuiltinType::from_name(&name.local_name).map(TypeRef::Builtin);
        }
        None
    }

    /// Global model group
    pub fn group_by_name(&self, name: &QName) -> Option<ModelGroupId> {
        self.global_groups.get(name).copied()
    }

    /// Global attribute group
    pub fn attribute_group_by_name(&self, name: &QName) -> Option<AttributeGroupId> {
        self.global_attribute_groups.get(name).copied()
    }

    /// Identity constraint by name
    pub fn identity_constraint_by_name(&self, name: &QName) -> Option<IdentityConstraintId> {
        self.global_identity_constraints.get(name).copied()
    }

    /// Notation by name
    pub fn notation_by_name(&self, name: &QName) -> Option<NotationId> {
        self.global_notations.get(name).copied()
    }

    /// Whether any element is declared at all
    pub fn has_element_declarations(&self) -> bool {
        !self.elements.is_empty()
    }

    /// Names of the global elements
    pub fn global_element_names(&self) -> impl Iterator<Item = &QName> {
        self.global_elements.keys()
    }

    /// Namespaces used by global components
    pub fn namespaces(&self) -> HashSet<String> {
        self.global_elements
            .keys()
            .chain(self.global_types.keys())
            .chain(self.global_attributes.keys())
            .map(|q| q.namespace_str().to_string())
            .collect()
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// Display name of a type
    pub fn type_name(&self, type_ref: TypeRef) -> String {
        let name = match type_ref {
            TypeRef::AnyType => return QName::xsd("anyType").to_string(),
            TypeRef::Builtin(b) => return b.qname().to_string(),
            TypeRef::Simple(id) => self.simple_type(id).name.as_ref(),
            TypeRef::Complex(id) => self.complex_type(id).name.as_ref(),
        };
        match name {
            Some(name) => name.to_string(),
            None => match type_ref {
                TypeRef::Complex(id) => format!("anonymous complex type {}", id),
                TypeRef::Simple(id) => format!("anonymous simple type {}", id),
                _ => String::new(),
            },
        }
    }

    /// Base type, None for xs:anyType
    pub fn base_type(&self, type_ref: TypeRef) -> Option<TypeRef> {
        match type_ref {
            TypeRef::AnyType => None,
            TypeRef::Builtin(BuiltinType::AnySimpleType) => Some(TypeRef::AnyType),
            TypeRef::Builtin(b) => b.base().map(TypeRef::Builtin),
            TypeRef::Simple(id) => Some(self.simple_type(id).base),
            TypeRef::Complex(id) => Some(self.complex_type(id).base),
        }
    }

    fn derivation_method(&self, type_ref: TypeRef) -> DerivationMethod {
        match type_ref {
            TypeRef::Complex(id) => self.complex_type(id).derivation,
            _ => DerivationMethod::Restriction,
        }
    }

    /// Whether `derived` may stand in for `base` given the blocked methods
    pub fn is_validly_substitutable(
        &self,
        derived: TypeRef,
        base: TypeRef,
        blocked: DerivationSet,
    ) -> bool {
        let mut current = derived;
        // A well-formed chain ends at anyType within arena size steps
        for _ in 0..=self.simple_types.len() + self.complex_types.len() + BuiltinType::all().len() {
            if current == base {
                return true;
            }
            if blocked.blocks(self.derivation_method(current)) {
                return false;
            }
            match self.base_type(current) {
                Some(next) => current = next,
                None => return false,
            }
        }
        false
    }

    /// Whether the type is abstract
    pub fn is_abstract_type(&self, type_ref: TypeRef) -> bool {
        matches!(type_ref, TypeRef::Complex(id) if self.complex_type(id).is_abstract)
    }

    /// Content variety of a type, simple types have simple content
    pub fn content_variety(&self, type_ref: TypeRef) -> ContentVariety {
        match type_ref {
            TypeRef::AnyType => ContentVariety::Mixed,
            TypeRef::Builtin(_) | TypeRef::Simple(_) => ContentVariety::Simple,
            TypeRef::Complex(id) => self.complex_type(id).content.variety,
        }
    }

    /// The simple type governing character content of a type
    pub fn simple_content_type(&self, type_ref: TypeRef) -> Option<TypeRef> {
        match type_ref {
            TypeRef::Builtin(_) | TypeRef::Simple(_) => Some(type_ref),
            TypeRef::Complex(id) => {
                let content = &self.complex_type(id).content;
                if content.variety == ContentVariety::Simple {
                    Some(content.simple_type.unwrap_or_else(TypeRef::any_simple_type))
                } else {
                    None
                }
            }
            TypeRef::AnyType => None,
        }
    }

    /// Variety of a simple type; built-in list types are lists of their item type
    pub fn simple_variety(&self, type_ref: TypeRef) -> Option<SimpleVariety> {
        match type_ref {
            TypeRef::Builtin(b) => Some(match b.item_type() {
                Some(item) => SimpleVariety::List {
                    item_type: TypeRef::Builtin(item),
                },
                None => SimpleVariety::Atomic,
            }),
            TypeRef::Simple(id) => Some(self.simple_type(id).variety.clone()),
            _ => None,
        }
    }

    /// Nearest built-in ancestor of an atomic simple type
    pub fn builtin_ancestor(&self, type_ref: TypeRef) -> Option<BuiltinType> {
        let mut current = type_ref;
        for _ in 0..=self.simple_types.len() {
            match current {
                TypeRef::Builtin(b) => return Some(b),
                TypeRef::Simple(id) => current = self.simple_type(id).base,
                _ => return None,
            }
        }
        None
    }

    /// Facets of a simple type merged along its derivation chain
    ///
    /// Facets declared at a more derived level replace inherited facets of the
    /// same kind, Pattern and Enumeration included. Built-in types contribute
    /// their whiteSpace facet; list and union types collapse whitespace.
    pub fn merged_facets(&self, type_ref: TypeRef) -> Arc<FacetSet> {
        match type_ref {
            TypeRef::Builtin(b) => {
                let mut set = FacetSet::new();
                set.insert(Facet::white_space(b.white_space()));
                Arc::new(set)
            }
            TypeRef::Simple(id) => {
                let def = self.simple_type(id);
                def.merged
                    .get_or_init(|| {
                        let constructs_variety = def.base == TypeRef::any_simple_type()
                            && !matches!(def.variety, SimpleVariety::Atomic);
                        let mut set = if constructs_variety {
                            let mut set = FacetSet::new();
                            set.insert(Facet::white_space(
                                crate::validators::facets::WhiteSpace::Collapse,
                            ));
                            set
                        } else {
                            self.merged_facets(def.base).as_ref().clone()
                        };
                        set.overlay(&def.facets);
                        Arc::new(set)
                    })
                    .clone()
            }
            TypeRef::Complex(_) | TypeRef::AnyType => match self.simple_content_type(type_ref) {
                Some(simple) => self.merged_facets(simple),
                None => Arc::new(FacetSet::new()),
            },
        }
    }

    /// Deterministic content automaton of a complex type, built on first use
    ///
    /// The cached automaton is checked against `limits` on every call, so a
    /// later run with a lower state limit still fails. Occurrence expansion
    /// limits only apply when the automaton is first built.
    pub fn content_automaton(
        &self,
        id: ComplexTypeId,
        limits: &Limits,
    ) -> Result<Automaton<ContentLabel>> {
        let def = self.complex_type(id);
        let automaton = def.automaton.get_or_try_init(|| {
            let automaton = build_content_automaton(self, def.content.particle.as_ref(), limits)?;
            tracing::debug!(
                complex_type = %self.type_name(TypeRef::Complex(id)),
                states = automaton.state_count(),
                "built content automaton"
            );
            Ok::<_, Error>(automaton)
        })?;
        limits.check_automaton_states(automaton.state_count())?;
        Ok(automaton.clone())
    }

    /// Attribute uses of a complex type, attribute groups expanded
    pub fn effective_attribute_uses(&self, id: ComplexTypeId) -> Vec<&AttributeUse> {
        let def = self.complex_type(id);
        let mut uses: Vec<&AttributeUse> = def.attribute_uses.iter().collect();
        let mut visited = HashSet::new();
        let mut pending: Vec<AttributeGroupId> = def.attribute_groups.clone();
        while let Some(group) = pending.pop() {
            if !visited.insert(group) {
                continue;
            }
            let group = self.attribute_group(group);
            for attribute_use in &group.attribute_uses {
                let name = &self.attribute(attribute_use.attribute).name;
                if !uses.iter().any(|u| &self.attribute(u.attribute).name == name) {
                    uses.push(attribute_use);
                }
            }
            pending.extend(group.attribute_groups.iter().copied());
        }
        uses
    }

    /// Attribute wildcard of a complex type or its attribute groups
    pub fn effective_attribute_wildcard(&self, id: ComplexTypeId) -> Option<&Wildcard> {
        let def = self.complex_type(id);
        if def.attribute_wildcard.is_some() {
            return def.attribute_wildcard.as_ref();
        }
        let mut visited = HashSet::new();
        let mut pending: Vec<AttributeGroupId> = def.attribute_groups.clone();
        while let Some(group) = pending.pop() {
            if !visited.insert(group) {
                continue;
            }
            let group = self.attribute_group(group);
            if group.attribute_wildcard.is_some() {
                return group.attribute_wildcard.as_ref();
            }
            pending.extend(group.attribute_groups.iter().copied());
        }
        None
    }

    // =========================================================================
    // Serialization and consistency
    // =========================================================================

    /// Read a schema from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.check_references()?;
        Ok(schema)
    }

    /// Write the schema as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Verify that every index refers to an existing component and that
    /// derivation chains are acyclic
    pub fn check_references(&self) -> Result<()> {
        let dangling = |what: &str, index: usize| {
            Err(Error::Schema(format!("reference to missing {} #{}", what, index)))
        };

        let check_type = |t: TypeRef| -> Result<()> {
            match t {
                TypeRef::Simple(id) if id.0 >= self.simple_types.len() => {
                    dangling("simple type", id.0)
                }
                TypeRef::Complex(id) if id.0 >= self.complex_types.len() => {
                    dangling("complex type", id.0)
                }
                _ => Ok(()),
            }
        };
        let check_particle = |p: &Particle| -> Result<()> {
            match p.term {
                Term::Element(id) if id.0 >= self.elements.len() => dangling("element", id.0),
                Term::ModelGroup(id) if id.0 >= self.model_groups.len() => {
                    dangling("model group", id.0)
                }
                Term::Wildcard(id) if id.0 >= self.wildcards.len() => dangling("wildcard", id.0),
                _ => Ok(()),
            }
        };
        let check_uses = |uses: &[AttributeUse], groups: &[AttributeGroupId]| -> Result<()> {
            for u in uses {
                if u.attribute.0 >= self.attributes.len() {
                    return dangling("attribute", u.attribute.0);
                }
            }
            for g in groups {
                if g.0 >= self.attribute_groups.len() {
                    return dangling("attribute group", g.0);
                }
            }
            Ok(())
        };

        for element in &self.elements {
            check_type(element.type_ref)?;
            for ic in &element.identity_constraints {
                if ic.0 >= self.identity_constraints.len() {
                    return dangling("identity constraint", ic.0);
                }
            }
        }
        for attribute in &self.attributes {
            check_type(attribute.type_ref)?;
        }
        for def in &self.simple_types {
            check_type(def.base)?;
            match &def.variety {
                SimpleVariety::Atomic => {}
                SimpleVariety::List { item_type } => check_type(*item_type)?,
                SimpleVariety::Union { member_types } => {
                    for member in member_types {
                        check_type(*member)?;
                    }
                }
            }
        }
        for def in &self.complex_types {
            check_type(def.base)?;
            if let Some(simple) = def.content.simple_type {
                check_type(simple)?;
            }
            if let Some(particle) = &def.content.particle {
                check_particle(particle)?;
            }
            check_uses(&def.attribute_uses, &def.attribute_groups)?;
        }
        for group in &self.model_groups {
            for particle in &group.particles {
                check_particle(particle)?;
            }
        }
        for group in &self.attribute_groups {
            check_uses(&group.attribute_uses, &group.attribute_groups)?;
        }
        for (name, id) in &self.global_elements {
            if id.0 >= self.elements.len() {
                return Err(Error::Schema(format!("global element {} is missing", name)));
            }
        }
        for (name, t) in &self.global_types {
            check_type(*t).map_err(|_| Error::Schema(format!("global type {} is missing", name)))?;
        }
        for (name, id) in &self.global_attributes {
            if id.0 >= self.attributes.len() {
                return Err(Error::Schema(format!("global attribute {} is missing", name)));
            }
        }
        for (name, id) in &self.global_groups {
            if id.0 >= self.model_groups.len() {
                return Err(Error::Schema(format!("global group {} is missing", name)));
            }
        }
        for (name, id) in &self.global_attribute_groups {
            if id.0 >= self.attribute_groups.len() {
                return Err(Error::Schema(format!("attribute group {} is missing", name)));
            }
        }
        for (name, id) in &self.global_identity_constraints {
            if id.0 >= self.identity_constraints.len() {
                return Err(Error::Schema(format!("identity constraint {} is missing", name)));
            }
        }
        for (name, id) in &self.global_notations {
            if id.0 >= self.notations.len() {
                return Err(Error::Schema(format!("notation {} is missing", name)));
            }
        }

        for index in 0..self.simple_types.len() + self.complex_types.len() {
            let start = if index < self.simple_types.len() {
                TypeRef::Simple(SimpleTypeId(index))
            } else {
                TypeRef::Complex(ComplexTypeId(index - self.simple_types.len()))
            };
            let mut current = Some(start);
            let mut steps = 0;
            while let Some(t) = current {
                steps += 1;
                if steps > self.simple_types.len() + self.complex_types.len() + 1 {
                    return Err(Error::Schema(format!(
                        "circular derivation of {}",
                        self.type_name(start)
                    )));
                }
                current = match t {
                    TypeRef::Simple(id) => Some(self.simple_type(id).base),
                    TypeRef::Complex(id) => Some(self.complex_type(id).base),
                    _ => None,
                };
            }
        }
        Ok(())
    }
}

// =============================================================================
// Schema Builder
// =============================================================================

/// Typed builder over the schema arena
///
/// Global names are registered when a named component is added. Declaring
/// the same global name twice is reported by [`build`](SchemaBuilder::build).
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
    duplicates: Vec<String>,
}

fn register<V: Copy>(
    map: &mut IndexMap<QName, V>,
    duplicates: &mut Vec<String>,
    what: &str,
    name: &QName,
    value: V,
) {
    if map.contains_key(name) {
        duplicates.push(format!("{} {}", what, name));
    } else {
        map.insert(name.clone(), value);
    }
}

impl SchemaBuilder {
    /// Create a builder for a schema with the given target namespace
    pub fn new(target_namespace: Option<&str>) -> Self {
        Self {
            schema: Schema {
                target_namespace: target_namespace.map(String::from).filter(|s| !s.is_empty()),
                ..Schema::default()
            },
            duplicates: Vec::new(),
        }
    }

    /// Qualified name in the target namespace
    pub fn qname(&self, local_name: &str) -> QName {
        QName::new(self.schema.target_namespace.clone(), local_name)
    }

    /// Add a local element declaration
    pub fn add_element(&mut self, decl: ElementDecl) -> ElementId {
        self.schema.elements.push(decl);
        ElementId(self.schema.elements.len() - 1)
    }

    /// Add a global element declaration
    pub fn add_global_element(&mut self, decl: ElementDecl) -> ElementId {
        let name = decl.name.clone();
        let id = self.add_element(decl);
        register(
            &mut self.schema.global_elements,
            &mut self.duplicates,
            "element",
            &name,
            id,
        );
        id
    }

    /// Add a local attribute declaration
    pub fn add_attribute(&mut self, decl: AttributeDecl) -> AttributeId {
        self.schema.attributes.push(decl);
        AttributeId(self.schema.attributes.len() - 1)
    }

    /// Add a global attribute declaration
    pub fn add_global_attribute(&mut self, decl: AttributeDecl) -> AttributeId {
        let name = decl.name.clone();
        let id = self.add_attribute(decl);
        register(
            &mut self.schema.global_attributes,
            &mut self.duplicates,
            "attribute",
            &name,
            id,
        );
        id
    }

    /// Add a simple type, registered globally when named
    pub fn add_simple_type(&mut self, def: SimpleTypeDef) -> TypeRef {
        let name = def.name.clone();
        self.schema.simple_types.push(def);
        let type_ref = TypeRef::Simple(SimpleTypeId(self.schema.simple_types.len() - 1));
        if let Some(name) = name {
            register(
                &mut self.schema.global_types,
                &mut self.duplicates,
                "type",
                &name,
                type_ref,
            );
        }
        type_ref
    }

    /// Add a complex type, registered globally when named
    pub fn add_complex_type(&mut self, def: ComplexTypeDef) -> TypeRef {
        let name = def.name.clone();
        self.schema.complex_types.push(def);
        let type_ref = TypeRef::Complex(ComplexTypeId(self.schema.complex_types.len() - 1));
        if let Some(name) = name {
            register(
                &mut self.schema.global_types,
                &mut self.duplicates,
                "type",
                &name,
                type_ref,
            );
        }
        type_ref
    }

    /// Add a model group, registered globally when named
    pub fn add_model_group(&mut self, group: ModelGroup) -> ModelGroupId {
        let name = group.name.clone();
        self.schema.model_groups.push(group);
        let id = ModelGroupId(self.schema.model_groups.len() - 1);
        if let Some(name) = name {
            register(
                &mut self.schema.global_groups,
                &mut self.duplicates,
                "group",
                &name,
                id,
            );
        }
        id
    }

    /// Add an element wildcard
    pub fn add_wildcard(&mut self, wildcard: Wildcard) -> WildcardId {
        self.schema.wildcards.push(wildcard);
        WildcardId(self.schema.wildcards.len() - 1)
    }

    /// Add an identity constraint (attach it to an element separately)
    pub fn add_identity_constraint(&mut self, constraint: IdentityConstraint) -> IdentityConstraintId {
        let name = constraint.name.clone();
        self.schema.identity_constraints.push(constraint);
        let id = IdentityConstraintId(self.schema.identity_constraints.len() - 1);
        register(
            &mut self.schema.global_identity_constraints,
            &mut self.duplicates,
            "identity constraint",
            &name,
            id,
        );
        id
    }

    /// Add an attribute group
    pub fn add_attribute_group(&mut self, group: AttributeGroup) -> AttributeGroupId {
        let name = group.name.clone();
        self.schema.attribute_groups.push(group);
        let id = AttributeGroupId(self.schema.attribute_groups.len() - 1);
        register(
            &mut self.schema.global_attribute_groups,
            &mut self.duplicates,
            "attribute group",
            &name,
            id,
        );
        id
    }

    /// Add a notation
    pub fn add_notation(&mut self, notation: Notation) -> NotationId {
        let name = notation.name.clone();
        self.schema.notations.push(notation);
        let id = NotationId(self.schema.notations.len() - 1);
        register(
            &mut self.schema.global_notations,
            &mut self.duplicates,
            "notation",
            &name,
            id,
        );
        id
    }

    /// Mutable access to an element, e.g. to close a recursive definition
    pub fn element_mut(&mut self, id: ElementId) -> &mut ElementDecl {
        &mut self.schema.elements[id.0]
    }

    /// Mutable access to a complex type
    pub fn complex_type_mut(&mut self, id: ComplexTypeId) -> &mut ComplexTypeDef {
        &mut self.schema.complex_types[id.0]
    }

    /// Mutable access to a model group
    pub fn model_group_mut(&mut self, id: ModelGroupId) -> &mut ModelGroup {
        &mut self.schema.model_groups[id.0]
    }

    /// Finish the schema
    pub fn build(self) -> Result<Schema> {
        if !self.duplicates.is_empty() {
            return Err(Error::Schema(format!(
                "duplicate global declarations: {}",
                self.duplicates.join(", ")
            )));
        }
        self.schema.check_references()?;
        Ok(self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::complex_types::ContentType;
    use crate::validators::facets::{FacetKind, WhiteSpace};
    use pretty_assertions::assert_eq;

    fn small_int_schema() -> (Schema, TypeRef, TypeRef) {
        let mut b = SchemaBuilder::new(Some("urn:t"));
        let base = b.add_simple_type(
            SimpleTypeDef::atomic(BuiltinType::Int.into())
                .named(b.qname("small"))
                .with_facet(Facet::new(FacetKind::MaxInclusive, "10"))
                .with_facet(Facet::pattern("[0-9]+")),
        );
        let derived = b.add_simple_type(
            SimpleTypeDef::atomic(base).with_facet(Facet::new(FacetKind::MaxInclusive, "5")),
        );
        (b.build().unwrap(), base, derived)
    }

    #[test]
    fn test_merged_facets_override() {
        let (schema, base, derived) = small_int_schema();

        let facets = schema.merged_facets(derived);
        assert_eq!(facets.get(FacetKind::MaxInclusive).unwrap().single_value(), Some("5"));
        assert!(facets.contains(FacetKind::Pattern));
        assert_eq!(facets.white_space(), WhiteSpace::Collapse);
        assert_eq!(
            schema.merged_facets(base).get(FacetKind::MaxInclusive).unwrap().single_value(),
            Some("10")
        );
        assert!(Arc::ptr_eq(&facets, &schema.merged_facets(derived)));
    }

    #[test]
    fn test_list_types_collapse() {
        let mut b = SchemaBuilder::new(None);
        let list = b.add_simple_type(SimpleTypeDef::list(BuiltinType::String.into()));
        let schema = b.build().unwrap();
        assert_eq!(schema.merged_facets(list).white_space(), WhiteSpace::Collapse);
        assert_eq!(
            schema.merged_facets(BuiltinType::String.into()).white_space(),
            WhiteSpace::Preserve
        );
    }

    #[test]
    fn test_type_lookup() {
        let (schema, base, _) = small_int_schema();
        assert_eq!(schema.type_by_name(&QName::namespaced("urn:t", "small")), Some(base));
        assert_eq!(schema.type_by_name(&QName::xsd("anyType")), Some(TypeRef::AnyType));
        assert_eq!(
            schema.type_by_name(&QName::xsd("date")),
            Some(TypeRef::Builtin(BuiltinType::Date))
        );
        assert_eq!(schema.type_by_name(&QName::local("small")), None);
        assert_eq!(schema.builtin_ancestor(base), Some(BuiltinType::Int));
        assert_eq!(schema.type_name(base), "{urn:t}small");
    }

    #[test]
    fn test_substitution_and_blocking() {
        let mut b = SchemaBuilder::new(None);
        let base = b.add_complex_type(ComplexTypeDef::new(ContentType::empty()).named(b.qname("base")));
        let ext = b.add_complex_type(
            ComplexTypeDef::new(ContentType::empty())
                .named(b.qname("ext"))
                .derived_from(base, DerivationMethod::Extension),
        );
        let schema = b.build().unwrap();

        assert!(schema.is_validly_substitutable(ext, base, DerivationSet::default()));
        assert!(!schema.is_validly_substitutable(ext, base, DerivationSet::parse("extension")));
        assert!(!schema.is_validly_substitutable(base, ext, DerivationSet::default()));
        assert!(schema.is_validly_substitutable(
            BuiltinType::Byte.into(),
            BuiltinType::Integer.into(),
            DerivationSet::default()
        ));
        assert!(schema.is_validly_substitutable(ext, TypeRef::AnyType, DerivationSet::default()));
    }

    #[test]
    fn test_duplicate_globals_rejected() {
        let mut b = SchemaBuilder::new(None);
        b.add_global_element(ElementDecl::new(QName::local("a"), TypeRef::AnyType));
        b.add_global_element(ElementDecl::new(QName::local("a"), TypeRef::AnyType));
        assert!(matches!(b.build(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_cached_automaton_rechecks_state_limit() {
        let mut b = SchemaBuilder::new(None);
        let item = b.add_element(ElementDecl::new(b.qname("item"), TypeRef::AnyType));
        let group = b.add_model_group(ModelGroup::sequence(vec![Particle::element(item).with_occurs(3, Some(3))]));
        let TypeRef::Complex(list) =
            b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(group))))
        else {
            panic!("complex type expected");
        };
        let schema = b.build().unwrap();

        let built = schema.content_automaton(list, &Limits::default()).unwrap();
        assert!(built.state_count() > 2);

        let mut tight = Limits::default();
        tight.max_automaton_states = 2;
        assert!(matches!(
            schema.content_automaton(list, &tight),
            Err(Error::LimitExceeded(_))
        ));
        assert!(schema.content_automaton(list, &Limits::default()).is_ok());
    }

    #[test]
    fn test_json_round_trip_keeps_lookups() {
        let (schema, base, _) = small_int_schema();
        let json = schema.to_json().unwrap();
        let back = Schema::from_json(&json).unwrap();
        assert_eq!(back.type_by_name(&QName::namespaced("urn:t", "small")), Some(base));
        assert_eq!(back.simple_types.len(), 2);
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let json = r#"{
            "elements": [{"name": "a", "type_ref": {"Complex": 4}}],
            "global_elements": {"a": 0}
        }"#;
        assert!(matches!(Schema::from_json(json), Err(Error::Schema(_))));
    }

    #[test]
    fn test_circular_derivation_rejected() {
        let json = r#"{
            "simple_types": [
                {"base": {"Simple": 1}, "variety": "Atomic"},
                {"base": {"Simple": 0}, "variety": "Atomic"}
            ]
        }"#;
        assert!(matches!(Schema::from_json(json), Err(Error::Schema(_))));
    }
}
