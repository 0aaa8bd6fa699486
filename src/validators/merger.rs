//! Schema merging
//!
//! Folds a schema discovered during validation (through a schema location
//! hint) into the active one. Every component of both schemas is kept; the
//! incoming arena is appended and its indices shifted. Global names are
//! first-declared-wins: a name already present in the base schema keeps
//! pointing at the base component.

use crate::validators::attributes::{AttributeDecl, AttributeGroup, AttributeUse};
use crate::validators::complex_types::ComplexTypeDef;
use crate::validators::elements::ElementDecl;
use crate::validators::particles::{ModelGroup, Particle, Term};
use crate::validators::schemas::{
    AttributeGroupId, AttributeId, ComplexTypeId, ElementId, IdentityConstraintId, ModelGroupId,
    NotationId, Schema, SimpleTypeId, TypeRef, WildcardId,
};
use crate::validators::simple_types::{SimpleTypeDef, SimpleVariety};
use crate::namespaces::QName;
use indexmap::IndexMap;

/// Arena sizes of the base schema, added to every incoming index
#[derive(Debug, Clone, Copy, Default)]
struct Offsets {
    elements: usize,
    attributes: usize,
    simple_types: usize,
    complex_types: usize,
    model_groups: usize,
    wildcards: usize,
    identity_constraints: usize,
    attribute_groups: usize,
    notations: usize,
}

impl Offsets {
    fn of(schema: &Schema) -> Self {
        Self {
            elements: schema.elements.len(),
            attributes: schema.attributes.len(),
            simple_types: schema.simple_types.len(),
            complex_types: schema.complex_types.len(),
            model_groups: schema.model_groups.len(),
            wildcards: schema.wildcards.len(),
            identity_constraints: schema.identity_constraints.len(),
            attribute_groups: schema.attribute_groups.len(),
            notations: schema.notations.len(),
        }
    }
}

/// Shift the arena indices held by a component
trait Reindex {
    fn reindex(&mut self, offsets: &Offsets);
}

impl Reindex for TypeRef {
    fn reindex(&mut self, offsets: &Offsets) {
        match self {
            TypeRef::Simple(id) => *id = SimpleTypeId(id.0 + offsets.simple_types),
            TypeRef::Complex(id) => *id = ComplexTypeId(id.0 + offsets.complex_types),
            TypeRef::AnyType | TypeRef::Builtin(_) => {}
        }
    }
}

impl Reindex for Particle {
    fn reindex(&mut self, offsets: &Offsets) {
        self.term = match self.term {
            Term::Element(id) => Term::Element(ElementId(id.0 + offsets.elements)),
            Term::ModelGroup(id) => Term::ModelGroup(ModelGroupId(id.0 + offsets.model_groups)),
            Term::Wildcard(id) => Term::Wildcard(WildcardId(id.0 + offsets.wildcards)),
        };
    }
}

impl Reindex for ElementDecl {
    fn reindex(&mut self, offsets: &Offsets) {
        self.type_ref.reindex(offsets);
        for id in &mut self.identity_constraints {
            *id = IdentityConstraintId(id.0 + offsets.identity_constraints);
        }
    }
}

impl Reindex for AttributeDecl {
    fn reindex(&mut self, offsets: &Offsets) {
        self.type_ref.reindex(offsets);
    }
}

impl Reindex for AttributeUse {
    fn reindex(&mut self, offsets: &Offsets) {
        self.attribute = AttributeId(self.attribute.0 + offsets.attributes);
    }
}

fn reindex_groups(groups: &mut [AttributeGroupId], offsets: &Offsets) {
    for id in groups {
        *id = AttributeGroupId(id.0 + offsets.attribute_groups);
    }
}

impl Reindex for SimpleTypeDef {
    fn reindex(&mut self, offsets: &Offsets) {
        self.reset_caches();
        self.base.reindex(offsets);
        match &mut self.variety {
            SimpleVariety::Atomic => {}
            SimpleVariety::List { item_type } => item_type.reindex(offsets),
            SimpleVariety::Union { member_types } => {
                member_types.iter_mut().for_each(|t| t.reindex(offsets))
            }
        }
    }
}

impl Reindex for ComplexTypeDef {
    fn reindex(&mut self, offsets: &Offsets) {
        // Cached automata carry indices of the incoming arena
        self.reset_caches();
        self.base.reindex(offsets);
        if let Some(particle) = &mut self.content.particle {
            particle.reindex(offsets);
        }
        if let Some(simple) = &mut self.content.simple_type {
            simple.reindex(offsets);
        }
        self.attribute_uses
            .iter_mut()
            .for_each(|u| u.reindex(offsets));
        reindex_groups(&mut self.attribute_groups, offsets);
    }
}

impl Reindex for ModelGroup {
    fn reindex(&mut self, offsets: &Offsets) {
        self.particles.iter_mut().for_each(|p| p.reindex(offsets));
    }
}

impl Reindex for AttributeGroup {
    fn reindex(&mut self, offsets: &Offsets) {
        self.attribute_uses
            .iter_mut()
            .for_each(|u| u.reindex(offsets));
        reindex_groups(&mut self.attribute_groups, offsets);
    }
}

fn append<T: Clone + Reindex>(target: &mut Vec<T>, incoming: &[T], offsets: &Offsets) {
    target.extend(incoming.iter().map(|item| {
        let mut item = item.clone();
        item.reindex(offsets);
        item
    }));
}

/// Add incoming global names not yet declared; returns how many were skipped
fn merge_names<V: Copy>(
    target: &mut IndexMap<QName, V>,
    incoming: &IndexMap<QName, V>,
    shift: impl Fn(V) -> V,
) -> usize {
    let mut skipped = 0;
    for (name, value) in incoming {
        if target.contains_key(name) {
            tracing::trace!(%name, "keeping first declaration");
            skipped += 1;
        } else {
            target.insert(name.clone(), shift(*value));
        }
    }
    skipped
}

/// Merge `incoming` into a copy of `base`, first declaration wins
pub fn merge(base: &Schema, incoming: &Schema) -> Schema {
    let offsets = Offsets::of(base);
    let mut merged = base.clone();
    if merged.target_namespace.is_none() {
        merged.target_namespace = incoming.target_namespace.clone();
    }

    append(&mut merged.elements, &incoming.elements, &offsets);
    append(&mut merged.attributes, &incoming.attributes, &offsets);
    append(&mut merged.simple_types, &incoming.simple_types, &offsets);
    append(&mut merged.complex_types, &incoming.complex_types, &offsets);
    append(&mut merged.model_groups, &incoming.model_groups, &offsets);
    append(&mut merged.attribute_groups, &incoming.attribute_groups, &offsets);
    merged.wildcards.extend(incoming.wildcards.iter().cloned());
    merged
        .identity_constraints
        .extend(incoming.identity_constraints.iter().cloned());
    merged.notations.extend(incoming.notations.iter().cloned());

    let o = offsets;
    let mut skipped = 0;
    skipped += merge_names(&mut merged.global_elements, &incoming.global_elements, |id| {
        ElementId(id.0 + o.elements)
    });
    skipped += merge_names(
        &mut merged.global_attributes,
        &incoming.global_attributes,
        |id| AttributeId(id.0 + o.attributes),
    );
    skipped += merge_names(&mut merged.global_types, &incoming.global_types, |mut t| {
        t.reindex(&o);
        t
    });
    skipped += merge_names(&mut merged.global_groups, &incoming.global_groups, |id| {
        ModelGroupId(id.0 + o.model_groups)
    });
    skipped += merge_names(
        &mut merged.global_attribute_groups,
        &incoming.global_attribute_groups,
        |id| AttributeGroupId(id.0 + o.attribute_groups),
    );
    skipped += merge_names(
        &mut merged.global_identity_constraints,
        &incoming.global_identity_constraints,
        |id| IdentityConstraintId(id.0 + o.identity_constraints),
    );
    skipped += merge_names(&mut merged.global_notations, &incoming.global_notations, |id| {
        NotationId(id.0 + o.notations)
    });

    tracing::debug!(
        elements = merged.elements.len(),
        types = merged.simple_types.len() + merged.complex_types.len(),
        skipped_names = skipped,
        "merged schema"
    );
    merged
}

impl Schema {
    /// Merge another schema into a copy of this one, first declaration wins
    pub fn merge(&self, incoming: &Schema) -> Schema {
        merge(self, incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;
    use crate::validators::builtins::BuiltinType;
    use crate::validators::complex_types::ContentType;
    use crate::validators::models::{proceed_child, ContentLabel};
    use crate::validators::schemas::SchemaBuilder;

    fn schema_with(ns: &str, local: &str, root_type: BuiltinType) -> Schema {
        let mut b = SchemaBuilder::new(Some(ns));
        let child = b.add_element(ElementDecl::new(b.qname("child"), root_type.into()));
        let group = b.add_model_group(ModelGroup::sequence(vec![Particle::element(child)]));
        let ct = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(
            Particle::group(group),
        )));
        b.add_global_element(ElementDecl::new(b.qname(local), ct));
        b.add_simple_type(SimpleTypeDef::atomic(root_type.into()).named(b.qname("code")));
        b.build().unwrap()
    }

    #[test]
    fn test_merge_reindexes_incoming() {
        let base = schema_with("urn:a", "root", BuiltinType::String);
        let incoming = schema_with("urn:b", "other", BuiltinType::Int);
        let merged = base.merge(&incoming);

        assert_eq!(merged.elements.len(), 4);
        let other = merged
            .element_by_name(&QName::namespaced("urn:b", "other"))
            .unwrap();
        let TypeRef::Complex(ct) = merged.element(other).type_ref else {
            panic!("expected a complex type");
        };
        let mut automaton = merged.content_automaton(ct, &Limits::default()).unwrap();
        let label = proceed_child(&mut automaton, &merged, &QName::namespaced("urn:b", "child"));
        let Some(ContentLabel::Element(child)) = label else {
            panic!("child not accepted");
        };
        assert_eq!(
            merged.element(child).type_ref,
            TypeRef::Builtin(BuiltinType::Int)
        );
        assert!(merged.check_references().is_ok());
    }

    #[test]
    fn test_first_declaration_wins() {
        let base = schema_with("urn:a", "root", BuiltinType::String);
        let incoming = schema_with("urn:a", "root", BuiltinType::Int);
        let merged = merge(&base, &incoming);

        let code = merged.type_by_name(&QName::namespaced("urn:a", "code")).unwrap();
        assert_eq!(code, TypeRef::Simple(SimpleTypeId(0)));
        assert_eq!(merged.global_elements.len(), 1);
        // Components of both sides are kept
        assert_eq!(merged.complex_types.len(), 2);
        assert_eq!(merged.simple_types.len(), 2);
    }

    #[test]
    fn test_incoming_caches_are_reset() {
        let base = schema_with("urn:a", "root", BuiltinType::String);
        let incoming = schema_with("urn:b", "other", BuiltinType::Int);
        incoming
            .content_automaton(ComplexTypeId(0), &Limits::default())
            .unwrap();
        let merged = merge(&base, &incoming);
        assert!(merged.complex_types[1].automaton.get().is_none());
    }
}
