//! XSD Content Models
//!
//! This module turns the particle tree of a complex type into a
//! deterministic automaton over [`ContentLabel`]s:
//! - occurrence bounds are unrolled into mandatory and optional copies
//! - sequences are chained, choices branch through epsilon transitions
//! - `all` groups become a lattice over the subsets of consumed particles
//!
//! The NFA is built right to left starting from the accepting state and is
//! then converted with the subset construction.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#coss-particle

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::namespaces::QName;
use crate::validators::automaton::{Automaton, InputMatcher, StateId, StateType};
use crate::validators::particles::{Compositor, ModelGroup, Occurs, Particle, Term};
use crate::validators::schemas::{ElementId, ModelGroupId, Schema, WildcardId};
use crate::validators::wildcards::ProcessContents;

/// Transition label of a content model automaton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentLabel {
    /// A declared element
    Element(ElementId),
    /// An element wildcard
    Wildcard(WildcardId),
    /// Any element in any namespace (xs:anyType content, skipped regions)
    Any(ProcessContents),
}

/// A child element name checked against content labels
#[derive(Debug, Clone, Copy)]
pub struct ElementInput<'a> {
    /// Schema the labels refer to
    pub schema: &'a Schema,
    /// Name of the child element
    pub name: &'a QName,
}

impl InputMatcher<ElementInput<'_>> for ContentLabel {
    fn matches_input(&self, input: &ElementInput<'_>) -> bool {
        match self {
            ContentLabel::Element(id) => &input.schema.element(*id).name == input.name,
            ContentLabel::Wildcard(id) => input.schema.wildcard(*id).matches(input.name),
            ContentLabel::Any(_) => true,
        }
    }
}

/// Display name of a label for "expected" diagnostics
pub fn label_name(schema: &Schema, label: &ContentLabel) -> String {
    match label {
        ContentLabel::Element(id) => schema.element(*id).name.to_string(),
        ContentLabel::Wildcard(_) | ContentLabel::Any(_) => "any element".to_string(),
    }
}

/// Step the automaton with a child element
///
/// Declared elements take priority over wildcards that would also accept
/// the name. Returns the label taken, None if the child is not expected.
pub fn proceed_child(
    automaton: &mut Automaton<ContentLabel>,
    schema: &Schema,
    name: &QName,
) -> Option<ContentLabel> {
    let exact = automaton.possible_transitions().into_iter().find(
        |label| matches!(label, ContentLabel::Element(id) if &schema.element(*id).name == name),
    );
    let stepped = match exact {
        Some(label) => automaton.proceed(&label),
        None => automaton.proceed_matching(&ElementInput { schema, name }),
    };
    if stepped {
        automaton.last_transition().copied()
    } else {
        None
    }
}

/// Automaton accepting any sequence of elements
pub fn any_content_automaton(process_contents: ProcessContents) -> Automaton<ContentLabel> {
    let mut automaton = Automaton::new();
    let state = automaton.add_state(StateType::StartEnd);
    automaton.add_transition(state, ContentLabel::Any(process_contents), state);
    automaton.reset();
    automaton
}

/// Build the deterministic automaton of a content particle
///
/// A missing particle yields an automaton accepting only empty content.
pub fn build_content_automaton(
    schema: &Schema,
    particle: Option<&Particle>,
    limits: &Limits,
) -> Result<Automaton<ContentLabel>> {
    let mut builder = ModelBuilder {
        schema,
        limits,
        nfa: Automaton::new(),
        visiting: HashSet::new(),
    };
    let start = builder.nfa.add_state(StateType::Start);
    let end = builder.nfa.add_state(StateType::End);
    let entry = match particle {
        Some(particle) => builder.particle(particle, end)?,
        None => end,
    };
    builder.nfa.add_epsilon_transition(start, entry);

    let mut dfa = builder.nfa.to_dfa();
    dfa.reset();
    Ok(dfa)
}

struct ModelBuilder<'a> {
    schema: &'a Schema,
    limits: &'a Limits,
    nfa: Automaton<ContentLabel>,
    visiting: HashSet<ModelGroupId>,
}

impl ModelBuilder<'_> {
    fn new_state(&mut self) -> Result<StateId> {
        let state = self.nfa.add_state(StateType::Internal);
        self.limits.check_automaton_states(self.nfa.state_count())?;
        Ok(state)
    }

    /// Entry state of `particle` whose accepted paths continue at `succ`
    fn particle(&mut self, particle: &Particle, succ: StateId) -> Result<StateId> {
        let occurs = particle.occurs;
        if occurs.max == Some(0) {
            return Ok(succ);
        }
        if occurs.is_inconsistent() {
            return Err(Error::Schema(format!(
                "minOccurs {} is greater than maxOccurs {:?}",
                occurs.min, occurs.max
            )));
        }
        self.limits
            .check_occurs_expansion(occurs.max.unwrap_or(occurs.min))?;

        let mut next = succ;
        match occurs.max {
            None => {
                let repeat = self.new_state()?;
                let body = self.term(&particle.term, repeat)?;
                self.nfa.add_epsilon_transition(repeat, body);
                self.nfa.add_epsilon_transition(repeat, succ);
                next = repeat;
            }
            Some(max) => {
                for _ in occurs.min..max {
                    let optional = self.new_state()?;
                    let body = self.term(&particle.term, next)?;
                    self.nfa.add_epsilon_transition(optional, body);
                    self.nfa.add_epsilon_transition(optional, next);
                    next = optional;
                }
            }
        }
        for _ in 0..occurs.min {
            next = self.term(&particle.term, next)?;
        }
        Ok(next)
    }

    fn term(&mut self, term: &Term, succ: StateId) -> Result<StateId> {
        match *term {
            Term::Element(id) => {
                let state = self.new_state()?;
                self.nfa.add_transition(state, ContentLabel::Element(id), succ);
                Ok(state)
            }
            Term::Wildcard(id) => {
                let state = self.new_state()?;
                self.nfa.add_transition(state, ContentLabel::Wildcard(id), succ);
                Ok(state)
            }
            Term::ModelGroup(id) => {
                if !self.visiting.insert(id) {
                    return Err(Error::Schema(format!(
                        "circular definition of model group {}",
                        group_name(self.schema.model_group(id), id)
                    )));
                }
                let schema = self.schema;
                let entry = self.group(schema.model_group(id), succ);
                self.visiting.remove(&id);
                entry
            }
        }
    }

    fn group(&mut self, group: &ModelGroup, succ: StateId) -> Result<StateId> {
        match group.compositor {
            Compositor::Sequence => {
                let mut next = succ;
                for particle in group.particles.iter().rev() {
                    next = self.particle(particle, next)?;
                }
                Ok(next)
            }
            Compositor::Choice => {
                let branch = self.new_state()?;
                for particle in &group.particles {
                    let entry = self.particle(particle, succ)?;
                    self.nfa.add_epsilon_transition(branch, entry);
                }
                Ok(branch)
            }
            Compositor::All => {
                let particles: Vec<&Particle> = group
                    .particles
                    .iter()
                    .filter(|p| p.occurs.max != Some(0))
                    .collect();
                self.limits.check_all_particles(particles.len())?;
                if particles.len() >= u64::BITS as usize {
                    return Err(Error::LimitExceeded(format!(
                        "All group with {} particles cannot be expanded",
                        particles.len()
                    )));
                }
                let required = particles
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.occurs.min > 0)
                    .fold(0u64, |mask, (i, _)| mask | 1 << i);
                let mut lattice = HashMap::new();
                self.all_subset(&particles, 0, required, succ, &mut lattice)
            }
        }
    }

    /// State of an `all` group after the particles in `consumed` were matched
    fn all_subset(
        &mut self,
        particles: &[&Particle],
        consumed: u64,
        required: u64,
        succ: StateId,
        lattice: &mut HashMap<u64, StateId>,
    ) -> Result<StateId> {
        if let Some(state) = lattice.get(&consumed) {
            return Ok(*state);
        }
        let state = self.new_state()?;
        lattice.insert(consumed, state);

        if consumed & required == required {
            self.nfa.add_epsilon_transition(state, succ);
        }
        for (i, particle) in particles.iter().enumerate() {
            let bit = 1u64 << i;
            if consumed & bit != 0 {
                continue;
            }
            let after = self.all_subset(particles, consumed | bit, required, succ, lattice)?;
            // Once chosen, a particle is matched at least once
            let at_least_once = Particle::new(
                particle.term,
                Occurs::new(particle.occurs.min.max(1), particle.occurs.max),
            );
            let entry = self.particle(&at_least_once, after)?;
            self.nfa.add_epsilon_transition(state, entry);
        }
        Ok(state)
    }
}

fn group_name(group: &ModelGroup, id: ModelGroupId) -> String {
    match &group.name {
        Some(name) => name.to_string(),
        None => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::elements::ElementDecl;
    use crate::validators::schemas::{SchemaBuilder, TypeRef};
    use crate::validators::wildcards::{NamespaceConstraint, Wildcard};

    struct Fixture {
        schema: Schema,
        a: ElementId,
        b: ElementId,
        c: ElementId,
    }

    fn fixture(build: impl FnOnce(&mut SchemaBuilder, [ElementId; 3]) -> Particle) -> (Fixture, Particle) {
        let mut builder = SchemaBuilder::new(None);
        let ids = ["A", "B", "C"].map(|n| {
            builder.add_element(ElementDecl::new(QName::local(n), TypeRef::AnyType))
        });
        let particle = build(&mut builder, ids);
        let fixture = Fixture {
            schema: builder.build().unwrap(),
            a: ids[0],
            b: ids[1],
            c: ids[2],
        };
        (fixture, particle)
    }

    fn run(fx: &Fixture, particle: &Particle, names: &[&str]) -> bool {
        let mut automaton =
            build_content_automaton(&fx.schema, Some(particle), &Limits::default()).unwrap();
        for name in names {
            if proceed_child(&mut automaton, &fx.schema, &QName::local(*name)).is_none() {
                return false;
            }
        }
        automaton.in_end_state()
    }

    #[test]
    fn test_sequence_with_occurs() {
        // (A, B?, C*)
        let (fx, particle) = fixture(|b, [a, bb, c]| {
            let group = b.add_model_group(ModelGroup::sequence(vec![
                Particle::element(a),
                Particle::element(bb).with_occurs(0, Some(1)),
                Particle::element(c).with_occurs(0, None),
            ]));
            Particle::group(group)
        });
        assert!(run(&fx, &particle, &["A", "C", "C"]));
        assert!(run(&fx, &particle, &["A"]));
        assert!(run(&fx, &particle, &["A", "B"]));
        assert!(!run(&fx, &particle, &["B", "A"]));
        assert!(!run(&fx, &particle, &["A", "B", "B"]));
        assert!(!run(&fx, &particle, &[]));
    }

    #[test]
    fn test_choice_and_bounded_repeat() {
        // (A | B){2,3}
        let (fx, particle) = fixture(|b, [a, bb, _]| {
            let group = b.add_model_group(ModelGroup::choice(vec![
                Particle::element(a),
                Particle::element(bb),
            ]));
            Particle::group(group).with_occurs(2, Some(3))
        });
        assert!(!run(&fx, &particle, &["A"]));
        assert!(run(&fx, &particle, &["A", "B"]));
        assert!(run(&fx, &particle, &["B", "B", "A"]));
        assert!(!run(&fx, &particle, &["A", "A", "A", "A"]));
    }

    #[test]
    fn test_all_group_any_order() {
        let (fx, particle) = fixture(|b, [a, bb, c]| {
            let group = b.add_model_group(ModelGroup::all(vec![
                Particle::element(a),
                Particle::element(bb),
                Particle::element(c).with_occurs(0, Some(1)),
            ]));
            Particle::group(group)
        });
        assert!(run(&fx, &particle, &["B", "A"]));
        assert!(run(&fx, &particle, &["C", "A", "B"]));
        assert!(!run(&fx, &particle, &["A", "A", "B"]));
        assert!(!run(&fx, &particle, &["A", "C"]));
    }

    #[test]
    fn test_element_beats_wildcard() {
        let mut builder = SchemaBuilder::new(None);
        let a = builder.add_element(ElementDecl::new(QName::local("A"), TypeRef::AnyType));
        let any = builder.add_wildcard(Wildcard::new(
            NamespaceConstraint::Any,
            ProcessContents::Lax,
        ));
        let group = builder.add_model_group(ModelGroup::choice(vec![
            Particle::wildcard(any),
            Particle::element(a),
        ]));
        let schema = builder.build().unwrap();
        let mut automaton = build_content_automaton(
            &schema,
            Some(&Particle::group(group)),
            &Limits::default(),
        )
        .unwrap();

        let label = proceed_child(&mut automaton, &schema, &QName::local("A"));
        assert_eq!(label, Some(ContentLabel::Element(a)));
        automaton.reset();
        let label = proceed_child(&mut automaton, &schema, &QName::namespaced("urn:x", "Z"));
        assert_eq!(label, Some(ContentLabel::Wildcard(any)));
    }

    #[test]
    fn test_circular_group_rejected() {
        let mut builder = SchemaBuilder::new(None);
        let group = builder.add_model_group(ModelGroup::sequence(vec![]));
        builder
            .model_group_mut(group)
            .particles
            .push(Particle::group(group));
        let schema = builder.build().unwrap();
        let result =
            build_content_automaton(&schema, Some(&Particle::group(group)), &Limits::default());
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_occurs_limits() {
        let (fx, particle) = fixture(|_, [a, _, _]| Particle::element(a).with_occurs(0, Some(100)));
        let limits = Limits {
            max_occurs_expansion: 10,
            ..Limits::default()
        };
        assert!(matches!(
            build_content_automaton(&fx.schema, Some(&particle), &limits),
            Err(Error::LimitExceeded(_))
        ));
        let inconsistent = Particle::element(fx.a).with_occurs(3, Some(2));
        assert!(matches!(
            build_content_automaton(&fx.schema, Some(&inconsistent), &Limits::default()),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_empty_and_any_content() {
        let (fx, _) = fixture(|_, [a, _, _]| Particle::element(a));
        let mut empty = build_content_automaton(&fx.schema, None, &Limits::default()).unwrap();
        assert!(empty.in_end_state());
        assert!(proceed_child(&mut empty, &fx.schema, &QName::local("A")).is_none());

        let mut any = any_content_automaton(ProcessContents::Skip);
        assert!(any.in_end_state());
        assert_eq!(
            proceed_child(&mut any, &fx.schema, &QName::local("whatever")),
            Some(ContentLabel::Any(ProcessContents::Skip))
        );
        assert_eq!(label_name(&fx.schema, &ContentLabel::Element(fx.b)), "B");
        assert_eq!(label_name(&fx.schema, &ContentLabel::Element(fx.c)), "C");
    }
}
