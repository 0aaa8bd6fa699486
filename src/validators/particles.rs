//! XSD Particle Schema Components
//!
//! This module implements the particle model for XSD content: terms (element
//! declarations, model groups and wildcards) wrapped with occurrence bounds.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#p

use crate::namespaces::QName;
use crate::validators::schemas::{ElementId, ModelGroupId, WildcardId};
use serde::{Deserialize, Serialize};

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// One or more (1, unbounded)
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Check if this particle can be empty (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if this particle is empty (maxOccurs == 0)
    pub fn is_empty(&self) -> bool {
        self.max == Some(0)
    }

    /// Check if minOccurs > maxOccurs
    pub fn is_inconsistent(&self) -> bool {
        matches!(self.max, Some(max) if self.min > max)
    }

    /// Check if occurrence count exceeds the maximum
    pub fn is_exceeded(&self, count: u32) -> bool {
        match self.max {
            Some(max) => count > max,
            None => false,
        }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

/// The term of a particle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Element declaration
    Element(ElementId),
    /// Nested model group
    ModelGroup(ModelGroupId),
    /// Element wildcard
    Wildcard(WildcardId),
}

/// A term with occurrence bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Particle {
    /// Occurrence bounds
    #[serde(default)]
    pub occurs: Occurs,
    /// Wrapped term
    pub term: Term,
}

impl Particle {
    /// Create a particle
    pub fn new(term: Term, occurs: Occurs) -> Self {
        Self { occurs, term }
    }

    /// Element particle occurring exactly once
    pub fn element(element: ElementId) -> Self {
        Self::new(Term::Element(element), Occurs::once())
    }

    /// Group particle occurring exactly once
    pub fn group(group: ModelGroupId) -> Self {
        Self::new(Term::ModelGroup(group), Occurs::once())
    }

    /// Wildcard particle occurring exactly once
    pub fn wildcard(wildcard: WildcardId) -> Self {
        Self::new(Term::Wildcard(wildcard), Occurs::once())
    }

    /// Set the occurrence bounds
    pub fn with_occurs(mut self, min: u32, max: Option<u32>) -> Self {
        self.occurs = Occurs::new(min, max);
        self
    }
}

/// Compositor of a model group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compositor {
    /// Particles in order
    Sequence,
    /// Exactly one of the particles
    Choice,
    /// Particles in any order, each at most once
    All,
}

impl Compositor {
    /// Parse from the XSD element name
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sequence" => Some(Self::Sequence),
            "choice" => Some(Self::Choice),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// A model group: compositor plus ordered particles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelGroup {
    /// Name of a global group definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<QName>,
    /// Compositor
    pub compositor: Compositor,
    /// Child particles
    pub particles: Vec<Particle>,
}

impl ModelGroup {
    /// Create an anonymous group
    pub fn new(compositor: Compositor, particles: Vec<Particle>) -> Self {
        Self {
            name: None,
            compositor,
            particles,
        }
    }

    /// Sequence group
    pub fn sequence(particles: Vec<Particle>) -> Self {
        Self::new(Compositor::Sequence, particles)
    }

    /// Choice group
    pub fn choice(particles: Vec<Particle>) -> Self {
        Self::new(Compositor::Choice, particles)
    }

    /// All group
    pub fn all(particles: Vec<Particle>) -> Self {
        Self::new(Compositor::All, particles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurs() {
        let once = Occurs::once();
        assert_eq!(once.min, 1);
        assert_eq!(once.max, Some(1));
        assert!(!once.is_emptiable());
        assert!(Occurs::optional().is_emptiable());
        assert!(Occurs::new(0, Some(0)).is_empty());
        assert!(Occurs::new(3, Some(2)).is_inconsistent());
        assert!(!Occurs::zero_or_more().is_exceeded(1000));
        assert!(once.is_exceeded(2));
    }

    #[test]
    fn test_particle_defaults_in_json() {
        let particle: Particle = serde_json::from_str(r#"{"term": {"Element": 3}}"#).unwrap();
        assert_eq!(particle.occurs, Occurs::once());
        assert_eq!(particle.term, Term::Element(ElementId(3)));
    }

    #[test]
    fn test_compositor_from_str() {
        assert_eq!(Compositor::from_str("choice"), Some(Compositor::Choice));
        assert_eq!(Compositor::from_str("group"), None);
    }
}
