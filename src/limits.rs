//! Limits and constraints for validation runs
//!
//! This module defines limits that keep a validation run bounded: document
//! size and depth, attribute counts, dynamic schema loading and the size of
//! the content-model automata built from particles.

use crate::error::{Error, Result};

/// Global limits configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum element nesting depth
    pub max_xml_depth: usize,

    /// Maximum XML document size in bytes
    pub max_xml_size: usize,

    /// Maximum number of attributes per element
    pub max_attributes: usize,

    /// Maximum number of schemas loaded through location hints in one run
    pub max_schema_loads: usize,

    /// Maximum finite maxOccurs value expanded into automaton states
    pub max_occurs_expansion: u32,

    /// Maximum number of particles in an `all` model group
    pub max_all_particles: usize,

    /// Maximum number of NFA states for a single content model
    pub max_automaton_states: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_xml_size: 100 * 1024 * 1024, // 100 MB
            max_attributes: 1000,
            max_schema_loads: 100,
            max_occurs_expansion: 5000,
            max_all_particles: 16,
            max_automaton_states: 200_000,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_attributes: 100,
            max_schema_loads: 10,
            max_occurs_expansion: 500,
            max_all_particles: 10,
            max_automaton_states: 20_000,
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 10000,
            max_xml_size: 1024 * 1024 * 1024, // 1 GB
            max_attributes: 10000,
            max_schema_loads: 1000,
            max_occurs_expansion: 100_000,
            max_all_particles: 20,
            max_automaton_states: 2_000_000,
        }
    }

    /// Check if XML depth is within limits
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_xml_depth {
            Err(Error::LimitExceeded(format!(
                "XML depth {} exceeds maximum {}",
                depth, self.max_xml_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if XML size is within limits
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        if size > self.max_xml_size {
            Err(Error::LimitExceeded(format!(
                "XML size {} bytes exceeds maximum {} bytes",
                size, self.max_xml_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if number of attributes is within limits
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        if count > self.max_attributes {
            Err(Error::LimitExceeded(format!(
                "Attribute count {} exceeds maximum {}",
                count, self.max_attributes
            )))
        } else {
            Ok(())
        }
    }

    /// Check if the number of dynamically loaded schemas is within limits
    pub fn check_schema_loads(&self, count: usize) -> Result<()> {
        if count > self.max_schema_loads {
            Err(Error::LimitExceeded(format!(
                "Schema loads {} exceeds maximum {}",
                count, self.max_schema_loads
            )))
        } else {
            Ok(())
        }
    }

    /// Check if a finite maxOccurs can be expanded into automaton states
    pub fn check_occurs_expansion(&self, max_occurs: u32) -> Result<()> {
        if max_occurs > self.max_occurs_expansion {
            Err(Error::LimitExceeded(format!(
                "maxOccurs {} exceeds maximum expansion {}",
                max_occurs, self.max_occurs_expansion
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an `all` group is small enough to be expanded
    pub fn check_all_particles(&self, count: usize) -> Result<()> {
        if count > self.max_all_particles {
            Err(Error::LimitExceeded(format!(
                "All group with {} particles exceeds maximum {}",
                count, self.max_all_particles
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an automaton under construction is within limits
    pub fn check_automaton_states(&self, count: usize) -> Result<()> {
        if count > self.max_automaton_states {
            Err(Error::LimitExceeded(format!(
                "Content model needs {} states, maximum is {}",
                count, self.max_automaton_states
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_xml_depth, 1000);
        assert!(limits.check_xml_depth(500).is_ok());
        assert!(limits.check_xml_depth(1500).is_err());
    }

    #[test]
    fn test_strict_limits() {
        let limits = Limits::strict();
        assert!(limits.max_xml_depth < Limits::default().max_xml_depth);
        assert!(limits.check_occurs_expansion(1000).is_err());
    }

    #[test]
    fn test_permissive_limits() {
        let limits = Limits::permissive();
        assert!(limits.max_xml_depth > Limits::default().max_xml_depth);
        assert!(limits.check_xml_depth(5000).is_ok());
    }

    #[test]
    fn test_check_xml_size() {
        let limits = Limits::default();
        assert!(limits.check_xml_size(1024).is_ok());
        assert!(limits.check_xml_size(200 * 1024 * 1024).is_err());
    }

    #[test]
    fn test_check_all_particles() {
        let limits = Limits::default();
        assert!(limits.check_all_particles(4).is_ok());
        assert!(matches!(
            limits.check_all_particles(40),
            Err(Error::LimitExceeded(_))
        ));
    }
}
