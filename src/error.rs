//! Error types for xsdcheck
//!
//! This module defines the crate-level error, the validation error reported
//! for instance documents and the error produced by the type checker.

use std::fmt;
use thiserror::Error;

use crate::validators::facets::FacetKind;

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xsdcheck operations
#[derive(Error, Debug)]
pub enum Error {
    /// Instance validation error
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Error while reading a path expression or another textual input
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Type checking error outside of an instance validation run
    #[error("type error: {0}")]
    Type(#[from] TypeCheckError),

    /// Inconsistent or unsupported schema component
    #[error("schema error: {0}")]
    Schema(String),

    /// Value error (invalid value for a type)
    #[error("value error: {0}")]
    Value(String),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Namespace error
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Compiled schema (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Position of a node in its source document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// Document URI, if known
    pub uri: Option<String>,
    /// Line number (1-based)
    pub line: u64,
    /// Column number (1-based)
    pub column: u64,
}

impl SourceLocation {
    /// Create a location without a document URI
    pub fn new(line: u64, column: u64) -> Self {
        Self {
            uri: None,
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.uri {
            Some(uri) => write!(f, "{}:{}:{}", uri, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Category of an instance validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// Unknown element or type, missing schema, failed schema location hint
    SchemaResolution,
    /// Unexpected child element or text, incomplete content
    ContentModel,
    /// Missing, unknown or duplicated attribute
    Attribute,
    /// Simple content or attribute value rejected by the type checker
    Value,
    /// Unique, key or keyref violation
    IdentityConstraint,
    /// Duplicate ID or dangling IDREF
    IdReference,
}

impl ValidationErrorKind {
    /// Whether errors of this kind stop the validation run
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ValidationErrorKind::IdentityConstraint | ValidationErrorKind::IdReference
        )
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationErrorKind::SchemaResolution => "schema resolution",
            ValidationErrorKind::ContentModel => "content model",
            ValidationErrorKind::Attribute => "attribute",
            ValidationErrorKind::Value => "value",
            ValidationErrorKind::IdentityConstraint => "identity constraint",
            ValidationErrorKind::IdReference => "ID/IDREF",
        };
        f.write_str(s)
    }
}

/// Instance validation error with context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Error category
    pub kind: ValidationErrorKind,
    /// Error message
    pub message: String,
    /// Location of the offending node
    pub location: Option<SourceLocation>,
    /// Path to the element that failed validation
    pub path: Option<String>,
    /// Underlying reason, usually a type checker message
    pub reason: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            path: None,
            reason: None,
        }
    }

    /// Set the source location
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the path where validation failed
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref location) = self.location {
            write!(f, "{}: ", location)?;
        }
        write!(f, "{}", self.message)?;

        if let Some(ref reason) = self.reason {
            write!(f, "\n\nReason: {}", reason)?;
        }

        if let Some(ref path) = self.path {
            write!(f, "\n\nPath: {}", path)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Error reading textual input such as a path expression
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Offending source text
    pub source: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref src) = self.source {
            write!(f, " in '{}'", src)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Failure of a lexical value against a simple type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeCheckError {
    /// The lexical form cannot be converted to the target type
    #[error("'{value}' is not valid according to {type_name}: {reason}")]
    Lexical {
        /// Offending text
        value: String,
        /// Name of the conversion type
        type_name: String,
        /// What is wrong with the text
        reason: String,
    },

    /// A constraining facet rejected the value
    #[error("{family} content '{value}' does not match the {facet} facet.")]
    Facet {
        /// Value family, e.g. "Signed integer"
        family: &'static str,
        /// Facet that failed
        facet: FacetKind,
        /// Offending text
        value: String,
    },

    /// The prefix of a QName value has no in-scope binding
    #[error("Prefix '{prefix}' of QName '{value}' is not bound to a namespace.")]
    UnboundPrefix {
        /// Unbound prefix
        prefix: String,
        /// Offending text
        value: String,
    },

    /// No member type of a union accepted the value
    #[error("'{value}' does not match any member type of union {type_name}.")]
    NoMatchingMember {
        /// Offending text
        value: String,
        /// Name of the union type
        type_name: String,
    },

    /// A facet value of the schema cannot be read for the type it constrains
    #[error("invalid {facet} facet value '{value}': {reason}")]
    InvalidFacet {
        /// Facet carrying the bad value
        facet: FacetKind,
        /// Facet value text
        value: String,
        /// Why the value cannot be used
        reason: String,
    },

    /// The type reference does not denote a simple type
    #[error("{0} is not a simple type")]
    NotSimple(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new(ValidationErrorKind::ContentModel, "Element 'foo' is not valid")
            .with_reason("Required element 'bar' is missing")
            .with_path("/root/foo")
            .with_location(SourceLocation::new(3, 7));

        let msg = format!("{}", err);
        assert!(msg.starts_with("3:7: Element 'foo' is not valid"));
        assert!(msg.contains("Reason:"));
        assert!(msg.contains("Path:"));
    }

    #[test]
    fn test_source_location_with_uri() {
        let mut loc = SourceLocation::new(1, 2);
        loc.uri = Some("file:///doc.xml".to_string());
        assert_eq!(loc.to_string(), "file:///doc.xml:1:2");
    }

    #[test]
    fn test_error_kind_fatality() {
        assert!(ValidationErrorKind::ContentModel.is_fatal());
        assert!(ValidationErrorKind::Value.is_fatal());
        assert!(!ValidationErrorKind::IdReference.is_fatal());
        assert!(!ValidationErrorKind::IdentityConstraint.is_fatal());
    }

    #[test]
    fn test_type_check_error_message() {
        let err = TypeCheckError::Facet {
            family: "Signed integer",
            facet: FacetKind::MaxInclusive,
            value: "11".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Signed integer content '11' does not match the maxInclusive facet."
        );
    }

    #[test]
    fn test_error_conversion() {
        let val_err = ValidationError::new(ValidationErrorKind::Attribute, "test");
        let err: Error = val_err.into();
        assert!(matches!(err, Error::Validation(_)));
    }
}
