//! # xsdcheck
//!
//! Schema-driven validation of XML instance documents.
//!
//! A compiled [`Schema`] holds element, attribute and type declarations in
//! an arena. Content models are turned into deterministic automata, simple
//! values are checked against the XSD datatypes and their facets, and the
//! [`ValidatingReader`] walks an instance document reporting the first
//! structural error together with every identity constraint and ID/IDREF
//! violation.
//!
//! ## Features
//!
//! - Content model automata with NFA to DFA conversion
//! - The XSD built-in datatypes and constraining facets
//! - Unique, key and keyref identity constraints, ID/IDREF bookkeeping
//! - `xsi:type`, `xsi:nil` and schema location hints merged at run time
//! - Resource limits against hostile documents
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use xsdcheck::documents::Document;
//! use xsdcheck::validators::{BuiltinType, ElementDecl, SchemaBuilder};
//!
//! let mut builder = SchemaBuilder::new(None);
//! builder.add_global_element(ElementDecl::new(builder.qname("count"), BuiltinType::Int.into()));
//! let schema = Arc::new(builder.build()?);
//!
//! let document = Document::from_string("<count>12</count>")?;
//! let report = xsdcheck::validate(schema, &document)?;
//! assert!(report.is_valid());
//! # Ok::<(), xsdcheck::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and resources
pub mod namespaces;
pub mod locations;
pub mod loaders;
pub mod documents;

// Schema components and validation
pub mod validators;

// Identity constraint paths
pub mod xpath;

// Re-exports for convenience
pub use error::{Error, Result, ValidationError, ValidationErrorKind};
pub use validators::{validate, Schema, SchemaBuilder, TypeRef, ValidatingReader, ValidationReport, ValidatorOptions};

/// Version of the xsdcheck library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
