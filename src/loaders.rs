//! Schema loading
//!
//! The validating reader fetches schemas named by `xsi:schemaLocation` and
//! `xsi:noNamespaceSchemaLocation` through a [`SchemaLoader`]. Compiled
//! schemas are persisted in their JSON form (see [`Schema::from_json`]).

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use crate::validators::Schema;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Source of schemas for location hints
pub trait SchemaLoader {
    /// Load the schema at a resolved location
    fn load(&self, location: &Location) -> Result<Schema>;
}

/// Loads compiled JSON schemas from the file system
#[derive(Debug, Default)]
pub struct FileSchemaLoader {
    /// Resource limits
    limits: Limits,
}

impl FileSchemaLoader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Read a resource as a string
    pub fn read(&self, location: &Location) -> Result<String> {
        let path = match location {
            Location::Path(path) => path.clone(),
            Location::Name(name) => PathBuf::from(name),
            Location::Url(url) => {
                return Err(Error::Resource(format!(
                    "Remote schema locations are not supported: {}",
                    url
                )))
            }
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
        })?;
        self.limits.check_xml_size(content.len())?;
        Ok(content)
    }
}

impl SchemaLoader for FileSchemaLoader {
    fn load(&self, location: &Location) -> Result<Schema> {
        let schema = Schema::from_json(&self.read(location)?)?;
        tracing::debug!(%location, "loaded schema");
        Ok(schema)
    }
}

/// Schemas registered in memory under their location string
#[derive(Debug, Default)]
pub struct MemorySchemaLoader {
    schemas: HashMap<String, Schema>,
}

impl MemorySchemaLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, keyed like [`Location::as_str`]
    pub fn insert(&mut self, location: impl Into<String>, schema: Schema) {
        self.schemas.insert(location.into(), schema);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with_schema(mut self, location: impl Into<String>, schema: Schema) -> Self {
        self.insert(location, schema);
        self
    }
}

impl SchemaLoader for MemorySchemaLoader {
    fn load(&self, location: &Location) -> Result<Schema> {
        self.schemas
            .get(&location.as_str())
            .cloned()
            .ok_or_else(|| Error::Resource(format!("No schema registered for '{}'", location)))
    }
}
