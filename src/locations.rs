//! Resource location resolution
//!
//! Schema location hints found in instance documents are resolved against
//! the document's base URI before a [`SchemaLoader`](crate::loaders::SchemaLoader)
//! fetches them.

use crate::error::Result;
use std::path::PathBuf;
use url::Url;

/// Resolved location of a schema resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// Non-file URL (http, https, urn, ...)
    Url(Url),
    /// Name of an in-memory resource
    Name(String),
}

impl Location {
    /// Resolve a location hint, relative hints against `base`
    ///
    /// `file:` URLs become paths. Without a base, a hint that is neither a
    /// URL nor path-like is kept as a resource name.
    pub fn resolve(hint: &str, base: Option<&Url>) -> Result<Self> {
        let hint = hint.trim();
        if let Ok(url) = Url::parse(hint) {
            return Ok(Self::from_url(url));
        }
        if let Some(base) = base {
            return Ok(Self::from_url(base.join(hint)?));
        }

        let path = PathBuf::from(hint);
        if path.exists() || hint.starts_with('/') || hint.starts_with('.') {
            return Ok(Location::Path(path));
        }
        Ok(Location::Name(hint.to_string()))
    }

    fn from_url(url: Url) -> Self {
        if url.scheme() == "file" {
            if let Ok(path) = url.to_file_path() {
                return Location::Path(path);
            }
        }
        Location::Url(url)
    }

    /// Get the location as a string
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
            Location::Name(s) => s.clone(),
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url() {
        let loc = Location::resolve("http://example.com/schema.json", None).unwrap();
        assert!(matches!(loc, Location::Url(_)));
        assert!(loc.is_remote());
    }

    #[test]
    fn test_relative_to_base() {
        let base = Url::parse("file:///data/docs/instance.xml").unwrap();
        let loc = Location::resolve("../schemas/a.json", Some(&base)).unwrap();
        assert_eq!(loc, Location::Path(PathBuf::from("/data/schemas/a.json")));

        let base = Url::parse("http://example.com/docs/instance.xml").unwrap();
        let loc = Location::resolve("a.json", Some(&base)).unwrap();
        assert_eq!(loc.as_str(), "http://example.com/docs/a.json");
    }

    #[test]
    fn test_without_base() {
        let loc = Location::resolve("/tmp/schema.json", None).unwrap();
        assert!(matches!(loc, Location::Path(_)));
        let loc = Location::resolve("memory-schema", None).unwrap();
        assert_eq!(loc, Location::Name("memory-schema".to_string()));
    }
}
