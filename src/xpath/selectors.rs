//! XPath Selectors for XML Schema
//!
//! Parser for the restricted path language of identity constraints
//! (xs:selector, xs:field):
//!
//! ```text
//! Path      ::= ('.//')? Step ('/' Step)*
//! Selector  ::= Path ('|' Path)*
//! Step      ::= '.' | ('child::')? NameTest
//! FieldStep ::= Step | ('@' | 'attribute::') NameTest   (last step only)
//! NameTest  ::= QName | '*' | NCName ':' '*'
//! ```

use crate::error::ParseError;
use crate::namespaces::{NamespaceContext, QName};
use crate::validators::helpers::is_ncname;

/// Axis of a path step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStepKind {
    /// The context node itself (`.`)
    SelfNode,
    /// Child elements
    Child,
    /// Attributes of the context element
    Attribute,
}

/// Name test of a path step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*`, holding the resolved namespace
    AnyInNamespace(String),
    /// A resolved qualified name
    Name(QName),
}

impl NameTest {
    /// Whether a node name passes the test
    pub fn matches(&self, name: &QName) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::AnyInNamespace(ns) => name.namespace_str() == ns,
            NameTest::Name(expected) => expected == name,
        }
    }
}

/// A single step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    /// Axis
    pub kind: PathStepKind,
    /// Name test, None for `.`
    pub test: Option<NameTest>,
}

/// One alternative of a selector or field expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPath {
    /// Whether the path starts with `.//`
    pub descendant: bool,
    /// Steps after the optional `.//`
    pub steps: Vec<PathStep>,
}

/// A parsed selector or field expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSelector {
    /// The expression as written
    pub xpath: String,
    /// Alternatives separated by `|`
    pub paths: Vec<IdentityPath>,
}

impl ElementSelector {
    /// Parse an expression
    ///
    /// Prefixed names resolve against `namespaces`; unprefixed element names
    /// take its default namespace, unprefixed attribute names have none.
    /// Attribute steps are accepted only when `allow_attribute` is set.
    pub fn parse(
        xpath: &str,
        namespaces: &NamespaceContext,
        allow_attribute: bool,
    ) -> Result<Self, ParseError> {
        let error = |message: &str| ParseError::new(message).with_source(xpath);
        let mut paths = Vec::new();

        for alternative in xpath.split('|') {
            let mut rest = alternative.trim();
            if rest.is_empty() {
                return Err(error("empty path"));
            }
            let descendant = match rest.strip_prefix(".//") {
                Some(after) => {
                    rest = after;
                    true
                }
                None => false,
            };

            let parts = split_path(rest);
            let mut steps = Vec::with_capacity(parts.len());
            for (i, part) in parts.iter().enumerate() {
                let step = parse_step(part, namespaces).map_err(|m| error(&m))?;
                if step.kind == PathStepKind::Attribute
                    && (!allow_attribute || i + 1 != parts.len())
                {
                    return Err(error("attribute step is only allowed at the end of a field"));
                }
                steps.push(step);
            }
            paths.push(IdentityPath { descendant, steps });
        }

        Ok(Self {
            xpath: xpath.to_string(),
            paths,
        })
    }

    /// Get the XPath expression
    pub fn xpath(&self) -> &str {
        &self.xpath
    }
}

/// Split a path on `/`, trimming every step
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').map(str::trim).collect()
}

fn parse_step(step: &str, namespaces: &NamespaceContext) -> Result<PathStep, String> {
    if step == "." {
        return Ok(PathStep {
            kind: PathStepKind::SelfNode,
            test: None,
        });
    }
    let (kind, rest) = if let Some(rest) = step.strip_prefix('@') {
        (PathStepKind::Attribute, rest)
    } else if let Some(rest) = step.strip_prefix("attribute::") {
        (PathStepKind::Attribute, rest)
    } else if let Some(rest) = step.strip_prefix("child::") {
        (PathStepKind::Child, rest)
    } else {
        (PathStepKind::Child, step)
    };
    let rest = rest.trim();

    let test = if rest == "*" {
        NameTest::Any
    } else {
        match rest.split_once(':') {
            Some((prefix, "*")) => {
                let ns = namespaces
                    .get_namespace(prefix)
                    .ok_or_else(|| format!("prefix '{}' is not bound", prefix))?;
                NameTest::AnyInNamespace(ns.to_string())
            }
            Some((prefix, local)) => {
                if !is_ncname(prefix) || !is_ncname(local) {
                    return Err(format!("'{}' is not a valid name test", rest));
                }
                let ns = namespaces
                    .get_namespace(prefix)
                    .ok_or_else(|| format!("prefix '{}' is not bound", prefix))?;
                NameTest::Name(QName::namespaced(ns, local))
            }
            None => {
                if !is_ncname(rest) {
                    return Err(format!("'{}' is not a valid step", step));
                }
                let ns = match kind {
                    PathStepKind::Attribute => None,
                    _ => namespaces.get_default_namespace(),
                };
                NameTest::Name(QName::new(ns, rest))
            }
        }
    };

    Ok(PathStep {
        kind,
        test: Some(test),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xpath: &str, fields: bool) -> Result<ElementSelector, ParseError> {
        let mut ns = NamespaceContext::new();
        ns.add_prefix("p", "urn:p");
        ElementSelector::parse(xpath, &ns, fields)
    }

    #[test]
    fn test_parse_selector() {
        let selector = parse(".//p:item | child::entry/*", false).unwrap();
        assert_eq!(selector.paths.len(), 2);
        assert!(selector.paths[0].descendant);
        assert_eq!(
            selector.paths[0].steps[0].test,
            Some(NameTest::Name(QName::namespaced("urn:p", "item")))
        );
        assert_eq!(selector.paths[1].steps.len(), 2);
        assert_eq!(selector.paths[1].steps[1].test, Some(NameTest::Any));
    }

    #[test]
    fn test_parse_field() {
        let field = parse("p:*/@id", true).unwrap();
        let steps = &field.paths[0].steps;
        assert_eq!(steps[0].test, Some(NameTest::AnyInNamespace("urn:p".into())));
        assert_eq!(steps[1].kind, PathStepKind::Attribute);
        assert_eq!(steps[1].test, Some(NameTest::Name(QName::local("id"))));

        let field = parse(".", true).unwrap();
        assert_eq!(field.paths[0].steps[0].kind, PathStepKind::SelfNode);
    }

    #[test]
    fn test_rejected_expressions() {
        assert!(parse("@id", false).is_err());
        assert!(parse("@id/x", true).is_err());
        assert!(parse("q:item", false).is_err());
        assert!(parse("a[1]", false).is_err());
        assert!(parse("a||b", false).is_err());
        assert!(parse("../a", false).is_err());
    }
}
