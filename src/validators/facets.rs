//! XSD constraining facets
//!
//! Facets are stored as declared in the schema (kind plus lexical value) and
//! read against the value space of the type they constrain when a value is
//! checked. [`FacetSet`] is the merged view of a type's facets along its base
//! chain.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhiteSpace {
    /// Preserve all white space
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse from string value
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "preserve" => Ok(WhiteSpace::Preserve),
            "replace" => Ok(WhiteSpace::Replace),
            "collapse" => Ok(WhiteSpace::Collapse),
            _ => Err(Error::Value(format!(
                "Invalid whiteSpace value: '{}'. Must be 'preserve', 'replace', or 'collapse'",
                s
            ))),
        }
    }

    /// Facet value of this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            WhiteSpace::Preserve => "preserve",
            WhiteSpace::Replace => "replace",
            WhiteSpace::Collapse => "collapse",
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => {
                let mut result = String::with_capacity(s.len());
                for word in s.split([' ', '\t', '\n', '\r']).filter(|w| !w.is_empty()) {
                    if !result.is_empty() {
                        result.push(' ');
                    }
                    result.push_str(word);
                }
                result
            }
        }
    }
}

/// Kind of a constraining facet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FacetKind {
    /// Exact length
    Length,
    /// Minimum length
    MinLength,
    /// Maximum length
    MaxLength,
    /// Regular expressions, any of which must match
    Pattern,
    /// Allowed values
    Enumeration,
    /// Inclusive lower bound
    MinInclusive,
    /// Inclusive upper bound
    MaxInclusive,
    /// Exclusive lower bound
    MinExclusive,
    /// Exclusive upper bound
    MaxExclusive,
    /// Maximum number of significant digits
    TotalDigits,
    /// Maximum number of fraction digits
    FractionDigits,
    /// White space normalization
    WhiteSpace,
    /// XSD 1.1 assertion
    Assertion,
}

impl FacetKind {
    /// Facet element name in XSD
    pub fn name(&self) -> &'static str {
        match self {
            FacetKind::Length => "length",
            FacetKind::MinLength => "minLength",
            FacetKind::MaxLength => "maxLength",
            FacetKind::Pattern => "pattern",
            FacetKind::Enumeration => "enumeration",
            FacetKind::MinInclusive => "minInclusive",
            FacetKind::MaxInclusive => "maxInclusive",
            FacetKind::MinExclusive => "minExclusive",
            FacetKind::MaxExclusive => "maxExclusive",
            FacetKind::TotalDigits => "totalDigits",
            FacetKind::FractionDigits => "fractionDigits",
            FacetKind::WhiteSpace => "whiteSpace",
            FacetKind::Assertion => "assertion",
        }
    }

    /// Whether the facet carries a list of values
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            FacetKind::Pattern | FacetKind::Enumeration | FacetKind::Assertion
        )
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lexical value(s) of a facet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FacetValue {
    /// Single value
    Single(String),
    /// Value list of a multi-valued facet
    Multiple(Vec<String>),
}

impl FacetValue {
    /// The single value, or the first of a list
    pub fn as_single(&self) -> Option<&str> {
        match self {
            FacetValue::Single(v) => Some(v),
            FacetValue::Multiple(values) => values.first().map(|v| v.as_str()),
        }
    }

    /// All values
    pub fn values(&self) -> &[String] {
        match self {
            FacetValue::Single(v) => std::slice::from_ref(v),
            FacetValue::Multiple(values) => values,
        }
    }
}

/// A constraining facet as declared on a simple type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facet {
    /// Facet kind
    pub kind: FacetKind,
    /// Facet value(s)
    pub value: FacetValue,
    /// Whether derived types may not change the value
    #[serde(default)]
    pub fixed: bool,
    #[serde(skip)]
    compiled: OnceCell<Vec<Regex>>,
}

impl PartialEq for Facet {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.value == other.value && self.fixed == other.fixed
    }
}

impl Facet {
    /// Create a single-valued facet
    pub fn new(kind: FacetKind, value: impl Into<String>) -> Self {
        let value = value.into();
        let value = if kind.is_multi_valued() {
            FacetValue::Multiple(vec![value])
        } else {
            FacetValue::Single(value)
        };
        Self {
            kind,
            value,
            fixed: false,
            compiled: OnceCell::new(),
        }
    }

    /// Create a multi-valued facet (Pattern, Enumeration, Assertion)
    pub fn multiple<I, S>(kind: FacetKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            value: FacetValue::Multiple(values.into_iter().map(Into::into).collect()),
            fixed: false,
            compiled: OnceCell::new(),
        }
    }

    /// Shorthand for a pattern facet with one expression
    pub fn pattern(expression: impl Into<String>) -> Self {
        Self::multiple(FacetKind::Pattern, [expression.into()])
    }

    /// Shorthand for an enumeration facet
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::multiple(FacetKind::Enumeration, values)
    }

    /// Shorthand for a whiteSpace facet
    pub fn white_space(mode: WhiteSpace) -> Self {
        Self::new(FacetKind::WhiteSpace, mode.as_str())
    }

    /// Mark the facet as fixed
    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    /// Single value of the facet
    pub fn single_value(&self) -> Option<&str> {
        self.value.as_single()
    }

    /// All values of the facet
    pub fn values(&self) -> &[String] {
        self.value.values()
    }

    /// Compiled regular expressions of a Pattern facet
    pub fn regexes(&self) -> Result<&[Regex]> {
        self.compiled
            .get_or_try_init(|| {
                self.values()
                    .iter()
                    .map(|p| compile_pattern(p))
                    .collect::<Result<Vec<_>>>()
            })
            .map(|v| v.as_slice())
    }

    /// Whether the text fully matches any of the patterns
    pub fn matches_pattern(&self, text: &str) -> Result<bool> {
        Ok(self.regexes()?.iter().any(|re| re.is_match(text)))
    }

    /// Numeric value of a length or digits facet
    pub fn usize_value(&self) -> Result<usize> {
        let value = self.single_value().unwrap_or_default();
        value.trim().parse::<usize>().map_err(|_| {
            Error::Value(format!("{} facet value '{}' is not a non-negative integer", self.kind, value))
        })
    }
}

/// Merged facets of a type, at most one facet per kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetSet {
    facets: IndexMap<FacetKind, Facet>,
}

impl FacetSet {
    /// Create an empty facet set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a facet, replacing any facet of the same kind
    pub fn insert(&mut self, facet: Facet) {
        self.facets.insert(facet.kind, facet);
    }

    /// Overlay facets declared at a more derived level
    pub fn overlay<'a>(&mut self, own: impl IntoIterator<Item = &'a Facet>) {
        for facet in own {
            self.insert(facet.clone());
        }
    }

    /// Get the facet of a kind
    pub fn get(&self, kind: FacetKind) -> Option<&Facet> {
        self.facets.get(&kind)
    }

    /// Whether a facet of the kind is present
    pub fn contains(&self, kind: FacetKind) -> bool {
        self.facets.contains_key(&kind)
    }

    /// Iterate over the facets
    pub fn iter(&self) -> impl Iterator<Item = &Facet> {
        self.facets.values()
    }

    /// Number of facets
    pub fn len(&self) -> usize {
        self.facets.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// Effective white space mode, Preserve when not constrained
    pub fn white_space(&self) -> WhiteSpace {
        self.get(FacetKind::WhiteSpace)
            .and_then(|f| f.single_value())
            .and_then(|v| WhiteSpace::from_str(v).ok())
            .unwrap_or(WhiteSpace::Preserve)
    }
}

/// Apply the WhiteSpace facet of a merged facet set
pub fn normalized_value(raw: &str, facets: &FacetSet) -> String {
    facets.white_space().normalize(raw)
}

// =============================================================================
// XSD Regular Expressions
// =============================================================================

const NAME_START_CLASS: &str = r"_:A-Za-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}\u{200C}-\u{200D}\u{2070}-\u{218F}\u{2C00}-\u{2FEF}\u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}";
const NAME_EXTRA_CLASS: &str = r"\-.0-9\u{B7}\u{300}-\u{36F}\u{203F}-\u{2040}";

/// Translate an XSD regular expression into an anchored Rust regex
///
/// XSD expressions are implicitly anchored, `^` and `$` are ordinary
/// characters, and `\i`, `\c` (with their negations) name XML name classes.
pub fn translate_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("^(?:");
    let mut chars = pattern.chars().peekable();
    let mut class_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let Some(next) = chars.next() else {
                    out.push_str(r"\\");
                    break;
                };
                match next {
                    'i' if class_depth > 0 => out.push_str(NAME_START_CLASS),
                    'c' if class_depth > 0 => {
                        out.push_str(NAME_START_CLASS);
                        out.push_str(NAME_EXTRA_CLASS);
                    }
                    'i' => out.push_str(&format!("[{}]", NAME_START_CLASS)),
                    'I' => out.push_str(&format!("[^{}]", NAME_START_CLASS)),
                    'c' => out.push_str(&format!("[{}{}]", NAME_START_CLASS, NAME_EXTRA_CLASS)),
                    'C' => out.push_str(&format!("[^{}{}]", NAME_START_CLASS, NAME_EXTRA_CLASS)),
                    _ => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            '[' => {
                // Nested classes only occur in subtractions, e.g. [a-z-[aeiou]]
                out.push('[');
                class_depth += 1;
                if chars.peek() == Some(&'^') {
                    out.push('^');
                    chars.next();
                }
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(']');
            }
            '-' if class_depth > 0 && chars.peek() == Some(&'[') => {
                // Character class subtraction maps to Rust's `--`
                out.push_str("--");
            }
            '^' | '$' if class_depth == 0 => {
                out.push('\\');
                out.push(c);
            }
            '&' | '~' if class_depth > 0 => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out.push_str(")$");
    out
}

/// Compile an XSD regular expression
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(&translate_pattern(pattern))
        .map_err(|e| Error::Value(format!("Invalid pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_modes() {
        assert_eq!(WhiteSpace::from_str("preserve").unwrap(), WhiteSpace::Preserve);
        assert_eq!(WhiteSpace::from_str("replace").unwrap(), WhiteSpace::Replace);
        assert_eq!(WhiteSpace::from_str("collapse").unwrap(), WhiteSpace::Collapse);
        assert!(WhiteSpace::from_str("invalid").is_err());
    }

    #[test]
    fn test_whitespace_normalize() {
        let text = "  hello\t\nworld  ";

        assert_eq!(WhiteSpace::Preserve.normalize(text), text);
        assert_eq!(WhiteSpace::Replace.normalize(text), "  hello  world  ");
        assert_eq!(WhiteSpace::Collapse.normalize(text), "hello world");
        assert_eq!(WhiteSpace::Collapse.normalize(" \t "), "");
    }

    #[test]
    fn test_facet_set_override() {
        let mut set = FacetSet::new();
        set.insert(Facet::new(FacetKind::MaxLength, "10"));
        set.insert(Facet::enumeration(["a", "b"]));
        set.overlay(&[Facet::new(FacetKind::MaxLength, "5"), Facet::enumeration(["c"])]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(FacetKind::MaxLength).unwrap().usize_value().unwrap(), 5);
        assert_eq!(set.get(FacetKind::Enumeration).unwrap().values(), &["c".to_string()]);
    }

    #[test]
    fn test_normalized_value_uses_white_space_facet() {
        let mut set = FacetSet::new();
        assert_eq!(normalized_value(" a  b ", &set), " a  b ");
        set.insert(Facet::white_space(WhiteSpace::Collapse));
        assert_eq!(normalized_value(" a  b ", &set), "a b");
    }

    #[test]
    fn test_pattern_is_anchored() {
        let facet = Facet::pattern(r"\d{3}-\d{4}");

        assert!(facet.matches_pattern("123-4567").unwrap());
        assert!(!facet.matches_pattern("x123-4567").unwrap());
        assert!(!facet.matches_pattern("123-45678").unwrap());
    }

    #[test]
    fn test_pattern_alternatives_any_of() {
        let facet = Facet::multiple(FacetKind::Pattern, ["a+", "b+"]);
        assert!(facet.matches_pattern("aaa").unwrap());
        assert!(facet.matches_pattern("bb").unwrap());
        assert!(!facet.matches_pattern("ab").unwrap());
    }

    #[test]
    fn test_pattern_literal_anchors_and_name_classes() {
        assert!(compile_pattern("a$b").unwrap().is_match("a$b"));
        assert!(compile_pattern("^x").unwrap().is_match("^x"));
        let name = compile_pattern(r"\i\c*").unwrap();
        assert!(name.is_match("_abc-1.x"));
        assert!(!name.is_match("1abc"));
        let subtraction = compile_pattern("[a-z-[aeiou]]+").unwrap();
        assert!(subtraction.is_match("bcd"));
        assert!(!subtraction.is_match("bad"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(compile_pattern("(a").is_err());
        assert!(Facet::pattern("(a").matches_pattern("a").is_err());
    }

    #[test]
    fn test_facet_value_serde_shape() {
        let facet = Facet::new(FacetKind::MaxLength, "3");
        let json = serde_json::to_value(&facet).unwrap();
        assert_eq!(json["kind"], "MaxLength");
        assert_eq!(json["value"], "3");
        let back: Facet = serde_json::from_value(json).unwrap();
        assert_eq!(back, facet);
    }
}
