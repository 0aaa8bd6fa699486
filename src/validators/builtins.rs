//! XSD built-in types
//!
//! This module defines the built-in primitive and derived simple types of XML
//! Schema and the typed values produced when a lexical form is converted to
//! one of them. These types form the foundation of value validation.

use crate::error::TypeCheckError;
use crate::namespaces::{NamespaceContext, QName, XSD_NAMESPACE};
use crate::validators::facets::WhiteSpace;
use crate::validators::helpers::{
    self, base64_binary_to_rust, boolean_to_rust, date_time_to_rust, decimal_to_rust,
    duration_to_rust, float_to_rust, hex_binary_to_rust, integer_to_rust, DateTimeKind,
    DurationValue,
};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// =============================================================================
// Built-in Type Hierarchy
// =============================================================================

/// Built-in simple types of XSD 1.0 (plus the 1.1 anyAtomicType and durations)
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuiltinType {
    AnySimpleType,
    AnyAtomicType,
    // string family
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NCName,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    AnyUri,
    // numeric
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    PositiveInteger,
    Float,
    Double,
    // date/time
    Duration,
    DayTimeDuration,
    YearMonthDuration,
    DateTime,
    Time,
    Date,
    GYearMonth,
    GYear,
    GMonthDay,
    GDay,
    GMonth,
    // binary and names
    HexBinary,
    Base64Binary,
    QName,
    Notation,
}

/// Value family of a built-in type, selects how facets are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFamily {
    /// anySimpleType / anyAtomicType, no conversion
    Any,
    /// string and its derivations, anyURI
    String,
    /// integer types stored in an i64
    SignedInteger,
    /// integer types stored in a u64
    UnsignedInteger,
    /// xs:decimal
    Decimal,
    /// xs:float
    Float,
    /// xs:double
    Double,
    /// date/time family
    DateTime,
    /// xs:duration and its derivations
    Duration,
    /// xs:boolean
    Boolean,
    /// hexBinary, base64Binary
    Binary,
    /// xs:QName
    QName,
    /// xs:NOTATION
    Notation,
}

impl ValueFamily {
    /// Label used in facet error messages
    pub fn label(&self) -> &'static str {
        match self {
            ValueFamily::Any | ValueFamily::String => "String",
            ValueFamily::SignedInteger => "Signed integer",
            ValueFamily::UnsignedInteger => "Unsigned integer",
            ValueFamily::Decimal => "Decimal",
            ValueFamily::Float => "Float",
            ValueFamily::Double => "Double",
            ValueFamily::DateTime => "Date time",
            ValueFamily::Duration => "Duration",
            ValueFamily::Boolean => "Boolean",
            ValueFamily::Binary => "Binary",
            ValueFamily::QName => "QName",
            ValueFamily::Notation => "Notation",
        }
    }
}

const ALL_BUILTINS: &[BuiltinType] = &[
    BuiltinType::AnySimpleType,
    BuiltinType::AnyAtomicType,
    BuiltinType::String,
    BuiltinType::NormalizedString,
    BuiltinType::Token,
    BuiltinType::Language,
    BuiltinType::Name,
    BuiltinType::NCName,
    BuiltinType::Id,
    BuiltinType::IdRef,
    BuiltinType::IdRefs,
    BuiltinType::Entity,
    BuiltinType::Entities,
    BuiltinType::NmToken,
    BuiltinType::NmTokens,
    BuiltinType::AnyUri,
    BuiltinType::Boolean,
    BuiltinType::Decimal,
    BuiltinType::Integer,
    BuiltinType::NonPositiveInteger,
    BuiltinType::NegativeInteger,
    BuiltinType::Long,
    BuiltinType::Int,
    BuiltinType::Short,
    BuiltinType::Byte,
    BuiltinType::NonNegativeInteger,
    BuiltinType::UnsignedLong,
    BuiltinType::UnsignedInt,
    BuiltinType::UnsignedShort,
    BuiltinType::UnsignedByte,
    BuiltinType::PositiveInteger,
    BuiltinType::Float,
    BuiltinType::Double,
    BuiltinType::Duration,
    BuiltinType::DayTimeDuration,
    BuiltinType::YearMonthDuration,
    BuiltinType::DateTime,
    BuiltinType::Time,
    BuiltinType::Date,
    BuiltinType::GYearMonth,
    BuiltinType::GYear,
    BuiltinType::GMonthDay,
    BuiltinType::GDay,
    BuiltinType::GMonth,
    BuiltinType::HexBinary,
    BuiltinType::Base64Binary,
    BuiltinType::QName,
    BuiltinType::Notation,
];

impl BuiltinType {
    /// All built-in types
    pub fn all() -> &'static [BuiltinType] {
        ALL_BUILTINS
    }

    /// Local name in the XSD namespace
    pub fn name(&self) -> &'static str {
        use BuiltinType::*;
        match self {
            AnySimpleType => "anySimpleType",
            AnyAtomicType => "anyAtomicType",
            String => "string",
            NormalizedString => "normalizedString",
            Token => "token",
            Language => "language",
            Name => "Name",
            NCName => "NCName",
            Id => "ID",
            IdRef => "IDREF",
            IdRefs => "IDREFS",
            Entity => "ENTITY",
            Entities => "ENTITIES",
            NmToken => "NMTOKEN",
            NmTokens => "NMTOKENS",
            AnyUri => "anyURI",
            Boolean => "boolean",
            BuiltinType::Decimal => "decimal",
            Integer => "integer",
            NonPositiveInteger => "nonPositiveInteger",
            NegativeInteger => "negativeInteger",
            Long => "long",
            Int => "int",
            Short => "short",
            Byte => "byte",
            NonNegativeInteger => "nonNegativeInteger",
            UnsignedLong => "unsignedLong",
            UnsignedInt => "unsignedInt",
            UnsignedShort => "unsignedShort",
            UnsignedByte => "unsignedByte",
            PositiveInteger => "positiveInteger",
            Float => "float",
            Double => "double",
            Duration => "duration",
            DayTimeDuration => "dayTimeDuration",
            YearMonthDuration => "yearMonthDuration",
            DateTime => "dateTime",
            Time => "time",
            Date => "date",
            GYearMonth => "gYearMonth",
            GYear => "gYear",
            GMonthDay => "gMonthDay",
            GDay => "gDay",
            GMonth => "gMonth",
            HexBinary => "hexBinary",
            Base64Binary => "base64Binary",
            BuiltinType::QName => "QName",
            Notation => "NOTATION",
        }
    }

    /// Look up a built-in type by local name
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_BUILTINS.iter().copied().find(|t| t.name() == name)
    }

    /// Look up a built-in type by qualified name
    pub fn from_qname(name: &QName) -> Option<Self> {
        if name.is_in(XSD_NAMESPACE) {
            Self::from_name(&name.local_name)
        } else {
            None
        }
    }

    /// Qualified name of the type
    pub fn qname(&self) -> QName {
        QName::xsd(self.name())
    }

    /// Base type in the built-in hierarchy
    pub fn base(&self) -> Option<BuiltinType> {
        use BuiltinType::*;
        let base = match self {
            AnySimpleType => return None,
            AnyAtomicType | IdRefs | Entities | NmTokens => AnySimpleType,
            NormalizedString => String,
            Token => NormalizedString,
            Language | Name | NmToken => Token,
            NCName => Name,
            Id | IdRef | Entity => NCName,
            Integer => BuiltinType::Decimal,
            NonPositiveInteger | Long | NonNegativeInteger => Integer,
            NegativeInteger => NonPositiveInteger,
            Int => Long,
            Short => Int,
            Byte => Short,
            UnsignedLong | PositiveInteger => NonNegativeInteger,
            UnsignedInt => UnsignedLong,
            UnsignedShort => UnsignedInt,
            UnsignedByte => UnsignedShort,
            DayTimeDuration | YearMonthDuration => Duration,
            _ => AnyAtomicType,
        };
        Some(base)
    }

    /// Primitive ancestor (self for primitives and the special types)
    pub fn primitive(&self) -> BuiltinType {
        let mut current = *self;
        while let Some(base) = current.base() {
            if matches!(base, BuiltinType::AnyAtomicType | BuiltinType::AnySimpleType) {
                return current;
            }
            current = base;
        }
        current
    }

    /// Whether this type is, or derives from, `other`
    pub fn derives_from(&self, other: BuiltinType) -> bool {
        let mut current = Some(*self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.base();
        }
        false
    }

    /// Item type of the built-in list types
    pub fn item_type(&self) -> Option<BuiltinType> {
        match self {
            BuiltinType::IdRefs => Some(BuiltinType::IdRef),
            BuiltinType::Entities => Some(BuiltinType::Entity),
            BuiltinType::NmTokens => Some(BuiltinType::NmToken),
            _ => None,
        }
    }

    /// Whitespace facet of the type
    pub fn white_space(&self) -> WhiteSpace {
        match self {
            BuiltinType::String | BuiltinType::AnySimpleType => WhiteSpace::Preserve,
            BuiltinType::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Whether values of this type are IDs
    pub fn is_id(&self) -> bool {
        self.derives_from(BuiltinType::Id)
    }

    /// Whether values of this type reference IDs
    pub fn is_idref(&self) -> bool {
        self.derives_from(BuiltinType::IdRef) || *self == BuiltinType::IdRefs
    }

    /// Value family used for facet evaluation
    pub fn family(&self) -> ValueFamily {
        use BuiltinType::*;
        if self.derives_from(NonNegativeInteger) {
            return ValueFamily::UnsignedInteger;
        }
        if self.derives_from(Integer) {
            return ValueFamily::SignedInteger;
        }
        match self.primitive() {
            AnySimpleType | AnyAtomicType | IdRefs | Entities | NmTokens => ValueFamily::Any,
            String | AnyUri => ValueFamily::String,
            BuiltinType::Decimal => ValueFamily::Decimal,
            Float => ValueFamily::Float,
            Double => ValueFamily::Double,
            Duration => ValueFamily::Duration,
            DateTime | Time | Date | GYearMonth | GYear | GMonthDay | GDay | GMonth => {
                ValueFamily::DateTime
            }
            Boolean => ValueFamily::Boolean,
            HexBinary | Base64Binary => ValueFamily::Binary,
            BuiltinType::QName => ValueFamily::QName,
            Notation => ValueFamily::Notation,
            _ => ValueFamily::Any,
        }
    }

    /// Inclusive range of the integer types
    fn integer_range(&self) -> (i128, i128) {
        use BuiltinType::*;
        match self {
            NonPositiveInteger => (i64::MIN as i128, 0),
            NegativeInteger => (i64::MIN as i128, -1),
            Int => (i32::MIN as i128, i32::MAX as i128),
            Short => (i16::MIN as i128, i16::MAX as i128),
            Byte => (i8::MIN as i128, i8::MAX as i128),
            NonNegativeInteger | UnsignedLong => (0, u64::MAX as i128),
            PositiveInteger => (1, u64::MAX as i128),
            UnsignedInt => (0, u32::MAX as i128),
            UnsignedShort => (0, u16::MAX as i128),
            UnsignedByte => (0, u8::MAX as i128),
            _ => (i64::MIN as i128, i64::MAX as i128),
        }
    }

    /// Convert a facet value into a typed value
    ///
    /// Unlike instance text, QName and NOTATION facet values may be written
    /// in Clark notation (`{uri}local`) and are then taken as resolved.
    pub fn parse_facet_value(
        &self,
        text: &str,
        namespaces: &NamespaceContext,
    ) -> std::result::Result<XsdValue, TypeCheckError> {
        if !matches!(self, BuiltinType::QName | BuiltinType::Notation) || !text.starts_with('{') {
            return self.parse_value(text, namespaces);
        }
        let name = text.parse::<QName>().map_err(|e| TypeCheckError::Lexical {
            value: text.to_string(),
            type_name: self.qname().to_string(),
            reason: e.to_string(),
        })?;
        Ok(if *self == BuiltinType::QName {
            XsdValue::QName(name)
        } else {
            XsdValue::Notation(name)
        })
    }

    /// Convert a whitespace-normalized lexical form into a typed value
    ///
    /// QName and NOTATION prefixes resolve against `namespaces`.
    pub fn parse_value(
        &self,
        text: &str,
        namespaces: &NamespaceContext,
    ) -> std::result::Result<XsdValue, TypeCheckError> {
        let lexical = |reason: std::string::String| TypeCheckError::Lexical {
            value: text.to_string(),
            type_name: self.qname().to_string(),
            reason,
        };
        let check = |ok: bool, what: &str| {
            if ok {
                Ok(XsdValue::String(text.to_string()))
            } else {
                Err(lexical(format!("not a valid {}", what)))
            }
        };

        use BuiltinType::*;
        match self {
            AnySimpleType | AnyAtomicType | String => Ok(XsdValue::String(text.to_string())),
            NormalizedString => check(!text.contains(['\t', '\n', '\r']), "normalized string"),
            Token => check(WhiteSpace::Collapse.normalize(text) == text, "token"),
            Language => check(helpers::is_language(text), "language tag"),
            Name => check(helpers::is_name(text), "Name"),
            NCName | Id | IdRef | Entity => check(helpers::is_ncname(text), "NCName"),
            NmToken => check(helpers::is_nmtoken(text), "NMTOKEN"),
            IdRefs | Entities | NmTokens => {
                let item = self.item_type().unwrap_or(String);
                if text.is_empty() {
                    return Err(lexical("list must have at least one item".to_string()));
                }
                for token in text.split(' ') {
                    item.parse_value(token, namespaces)?;
                }
                Ok(XsdValue::String(text.to_string()))
            }
            AnyUri => {
                if text.contains(char::is_whitespace) || text.contains("%%") {
                    return Err(lexical("not a valid URI reference".to_string()));
                }
                // Absolute references must parse, relative ones are kept as is
                if looks_absolute(text) {
                    url::Url::parse(text).map_err(|e| lexical(e.to_string()))?;
                }
                Ok(XsdValue::AnyUri(text.to_string()))
            }
            Boolean => boolean_to_rust(text).map(XsdValue::Boolean).map_err(lexical),
            BuiltinType::Decimal => decimal_to_rust(text).map(XsdValue::Decimal).map_err(lexical),
            Float => float_to_rust(text)
                .map(|v| XsdValue::Float(v as f32))
                .map_err(lexical),
            Double => float_to_rust(text).map(XsdValue::Double).map_err(lexical),
            Duration | DayTimeDuration | YearMonthDuration => {
                let value = duration_to_rust(text).map_err(lexical)?;
                if *self == DayTimeDuration && value.months != 0 {
                    return Err(lexical("year and month components are not allowed".to_string()));
                }
                if *self == YearMonthDuration && !value.seconds.is_zero() {
                    return Err(lexical("only year and month components are allowed".to_string()));
                }
                Ok(XsdValue::Duration(value))
            }
            DateTime | Time | Date | GYearMonth | GYear | GMonthDay | GDay | GMonth => {
                let kind = match self {
                    DateTime => DateTimeKind::DateTime,
                    Time => DateTimeKind::Time,
                    Date => DateTimeKind::Date,
                    GYearMonth => DateTimeKind::GYearMonth,
                    GYear => DateTimeKind::GYear,
                    GMonthDay => DateTimeKind::GMonthDay,
                    GDay => DateTimeKind::GDay,
                    _ => DateTimeKind::GMonth,
                };
                date_time_to_rust(text, kind)
                    .map(XsdValue::DateTime)
                    .map_err(lexical)
            }
            HexBinary => hex_binary_to_rust(text).map(XsdValue::Binary).map_err(lexical),
            Base64Binary => base64_binary_to_rust(text)
                .map(XsdValue::Binary)
                .map_err(lexical),
            BuiltinType::QName | Notation => {
                let name = resolve_qname(text, namespaces).map_err(|e| match e {
                    QNameError::Lexical(reason) => lexical(reason),
                    QNameError::UnboundPrefix(prefix) => TypeCheckError::UnboundPrefix {
                        prefix,
                        value: text.to_string(),
                    },
                })?;
                Ok(if *self == BuiltinType::QName {
                    XsdValue::QName(name)
                } else {
                    XsdValue::Notation(name)
                })
            }
            _ => {
                let (min, max) = self.integer_range();
                let number = integer_to_rust(text, min, max).map_err(lexical)?;
                if self.family() == ValueFamily::UnsignedInteger {
                    u64::try_from(number)
                        .map(XsdValue::Unsigned)
                        .map_err(|_| lexical("integer out of range".to_string()))
                } else {
                    i64::try_from(number)
                        .map(XsdValue::Integer)
                        .map_err(|_| lexical("integer out of range".to_string()))
                }
            }
        }
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.name())
    }
}

fn looks_absolute(text: &str) -> bool {
    match text.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

enum QNameError {
    Lexical(String),
    UnboundPrefix(String),
}

fn resolve_qname(text: &str, namespaces: &NamespaceContext) -> std::result::Result<QName, QNameError> {
    if text.is_empty() {
        return Err(QNameError::Lexical("empty QName".to_string()));
    }
    let (prefix, local) = helpers::split_qname(text).map_err(QNameError::Lexical)?;
    match prefix {
        Some(prefix) => namespaces
            .get_namespace(prefix)
            .map(|ns| QName::namespaced(ns, local))
            .ok_or_else(|| QNameError::UnboundPrefix(prefix.to_string())),
        None => Ok(QName::new(
            namespaces.get_default_namespace(),
            local,
        )),
    }
}

// =============================================================================
// XSD Value Representation
// =============================================================================

/// Represents any XSD atomic value
#[derive(Debug, Clone)]
pub enum XsdValue {
    /// String value (string family, untyped values)
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Decimal value
    Decimal(Decimal),
    /// Signed integer value
    Integer(i64),
    /// Unsigned integer value
    Unsigned(u64),
    /// Float value
    Float(f32),
    /// Double value
    Double(f64),
    /// Duration value
    Duration(DurationValue),
    /// Date/time value as its UTC instant
    DateTime(NaiveDateTime),
    /// Binary value (hex or base64 decoded)
    Binary(Vec<u8>),
    /// URI value
    AnyUri(String),
    /// Resolved QName
    QName(QName),
    /// Resolved NOTATION name
    Notation(QName),
}

impl XsdValue {
    /// The value in the form used for equality across the decimal family
    ///
    /// Integers become decimals so `1` and `1.0` compare equal.
    pub fn comparable(&self) -> XsdValue {
        match self {
            XsdValue::Integer(i) => XsdValue::Decimal(Decimal::from(*i)),
            XsdValue::Unsigned(u) => XsdValue::Decimal(Decimal::from(*u)),
            other => other.clone(),
        }
    }

    /// Equality of the comparable forms, see [`XsdValue::comparable`]
    pub fn value_equals(&self, other: &XsdValue) -> bool {
        self.comparable().equals(&other.comparable())
    }

    /// Typed equality, NaN equals NaN
    pub fn equals(&self, other: &XsdValue) -> bool {
        match (self, other) {
            (XsdValue::Float(a), XsdValue::Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (XsdValue::Double(a), XsdValue::Double(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (XsdValue::String(a), XsdValue::String(b)) => a == b,
            (XsdValue::AnyUri(a), XsdValue::AnyUri(b)) => a == b,
            (XsdValue::Boolean(a), XsdValue::Boolean(b)) => a == b,
            (XsdValue::Binary(a), XsdValue::Binary(b)) => a == b,
            (XsdValue::QName(a), XsdValue::QName(b)) => a == b,
            (XsdValue::Notation(a), XsdValue::Notation(b)) => a == b,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Typed ordering for bound facets, None when not comparable
    pub fn compare(&self, other: &XsdValue) -> Option<Ordering> {
        match (self, other) {
            (XsdValue::Decimal(a), XsdValue::Decimal(b)) => Some(a.cmp(b)),
            (XsdValue::Integer(a), XsdValue::Integer(b)) => Some(a.cmp(b)),
            (XsdValue::Unsigned(a), XsdValue::Unsigned(b)) => Some(a.cmp(b)),
            (XsdValue::Float(a), XsdValue::Float(b)) => a.partial_cmp(b),
            (XsdValue::Double(a), XsdValue::Double(b)) => a.partial_cmp(b),
            (XsdValue::Duration(a), XsdValue::Duration(b)) => a.partial_compare(b),
            (XsdValue::DateTime(a), XsdValue::DateTime(b)) => Some(a.cmp(b)),
            (XsdValue::String(a), XsdValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for XsdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XsdValue::String(s) | XsdValue::AnyUri(s) => write!(f, "{}", s),
            XsdValue::Boolean(b) => write!(f, "{}", b),
            XsdValue::Decimal(d) => write!(f, "{}", d.normalize()),
            XsdValue::Integer(i) => write!(f, "{}", i),
            XsdValue::Unsigned(u) => write!(f, "{}", u),
            XsdValue::Float(v) => write!(f, "{}", helpers::rust_to_float(*v as f64)),
            XsdValue::Double(v) => write!(f, "{}", helpers::rust_to_float(*v)),
            XsdValue::Duration(d) => write!(f, "{} months {} seconds", d.months, d.seconds),
            XsdValue::DateTime(dt) => write!(f, "{}Z", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            XsdValue::Binary(b) => {
                for byte in b {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            XsdValue::QName(q) | XsdValue::Notation(q) => write!(f, "{}", q),
        }
    }
}
