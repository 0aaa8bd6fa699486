//! Simple type checking
//!
//! [`TypeChecker`] validates whitespace-normalized text against a simple
//! type of a [`Schema`]: atomic types convert the text through their nearest
//! built-in ancestor and then check the merged facets, lists check their own
//! facets before every item, unions try their members in order.
//!
//! Facets are evaluated per value family. Bounds and enumerations use typed
//! comparison; Pattern always applies to the lexical text.

use crate::error::TypeCheckError;
use crate::namespaces::NamespaceContext;
use crate::validators::builtins::{BuiltinType, ValueFamily, XsdValue};
use crate::validators::facets::{normalized_value, Facet, FacetKind, FacetSet, WhiteSpace};
use crate::validators::helpers;
use crate::validators::schemas::{Schema, TypeRef};
use crate::validators::simple_types::SimpleVariety;
use std::cmp::Ordering;

type CheckResult<T> = std::result::Result<T, TypeCheckError>;

/// ID semantics of a validated value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// An ID
    Id,
    /// A single IDREF
    IdRef,
    /// A list of IDREFs
    IdRefs,
}

/// Checks lexical values against the simple types of a schema
///
/// QName and NOTATION prefixes resolve against `namespaces`, normally the
/// in-scope namespaces of the instance element carrying the value.
#[derive(Debug, Clone, Copy)]
pub struct TypeChecker<'a> {
    schema: &'a Schema,
    namespaces: &'a NamespaceContext,
}

impl<'a> TypeChecker<'a> {
    /// Create a checker
    pub fn new(schema: &'a Schema, namespaces: &'a NamespaceContext) -> Self {
        Self { schema, namespaces }
    }

    /// Validate normalized text, returning the type the value is bound to
    ///
    /// For unions this is the member type that accepted the value.
    pub fn is_valid_string(&self, normalized: &str, type_ref: TypeRef) -> CheckResult<TypeRef> {
        self.typed_value(normalized, type_ref).map(|(bound, _)| bound)
    }

    /// Validate normalized text and return the bound type and typed value
    ///
    /// List values are returned as their whitespace-collapsed string.
    pub fn typed_value(&self, normalized: &str, type_ref: TypeRef) -> CheckResult<(TypeRef, XsdValue)> {
        match self.variety(type_ref)? {
            SimpleVariety::Atomic => self
                .check_atomic(normalized, type_ref)
                .map(|value| (type_ref, value)),
            SimpleVariety::List { item_type } => {
                self.check_list(normalized, type_ref, item_type)?;
                Ok((
                    type_ref,
                    XsdValue::String(WhiteSpace::Collapse.normalize(normalized)),
                ))
            }
            SimpleVariety::Union { member_types } => {
                self.check_union(normalized, type_ref, &member_types)
            }
        }
    }

    /// Typed equality of two lexical values of a type
    ///
    /// Texts that do not validate are compared as strings.
    pub fn values_are_equal(&self, a: &str, b: &str, type_ref: TypeRef) -> bool {
        let facets = self.schema.merged_facets(type_ref);
        let a = normalized_value(a, &facets);
        let b = normalized_value(b, &facets);

        if let Ok(SimpleVariety::List { item_type }) = self.variety(type_ref) {
            let left: Vec<&str> = a.split_whitespace().collect();
            let right: Vec<&str> = b.split_whitespace().collect();
            return left.len() == right.len()
                && left
                    .iter()
                    .zip(&right)
                    .all(|(x, y)| self.values_are_equal(x, y, item_type));
        }

        match (self.typed_value(&a, type_ref), self.typed_value(&b, type_ref)) {
            (Ok((_, x)), Ok((_, y))) => x.value_equals(&y),
            _ => a == b,
        }
    }

    /// ID semantics of a bound type, if any
    pub fn id_kind(&self, bound: TypeRef) -> Option<IdKind> {
        if let Ok(SimpleVariety::List { item_type }) = self.variety(bound) {
            return match self.id_kind(item_type) {
                Some(IdKind::IdRef) => Some(IdKind::IdRefs),
                _ => None,
            };
        }
        let builtin = self.schema.builtin_ancestor(bound)?;
        if builtin.is_id() {
            Some(IdKind::Id)
        } else if builtin.is_idref() {
            Some(IdKind::IdRef)
        } else {
            None
        }
    }

    /// Effective variety; restrictions of built-in list types are lists
    fn variety(&self, type_ref: TypeRef) -> CheckResult<SimpleVariety> {
        match self.schema.simple_variety(type_ref) {
            Some(SimpleVariety::Atomic) => {
                match self.schema.builtin_ancestor(type_ref).and_then(|b| b.item_type()) {
                    Some(item) => Ok(SimpleVariety::List {
                        item_type: TypeRef::Builtin(item),
                    }),
                    None => Ok(SimpleVariety::Atomic),
                }
            }
            Some(variety) => Ok(variety),
            None => Err(TypeCheckError::NotSimple(self.schema.type_name(type_ref))),
        }
    }

    // =========================================================================
    // Atomic
    // =========================================================================

    fn check_atomic(&self, text: &str, type_ref: TypeRef) -> CheckResult<XsdValue> {
        let builtin = self
            .schema
            .builtin_ancestor(type_ref)
            .ok_or_else(|| TypeCheckError::NotSimple(self.schema.type_name(type_ref)))?;
        let value = builtin.parse_value(text, self.namespaces)?;

        if let XsdValue::Notation(name) = &value {
            if self.schema.notation_by_name(name).is_none() {
                return Err(TypeCheckError::Lexical {
                    value: text.to_string(),
                    type_name: builtin.qname().to_string(),
                    reason: format!("{} is not a declared notation", name),
                });
            }
        }

        let facets = self.schema.merged_facets(type_ref);
        self.check_facets(text, &value, builtin, &facets)?;
        Ok(value)
    }

    fn check_facets(
        &self,
        text: &str,
        value: &XsdValue,
        builtin: BuiltinType,
        facets: &FacetSet,
    ) -> CheckResult<()> {
        let family = builtin.family();
        let violation = |facet: FacetKind| TypeCheckError::Facet {
            family: family.label(),
            facet,
            value: text.to_string(),
        };

        for facet in facets.iter() {
            let ok = match facet.kind {
                FacetKind::WhiteSpace | FacetKind::Assertion => true,
                FacetKind::Pattern => matches_pattern(facet, text)?,
                FacetKind::Enumeration => facet.values().iter().any(|allowed| {
                    match builtin.parse_facet_value(allowed, self.namespaces) {
                        Ok(allowed) => value.value_equals(&allowed),
                        Err(_) => allowed == text,
                    }
                }),
                FacetKind::Length | FacetKind::MinLength | FacetKind::MaxLength => {
                    match value_length(family, text, value) {
                        Some(length) => {
                            let limit = length_value(facet)?;
                            match facet.kind {
                                FacetKind::Length => length == limit,
                                FacetKind::MinLength => length >= limit,
                                _ => length <= limit,
                            }
                        }
                        None => true,
                    }
                }
                FacetKind::MinInclusive
                | FacetKind::MaxInclusive
                | FacetKind::MinExclusive
                | FacetKind::MaxExclusive => {
                    if !is_ordered(family) {
                        true
                    } else {
                        let bound = self.facet_value(facet, builtin)?;
                        // Incomparable values (some durations) satisfy the bound
                        match value.compare(&bound) {
                            Some(ordering) => match facet.kind {
                                FacetKind::MinInclusive => ordering != Ordering::Less,
                                FacetKind::MaxInclusive => ordering != Ordering::Greater,
                                FacetKind::MinExclusive => ordering == Ordering::Greater,
                                _ => ordering == Ordering::Less,
                            },
                            None => true,
                        }
                    }
                }
                FacetKind::TotalDigits => {
                    !is_decimal_family(family) || helpers::total_digits(text) <= length_value(facet)?
                }
                FacetKind::FractionDigits => {
                    !is_decimal_family(family)
                        || helpers::fraction_digits(text) <= length_value(facet)?
                }
            };
            if !ok {
                tracing::trace!(facet = %facet.kind, value = text, "facet violated");
                return Err(violation(facet.kind));
            }
        }
        Ok(())
    }

    fn facet_value(&self, facet: &Facet, builtin: BuiltinType) -> CheckResult<XsdValue> {
        let text = facet.single_value().unwrap_or_default();
        builtin
            .parse_facet_value(text, self.namespaces)
            .map_err(|e| TypeCheckError::InvalidFacet {
                facet: facet.kind,
                value: text.to_string(),
                reason: e.to_string(),
            })
    }

    // =========================================================================
    // List and union
    // =========================================================================

    fn check_list(&self, text: &str, list_type: TypeRef, item_type: TypeRef) -> CheckResult<()> {
        let facets = self.schema.merged_facets(list_type);
        let items: Vec<&str> = text.split_whitespace().collect();
        let joined = items.join(" ");
        let violation = |facet: FacetKind| TypeCheckError::Facet {
            family: "List",
            facet,
            value: text.to_string(),
        };

        for facet in facets.iter() {
            let ok = match facet.kind {
                FacetKind::Length => items.len() == length_value(facet)?,
                FacetKind::MinLength => items.len() >= length_value(facet)?,
                FacetKind::MaxLength => items.len() <= length_value(facet)?,
                FacetKind::Pattern => matches_pattern(facet, &joined)?,
                FacetKind::Enumeration => facet
                    .values()
                    .iter()
                    .any(|allowed| WhiteSpace::Collapse.normalize(allowed) == joined),
                _ => true,
            };
            if !ok {
                return Err(violation(facet.kind));
            }
        }

        let item_facets = self.schema.merged_facets(item_type);
        for item in items {
            let item = normalized_value(item, &item_facets);
            self.is_valid_string(&item, item_type)?;
        }
        Ok(())
    }

    fn check_union(
        &self,
        text: &str,
        union_type: TypeRef,
        members: &[TypeRef],
    ) -> CheckResult<(TypeRef, XsdValue)> {
        let facets = self.schema.merged_facets(union_type);
        let violation = |facet: FacetKind| TypeCheckError::Facet {
            family: "Union",
            facet,
            value: text.to_string(),
        };

        if let Some(pattern) = facets.get(FacetKind::Pattern) {
            if !matches_pattern(pattern, text)? {
                return Err(violation(FacetKind::Pattern));
            }
        }
        if let Some(enumeration) = facets.get(FacetKind::Enumeration) {
            let listed = enumeration.values().iter().any(|allowed| {
                members.iter().any(|member| {
                    match (
                        self.member_value(text, *member),
                        self.member_value(allowed, *member),
                    ) {
                        (Some(x), Some(y)) => x.value_equals(&y),
                        _ => false,
                    }
                })
            });
            if !listed {
                return Err(violation(FacetKind::Enumeration));
            }
        }

        for member in members {
            if let Some(result) = self.try_member(text, *member) {
                return Ok(result);
            }
        }
        Err(TypeCheckError::NoMatchingMember {
            value: text.to_string(),
            type_name: self.schema.type_name(union_type),
        })
    }

    fn try_member(&self, text: &str, member: TypeRef) -> Option<(TypeRef, XsdValue)> {
        let member_facets = self.schema.merged_facets(member);
        let normalized = normalized_value(text, &member_facets);
        self.typed_value(&normalized, member).ok()
    }

    fn member_value(&self, text: &str, member: TypeRef) -> Option<XsdValue> {
        self.try_member(text, member).map(|(_, value)| value)
    }
}

fn matches_pattern(facet: &Facet, text: &str) -> CheckResult<bool> {
    facet.matches_pattern(text).map_err(|e| TypeCheckError::InvalidFacet {
        facet: facet.kind,
        value: facet.values().join(" | "),
        reason: e.to_string(),
    })
}

fn length_value(facet: &Facet) -> CheckResult<usize> {
    facet.usize_value().map_err(|e| TypeCheckError::InvalidFacet {
        facet: facet.kind,
        value: facet.single_value().unwrap_or_default().to_string(),
        reason: e.to_string(),
    })
}

/// Length in the unit of the family; None where length facets do not apply
fn value_length(family: ValueFamily, text: &str, value: &XsdValue) -> Option<usize> {
    match (family, value) {
        (ValueFamily::Binary, XsdValue::Binary(bytes)) => Some(bytes.len()),
        (ValueFamily::String | ValueFamily::Any | ValueFamily::QName | ValueFamily::Notation, _) => {
            Some(text.chars().count())
        }
        _ => None,
    }
}

fn is_ordered(family: ValueFamily) -> bool {
    matches!(
        family,
        ValueFamily::SignedInteger
            | ValueFamily::UnsignedInteger
            | ValueFamily::Decimal
            | ValueFamily::Float
            | ValueFamily::Double
            | ValueFamily::DateTime
            | ValueFamily::Duration
    )
}

fn is_decimal_family(family: ValueFamily) -> bool {
    matches!(
        family,
        ValueFamily::SignedInteger | ValueFamily::UnsignedInteger | ValueFamily::Decimal
    )
}
