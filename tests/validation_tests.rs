//! Instance validation scenarios
//!
//! Each test builds a small schema with [`SchemaBuilder`] and validates
//! documents against it.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use xsdcheck::documents::{Document, NodeId, NodeRef};
use xsdcheck::namespaces::QName;
use xsdcheck::validators::{
    AttributeDecl, AttributeUse, BuiltinType, ComplexTypeDef, ContentType, ElementDecl, Facet,
    FacetKind, IdentityConstraint, ModelGroup, Particle, ProcessContents, Schema, SchemaBuilder,
    SimpleTypeDef, TypeRef, ValueConstraint, Wildcard,
};
use xsdcheck::{validate, ValidationErrorKind, ValidationReport};

fn run(schema: &Arc<Schema>, xml: &str) -> ValidationReport {
    let doc = Document::from_string(xml).unwrap();
    validate(Arc::clone(schema), &doc).unwrap()
}

fn messages(report: &ValidationReport) -> Vec<String> {
    report.errors.iter().map(|e| e.message.clone()).collect()
}

// ============================================================================
// Content models
// ============================================================================

/// `root` with content `(A, B?, C*)`
fn sequence_schema() -> Arc<Schema> {
    let mut b = SchemaBuilder::new(None);
    let a = b.add_element(ElementDecl::new(b.qname("A"), TypeRef::AnyType));
    let bb = b.add_element(ElementDecl::new(b.qname("B"), TypeRef::AnyType));
    let c = b.add_element(ElementDecl::new(b.qname("C"), TypeRef::AnyType));
    let group = b.add_model_group(ModelGroup::sequence(vec![
        Particle::element(a),
        Particle::element(bb).with_occurs(0, Some(1)),
        Particle::element(c).with_occurs(0, None),
    ]));
    let root_type = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(group))));
    b.add_global_element(ElementDecl::new(b.qname("root"), root_type));
    Arc::new(b.build().unwrap())
}

#[test]
fn test_sequence_accepts_optional_and_repeated() {
    let schema = sequence_schema();
    for xml in [
        "<root><A/></root>",
        "<root><A/><C/><C/></root>",
        "<root><A/><B/></root>",
        "<root><A/><B/><C/></root>",
    ] {
        let report = run(&schema, xml);
        assert!(report.is_valid(), "{}: {:?}", xml, report.errors);
    }
}

#[test]
fn test_sequence_rejects_wrong_order() {
    let schema = sequence_schema();
    let report = run(&schema, "<root><B/><A/></root>");
    assert_eq!(messages(&report), vec!["Element B is not defined in this scope.".to_string()]);
    assert_eq!(report.errors[0].reason.as_deref(), Some("expected A"));
    assert_eq!(report.errors[0].path.as_deref(), Some("/root/B"));
}

#[test]
fn test_sequence_rejects_incomplete_content() {
    let schema = sequence_schema();
    let report = run(&schema, "<root/>");
    assert_eq!(messages(&report), vec!["Element root is missing child element.".to_string()]);
    assert_eq!(report.errors[0].kind, ValidationErrorKind::ContentModel);

    let report = run(&schema, "<root><A/><B/><B/></root>");
    assert!(!report.is_valid());
}

#[test]
fn test_element_only_rejects_text() {
    let schema = sequence_schema();
    let report = run(&schema, "<root>text<A/></root>");
    assert_eq!(messages(&report), vec!["Element root contains not allowed text content.".to_string()]);
    assert!(run(&schema, "<root>\n  <A/>\n</root>").is_valid());
}

#[test]
fn test_wildcard_process_contents() {
    let mut b = SchemaBuilder::new(None);
    b.add_global_element(ElementDecl::new(b.qname("known"), BuiltinType::Int.into()));
    for (name, process_contents) in [
        ("strict", ProcessContents::Strict),
        ("lax", ProcessContents::Lax),
        ("skip", ProcessContents::Skip),
    ] {
        let wildcard = b.add_wildcard(Wildcard::any(process_contents));
        let group = b.add_model_group(ModelGroup::sequence(vec![
            Particle::wildcard(wildcard).with_occurs(0, None),
        ]));
        let t = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(group))));
        b.add_global_element(ElementDecl::new(b.qname(name), t));
    }
    let schema = Arc::new(b.build().unwrap());

    assert!(run(&schema, "<strict><known>1</known></strict>").is_valid());
    assert_eq!(
        messages(&run(&schema, "<strict><unknown/></strict>")),
        vec!["Declaration for element unknown does not exist.".to_string()]
    );
    assert!(!run(&schema, "<strict><known>x</known></strict>").is_valid());

    let report = run(&schema, r#"<lax><unknown a="1"><deeper/></unknown><known>2</known></lax>"#);
    assert!(report.is_valid(), "{:?}", report.errors);
    assert_eq!(report.annotations.element_type(NodeId(1)), Some(TypeRef::AnyType));
    assert!(!run(&schema, "<lax><known>two</known></lax>").is_valid());

    let report = run(&schema, "<skip><known>not a number</known><other><x/></other></skip>");
    assert!(report.is_valid(), "{:?}", report.errors);
    assert!(report.annotations.get(NodeRef::Element(NodeId(1))).is_none());
}

// ============================================================================
// Simple content and value constraints
// ============================================================================

fn value_schema() -> Arc<Schema> {
    let mut b = SchemaBuilder::new(None);
    let small = b.add_simple_type(
        SimpleTypeDef::atomic(BuiltinType::Integer.into())
            .with_facet(Facet::new(FacetKind::MinInclusive, "1"))
            .with_facet(Facet::new(FacetKind::MaxInclusive, "10"))
            .with_facet(Facet::new(FacetKind::TotalDigits, "2")),
    );
    b.add_global_element(ElementDecl::new(b.qname("small"), small));
    b.add_global_element(
        ElementDecl::new(b.qname("fixed"), BuiltinType::Decimal.into())
            .with_value_constraint(ValueConstraint::fixed("1.5")),
    );
    b.add_global_element(
        ElementDecl::new(b.qname("defaulted"), small)
            .with_value_constraint(ValueConstraint::default_value("3")),
    );
    b.add_global_element(ElementDecl::new(b.qname("plain"), BuiltinType::String.into()).nillable());
    let label = b.add_complex_type(
        ComplexTypeDef::new(ContentType::mixed(None)),
    );
    b.add_global_element(
        ElementDecl::new(b.qname("label"), label).with_value_constraint(ValueConstraint::fixed("hello")),
    );
    Arc::new(b.build().unwrap())
}

#[test]
fn test_bounds_and_total_digits() {
    let schema = value_schema();
    assert!(run(&schema, "<small>10</small>").is_valid());
    assert!(run(&schema, "<small> 7 </small>").is_valid());

    let report = run(&schema, "<small>100</small>");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ValidationErrorKind::Value);
    assert!(report.errors[0].message.starts_with("Content of element small does not match its type definition"));
    assert!(!run(&schema, "<small>0</small>").is_valid());
}

#[test]
fn test_fixed_value_is_typed() {
    let schema = value_schema();
    assert!(run(&schema, "<fixed>1.50</fixed>").is_valid());
    assert!(run(&schema, "<fixed/>").is_valid());
    assert_eq!(
        messages(&run(&schema, "<fixed>2</fixed>")),
        vec!["Content of element fixed does not match defined value constraint.".to_string()]
    );
}

#[test]
fn test_default_value_is_checked_when_empty() {
    let schema = value_schema();
    let report = run(&schema, "<defaulted/>");
    assert!(report.is_valid(), "{:?}", report.errors);
    assert!(!run(&schema, "<defaulted>11</defaulted>").is_valid());
}

#[test]
fn test_mixed_fixed_content() {
    let schema = value_schema();
    assert!(run(&schema, "<label>hello</label>").is_valid());
    assert!(run(&schema, "<label/>").is_valid());
    assert!(!run(&schema, "<label>bye</label>").is_valid());
    assert_eq!(
        messages(&run(&schema, "<label><b/></label>")),
        vec!["Element label cannot contain other elements, as it has fixed content.".to_string()]
    );
}

#[test]
fn test_nil_with_text_is_rejected() {
    let schema = value_schema();
    let xsi = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;

    let report = run(&schema, &format!(r#"<plain {} xsi:nil="true">text</plain>"#, xsi));
    assert_eq!(
        messages(&report),
        vec!["Element plain contains content although it is nillable.".to_string()]
    );

    let report = run(&schema, &format!(r#"<small {} xsi:nil="true">3</small>"#, xsi));
    assert_eq!(messages(&report), vec!["Element small is not nillable.".to_string()]);

    assert!(run(&schema, &format!(r#"<plain {} xsi:nil="1"/>"#, xsi)).is_valid());
    assert!(run(&schema, &format!(r#"<plain {} xsi:nil="false">text</plain>"#, xsi)).is_valid());
    assert!(!run(&schema, &format!(r#"<plain {} xsi:nil="yes"/>"#, xsi)).is_valid());
}

// ============================================================================
// Identity constraints
// ============================================================================

/// `list` holds `item*` with attributes `a` and `b` under a unique constraint
fn unique_schema() -> Arc<Schema> {
    let mut b = SchemaBuilder::new(None);
    let a = b.add_attribute(AttributeDecl::new(b.qname("a"), BuiltinType::String.into()));
    let bb = b.add_attribute(AttributeDecl::new(b.qname("b"), BuiltinType::Integer.into()));
    let item_type = b.add_complex_type(
        ComplexTypeDef::new(ContentType::empty())
            .with_attribute(AttributeUse::optional(a))
            .with_attribute(AttributeUse::optional(bb)),
    );
    let item = b.add_element(ElementDecl::new(b.qname("item"), item_type));
    let group = b.add_model_group(ModelGroup::sequence(vec![Particle::element(item).with_occurs(0, None)]));
    let list_type = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(group))));
    let unique = b.add_identity_constraint(IdentityConstraint::unique(b.qname("pair"), "item", ["@a", "@b"]));
    b.add_global_element(ElementDecl::new(b.qname("list"), list_type).with_identity_constraint(unique));
    Arc::new(b.build().unwrap())
}

#[test]
fn test_unique_duplicate_tuple() {
    let schema = unique_schema();
    let report = run(&schema, r#"<list><item a="x" b="1"/><item a="x" b="1"/></list>"#);
    assert_eq!(messages(&report), vec!["Non-unique value found for constraint pair.".to_string()]);
    assert_eq!(report.errors[0].kind, ValidationErrorKind::IdentityConstraint);
    assert_eq!(report.errors[0].reason.as_deref(), Some(r#"("x", "1")"#));
}

#[test]
fn test_unique_distinct_tuples() {
    let schema = unique_schema();
    assert!(run(&schema, r#"<list><item a="x" b="1"/><item a="x" b="2"/></list>"#).is_valid());
    // typed comparison: 01 and 1 are the same integer
    assert!(!run(&schema, r#"<list><item a="x" b="01"/><item a="x" b="1"/></list>"#).is_valid());
    // incomplete tuples are ignored by unique
    assert!(run(&schema, r#"<list><item a="x"/><item a="x"/></list>"#).is_valid());
}

/// `lib` holds `book*` then `ref*`; book ids are a key, ref targets a keyref
fn keyref_schema() -> Arc<Schema> {
    let mut b = SchemaBuilder::new(None);
    let id = b.add_attribute(AttributeDecl::new(b.qname("id"), BuiltinType::String.into()));
    let to = b.add_attribute(AttributeDecl::new(b.qname("to"), BuiltinType::String.into()));
    let book_type = b.add_complex_type(ComplexTypeDef::new(ContentType::empty()).with_attribute(AttributeUse::optional(id)));
    let ref_type = b.add_complex_type(ComplexTypeDef::new(ContentType::empty()).with_attribute(AttributeUse::required(to)));
    let book = b.add_element(ElementDecl::new(b.qname("book"), book_type));
    let reference = b.add_element(ElementDecl::new(b.qname("ref"), ref_type));
    let group = b.add_model_group(ModelGroup::sequence(vec![
        Particle::element(book).with_occurs(0, None),
        Particle::element(reference).with_occurs(0, None),
    ]));
    let lib_type = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(group))));
    let key = b.add_identity_constraint(IdentityConstraint::key(b.qname("bookKey"), "book", ["@id"]));
    let keyref = b.add_identity_constraint(IdentityConstraint::keyref(
        b.qname("bookRef"),
        b.qname("bookKey"),
        "ref",
        ["@to"],
    ));
    b.add_global_element(
        ElementDecl::new(b.qname("lib"), lib_type)
            .with_identity_constraint(key)
            .with_identity_constraint(keyref),
    );
    Arc::new(b.build().unwrap())
}

#[test]
fn test_keyref_unresolved_value() {
    let schema = keyref_schema();
    let report = run(
        &schema,
        r#"<lib><book id="a"/><book id="b"/><ref to="a"/><ref to="c"/></lib>"#,
    );
    assert_eq!(
        messages(&report),
        vec![r#"No referenced value found for key reference bookRef: ("c")."#.to_string()]
    );
    assert_eq!(report.errors[0].path.as_deref(), Some("/lib/ref"));
}

#[test]
fn test_keyref_resolved() {
    let schema = keyref_schema();
    assert!(run(&schema, r#"<lib><book id="a"/><book id="b"/><ref to="b"/></lib>"#).is_valid());
}

#[test]
fn test_key_requires_all_fields() {
    let schema = keyref_schema();
    let report = run(&schema, r#"<lib><book id="a"/><book/></lib>"#);
    assert_eq!(messages(&report), vec!["Key constraint bookKey contains absent fields.".to_string()]);

    let report = run(&schema, r#"<lib><book id="a"/><book id="a"/></lib>"#);
    assert_eq!(messages(&report), vec!["Non-unique value found for constraint bookKey.".to_string()]);
}

/// `doc` holds `books` (key on `book/@id`) then `refs` (keyref on `ref/@to`)
fn sibling_keyref_schema() -> Arc<Schema> {
    let mut b = SchemaBuilder::new(None);
    let id = b.add_attribute(AttributeDecl::new(b.qname("id"), BuiltinType::String.into()));
    let to = b.add_attribute(AttributeDecl::new(b.qname("to"), BuiltinType::String.into()));
    let book_type = b.add_complex_type(ComplexTypeDef::new(ContentType::empty()).with_attribute(AttributeUse::required(id)));
    let ref_type = b.add_complex_type(ComplexTypeDef::new(ContentType::empty()).with_attribute(AttributeUse::required(to)));
    let book = b.add_element(ElementDecl::new(b.qname("book"), book_type));
    let reference = b.add_element(ElementDecl::new(b.qname("ref"), ref_type));

    let books_group = b.add_model_group(ModelGroup::sequence(vec![Particle::element(book).with_occurs(0, None)]));
    let books_type = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(books_group))));
    let refs_group = b.add_model_group(ModelGroup::sequence(vec![Particle::element(reference).with_occurs(0, None)]));
    let refs_type = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(refs_group))));

    let key = b.add_identity_constraint(IdentityConstraint::key(b.qname("bookKey"), "book", ["@id"]));
    let keyref = b.add_identity_constraint(IdentityConstraint::keyref(
        b.qname("bookRef"),
        b.qname("bookKey"),
        "ref",
        ["@to"],
    ));
    let books = b.add_element(ElementDecl::new(b.qname("books"), books_type).with_identity_constraint(key));
    let refs = b.add_element(ElementDecl::new(b.qname("refs"), refs_type).with_identity_constraint(keyref));

    let doc_group = b.add_model_group(ModelGroup::sequence(vec![Particle::element(books), Particle::element(refs)]));
    let doc_type = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(doc_group))));
    b.add_global_element(ElementDecl::new(b.qname("doc"), doc_type));
    Arc::new(b.build().unwrap())
}

#[test]
fn test_keyref_resolves_key_from_sibling_scope() {
    let schema = sibling_keyref_schema();
    let report = run(
        &schema,
        r#"<doc><books><book id="a"/><book id="b"/></books><refs><ref to="a"/><ref to="b"/></refs></doc>"#,
    );
    assert!(report.is_valid(), "{:?}", report.errors);

    let report = run(
        &schema,
        r#"<doc><books><book id="a"/></books><refs><ref to="a"/><ref to="z"/></refs></doc>"#,
    );
    assert_eq!(
        messages(&report),
        vec![r#"No referenced value found for key reference bookRef: ("z")."#.to_string()]
    );
}

// ============================================================================
// ID / IDREF
// ============================================================================

#[test]
fn test_dangling_idrefs_are_reported_sorted() {
    let mut b = SchemaBuilder::new(None);
    let id = b.add_attribute(AttributeDecl::new(b.qname("id"), BuiltinType::Id.into()));
    let refs = b.add_attribute(AttributeDecl::new(b.qname("refs"), BuiltinType::IdRefs.into()));
    let node_type = b.add_complex_type(
        ComplexTypeDef::new(ContentType::empty())
            .with_attribute(AttributeUse::optional(id))
            .with_attribute(AttributeUse::optional(refs)),
    );
    let node = b.add_element(ElementDecl::new(b.qname("node"), node_type));
    let group = b.add_model_group(ModelGroup::sequence(vec![Particle::element(node).with_occurs(0, None)]));
    let graph_type = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(group))));
    b.add_global_element(ElementDecl::new(b.qname("graph"), graph_type));
    let schema = Arc::new(b.build().unwrap());

    assert!(run(&schema, r#"<graph><node id="n1" refs="n2"/><node id="n2" refs="n1 n2"/></graph>"#).is_valid());

    let report = run(&schema, r#"<graph><node id="n1" refs="zz n1 aa"/><node refs="aa"/></graph>"#);
    assert_eq!(
        messages(&report),
        vec![
            "There is one IDREF value with no corresponding ID: aa.".to_string(),
            "There is one IDREF value with no corresponding ID: zz.".to_string(),
        ]
    );
    assert!(report.errors.iter().all(|e| e.kind == ValidationErrorKind::IdReference));
}

// ============================================================================
// Attributes
// ============================================================================

#[test]
fn test_attribute_wildcard_and_fixed_attribute() {
    let mut b = SchemaBuilder::new(Some("urn:t"));
    let version = b.add_attribute(
        AttributeDecl::new(QName::local("version"), BuiltinType::Decimal.into())
            .with_value_constraint(ValueConstraint::fixed("1.0")),
    );
    b.add_global_attribute(AttributeDecl::new(b.qname("lang"), BuiltinType::Language.into()));
    let t = b.add_complex_type(
        ComplexTypeDef::new(ContentType::empty())
            .with_attribute(AttributeUse::optional(version))
            .with_attribute_wildcard(Wildcard::any(ProcessContents::Lax)),
    );
    b.add_global_element(ElementDecl::new(b.qname("doc"), t));
    let schema = Arc::new(b.build().unwrap());

    let valid = r#"<doc xmlns="urn:t" xmlns:t="urn:t" version="1" t:lang="en" other="x"/>"#;
    let report = run(&schema, valid);
    assert!(report.is_valid(), "{:?}", report.errors);

    let report = run(&schema, r#"<doc xmlns="urn:t" version="2"/>"#);
    assert_eq!(
        messages(&report),
        vec!["Content of attribute version does not match defined value constraint.".to_string()]
    );

    let report = run(&schema, r#"<doc xmlns="urn:t" xmlns:t="urn:t" t:lang="not a language"/>"#);
    assert_eq!(report.errors[0].kind, ValidationErrorKind::Value);
}
