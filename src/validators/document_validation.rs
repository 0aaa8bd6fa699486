//! Document Validation
//!
//! [`ValidatingReader`] walks an instance [`Document`] as a stream of start
//! and end events and validates it against a [`Schema`]. Every open element
//! owns a frame on the context stack holding the automaton of its content
//! model; a child element steps the parent's automaton and the label taken
//! decides its declaration.
//!
//! Structural and value errors stop the run. Identity constraint and
//! ID/IDREF errors are recorded and the run continues. Keyrefs and IDREFs are
//! resolved once the whole document has been read.

use std::borrow::Cow;
use std::sync::Arc;

use once_cell::sync::Lazy;
use url::Url;

use crate::documents::{Document, NodeEvent, NodeId, NodeRef};
use crate::error::{Error, Result, ValidationError, ValidationErrorKind};
use crate::limits::Limits;
use crate::loaders::SchemaLoader;
use crate::locations::Location;
use crate::namespaces::{QName, XSI_NAMESPACE};
use crate::xpath::{IdentityPathEvaluator, PathEvaluator};

use super::attributes::AttributeUseMode;
use super::automaton::Automaton;
use super::builtins::XsdValue;
use super::complex_types::ContentVariety;
use super::elements::{ElementDecl, ValueConstraint};
use super::facets::normalized_value;
use super::helpers::{boolean_to_rust, split_qname};
use super::identities::{FieldValue, IdentityConstraintKind, KeyTable, TargetNode};
use super::models::{any_content_automaton, label_name, proceed_child, ContentLabel};
use super::schemas::{AttributeId, ElementId, IdentityConstraintId, Schema, TypeRef};
use super::type_checker::{IdKind, TypeChecker};
use super::validation::{Annotations, Declaration, Frame, NodeAnnotation, PendingKeyRef, ValidationContext};
use super::wildcards::{ProcessContents, Wildcard};

static XSI_TYPE: Lazy<QName> = Lazy::new(|| QName::xsi("type"));
static XSI_NIL: Lazy<QName> = Lazy::new(|| QName::xsi("nil"));
static XSI_SCHEMA_LOCATION: Lazy<QName> = Lazy::new(|| QName::xsi("schemaLocation"));
static XSI_NO_NAMESPACE_SCHEMA_LOCATION: Lazy<QName> =
    Lazy::new(|| QName::xsi("noNamespaceSchemaLocation"));

/// xsi attributes allowed on every element
fn is_xsi_builtin(name: &QName) -> bool {
    name.is_in(XSI_NAMESPACE)
        && matches!(
            name.local_name.as_str(),
            "type" | "nil" | "schemaLocation" | "noNamespaceSchemaLocation"
        )
}

/// Options of a validation run
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// Resource limits
    pub limits: Limits,
    /// Whether schema location hints are loaded and merged
    pub use_location_hints: bool,
    /// Base URI for relative location hints, overrides the document's
    pub base_uri: Option<Url>,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            use_location_hints: true,
            base_uri: None,
        }
    }
}

impl ValidatorOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Enable or disable schema location hints
    pub fn with_location_hints(mut self, enabled: bool) -> Self {
        self.use_location_hints = enabled;
        self
    }

    /// Set the base URI for location hints
    pub fn with_base_uri(mut self, base_uri: Url) -> Self {
        self.base_uri = Some(base_uri);
        self
    }
}

/// Outcome of a validation run
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Errors in the order they were found
    pub errors: Vec<ValidationError>,
    /// Declarations and types assigned to the validated nodes
    pub annotations: Annotations,
    /// The schema in effect at the end of the run, hints merged
    pub schema: Arc<Schema>,
}

impl ValidationReport {
    /// Whether the document is valid
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The first error found
    pub fn first_error(&self) -> Option<&ValidationError> {
        self.errors.first()
    }
}

/// Why the event loop stopped early
enum Halt {
    /// A fatal validation error was recorded
    Invalid,
    /// A limit or schema problem that is not a property of the document
    Failed(Error),
}

impl From<Error> for Halt {
    fn from(error: Error) -> Self {
        Halt::Failed(error)
    }
}

type Step<T = ()> = std::result::Result<T, Halt>;

/// Declaration resolved for a start tag
enum Resolved {
    Declared(ElementId),
    Synthesized(ElementDecl),
}

/// Target nodes of an identity constraint and the nodes their fields hit
#[derive(Default)]
struct Selection {
    targets: Vec<TargetNode>,
    field_nodes: Vec<NodeRef>,
}

/// Validates an instance document against a schema
pub struct ValidatingReader<'a> {
    document: &'a Document,
    options: ValidatorOptions,
    loader: Option<&'a dyn SchemaLoader>,
    evaluator: &'a dyn PathEvaluator,
    context: ValidationContext,
}

impl<'a> ValidatingReader<'a> {
    /// Create a reader for `document`
    pub fn new(schema: Arc<Schema>, document: &'a Document) -> Self {
        Self {
            document,
            options: ValidatorOptions::default(),
            loader: None,
            evaluator: &IdentityPathEvaluator,
            context: ValidationContext::new(schema),
        }
    }

    /// Set the options
    pub fn with_options(mut self, options: ValidatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Load schema location hints through `loader`
    ///
    /// Without a loader hints are ignored.
    pub fn with_loader(mut self, loader: &'a dyn SchemaLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Evaluate identity constraint paths with `evaluator`
    pub fn with_path_evaluator(mut self, evaluator: &'a dyn PathEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Validate the whole document
    ///
    /// Validation errors end up in the report; `Err` is returned for limit
    /// violations and broken schemas.
    pub fn read(mut self) -> Result<ValidationReport> {
        match self.run() {
            Ok(()) | Err(Halt::Invalid) => {}
            Err(Halt::Failed(error)) => return Err(error),
        }
        tracing::debug!(
            errors = self.context.error_count(),
            schema_loads = self.context.schema_loads,
            annotated = self.context.annotations.len(),
            "validation finished"
        );
        Ok(ValidationReport {
            errors: self.context.errors,
            annotations: self.context.annotations,
            schema: self.context.schema,
        })
    }

    fn run(&mut self) -> Step {
        let document = self.document;
        if document.root().is_none() {
            return Err(Halt::Failed(Error::Xml("document has no root element".into())));
        }
        for event in document.events() {
            match event {
                NodeEvent::Start(id) => self.start_element(id)?,
                NodeEvent::End(id) => self.end_element(id)?,
            }
        }
        self.check_key_references();
        self.check_id_references();
        Ok(())
    }

    // =========================================================================
    // Error reporting
    // =========================================================================

    fn error(&self, kind: ValidationErrorKind, node: NodeId, message: impl Into<String>) -> ValidationError {
        ValidationError::new(kind, message)
            .with_location(self.document.node(node).location.clone())
            .with_path(self.document.path(node))
    }

    /// Record a fatal error
    fn halt(&mut self, error: ValidationError) -> Halt {
        self.context.report(error);
        Halt::Invalid
    }

    fn fatal(&mut self, kind: ValidationErrorKind, node: NodeId, message: impl Into<String>) -> Halt {
        let error = self.error(kind, node, message);
        self.halt(error)
    }

    /// Record an error the run continues after
    fn record(&mut self, error: ValidationError) {
        self.context.report(error);
    }

    // =========================================================================
    // Start tags
    // =========================================================================

    fn start_element(&mut self, id: NodeId) -> Step {
        let document = self.document;
        let node = document.node(id);
        self.context.enter_level();
        self.options.limits.check_xml_depth(self.context.level)?;
        self.options.limits.check_attributes(node.attributes.len())?;

        if self.context.frames.last().map_or(false, |f| f.skip) {
            self.push_frame(id, None, None, true);
            return Ok(());
        }

        self.process_location_hints(id)?;
        self.context.use_namespace(node.name.namespace_str());

        let schema = Arc::clone(&self.context.schema);
        if !schema.has_element_declarations() {
            return Err(self.fatal(
                ValidationErrorKind::SchemaResolution,
                id,
                "No schema defined for validation.",
            ));
        }

        let parent = self.context.frames.last_mut().map(|frame| {
            let expected = frame
                .automaton
                .as_ref()
                .map(Automaton::possible_transitions)
                .unwrap_or_default();
            let label = frame
                .automaton
                .as_mut()
                .and_then(|a| proceed_child(a, &schema, &node.name));
            (label, expected)
        });

        let resolved = match parent {
            None => match schema.element_by_name(&node.name) {
                Some(element) => Resolved::Declared(element),
                None => match self.synthesized_declaration(id, &schema)? {
                    Some(decl) => Resolved::Synthesized(decl),
                    None => {
                        return Err(self.fatal(
                            ValidationErrorKind::SchemaResolution,
                            id,
                            format!("No definition for element {} available.", node.name),
                        ))
                    }
                },
            },
            Some((None, expected)) => {
                let error = self
                    .error(
                        ValidationErrorKind::ContentModel,
                        id,
                        format!("Element {} is not defined in this scope.", node.name),
                    )
                    .with_reason(format!("expected {}", expected_names(&schema, &expected)));
                return Err(self.halt(error));
            }
            Some((Some(ContentLabel::Element(element)), _)) => Resolved::Declared(element),
            Some((Some(ContentLabel::Wildcard(wildcard)), _)) => {
                let process_contents = schema.wildcard(wildcard).process_contents;
                match self.wildcard_declaration(id, &schema, process_contents)? {
                    Some(resolved) => resolved,
                    None => return Ok(()),
                }
            }
            Some((Some(ContentLabel::Any(process_contents)), _)) => {
                match self.wildcard_declaration(id, &schema, process_contents)? {
                    Some(resolved) => resolved,
                    None => return Ok(()),
                }
            }
        };

        let (decl, decl_id) = match resolved {
            Resolved::Declared(element) => (Cow::Borrowed(schema.element(element)), Some(element)),
            Resolved::Synthesized(decl) => (Cow::Owned(decl), None),
        };
        tracing::trace!(element = %node.name, declared = decl_id.is_some(), "start element");
        let automaton = self.validate_element(id, &schema, &decl, decl_id)?;
        self.push_frame(id, automaton, decl_id, false);
        Ok(())
    }

    fn push_frame(
        &mut self,
        node: NodeId,
        automaton: Option<Automaton<ContentLabel>>,
        declaration: Option<ElementId>,
        skip: bool,
    ) {
        self.context.frames.push(Frame {
            node,
            automaton,
            declaration,
            skip,
        });
    }

    /// Declaration of an element matched by a wildcard
    ///
    /// Returns None when the element was handled without a declaration: a
    /// skipped element, or a lax match continuing with anyType content.
    fn wildcard_declaration(
        &mut self,
        id: NodeId,
        schema: &Schema,
        process_contents: ProcessContents,
    ) -> Step<Option<Resolved>> {
        if process_contents == ProcessContents::Skip {
            self.push_frame(id, None, None, true);
            return Ok(None);
        }
        let document = self.document;
        let node = document.node(id);
        if let Some(element) = schema.element_by_name(&node.name) {
            return Ok(Some(Resolved::Declared(element)));
        }
        if let Some(decl) = self.synthesized_declaration(id, schema)? {
            return Ok(Some(Resolved::Synthesized(decl)));
        }
        if process_contents == ProcessContents::Strict {
            return Err(self.fatal(
                ValidationErrorKind::SchemaResolution,
                id,
                format!("Declaration for element {} does not exist.", node.name),
            ));
        }
        self.context
            .annotations
            .insert(NodeRef::Element(id), NodeAnnotation::new(None, TypeRef::AnyType));
        self.push_frame(id, Some(any_content_automaton(ProcessContents::Lax)), None, false);
        Ok(None)
    }

    /// Declaration built from `xsi:type` for an element without one
    fn synthesized_declaration(&mut self, id: NodeId, schema: &Schema) -> Step<Option<ElementDecl>> {
        let document = self.document;
        let node = document.node(id);
        let Some(value) = node.attribute(&XSI_TYPE) else {
            return Ok(None);
        };
        let type_ref = self.resolve_xsi_type(id, schema, value)?;
        let mut decl = ElementDecl::new(node.name.clone(), type_ref);
        decl.nillable = node.attribute(&XSI_NIL).is_some();
        Ok(Some(decl))
    }

    fn resolve_xsi_type(&mut self, id: NodeId, schema: &Schema, value: &str) -> Step<TypeRef> {
        let document = self.document;
        let node = document.node(id);
        let value = value.trim();
        let name = match split_qname(value) {
            Ok(_) => node.namespaces.resolve(value).ok(),
            Err(_) => None,
        };
        let Some(name) = name else {
            return Err(self.fatal(
                ValidationErrorKind::SchemaResolution,
                id,
                format!("'xsi:type' attribute contains invalid QName content: {}.", value),
            ));
        };
        match schema.type_by_name(&name) {
            Some(type_ref) => Ok(type_ref),
            None => Err(self.fatal(
                ValidationErrorKind::SchemaResolution,
                id,
                format!("Specified type {} is not known to the schema.", name),
            )),
        }
    }

    /// Validate an element against its declaration
    ///
    /// Returns the automaton for the element's content, if it has any.
    fn validate_element(
        &mut self,
        id: NodeId,
        schema: &Schema,
        decl: &ElementDecl,
        decl_id: Option<ElementId>,
    ) -> Step<Option<Automaton<ContentLabel>>> {
        let document = self.document;
        let node = document.node(id);
        if decl.is_abstract {
            return Err(self.fatal(
                ValidationErrorKind::ContentModel,
                id,
                format!("Element {} is declared as abstract.", decl.name),
            ));
        }

        let mut nilled = false;
        if let Some(nil) = node.attribute(&XSI_NIL) {
            if !decl.nillable {
                return Err(self.fatal(
                    ValidationErrorKind::Attribute,
                    id,
                    format!("Element {} is not nillable.", decl.name),
                ));
            }
            nilled = match boolean_to_rust(nil.trim()) {
                Ok(value) => value,
                Err(reason) => {
                    let error = self
                        .error(
                            ValidationErrorKind::Attribute,
                            id,
                            format!("Attribute xsi:nil contains invalid data: {}", nil),
                        )
                        .with_reason(reason);
                    return Err(self.halt(error));
                }
            };
            if nilled {
                if node.has_child_elements() || node.has_significant_text() {
                    return Err(self.fatal(
                        ValidationErrorKind::ContentModel,
                        id,
                        format!("Element {} contains content although it is nillable.", decl.name),
                    ));
                }
                if fixed_value(decl).is_some() {
                    return Err(self.fatal(
                        ValidationErrorKind::ContentModel,
                        id,
                        "Fixed value constraint not allowed if element is nillable.",
                    ));
                }
            }
        }

        let mut type_ref = decl.type_ref;
        if let Some(value) = node.attribute(&XSI_TYPE) {
            let explicit = self.resolve_xsi_type(id, schema, value)?;
            if decl.type_ref != TypeRef::AnyType
                && !schema.is_validly_substitutable(explicit, decl.type_ref, decl.disallowed_substitutions)
            {
                return Err(self.fatal(
                    ValidationErrorKind::SchemaResolution,
                    id,
                    format!(
                        "Specified type {} is not validly substitutable with element type {}.",
                        schema.type_name(explicit),
                        schema.type_name(decl.type_ref)
                    ),
                ));
            }
            type_ref = explicit;
        }

        if schema.is_abstract_type(type_ref) {
            return Err(self.fatal(
                ValidationErrorKind::SchemaResolution,
                id,
                format!("Complex type {} is not allowed to be abstract.", schema.type_name(type_ref)),
            ));
        }

        self.context.annotations.insert(
            NodeRef::Element(id),
            NodeAnnotation {
                declaration: decl_id.map(Declaration::Element),
                type_ref,
                bound_type: None,
                nilled,
            },
        );

        if type_ref.is_simple() {
            self.validate_simple_element(id, schema, decl, type_ref, nilled)?;
            Ok(None)
        } else {
            self.validate_complex_element(id, schema, decl, type_ref, nilled)
        }
    }

    fn validate_simple_element(
        &mut self,
        id: NodeId,
        schema: &Schema,
        decl: &ElementDecl,
        type_ref: TypeRef,
        nilled: bool,
    ) -> Step {
        let document = self.document;
        let node = document.node(id);
        if node.attributes.iter().any(|a| !is_xsi_builtin(&a.name)) {
            return Err(self.fatal(
                ValidationErrorKind::Attribute,
                id,
                format!("Element {} contains not allowed attributes.", decl.name),
            ));
        }
        if node.has_child_elements() {
            return Err(self.fatal(
                ValidationErrorKind::ContentModel,
                id,
                format!("Element {} contains not allowed child element.", decl.name),
            ));
        }
        if !nilled {
            self.check_simple_content(id, schema, decl, type_ref)?;
        }
        Ok(())
    }

    fn validate_complex_element(
        &mut self,
        id: NodeId,
        schema: &Schema,
        decl: &ElementDecl,
        type_ref: TypeRef,
        nilled: bool,
    ) -> Step<Option<Automaton<ContentLabel>>> {
        let document = self.document;
        let node = document.node(id);
        let mut automaton = None;

        if !nilled {
            match schema.content_variety(type_ref) {
                ContentVariety::Empty => {
                    if node.has_child_elements() || node.has_significant_text() {
                        return Err(self.fatal(
                            ValidationErrorKind::ContentModel,
                            id,
                            format!("Element {} contains not allowed child content.", decl.name),
                        ));
                    }
                }
                ContentVariety::Simple => {
                    if node.has_child_elements() {
                        return Err(self.fatal(
                            ValidationErrorKind::ContentModel,
                            id,
                            format!("Element {} contains not allowed child element.", decl.name),
                        ));
                    }
                    let simple = schema
                        .simple_content_type(type_ref)
                        .unwrap_or_else(TypeRef::any_simple_type);
                    self.check_simple_content(id, schema, decl, simple)?;
                }
                variety @ (ContentVariety::ElementOnly | ContentVariety::Mixed) => {
                    if variety == ContentVariety::ElementOnly && node.has_significant_text() {
                        return Err(self.fatal(
                            ValidationErrorKind::ContentModel,
                            id,
                            format!("Element {} contains not allowed text content.", decl.name),
                        ));
                    }
                    automaton = Some(match type_ref {
                        TypeRef::Complex(complex) => {
                            schema.content_automaton(complex, &self.options.limits)?
                        }
                        _ => any_content_automaton(ProcessContents::Lax),
                    });

                    if let (ContentVariety::Mixed, Some(fixed)) = (variety, fixed_value(decl)) {
                        if node.has_child_elements() {
                            return Err(self.fatal(
                                ValidationErrorKind::ContentModel,
                                id,
                                format!(
                                    "Element {} cannot contain other elements, as it has fixed content.",
                                    decl.name
                                ),
                            ));
                        }
                        let actual = if node.has_text_child {
                            node.text.as_str()
                        } else {
                            fixed.value.as_str()
                        };
                        if actual != fixed.value {
                            return Err(self.fatal(
                                ValidationErrorKind::Value,
                                id,
                                format!(
                                    "Content of element {} does not match defined value constraint.",
                                    decl.name
                                ),
                            ));
                        }
                    }
                }
            }
        }

        self.validate_attributes(id, schema, decl, type_ref)?;
        Ok(automaton)
    }

    /// Check the text of an element with simple content, or its default
    fn check_simple_content(
        &mut self,
        id: NodeId,
        schema: &Schema,
        decl: &ElementDecl,
        simple_type: TypeRef,
    ) -> Step {
        let document = self.document;
        let node = document.node(id);
        let facets = schema.merged_facets(simple_type);
        let raw = if node.has_text_child {
            node.text.as_str()
        } else {
            decl.value_constraint.as_ref().map_or("", |v| v.value.as_str())
        };
        let actual = normalized_value(raw, &facets);
        let checker = TypeChecker::new(schema, &node.namespaces);

        let bound = match checker.is_valid_string(&actual, simple_type) {
            Ok(bound) => bound,
            Err(e) => {
                return Err(self.fatal(
                    ValidationErrorKind::Value,
                    id,
                    format!(
                        "Content of element {} does not match its type definition: {}.",
                        decl.name, e
                    ),
                ))
            }
        };

        if let Some(fixed) = fixed_value(decl) {
            if node.has_text_child && !checker.values_are_equal(&actual, &fixed.value, simple_type) {
                return Err(self.fatal(
                    ValidationErrorKind::Value,
                    id,
                    format!(
                        "Content of element {} does not match defined value constraint.",
                        decl.name
                    ),
                ));
            }
        }

        let node_ref = NodeRef::Element(id);
        self.context
            .annotations
            .update(node_ref, |a| a.bound_type = Some(bound));
        self.record_ids(node_ref, &actual, bound, &checker);
        Ok(())
    }

    fn validate_attributes(
        &mut self,
        id: NodeId,
        schema: &Schema,
        decl: &ElementDecl,
        type_ref: TypeRef,
    ) -> Step {
        let document = self.document;
        let node = document.node(id);
        let (uses, wildcard) = match type_ref {
            TypeRef::Complex(complex) => (
                schema.effective_attribute_uses(complex),
                schema.effective_attribute_wildcard(complex).cloned(),
            ),
            _ => (Vec::new(), Some(Wildcard::any(ProcessContents::Lax))),
        };

        for attribute_use in &uses {
            let name = &schema.attribute(attribute_use.attribute).name;
            if attribute_use.use_mode == AttributeUseMode::Required && node.attribute(name).is_none() {
                return Err(self.fatal(
                    ValidationErrorKind::Attribute,
                    id,
                    format!("Element {} is missing required attribute {}.", decl.name, name),
                ));
            }
        }

        let checker = TypeChecker::new(schema, &node.namespaces);
        let is_id = |attribute: AttributeId| {
            checker.id_kind(schema.attribute(attribute).type_ref) == Some(IdKind::Id)
        };
        let mut has_id = uses.iter().any(|u| {
            u.use_mode != AttributeUseMode::Prohibited
                && node.attribute(&schema.attribute(u.attribute).name).is_some()
                && is_id(u.attribute)
        });

        for (index, attribute) in node.attributes.iter().enumerate() {
            if is_xsi_builtin(&attribute.name) {
                continue;
            }

            let declared = uses.iter().find(|u| {
                u.use_mode != AttributeUseMode::Prohibited
                    && schema.attribute(u.attribute).name == attribute.name
            });
            if let Some(attribute_use) = declared {
                let constraint = attribute_use
                    .value_constraint
                    .as_ref()
                    .or(schema.attribute(attribute_use.attribute).value_constraint.as_ref());
                self.validate_attribute(id, index, schema, attribute_use.attribute, constraint)?;
                continue;
            }

            let Some(wildcard) = &wildcard else {
                return Err(self.fatal(
                    ValidationErrorKind::Attribute,
                    id,
                    format!("Element {} contains unknown attribute {}.", decl.name, attribute.name),
                ));
            };
            if !wildcard.matches(&attribute.name) {
                return Err(self.fatal(
                    ValidationErrorKind::Attribute,
                    id,
                    format!("Attribute {} does not match the attribute wildcard.", attribute.name),
                ));
            }
            if wildcard.process_contents == ProcessContents::Skip {
                continue;
            }
            match schema.attribute_by_name(&attribute.name) {
                None if wildcard.process_contents == ProcessContents::Strict => {
                    return Err(self.fatal(
                        ValidationErrorKind::SchemaResolution,
                        id,
                        format!("Declaration for attribute {} does not exist.", attribute.name),
                    ));
                }
                None => {}
                Some(global) => {
                    if is_id(global) {
                        if has_id {
                            return Err(self.fatal(
                                ValidationErrorKind::Attribute,
                                id,
                                format!("Element {} contains two attributes of type ID.", decl.name),
                            ));
                        }
                        has_id = true;
                    }
                    let constraint = schema.attribute(global).value_constraint.as_ref();
                    self.validate_attribute(id, index, schema, global, constraint)?;
                }
            }
        }
        Ok(())
    }

    fn validate_attribute(
        &mut self,
        id: NodeId,
        index: usize,
        schema: &Schema,
        declaration: AttributeId,
        constraint: Option<&ValueConstraint>,
    ) -> Step {
        let document = self.document;
        let node = document.node(id);
        let attribute = &node.attributes[index];
        let type_ref = schema.attribute(declaration).type_ref;
        let facets = schema.merged_facets(type_ref);
        let actual = normalized_value(&attribute.value, &facets);
        let checker = TypeChecker::new(schema, &node.namespaces);

        let bound = match checker.is_valid_string(&actual, type_ref) {
            Ok(bound) => bound,
            Err(e) => {
                return Err(self.fatal(
                    ValidationErrorKind::Value,
                    id,
                    format!(
                        "Content of attribute {} does not match its type definition: {}.",
                        attribute.name, e
                    ),
                ))
            }
        };
        if let Some(fixed) = constraint.filter(|c| c.is_fixed()) {
            if !checker.values_are_equal(&actual, &fixed.value, type_ref) {
                return Err(self.fatal(
                    ValidationErrorKind::Value,
                    id,
                    format!(
                        "Content of attribute {} does not match defined value constraint.",
                        attribute.name
                    ),
                ));
            }
        }

        let node_ref = NodeRef::Attribute(id, index);
        self.record_ids(node_ref, &actual, bound, &checker);
        self.context.annotations.insert(
            node_ref,
            NodeAnnotation {
                declaration: Some(Declaration::Attribute(declaration)),
                type_ref,
                bound_type: Some(bound),
                nilled: false,
            },
        );
        Ok(())
    }

    fn record_ids(&mut self, node: NodeRef, value: &str, bound: TypeRef, checker: &TypeChecker<'_>) {
        match checker.id_kind(bound) {
            Some(IdKind::Id) => {
                if !self.context.register_id(value, node) {
                    let error = self.error(
                        ValidationErrorKind::IdReference,
                        node.element(),
                        format!("ID value '{}' is not unique.", value),
                    );
                    self.record(error);
                }
            }
            Some(IdKind::IdRef) => self.context.add_idref(value, node),
            Some(IdKind::IdRefs) => {
                for idref in value.split_whitespace() {
                    self.context.add_idref(idref, node);
                }
            }
            None => {}
        }
    }

    // =========================================================================
    // Schema location hints
    // =========================================================================

    fn process_location_hints(&mut self, id: NodeId) -> Step {
        let document = self.document;
        let node = document.node(id);

        if let Some(value) = node.attribute(&XSI_SCHEMA_LOCATION) {
            let tokens: Vec<&str> = value.split_whitespace().collect();
            if tokens.len() % 2 != 0 {
                let error = self
                    .error(
                        ValidationErrorKind::SchemaResolution,
                        id,
                        "xsi:schemaLocation contains invalid data.",
                    )
                    .with_reason(format!("odd number of tokens in '{}'", value));
                return Err(self.halt(error));
            }
            for pair in tokens.chunks(2) {
                let (namespace, location) = (pair[0], pair[1]);
                if !self.context.first_visit(&format!("{} {}", namespace, location)) {
                    continue;
                }
                if self.context.is_namespace_used(namespace) {
                    return Err(self.fatal(
                        ValidationErrorKind::SchemaResolution,
                        id,
                        format!(
                            "xsi:schemaLocation namespace {} has already appeared earlier in the instance document.",
                            namespace
                        ),
                    ));
                }
                self.load_schema(id, location)?;
            }
        }

        if let Some(location) = node.attribute(&XSI_NO_NAMESPACE_SCHEMA_LOCATION) {
            let location = location.trim();
            if self.context.first_visit(location) {
                if self.context.is_namespace_used("") {
                    return Err(self.fatal(
                        ValidationErrorKind::SchemaResolution,
                        id,
                        "xsi:noNamespaceSchemaLocation cannot appear after the first no-namespace element or attribute.",
                    ));
                }
                self.load_schema(id, location)?;
            }
        }
        Ok(())
    }

    fn load_schema(&mut self, id: NodeId, hint: &str) -> Step {
        let loader = match self.loader {
            Some(loader) if self.options.use_location_hints => loader,
            _ => {
                tracing::trace!(hint, "ignoring schema location hint");
                return Ok(());
            }
        };
        self.options
            .limits
            .check_schema_loads(self.context.schema_loads + 1)?;

        let base = self
            .options
            .base_uri
            .as_ref()
            .or(self.document.base_uri.as_ref());
        match Location::resolve(hint, base).and_then(|location| loader.load(&location)) {
            Ok(incoming) => {
                self.context.merge_schema(&incoming);
                tracing::debug!(hint, loads = self.context.schema_loads, "merged schema from location hint");
                Ok(())
            }
            Err(e) => {
                let error = self
                    .error(
                        ValidationErrorKind::SchemaResolution,
                        id,
                        "Loaded schema file is invalid.",
                    )
                    .with_reason(format!("{}: {}", hint, e));
                Err(self.halt(error))
            }
        }
    }

    // =========================================================================
    // End tags and identity constraints
    // =========================================================================

    fn end_element(&mut self, id: NodeId) -> Step {
        let Some(frame) = self.context.frames.pop() else {
            return Ok(());
        };
        self.context.exit_level();
        if frame.skip {
            return Ok(());
        }

        let schema = Arc::clone(&self.context.schema);
        if let Some(automaton) = &frame.automaton {
            if !automaton.in_end_state() {
                let name = &self.document.node(id).name;
                let error = self
                    .error(
                        ValidationErrorKind::ContentModel,
                        id,
                        format!("Element {} is missing child element.", name),
                    )
                    .with_reason(format!(
                        "expected {}",
                        expected_names(&schema, &automaton.possible_transitions())
                    ));
                return Err(self.halt(error));
            }
        }

        if let Some(declaration) = frame.declaration {
            self.check_identity_constraints(frame.node, &schema, declaration)?;
        }
        Ok(())
    }

    /// Unique and key constraints first, keyrefs are kept for the end
    fn check_identity_constraints(&mut self, scope: NodeId, schema: &Schema, element: ElementId) -> Step {
        let constraints = &schema.element(element).identity_constraints;
        for &constraint in constraints {
            if schema.identity_constraint(constraint).kind != IdentityConstraintKind::KeyRef {
                self.check_unique_or_key(scope, schema, constraint)?;
            }
        }
        for &constraint in constraints {
            if schema.identity_constraint(constraint).kind == IdentityConstraintKind::KeyRef {
                if let Some(selection) = self.select_targets(scope, schema, constraint)? {
                    self.context.pending_keyrefs.push(PendingKeyRef {
                        constraint,
                        scope,
                        targets: selection
                            .targets
                            .into_iter()
                            .filter(TargetNode::is_complete)
                            .collect(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_unique_or_key(&mut self, scope: NodeId, schema: &Schema, id: IdentityConstraintId) -> Step {
        let constraint = schema.identity_constraint(id);
        let Some(selection) = self.select_targets(scope, schema, id)? else {
            return Ok(());
        };
        let is_key = constraint.kind == IdentityConstraintKind::Key;

        if is_key {
            if let Some(target) = selection.targets.iter().find(|t| !t.is_complete()) {
                let error = self
                    .error(
                        ValidationErrorKind::IdentityConstraint,
                        target.node,
                        format!("Key constraint {} contains absent fields.", constraint.name),
                    )
                    .with_reason(target.describe());
                self.record(error);
                return Ok(());
            }
        }

        let qualified: Vec<TargetNode> = selection
            .targets
            .into_iter()
            .filter(TargetNode::is_complete)
            .collect();
        let duplicate = qualified
            .iter()
            .enumerate()
            .find_map(|(i, a)| qualified[i + 1..].iter().find(|b| a.same_tuple(b)));
        if let Some(duplicate) = duplicate {
            let error = self
                .error(
                    ValidationErrorKind::IdentityConstraint,
                    duplicate.node,
                    format!("Non-unique value found for constraint {}.", constraint.name),
                )
                .with_reason(duplicate.describe());
            self.record(error);
        }

        if is_key {
            let nillable = selection.field_nodes.iter().find_map(|node| match node {
                NodeRef::Element(element) => self
                    .context
                    .annotations
                    .element_declaration(*element)
                    .filter(|decl| schema.element(*decl).nillable)
                    .map(|decl| (*element, decl)),
                NodeRef::Attribute(..) => None,
            });
            if let Some((element, decl)) = nillable {
                let error = self.error(
                    ValidationErrorKind::IdentityConstraint,
                    element,
                    format!(
                        "Key constraint {} contains references nillable element {}.",
                        constraint.name,
                        schema.element(decl).name
                    ),
                );
                self.record(error);
            }
        }

        self.context.key_tables.push(KeyTable {
            constraint: id,
            scope,
            targets: qualified,
        });
        Ok(())
    }

    /// Evaluate selector and fields; None when a field error was recorded
    fn select_targets(
        &mut self,
        scope: NodeId,
        schema: &Schema,
        id: IdentityConstraintId,
    ) -> Step<Option<Selection>> {
        let constraint = schema.identity_constraint(id);
        let namespaces = constraint.namespace_context();
        let document = self.document;
        let selected = self
            .evaluator
            .select(document, scope, &constraint.selector, &namespaces, false)?;

        let mut selection = Selection::default();
        for target in selected {
            let NodeRef::Element(target) = target else {
                continue;
            };
            let mut fields = Vec::with_capacity(constraint.fields.len());
            for field in &constraint.fields {
                let found = self
                    .evaluator
                    .select(document, target, field, &namespaces, true)?;
                match found.as_slice() {
                    [] => fields.push(None),
                    [node] => match self.field_value(schema, *node) {
                        Some(value) => {
                            fields.push(Some(value));
                            selection.field_nodes.push(*node);
                        }
                        None => {
                            let error = self.error(
                                ValidationErrorKind::IdentityConstraint,
                                target,
                                format!("Field {} has no simple type.", field),
                            );
                            self.record(error);
                            return Ok(None);
                        }
                    },
                    _ => {
                        let error = self.error(
                            ValidationErrorKind::IdentityConstraint,
                            target,
                            format!("More than one value found for field {}.", field),
                        );
                        self.record(error);
                        return Ok(None);
                    }
                }
            }
            selection.targets.push(TargetNode {
                node: target,
                fields,
            });
        }
        Ok(Some(selection))
    }

    /// Typed value of a field node, None if its type is not simple
    ///
    /// Nodes that were never validated count as xs:anySimpleType.
    fn field_value(&self, schema: &Schema, node: NodeRef) -> Option<FieldValue> {
        let simple = match self.context.annotations.get(node) {
            Some(annotation) => annotation
                .bound_type
                .or_else(|| schema.simple_content_type(annotation.type_ref))?,
            None => TypeRef::any_simple_type(),
        };
        let element = self.document.node(node.element());
        let facets = schema.merged_facets(simple);
        let text = normalized_value(&self.document.string_value(node), &facets);
        let value = TypeChecker::new(schema, &element.namespaces)
            .typed_value(&text, simple)
            .map(|(_, value)| value)
            .unwrap_or_else(|_| XsdValue::String(text.clone()));
        Some(FieldValue {
            text,
            type_ref: simple,
            value,
        })
    }

    // =========================================================================
    // Document end
    // =========================================================================

    /// Resolve keyrefs against every table recorded for the referenced key
    fn check_key_references(&mut self) {
        let schema = Arc::clone(&self.context.schema);
        let pending = std::mem::take(&mut self.context.pending_keyrefs);

        for keyref in pending {
            let constraint = schema.identity_constraint(keyref.constraint);
            let referenced = constraint
                .refer
                .as_ref()
                .and_then(|name| schema.identity_constraint_by_name(name));
            let Some(referenced) = referenced else {
                let error = self.error(
                    ValidationErrorKind::IdentityConstraint,
                    keyref.scope,
                    format!("Key reference {} refers to an unknown constraint.", constraint.name),
                );
                self.record(error);
                continue;
            };

            for target in &keyref.targets {
                let found = self
                    .context
                    .key_tables
                    .iter()
                    .filter(|table| table.constraint == referenced)
                    .any(|table| table.contains(target));
                if !found {
                    let error = self.error(
                        ValidationErrorKind::IdentityConstraint,
                        target.node,
                        format!(
                            "No referenced value found for key reference {}: {}.",
                            constraint.name,
                            target.describe()
                        ),
                    );
                    self.record(error);
                }
            }
        }
    }

    fn check_id_references(&mut self) {
        for (value, node) in self.context.unresolved_idrefs() {
            let error = self.error(
                ValidationErrorKind::IdReference,
                node.element(),
                format!("There is one IDREF value with no corresponding ID: {}.", value),
            );
            self.record(error);
        }
    }
}

fn fixed_value(decl: &ElementDecl) -> Option<&ValueConstraint> {
    decl.value_constraint.as_ref().filter(|v| v.is_fixed())
}

fn expected_names(schema: &Schema, labels: &[ContentLabel]) -> String {
    let mut names: Vec<String> = labels.iter().map(|l| label_name(schema, l)).collect();
    names.sort();
    names.dedup();
    if names.is_empty() {
        "no further elements".to_string()
    } else {
        names.join(", ")
    }
}

/// Validate `document` against `schema` with default options
pub fn validate(schema: Arc<Schema>, document: &Document) -> Result<ValidationReport> {
    ValidatingReader::new(schema, document).read()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::attributes::{AttributeDecl, AttributeUse};
    use crate::validators::builtins::BuiltinType;
    use crate::validators::complex_types::{ComplexTypeDef, ContentType, DerivationMethod};
    use crate::validators::particles::{ModelGroup, Particle};
    use crate::validators::schemas::SchemaBuilder;
    use pretty_assertions::assert_eq;

    const NS: &str = "urn:test";

    /// `root` holds `item*`; items have a string `name` attribute and an
    /// optional ID `id`
    fn schema() -> Arc<Schema> {
        let mut b = SchemaBuilder::new(Some(NS));
        let name = b.add_attribute(AttributeDecl::new(QName::local("name"), BuiltinType::String.into()));
        let ident = b.add_attribute(AttributeDecl::new(QName::local("id"), BuiltinType::Id.into()));
        let item_type = b.add_complex_type(
            ComplexTypeDef::new(ContentType::empty())
                .with_attribute(AttributeUse::required(name))
                .with_attribute(AttributeUse::optional(ident)),
        );
        let item = b.add_element(ElementDecl::new(b.qname("item"), item_type));
        let group = b.add_model_group(ModelGroup::sequence(vec![
            Particle::element(item).with_occurs(0, None),
        ]));
        let root_type = b.add_complex_type(
            ComplexTypeDef::new(ContentType::element_only(Particle::group(group)))
                .named(b.qname("rootType")),
        );
        b.add_complex_type(
            ComplexTypeDef::new(ContentType::element_only(Particle::group(group)))
                .named(b.qname("derivedType"))
                .derived_from(root_type, DerivationMethod::Restriction),
        );
        b.add_global_element(ElementDecl::new(b.qname("root"), root_type).nillable());
        b.add_global_element(ElementDecl::new(b.qname("count"), BuiltinType::Int.into()));
        Arc::new(b.build().unwrap())
    }

    fn run(xml: &str) -> ValidationReport {
        let doc = Document::from_string(xml).unwrap();
        validate(schema(), &doc).unwrap()
    }

    fn messages(report: &ValidationReport) -> Vec<String> {
        report.errors.iter().map(|e| e.message.clone()).collect()
    }

    #[test]
    fn test_valid_document_is_annotated() {
        let report = run(r#"<root xmlns="urn:test"><item name="a" id="x"/><item name="b"/></root>"#);
        assert!(report.is_valid(), "{:?}", report.errors);
        let item_type = report.annotations.element_type(NodeId(1)).unwrap();
        assert!(item_type.is_complex());
        let id_attribute = report.annotations.get(NodeRef::Attribute(NodeId(1), 1)).unwrap();
        assert_eq!(id_attribute.bound_type, Some(TypeRef::Builtin(BuiltinType::Id)));
    }

    #[test]
    fn test_unknown_root() {
        let report = run(r#"<other xmlns="urn:test"/>"#);
        assert_eq!(
            messages(&report),
            vec!["No definition for element {urn:test}other available.".to_string()]
        );
        assert_eq!(report.errors[0].kind, ValidationErrorKind::SchemaResolution);
    }

    #[test]
    fn test_unexpected_child_stops_the_run() {
        let report = run(r#"<root xmlns="urn:test"><count>1</count><item/></root>"#);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ValidationErrorKind::ContentModel);
        assert_eq!(report.errors[0].path.as_deref(), Some("/root/count"));
        assert!(report.errors[0].reason.as_deref().unwrap().contains("{urn:test}item"));
    }

    #[test]
    fn test_attribute_errors() {
        let report = run(r#"<root xmlns="urn:test"><item/></root>"#);
        assert!(messages(&report)[0].contains("missing required attribute name"));

        let report = run(r#"<root xmlns="urn:test"><item name="a" extra="1"/></root>"#);
        assert!(messages(&report)[0].contains("unknown attribute extra"));
    }

    #[test]
    fn test_simple_content_value() {
        assert!(run(r#"<count xmlns="urn:test"> 42 </count>"#).is_valid());
        let report = run(r#"<count xmlns="urn:test">many</count>"#);
        assert_eq!(report.errors[0].kind, ValidationErrorKind::Value);
    }

    #[test]
    fn test_nil() {
        let xsi = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;
        let valid = format!(r#"<root xmlns="urn:test" {} xsi:nil="true"/>"#, xsi);
        let report = run(&valid);
        assert!(report.is_valid());
        assert!(report.annotations.get(NodeRef::Element(NodeId(0))).unwrap().nilled);

        let not_nillable = format!(r#"<count xmlns="urn:test" {} xsi:nil="true"/>"#, xsi);
        assert!(messages(&run(&not_nillable))[0].contains("is not nillable"));
    }

    #[test]
    fn test_xsi_type_substitution() {
        let xsi = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;
        let xml = format!(r#"<root xmlns="urn:test" xmlns:t="urn:test" {} xsi:type="t:derivedType"/>"#, xsi);
        let report = run(&xml);
        assert!(report.is_valid(), "{:?}", report.errors);

        let xml = format!(r#"<root xmlns="urn:test" {} xsi:type="missing"/>"#, xsi);
        assert!(messages(&run(&xml))[0].contains("is not known to the schema"));
    }

    #[test]
    fn test_duplicate_id_is_not_fatal() {
        let report = run(r#"<root xmlns="urn:test"><item name="a" id="x"/><item name="b" id="x"/></root>"#);
        assert_eq!(messages(&report), vec!["ID value 'x' is not unique.".to_string()]);
        assert_eq!(report.errors[0].kind, ValidationErrorKind::IdReference);
    }

    #[test]
    fn test_empty_schema() {
        let doc = Document::from_string("<root/>").unwrap();
        let report = validate(Arc::new(Schema::new()), &doc).unwrap();
        assert_eq!(messages(&report), vec!["No schema defined for validation.".to_string()]);
    }

    #[test]
    fn test_depth_limit_is_an_error() {
        let doc = Document::from_string(r#"<root xmlns="urn:test"><item name="a"/></root>"#).unwrap();
        let mut limits = Limits::default();
        limits.max_xml_depth = 1;
        let result = ValidatingReader::new(schema(), &doc)
            .with_options(ValidatorOptions::new().with_limits(limits))
            .read();
        assert!(matches!(result, Err(Error::LimitExceeded(_))));
    }
}
