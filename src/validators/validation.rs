//! Per-run validation state
//!
//! Everything a validation run learns about an instance document lives in a
//! [`ValidationContext`], never on the shared [`Schema`]: collected errors,
//! node annotations, the ID registry, pending IDREFs, the stack of open
//! elements with their content automata, identity constraint tables and the
//! schema location hints already processed.

use crate::documents::{NodeId, NodeRef};
use crate::error::ValidationError;
use crate::validators::automaton::Automaton;
use crate::validators::identities::{KeyTable, TargetNode};
use crate::validators::models::ContentLabel;
use crate::validators::schemas::{AttributeId, ElementId, IdentityConstraintId, Schema, TypeRef};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Schema declaration a node was validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Declaration {
    /// Element declaration
    Element(ElementId),
    /// Attribute declaration
    Attribute(AttributeId),
}

/// What validation assigned to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAnnotation {
    /// Declaration, None for declarations synthesized from `xsi:type` and
    /// for lax wildcard matches without a declaration
    pub declaration: Option<Declaration>,
    /// Effective type
    pub type_ref: TypeRef,
    /// Type the simple value was bound to, the accepting member for unions
    pub bound_type: Option<TypeRef>,
    /// Whether the element was nilled with `xsi:nil="true"`
    pub nilled: bool,
}

impl NodeAnnotation {
    /// Annotation without a bound simple value
    pub fn new(declaration: Option<Declaration>, type_ref: TypeRef) -> Self {
        Self {
            declaration,
            type_ref,
            bound_type: None,
            nilled: false,
        }
    }
}

/// Annotations of validated nodes
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    nodes: HashMap<NodeRef, NodeAnnotation>,
}

impl Annotations {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotation of a node
    pub fn get(&self, node: NodeRef) -> Option<&NodeAnnotation> {
        self.nodes.get(&node)
    }

    /// Effective type of an element
    pub fn element_type(&self, node: NodeId) -> Option<TypeRef> {
        self.get(NodeRef::Element(node)).map(|a| a.type_ref)
    }

    /// Declaration an element was validated against
    pub fn element_declaration(&self, node: NodeId) -> Option<ElementId> {
        match self.get(NodeRef::Element(node))?.declaration? {
            Declaration::Element(id) => Some(id),
            Declaration::Attribute(_) => None,
        }
    }

    /// Iterate over annotated nodes
    pub fn iter(&self) -> impl Iterator<Item = (&NodeRef, &NodeAnnotation)> {
        self.nodes.iter()
    }

    /// Number of annotated nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is annotated
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn insert(&mut self, node: NodeRef, annotation: NodeAnnotation) {
        self.nodes.insert(node, annotation);
    }

    pub(crate) fn update(&mut self, node: NodeRef, f: impl FnOnce(&mut NodeAnnotation)) {
        if let Some(annotation) = self.nodes.get_mut(&node) {
            f(annotation);
        }
    }
}

/// An open element
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub node: NodeId,
    /// Content automaton for element-only, mixed and anyType content
    pub automaton: Option<Automaton<ContentLabel>>,
    /// Declaration whose identity constraints apply when the element closes
    pub declaration: Option<ElementId>,
    /// Content is not validated
    pub skip: bool,
}

/// A keyref evaluated once the whole document is known
#[derive(Debug, Clone)]
pub(crate) struct PendingKeyRef {
    pub constraint: IdentityConstraintId,
    pub scope: NodeId,
    pub targets: Vec<TargetNode>,
}

/// Validation state of a single run
#[derive(Debug)]
pub struct ValidationContext {
    /// Active schema, replaced when a location hint merges another one
    pub schema: Arc<Schema>,
    /// Collected errors
    pub errors: Vec<ValidationError>,
    /// Node annotations
    pub annotations: Annotations,
    /// Current nesting level
    pub level: usize,
    pub(crate) ids: IndexMap<String, NodeRef>,
    pub(crate) idrefs: Vec<(String, NodeRef)>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) key_tables: Vec<KeyTable>,
    pub(crate) pending_keyrefs: Vec<PendingKeyRef>,
    processed_locations: HashSet<String>,
    used_namespaces: HashSet<String>,
    pub(crate) schema_loads: usize,
}

impl ValidationContext {
    /// Create a context validating against `schema`
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            errors: Vec::new(),
            annotations: Annotations::new(),
            level: 0,
            ids: IndexMap::new(),
            idrefs: Vec::new(),
            frames: Vec::new(),
            key_tables: Vec::new(),
            pending_keyrefs: Vec::new(),
            processed_locations: HashSet::new(),
            used_namespaces: HashSet::new(),
            schema_loads: 0,
        }
    }

    /// Enter a new level
    pub fn enter_level(&mut self) {
        self.level += 1;
    }

    /// Exit current level
    pub fn exit_level(&mut self) {
        if self.level > 0 {
            self.level -= 1;
        }
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Get the error count
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Record an error, returning whether it stops the run
    pub fn report(&mut self, error: ValidationError) -> bool {
        let fatal = error.kind.is_fatal();
        tracing::trace!(kind = %error.kind, fatal, message = %error.message, "validation error");
        self.errors.push(error);
        fatal
    }

    /// Register an ID value; false if the value is already taken
    pub fn register_id(&mut self, id: &str, node: NodeRef) -> bool {
        if self.ids.contains_key(id) {
            return false;
        }
        self.ids.insert(id.to_string(), node);
        true
    }

    /// Remember an IDREF value for the final cross-check
    pub fn add_idref(&mut self, idref: &str, node: NodeRef) {
        self.idrefs.push((idref.to_string(), node));
    }

    /// IDREF values without a matching ID, sorted, each with its first referrer
    pub fn unresolved_idrefs(&self) -> Vec<(String, NodeRef)> {
        let mut unresolved: BTreeMap<&str, NodeRef> = BTreeMap::new();
        for (value, node) in &self.idrefs {
            if !self.ids.contains_key(value) {
                unresolved.entry(value.as_str()).or_insert(*node);
            }
        }
        unresolved
            .into_iter()
            .map(|(value, node)| (value.to_string(), node))
            .collect()
    }

    /// Mark a schema location identifier processed; false if it already was
    pub fn first_visit(&mut self, identifier: &str) -> bool {
        self.processed_locations.insert(identifier.to_string())
    }

    /// Record that the document used a namespace, "" for no namespace
    pub fn use_namespace(&mut self, namespace: &str) {
        if !self.used_namespaces.contains(namespace) {
            self.used_namespaces.insert(namespace.to_string());
        }
    }

    /// Whether the document already used a namespace
    pub fn is_namespace_used(&self, namespace: &str) -> bool {
        self.used_namespaces.contains(namespace)
    }

    /// Fold a loaded schema into the active one
    pub fn merge_schema(&mut self, incoming: &Schema) {
        self.schema = Arc::new(self.schema.merge(incoming));
        self.schema_loads += 1;
    }
}
