//! Schema Registry: memoizes declared types by canonical identity.
//!
//! Every declared type (object, enum, polymorphic base) gets one slot in an
//! arena, keyed by its canonical identity. A slot is created `Pending` before its
//! body is resolved, so a recursive revisit finds the pending slot and returns a
//! reference to it instead of recursing again. Primitives, arrays and maps are
//! structural and never occupy a slot.
//!
//! While collecting, every use of a declared type is a [`SchemaNode::Reference`]
//! carrying the identity key. [`SchemaRegistry::finish`] decides which slots become
//! named components and produces a [`ComponentTable`] that rewrites those
//! references into component names or inlines the slot body.

use crate::catalog::{DeclBody, TypeSource};
use crate::error::{AssemblyError, UnsupportedTypeError};
use crate::schema::SchemaNode;
use crate::type_expr::TypeExpr;
use crate::type_extractor::{display_name, Classified, TypeModelExtractor};
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// How many instantiations of one generic declaration may be pending at once.
/// Deeper nesting means each level instantiates the type with a larger argument.
const MAX_INSTANTIATION_DEPTH: usize = 16;

#[derive(Debug)]
enum SlotState {
    Pending,
    Resolved(SchemaNode),
    Failed(UnsupportedTypeError),
}

#[derive(Debug)]
struct Slot {
    key: String,
    state: SlotState,
    visits: usize,
    /// Revisited while pending
    cyclic: bool,
}

/// Arena of declared types seen during one generation pass.
///
/// Slots are created in first-seen order and that order is kept through to the
/// component table, which makes the output deterministic for a fixed route order.
pub struct SchemaRegistry<'a> {
    extractor: TypeModelExtractor<'a>,
    /// Promote single-use object types too
    promote_all: bool,
    slots: Vec<Slot>,
    /// Identity key → slot id
    index: HashMap<String, usize>,
    /// Declaration name → instantiations currently pending
    pending: HashMap<String, usize>,
}

impl<'a> SchemaRegistry<'a> {
    /// `promote_all` emits every declared type as a component, even when used once.
    pub fn new(source: &'a dyn TypeSource, promote_all: bool) -> Self {
        Self {
            extractor: TypeModelExtractor::new(source),
            promote_all,
            slots: Vec::new(),
            index: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Resolve `expr`, registering every declared type it reaches.
    pub fn intern(&mut self, expr: &TypeExpr) -> Result<SchemaNode, UnsupportedTypeError> {
        match self.extractor.classify(expr)? {
            Classified::Primitive(node) => Ok(node),
            Classified::Array(element) => Ok(SchemaNode::ArrayOf(Box::new(self.intern(&element)?))),
            Classified::Map(value) => Ok(SchemaNode::MapOf(Box::new(self.intern(&value)?))),
            // Nullability is carried by the enclosing `required` flag
            Classified::Optional(inner) => self.intern(&inner),
            Classified::Declared(instance) => {
                if let Some(&id) = self.index.get(&instance.key) {
                    return self.revisit(id);
                }

                let decl_name = instance.decl.name.clone();
                let depth = self.pending.get(&decl_name).copied().unwrap_or(0);
                if depth >= MAX_INSTANTIATION_DEPTH {
                    debug!("{} nested {} levels deep", decl_name, depth);
                    return Err(UnsupportedTypeError::new(
                        instance.key,
                        "generic instantiation does not terminate",
                    ));
                }

                let id = self.slots.len();
                debug!("Registering slot {} for {}", id, instance.key);
                self.slots.push(Slot {
                    key: instance.key.clone(),
                    state: SlotState::Pending,
                    visits: 1,
                    cyclic: false,
                });
                self.index.insert(instance.key.clone(), id);
                *self.pending.entry(decl_name.clone()).or_insert(0) += 1;

                let extractor = self.extractor;
                let result =
                    extractor.resolve_body(&instance, &mut |e: &TypeExpr| self.intern(e));
                if let Some(count) = self.pending.get_mut(&decl_name) {
                    *count -= 1;
                }
                match result {
                    Ok(body) => {
                        self.slots[id].state = SlotState::Resolved(body);
                        Ok(SchemaNode::Reference(instance.key))
                    }
                    Err(e) => {
                        debug!("Slot {} failed: {}", instance.key, e);
                        self.slots[id].state = SlotState::Failed(e.clone());
                        Err(e)
                    }
                }
            }
        }
    }

    /// Like [`intern`](Self::intern), but a plain object type is resolved inline
    /// without a slot of its own. Used for query, header and cookie parameters.
    pub fn intern_parameter(
        &mut self,
        expr: &TypeExpr,
    ) -> Result<SchemaNode, UnsupportedTypeError> {
        match self.extractor.classify(expr)? {
            Classified::Optional(inner) => self.intern_parameter(&inner),
            Classified::Declared(instance)
                if matches!(instance.decl.body, DeclBody::Object { .. }) =>
            {
                let extractor = self.extractor;
                extractor.resolve_body(&instance, &mut |e: &TypeExpr| self.intern(e))
            }
            _ => self.intern(expr),
        }
    }

    fn revisit(&mut self, id: usize) -> Result<SchemaNode, UnsupportedTypeError> {
        let slot = &mut self.slots[id];
        slot.visits += 1;
        let key = slot.key.clone();
        match &slot.state {
            SlotState::Pending => {
                debug!("Cycle through {}", key);
                slot.cyclic = true;
                return Ok(SchemaNode::Reference(key));
            }
            SlotState::Failed(e) => return Err(e.clone()),
            SlotState::Resolved(_) => {}
        }
        match self.first_failure(id) {
            Some(e) => Err(e),
            None => Ok(SchemaNode::Reference(key)),
        }
    }

    /// A resolved slot may still point at a slot that failed after it was finished
    /// (a cycle whose outer type failed later). Find such a failure, if any.
    fn first_failure(&self, id: usize) -> Option<UnsupportedTypeError> {
        let mut stack = vec![id];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            match &self.slots[current].state {
                SlotState::Failed(e) => return Some(e.clone()),
                SlotState::Pending => {}
                SlotState::Resolved(body) => body.visit_references(&mut |key| {
                    if let Some(&next) = self.index.get(key) {
                        stack.push(next);
                    }
                }),
            }
        }
        None
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no declared type has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Enums are always named; objects only when shared, cyclic or `promote_all`.
    fn is_promoted(&self, slot: &Slot) -> bool {
        slot.cyclic
            || slot.visits >= 2
            || self.promote_all
            || matches!(slot.state, SlotState::Resolved(SchemaNode::EnumType(_)))
    }

    /// Slots a discriminator mapping points at. They must stay components, since a
    /// mapping entry can only name a schema by reference.
    fn discriminator_targets(&self, reached: &[bool]) -> HashSet<usize> {
        let mut targets = HashSet::new();
        for (id, slot) in self.slots.iter().enumerate() {
            if !reached[id] {
                continue;
            }
            let SlotState::Resolved(SchemaNode::UnionType {
                variants,
                discriminator: Some(discriminator),
            }) = &slot.state
            else {
                continue;
            };
            for index in discriminator.mapping.values() {
                match variants.get(*index) {
                    Some(SchemaNode::Reference(key)) => {
                        if let Some(&target) = self.index.get(key) {
                            targets.insert(target);
                        }
                    }
                    _ => warn!(
                        "Discriminator of `{}` maps to a variant that is not a named type",
                        slot.key
                    ),
                }
            }
        }
        targets
    }

    /// Decide the component set for the given root schemas.
    ///
    /// Only slots reachable from `roots` are considered, so types seen only by
    /// rejected operations are dropped. Promoted slots become components named in
    /// first-seen order; display name collisions get a numeric suffix.
    pub fn finish<'r>(self, roots: impl IntoIterator<Item = &'r SchemaNode>) -> ComponentTable {
        let mut reached = vec![false; self.slots.len()];
        let mut stack: Vec<usize> = Vec::new();
        for root in roots {
            root.visit_references(&mut |key| {
                if let Some(&id) = self.index.get(key) {
                    stack.push(id);
                }
            });
        }
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut reached[id], true) {
                continue;
            }
            if let SlotState::Resolved(body) = &self.slots[id].state {
                body.visit_references(&mut |key| {
                    if let Some(&next) = self.index.get(key) {
                        stack.push(next);
                    }
                });
            }
        }

        let forced = self.discriminator_targets(&reached);
        let mut names: HashMap<String, String> = HashMap::new();
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut warnings = Vec::new();
        let mut bodies = HashMap::new();

        for (id, slot) in self.slots.iter().enumerate() {
            if !reached[id] {
                continue;
            }
            let SlotState::Resolved(body) = &slot.state else {
                warn!("Type `{}` is referenced but has no schema", slot.key);
                continue;
            };
            bodies.insert(slot.key.clone(), body.clone());
            if !self.is_promoted(slot) && !forced.contains(&id) {
                continue;
            }

            let base = display_name(&slot.key);
            let mut assigned = base.clone();
            let mut counter = 2;
            while owners.contains_key(&assigned) {
                assigned = format!("{}{}", base, counter);
                counter += 1;
            }
            if assigned != base {
                let collision = AssemblyError::CanonicalNameCollision {
                    name: base.clone(),
                    existing: owners[&base].clone(),
                    identity: slot.key.clone(),
                    assigned: assigned.clone(),
                };
                warn!("{}", collision);
                warnings.push(collision);
            }
            owners.insert(assigned.clone(), slot.key.clone());
            names.insert(slot.key.clone(), assigned);
        }

        let mut table = ComponentTable {
            components: IndexMap::new(),
            names,
            bodies,
            warnings,
        };

        let mut components = IndexMap::new();
        for slot in &self.slots {
            if let Some(name) = table.names.get(&slot.key) {
                if let Some(body) = table.bodies.get(&slot.key) {
                    components.insert(name.clone(), table.materialize(body));
                }
            }
        }
        debug!(
            "Registry finished: {} slot(s), {} component(s)",
            self.slots.len(),
            components.len()
        );
        table.components = components;
        table
    }
}

/// The named components of one pass plus the rules for rewriting references.
#[derive(Debug, Clone, Default)]
pub struct ComponentTable {
    components: IndexMap<String, SchemaNode>,
    /// Identity key → component name, for promoted slots
    names: HashMap<String, String>,
    /// Identity key → collected body, for every reachable slot
    bodies: HashMap<String, SchemaNode>,
    warnings: Vec<AssemblyError>,
}

impl ComponentTable {
    /// Components in first-seen order, references already rewritten.
    pub fn components(&self) -> &IndexMap<String, SchemaNode> {
        &self.components
    }

    /// Component name assigned to an identity key.
    pub fn name_of(&self, key: &str) -> Option<&str> {
        self.names.get(key).map(|n| n.as_str())
    }

    /// Name collisions resolved while naming components.
    pub fn warnings(&self) -> &[AssemblyError] {
        &self.warnings
    }

    /// Split into the component map and the naming warnings.
    pub fn into_parts(self) -> (IndexMap<String, SchemaNode>, Vec<AssemblyError>) {
        (self.components, self.warnings)
    }

    /// Rewrite identity references in `node`: promoted types become references to
    /// their component name, the rest are inlined.
    pub fn materialize(&self, node: &SchemaNode) -> SchemaNode {
        node.map_references(&mut |key| match self.names.get(key) {
            Some(name) => SchemaNode::Reference(name.clone()),
            None => match self.bodies.get(key) {
                Some(body) => self.materialize(body),
                None => SchemaNode::Reference(key.to_string()),
            },
        })
    }
}
