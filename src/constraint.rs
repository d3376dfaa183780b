//! Constraint graph data model.
//!
//! A `Constraint` is a node in a validation tree: leaves check one JSON
//! shape, combinators compose children, and `Reference` points into a shared
//! `ConstraintMap` by name instead of inlining its target — which is what
//! makes self-referential schemas representable as finite trees.
//!
//! Every variant struct doubles as a by-value builder; the code emitted by
//! `generator` reconstructs graphs through exactly these calls.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use regex::Regex;
use serde_json::Value;

// ————————————————————————————————————————————————————————————————————————————
// IDENTITY TOKENS
// ————————————————————————————————————————————————————————————————————————————

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(0);

/// Stable identity token for a shared sub-schema, assigned when a `$ref`
/// target is first materialized. Compared by value, so identity survives
/// cloning and crossing process boundaries (unlike address comparison).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(u64);

impl SchemaId {
    pub fn fresh() -> Self {
        SchemaId(NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCALARS
// ————————————————————————————————————————————————————————————————————————————

/// Enum value holder. JSON schema enums may legally carry booleans and
/// nulls, and runtime validation accepts them; only the first three kinds
/// are emittable by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(OrderedFloat<f64>),
    Bool(bool),
    Null,
}

impl Scalar {
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Str(_) => "string",
            Scalar::Int(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Bool(_) => "boolean",
            Scalar::Null => "null",
        }
    }

    /// Build from a JSON value; `None` for arrays and objects.
    pub fn from_value(v: &Value) -> Option<Scalar> {
        match v {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Scalar::Int(i))
                } else {
                    n.as_f64().map(|f| Scalar::Float(OrderedFloat(f)))
                }
            }
            Value::String(s) => Some(Scalar::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// JSON equality against a value. Numbers compare numerically, so the
    /// scalar `5` matches the JSON number `5.0`.
    pub fn matches(&self, v: &Value) -> bool {
        match self {
            Scalar::Str(s) => v.as_str() == Some(s),
            Scalar::Int(i) => v.as_f64() == Some(*i as f64),
            Scalar::Float(f) => v.as_f64() == Some(f.0),
            Scalar::Bool(b) => v.as_bool() == Some(*b),
            Scalar::Null => v.is_null(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(OrderedFloat(f))
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SHARED REFERENCE TABLE
// ————————————————————————————————————————————————————————————————————————————

/// Shared mapping from reference name to constraint. Cloning the handle
/// shares the underlying table, so a `Reference` node resolves against the
/// same entries its enclosing validator registered.
#[derive(Clone, Default)]
pub struct ConstraintMap {
    inner: Arc<RwLock<HashMap<String, Constraint>>>,
}

impl ConstraintMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reference(&self, name: impl Into<String>, c: impl Into<Constraint>) {
        self.inner
            .write()
            .expect("constraint map lock poisoned")
            .insert(name.into(), c.into());
    }

    /// Clone out the constraint registered under `name`. Cloning keeps the
    /// lock scope short and lets resolution recurse without re-entrancy.
    pub fn resolve(&self, name: &str) -> Option<Constraint> {
        self.inner
            .read()
            .expect("constraint map lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .expect("constraint map lock poisoned")
            .is_empty()
    }
}

impl fmt::Debug for ConstraintMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Names only: entries can point back into this map.
        let mut names: Vec<String> = self
            .inner
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        f.debug_tuple("ConstraintMap").field(&names).finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CONSTRAINT VARIANTS
// ————————————————————————————————————————————————————————————————————————————

/// Closed set of constraint kinds. Dispatch is an exhaustive `match`
/// everywhere: adding a variant without handling it is a compile error, not
/// a silently skipped node.
#[derive(Debug, Clone)]
pub enum Constraint {
    Empty,
    Validator(Box<Validator>),
    Any(AnyConstraint),
    All(AllConstraint),
    OneOf(OneOfConstraint),
    Not(Box<Constraint>),
    Reference(ReferenceConstraint),
    String(StringConstraint),
    Number(NumberConstraint),
    Integer(IntegerConstraint),
    Boolean(BooleanConstraint),
    Array(ArrayConstraint),
    Object(ObjectConstraint),
}

/// Logical OR over children, in order.
#[derive(Debug, Clone, Default)]
pub struct AnyConstraint {
    pub(crate) constraints: Vec<Constraint>,
}

impl AnyConstraint {
    pub fn add(mut self, c: impl Into<Constraint>) -> Self {
        self.constraints.push(c.into());
        self
    }
}

/// Logical AND over children, in order.
#[derive(Debug, Clone, Default)]
pub struct AllConstraint {
    pub(crate) constraints: Vec<Constraint>,
}

impl AllConstraint {
    pub fn add(mut self, c: impl Into<Constraint>) -> Self {
        self.constraints.push(c.into());
        self
    }
}

/// Exactly one child must match.
#[derive(Debug, Clone, Default)]
pub struct OneOfConstraint {
    pub(crate) constraints: Vec<Constraint>,
}

impl OneOfConstraint {
    pub fn add(mut self, c: impl Into<Constraint>) -> Self {
        self.constraints.push(c.into());
        self
    }
}

/// Indirect pointer to a named entry in a shared `ConstraintMap`, resolved
/// at validate time. Never inlined, which is what allows cycles.
#[derive(Clone)]
pub struct ReferenceConstraint {
    pub(crate) map: ConstraintMap,
    pub(crate) name: String,
}

impl ReferenceConstraint {
    pub fn refers_to(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ReferenceConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Printing the map would chase the cycle this node exists to break.
        f.debug_tuple("ReferenceConstraint").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StringConstraint {
    pub(crate) min_length: Option<usize>,
    pub(crate) max_length: Option<usize>,
    pub(crate) format: Option<String>,
    pub(crate) pattern: Option<Regex>,
    pub(crate) enum_: Option<EnumConstraint>,
}

impl StringConstraint {
    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Compiles `pattern` eagerly. Panics on an invalid pattern: generated
    /// code only ever replays patterns that compiled in the source graph.
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(Regex::new(pattern).expect("invalid regex pattern"));
        self
    }

    pub fn enum_values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = Scalar>,
    {
        self.enum_ = Some(EnumConstraint {
            values: values.into_iter().collect(),
        });
        self
    }
}

/// Ordered scalar whitelist. A value holder embedded in `StringConstraint`,
/// not a standalone `Constraint` variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumConstraint {
    pub(crate) values: Vec<Scalar>,
}

#[derive(Debug, Clone, Default)]
pub struct NumberConstraint {
    pub(crate) minimum: Option<f64>,
    pub(crate) maximum: Option<f64>,
    pub(crate) exclusive_minimum: bool,
    pub(crate) exclusive_maximum: bool,
    pub(crate) default: Option<f64>,
}

impl NumberConstraint {
    pub fn minimum(mut self, n: f64) -> Self {
        self.minimum = Some(n);
        self
    }

    pub fn maximum(mut self, n: f64) -> Self {
        self.maximum = Some(n);
        self
    }

    pub fn exclusive_minimum(mut self, yes: bool) -> Self {
        self.exclusive_minimum = yes;
        self
    }

    pub fn exclusive_maximum(mut self, yes: bool) -> Self {
        self.exclusive_maximum = yes;
        self
    }

    pub fn default_value(mut self, n: f64) -> Self {
        self.default = Some(n);
        self
    }
}

/// Bounds are stored wide (f64, as a schema document supplies them) and
/// truncated to whole-number literals on emission.
#[derive(Debug, Clone, Default)]
pub struct IntegerConstraint {
    pub(crate) minimum: Option<f64>,
    pub(crate) maximum: Option<f64>,
    pub(crate) default: Option<i64>,
}

impl IntegerConstraint {
    pub fn minimum(mut self, n: i64) -> Self {
        self.minimum = Some(n as f64);
        self
    }

    pub fn maximum(mut self, n: i64) -> Self {
        self.maximum = Some(n as f64);
        self
    }

    pub fn default_value(mut self, n: i64) -> Self {
        self.default = Some(n);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct BooleanConstraint {
    pub(crate) default: Option<bool>,
}

impl BooleanConstraint {
    pub fn default_value(mut self, b: bool) -> Self {
        self.default = Some(b);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArrayConstraint {
    pub(crate) items: Option<Box<Constraint>>,
    pub(crate) additional_items: Option<Box<Constraint>>,
    pub(crate) positional_items: Vec<Constraint>,
    pub(crate) min_items: Option<usize>,
    pub(crate) max_items: Option<usize>,
    pub(crate) unique_items: bool,
}

impl ArrayConstraint {
    pub fn items(mut self, c: impl Into<Constraint>) -> Self {
        self.items = Some(Box::new(c.into()));
        self
    }

    pub fn additional_items(mut self, c: impl Into<Constraint>) -> Self {
        self.additional_items = Some(Box::new(c.into()));
        self
    }

    /// Index-significant item schemas; order is preserved exactly.
    pub fn positional_items(mut self, items: Vec<Constraint>) -> Self {
        self.positional_items = items;
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn unique_items(mut self, yes: bool) -> Self {
        self.unique_items = yes;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectConstraint {
    /// Insertion order is kept at runtime; emission sorts by name.
    pub(crate) properties: IndexMap<String, Constraint>,
    pub(crate) required: BTreeSet<String>,
    pub(crate) additional_properties: Option<Box<Constraint>>,
    pub(crate) prop_dependencies: IndexMap<String, Vec<String>>,
    pub(crate) default: Option<Value>,
}

impl ObjectConstraint {
    pub fn add_prop(mut self, name: impl Into<String>, c: impl Into<Constraint>) -> Self {
        self.properties.insert(name.into(), c.into());
        self
    }

    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn additional_properties(mut self, c: impl Into<Constraint>) -> Self {
        self.additional_properties = Some(Box::new(c.into()));
        self
    }

    /// If `from` is present in a validated object, `to` must be too.
    pub fn prop_dependency(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.prop_dependencies
            .entry(from.into())
            .or_default()
            .push(to.into());
        self
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }
}

// ————————————————————————————————————————————————————————————————————————————
// VALIDATORS
// ————————————————————————————————————————————————————————————————————————————

/// A named reference definition: the materialized constraint plus the
/// identity token assigned when it was first built.
#[derive(Debug, Clone)]
pub struct RefEntry {
    pub(crate) id: SchemaId,
    pub(crate) constraint: Constraint,
}

impl RefEntry {
    pub fn new(c: impl Into<Constraint>) -> Self {
        RefEntry {
            id: SchemaId::fresh(),
            constraint: c.into(),
        }
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }
}

/// Top-level (or nested, reusable) schema: a root constraint plus the named
/// reference definitions it declares and the shared map they resolve through.
#[derive(Debug, Clone)]
pub struct Validator {
    pub(crate) name: String,
    pub(crate) root: Constraint,
    /// Identity token of the root when the root *is* one of the named
    /// reference targets. The generator uses this to break self-reference.
    pub(crate) root_id: Option<SchemaId>,
    pub(crate) refs: BTreeMap<String, RefEntry>,
    pub(crate) map: ConstraintMap,
}

impl Default for Validator {
    fn default() -> Self {
        Validator {
            name: String::new(),
            root: Constraint::Empty,
            root_id: None,
            refs: BTreeMap::new(),
            map: ConstraintMap::new(),
        }
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Share an externally owned reference table instead of this validator's
    /// private one.
    pub fn constraint_map(mut self, map: &ConstraintMap) -> Self {
        self.map = map.clone();
        self
    }

    pub fn root(mut self, c: impl Into<Constraint>) -> Self {
        self.root = c.into();
        self.root_id = None;
        self
    }

    /// Declare a named reference: materializes a `RefEntry` with a fresh
    /// identity token and registers the constraint in the shared map.
    pub fn define_reference(mut self, name: impl Into<String>, c: impl Into<Constraint>) -> Self {
        let name = name.into();
        let entry = RefEntry::new(c);
        self.map.set_reference(&name, entry.constraint.clone());
        self.refs.insert(name, entry);
        self
    }

    /// Make a previously defined reference the root. The entry's identity
    /// token is stamped on the root so generation emits a shared identifier
    /// instead of inlining — the self-reference break. No-op if `name` was
    /// never defined.
    pub fn root_reference(mut self, name: &str) -> Self {
        if let Some(entry) = self.refs.get(name) {
            self.root_id = Some(entry.id);
            self.root = entry.constraint.clone();
        }
        self
    }

    pub fn has_reference(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    pub fn shared_map(&self) -> &ConstraintMap {
        &self.map
    }

    pub fn display_name(&self) -> &str {
        &self.name
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTORS & CONVERSIONS
// ————————————————————————————————————————————————————————————————————————————

/// Always-pass sentinel.
pub fn empty() -> Constraint {
    Constraint::Empty
}

pub fn validator() -> Validator {
    Validator::new()
}

pub fn any() -> AnyConstraint {
    AnyConstraint::default()
}

pub fn all() -> AllConstraint {
    AllConstraint::default()
}

pub fn one_of() -> OneOfConstraint {
    OneOfConstraint::default()
}

pub fn not(c: impl Into<Constraint>) -> Constraint {
    Constraint::Not(Box::new(c.into()))
}

pub fn reference(map: &ConstraintMap) -> ReferenceConstraint {
    ReferenceConstraint {
        map: map.clone(),
        name: String::new(),
    }
}

pub fn string() -> StringConstraint {
    StringConstraint::default()
}

pub fn number() -> NumberConstraint {
    NumberConstraint::default()
}

pub fn integer() -> IntegerConstraint {
    IntegerConstraint::default()
}

pub fn boolean() -> BooleanConstraint {
    BooleanConstraint::default()
}

pub fn array() -> ArrayConstraint {
    ArrayConstraint::default()
}

pub fn object() -> ObjectConstraint {
    ObjectConstraint::default()
}

impl From<Validator> for Constraint {
    fn from(v: Validator) -> Self {
        Constraint::Validator(Box::new(v))
    }
}

impl From<AnyConstraint> for Constraint {
    fn from(c: AnyConstraint) -> Self {
        Constraint::Any(c)
    }
}

impl From<AllConstraint> for Constraint {
    fn from(c: AllConstraint) -> Self {
        Constraint::All(c)
    }
}

impl From<OneOfConstraint> for Constraint {
    fn from(c: OneOfConstraint) -> Self {
        Constraint::OneOf(c)
    }
}

impl From<ReferenceConstraint> for Constraint {
    fn from(c: ReferenceConstraint) -> Self {
        Constraint::Reference(c)
    }
}

impl From<StringConstraint> for Constraint {
    fn from(c: StringConstraint) -> Self {
        Constraint::String(c)
    }
}

impl From<NumberConstraint> for Constraint {
    fn from(c: NumberConstraint) -> Self {
        Constraint::Number(c)
    }
}

impl From<IntegerConstraint> for Constraint {
    fn from(c: IntegerConstraint) -> Self {
        Constraint::Integer(c)
    }
}

impl From<BooleanConstraint> for Constraint {
    fn from(c: BooleanConstraint) -> Self {
        Constraint::Boolean(c)
    }
}

impl From<ArrayConstraint> for Constraint {
    fn from(c: ArrayConstraint) -> Self {
        Constraint::Array(c)
    }
}

impl From<ObjectConstraint> for Constraint {
    fn from(c: ObjectConstraint) -> Self {
        Constraint::Object(c)
    }
}
