//! Constraint-tree serializer.
//!
//! Walks an immutable validator graph and emits Rust source that, once
//! compiled, reconstructs an identical graph without re-reading the schema.
//! The interesting parts live here:
//! - reference collection into one canonical table (lexicographic identifier
//!   assignment, first-seen definition wins),
//! - an exhaustive per-variant serializer with sparse emission (a builder
//!   call appears only for fields that were explicitly set),
//! - the self-reference break: a root whose identity token matches a named
//!   reference is emitted as that reference's identifier, never inlined,
//! - a program emitter with a fixed init-block order, handing the assembled
//!   text to the canonicalization collaborator.
//!
//! Output is byte-identical across runs and processes for the same graph.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use thiserror::Error;

use crate::constraint::{
    ArrayConstraint, BooleanConstraint, Constraint, EnumConstraint, IntegerConstraint,
    NumberConstraint, ObjectConstraint, RefEntry, ReferenceConstraint, Scalar, StringConstraint,
    Validator,
};
use crate::format::{Canonicalize, FormatError, PrettyPrinter};

#[derive(Debug, Error)]
pub enum GenError {
    #[error("unsupported scalar kind in enum: {0}")]
    UnsupportedScalarKind(&'static str),
    #[error("reference {0:?} is not registered in the shared reference table")]
    UnresolvedReference(String),
    #[error("validator name {0:?} is declared more than once")]
    DuplicateValidatorName(String),
    #[error("generated source failed canonicalization: {source}")]
    Format {
        source: FormatError,
        /// The raw, unformatted buffer, kept verbatim for diagnosis.
        raw: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Immutable generation state, passed by reference down the recursion. No
/// mutable push/pop scope survives an early error return because there is
/// none: layout belongs to the canonical formatter.
struct GenCtx<'a> {
    prefix: &'a str,
    /// Local binding of the shared reference table inside the init block;
    /// `None` when the generation has no references at all.
    map_local: Option<&'a str>,
    refs: &'a BTreeMap<String, RefEntry>,
    ref_locals: &'a BTreeMap<String, String>,
}

const GENERATED_HEADER: &str = "// Code generated by jsv. DO NOT EDIT.\n";

pub struct Generator {
    prefix: String,
    formatter: Box<dyn Canonicalize>,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    pub fn new() -> Self {
        Self::with_prefix("jsv")
    }

    /// `prefix` qualifies every constructor and type reference in the
    /// generated program.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Generator {
            prefix: prefix.into(),
            formatter: Box::new(PrettyPrinter),
        }
    }

    pub fn with_formatter(mut self, formatter: Box<dyn Canonicalize>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Serialize `validators` into a complete, canonically formatted source
    /// file and write it to `out`. Either the whole program is produced or
    /// nothing is written.
    pub fn process<W: io::Write>(
        &self,
        out: &mut W,
        validators: &[Validator],
    ) -> Result<(), GenError> {
        let raw = self.emit_raw(validators)?;
        let formatted = self
            .formatter
            .canonicalize(&raw)
            .map_err(|source| GenError::Format { source, raw })?;
        // Canonicalizers may drop comments, so the marker is re-attached
        // after formatting.
        out.write_all(GENERATED_HEADER.as_bytes())?;
        out.write_all(formatted.as_bytes())?;
        Ok(())
    }

    /// Assemble the raw (pre-canonicalization) program text.
    pub fn emit_raw(&self, validators: &[Validator]) -> Result<String, GenError> {
        let p = self.prefix.as_str();
        let refs = collect_references(validators);
        let has_refs = !refs.is_empty();

        // Identifier assignment in lexicographic reference-name order, so
        // two runs over the same graph agree byte for byte.
        let mut ref_locals = BTreeMap::new();
        for (i, name) in refs.keys().enumerate() {
            ref_locals.insert(name.clone(), format!("r{i}"));
        }

        // Validators keep their supplied order; unnamed ones get their
        // positional index. The input graph is never mutated.
        let names: Vec<String> = validators
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if v.display_name().is_empty() {
                    format!("V{i}")
                } else {
                    v.display_name().to_string()
                }
            })
            .collect();

        // every name becomes a top-level static, so a repeat would produce
        // uncompilable output
        let mut seen = BTreeSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(GenError::DuplicateValidatorName(name.clone()));
            }
        }

        let mut buf = String::new();
        buf.push_str("#![allow(non_upper_case_globals)]\n");
        buf.push_str("use once_cell::sync::Lazy;\n");

        // Declarations: validators in sorted-name order, then the table and
        // one identifier per reference.
        let mut decl_order: Vec<(usize, &str)> =
            names.iter().enumerate().map(|(i, n)| (i, n.as_str())).collect();
        decl_order.sort_by(|a, b| a.1.cmp(b.1));
        for (i, name) in &decl_order {
            if has_refs {
                buf.push_str(&format!(
                    "pub static {name}: Lazy<{p}::Validator> = Lazy::new(|| SET.2[{i}].clone());\n"
                ));
            } else {
                buf.push_str(&format!(
                    "pub static {name}: Lazy<{p}::Validator> = Lazy::new(|| SET[{i}].clone());\n"
                ));
            }
        }
        if has_refs {
            buf.push_str(&format!(
                "pub static M: Lazy<{p}::ConstraintMap> = Lazy::new(|| SET.0.clone());\n"
            ));
            for i in 0..refs.len() {
                buf.push_str(&format!(
                    "pub static R{i}: Lazy<{p}::Constraint> = Lazy::new(|| SET.1[{i}].clone());\n"
                ));
            }
        }

        let ctx = GenCtx {
            prefix: p,
            map_local: has_refs.then_some("m"),
            refs: &refs,
            ref_locals: &ref_locals,
        };

        // Init block, in fixed order: table construction, reference
        // definitions, registrations, then validators.
        if has_refs {
            buf.push_str(&format!(
                "static SET: Lazy<({p}::ConstraintMap, Vec<{p}::Constraint>, Vec<{p}::Validator>)> = Lazy::new(|| {{\n"
            ));
            buf.push_str(&format!("let m = {p}::ConstraintMap::new();\n"));
            for (name, entry) in &refs {
                let local = &ref_locals[name];
                buf.push_str(&format!("let {local}: {p}::Constraint = "));
                serialize_node(&ctx, &mut buf, &entry.constraint)?;
                buf.push_str(".into();\n");
            }
            for name in refs.keys() {
                let local = &ref_locals[name];
                buf.push_str(&format!("m.set_reference({name:?}, {local}.clone());\n"));
            }
            buf.push_str("let validators = vec![\n");
            for v in validators {
                serialize_validator(&ctx, &mut buf, v)?;
                buf.push_str(",\n");
            }
            buf.push_str("];\n");
            buf.push_str("(m, vec![");
            for (i, name) in refs.keys().enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                buf.push_str(&ref_locals[name]);
            }
            buf.push_str("], validators)\n");
            buf.push_str("});\n");
        } else {
            buf.push_str(&format!(
                "static SET: Lazy<Vec<{p}::Validator>> = Lazy::new(|| {{\n"
            ));
            buf.push_str("vec![\n");
            for v in validators {
                serialize_validator(&ctx, &mut buf, v)?;
                buf.push_str(",\n");
            }
            buf.push_str("]\n});\n");
        }

        Ok(buf)
    }
}

/// One pass over every validator's reference map. The first-seen definition
/// of a name wins; later duplicates are ignored, not an error. The result is
/// immutable for the rest of the run.
fn collect_references(validators: &[Validator]) -> BTreeMap<String, RefEntry> {
    let mut refs: BTreeMap<String, RefEntry> = BTreeMap::new();
    for v in validators {
        for (name, entry) in &v.refs {
            refs.entry(name.clone()).or_insert_with(|| entry.clone());
        }
    }
    refs
}

// ————————————————————————————————————————————————————————————————————————————
// NODE SERIALIZER
// ————————————————————————————————————————————————————————————————————————————

fn serialize_node(ctx: &GenCtx, out: &mut String, c: &Constraint) -> Result<(), GenError> {
    match c {
        Constraint::Empty => {
            out.push_str(&format!("{}::empty()", ctx.prefix));
            Ok(())
        }
        Constraint::Validator(v) => serialize_validator(ctx, out, v),
        Constraint::Any(c) => serialize_combinator(ctx, out, "any", &c.constraints),
        Constraint::All(c) => serialize_combinator(ctx, out, "all", &c.constraints),
        Constraint::OneOf(c) => serialize_combinator(ctx, out, "one_of", &c.constraints),
        Constraint::Not(child) => {
            out.push_str(&format!("{}::not(", ctx.prefix));
            serialize_node(ctx, out, child)?;
            out.push(')');
            Ok(())
        }
        Constraint::Reference(c) => serialize_reference(ctx, out, c),
        Constraint::String(c) => serialize_string(ctx, out, c),
        Constraint::Number(c) => serialize_number(ctx, out, c),
        Constraint::Integer(c) => serialize_integer(ctx, out, c),
        Constraint::Boolean(c) => serialize_boolean(ctx, out, c),
        Constraint::Array(c) => serialize_array(ctx, out, c),
        Constraint::Object(c) => serialize_object(ctx, out, c),
    }
}

fn serialize_validator(ctx: &GenCtx, out: &mut String, v: &Validator) -> Result<(), GenError> {
    out.push_str(&format!("{}::validator()", ctx.prefix));
    if let Some(m) = ctx.map_local {
        out.push_str(&format!(".constraint_map(&{m})"));
    }

    // Self-reference break: a root that *is* a registered reference target
    // (same identity token, not merely equal in value) becomes a shared
    // identifier. Recursing instead would expand a cyclic schema forever.
    if let Some(root_id) = v.root_id {
        if let Some((name, _)) = ctx.refs.iter().find(|(_, e)| e.id == root_id) {
            out.push_str(&format!(".root({}.clone())", ctx.ref_locals[name]));
            return Ok(());
        }
    }

    out.push_str(".root(");
    serialize_node(ctx, out, &v.root)?;
    out.push(')');
    Ok(())
}

/// An empty combinator collapses to the pass-always sentinel. This is
/// intentional: with no children, Any/All/OneOf carry no constraint.
fn serialize_combinator(
    ctx: &GenCtx,
    out: &mut String,
    name: &str,
    children: &[Constraint],
) -> Result<(), GenError> {
    if children.is_empty() {
        out.push_str(&format!("{}::empty()", ctx.prefix));
        return Ok(());
    }
    out.push_str(&format!("{}::{name}()", ctx.prefix));
    for child in children {
        out.push_str(".add(");
        serialize_node(ctx, out, child)?;
        out.push(')');
    }
    Ok(())
}

fn serialize_reference(
    ctx: &GenCtx,
    out: &mut String,
    c: &ReferenceConstraint,
) -> Result<(), GenError> {
    let name = c.name();
    let Some(m) = ctx.map_local else {
        return Err(GenError::UnresolvedReference(name.to_string()));
    };
    if !ctx.refs.contains_key(name) {
        return Err(GenError::UnresolvedReference(name.to_string()));
    }
    out.push_str(&format!(
        "{}::reference(&{m}).refers_to({name:?})",
        ctx.prefix
    ));
    Ok(())
}

fn serialize_string(ctx: &GenCtx, out: &mut String, c: &StringConstraint) -> Result<(), GenError> {
    out.push_str(&format!("{}::string()", ctx.prefix));
    if let Some(n) = c.max_length {
        out.push_str(&format!(".max_length({n})"));
    }
    if let Some(n) = c.min_length {
        out.push_str(&format!(".min_length({n})"));
    }
    if let Some(f) = &c.format {
        out.push_str(&format!(".format({f:?})"));
    }
    if let Some(rx) = &c.pattern {
        out.push_str(&format!(".pattern({})", pattern_literal(rx.as_str())));
    }
    if let Some(e) = &c.enum_ {
        out.push_str(".enum_values([");
        serialize_enum(ctx, out, e)?;
        out.push_str("])");
    }
    Ok(())
}

fn serialize_enum(ctx: &GenCtx, out: &mut String, e: &EnumConstraint) -> Result<(), GenError> {
    for (i, s) in e.values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match s {
            Scalar::Str(x) => out.push_str(&format!("{}::Scalar::from({x:?})", ctx.prefix)),
            Scalar::Int(x) => out.push_str(&format!("{}::Scalar::from({x})", ctx.prefix)),
            Scalar::Float(x) => out.push_str(&format!("{}::Scalar::from({:?})", ctx.prefix, x.0)),
            Scalar::Bool(_) | Scalar::Null => {
                return Err(GenError::UnsupportedScalarKind(s.kind()));
            }
        }
    }
    Ok(())
}

fn serialize_number(ctx: &GenCtx, out: &mut String, c: &NumberConstraint) -> Result<(), GenError> {
    out.push_str(&format!("{}::number()", ctx.prefix));
    if let Some(n) = c.minimum {
        out.push_str(&format!(".minimum({n:?})"));
    }
    if c.exclusive_minimum {
        out.push_str(".exclusive_minimum(true)");
    }
    if let Some(n) = c.maximum {
        out.push_str(&format!(".maximum({n:?})"));
    }
    if c.exclusive_maximum {
        out.push_str(".exclusive_maximum(true)");
    }
    if let Some(n) = c.default {
        out.push_str(&format!(".default_value({n:?})"));
    }
    Ok(())
}

/// Bounds are stored wide but an integer constraint emits whole-number
/// literals, no fractional part.
fn serialize_integer(
    ctx: &GenCtx,
    out: &mut String,
    c: &IntegerConstraint,
) -> Result<(), GenError> {
    out.push_str(&format!("{}::integer()", ctx.prefix));
    if let Some(n) = c.minimum {
        out.push_str(&format!(".minimum({})", n.trunc() as i64));
    }
    if let Some(n) = c.maximum {
        out.push_str(&format!(".maximum({})", n.trunc() as i64));
    }
    if let Some(n) = c.default {
        out.push_str(&format!(".default_value({n})"));
    }
    Ok(())
}

fn serialize_boolean(
    ctx: &GenCtx,
    out: &mut String,
    c: &BooleanConstraint,
) -> Result<(), GenError> {
    out.push_str(&format!("{}::boolean()", ctx.prefix));
    if let Some(b) = c.default {
        out.push_str(&format!(".default_value({b})"));
    }
    Ok(())
}

fn serialize_array(ctx: &GenCtx, out: &mut String, c: &ArrayConstraint) -> Result<(), GenError> {
    out.push_str(&format!("{}::array()", ctx.prefix));
    if let Some(items) = &c.items {
        out.push_str(".items(");
        serialize_node(ctx, out, items)?;
        out.push(')');
    }
    if let Some(add) = &c.additional_items {
        out.push_str(".additional_items(");
        serialize_node(ctx, out, add)?;
        out.push(')');
    }
    if !c.positional_items.is_empty() {
        out.push_str(".positional_items(vec![");
        for item in &c.positional_items {
            serialize_node(ctx, out, item)?;
            out.push_str(".into(), ");
        }
        out.push_str("])");
    }
    if let Some(n) = c.min_items {
        out.push_str(&format!(".min_items({n})"));
    }
    if let Some(n) = c.max_items {
        out.push_str(&format!(".max_items({n})"));
    }
    if c.unique_items {
        out.push_str(".unique_items(true)");
    }
    Ok(())
}

fn serialize_object(ctx: &GenCtx, out: &mut String, c: &ObjectConstraint) -> Result<(), GenError> {
    out.push_str(&format!("{}::object()", ctx.prefix));

    if let Some(default) = &c.default {
        out.push_str(&format!(".default_value(serde_json::json!({default}))"));
    }

    // required membership has no inherent order; the set iterates sorted
    if !c.required.is_empty() {
        out.push_str(".required([");
        for (i, name) in c.required.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{name:?}"));
        }
        out.push_str("])");
    }

    if let Some(add) = &c.additional_properties {
        out.push_str(".additional_properties(");
        serialize_node(ctx, out, add)?;
        out.push(')');
    }

    // properties sorted by name regardless of runtime insertion order
    let mut prop_names: Vec<&String> = c.properties.keys().collect();
    prop_names.sort();
    for name in prop_names {
        out.push_str(&format!(".add_prop({name:?}, "));
        serialize_node(ctx, out, &c.properties[name])?;
        out.push(')');
    }

    // dependency pairs sorted by (from, to) for determinism
    let mut deps: Vec<(&String, &String)> = c
        .prop_dependencies
        .iter()
        .flat_map(|(from, tos)| tos.iter().map(move |to| (from, to)))
        .collect();
    deps.sort();
    for (from, to) in deps {
        out.push_str(&format!(".prop_dependency({from:?}, {to:?})"));
    }

    Ok(())
}

/// Patterns are emitted verbatim as raw string literals when possible, the
/// escaped form only as a fallback.
fn pattern_literal(pattern: &str) -> String {
    if !pattern.contains('"') {
        format!("r\"{pattern}\"")
    } else if !pattern.contains("\"#") {
        format!("r#\"{pattern}\"#")
    } else {
        format!("{pattern:?}")
    }
}

// ------------------------------- Tests ------------------------------------ //
