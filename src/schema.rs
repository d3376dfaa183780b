//! Compile a JSON-Schema-ish document (draft-4 flavored subset) into a
//! `Validator` graph.
//!
//! `definitions` are materialized first, each under a fresh identity token,
//! so a top-level `$ref` root can be stamped with its target's token — the
//! hook the generator uses to break self-reference. Nested `$ref`s become
//! `Reference` nodes resolved by name, never inlined.

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constraint::{
    all, any, boolean, empty, integer, not, number, object, one_of, reference, string, validator,
    ArrayConstraint, Constraint, ConstraintMap, Scalar, Validator,
};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema must be an object or boolean, found {0}")]
    NotASchema(&'static str),
    #[error("root $ref {0:?} does not name a definition in this document")]
    UnresolvedRootRef(String),
    #[error("keyword {keyword:?}: {detail}")]
    Keyword {
        keyword: &'static str,
        detail: String,
    },
    #[error("enum entries must be scalars, found {0}")]
    NonScalarEnum(&'static str),
    #[error("unsupported type {0:?}")]
    UnsupportedType(String),
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn keyword_err(keyword: &'static str, detail: impl Into<String>) -> SchemaError {
    SchemaError::Keyword {
        keyword,
        detail: detail.into(),
    }
}

/// Compile `schema` into a named validator.
pub fn compile(name: impl Into<String>, schema: &Value) -> Result<Validator, SchemaError> {
    let doc = schema
        .as_object()
        .ok_or_else(|| SchemaError::NotASchema(json_kind(schema)))?;

    let mut v = validator().name(name);
    let map = v.shared_map().clone();

    if let Some(defs) = doc.get("definitions") {
        let defs = defs
            .as_object()
            .ok_or_else(|| keyword_err("definitions", "must be an object"))?;
        for (dname, dschema) in defs {
            let c = compile_constraint(dschema, &map)?;
            v = v.define_reference(format!("#/definitions/{dname}"), c);
        }
    }

    if let Some(r) = doc.get("$ref") {
        let rname = r
            .as_str()
            .ok_or_else(|| keyword_err("$ref", "must be a string"))?;
        if !v.has_reference(rname) {
            return Err(SchemaError::UnresolvedRootRef(rname.to_string()));
        }
        Ok(v.root_reference(rname))
    } else {
        let root = compile_constraint(schema, &map)?;
        Ok(v.root(root))
    }
}

/// Recursive descent over one schema node.
pub fn compile_constraint(schema: &Value, map: &ConstraintMap) -> Result<Constraint, SchemaError> {
    match schema {
        // boolean schemas: `true` accepts everything, `false` nothing
        Value::Bool(true) => Ok(empty()),
        Value::Bool(false) => Ok(not(empty())),
        Value::Object(obj) => compile_object_schema(obj, map),
        other => Err(SchemaError::NotASchema(json_kind(other))),
    }
}

fn compile_object_schema(
    obj: &Map<String, Value>,
    map: &ConstraintMap,
) -> Result<Constraint, SchemaError> {
    if let Some(r) = obj.get("$ref") {
        let rname = r
            .as_str()
            .ok_or_else(|| keyword_err("$ref", "must be a string"))?;
        return Ok(reference(map).refers_to(rname).into());
    }

    if let Some(children) = obj.get("anyOf") {
        let mut c = any();
        for child in schema_list("anyOf", children)? {
            c = c.add(compile_constraint(child, map)?);
        }
        return Ok(c.into());
    }
    if let Some(children) = obj.get("allOf") {
        let mut c = all();
        for child in schema_list("allOf", children)? {
            c = c.add(compile_constraint(child, map)?);
        }
        return Ok(c.into());
    }
    if let Some(children) = obj.get("oneOf") {
        let mut c = one_of();
        for child in schema_list("oneOf", children)? {
            c = c.add(compile_constraint(child, map)?);
        }
        return Ok(c.into());
    }
    if let Some(child) = obj.get("not") {
        return Ok(not(compile_constraint(child, map)?));
    }

    match obj.get("type") {
        Some(Value::String(t)) => compile_typed(t, obj, map),
        Some(Value::Array(ts)) => {
            let mut c = any();
            for t in ts {
                let t = t
                    .as_str()
                    .ok_or_else(|| keyword_err("type", "type list entries must be strings"))?;
                c = c.add(compile_typed(t, obj, map)?);
            }
            Ok(c.into())
        }
        Some(other) => Err(keyword_err(
            "type",
            format!("must be a string or array, found {}", json_kind(other)),
        )),
        // no explicit type: infer from the keywords present
        None => {
            if obj.contains_key("properties")
                || obj.contains_key("required")
                || obj.contains_key("additionalProperties")
                || obj.contains_key("dependencies")
            {
                compile_typed("object", obj, map)
            } else if obj.contains_key("items") || obj.contains_key("minItems") {
                compile_typed("array", obj, map)
            } else if obj.contains_key("enum")
                || obj.contains_key("pattern")
                || obj.contains_key("minLength")
                || obj.contains_key("maxLength")
                || obj.contains_key("format")
            {
                compile_typed("string", obj, map)
            } else {
                Ok(empty())
            }
        }
    }
}

fn compile_typed(
    ty: &str,
    obj: &Map<String, Value>,
    map: &ConstraintMap,
) -> Result<Constraint, SchemaError> {
    match ty {
        "string" => compile_string(obj),
        "integer" => {
            let mut c = integer();
            if let Some(n) = get_f64(obj, "minimum")? {
                c.minimum = Some(n);
            }
            if let Some(n) = get_f64(obj, "maximum")? {
                c.maximum = Some(n);
            }
            if let Some(d) = obj.get("default") {
                c.default = d.as_i64();
            }
            Ok(c.into())
        }
        "number" => {
            let mut c = number();
            if let Some(n) = get_f64(obj, "minimum")? {
                c = c.minimum(n);
            }
            if get_bool(obj, "exclusiveMinimum")? {
                c = c.exclusive_minimum(true);
            }
            if let Some(n) = get_f64(obj, "maximum")? {
                c = c.maximum(n);
            }
            if get_bool(obj, "exclusiveMaximum")? {
                c = c.exclusive_maximum(true);
            }
            if let Some(d) = obj.get("default").and_then(Value::as_f64) {
                c = c.default_value(d);
            }
            Ok(c.into())
        }
        "boolean" => {
            let mut c = boolean();
            if let Some(d) = obj.get("default").and_then(Value::as_bool) {
                c = c.default_value(d);
            }
            Ok(c.into())
        }
        "array" => compile_array(obj, map),
        "object" => compile_object_type(obj, map),
        other => Err(SchemaError::UnsupportedType(other.to_string())),
    }
}

fn compile_string(obj: &Map<String, Value>) -> Result<Constraint, SchemaError> {
    let mut c = string();
    if let Some(n) = get_usize(obj, "minLength")? {
        c = c.min_length(n);
    }
    if let Some(n) = get_usize(obj, "maxLength")? {
        c = c.max_length(n);
    }
    if let Some(f) = obj.get("format") {
        let f = f
            .as_str()
            .ok_or_else(|| keyword_err("format", "must be a string"))?;
        c = c.format(f);
    }
    if let Some(p) = obj.get("pattern") {
        let p = p
            .as_str()
            .ok_or_else(|| keyword_err("pattern", "must be a string"))?;
        c.pattern = Some(Regex::new(p).map_err(|e| keyword_err("pattern", e.to_string()))?);
    }
    if let Some(e) = obj.get("enum") {
        let entries = e
            .as_array()
            .ok_or_else(|| keyword_err("enum", "must be an array"))?;
        let mut values = Vec::with_capacity(entries.len());
        for entry in entries {
            values.push(
                Scalar::from_value(entry).ok_or_else(|| SchemaError::NonScalarEnum(json_kind(entry)))?,
            );
        }
        c = c.enum_values(values);
    }
    Ok(c.into())
}

fn compile_array(obj: &Map<String, Value>, map: &ConstraintMap) -> Result<Constraint, SchemaError> {
    let mut c = ArrayConstraint::default();
    match obj.get("items") {
        Some(Value::Array(schemas)) => {
            let mut positional = Vec::with_capacity(schemas.len());
            for s in schemas {
                positional.push(compile_constraint(s, map)?);
            }
            c = c.positional_items(positional);
        }
        Some(single) => {
            c = c.items(compile_constraint(single, map)?);
        }
        None => {}
    }
    if let Some(add) = obj.get("additionalItems") {
        c = c.additional_items(compile_constraint(add, map)?);
    }
    if let Some(n) = get_usize(obj, "minItems")? {
        c = c.min_items(n);
    }
    if let Some(n) = get_usize(obj, "maxItems")? {
        c = c.max_items(n);
    }
    if get_bool(obj, "uniqueItems")? {
        c = c.unique_items(true);
    }
    Ok(c.into())
}

fn compile_object_type(
    obj: &Map<String, Value>,
    map: &ConstraintMap,
) -> Result<Constraint, SchemaError> {
    let mut c = object();
    if let Some(d) = obj.get("default") {
        c = c.default_value(d.clone());
    }
    if let Some(props) = obj.get("properties") {
        let props = props
            .as_object()
            .ok_or_else(|| keyword_err("properties", "must be an object"))?;
        for (name, pschema) in props {
            c = c.add_prop(name, compile_constraint(pschema, map)?);
        }
    }
    if let Some(required) = obj.get("required") {
        let names = required
            .as_array()
            .ok_or_else(|| keyword_err("required", "must be an array"))?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            out.push(
                name.as_str()
                    .ok_or_else(|| keyword_err("required", "entries must be strings"))?,
            );
        }
        c = c.required(out);
    }
    match obj.get("additionalProperties") {
        Some(Value::Bool(false)) => c = c.additional_properties(not(empty())),
        Some(Value::Bool(true)) | None => {}
        Some(schema) => c = c.additional_properties(compile_constraint(schema, map)?),
    }
    if let Some(deps) = obj.get("dependencies") {
        let deps = deps
            .as_object()
            .ok_or_else(|| keyword_err("dependencies", "must be an object"))?;
        for (from, targets) in deps {
            let targets = targets.as_array().ok_or_else(|| {
                keyword_err("dependencies", "only property dependencies are supported")
            })?;
            for to in targets {
                let to = to
                    .as_str()
                    .ok_or_else(|| keyword_err("dependencies", "targets must be strings"))?;
                c = c.prop_dependency(from, to);
            }
        }
    }
    Ok(c.into())
}

// ————————————————————————————————————————————————————————————————————————————
// KEYWORD ACCESSORS
// ————————————————————————————————————————————————————————————————————————————

fn schema_list<'a>(
    keyword: &'static str,
    v: &'a Value,
) -> Result<&'a Vec<Value>, SchemaError> {
    v.as_array()
        .ok_or_else(|| keyword_err(keyword, "must be an array of schemas"))
}

fn get_usize(obj: &Map<String, Value>, keyword: &'static str) -> Result<Option<usize>, SchemaError> {
    match obj.get(keyword) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| keyword_err(keyword, "must be a non-negative integer")),
    }
}

fn get_f64(obj: &Map<String, Value>, keyword: &'static str) -> Result<Option<f64>, SchemaError> {
    match obj.get(keyword) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| keyword_err(keyword, "must be a number")),
    }
}

fn get_bool(obj: &Map<String, Value>, keyword: &'static str) -> Result<bool, SchemaError> {
    match obj.get(keyword) {
        None => Ok(false),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| keyword_err(keyword, "must be a boolean")),
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::generator::Generator;

    #[test]
    fn typed_scalars_compile() {
        let v = compile(
            "V",
            &json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "minLength": 1, "pattern": "^[A-Za-z ]+$"},
                    "age": {"type": "integer", "minimum": 0, "maximum": 150},
                    "score": {"type": "number", "minimum": 0.0, "exclusiveMinimum": true},
                    "active": {"type": "boolean", "default": true}
                },
                "required": ["name"]
            }),
        )
        .unwrap();

        assert!(v.validate(&json!({"name": "Ada", "age": 36})).is_ok());
        assert!(v.validate(&json!({"name": "Ada", "age": 200})).is_err());
        assert!(v.validate(&json!({"name": "Ada", "score": 0.0})).is_err());
        assert!(v.validate(&json!({"age": 36})).is_err());
    }

    #[test]
    fn type_lists_become_alternatives() {
        let v = compile("V", &json!({"type": ["string", "integer"]})).unwrap();
        assert!(v.validate(&json!("x")).is_ok());
        assert!(v.validate(&json!(3)).is_ok());
        assert!(v.validate(&json!(true)).is_err());
    }

    #[test]
    fn untyped_keywords_are_inferred() {
        let v = compile("V", &json!({"enum": ["red", "green"]})).unwrap();
        assert!(v.validate(&json!("red")).is_ok());
        assert!(v.validate(&json!("blue")).is_err());
    }

    #[test]
    fn tuple_items_and_additional() {
        let v = compile(
            "V",
            &json!({
                "type": "array",
                "items": [{"type": "string"}, {"type": "integer"}],
                "additionalItems": {"type": "boolean"},
                "minItems": 2
            }),
        )
        .unwrap();
        assert!(v.validate(&json!(["id", 1, true])).is_ok());
        assert!(v.validate(&json!(["id", 1, "x"])).is_err());
        assert!(v.validate(&json!(["id"])).is_err());
    }

    #[test]
    fn dependencies_and_closed_objects() {
        let v = compile(
            "V",
            &json!({
                "type": "object",
                "properties": {"card": {"type": "string"}, "billing": {"type": "string"}},
                "dependencies": {"card": ["billing"]},
                "additionalProperties": false
            }),
        )
        .unwrap();
        assert!(v.validate(&json!({"card": "visa", "billing": "home"})).is_ok());
        assert!(v.validate(&json!({"card": "visa"})).is_err());
        assert!(v.validate(&json!({"other": 1})).is_err());
    }

    #[test]
    fn root_ref_is_stamped_with_identity_token() {
        let doc = json!({
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": {
                        "value": {"type": "integer"},
                        "next": {"$ref": "#/definitions/node"}
                    },
                    "required": ["value"]
                }
            },
            "$ref": "#/definitions/node"
        });
        let v = compile("Node", &doc).unwrap();

        // validation resolves the cycle through the shared map
        assert!(v
            .validate(&json!({"value": 1, "next": {"value": 2}}))
            .is_ok());
        assert!(v.validate(&json!({"next": {"value": 2}})).is_err());

        // generation terminates and shares by identifier
        let raw = Generator::new().emit_raw(&[v]).unwrap();
        assert!(raw.contains(".root(r0.clone())"));
        assert!(raw.contains(r##"m.set_reference("#/definitions/node""##));
    }

    #[test]
    fn unknown_root_ref_is_an_error() {
        let err = compile("V", &json!({"$ref": "#/definitions/ghost"})).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedRootRef(_)));
    }

    #[test]
    fn non_scalar_enum_entries_are_rejected() {
        let err = compile("V", &json!({"type": "string", "enum": [["a"]]})).unwrap_err();
        assert!(matches!(err, SchemaError::NonScalarEnum("array")));
    }

    #[test]
    fn boolean_schemas() {
        let m = ConstraintMap::new();
        assert!(compile_constraint(&json!(true), &m)
            .unwrap()
            .validate(&json!(42))
            .is_ok());
        assert!(compile_constraint(&json!(false), &m)
            .unwrap()
            .validate(&json!(42))
            .is_err());
    }

    #[test]
    fn compile_then_generate_is_deterministic() {
        let doc = json!({
            "definitions": {
                "addr": {"type": "object", "properties": {"street": {"type": "string"}}},
                "name": {"type": "string", "minLength": 1}
            },
            "type": "object",
            "properties": {
                "address": {"$ref": "#/definitions/addr"},
                "name": {"$ref": "#/definitions/name"}
            }
        });
        let a = Generator::new()
            .emit_raw(&[compile("V", &doc).unwrap()])
            .unwrap();
        let b = Generator::new()
            .emit_raw(&[compile("V", &doc).unwrap()])
            .unwrap();
        assert_eq!(a, b);
        // identifiers assigned lexicographically: addr before name
        let addr = a.find(r##"m.set_reference("#/definitions/addr", r0.clone())"##);
        let name = a.find(r##"m.set_reference("#/definitions/name", r1.clone())"##);
        assert!(addr.is_some() && name.is_some());
    }
}
