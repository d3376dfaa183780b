//! Runtime validation: walk a constraint tree against a `serde_json::Value`
//! and report pass or the first typed failure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::constraint::{
    ArrayConstraint, BooleanConstraint, Constraint, EnumConstraint, IntegerConstraint,
    NumberConstraint, ObjectConstraint, ReferenceConstraint, StringConstraint, Validator,
};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("expected {expected}, found {found}")]
    InvalidType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("string length {len} below minimum {min}")]
    TooShort { len: usize, min: usize },
    #[error("string length {len} above maximum {max}")]
    TooLong { len: usize, max: usize },
    #[error("string does not match pattern {pattern:?}")]
    PatternMismatch { pattern: String },
    #[error("string is not a valid {format:?}")]
    FormatMismatch { format: String },
    #[error("value is not one of the enumerated values")]
    NotInEnum,
    #[error("value {value} violates {bound} {limit}")]
    OutOfRange {
        value: f64,
        bound: &'static str,
        limit: f64,
    },
    #[error("number is not an integer")]
    NotAnInteger,
    #[error("array length {len} below minItems {min}")]
    TooFewItems { len: usize, min: usize },
    #[error("array length {len} above maxItems {max}")]
    TooManyItems { len: usize, max: usize },
    #[error("array items are not unique")]
    DuplicateItems,
    #[error("missing required property {0:?}")]
    MissingProperty(String),
    #[error("property {from:?} requires property {to:?}")]
    MissingDependency { from: String, to: String },
    #[error("item {index}: {source}")]
    Item {
        index: usize,
        source: Box<ValidationError>,
    },
    #[error("property {name:?}: {source}")]
    Property {
        name: String,
        source: Box<ValidationError>,
    },
    #[error("no alternative matched")]
    NoneMatched,
    #[error("expected exactly one alternative to match, {matched} matched")]
    NotExactlyOne { matched: usize },
    #[error("negated constraint matched")]
    NotViolated,
    #[error("reference {0:?} is not registered")]
    UnresolvedReference(String),
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

static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

impl Constraint {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        match self {
            Constraint::Empty => Ok(()),
            Constraint::Validator(inner) => inner.validate(v),
            // an empty combinator carries no constraint at all, so it passes
            // vacuously, matching what rebuilt graphs do after generation
            // collapses it to the Empty sentinel
            Constraint::Any(c) => {
                if c.constraints.is_empty() || c.constraints.iter().any(|c| c.validate(v).is_ok())
                {
                    Ok(())
                } else {
                    Err(ValidationError::NoneMatched)
                }
            }
            Constraint::All(c) => {
                for child in &c.constraints {
                    child.validate(v)?;
                }
                Ok(())
            }
            Constraint::OneOf(c) => {
                if c.constraints.is_empty() {
                    return Ok(());
                }
                let matched = c
                    .constraints
                    .iter()
                    .filter(|c| c.validate(v).is_ok())
                    .count();
                if matched == 1 {
                    Ok(())
                } else {
                    Err(ValidationError::NotExactlyOne { matched })
                }
            }
            Constraint::Not(child) => match child.validate(v) {
                Ok(()) => Err(ValidationError::NotViolated),
                Err(_) => Ok(()),
            },
            Constraint::Reference(c) => c.validate(v),
            Constraint::String(c) => c.validate(v),
            Constraint::Number(c) => c.validate(v),
            Constraint::Integer(c) => c.validate(v),
            Constraint::Boolean(c) => c.validate(v),
            Constraint::Array(c) => c.validate(v),
            Constraint::Object(c) => c.validate(v),
        }
    }
}

impl Validator {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        self.root.validate(v)
    }
}

impl ReferenceConstraint {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        let target = self
            .map
            .resolve(&self.name)
            .ok_or_else(|| ValidationError::UnresolvedReference(self.name.clone()))?;
        target.validate(v)
    }
}

impl StringConstraint {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        let s = v.as_str().ok_or(ValidationError::InvalidType {
            expected: "string",
            found: json_kind(v),
        })?;

        let len = s.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                return Err(ValidationError::TooShort { len, min });
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                return Err(ValidationError::TooLong { len, max });
            }
        }

        if let Some(format) = &self.format {
            if !format_ok(format, s) {
                return Err(ValidationError::FormatMismatch {
                    format: format.clone(),
                });
            }
        }

        if let Some(rx) = &self.pattern {
            if !rx.is_match(s) {
                return Err(ValidationError::PatternMismatch {
                    pattern: rx.as_str().to_string(),
                });
            }
        }

        if let Some(enum_) = &self.enum_ {
            enum_.validate(v)?;
        }

        Ok(())
    }
}

/// Known formats are checked; unknown format tags pass (they are carried
/// for emission, not enforcement).
fn format_ok(format: &str, s: &str) -> bool {
    match format {
        "date-time" => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
        "email" => EMAIL_RX.is_match(s),
        _ => true,
    }
}

impl EnumConstraint {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        if self.values.iter().any(|s| s.matches(v)) {
            Ok(())
        } else {
            Err(ValidationError::NotInEnum)
        }
    }
}

fn check_bound(
    value: f64,
    limit: Option<f64>,
    exclusive: bool,
    lower: bool,
) -> Result<(), ValidationError> {
    let Some(limit) = limit else { return Ok(()) };
    let ok = match (lower, exclusive) {
        (true, false) => value >= limit,
        (true, true) => value > limit,
        (false, false) => value <= limit,
        (false, true) => value < limit,
    };
    if ok {
        Ok(())
    } else {
        let bound = match (lower, exclusive) {
            (true, false) => "minimum",
            (true, true) => "exclusive minimum",
            (false, false) => "maximum",
            (false, true) => "exclusive maximum",
        };
        Err(ValidationError::OutOfRange {
            value,
            bound,
            limit,
        })
    }
}

impl NumberConstraint {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        let n = v.as_f64().ok_or(ValidationError::InvalidType {
            expected: "number",
            found: json_kind(v),
        })?;
        check_bound(n, self.minimum, self.exclusive_minimum, true)?;
        check_bound(n, self.maximum, self.exclusive_maximum, false)?;
        Ok(())
    }
}

impl IntegerConstraint {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        let n = v.as_f64().ok_or(ValidationError::InvalidType {
            expected: "integer",
            found: json_kind(v),
        })?;
        if n.fract() != 0.0 {
            return Err(ValidationError::NotAnInteger);
        }
        check_bound(n, self.minimum, false, true)?;
        check_bound(n, self.maximum, false, false)?;
        Ok(())
    }
}

impl BooleanConstraint {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        if v.is_boolean() {
            Ok(())
        } else {
            Err(ValidationError::InvalidType {
                expected: "boolean",
                found: json_kind(v),
            })
        }
    }
}

impl ArrayConstraint {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        let xs = v.as_array().ok_or(ValidationError::InvalidType {
            expected: "array",
            found: json_kind(v),
        })?;

        let len = xs.len();
        if let Some(min) = self.min_items {
            if len < min {
                return Err(ValidationError::TooFewItems { len, min });
            }
        }
        if let Some(max) = self.max_items {
            if len > max {
                return Err(ValidationError::TooManyItems { len, max });
            }
        }

        if self.unique_items {
            for i in 0..len {
                for j in (i + 1)..len {
                    if xs[i] == xs[j] {
                        return Err(ValidationError::DuplicateItems);
                    }
                }
            }
        }

        let item = |index: usize, c: &Constraint, el: &Value| {
            c.validate(el).map_err(|source| ValidationError::Item {
                index,
                source: Box::new(source),
            })
        };

        if !self.positional_items.is_empty() {
            for (i, el) in xs.iter().enumerate() {
                if let Some(c) = self.positional_items.get(i) {
                    item(i, c, el)?;
                } else if let Some(add) = &self.additional_items {
                    item(i, add, el)?;
                }
            }
        } else if let Some(items) = &self.items {
            for (i, el) in xs.iter().enumerate() {
                item(i, items, el)?;
            }
        }

        Ok(())
    }
}

impl ObjectConstraint {
    pub fn validate(&self, v: &Value) -> Result<(), ValidationError> {
        let m = v.as_object().ok_or(ValidationError::InvalidType {
            expected: "object",
            found: json_kind(v),
        })?;

        for name in &self.required {
            if !m.contains_key(name) {
                return Err(ValidationError::MissingProperty(name.clone()));
            }
        }

        for (name, value) in m {
            let checked = if let Some(c) = self.properties.get(name) {
                Some(c)
            } else {
                self.additional_properties.as_deref()
            };
            if let Some(c) = checked {
                c.validate(value).map_err(|source| ValidationError::Property {
                    name: name.clone(),
                    source: Box::new(source),
                })?;
            }
        }

        for (from, deps) in &self.prop_dependencies {
            if !m.contains_key(from) {
                continue;
            }
            for to in deps {
                if !m.contains_key(to) {
                    return Err(ValidationError::MissingDependency {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::constraint::*;

    #[test]
    fn string_bounds_and_pattern() {
        let c: Constraint = string().min_length(2).max_length(4).pattern("^[a-z]+$").into();
        assert!(c.validate(&json!("abc")).is_ok());
        assert!(c.validate(&json!("a")).is_err());
        assert!(c.validate(&json!("abcde")).is_err());
        assert!(c.validate(&json!("ABC")).is_err());
        assert!(c.validate(&json!(42)).is_err());
    }

    #[test]
    fn string_enum_membership() {
        let c: Constraint = string()
            .enum_values([Scalar::from("on"), Scalar::from("off")])
            .into();
        assert!(c.validate(&json!("on")).is_ok());
        assert!(c.validate(&json!("dim")).is_err());
    }

    #[test]
    fn date_time_format_checked() {
        let c: Constraint = string().format("date-time").into();
        assert!(c.validate(&json!("2024-03-01T10:00:00Z")).is_ok());
        assert!(c.validate(&json!("yesterday")).is_err());
        // unknown formats pass through
        let c: Constraint = string().format("hostname").into();
        assert!(c.validate(&json!("anything goes")).is_ok());
    }

    #[test]
    fn number_exclusive_bounds() {
        let c: Constraint = number()
            .minimum(0.0)
            .exclusive_minimum(true)
            .maximum(1.0)
            .into();
        assert!(c.validate(&json!(0.5)).is_ok());
        assert!(c.validate(&json!(1.0)).is_ok());
        assert!(c.validate(&json!(0.0)).is_err());
        assert!(c.validate(&json!(1.5)).is_err());
    }

    #[test]
    fn integer_rejects_fractions() {
        let c: Constraint = integer().minimum(0).into();
        assert!(c.validate(&json!(3)).is_ok());
        assert!(c.validate(&json!(3.0)).is_ok());
        assert!(c.validate(&json!(3.5)).is_err());
        assert!(c.validate(&json!(-1)).is_err());
    }

    #[test]
    fn combinators() {
        let either: Constraint = any().add(string()).add(integer()).into();
        assert!(either.validate(&json!("x")).is_ok());
        assert!(either.validate(&json!(1)).is_ok());
        assert!(either.validate(&json!(true)).is_err());

        let both: Constraint = all()
            .add(integer().minimum(0))
            .add(integer().maximum(10))
            .into();
        assert!(both.validate(&json!(5)).is_ok());
        assert!(both.validate(&json!(11)).is_err());

        // 3 matches both arms of the oneOf, so it must fail
        let exactly: Constraint = one_of()
            .add(integer().minimum(0).maximum(5))
            .add(integer().minimum(3).maximum(9))
            .into();
        assert!(exactly.validate(&json!(1)).is_ok());
        assert!(exactly.validate(&json!(7)).is_ok());
        assert!(exactly.validate(&json!(3)).is_err());

        let negated = not(string());
        assert!(negated.validate(&json!(1)).is_ok());
        assert!(negated.validate(&json!("s")).is_err());
    }

    #[test]
    fn empty_combinators_pass_like_their_rebuilt_form() {
        // generation rewrites a childless combinator as the Empty sentinel,
        // so the in-memory graph must agree with the rebuilt one on every
        // value
        let battery = [json!(1), json!("x"), json!(null), json!({"a": 1})];
        for original in [
            Constraint::from(any()),
            Constraint::from(one_of()),
            Constraint::from(all()),
        ] {
            for value in &battery {
                assert_eq!(
                    original.validate(value).is_ok(),
                    empty().validate(value).is_ok(),
                    "outcome mismatch for {value} under {original:?}"
                );
            }
        }
    }

    #[test]
    fn array_positional_and_additional() {
        let c: Constraint = array()
            .positional_items(vec![string().into(), integer().into()])
            .additional_items(boolean())
            .into();
        assert!(c.validate(&json!(["id", 3, true, false])).is_ok());
        assert!(c.validate(&json!(["id", 3, "nope"])).is_err());
        assert!(c.validate(&json!([3, "id"])).is_err());
    }

    #[test]
    fn array_pooled_items_and_uniqueness() {
        let c: Constraint = array()
            .items(integer())
            .min_items(1)
            .max_items(3)
            .unique_items(true)
            .into();
        assert!(c.validate(&json!([1, 2, 3])).is_ok());
        assert!(c.validate(&json!([])).is_err());
        assert!(c.validate(&json!([1, 2, 3, 4])).is_err());
        assert!(c.validate(&json!([1, 1])).is_err());
        assert!(c.validate(&json!([1, "x"])).is_err());
    }

    #[test]
    fn object_required_props_and_dependencies() {
        let c: Constraint = object()
            .add_prop("name", string().min_length(1))
            .add_prop("age", integer().minimum(0))
            .required(["name"])
            .prop_dependency("card", "billing")
            .additional_properties(not(empty()))
            .into();

        assert!(c.validate(&json!({"name": "ok", "age": 3})).is_ok());
        assert!(c.validate(&json!({"age": 3})).is_err(), "missing required");
        assert!(c.validate(&json!({"name": ""})).is_err(), "prop constraint");
        assert!(
            c.validate(&json!({"name": "x", "extra": 1})).is_err(),
            "additionalProperties rejects unknown keys"
        );
        assert!(
            c.validate(&json!({"name": "x", "card": "visa", "age": 1}))
                .is_err(),
            "dependency: card without billing"
        );
    }

    #[test]
    fn reference_resolves_through_shared_map_and_terminates_on_cycles() {
        let m = ConstraintMap::new();
        // node = { value: int, next?: node }
        m.set_reference(
            "#/definitions/node",
            object()
                .add_prop("value", integer())
                .add_prop("next", reference(&m).refers_to("#/definitions/node"))
                .required(["value"]),
        );
        let c: Constraint = reference(&m).refers_to("#/definitions/node").into();

        assert!(c
            .validate(&json!({"value": 1, "next": {"value": 2}}))
            .is_ok());
        assert!(c
            .validate(&json!({"value": 1, "next": {"next": {}}}))
            .is_err());

        let dangling: Constraint = reference(&m).refers_to("#/definitions/missing").into();
        assert!(dangling.validate(&json!(1)).is_err());
    }
}
