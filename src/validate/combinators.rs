//! Validator building blocks.

use super::{Validate, Validator};
use crate::error::ValidationError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Short human description of a value for error messages.
pub fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("a boolean ({b})"),
        Value::Number(n) => format!("a number ({n})"),
        Value::String(s) => format!("a string ({s:?})"),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

fn expected(what: &str, got: &Value) -> ValidationError {
    ValidationError::new(format!("Expected {what}, got {}", describe_value(got)))
}

#[derive(Clone, Copy)]
enum Primitive {
    String,
    Number,
    Integer,
    Boolean,
}

impl Validate for Primitive {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let ok = match self {
            Primitive::String => value.is_string(),
            Primitive::Number => value.is_number(),
            Primitive::Integer => value.as_f64().is_some_and(|n| n.fract() == 0.0),
            Primitive::Boolean => value.is_boolean(),
        };
        if ok {
            return Ok(value.clone());
        }
        let what = match self {
            Primitive::String => "string",
            Primitive::Number => "number",
            Primitive::Integer => "an integer",
            Primitive::Boolean => "boolean",
        };
        Err(expected(what, value))
    }
}

pub fn string() -> Validator {
    Validator::new(Primitive::String)
}

pub fn number() -> Validator {
    Validator::new(Primitive::Number)
}

pub fn integer() -> Validator {
    Validator::new(Primitive::Integer)
}

pub fn boolean() -> Validator {
    Validator::new(Primitive::Boolean)
}

pub fn non_zero_number() -> Validator {
    number().check(|value| match value.as_f64() {
        Some(n) if n != 0.0 => Ok(()),
        _ => Err(format!("Expected a non-zero number, got {}", describe_value(value))),
    })
}

pub fn positive_number() -> Validator {
    number().check(|value| match value.as_f64() {
        Some(n) if n >= 0.0 => Ok(()),
        _ => Err(format!("Expected a positive number, got {}", describe_value(value))),
    })
}

/// Accepts anything.
pub fn any() -> Validator {
    Validator::from_fn(|value| Ok(value.clone()))
}

/// Accepts exactly one value.
pub fn literal(expected_value: impl Into<Value>) -> Validator {
    let expected_value = expected_value.into();
    Validator::from_fn(move |value| {
        if *value == expected_value {
            Ok(value.clone())
        } else {
            Err(expected(&expected_value.to_string(), value))
        }
    })
}

/// Accepts one of a fixed set of strings.
pub fn one_of<I, S>(options: I) -> Validator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let options: Vec<String> = options.into_iter().map(Into::into).collect();
    Validator::from_fn(move |value| match value.as_str() {
        Some(s) if options.iter().any(|o| o == s) => Ok(value.clone()),
        _ => Err(ValidationError::new(format!(
            "Expected one of {options:?}, got {}",
            describe_value(value)
        ))),
    })
}

/// A string that names a record of the given type.
pub fn id_validator(prefix: &str) -> Validator {
    let prefix = prefix.to_string();
    string().check(move |value| match value.as_str() {
        Some(id) if id.starts_with(&format!("{prefix}:")) => Ok(()),
        _ => Err(format!("{prefix} ID must start with \"{prefix}:\"")),
    })
}

struct Object {
    fields: Vec<(String, Validator)>,
}

impl Validate for Object {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let input = value.as_object().ok_or_else(|| expected("an object", value))?;

        let mut out = Map::new();
        for (key, field) in &self.fields {
            match input.get(key) {
                Some(field_value) => {
                    let validated = field
                        .validate(field_value)
                        .map_err(|e| e.at_key(key.as_str()))?;
                    out.insert(key.clone(), validated);
                }
                None if field.is_optional() => {}
                None => {
                    return Err(
                        ValidationError::new("Missing required property").at_key(key.as_str())
                    )
                }
            }
        }

        if let Some(unknown) = input
            .keys()
            .find(|key| !self.fields.iter().any(|(declared, _)| declared == *key))
        {
            return Err(ValidationError::new("Unexpected property").at_key(unknown.as_str()));
        }

        Ok(Value::Object(out))
    }
}

/// A mapping with exactly the declared keys.
pub fn object<I, K>(fields: I) -> Validator
where
    I: IntoIterator<Item = (K, Validator)>,
    K: Into<String>,
{
    Validator::new(Object {
        fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    })
}

/// A sequence whose every element passes `element`.
pub fn array_of(element: Validator) -> Validator {
    Validator::from_fn(move |value| {
        let items = value.as_array().ok_or_else(|| expected("an array", value))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| element.validate(item).map_err(|e| e.at_index(i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    })
}

/// A mapping with arbitrary string keys whose values pass `values`.
pub fn dict_of(values: Validator) -> Validator {
    Validator::from_fn(move |value| {
        let input = value.as_object().ok_or_else(|| expected("an object", value))?;
        let mut out = Map::new();
        for (key, item) in input {
            let validated = values.validate(item).map_err(|e| e.at_key(key.as_str()))?;
            out.insert(key.clone(), validated);
        }
        Ok(Value::Object(out))
    })
}

struct Union {
    key: String,
    variants: BTreeMap<String, Validator>,
}

impl Validate for Union {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let input = value.as_object().ok_or_else(|| expected("an object", value))?;
        let tags: Vec<&String> = self.variants.keys().collect();
        let tag = input.get(&self.key);
        let variant = tag
            .and_then(Value::as_str)
            .and_then(|tag| self.variants.get(tag));
        match variant {
            Some(validator) => validator.validate(value),
            None => {
                let got = tag.map(describe_value).unwrap_or_else(|| "undefined".into());
                Err(ValidationError::new(format!("Expected one of {tags:?}, got {got}"))
                    .at_key(self.key.as_str()))
            }
        }
    }
}

/// Dispatch on a discriminant field to one of several variant validators.
pub fn union<I, K>(key: &str, variants: I) -> Validator
where
    I: IntoIterator<Item = (K, Validator)>,
    K: Into<String>,
{
    Validator::new(Union {
        key: key.to_string(),
        variants: variants.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    })
}

/// Annotate failures beneath `base` with a model name.
pub fn model(name: &str, base: Validator) -> Validator {
    let name = name.to_string();
    Validator::from_fn(move |value| base.validate(value).map_err(|e| e.in_model(&name)))
}

pub(super) struct Nullable(pub(super) Validator);

impl Validate for Nullable {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        if value.is_null() {
            Ok(Value::Null)
        } else {
            self.0.validate(value)
        }
    }

    fn is_optional(&self) -> bool {
        self.0.is_optional()
    }
}

pub(super) struct Optional(pub(super) Validator);

impl Validate for Optional {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        self.0.validate(value)
    }

    fn is_optional(&self) -> bool {
        true
    }
}

type RefineFn = Box<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

pub(super) struct Refine {
    pub(super) base: Validator,
    pub(super) refine: RefineFn,
}

impl Validate for Refine {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let validated = self.base.validate(value)?;
        (self.refine)(validated).map_err(ValidationError::new)
    }

    fn is_optional(&self) -> bool {
        self.base.is_optional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn color() -> Validator {
        one_of(["red", "blue"])
    }

    #[test]
    fn test_primitives() {
        assert!(string().is_valid(&json!("x")));
        assert!(!string().is_valid(&json!(1)));
        assert!(number().is_valid(&json!(1.5)));
        assert!(integer().is_valid(&json!(3)));
        assert!(!integer().is_valid(&json!(3.5)));
        assert!(boolean().is_valid(&json!(false)));
        assert!(literal("camera").is_valid(&json!("camera")));
        assert!(!literal("camera").is_valid(&json!("page")));
        assert!(!non_zero_number().is_valid(&json!(0)));
        assert!(!positive_number().is_valid(&json!(-1)));

        let err = string().validate(&json!(42)).unwrap_err();
        assert_eq!(err.to_string(), "Expected string, got a number (42)");
    }

    #[test]
    fn test_object_exact_keys() {
        let v = object([("x", number()), ("label", string().optional())]);

        assert!(v.is_valid(&json!({"x": 1})));
        assert!(v.is_valid(&json!({"x": 1, "label": "a"})));

        let err = v.validate(&json!({"label": "a"})).unwrap_err();
        assert_eq!(err.to_string(), "x: Missing required property");

        let err = v.validate(&json!({"x": 1, "extra": true})).unwrap_err();
        assert_eq!(err.to_string(), "extra: Unexpected property");

        let err = v.validate(&json!([])).unwrap_err();
        assert_eq!(err.to_string(), "Expected an object, got an array");
    }

    #[test]
    fn test_nested_path_in_error() {
        let v = model("shape", object([("props", object([("color", color())]))]));
        let err = v.validate(&json!({"props": {"color": "green"}})).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"At shape.props.color: Expected one of ["red", "blue"], got a string ("green")"#
        );
    }

    #[test]
    fn test_array_reports_index() {
        let v = array_of(id_validator("shape"));
        assert!(v.is_valid(&json!(["shape:a", "shape:b"])));

        let err = v.validate(&json!(["shape:a", "page:b", 3])).unwrap_err();
        assert_eq!(err.path, vec![crate::error::PathSegment::Index(1)]);
        assert_eq!(err.to_string(), "[1]: shape ID must start with \"shape:\"");
    }

    #[test]
    fn test_union_dispatch() {
        let v = union(
            "type",
            [
                ("image", object([("type", literal("image")), ("w", number())])),
                ("video", object([("type", literal("video")), ("src", string())])),
            ],
        );

        assert!(v.is_valid(&json!({"type": "image", "w": 10})));
        assert!(!v.is_valid(&json!({"type": "image", "src": "x"})));

        let err = v.validate(&json!({"type": "audio"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"type: Expected one of ["image", "video"], got a string ("audio")"#
        );

        let err = v.validate(&json!({"w": 1})).unwrap_err();
        assert!(err.to_string().ends_with("got undefined"));
    }

    #[test]
    fn test_nullable_and_refine() {
        let v = id_validator("shape").nullable();
        assert!(v.is_valid(&json!(null)));
        assert!(v.is_valid(&json!("shape:1")));
        assert!(!v.is_valid(&json!("page:1")));

        let clamp = number().refine(|value| {
            let n = value.as_f64().ok_or("not a number")?;
            Ok(json!(n.min(1.0)))
        });
        assert_eq!(clamp.validate(&json!(5)).unwrap(), json!(1.0));
    }

    #[test]
    fn test_validation_does_not_mutate_input() {
        let v = object([("x", number().refine(|_| Ok(json!(0))))]);
        let input = json!({"x": 5});
        let out = v.validate(&input).unwrap();
        assert_eq!(input, json!({"x": 5}));
        assert_eq!(out, json!({"x": 0}));
    }

    #[test]
    fn test_dict_of() {
        let v = dict_of(number());
        assert!(v.is_valid(&json!({"a": 1, "b": 2})));
        let err = v.validate(&json!({"a": 1, "b": "x"})).unwrap_err();
        assert_eq!(err.path_string(), "b");
    }

    #[test]
    fn test_validate_as_typed() {
        #[derive(Deserialize)]
        struct Point {
            x: f64,
            y: f64,
        }

        let v = object([("x", number()), ("y", number())]);
        let p: Point = v.validate_as(&json!({"x": 1.0, "y": 2.0})).unwrap();
        assert_eq!((p.x, p.y), (1.0, 2.0));
    }
}
