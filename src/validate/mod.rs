//! Runtime validator combinators.
//!
//! Every value entering the store passes through a [`Validator`]. Validators
//! check a `serde_json::Value` against a declared shape and, on success,
//! return a value structurally guaranteed to match it. They are built from
//! small pieces:
//!
//! - primitives: [`string`], [`number`], [`integer`], [`boolean`],
//!   [`literal`], [`one_of`]
//! - structure: [`object`], [`array_of`], [`dict_of`], [`union`]
//! - wrappers: [`Validator::nullable`], [`Validator::optional`],
//!   [`Validator::refine`], [`model`]
//!
//! # Example
//!
//! ```ignore
//! use record_store::validate::{self, object, literal, number, string};
//!
//! let camera = validate::model(
//!     "camera",
//!     object([
//!         ("typeName", literal("camera")),
//!         ("id", validate::id_validator("camera")),
//!         ("x", number()),
//!         ("y", number()),
//!         ("z", number()),
//!     ]),
//! );
//! ```

mod combinators;

pub use combinators::{
    any, array_of, boolean, describe_value, dict_of, id_validator, integer, literal, model,
    non_zero_number, number, object, one_of, positive_number, string, union,
};

use crate::error::ValidationError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A runtime check over dynamic input.
///
/// Implementations must be pure: they never mutate the input and always
/// terminate.
pub trait Validate: Send + Sync {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError>;

    /// Whether an enclosing object may omit the key entirely.
    fn is_optional(&self) -> bool {
        false
    }
}

impl<F> Validate for F
where
    F: Fn(&Value) -> Result<Value, ValidationError> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        self(value)
    }
}

/// Shared handle to a validator.
#[derive(Clone)]
pub struct Validator(Arc<dyn Validate>);

impl Validator {
    pub fn new(inner: impl Validate + 'static) -> Self {
        Validator(Arc::new(inner))
    }

    /// Build a validator from a closure.
    pub fn from_fn<F>(check: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, ValidationError> + Send + Sync + 'static,
    {
        Validator(Arc::new(check))
    }

    pub fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        self.0.validate(value)
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.0.validate(value).is_ok()
    }

    pub fn is_optional(&self) -> bool {
        self.0.is_optional()
    }

    /// Validate, then deserialize into a concrete type.
    pub fn validate_as<T: DeserializeOwned>(&self, value: &Value) -> Result<T, ValidationError> {
        let validated = self.validate(value)?;
        serde_json::from_value(validated)
            .map_err(|e| ValidationError::new(format!("Could not decode validated value: {e}")))
    }

    /// Additionally accept `null`.
    pub fn nullable(self) -> Validator {
        Validator::new(combinators::Nullable(self))
    }

    /// Allow an enclosing object to omit the key.
    pub fn optional(self) -> Validator {
        Validator::new(combinators::Optional(self))
    }

    /// Chain a transform after base validation.
    ///
    /// The closure receives the validated value and either returns the
    /// (possibly transformed) value or a failure message.
    pub fn refine<F>(self, refine: F) -> Validator
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Validator::new(combinators::Refine {
            base: self,
            refine: Box::new(refine),
        })
    }

    /// Chain a predicate after base validation.
    pub fn check<F>(self, check: F) -> Validator
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.refine(move |value| check(&value).map(|()| value))
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}
