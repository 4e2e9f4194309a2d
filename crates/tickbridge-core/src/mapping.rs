//! Declarative field mapping from raw payloads to canonical record fields.
//!
//! A [`FieldMapping`] describes how one target field is produced: which
//! dot-path to read from the raw payload, an optional transform, and the
//! default/required policy applied when the source field is absent.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tickbridge_core::{transforms, FieldMapping, Mapped};
//!
//! let mapping = FieldMapping::new("bid", "data.buy").with_transform(transforms::to_float);
//! let raw = json!({"data": {"buy": "100.5"}});
//!
//! assert_eq!(mapping.apply(&raw).unwrap(), Mapped::Value(json!(100.5)));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ConversionError, MappingError};
use crate::transforms::Transform;

/// Result of applying a mapping: either a value for the target field or a
/// tagged absence. `Absent` is distinct from `Value(Value::Null)` so callers
/// can omit the field entirely instead of writing a null.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    Value(Value),
    Absent,
}

impl Mapped {
    pub fn into_option(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent => None,
        }
    }
}

/// How a present-but-null source value is treated.
///
/// Vendors frequently encode "no data" as an explicit `null`, so the default
/// treats null exactly like a missing field (the default/required policy
/// still applies). Sources that distinguish "omitted" from "explicitly
/// empty" can opt into [`NullPolicy::TreatAsValue`] per mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    TreatAsMissing,
    TreatAsValue,
}

impl Default for NullPolicy {
    fn default() -> Self {
        Self::TreatAsMissing
    }
}

/// Resolve a dot-path inside a nested payload.
///
/// An empty path denotes the whole document. A missing intermediate key, or
/// a non-object in the middle of the path, is a normal not-found case and
/// yields `None` rather than an error.
pub fn lookup_path<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(source);
    }
    let mut current = source;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Declarative rule mapping one source field to one target field.
///
/// Immutable once constructed; adapters build their mapping tables at
/// startup and apply them to every raw payload.
#[derive(Clone)]
pub struct FieldMapping {
    target_field: String,
    source_field: String,
    transform: Option<Transform>,
    default: Option<Value>,
    required: bool,
    null_policy: NullPolicy,
}

impl std::fmt::Debug for FieldMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMapping")
            .field("target_field", &self.target_field)
            .field("source_field", &self.source_field)
            .field("transform", &self.transform.is_some())
            .field("default", &self.default)
            .field("required", &self.required)
            .field("null_policy", &self.null_policy)
            .finish()
    }
}

impl FieldMapping {
    pub fn new(target_field: impl Into<String>, source_field: impl Into<String>) -> Self {
        Self {
            target_field: target_field.into(),
            source_field: source_field.into(),
            transform: None,
            default: None,
            required: false,
            null_policy: NullPolicy::default(),
        }
    }

    /// Attach a transform applied to the extracted value.
    ///
    /// Accepts the plain functions from [`transforms`](crate::transforms)
    /// as well as closures such as `transforms::local_offset(9)`.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Value returned when the source field is absent.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Fail extraction when the source field is absent and no default is set.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn null_policy(mut self, policy: NullPolicy) -> Self {
        self.null_policy = policy;
        self
    }

    pub fn target_field(&self) -> &str {
        &self.target_field
    }

    pub fn source_field(&self) -> &str {
        &self.source_field
    }

    /// Apply the mapping to a raw payload.
    ///
    /// Extraction walks the dot-path, treats null per the mapping's
    /// [`NullPolicy`], runs the transform on found values, and falls back to
    /// the default/required policy otherwise. Transform failures propagate
    /// as [`MappingError::Transform`] naming the target field and chaining
    /// the underlying [`ConversionError`].
    pub fn apply(&self, source: &Value) -> Result<Mapped, MappingError> {
        let found = match lookup_path(source, &self.source_field) {
            Some(Value::Null) if self.null_policy == NullPolicy::TreatAsMissing => None,
            other => other,
        };

        let Some(value) = found else {
            if let Some(default) = &self.default {
                return Ok(Mapped::Value(default.clone()));
            }
            if self.required {
                return Err(MappingError::MissingField {
                    target_field: self.target_field.clone(),
                    source_field: self.source_field.clone(),
                });
            }
            return Ok(Mapped::Absent);
        };

        let mapped = match &self.transform {
            Some(transform) => transform(value).map_err(|source| MappingError::Transform {
                target_field: self.target_field.clone(),
                source,
            })?,
            None => value.clone(),
        };
        Ok(Mapped::Value(mapped))
    }
}
