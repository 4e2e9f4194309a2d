use thiserror::Error;

/// A transform function could not coerce its input.
///
/// Every variant carries the original input rendered as JSON so the
/// offending value survives into logs and error chains. Transforms never
/// substitute a default to mask a failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("cannot convert {input} to float")]
    NotNumeric { input: String },
    #[error("cannot convert {input} to integer")]
    NotInteger { input: String },
    #[error("invalid timestamp: {input}")]
    InvalidTimestamp { input: String },
    #[error("epoch value {input} is outside the representable date range")]
    EpochOutOfRange { input: String },
    #[error("cannot normalize side value: {input}")]
    UnknownSide { input: String },
}

/// A field mapping could not be satisfied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// The mapping's transform rejected the extracted value. The underlying
    /// [`ConversionError`] is preserved as the chained cause.
    #[error("transform failed for target field '{target_field}': {source}")]
    Transform {
        target_field: String,
        #[source]
        source: ConversionError,
    },

    /// A required source field was absent (or null) and no default was set.
    #[error("required source field '{source_field}' is missing for target field '{target_field}'")]
    MissingField {
        target_field: String,
        source_field: String,
    },
}

/// Adapter registry misuse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("adapter source name cannot be empty")]
    EmptyName,
    #[error("adapter '{name}' is already registered")]
    DuplicateName { name: String },
    /// Lookup for an unregistered name. `registered` lists the names known
    /// at the time of the lookup (or `none`) so the caller can see what was
    /// actually available instead of guessing.
    #[error("no adapter registered for '{name}'; registered adapters: {registered}")]
    NotFound { name: String, registered: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_embeds_input() {
        let err = ConversionError::NotNumeric {
            input: "\"abc\"".to_string(),
        };
        assert!(err.to_string().contains("\"abc\""));
    }

    #[test]
    fn mapping_error_chains_conversion_cause() {
        use std::error::Error;

        let err = MappingError::Transform {
            target_field: "price".to_string(),
            source: ConversionError::NotNumeric {
                input: "\"n/a\"".to_string(),
            },
        };

        assert!(err.to_string().contains("price"));
        assert!(err.to_string().contains("n/a"));
        let cause = err.source().expect("cause must be preserved");
        assert!(cause.to_string().contains("n/a"));
    }

    #[test]
    fn not_found_error_lists_registered_names() {
        let err = AdapterError::NotFound {
            name: "kraken".to_string(),
            registered: "bitbank, stooq".to_string(),
        };
        assert!(err.to_string().contains("bitbank, stooq"));
    }
}
