//! # Tickbridge Core
//!
//! Client-side ingestion core for pulling market data out of heterogeneous
//! vendor HTTP APIs and normalizing it into canonical records.
//!
//! ## Overview
//!
//! This crate provides the foundational components for Tickbridge:
//!
//! - **Transform library** of pure value-coercion functions
//! - **Field-mapping engine** driving declarative raw-to-canonical mapping
//! - **Token-bucket rate limiter** shared across concurrent callers
//! - **Retry policy** with exponential backoff and jitter
//! - **Response cache** with per-entry TTL and LRU eviction
//! - **Resilient HTTP client** orchestrating all of the above
//! - **Adapter registry** resolving source names to adapter factories
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | Source adapter trait and record mapping |
//! | [`cache`] | Bounded, time-expiring response cache |
//! | [`error`] | Conversion, mapping and registry error types |
//! | [`http`] | Resilient HTTP client and transport seam |
//! | [`mapping`] | Declarative field mappings |
//! | [`rate_limit`] | Token-bucket admission control |
//! | [`registry`] | Process-wide adapter registry |
//! | [`retry`] | Retry policy with backoff and jitter |
//! | [`transforms`] | Value-coercion transform functions |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tickbridge_core::{FetchRequest, FieldMapping, HttpClient, map_record, transforms};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::builder()
//!         .rate_limit(10.0, 5.0)
//!         .cache(1000, Duration::from_secs(300))
//!         .build()?;
//!
//!     let raw = client
//!         .fetch_json(&FetchRequest::get("https://api.example.com/v1/ticker"))
//!         .await?;
//!
//!     let mappings = vec![
//!         FieldMapping::new("bid", "data.buy")
//!             .with_transform(transforms::to_float)
//!             .required(),
//!         FieldMapping::new("timestamp", "data.ts")
//!             .with_transform(transforms::unix_timestamp_ms),
//!     ];
//!     let record = map_record(&mappings, &raw)?;
//!     println!("bid: {}", record["bid"]);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result` types with structured errors: transport
//! and status failures surface as [`HttpError`], value coercion as
//! [`ConversionError`] chained inside [`MappingError`], and registry misuse
//! as [`AdapterError`]. Failures are never downgraded to default values.

pub mod adapter;
pub mod cache;
pub mod error;
pub mod http;
pub mod mapping;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod transforms;

// Re-export commonly used types at crate root for convenience

// Adapter seam
pub use adapter::{map_record, RecordKind, SourceAdapter};

// Caching
pub use cache::{ResponseCache, DEFAULT_CACHE_MAX_SIZE, DEFAULT_CACHE_TTL};

// Error types
pub use error::{AdapterError, ConversionError, MappingError};

// HTTP client types
pub use http::{
    CacheMode, FetchRequest, HttpClient, HttpClientBuilder, HttpError, HttpTransport,
    ReqwestTransport, TransportFailure, TransportRequest, TransportResponse, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_TIMEOUT,
};

// Field mapping
pub use mapping::{lookup_path, FieldMapping, Mapped, NullPolicy};

// Rate limiting
pub use rate_limit::RateLimiter;

// Registry
pub use registry::{registry, AdapterFactory, AdapterRegistry};

// Retry logic
pub use retry::{
    RetryPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_JITTER_FRACTION, DEFAULT_MAX_DELAY,
    DEFAULT_MAX_RETRIES,
};

// Transforms
pub use transforms::Transform;
