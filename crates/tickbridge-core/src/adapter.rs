//! Per-source adapter seam: mapping tables keyed by record kind.

use serde_json::{Map, Value};

use crate::error::MappingError;
use crate::mapping::{FieldMapping, Mapped};

/// Canonical record families an adapter can supply mappings for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Quote,
    Ohlcv,
    Trade,
    OrderBook,
    Instrument,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Ohlcv => "ohlcv",
            Self::Trade => "trade",
            Self::OrderBook => "order_book",
            Self::Instrument => "instrument",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A data-source adapter.
///
/// Implementations declare their source name and supply one mapping table
/// per record kind they support; an empty table means the kind is not
/// available from that source. Adapters are stateless factories for
/// mapping tables, so the registry can hand out fresh instances freely.
pub trait SourceAdapter: Send + Sync {
    fn source_name(&self) -> &str;

    fn quote_mappings(&self) -> Vec<FieldMapping> {
        Vec::new()
    }

    fn ohlcv_mappings(&self) -> Vec<FieldMapping> {
        Vec::new()
    }

    fn trade_mappings(&self) -> Vec<FieldMapping> {
        Vec::new()
    }

    fn orderbook_mappings(&self) -> Vec<FieldMapping> {
        Vec::new()
    }

    fn instrument_mappings(&self) -> Vec<FieldMapping> {
        Vec::new()
    }

    fn mappings(&self, kind: RecordKind) -> Vec<FieldMapping> {
        match kind {
            RecordKind::Quote => self.quote_mappings(),
            RecordKind::Ohlcv => self.ohlcv_mappings(),
            RecordKind::Trade => self.trade_mappings(),
            RecordKind::OrderBook => self.orderbook_mappings(),
            RecordKind::Instrument => self.instrument_mappings(),
        }
    }
}

/// Run a mapping table against one raw payload.
///
/// Target fields whose mapping yields a tagged absence are omitted from
/// the output instead of being written as null. The first mapping failure
/// aborts the record.
pub fn map_record(
    mappings: &[FieldMapping],
    raw: &Value,
) -> Result<Map<String, Value>, MappingError> {
    let mut record = Map::new();
    for mapping in mappings {
        match mapping.apply(raw)? {
            Mapped::Value(value) => {
                record.insert(mapping.target_field().to_string(), value);
            }
            Mapped::Absent => {}
        }
    }
    Ok(record)
}
