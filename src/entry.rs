// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Decoded binlog records.
//!
//! A [`Batch`] is what one `get()` returns: an id plus an ordered list of
//! [`Entry`] values. Entries are either transaction markers or `RowData`
//! entries whose `store_value` is an encoded [`RowChange`]. Decoding the
//! payload is delegated to a [`RowChangeCodec`], so the wire encoding used
//! by a relay deployment stays pluggable.
//!
//! # Sentinel Batch
//!
//! `id == -1` means "nothing arrived before the timeout". It is a normal
//! outcome and must not be acked.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Batch id returned when no data was available before the timeout.
pub const EMPTY_BATCH_ID: i64 = -1;

/// Kind of binlog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    TransactionBegin,
    TransactionEnd,
    RowData,
}

impl EntryType {
    /// Transaction begin/end markers carry no row changes.
    pub fn is_transaction_marker(self) -> bool {
        matches!(self, EntryType::TransactionBegin | EntryType::TransactionEnd)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransactionBegin => write!(f, "TRANSACTIONBEGIN"),
            Self::TransactionEnd => write!(f, "TRANSACTIONEND"),
            Self::RowData => write!(f, "ROWDATA"),
        }
    }
}

/// Statement kind that produced a row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Erase,
    Query,
    Truncate,
    Rename,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Erase => "ERASE",
            Self::Query => "QUERY",
            Self::Truncate => "TRUNCATE",
            Self::Rename => "RENAME",
        };
        f.write_str(name)
    }
}

/// Binlog position and table identity of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryHeader {
    pub logfile_name: String,
    pub logfile_offset: i64,
    /// Statement execution time (epoch millis)
    pub execute_time: i64,
    pub schema_name: String,
    pub table_name: String,
    /// `None` for transaction markers
    pub event_type: Option<EventType>,
}

impl EntryHeader {
    /// `schema.table`, the string subscription filters match against.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }
}

/// One unit of the binlog stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub header: EntryHeader,
    pub entry_type: EntryType,
    /// Encoded [`RowChange`] for `RowData` entries, empty for markers.
    #[serde(default)]
    pub store_value: Vec<u8>,
}

impl Entry {
    /// Transaction begin marker at a binlog position.
    pub fn transaction_begin(logfile_name: &str, logfile_offset: i64) -> Self {
        Self::marker(EntryType::TransactionBegin, logfile_name, logfile_offset)
    }

    /// Transaction end marker at a binlog position.
    pub fn transaction_end(logfile_name: &str, logfile_offset: i64) -> Self {
        Self::marker(EntryType::TransactionEnd, logfile_name, logfile_offset)
    }

    fn marker(entry_type: EntryType, logfile_name: &str, logfile_offset: i64) -> Self {
        Self {
            header: EntryHeader {
                logfile_name: logfile_name.to_string(),
                logfile_offset,
                ..Default::default()
            },
            entry_type,
            store_value: Vec::new(),
        }
    }

    /// Row-data entry carrying `change` encoded with `codec`.
    pub fn row_data<C: RowChangeCodec + ?Sized>(
        header: EntryHeader,
        change: &RowChange,
        codec: &C,
    ) -> Result<Self, CodecError> {
        let header = EntryHeader {
            event_type: Some(change.event_type),
            ..header
        };
        Ok(Self {
            header,
            entry_type: EntryType::RowData,
            store_value: codec.encode(change)?,
        })
    }

    /// Decode the row change carried by a `RowData` entry.
    pub fn row_change<C: RowChangeCodec + ?Sized>(&self, codec: &C) -> Result<RowChange, CodecError> {
        if self.entry_type != EntryType::RowData {
            return Err(CodecError(format!(
                "{} entry carries no row change",
                self.entry_type
            )));
        }
        codec.decode(&self.store_value)
    }
}

/// A decoded row-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange {
    pub event_type: EventType,
    #[serde(default)]
    pub is_ddl: bool,
    /// Original statement, populated for DDL / query events.
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub rows: Vec<RowData>,
}

impl RowChange {
    /// DML change with the given rows.
    pub fn new(event_type: EventType, rows: Vec<RowData>) -> Self {
        Self {
            event_type,
            is_ddl: false,
            sql: String::new(),
            rows,
        }
    }
}

/// Before/after images of one row.
///
/// `before_columns` is populated for DELETE and UPDATE,
/// `after_columns` for INSERT and UPDATE.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowData {
    #[serde(default)]
    pub before_columns: Vec<Column>,
    #[serde(default)]
    pub after_columns: Vec<Column>,
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub value: String,
    /// Whether the column changed in this event.
    pub updated: bool,
    #[serde(default)]
    pub is_key: bool,
    #[serde(default)]
    pub is_null: bool,
    #[serde(default)]
    pub mysql_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, value: impl Into<String>, updated: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            updated,
            ..Default::default()
        }
    }
}

/// Result of one `get()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: i64,
    pub entries: Vec<Entry>,
}

impl Batch {
    /// The "no data this poll" sentinel.
    pub fn empty() -> Self {
        Self {
            id: EMPTY_BATCH_ID,
            entries: Vec::new(),
        }
    }

    /// True for the sentinel (nothing to ack).
    pub fn is_empty(&self) -> bool {
        self.id == EMPTY_BATCH_ID || self.entries.is_empty()
    }

    /// Only the `RowData` entries, transaction markers skipped.
    pub fn row_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(|e| e.entry_type == EntryType::RowData)
    }
}

/// Failure decoding or encoding a row-change payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("row change codec error: {0}")]
pub struct CodecError(pub String);

impl From<CodecError> for crate::error::CanalError {
    fn from(e: CodecError) -> Self {
        crate::error::CanalError::Decode(e.0)
    }
}

/// Encoding of [`RowChange`] payloads inside `RowData` entries.
pub trait RowChangeCodec: Send + Sync {
    fn encode(&self, change: &RowChange) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, payload: &[u8]) -> Result<RowChange, CodecError>;
}

/// JSON payload codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRowCodec;

impl RowChangeCodec for JsonRowCodec {
    fn encode(&self, change: &RowChange) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(change).map_err(|e| CodecError(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<RowChange, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError(e.to_string()))
    }
}
