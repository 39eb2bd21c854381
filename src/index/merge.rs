//! Identity merge of partial index documents.
//!
//! A layer index may be split over many files (one per layer-branch, or one
//! per mirror snapshot). Records are combined by `id`: a record already
//! present must be value-identical to the incoming one, anything else is a
//! data-integrity error.

use std::collections::HashMap;

use serde_json::Value;

use super::IndexDocument;
use crate::error::{Error, Result};

fn record_key(table: &str, record: &Value) -> Result<String> {
    match record.get("id") {
        Some(Value::Null) | None => Err(Error::InvalidRecord {
            table: table.to_string(),
            message: format!("record without id: {}", record),
        }),
        Some(id) => Ok(id.to_string()),
    }
}

/// Merge `incoming` records into `existing`, comparing records by `id`.
///
/// New records are appended in their incoming order. A record whose id is
/// already present is dropped when it is equal to the existing one.
pub fn merge_table(table: &str, existing: &mut Vec<Value>, incoming: Vec<Value>) -> Result<()> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(existing.len());
    for (pos, record) in existing.iter().enumerate() {
        positions.insert(record_key(table, record)?, pos);
    }

    for record in incoming {
        let key = record_key(table, &record)?;
        match positions.get(&key) {
            Some(&pos) => {
                if existing[pos] != record {
                    return Err(Error::DataIntegrity {
                        table: table.to_string(),
                        id: key,
                        existing: existing[pos].to_string(),
                        incoming: record.to_string(),
                    });
                }
            }
            None => {
                positions.insert(key, existing.len());
                existing.push(record);
            }
        }
    }
    Ok(())
}

impl IndexDocument {
    /// Identity-merge another document into this one.
    ///
    /// Bookkeeping entries (`CFG`, `apilinks`) from `other` replace ours when
    /// present.
    pub fn merge(&mut self, other: IndexDocument) -> Result<()> {
        if other.config.is_some() {
            self.config = other.config;
        }
        if other.apilinks.is_some() {
            self.apilinks = other.apilinks;
        }
        for (name, records) in other.tables {
            let existing = self.tables.entry(name.clone()).or_default();
            merge_table(&name, existing, records)?;
        }
        Ok(())
    }
}
