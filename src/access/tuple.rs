use crate::access::tuple_desc::TupleDesc;
use crate::access::value::Value;
use crate::error::{DbError, Result};
use crate::storage::page::PageId;
use std::cmp::Ordering;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// Physical location of a stored tuple: page plus slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        // First compare by page, then by slot
        match self.page_id.cmp(&other.page_id) {
            Ordering::Equal => self.slot.cmp(&other.slot),
            other => other,
        }
    }
}

/// A row: field values shaped by a `TupleDesc`, plus its location once stored.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Builds a tuple, checking every value against the descriptor.
    pub fn new(desc: Arc<TupleDesc>, values: Vec<Value>) -> Result<Self> {
        check_values(&desc, &values)?;
        Ok(Self {
            desc,
            values,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, i: usize) -> Result<&Value> {
        self.values
            .get(i)
            .ok_or_else(|| DbError::NotFound(format!("field index {} out of {}", i, self.values.len())))
    }

    pub fn set_value(&mut self, i: usize, value: Value) -> Result<()> {
        let expected = self.desc.field_type(i)?;
        if value.data_type() != expected {
            return Err(DbError::TupleSchemaMismatch {
                expected: expected.to_string(),
                found: value.data_type().to_string(),
            });
        }
        self.values[i] = value;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Replaces the descriptor, e.g. to attach alias-qualified names.
    /// The new descriptor must describe the same types.
    pub fn reset_desc(&mut self, desc: Arc<TupleDesc>) -> Result<()> {
        if *desc != *self.desc {
            return Err(DbError::TupleSchemaMismatch {
                expected: self.desc.to_string(),
                found: desc.to_string(),
            });
        }
        self.desc = desc;
        Ok(())
    }

    /// Fixed-width encoding, exactly `desc.byte_size()` bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.desc.byte_size());
        for value in &self.values {
            value.serialize(&mut data)?;
        }
        Ok(data)
    }

    pub fn deserialize(desc: Arc<TupleDesc>, data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let values = desc
            .types()
            .map(|t| t.parse(&mut cursor))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            desc,
            values,
            record_id: None,
        })
    }
}

/// Tuples compare by their values only.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", fields.join("\t"))
    }
}

fn check_values(desc: &TupleDesc, values: &[Value]) -> Result<()> {
    let matches = values.len() == desc.num_fields()
        && values.iter().zip(desc.types()).all(|(v, t)| v.data_type() == t);
    if !matches {
        let found: Vec<String> = values.iter().map(|v| v.data_type().to_string()).collect();
        return Err(DbError::TupleSchemaMismatch {
            expected: desc.to_string(),
            found: format!("({})", found.join(", ")),
        });
    }
    Ok(())
}
