//! Tuple schema descriptors.

use crate::access::value::DataType;
use crate::error::{DbError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};

/// One column of a tuple descriptor. A column name may be absent.
#[derive(Debug, Clone)]
pub struct TdItem {
    pub field_type: DataType,
    pub field_name: Option<String>,
}

impl TdItem {
    pub fn new(field_type: DataType, field_name: Option<String>) -> Self {
        Self {
            field_type,
            field_name,
        }
    }
}

impl fmt::Display for TdItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field_name {
            Some(name) => write!(f, "{}({})", name, self.field_type),
            None => write!(f, "null({})", self.field_type),
        }
    }
}

/// Ordered schema of a tuple.
///
/// Two descriptors are equal when their type sequences are equal; field names
/// do not take part in the comparison.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new(items: Vec<TdItem>) -> Self {
        Self { items }
    }

    /// Descriptor with named columns.
    pub fn with_names<S: Into<String>>(columns: impl IntoIterator<Item = (DataType, S)>) -> Self {
        Self::new(
            columns
                .into_iter()
                .map(|(t, n)| TdItem::new(t, Some(n.into())))
                .collect(),
        )
    }

    /// Descriptor with anonymous columns.
    pub fn from_types(types: &[DataType]) -> Self {
        Self::new(types.iter().map(|&t| TdItem::new(t, None)).collect())
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_name(&self, i: usize) -> Result<Option<&str>> {
        self.items
            .get(i)
            .map(|item| item.field_name.as_deref())
            .ok_or_else(|| DbError::NotFound(format!("field index {} out of {}", i, self.items.len())))
    }

    pub fn field_type(&self, i: usize) -> Result<DataType> {
        self.items
            .get(i)
            .map(|item| item.field_type)
            .ok_or_else(|| DbError::NotFound(format!("field index {} out of {}", i, self.items.len())))
    }

    /// Index of the first field with the given name.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.items
            .iter()
            .position(|item| item.field_name.as_deref() == Some(name))
            .ok_or_else(|| DbError::NotFound(format!("field '{}'", name)))
    }

    /// Fixed size in bytes of one tuple with this schema.
    pub fn byte_size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.size()).sum()
    }

    pub fn types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.items.iter().map(|item| item.field_type)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TdItem> {
        self.items.iter()
    }

    /// Concatenates two descriptors, `a`'s fields first.
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> TupleDesc {
        let mut items = a.items.clone();
        items.extend(b.items.iter().cloned());
        TupleDesc { items }
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len() && self.types().eq(other.types())
    }
}

impl Eq for TupleDesc {}

impl Hash for TupleDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for t in self.types() {
            t.hash(state);
        }
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self.items.iter().map(|i| i.to_string()).collect();
        write!(f, "({})", cols.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_names() {
        let a = TupleDesc::with_names([(DataType::Int32, "a"), (DataType::Varchar, "b")]);
        let b = TupleDesc::with_names([(DataType::Int32, "x"), (DataType::Varchar, "y")]);
        let c = TupleDesc::from_types(&[DataType::Int32, DataType::Int32]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, TupleDesc::from_types(&[DataType::Int32]));
    }

    #[test]
    fn test_absent_names() -> anyhow::Result<()> {
        let desc = TupleDesc::from_types(&[DataType::Int32]);
        assert_eq!(desc.field_name(0)?, None);
        assert!(desc.index_of("").is_err());
        assert!(desc.field_name(1).is_err());
        Ok(())
    }

    #[test]
    fn test_byte_size() {
        let desc = TupleDesc::from_types(&[DataType::Int32, DataType::Varchar, DataType::Int32]);
        assert_eq!(desc.byte_size(), 4 + 132 + 4);
    }

    #[test]
    fn test_index_of() -> anyhow::Result<()> {
        let desc = TupleDesc::with_names([(DataType::Int32, "id"), (DataType::Int32, "age")]);
        assert_eq!(desc.index_of("age")?, 1);
        assert!(matches!(desc.index_of("name"), Err(DbError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_merge() -> anyhow::Result<()> {
        let a = TupleDesc::with_names([(DataType::Int32, "a")]);
        let b = TupleDesc::with_names([(DataType::Varchar, "b"), (DataType::Int32, "c")]);
        let merged = TupleDesc::merge(&a, &b);

        assert_eq!(merged.num_fields(), 3);
        assert_eq!(merged.field_name(1)?, Some("b"));
        assert_eq!(merged.field_type(2)?, DataType::Int32);
        assert_eq!(merged.byte_size(), a.byte_size() + b.byte_size());
        Ok(())
    }

    #[test]
    fn test_display() {
        let desc = TupleDesc::new(vec![
            TdItem::new(DataType::Int32, Some("id".into())),
            TdItem::new(DataType::Varchar, None),
        ]);
        assert_eq!(desc.to_string(), "(id(int), null(string))");
    }
}
