//! Typed column tables
//!
//! In-memory form of the column-table container a bank is stored in. Each
//! table has named, typed columns and rows of values. Readers get a type
//! default for columns a table does not carry, so one reader serves every
//! schema version.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::schema::{ColumnKey, SchemaCatalog, SchemaVersion};

/// Value type tag of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    U8,
    U16,
    U32,
    F32,
    Str,
    Data,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::U8 => write!(f, "u8"),
            ValueType::U16 => write!(f, "u16"),
            ValueType::U32 => write!(f, "u32"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::Str => write!(f, "string"),
            ValueType::Data => write!(f, "data"),
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ColumnValue {
    U8(u8),
    U16(u16),
    U32(u32),
    F32(f32),
    Str(String),
    Data(Vec<u8>),
}

impl ColumnValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ColumnValue::U8(_) => ValueType::U8,
            ColumnValue::U16(_) => ValueType::U16,
            ColumnValue::U32(_) => ValueType::U32,
            ColumnValue::F32(_) => ValueType::F32,
            ColumnValue::Str(_) => ValueType::Str,
            ColumnValue::Data(_) => ValueType::Data,
        }
    }

    /// Zero value of a type, used to fill cells of newly added rows.
    pub fn default_for(value_type: ValueType) -> Self {
        match value_type {
            ValueType::U8 => ColumnValue::U8(0),
            ValueType::U16 => ColumnValue::U16(0),
            ValueType::U32 => ColumnValue::U32(0),
            ValueType::F32 => ColumnValue::F32(0.0),
            ValueType::Str => ColumnValue::Str(String::new()),
            ValueType::Data => ColumnValue::Data(Vec::new()),
        }
    }

    fn write_canonical(&self, out: &mut Vec<u8>) {
        match self {
            ColumnValue::U8(v) => out.push(*v),
            ColumnValue::U16(v) => out.extend_from_slice(&v.to_be_bytes()),
            ColumnValue::U32(v) => out.extend_from_slice(&v.to_be_bytes()),
            ColumnValue::F32(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            ColumnValue::Str(s) => {
                out.extend_from_slice(&(s.len() as u32).to_be_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            ColumnValue::Data(d) => {
                out.extend_from_slice(&(d.len() as u32).to_be_bytes());
                out.extend_from_slice(d);
            }
        }
    }
}

/// Conversion from a cell to a Rust value.
pub trait FromColumn: Sized + Default {
    const VALUE_TYPE: ValueType;

    fn from_column(value: &ColumnValue) -> Option<Self>;
}

impl FromColumn for u8 {
    const VALUE_TYPE: ValueType = ValueType::U8;

    fn from_column(value: &ColumnValue) -> Option<Self> {
        match value {
            ColumnValue::U8(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromColumn for u16 {
    const VALUE_TYPE: ValueType = ValueType::U16;

    fn from_column(value: &ColumnValue) -> Option<Self> {
        match value {
            ColumnValue::U16(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromColumn for u32 {
    const VALUE_TYPE: ValueType = ValueType::U32;

    fn from_column(value: &ColumnValue) -> Option<Self> {
        match value {
            ColumnValue::U32(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromColumn for f32 {
    const VALUE_TYPE: ValueType = ValueType::F32;

    fn from_column(value: &ColumnValue) -> Option<Self> {
        match value {
            ColumnValue::F32(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromColumn for String {
    const VALUE_TYPE: ValueType = ValueType::Str;

    fn from_column(value: &ColumnValue) -> Option<Self> {
        match value {
            ColumnValue::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromColumn for Vec<u8> {
    const VALUE_TYPE: ValueType = ValueType::Data;

    fn from_column(value: &ColumnValue) -> Option<Self> {
        match value {
            ColumnValue::Data(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Declared column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub value_type: ValueType,
}

/// A named table of typed columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTable {
    pub name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<ColumnValue>>,
}

impl ColumnTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Create a table and declare the columns that exist for `version`.
    pub fn declared(
        name: &str,
        columns: &[(&str, ValueType)],
        catalog: &SchemaCatalog,
        version: SchemaVersion,
    ) -> Self {
        let mut table = Self::new(name);
        for &(column, value_type) in columns {
            if catalog.exists(&ColumnKey::new(name, column, value_type), version) {
                table.add_column(column, value_type);
            }
        }
        table
    }

    /// Declare a column. Existing rows get the type's zero value.
    pub fn add_column(&mut self, name: &str, value_type: ValueType) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.columns.push(Column {
            name: name.to_string(),
            value_type,
        });
        for row in &mut self.rows {
            row.push(ColumnValue::default_for(value_type));
        }
        self.columns.len() - 1
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ValueType> {
        self.column_index(name).map(|i| self.columns[i].value_type)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Append a row of zero values and return its index.
    pub fn add_row(&mut self) -> usize {
        let row = self
            .columns
            .iter()
            .map(|c| ColumnValue::default_for(c.value_type))
            .collect();
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Set a cell. Returns false when the column is not declared, which is
    /// how columns absent in the target version are skipped.
    pub fn set(&mut self, row: usize, column: &str, value: ColumnValue) -> bool {
        let Some(index) = self.column_index(column) else {
            return false;
        };
        if self.columns[index].value_type != value.value_type() {
            return false;
        }
        match self.rows.get_mut(row) {
            Some(cells) => {
                cells[index] = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&ColumnValue> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|cells| &cells[index])
    }

    /// Typed read with a default for missing columns or rows.
    pub fn value<T: FromColumn>(&self, row: usize, column: &str) -> T {
        self.get(row, column)
            .and_then(T::from_column)
            .unwrap_or_default()
    }

    pub fn row(&self, row: usize) -> RowView<'_> {
        RowView { table: self, row }
    }

    fn write_canonical(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        for column in &self.columns {
            out.extend_from_slice(column.name.as_bytes());
            out.push(0);
            out.push(column.value_type as u8);
        }
        out.extend_from_slice(&(self.rows.len() as u32).to_be_bytes());
        for row in &self.rows {
            for cell in row {
                cell.write_canonical(out);
            }
        }
    }
}

/// Read-only view of one row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a ColumnTable,
    row: usize,
}

impl<'a> RowView<'a> {
    pub fn index(&self) -> usize {
        self.row
    }

    pub fn has(&self, column: &str) -> bool {
        self.table.column_index(column).is_some()
    }

    pub fn u8(&self, column: &str) -> u8 {
        self.table.value(self.row, column)
    }

    pub fn u16(&self, column: &str) -> u16 {
        self.table.value(self.row, column)
    }

    pub fn u32(&self, column: &str) -> u32 {
        self.table.value(self.row, column)
    }

    pub fn f32(&self, column: &str) -> f32 {
        self.table.value(self.row, column)
    }

    pub fn string(&self, column: &str) -> String {
        self.table.value(self.row, column)
    }

    pub fn data(&self, column: &str) -> Vec<u8> {
        self.table.value(self.row, column)
    }
}

/// Access to the tables of a bank, as consumed by the loader.
pub trait TableAccessor {
    fn column_table(&self, name: &str) -> Option<&ColumnTable>;

    /// Whether `table` carries `column` with the given type.
    fn column_exists(&self, table: &str, column: &str, value_type: ValueType) -> bool {
        self.column_table(table)
            .and_then(|t| t.column_type(column))
            .map_or(false, |ty| ty == value_type)
    }

    /// Typed read with a default when the table, column or row is absent.
    fn get_value<T: FromColumn>(&self, table: &str, column: &str, row: usize) -> T
    where
        Self: Sized,
    {
        self.column_table(table)
            .map(|t| t.value(row, column))
            .unwrap_or_default()
    }
}

/// All tables of one bank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSet {
    tables: BTreeMap<String, ColumnTable>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: ColumnTable) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut ColumnTable> {
        self.tables.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ColumnTable> {
        self.tables.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// SHA-256 over a canonical big-endian encoding of every table.
    pub fn digest(&self) -> String {
        let mut buffer = Vec::new();
        for table in self.tables.values() {
            table.write_canonical(&mut buffer);
        }
        let hash = Sha256::digest(&buffer);
        format!("{:x}", hash)
    }
}

impl TableAccessor for TableSet {
    fn column_table(&self, name: &str) -> Option<&ColumnTable> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> ColumnTable {
        let mut table = ColumnTable::new("CueTable");
        table.add_column("CueId", ValueType::U32);
        table.add_column("CueName", ValueType::Str);
        let row = table.add_row();
        table.set(row, "CueId", ColumnValue::U32(7));
        table.set(row, "CueName", ColumnValue::Str("jump".to_string()));
        table
    }

    #[test]
    fn test_typed_reads() {
        let table = sample_table();
        assert_eq!(table.value::<u32>(0, "CueId"), 7);
        assert_eq!(table.value::<String>(0, "CueName"), "jump");
        // Missing column falls back to the default.
        assert_eq!(table.value::<u16>(0, "Length"), 0);
        // Wrong type falls back as well.
        assert_eq!(table.value::<u16>(0, "CueId"), 0);
    }

    #[test]
    fn test_set_rejects_undeclared_column() {
        let mut table = sample_table();
        assert!(!table.set(0, "Length", ColumnValue::U32(1)));
        assert!(!table.set(0, "CueId", ColumnValue::U16(1)));
        assert!(table.set(0, "CueId", ColumnValue::U32(9)));
        assert_eq!(table.row(0).u32("CueId"), 9);
    }

    #[test]
    fn test_add_column_backfills_rows() {
        let mut table = sample_table();
        table.add_column("Length", ValueType::U32);
        assert_eq!(table.get(0, "Length"), Some(&ColumnValue::U32(0)));
    }

    #[test]
    fn test_declared_respects_catalog() {
        let mut catalog = SchemaCatalog::new();
        let key = ColumnKey::new("CueTable", "CueName", ValueType::Str);
        catalog.record_observed(&key, SchemaVersion::new(1, 10, 0, 0));
        catalog.record_absent(&key, SchemaVersion::new(1, 6, 0, 0));

        let columns = [("CueId", ValueType::U32), ("CueName", ValueType::Str)];
        let old = ColumnTable::declared("CueTable", &columns, &catalog, SchemaVersion::new(1, 6, 0, 0));
        let new = ColumnTable::declared("CueTable", &columns, &catalog, SchemaVersion::new(1, 30, 0, 0));
        assert_eq!(old.columns().len(), 1);
        assert_eq!(new.columns().len(), 2);
    }

    #[test]
    fn test_accessor_defaults() {
        let mut set = TableSet::new();
        set.insert(sample_table());
        assert!(set.column_exists("CueTable", "CueId", ValueType::U32));
        assert!(!set.column_exists("CueTable", "CueId", ValueType::U16));
        assert_eq!(set.get_value::<u32>("CueTable", "CueId", 0), 7);
        assert_eq!(set.get_value::<u32>("MissingTable", "CueId", 0), 0);
    }

    #[test]
    fn test_digest_changes_with_content() {
        let mut a = TableSet::new();
        a.insert(sample_table());
        let b = a.clone();
        assert_eq!(a.digest(), b.digest());

        a.table_mut("CueTable")
            .unwrap()
            .set(0, "CueId", ColumnValue::U32(8));
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
