//! Packed data cells
//!
//! Index lists, reference item pairs and graph points are stored in data
//! cells as big-endian arrays.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{BankError, Result};
use crate::model::{EntityId, GraphPoint, Ref, ReferenceItem};

/// Where a cell came from, for error messages.
#[derive(Debug, Clone, Copy)]
pub struct CellRef<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub row: usize,
}

impl CellRef<'_> {
    fn invalid(&self, reason: impl Into<String>) -> BankError {
        BankError::InvalidPackedData {
            table: self.table.to_string(),
            column: self.column.to_string(),
            row: self.row,
            reason: reason.into(),
        }
    }
}

/// Decode a list of 16-bit indexes into offset handles.
pub fn decode_index_list(data: &[u8], cell: CellRef<'_>) -> Result<Vec<Ref>> {
    if data.len() % 2 != 0 {
        return Err(cell.invalid(format!("{} bytes is not a list of u16", data.len())));
    }
    let mut cursor = data;
    let mut handles = Vec::with_capacity(data.len() / 2);
    while !cursor.is_empty() {
        let raw = cursor.read_u16::<BigEndian>()?;
        handles.push(Ref::from_raw(raw));
    }
    Ok(handles)
}

pub fn encode_index_list(handles: &[Ref], holder: EntityId, field: &'static str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(handles.len() * 2);
    for handle in handles {
        out.write_u16::<BigEndian>(handle.encode::<u16>(holder, field)?)?;
    }
    Ok(out)
}

/// Decode (item type, index) pairs.
pub fn decode_items(data: &[u8], cell: CellRef<'_>) -> Result<Vec<ReferenceItem>> {
    if data.len() % 4 != 0 {
        return Err(cell.invalid(format!("{} bytes is not a list of item pairs", data.len())));
    }
    let mut cursor = data;
    let mut items = Vec::with_capacity(data.len() / 4);
    while !cursor.is_empty() {
        let item_type = cursor.read_u16::<BigEndian>()?;
        let index = cursor.read_u16::<BigEndian>()?;
        items.push(ReferenceItem {
            item_type,
            handle: Ref::from_raw(index),
        });
    }
    Ok(items)
}

pub fn encode_items(items: &[ReferenceItem], holder: EntityId) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(items.len() * 4);
    for item in items {
        out.write_u16::<BigEndian>(item.item_type)?;
        // Items of an unknown type were never resolved and keep their raw index.
        let index = item.handle.encode::<u16>(holder, "items")?;
        out.write_u16::<BigEndian>(index)?;
    }
    Ok(out)
}

pub fn decode_points(data: &[u8], cell: CellRef<'_>) -> Result<Vec<GraphPoint>> {
    if data.len() % 8 != 0 {
        return Err(cell.invalid(format!("{} bytes is not a list of points", data.len())));
    }
    let mut cursor = data;
    let mut points = Vec::with_capacity(data.len() / 8);
    while !cursor.is_empty() {
        let x = cursor.read_f32::<BigEndian>()?;
        let y = cursor.read_f32::<BigEndian>()?;
        points.push(GraphPoint { x, y });
    }
    Ok(points)
}

pub fn encode_points(points: &[GraphPoint]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(points.len() * 8);
    for point in points {
        out.write_f32::<BigEndian>(point.x)?;
        out.write_f32::<BigEndian>(point.y)?;
    }
    Ok(out)
}

/// Expand a (start, count) window into offset handles.
pub fn expand_run(start: u16, count: u16) -> Vec<Ref> {
    (0..u32::from(count))
        .map(|i| Ref::Offset(u32::from(start) + i))
        .collect()
}

/// The (start, count) window of resolved run handles. Empty runs encode as
/// (0xFFFF, 0).
pub fn run_window(handles: &[Ref], holder: EntityId, field: &'static str) -> Result<(u16, u16)> {
    let Some(first) = handles.first() else {
        return Ok((crate::schema::columns::NULL_INDEX_U16, 0));
    };
    let start = first.encode::<u16>(holder, field)?;
    let count = u16::try_from(handles.len()).map_err(|_| BankError::IndexOverflow {
        field: field.to_string(),
        value: handles.len() as u64,
        max: u64::from(u16::MAX),
    })?;
    Ok((start, count))
}
