//! Command groups
//!
//! A command group is stored as one data cell: repeated
//! `[opcode u16 BE][size u8][params]`. A few opcodes embed a 16-bit table
//! index inside their params; that index is lifted into `Command::link` on
//! decode and written back into the params on encode.

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{BankError, Result};
use crate::model::entities::item_type;
use crate::model::{
    Entity, EntityId, EntityKind, FieldInfo, Record, Ref, RefVisitor, RefVisitorMut,
};

/// Opcodes that carry an embedded reference.
pub mod opcode {
    /// String value index at params 0..2.
    pub const STRING_VALUE: u16 = 33;
    /// Global modulator reference index at params 0..2.
    pub const GLOBAL_AISAC_REFERENCE: u16 = 87;
    /// Item type at params 0..2, item index at 2..4.
    pub const NOTE_ON: u16 = 2000;
    /// Same layout as `NOTE_ON`.
    pub const NOTE_ON_WITH_NO: u16 = 2003;
}

const FIELD: &str = "commands";

/// One command of a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub opcode: u16,
    /// Raw parameter bytes. The link bytes are rewritten on encode.
    pub params: Vec<u8>,
    pub link: Ref,
}

impl Command {
    pub fn new(opcode: u16, params: Vec<u8>) -> Self {
        let mut command = Self {
            opcode,
            params,
            link: Ref::Null,
        };
        if let Some((offset, _)) = command.link_location() {
            command.link = Ref::from_raw(BigEndian::read_u16(&command.params[offset..offset + 2]));
        }
        command
    }

    /// Note-on command pointing at an item by id.
    pub fn note_on(item: u16, target: EntityId) -> Self {
        let mut params = vec![0u8; 4];
        BigEndian::write_u16(&mut params[0..2], item);
        BigEndian::write_u16(&mut params[2..4], 0xFFFF);
        Self {
            opcode: opcode::NOTE_ON,
            params,
            link: Ref::Id(target),
        }
    }

    /// Byte offset of the embedded index and the table it points into.
    pub fn link_location(&self) -> Option<(usize, EntityKind)> {
        let (offset, target) = match self.opcode {
            opcode::STRING_VALUE => (0, EntityKind::StringValue),
            opcode::GLOBAL_AISAC_REFERENCE => (0, EntityKind::GlobalAisacReference),
            opcode::NOTE_ON | opcode::NOTE_ON_WITH_NO => {
                if self.params.len() < 2 {
                    return None;
                }
                let target = match BigEndian::read_u16(&self.params[0..2]) {
                    item_type::WAVEFORM => EntityKind::Waveform,
                    item_type::SYNTH => EntityKind::Synth,
                    item_type::SEQUENCE => EntityKind::Sequence,
                    _ => return None,
                };
                (2, target)
            }
            _ => return None,
        };
        if self.params.len() < offset + 2 {
            return None;
        }
        Some((offset, target))
    }

    pub fn link_target(&self) -> Option<EntityKind> {
        self.link_location().map(|(_, target)| target)
    }
}

/// Ordered commands attached to a sequence, synth or track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandGroup {
    pub id: EntityId,
    pub commands: Vec<Command>,
}

impl CommandGroup {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            id: EntityId::new(),
            commands,
        }
    }

    /// Decode the packed cell of `table` row `row`.
    pub fn decode(data: &[u8], table: &str, row: usize) -> Result<Self> {
        let invalid = |reason: String| BankError::InvalidPackedData {
            table: table.to_string(),
            column: crate::schema::columns::COMMAND.to_string(),
            row,
            reason,
        };

        let mut commands = Vec::new();
        let mut cursor = data;
        while !cursor.is_empty() {
            let opcode = cursor
                .read_u16::<BigEndian>()
                .map_err(|_| invalid("truncated opcode".to_string()))?;
            let size = cursor
                .read_u8()
                .map_err(|_| invalid(format!("opcode {} has no size byte", opcode)))?
                as usize;
            if cursor.len() < size {
                return Err(invalid(format!(
                    "opcode {} declares {} bytes, {} left",
                    opcode,
                    size,
                    cursor.len()
                )));
            }
            let (params, rest) = cursor.split_at(size);
            commands.push(Command::new(opcode, params.to_vec()));
            cursor = rest;
        }

        Ok(Self::new(commands))
    }

    /// Encode the group. Links must be in the offset or null state.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for command in &self.commands {
            let size = u8::try_from(command.params.len()).map_err(|_| BankError::IndexOverflow {
                field: format!("command {} params", command.opcode),
                value: command.params.len() as u64,
                max: u64::from(u8::MAX),
            })?;

            let mut params = command.params.clone();
            if let Some((offset, _)) = command.link_location() {
                let index: u16 = command.link.encode(self.id, FIELD)?;
                BigEndian::write_u16(&mut params[offset..offset + 2], index);
            }

            out.write_u16::<BigEndian>(command.opcode)?;
            out.write_u8(size)?;
            out.extend_from_slice(&params);
        }
        Ok(out)
    }
}

impl Entity for CommandGroup {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, visitor: &mut dyn RefVisitor) {
        for (slot, command) in self.commands.iter().enumerate() {
            if let Some(target) = command.link_target() {
                let field = FieldInfo::scalar(FIELD, target).at(slot);
                visitor.visit(self.id, field, &command.link);
            }
        }
    }

    fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut) {
        let holder = self.id;
        for (slot, command) in self.commands.iter_mut().enumerate() {
            if let Some(target) = command.link_target() {
                let field = FieldInfo::scalar(FIELD, target).at(slot);
                visitor.visit(holder, field, &mut command.link);
            }
        }
    }

    fn into_record(self) -> Record {
        Record::Command(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Command(group) => Some(group),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn packed() -> Vec<u8> {
        vec![
            0x07, 0xD0, 0x04, 0x00, 0x01, 0x00, 0x03, // note on, waveform 3
            0x00, 0x57, 0x02, 0xFF, 0xFF, // global aisac ref, null
            0x00, 0x0A, 0x01, 0x7F, // volume, no link
        ]
    }

    #[test]
    fn test_decode_lifts_links() {
        let group = CommandGroup::decode(&packed(), "SynthCommandTable", 0).unwrap();
        assert_eq!(group.commands.len(), 3);

        let note = &group.commands[0];
        assert_eq!(note.opcode, opcode::NOTE_ON);
        assert_eq!(note.link.as_numeric(), Some(3));
        assert_eq!(note.link_target(), Some(EntityKind::Waveform));

        assert!(group.commands[1].link.is_null());
        assert_eq!(
            group.commands[1].link_target(),
            Some(EntityKind::GlobalAisacReference)
        );
        assert_eq!(group.commands[2].link_target(), None);
    }

    #[test]
    fn test_encode_reproduces_bytes() {
        let group = CommandGroup::decode(&packed(), "SynthCommandTable", 0).unwrap();
        assert_eq!(group.encode().unwrap(), packed());
    }

    #[test]
    fn test_encode_rewrites_link() {
        let mut group = CommandGroup::decode(&packed(), "SynthCommandTable", 0).unwrap();
        group.commands[0].link = Ref::Offset(9);
        let bytes = group.encode().unwrap();
        assert_eq!(&bytes[5..7], &[0x00, 0x09]);
    }

    #[test]
    fn test_encode_rejects_stable_id_link() {
        let group = CommandGroup::new(vec![Command::note_on(item_type::SYNTH, EntityId::new())]);
        assert!(matches!(
            group.encode(),
            Err(BankError::UnresolvedHandle { .. })
        ));
    }

    #[test]
    fn test_decode_truncated() {
        let mut bytes = packed();
        bytes.truncate(5);
        let result = CommandGroup::decode(&bytes, "CommandTable", 4);
        assert!(matches!(
            result,
            Err(BankError::InvalidPackedData { row: 4, .. })
        ));
    }

    #[test]
    fn test_unknown_note_item_has_no_link() {
        let command = Command::new(opcode::NOTE_ON, vec![0x00, 0x09, 0x00, 0x01]);
        assert_eq!(command.link_target(), None);
        assert!(command.link.is_null());
    }

    #[test]
    fn test_links_carry_command_position() {
        let target = EntityId::new();
        let group = CommandGroup::new(vec![
            Command::note_on(item_type::SYNTH, target),
            Command::new(0x000A, vec![0x7F]),
            Command::note_on(item_type::SYNTH, target),
        ]);

        let mut slots = Vec::new();
        group.visit_refs(&mut |_: EntityId, field: FieldInfo, handle: &Ref| {
            assert_eq!(*handle, Ref::Id(target));
            slots.push(field.slot);
        });
        assert_eq!(slots, vec![Some(0), Some(2)]);
    }
}
