//! Entity types of a bank.
//!
//! Each type lists its own reference fields in its `Entity` impl. Field
//! names are stable strings; they show up in edit descriptors and errors.

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveKind;
use crate::model::{
    CommandTableKind, Entity, EntityId, EntityKind, FieldInfo, Record, Ref, RefVisitor,
    RefVisitorMut,
};

pub const LOCAL_AISACS: FieldInfo = FieldInfo::list("local_aisacs", EntityKind::Aisac);
pub const GLOBAL_AISACS: FieldInfo = FieldInfo::run("global_aisacs", EntityKind::GlobalAisacReference);
pub const ACTION_TRACKS: FieldInfo = FieldInfo::run("action_tracks", EntityKind::ActionTrack);

/// Null archive id of a waveform.
pub const NO_AWB_ID: u16 = 0xFFFF;

/// Item type tags of cue and synth reference items.
pub mod item_type {
    pub const NONE: u16 = 0;
    pub const WAVEFORM: u16 = 1;
    pub const SYNTH: u16 = 2;
    pub const SEQUENCE: u16 = 3;
}

/// Target type tags of action tracks.
pub mod target_type {
    pub const NONE: u8 = 0;
    pub const CUE: u8 = 1;
}

/// A typed pointer at a waveform, synth or sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceItem {
    /// Raw item type tag. Unknown tags are kept so they survive a save.
    pub item_type: u16,
    pub handle: Ref,
}

impl ReferenceItem {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn waveform(id: EntityId) -> Self {
        Self {
            item_type: item_type::WAVEFORM,
            handle: Ref::Id(id),
        }
    }

    pub fn synth(id: EntityId) -> Self {
        Self {
            item_type: item_type::SYNTH,
            handle: Ref::Id(id),
        }
    }

    pub fn sequence(id: EntityId) -> Self {
        Self {
            item_type: item_type::SEQUENCE,
            handle: Ref::Id(id),
        }
    }

    /// Collection the item points into, if the tag is known.
    pub fn target(&self) -> Option<EntityKind> {
        match self.item_type {
            item_type::WAVEFORM => Some(EntityKind::Waveform),
            item_type::SYNTH => Some(EntityKind::Synth),
            item_type::SEQUENCE => Some(EntityKind::Sequence),
            _ => None,
        }
    }

    fn field(&self, name: &'static str, slot: Option<usize>) -> Option<FieldInfo> {
        let field = FieldInfo::scalar(name, self.target()?);
        Some(match slot {
            Some(slot) => field.at(slot),
            None => field,
        })
    }

    fn visit(
        &self,
        holder: EntityId,
        name: &'static str,
        slot: Option<usize>,
        visitor: &mut dyn RefVisitor,
    ) {
        if let Some(field) = self.field(name, slot) {
            visitor.visit(holder, field, &self.handle);
        }
    }

    fn visit_mut(
        &mut self,
        holder: EntityId,
        name: &'static str,
        slot: Option<usize>,
        visitor: &mut dyn RefVisitorMut,
    ) {
        if let Some(field) = self.field(name, slot) {
            visitor.visit(holder, field, &mut self.handle);
        }
    }
}

/// A playable cue, the root of a reference closure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub id: EntityId,
    /// Identifier games look cues up by. Unique within a bank.
    pub cue_id: u32,
    pub name: String,
    pub item: ReferenceItem,
    /// Length in milliseconds.
    pub length: u32,
}

impl Cue {
    pub fn new(cue_id: u32, name: impl Into<String>, item: ReferenceItem) -> Self {
        Self {
            id: EntityId::new(),
            cue_id,
            name: name.into(),
            item,
            length: 0,
        }
    }
}

impl Entity for Cue {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, visitor: &mut dyn RefVisitor) {
        self.item.visit(self.id, "item", None, visitor);
    }

    fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut) {
        let holder = self.id;
        self.item.visit_mut(holder, "item", None, visitor);
    }

    fn into_record(self) -> Record {
        Record::Cue(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Cue(cue) => Some(cue),
            _ => None,
        }
    }
}

/// An ordered set of tracks played by one cue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: EntityId,
    pub sequence_type: u8,
    pub volume: u16,
    pub tracks: Vec<Ref>,
    pub command: Ref,
    pub local_aisacs: Vec<Ref>,
    pub global_aisacs: Vec<Ref>,
    pub action_tracks: Vec<Ref>,
}

impl Sequence {
    pub const TRACKS: FieldInfo = FieldInfo::list("tracks", EntityKind::Track);
    pub const COMMAND: FieldInfo =
        FieldInfo::scalar("command", EntityKind::Command(CommandTableKind::Sequence));

    pub fn new() -> Self {
        Self {
            id: EntityId::new(),
            ..Self::default()
        }
    }
}

impl Entity for Sequence {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, visitor: &mut dyn RefVisitor) {
        visitor.visit_list(self.id, Self::TRACKS, &self.tracks);
        visitor.visit(self.id, Self::COMMAND, &self.command);
        visitor.visit_list(self.id, LOCAL_AISACS, &self.local_aisacs);
        visitor.visit_list(self.id, GLOBAL_AISACS, &self.global_aisacs);
        visitor.visit_list(self.id, ACTION_TRACKS, &self.action_tracks);
    }

    fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut) {
        let holder = self.id;
        visitor.visit_list(holder, Self::TRACKS, &mut self.tracks);
        visitor.visit(holder, Self::COMMAND, &mut self.command);
        visitor.visit_list(holder, LOCAL_AISACS, &mut self.local_aisacs);
        visitor.visit_list(holder, GLOBAL_AISACS, &mut self.global_aisacs);
        visitor.visit_list(holder, ACTION_TRACKS, &mut self.action_tracks);
    }

    fn into_record(self) -> Record {
        Record::Sequence(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }
}

/// A sound node: plays its reference items (waveforms or nested nodes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Synth {
    pub id: EntityId,
    pub synth_type: u8,
    pub volume: u16,
    pub items: Vec<ReferenceItem>,
    pub command: Ref,
    pub local_aisacs: Vec<Ref>,
    pub global_aisacs: Vec<Ref>,
    pub action_tracks: Vec<Ref>,
}

impl Synth {
    pub const COMMAND: FieldInfo =
        FieldInfo::scalar("command", EntityKind::Command(CommandTableKind::Synth));

    pub fn new() -> Self {
        Self {
            id: EntityId::new(),
            ..Self::default()
        }
    }
}

impl Entity for Synth {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, visitor: &mut dyn RefVisitor) {
        for (slot, item) in self.items.iter().enumerate() {
            item.visit(self.id, "items", Some(slot), visitor);
        }
        visitor.visit(self.id, Self::COMMAND, &self.command);
        visitor.visit_list(self.id, LOCAL_AISACS, &self.local_aisacs);
        visitor.visit_list(self.id, GLOBAL_AISACS, &self.global_aisacs);
        visitor.visit_list(self.id, ACTION_TRACKS, &self.action_tracks);
    }

    fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut) {
        let holder = self.id;
        for (slot, item) in self.items.iter_mut().enumerate() {
            item.visit_mut(holder, "items", Some(slot), visitor);
        }
        visitor.visit(holder, Self::COMMAND, &mut self.command);
        visitor.visit_list(holder, LOCAL_AISACS, &mut self.local_aisacs);
        visitor.visit_list(holder, GLOBAL_AISACS, &mut self.global_aisacs);
        visitor.visit_list(holder, ACTION_TRACKS, &mut self.action_tracks);
    }

    fn into_record(self) -> Record {
        Record::Synth(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Synth(synth) => Some(synth),
            _ => None,
        }
    }
}

/// Where an action track points.
///
/// A target inside this bank is a resolved cue reference. A target in
/// another bank (`bank` non-empty) keeps the foreign cue index verbatim in
/// `external_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackTarget {
    pub target_type: u8,
    pub cue: Ref,
    pub external_id: u32,
    pub name: String,
    pub bank: String,
}

impl TrackTarget {
    pub fn local_cue(cue: EntityId) -> Self {
        Self {
            target_type: target_type::CUE,
            cue: Ref::Id(cue),
            ..Self::default()
        }
    }

    pub fn is_local(&self) -> bool {
        self.target_type == target_type::CUE && self.bank.is_empty()
    }
}

/// A track of a sequence, or an action track when stored in the action
/// track table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: EntityId,
    pub event: Ref,
    pub command: Ref,
    pub local_aisacs: Vec<Ref>,
    pub global_aisacs: Vec<Ref>,
    pub target: TrackTarget,
}

impl Track {
    pub const EVENT: FieldInfo =
        FieldInfo::scalar("event", EntityKind::Command(CommandTableKind::TrackEvent));
    pub const COMMAND: FieldInfo =
        FieldInfo::scalar("command", EntityKind::Command(CommandTableKind::Track));
    pub const TARGET: FieldInfo = FieldInfo::scalar("target", EntityKind::Cue);

    pub fn new() -> Self {
        Self {
            id: EntityId::new(),
            ..Self::default()
        }
    }
}

impl Entity for Track {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, visitor: &mut dyn RefVisitor) {
        visitor.visit(self.id, Self::EVENT, &self.event);
        visitor.visit(self.id, Self::COMMAND, &self.command);
        visitor.visit_list(self.id, LOCAL_AISACS, &self.local_aisacs);
        visitor.visit_list(self.id, GLOBAL_AISACS, &self.global_aisacs);
        if self.target.is_local() {
            visitor.visit(self.id, Self::TARGET, &self.target.cue);
        }
    }

    fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut) {
        let holder = self.id;
        visitor.visit(holder, Self::EVENT, &mut self.event);
        visitor.visit(holder, Self::COMMAND, &mut self.command);
        visitor.visit_list(holder, LOCAL_AISACS, &mut self.local_aisacs);
        visitor.visit_list(holder, GLOBAL_AISACS, &mut self.global_aisacs);
        if self.target.is_local() {
            visitor.visit(holder, Self::TARGET, &mut self.target.cue);
        }
    }

    fn into_record(self) -> Record {
        Record::Track(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Track(track) => Some(track),
            _ => None,
        }
    }
}

/// Description of one audio record in an archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    pub id: EntityId,
    pub memory_awb_id: u16,
    pub stream_awb_id: u16,
    pub encode_type: u8,
    /// 0 = memory only, 1 = stream only, 2 = memory prefetch plus stream.
    pub streaming: u8,
    pub channels: u8,
    pub loop_flag: u8,
    pub sample_rate: u16,
    pub num_samples: u32,
}

impl Waveform {
    pub fn new(archive: ArchiveKind, awb_id: u16) -> Self {
        let (memory_awb_id, stream_awb_id, streaming) = match archive {
            ArchiveKind::Memory => (awb_id, NO_AWB_ID, 0),
            ArchiveKind::Stream => (NO_AWB_ID, awb_id, 1),
        };
        Self {
            id: EntityId::new(),
            memory_awb_id,
            stream_awb_id,
            encode_type: 0,
            streaming,
            channels: 0,
            loop_flag: 0,
            sample_rate: 0,
            num_samples: 0,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming != 0
    }

    /// Archive records this waveform points at.
    pub fn archive_ids(&self) -> Vec<(ArchiveKind, u16)> {
        let mut ids = Vec::new();
        if self.streaming != 1 && self.memory_awb_id != NO_AWB_ID {
            ids.push((ArchiveKind::Memory, self.memory_awb_id));
        }
        if self.streaming != 0 && self.stream_awb_id != NO_AWB_ID {
            ids.push((ArchiveKind::Stream, self.stream_awb_id));
        }
        ids
    }

    pub fn set_archive_id(&mut self, archive: ArchiveKind, id: u16) {
        match archive {
            ArchiveKind::Memory => self.memory_awb_id = id,
            ArchiveKind::Stream => self.stream_awb_id = id,
        }
    }

    /// The single id of pre-1.25 banks.
    pub fn legacy_awb_id(&self) -> u16 {
        if self.is_streaming() {
            self.stream_awb_id
        } else {
            self.memory_awb_id
        }
    }
}

impl Entity for Waveform {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, _visitor: &mut dyn RefVisitor) {}

    fn visit_refs_mut(&mut self, _visitor: &mut dyn RefVisitorMut) {}

    fn into_record(self) -> Record {
        Record::Waveform(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Waveform(waveform) => Some(waveform),
            _ => None,
        }
    }
}

/// A modulator: maps a control value through graphs onto parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aisac {
    pub id: EntityId,
    pub control_id: u16,
    pub aisac_type: u8,
    pub random_range: f32,
    pub graphs: Vec<Ref>,
    pub auto_modulation: Ref,
}

impl Aisac {
    pub const GRAPHS: FieldInfo = FieldInfo::list("graphs", EntityKind::Graph);
    pub const AUTO_MODULATION: FieldInfo =
        FieldInfo::scalar("auto_modulation", EntityKind::AutoModulation);

    pub fn new(control_id: u16) -> Self {
        Self {
            id: EntityId::new(),
            control_id,
            ..Self::default()
        }
    }
}

impl Entity for Aisac {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, visitor: &mut dyn RefVisitor) {
        visitor.visit_list(self.id, Self::GRAPHS, &self.graphs);
        visitor.visit(self.id, Self::AUTO_MODULATION, &self.auto_modulation);
    }

    fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut) {
        let holder = self.id;
        visitor.visit_list(holder, Self::GRAPHS, &mut self.graphs);
        visitor.visit(holder, Self::AUTO_MODULATION, &mut self.auto_modulation);
    }

    fn into_record(self) -> Record {
        Record::Aisac(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Aisac(aisac) => Some(aisac),
            _ => None,
        }
    }
}

/// Named reference to a modulator defined outside the bank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalAisacReference {
    pub id: EntityId,
    pub name: String,
}

impl GlobalAisacReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
        }
    }
}

impl Entity for GlobalAisacReference {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, _visitor: &mut dyn RefVisitor) {}

    fn visit_refs_mut(&mut self, _visitor: &mut dyn RefVisitorMut) {}

    fn into_record(self) -> Record {
        Record::GlobalAisacReference(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::GlobalAisacReference(reference) => Some(reference),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPoint {
    pub x: f32,
    pub y: f32,
}

/// A modulation curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub id: EntityId,
    pub graph_type: u16,
    pub points: Vec<GraphPoint>,
}

impl Graph {
    pub fn new(graph_type: u16, points: Vec<GraphPoint>) -> Self {
        Self {
            id: EntityId::new(),
            graph_type,
            points,
        }
    }
}

impl Entity for Graph {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, _visitor: &mut dyn RefVisitor) {}

    fn visit_refs_mut(&mut self, _visitor: &mut dyn RefVisitorMut) {}

    fn into_record(self) -> Record {
        Record::Graph(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Graph(graph) => Some(graph),
            _ => None,
        }
    }
}

/// Time-driven control source of a modulator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoModulation {
    pub id: EntityId,
    pub modulation_type: u8,
    pub trigger_type: u8,
    pub time: u32,
    pub key: u32,
}

impl AutoModulation {
    pub fn new(modulation_type: u8, time: u32) -> Self {
        Self {
            id: EntityId::new(),
            modulation_type,
            time,
            ..Self::default()
        }
    }
}

impl Entity for AutoModulation {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, _visitor: &mut dyn RefVisitor) {}

    fn visit_refs_mut(&mut self, _visitor: &mut dyn RefVisitorMut) {}

    fn into_record(self) -> Record {
        Record::AutoModulation(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::AutoModulation(modulation) => Some(modulation),
            _ => None,
        }
    }
}

/// A string referenced from commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringValue {
    pub id: EntityId,
    pub value: String,
}

impl StringValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            value: value.into(),
        }
    }
}

impl Entity for StringValue {
    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn visit_refs(&self, _visitor: &mut dyn RefVisitor) {}

    fn visit_refs_mut(&mut self, _visitor: &mut dyn RefVisitorMut) {}

    fn into_record(self) -> Record {
        Record::StringValue(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::StringValue(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(entity: &impl Entity) -> Vec<(&'static str, EntityKind, Ref)> {
        let mut seen = Vec::new();
        entity.visit_refs(&mut |_: EntityId, field: FieldInfo, handle: &Ref| {
            seen.push((field.name, field.target, *handle));
        });
        seen
    }

    #[test]
    fn test_sequence_fields() {
        let track = EntityId::new();
        let mut sequence = Sequence::new();
        sequence.tracks = vec![Ref::Id(track), Ref::Null];
        sequence.global_aisacs = vec![Ref::Id(EntityId::new())];

        let fields = collect(&sequence);
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], ("tracks", EntityKind::Track, Ref::Id(track)));
        assert_eq!(fields[2].1, EntityKind::Command(CommandTableKind::Sequence));
        assert_eq!(fields[3].1, EntityKind::GlobalAisacReference);
    }

    #[test]
    fn test_unknown_item_type_is_skipped() {
        let mut synth = Synth::new();
        synth.items = vec![
            ReferenceItem::waveform(EntityId::new()),
            ReferenceItem {
                item_type: 9,
                handle: Ref::Offset(2),
            },
        ];
        let fields = collect(&synth);
        // One item plus command; the unknown tag has no target table.
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].1, EntityKind::Waveform);
    }

    #[test]
    fn test_external_target_not_visited() {
        let mut track = Track::new();
        track.target = TrackTarget {
            target_type: target_type::CUE,
            cue: Ref::Null,
            external_id: 42,
            name: String::new(),
            bank: "other_bank".to_string(),
        };
        assert!(collect(&track).iter().all(|(name, _, _)| *name != "target"));

        track.target = TrackTarget::local_cue(EntityId::new());
        assert!(collect(&track).iter().any(|(name, _, _)| *name == "target"));
    }

    #[test]
    fn test_waveform_archive_ids() {
        let memory = Waveform::new(ArchiveKind::Memory, 3);
        assert_eq!(memory.archive_ids(), vec![(ArchiveKind::Memory, 3)]);
        assert_eq!(memory.legacy_awb_id(), 3);

        let stream = Waveform::new(ArchiveKind::Stream, 5);
        assert_eq!(stream.archive_ids(), vec![(ArchiveKind::Stream, 5)]);
        assert_eq!(stream.legacy_awb_id(), 5);

        let mut prefetch = Waveform::new(ArchiveKind::Memory, 1);
        prefetch.streaming = 2;
        prefetch.stream_awb_id = 4;
        assert_eq!(prefetch.archive_ids().len(), 2);
    }
}
