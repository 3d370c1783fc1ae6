//! Tagged entity record
//!
//! Generic transport for one entity of any type: used by collection-level
//! operations, by edit snapshots, and by the copy engine's staging area.

use serde::{Deserialize, Serialize};

use crate::model::{
    Aisac, AutoModulation, CommandGroup, Cue, Entity, EntityId, GlobalAisacReference, Graph,
    RefVisitor, RefVisitorMut, Sequence, StringValue, Synth, Track, Waveform,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "entity", rename_all = "snake_case")]
pub enum Record {
    Cue(Cue),
    Sequence(Sequence),
    Synth(Synth),
    Waveform(Waveform),
    /// A track; also used for action tracks.
    Track(Track),
    Aisac(Aisac),
    GlobalAisacReference(GlobalAisacReference),
    Graph(Graph),
    AutoModulation(AutoModulation),
    Command(CommandGroup),
    StringValue(StringValue),
}

macro_rules! dispatch {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            Record::Cue($inner) => $body,
            Record::Sequence($inner) => $body,
            Record::Synth($inner) => $body,
            Record::Waveform($inner) => $body,
            Record::Track($inner) => $body,
            Record::Aisac($inner) => $body,
            Record::GlobalAisacReference($inner) => $body,
            Record::Graph($inner) => $body,
            Record::AutoModulation($inner) => $body,
            Record::Command($inner) => $body,
            Record::StringValue($inner) => $body,
        }
    };
}

impl Record {
    pub fn id(&self) -> EntityId {
        dispatch!(self, entity => entity.id())
    }

    pub fn set_id(&mut self, id: EntityId) {
        dispatch!(self, entity => entity.set_id(id))
    }

    pub fn visit_refs(&self, visitor: &mut dyn RefVisitor) {
        dispatch!(self, entity => entity.visit_refs(visitor))
    }

    pub fn visit_refs_mut(&mut self, visitor: &mut dyn RefVisitorMut) {
        dispatch!(self, entity => entity.visit_refs_mut(visitor))
    }

    /// Type name used in edit descriptions.
    pub fn type_name(&self) -> &'static str {
        match self {
            Record::Cue(_) => "cue",
            Record::Sequence(_) => "sequence",
            Record::Synth(_) => "synth",
            Record::Waveform(_) => "waveform",
            Record::Track(_) => "track",
            Record::Aisac(_) => "aisac",
            Record::GlobalAisacReference(_) => "global aisac reference",
            Record::Graph(_) => "graph",
            Record::AutoModulation(_) => "auto modulation",
            Record::Command(_) => "command group",
            Record::StringValue(_) => "string value",
        }
    }

    /// JSON snapshot of the entity for edit descriptors.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
