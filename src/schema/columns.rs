//! Table and column names of the bank layout.

pub const HEADER_TABLE: &str = "Header";
pub const VERSION: &str = "Version";
pub const NAME: &str = "Name";

pub const CUE_TABLE: &str = "CueTable";
pub const CUE_ID: &str = "CueId";
pub const REFERENCE_TYPE: &str = "ReferenceType";
pub const REFERENCE_INDEX: &str = "ReferenceIndex";
pub const LENGTH: &str = "Length";
pub const CUE_NAME: &str = "CueName";

pub const SEQUENCE_TABLE: &str = "SequenceTable";
pub const SYNTH_TABLE: &str = "SynthTable";
pub const TRACK_TABLE: &str = "TrackTable";
pub const ACTION_TRACK_TABLE: &str = "ActionTrackTable";

pub const TYPE: &str = "Type";
pub const VOLUME: &str = "Volume";
pub const NUM_TRACKS: &str = "NumTracks";
pub const TRACK_INDEX: &str = "TrackIndex";
pub const REFERENCE_ITEMS: &str = "ReferenceItems";
pub const COMMAND_INDEX: &str = "CommandIndex";
pub const LOCAL_AISACS: &str = "LocalAisacs";
pub const GLOBAL_AISAC_START: &str = "GlobalAisacStartIndex";
pub const NUM_GLOBAL_AISACS: &str = "NumGlobalAisacs";
pub const ACTION_TRACK_START: &str = "ActionTrackStartIndex";
pub const NUM_ACTION_TRACKS: &str = "NumActionTracks";

pub const EVENT_INDEX: &str = "EventIndex";
pub const TARGET_TYPE: &str = "TargetType";
pub const TARGET_ID: &str = "TargetId";
pub const TARGET_NAME: &str = "TargetName";
pub const TARGET_BANK: &str = "TargetAcbName";

pub const WAVEFORM_TABLE: &str = "WaveformTable";
pub const MEMORY_AWB_ID: &str = "MemoryAwbId";
pub const STREAM_AWB_ID: &str = "StreamAwbId";
pub const LEGACY_AWB_ID: &str = "Id";
pub const ENCODE_TYPE: &str = "EncodeType";
pub const STREAMING: &str = "Streaming";
pub const NUM_CHANNELS: &str = "NumChannels";
pub const LOOP_FLAG: &str = "LoopFlag";
pub const SAMPLING_RATE: &str = "SamplingRate";
pub const NUM_SAMPLES: &str = "NumSamples";

pub const AISAC_TABLE: &str = "AisacTable";
pub const CONTROL_ID: &str = "ControlId";
pub const RANDOM_RANGE: &str = "RandomRange";
pub const GRAPH_INDEXES: &str = "GraphIndexes";
pub const AUTO_MODULATION_INDEX: &str = "AutoModulationIndex";

pub const GLOBAL_AISAC_REFERENCE_TABLE: &str = "GlobalAisacReferenceTable";

pub const GRAPH_TABLE: &str = "GraphTable";
pub const POINTS: &str = "Points";

pub const AUTO_MODULATION_TABLE: &str = "AutoModulationTable";
pub const TRIGGER_TYPE: &str = "TriggerType";
pub const TIME: &str = "Time";
pub const KEY: &str = "Key";

pub const STRING_VALUE_TABLE: &str = "StringValueTable";
pub const STRING_VALUE: &str = "StringValue";

pub const LEGACY_COMMAND_TABLE: &str = "CommandTable";
pub const SEQUENCE_COMMAND_TABLE: &str = "SequenceCommandTable";
pub const SYNTH_COMMAND_TABLE: &str = "SynthCommandTable";
pub const TRACK_COMMAND_TABLE: &str = "TrackCommandTable";
pub const TRACK_EVENT_TABLE: &str = "TrackEventTable";
pub const COMMAND: &str = "Command";

/// The four command tables of the modern layout, in slot order.
pub const SPLIT_COMMAND_TABLES: [&str; 4] = [
    SEQUENCE_COMMAND_TABLE,
    SYNTH_COMMAND_TABLE,
    TRACK_COMMAND_TABLE,
    TRACK_EVENT_TABLE,
];

/// Columns that every known schema version carries. Missing one of these
/// makes the bank unreadable.
pub const REQUIRED_COLUMNS: &[(&str, &str)] = &[
    (HEADER_TABLE, VERSION),
    (CUE_TABLE, REFERENCE_TYPE),
    (CUE_TABLE, REFERENCE_INDEX),
    (SEQUENCE_TABLE, NUM_TRACKS),
    (SEQUENCE_TABLE, TRACK_INDEX),
    (SYNTH_TABLE, REFERENCE_ITEMS),
];

/// Null value of 16-bit reference columns.
pub const NULL_INDEX_U16: u16 = 0xFFFF;

/// Null value of the 32-bit action-track target column.
pub const NULL_INDEX_U32: u32 = 0xFFFF_FFFF;
