//! Scenario Tests
//!
//! Loading, editing, sweeping and packing a small bank end to end.

mod common;

use common::*;
use cuebank::bank;
use cuebank::graph::pack;
use cuebank::model::{
    CommandTableKind, Container, EntityKind, GlobalAisacReference, Ref, Sequence,
};
use cuebank::schema::columns::*;
use cuebank::schema::SchemaVersion;
use cuebank::tables::TableAccessor;
use cuebank::Session;
use pretty_assertions::assert_eq;

// === Scenario A: remove a track and sweep ===

#[test]
fn test_scenario_a_tracks_resolve_to_distinct_ids() {
    let mut session = Session::default();
    let container = bank::load(&scenario_bank(SchemaVersion::CURRENT), &mut session).unwrap();

    let tracks = &container.sequences[0].tracks;
    assert_eq!(tracks.len(), 2);
    let first = tracks[0].as_id().expect("first track resolved");
    let second = tracks[1].as_id().expect("second track resolved");
    assert_ne!(first, second);
    assert_eq!(first, container.tracks[0].id);
    assert_eq!(second, container.tracks[1].id);

    let waveform = &container.waveforms[0];
    assert_eq!(waveform.memory_awb_id, 3);
    assert!(!waveform.is_streaming());
}

#[test]
fn test_scenario_a_remove_track_and_sweep() {
    let mut session = Session::default();
    let mut container = bank::load(&scenario_bank(SchemaVersion::CURRENT), &mut session).unwrap();

    let kept_track = container.tracks[0].clone();
    let removed_track = container.tracks[1].clone();
    let kept_event = kept_track.event.as_id().unwrap();
    let removed_command = removed_track.command.as_id().unwrap();
    let kept_synth = container.synths[0].id;
    let kept_waveform = container.waveforms[0].id;

    let edits = container.remove(EntityKind::Track, removed_track.id).unwrap();
    // Detached from the sequence, then removed.
    assert_eq!(edits.len(), 2);
    assert_eq!(container.sequences[0].tracks, vec![Ref::Id(kept_track.id)]);

    let (report, _) = session.sweep(&mut container);
    assert!(!report.truncated);

    // The surviving track's chain is intact.
    assert_eq!(container.tracks.len(), 1);
    assert!(container.contains(kept_event));
    assert!(container.contains(kept_synth));
    assert!(container.contains(kept_waveform));
    assert_eq!(container.synths[0].items[0].handle, Ref::Id(kept_waveform));

    // The removed track's command group, event, synth and waveform are gone.
    assert!(!container.contains(removed_command));
    assert!(container.commands.groups(CommandTableKind::Track).is_empty());
    assert_eq!(container.commands.groups(CommandTableKind::TrackEvent).len(), 1);
    assert_eq!(container.synths.len(), 1);
    assert_eq!(container.waveforms.len(), 1);
    assert_eq!(report.removed, 4);

    // The edited bank still saves and the offsets follow the removals.
    let saved = bank::save(&container, &mut session).unwrap();
    let tracks = saved.column_table(TRACK_TABLE).unwrap();
    assert_eq!(tracks.row_count(), 1);
    assert_eq!(tracks.value::<u16>(0, COMMAND_INDEX), NULL16);
    let sequences = saved.column_table(SEQUENCE_TABLE).unwrap();
    assert_eq!(sequences.value::<u16>(0, NUM_TRACKS), 1);
    assert_eq!(sequences.value::<Vec<u8>>(0, TRACK_INDEX), vec![0, 0]);
}

#[test]
fn test_scenario_a_on_legacy_commands() {
    let mut session = Session::default();
    let mut container =
        bank::load(&scenario_bank(SchemaVersion::new(1, 22, 0, 0)), &mut session).unwrap();
    let removed = container.tracks[1].id;

    container.remove(EntityKind::Track, removed).unwrap();
    session.sweep(&mut container);

    // Only the kept track's event survives in the shared table.
    assert_eq!(container.commands.groups(CommandTableKind::Shared).len(), 1);
    assert_eq!(container.synths.len(), 1);
}

// === Scenario B: identical global aisac lists share one window ===

fn scenario_b() -> Container {
    let mut container = Container::new("scenario_b", SchemaVersion::CURRENT);
    let a = GlobalAisacReference::new("a");
    let b = GlobalAisacReference::new("b");
    let runs = vec![Ref::Id(a.id), Ref::Id(b.id)];
    container.global_aisac_refs = vec![a, b];

    for _ in 0..2 {
        let mut sequence = Sequence::new();
        sequence.global_aisacs = runs.clone();
        container.sequences.push(sequence);
    }
    container
}

#[test]
fn test_scenario_b_same_window() {
    let container = scenario_b();
    let packed = pack(&container).unwrap();

    let first = packed.slot(container.sequences[0].id, "global_aisacs");
    let second = packed.slot(container.sequences[1].id, "global_aisacs");
    assert_eq!(first, second);
    assert_eq!((first.start, first.count), (0, 2));
    assert_eq!(packed.physical(EntityKind::GlobalAisacReference).unwrap().len(), 2);
    assert_eq!(packed.duplicated_rows(&container), 0);
}

#[test]
fn test_scenario_b_saved_rows() {
    let container = scenario_b();
    let mut session = Session::default();
    let saved = bank::save(&container, &mut session).unwrap();

    let sequences = saved.column_table(SEQUENCE_TABLE).unwrap();
    for row in 0..2 {
        assert_eq!(sequences.value::<u16>(row, GLOBAL_AISAC_START), 0);
        assert_eq!(sequences.value::<u16>(row, NUM_GLOBAL_AISACS), 2);
    }
    let globals = saved.column_table(GLOBAL_AISAC_REFERENCE_TABLE).unwrap();
    assert_eq!(globals.row_count(), 2);
    assert_eq!(globals.value::<String>(1, NAME), "b");
}

#[test]
fn test_sub_slice_is_appended_again() {
    let mut container = scenario_b();
    let b = container.global_aisac_refs[1].id;
    let mut third = Sequence::new();
    third.global_aisacs = vec![Ref::Id(b)];
    container.sequences.push(third);

    let packed = pack(&container).unwrap();
    let slot = packed.slot(container.sequences[2].id, "global_aisacs");
    assert_eq!((slot.start, slot.count), (2, 1));
    assert_eq!(packed.duplicated_rows(&container), 1);
}
