//! Reopen and corruption scenarios for the ring buffer file.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use galena_storage::ring_buffer::{open_path, HeaderField, DATA_OFFSET};
use galena_storage::{RecoveryInconsistency, RecoveryOutcome, RingBufferStore, SEQNO_NONE};

const SIZE: usize = 64 * 1024;

fn fill(store: &RingBufferStore, seqnos: std::ops::Range<i64>) {
    for seqno in seqnos {
        let payload = format!("write-set {seqno}");
        let h = store.allocate(payload.len()).unwrap();
        store.write(h, payload.as_bytes()).unwrap();
        store.commit(h, seqno).unwrap();
        store.release(h).unwrap();
    }
}

fn patch_word(path: &Path, field: HeaderField, value: i64) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(field.byte_offset() as u64)).unwrap();
    file.write_all(&value.to_le_bytes()).unwrap();
}

fn discarded_after(patch: impl FnOnce(&Path)) -> RecoveryOutcome {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("galena.cache");

    let store = open_path(&path, SIZE).unwrap();
    fill(&store, 100..110);
    store.close().unwrap();

    patch(&path);

    let store = open_path(&path, SIZE).unwrap();
    let outcome = store.recovery().clone();
    assert_eq!(store.seqno_range(), None, "{outcome:?}");
    assert_eq!(store.lookup(100), None);
    outcome
}

#[test]
fn clean_reopen_keeps_every_seqno() {
    galena_core::logging::init("galena_storage=info");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("galena.cache");

    let store = open_path(&path, SIZE).unwrap();
    fill(&store, 1000..1200);
    store.close().unwrap();

    let store = open_path(&path, SIZE).unwrap();
    assert!(store.recovery().is_recovered());
    assert_eq!(store.seqno_range(), Some((1000, 1199)));
    for seqno in 1000..1200 {
        let h = store.lookup(seqno).unwrap();
        assert_eq!(
            &store.read(h).unwrap()[..],
            format!("write-set {seqno}").as_bytes()
        );
    }

    // the cache keeps working after recovery
    fill(&store, 1200..1300);
    assert_eq!(store.seqno_range().map(|(_, max)| max), Some(1299));
}

#[test]
fn preamble_is_human_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("galena.cache");

    let store = open_path(&path, SIZE).unwrap();
    fill(&store, 5..8);
    store.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), DATA_OFFSET + SIZE);
    let text = String::from_utf8_lossy(&bytes[..1024]);
    assert!(text.contains("Closed       : yes"));
    assert!(text.contains("Min. seqno   : 5"));
    assert!(text.contains("Max. seqno   : 7"));
}

#[test]
fn dirty_bit_discards_everything() {
    let outcome = discarded_after(|path| patch_word(path, HeaderField::FileOpen, 1));
    assert_eq!(
        outcome,
        RecoveryOutcome::Discarded {
            reason: RecoveryInconsistency::NotClosed
        }
    );
}

#[test]
fn version_mismatch_discards() {
    let outcome = discarded_after(|path| patch_word(path, HeaderField::Version, 99));
    assert_eq!(
        outcome,
        RecoveryOutcome::Discarded {
            reason: RecoveryInconsistency::VersionMismatch { found: 99 }
        }
    );
}

#[test]
fn data_offset_mismatch_discards() {
    let outcome = discarded_after(|path| patch_word(path, HeaderField::DataOffset, 512));
    assert!(matches!(
        outcome,
        RecoveryOutcome::Discarded {
            reason: RecoveryInconsistency::DataOffsetMismatch { found: 512 }
        }
    ));
}

#[test]
fn bogus_offsets_discard() {
    let outcome =
        discarded_after(|path| patch_word(path, HeaderField::FirstOffset, SIZE as i64 + 8));
    assert!(matches!(
        outcome,
        RecoveryOutcome::Discarded {
            reason: RecoveryInconsistency::BogusFirst { .. }
        }
    ));

    let outcome = discarded_after(|path| patch_word(path, HeaderField::NextOffset, 24));
    assert!(matches!(
        outcome,
        RecoveryOutcome::Discarded {
            reason: RecoveryInconsistency::ScanMismatch { next: 24, .. }
        }
    ));
}

#[test]
fn half_set_seqno_range_discards() {
    let outcome = discarded_after(|path| patch_word(path, HeaderField::SeqnoMax, SEQNO_NONE));
    assert_eq!(
        outcome,
        RecoveryOutcome::Discarded {
            reason: RecoveryInconsistency::InconsistentSeqnos {
                min: 100,
                max: SEQNO_NONE
            }
        }
    );
}

#[test]
fn widened_seqno_range_is_a_gap() {
    let outcome = discarded_after(|path| patch_word(path, HeaderField::SeqnoMax, 115));
    assert_eq!(
        outcome,
        RecoveryOutcome::Discarded {
            reason: RecoveryInconsistency::SeqnoGap { seqno: 110 }
        }
    );
}

#[test]
fn narrowed_seqno_range_is_a_stray() {
    let outcome = discarded_after(|path| patch_word(path, HeaderField::SeqnoMin, 105));
    assert_eq!(
        outcome,
        RecoveryOutcome::Discarded {
            reason: RecoveryInconsistency::StraySeqno { seqno: 100 }
        }
    );
}

#[test]
fn discarded_cache_is_reusable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("galena.cache");

    let store = open_path(&path, SIZE).unwrap();
    fill(&store, 0..10);
    std::mem::forget(store);

    let store = open_path(&path, SIZE).unwrap();
    assert!(!store.recovery().is_recovered());
    fill(&store, 50..60);
    store.close().unwrap();

    let store = open_path(&path, SIZE).unwrap();
    assert!(store.recovery().is_recovered());
    assert_eq!(store.seqno_range(), Some((50, 59)));
}
