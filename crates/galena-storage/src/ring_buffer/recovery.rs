//! Crash-recovery validation of an existing cache file.
//!
//! Recovery trusts nothing it cannot check. The persisted header is validated
//! first, then every record between the first and next offsets is walked to
//! rebuild the seqno index. Any inconsistency discards the whole cache: a
//! cold cache is acceptable, serving corrupt history is not.
//!
//! Records that are still marked in use are the one exception. Nobody can
//! hold them after a restart, so they are released with a warning instead
//! of failing the walk.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::layout::{
    BufferHeader, FileHeader, BUFFER_HEADER_LEN, DATA_OFFSET, HEADER_LEN, HEADER_VERSION,
    SEQNO_NONE,
};

/// Reason an existing cache file was discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecoveryInconsistency {
    /// Unsupported format version.
    #[error("unsupported version {found}")]
    VersionMismatch {
        /// Version found in the file.
        found: i64,
    },

    /// Header word count differs.
    #[error("header length {found} does not match")]
    HeaderLenMismatch {
        /// Length found in the file.
        found: i64,
    },

    /// Declared file size differs from the actual size.
    #[error("file size does not match, declared {declared}, real {actual}")]
    FileSizeMismatch {
        /// Size recorded in the header.
        declared: i64,
        /// Size of the mapped file.
        actual: usize,
    },

    /// Data region offset differs.
    #[error("data offset {found} does not match derived {}", DATA_OFFSET)]
    DataOffsetMismatch {
        /// Offset recorded in the header.
        found: i64,
    },

    /// The file was not closed gracefully.
    #[error("cache file was not gracefully closed")]
    NotClosed,

    /// The first offset lies outside the data region.
    #[error("bogus first buffer offset {offset}")]
    BogusFirst {
        /// Offset recorded in the header.
        offset: i64,
    },

    /// The next offset lies outside the data region.
    #[error("bogus next buffer offset {offset}")]
    BogusNext {
        /// Offset recorded in the header.
        offset: i64,
    },

    /// Exactly one of the seqno bounds is unset.
    #[error("inconsistent seqnos: {min}, {max}")]
    InconsistentSeqnos {
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },

    /// The seqno bounds are inverted.
    #[error("minimum seqno {min} > maximum seqno {max}")]
    SeqnoRangeInverted {
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },

    /// A record header is malformed or overruns the data region.
    #[error("malformed record of size {size} at offset {offset}")]
    BadRecord {
        /// Record offset.
        offset: usize,
        /// Declared record size.
        size: u64,
    },

    /// The walk did not end at the persisted next offset.
    #[error("failed to validate allocated buffers: walk ended at {reached}, expected {next}")]
    ScanMismatch {
        /// Where the walk ended.
        reached: usize,
        /// Persisted next offset.
        next: usize,
    },

    /// Two records carry the same seqno.
    #[error("seqno {seqno} appears twice")]
    DuplicateSeqno {
        /// The duplicated seqno.
        seqno: i64,
    },

    /// A seqno inside the persisted range is missing.
    #[error("discontinuity in sequence numbers: {seqno} is missing")]
    SeqnoGap {
        /// First missing seqno.
        seqno: i64,
    },

    /// A record carries a seqno outside the persisted range.
    #[error("seqno {seqno} lies outside the persisted range")]
    StraySeqno {
        /// The unexpected seqno.
        seqno: i64,
    },
}

/// What happened to the cache contents when the store was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No previous file existed.
    Fresh,
    /// The previous contents were validated and kept.
    Recovered {
        /// Seqno range present in the index.
        seqno_range: Option<(i64, i64)>,
        /// Records found between the first and next offsets.
        buffers: usize,
        /// Records that were still in use and got released.
        auto_released: usize,
    },
    /// The previous contents were discarded.
    Discarded {
        /// Why validation failed.
        reason: RecoveryInconsistency,
    },
}

impl RecoveryOutcome {
    /// Returns `true` if previous contents were kept.
    #[must_use]
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

/// Validated ring state rebuilt from disk.
#[derive(Debug)]
pub(crate) struct Recovered {
    pub first: usize,
    pub next: usize,
    pub index: BTreeMap<i64, usize>,
    /// Record offsets in scan order.
    pub records: Vec<usize>,
    pub buffers: usize,
    pub auto_released: usize,
}

/// Validates a mapped cache file of `size_cache` data bytes.
///
/// Records found in use are released in place; nothing else is written.
pub(crate) fn recover(
    file: &mut [u8],
    size_cache: usize,
) -> Result<Recovered, RecoveryInconsistency> {
    let header = FileHeader::read(file);
    let (first, next) = check_header(&header, file.len(), size_cache)?;

    info!(first, next, "validating cached buffers");
    let data = &mut file[DATA_OFFSET..];
    let mut index = BTreeMap::new();
    let mut records = Vec::new();
    let mut buffers = 0;
    let mut auto_released = 0;
    let mut scanned = 0;
    let mut wrapped = false;
    let mut pos = first;

    while pos != next {
        if pos + BUFFER_HEADER_LEN > size_cache {
            return Err(RecoveryInconsistency::BadRecord {
                offset: pos,
                size: 0,
            });
        }
        let bh = BufferHeader::read(data, pos);

        if bh.size == 0 {
            if wrapped {
                break;
            }
            wrapped = true;
            pos = 0;
            continue;
        }

        let bad = RecoveryInconsistency::BadRecord {
            offset: pos,
            size: bh.size,
        };
        let size = usize::try_from(bh.size)
            .ok()
            .filter(|&size| {
                size >= BUFFER_HEADER_LEN && pos + size + BUFFER_HEADER_LEN <= size_cache
            })
            .ok_or_else(|| bad.clone())?;
        scanned += size;
        if scanned > size_cache {
            return Err(bad);
        }

        if !bh.is_released() {
            warn!(offset = pos, seqno = bh.seqno, "releasing buffer left in use");
            BufferHeader::mark_released(data, pos);
            auto_released += 1;
        }
        if bh.seqno != SEQNO_NONE {
            if bh.seqno < 0 {
                return Err(bad);
            }
            if index.insert(bh.seqno, pos).is_some() {
                return Err(RecoveryInconsistency::DuplicateSeqno { seqno: bh.seqno });
            }
        }

        records.push(pos);
        buffers += 1;
        pos += size;
    }

    if pos != next {
        return Err(RecoveryInconsistency::ScanMismatch { reached: pos, next });
    }
    info!(buffers, auto_released, "validating cached buffers done");

    check_seqnos(&index, header.seqno_min, header.seqno_max)?;

    Ok(Recovered {
        first,
        next,
        index,
        records,
        buffers,
        auto_released,
    })
}

fn check_header(
    header: &FileHeader,
    file_len: usize,
    size_cache: usize,
) -> Result<(usize, usize), RecoveryInconsistency> {
    if header.version != HEADER_VERSION {
        return Err(RecoveryInconsistency::VersionMismatch {
            found: header.version,
        });
    }
    if header.header_len != HEADER_LEN as i64 {
        return Err(RecoveryInconsistency::HeaderLenMismatch {
            found: header.header_len,
        });
    }
    if usize::try_from(header.file_size).ok() != Some(file_len) {
        return Err(RecoveryInconsistency::FileSizeMismatch {
            declared: header.file_size,
            actual: file_len,
        });
    }
    if header.data_offset != DATA_OFFSET as i64 {
        return Err(RecoveryInconsistency::DataOffsetMismatch {
            found: header.data_offset,
        });
    }
    if header.file_open {
        return Err(RecoveryInconsistency::NotClosed);
    }

    let in_region = |offset: i64| {
        usize::try_from(offset)
            .ok()
            .filter(|&offset| offset + BUFFER_HEADER_LEN <= size_cache)
    };
    let first = in_region(header.first).ok_or(RecoveryInconsistency::BogusFirst {
        offset: header.first,
    })?;
    let next = in_region(header.next).ok_or(RecoveryInconsistency::BogusNext {
        offset: header.next,
    })?;

    let (min, max) = (header.seqno_min, header.seqno_max);
    if (min == SEQNO_NONE) != (max == SEQNO_NONE) {
        return Err(RecoveryInconsistency::InconsistentSeqnos { min, max });
    }
    if min > max {
        return Err(RecoveryInconsistency::SeqnoRangeInverted { min, max });
    }

    Ok((first, next))
}

/// The index must hold exactly the seqnos `min..=max`.
fn check_seqnos(
    index: &BTreeMap<i64, usize>,
    min: i64,
    max: i64,
) -> Result<(), RecoveryInconsistency> {
    if min == SEQNO_NONE {
        return match index.keys().next() {
            Some(&seqno) => Err(RecoveryInconsistency::StraySeqno { seqno }),
            None => Ok(()),
        };
    }

    info!(min, max, "checking for gaps in sequence numbers");
    if let Some(&seqno) = index.keys().find(|&&s| s < min || s > max) {
        return Err(RecoveryInconsistency::StraySeqno { seqno });
    }
    let mut expected = min;
    for &seqno in index.keys() {
        if seqno != expected {
            return Err(RecoveryInconsistency::SeqnoGap { seqno: expected });
        }
        expected += 1;
    }
    if expected <= max {
        return Err(RecoveryInconsistency::SeqnoGap { seqno: expected });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 1024;

    /// Builds a closed file image with the given records laid out from 0.
    fn image(records: &[(usize, i64, bool)], range: (i64, i64)) -> Vec<u8> {
        let mut file = vec![0u8; DATA_OFFSET + SIZE];
        let mut pos = 0;
        {
            let data = &mut file[DATA_OFFSET..];
            for &(size, seqno, released) in records {
                let mut bh = BufferHeader::new(size as u64);
                bh.seqno = seqno;
                if released {
                    bh.flags = BufferHeader::RELEASED;
                }
                bh.write(data, pos);
                pos += size;
            }
        }
        header(pos, range).write(&mut file);
        file
    }

    fn header(next: usize, (seqno_min, seqno_max): (i64, i64)) -> FileHeader {
        FileHeader {
            header_len: HEADER_LEN as i64,
            version: HEADER_VERSION,
            file_open: false,
            file_size: (DATA_OFFSET + SIZE) as i64,
            data_offset: DATA_OFFSET as i64,
            first: 0,
            next: next as i64,
            seqno_min,
            seqno_max,
        }
    }

    #[test]
    fn test_recover_contiguous() {
        let mut file = image(&[(64, 5, true), (40, 6, true), (32, SEQNO_NONE, true)], (5, 6));
        let rec = recover(&mut file, SIZE).unwrap();
        assert_eq!(rec.buffers, 3);
        assert_eq!(rec.auto_released, 0);
        assert_eq!(rec.next, 136);
        assert_eq!(rec.index.into_iter().collect::<Vec<_>>(), vec![(5, 0), (6, 64)]);
    }

    #[test]
    fn test_recover_releases_buffers_in_use() {
        let mut file = image(&[(64, 1, false), (64, 2, true)], (1, 2));
        let rec = recover(&mut file, SIZE).unwrap();
        assert_eq!(rec.auto_released, 1);
        assert!(BufferHeader::read(&file[DATA_OFFSET..], 0).is_released());
    }

    #[test]
    fn test_recover_empty() {
        let mut file = image(&[], (SEQNO_NONE, SEQNO_NONE));
        let rec = recover(&mut file, SIZE).unwrap();
        assert_eq!(rec.buffers, 0);
        assert!(rec.index.is_empty());
    }

    #[test]
    fn test_recover_follows_wrap_sentinel() {
        // [0, 100) live, [900, 964) live, zero header at 964 wraps
        let mut file = vec![0u8; DATA_OFFSET + SIZE];
        {
            let data = &mut file[DATA_OFFSET..];
            let mut bh = BufferHeader::new(64);
            bh.seqno = 10;
            bh.flags = BufferHeader::RELEASED;
            bh.write(data, 900);
            bh.size = 100;
            bh.seqno = 11;
            bh.write(data, 0);
        }
        let mut h = header(100, (10, 11));
        h.first = 900;
        h.write(&mut file);

        let rec = recover(&mut file, SIZE).unwrap();
        assert_eq!(rec.first, 900);
        assert_eq!(rec.index.into_iter().collect::<Vec<_>>(), vec![(10, 900), (11, 0)]);
    }

    #[test]
    fn test_header_checks() {
        let cases: Vec<(Box<dyn Fn(&mut FileHeader)>, RecoveryInconsistency)> = vec![
            (
                Box::new(|h: &mut FileHeader| h.version = 7),
                RecoveryInconsistency::VersionMismatch { found: 7 },
            ),
            (
                Box::new(|h: &mut FileHeader| h.file_open = true),
                RecoveryInconsistency::NotClosed,
            ),
            (
                Box::new(|h: &mut FileHeader| h.first = SIZE as i64),
                RecoveryInconsistency::BogusFirst {
                    offset: SIZE as i64,
                },
            ),
            (
                Box::new(|h: &mut FileHeader| h.next = -8),
                RecoveryInconsistency::BogusNext { offset: -8 },
            ),
            (
                Box::new(|h: &mut FileHeader| h.seqno_max = SEQNO_NONE),
                RecoveryInconsistency::InconsistentSeqnos {
                    min: 1,
                    max: SEQNO_NONE,
                },
            ),
            (
                Box::new(|h: &mut FileHeader| {
                    h.seqno_min = 3;
                    h.seqno_max = 2;
                }),
                RecoveryInconsistency::SeqnoRangeInverted { min: 3, max: 2 },
            ),
        ];

        for (corrupt, expected) in cases {
            let mut file = image(&[(64, 1, true)], (1, 1));
            let mut h = FileHeader::read(&file);
            corrupt(&mut h);
            h.write(&mut file);
            assert_eq!(recover(&mut file, SIZE).unwrap_err(), expected);
        }
    }

    #[test]
    fn test_seqno_gap_and_stray() {
        let mut file = image(&[(64, 1, true), (64, 3, true)], (1, 3));
        assert_eq!(
            recover(&mut file, SIZE).unwrap_err(),
            RecoveryInconsistency::SeqnoGap { seqno: 2 }
        );

        let mut file = image(&[(64, 1, true), (64, 9, true)], (1, 1));
        assert_eq!(
            recover(&mut file, SIZE).unwrap_err(),
            RecoveryInconsistency::StraySeqno { seqno: 9 }
        );

        let mut file = image(&[(64, 4, true), (64, 4, true)], (4, 4));
        assert_eq!(
            recover(&mut file, SIZE).unwrap_err(),
            RecoveryInconsistency::DuplicateSeqno { seqno: 4 }
        );
    }

    #[test]
    fn test_scan_mismatch() {
        let mut file = image(&[(64, 1, true)], (1, 1));
        let mut h = FileHeader::read(&file);
        h.next = 32;
        h.write(&mut file);
        assert!(matches!(
            recover(&mut file, SIZE).unwrap_err(),
            RecoveryInconsistency::ScanMismatch { next: 32, .. }
        ));
    }

    #[test]
    fn test_oversized_record() {
        let mut file = image(&[(64, 1, true)], (1, 1));
        BufferHeader::new(SIZE as u64 * 4).write(&mut file[DATA_OFFSET..], 0);
        assert!(matches!(
            recover(&mut file, SIZE).unwrap_err(),
            RecoveryInconsistency::BadRecord { offset: 0, .. }
        ));
    }
}
