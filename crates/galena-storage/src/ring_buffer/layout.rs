//! On-disk layout of the ring buffer file.
//!
//! ```text
//! +----------------------+  0
//! | text preamble        |  PREAMBLE_LEN bytes, NUL padded
//! +----------------------+  PREAMBLE_LEN
//! | binary header        |  HEADER_LEN little-endian i64 words
//! +----------------------+  DATA_OFFSET
//! | data region          |  records: BufferHeader + payload
//! +----------------------+  DATA_OFFSET + size
//! ```
//!
//! All offsets stored in the header are relative to `DATA_OFFSET`.

use std::fmt::Write as _;

/// Length of the human-readable preamble.
pub const PREAMBLE_LEN: usize = 1024;

/// Number of 8-byte words in the binary header.
pub const HEADER_LEN: usize = 32;

/// Current file format version.
pub const HEADER_VERSION: i64 = 1;

/// Offset of the data region from the start of the file.
pub const DATA_OFFSET: usize = PREAMBLE_LEN + HEADER_LEN * 8;

/// Seqno of a buffer that is not part of the ordered history.
pub const SEQNO_NONE: i64 = -1;

/// Size of a [`BufferHeader`] on disk.
pub const BUFFER_HEADER_LEN: usize = 24;

/// Header words with a defined meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum HeaderField {
    /// Number of header words.
    HeaderLen = 0,
    /// Format version.
    Version,
    /// Non-zero while the file is open (dirty bit).
    FileOpen,
    /// Total file size in bytes.
    FileSize,
    /// Offset of the data region.
    DataOffset,
    /// Offset of the oldest record.
    FirstOffset,
    /// Offset where the next record goes.
    NextOffset,
    /// Lowest persisted seqno, or [`SEQNO_NONE`].
    SeqnoMin,
    /// Highest persisted seqno, or [`SEQNO_NONE`].
    SeqnoMax,
}

impl HeaderField {
    /// Absolute byte offset of this word in the file.
    #[must_use]
    pub const fn byte_offset(self) -> usize {
        PREAMBLE_LEN + self as usize * 8
    }
}

#[inline]
pub(crate) fn read_i64(buf: &[u8], at: usize) -> i64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[at..at + 8]);
    i64::from_le_bytes(word)
}

#[inline]
pub(crate) fn write_i64(buf: &mut [u8], at: usize, value: i64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(word)
}

/// Decoded binary file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Number of header words.
    pub header_len: i64,
    /// Format version.
    pub version: i64,
    /// Dirty bit.
    pub file_open: bool,
    /// Total file size.
    pub file_size: i64,
    /// Data region offset.
    pub data_offset: i64,
    /// First record offset.
    pub first: i64,
    /// Next record offset.
    pub next: i64,
    /// Lowest seqno.
    pub seqno_min: i64,
    /// Highest seqno.
    pub seqno_max: i64,
}

impl FileHeader {
    /// Reads the header from the start of a mapped file.
    #[must_use]
    pub fn read(file: &[u8]) -> Self {
        let word = |field: HeaderField| read_i64(file, field.byte_offset());
        Self {
            header_len: word(HeaderField::HeaderLen),
            version: word(HeaderField::Version),
            file_open: word(HeaderField::FileOpen) != 0,
            file_size: word(HeaderField::FileSize),
            data_offset: word(HeaderField::DataOffset),
            first: word(HeaderField::FirstOffset),
            next: word(HeaderField::NextOffset),
            seqno_min: word(HeaderField::SeqnoMin),
            seqno_max: word(HeaderField::SeqnoMax),
        }
    }

    /// Writes the binary header and refreshes the preamble.
    pub fn write(&self, file: &mut [u8]) {
        let words = [
            (HeaderField::HeaderLen, self.header_len),
            (HeaderField::Version, self.version),
            (HeaderField::FileOpen, i64::from(self.file_open)),
            (HeaderField::FileSize, self.file_size),
            (HeaderField::DataOffset, self.data_offset),
            (HeaderField::FirstOffset, self.first),
            (HeaderField::NextOffset, self.next),
            (HeaderField::SeqnoMin, self.seqno_min),
            (HeaderField::SeqnoMax, self.seqno_max),
        ];
        for (field, value) in words {
            write_i64(file, field.byte_offset(), value);
        }
        self.write_preamble(&mut file[..PREAMBLE_LEN]);
    }

    fn write_preamble(&self, out: &mut [u8]) {
        let mut text = String::with_capacity(PREAMBLE_LEN);
        // writing into a String cannot fail
        let _ = write!(
            text,
            "* galena cache file *\n\
             ---------------------\n\
             Version      : {}\n\
             Size         : {} bytes\n\
             Closed       : {}\n\
             Data offset  : {}\n\
             First buffer : {}\n\
             Next buffer  : {}\n\
             Min. seqno   : {}\n\
             Max. seqno   : {}\n\
             ---------------------\n",
            self.version,
            self.file_size,
            if self.file_open { "no" } else { "yes" },
            self.data_offset,
            self.first,
            self.next,
            self.seqno_min,
            self.seqno_max,
        );

        out.fill(0);
        let len = text.len().min(out.len() - 1);
        out[..len].copy_from_slice(&text.as_bytes()[..len]);
    }
}

/// Record header preceding every payload in the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHeader {
    /// Record length including this header. Zero marks the closing header
    /// or a wrap to the start of the data region.
    pub size: u64,
    /// Assigned seqno, or [`SEQNO_NONE`].
    pub seqno: i64,
    /// Flag bits.
    pub flags: u32,
}

impl BufferHeader {
    /// The consumer has released the buffer.
    pub const RELEASED: u32 = 1;

    /// Creates the header of a freshly allocated record.
    #[must_use]
    pub const fn new(size: u64) -> Self {
        Self {
            size,
            seqno: SEQNO_NONE,
            flags: 0,
        }
    }

    /// Reads the header at `at` in the data region.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn read(data: &[u8], at: usize) -> Self {
        Self {
            size: read_i64(data, at) as u64,
            seqno: read_i64(data, at + 8),
            flags: read_u32(data, at + 16),
        }
    }

    /// Writes the header at `at` in the data region.
    #[allow(clippy::cast_possible_wrap)]
    pub fn write(&self, data: &mut [u8], at: usize) {
        write_i64(data, at, self.size as i64);
        write_i64(data, at + 8, self.seqno);
        data[at + 16..at + 20].copy_from_slice(&self.flags.to_le_bytes());
        data[at + 20..at + BUFFER_HEADER_LEN].fill(0);
    }

    /// Zeroes the header at `at`.
    pub fn clear(data: &mut [u8], at: usize) {
        data[at..at + BUFFER_HEADER_LEN].fill(0);
    }

    /// Overwrites only the seqno field at `at`.
    pub fn set_seqno(data: &mut [u8], at: usize, seqno: i64) {
        write_i64(data, at + 8, seqno);
    }

    /// Sets the released bit at `at`.
    pub fn mark_released(data: &mut [u8], at: usize) {
        let flags = read_u32(data, at + 16) | Self::RELEASED;
        data[at + 16..at + 20].copy_from_slice(&flags.to_le_bytes());
    }

    /// Clears the released flag of the header at `at`.
    pub fn clear_released(data: &mut [u8], at: usize) {
        let flags = read_u32(data, at + 16) & !Self::RELEASED;
        data[at + 16..at + 20].copy_from_slice(&flags.to_le_bytes());
    }

    /// Returns `true` if the released bit is set.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.flags & Self::RELEASED != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(DATA_OFFSET, 1280);
        assert_eq!(HeaderField::HeaderLen.byte_offset(), PREAMBLE_LEN);
        assert_eq!(HeaderField::SeqnoMax.byte_offset(), PREAMBLE_LEN + 64);
    }

    #[test]
    fn test_file_header_roundtrip() {
        let mut file = vec![0u8; DATA_OFFSET];
        let header = FileHeader {
            header_len: HEADER_LEN as i64,
            version: HEADER_VERSION,
            file_open: true,
            file_size: 5376,
            data_offset: DATA_OFFSET as i64,
            first: 48,
            next: 96,
            seqno_min: 3,
            seqno_max: 9,
        };
        header.write(&mut file);
        assert_eq!(FileHeader::read(&file), header);

        let preamble = String::from_utf8_lossy(&file[..PREAMBLE_LEN]);
        assert!(preamble.starts_with("* galena cache file *"));
        assert!(preamble.contains("Closed       : no"));
        assert!(preamble.contains("Max. seqno   : 9"));
    }

    #[test]
    fn test_buffer_header_flags() {
        let mut data = vec![0xAAu8; 64];
        BufferHeader::new(40).write(&mut data, 8);

        let bh = BufferHeader::read(&data, 8);
        assert_eq!(bh.size, 40);
        assert_eq!(bh.seqno, SEQNO_NONE);
        assert!(!bh.is_released());

        BufferHeader::set_seqno(&mut data, 8, 42);
        BufferHeader::mark_released(&mut data, 8);
        let bh = BufferHeader::read(&data, 8);
        assert_eq!(bh.seqno, 42);
        assert!(bh.is_released());

        BufferHeader::clear_released(&mut data, 8);
        assert!(!BufferHeader::read(&data, 8).is_released());
        BufferHeader::mark_released(&mut data, 8);

        BufferHeader::clear(&mut data, 8);
        assert_eq!(BufferHeader::read(&data, 8).size, 0);
        // neighbours untouched
        assert_eq!(data[7], 0xAA);
        assert_eq!(data[8 + BUFFER_HEADER_LEN], 0xAA);
    }
}
