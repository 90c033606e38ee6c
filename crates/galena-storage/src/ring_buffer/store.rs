//! Memory-mapped ring buffer store.
//!
//! Records are laid out back to back in the data region. `first` points at
//! the oldest record still in the ring, `next` at a zeroed closing header
//! where the next record goes. When the tail of the region is too short,
//! allocation restarts at offset 0 and the closing header left behind
//! becomes the wrap marker.
//!
//! ```text
//!   0                                                     size
//!   | live ... | next |  free  | first | live ... | 0 | pad |
//!                                                   ^ wrap marker
//! ```
//!
//! Space is reclaimed lazily: allocation advances `first` across released
//! records and drops their seqnos from the index.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use galena_core::{protocol_violation, SharedBuffer};
use memmap2::MmapMut;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::config::RingBufferConfig;
use super::error::{Result, StoreError};
use super::layout::{
    BufferHeader, FileHeader, BUFFER_HEADER_LEN, DATA_OFFSET, HEADER_LEN, HEADER_VERSION,
    SEQNO_NONE,
};
use super::recovery::{self, RecoveryOutcome};

/// Reference to a record in the ring.
///
/// A handle names the record's offset and the allocation that created it.
/// Once the record is reclaimed the handle goes stale, even if a later record
/// lands on the same offset, and every operation rejects it with
/// [`StoreError::UnknownBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    offset: usize,
    len: usize,
    generation: u64,
}

impl BufferHandle {
    /// Offset of the record header in the data region.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Payload capacity in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

struct RingBuffer {
    mmap: MmapMut,
    file: File,
    path: PathBuf,
    size_cache: usize,
    first: usize,
    next: usize,
    /// Bytes held by unreleased records.
    size_used: usize,
    index: BTreeMap<i64, usize>,
    /// Every record between `first` and `next`, by offset, with the
    /// generation it was allocated under.
    records: BTreeMap<usize, u64>,
    generation: u64,
    /// Reclaim never evicts this seqno or anything after it.
    seqno_locked: Option<i64>,
    open: bool,
}

impl RingBuffer {
    fn data(&self) -> &[u8] {
        &self.mmap[DATA_OFFSET..]
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.mmap[DATA_OFFSET..]
    }

    fn header_at(&self, offset: usize) -> BufferHeader {
        BufferHeader::read(self.data(), offset)
    }

    fn reset(&mut self) {
        self.first = 0;
        self.next = 0;
        self.size_used = 0;
        self.index.clear();
        self.records.clear();
        BufferHeader::clear(self.data_mut(), 0);
    }

    fn track(&mut self, offset: usize) -> u64 {
        self.generation += 1;
        self.records.insert(offset, self.generation);
        self.generation
    }

    fn seqno_range(&self) -> Option<(i64, i64)> {
        let min = *self.index.keys().next()?;
        let max = *self.index.keys().next_back()?;
        Some((min, max))
    }

    #[allow(clippy::cast_possible_wrap)]
    fn write_header(&mut self, open: bool) {
        let (seqno_min, seqno_max) = self.seqno_range().unwrap_or((SEQNO_NONE, SEQNO_NONE));
        let header = FileHeader {
            header_len: HEADER_LEN as i64,
            version: HEADER_VERSION,
            file_open: open,
            file_size: self.mmap.len() as i64,
            data_offset: DATA_OFFSET as i64,
            first: self.first as i64,
            next: self.next as i64,
            seqno_min,
            seqno_max,
        };
        header.write(&mut self.mmap[..DATA_OFFSET]);
    }

    fn record(&self, handle: BufferHandle) -> Result<BufferHeader> {
        if self.records.get(&handle.offset) != Some(&handle.generation) {
            return Err(StoreError::UnknownBuffer {
                offset: handle.offset,
            });
        }
        Ok(self.header_at(handle.offset))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn handle_at(&self, offset: usize) -> BufferHandle {
        let bh = self.header_at(offset);
        BufferHandle {
            offset,
            len: bh.size as usize - BUFFER_HEADER_LEN,
            generation: self.records.get(&offset).copied().unwrap_or_default(),
        }
    }

    fn max_payload(&self) -> usize {
        // a contiguous record must stay below half of the region
        (self.size_cache / 2).saturating_sub(BUFFER_HEADER_LEN + 1)
    }

    fn allocate(&mut self, len: usize) -> Result<BufferHandle> {
        let max = self.max_payload();
        if len > max {
            return Err(StoreError::TooLarge {
                requested: len,
                max,
            });
        }

        let size = len + BUFFER_HEADER_LEN;
        match self.get_new_buffer(size) {
            Some(offset) => Ok(BufferHandle {
                offset,
                len,
                generation: self.track(offset),
            }),
            None => Err(StoreError::OutOfSpace {
                requested: size,
                available: self.size_cache - self.size_used,
            }),
        }
    }

    /// Evicts the record at `first`. Returns `None` if it is in use or
    /// locked, otherwise whether `first` wrapped to the data start.
    #[allow(clippy::cast_possible_truncation)]
    fn reclaim_first(&mut self) -> Option<bool> {
        let bh = self.header_at(self.first);
        // also stops at the closing header once the ring is drained
        if !bh.is_released() {
            return None;
        }
        if bh.seqno != SEQNO_NONE {
            if self.seqno_locked.is_some_and(|locked| bh.seqno >= locked) {
                return None;
            }
            self.discard_seqno(bh.seqno);
        }

        self.records.remove(&self.first);
        self.first += bh.size as usize;
        if self.first != self.next && self.header_at(self.first).size == 0 {
            // wrap marker
            self.first = 0;
            return Some(true);
        }
        Some(false)
    }

    /// Finds room for a record of `size` bytes plus a closing header,
    /// reclaiming released records from `first` as needed.
    fn get_new_buffer(&mut self, size: usize) -> Option<usize> {
        let size_next = size + BUFFER_HEADER_LEN;
        if size_next > self.size_cache - self.size_used {
            return None;
        }

        if self.first == self.next && self.first != 0 {
            // empty ring
            self.first = 0;
            self.next = 0;
        }

        let end = self.size_cache;
        let mut ret = self.next;
        let mut found = false;

        if ret >= self.first {
            if end - ret >= size_next {
                found = true;
            } else {
                ret = 0;
            }
        }

        while !found && self.first - ret < size_next {
            if self.reclaim_first()? {
                if end - ret >= size_next {
                    found = true;
                } else {
                    ret = 0;
                }
            }
        }

        self.size_used += size;
        self.next = ret + size;
        let next = self.next;
        let data = self.data_mut();
        BufferHeader::clear(data, next);
        BufferHeader::new(size as u64).write(data, ret);
        Some(ret)
    }

    /// Makes room for `extra` bytes right at `next` without wrapping.
    fn extend_at_next(&mut self, extra: usize) -> bool {
        let needed = extra + BUFFER_HEADER_LEN;
        if extra > self.size_cache - self.size_used {
            return false;
        }
        loop {
            if self.next >= self.first {
                // nothing to reclaim between next and the end of the region
                return self.size_cache - self.next >= needed;
            }
            if self.first - self.next >= needed {
                return true;
            }
            if self.reclaim_first().is_none() {
                return false;
            }
        }
    }

    /// Drops every index entry up to and including `seqno`.
    fn discard_seqno(&mut self, seqno: i64) {
        let keep = self.index.split_off(&seqno.saturating_add(1));
        let discarded = std::mem::replace(&mut self.index, keep);
        let data = self.data_mut();
        for offset in discarded.into_values() {
            BufferHeader::set_seqno(data, offset, SEQNO_NONE);
        }
    }

    fn commit(&mut self, handle: BufferHandle, seqno: i64) -> Result<()> {
        if seqno < 0 {
            protocol_violation!("commit of buffer {} with invalid seqno {seqno}", handle.offset);
        }
        let bh = self.record(handle)?;
        if bh.is_released() {
            protocol_violation!("commit of released buffer {} as seqno {seqno}", handle.offset);
        }
        if bh.seqno != SEQNO_NONE {
            protocol_violation!(
                "buffer {} already committed as seqno {}",
                handle.offset,
                bh.seqno
            );
        }
        if let Some(offset) = self.index.get(&seqno) {
            protocol_violation!("seqno {seqno} reused, already held by buffer {offset}");
        }

        BufferHeader::set_seqno(self.data_mut(), handle.offset, seqno);
        self.index.insert(seqno, handle.offset);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn release(&mut self, handle: BufferHandle) -> Result<()> {
        let bh = self.record(handle)?;
        if bh.is_released() {
            protocol_violation!("double release of buffer {}", handle.offset);
        }
        BufferHeader::mark_released(self.data_mut(), handle.offset);
        self.size_used -= bh.size as usize;
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn realloc(&mut self, handle: BufferHandle, len: usize) -> Result<BufferHandle> {
        let bh = self.record(handle)?;
        if bh.is_released() {
            protocol_violation!("realloc of released buffer {}", handle.offset);
        }
        if bh.seqno != SEQNO_NONE {
            protocol_violation!(
                "realloc of buffer {} committed as seqno {}",
                handle.offset,
                bh.seqno
            );
        }
        let max = self.max_payload();
        if len > max {
            return Err(StoreError::TooLarge {
                requested: len,
                max,
            });
        }

        let old_size = bh.size as usize;
        let old_len = old_size - BUFFER_HEADER_LEN;
        if len <= old_len {
            return Ok(self.handle_at(handle.offset));
        }

        let extra = len - old_len;
        if handle.offset + old_size == self.next && self.extend_at_next(extra) {
            self.size_used += extra;
            self.next += extra;
            let (offset, next) = (handle.offset, self.next);
            let data = self.data_mut();
            BufferHeader::clear(data, next);
            BufferHeader::new((len + BUFFER_HEADER_LEN) as u64).write(data, offset);
            debug!(offset, len, "grew buffer in place");
            return Ok(self.handle_at(offset));
        }

        let moved = self.allocate(len)?;
        let from = handle.offset + BUFFER_HEADER_LEN;
        self.data_mut()
            .copy_within(from..from + old_len, moved.offset + BUFFER_HEADER_LEN);
        self.release(handle)?;
        debug!(from = handle.offset, to = moved.offset, len, "moved buffer");
        Ok(moved)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn payload(&self, handle: BufferHandle) -> Result<&[u8]> {
        let bh = self.record(handle)?;
        let start = handle.offset + BUFFER_HEADER_LEN;
        Ok(&self.data()[start..handle.offset + bh.size as usize])
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write(&mut self, handle: BufferHandle, payload: &[u8]) -> Result<()> {
        let bh = self.record(handle)?;
        if bh.is_released() {
            protocol_violation!("write to released buffer {}", handle.offset);
        }
        let capacity = bh.size as usize - BUFFER_HEADER_LEN;
        if payload.len() > capacity {
            return Err(StoreError::TooLarge {
                requested: payload.len(),
                max: capacity,
            });
        }
        let start = handle.offset + BUFFER_HEADER_LEN;
        self.data_mut()[start..start + payload.len()].copy_from_slice(payload);
        Ok(())
    }

    fn lock_seqno(&mut self, seqno: i64) -> Result<()> {
        if !self.index.contains_key(&seqno) {
            return Err(StoreError::UnknownSeqno { seqno });
        }
        self.seqno_locked = Some(seqno);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn repossess(&mut self, seqno: i64) -> Result<BufferHandle> {
        let offset = *self
            .index
            .get(&seqno)
            .ok_or(StoreError::UnknownSeqno { seqno })?;
        let bh = self.header_at(offset);
        if !bh.is_released() {
            return Err(StoreError::BufferInUse { seqno });
        }
        BufferHeader::clear_released(self.data_mut(), offset);
        self.size_used += bh.size as usize;
        Ok(self.handle_at(offset))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_range(&self, start: i64, max: usize) -> Vec<(i64, SharedBuffer)> {
        self.index
            .range(start..)
            .take(max)
            .enumerate()
            .take_while(|&(i, (&seqno, _))| i64::try_from(i).is_ok_and(|i| seqno == start + i))
            .map(|(_, (&seqno, &offset))| {
                let size = self.header_at(offset).size as usize;
                let payload = &self.data()[offset + BUFFER_HEADER_LEN..offset + size];
                (seqno, SharedBuffer::copy_from_slice(payload))
            })
            .collect()
    }

    fn oldest_unreleased_seqno(&self) -> Option<i64> {
        self.index
            .iter()
            .find(|(_, &offset)| !self.header_at(offset).is_released())
            .map(|(&seqno, _)| seqno)
    }

    /// Keeps only the highest contiguous run of seqnos so that the persisted
    /// range has no gaps.
    fn trim_index(&mut self) {
        let Some(&max) = self.index.keys().next_back() else {
            return;
        };
        let mut low = max;
        while low > 0 && self.index.contains_key(&(low - 1)) {
            low -= 1;
        }
        let keep = self.index.split_off(&low);
        let dropped = std::mem::replace(&mut self.index, keep);
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), low, max, "dropping seqnos below a gap");
        }
        let data = self.data_mut();
        for offset in dropped.into_values() {
            BufferHeader::set_seqno(data, offset, SEQNO_NONE);
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.trim_index();
        self.write_header(false);
        self.mmap.flush()?;
        self.file.sync_all()?;
        self.open = false;
        info!(
            path = %self.path.display(),
            first = self.first,
            next = self.next,
            seqnos = self.index.len(),
            "closed ring buffer"
        );
        Ok(())
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "failed to close ring buffer");
        }
    }
}

/// Persistent ring buffer of seqno-tagged records.
///
/// All operations take an internal lock and are safe to call from several
/// threads.
///
/// # Example
///
/// ```rust,no_run
/// use galena_storage::{RingBufferConfig, RingBufferStore};
///
/// let store = RingBufferStore::open(RingBufferConfig::new("/tmp/galena.cache", 1 << 20))?;
/// let handle = store.allocate(5)?;
/// store.write(handle, b"hello")?;
/// store.commit(handle, 0)?;
/// store.release(handle)?;
/// store.close()?;
/// # Ok::<(), galena_storage::StoreError>(())
/// ```
pub struct RingBufferStore {
    inner: Mutex<RingBuffer>,
    recovery: RecoveryOutcome,
}

impl RingBufferStore {
    /// Opens or creates the cache file and validates previous contents.
    ///
    /// Inconsistent contents are discarded, never reported as an error. See
    /// [`recovery`](Self::recovery) for what happened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] for a bad configuration and
    /// [`StoreError::Io`] if the file cannot be created or mapped.
    pub fn open(config: RingBufferConfig) -> Result<Self> {
        config.validate()?;
        let RingBufferConfig { path, size } = config;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let existed = file.metadata()?.len() > 0;
        file.set_len((DATA_OFFSET + size) as u64)?;

        // SAFETY: The file was opened read/write and sized above. The mapping is
        // owned by this store and every access goes through its lock.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut rb = RingBuffer {
            mmap,
            file,
            path,
            size_cache: size,
            first: 0,
            next: 0,
            size_used: 0,
            index: BTreeMap::new(),
            records: BTreeMap::new(),
            generation: 0,
            seqno_locked: None,
            open: false,
        };

        let recovery = if existed {
            match recovery::recover(&mut rb.mmap[..], size) {
                Ok(recovered) => {
                    rb.first = recovered.first;
                    rb.next = recovered.next;
                    rb.index = recovered.index;
                    for offset in recovered.records {
                        rb.track(offset);
                    }
                    let next = rb.next;
                    BufferHeader::clear(rb.data_mut(), next);
                    RecoveryOutcome::Recovered {
                        seqno_range: rb.seqno_range(),
                        buffers: recovered.buffers,
                        auto_released: recovered.auto_released,
                    }
                }
                Err(reason) => {
                    warn!(path = %rb.path.display(), %reason, "discarding cache contents");
                    rb.reset();
                    RecoveryOutcome::Discarded { reason }
                }
            }
        } else {
            rb.reset();
            RecoveryOutcome::Fresh
        };

        // from here on a crash leaves the dirty bit set
        rb.write_header(true);
        rb.mmap.flush_range(0, DATA_OFFSET)?;
        rb.open = true;

        info!(path = %rb.path.display(), size, ?recovery, "opened ring buffer");
        Ok(Self {
            inner: Mutex::new(rb),
            recovery,
        })
    }

    /// What happened to previous contents on open.
    #[must_use]
    pub fn recovery(&self) -> &RecoveryOutcome {
        &self.recovery
    }

    /// Cache file path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Size of the data region.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().size_cache
    }

    /// Reserves a record with room for `len` payload bytes.
    ///
    /// The record starts unordered ([`SEQNO_NONE`]) and in use.
    ///
    /// # Errors
    ///
    /// - [`StoreError::TooLarge`] if `len` can never fit: a record must stay
    ///   below half of the data region.
    /// - [`StoreError::OutOfSpace`] if unreleased records leave no room. The
    ///   caller must release records and retry.
    pub fn allocate(&self, len: usize) -> Result<BufferHandle> {
        self.inner.lock().allocate(len)
    }

    /// Assigns `seqno` to a record and adds it to the index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownBuffer`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics if `seqno` is negative or already indexed, or if the record is
    /// released or already committed.
    pub fn commit(&self, handle: BufferHandle, seqno: i64) -> Result<()> {
        self.inner.lock().commit(handle, seqno)
    }

    /// Marks a record released. Its space is reclaimed once allocation
    /// reaches it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownBuffer`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics on double release.
    pub fn release(&self, handle: BufferHandle) -> Result<()> {
        self.inner.lock().release(handle)
    }

    /// Copies `payload` into the record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TooLarge`] if the payload exceeds the record and
    /// [`StoreError::UnknownBuffer`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics if the record is already released.
    pub fn write(&self, handle: BufferHandle, payload: &[u8]) -> Result<()> {
        self.inner.lock().write(handle, payload)
    }

    /// Returns a copy of the record payload.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownBuffer`] for a stale handle.
    pub fn read(&self, handle: BufferHandle) -> Result<SharedBuffer> {
        let rb = self.inner.lock();
        rb.payload(handle).map(SharedBuffer::copy_from_slice)
    }

    /// Grows a record that has not been committed yet.
    ///
    /// A record that ends at the allocation point grows in place and keeps
    /// its handle. Otherwise the payload moves to a new record and the old
    /// one is released. Shrinking leaves the record as it is.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownBuffer`] for a stale handle.
    /// - [`StoreError::TooLarge`] or [`StoreError::OutOfSpace`] as for
    ///   [`allocate`](Self::allocate). The record itself is left as it was.
    ///
    /// # Panics
    ///
    /// Panics if the record is released or already committed.
    pub fn realloc(&self, handle: BufferHandle, len: usize) -> Result<BufferHandle> {
        self.inner.lock().realloc(handle, len)
    }

    /// Finds the record committed as `seqno`.
    #[must_use]
    pub fn lookup(&self, seqno: i64) -> Option<BufferHandle> {
        let rb = self.inner.lock();
        rb.index.get(&seqno).map(|&offset| rb.handle_at(offset))
    }

    /// Takes a released record back into use so it can be served again.
    ///
    /// The caller owns the returned handle and must release it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownSeqno`] if `seqno` is not cached and
    /// [`StoreError::BufferInUse`] if its record was never released.
    pub fn repossess(&self, seqno: i64) -> Result<BufferHandle> {
        self.inner.lock().repossess(seqno)
    }

    /// Copies up to `max` payloads of consecutive seqnos starting at `start`.
    ///
    /// Stops early at the first seqno missing from the cache, so the result
    /// is empty if `start` itself is not cached.
    #[must_use]
    pub fn read_range(&self, start: i64, max: usize) -> Vec<(i64, SharedBuffer)> {
        self.inner.lock().read_range(start, max)
    }

    /// Pins `seqno`: reclaim will not evict it or any later seqno until
    /// [`unlock_seqno`](Self::unlock_seqno). Moves an existing lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownSeqno`] if `seqno` is not cached.
    pub fn lock_seqno(&self, seqno: i64) -> Result<()> {
        self.inner.lock().lock_seqno(seqno)
    }

    /// Drops the seqno lock, if any.
    pub fn unlock_seqno(&self) {
        self.inner.lock().seqno_locked = None;
    }

    /// Currently locked seqno.
    #[must_use]
    pub fn locked_seqno(&self) -> Option<i64> {
        self.inner.lock().seqno_locked
    }

    /// Lowest and highest indexed seqno.
    #[must_use]
    pub fn seqno_range(&self) -> Option<(i64, i64)> {
        self.inner.lock().seqno_range()
    }

    /// Lowest indexed seqno whose record is still in use.
    ///
    /// Records below it can be reclaimed; an eviction policy uses this to
    /// decide whom to wait for.
    #[must_use]
    pub fn oldest_unreleased_seqno(&self) -> Option<i64> {
        self.inner.lock().oldest_unreleased_seqno()
    }

    /// Bytes not held by unreleased records.
    #[must_use]
    pub fn free_space(&self) -> usize {
        let rb = self.inner.lock();
        rb.size_cache - rb.size_used
    }

    /// Bytes held by unreleased records, headers included.
    #[must_use]
    pub fn used_space(&self) -> usize {
        self.inner.lock().size_used
    }

    /// Writes a clean header and flushes the file.
    ///
    /// Seqnos below the highest contiguous run are dropped from the index
    /// first so that the next open finds no gaps. Dropping the store without
    /// calling this does the same, logging any error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if flushing fails.
    pub fn close(self) -> Result<()> {
        self.inner.into_inner().close()
    }
}

impl std::fmt::Debug for RingBufferStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rb = self.inner.lock();
        f.debug_struct("RingBufferStore")
            .field("path", &rb.path)
            .field("size", &rb.size_cache)
            .field("first", &rb.first)
            .field("next", &rb.next)
            .field("used", &rb.size_used)
            .field("seqnos", &rb.index.len())
            .field("locked", &rb.seqno_locked)
            .field("recovery", &self.recovery)
            .finish()
    }
}

/// Opens a store at `path` with a data region of `size` bytes.
///
/// # Errors
///
/// See [`RingBufferStore::open`].
pub fn open_path(path: impl AsRef<Path>, size: usize) -> Result<RingBufferStore> {
    RingBufferStore::open(RingBufferConfig::new(path.as_ref(), size))
}
