//! Mapped segment and its cross-process lock
//!
//! A segment is one shared mapping: a 64-byte control block followed by the
//! heap. The control block holds the zone lock as an atomic word, so every
//! thread and process that maps the same bytes contends on the same lock.
//!
//! ```text
//! ┌──────────────────────────────┬───────────────────────────────────────┐
//! │ Control (64)                 │ Heap (len - 64)                       │
//! │ lock │ holder │ magic │ ver  │ store header │ arena │ blocks ...     │
//! │ heap len │ reserved          │                                       │
//! └──────────────────────────────┴───────────────────────────────────────┘
//! ```
//!
//! # Thread / Process Safety
//!
//! - The lock is a spinlock: compare-and-swap, then `spin_loop` hints, then
//!   `yield_now` once contention persists.
//! - [`ZoneGuard`] releases it on drop, so `?` returns and unwinding panics
//!   both unlock.
//! - Heap bytes are only reachable through a guard.
//! - Each thread remembers which backing files it holds locked, so locking
//!   one again fails with `Reentrant` instead of spinning forever, even
//!   through a second mapping of the same file. Re-entry through another
//!   process cannot be seen and simply blocks.
//! - A guard stays on the thread that took the lock (`ZoneGuard` is not
//!   `Send`).
//!
//! Every segment is a shared mapping of a file. An anonymous segment maps an
//! unlinked file under `/dev/shm` (the temp dir when that is missing), so it
//! is shared with every process forked after it was created. Unrelated
//! processes share a zone by opening the same path.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::{MmapMut, MmapOptions};
use shmtree_core::{Error, Result, MAX_ZONE_SIZE, MIN_ZONE_SIZE};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::heap::Heap;
use crate::ordered::OrderedStore;

// ============================================================================
// Control block
// ============================================================================

/// Size of the control block in front of the heap
pub const CONTROL_SIZE: usize = 64;

/// Marks a segment whose heap has been formatted ("SHMT")
const MAGIC: u32 = 0x5348_4D54;

/// Bumped whenever the heap layout changes
const LAYOUT_VERSION: u32 = 1;

/// Offsets within the control block, accessed as `AtomicU32`
mod control {
    /// 0 = unlocked, 1 = locked
    pub const LOCK: usize = 0;
    /// Pid of the current holder, 0 when unlocked
    pub const HOLDER: usize = 4;
    pub const MAGIC: usize = 8;
    pub const VERSION: usize = 12;
    pub const HEAP_LEN: usize = 16;
}

/// Spins before falling back to `yield_now`
const SPIN_LIMIT: u32 = 128;

/// Preferred home of anonymous segment files
const SHM_DIR: &str = "/dev/shm";

/// Identity of a backing file, shared by every mapping of it
type FileKey = (u64, u64);

thread_local! {
    /// Backing files of the segments this thread has locked
    static HELD: RefCell<SmallVec<[FileKey; 4]>> = RefCell::new(SmallVec::new());
}

// ============================================================================
// Segment
// ============================================================================

/// One shared mapping holding a zone
pub struct Segment {
    name: String,
    base: NonNull<u8>,
    len: usize,
    key: FileKey,
    /// Keeps the mapping alive; all access goes through `base`
    _map: MmapMut,
    /// Pins the file identity in `key` for as long as the mapping lives
    _file: File,
}

// SAFETY: The mapping is shared memory owned by this value for its whole
// lifetime. Control words are only touched as atomics and heap bytes are only
// handed out through `ZoneGuard`, which exists only while the spinlock is held.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("len", &self.len)
            .finish()
    }
}

impl Segment {
    /// Map a fresh zero-filled segment with no name in the filesystem
    ///
    /// The backing file is unlinked from the start, so the zone lives as long
    /// as some process maps it and is shared across `fork`.
    pub fn anonymous(name: impl Into<String>, size: usize) -> Result<Self> {
        let name = name.into();
        check_size(size)?;
        let file = match tempfile::tempfile_in(SHM_DIR) {
            Ok(file) => file,
            Err(_) => tempfile::tempfile()?,
        };
        file.set_len(size as u64)?;

        // SAFETY: nobody else can open the unlinked file; the only other
        // mappings are inherited by forked children and go through the lock.
        let map = unsafe { MmapOptions::new().len(size).map_mut(&file)? };
        debug!(zone = %name, size, "mapped anonymous segment");
        Self::from_map(name, map, file)
    }

    /// Map `size` bytes of a file, creating or growing it as needed
    ///
    /// Every process that opens the same path shares the zone.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>, size: usize) -> Result<Self> {
        let name = name.into();
        check_size(size)?;
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() < size as u64 {
            file.set_len(size as u64)?;
        }

        // SAFETY: the file stays mapped for the lifetime of the segment and
        // every writer goes through the zone lock.
        let map = unsafe { MmapOptions::new().len(size).map_mut(&file)? };
        debug!(zone = %name, path = %path.display(), size, "mapped file segment");
        Self::from_map(name, map, file)
    }

    fn from_map(name: String, mut map: MmapMut, file: File) -> Result<Self> {
        // Moving `MmapMut` does not move the pages, so `base` outlives the move
        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| Error::corruption(format!("zone '{name}' mapped at null")))?;
        let key = file_key(&file, base.as_ptr() as usize)?;
        Ok(Segment {
            name,
            base,
            len: map.len(),
            key,
            _map: map,
            _file: file,
        })
    }

    /// Zone name used in errors and logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total mapped bytes, control block included
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty (never true for a valid segment)
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Heap bytes after the control block
    pub fn heap_len(&self) -> usize {
        self.len - CONTROL_SIZE
    }

    #[inline]
    fn word(&self, at: usize) -> &AtomicU32 {
        debug_assert!(at + 4 <= CONTROL_SIZE);
        // SAFETY: `at` is inside the control block, which is 4-aligned
        // because mappings are page-aligned.
        unsafe { &*(self.base.as_ptr().add(at) as *const AtomicU32) }
    }

    /// Format the heap unless an earlier attach already did
    ///
    /// Returns `true` when an existing zone was found and reused.
    pub fn initialize(&self) -> Result<bool> {
        let mut guard = self.lock()?;
        let heap_len = self.heap_len() as u32;

        if self.word(control::MAGIC).load(Ordering::Acquire) == MAGIC {
            let version = self.word(control::VERSION).load(Ordering::Relaxed);
            let stored_len = self.word(control::HEAP_LEN).load(Ordering::Relaxed);
            if version != LAYOUT_VERSION {
                warn!(zone = %self.name, version, "segment has unknown layout version");
                return Err(Error::corruption(format!(
                    "zone '{}' has layout version {version}, expected {LAYOUT_VERSION}",
                    self.name
                )));
            }
            if stored_len != heap_len {
                return Err(Error::Config(format!(
                    "zone '{}' was created with a {stored_len}-byte heap, attached with {heap_len}",
                    self.name
                )));
            }
            debug!(zone = %self.name, size = self.len, reused = true, "attached zone");
            return Ok(true);
        }

        guard.heap().format();
        self.word(control::VERSION).store(LAYOUT_VERSION, Ordering::Relaxed);
        self.word(control::HEAP_LEN).store(heap_len, Ordering::Relaxed);
        self.word(control::MAGIC).store(MAGIC, Ordering::Release);
        debug!(zone = %self.name, size = self.len, reused = false, "initialized zone");
        Ok(false)
    }

    /// Take the zone lock
    ///
    /// # Errors
    ///
    /// `Reentrant` if the calling thread already holds it, through this
    /// mapping or any other mapping of the same file.
    pub fn lock(&self) -> Result<ZoneGuard<'_>> {
        let key = self.key;
        let already = HELD.with(|held| held.borrow().contains(&key));
        if already {
            warn!(zone = %self.name, "zone re-entered while locked");
            return Err(Error::Reentrant {
                zone: self.name.clone(),
            });
        }

        self.spin_lock();
        self.word(control::HOLDER)
            .store(std::process::id(), Ordering::Relaxed);
        HELD.with(|held| held.borrow_mut().push(key));
        Ok(ZoneGuard {
            segment: self,
            _not_send: PhantomData,
        })
    }

    /// Pid of the process holding the lock, `None` when unlocked
    pub fn holder(&self) -> Option<u32> {
        match self.word(control::HOLDER).load(Ordering::Relaxed) {
            0 => None,
            pid => Some(pid),
        }
    }

    fn spin_lock(&self) {
        let lock = self.word(control::LOCK);
        let mut spins = 0u32;
        loop {
            match lock.compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => return,
                Err(_) if spins < SPIN_LIMIT => {
                    spins += 1;
                    std::hint::spin_loop();
                }
                Err(_) => std::thread::yield_now(),
            }
        }
    }

    fn spin_unlock(&self) {
        self.word(control::HOLDER).store(0, Ordering::Relaxed);
        self.word(control::LOCK).store(0, Ordering::Release);
    }
}

#[cfg(unix)]
fn file_key(file: &File, _base: usize) -> Result<FileKey> {
    use std::os::unix::fs::MetadataExt;
    let meta = file.metadata()?;
    Ok((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_key(_file: &File, base: usize) -> Result<FileKey> {
    Ok((0, base as u64))
}

fn check_size(size: usize) -> Result<()> {
    if !(MIN_ZONE_SIZE..=MAX_ZONE_SIZE).contains(&size) {
        return Err(Error::Config(format!(
            "segment size {size} outside {MIN_ZONE_SIZE}..={MAX_ZONE_SIZE}"
        )));
    }
    Ok(())
}

// ============================================================================
// Guard
// ============================================================================

/// Proof of holding a zone lock; unlocks on drop
///
/// Not `Send`: the lock is recorded as held by the thread that took it and
/// must be released there.
#[derive(Debug)]
pub struct ZoneGuard<'a> {
    segment: &'a Segment,
    _not_send: PhantomData<*const ()>,
}

impl ZoneGuard<'_> {
    /// The segment this guard locks
    pub fn segment(&self) -> &Segment {
        self.segment
    }

    /// Mutable view of the heap
    pub fn heap(&mut self) -> Heap<'_> {
        let seg = self.segment;
        // SAFETY: the heap lies inside the mapping, and the spinlock held by
        // this guard makes the `&mut self` borrow the only live view of it.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(seg.base.as_ptr().add(CONTROL_SIZE), seg.heap_len())
        };
        Heap::new(bytes)
    }

    /// The zone's ordered store
    pub fn store(&mut self) -> OrderedStore<'_> {
        OrderedStore::new(self.heap())
    }
}

impl Drop for ZoneGuard<'_> {
    fn drop(&mut self) {
        let key = self.segment.key;
        HELD.with(|held| held.borrow_mut().retain(|k| *k != key));
        self.segment.spin_unlock();
    }
}
