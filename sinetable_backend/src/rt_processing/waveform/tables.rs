//! Double-buffered wavetable shared by the control and render contexts.
//!
//! The store owns two equal-length tables, `active` and `shadow`, and an epoch
//! counter whose low bit is the rebuild flag. A rebuild copies `active` into
//! `shadow`, publishes an odd epoch, overwrites `active`, then publishes the
//! next even epoch. Readers pick the table from the epoch parity.
//!
//! Each cell packs one sample with its successor, `(s[i], s[i + 1 mod len])`,
//! into a single `AtomicCell<u64>`. A nearest lookup uses the low half and a
//! linear lookup uses both, so the two taps always come from one table.
//!
//! Memory-ordering contract:
//! - Cells are `AtomicCell<u64>`: loads acquire, stores release.
//! - The shadow copy is sequenced before the odd epoch (release), so a reader
//!   that acquires an odd epoch sees the complete old table in `shadow`.
//! - Writes into `active` are sequenced after the odd epoch. A reader that
//!   loads one of them and then reloads the epoch observes the epoch moved.
//! - The even epoch is released after the last write into `active`.
//! - Readers load the epoch, read their cell, reload the epoch, and retry on
//!   a mismatch up to `MAX_READ_RETRIES` times. They never block. When the
//!   retries run out the last read is returned. It is still one whole cell
//!   written by a single commit, so it never blends two tables.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam::atomic::AtomicCell;
use sinetable_core::{DEFAULT_TABLE_LENGTH, OscillatorError, OscillatorResult, sanitize_table_length};
use spin::{Mutex, MutexGuard};

/// Upper bound on epoch re-checks per lookup.
pub const MAX_READ_RETRIES: u32 = 4;

type Table = Box<[AtomicCell<u64>]>;

fn zeroed(length: usize) -> Table {
    (0..length).map(|_| AtomicCell::new(0)).collect()
}

#[inline]
fn pack(sample: f32, next: f32) -> u64 {
    (u64::from(next.to_bits()) << 32) | u64::from(sample.to_bits())
}

#[inline]
fn unpack(cell: u64) -> (f32, f32) {
    (f32::from_bits(cell as u32), f32::from_bits((cell >> 32) as u32))
}

/// Which of the two tables to inspect directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSlot {
    Active,
    Shadow,
}

/// Result of one render-side lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lookup {
    pub sample: f32,
    /// The sample came from the shadow table because a rebuild was running.
    pub from_shadow: bool,
    /// Epoch re-checks that failed before the lookup settled.
    pub retries: u32,
}

pub struct WavetableStore {
    active: Table,
    shadow: Table,
    epoch: AtomicU32,
    /// Rebuild scratch. Holding the lock is what makes a caller the writer.
    scratch: Mutex<Box<[f32]>>,
}

impl WavetableStore {
    /// Allocate both tables, zero-filled.
    pub fn create(length: usize) -> OscillatorResult<Self> {
        let length = i64::try_from(length).unwrap_or(i64::MAX);
        Ok(Self::allocate(sanitize_table_length(length)?))
    }

    /// Like [`create`](Self::create), but falls back to `DEFAULT_TABLE_LENGTH`
    /// and hands back the rejected request.
    pub fn create_or_default(length: usize) -> (Self, Option<OscillatorError>) {
        match Self::create(length) {
            Ok(store) => (store, None),
            Err(err) => (Self::allocate(DEFAULT_TABLE_LENGTH), Some(err)),
        }
    }

    fn allocate(length: usize) -> Self {
        Self {
            active: zeroed(length),
            shadow: zeroed(length),
            epoch: AtomicU32::new(0),
            scratch: Mutex::new(vec![0.0; length].into_boxed_slice()),
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn is_rebuilding(&self) -> bool {
        self.epoch() & 1 == 1
    }

    /// Start a rebuild bracket.
    ///
    /// Returns `None` if another rebuild is already running. On success the
    /// current table has been copied into `shadow` and readers are diverted
    /// there until the returned guard is dropped.
    pub fn begin_rebuild(&self) -> Option<Rebuild<'_>> {
        let scratch = self.scratch.try_lock()?;

        for (old, current) in self.shadow.iter().zip(self.active.iter()) {
            old.store(current.load());
        }
        self.epoch.fetch_add(1, Ordering::Release);

        Some(Rebuild { store: self, scratch })
    }

    fn end_rebuild(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
    }

    /// Authoritative sample at `index`, wrapped into the table.
    #[inline]
    pub fn read(&self, index: usize) -> f32 {
        self.lookup(index).sample
    }

    /// Nearest-sample lookup.
    #[inline]
    pub fn lookup(&self, index: usize) -> Lookup {
        let index = index % self.len();
        self.observe(|table| unpack(table[index].load()).0)
    }

    /// Linear blend of `index` and its successor, read as one cell.
    #[inline]
    pub fn lookup_linear(&self, index: usize, frac: f32) -> Lookup {
        let index = index % self.len();
        self.observe(|table| {
            let (a, b) = unpack(table[index].load());
            a + frac * (b - a)
        })
    }

    #[inline]
    fn observe<F: Fn(&[AtomicCell<u64>]) -> f32>(&self, read: F) -> Lookup {
        let mut epoch = self.epoch.load(Ordering::Acquire);
        let mut retries = 0;
        loop {
            let from_shadow = epoch & 1 == 1;
            let table = if from_shadow { &self.shadow } else { &self.active };
            let sample = read(table);

            let confirm = self.epoch.load(Ordering::Acquire);
            if confirm == epoch || retries == MAX_READ_RETRIES {
                return Lookup { sample, from_shadow, retries };
            }
            epoch = confirm;
            retries += 1;
        }
    }

    /// Raw read of one table, ignoring the rebuild flag. `index` wraps.
    pub fn read_slot(&self, slot: TableSlot, index: usize) -> f32 {
        let index = index % self.len();
        let cell = match slot {
            TableSlot::Active => self.active[index].load(),
            TableSlot::Shadow => self.shadow[index].load(),
        };
        unpack(cell).0
    }

    /// Copy of the table readers would currently use. Allocates; not for the
    /// render path.
    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.len()).map(|i| self.read(i)).collect()
    }

    /// Reallocate both tables at a new length. Exclusive access stands in for
    /// renderer quiescence.
    pub fn resize(&mut self, length: usize) -> OscillatorResult<()> {
        *self = Self::create(length)?;
        Ok(())
    }
}

/// An open rebuild bracket. Dropping it ends the rebuild.
pub struct Rebuild<'a> {
    store: &'a WavetableStore,
    scratch: MutexGuard<'a, Box<[f32]>>,
}

impl Rebuild<'_> {
    /// Private buffer the new waveform is built in, sized like the table.
    pub fn scratch(&mut self) -> &mut [f32] {
        &mut self.scratch[..]
    }

    /// Copy the scratch buffer into the active table.
    pub fn commit(&mut self) {
        let scratch = &self.scratch;
        let len = scratch.len();
        for (i, cell) in self.store.active.iter().enumerate() {
            cell.store(pack(scratch[i], scratch[(i + 1) % len]));
        }
    }

    /// Write a single active-table sample. `index` wraps.
    pub fn write(&mut self, index: usize, sample: f32) {
        let len = self.store.len();
        let index = index % len;
        let prev = (index + len - 1) % len;
        let active = &self.store.active;

        let (_, next) = unpack(active[index].load());
        active[index].store(pack(sample, next));
        let (before, _) = unpack(active[prev].load());
        active[prev].store(pack(before, sample));
    }
}

impl Drop for Rebuild<'_> {
    fn drop(&mut self) {
        self.store.end_rebuild();
    }
}
