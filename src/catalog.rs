//! Bread catalog: the bread types this bakery sells and their cook times.
//!
//! Fetched from the backend once at boot and mirrored to flash so the kiosk
//! can still come up when the backend is unreachable.
//!
//! Cache record layout (little-endian):
//!   - `[count]` - one byte
//!   - `count` × `[id: u16][cook_time_secs: u16]`

use heapless::Vec;

use crate::config::{BREAD_TYPES, MAX_BREAD_TYPES};
use crate::model::{BreadCounts, BreadRequirements, BreadTypeId};

/// Bytes per serialized catalog entry.
const ENTRY_SIZE: usize = 4;

/// Largest serialized catalog.
pub const MAX_RECORD_SIZE: usize = 1 + MAX_BREAD_TYPES * ENTRY_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BreadCatalogEntry {
    pub id: BreadTypeId,
    pub cook_time_secs: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BreadCatalog {
    entries: Vec<BreadCatalogEntry, MAX_BREAD_TYPES>,
}

impl BreadCatalog {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append an entry. Entries past capacity are dropped, duplicates
    /// replace the earlier cook time.
    pub fn push(&mut self, entry: BreadCatalogEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.id == entry.id) {
            existing.cook_time_secs = entry.cook_time_secs;
            return;
        }
        if self.entries.push(entry).is_err() {
            warn!("Catalog full - dropping bread type {}", entry.id);
        }
    }

    pub fn entries(&self) -> &[BreadCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display slot of a bread type, if it is one of the first
    /// [`BREAD_TYPES`] entries.
    pub fn slot_of(&self, id: BreadTypeId) -> Option<usize> {
        self.entries
            .iter()
            .take(BREAD_TYPES)
            .position(|e| e.id == id)
    }

    /// Translate per-slot counts into the backend's type → count map.
    /// Every known type appears, zero counts included.
    pub fn requirements_for(&self, counts: &BreadCounts) -> BreadRequirements {
        let mut req = BreadRequirements::new();
        for (slot, entry) in self.entries.iter().enumerate() {
            let count = counts.get(slot).copied().unwrap_or(0);
            let _ = req.insert(entry.id, count);
        }
        req
    }

    /// Project a type → count map onto display slots. Types without a slot
    /// are dropped; counts saturate at one digit.
    pub fn slot_counts(&self, req: &BreadRequirements) -> BreadCounts {
        let mut counts = [0u8; BREAD_TYPES];
        for (id, &count) in req.iter() {
            if let Some(slot) = self.slot_of(*id) {
                counts[slot] = count.min(9);
            }
        }
        counts
    }

    /// Serialize for flash storage. Returns the number of bytes written,
    /// or 0 if `buf` is too small.
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        let total = 1 + self.entries.len() * ENTRY_SIZE;
        if buf.len() < total {
            return 0;
        }

        buf[0] = self.entries.len() as u8;
        for (i, entry) in self.entries.iter().enumerate() {
            let at = 1 + i * ENTRY_SIZE;
            buf[at..at + 2].copy_from_slice(&entry.id.to_le_bytes());
            buf[at + 2..at + 4].copy_from_slice(&entry.cook_time_secs.to_le_bytes());
        }
        total
    }

    /// Deserialize a cache record. Truncated trailing entries are dropped;
    /// an empty or headerless record yields `None`.
    pub fn deserialize(data: &[u8]) -> Option<Self> {
        let (&count, rest) = data.split_first()?;
        let mut catalog = Self::new();

        for chunk in rest.chunks_exact(ENTRY_SIZE).take(count as usize) {
            catalog.push(BreadCatalogEntry {
                id: u16::from_le_bytes([chunk[0], chunk[1]]),
                cook_time_secs: u16::from_le_bytes([chunk[2], chunk[3]]),
            });
        }

        if catalog.is_empty() {
            None
        } else {
            Some(catalog)
        }
    }
}

/// Persistent mirror of the catalog (flash on target).
#[allow(async_fn_in_trait)]
pub trait CatalogCache {
    async fn load(&mut self) -> Option<BreadCatalog>;
    async fn save(&mut self, catalog: &BreadCatalog);
}
