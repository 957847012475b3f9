//! Differential cache of per-note column data.
//!
//! A [DifferentialCache] outlives individual traversals: callers keep one per index and hand it to
//! every cursor they build, so rows that did not change since the cache's `diff_time` can skip their
//! column reads. The cache is only valid for one `(read_mask, single_column, diff_time)` key at a
//! time; a store under any other key clears everything first. Data read under different masks or
//! column restrictions holds different fields and must not be mixed.
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    num::NonZeroUsize,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use crate::{
    error::ViewNavError,
    idset::IdSet,
    properties::{CollectionEntry, ColumnValues, NoteClass, NoteId, ReadMask, Unid},
};

/// The cacheable subset of a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedFields {
    pub unid: Option<Unid>,
    pub note_class: Option<NoteClass>,
    pub columns: Option<ColumnValues>,
}

impl CachedFields {
    pub fn from_entry(entry: &CollectionEntry) -> CachedFields {
        CachedFields {
            unid: entry.unid,
            note_class: entry.note_class,
            columns: entry.columns.clone(),
        }
    }

    /// Fill the cacheable fields of `entry` and clear its `unchanged` marker.
    pub fn apply_to(&self, entry: &mut CollectionEntry) {
        entry.unid = self.unid;
        entry.note_class = self.note_class;
        entry.columns = self.columns.clone();
        entry.unchanged = false;
    }
}

struct CacheState {
    read_mask: Option<ReadMask>,
    single_column: Option<usize>,
    diff_time: Option<DateTime<Utc>>,
    entries: LruCache<NoteId, CachedFields>,
}

pub struct DifferentialCache {
    state: RwLock<CacheState>,
    max_size: Option<NonZeroUsize>,
}

impl DifferentialCache {
    /// Cache holding at most `max_size` notes.
    pub fn new(max_size: usize) -> Result<DifferentialCache, ViewNavError> {
        let capacity = NonZeroUsize::new(max_size).ok_or_else(|| {
            ViewNavError::InvalidArgument("cache size must be positive".to_string())
        })?;
        Ok(DifferentialCache {
            state: RwLock::new(CacheState {
                read_mask: None,
                single_column: None,
                diff_time: None,
                entries: LruCache::new(capacity),
            }),
            max_size: Some(capacity),
        })
    }

    pub fn unbounded() -> DifferentialCache {
        DifferentialCache {
            state: RwLock::new(CacheState {
                read_mask: None,
                single_column: None,
                diff_time: None,
                entries: LruCache::unbounded(),
            }),
            max_size: None,
        }
    }

    /// Build from an optional configured bound; `None` is unbounded.
    pub fn with_max_size(max_size: Option<usize>) -> Result<DifferentialCache, ViewNavError> {
        match max_size {
            Some(max) => DifferentialCache::new(max),
            None => Ok(DifferentialCache::unbounded()),
        }
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size.map(|m| m.get())
    }

    /// Cached fields for `note_id`, marking it most recently used.
    pub fn lookup(&self, note_id: NoteId) -> Option<CachedFields> {
        self.state.write().entries.get(&note_id).cloned()
    }

    /// Cached fields for `note_id` without touching recency.
    pub fn peek(&self, note_id: NoteId) -> Option<CachedFields> {
        self.state.read().entries.peek(&note_id).cloned()
    }

    pub fn contains(&self, note_id: NoteId) -> bool {
        self.state.read().entries.contains(&note_id)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read_mask(&self) -> Option<ReadMask> {
        self.state.read().read_mask
    }

    pub fn diff_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().diff_time
    }

    /// Column index the cached data was restricted to, if any.
    pub fn single_column(&self) -> Option<usize> {
        self.state.read().single_column
    }

    /// The `since` value a differential read under `read_mask` and `single_column` may use, if any.
    pub fn diff_time_for(
        &self,
        read_mask: ReadMask,
        single_column: Option<usize>,
    ) -> Option<DateTime<Utc>> {
        let state = self.state.read();
        if state.read_mask == Some(read_mask)
            && state.single_column == single_column
            && !state.entries.is_empty()
        {
            state.diff_time
        } else {
            None
        }
    }

    /// Snapshot of the note IDs currently held.
    pub fn note_ids(&self) -> IdSet {
        self.state
            .read()
            .entries
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    /// Store the cacheable fields of `entries` read under `(read_mask, single_column, diff_time)`.
    ///
    /// Rows without a note ID, category rows and rows still marked `unchanged` are skipped.
    pub fn store(
        &self,
        read_mask: ReadMask,
        single_column: Option<usize>,
        diff_time: Option<DateTime<Utc>>,
        entries: &[CollectionEntry],
    ) {
        let mut state = self.state.write();
        if state.read_mask != Some(read_mask)
            || state.single_column != single_column
            || state.diff_time != diff_time
        {
            if !state.entries.is_empty() {
                tracing::debug!(
                    "invalidating differential cache ({} notes): mask, column or diff time changed",
                    state.entries.len()
                );
            }
            state.entries.clear();
            state.read_mask = Some(read_mask);
            state.single_column = single_column;
            state.diff_time = diff_time;
        }
        for entry in entries {
            let Some(note_id) = entry.note_id else {
                continue;
            };
            if note_id.is_category() || entry.unchanged {
                continue;
            }
            state.entries.put(note_id, CachedFields::from_entry(entry));
        }
    }

    /// Drop every cached note and forget the mask and time.
    pub fn flush(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.read_mask = None;
        state.single_column = None;
        state.diff_time = None;
    }
}

impl Default for DifferentialCache {
    fn default() -> Self {
        DifferentialCache::unbounded()
    }
}

impl fmt::Debug for DifferentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("DifferentialCache")
            .field("len", &state.entries.len())
            .field("max_size", &self.max_size)
            .field("read_mask", &state.read_mask)
            .field("single_column", &state.single_column)
            .field("diff_time", &state.diff_time)
            .finish()
    }
}

/// Caller-owned counter of rows that were filled from a [DifferentialCache] instead of a fresh
/// read. Counting is off until [CacheUsage::enable] is called.
#[derive(Debug, Default)]
pub struct CacheUsage {
    enabled: AtomicBool,
    hits: AtomicU64,
}

impl CacheUsage {
    pub fn new() -> CacheUsage {
        CacheUsage::default()
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        if self.is_enabled() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{ColumnValue, ReadMaskFlag};
    use chrono::TimeZone;
    use std::sync::Arc;
    use test_log::test;

    fn entry(id: u32, subject: &str) -> CollectionEntry {
        CollectionEntry {
            note_id: Some(NoteId(id)),
            columns: Some(ColumnValues::new(
                Arc::new(vec!["Subject".to_string()]),
                vec![ColumnValue::Text(subject.to_string())],
            )),
            ..Default::default()
        }
    }

    fn t(secs: i64) -> Option<DateTime<Utc>> {
        Some(Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn subject(fields: &CachedFields) -> String {
        fields
            .columns
            .as_ref()
            .and_then(|c| c.get("Subject"))
            .and_then(|v| v.as_text())
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            DifferentialCache::new(0),
            Err(ViewNavError::InvalidArgument(_))
        ));
        assert!(DifferentialCache::with_max_size(None).unwrap().max_size().is_none());
    }

    #[test]
    fn store_then_lookup() {
        let cache = DifferentialCache::unbounded();
        let m1 = ReadMaskFlag::NoteId | ReadMaskFlag::Summary;
        cache.store(m1, None, t(10), &[entry(4, "alpha"), entry(8, "beta")]);
        assert_eq!(subject(&cache.lookup(NoteId(4)).unwrap()), "alpha");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.diff_time_for(m1, None), t(10));
    }

    #[test]
    fn mask_change_invalidates_everything() {
        let cache = DifferentialCache::unbounded();
        let m1 = ReadMaskFlag::NoteId | ReadMaskFlag::Summary;
        let m2 = ReadMaskFlag::NoteId | ReadMaskFlag::SummaryValues;
        cache.store(m1, None, t(10), &[entry(4, "alpha")]);
        cache.store(m2, None, t(10), &[entry(8, "beta")]);
        assert!(cache.lookup(NoteId(4)).is_none());
        assert!(cache.lookup(NoteId(8)).is_some());
        assert_eq!(cache.diff_time_for(m1, None), None);
    }

    #[test]
    fn single_column_data_is_kept_apart_from_full_rows() {
        let cache = DifferentialCache::unbounded();
        let m = ReadMaskFlag::NoteId | ReadMaskFlag::Summary;
        cache.store(m, Some(1), t(10), &[entry(4, "partial")]);
        assert_eq!(cache.single_column(), Some(1));
        assert_eq!(cache.diff_time_for(m, None), None);
        assert_eq!(cache.diff_time_for(m, Some(1)), t(10));

        cache.store(m, None, t(10), &[entry(8, "full")]);
        assert!(!cache.contains(NoteId(4)));
        assert_eq!(cache.diff_time_for(m, Some(1)), None);
        assert_eq!(cache.diff_time_for(m, None), t(10));
    }

    #[test]
    fn time_change_invalidates_everything() {
        let cache = DifferentialCache::unbounded();
        let m1 = ReadMaskFlag::NoteId | ReadMaskFlag::Summary;
        cache.store(m1, None, t(10), &[entry(4, "alpha")]);
        cache.store(m1, None, t(11), &[entry(8, "beta")]);
        assert!(cache.lookup(NoteId(4)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = DifferentialCache::new(3).unwrap();
        let m = ReadMaskFlag::NoteId | ReadMaskFlag::Summary;
        cache.store(m, None, t(1), &[entry(4, "a"), entry(8, "b"), entry(12, "c")]);
        // touch 4 so 8 becomes the oldest
        assert!(cache.lookup(NoteId(4)).is_some());
        cache.store(m, None, t(1), &[entry(16, "d")]);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(NoteId(8)));
        assert!(cache.contains(NoteId(4)));
        assert!(cache.contains(NoteId(16)));
    }

    #[test]
    fn categories_and_unchanged_rows_are_not_stored() {
        let cache = DifferentialCache::unbounded();
        let mut unchanged = entry(20, "stale");
        unchanged.unchanged = true;
        cache.store(
            ReadMaskFlag::NoteId.into(),
            None,
            t(1),
            &[entry(NoteId::category(1).0, "cat"), unchanged, entry(24, "fresh")],
        );
        assert_eq!(cache.len(), 1);
        let ids = cache.note_ids().iter_ascending().unwrap();
        assert_eq!(ids, vec![NoteId(24)]);
    }

    #[test]
    fn flush_forgets_mask() {
        let cache = DifferentialCache::unbounded();
        cache.store(ReadMaskFlag::NoteId.into(), None, t(1), &[entry(4, "a")]);
        cache.flush();
        assert!(cache.is_empty());
        assert!(cache.read_mask().is_none());
        assert!(cache.peek(NoteId(4)).is_none());
    }

    #[test]
    fn usage_counts_only_when_enabled() {
        let usage = CacheUsage::new();
        usage.record_hit();
        assert_eq!(usage.hits(), 0);
        usage.enable();
        usage.record_hit();
        usage.record_hit();
        assert_eq!(usage.hits(), 2);
        usage.disable();
        usage.record_hit();
        assert_eq!(usage.hits(), 2);
        usage.reset();
        assert_eq!(usage.hits(), 0);
    }

    #[test]
    fn concurrent_readers_share_the_cache() {
        let cache = Arc::new(DifferentialCache::unbounded());
        let m = ReadMaskFlag::NoteId | ReadMaskFlag::Summary;
        cache.store(m, None, t(1), &(1..=50).map(|i| entry(i * 4, "x")).collect::<Vec<_>>());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || (1..=50).filter(|i| cache.peek(NoteId(i * 4)).is_some()).count())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 50);
        }
    }
}
