//! The contract between the traversal core and the engine that owns the index.
//!
//! Everything that touches stored data goes through [CollectionSource] (index reads, key lookups,
//! note location) or [QueryEngine] (structured and full-text queries). Implementations are treated
//! as blocking calls; the cursor never calls them concurrently for one traversal.
use chrono::{DateTime, Utc};
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    error::ViewNavError,
    idset::IdSet,
    navigate::Navigation,
    position::Position,
    properties::{CollectionEntry, FindFlags, KeyValue, NoteId, ReadMask},
};

/// Version marker of an index. Sources compare a caller's last observed stamp with their own to
/// decide whether to raise [IndexChange] flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexStamp {
    /// Bumped whenever rows are added, removed or moved
    pub structure: u64,
    /// Bumped whenever row data changes in place
    pub content: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(serialize_repr = "list")]
pub enum IndexChange {
    /// Rows were added, removed or updated since the caller's last read
    Modified,
    /// The index was rebuilt from scratch
    Rebuilt,
}

pub type IndexChanges = EnumSet<IndexChange>;

/// One call of the index-read primitive.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub start: Position,
    pub skip_navigation: Navigation,
    /// Skip from the root rather than from `start`
    pub absolute_skip: bool,
    pub skip_count: u32,
    pub return_navigation: Navigation,
    pub max_entries: u32,
    pub read_mask: ReadMask,
    /// Differential read: rows not modified after this time may come back `unchanged`
    pub since: Option<DateTime<Utc>>,
    /// Note IDs the caller can backfill from its own cache
    pub cached_ids: Option<IdSet>,
    /// Selection filter honored by [crate::navigate::Membership::Selected] steps
    pub restrict_to: Option<IdSet>,
    /// Expansion filter honored by [crate::navigate::Membership::Expanded] steps
    pub expanded: Option<IdSet>,
    pub single_column: Option<usize>,
    pub last_seen: Option<IndexStamp>,
}

impl ReadRequest {
    pub fn new(start: Position, navigation: Navigation) -> ReadRequest {
        ReadRequest {
            start,
            skip_navigation: navigation,
            absolute_skip: false,
            skip_count: 0,
            return_navigation: navigation,
            max_entries: 0,
            read_mask: ReadMask::empty(),
            since: None,
            cached_ids: None,
            restrict_to: None,
            expanded: None,
            single_column: None,
            last_seen: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    pub entries: Vec<CollectionEntry>,
    /// Position of the last returned row, or where skipping stopped when nothing was returned
    pub position: Position,
    pub skipped: u32,
    pub more: bool,
    pub changes: IndexChanges,
    /// The change did not invalidate the caller's position
    pub time_relative: bool,
    pub stamp: IndexStamp,
    /// Index time to use as the `since` value of later differential reads
    pub index_time: Option<DateTime<Utc>>,
}

impl ReadResult {
    pub fn index_changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindResult {
    pub entries: Vec<CollectionEntry>,
    pub position: Option<Position>,
    pub count: u32,
    pub stamp: IndexStamp,
}

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(serialize_repr = "list")]
pub enum FtFlag {
    /// Match word variants
    Stems,
    /// Match every term rather than any term
    AllTerms,
    /// Case-sensitive term matching
    CaseSensitive,
}

pub type FtFlags = EnumSet<FtFlag>;

#[derive(Debug, Clone, Default)]
pub struct FullTextResult {
    pub ids: IdSet,
    pub scores: BTreeMap<NoteId, u16>,
}

pub trait CollectionSource {
    /// The single primitive behind page fetches, skip-only scans and last-entry searches.
    fn read_entries(&self, request: &ReadRequest) -> Result<ReadResult, ViewNavError>;

    /// Key lookup against the sorted columns (or category paths with
    /// [crate::properties::FindFlag::CategoryOrLeaf]).
    fn find_by_key(
        &self,
        flags: FindFlags,
        read_mask: ReadMask,
        keys: &[KeyValue],
    ) -> Result<FindResult, ViewNavError>;

    /// Current position of `note_id`, searching from `hint`.
    fn locate_note_near(
        &self,
        hint: &Position,
        note_id: NoteId,
    ) -> Result<Option<Position>, ViewNavError>;

    /// Snapshot of every document ID in the index.
    fn all_ids(&self) -> Result<IdSet, ViewNavError>;

    fn column_names(&self) -> Vec<String>;

    /// True for indexes that nest responses below their parent documents.
    fn is_hierarchical(&self) -> bool {
        false
    }

    fn stamp(&self) -> IndexStamp;

    fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names()
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
    }
}

pub trait QueryEngine {
    fn structured_query(&self, query: &str) -> Result<IdSet, ViewNavError>;

    fn full_text_query(
        &self,
        query: &str,
        max_docs: u32,
        flags: FtFlags,
    ) -> Result<FullTextResult, ViewNavError>;
}
