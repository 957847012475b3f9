//! Paged, position-addressed traversal of a collection.
//!
//! A [CursorBuilder] collects the declarative parts of a traversal (direction, read mask,
//! selection, expansion, category restriction, start point, paging) and resolves the selection and
//! expansion specs into ID sets. [CursorBuilder::build] then hands out an [EntryCursor], a lazy,
//! single-pass iterator that fetches pages from the [crate::source::CollectionSource] on demand.
//!
//! ```rust
//! use viewnav_core::{
//!     cursor::CursorBuilder,
//!     memory::{IndexBuilder, MemoryDocument},
//!     navigate::Navigation,
//!     properties::ReadMaskFlag,
//! };
//!
//! # fn main() -> Result<(), viewnav_core::ViewNavError> {
//! let index = IndexBuilder::new(&["Subject"])
//!     .category("1", |c| {
//!         c.document(MemoryDocument::text(4, "first"))
//!             .document(MemoryDocument::text(8, "second"))
//!     })
//!     .category("2", |c| c.document(MemoryDocument::text(12, "third")))
//!     .build()?;
//!
//! let mut builder = CursorBuilder::new(&index)
//!     .direction(Navigation::NEXT_DOCUMENT)
//!     .read_mask(ReadMaskFlag::NoteId | ReadMaskFlag::IndexPosition)
//!     .restrict_to_category("1");
//! let positions = builder
//!     .build()?
//!     .map(|e| e.map(|e| e.position().map(|p| p.to_string()).unwrap_or_default()))
//!     .collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(positions, vec!["1.1", "1.2"]);
//! # Ok(())
//! # }
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    error::ViewNavError,
    position::Position,
    properties::{NoteId, NOTEID_CATEGORY, NOTEID_DELETED},
    source::FtFlags,
};

mod builder;
mod iterator;

pub use builder::CursorBuilder;
pub use iterator::EntryCursor;

/// Where a traversal begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StartPoint {
    /// The first entry in traversal scope
    First,
    /// The last entry in traversal scope
    Last,
    /// The entry of a document
    EntryId(NoteId),
    /// An explicit index position
    Position(Position),
}

impl StartPoint {
    /// Start at a document's entry. Category and deletion-flagged IDs are rejected.
    pub fn entry_id(note_id: NoteId) -> Result<StartPoint, ViewNavError> {
        if note_id.is_nil() {
            return Err(ViewNavError::InvalidArgument(
                "cannot start at the nil note id".to_string(),
            ));
        }
        if note_id.raw() & (NOTEID_CATEGORY | NOTEID_DELETED) != 0 {
            return Err(ViewNavError::InvalidArgument(format!(
                "{note_id} carries a category or deletion flag and is not a document id"
            )));
        }
        Ok(StartPoint::EntryId(note_id))
    }

    pub fn position(position: &str) -> Result<StartPoint, ViewNavError> {
        Ok(StartPoint::Position(position.parse()?))
    }
}

impl fmt::Display for StartPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPoint::First => f.write_str("first"),
            StartPoint::Last => f.write_str("last"),
            StartPoint::EntryId(id) => write!(f, "note {id}"),
            StartPoint::Position(pos) => write!(f, "position {pos}"),
        }
    }
}

/// A column addressed by programmatic name or by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnRef {
    Name(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CursorState {
    /// Nothing has been read yet
    Uninitialized,
    /// Start position known, no page buffered
    Ready,
    /// A fetched page still has entries to hand out
    Buffered,
    /// Traversal finished; never resumes
    Exhausted,
    /// Start category or start entry was not found
    NoData,
}

impl CursorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CursorState::Exhausted | CursorState::NoData)
    }
}

/// What the cursor does after the index changed under it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexChangeAction {
    /// Re-issue the read, relocating the category restriction if there is one
    #[default]
    Continue,
    /// End the traversal
    Stop,
}

/// Restrict a traversal to the hits of a full-text query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTextRestriction {
    pub query: String,
    /// Zero means no limit
    pub max_docs: u32,
    pub flags: FtFlags,
}
