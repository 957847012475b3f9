//! # viewnav-core
//!
//! Paginated, position-addressed traversal of categorized view indexes.
//!
//! A view index is a sorted, possibly categorized and response-hierarchical table of rows. Every
//! row has a hierarchical address, a [position::Position] tumbler such as `1.2.3`. viewnav-core
//! walks such an index one page at a time and keeps the traversal stable while the index changes
//! underneath it.
//!
//! ## Overview
//!
//! ### Key Features
//!
//! - **Tumbler positions**: parse, print, order and re-base hierarchical row addresses
//! - **Composable directions**: next/previous entry, document, category, unread, sibling,
//!   top-level, child and parent steps, combined with selection and expansion filters
//! - **Selection and expansion**: resolve note IDs, key lookups, structured queries, full-text
//!   queries and category names into (possibly inverted) ID sets
//! - **Differential reads**: a shared LRU cache lets the source leave out row data the caller
//!   already holds
//! - **Index-change recovery**: a moved category restriction is relocated and the read re-issued
//!
//! ## Architecture
//!
//! - **[`position`]**: the `Position` tumbler
//! - **[`properties`]**: note IDs, read masks, column values and the `CollectionEntry` row type
//! - **[`idset`]**: shared, disposable, optionally inverted note ID sets
//! - **[`navigate`]**: traversal directions and their composition with active filters
//! - **[`source`]**: the `CollectionSource` and `QueryEngine` traits a backing index implements
//! - **[`memory`]**: an in-memory `CollectionSource` used by the CLI, benches and tests
//! - **[`cache`]**: the differential cache and its usage counter
//! - **[`resolver`]**: selection and expansion specs resolved into ID sets
//! - **[`cursor`]**: the `CursorBuilder` and the `EntryCursor` iterator
//! - **[`config`]**: cursor defaults loaded from TOML
//!
//! ## Quick Start
//!
//! ```rust
//! use viewnav_core::{
//!     cursor::CursorBuilder,
//!     memory::{IndexBuilder, MemoryDocument},
//!     navigate::Navigation,
//!     properties::ReadMaskFlag,
//!     resolver::SelectionSpec,
//! };
//!
//! # fn main() -> Result<(), viewnav_core::ViewNavError> {
//! let index = IndexBuilder::new(&["Subject"])
//!     .document(MemoryDocument::text(4, "Budget"))
//!     .document(MemoryDocument::text(8, "Minutes"))
//!     .document(MemoryDocument::text(12, "Roadmap"))
//!     .build()?;
//!
//! let mut builder = CursorBuilder::new(&index)
//!     .direction(Navigation::NEXT_DOCUMENT)
//!     .read_mask(ReadMaskFlag::NoteId | ReadMaskFlag::Summary)
//!     .select(SelectionSpec::subtractive().note_ids([8]));
//!
//! let mut cursor = builder.build()?;
//! assert_eq!(cursor.total()?, 2);
//! for entry in cursor {
//!     let entry = entry?;
//!     println!("{}: {:?}", entry.note_id(), entry.column("subject"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]. Install any subscriber to see cursor initialization, page
//! fetches and index-change handling; `RUST_LOG=viewnav_core=debug` is a good starting point.
pub mod cache;
pub mod config;
pub mod cursor;
pub mod error;
pub mod idset;
pub mod memory;
pub mod navigate;
pub mod position;
pub mod properties;
pub mod resolver;
pub mod source;
#[cfg(test)]
mod tests;

pub use error::*;
