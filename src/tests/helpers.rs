//! Shared fixtures for cursor scenario tests

use crate::{
    cursor::CursorBuilder,
    memory::{IndexBuilder, MemoryDocument, MemoryIndex},
    source::CollectionSource,
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A discussion index: top-level documents with nested responses.
///
/// ```text
/// 1      4  Kickoff
/// 1.1    5    re: Kickoff
/// 1.1.1  6      re: re: Kickoff
/// 1.2    7    Agenda
/// 2      8  Budget (unread)
/// 3      12 Roadmap
/// 3.1    13   re: Roadmap (unread)
/// ```
pub fn create_thread_index() -> MemoryIndex {
    init_logging();
    IndexBuilder::new(&["Subject"])
        .document(
            MemoryDocument::text(4, "Kickoff")
                .with_response(
                    MemoryDocument::text(5, "re: Kickoff")
                        .with_response(MemoryDocument::text(6, "re: re: Kickoff")),
                )
                .with_response(MemoryDocument::text(7, "Agenda")),
        )
        .document(MemoryDocument::text(8, "Budget").unread(true))
        .document(
            MemoryDocument::text(12, "Roadmap")
                .with_response(MemoryDocument::text(13, "re: Roadmap").unread(true)),
        )
        .build()
        .unwrap()
}

/// A flat index of `count` documents, note IDs `4, 8, 12, ...`.
pub fn create_flat_index(count: u32) -> MemoryIndex {
    init_logging();
    let mut builder = IndexBuilder::new(&["Subject"]);
    for n in 1..=count {
        builder = builder.document(MemoryDocument::text(n * 4, &format!("doc {n}")));
    }
    builder.build().unwrap()
}

/// Drain a fresh cursor from `builder` into raw note IDs.
pub fn collect_ids<S: CollectionSource + ?Sized>(builder: &mut CursorBuilder<'_, S>) -> Vec<u32> {
    builder
        .build()
        .unwrap()
        .map(|entry| entry.unwrap().note_id().0)
        .collect()
}
