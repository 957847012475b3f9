//! End-to-end traversals over an index loaded from disk.

mod common;

use std::{sync::Arc, thread};

use common::{init_logging, write_offices_fixture};
use tempfile::TempDir;
use viewnav_core::{
    cache::{CacheUsage, DifferentialCache},
    config::{ConfigProvider, CursorConfig, TomlConfigProvider},
    cursor::CursorBuilder,
    memory::MemoryIndex,
    navigate::Navigation,
    properties::{CollectionEntry, KeyValue, ReadMaskFlag},
    resolver::{KeyLookup, SelectionSpec, SpecItem},
    ViewNavError,
};

fn load_offices() -> (TempDir, MemoryIndex) {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let path = write_offices_fixture(&temp_dir);
    let index = MemoryIndex::load(&path).unwrap();
    (temp_dir, index)
}

fn cities(entries: &[CollectionEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| {
            e.column("city")
                .and_then(|v| v.as_text())
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

#[test]
fn walks_a_category_of_a_loaded_index() {
    let (_dir, index) = load_offices();
    let mut builder = CursorBuilder::new(&index)
        .direction(Navigation::NEXT_DOCUMENT)
        .read_mask(ReadMaskFlag::NoteId | ReadMaskFlag::Summary | ReadMaskFlag::IndexUnread)
        .restrict_to_category("East");
    let entries: Vec<CollectionEntry> = builder
        .build()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(cities(&entries), vec!["Albany", "Boston"]);
    assert!(entries[1].is_unread());
}

#[test]
fn key_selection_uses_the_sorted_column() {
    let (_dir, index) = load_offices();
    let mut builder = CursorBuilder::new(&index)
        .direction(Navigation::NEXT_DOCUMENT)
        .read_mask(ReadMaskFlag::NoteId | ReadMaskFlag::Summary)
        .select(SelectionSpec::additive().with(SpecItem::Key(KeyLookup::exact([
            KeyValue::Text("Denver".to_string()),
        ]))));
    let entries: Vec<CollectionEntry> = builder
        .build()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(cities(&entries), vec!["Denver"]);
}

#[test]
fn config_provider_feeds_the_builder() {
    let (dir, index) = load_offices();
    let provider = TomlConfigProvider::new(dir.path().join("viewnav.toml"));
    assert_eq!(provider.get_config().unwrap(), CursorConfig::default());

    let config = CursorConfig {
        page_size: 1,
        ..Default::default()
    };
    provider.set_config(&config).unwrap();
    let loaded = provider.get_config().unwrap();
    assert_eq!(loaded.page_size, 1);

    let mut builder = CursorBuilder::new(&index)
        .config(loaded)
        .direction(Navigation::NEXT_DOCUMENT);
    let mut cursor = builder.build().unwrap();
    assert_eq!(cursor.total().unwrap(), 3);
    assert_eq!(cursor.count(), 3);

    let invalid = CursorConfig {
        page_size: 0,
        ..Default::default()
    };
    assert!(matches!(
        provider.set_config(&invalid),
        Err(ViewNavError::InvalidArgument(_))
    ));
}

#[test]
fn concurrent_cursors_share_one_cache() {
    let (_dir, index) = load_offices();
    let cache = Arc::new(DifferentialCache::unbounded());
    let usage = Arc::new(CacheUsage::new());
    usage.enable();

    thread::scope(|scope| {
        for _ in 0..4 {
            let index = &index;
            let cache = cache.clone();
            let usage = usage.clone();
            scope.spawn(move || {
                for _ in 0..3 {
                    let mut builder = CursorBuilder::new(index)
                        .direction(Navigation::NEXT_DOCUMENT)
                        .read_mask(ReadMaskFlag::NoteId | ReadMaskFlag::Summary)
                        .cache(cache.clone())
                        .cache_usage(usage.clone());
                    let entries: Vec<CollectionEntry> = builder
                        .build()
                        .unwrap()
                        .collect::<Result<_, _>>()
                        .unwrap();
                    assert_eq!(cities(&entries), vec!["Albany", "Boston", "Denver"]);
                }
            });
        }
    });
    assert_eq!(cache.len(), 3);
    assert!(usage.hits() > 0);
}
