//! Traversal scenarios over response hierarchies, filters and configuration

use super::helpers::*;
use crate::{
    config::{CursorConfig, SelectionPadding},
    cursor::{CursorBuilder, IndexChangeAction, StartPoint},
    memory::{IndexBuilder, MemoryDocument},
    navigate::Navigation,
    properties::{KeyValue, NoteId, ReadMaskFlag},
    resolver::{ExpansionSpec, KeyLookup, SelectionSpec, SpecItem},
};
use std::{cell::Cell, rc::Rc};
use test_log::test;

#[test]
fn top_level_skips_responses() {
    let index = create_thread_index();
    let mut builder = CursorBuilder::new(&index).direction(Navigation::NEXT_TOP_LEVEL);
    assert_eq!(collect_ids(&mut builder), vec![4, 8, 12]);
}

#[test]
fn sibling_steps_stay_under_one_parent() {
    let index = create_thread_index();
    let mut forward = CursorBuilder::new(&index)
        .direction(Navigation::NEXT_SIBLING)
        .start_at(StartPoint::position("1.1").unwrap());
    assert_eq!(collect_ids(&mut forward), vec![5, 7]);

    let mut backward = CursorBuilder::new(&index)
        .direction(Navigation::PREV_SIBLING)
        .start_at(StartPoint::position("3").unwrap());
    assert_eq!(collect_ids(&mut backward), vec![12, 8, 4]);
}

#[test]
fn child_and_parent_steps() {
    let index = create_thread_index();
    let mut down = CursorBuilder::new(&index)
        .direction(Navigation::CHILD)
        .start_at(StartPoint::entry_id(NoteId(4)).unwrap())
        .skip(1);
    assert_eq!(collect_ids(&mut down), vec![5, 6]);

    let mut up = CursorBuilder::new(&index)
        .direction(Navigation::PARENT)
        .start_at(StartPoint::position("1.1.1").unwrap())
        .skip(1);
    assert_eq!(collect_ids(&mut up), vec![5, 4]);
}

#[test]
fn unread_navigation_reaches_responses() {
    let index = create_thread_index();
    let mut builder = CursorBuilder::new(&index).direction(Navigation::NEXT_UNREAD);
    assert_eq!(collect_ids(&mut builder), vec![8, 13]);
    let mut backward = CursorBuilder::new(&index).direction(Navigation::PREV_UNREAD);
    assert_eq!(collect_ids(&mut backward), vec![13, 8]);
}

#[test]
fn collapsed_threads_hide_responses() {
    let index = create_thread_index();
    let mut builder =
        CursorBuilder::new(&index).expand(ExpansionSpec::collapse_all().note_ids([4]));
    assert_eq!(collect_ids(&mut builder), vec![4, 5, 7, 8, 12]);
    assert_eq!(builder.build().unwrap().total().unwrap(), 5);
}

#[test]
fn padded_selection_walks_only_real_documents() {
    let index = create_thread_index();
    let config = CursorConfig {
        selection_padding: SelectionPadding {
            enabled: true,
            threshold: 6,
        },
        ..Default::default()
    };
    let mut builder = CursorBuilder::new(&index)
        .config(config)
        .select(SelectionSpec::additive().note_ids([5, 13]));
    assert_eq!(collect_ids(&mut builder), vec![5, 13]);
    assert_eq!(builder.selected_ids().unwrap().len().unwrap(), 6);
}

#[test]
fn query_and_key_selections() {
    let index = IndexBuilder::new(&["Subject"])
        .document(MemoryDocument::text(4, "Budget"))
        .document(MemoryDocument::text(8, "Minutes"))
        .document(MemoryDocument::text(12, "Roadmap"))
        .build()
        .unwrap();
    let mut by_query = CursorBuilder::new(&index)
        .query_engine(&index)
        .select(SelectionSpec::additive().with(SpecItem::StructuredQuery(
            "subject = 'minutes'".to_string(),
        )));
    assert_eq!(collect_ids(&mut by_query), vec![8]);

    let lookup = KeyLookup::prefix([KeyValue::Text("ro".to_string())]).case_insensitive(true);
    let mut by_key = CursorBuilder::new(&index)
        .direction(Navigation::PREV_DOCUMENT)
        .select(
            SelectionSpec::additive()
                .with(SpecItem::Key(lookup))
                .note_ids([4]),
        );
    assert_eq!(collect_ids(&mut by_key), vec![12, 4]);
}

#[test]
fn content_changes_do_not_interrupt_traversal() {
    let index = create_flat_index(6);
    let interruptions = Rc::new(Cell::new(0));
    let counter = interruptions.clone();
    let mut builder = CursorBuilder::new(&index)
        .page_size(2)
        .read_mask(ReadMaskFlag::NoteId | ReadMaskFlag::IndexUnread)
        .on_index_changed(move |_| {
            counter.set(counter.get() + 1);
            IndexChangeAction::Stop
        });
    let mut cursor = builder.build().unwrap();
    let first = cursor.next_entry().unwrap();
    assert!(!first.is_unread());
    index.set_unread(NoteId(24), true).unwrap();
    let rest: Vec<_> = cursor.map(|e| e.unwrap()).collect();
    assert_eq!(rest.len(), 5);
    assert!(rest.last().unwrap().is_unread());
    assert_eq!(interruptions.get(), 0);
}

#[test]
fn page_size_from_toml_config() {
    let index = create_flat_index(5);
    let config = CursorConfig::from_toml_str("page_size = 2\nmax_index_change_retries = 1\n").unwrap();
    assert_eq!(config.page_size, 2);
    let mut builder = CursorBuilder::new(&index).config(config).limit(3);
    assert_eq!(collect_ids(&mut builder), vec![4, 8, 12]);
}
