//! An in-memory collection source.
//!
//! [MemoryIndex] keeps a categorized, optionally response-hierarchical index as a tree and a
//! flattened pre-order row table. It implements [CollectionSource] and [QueryEngine], so the CLI,
//! the benches and the test suite can drive cursors without an external engine. Mutations bump the
//! index stamp the same way a live engine would, which lets callers exercise index-change handling.
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::{fmt, fs::read_to_string, path::Path, sync::Arc};

use crate::{
    error::ViewNavError,
    idset::IdSet,
    properties::{
        CollectionEntry, ColumnValue, ColumnValues, FindFlag, FindFlags, KeyValue, NoteId,
        ReadMask, ReadMaskFlag,
    },
    position::Position,
    source::{
        CollectionSource, FindResult, IndexChange, IndexChanges, IndexStamp, ReadRequest,
        ReadResult,
    },
};

mod query;
mod tree;
mod walk;

pub use tree::{CategoryBuilder, IndexBuilder, IndexDefinition, IndexNode, MemoryDocument};

use tree::{flatten, Node, Row};
use walk::Walker;

type ReadHook = Box<dyn FnOnce(&MemoryIndex) + Send>;

struct IndexData {
    columns: Arc<Vec<String>>,
    key_columns: Vec<usize>,
    hierarchical: bool,
    roots: Vec<Node>,
    rows: Vec<Row>,
    stamp: IndexStamp,
    index_time: DateTime<Utc>,
    next_category: u32,
}

impl IndexData {
    /// Advance the index time, keeping it strictly increasing.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.index_time = if now > self.index_time {
            now
        } else {
            self.index_time + Duration::milliseconds(1)
        };
        self.index_time
    }

    fn structure_changed(&mut self) -> Result<(), ViewNavError> {
        self.stamp.structure += 1;
        self.tick();
        self.rows = flatten(&self.roots)?;
        Ok(())
    }

    fn content_changed(&mut self) -> Result<(), ViewNavError> {
        self.stamp.content += 1;
        self.rows = flatten(&self.roots)?;
        Ok(())
    }

    fn changes_since(&self, last_seen: Option<IndexStamp>) -> (IndexChanges, bool) {
        match last_seen {
            Some(seen) if seen != self.stamp => {
                // content-only updates leave every position valid
                let time_relative = seen.structure == self.stamp.structure;
                (IndexChange::Modified.into(), time_relative)
            }
            _ => (IndexChanges::empty(), false),
        }
    }

    fn key_column(&self, key_index: usize) -> Option<usize> {
        if self.key_columns.is_empty() {
            (key_index < self.columns.len()).then_some(key_index)
        } else {
            self.key_columns.get(key_index).copied()
        }
    }

    fn position_of(&self, note_id: NoteId) -> Option<Position> {
        self.rows
            .iter()
            .find(|r| r.note_id == note_id)
            .map(|r| r.position.clone())
    }

    fn contains(&self, note_id: NoteId) -> bool {
        self.rows.iter().any(|r| r.note_id == note_id)
    }

    fn entry_for(
        &self,
        index: usize,
        read_mask: ReadMask,
        single_column: Option<usize>,
        differential: Option<(DateTime<Utc>, &IdSet)>,
    ) -> Result<CollectionEntry, ViewNavError> {
        let row = &self.rows[index];
        let mut entry = CollectionEntry::default();
        if read_mask.contains(ReadMaskFlag::NoteId) {
            entry.note_id = Some(row.note_id);
        }
        if read_mask.contains(ReadMaskFlag::IndexPosition) {
            entry.position = Some(row.position.clone());
        }
        if read_mask.contains(ReadMaskFlag::IndexSiblings) {
            entry.sibling_count = Some(row.sibling_count);
        }
        if read_mask.contains(ReadMaskFlag::IndexChildren) {
            entry.child_count = Some(row.child_count);
        }
        if read_mask.contains(ReadMaskFlag::IndexDescendants) {
            entry.descendant_count = Some(row.descendant_count);
        }
        if read_mask.contains(ReadMaskFlag::IndexAnyUnread) {
            entry.any_unread = Some(row.any_unread);
        }
        if read_mask.contains(ReadMaskFlag::IndexUnread) {
            entry.unread = Some(row.is_unread());
        }
        if read_mask.contains(ReadMaskFlag::IndentLevels) {
            entry.indent_level = Some(row.indent);
        }

        let wants_columns = !read_mask.is_disjoint(ReadMaskFlag::summary());
        match &row.document {
            Some(doc) => {
                if let Some((since, cached)) = differential {
                    let untouched = doc.modified.map(|m| m <= since).unwrap_or(false);
                    if untouched
                        && !read_mask.is_disjoint(ReadMaskFlag::cacheable())
                        && cached.contains(row.note_id)?
                    {
                        entry.unchanged = true;
                        return Ok(entry);
                    }
                }
                if read_mask.contains(ReadMaskFlag::NoteUnid) {
                    entry.unid = doc.unid;
                }
                if read_mask.contains(ReadMaskFlag::NoteClass) {
                    entry.note_class = Some(doc.class);
                }
                if wants_columns {
                    entry.columns = Some(self.column_values(
                        doc.columns.clone(),
                        read_mask,
                        single_column,
                    ));
                }
            }
            None => {
                if wants_columns {
                    let title = row
                        .category_path
                        .as_deref()
                        .and_then(|p| p.rsplit('\\').next())
                        .unwrap_or_default();
                    entry.columns = Some(self.column_values(
                        vec![ColumnValue::Text(title.to_string())],
                        read_mask,
                        single_column,
                    ));
                }
            }
        }
        Ok(entry)
    }

    fn column_values(
        &self,
        mut values: Vec<ColumnValue>,
        read_mask: ReadMask,
        single_column: Option<usize>,
    ) -> ColumnValues {
        values.resize(self.columns.len(), ColumnValue::Empty);
        let mut columns = ColumnValues::new(self.columns.clone(), values);
        if let Some(index) = single_column {
            columns.retain_single(index);
        }
        if read_mask.contains(ReadMaskFlag::Summary) {
            columns
        } else {
            columns.without_names()
        }
    }
}

fn find_node_mut(nodes: &mut [Node], note_id: NoteId) -> Option<&mut Node> {
    for node in nodes.iter_mut() {
        if node.note_id == note_id {
            return Some(node);
        }
        if let Some(found) = find_node_mut(&mut node.children, note_id) {
            return Some(found);
        }
    }
    None
}

fn remove_node(nodes: &mut Vec<Node>, note_id: NoteId) -> bool {
    if let Some(idx) = nodes.iter().position(|n| n.note_id == note_id) {
        nodes.remove(idx);
        return true;
    }
    let removed = nodes
        .iter_mut()
        .any(|n| remove_node(&mut n.children, note_id));
    if removed {
        // a category disappears with its last row
        nodes.retain(|n| !n.is_category() || !n.children.is_empty());
    }
    removed
}

fn text_matches(value: &str, key: &str, flags: FindFlags) -> bool {
    let (value, key) = if flags.contains(FindFlag::CaseInsensitive) {
        (value.to_lowercase(), key.to_lowercase())
    } else {
        (value.to_string(), key.to_string())
    };
    if flags.contains(FindFlag::Partial) {
        value.starts_with(&key)
    } else {
        value == key
    }
}

fn in_range<T: PartialOrd + Copy>(values: &[T], lo: T, hi: T, overlap: bool) -> bool {
    let inside = |v: &T| *v >= lo && *v <= hi;
    if overlap {
        values.iter().any(inside)
    } else {
        !values.is_empty() && values.iter().all(inside)
    }
}

fn key_matches(value: &ColumnValue, key: &KeyValue, flags: FindFlags) -> bool {
    let overlap = flags.contains(FindFlag::RangeOverlap);
    match key {
        KeyValue::Text(k) => value.texts().iter().any(|v| text_matches(v, k, flags)),
        KeyValue::Number(n) => value.numbers().iter().any(|v| v == n),
        KeyValue::NumberRange(lo, hi) => in_range(&value.numbers(), *lo, *hi, overlap),
        KeyValue::Time(t) => value.times().iter().any(|v| v == t),
        KeyValue::TimeRange(lo, hi) => in_range(&value.times(), *lo, *hi, overlap),
    }
}

pub struct MemoryIndex {
    data: RwLock<IndexData>,
    on_next_read: Mutex<Option<ReadHook>>,
}

impl MemoryIndex {
    pub fn from_definition(definition: IndexDefinition) -> Result<MemoryIndex, ViewNavError> {
        let now = Utc::now();
        let mut next_category = 1;
        let roots: Vec<Node> = definition
            .nodes
            .into_iter()
            .map(|n| Node::from_definition(n, &mut next_category, now))
            .collect();
        let rows = flatten(&roots)?;
        let hierarchical = definition.hierarchical || rows.iter().any(|r| r.indent > 0);
        tracing::debug!(
            "built memory index: {} rows, {} columns",
            rows.len(),
            definition.columns.len()
        );
        Ok(MemoryIndex {
            data: RwLock::new(IndexData {
                columns: Arc::new(definition.columns),
                key_columns: definition.key_columns,
                hierarchical,
                roots,
                rows,
                stamp: IndexStamp::default(),
                index_time: now,
                next_category,
            }),
            on_next_read: Mutex::new(None),
        })
    }

    pub fn from_json(content: &str) -> Result<MemoryIndex, ViewNavError> {
        let definition: IndexDefinition = serde_json::from_str(content)?;
        MemoryIndex::from_definition(definition)
    }

    pub fn load(path: &Path) -> Result<MemoryIndex, ViewNavError> {
        tracing::debug!("loading memory index from {:?}", path);
        let content = read_to_string(path)?;
        MemoryIndex::from_json(&content)
    }

    /// Number of rows, categories included.
    pub fn len(&self) -> usize {
        self.data.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().rows.is_empty()
    }

    pub fn index_time(&self) -> DateTime<Utc> {
        self.data.read().index_time
    }

    /// Run `hook` right before the next [CollectionSource::read_entries] call, once.
    pub fn on_next_read<F>(&self, hook: F)
    where
        F: FnOnce(&MemoryIndex) + Send + 'static,
    {
        *self.on_next_read.lock() = Some(Box::new(hook));
    }

    /// Append `doc` below the category path, creating missing categories in sorted order. An empty
    /// path adds a top-level document.
    pub fn add_document(
        &self,
        category_path: &[&str],
        doc: MemoryDocument,
    ) -> Result<Position, ViewNavError> {
        let note_id = doc.note_id;
        if note_id.is_nil() || note_id.is_category() {
            return Err(ViewNavError::InvalidArgument(format!(
                "{note_id} is not a document note id"
            )));
        }
        let mut data = self.data.write();
        if data.contains(note_id) {
            return Err(ViewNavError::InvalidArgument(format!(
                "note {note_id} is already in the index"
            )));
        }
        let time = data.tick();
        let mut next_category = data.next_category;
        let mut level = &mut data.roots;
        for title in category_path {
            let existing = level
                .iter()
                .position(|n| n.title().map(|t| t.eq_ignore_ascii_case(title)) == Some(true));
            let idx = match existing {
                Some(idx) => idx,
                None => {
                    let at = level
                        .iter()
                        .position(|n| {
                            n.title()
                                .map(|t| t.to_lowercase() > title.to_lowercase())
                                .unwrap_or(false)
                        })
                        .unwrap_or(level.len());
                    level.insert(at, Node::category(title, next_category));
                    next_category += 1;
                    at
                }
            };
            level = &mut level[idx].children;
        }
        level.push(Node::from_document(doc, time));
        data.next_category = next_category;
        data.structure_changed()?;
        data.position_of(note_id)
            .ok_or_else(|| ViewNavError::NotFound(format!("note {note_id}")))
    }

    /// Add `doc` as the last response of document `parent`.
    pub fn add_response(
        &self,
        parent: NoteId,
        doc: MemoryDocument,
    ) -> Result<Position, ViewNavError> {
        let note_id = doc.note_id;
        let mut data = self.data.write();
        if data.contains(note_id) {
            return Err(ViewNavError::InvalidArgument(format!(
                "note {note_id} is already in the index"
            )));
        }
        let time = data.tick();
        let node = find_node_mut(&mut data.roots, parent)
            .filter(|n| !n.is_category())
            .ok_or_else(|| ViewNavError::NotFound(format!("parent document {parent}")))?;
        node.children.push(Node::from_document(doc, time));
        data.hierarchical = true;
        data.structure_changed()?;
        data.position_of(note_id)
            .ok_or_else(|| ViewNavError::NotFound(format!("note {note_id}")))
    }

    /// Remove a document (with its responses) or a whole category. Returns false when the note is
    /// not in the index.
    pub fn remove_note(&self, note_id: NoteId) -> Result<bool, ViewNavError> {
        let mut data = self.data.write();
        if !remove_node(&mut data.roots, note_id) {
            return Ok(false);
        }
        tracing::debug!("removed {} from memory index", note_id);
        data.structure_changed()?;
        Ok(true)
    }

    /// Remove the category at `path` (joined with `\`) and everything below it.
    pub fn remove_category(&self, path: &str) -> Result<bool, ViewNavError> {
        let note_id = {
            let data = self.data.read();
            data.rows
                .iter()
                .find(|r| {
                    r.category_path
                        .as_deref()
                        .map(|p| p.eq_ignore_ascii_case(path))
                        .unwrap_or(false)
                })
                .map(|r| r.note_id)
        };
        match note_id {
            Some(id) => self.remove_note(id),
            None => Ok(false),
        }
    }

    /// Replace a document's column values.
    pub fn update_document(
        &self,
        note_id: NoteId,
        columns: Vec<ColumnValue>,
    ) -> Result<(), ViewNavError> {
        let mut data = self.data.write();
        let time = data.tick();
        let doc = find_node_mut(&mut data.roots, note_id)
            .and_then(|n| n.document_mut())
            .ok_or_else(|| ViewNavError::NotFound(format!("document {note_id}")))?;
        doc.columns = columns;
        doc.modified = Some(time);
        data.content_changed()
    }

    pub fn set_unread(&self, note_id: NoteId, unread: bool) -> Result<(), ViewNavError> {
        let mut data = self.data.write();
        let doc = find_node_mut(&mut data.roots, note_id)
            .and_then(|n| n.document_mut())
            .ok_or_else(|| ViewNavError::NotFound(format!("document {note_id}")))?;
        doc.unread = unread;
        data.content_changed()
    }

    fn run_read_hook(&self) {
        let hook = self.on_next_read.lock().take();
        if let Some(hook) = hook {
            tracing::trace!("running pending read hook");
            hook(self);
        }
    }
}

impl fmt::Debug for MemoryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read();
        f.debug_struct("MemoryIndex")
            .field("rows", &data.rows.len())
            .field("columns", &data.columns)
            .field("stamp", &data.stamp)
            .field("hierarchical", &data.hierarchical)
            .finish()
    }
}

impl CollectionSource for MemoryIndex {
    fn read_entries(&self, request: &ReadRequest) -> Result<ReadResult, ViewNavError> {
        self.run_read_hook();
        let data = self.data.read();
        let (changes, time_relative) = data.changes_since(request.last_seen);
        let walker = Walker {
            rows: &data.rows,
            selected: request.restrict_to.as_ref(),
            expanded: request.expanded.as_ref(),
            min_level: request.start.min_level() as u16,
            max_level: request.start.max_level() as u16,
        };
        let bounds = (request.start.min_level(), request.start.max_level());
        let mut result = ReadResult {
            changes,
            time_relative,
            stamp: data.stamp,
            index_time: Some(data.index_time),
            ..Default::default()
        };

        let mut current = if request.absolute_skip {
            Position::root()
        } else {
            request.start.unbounded()
        };
        let mut current_row = walker.find_exact(&current);
        while result.skipped < request.skip_count {
            match walker.step(&current, &request.skip_navigation)? {
                Some(i) => {
                    current = data.rows[i].position.clone();
                    current_row = Some(i);
                    result.skipped += 1;
                }
                None => break,
            }
        }
        if result.skipped < request.skip_count {
            result.position = current.with_bounds(bounds.0, bounds.1)?;
            return Ok(result);
        }
        if request.max_entries == 0 {
            result.more = walker.step(&current, &request.return_navigation)?.is_some();
            result.position = current.with_bounds(bounds.0, bounds.1)?;
            return Ok(result);
        }

        let first = match current_row {
            Some(i) if request.skip_count > 0 => Some(i),
            Some(i) if walker.matches(i, &request.return_navigation)? => Some(i),
            _ => walker.step(&current, &request.return_navigation)?,
        };
        let differential = match (request.since, request.cached_ids.as_ref()) {
            (Some(since), Some(cached)) => Some((since, cached)),
            _ => None,
        };
        let mut next = first;
        while let Some(i) = next {
            result.entries.push(data.entry_for(
                i,
                request.read_mask,
                request.single_column,
                differential,
            )?);
            current = data.rows[i].position.clone();
            if result.entries.len() as u32 >= request.max_entries {
                break;
            }
            next = walker.step(&current, &request.return_navigation)?;
        }
        result.more = result.entries.len() as u32 >= request.max_entries
            && walker.step(&current, &request.return_navigation)?.is_some();
        result.position = current.with_bounds(bounds.0, bounds.1)?;
        tracing::trace!(
            "read {} entries from {} ({} skipped, more: {})",
            result.entries.len(),
            request.start,
            result.skipped,
            result.more
        );
        Ok(result)
    }

    fn find_by_key(
        &self,
        flags: FindFlags,
        read_mask: ReadMask,
        keys: &[KeyValue],
    ) -> Result<FindResult, ViewNavError> {
        if keys.is_empty() {
            return Err(ViewNavError::InvalidArgument(
                "a key lookup needs at least one key".to_string(),
            ));
        }
        let data = self.data.read();
        let mut matched: Vec<usize> = Vec::new();
        if flags.contains(FindFlag::CategoryOrLeaf) {
            if let KeyValue::Text(path) = &keys[0] {
                matched = data
                    .rows
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| {
                        r.category_path
                            .as_deref()
                            .map(|p| text_matches(p, path, flags))
                            .unwrap_or(false)
                    })
                    .map(|(i, _)| i)
                    .collect();
            }
        }
        if matched.is_empty() {
            let mut columns = Vec::with_capacity(keys.len());
            for k in 0..keys.len() {
                columns.push(data.key_column(k).ok_or_else(|| {
                    ViewNavError::InvalidArgument(format!(
                        "{} keys given but the index sorts on fewer columns",
                        keys.len()
                    ))
                })?);
            }
            matched = data
                .rows
                .iter()
                .enumerate()
                .filter(|(_, r)| {
                    r.document.as_ref().is_some_and(|doc| {
                        keys.iter().zip(&columns).all(|(key, col)| {
                            doc.columns
                                .get(*col)
                                .map(|v| key_matches(v, key, flags))
                                .unwrap_or(false)
                        })
                    })
                })
                .map(|(i, _)| i)
                .collect();
        }
        let count = matched.len() as u32;
        if flags.contains(FindFlag::FirstEqual) {
            matched.truncate(1);
        } else if flags.contains(FindFlag::LastEqual) {
            matched = matched.split_off(matched.len().saturating_sub(1));
        }
        let mut result = FindResult {
            position: matched.first().map(|i| data.rows[*i].position.clone()),
            count,
            stamp: data.stamp,
            ..Default::default()
        };
        if flags.contains(FindFlag::ReturnData) {
            for i in matched {
                result.entries.push(data.entry_for(i, read_mask, None, None)?);
            }
        }
        Ok(result)
    }

    fn locate_note_near(
        &self,
        hint: &Position,
        note_id: NoteId,
    ) -> Result<Option<Position>, ViewNavError> {
        let data = self.data.read();
        let hinted = data.position_of(note_id);
        if hinted.is_none() {
            tracing::trace!("note {} not found near {}", note_id, hint);
        }
        Ok(hinted)
    }

    fn all_ids(&self) -> Result<IdSet, ViewNavError> {
        Ok(self
            .data
            .read()
            .rows
            .iter()
            .filter(|r| !r.is_category())
            .map(|r| r.note_id)
            .collect())
    }

    fn column_names(&self) -> Vec<String> {
        self.data.read().columns.to_vec()
    }

    fn is_hierarchical(&self) -> bool {
        self.data.read().hierarchical
    }

    fn stamp(&self) -> IndexStamp {
        self.data.read().stamp
    }
}
