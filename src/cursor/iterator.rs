use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use crate::{
    cache::DifferentialCache,
    error::ViewNavError,
    idset::IdSet,
    navigate::Navigation,
    position::{Position, MAX_LEVEL},
    properties::{CollectionEntry, FindFlag, KeyValue, NoteId, ReadMask, ReadMaskFlag},
    source::{CollectionSource, IndexStamp, ReadRequest, ReadResult},
};

use super::{builder::CursorBuilder, ColumnRef, CursorState, IndexChangeAction, StartPoint};

/// A single pass over a collection.
///
/// Entries are fetched a page at a time and handed out in traversal order. Once the cursor reports
/// no further entries it stays exhausted.
pub struct EntryCursor<'b, 'a, S: CollectionSource + ?Sized> {
    builder: &'b mut CursorBuilder<'a, S>,
    state: CursorState,
    navigation: Navigation,
    read_mask: ReadMask,
    request_mask: ReadMask,
    single_column: Option<usize>,
    page_size: u32,
    selected: Option<IdSet>,
    expanded: Option<IdSet>,
    scores: Option<Arc<BTreeMap<NoteId, u16>>>,
    /// Start of the traversal before the caller's skip, used for totals
    base_start: Position,
    base_skip: u32,
    position: Position,
    first_skip: u32,
    fetched: bool,
    more: bool,
    remaining: Option<u32>,
    buffer: VecDeque<CollectionEntry>,
    category: Option<Position>,
    last_seen: Option<IndexStamp>,
    total: Option<u32>,
}

impl<'b, 'a, S: CollectionSource + ?Sized> EntryCursor<'b, 'a, S> {
    pub(crate) fn new(builder: &'b mut CursorBuilder<'a, S>) -> Result<Self, ViewNavError> {
        let (selected, expanded, scores) = match &builder.resolved {
            Some(r) => (r.selected.clone(), r.expanded.clone(), r.scores.clone()),
            None => (None, None, None),
        };
        let navigation = builder
            .direction
            .compose(selected.is_some(), expanded.is_some())?;
        let page_size = builder.page_size.unwrap_or(builder.config.page_size);
        if page_size == 0 {
            return Err(ViewNavError::InvalidArgument(
                "page size must be positive".to_string(),
            ));
        }
        let single_column = match &builder.single_column {
            None => None,
            Some(ColumnRef::Name(name)) => Some(
                builder
                    .source
                    .column_index(name)
                    .ok_or_else(|| ViewNavError::NotFound(format!("column '{name}'")))?,
            ),
            Some(ColumnRef::Index(index)) => {
                let count = builder.source.column_names().len();
                if *index >= count {
                    return Err(ViewNavError::InvalidArgument(format!(
                        "column index {index} out of range for {count} columns"
                    )));
                }
                Some(*index)
            }
        };
        let read_mask = builder
            .read_mask
            .unwrap_or(builder.config.default_read_mask);
        let request_mask = read_mask | ReadMaskFlag::NoteId | ReadMaskFlag::IndexPosition;
        let remaining = builder.limit;
        tracing::debug!(
            "building cursor: {} (code {}), mask {:?}, page size {}",
            navigation,
            navigation.code(),
            read_mask,
            page_size
        );
        Ok(EntryCursor {
            builder,
            state: CursorState::Uninitialized,
            navigation,
            read_mask,
            request_mask,
            single_column,
            page_size,
            selected,
            expanded,
            scores,
            base_start: Position::root(),
            base_skip: 0,
            position: Position::root(),
            first_skip: 0,
            fetched: false,
            more: true,
            remaining,
            buffer: VecDeque::new(),
            category: None,
            last_seen: None,
            total: None,
        })
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// The composed navigation this cursor walks with.
    pub fn navigation(&self) -> Navigation {
        self.navigation
    }

    /// Position the traversal has read up to.
    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn has_next(&mut self) -> Result<bool, ViewNavError> {
        loop {
            match self.state {
                CursorState::Uninitialized => self.initialize()?,
                CursorState::Exhausted | CursorState::NoData => return Ok(false),
                CursorState::Ready | CursorState::Buffered => {
                    if !self.buffer.is_empty() {
                        return Ok(true);
                    }
                    self.state = CursorState::Ready;
                    self.fetch_page()?;
                }
            }
        }
    }

    pub fn next_entry(&mut self) -> Result<CollectionEntry, ViewNavError> {
        if !self.has_next()? {
            return Err(ViewNavError::NoSuchElement);
        }
        let entry = self.buffer.pop_front().ok_or(ViewNavError::NoSuchElement)?;
        if self.buffer.is_empty() {
            self.state = CursorState::Ready;
        }
        Ok(entry)
    }

    /// Number of entries in traversal scope, ignoring skip and limit. Costs one extra full scan,
    /// computed once.
    pub fn total(&mut self) -> Result<u32, ViewNavError> {
        if self.state == CursorState::Uninitialized {
            self.initialize()?;
        }
        if let Some(total) = self.total {
            return Ok(total);
        }
        let total = if self.state == CursorState::NoData {
            0
        } else {
            let request = ReadRequest {
                skip_count: u32::MAX,
                max_entries: 0,
                ..self.request(self.base_start.clone(), self.navigation)
            };
            let result = self.builder.source.read_entries(&request)?;
            result.skipped + u32::from(self.base_skip == 0)
        };
        tracing::debug!("total of {} entries from {}", total, self.base_start);
        self.total = Some(total);
        Ok(total)
    }

    fn request(&self, start: Position, navigation: Navigation) -> ReadRequest {
        ReadRequest {
            restrict_to: self.selected.clone(),
            expanded: self.expanded.clone(),
            single_column: self.single_column,
            ..ReadRequest::new(start, navigation)
        }
    }

    fn exhaust(&mut self) {
        if !self.state.is_terminal() {
            tracing::trace!("cursor exhausted at {}", self.position);
        }
        self.state = CursorState::Exhausted;
    }

    fn no_data(&mut self, why: &str) {
        tracing::debug!("no data: {}", why);
        self.buffer.clear();
        self.state = CursorState::NoData;
    }

    fn bounded(&self, position: &Position) -> Result<Position, ViewNavError> {
        match &self.category {
            Some(category) => {
                let min_level = u8::try_from(category.level() + 1)
                    .ok()
                    .filter(|l| *l <= MAX_LEVEL)
                    .ok_or_else(|| {
                        ViewNavError::InvalidArgument(format!(
                            "category at {category} has no room for children"
                        ))
                    })?;
                position.with_bounds(min_level, MAX_LEVEL)
            }
            None => Ok(position.unbounded()),
        }
    }

    /// Find the category's entry. `None` when it is gone.
    fn locate_category(&mut self, path: &str) -> Result<Option<Position>, ViewNavError> {
        let found = self.builder.source.find_by_key(
            FindFlag::Equal | FindFlag::CategoryOrLeaf | FindFlag::ReturnData,
            self.request_mask,
            &[KeyValue::Text(path.to_string())],
        )?;
        if self.last_seen.is_none() {
            self.last_seen = Some(found.stamp);
        }
        let Some(entry) = found.entries.into_iter().next().filter(|e| e.is_category()) else {
            return Ok(None);
        };
        let position = entry.position.clone().or(found.position);
        if let Some(callback) = self.builder.on_category_entry.as_mut() {
            let mut visible = entry;
            visible.retain(self.read_mask);
            callback(&visible);
        }
        Ok(position.map(|p| p.unbounded()))
    }

    /// Skip-only read from `scope` to the first (or last) entry the navigation can reach.
    fn locate_edge(&self, scope: &Position, last: bool) -> Result<Option<Position>, ViewNavError> {
        let forward = if self.navigation.is_forward() {
            self.navigation
        } else {
            self.navigation.reversed()
        };
        let request = ReadRequest {
            skip_count: if last { u32::MAX } else { 1 },
            max_entries: 0,
            ..self.request(scope.clone(), forward)
        };
        let result = self.builder.source.read_entries(&request)?;
        Ok((result.skipped > 0).then_some(result.position))
    }

    fn initialize(&mut self) -> Result<(), ViewNavError> {
        let scope = match self.builder.category.clone() {
            Some(path) => match self.locate_category(&path)? {
                Some(position) => {
                    tracing::debug!("category '{}' located at {}", path, position);
                    self.category = Some(position.clone());
                    self.bounded(&position)?
                }
                None => {
                    self.no_data(&format!("category '{path}' not found"));
                    return Ok(());
                }
            },
            None => {
                self.last_seen = Some(self.builder.source.stamp());
                Position::root()
            }
        };
        let start = self.builder.start.clone().unwrap_or(if self.navigation.is_forward() {
            StartPoint::First
        } else {
            StartPoint::Last
        });
        let user_skip = self.builder.skip;
        let (base_start, base_skip) = match &start {
            StartPoint::First if self.navigation.is_forward() => (scope.clone(), 1),
            StartPoint::First | StartPoint::Last => {
                match self.locate_edge(&scope, matches!(start, StartPoint::Last))? {
                    Some(edge) => (self.bounded(&edge)?, 0),
                    None => {
                        self.no_data("nothing in traversal scope");
                        return Ok(());
                    }
                }
            }
            StartPoint::EntryId(note_id) => {
                match self.builder.source.locate_note_near(&scope, *note_id)? {
                    Some(found) if self.in_scope(&found) => (self.bounded(&found)?, 0),
                    _ => {
                        self.no_data(&format!("start note {note_id} not in traversal scope"));
                        return Ok(());
                    }
                }
            }
            StartPoint::Position(position) => {
                if !self.in_scope(position) {
                    self.no_data(&format!("start {position} is outside the category"));
                    return Ok(());
                }
                (self.bounded(position)?, 0)
            }
        };
        self.base_start = base_start.clone();
        self.base_skip = base_skip;
        self.position = base_start;
        self.first_skip = base_skip.saturating_add(user_skip);
        self.state = CursorState::Ready;
        tracing::debug!(
            "cursor ready: start {} ({}), initial skip {}",
            self.position,
            start,
            self.first_skip
        );
        if self.builder.on_total.is_some() {
            let total = self.total()?;
            if let Some(callback) = self.builder.on_total.as_mut() {
                callback(total);
            }
        }
        Ok(())
    }

    fn in_scope(&self, position: &Position) -> bool {
        match &self.category {
            Some(category) => position.is_descendant_of(category),
            None => true,
        }
    }

    /// Read once, handling index changes. `None` means the traversal has to end.
    fn read_with_recovery(
        &mut self,
        mut request: ReadRequest,
    ) -> Result<Option<(ReadRequest, ReadResult)>, ViewNavError> {
        let mut retries = 0;
        loop {
            request.last_seen = self.last_seen;
            let result = self.builder.source.read_entries(&request)?;
            if !result.index_changed() || result.time_relative {
                self.last_seen = Some(result.stamp);
                return Ok(Some((request, result)));
            }
            let action = match self.builder.on_index_changed.as_mut() {
                Some(callback) => callback(result.changes),
                None => IndexChangeAction::default(),
            };
            self.last_seen = Some(result.stamp);
            if action == IndexChangeAction::Stop {
                tracing::info!("index changed, traversal stopped by callback");
                return Ok(None);
            }
            if retries >= self.builder.config.max_index_change_retries {
                if let (Some(old), Some(path)) =
                    (self.category.clone(), self.builder.category.clone())
                {
                    if self.locate_category(&path)? != Some(old) {
                        tracing::warn!(
                            "index kept changing after {} retries and category '{}' moved, ending traversal",
                            retries,
                            path
                        );
                        return Ok(None);
                    }
                }
                tracing::warn!(
                    "index kept changing after {} retries, using the latest read",
                    retries
                );
                return Ok(Some((request, result)));
            }
            retries += 1;
            if let (Some(old), Some(path)) = (self.category.clone(), self.builder.category.clone())
            {
                match self.locate_category(&path)? {
                    None => {
                        tracing::debug!("category '{}' disappeared during traversal", path);
                        return Ok(None);
                    }
                    Some(moved) if moved != old => {
                        tracing::debug!("category '{}' moved from {} to {}", path, old, moved);
                        let transposed = request.start.transpose(&old, &moved).ok_or_else(|| {
                            ViewNavError::IndexChanged(format!(
                                "{} is not inside category '{path}'",
                                request.start
                            ))
                        })?;
                        self.category = Some(moved);
                        request.start = self.bounded(&transposed)?;
                    }
                    Some(_) => {}
                }
            }
            tracing::debug!("index changed, re-issuing read (retry {})", retries);
        }
    }

    fn fetch_page(&mut self) -> Result<(), ViewNavError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        if self.remaining == Some(0) || (self.fetched && !self.more) {
            self.exhaust();
            return Ok(());
        }
        let count = self.page_size.min(self.remaining.unwrap_or(u32::MAX));
        let cache = self.builder.cache.clone();
        let since = cache
            .as_ref()
            .and_then(|c| c.diff_time_for(self.request_mask, self.single_column));
        let request = ReadRequest {
            skip_count: if self.fetched { 1 } else { self.first_skip },
            max_entries: count,
            read_mask: self.request_mask,
            since,
            cached_ids: match (&cache, since) {
                (Some(c), Some(_)) => Some(c.note_ids()),
                _ => None,
            },
            ..self.request(self.position.clone(), self.navigation)
        };
        tracing::trace!(
            "fetching up to {} entries from {} (skip {})",
            count,
            request.start,
            request.skip_count
        );
        let Some((mut request, mut result)) = self.read_with_recovery(request)? else {
            self.buffer.clear();
            self.exhaust();
            return Ok(());
        };
        self.fetched = true;

        let mut diff_time = request.since;
        if let Some(cache) = &cache {
            if request.since.is_some() && !self.backfill(cache, &mut result.entries) {
                tracing::debug!("cache miss on an unchanged entry, re-reading page");
                request.since = None;
                request.cached_ids = None;
                let Some((_, fresh)) = self.read_with_recovery(request)? else {
                    self.buffer.clear();
                    self.exhaust();
                    return Ok(());
                };
                result = fresh;
                diff_time = None;
            }
            cache.store(
                self.request_mask,
                self.single_column,
                diff_time.or(result.index_time),
                &result.entries,
            );
        }

        self.more = result.more;
        let mut entries = result.entries;
        if let Some(category) = &self.category {
            if let Some(outside) = entries
                .iter()
                .position(|e| !e.position().is_some_and(|p| p.is_descendant_of(category)))
            {
                tracing::trace!("left category at entry {}", outside);
                entries.truncate(outside);
                self.more = false;
            }
        }
        if entries.is_empty() {
            self.exhaust();
            return Ok(());
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(entries.len() as u32);
        }
        self.position = result.position;
        let fill_scores = self.read_mask.contains(ReadMaskFlag::Score);
        for mut entry in entries {
            if fill_scores {
                if let Some(scores) = &self.scores {
                    entry.ft_score = Some(scores.get(&entry.note_id()).copied().unwrap_or(0));
                }
            }
            entry.retain(self.read_mask);
            self.buffer.push_back(entry);
        }
        self.state = CursorState::Buffered;
        Ok(())
    }

    /// Fill `unchanged` entries from the cache. False on the first miss.
    fn backfill(
        &self,
        cache: &DifferentialCache,
        entries: &mut [CollectionEntry],
    ) -> bool {
        for entry in entries.iter_mut().filter(|e| e.unchanged) {
            match cache.lookup(entry.note_id()) {
                Some(fields) => {
                    fields.apply_to(entry);
                    if let Some(usage) = &self.builder.usage {
                        usage.record_hit();
                    }
                }
                None => return false,
            }
        }
        true
    }
}

impl<S: CollectionSource + ?Sized> Iterator for EntryCursor<'_, '_, S> {
    type Item = Result<CollectionEntry, ViewNavError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_entry()),
            Ok(false) => None,
            Err(e) => {
                // a failed read ends the traversal
                self.buffer.clear();
                self.exhaust();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{CacheUsage, DifferentialCache},
        config::CursorConfig,
        memory::{IndexBuilder, MemoryDocument, MemoryIndex},
        resolver::{ExpansionSpec, SelectionSpec, SpecItem},
        source::FtFlags,
    };
    use std::{cell::Cell, rc::Rc};
    use test_log::test;

    fn categorized() -> MemoryIndex {
        IndexBuilder::new(&["Topic", "Subject"])
            .category("1", |c| {
                c.document(MemoryDocument::new(4, vec!["1".into(), "alpha".into()]))
                    .document(MemoryDocument::new(8, vec!["1".into(), "beta".into()]))
            })
            .category("2", |c| {
                c.document(MemoryDocument::new(12, vec!["2".into(), "gamma".into()]))
            })
            .build()
            .unwrap()
    }

    fn flat(count: u32) -> MemoryIndex {
        let mut builder = IndexBuilder::new(&["Subject"]);
        for n in 1..=count {
            builder = builder.document(MemoryDocument::text(n * 4, &format!("doc {n}")));
        }
        builder.build().unwrap()
    }

    fn positions<S: CollectionSource + ?Sized>(builder: &mut CursorBuilder<'_, S>) -> Vec<String> {
        builder
            .build()
            .unwrap()
            .map(|e| e.unwrap().position().map(|p| p.to_string()).unwrap_or_default())
            .collect()
    }

    fn ids<S: CollectionSource + ?Sized>(builder: &mut CursorBuilder<'_, S>) -> Vec<u32> {
        builder.build().unwrap().map(|e| e.unwrap().note_id().0).collect()
    }

    fn with_positions(mask: ReadMask) -> ReadMask {
        mask | ReadMaskFlag::NoteId | ReadMaskFlag::IndexPosition
    }

    #[test]
    fn walks_everything_in_order() {
        let index = categorized();
        let mut builder =
            CursorBuilder::new(&index).read_mask(with_positions(ReadMask::empty()));
        assert_eq!(positions(&mut builder), vec!["1", "1.1", "1.2", "2", "2.1"]);
        let mut backward = CursorBuilder::new(&index)
            .direction(Navigation::PREV_ENTRY)
            .read_mask(with_positions(ReadMask::empty()));
        assert_eq!(positions(&mut backward), vec!["2.1", "2", "1.2", "1.1", "1"]);
    }

    #[test]
    fn category_restriction_yields_only_its_documents() {
        let index = categorized();
        let seen = Rc::new(Cell::new(None));
        let seen_in = seen.clone();
        let mut builder = CursorBuilder::new(&index)
            .direction(Navigation::NEXT_DOCUMENT)
            .read_mask(with_positions(ReadMask::empty()))
            .restrict_to_category("1")
            .on_category_entry(move |e| seen_in.set(Some(e.note_id())));
        assert_eq!(positions(&mut builder), vec!["1.1", "1.2"]);
        assert_eq!(seen.get(), Some(NoteId::category(1)));
    }

    #[test]
    fn category_deleted_before_first_fetch_is_empty() {
        let index = categorized();
        let mut builder = CursorBuilder::new(&index)
            .direction(Navigation::NEXT_DOCUMENT)
            .read_mask(with_positions(ReadMask::empty()))
            .restrict_to_category("1");
        let mut cursor = builder.build().unwrap();
        index.on_next_read(|idx| {
            idx.remove_category("1").unwrap();
        });
        assert!(!cursor.has_next().unwrap());
        assert_eq!(cursor.state(), CursorState::Exhausted);
        assert!(matches!(cursor.next_entry(), Err(ViewNavError::NoSuchElement)));
    }

    #[test]
    fn moved_category_is_relocated() {
        let index = categorized();
        let mut builder = CursorBuilder::new(&index)
            .direction(Navigation::NEXT_DOCUMENT)
            .read_mask(with_positions(ReadMask::empty()))
            .restrict_to_category("2");
        let mut cursor = builder.build().unwrap();
        index.on_next_read(|idx| {
            idx.add_document(&["0"], MemoryDocument::text(16, "zero"))
                .unwrap();
        });
        let first = cursor.next_entry().unwrap();
        assert_eq!(first.note_id(), NoteId(12));
        assert_eq!(first.position().unwrap().to_string(), "3.1");
        assert!(!cursor.has_next().unwrap());
    }

    /// Every read for the next `left` reads adds a category sorting before all existing ones.
    fn keep_adding_categories(index: &MemoryIndex, first_id: u32, left: u32) {
        if left == 0 {
            return;
        }
        index.on_next_read(move |idx| {
            let name = format!("0{first_id}");
            idx.add_document(&[name.as_str()], MemoryDocument::text(first_id, "new"))
                .unwrap();
            keep_adding_categories(idx, first_id + 4, left - 1);
        });
    }

    #[test]
    fn category_restriction_survives_retry_exhaustion() {
        let index = categorized();
        let config = CursorConfig {
            max_index_change_retries: 0,
            ..Default::default()
        };
        let mut builder = CursorBuilder::new(&index)
            .config(config)
            .direction(Navigation::NEXT_DOCUMENT)
            .read_mask(with_positions(ReadMask::empty()))
            .restrict_to_category("2");
        let mut cursor = builder.build().unwrap();
        index.on_next_read(|idx| {
            idx.add_document(&["0"], MemoryDocument::text(16, "zero"))
                .unwrap();
        });
        assert!(!cursor.has_next().unwrap());
        assert_eq!(cursor.state(), CursorState::Exhausted);
    }

    #[test]
    fn category_restriction_holds_while_index_keeps_changing() {
        let index = categorized();
        let mut builder = CursorBuilder::new(&index)
            .direction(Navigation::NEXT_DOCUMENT)
            .read_mask(with_positions(ReadMask::empty()))
            .restrict_to_category("2");
        let mut cursor = builder.build().unwrap();
        keep_adding_categories(&index, 100, 3);
        let first = cursor.next_entry().unwrap();
        assert_eq!(first.note_id(), NoteId(12));
        assert_eq!(first.position().unwrap().to_string(), "5.1");
        assert!(!cursor.has_next().unwrap());

        // more changes in a row than retries allowed: nothing from another category leaks out
        keep_adding_categories(&index, 200, 10);
        let mut builder = CursorBuilder::new(&index)
            .direction(Navigation::NEXT_DOCUMENT)
            .read_mask(with_positions(ReadMask::empty()))
            .restrict_to_category("2");
        let leaked: Vec<u32> = builder
            .build()
            .unwrap()
            .map(|e| e.unwrap().note_id().0)
            .filter(|id| *id != 12)
            .collect();
        assert!(leaked.is_empty());
    }

    #[test]
    fn stop_callback_ends_traversal() {
        let index = categorized();
        let calls = Rc::new(Cell::new(0));
        let calls_in = calls.clone();
        let mut builder = CursorBuilder::new(&index)
            .read_mask(with_positions(ReadMask::empty()))
            .page_size(2)
            .on_index_changed(move |_| {
                calls_in.set(calls_in.get() + 1);
                IndexChangeAction::Stop
            });
        let mut cursor = builder.build().unwrap();
        assert!(cursor.next_entry().is_ok());
        assert!(cursor.next_entry().is_ok());
        index.remove_note(NoteId(12)).unwrap();
        assert!(!cursor.has_next().unwrap());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unknown_category_is_no_data() {
        let index = categorized();
        let mut builder = CursorBuilder::new(&index).restrict_to_category("9");
        let mut cursor = builder.build().unwrap();
        assert!(!cursor.has_next().unwrap());
        assert_eq!(cursor.state(), CursorState::NoData);
        assert_eq!(cursor.total().unwrap(), 0);
    }

    #[test]
    fn total_ignores_skip_and_limit() {
        let index = flat(5);
        let reported = Rc::new(Cell::new(0));
        let reported_in = reported.clone();
        let mut builder = CursorBuilder::new(&index)
            .skip(2)
            .limit(1)
            .on_total(move |t| reported_in.set(t));
        let mut cursor = builder.build().unwrap();
        assert_eq!(cursor.total().unwrap(), 5);
        assert_eq!(reported.get(), 5);
        assert_eq!(cursor.next_entry().unwrap().note_id(), NoteId(12));
        assert!(!cursor.has_next().unwrap());
        assert_eq!(cursor.total().unwrap(), 5);

        let mut backward = CursorBuilder::new(&index).direction(Navigation::PREV_ENTRY);
        assert_eq!(backward.build().unwrap().total().unwrap(), 5);
    }

    #[test]
    fn skip_limit_and_paging() {
        let index = flat(10);
        let mut builder = CursorBuilder::new(&index).page_size(3).skip(2).limit(5);
        assert_eq!(ids(&mut builder), vec![12, 16, 20, 24, 28]);
        let mut backward = CursorBuilder::new(&index)
            .direction(Navigation::PREV_ENTRY)
            .page_size(4)
            .skip(1);
        assert_eq!(ids(&mut backward), vec![36, 32, 28, 24, 20, 16, 12, 8, 4]);
    }

    #[test]
    fn explicit_start_points() {
        let index = flat(5);
        let mut from_id = CursorBuilder::new(&index)
            .start_at(StartPoint::entry_id(NoteId(12)).unwrap());
        assert_eq!(ids(&mut from_id), vec![12, 16, 20]);
        let mut from_pos = CursorBuilder::new(&index)
            .direction(Navigation::PREV_ENTRY)
            .start_at(StartPoint::position("2").unwrap());
        assert_eq!(ids(&mut from_pos), vec![8, 4]);
        let mut last = CursorBuilder::new(&index).start_at(StartPoint::Last);
        assert_eq!(ids(&mut last), vec![20]);
        let mut missing =
            CursorBuilder::new(&index).start_at(StartPoint::entry_id(NoteId(99)).unwrap());
        let mut cursor = missing.build().unwrap();
        assert!(!cursor.has_next().unwrap());
        assert_eq!(cursor.state(), CursorState::NoData);
    }

    #[test]
    fn exhaustion_is_monotonic() {
        let index = flat(2);
        let mut builder = CursorBuilder::new(&index);
        let mut cursor = builder.build().unwrap();
        assert_eq!(cursor.by_ref().count(), 2);
        assert!(!cursor.has_next().unwrap());
        index
            .add_document(&[], MemoryDocument::text(100, "late"))
            .unwrap();
        assert!(!cursor.has_next().unwrap());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn selection_and_expansion_filter_rows() {
        let index = categorized();
        let mut selected = CursorBuilder::new(&index)
            .read_mask(with_positions(ReadMask::empty()))
            .select(SelectionSpec::additive().note_ids([8, 12]));
        assert_eq!(positions(&mut selected), vec!["1", "1.2", "2", "2.1"]);

        let mut collapsed = CursorBuilder::new(&index)
            .read_mask(with_positions(ReadMask::empty()))
            .expand(ExpansionSpec::expand_all().with(SpecItem::Category("1".into())));
        assert_eq!(positions(&mut collapsed), vec!["1", "2", "2.1"]);
    }

    #[test]
    fn unsupported_combinations_fail_before_reading() {
        let index = categorized();
        let mut builder = CursorBuilder::new(&index)
            .direction(Navigation::CHILD)
            .select(SelectionSpec::additive().note_ids([4]));
        assert!(matches!(builder.build(), Err(ViewNavError::Unsupported(_))));
        let mut builder = CursorBuilder::new(&index)
            .direction(Navigation::NEXT_CATEGORY)
            .select(SelectionSpec::additive().note_ids([4]));
        assert!(matches!(builder.build(), Err(ViewNavError::Unsupported(_))));
        let mut builder = CursorBuilder::new(&index).page_size(0);
        assert!(matches!(builder.build(), Err(ViewNavError::InvalidArgument(_))));
        let mut builder =
            CursorBuilder::new(&index).single_column(ColumnRef::Name("Author".into()));
        assert!(matches!(builder.build(), Err(ViewNavError::NotFound(_))));
    }

    #[test]
    fn internal_fields_are_stripped() {
        let index = categorized();
        let mut builder = CursorBuilder::new(&index).read_mask(ReadMaskFlag::Summary.into());
        let entries: Vec<CollectionEntry> =
            builder.build().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| e.note_id.is_none() && e.position.is_none()));
        assert_eq!(
            entries[1].column("subject").and_then(|v| v.as_text()),
            Some("alpha")
        );
    }

    #[test]
    fn single_column_by_name() {
        let index = categorized();
        let mut builder = CursorBuilder::new(&index)
            .direction(Navigation::NEXT_DOCUMENT)
            .read_mask(ReadMaskFlag::NoteId | ReadMaskFlag::SummaryValues)
            .single_column(ColumnRef::Name("subject".into()));
        let first = builder.build().unwrap().next_entry().unwrap();
        assert_eq!(first.column_at(0), None);
        assert_eq!(first.column_at(1).and_then(|v| v.as_text()), Some("alpha"));
    }

    #[test]
    fn single_column_reads_do_not_feed_full_reads() {
        let index = categorized();
        let cache = Arc::new(DifferentialCache::unbounded());
        let mask = ReadMaskFlag::NoteId | ReadMaskFlag::SummaryValues;
        let mut narrow = CursorBuilder::new(&index)
            .direction(Navigation::NEXT_DOCUMENT)
            .read_mask(mask)
            .cache(cache.clone())
            .single_column(ColumnRef::Index(1));
        assert_eq!(ids(&mut narrow), vec![4, 8, 12]);
        assert_eq!(cache.single_column(), Some(1));

        let mut full = CursorBuilder::new(&index)
            .direction(Navigation::NEXT_DOCUMENT)
            .read_mask(mask)
            .cache(cache.clone());
        let entries: Vec<CollectionEntry> = full.build().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries[0].column_at(0).and_then(|v| v.as_text()), Some("1"));
        assert_eq!(entries[2].column_at(0).and_then(|v| v.as_text()), Some("2"));
        assert_eq!(cache.single_column(), None);
    }

    #[test]
    fn differential_reads_backfill_from_the_cache() {
        let index = flat(4);
        let cache = Arc::new(DifferentialCache::unbounded());
        let usage = Arc::new(CacheUsage::new());
        usage.enable();
        let mask = ReadMaskFlag::NoteId | ReadMaskFlag::SummaryValues;

        let mut first = CursorBuilder::new(&index)
            .read_mask(mask)
            .cache(cache.clone())
            .cache_usage(usage.clone());
        let cold: Vec<CollectionEntry> = first.build().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(cache.len(), 4);
        assert_eq!(usage.hits(), 0);

        index
            .update_document(NoteId(8), vec!["doc 2 edited".into()])
            .unwrap();
        let warm: Vec<CollectionEntry> = first.build().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(usage.hits(), 3);
        assert_eq!(warm[0], cold[0]);
        assert!(warm.iter().all(|e| !e.unchanged));
        assert_eq!(
            warm[1].column_at(0).and_then(|v| v.as_text()),
            Some("doc 2 edited")
        );
    }

    #[test]
    fn cache_miss_triggers_a_fresh_read() {
        let index = flat(3);
        let cache = Arc::new(DifferentialCache::new(1).unwrap());
        let mask = ReadMaskFlag::NoteId | ReadMaskFlag::SummaryValues;
        let mut builder = CursorBuilder::new(&index)
            .read_mask(mask)
            .cache(cache.clone())
            .page_size(3);
        assert_eq!(ids(&mut builder), vec![4, 8, 12]);
        assert_eq!(cache.len(), 1);

        // the cache is emptied after the read was issued against its note ids
        let evict = cache.clone();
        index.on_next_read(move |_| evict.flush());
        let entries: Vec<CollectionEntry> =
            builder.build().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.column_at(0).is_some() && !e.unchanged));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn full_text_restriction_scores_entries() {
        let index = IndexBuilder::new(&["Subject"])
            .document(MemoryDocument::text(4, "apple pie"))
            .document(MemoryDocument::text(8, "pear"))
            .document(MemoryDocument::text(12, "apple apple"))
            .build()
            .unwrap();
        let mut builder = CursorBuilder::new(&index)
            .query_engine(&index)
            .read_mask(ReadMaskFlag::NoteId | ReadMaskFlag::Score)
            .full_text("apple", 0, FtFlags::empty());
        let entries: Vec<CollectionEntry> =
            builder.build().unwrap().map(|e| e.unwrap()).collect();
        let scored: Vec<(u32, u16)> = entries
            .iter()
            .map(|e| (e.note_id().0, e.ft_score()))
            .collect();
        assert_eq!(scored, vec![(4, 10), (12, 20)]);

        let mut without_engine =
            CursorBuilder::new(&index).full_text("apple", 0, FtFlags::empty());
        assert!(matches!(
            without_engine.build(),
            Err(ViewNavError::Unsupported(_))
        ));
    }

    #[test]
    fn resolved_sets_are_memoized_until_disposed() {
        let index = flat(4);
        let mut builder =
            CursorBuilder::new(&index).select(SelectionSpec::subtractive().note_ids([8]));
        builder.resolve().unwrap();
        let first = builder.selected_ids().cloned().unwrap();
        builder.resolve().unwrap();
        assert!(!builder.selected_ids().unwrap().is_disposed());
        first.dispose();
        assert!(builder.selected_ids().unwrap().is_disposed());
        assert_eq!(ids(&mut builder), vec![4, 12, 16]);
        assert!(!builder.selected_ids().unwrap().is_disposed());

        let kept = builder.selected_ids().cloned().unwrap();
        drop(builder);
        assert!(kept.is_disposed());
    }
}
