use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    cache::{CacheUsage, DifferentialCache},
    config::CursorConfig,
    error::ViewNavError,
    idset::IdSet,
    navigate::Navigation,
    properties::{CollectionEntry, NoteId, ReadMask},
    resolver::{ExpansionSpec, Resolver, SelectionSpec},
    source::{CollectionSource, FtFlags, IndexChanges, QueryEngine},
};

use super::{
    ColumnRef, EntryCursor, FullTextRestriction, IndexChangeAction, StartPoint,
};

pub(crate) type TotalCallback<'a> = Box<dyn FnMut(u32) + 'a>;
pub(crate) type CategoryCallback<'a> = Box<dyn FnMut(&CollectionEntry) + 'a>;
pub(crate) type IndexChangedCallback<'a> = Box<dyn FnMut(IndexChanges) -> IndexChangeAction + 'a>;

/// ID sets a builder resolved from its specs. Kept until the builder is disposed or a spec changes.
#[derive(Debug, Default)]
pub(crate) struct ResolvedSets {
    pub selected: Option<IdSet>,
    pub expanded: Option<IdSet>,
    pub scores: Option<Arc<BTreeMap<NoteId, u16>>>,
}

impl ResolvedSets {
    fn is_disposed(&self) -> bool {
        self.selected.as_ref().is_some_and(|s| s.is_disposed())
            || self.expanded.as_ref().is_some_and(|s| s.is_disposed())
    }

    fn dispose(&self) {
        if let Some(s) = &self.selected {
            s.dispose();
        }
        if let Some(s) = &self.expanded {
            s.dispose();
        }
    }
}

/// Declarative description of a traversal.
///
/// Setters take and return the builder so a traversal reads as one chain. The builder owns the ID
/// sets it resolves and disposes them when it is dropped; cursors borrow the builder, so every
/// cursor ends before its sets go away.
pub struct CursorBuilder<'a, S: CollectionSource + ?Sized> {
    pub(crate) source: &'a S,
    pub(crate) engine: Option<&'a dyn QueryEngine>,
    pub(crate) config: CursorConfig,
    pub(crate) read_mask: Option<ReadMask>,
    pub(crate) direction: Navigation,
    pub(crate) selection: Option<SelectionSpec>,
    pub(crate) expansion: Option<ExpansionSpec>,
    pub(crate) category: Option<String>,
    pub(crate) start: Option<StartPoint>,
    pub(crate) skip: u32,
    pub(crate) limit: Option<u32>,
    pub(crate) page_size: Option<u32>,
    pub(crate) cache: Option<Arc<DifferentialCache>>,
    pub(crate) usage: Option<Arc<CacheUsage>>,
    pub(crate) single_column: Option<ColumnRef>,
    pub(crate) full_text: Option<FullTextRestriction>,
    pub(crate) on_total: Option<TotalCallback<'a>>,
    pub(crate) on_category_entry: Option<CategoryCallback<'a>>,
    pub(crate) on_index_changed: Option<IndexChangedCallback<'a>>,
    pub(crate) resolved: Option<ResolvedSets>,
}

impl<'a, S: CollectionSource + ?Sized> CursorBuilder<'a, S> {
    pub fn new(source: &'a S) -> Self {
        CursorBuilder {
            source,
            engine: None,
            config: CursorConfig::default(),
            read_mask: None,
            direction: Navigation::NEXT_ENTRY,
            selection: None,
            expansion: None,
            category: None,
            start: None,
            skip: 0,
            limit: None,
            page_size: None,
            cache: None,
            usage: None,
            single_column: None,
            full_text: None,
            on_total: None,
            on_category_entry: None,
            on_index_changed: None,
            resolved: None,
        }
    }

    /// Engine used for structured-query and full-text items.
    pub fn query_engine(mut self, engine: &'a dyn QueryEngine) -> Self {
        self.engine = Some(engine);
        self.invalidate();
        self
    }

    pub fn config(mut self, config: CursorConfig) -> Self {
        self.config = config;
        self.invalidate();
        self
    }

    /// Fields to populate. Defaults to the config's `default_read_mask`.
    pub fn read_mask(mut self, read_mask: ReadMask) -> Self {
        self.read_mask = Some(read_mask);
        self
    }

    pub fn direction(mut self, direction: Navigation) -> Self {
        self.direction = direction;
        self
    }

    pub fn select(mut self, selection: SelectionSpec) -> Self {
        self.selection = Some(selection);
        self.invalidate();
        self
    }

    pub fn expand(mut self, expansion: ExpansionSpec) -> Self {
        self.expansion = Some(expansion);
        self.invalidate();
        self
    }

    /// Only yield entries below the category at `path` (levels joined with `\`).
    pub fn restrict_to_category(mut self, path: &str) -> Self {
        self.category = Some(path.to_string());
        self
    }

    pub fn start_at(mut self, start: StartPoint) -> Self {
        self.start = Some(start);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Entries per page fetch. Defaults to the config's `page_size`.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn cache(mut self, cache: Arc<DifferentialCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache_usage(mut self, usage: Arc<CacheUsage>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn single_column(mut self, column: ColumnRef) -> Self {
        self.single_column = Some(column);
        self
    }

    pub fn full_text(mut self, query: &str, max_docs: u32, flags: FtFlags) -> Self {
        self.full_text = Some(FullTextRestriction {
            query: query.to_string(),
            max_docs,
            flags,
        });
        self.invalidate();
        self
    }

    /// Receives the total entry count when a cursor initializes.
    pub fn on_total<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u32) + 'a,
    {
        self.on_total = Some(Box::new(callback));
        self
    }

    /// Receives the restricting category's own entry when a cursor locates it.
    pub fn on_category_entry<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&CollectionEntry) + 'a,
    {
        self.on_category_entry = Some(Box::new(callback));
        self
    }

    /// Decides whether a traversal continues after the index changed in a way that invalidates
    /// positions. Without a callback traversals continue.
    pub fn on_index_changed<F>(mut self, callback: F) -> Self
    where
        F: FnMut(IndexChanges) -> IndexChangeAction + 'a,
    {
        self.on_index_changed = Some(Box::new(callback));
        self
    }

    fn invalidate(&mut self) {
        if let Some(resolved) = self.resolved.take() {
            resolved.dispose();
        }
    }

    /// Resolve the selection, expansion and full-text specs into ID sets.
    ///
    /// The result is kept for later calls and recomputed when any kept set was disposed.
    pub fn resolve(&mut self) -> Result<(), ViewNavError> {
        if let Some(resolved) = &self.resolved {
            if !resolved.is_disposed() {
                return Ok(());
            }
            tracing::debug!("resolved id sets were disposed, resolving again");
            resolved.dispose();
            self.resolved = None;
        }
        let mut resolver =
            Resolver::new(self.source).with_padding(self.config.selection_padding.clone());
        if let Some(engine) = self.engine {
            resolver = resolver.with_engine(engine);
        }
        let mut resolved = ResolvedSets::default();
        if let Some(spec) = &self.selection {
            resolved.selected = Some(resolver.resolve_selection(spec)?);
        }
        if let Some(ft) = &self.full_text {
            let engine = self.engine.ok_or_else(|| {
                ViewNavError::Unsupported("a full-text restriction requires a query engine".into())
            })?;
            let hits = engine.full_text_query(&ft.query, ft.max_docs, ft.flags)?;
            tracing::debug!("full-text query '{}' matched {} documents", ft.query, hits.scores.len());
            resolved.selected = Some(match resolved.selected.take() {
                Some(selected) => {
                    let narrowed = selected.intersect(&hits.ids)?;
                    selected.dispose();
                    narrowed
                }
                None => hits.ids,
            });
            resolved.scores = Some(Arc::new(hits.scores));
        }
        if let Some(spec) = &self.expansion {
            resolved.expanded = Some(resolver.resolve_expansion(spec)?);
        }
        self.resolved = Some(resolved);
        Ok(())
    }

    /// The resolved selection, if one is active and [CursorBuilder::resolve] has run.
    pub fn selected_ids(&self) -> Option<&IdSet> {
        self.resolved.as_ref().and_then(|r| r.selected.as_ref())
    }

    /// The resolved expansion, if one is active and [CursorBuilder::resolve] has run.
    pub fn expanded_ids(&self) -> Option<&IdSet> {
        self.resolved.as_ref().and_then(|r| r.expanded.as_ref())
    }

    /// Start a fresh traversal. Fails before any index read when the direction cannot be combined
    /// with the active filters or a setting is invalid.
    pub fn build(&mut self) -> Result<EntryCursor<'_, 'a, S>, ViewNavError> {
        self.config.validate()?;
        self.resolve()?;
        EntryCursor::new(self)
    }

    /// Release every resolved ID set.
    pub fn dispose(&mut self) {
        self.invalidate();
    }
}

impl<S: CollectionSource + ?Sized> Drop for CursorBuilder<'_, S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<S: CollectionSource + ?Sized> fmt::Debug for CursorBuilder<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorBuilder")
            .field("direction", &self.direction)
            .field("read_mask", &self.read_mask)
            .field("selection", &self.selection)
            .field("expansion", &self.expansion)
            .field("category", &self.category)
            .field("start", &self.start)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("page_size", &self.page_size)
            .field("full_text", &self.full_text)
            .finish()
    }
}
