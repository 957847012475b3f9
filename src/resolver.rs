//! Turns declarative selection and expansion specs into concrete [IdSet]s.
//!
//! Every item of a spec resolves to a set of note IDs through the collection source (key lookups,
//! category lookups, the `all_ids` snapshot) or the query engine (structured and full-text queries).
//! Additive selections union the item sets into an empty set; subtractive selections remove them
//! from every document in the index. Expansion works the same way over collapse state: starting from
//! "everything expanded" items collapse rows, starting from "everything collapsed" items expand them.
use serde::{Deserialize, Serialize};

use crate::{
    config::SelectionPadding,
    error::ViewNavError,
    idset::IdSet,
    properties::{FindFlag, FindFlags, KeyValue, NoteId, ReadMaskFlag},
    source::{CollectionSource, FtFlags, QueryEngine},
};

/// Highest synthetic ID used to pad small selections.
pub const PADDING_ID_START: u32 = 0x7FFF_FFFC;
const PADDING_ID_STEP: u32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMode {
    /// Start from nothing and add each item
    #[default]
    Additive,
    /// Start from every document and remove each item
    Subtractive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpansionMode {
    /// Every row expanded; items collapse
    #[default]
    ExpandAll,
    /// Every row collapsed; items expand
    CollapseAll,
}

/// A lookup against the sorted key columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyLookup {
    pub keys: Vec<KeyValue>,
    pub exact: bool,
    pub case_insensitive: bool,
}

impl KeyLookup {
    pub fn exact<I: IntoIterator<Item = KeyValue>>(keys: I) -> KeyLookup {
        KeyLookup {
            keys: keys.into_iter().collect(),
            exact: true,
            case_insensitive: false,
        }
    }

    pub fn prefix<I: IntoIterator<Item = KeyValue>>(keys: I) -> KeyLookup {
        KeyLookup {
            exact: false,
            ..KeyLookup::exact(keys)
        }
    }

    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn find_flags(&self) -> FindFlags {
        let mut flags = FindFlag::Equal | FindFlag::RangeOverlap | FindFlag::ReturnData;
        if self.case_insensitive {
            flags |= FindFlag::CaseInsensitive;
        }
        if !self.exact {
            flags |= FindFlag::Partial;
        }
        flags
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpecItem {
    NoteIds(Vec<NoteId>),
    Key(KeyLookup),
    StructuredQuery(String),
    FullText(String),
    /// Category path, levels joined with `\`
    Category(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionSpec {
    pub mode: SelectionMode,
    pub items: Vec<SpecItem>,
}

impl SelectionSpec {
    pub fn additive() -> SelectionSpec {
        SelectionSpec::default()
    }

    pub fn subtractive() -> SelectionSpec {
        SelectionSpec {
            mode: SelectionMode::Subtractive,
            items: Vec::new(),
        }
    }

    pub fn with(mut self, item: SpecItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn note_ids<I: IntoIterator<Item = u32>>(self, ids: I) -> Self {
        self.with(SpecItem::NoteIds(ids.into_iter().map(NoteId).collect()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpansionSpec {
    pub mode: ExpansionMode,
    pub items: Vec<SpecItem>,
}

impl ExpansionSpec {
    pub fn expand_all() -> ExpansionSpec {
        ExpansionSpec::default()
    }

    pub fn collapse_all() -> ExpansionSpec {
        ExpansionSpec {
            mode: ExpansionMode::CollapseAll,
            items: Vec::new(),
        }
    }

    pub fn with(mut self, item: SpecItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn note_ids<I: IntoIterator<Item = u32>>(self, ids: I) -> Self {
        self.with(SpecItem::NoteIds(ids.into_iter().map(NoteId).collect()))
    }
}

pub struct Resolver<'a, S: CollectionSource + ?Sized> {
    source: &'a S,
    engine: Option<&'a dyn QueryEngine>,
    padding: SelectionPadding,
}

impl<'a, S: CollectionSource + ?Sized> Resolver<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Resolver {
            source,
            engine: None,
            padding: SelectionPadding::default(),
        }
    }

    pub fn with_engine(mut self, engine: &'a dyn QueryEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_padding(mut self, padding: SelectionPadding) -> Self {
        self.padding = padding;
        self
    }

    fn engine(&self, what: &str) -> Result<&'a dyn QueryEngine, ViewNavError> {
        self.engine.ok_or_else(|| {
            ViewNavError::Unsupported(format!("{what} requires a query engine"))
        })
    }

    #[tracing::instrument(skip(self, spec), fields(mode = ?spec.mode, items = spec.items.len()))]
    pub fn resolve_selection(&self, spec: &SelectionSpec) -> Result<IdSet, ViewNavError> {
        let mut selected = match spec.mode {
            SelectionMode::Additive => IdSet::new(),
            SelectionMode::Subtractive => self.source.all_ids()?,
        };
        for item in &spec.items {
            let ids = self.item_ids(item)?;
            selected = match spec.mode {
                SelectionMode::Additive => selected.union(&ids)?,
                SelectionMode::Subtractive => selected.subtract(&ids)?,
            };
        }
        self.pad(&selected)?;
        tracing::debug!("selection resolved to {} ids", selected.len()?);
        Ok(selected)
    }

    #[tracing::instrument(skip(self, spec), fields(mode = ?spec.mode, items = spec.items.len()))]
    pub fn resolve_expansion(&self, spec: &ExpansionSpec) -> Result<IdSet, ViewNavError> {
        let mut expanded = match spec.mode {
            ExpansionMode::ExpandAll => IdSet::all_except([]),
            ExpansionMode::CollapseAll => IdSet::new(),
        };
        for item in &spec.items {
            let ids = self.item_ids(item)?;
            expanded = match spec.mode {
                ExpansionMode::ExpandAll => expanded.subtract(&ids)?,
                ExpansionMode::CollapseAll => expanded.union(&ids)?,
            };
        }
        Ok(expanded)
    }

    /// The IDs a single spec item stands for.
    pub fn item_ids(&self, item: &SpecItem) -> Result<IdSet, ViewNavError> {
        match item {
            SpecItem::NoteIds(ids) => Ok(ids.iter().copied().collect()),
            SpecItem::Key(lookup) => {
                let found =
                    self.source
                        .find_by_key(lookup.find_flags(), ReadMaskFlag::NoteId.into(), &lookup.keys)?;
                Ok(found
                    .entries
                    .iter()
                    .filter_map(|e| e.note_id)
                    .filter(|id| !id.is_category())
                    .collect())
            }
            SpecItem::StructuredQuery(query) => {
                self.engine("a structured query")?.structured_query(query)
            }
            SpecItem::FullText(query) => Ok(self
                .engine("a full-text query")?
                .full_text_query(query, 0, FtFlags::empty())?
                .ids),
            SpecItem::Category(path) => {
                let found = self.source.find_by_key(
                    FindFlag::Equal | FindFlag::CategoryOrLeaf | FindFlag::ReturnData,
                    ReadMaskFlag::NoteId.into(),
                    &[KeyValue::Text(path.clone())],
                )?;
                let category = found
                    .entries
                    .first()
                    .and_then(|e| e.note_id)
                    .filter(|id| id.is_category());
                match category {
                    Some(id) => Ok(IdSet::from_ids([id])),
                    None => {
                        tracing::warn!("category '{}' not found, item ignored", path);
                        Ok(IdSet::new())
                    }
                }
            }
        }
    }

    /// Pad small explicit selections on hierarchical sources with IDs that cannot exist.
    fn pad(&self, selected: &IdSet) -> Result<(), ViewNavError> {
        if !self.padding.enabled || !self.source.is_hierarchical() || selected.is_inverted()? {
            return Ok(());
        }
        let missing = self.padding.threshold.saturating_sub(selected.len()?);
        if missing == 0 {
            return Ok(());
        }
        tracing::debug!("padding selection with {} synthetic ids", missing);
        let mut next = PADDING_ID_START;
        let mut added = 0;
        while added < missing && next >= PADDING_ID_STEP {
            let id = NoteId(next);
            if !selected.contains(id)? {
                selected.insert(id)?;
                added += 1;
            }
            next -= PADDING_ID_STEP;
        }
        Ok(())
    }
}
