//! [crate::properties] contains the row-level building blocks a traversal produces: note
//! identifiers, read masks, column values and [CollectionEntry] itself.
pub use enumset::EnumSet;
use chrono::{DateTime, Utc};
use enumset::*;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
    sync::Arc,
};
use uuid::Uuid;

use crate::{error::ViewNavError, position::Position};

/// Flag marking a synthetic category row.
pub const NOTEID_CATEGORY: u32 = 0x8000_0000;
/// Flags marking a category total row.
pub const NOTEID_CATEGORY_TOTAL: u32 = 0xC000_0000;
/// Flag set on a document id that refers to a deletion stub.
pub const NOTEID_DELETED: u32 = 0x8000_0000;
/// Bits left for the note ordinal.
pub const NOTEID_MASK: u32 = 0x7FFF_FFFF;

/// Summary column that marks a save/replication conflict.
pub const CONFLICT_ITEM: &str = "$Conflict";
/// Summary column that holds a response's parent reference.
pub const REF_ITEM: &str = "$REF";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NoteId(pub u32);

impl NoteId {
    pub fn new(raw: u32) -> NoteId {
        NoteId(raw)
    }

    pub fn category(ordinal: u32) -> NoteId {
        NoteId(NOTEID_CATEGORY | (ordinal & NOTEID_MASK))
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_category(&self) -> bool {
        self.0 & NOTEID_CATEGORY != 0
    }

    pub fn is_total(&self) -> bool {
        self.0 & NOTEID_CATEGORY_TOTAL == NOTEID_CATEGORY_TOTAL
    }

    /// A document id carrying the deletion flag. Only meaningful where a document id is expected,
    /// since category rows share the same bit.
    pub fn is_deleted_stub(&self) -> bool {
        self.0 & NOTEID_DELETED != 0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u32> for NoteId {
    fn from(raw: u32) -> NoteId {
        NoteId(raw)
    }
}

/// Universal note identifier, printed as 32 upper-case hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Unid(pub Uuid);

impl Unid {
    pub fn new_v4() -> Unid {
        Unid(Uuid::new_v4())
    }
}

impl Display for Unid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut buf = Uuid::encode_buffer();
        f.write_str(self.0.simple().encode_upper(&mut buf))
    }
}

impl FromStr for Unid {
    type Err = ViewNavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Unid(Uuid::try_parse(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteClass(pub u16);

impl NoteClass {
    pub const DOCUMENT: NoteClass = NoteClass(0x0001);
    pub const INFO: NoteClass = NoteClass(0x0002);
    pub const FORM: NoteClass = NoteClass(0x0004);
    pub const VIEW: NoteClass = NoteClass(0x0008);
    pub const ICON: NoteClass = NoteClass(0x0010);
    pub const DESIGN: NoteClass = NoteClass(0x0020);
    pub const ACL: NoteClass = NoteClass(0x0040);
    pub const HELP_INDEX: NoteClass = NoteClass(0x0080);
    pub const HELP: NoteClass = NoteClass(0x0100);
    pub const FILTER: NoteClass = NoteClass(0x0200);
    pub const FIELD: NoteClass = NoteClass(0x0400);
    pub const REPLFORMULA: NoteClass = NoteClass(0x0800);
    pub const PRIVATE: NoteClass = NoteClass(0x1000);

    pub fn is_document(&self) -> bool {
        self.0 & NoteClass::DOCUMENT.0 != 0
    }
}

impl Default for NoteClass {
    fn default() -> Self {
        NoteClass::DOCUMENT
    }
}

/// Fields a read can populate on a [CollectionEntry].
#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(serialize_repr = "list")]
pub enum ReadMaskFlag {
    NoteId,
    NoteUnid,
    NoteClass,
    IndexSiblings,
    IndexChildren,
    IndexDescendants,
    IndexAnyUnread,
    IndentLevels,
    Score,
    IndexUnread,
    IndexPosition,
    /// Column values addressed by column index
    SummaryValues,
    /// Column values addressed by programmatic column name
    Summary,
}

pub type ReadMask = EnumSet<ReadMaskFlag>;

impl ReadMaskFlag {
    /// Flags whose data a differential cache may hold for a note.
    pub fn cacheable() -> ReadMask {
        ReadMaskFlag::NoteUnid
            | ReadMaskFlag::NoteClass
            | ReadMaskFlag::SummaryValues
            | ReadMaskFlag::Summary
    }

    pub fn summary() -> ReadMask {
        ReadMaskFlag::SummaryValues | ReadMaskFlag::Summary
    }
}

/// Options for key lookups against a sorted index.
#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(serialize_repr = "list")]
pub enum FindFlag {
    Equal,
    /// Text keys match as prefixes
    Partial,
    CaseInsensitive,
    /// Range keys match any value inside the range
    RangeOverlap,
    /// Category rows match on their full category path
    CategoryOrLeaf,
    FirstEqual,
    LastEqual,
    /// Return row data along with the match position
    ReturnData,
}

pub type FindFlags = EnumSet<FindFlag>;

/// A typed key for sorted-column lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyValue {
    Text(String),
    Number(f64),
    NumberRange(f64, f64),
    Time(DateTime<Utc>),
    TimeRange(DateTime<Utc>, DateTime<Utc>),
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Text(value.to_string())
    }
}

impl From<f64> for KeyValue {
    fn from(value: f64) -> Self {
        KeyValue::Number(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ColumnValue {
    #[default]
    Empty,
    Text(String),
    TextList(Vec<String>),
    Number(f64),
    NumberList(Vec<f64>),
    Time(DateTime<Utc>),
    TimeList(Vec<DateTime<Utc>>),
}

impl ColumnValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, ColumnValue::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            ColumnValue::TextList(list) => list.first().map(|s| s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ColumnValue::Number(n) => Some(*n),
            ColumnValue::NumberList(list) => list.first().copied(),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            ColumnValue::Time(t) => Some(*t),
            ColumnValue::TimeList(list) => list.first().copied(),
            _ => None,
        }
    }

    /// All text values, for list-aware matching.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            ColumnValue::Text(s) => vec![s.as_str()],
            ColumnValue::TextList(list) => list.iter().map(|s| s.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn numbers(&self) -> Vec<f64> {
        match self {
            ColumnValue::Number(n) => vec![*n],
            ColumnValue::NumberList(list) => list.clone(),
            _ => Vec::new(),
        }
    }

    pub fn times(&self) -> Vec<DateTime<Utc>> {
        match self {
            ColumnValue::Time(t) => vec![*t],
            ColumnValue::TimeList(list) => list.clone(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Number(value)
    }
}

impl Display for ColumnValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnValue::Empty => Ok(()),
            ColumnValue::Text(s) => f.write_str(s),
            ColumnValue::TextList(list) => f.write_str(&list.join(";")),
            ColumnValue::Number(n) => write!(f, "{n}"),
            ColumnValue::NumberList(list) => f.write_str(
                &list
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(";"),
            ),
            ColumnValue::Time(t) => write!(f, "{}", t.to_rfc3339()),
            ColumnValue::TimeList(list) => f.write_str(
                &list
                    .iter()
                    .map(|t| t.to_rfc3339())
                    .collect::<Vec<_>>()
                    .join(";"),
            ),
        }
    }
}

/// Column values of one row, addressable by index or programmatic name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnValues {
    names: Arc<Vec<String>>,
    values: Vec<ColumnValue>,
}

impl ColumnValues {
    pub fn new(names: Arc<Vec<String>>, values: Vec<ColumnValue>) -> ColumnValues {
        ColumnValues { names, values }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
            .filter(|v| !v.is_empty())
    }

    pub fn get_at(&self, index: usize) -> Option<&ColumnValue> {
        self.values.get(index).filter(|v| !v.is_empty())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[ColumnValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_empty())
    }

    /// Keep only the column at `index`, blanking the others.
    pub fn retain_single(&mut self, index: usize) {
        for (idx, value) in self.values.iter_mut().enumerate() {
            if idx != index {
                *value = ColumnValue::Empty;
            }
        }
    }

    /// Copy without programmatic names, as returned for index-addressed reads.
    pub fn without_names(&self) -> ColumnValues {
        ColumnValues {
            names: Arc::new(Vec::new()),
            values: self.values.clone(),
        }
    }
}

/// One row of a traversed index.
///
/// Which fields are present is decided by the [ReadMask] the row was read with. Accessors return a
/// fixed default (zero, `false`, empty) for anything that was not requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<NoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unid: Option<Unid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_class: Option<NoteClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sibling_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descendant_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_unread: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ft_score: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_level: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnValues>,
    /// Set by a differential read when the row's cacheable data was left out because the caller
    /// already holds it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unchanged: bool,
}

impl CollectionEntry {
    pub fn note_id(&self) -> NoteId {
        self.note_id.unwrap_or_default()
    }

    pub fn unid(&self) -> Option<Unid> {
        self.unid
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn level(&self) -> u16 {
        self.position.as_ref().map(|p| p.level()).unwrap_or(0)
    }

    pub fn note_class(&self) -> NoteClass {
        self.note_class.unwrap_or(NoteClass(0))
    }

    pub fn sibling_count(&self) -> u32 {
        self.sibling_count.unwrap_or(0)
    }

    pub fn child_count(&self) -> u32 {
        self.child_count.unwrap_or(0)
    }

    pub fn descendant_count(&self) -> u32 {
        self.descendant_count.unwrap_or(0)
    }

    pub fn is_unread(&self) -> bool {
        self.unread.unwrap_or(false)
    }

    pub fn is_any_unread(&self) -> bool {
        self.any_unread.unwrap_or(false)
    }

    pub fn ft_score(&self) -> u16 {
        self.ft_score.unwrap_or(0)
    }

    pub fn indent_level(&self) -> u16 {
        self.indent_level.unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnValue> {
        self.columns.as_ref().and_then(|c| c.get(name))
    }

    pub fn column_at(&self, index: usize) -> Option<&ColumnValue> {
        self.columns.as_ref().and_then(|c| c.get_at(index))
    }

    pub fn is_category(&self) -> bool {
        self.note_id.map(|id| id.is_category()).unwrap_or(false)
    }

    pub fn is_document(&self) -> bool {
        self.note_id.map(|id| !id.is_category()).unwrap_or(false)
    }

    pub fn is_conflict(&self) -> bool {
        self.column(CONFLICT_ITEM).is_some()
    }

    pub fn is_response(&self) -> bool {
        self.indent_level() > 0 || self.column(REF_ITEM).is_some()
    }

    /// Drop every field the mask did not ask for.
    pub fn retain(&mut self, mask: ReadMask) {
        if !mask.contains(ReadMaskFlag::NoteId) {
            self.note_id = None;
        }
        if !mask.contains(ReadMaskFlag::NoteUnid) {
            self.unid = None;
        }
        if !mask.contains(ReadMaskFlag::NoteClass) {
            self.note_class = None;
        }
        if !mask.contains(ReadMaskFlag::IndexSiblings) {
            self.sibling_count = None;
        }
        if !mask.contains(ReadMaskFlag::IndexChildren) {
            self.child_count = None;
        }
        if !mask.contains(ReadMaskFlag::IndexDescendants) {
            self.descendant_count = None;
        }
        if !mask.contains(ReadMaskFlag::IndexAnyUnread) {
            self.any_unread = None;
        }
        if !mask.contains(ReadMaskFlag::IndentLevels) {
            self.indent_level = None;
        }
        if !mask.contains(ReadMaskFlag::Score) {
            self.ft_score = None;
        }
        if !mask.contains(ReadMaskFlag::IndexUnread) {
            self.unread = None;
        }
        if !mask.contains(ReadMaskFlag::IndexPosition) {
            self.position = None;
        }
        if mask.is_disjoint(ReadMaskFlag::summary()) {
            self.columns = None;
        } else if !mask.contains(ReadMaskFlag::Summary) {
            self.columns = self.columns.as_ref().map(|c| c.without_names());
        }
    }
}
