//! Index shape: the definition types callers build or deserialize, and the flattened row table the
//! walker navigates.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::ViewNavError,
    position::Position,
    properties::{ColumnValue, NoteClass, NoteId, Unid},
};

/// A document row, optionally with nested responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub note_id: NoteId,
    #[serde(default)]
    pub unid: Option<Unid>,
    #[serde(default)]
    pub class: NoteClass,
    #[serde(default)]
    pub columns: Vec<ColumnValue>,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub responses: Vec<MemoryDocument>,
}

impl MemoryDocument {
    pub fn new(note_id: u32, columns: Vec<ColumnValue>) -> MemoryDocument {
        MemoryDocument {
            note_id: NoteId(note_id),
            unid: None,
            class: NoteClass::DOCUMENT,
            columns,
            unread: false,
            modified: None,
            responses: Vec::new(),
        }
    }

    /// Single text column document, the common case in tests and fixtures.
    pub fn text(note_id: u32, value: &str) -> MemoryDocument {
        MemoryDocument::new(note_id, vec![ColumnValue::Text(value.to_string())])
    }

    pub fn unread(mut self, unread: bool) -> Self {
        self.unread = unread;
        self
    }

    pub fn with_unid(mut self, unid: Unid) -> Self {
        self.unid = Some(unid);
        self
    }

    pub fn with_response(mut self, response: MemoryDocument) -> Self {
        self.responses.push(response);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexNode {
    Category {
        title: String,
        #[serde(default)]
        children: Vec<IndexNode>,
    },
    Document(MemoryDocument),
}

/// Serializable description of a whole index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub columns: Vec<String>,
    /// Sorted columns matched by key lookups, in key order. Empty means `0..columns.len()`.
    #[serde(default)]
    pub key_columns: Vec<usize>,
    #[serde(default)]
    pub hierarchical: bool,
    #[serde(default)]
    pub nodes: Vec<IndexNode>,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Category { title: String },
    Document(Box<MemoryDocument>),
}

/// Stored tree node. Documents keep their responses as child nodes.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub note_id: NoteId,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    pub fn is_category(&self) -> bool {
        matches!(self.kind, NodeKind::Category { .. })
    }

    pub fn title(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Category { title } => Some(title),
            NodeKind::Document(_) => None,
        }
    }

    pub fn document_mut(&mut self) -> Option<&mut MemoryDocument> {
        match &mut self.kind {
            NodeKind::Document(doc) => Some(doc),
            NodeKind::Category { .. } => None,
        }
    }

    pub fn from_document(mut doc: MemoryDocument, time: DateTime<Utc>) -> Node {
        if doc.unid.is_none() {
            doc.unid = Some(Unid::new_v4());
        }
        if doc.modified.is_none() {
            doc.modified = Some(time);
        }
        let responses = std::mem::take(&mut doc.responses);
        Node {
            note_id: doc.note_id,
            kind: NodeKind::Document(Box::new(doc)),
            children: responses
                .into_iter()
                .map(|r| Node::from_document(r, time))
                .collect(),
        }
    }

    pub fn category(title: &str, ordinal: u32) -> Node {
        Node {
            note_id: NoteId::category(ordinal),
            kind: NodeKind::Category {
                title: title.to_string(),
            },
            children: Vec::new(),
        }
    }

    /// Convert a definition node, assigning category ids from `next_category`.
    pub fn from_definition(node: IndexNode, next_category: &mut u32, time: DateTime<Utc>) -> Node {
        match node {
            IndexNode::Category { title, children } => {
                let mut cat = Node::category(&title, *next_category);
                *next_category += 1;
                cat.children = children
                    .into_iter()
                    .map(|c| Node::from_definition(c, next_category, time))
                    .collect();
                cat
            }
            IndexNode::Document(doc) => Node::from_document(doc, time),
        }
    }
}

/// One row of the flattened, pre-ordered index.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub position: Position,
    pub tumbler: Vec<u32>,
    pub note_id: NoteId,
    pub parent: Option<usize>,
    /// Category path joined with `\`, for category rows
    pub category_path: Option<String>,
    pub document: Option<MemoryDocument>,
    pub sibling_count: u32,
    pub child_count: u32,
    pub descendant_count: u32,
    pub any_unread: bool,
    /// Response depth below the owning main document
    pub indent: u16,
}

impl Row {
    pub fn level(&self) -> u16 {
        self.position.level()
    }

    pub fn is_category(&self) -> bool {
        self.document.is_none()
    }

    pub fn is_unread(&self) -> bool {
        self.document.as_ref().map(|d| d.unread).unwrap_or(false)
    }

    /// Range of row indexes holding this row's descendants, given the row's own index.
    pub fn descendants(&self, index: usize) -> std::ops::Range<usize> {
        index + 1..index + 1 + self.descendant_count as usize
    }
}

/// Flatten `roots` into pre-order rows. Row positions are 1-based sibling ordinals.
pub(crate) fn flatten(roots: &[Node]) -> Result<Vec<Row>, ViewNavError> {
    fn walk(
        nodes: &[Node],
        prefix: &[u32],
        parent: Option<usize>,
        category_prefix: Option<&str>,
        indent: Option<u16>,
        rows: &mut Vec<Row>,
    ) -> Result<(u32, bool), ViewNavError> {
        let mut total = 0;
        let mut any_unread = false;
        for (ordinal, node) in nodes.iter().enumerate() {
            let mut tumbler = prefix.to_vec();
            tumbler.push(ordinal as u32 + 1);
            let position = Position::from_tumbler(&tumbler)?;
            let index = rows.len();
            let category_path = node.title().map(|title| match category_prefix {
                Some(p) => format!("{p}\\{title}"),
                None => title.to_string(),
            });
            let document = match &node.kind {
                NodeKind::Document(doc) => Some((**doc).clone()),
                NodeKind::Category { .. } => None,
            };
            // responses indent one deeper than their parent document
            let own_indent = match (&document, indent) {
                (Some(_), Some(depth)) => depth,
                _ => 0,
            };
            let child_indent = if document.is_some() {
                Some(own_indent + 1)
            } else {
                None
            };
            rows.push(Row {
                position,
                tumbler: tumbler.clone(),
                note_id: node.note_id,
                parent,
                category_path: category_path.clone(),
                document,
                sibling_count: nodes.len() as u32,
                child_count: node.children.len() as u32,
                descendant_count: 0,
                any_unread: false,
                indent: own_indent,
            });
            let (descendants, child_unread) = walk(
                &node.children,
                &tumbler,
                Some(index),
                category_path.as_deref().or(category_prefix),
                child_indent,
                rows,
            )?;
            let own_unread = rows[index].is_unread();
            rows[index].descendant_count = descendants;
            rows[index].any_unread = own_unread || child_unread;
            any_unread |= own_unread || child_unread;
            total += 1 + descendants;
        }
        Ok((total, any_unread))
    }

    let mut rows = Vec::new();
    walk(roots, &[], None, None, None, &mut rows)?;
    Ok(rows)
}

/// Fluent construction of an in-memory index.
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    definition: IndexDefinition,
}

impl IndexBuilder {
    pub fn new(columns: &[&str]) -> IndexBuilder {
        IndexBuilder {
            definition: IndexDefinition {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    pub fn key_columns(mut self, key_columns: &[usize]) -> Self {
        self.definition.key_columns = key_columns.to_vec();
        self
    }

    pub fn hierarchical(mut self, hierarchical: bool) -> Self {
        self.definition.hierarchical = hierarchical;
        self
    }

    pub fn document(mut self, doc: MemoryDocument) -> Self {
        self.definition.nodes.push(IndexNode::Document(doc));
        self
    }

    pub fn category<F>(mut self, title: &str, fill: F) -> Self
    where
        F: FnOnce(CategoryBuilder) -> CategoryBuilder,
    {
        let built = fill(CategoryBuilder::default());
        self.definition.nodes.push(IndexNode::Category {
            title: title.to_string(),
            children: built.children,
        });
        self
    }

    pub fn definition(self) -> IndexDefinition {
        self.definition
    }

    pub fn build(self) -> Result<super::MemoryIndex, ViewNavError> {
        super::MemoryIndex::from_definition(self.definition)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryBuilder {
    children: Vec<IndexNode>,
}

impl CategoryBuilder {
    pub fn document(mut self, doc: MemoryDocument) -> Self {
        self.children.push(IndexNode::Document(doc));
        self
    }

    pub fn category<F>(mut self, title: &str, fill: F) -> Self
    where
        F: FnOnce(CategoryBuilder) -> CategoryBuilder,
    {
        let built = fill(CategoryBuilder::default());
        self.children.push(IndexNode::Category {
            title: title.to_string(),
            children: built.children,
        });
        self
    }
}
