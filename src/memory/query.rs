//! Structured and full-text queries over the documents of a [MemoryIndex].
//!
//! The structured dialect covers terms of the form `column = 'text'`,
//! `column contains 'text'`, `column < 10` or `column > 10`, joined left to right with `and` / `or`.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::{
    error::ViewNavError,
    idset::IdSet,
    properties::{ColumnValue, NoteId},
    source::{FtFlag, FtFlags, FullTextResult, QueryEngine},
};

use super::{tree::MemoryDocument, MemoryIndex};

static TERM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*([\w$]+)\s*(=|<|>|contains)\s*(?:'([^']*)'|(-?\d+(?:\.\d+)?))\s*$")
        .expect("term pattern is valid")
});

static JOIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(and|or)\s+").expect("join pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
enum Comparison {
    Equal,
    Less,
    Greater,
    Contains,
}

#[derive(Debug, Clone)]
struct Term {
    column: usize,
    comparison: Comparison,
    operand: Operand,
}

impl Term {
    fn parse(text: &str, columns: &[String]) -> Result<Term, ViewNavError> {
        let caps = TERM
            .captures(text)
            .ok_or_else(|| ViewNavError::Format(format!("cannot parse query term '{text}'")))?;
        let name = &caps[1];
        let column = columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| ViewNavError::NotFound(format!("column '{name}'")))?;
        let comparison = match caps[2].to_lowercase().as_str() {
            "=" => Comparison::Equal,
            "<" => Comparison::Less,
            ">" => Comparison::Greater,
            _ => Comparison::Contains,
        };
        let operand = match (caps.get(3), caps.get(4)) {
            (Some(text), _) => Operand::Text(text.as_str().to_string()),
            (None, Some(number)) => Operand::Number(number.as_str().parse().map_err(|_| {
                ViewNavError::Format(format!("'{}' is not a number", number.as_str()))
            })?),
            (None, None) => {
                return Err(ViewNavError::Format(format!("query term '{text}' has no operand")))
            }
        };
        Ok(Term {
            column,
            comparison,
            operand,
        })
    }

    fn matches(&self, doc: &MemoryDocument) -> bool {
        let Some(value) = doc.columns.get(self.column) else {
            return false;
        };
        match (&self.comparison, &self.operand) {
            (Comparison::Equal, Operand::Text(t)) => {
                value.texts().iter().any(|v| v.eq_ignore_ascii_case(t))
            }
            (Comparison::Contains, Operand::Text(t)) => {
                let t = t.to_lowercase();
                value.texts().iter().any(|v| v.to_lowercase().contains(&t))
            }
            (Comparison::Equal, Operand::Number(n)) => value.numbers().iter().any(|v| v == n),
            (Comparison::Less, Operand::Number(n)) => value.numbers().iter().any(|v| v < n),
            (Comparison::Greater, Operand::Number(n)) => value.numbers().iter().any(|v| v > n),
            (Comparison::Less, Operand::Text(t)) => {
                value.texts().iter().any(|v| v.to_lowercase() < t.to_lowercase())
            }
            (Comparison::Greater, Operand::Text(t)) => {
                value.texts().iter().any(|v| v.to_lowercase() > t.to_lowercase())
            }
            (Comparison::Contains, Operand::Number(n)) => value.numbers().iter().any(|v| v == n),
        }
    }
}

/// Occurrences of `term` in the document's text columns.
fn occurrences(doc: &MemoryDocument, term: &str, flags: FtFlags) -> usize {
    let case_sensitive = flags.contains(FtFlag::CaseSensitive);
    let term = if case_sensitive {
        term.to_string()
    } else {
        term.to_lowercase()
    };
    doc.columns
        .iter()
        .flat_map(|c: &ColumnValue| c.texts())
        .map(|text| {
            let text = if case_sensitive {
                text.to_string()
            } else {
                text.to_lowercase()
            };
            text.split(|c: char| !c.is_alphanumeric())
                .filter(|word| {
                    if flags.contains(FtFlag::Stems) {
                        word.starts_with(&term)
                    } else {
                        *word == term
                    }
                })
                .count()
        })
        .sum()
}

impl QueryEngine for MemoryIndex {
    fn structured_query(&self, query: &str) -> Result<IdSet, ViewNavError> {
        let data = self.data.read();
        let mut terms = Vec::new();
        let mut joins = Vec::new();
        let mut last = 0;
        for m in JOIN.captures_iter(query) {
            let (Some(whole), Some(op)) = (m.get(0), m.get(1)) else {
                continue;
            };
            terms.push(Term::parse(&query[last..whole.start()], &data.columns)?);
            joins.push(op.as_str().eq_ignore_ascii_case("and"));
            last = whole.end();
        }
        terms.push(Term::parse(&query[last..], &data.columns)?);

        let ids: IdSet = data
            .rows
            .iter()
            .filter_map(|row| row.document.as_ref())
            .filter(|doc| {
                let mut hit = terms[0].matches(doc);
                for (term, and) in terms[1..].iter().zip(&joins) {
                    hit = if *and {
                        hit && term.matches(doc)
                    } else {
                        hit || term.matches(doc)
                    };
                }
                hit
            })
            .map(|doc| doc.note_id)
            .collect();
        tracing::debug!("structured query '{}' matched {} documents", query, ids.len()?);
        Ok(ids)
    }

    fn full_text_query(
        &self,
        query: &str,
        max_docs: u32,
        flags: FtFlags,
    ) -> Result<FullTextResult, ViewNavError> {
        let terms: Vec<&str> = query.split_whitespace().collect();
        if terms.is_empty() {
            return Err(ViewNavError::InvalidArgument(
                "a full-text query needs at least one term".to_string(),
            ));
        }
        let data = self.data.read();
        let mut hits: Vec<(NoteId, usize)> = data
            .rows
            .iter()
            .filter_map(|row| row.document.as_ref())
            .filter_map(|doc| {
                let counts: Vec<usize> = terms
                    .iter()
                    .map(|t| occurrences(doc, t, flags))
                    .collect();
                let matched = if flags.contains(FtFlag::AllTerms) {
                    counts.iter().all(|c| *c > 0)
                } else {
                    counts.iter().any(|c| *c > 0)
                };
                matched.then(|| (doc.note_id, counts.iter().sum()))
            })
            .collect();
        // best score first, document order among equals
        hits.sort_by(|a, b| b.1.cmp(&a.1));
        if max_docs > 0 {
            hits.truncate(max_docs as usize);
        }
        let scores: BTreeMap<NoteId, u16> = hits
            .iter()
            .map(|(id, count)| (*id, (*count * 10).min(100) as u16))
            .collect();
        Ok(FullTextResult {
            ids: hits.iter().map(|(id, _)| *id).collect(),
            scores,
        })
    }
}
