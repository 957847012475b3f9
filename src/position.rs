//! Tumbler-encoded coordinates inside a hierarchical index.
//!
//! A [Position] names a row by the 1-based ordinals of its ancestors and itself, e.g. `1.2.3` is the
//! third child of the second child of the first top-level row. The synthetic root above all rows is
//! `0`. Positions may carry a `min_level`/`max_level` pair that bounds navigation to a subtree; the
//! extended string form `1.2|1-31` encodes those bounds. Ordinals are
//! written without leading zeros.
//!
//! Because rows are numbered in pre-order, comparing two positions tumbler-wise yields document order:
//!
//! ```rust
//! use viewnav_core::position::Position;
//!
//! let parent: Position = "1".parse().unwrap();
//! let child: Position = "1.2".parse().unwrap();
//! let next: Position = "2".parse().unwrap();
//! assert!(parent < child && child < next);
//! assert!(child.is_descendant_of(&parent));
//! ```
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use crate::error::ViewNavError;

/// Number of tumbler slots.
pub const MAX_LEVELS: usize = 32;

/// Deepest addressable level (zero based).
pub const MAX_LEVEL: u8 = (MAX_LEVELS - 1) as u8;

static POSITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0|[1-9]\d*)(\.(0|[1-9]\d*))*(\|(0|[1-9]\d*)-(0|[1-9]\d*))?$")
        .expect("position pattern is a valid regex")
});

#[derive(Clone)]
pub struct Position {
    tumbler: [u32; MAX_LEVELS],
    level: u16,
    min_level: u8,
    max_level: u8,
    display: OnceCell<String>,
}

impl Position {
    /// The synthetic root above every top-level row.
    pub fn root() -> Position {
        Position {
            tumbler: [0; MAX_LEVELS],
            level: 0,
            min_level: 0,
            max_level: MAX_LEVEL,
            display: OnceCell::new(),
        }
    }

    /// Build a position from its significant tumbler entries. An all-zero tumbler is the root.
    pub fn from_tumbler(entries: &[u32]) -> Result<Position, ViewNavError> {
        if entries.is_empty() {
            return Err(ViewNavError::InvalidArgument(
                "a position needs at least one tumbler entry".to_string(),
            ));
        }
        if entries.len() > MAX_LEVELS {
            return Err(ViewNavError::InvalidArgument(format!(
                "a position holds at most {MAX_LEVELS} levels, got {}",
                entries.len()
            )));
        }
        let mut pos = Position::root();
        if entries.iter().all(|e| *e == 0) {
            return Ok(pos);
        }
        pos.tumbler[..entries.len()].copy_from_slice(entries);
        pos.level = (entries.len() - 1) as u16;
        Ok(pos)
    }

    /// Build a position from the raw 32-slot layout a source reports.
    pub fn from_raw(
        tumbler: [u32; MAX_LEVELS],
        level: u16,
        min_level: u8,
        max_level: u8,
    ) -> Result<Position, ViewNavError> {
        if level as usize >= MAX_LEVELS {
            return Err(ViewNavError::InvalidArgument(format!(
                "level {level} exceeds the deepest level {MAX_LEVEL}"
            )));
        }
        if tumbler[level as usize + 1..].iter().any(|e| *e != 0) {
            return Err(ViewNavError::InvalidArgument(format!(
                "tumbler entries beyond level {level} must be zero"
            )));
        }
        let base = Position::from_tumbler(&tumbler[..=level as usize])?;
        base.with_bounds(min_level, max_level)
    }

    pub fn level(&self) -> u16 {
        self.level
    }

    pub fn min_level(&self) -> u8 {
        self.min_level
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Tumbler entry at `index`; zero past the position's level.
    pub fn tumbler(&self, index: usize) -> u32 {
        self.tumbler.get(index).copied().unwrap_or(0)
    }

    /// The full 32-slot tumbler.
    pub fn raw(&self) -> &[u32; MAX_LEVELS] {
        &self.tumbler
    }

    /// The significant tumbler entries.
    pub fn to_vec(&self) -> Vec<u32> {
        self.significant().to_vec()
    }

    fn significant(&self) -> &[u32] {
        &self.tumbler[..=self.level as usize]
    }

    pub fn is_root(&self) -> bool {
        self.level == 0 && self.tumbler[0] == 0
    }

    pub fn has_default_bounds(&self) -> bool {
        self.min_level == 0 && self.max_level == MAX_LEVEL
    }

    /// Copy of this position restricted to `min_level..=max_level`.
    pub fn with_bounds(&self, min_level: u8, max_level: u8) -> Result<Position, ViewNavError> {
        if min_level > max_level || max_level > MAX_LEVEL {
            return Err(ViewNavError::InvalidArgument(format!(
                "invalid level bounds {min_level}-{max_level}"
            )));
        }
        Ok(Position {
            tumbler: self.tumbler,
            level: self.level,
            min_level,
            max_level,
            display: OnceCell::new(),
        })
    }

    /// Copy of this position without level bounds.
    pub fn unbounded(&self) -> Position {
        Position {
            tumbler: self.tumbler,
            level: self.level,
            min_level: 0,
            max_level: MAX_LEVEL,
            display: OnceCell::new(),
        }
    }

    /// The enclosing position. Top-level rows have the root as parent; the root has none.
    pub fn parent(&self) -> Option<Position> {
        if self.is_root() {
            return None;
        }
        if self.level == 0 {
            return Some(Position::root());
        }
        let mut parent = self.unbounded();
        parent.tumbler[self.level as usize] = 0;
        parent.level -= 1;
        Some(parent)
    }

    /// The `ordinal`-th (1-based) child of this position.
    pub fn child(&self, ordinal: u32) -> Result<Position, ViewNavError> {
        if self.is_root() {
            return Position::from_tumbler(&[ordinal]);
        }
        let depth = self.level as usize + 1;
        if depth >= MAX_LEVELS {
            return Err(ViewNavError::InvalidArgument(format!(
                "cannot descend below level {MAX_LEVEL}"
            )));
        }
        let mut child = self.unbounded();
        child.tumbler[depth] = ordinal;
        child.level += 1;
        Ok(child)
    }

    /// True iff `self` lies strictly inside the subtree rooted at `other`.
    pub fn is_descendant_of(&self, other: &Position) -> bool {
        if other.is_root() {
            return !self.is_root();
        }
        self.level > other.level && self.significant().starts_with(other.significant())
    }

    /// Re-base this position from `old_prefix` onto `new_prefix`, keeping the suffix below it.
    ///
    /// Returns `None` when `self` is neither `old_prefix` nor one of its descendants.
    pub fn transpose(&self, old_prefix: &Position, new_prefix: &Position) -> Option<Position> {
        if !(self.significant() == old_prefix.significant() || self.is_descendant_of(old_prefix)) {
            return None;
        }
        let suffix = &self.significant()[old_prefix.significant().len()..];
        let mut entries = new_prefix.to_vec();
        entries.extend_from_slice(suffix);
        let moved = Position::from_tumbler(&entries).ok()?;
        let bump = new_prefix.level as i32 - old_prefix.level as i32;
        let min_level = (self.min_level as i32 + bump).clamp(0, MAX_LEVEL as i32) as u8;
        moved.with_bounds(min_level, self.max_level).ok()
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::root()
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
            && self.min_level == other.min_level
            && self.max_level == other.max_level
    }
}

impl Eq for Position {}

impl Hash for Position {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
        self.min_level.hash(state);
        self.max_level.hash(state);
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.significant()
            .cmp(other.significant())
            .then(self.min_level.cmp(&other.min_level))
            .then(self.max_level.cmp(&other.max_level))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.display.get_or_init(|| {
            let mut text = self
                .significant()
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(".");
            if !self.has_default_bounds() {
                text.push_str(&format!("|{}-{}", self.min_level, self.max_level));
            }
            text
        });
        f.write_str(text)
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({self})")
    }
}

impl FromStr for Position {
    type Err = ViewNavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !POSITION_RE.is_match(trimmed) {
            return Err(ViewNavError::Format(format!("'{s}' is not a valid position")));
        }
        let (tumbler_part, bounds_part) = match trimmed.split_once('|') {
            Some((t, b)) => (t, Some(b)),
            None => (trimmed, None),
        };
        let entries = tumbler_part
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()?;
        if entries.len() > MAX_LEVELS {
            return Err(ViewNavError::Format(format!(
                "'{s}' has {} levels, at most {MAX_LEVELS} are allowed",
                entries.len()
            )));
        }
        let pos = Position::from_tumbler(&entries).map_err(|e| ViewNavError::Format(e.to_string()))?;
        match bounds_part {
            None => Ok(pos),
            Some(bounds) => {
                let (min, max) = bounds
                    .split_once('-')
                    .ok_or_else(|| ViewNavError::Format(format!("'{s}' has malformed bounds")))?;
                let min = min.parse::<u8>()?;
                let max = max.parse::<u8>()?;
                pos.with_bounds(min, max)
                    .map_err(|e| ViewNavError::Format(format!("'{s}': {e}")))
            }
        }
    }
}

impl TryFrom<&str> for Position {
    type Error = ViewNavError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct PositionVisitor;

impl<'de> de::Visitor<'de> for PositionVisitor {
    type Value = Position;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a dotted tumbler string such as \"1.2.3\" or \"1.2|1-31\"")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        s.parse()
            .map_err(|_e| E::invalid_value(de::Unexpected::Str(s), &self))
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(PositionVisitor)
    }
}
