//! Single steps through the flattened rows.
//!
//! Rows are stored in pre-order, which is also tumbler order, so every forward step is a scan from
//! the first row past the current tumbler and every backward step a scan from the last row before
//! it. A scan ends as soon as it would leave the subtree allowed by the minimum level.
use crate::{
    error::ViewNavError,
    idset::IdSet,
    navigate::{LevelScope, Navigation, Scope},
    position::Position,
};

use super::tree::Row;

pub(crate) struct Walker<'a> {
    pub rows: &'a [Row],
    pub selected: Option<&'a IdSet>,
    pub expanded: Option<&'a IdSet>,
    pub min_level: u16,
    pub max_level: u16,
}

impl<'a> Walker<'a> {
    pub fn find_exact(&self, pos: &Position) -> Option<usize> {
        let wanted = pos.to_vec();
        self.rows
            .binary_search_by(|r| r.tumbler.as_slice().cmp(wanted.as_slice()))
            .ok()
    }

    /// True when `index` is a row `nav` may land on.
    pub fn matches(&self, index: usize, nav: &Navigation) -> Result<bool, ViewNavError> {
        let row = &self.rows[index];
        if row.level() < self.min_level || row.level() > self.max_level {
            return Ok(false);
        }
        let scoped = match nav.scope {
            Scope::All => true,
            Scope::Document => !row.is_category(),
            Scope::Category => row.is_category(),
            Scope::Unread => !row.is_category() && row.is_unread(),
        };
        if !scoped {
            return Ok(false);
        }
        if nav.level == LevelScope::TopLevel && row.level() != 0 {
            return Ok(false);
        }
        if nav.membership.selected() && !self.is_selected(index)? {
            return Ok(false);
        }
        if nav.membership.expanded() && !self.is_visible(index)? {
            return Ok(false);
        }
        Ok(true)
    }

    /// Documents in the selection, and categories holding at least one of them.
    fn is_selected(&self, index: usize) -> Result<bool, ViewNavError> {
        let Some(selected) = self.selected else {
            return Ok(true);
        };
        let row = &self.rows[index];
        if !row.is_category() {
            return selected.contains(row.note_id);
        }
        for i in row.descendants(index) {
            let r = &self.rows[i];
            if !r.is_category() && selected.contains(r.note_id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A row is visible when every ancestor is expanded.
    fn is_visible(&self, index: usize) -> Result<bool, ViewNavError> {
        let Some(expanded) = self.expanded else {
            return Ok(true);
        };
        let mut parent = self.rows[index].parent;
        while let Some(p) = parent {
            if !expanded.contains(self.rows[p].note_id)? {
                return Ok(false);
            }
            parent = self.rows[p].parent;
        }
        Ok(true)
    }

    /// The row one `nav` step away from `from`, if any.
    pub fn step(&self, from: &Position, nav: &Navigation) -> Result<Option<usize>, ViewNavError> {
        match nav.level {
            LevelScope::Default | LevelScope::TopLevel => self.scan(from, nav, None),
            LevelScope::SameLevel => {
                if from.is_root() {
                    return Ok(None);
                }
                self.scan(from, nav, Some(from.level()))
            }
            LevelScope::Child => self.child(from, nav),
            LevelScope::Parent => {
                let Some(parent) = from.parent() else {
                    return Ok(None);
                };
                match self.find_exact(&parent) {
                    Some(i) if self.matches(i, nav)? => Ok(Some(i)),
                    _ => Ok(None),
                }
            }
        }
    }

    fn scan(
        &self,
        from: &Position,
        nav: &Navigation,
        same_level: Option<u16>,
    ) -> Result<Option<usize>, ViewNavError> {
        let at = from.to_vec();
        let floor = same_level.unwrap_or(self.min_level).max(self.min_level);
        let accept = |i: usize| -> Result<Option<bool>, ViewNavError> {
            let row = &self.rows[i];
            // leaving the parent (or the bounded subtree) ends the scan
            if row.level() < floor {
                return Ok(None);
            }
            if let Some(level) = same_level {
                if row.level() != level {
                    return Ok(Some(false));
                }
            }
            Ok(Some(self.matches(i, nav)?))
        };
        if nav.is_forward() {
            let start = self
                .rows
                .partition_point(|r| r.tumbler.as_slice() <= at.as_slice());
            for i in start..self.rows.len() {
                match accept(i)? {
                    None => return Ok(None),
                    Some(true) => return Ok(Some(i)),
                    Some(false) => {}
                }
            }
        } else {
            let end = self
                .rows
                .partition_point(|r| r.tumbler.as_slice() < at.as_slice());
            for i in (0..end).rev() {
                match accept(i)? {
                    None => return Ok(None),
                    Some(true) => return Ok(Some(i)),
                    Some(false) => {}
                }
            }
        }
        Ok(None)
    }

    fn child(&self, from: &Position, nav: &Navigation) -> Result<Option<usize>, ViewNavError> {
        let (range, child_level) = if from.is_root() {
            (0..self.rows.len(), 0)
        } else {
            let Some(index) = self.find_exact(from) else {
                return Ok(None);
            };
            (self.rows[index].descendants(index), from.level() + 1)
        };
        let mut found = None;
        for i in range {
            if self.rows[i].level() != child_level || !self.matches(i, nav)? {
                continue;
            }
            found = Some(i);
            if nav.is_forward() {
                break;
            }
        }
        Ok(found)
    }
}
