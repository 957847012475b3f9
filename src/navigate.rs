//! Navigation directions as a small algebra.
//!
//! A [Navigation] is the tuple `{polarity, scope, membership, level}`. Callers pick one of the
//! named constants (or parse a kebab-case name); the cursor then composes it with the filters that
//! are active for the traversal. Composition either yields a direction the collection source can
//! walk or fails with [ViewNavError::Unsupported] before any read is issued.
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::ViewNavError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Forward,
    Backward,
}

/// Which kinds of rows a step may land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    All,
    Document,
    Category,
    Unread,
}

/// Which ID-set filters a step honors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Membership {
    None,
    Selected,
    Expanded,
    Both,
}

impl Membership {
    pub fn selected(&self) -> bool {
        matches!(self, Membership::Selected | Membership::Both)
    }

    pub fn expanded(&self) -> bool {
        matches!(self, Membership::Expanded | Membership::Both)
    }

    fn from_flags(selected: bool, expanded: bool) -> Membership {
        match (selected, expanded) {
            (false, false) => Membership::None,
            (true, false) => Membership::Selected,
            (false, true) => Membership::Expanded,
            (true, true) => Membership::Both,
        }
    }
}

/// How a step moves through the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelScope {
    /// Pre-order walk across all levels
    Default,
    /// Siblings under the same parent
    SameLevel,
    /// Rows at level zero
    TopLevel,
    /// First (or, walking backward, last) child
    Child,
    /// Enclosing row
    Parent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Navigation {
    pub polarity: Polarity,
    pub scope: Scope,
    pub membership: Membership,
    pub level: LevelScope,
}

const fn nav(polarity: Polarity, scope: Scope, membership: Membership, level: LevelScope) -> Navigation {
    Navigation {
        polarity,
        scope,
        membership,
        level,
    }
}

use LevelScope as L;
use Membership as M;
use Polarity as P;
use Scope as S;

impl Navigation {
    pub const NEXT_ENTRY: Navigation = nav(P::Forward, S::All, M::None, L::Default);
    pub const PREV_ENTRY: Navigation = nav(P::Backward, S::All, M::None, L::Default);
    pub const NEXT_DOCUMENT: Navigation = nav(P::Forward, S::Document, M::None, L::Default);
    pub const PREV_DOCUMENT: Navigation = nav(P::Backward, S::Document, M::None, L::Default);
    pub const NEXT_CATEGORY: Navigation = nav(P::Forward, S::Category, M::None, L::Default);
    pub const PREV_CATEGORY: Navigation = nav(P::Backward, S::Category, M::None, L::Default);
    pub const NEXT_UNREAD: Navigation = nav(P::Forward, S::Unread, M::None, L::Default);
    pub const PREV_UNREAD: Navigation = nav(P::Backward, S::Unread, M::None, L::Default);
    pub const NEXT_SIBLING: Navigation = nav(P::Forward, S::All, M::None, L::SameLevel);
    pub const PREV_SIBLING: Navigation = nav(P::Backward, S::All, M::None, L::SameLevel);
    pub const NEXT_TOP_LEVEL: Navigation = nav(P::Forward, S::All, M::None, L::TopLevel);
    pub const PREV_TOP_LEVEL: Navigation = nav(P::Backward, S::All, M::None, L::TopLevel);
    pub const NEXT_UNREAD_TOP_LEVEL: Navigation = nav(P::Forward, S::Unread, M::None, L::TopLevel);
    pub const PREV_UNREAD_TOP_LEVEL: Navigation = nav(P::Backward, S::Unread, M::None, L::TopLevel);
    pub const CHILD: Navigation = nav(P::Forward, S::All, M::None, L::Child);
    pub const PARENT: Navigation = nav(P::Forward, S::All, M::None, L::Parent);
    pub const NEXT_SELECTED: Navigation = nav(P::Forward, S::All, M::Selected, L::Default);
    pub const PREV_SELECTED: Navigation = nav(P::Backward, S::All, M::Selected, L::Default);
    pub const NEXT_SELECTED_TOP_LEVEL: Navigation =
        nav(P::Forward, S::All, M::Selected, L::TopLevel);
    pub const PREV_SELECTED_TOP_LEVEL: Navigation =
        nav(P::Backward, S::All, M::Selected, L::TopLevel);
    pub const NEXT_EXPANDED: Navigation = nav(P::Forward, S::All, M::Expanded, L::Default);
    pub const PREV_EXPANDED: Navigation = nav(P::Backward, S::All, M::Expanded, L::Default);
    pub const NEXT_EXPANDED_SELECTED: Navigation = nav(P::Forward, S::All, M::Both, L::Default);
    pub const PREV_EXPANDED_SELECTED: Navigation = nav(P::Backward, S::All, M::Both, L::Default);
    pub const NEXT_EXPANDED_UNREAD: Navigation = nav(P::Forward, S::Unread, M::Expanded, L::Default);
    pub const PREV_EXPANDED_UNREAD: Navigation =
        nav(P::Backward, S::Unread, M::Expanded, L::Default);
    pub const NEXT_EXPANDED_CATEGORY: Navigation =
        nav(P::Forward, S::Category, M::Expanded, L::Default);
    pub const PREV_EXPANDED_CATEGORY: Navigation =
        nav(P::Backward, S::Category, M::Expanded, L::Default);

    const NAMED: &'static [(&'static str, Navigation)] = &[
        ("next-entry", Navigation::NEXT_ENTRY),
        ("prev-entry", Navigation::PREV_ENTRY),
        ("next-document", Navigation::NEXT_DOCUMENT),
        ("prev-document", Navigation::PREV_DOCUMENT),
        ("next-category", Navigation::NEXT_CATEGORY),
        ("prev-category", Navigation::PREV_CATEGORY),
        ("next-unread", Navigation::NEXT_UNREAD),
        ("prev-unread", Navigation::PREV_UNREAD),
        ("next-sibling", Navigation::NEXT_SIBLING),
        ("prev-sibling", Navigation::PREV_SIBLING),
        ("next-top-level", Navigation::NEXT_TOP_LEVEL),
        ("prev-top-level", Navigation::PREV_TOP_LEVEL),
        ("next-unread-top-level", Navigation::NEXT_UNREAD_TOP_LEVEL),
        ("prev-unread-top-level", Navigation::PREV_UNREAD_TOP_LEVEL),
        ("child", Navigation::CHILD),
        ("parent", Navigation::PARENT),
        ("next-selected", Navigation::NEXT_SELECTED),
        ("prev-selected", Navigation::PREV_SELECTED),
        ("next-selected-top-level", Navigation::NEXT_SELECTED_TOP_LEVEL),
        ("prev-selected-top-level", Navigation::PREV_SELECTED_TOP_LEVEL),
        ("next-expanded", Navigation::NEXT_EXPANDED),
        ("prev-expanded", Navigation::PREV_EXPANDED),
        ("next-expanded-selected", Navigation::NEXT_EXPANDED_SELECTED),
        ("prev-expanded-selected", Navigation::PREV_EXPANDED_SELECTED),
        ("next-expanded-unread", Navigation::NEXT_EXPANDED_UNREAD),
        ("prev-expanded-unread", Navigation::PREV_EXPANDED_UNREAD),
        ("next-expanded-category", Navigation::NEXT_EXPANDED_CATEGORY),
        ("prev-expanded-category", Navigation::PREV_EXPANDED_CATEGORY),
    ];

    pub fn is_forward(&self) -> bool {
        self.polarity == P::Forward
    }

    /// Same direction, opposite polarity.
    pub fn reversed(&self) -> Navigation {
        Navigation {
            polarity: match self.polarity {
                P::Forward => P::Backward,
                P::Backward => P::Forward,
            },
            ..*self
        }
    }

    /// Combine the requested direction with the traversal's active filters.
    ///
    /// Requesting a membership filter that is not active, or pairing any membership with sibling,
    /// child or parent steps, has no walkable equivalent and is rejected.
    pub fn compose(
        &self,
        selection_active: bool,
        expansion_active: bool,
    ) -> Result<Navigation, ViewNavError> {
        if self.membership.selected() && !selection_active {
            return Err(ViewNavError::Unsupported(format!(
                "{self} requires an active selection"
            )));
        }
        if self.membership.expanded() && !expansion_active {
            return Err(ViewNavError::Unsupported(format!(
                "{self} requires an active expansion"
            )));
        }
        let mut membership = Membership::from_flags(
            self.membership.selected() || selection_active,
            self.membership.expanded() || expansion_active,
        );
        let unsupported = |what: &str| {
            Err(ViewNavError::Unsupported(format!(
                "{self} cannot be combined with {what}"
            )))
        };
        match (self.level, self.scope, membership) {
            (L::Default, S::All | S::Document, _) => {}
            (L::Default, S::Category | S::Unread, M::None | M::Expanded) => {}
            (L::Default, S::Category, _) => return unsupported("a selection"),
            (L::Default, S::Unread, _) => return unsupported("a selection"),
            (L::TopLevel, S::Category, _) => return unsupported("top-level stepping"),
            (L::TopLevel, S::Unread, M::Selected | M::Both) => return unsupported("a selection"),
            (L::TopLevel, _, _) => {
                // collapse state has no effect at level zero
                membership = Membership::from_flags(membership.selected(), false);
            }
            (L::SameLevel | L::Child | L::Parent, _, M::None) => {}
            (L::SameLevel | L::Child | L::Parent, _, M::Selected | M::Both) => {
                return unsupported("a selection")
            }
            (L::SameLevel | L::Child | L::Parent, _, M::Expanded) => {
                return unsupported("an expansion")
            }
        }
        let composed = Navigation {
            membership,
            ..*self
        };
        if composed != *self {
            tracing::trace!("composed {} into {}", self, composed);
        }
        Ok(composed)
    }

    /// Stable numeric code, used in log output.
    pub fn code(&self) -> u16 {
        let polarity = match self.polarity {
            P::Forward => 0,
            P::Backward => 1,
        };
        let scope = match self.scope {
            S::All => 0,
            S::Document => 1,
            S::Category => 2,
            S::Unread => 3,
        };
        let membership = match self.membership {
            M::None => 0,
            M::Selected => 1,
            M::Expanded => 2,
            M::Both => 3,
        };
        let level = match self.level {
            L::Default => 0,
            L::SameLevel => 1,
            L::TopLevel => 2,
            L::Child => 3,
            L::Parent => 4,
        };
        (level << 6) | (membership << 4) | (scope << 1) | polarity
    }
}

impl Default for Navigation {
    fn default() -> Self {
        Navigation::NEXT_ENTRY
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Navigation::NAMED.iter().find(|(_, n)| n == self) {
            Some((name, _)) => f.write_str(name),
            None => write!(
                f,
                "{:?}/{:?}/{:?}/{:?}",
                self.polarity, self.scope, self.membership, self.level
            ),
        }
    }
}

impl FromStr for Navigation {
    type Err = ViewNavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Navigation::NAMED
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, n)| *n)
            .ok_or_else(|| ViewNavError::Format(format!("unknown navigation direction '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_directions_pick_up_active_filters() {
        let n = Navigation::NEXT_ENTRY;
        assert_eq!(n.compose(false, false).unwrap(), Navigation::NEXT_ENTRY);
        assert_eq!(n.compose(true, false).unwrap(), Navigation::NEXT_SELECTED);
        assert_eq!(n.compose(false, true).unwrap(), Navigation::NEXT_EXPANDED);
        assert_eq!(n.compose(true, true).unwrap(), Navigation::NEXT_EXPANDED_SELECTED);
        assert_eq!(
            Navigation::PREV_ENTRY.compose(true, true).unwrap(),
            Navigation::PREV_EXPANDED_SELECTED
        );
        assert_eq!(
            Navigation::NEXT_UNREAD.compose(false, true).unwrap(),
            Navigation::NEXT_EXPANDED_UNREAD
        );
    }

    #[test]
    fn hierarchy_steps_reject_membership() {
        for n in [Navigation::CHILD, Navigation::PARENT, Navigation::NEXT_SIBLING] {
            assert!(n.compose(false, false).is_ok());
            assert!(matches!(n.compose(true, false), Err(ViewNavError::Unsupported(_))));
            assert!(matches!(n.compose(false, true), Err(ViewNavError::Unsupported(_))));
        }
    }

    #[test]
    fn top_level_absorbs_expansion() {
        assert_eq!(
            Navigation::NEXT_TOP_LEVEL.compose(false, true).unwrap(),
            Navigation::NEXT_TOP_LEVEL
        );
        assert_eq!(
            Navigation::NEXT_TOP_LEVEL.compose(true, true).unwrap(),
            Navigation::NEXT_SELECTED_TOP_LEVEL
        );
        assert!(Navigation::NEXT_UNREAD_TOP_LEVEL.compose(true, false).is_err());
    }

    #[test]
    fn explicit_membership_requires_the_filter() {
        assert!(Navigation::NEXT_SELECTED.compose(false, false).is_err());
        assert!(Navigation::NEXT_EXPANDED.compose(true, false).is_err());
        assert!(Navigation::NEXT_SELECTED.compose(true, false).is_ok());
    }

    #[test]
    fn category_and_unread_reject_selection() {
        assert!(Navigation::NEXT_CATEGORY.compose(true, false).is_err());
        assert!(Navigation::PREV_UNREAD.compose(true, true).is_err());
        assert_eq!(
            Navigation::NEXT_CATEGORY.compose(false, true).unwrap(),
            Navigation::NEXT_EXPANDED_CATEGORY
        );
    }

    #[test]
    fn names_round_trip() {
        for (name, n) in Navigation::NAMED {
            assert_eq!(n.to_string(), *name);
            assert_eq!(name.parse::<Navigation>().unwrap(), *n);
        }
        assert_eq!(
            "NEXT_DOCUMENT".parse::<Navigation>().unwrap(),
            Navigation::NEXT_DOCUMENT
        );
        assert!("sideways".parse::<Navigation>().is_err());
    }

    #[test]
    fn codes_are_distinct() {
        let mut codes: Vec<u16> = Navigation::NAMED.iter().map(|(_, n)| n.code()).collect();
        let total = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), total);
        assert_eq!(Navigation::NEXT_ENTRY.reversed(), Navigation::PREV_ENTRY);
    }
}
