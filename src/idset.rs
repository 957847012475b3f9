//! Shared, disposable note-ID sets.
//!
//! An [IdSet] is a handle: clones share one membership table, and [IdSet::dispose] invalidates every
//! clone at once. Any access after disposal fails with [ViewNavError::Disposed]. A set is either a
//! plain list of members or, when inverted, the complement of its list.
use parking_lot::RwLock;
use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::{error::ViewNavError, properties::NoteId};

#[derive(Debug, Default)]
struct IdSetData {
    ids: BTreeSet<NoteId>,
    inverted: bool,
    disposed: bool,
}

#[derive(Clone, Default)]
pub struct IdSet(Arc<RwLock<IdSetData>>);

impl IdSet {
    /// Empty set.
    pub fn new() -> IdSet {
        IdSet::default()
    }

    pub fn from_ids<I: IntoIterator<Item = NoteId>>(ids: I) -> IdSet {
        IdSet::with_parts(ids.into_iter().collect(), false)
    }

    /// Every ID except the listed ones. `all_except([])` contains everything.
    pub fn all_except<I: IntoIterator<Item = NoteId>>(ids: I) -> IdSet {
        IdSet::with_parts(ids.into_iter().collect(), true)
    }

    fn with_parts(ids: BTreeSet<NoteId>, inverted: bool) -> IdSet {
        IdSet(Arc::new(RwLock::new(IdSetData {
            ids,
            inverted,
            disposed: false,
        })))
    }

    fn snapshot(&self) -> Result<(BTreeSet<NoteId>, bool), ViewNavError> {
        let data = self.0.read();
        if data.disposed {
            return Err(disposed());
        }
        Ok((data.ids.clone(), data.inverted))
    }

    pub fn is_disposed(&self) -> bool {
        self.0.read().disposed
    }

    /// Release the membership table. Every clone of this handle observes the disposal.
    pub fn dispose(&self) {
        let mut data = self.0.write();
        if !data.disposed {
            tracing::trace!("disposing id set with {} listed ids", data.ids.len());
            data.ids.clear();
            data.disposed = true;
        }
    }

    /// True when the set holds the complement of its listed IDs.
    pub fn is_inverted(&self) -> Result<bool, ViewNavError> {
        let data = self.0.read();
        if data.disposed {
            return Err(disposed());
        }
        Ok(data.inverted)
    }

    /// Number of listed IDs (for an inverted set, the number of excluded IDs).
    pub fn len(&self) -> Result<usize, ViewNavError> {
        let data = self.0.read();
        if data.disposed {
            return Err(disposed());
        }
        Ok(data.ids.len())
    }

    /// True when the set has no members. An inverted set is never empty.
    pub fn is_empty(&self) -> Result<bool, ViewNavError> {
        let data = self.0.read();
        if data.disposed {
            return Err(disposed());
        }
        Ok(!data.inverted && data.ids.is_empty())
    }

    pub fn contains(&self, id: NoteId) -> Result<bool, ViewNavError> {
        let data = self.0.read();
        if data.disposed {
            return Err(disposed());
        }
        Ok(data.ids.contains(&id) != data.inverted)
    }

    /// Make `id` a member.
    pub fn insert(&self, id: NoteId) -> Result<(), ViewNavError> {
        let mut data = self.0.write();
        if data.disposed {
            return Err(disposed());
        }
        if data.inverted {
            data.ids.remove(&id);
        } else {
            data.ids.insert(id);
        }
        Ok(())
    }

    /// Make `id` a non-member.
    pub fn remove(&self, id: NoteId) -> Result<(), ViewNavError> {
        let mut data = self.0.write();
        if data.disposed {
            return Err(disposed());
        }
        if data.inverted {
            data.ids.insert(id);
        } else {
            data.ids.remove(&id);
        }
        Ok(())
    }

    pub fn union(&self, other: &IdSet) -> Result<IdSet, ViewNavError> {
        let (a, a_inv) = self.snapshot()?;
        let (b, b_inv) = other.snapshot()?;
        Ok(match (a_inv, b_inv) {
            (false, false) => IdSet::with_parts(&a | &b, false),
            (true, false) => IdSet::with_parts(&a - &b, true),
            (false, true) => IdSet::with_parts(&b - &a, true),
            (true, true) => IdSet::with_parts(&a & &b, true),
        })
    }

    pub fn intersect(&self, other: &IdSet) -> Result<IdSet, ViewNavError> {
        let (a, a_inv) = self.snapshot()?;
        let (b, b_inv) = other.snapshot()?;
        Ok(match (a_inv, b_inv) {
            (false, false) => IdSet::with_parts(&a & &b, false),
            (true, false) => IdSet::with_parts(&b - &a, false),
            (false, true) => IdSet::with_parts(&a - &b, false),
            (true, true) => IdSet::with_parts(&a | &b, true),
        })
    }

    /// Members of `self` that are not members of `other`.
    pub fn subtract(&self, other: &IdSet) -> Result<IdSet, ViewNavError> {
        self.intersect(&other.invert()?)
    }

    /// New handle holding the complement of this set.
    pub fn invert(&self) -> Result<IdSet, ViewNavError> {
        let (ids, inverted) = self.snapshot()?;
        Ok(IdSet::with_parts(ids, !inverted))
    }

    /// Independent copy that does not share disposal with this handle.
    pub fn deep_clone(&self) -> Result<IdSet, ViewNavError> {
        let (ids, inverted) = self.snapshot()?;
        Ok(IdSet::with_parts(ids, inverted))
    }

    /// Members in ascending order. Inverted sets have no finite enumeration; materialize them first.
    pub fn iter_ascending(&self) -> Result<Vec<NoteId>, ViewNavError> {
        let (ids, inverted) = self.snapshot()?;
        if inverted {
            return Err(ViewNavError::InvalidArgument(
                "cannot enumerate an inverted id set without a universe".to_string(),
            ));
        }
        Ok(ids.into_iter().collect())
    }

    pub fn iter_descending(&self) -> Result<Vec<NoteId>, ViewNavError> {
        let mut ids = self.iter_ascending()?;
        ids.reverse();
        Ok(ids)
    }

    /// Resolve this set against a finite universe into a plain (non-inverted) set.
    pub fn materialize(&self, universe: &IdSet) -> Result<IdSet, ViewNavError> {
        if universe.is_inverted()? {
            return Err(ViewNavError::InvalidArgument(
                "the universe of a materialized set must be finite".to_string(),
            ));
        }
        universe.intersect(self)
    }
}

fn disposed() -> ViewNavError {
    ViewNavError::Disposed("id set".to_string())
}

impl fmt::Debug for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.read();
        f.debug_struct("IdSet")
            .field("listed", &data.ids.len())
            .field("inverted", &data.inverted)
            .field("disposed", &data.disposed)
            .finish()
    }
}

impl FromIterator<NoteId> for IdSet {
    fn from_iter<T: IntoIterator<Item = NoteId>>(iter: T) -> Self {
        IdSet::from_ids(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> IdSet {
        raw.iter().map(|r| NoteId(*r)).collect()
    }

    fn raw(set: &IdSet) -> Vec<u32> {
        set.iter_ascending().unwrap().into_iter().map(|n| n.0).collect()
    }

    #[test]
    fn plain_set_algebra() {
        let a = ids(&[1, 2, 3]);
        let b = ids(&[3, 4]);
        assert_eq!(raw(&a.union(&b).unwrap()), vec![1, 2, 3, 4]);
        assert_eq!(raw(&a.intersect(&b).unwrap()), vec![3]);
        assert_eq!(raw(&a.subtract(&b).unwrap()), vec![1, 2]);
    }

    #[test]
    fn inverted_set_algebra() {
        let universe = ids(&(1..=10).collect::<Vec<_>>());
        let everything = IdSet::all_except([]);
        let without = everything.subtract(&ids(&[5, 9])).unwrap();
        assert!(without.is_inverted().unwrap());
        assert!(!without.contains(NoteId(5)).unwrap());
        assert!(without.contains(NoteId(6)).unwrap());
        assert_eq!(
            raw(&without.materialize(&universe).unwrap()),
            vec![1, 2, 3, 4, 6, 7, 8, 10]
        );

        let not_a = ids(&[1, 2]).invert().unwrap();
        let union = not_a.union(&ids(&[2])).unwrap();
        assert!(union.contains(NoteId(2)).unwrap());
        assert!(!union.contains(NoteId(1)).unwrap());
        let both = not_a.intersect(&ids(&[2, 3]).invert().unwrap()).unwrap();
        assert!(!both.contains(NoteId(3)).unwrap());
        assert!(both.contains(NoteId(4)).unwrap());
    }

    #[test]
    fn inverted_sets_do_not_enumerate() {
        let set = IdSet::all_except([NoteId(1)]);
        assert!(matches!(
            set.iter_ascending(),
            Err(ViewNavError::InvalidArgument(_))
        ));
    }

    #[test]
    fn insert_and_remove_respect_inversion() {
        let set = IdSet::all_except([]);
        set.remove(NoteId(8)).unwrap();
        assert!(!set.contains(NoteId(8)).unwrap());
        set.insert(NoteId(8)).unwrap();
        assert!(set.contains(NoteId(8)).unwrap());
    }

    #[test]
    fn disposal_is_shared_between_clones() {
        let set = ids(&[4, 8]);
        let shared = set.clone();
        let copy = set.deep_clone().unwrap();
        set.dispose();
        assert!(shared.is_disposed());
        assert!(matches!(shared.contains(NoteId(4)), Err(ViewNavError::Disposed(_))));
        assert!(matches!(shared.union(&copy), Err(ViewNavError::Disposed(_))));
        assert!(copy.contains(NoteId(4)).unwrap());
        assert_eq!(raw(&copy), vec![4, 8]);
    }

    #[test]
    fn descending_iteration() {
        assert_eq!(
            ids(&[3, 1, 2])
                .iter_descending()
                .unwrap()
                .into_iter()
                .map(|n| n.0)
                .collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
    }
}
