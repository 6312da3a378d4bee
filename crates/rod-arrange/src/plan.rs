use rod_store::{Container, RecordContainer};
use rod_types::NameHash;
use tracing::debug;

use crate::error::{ArrangeError, ArrangeResult};

/// Moves that cluster one resource's records into `[start, start + count)`.
///
/// The plan is computed from the container's owner table alone:
///
/// - `klass_offsets`: every position the resource occupies, ascending;
/// - `other_offsets`: positions inside the destination held by anything
///   else, which must move out;
/// - `new_offsets`: positions the resource vacates outside the
///   destination, which receive the displaced records.
///
/// `other_offsets` and `new_offsets` always have the same length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrangementPlan {
    pub owner: NameHash,
    pub start: u64,
    pub count: u64,
    pub klass_offsets: Vec<u64>,
    pub other_offsets: Vec<u64>,
    pub new_offsets: Vec<u64>,
}

impl ArrangementPlan {
    pub fn compute(owners: &[Option<NameHash>], owner: NameHash, start: u64) -> ArrangeResult<Self> {
        let klass_offsets: Vec<u64> = owners
            .iter()
            .enumerate()
            .filter(|(_, o)| **o == Some(owner))
            .map(|(i, _)| i as u64)
            .collect();
        let count = klass_offsets.len() as u64;
        let end = start + count;
        if end > owners.len() as u64 {
            return Err(ArrangeError::RangeOutOfBounds {
                start,
                end,
                len: owners.len() as u64,
            });
        }

        let other_offsets: Vec<u64> = (start..end)
            .filter(|&p| owners[p as usize] != Some(owner))
            .collect();
        let new_offsets: Vec<u64> = klass_offsets
            .iter()
            .copied()
            .filter(|&p| p < start || p >= end)
            .collect();
        debug_assert_eq!(other_offsets.len(), new_offsets.len());

        Ok(Self {
            owner,
            start,
            count,
            klass_offsets,
            other_offsets,
            new_offsets,
        })
    }

    /// Every `(from, to)` move of the plan, excluding records that stay put.
    ///
    /// The resource's records fill the destination in their original
    /// relative order; displaced records take the vacated positions in
    /// ascending order.
    pub fn moves(&self) -> Vec<(u64, u64)> {
        let klass = self
            .klass_offsets
            .iter()
            .enumerate()
            .map(|(i, &from)| (from, self.start + i as u64));
        let others = self
            .other_offsets
            .iter()
            .copied()
            .zip(self.new_offsets.iter().copied());
        klass.chain(others).filter(|(from, to)| from != to).collect()
    }

    /// Whether the resource already occupies its destination in order.
    pub fn is_noop(&self) -> bool {
        self.moves().is_empty()
    }

    /// Move the records and their owner tags. Returns the moves performed.
    pub fn apply(&self, container: &mut RecordContainer) -> ArrangeResult<Vec<(u64, u64)>> {
        let moves = self.moves();
        let mut staged = Vec::with_capacity(moves.len());
        for &(from, to) in &moves {
            staged.push((to, container.read_record(from)?, container.owner(from)?));
        }
        for (to, record, owner) in staged {
            container.write_record(to, &record)?;
            container.set_owner(to, owner)?;
        }
        debug!(
            container = container.name(),
            owner = %self.owner,
            start = self.start,
            count = self.count,
            moved = moves.len(),
            "applied arrangement plan"
        );
        Ok(moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pattern: &str) -> (Vec<Option<NameHash>>, NameHash, NameHash) {
        let a = NameHash::derive("A");
        let b = NameHash::derive("B");
        let owners = pattern
            .chars()
            .map(|c| match c {
                'a' => Some(a),
                'b' => Some(b),
                _ => None,
            })
            .collect();
        (owners, a, b)
    }

    #[test]
    fn displaced_and_vacated_sets_match() {
        let (owners, a, _) = tags("babab");
        let plan = ArrangementPlan::compute(&owners, a, 0).unwrap();
        assert_eq!(plan.klass_offsets, vec![1, 3]);
        assert_eq!(plan.count, 2);
        assert_eq!(plan.other_offsets, vec![0]);
        assert_eq!(plan.new_offsets, vec![3]);
        assert_eq!(plan.moves(), vec![(1, 0), (3, 1), (0, 3)]);
    }

    #[test]
    fn clustered_resource_needs_no_moves() {
        let (owners, a, b) = tags("aabb");
        assert!(ArrangementPlan::compute(&owners, a, 0).unwrap().is_noop());
        assert!(ArrangementPlan::compute(&owners, b, 2).unwrap().is_noop());
    }

    #[test]
    fn unclaimed_slots_count_as_foreign() {
        let (owners, a, _) = tags("-a-a");
        let plan = ArrangementPlan::compute(&owners, a, 0).unwrap();
        assert_eq!(plan.other_offsets, vec![0]);
        assert_eq!(plan.new_offsets, vec![3]);
    }

    #[test]
    fn destination_past_the_end_fails() {
        let (owners, a, _) = tags("ab");
        assert!(matches!(
            ArrangementPlan::compute(&owners, a, 2),
            Err(ArrangeError::RangeOutOfBounds { .. })
        ));
    }

    #[test]
    fn apply_moves_records_with_owner_tags() {
        let (owners, a, b) = tags("bab");
        let mut container = RecordContainer::in_memory("Mixed", 8);
        for (i, owner) in owners.iter().enumerate() {
            let offset = container.allocate(owner.unwrap()).unwrap();
            container.write_u64(offset, 0, i as u64 * 10).unwrap();
        }
        let plan = ArrangementPlan::compute(&container.owner_table(), a, 0).unwrap();
        plan.apply(&mut container).unwrap();

        assert_eq!(container.owner_table(), vec![Some(a), Some(b), Some(b)]);
        assert_eq!(container.read_u64(0, 0).unwrap(), 10);
        assert_eq!(container.read_u64(1, 0).unwrap(), 0);
        assert_eq!(container.read_u64(2, 0).unwrap(), 20);
    }
}
