use std::collections::BTreeMap;

use rod_store::RecordContainer;
use rod_types::{NameHash, RodId};
use tracing::info;

use crate::error::ArrangeResult;
use crate::plan::ArrangementPlan;
use crate::remap::IdRemap;

/// Result of one arrangement pass over a container.
#[derive(Clone, Debug, Default)]
pub struct Arrangement {
    pub plans: Vec<ArrangementPlan>,
    /// Every moved record of the container, old id to new id.
    pub remap: IdRemap,
    /// The same moves, split by the owner of each record.
    pub by_owner: BTreeMap<NameHash, IdRemap>,
}

impl Arrangement {
    /// Number of records that ended up at a different position.
    pub fn moved(&self) -> usize {
        self.remap.len()
    }

    pub fn remap_for(&self, owner: NameHash) -> Option<&IdRemap> {
        self.by_owner.get(&owner)
    }
}

/// Cluster every resource of `family` into consecutive runs, in the given
/// order. Records not owned by a family member end up after the last run.
pub fn arrange_container(
    container: &mut RecordContainer,
    family: &[NameHash],
) -> ArrangeResult<Arrangement> {
    let len = container.owner_table().len();
    // origin[p] is the original position of the record now at p
    let mut origin: Vec<u64> = (0..len as u64).collect();
    let mut plans = Vec::with_capacity(family.len());
    let mut start = 0;

    for &owner in family {
        let plan = ArrangementPlan::compute(&container.owner_table(), owner, start)?;
        let moves = plan.apply(container)?;
        let before = origin.clone();
        for (from, to) in moves {
            origin[to as usize] = before[from as usize];
        }
        start += plan.count;
        plans.push(plan);
    }

    let owners = container.owner_table();
    let mut arrangement = Arrangement {
        plans,
        ..Arrangement::default()
    };
    for (position, &original) in origin.iter().enumerate() {
        let position = position as u64;
        if position == original {
            continue;
        }
        let old = RodId::from_offset(original);
        let new = RodId::from_offset(position);
        arrangement.remap.insert(old, new);
        if let Some(owner) = owners[position as usize] {
            arrangement
                .by_owner
                .entry(owner)
                .or_default()
                .insert(old, new);
        }
    }

    info!(
        container = container.name(),
        resources = family.len(),
        moved = arrangement.moved(),
        "arranged container"
    );
    Ok(arrangement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rod_store::Container;

    /// Container whose records hold their original offset as payload.
    fn container(owners: &[usize], family: &[NameHash]) -> RecordContainer {
        let mut container = RecordContainer::in_memory("Family", 8);
        for (i, &owner) in owners.iter().enumerate() {
            let offset = container.allocate(family[owner]).unwrap();
            container.write_u64(offset, 0, i as u64).unwrap();
        }
        container
    }

    fn family(n: usize) -> Vec<NameHash> {
        (0..n).map(|i| NameHash::derive(&format!("R{i}"))).collect()
    }

    fn census(container: &RecordContainer) -> BTreeMap<NameHash, usize> {
        let mut counts = BTreeMap::new();
        for owner in container.owner_table().into_iter().flatten() {
            *counts.entry(owner).or_insert(0) += 1;
        }
        counts
    }

    fn check_invariant(owners: &[usize], n: usize) {
        let family = family(n);
        let mut container = container(owners, &family);
        let before = census(&container);

        let arrangement = arrange_container(&mut container, &family).unwrap();

        // multiset of owners is unchanged
        assert_eq!(census(&container), before);

        // each resource is one contiguous run, in family order
        let table = container.owner_table();
        let mut position = 0;
        for owner in &family {
            let count = before.get(owner).copied().unwrap_or(0);
            for p in position..position + count {
                assert_eq!(table[p], Some(*owner));
            }
            position += count;
        }

        // every old id resolves to the record it used to name
        for original in 0..owners.len() as u64 {
            let new = arrangement.remap.get(RodId::from_offset(original));
            let offset = new.offset().unwrap();
            assert_eq!(container.read_u64(offset, 0).unwrap(), original);
            assert_eq!(table[offset as usize], Some(family[owners[original as usize]]));
        }
    }

    #[test]
    fn interleaved_family_is_clustered() {
        check_invariant(&[1, 0, 2, 0, 1, 2, 2, 0], 3);
    }

    #[test]
    fn already_clustered_family_does_not_move() {
        let family = family(2);
        let mut container = container(&[0, 0, 1, 1, 1], &family);
        let arrangement = arrange_container(&mut container, &family).unwrap();
        assert_eq!(arrangement.moved(), 0);
        assert!(arrangement.plans.iter().all(ArrangementPlan::is_noop));
    }

    #[test]
    fn remap_is_split_by_owner() {
        let family = family(2);
        let mut container = container(&[1, 0], &family);
        let arrangement = arrange_container(&mut container, &family).unwrap();
        let first = arrangement.remap_for(family[0]).unwrap();
        let second = arrangement.remap_for(family[1]).unwrap();
        assert_eq!(first.get(RodId::new(2)), RodId::new(1));
        assert_eq!(second.get(RodId::new(1)), RodId::new(2));
    }

    #[test]
    fn seeded_random_layouts() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let n = rng.gen_range(1..5);
            let len = rng.gen_range(0..40);
            let owners: Vec<usize> = (0..len).map(|_| rng.gen_range(0..n)).collect();
            check_invariant(&owners, n);
        }
    }

    proptest! {
        #[test]
        fn any_layout_is_clustered(owners in proptest::collection::vec(0usize..4, 0..64)) {
            check_invariant(&owners, 4);
        }
    }
}
