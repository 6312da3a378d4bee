use std::collections::BTreeMap;

use rod_types::RodId;

/// Mapping of moved record identifiers, old to new.
///
/// Identifiers that did not move are absent and map to themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdRemap {
    moves: BTreeMap<RodId, RodId>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: RodId, new: RodId) {
        if old != new {
            self.moves.insert(old, new);
        }
    }

    /// Current identifier of the record once known as `old`.
    pub fn get(&self, old: RodId) -> RodId {
        self.moves.get(&old).copied().unwrap_or(old)
    }

    /// Like [`IdRemap::get`] but `None` when the record did not move.
    pub fn moved(&self, old: RodId) -> Option<RodId> {
        self.moves.get(&old).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RodId, RodId)> + '_ {
        self.moves.iter().map(|(o, n)| (*o, *n))
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmoved_ids_map_to_themselves() {
        let mut remap = IdRemap::new();
        remap.insert(RodId::new(1), RodId::new(4));
        remap.insert(RodId::new(2), RodId::new(2));
        assert_eq!(remap.len(), 1);
        assert_eq!(remap.get(RodId::new(1)), RodId::new(4));
        assert_eq!(remap.get(RodId::new(2)), RodId::new(2));
        assert_eq!(remap.moved(RodId::new(2)), None);
        assert_eq!(remap.get(RodId::NULL), RodId::NULL);
    }
}
