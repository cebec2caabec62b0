//! Operation selection

use crate::config::OperationSelection;
use crate::error::OpKind;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Picks the operations to run over each generated range
pub struct OperationSelector {
    selection: OperationSelection,
    /// Cumulative weights for weighted selection
    cumulative: Vec<(u64, OpKind)>,
    total_weight: u64,
    batch: Vec<OpKind>,
    rng: Xoshiro256PlusPlus,
}

impl OperationSelector {
    pub fn new(selection: OperationSelection, seed: u64) -> Self {
        let mut cumulative = Vec::new();
        let mut total_weight = 0u64;
        if let OperationSelection::Weighted { weights } = &selection {
            for w in weights.iter().filter(|w| w.weight > 0) {
                total_weight += w.weight as u64;
                cumulative.push((total_weight, w.op));
            }
        }

        Self {
            selection,
            cumulative,
            total_weight,
            batch: Vec::with_capacity(4),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// Operations to run, in order, over the next range
    ///
    /// A rotation yields all of its operations; fixed and weighted selection
    /// yield exactly one.
    #[inline]
    pub fn next_ops(&mut self) -> &[OpKind] {
        self.batch.clear();
        match &self.selection {
            OperationSelection::Fixed { op } => self.batch.push(*op),
            OperationSelection::Rotation { ops } => self.batch.extend_from_slice(ops),
            OperationSelection::Weighted { .. } => {
                if self.total_weight > 0 {
                    let roll = self.rng.gen_range(0..self.total_weight);
                    let op = self
                        .cumulative
                        .iter()
                        .find(|(bound, _)| roll < *bound)
                        .map(|(_, op)| *op);
                    self.batch.extend(op);
                }
            }
        }
        &self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpWeight;
    use std::collections::HashMap;

    #[test]
    fn test_fixed() {
        let mut selector =
            OperationSelector::new(OperationSelection::Fixed { op: OpKind::Discard }, 1);
        for _ in 0..10 {
            assert_eq!(selector.next_ops(), &[OpKind::Discard]);
        }
    }

    #[test]
    fn test_rotation_yields_all_in_order() {
        let mut selector = OperationSelector::new(
            OperationSelection::Rotation {
                ops: vec![OpKind::Write, OpKind::Read],
            },
            1,
        );
        assert_eq!(selector.next_ops(), &[OpKind::Write, OpKind::Read]);
        assert_eq!(selector.next_ops(), &[OpKind::Write, OpKind::Read]);
    }

    #[test]
    fn test_weighted_distribution() {
        let mut selector = OperationSelector::new(
            OperationSelection::Weighted {
                weights: vec![
                    OpWeight::new(OpKind::Read, 40),
                    OpWeight::new(OpKind::Write, 40),
                    OpWeight::new(OpKind::Truncate, 20),
                    OpWeight::new(OpKind::Discard, 0),
                ],
            },
            42,
        );

        let mut counts: HashMap<OpKind, u32> = HashMap::new();
        for _ in 0..10_000 {
            let ops = selector.next_ops();
            assert_eq!(ops.len(), 1);
            *counts.entry(ops[0]).or_default() += 1;
        }

        assert!(!counts.contains_key(&OpKind::Discard));
        let truncates = counts[&OpKind::Truncate];
        assert!((1500..2500).contains(&truncates), "truncates: {}", truncates);
        let reads = counts[&OpKind::Read];
        assert!((3500..4500).contains(&reads), "reads: {}", reads);
    }

    #[test]
    fn test_weighted_is_seeded() {
        let selection = OperationSelection::Weighted {
            weights: vec![OpWeight::new(OpKind::Read, 1), OpWeight::new(OpKind::Write, 1)],
        };
        let mut a = OperationSelector::new(selection.clone(), 5);
        let mut b = OperationSelector::new(selection, 5);
        for _ in 0..100 {
            assert_eq!(a.next_ops().to_vec(), b.next_ops().to_vec());
        }
    }
}
