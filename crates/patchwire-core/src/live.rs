//! Live parameter values for inspection.
//!
//! The block path stores each resolved parameter value into a fixed table of
//! atomic cells; UI collaborators read it through a cloned handle. Stores and
//! loads are single relaxed atomic operations, so neither side ever waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::param_info::ParamId;

/// Shared table of the most recently resolved parameter values.
///
/// Clones share the same cells.
#[derive(Debug, Clone)]
pub struct LiveValues {
    ids: Arc<[ParamId]>,
    cells: Arc<[AtomicU32]>,
}

impl LiveValues {
    /// One cell per id, in order, each starting at its initial value.
    pub fn new(entries: impl IntoIterator<Item = (ParamId, f32)>) -> Self {
        let (ids, values): (Vec<ParamId>, Vec<f32>) = entries.into_iter().unzip();
        Self {
            ids: ids.into(),
            cells: values.into_iter().map(|v| AtomicU32::new(v.to_bits())).collect(),
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the table has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Stores a value by slot. Out-of-range slots are ignored.
    #[inline]
    pub fn store(&self, slot: usize, value: f32) {
        if let Some(cell) = self.cells.get(slot) {
            cell.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Loads a value by slot.
    #[inline]
    pub fn load(&self, slot: usize) -> Option<f32> {
        self.cells
            .get(slot)
            .map(|cell| f32::from_bits(cell.load(Ordering::Relaxed)))
    }

    /// Slot of a parameter id.
    pub fn slot(&self, id: ParamId) -> Option<usize> {
        self.ids.iter().position(|&candidate| candidate == id)
    }

    /// Latest value of a parameter.
    pub fn get(&self, id: ParamId) -> Option<f32> {
        self.slot(id).and_then(|slot| self.load(slot))
    }

    /// `(id, value)` pairs in slot order.
    pub fn snapshot(&self) -> Vec<(ParamId, f32)> {
        self.ids
            .iter()
            .zip(self.cells.iter())
            .map(|(&id, cell)| (id, f32::from_bits(cell.load(Ordering::Relaxed))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cells() {
        let live = LiveValues::new([(ParamId(1), 0.5), (ParamId(7), 2.0)]);
        let ui = live.clone();
        live.store(1, 3.5);
        assert_eq!(ui.get(ParamId(7)), Some(3.5));
        assert_eq!(ui.get(ParamId(1)), Some(0.5));
    }

    #[test]
    fn unknown_ids_and_slots() {
        let live = LiveValues::new([(ParamId(1), 0.0)]);
        live.store(5, 1.0);
        assert_eq!(live.load(5), None);
        assert_eq!(live.get(ParamId(2)), None);
        assert_eq!(live.snapshot(), vec![(ParamId(1), 0.0)]);
    }
}
