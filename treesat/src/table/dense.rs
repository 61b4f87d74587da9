use std::mem::size_of;
use std::ops::Range;

/// A flat array holding the weight of every assignment id of a range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenseSolution {
    offset: u64,
    values: Vec<f64>,
}

impl DenseSolution {
    /// Creates a solution with weight 0 for every id of the range.
    pub fn zeroed(range: &Range<u64>) -> Self {
        DenseSolution {
            offset: range.start,
            values: vec![0.0; (range.end - range.start) as usize],
        }
    }

    /// The bytes a dense solution over `len` ids occupies.
    #[inline]
    pub fn bytes_for(len: u64) -> u128 {
        len as u128 * size_of::<f64>() as u128
    }

    #[inline]
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.values.len() as u64
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn get(&self, id: u64) -> f64 {
        id.checked_sub(self.offset)
            .and_then(|index| self.values.get(index as usize))
            .copied()
            .unwrap_or(0.0)
    }

    /// Stores the weight of an id inside the range. Ids outside are ignored.
    #[inline]
    pub fn set(&mut self, id: u64, weight: f64) {
        if let Some(slot) = self.slot(id) {
            *slot = weight;
        }
    }

    #[inline]
    pub fn add(&mut self, id: u64, weight: f64) {
        if let Some(slot) = self.slot(id) {
            *slot += weight;
        }
    }

    fn slot(&mut self, id: u64) -> Option<&mut f64> {
        let index = id.checked_sub(self.offset)?;
        self.values.get_mut(index as usize)
    }

    /// All ids with a non-zero weight, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|&(_, &weight)| weight != 0.0)
            .map(|(index, &weight)| (self.offset + index as u64, weight))
    }

    pub fn size_bytes(&self) -> usize {
        self.values.len() * size_of::<f64>()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn access() {
        let mut solution = DenseSolution::zeroed(&(4..8));
        assert_eq!(solution.range(), 4..8);
        assert_eq!(solution.size_bytes(), 32);

        solution.set(5, 2.0);
        solution.add(5, 1.5);
        solution.add(7, 1.0);
        // outside of the range
        solution.set(8, 9.0);
        solution.add(1, 9.0);

        assert_eq!(solution.get(5), 3.5);
        assert_eq!(solution.get(4), 0.0);
        assert_eq!(solution.get(8), 0.0);
        assert_eq!(solution.get(0), 0.0);
        assert_eq!(solution.iter().collect::<Vec<_>>(), vec![(5, 3.5), (7, 1.0)]);
        assert_eq!(solution.values(), &[0.0, 3.5, 0.0, 1.0]);
    }
}
