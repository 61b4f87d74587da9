use num::{BigInt, FromPrimitive};
use serde::Serialize;

/// Counters of a single run, returned with its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Join operations, one per join bag.
    pub joins: usize,
    /// Introduce-forget operations, one per leaf or single-child bag plus the projection of
    /// the root.
    pub introduce_forgets: usize,
    /// Bytes of the largest table that was computed.
    pub max_table_size: usize,
    /// Calls into the compute backend.
    pub dispatches: usize,
    /// The largest sum of table bytes held at once.
    pub peak_live_bytes: usize,
    /// The largest number of bytes reserved on the device at once.
    pub peak_device_bytes: usize,
}

impl Statistics {
    pub(crate) fn record_table(&mut self, bytes: usize) {
        self.max_table_size = self.max_table_size.max(bytes);
    }
}

/// A weight became too large for `f64` while computing a bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Overflow {
    /// The label of the first bag whose table holds a non-finite weight.
    pub bag: usize,
}

/// The outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolveReport {
    pub satisfiable: bool,
    pub model_count: f64,
    pub overflow: Option<Overflow>,
    pub statistics: Statistics,
}

impl SolveReport {
    /// The model count as an integer, if it is one.
    ///
    /// # Example
    /// ```
    /// use treesat::{SolveReport, Statistics};
    ///
    /// let report = SolveReport {
    ///     satisfiable: true,
    ///     model_count: 2f64.powi(70),
    ///     overflow: None,
    ///     statistics: Statistics::default(),
    /// };
    /// assert_eq!(report.exact_count().unwrap().to_string(), "1180591620717411303424");
    /// ```
    pub fn exact_count(&self) -> Option<BigInt> {
        if !self.model_count.is_finite() || self.model_count.fract() != 0.0 {
            return None;
        }
        BigInt::from_f64(self.model_count)
    }
}

/// The life cycle of the table of a single bag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum BagStatus {
    /// Not computed yet.
    #[default]
    Pending,
    /// The output range with the given index is being dispatched.
    ChunkDispatch(usize),
    /// All chunks are computed, the table waits for its parent.
    Combined,
    /// The parent consumed the table.
    Released,
}

#[cfg(test)]
mod test {
    use super::*;

    fn report(model_count: f64) -> SolveReport {
        SolveReport {
            satisfiable: model_count > 0.0,
            model_count,
            overflow: None,
            statistics: Statistics::default(),
        }
    }

    #[test]
    fn exact_counts() {
        assert_eq!(report(3.0).exact_count(), Some(BigInt::from(3)));
        assert_eq!(report(0.0).exact_count(), Some(BigInt::from(0)));
        assert_eq!(report(0.25).exact_count(), None);
        assert_eq!(report(f64::INFINITY).exact_count(), None);
        assert_eq!(report(f64::NAN).exact_count(), None);
    }
}
