//! 📐 Batch Planner: arithmetic, but make it load-bearing.
//!
//! Given `total` records and a `batch_size`, answer three questions for any index:
//! which batch is it in, does a batch close right after it, and what ordinal does
//! that batch get in the `[ordinal/total]` marker.
//!
//! Membership is `index / batch_size`. A batch closes after its last member, which is
//! either the record that fills it or the very last record of the run. No record is
//! ever left behind in an unflushed buffer. 🦆

use std::ops::Range;

use anyhow::{Result, bail};

/// 📐 The whole plan, as two numbers. Everything else is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    total: usize,
    batch_size: usize,
}

/// 🚪 "Close the batch after this record."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBoundary {
    /// 1-based position of the closing batch.
    pub ordinal: usize,
    pub total_batches: usize,
    /// True only for the boundary forced by the last record.
    pub is_final: bool,
}

impl BatchPlan {
    pub fn new(total: usize, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            bail!("💀 batch_size must be at least 1. A batch of zero movies is a very short film.");
        }
        Ok(Self { total, batch_size })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn total_batches(&self) -> usize {
        self.total.div_ceil(self.batch_size)
    }

    /// 0-based batch index for a record.
    pub fn batch_of(&self, index: usize) -> usize {
        index / self.batch_size
    }

    /// Returns the boundary that closes after `index`, if any.
    pub fn boundary(&self, index: usize) -> Option<BatchBoundary> {
        if index >= self.total {
            return None;
        }
        let is_final = index + 1 == self.total;
        let fills_batch = (index + 1) % self.batch_size == 0;
        if !(is_final || fills_batch) {
            return None;
        }
        Some(BatchBoundary {
            ordinal: self.batch_of(index) + 1,
            total_batches: self.total_batches(),
            is_final,
        })
    }

    /// Half-open record range of every batch, in order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.total_batches()).map(move |batch| {
            let start = batch * self.batch_size;
            start..(start + self.batch_size).min(self.total)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_256_movies_need_exactly_two_trips() -> Result<()> {
        let the_plan = BatchPlan::new(256, 255)?;
        let the_boundaries: Vec<(usize, BatchBoundary)> = (0..256)
            .filter_map(|i| the_plan.boundary(i).map(|b| (i, b)))
            .collect();

        assert_eq!(the_plan.total_batches(), 2);
        assert_eq!(the_boundaries.len(), 2);
        assert_eq!(the_boundaries[0].0, 254, "first batch closes on its 255th member");
        assert_eq!(the_boundaries[0].1.ordinal, 1);
        assert!(!the_boundaries[0].1.is_final);
        assert_eq!(the_boundaries[1].0, 255);
        assert_eq!(the_boundaries[1].1.ordinal, 2);
        assert!(the_boundaries[1].1.is_final);

        let the_sizes: Vec<usize> = the_plan.ranges().map(|r| r.len()).collect();
        assert_eq!(the_sizes, vec![255, 1]);
        Ok(())
    }

    #[test]
    fn the_one_where_every_shape_partitions_cleanly() -> Result<()> {
        // 🧪 brute force over small shapes; the arithmetic has nowhere to hide
        for total in 0..120 {
            for batch_size in 1..17 {
                let the_plan = BatchPlan::new(total, batch_size)?;
                let the_boundaries: Vec<usize> =
                    (0..total).filter(|&i| the_plan.boundary(i).is_some()).collect();

                assert_eq!(the_boundaries.len(), total.div_ceil(batch_size));
                if total > 0 {
                    assert_eq!(the_boundaries.last(), Some(&(total - 1)));
                    let the_last = the_plan.boundary(total - 1).expect("last record closes");
                    assert!(the_last.is_final);
                    assert_eq!(the_last.ordinal, the_plan.total_batches());
                }

                // ✅ ranges cover [0, total) with no gaps and no overlap
                let mut next = 0;
                for (batch, range) in the_plan.ranges().enumerate() {
                    assert_eq!(range.start, next);
                    assert!(!range.is_empty());
                    for i in range.clone() {
                        assert_eq!(the_plan.batch_of(i), batch);
                    }
                    next = range.end;
                }
                assert_eq!(next, total);
            }
        }
        Ok(())
    }

    #[test]
    fn the_one_where_exact_multiples_dont_get_a_ghost_batch() -> Result<()> {
        let the_plan = BatchPlan::new(510, 255)?;
        assert_eq!(the_plan.total_batches(), 2);
        assert_eq!(the_plan.boundary(254).map(|b| b.ordinal), Some(1));
        assert_eq!(the_plan.boundary(509).map(|b| b.ordinal), Some(2));
        assert_eq!(the_plan.boundary(510), None, "out of range is not a boundary");
        Ok(())
    }

    #[test]
    fn the_one_where_zero_batch_size_is_refused() {
        assert!(BatchPlan::new(10, 0).is_err());
    }

    #[test]
    fn the_one_where_an_empty_run_plans_nothing() -> Result<()> {
        let the_plan = BatchPlan::new(0, 255)?;
        assert_eq!(the_plan.total_batches(), 0);
        assert_eq!(the_plan.ranges().count(), 0);
        assert_eq!(the_plan.boundary(0), None);
        Ok(())
    }
}
