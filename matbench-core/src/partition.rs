//! Static row partitioning shared by every participant.
//!
//! Every worker derives its own row range from `(n, num_workers, rank)` without any
//! communication. The coordinator uses the very same routine to decode where an incoming
//! block belongs, so this module is the only place where the formula may live.
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::ops::Range;
use thiserror::Error;

use crate::info::WorkerId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("group size must be at least one")]
    EmptyGroup,

    #[error("rank {rank} is out of range for a group of {num_workers} workers")]
    RankOutOfRange { rank: WorkerId, num_workers: usize },
}

/// Half-open range of rows `[start, end)` owned by one worker.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Partition {
    pub start: usize,
    pub end: usize,
}

impl Partition {
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "invalid partition {}..{}", start, end);
        Self { start, end }
    }

    /// Shorthand for `Partitioning::new(n, num_workers)?.partition(rank)`.
    pub fn for_rank(
        n: usize,
        num_workers: usize,
        rank: WorkerId,
    ) -> Result<Self, PartitionError> {
        Partitioning::new(n, num_workers)?.partition(rank)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Range of elements covered by these rows in a row-major `n`x`n` buffer.
    pub fn element_range(&self, n: usize) -> Range<usize> {
        (self.start * n)..(self.end * n)
    }

    pub fn element_count(&self, n: usize) -> usize {
        self.len() * n
    }
}

impl Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Partition({}..{})", self.start, self.end)
    }
}

impl Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows {}..{}", self.start, self.end)
    }
}

/// The partitioning of `n` rows over `num_workers` workers.
///
/// With `base = n / num_workers` and `extra = n % num_workers`, rank `r` owns
/// `[r * base + min(r, extra), start + base + (r < extra))`. The lowest `extra` ranks thus
/// get one row more than the others.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Partitioning {
    n: usize,
    num_workers: usize,
    base: usize,
    extra: usize,
}

impl Partitioning {
    pub fn new(n: usize, num_workers: usize) -> Result<Self, PartitionError> {
        if num_workers == 0 {
            return Err(PartitionError::EmptyGroup);
        }

        Ok(Self {
            n,
            num_workers,
            base: n / num_workers,
            extra: n % num_workers,
        })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn partition(&self, rank: WorkerId) -> Result<Partition, PartitionError> {
        let r = rank.get();
        if r >= self.num_workers {
            return Err(PartitionError::RankOutOfRange {
                rank,
                num_workers: self.num_workers,
            });
        }

        Ok(self.bounds(r))
    }

    fn bounds(&self, r: usize) -> Partition {
        let start = r * self.base + usize::min(r, self.extra);
        let end = start + self.base + (r < self.extra) as usize;

        Partition { start, end }
    }

    /// All partitions in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (WorkerId, Partition)> + '_ {
        (0..self.num_workers).map(move |r| (WorkerId::new(r), self.bounds(r)))
    }

    /// Returns the rank that owns the given row, or `None` if `row >= n`.
    pub fn owner(&self, row: usize) -> Option<WorkerId> {
        if row >= self.n {
            return None;
        }

        let large_rows = self.extra * (self.base + 1);
        let rank = if row < large_rows {
            row / (self.base + 1)
        } else {
            // base > 0 here, otherwise all rows would lie in the large partitions.
            self.extra + (row - large_rows) / self.base
        };

        Some(WorkerId::new(rank))
    }
}
