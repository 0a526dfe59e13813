//! The per-size protocol executed in lock-step by every worker of the group.
//!
//! 1. The coordinator replicates A and B to every worker ([`distribute`]).
//! 2. Every worker multiplies its own partition of rows ([`compute`]).
//! 3. The blocks are gathered into the coordinator's copy of C ([`collect`]).
//!
//! The row partitioning is never exchanged: every worker derives it from
//! [`Partitioning`](crate::types::Partitioning).
mod collect;
mod distribute;

use matbench_kernels::{host_matmul_into, KernelError};
use std::time::{Duration, Instant};

use crate::network::{Communicator, NetworkError};
use crate::prelude::*;
use crate::types::{Matrix, Partition, PartitionError, WorkerId};

pub use self::collect::{collect, CollectOrder};
pub use self::distribute::distribute;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("{0}")]
    Partition(#[from] PartitionError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("coordinator {rank} was not given any input matrices")]
    MissingInputs { rank: WorkerId },

    #[error("input matrix is {actual}x{actual}, expected {expected}x{expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "block from rank {rank} holds {actual} elements, expected {expected} for {partition}"
    )]
    BlockSizeMismatch {
        rank: WorkerId,
        partition: Partition,
        expected: usize,
        actual: usize,
    },

    #[error("received unexpected block from rank {rank}")]
    UnexpectedBlock { rank: WorkerId },
}

/// Wall time spent in each phase of [`multiply`] by one worker.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct PhaseTimings {
    pub distribute: Duration,
    pub compute: Duration,
    pub collect: Duration,
}

#[derive(Debug)]
pub struct Multiplication {
    /// The assembled product; only present on the coordinator.
    pub result: Option<Matrix<i64>>,
    /// The rows computed by this worker.
    pub partition: Partition,
    pub timings: PhaseTimings,
}

/// Multiplies the local partition of rows. Returns the partition and a zero-filled `n`x`n`
/// matrix in which only those rows have been written.
pub fn compute<C: Communicator>(
    comm: &C,
    a: &Matrix<i32>,
    b: &Matrix<i32>,
) -> Result<(Partition, Matrix<i64>), ProtocolError> {
    let n = a.dim();
    let partition = Partition::for_rank(n, comm.num_workers(), comm.my_id())?;
    let mut c = Matrix::zeros(n);

    debug!("node {} computing {}", comm.my_id(), partition);
    host_matmul_into(a, b, partition, &mut c)?;

    Ok((partition, c))
}

/// Runs the full protocol for one `n`x`n` product.
///
/// The coordinator must pass `Some((a, b))`, all other workers pass `None`. Every worker
/// must be called with the same `n` and `order`.
pub fn multiply<C: Communicator>(
    comm: &C,
    n: usize,
    inputs: Option<(Matrix<i32>, Matrix<i32>)>,
    order: CollectOrder,
) -> Result<Multiplication, ProtocolError> {
    let mut timings = PhaseTimings::default();

    let before = Instant::now();
    let (a, b) = distribute(comm, n, inputs)?;
    timings.distribute = before.elapsed();

    let before = Instant::now();
    let (partition, mut c) = compute(comm, &a, &b)?;
    timings.compute = before.elapsed();

    // A and B are no longer needed.
    drop((a, b));

    let before = Instant::now();
    collect(comm, &mut c, order)?;
    timings.collect = before.elapsed();

    let result = if comm.is_coordinator() { Some(c) } else { None };

    Ok(Multiplication {
        result,
        partition,
        timings,
    })
}
