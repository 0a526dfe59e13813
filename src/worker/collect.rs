use std::str::FromStr;

use crate::network::{Communicator, RESULT_TAG};
use crate::prelude::*;
use crate::types::{ConfigError, Matrix, Partition, Partitioning, WorkerId};
use crate::worker::ProtocolError;

/// Order in which the coordinator receives the blocks of the other workers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CollectOrder {
    /// Block on every worker in turn, from rank 1 upwards.
    RankOrder,
    /// Take blocks as they arrive. Every block is still placed according to its sender's rank.
    Arrival,
}

impl Default for CollectOrder {
    fn default() -> Self {
        CollectOrder::RankOrder
    }
}

impl FromStr for CollectOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim() {
            "rank" | "" => Ok(CollectOrder::RankOrder),
            "arrival" => Ok(CollectOrder::Arrival),
            other => Err(ConfigError::UnknownCollectOrder(other.to_string())),
        }
    }
}

/// Gathers the row blocks of `c` onto the coordinator.
///
/// Every other worker sends the rows of its own partition; the coordinator writes each
/// received block at the offset of the sender's partition. Empty partitions are neither
/// sent nor expected.
pub fn collect<C: Communicator>(
    comm: &C,
    c: &mut Matrix<i64>,
    order: CollectOrder,
) -> Result<(), ProtocolError> {
    let parts = Partitioning::new(c.dim(), comm.num_workers())?;

    if !comm.is_coordinator() {
        let partition = parts.partition(comm.my_id())?;
        return send_block(comm, c, partition);
    }

    match order {
        CollectOrder::RankOrder => {
            for (rank, partition) in expected_blocks(&parts) {
                let (_, count) = comm.probe::<i64>(Some(rank), RESULT_TAG)?;
                receive_block(comm, c, rank, partition, count)?;
            }
        }
        CollectOrder::Arrival => {
            let mut remaining = expected_blocks(&parts).collect::<HashMap<_, _>>();

            while !remaining.is_empty() {
                let (rank, count) = comm.probe::<i64>(None, RESULT_TAG)?;
                let partition = remaining
                    .remove(&rank)
                    .ok_or(ProtocolError::UnexpectedBlock { rank })?;

                receive_block(comm, c, rank, partition, count)?;
            }
        }
    }

    Ok(())
}

/// Workers other than the coordinator that own at least one row.
fn expected_blocks(parts: &Partitioning) -> impl Iterator<Item = (WorkerId, Partition)> + '_ {
    parts
        .iter()
        .filter(|(rank, partition)| !rank.is_coordinator() && !partition.is_empty())
}

fn send_block<C: Communicator>(
    comm: &C,
    c: &Matrix<i64>,
    partition: Partition,
) -> Result<(), ProtocolError> {
    if partition.is_empty() {
        trace!("node {} owns no rows, nothing to send", comm.my_id());
        return Ok(());
    }

    trace!("node {} sending {}", comm.my_id(), partition);
    comm.send(WorkerId::COORDINATOR, RESULT_TAG, c.rows(partition))?;
    Ok(())
}

fn receive_block<C: Communicator>(
    comm: &C,
    c: &mut Matrix<i64>,
    rank: WorkerId,
    partition: Partition,
    count: usize,
) -> Result<(), ProtocolError> {
    let expected = partition.element_count(c.dim());
    if count != expected {
        return Err(ProtocolError::BlockSizeMismatch {
            rank,
            partition,
            expected,
            actual: count,
        });
    }

    trace!("receiving {} from node {}", partition, rank);
    comm.recv(rank, RESULT_TAG, c.rows_mut(partition))?;
    Ok(())
}
