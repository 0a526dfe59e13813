use crate::network::Communicator;
use crate::prelude::*;
use crate::types::{Matrix, WorkerId};
use crate::worker::ProtocolError;

/// Replicates the coordinator's A and B to every worker.
///
/// On return every worker holds copies identical to the coordinator's matrices. The call
/// ends with a barrier, so no worker leaves before all workers hold the data.
pub fn distribute<C: Communicator>(
    comm: &C,
    n: usize,
    inputs: Option<(Matrix<i32>, Matrix<i32>)>,
) -> Result<(Matrix<i32>, Matrix<i32>), ProtocolError> {
    let (mut a, mut b) = if comm.is_coordinator() {
        let (a, b) = inputs.ok_or(ProtocolError::MissingInputs {
            rank: comm.my_id(),
        })?;

        for m in [&a, &b].iter() {
            if m.dim() != n {
                return Err(ProtocolError::DimensionMismatch {
                    expected: n,
                    actual: m.dim(),
                });
            }
        }

        (a, b)
    } else {
        (Matrix::zeros(n), Matrix::zeros(n))
    };

    // Nothing to replicate: every worker already holds the (empty) inputs.
    if n == 0 || comm.num_workers() == 1 {
        return Ok((a, b));
    }

    debug!("node {} replicating {}x{} inputs", comm.my_id(), n, n);
    comm.broadcast(WorkerId::COORDINATOR, a.as_mut_slice())?;
    comm.broadcast(WorkerId::COORDINATOR, b.as_mut_slice())?;
    comm.barrier()?;

    Ok((a, b))
}
