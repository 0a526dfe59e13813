//! Point-to-point and collective transfers between the workers of a fixed-size group.
mod local;
mod message;
#[cfg(feature = "mpi")]
mod mpi;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::os::raw::c_int;

use crate::prelude::*;
use crate::types::{DataType, HasDataType, WorkerId};

pub use self::local::{execute_local, LocalCommunicator};
#[cfg(feature = "mpi")]
pub use self::mpi::{MPIError, MpiCommunicator};

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag(pub c_int);

impl Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Tag used by every worker to send its block of the result to the coordinator.
pub const RESULT_TAG: Tag = Tag(0);

/// The logical channel a message travels on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Broadcast,
    Barrier,
    Tagged(Tag),
}

impl Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Broadcast => f.write_str("broadcast"),
            Channel::Barrier => f.write_str("barrier"),
            Channel::Tagged(tag) => write!(f, "tag {}", tag),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[cfg(feature = "mpi")]
    #[error("{0}")]
    MPI(#[from] MPIError),

    #[error("support for MPI_THREAD_FUNNELED or higher is required")]
    InvalidThreading,

    #[error("a group requires at least one worker")]
    EmptyGroup,

    #[error("node {0} does not exist")]
    InvalidRank(WorkerId),

    #[error("tag {0} is not a valid tag")]
    InvalidTag(Tag),

    #[error("message of size {0} exceeds maximum message size")]
    MessageTooLarge(usize),

    #[error(
        "message from node {peer} ({channel}) holds {actual} elements, expected {expected}"
    )]
    SizeMismatch {
        peer: WorkerId,
        channel: Channel,
        expected: usize,
        actual: usize,
    },

    #[error("message from node {peer} ({channel}) holds {actual} data, expected {expected}")]
    TypeMismatch {
        peer: WorkerId,
        channel: Channel,
        expected: DataType,
        actual: DataType,
    },

    #[error("message from node {peer} ({channel}) holds {bytes} bytes, not a multiple of {data_type}")]
    PartialElement {
        peer: WorkerId,
        channel: Channel,
        bytes: usize,
        data_type: DataType,
    },

    #[error("message from node {peer} has unknown data type {raw}")]
    UnknownDataType { peer: WorkerId, raw: u8 },

    #[error("node {0} left the group")]
    PeerLeft(WorkerId),

    #[error("connection was closed")]
    Disconnected,
}

impl NetworkError {
    /// Whether this error only reflects that another worker stopped participating.
    pub fn is_departure(&self) -> bool {
        matches!(self, NetworkError::PeerLeft(_) | NetworkError::Disconnected)
    }
}

/// A participant in a fixed-size group of workers.
///
/// All operations block the calling worker. Receiving operations never truncate: a message
/// whose element count or element type differs from what the receiver expects results in
/// an error.
pub trait Communicator {
    fn my_id(&self) -> WorkerId;

    fn num_workers(&self) -> usize;

    fn is_coordinator(&self) -> bool {
        self.my_id().is_coordinator()
    }

    /// Replicates `buffer` of worker `root` into `buffer` of every other worker. Every worker
    /// must pass a buffer of the same length.
    fn broadcast<T: HasDataType>(&self, root: WorkerId, buffer: &mut [T])
        -> Result<(), NetworkError>;

    fn send<T: HasDataType>(&self, dst: WorkerId, tag: Tag, buffer: &[T])
        -> Result<(), NetworkError>;

    /// Blocks until a message with the given tag is available from `src` (or from any
    /// worker if `src` is `None`) without receiving it. Returns the sender and the number of
    /// elements of type `T` in the message.
    fn probe<T: HasDataType>(
        &self,
        src: Option<WorkerId>,
        tag: Tag,
    ) -> Result<(WorkerId, usize), NetworkError>;

    fn recv<T: HasDataType>(&self, src: WorkerId, tag: Tag, buffer: &mut [T])
        -> Result<(), NetworkError>;

    fn barrier(&self) -> Result<(), NetworkError>;
}
