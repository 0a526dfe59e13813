//! [`Communicator`] on top of `MPI_COMM_WORLD`.
use mpi_sys::*;
use serde::{Deserialize, Serialize};
use std::ffi::c_void;
use std::fmt::{self, Display};
use std::mem::MaybeUninit;
use std::os::raw::c_int;
use std::ptr;

use super::{Channel, Communicator, NetworkError, Tag};
use crate::prelude::*;
use crate::types::{HasDataType, WorkerId};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MPIError(c_int);

impl MPIError {
    fn new(code: c_int) -> Result<(), MPIError> {
        if code == MPI_SUCCESS as i32 {
            Ok(())
        } else {
            Err(Self(code))
        }
    }

    fn code(&self) -> c_int {
        self.0
    }

    fn message(&self) -> String {
        let mut buffer = Vec::<u8>::with_capacity(MPI_MAX_ERROR_STRING as usize);
        let mut n: c_int = 0;

        unsafe {
            if MPI_Error_string(self.0, buffer.as_mut_ptr() as *mut _, &mut n)
                == MPI_SUCCESS as i32
            {
                buffer.set_len(n as usize);
                String::from_utf8_lossy(&buffer).into_owned()
            } else {
                format!("error code {}", self.code())
            }
        }
    }
}

impl StdError for MPIError {}

impl Display for MPIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MPI error: {}", self.message())
    }
}

#[inline(always)]
fn mpi_check(code: c_int) -> Result<(), MPIError> {
    MPIError::new(code)
}

/// Communicator spanning all processes launched by `mpirun`. MPI is initialized on
/// construction and finalized on drop, so at most one instance may exist per process.
#[derive(Debug)]
pub struct MpiCommunicator {
    my_id: WorkerId,
    num_workers: usize,
    max_tag: Tag,
    communicator: MPI_Comm,
}

impl MpiCommunicator {
    pub fn initialize() -> Result<Self, NetworkError> {
        // Check threading level provided by MPI_Init_thread
        let required = MPI_THREAD_FUNNELED as c_int;
        let mut provided: u32 = !0;

        unsafe {
            mpi_check(MPI_Init_thread(
                &mut 0,
                &mut ptr::null_mut(),
                required,
                &mut provided as *mut u32 as *mut i32,
            ))?;
        }

        trace!("MPI_Init_thread returned level {}", provided);
        if ![
            MPI_THREAD_FUNNELED,
            MPI_THREAD_SERIALIZED,
            MPI_THREAD_MULTIPLE,
        ]
        .contains(&provided)
        {
            return Err(NetworkError::InvalidThreading);
        }

        // Perform barrier to make sure we are all on the same page.
        let communicator = unsafe { RSMPI_COMM_WORLD };
        unsafe {
            mpi_check(MPI_Barrier(communicator))?;
        }

        let mut rank: c_int = 0;
        let mut num_ranks: c_int = 0;
        unsafe {
            mpi_check(MPI_Comm_rank(communicator, &mut rank))?;
            mpi_check(MPI_Comm_size(communicator, &mut num_ranks))?;
        }

        // Get MPI_TAG_UB attribute
        let mut flag: c_int = 0;
        let mut max_tag_ptr: *const c_int = ptr::null();
        let max_tag = unsafe {
            mpi_check(MPI_Comm_get_attr(
                communicator,
                MPI_TAG_UB as _,
                &mut max_tag_ptr as *mut *const c_int as *mut c_void,
                &mut flag,
            ))?;

            if flag != 0 && !max_tag_ptr.is_null() {
                *max_tag_ptr
            } else {
                // Every MPI implementation must support at least this upper bound.
                32767
            }
        };

        debug!("MPI initialized: node {} of {}", rank, num_ranks);
        Ok(Self {
            my_id: WorkerId::new(rank as usize),
            num_workers: num_ranks as usize,
            max_tag: Tag(max_tag),
            communicator,
        })
    }

    /// Terminates every process of the communicator. Dropping instead would wait in
    /// `MPI_Barrier` for peers that may be blocked in a transfer with this process.
    pub fn abort(&self, code: c_int) -> ! {
        error!(
            "node {} aborting all {} processes",
            self.my_id, self.num_workers
        );

        unsafe {
            MPI_Abort(self.communicator, code);
        }

        std::process::exit(code)
    }

    fn check_valid_node(&self, peer: WorkerId) -> Result<(), NetworkError> {
        if peer.get() < self.num_workers {
            Ok(())
        } else {
            Err(NetworkError::InvalidRank(peer))
        }
    }

    fn check_tag_and_size(&self, tag: Tag, size: usize) -> Result<c_int, NetworkError> {
        if tag.0 < 0 || tag.0 > self.max_tag.0 {
            Err(NetworkError::InvalidTag(tag))
        } else {
            byte_count(size)
        }
    }

    fn status_count<T: HasDataType>(
        &self,
        status: &MPI_Status,
        tag: Tag,
    ) -> Result<(WorkerId, usize), NetworkError> {
        let peer = WorkerId::new(status.MPI_SOURCE as usize);
        let mut n: c_int = 0;

        unsafe {
            mpi_check(MPI_Get_count(status, RSMPI_UINT8_T, &mut n))?;
        }

        let bytes = n as usize;
        let size = T::size_in_bytes();

        if bytes % size != 0 {
            return Err(NetworkError::PartialElement {
                peer,
                channel: Channel::Tagged(tag),
                bytes,
                data_type: T::DATA_TYPE,
            });
        }

        Ok((peer, bytes / size))
    }
}

fn byte_count(size: usize) -> Result<c_int, NetworkError> {
    c_int::try_from(size).map_err(|_| NetworkError::MessageTooLarge(size))
}

impl Drop for MpiCommunicator {
    fn drop(&mut self) {
        unsafe {
            MPI_Barrier(self.communicator);
        }

        trace!("call MPI_Finalize");
        unsafe { MPI_Finalize() };
    }
}

impl Communicator for MpiCommunicator {
    fn my_id(&self) -> WorkerId {
        self.my_id
    }

    fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn broadcast<T: HasDataType>(
        &self,
        root: WorkerId,
        buffer: &mut [T],
    ) -> Result<(), NetworkError> {
        self.check_valid_node(root)?;

        // Agree on the element count first. MPI_Bcast requires matching counts on all
        // processes and would otherwise fail in implementation-defined ways.
        let mut count = buffer.len() as u64;
        unsafe {
            mpi_check(MPI_Bcast(
                &mut count as *mut u64 as *mut c_void,
                1,
                RSMPI_UINT64_T,
                root.get() as c_int,
                self.communicator,
            ))?;
        }

        if count != buffer.len() as u64 {
            return Err(NetworkError::SizeMismatch {
                peer: root,
                channel: Channel::Broadcast,
                expected: buffer.len(),
                actual: count as usize,
            });
        }

        let size = byte_count(buffer.len() * T::size_in_bytes())?;
        trace!("broadcast of {} bytes from node {}", size, root);

        unsafe {
            mpi_check(MPI_Bcast(
                buffer.as_mut_ptr() as *mut c_void,
                size,
                RSMPI_UINT8_T,
                root.get() as c_int,
                self.communicator,
            ))?;
        }

        Ok(())
    }

    fn send<T: HasDataType>(
        &self,
        dst: WorkerId,
        tag: Tag,
        buffer: &[T],
    ) -> Result<(), NetworkError> {
        self.check_valid_node(dst)?;
        let size = self.check_tag_and_size(tag, buffer.len() * T::size_in_bytes())?;

        trace!("send {} bytes to node {} (tag: {})", size, dst, tag);
        unsafe {
            mpi_check(MPI_Send(
                buffer.as_ptr() as *const c_void,
                size,
                RSMPI_UINT8_T,
                dst.get() as c_int,
                tag.0,
                self.communicator,
            ))?;
        }

        Ok(())
    }

    fn probe<T: HasDataType>(
        &self,
        src: Option<WorkerId>,
        tag: Tag,
    ) -> Result<(WorkerId, usize), NetworkError> {
        let source = match src {
            Some(src) => {
                self.check_valid_node(src)?;
                src.get() as c_int
            }
            None => unsafe { RSMPI_ANY_SOURCE },
        };
        self.check_tag_and_size(tag, 0)?;

        let status = unsafe {
            let mut status = MaybeUninit::<MPI_Status>::zeroed();
            mpi_check(MPI_Probe(
                source,
                tag.0,
                self.communicator,
                status.as_mut_ptr(),
            ))?;
            status.assume_init()
        };

        self.status_count::<T>(&status, tag)
    }

    fn recv<T: HasDataType>(
        &self,
        src: WorkerId,
        tag: Tag,
        buffer: &mut [T],
    ) -> Result<(), NetworkError> {
        let (_, actual) = self.probe::<T>(Some(src), tag)?;
        if actual != buffer.len() {
            return Err(NetworkError::SizeMismatch {
                peer: src,
                channel: Channel::Tagged(tag),
                expected: buffer.len(),
                actual,
            });
        }

        let size = self.check_tag_and_size(tag, buffer.len() * T::size_in_bytes())?;
        trace!("receive {} bytes from node {} (tag: {})", size, src, tag);

        unsafe {
            let mut status = MaybeUninit::<MPI_Status>::zeroed();
            mpi_check(MPI_Recv(
                buffer.as_mut_ptr() as *mut c_void,
                size,
                RSMPI_UINT8_T,
                src.get() as c_int,
                tag.0,
                self.communicator,
                status.as_mut_ptr(),
            ))?;
        }

        Ok(())
    }

    fn barrier(&self) -> Result<(), NetworkError> {
        unsafe {
            mpi_check(MPI_Barrier(self.communicator))?;
        }

        Ok(())
    }
}
