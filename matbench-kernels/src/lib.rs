pub use host::matmul::{host_matmul, host_matmul_into, reference_matmul, KernelError};

mod host;
