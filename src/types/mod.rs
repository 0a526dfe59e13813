//! Common types used throughout the benchmark.
mod config;

pub use matbench_core::info::*;
pub use matbench_core::{
    DataType, HasDataType, Matrix, MatrixError, Partition, PartitionError, Partitioning,
};

pub use self::config::*;
