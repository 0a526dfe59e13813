pub(crate) use matbench_core::prelude::*;
pub(crate) use parking_lot::Mutex;
