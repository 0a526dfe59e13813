use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Identity of a participant within the fixed-size group. Rank 0 is the coordinator.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
pub struct WorkerId(pub usize);

impl WorkerId {
    pub const COORDINATOR: WorkerId = WorkerId(0);

    pub fn new(i: usize) -> Self {
        WorkerId(i)
    }

    pub fn get(&self) -> usize {
        self.0
    }

    pub fn is_coordinator(&self) -> bool {
        *self == Self::COORDINATOR
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
