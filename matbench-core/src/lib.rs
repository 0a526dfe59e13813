mod data_type;
pub mod info;
mod matrix;
mod partition;
pub mod prelude;

pub use data_type::*;
pub use matrix::*;
pub use partition::*;
