pub mod block;
pub mod fixed_perm;
pub mod gcd_table;
pub mod instance;

mod matrix;
pub use matrix::Matrix;

pub use block::Block;
pub use fixed_perm::FixedPermCostComputation;
pub use gcd_table::GcdTable;
pub use instance::{Instance, Interval, Job, NO_VALUE};
