pub mod bin_packing;
pub mod block_assignment;

pub use bin_packing::{BinPacker, ExactBinPacker};
pub use block_assignment::{BlockAssigner, BlockAssignment, MinLengthDifferenceAssigner};
