//! Translation between what the guest sees and what the host sees: paths
//! (sandboxing) and raw guest memory (words, strings).

pub mod datatype_conversion;
pub mod path_conv;

pub use datatype_conversion::*;
pub use path_conv::*;
