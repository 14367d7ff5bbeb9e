//! Constants and wire-format data definitions shared by the handlers.

pub mod constants;
pub mod data;
pub mod err_const;
