pub mod error;
pub mod macros;
pub mod math;
