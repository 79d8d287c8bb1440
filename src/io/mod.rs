//! Input/output helpers.
//!
//! - force-map JSON read/write (`forcemap`)
//! - result exports (JSON/CSV) (`export`)

pub mod export;
pub mod forcemap;

pub use export::*;
pub use forcemap::*;
