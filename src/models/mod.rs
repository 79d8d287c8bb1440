//! Contact-mechanics model implementations.
//!
//! Models are implemented as small, pure functions (Hertz) or a value object
//! holding only fixed settings (Ting) so that fitting code and consumers can
//! re-evaluate a fit from its parameters alone.

pub mod hertz;
pub mod ting;

pub use hertz::*;
pub use ting::*;
