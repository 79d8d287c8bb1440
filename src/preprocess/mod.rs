//! Curve preprocessing ahead of model fitting.
//!
//! - `poc`: Rate-of-Variance contact point estimation.
//! - `transform`: height/deflection to force/indentation.
//! - `drag`: viscous drag correction between extend and retract.

pub mod drag;
pub mod poc;
pub mod transform;

pub use drag::{DragReport, correct_viscous_drag, estimate_drag};
pub use poc::{estimate_poc, rov_scores};
pub use transform::{force_indentation, rebaseline, rebaseline_by};
