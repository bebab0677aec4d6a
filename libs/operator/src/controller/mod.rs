pub mod context;
pub mod reconcile;

pub use context::{Context, Diagnostics, State};
pub use reconcile::{error_policy, reconcile};
