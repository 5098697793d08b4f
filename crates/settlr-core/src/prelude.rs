pub use settlr_types::prelude::*;

pub use crate::periodic::{PeriodicJob, ScopeFactory};

// vim: ts=4
