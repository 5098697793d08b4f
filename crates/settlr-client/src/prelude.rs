pub use settlr_types::prelude::*;
pub use settlr_types::types::{ClientIdentity, ClientKey, SettingValue, TypedValue};

// vim: ts=4
