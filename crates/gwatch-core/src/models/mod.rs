//! Data models for GWatch

mod alert;
mod metrics;
mod process;

pub use alert::*;
pub use metrics::*;
pub use process::*;
