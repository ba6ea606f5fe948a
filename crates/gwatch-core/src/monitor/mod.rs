//! Monitoring loops
//!
//! [`Monitor`] collects, evaluates and dispatches; [`Coordinator`] schedules
//! it on two cadences and arbitrates between the per-domain policies.

mod coordinator;
mod runner;

pub use coordinator::Coordinator;
pub use runner::{Collectors, Monitor, ASYNC_DUMP_NOTICE, TOP_PROCESS_COUNT};
