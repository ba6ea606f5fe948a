//! # GWatch
//!
//! Host and application monitoring agent.
//!
//! GWatch samples host, Redis, MySQL and HTTP metrics on two independent
//! cadences, filters threshold breaches through a debounce and
//! consecutive-count policy, and sends one enriched DingTalk message per
//! firing batch.
//!
//! ## Architecture
//!
//! - **Collector**: narrow async traits over sysinfo, redis, sqlx and reqwest
//! - **Alerting**: stateless evaluator, stateful policy with a side-effect free
//!   preview, Markdown formatter, DingTalk notifier, heap-dump hook
//! - **Monitor**: collection passes, notification dispatch, and the
//!   dual-cadence coordinator
//!
//! ## Quick Start
//!
//! ```bash
//! gwatch --config config/config.yml
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod alerting;
pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod monitor;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertPolicy, Domain, Evaluator};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::monitor::{Collectors, Coordinator, Monitor};
}
