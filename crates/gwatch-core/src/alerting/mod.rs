//! Alerting pipeline for GWatch
//!
//! Threshold evaluation, debounce/consecutive policy, message formatting,
//! notification delivery, and the diagnostic dump hook.

mod dump;
mod evaluator;
mod formatter;
mod notifier;
mod policy;

pub use dump::{DumpScript, ScriptOutcome, DEFAULT_DETACH_TIMEOUT, DEFAULT_WAIT};
pub use evaluator::{Domain, Evaluator};
pub use formatter::{AlertFormatter, HostIdentity, MarkdownFormatter};
pub use notifier::{DingTalkNotifier, NotificationError, Notifier};
pub use policy::AlertPolicy;
