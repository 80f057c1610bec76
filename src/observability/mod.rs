//! Observability subsystem
//!
//! - Structured logs through `tracing`, one event per state change
//! - Every log line carries `event = <Event name>`
//! - Deterministic counters in `MetricsRegistry`
//!
//! The crate never installs a subscriber; that is the application's job.
//!
//! ```ignore
//! tracing::info!(event = %Event::BranchCreated, branch_id = %id, "branch created");
//! ```

mod events;
mod metrics;

pub use events::Event;
pub use metrics::{MetricsRegistry, MetricsSnapshot};
