//! Application Services
//!
//! Everything between the socket and the user's callbacks.
//!
//! - `client`: public handle; forwards calls to the supervisor
//! - `supervisor`: connection state machine and channel reconciliation
//! - `self_heal`: reconnection backoff and the retry timer
//! - `pipeline`: bounded frame queue and worker threads
//! - `heartbeat`: keep-alive frames on an open socket
//! - `callbacks`: handler slots and the errors reported to them

pub mod callbacks;
pub mod client;
pub mod heartbeat;
pub mod pipeline;
pub mod self_heal;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_support;

pub use callbacks::{ErrorCallback, FeedError, Handlers, QuoteCallback, TradeCallback};
pub use client::{Client, ClientError};
pub use heartbeat::HeartbeatManager;
pub use pipeline::{IngestionPipeline, PipelineError, PipelineSettings};
pub use self_heal::{BackoffError, BackoffSchedule, DEFAULT_BACKOFF_MS, SelfHealScheduler};
pub use supervisor::{Command, ConnectionSupervisor, SupervisorPorts, SupervisorSettings};
