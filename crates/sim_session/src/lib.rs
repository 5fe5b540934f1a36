#![forbid(unsafe_code)]
//! Push-feed consumer that reconstructs dialogue simulation runs.
//!
//! The simulation server pushes a heterogeneous event stream (see
//! [`sim_feed`]) describing an attacker-vs-target dialogue run. This crate
//! owns everything stateful about consuming it:
//! - [`FeedTransport`] keeps at most one active push connection; opening a
//!   new stream supersedes the previous one, and the handle is released on
//!   every exit path.
//! - [`SessionConsumer`] is the single cooperative pull loop: lifecycle state
//!   machine, ordered/deduplicated transcript, per-round artifact merging,
//!   and best-effort finalization through a [`BundleFetcher`].
//!
//! ```rust,no_run
//! use sim_feed::RawEvent;
//! use sim_session::{SessionConsumer, StartRequest};
//! # #[tokio::main]
//! # async fn main() {
//! let mut consumer = SessionConsumer::new();
//! let publisher = consumer.start(StartRequest::new("run-1")).expect("idle");
//! publisher
//!     .publish(RawEvent::text("case_created", r#"{"case_id":"c-1"}"#))
//!     .await;
//! drop(publisher);
//! consumer.drain().await;
//! println!("{:?}", consumer.phase());
//! # }
//! ```

mod aggregate;
mod consumer;
mod error;
mod finalize;
mod transport;

pub use aggregate::{RiskInfo, RoundArtifact, RoundTable};
pub use consumer::{
    RunPhase, SessionCancel, SessionConsumer, SessionConsumerBuilder, StartRequest,
    COMPLETION_SENTINEL,
};
pub use error::{Advisory, BundleFetchError, SessionError, DUPLICATE_RUN_PATTERN};
pub use finalize::{BundleFetcher, BundleFuture, CaseBundle, CaseHandle, SessionResult};
pub use transport::{
    FeedPublisher, FeedTransport, CONNECTION_LOST_MESSAGE, DEFAULT_CHANNEL_CAPACITY,
};

#[cfg(test)]
mod tests;
