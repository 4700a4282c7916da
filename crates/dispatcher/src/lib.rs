//! # Dispatcher
//!
//! Batch publish core.
//!
//! Responsible for:
//! - Turning events into messages (`MessageBuilder`)
//! - Classifying messages by content (`ContentRouter`)
//! - Sending one group per destination, concurrently (`Dispatcher`)
//! - Resolving each batch exactly once from partial outcomes (`DeliveryTracker`)

pub mod batch;
pub mod builder;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod router;
pub mod senders;
pub mod tracker;

pub use batch::{BatchOutcome, ChannelBatch};
pub use builder::{MessageBuilder, PARTITION_CACHE_KEY, TOPIC_CACHE_KEY};
pub use codec::JsonCodec;
pub use contracts::{Batch, Event, Message, Observer, Sender};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder};
pub use error::DispatcherError;
pub use metrics::{FanoutObserver, MetricsSnapshot, PublishMetrics};
pub use router::{ContentRouter, ExclusionReason, RouteDecision};
pub use senders::{create_sender, AnySender, FileSender, LogSender, RestSender};
pub use tokio_util::sync::CancellationToken;
pub use tracker::DeliveryTracker;
