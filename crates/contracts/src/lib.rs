//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the event publisher.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Delivery Model
//! - A [`Batch`] is resolved exactly once: either [`Batch::ack`] or [`Batch::retry_events`]
//! - Each [`Event`] becomes at most one [`Message`] addressed to one destination
//! - [`Sender`] delivers one destination group per call

mod batch;
mod codec;
mod config;
mod destination;
mod error;
mod event;
mod fmtstr;
mod message;
mod observer;
mod sender;

pub use batch::Batch;
pub use codec::{Codec, KeyFormatter};
pub use config::*;
pub use destination::DestinationKey;
pub use error::*;
pub use event::{lookup_path, Event, EventCache, Fields};
pub use fmtstr::EventFormatString;
pub use message::Message;
pub use observer::{NilObserver, Observer};
pub use sender::{LocalSender, Sender};
