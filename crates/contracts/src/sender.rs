//! Sender trait - transport for one destination group
//!
//! Implementations are shared across concurrently running group sends, so every
//! method takes `&self` and keeps no state tied to a single destination.

use crate::{ContractError, DestinationKey, Message, SendError};

/// Destination transport
///
/// All sender implementations must implement this trait.
#[trait_variant::make(Sender: Send)]
pub trait LocalSender {
    /// Sender name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Identity string, e.g. the configured hosts
    fn describe(&self) -> String;

    /// Acquire the transport handle. Calling twice is a no-op.
    async fn connect(&self) -> Result<(), ContractError>;

    /// Deliver one destination group as a single logical request
    ///
    /// # Errors
    /// Any failure fails the whole group; the error carries its retry classification.
    async fn send(
        &self,
        destination: &DestinationKey,
        messages: &[Message],
    ) -> Result<(), SendError>;

    /// Release the transport handle. Calling twice is a no-op.
    async fn close(&self) -> Result<(), ContractError>;
}
