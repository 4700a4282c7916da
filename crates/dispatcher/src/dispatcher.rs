//! Dispatcher - publishes batches as concurrent destination groups
//!
//! One publish attempt:
//! 1. Build and route every event, grouping messages by destination
//! 2. Report all drops to the tracker at once
//! 3. Spawn one task per group; each task reports its own outcome
//!
//! The batch is resolved by the tracker, never by `publish` itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    Batch, Codec, ContractError, DeliveryMode, DestinationKey, Event, EventFormatString,
    KeyFormatter, Message, NilObserver, Observer, PublisherConfig, SendError, Sender,
};

use crate::builder::{MessageBuilder, TOPIC_CACHE_KEY};
use crate::codec::JsonCodec;
use crate::error::DispatcherError;
use crate::router::{ContentRouter, RouteDecision};
use crate::senders::{create_sender, AnySender};
use crate::tracker::DeliveryTracker;

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder<S> {
    config: PublisherConfig,
    sender: S,
    observer: Arc<dyn Observer>,
    codec: Option<Box<dyn Codec>>,
    key: Option<Box<dyn KeyFormatter>>,
}

impl<S: Sender + Sync + 'static> DispatcherBuilder<S> {
    /// Create a new DispatcherBuilder
    pub fn new(config: PublisherConfig, sender: S) -> Self {
        Self {
            config,
            sender,
            observer: Arc::new(NilObserver),
            codec: None,
            key: None,
        }
    }

    /// Report counts to this observer
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Override the codec built from `[codec]`
    pub fn codec(mut self, codec: Box<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Override the key format parsed from `output.key`
    pub fn key_formatter(mut self, key: Box<dyn KeyFormatter>) -> Self {
        self.key = Some(key);
        self
    }

    /// Build the dispatcher. The sender is not connected yet.
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub fn build(self) -> Result<Dispatcher<S>, DispatcherError> {
        let codec: Box<dyn Codec> = match self.codec {
            Some(codec) => codec,
            None => Box::new(JsonCodec::from_config(&self.config.codec)),
        };

        let key: Option<Box<dyn KeyFormatter>> = match (self.key, &self.config.output.key) {
            (Some(key), _) => Some(key),
            (None, Some(source)) => {
                let parsed = EventFormatString::parse(source)
                    .map_err(|e| ContractError::config_validation("output.key", e.to_string()))?;
                Some(Box::new(parsed))
            }
            (None, None) => None,
        };

        let mut builder = MessageBuilder::new(&self.config.output.index, codec);
        if let Some(key) = key {
            builder = builder.with_key(key);
        }

        Ok(Dispatcher {
            sender: Arc::new(self.sender),
            builder,
            router: ContentRouter::new(&self.config.routing),
            observer: self.observer,
            mode: self.config.output.delivery_mode,
            timeout: self.config.output.timeout(),
            publish_lock: Arc::new(Mutex::new(())),
        })
    }
}

/// Messages grouped by destination, in first-seen order
#[derive(Default)]
struct Plan {
    groups: Vec<(DestinationKey, Vec<Message>)>,
    dropped: usize,
}

/// A group whose outcome has not been reported yet
///
/// Dropping it unreported (task panic or abort) fails the group as retryable,
/// so its events are never lost.
struct PendingGroup {
    tracker: Arc<DeliveryTracker>,
    destination: DestinationKey,
    messages: Vec<Message>,
    reported: bool,
}

impl PendingGroup {
    fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.messages)
            .into_iter()
            .map(|m| m.event)
            .collect()
    }

    fn report(mut self, result: Result<(), SendError>) {
        self.reported = true;
        let events = self.take_events();
        self.tracker.record(events, result);
    }
}

impl Drop for PendingGroup {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        let events = self.take_events();
        error!(
            destination = %self.destination,
            events = events.len(),
            "Group task ended before reporting"
        );
        self.tracker.failed(
            events,
            SendError::retryable(self.destination.as_str(), "group task ended before reporting"),
        );
    }
}

/// Batch publisher for one sender
pub struct Dispatcher<S> {
    sender: Arc<S>,
    builder: MessageBuilder,
    router: ContentRouter,
    observer: Arc<dyn Observer>,
    mode: DeliveryMode,
    timeout: Duration,
    publish_lock: Arc<Mutex<()>>,
}

impl<S: Sender + Sync + 'static> Dispatcher<S> {
    /// The underlying sender
    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Configured delivery mode
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Acquire the transport. Calling twice is a no-op.
    #[instrument(name = "dispatcher_connect", skip(self), fields(sender = %self.sender.name()))]
    pub async fn connect(&self) -> Result<(), DispatcherError> {
        self.sender.connect().await?;
        info!(dispatcher = %self, "Dispatcher connected");
        Ok(())
    }

    /// Release the transport. Calling twice is a no-op.
    #[instrument(name = "dispatcher_close", skip(self), fields(sender = %self.sender.name()))]
    pub async fn close(&self) -> Result<(), DispatcherError> {
        self.sender.close().await?;
        info!(dispatcher = %self, "Dispatcher closed");
        Ok(())
    }

    /// Publish one batch
    ///
    /// The batch is acked or handed back for retry exactly once, by whichever
    /// party reports its last outcome. The returned error is the last group
    /// failure observed and is informational only. In detached mode it is
    /// always `Ok`, since groups are still in flight when this returns.
    ///
    /// Batches never overlap: a publish waits until every group of the
    /// previous batch has finished, in either mode.
    #[instrument(
        name = "dispatcher_publish",
        skip_all,
        fields(sender = %self.sender.name(), events = batch.events().len())
    )]
    pub async fn publish(
        &self,
        cancel: &CancellationToken,
        batch: Box<dyn Batch>,
    ) -> Result<(), DispatcherError> {
        let guard = Arc::clone(&self.publish_lock).lock_owned().await;

        self.observer.new_batch(batch.events().len());
        let plan = self.plan(batch.events());
        let tracker = DeliveryTracker::new(batch, Arc::clone(&self.observer));

        let dropped = plan.dropped;
        if dropped > 0 {
            self.observer.dropped(dropped);
            tracker.dropped(dropped);
        }

        let groups = plan.groups.len();
        let mut tasks = JoinSet::new();
        for (destination, messages) in plan.groups {
            let group = PendingGroup {
                tracker: Arc::clone(&tracker),
                destination,
                messages,
                reported: false,
            };
            tasks.spawn(send_group(
                Arc::clone(&self.sender),
                Arc::clone(&self.observer),
                cancel.clone(),
                self.timeout,
                group,
            ));
        }
        debug!(groups, dropped, "Destination groups dispatched");

        match self.mode {
            DeliveryMode::Blocking => {
                let result = wait_groups(tasks).await;
                drop(guard);
                result
            }
            DeliveryMode::Detached => {
                // The next publish waits until every group of this batch is done
                tokio::spawn(async move {
                    let _guard = guard;
                    if let Err(e) = wait_groups(tasks).await {
                        debug!(error = %e, "Detached batch finished with errors");
                    }
                });
                Ok(())
            }
        }
    }

    fn plan(&self, events: &[Event]) -> Plan {
        let mut plan = Plan::default();
        let mut slots: HashMap<DestinationKey, usize> = HashMap::new();

        for event in events {
            let mut message = match self.builder.build(event) {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "Dropping event that failed to encode");
                    plan.dropped += 1;
                    continue;
                }
            };

            let destination =
                match self.router.route(&message.payload, message.destination.as_ref()) {
                    RouteDecision::Routed { destination } => destination,
                    RouteDecision::Suppressed { kind } => {
                        debug!(kind = %kind, "Dropping suppressed event");
                        plan.dropped += 1;
                        continue;
                    }
                    RouteDecision::Excluded { reason } => {
                        warn!(reason = %reason, "Dropping event that matched no route");
                        self.observer.excluded(reason.as_str());
                        plan.dropped += 1;
                        continue;
                    }
                };

            // Retried events keep the destination chosen on this attempt
            if let Err(e) = message
                .event
                .cache
                .put(TOPIC_CACHE_KEY, destination.as_str())
            {
                debug!(error = %e, "Could not cache destination");
            }
            message.destination = Some(destination.clone());

            let slot = *slots.entry(destination.clone()).or_insert_with(|| {
                plan.groups.push((destination, Vec::new()));
                plan.groups.len() - 1
            });
            plan.groups[slot].1.push(message);
        }

        plan
    }

    /// Publish batches from `input_rx` one at a time
    ///
    /// Returns when the channel closes or `cancel` fires. Batches still queued
    /// after cancellation are published under the cancelled token, which hands
    /// them back for retry. The sender is closed on exit.
    #[instrument(name = "dispatcher_run", skip_all, fields(sender = %self.sender.name()))]
    pub async fn run(
        self,
        mut input_rx: mpsc::Receiver<Box<dyn Batch>>,
        cancel: CancellationToken,
    ) {
        info!(dispatcher = %self, "Dispatcher started");

        let mut batch_count: u64 = 0;
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = input_rx.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };

            batch_count += 1;
            if let Err(e) = self.publish(&cancel, batch).await {
                debug!(error = %e, "Batch published with errors");
            }

            if batch_count.is_multiple_of(100) {
                debug!(batches = batch_count, "Dispatcher progress");
            }
        }

        input_rx.close();
        while let Some(batch) = input_rx.recv().await {
            batch_count += 1;
            if let Err(e) = self.publish(&cancel, batch).await {
                debug!(error = %e, "Queued batch handed back");
            }
        }

        if let Err(e) = self.close().await {
            warn!(error = %e, "Failed to close sender");
        }

        info!(batches = batch_count, "Dispatcher shutdown complete");
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(
        self,
        input_rx: mpsc::Receiver<Box<dyn Batch>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(input_rx, cancel).await;
        })
    }
}

impl<S: Sender> fmt::Display for Dispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sender.describe())
    }
}

async fn send_group<S: Sender + Sync + 'static>(
    sender: Arc<S>,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
    timeout: Duration,
    group: PendingGroup,
) -> Result<(), SendError> {
    let count = group.messages.len();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SendError::Cancelled {
            destination: group.destination.to_string(),
        }),
        sent = tokio::time::timeout(timeout, sender.send(&group.destination, &group.messages)) => {
            sent.unwrap_or_else(|_| {
                Err(SendError::Timeout {
                    destination: group.destination.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            })
        }
    };

    match &result {
        Ok(()) => debug!(destination = %group.destination, events = count, "Group sent"),
        Err(e) if e.is_retryable() => warn!(
            destination = %group.destination,
            events = count,
            error = %e,
            "Group send failed, events will be retried"
        ),
        // The tracker logs unretryable drops
        Err(_) => {}
    }

    observer.group_sent(group.destination.as_str(), count, result.is_ok());
    group.report(result.clone());
    result
}

async fn wait_groups(
    mut tasks: JoinSet<Result<(), SendError>>,
) -> Result<(), DispatcherError> {
    let mut last_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => last_error = Some(DispatcherError::Send(e)),
            Err(e) => {
                error!(error = %e, "Group task failed");
                last_error = Some(DispatcherError::GroupTask {
                    message: e.to_string(),
                });
            }
        }
    }
    last_error.map_or(Ok(()), Err)
}

/// Convenience function to create a dispatcher for the configured sender
#[instrument(name = "dispatcher_create", skip_all)]
pub fn create_dispatcher(
    config: &PublisherConfig,
    observer: Arc<dyn Observer>,
) -> Result<Dispatcher<AnySender>, DispatcherError> {
    let sender = create_sender(config)?;
    DispatcherBuilder::new(config.clone(), sender)
        .observer(observer)
        .build()
}
