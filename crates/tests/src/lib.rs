//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 批次发布场景测试（抑制 / 路由 / 排除）
//! - 重试、取消、分离模式下的批次结算
//! - REST / 文件发送端的端到端测试

#[cfg(test)]
mod support {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use contracts::{
        ContractError, DestinationKey, Event, Message, Observer, PublisherConfig, SendError,
        Sender,
    };
    use dispatcher::{BatchOutcome, CancellationToken, ChannelBatch, Dispatcher, DispatcherBuilder};
    use serde_json::json;

    /// Sender with a scripted result per destination
    #[derive(Default)]
    pub struct ScriptedSender {
        pub failures: HashMap<String, SendError>,
        pub delay: Option<Duration>,
        pub sent: Mutex<Vec<(String, Vec<u64>)>>,
    }

    impl ScriptedSender {
        pub fn fail(mut self, destination: &str, err: SendError) -> Self {
            self.failures.insert(destination.to_string(), err);
            self
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn sent(&self) -> Vec<(String, Vec<u64>)> {
            let mut sent = self.sent.lock().unwrap().clone();
            sent.sort();
            sent
        }
    }

    impl Sender for ScriptedSender {
        fn name(&self) -> &str {
            "scripted"
        }

        fn describe(&self) -> String {
            "scripted()".to_string()
        }

        async fn connect(&self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn send(
            &self,
            destination: &DestinationKey,
            messages: &[Message],
        ) -> Result<(), SendError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), seqs_of(messages)));
            match self.failures.get(destination.as_str()) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        async fn close(&self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    /// One observer callback
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        NewBatch(usize),
        Dropped(usize),
        Acked(usize),
        Failed(usize),
        GroupSent(String, usize, bool),
        Excluded(String),
    }

    /// Observer that records every callback in order
    #[derive(Default)]
    pub struct RecordingObserver {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingObserver {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        /// Counter callbacks only, without group and exclusion details
        pub fn counts(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| !matches!(c, Call::GroupSent(..) | Call::Excluded(_)))
                .collect()
        }

        pub fn total(&self, pick: fn(&Call) -> Option<usize>) -> usize {
            self.calls().iter().filter_map(pick).sum()
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Observer for RecordingObserver {
        fn new_batch(&self, n: usize) {
            self.push(Call::NewBatch(n));
        }

        fn dropped(&self, n: usize) {
            self.push(Call::Dropped(n));
        }

        fn acked(&self, n: usize) {
            self.push(Call::Acked(n));
        }

        fn failed(&self, n: usize) {
            self.push(Call::Failed(n));
        }

        fn group_sent(&self, destination: &str, events: usize, ok: bool) {
            self.push(Call::GroupSent(destination.to_string(), events, ok));
        }

        fn excluded(&self, reason: &str) {
            self.push(Call::Excluded(reason.to_string()));
        }
    }

    pub fn event(seq: u64, kind: &str, profile: Option<&str>) -> Event {
        let mut doc = json!({ "seq": seq, "processor": { "event": kind } });
        if let Some(profile) = profile {
            doc["labels"] = json!({ "_tag_profileId": profile });
        }
        Event::from_value(doc).unwrap()
    }

    pub fn seqs(events: &[Event]) -> Vec<u64> {
        let mut seqs: Vec<u64> = events
            .iter()
            .map(|e| e.content["seq"].as_u64().unwrap())
            .collect();
        seqs.sort();
        seqs
    }

    fn seqs_of(messages: &[Message]) -> Vec<u64> {
        let events: Vec<Event> = messages.iter().map(|m| m.event.clone()).collect();
        seqs(&events)
    }

    pub fn config() -> PublisherConfig {
        PublisherConfig::with_hosts(["http://unused:8082"])
    }

    pub fn dispatcher(
        sender: ScriptedSender,
        config: PublisherConfig,
    ) -> (Dispatcher<ScriptedSender>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let dispatcher = DispatcherBuilder::new(config, sender)
            .observer(observer.clone())
            .build()
            .unwrap();
        (dispatcher, observer)
    }

    pub async fn publish<S: Sender + Sync + 'static>(
        dispatcher: &Dispatcher<S>,
        cancel: &CancellationToken,
        events: Vec<Event>,
    ) -> (Result<(), dispatcher::DispatcherError>, BatchOutcome) {
        let (batch, rx) = ChannelBatch::new(events);
        let result = dispatcher.publish(cancel, Box::new(batch)).await;
        (result, rx.await.unwrap())
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::sync::Arc;

    use contracts::{SendError, UnretryableReason};
    use dispatcher::{BatchOutcome, CancellationToken, PublishMetrics};

    use super::support::*;

    /// 抑制 1 条，剩余 2 条同一目的地发送成功
    #[tokio::test]
    async fn test_suppressed_event_dropped_rest_acked() {
        let (dispatcher, observer) = dispatcher(ScriptedSender::default(), config());
        let events = vec![
            event(1, "metric", Some("p1")),
            event(2, "span", Some("p1")),
            event(3, "transaction", Some("p1")),
        ];

        let (result, outcome) = publish(&dispatcher, &CancellationToken::new(), events).await;
        assert!(result.is_ok());
        assert_eq!(outcome, BatchOutcome::Acked);
        assert_eq!(
            observer.counts(),
            vec![Call::NewBatch(3), Call::Dropped(1), Call::Acked(2)]
        );
        assert_eq!(
            dispatcher.sender().sent(),
            vec![("trace-p1".to_string(), vec![2, 3])]
        );
    }

    /// 同上批次，但目的地返回可重试错误
    #[tokio::test]
    async fn test_retryable_failure_hands_back_routed_events() {
        let sender = ScriptedSender::default().fail("trace-p1", SendError::retryable("trace-p1", "503"));
        let (dispatcher, observer) = dispatcher(sender, config());
        let events = vec![
            event(1, "metric", Some("p1")),
            event(2, "span", Some("p1")),
            event(3, "transaction", Some("p1")),
        ];

        let (result, outcome) = publish(&dispatcher, &CancellationToken::new(), events).await;
        assert!(result.is_err());

        let BatchOutcome::Retry(retried) = outcome else {
            panic!("expected retry, got {outcome:?}");
        };
        assert_eq!(seqs(&retried), vec![2, 3]);
        assert_eq!(
            observer.counts(),
            vec![
                Call::NewBatch(3),
                Call::Dropped(1),
                Call::Failed(2),
                Call::Acked(0)
            ]
        );
        assert!(observer
            .calls()
            .contains(&Call::GroupSent("trace-p1".to_string(), 2, false)));
    }

    /// 既不被抑制也无法路由的事件计入排除并丢弃，不重试
    #[tokio::test]
    async fn test_unroutable_event_counted_as_excluded() {
        let (dispatcher, observer) = dispatcher(ScriptedSender::default(), config());
        let mut mismatched = event(3, "span", None);
        mismatched
            .content
            .insert("labels".to_string(), serde_json::json!({ "_tag_profileId": 7 }));
        let events = vec![event(1, "span", None), event(2, "span", Some("p1")), mismatched];

        let (result, outcome) = publish(&dispatcher, &CancellationToken::new(), events).await;
        assert!(result.is_ok());
        assert_eq!(outcome, BatchOutcome::Acked);

        let calls = observer.calls();
        assert!(calls.contains(&Call::Excluded("missing_field".to_string())));
        assert!(calls.contains(&Call::Excluded("mismatched_type".to_string())));
        assert_eq!(
            observer.counts(),
            vec![Call::NewBatch(3), Call::Dropped(2), Call::Acked(1)]
        );
        assert_eq!(
            dispatcher.sender().sent(),
            vec![("trace-p1".to_string(), vec![2])]
        );
    }

    #[tokio::test]
    async fn test_fully_excluded_batch_is_acked_without_sending() {
        let (dispatcher, observer) = dispatcher(ScriptedSender::default(), config());
        let events = vec![event(1, "metric", Some("p1")), event(2, "span", None)];

        let (result, outcome) = publish(&dispatcher, &CancellationToken::new(), events).await;
        assert!(result.is_ok());
        assert_eq!(outcome, BatchOutcome::Acked);
        assert!(dispatcher.sender().sent().is_empty());
        assert_eq!(observer.total(|c| match c {
            Call::Acked(n) => Some(*n),
            _ => None,
        }), 0);
    }

    /// 三个目的地：成功 / 可重试失败 / 不可重试失败
    #[tokio::test]
    async fn test_mixed_destinations() {
        let sender = ScriptedSender::default()
            .fail("trace-p2", SendError::retryable("trace-p2", "connection reset"))
            .fail(
                "trace-p3",
                SendError::unretryable("trace-p3", UnretryableReason::MessageTooLarge, "413"),
            );
        let (dispatcher, observer) = dispatcher(sender, config());
        let events = vec![
            event(1, "span", Some("p1")),
            event(2, "span", Some("p2")),
            event(3, "span", Some("p3")),
            event(4, "metric", Some("p1")),
            event(5, "transaction", Some("p1")),
            event(6, "span", Some("p3")),
        ];

        let (result, outcome) = publish(&dispatcher, &CancellationToken::new(), events).await;
        assert!(result.is_err());

        let BatchOutcome::Retry(retried) = outcome else {
            panic!("expected retry, got {outcome:?}");
        };
        assert_eq!(seqs(&retried), vec![2]);

        let sum = |pick: fn(&Call) -> Option<usize>| observer.total(pick);
        assert_eq!(sum(|c| if let Call::Acked(n) = c { Some(*n) } else { None }), 2);
        assert_eq!(sum(|c| if let Call::Failed(n) = c { Some(*n) } else { None }), 1);
        assert_eq!(sum(|c| if let Call::Dropped(n) = c { Some(*n) } else { None }), 3);
        assert_eq!(dispatcher.sender().sent().len(), 3);
    }

    #[tokio::test]
    async fn test_detached_publish_resolves_later() {
        let mut config = config();
        config.output.delivery_mode = contracts::DeliveryMode::Detached;
        let sender = ScriptedSender::default().delayed(std::time::Duration::from_millis(200));
        let (dispatcher, _observer) = dispatcher(sender, config);

        let (batch, mut rx) = dispatcher::ChannelBatch::new(vec![
            event(1, "span", Some("p1")),
            event(2, "span", Some("p2")),
        ]);
        let result = dispatcher
            .publish(&CancellationToken::new(), Box::new(batch))
            .await;
        assert!(result.is_ok());
        assert!(rx.try_recv().is_err(), "batch resolved before groups finished");

        assert_eq!(rx.await.unwrap(), BatchOutcome::Acked);
        assert_eq!(dispatcher.sender().sent().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_publish_hands_back_everything_routed() {
        let sender = ScriptedSender::default().delayed(std::time::Duration::from_secs(5));
        let (dispatcher, _observer) = dispatcher(sender, config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let events = vec![
            event(1, "span", Some("p1")),
            event(2, "metric", Some("p1")),
            event(3, "span", Some("p2")),
            event(4, "span", Some("p1")),
        ];
        let (result, outcome) = publish(&dispatcher, &cancel, events).await;
        assert!(result.unwrap_err().send_error().unwrap().is_retryable());

        let BatchOutcome::Retry(retried) = outcome else {
            panic!("expected retry, got {outcome:?}");
        };
        assert_eq!(seqs(&retried), vec![1, 3, 4]);
    }

    /// 发送进行中取消：整组退回重试，不丢事件
    #[tokio::test]
    async fn test_cancel_while_sending_hands_back_group() {
        let sender = ScriptedSender::default().delayed(std::time::Duration::from_millis(200));
        let (dispatcher, observer) = dispatcher(sender, config());
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                cancel.cancel();
            }
        });

        let events = vec![
            event(1, "span", Some("p1")),
            event(2, "span", Some("p2")),
            event(3, "metric", Some("p1")),
        ];
        let (result, outcome) = publish(&dispatcher, &cancel, events).await;
        assert!(matches!(
            result.unwrap_err().send_error(),
            Some(SendError::Cancelled { .. })
        ));

        let BatchOutcome::Retry(retried) = outcome else {
            panic!("expected retry, got {outcome:?}");
        };
        assert_eq!(seqs(&retried), vec![1, 2]);
        assert!(dispatcher.sender().sent().is_empty());
        let failed = observer.total(|c| match c {
            Call::Failed(n) => Some(*n),
            _ => None,
        });
        assert_eq!(failed, 2);
    }

    /// 分离模式下，下一批次等待上一批次全部结算
    #[tokio::test]
    async fn test_detached_batches_are_serialized() {
        let mut config = config();
        config.output.delivery_mode = contracts::DeliveryMode::Detached;
        let sender = ScriptedSender::default().delayed(std::time::Duration::from_millis(100));
        let (dispatcher, _observer) = dispatcher(sender, config);
        let cancel = CancellationToken::new();

        let (first, mut first_rx) = dispatcher::ChannelBatch::new(vec![
            event(1, "span", Some("p1")),
            event(2, "span", Some("p2")),
        ]);
        dispatcher.publish(&cancel, Box::new(first)).await.unwrap();

        let (second, second_rx) =
            dispatcher::ChannelBatch::new(vec![event(3, "span", Some("p1"))]);
        dispatcher.publish(&cancel, Box::new(second)).await.unwrap();
        assert_eq!(first_rx.try_recv().unwrap(), BatchOutcome::Acked);

        assert_eq!(second_rx.await.unwrap(), BatchOutcome::Acked);
        assert_eq!(dispatcher.sender().sent().len(), 3);
    }

    #[tokio::test]
    async fn test_slow_destination_times_out_into_retry() {
        let mut config = config();
        config.output.timeout_ms = 20;
        let sender = ScriptedSender::default().delayed(std::time::Duration::from_millis(300));
        let (dispatcher, _observer) = dispatcher(sender, config);

        let (result, outcome) = publish(
            &dispatcher,
            &CancellationToken::new(),
            vec![event(1, "span", Some("p1"))],
        )
        .await;
        assert!(matches!(
            result.unwrap_err().send_error(),
            Some(SendError::Timeout { .. })
        ));
        assert!(matches!(outcome, BatchOutcome::Retry(ref events) if events.len() == 1));
    }

    #[tokio::test]
    async fn test_run_loop_hands_back_batches_after_cancel() {
        let (dispatcher, _observer) = dispatcher(ScriptedSender::default(), config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let (batch, outcome_rx) = dispatcher::ChannelBatch::new(vec![event(1, "span", Some("p1"))]);
        tx.send(Box::new(batch) as Box<dyn contracts::Batch>)
            .await
            .unwrap();
        drop(tx);

        dispatcher.spawn(rx, cancel).await.unwrap();
        assert!(matches!(outcome_rx.await.unwrap(), BatchOutcome::Retry(_)));
    }

    /// 任意失败组合下：acked + failed + dropped == 批次事件数，且每批仅结算一次
    #[tokio::test]
    async fn test_every_event_accounted_for_once() {
        let failures = [
            None,
            Some(SendError::retryable("x", "503")),
            Some(SendError::unretryable("x", UnretryableReason::InvalidMessage, "400")),
            Some(SendError::NotConnected {
                destination: "x".to_string(),
            }),
        ];

        let metrics = Arc::new(PublishMetrics::new());
        let mut total = 0u64;
        for p1 in &failures {
            for p2 in &failures {
                let mut sender = ScriptedSender::default();
                if let Some(err) = p1 {
                    sender = sender.fail("trace-p1", err.clone());
                }
                if let Some(err) = p2 {
                    sender = sender.fail("trace-p2", err.clone());
                }
                let dispatcher = dispatcher::DispatcherBuilder::new(config(), sender)
                    .observer(metrics.clone())
                    .build()
                    .unwrap();

                let events = vec![
                    event(1, "span", Some("p1")),
                    event(2, "metric", Some("p2")),
                    event(3, "span", Some("p2")),
                    event(4, "span", None),
                    event(5, "transaction", Some("p1")),
                ];
                total += events.len() as u64;

                let (_, outcome) =
                    publish(&dispatcher, &CancellationToken::new(), events).await;
                let retryable = |e: &Option<SendError>| e.as_ref().is_some_and(|e| e.is_retryable());
                let expected_retry = 2 * usize::from(retryable(p1)) + usize::from(retryable(p2));
                match outcome {
                    BatchOutcome::Acked => assert_eq!(expected_retry, 0),
                    BatchOutcome::Retry(events) => assert_eq!(events.len(), expected_retry),
                }
            }
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events, total);
        assert_eq!(snapshot.acked + snapshot.failed + snapshot.dropped, total);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;

    use config_loader::{ConfigFormat, ConfigLoader};
    use dispatcher::{create_dispatcher, BatchOutcome, CancellationToken, FanoutObserver, PublishMetrics};
    use httpmock::prelude::*;
    use observability::MetricsObserver;
    use serde_json::json;

    use super::support::*;

    /// REST 发送端：一个目的地成功，一个返回 503
    #[tokio::test]
    async fn test_rest_publish_end_to_end() {
        let server = MockServer::start_async().await;
        let ok = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/topics/trace-p1")
                    .body_contains(r#""key":"t-1""#);
                then.status(200)
                    .json_body(json!({"offsets": [{"partition": 0, "offset": 1}]}));
            })
            .await;
        let unavailable = server
            .mock_async(|when, then| {
                when.method(POST).path("/topics/trace-p2");
                then.status(503);
            })
            .await;

        let mut config = contracts::PublisherConfig::with_hosts([server.base_url()]);
        config.output.key = Some("t-%{[seq]}".to_string());
        ConfigLoader::validate(&config).unwrap();

        let metrics = Arc::new(PublishMetrics::new());
        let summary = Arc::new(MetricsObserver::new());
        let observer = FanoutObserver::default()
            .with(metrics.clone())
            .with(summary.clone());
        let dispatcher = create_dispatcher(&config, Arc::new(observer)).unwrap();
        dispatcher.connect().await.unwrap();

        let events = vec![
            event(1, "span", Some("p1")),
            event(2, "span", Some("p2")),
            event(3, "metric", Some("p1")),
        ];
        let (result, outcome) = publish(&dispatcher, &CancellationToken::new(), events).await;
        assert!(result.is_err());

        let BatchOutcome::Retry(retried) = outcome else {
            panic!("expected retry, got {outcome:?}");
        };
        assert_eq!(seqs(&retried), vec![2]);
        ok.assert_async().await;
        unavailable.assert_async().await;

        let snapshot = metrics.snapshot();
        assert_eq!((snapshot.acked, snapshot.failed, snapshot.dropped), (1, 1, 1));
        let summary = summary.summary();
        assert_eq!(summary.group_failures.get("trace-p2"), Some(&1));

        dispatcher.close().await.unwrap();
    }

    /// 文件发送端：配置加载 -> 发布 -> NDJSON 文件
    #[tokio::test]
    async fn test_file_publish_from_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
[output]
delivery_mode = "blocking"

[routing]
suppress_kinds = ["metric", "error"]

[sender]
sender_type = "file"

[sender.params]
dir = "{}"
"#,
            dir.path().display()
        );
        let config = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();

        let dispatcher =
            create_dispatcher(&config, Arc::new(PublishMetrics::new())).unwrap();
        dispatcher.connect().await.unwrap();

        let events = vec![
            event(1, "span", Some("p1")),
            event(2, "error", Some("p1")),
            event(3, "transaction", Some("p1")),
        ];
        let (result, outcome) = publish(&dispatcher, &CancellationToken::new(), events).await;
        assert!(result.is_ok());
        assert_eq!(outcome, BatchOutcome::Acked);

        let text = std::fs::read_to_string(dir.path().join("trace-p1.ndjson")).unwrap();
        let seqs: Vec<u64> = text
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["value"]["seq"]
                .as_u64()
                .unwrap())
            .collect();
        assert_eq!(seqs, vec![1, 3]);
    }
}
