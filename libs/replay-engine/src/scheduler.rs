use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use replay_api::{
    CloseReason, Rate, RecordSource, ReplaySink, SessionLog, SinkError, SourceError,
};

use crate::config::{PacingOptions, WaitStrategy};
use crate::error::ReplayError;
use crate::session::ReplaySession;

// ═══════════════════════════════════════════════════════════════
//  Outcome
// ═══════════════════════════════════════════════════════════════

/// Чем закончилась сессия. Все варианты — штатные завершения;
/// сбои источника и кодирования возвращаются как `ReplayError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Все записи отправлены.
    Completed { sent: usize },
    /// Source не знает такую сессию.
    NotFound,
    /// Лог пуст.
    Empty,
    /// Подписчик отключился (во время ожидания или отправки).
    PeerDisconnected { sent: usize },
    /// Отмена сверху (shutdown сервера).
    Cancelled { sent: usize },
    /// Отправка не уложилась в send timeout.
    Stalled { sent: usize },
}

impl ReplayOutcome {
    pub fn sent(&self) -> usize {
        match *self {
            ReplayOutcome::Completed { sent }
            | ReplayOutcome::PeerDisconnected { sent }
            | ReplayOutcome::Cancelled { sent }
            | ReplayOutcome::Stalled { sent } => sent,
            ReplayOutcome::NotFound | ReplayOutcome::Empty => 0,
        }
    }

    pub fn close_reason(&self) -> CloseReason {
        match self {
            ReplayOutcome::Completed { .. } => CloseReason::NormalCompletion,
            ReplayOutcome::NotFound => CloseReason::NoSuchSession,
            ReplayOutcome::Empty => CloseReason::EmptySession,
            ReplayOutcome::PeerDisconnected { .. } => CloseReason::PeerDisconnected,
            ReplayOutcome::Cancelled { .. } => CloseReason::ServerShutdown,
            ReplayOutcome::Stalled { .. } => CloseReason::SendTimeout,
        }
    }
}

/// Результат ожидания deadline'а записи.
enum Wake {
    Due,
    Disconnected,
    Cancelled,
}

// ═══════════════════════════════════════════════════════════════
//  ReplayScheduler
// ═══════════════════════════════════════════════════════════════

/// Воспроизводит лог сессии в sink, повторяя исходные интервалы
/// между записями (с учётом rate).
///
/// Один scheduler обслуживает все подключения: общего изменяемого
/// состояния нет, каждая сессия владеет своей копией лога и курсором.
#[derive(Clone)]
pub struct ReplayScheduler {
    source: Arc<dyn RecordSource>,
    options: PacingOptions,
}

impl ReplayScheduler {
    pub fn new(source: Arc<dyn RecordSource>, options: PacingOptions) -> Self {
        Self { source, options }
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    pub fn options(&self) -> PacingOptions {
        self.options
    }

    /// Загрузить сессию из source и воспроизвести её в `sink`.
    pub async fn replay(
        &self,
        session_id: &str,
        rate: Rate,
        sink: &mut dyn ReplaySink,
        token: &CancellationToken,
    ) -> Result<ReplayOutcome, ReplayError> {
        let log = match self.source.load_session(session_id).await {
            Ok(log) => log,
            Err(SourceError::NotFound(_)) => {
                tracing::info!(session = %session_id, "no such session");
                return Ok(ReplayOutcome::NotFound);
            }
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, "source error");
                return Err(ReplayError::Source(e));
            }
        };
        self.replay_log(&log, rate, sink, token).await
    }

    /// Pacing loop над уже загруженным логом.
    pub async fn replay_log(
        &self,
        log: &SessionLog,
        rate: Rate,
        sink: &mut dyn ReplaySink,
        token: &CancellationToken,
    ) -> Result<ReplayOutcome, ReplayError> {
        let Some(origin_ts_ms) = log.origin_ts_ms() else {
            tracing::info!(session = %log.session_id, "empty session");
            return Ok(ReplayOutcome::Empty);
        };

        let mut session = ReplaySession::start(origin_ts_ms, rate);
        tracing::info!(
            session = %log.session_id,
            %rate,
            records = log.len(),
            wait = ?self.options.wait,
            "replay started"
        );

        for record in log.iter() {
            let deadline = session.deadline(record);
            match self.wait_until(deadline, sink, token).await {
                Wake::Due => {}
                Wake::Disconnected => {
                    return Ok(self.finish(log, ReplayOutcome::PeerDisconnected {
                        sent: session.sequence_index(),
                    }));
                }
                Wake::Cancelled => {
                    return Ok(self.finish(log, ReplayOutcome::Cancelled {
                        sent: session.sequence_index(),
                    }));
                }
            }

            match tokio::time::timeout(self.options.send_timeout, sink.send(record)).await {
                Ok(Ok(())) => session.advance(),
                Ok(Err(SinkError::Closed)) => {
                    return Ok(self.finish(log, ReplayOutcome::PeerDisconnected {
                        sent: session.sequence_index(),
                    }));
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        session = %log.session_id,
                        index = session.sequence_index(),
                        error = %e,
                        "sink error"
                    );
                    return Err(ReplayError::Sink(e));
                }
                Err(_) => {
                    tracing::warn!(
                        session = %log.session_id,
                        index = session.sequence_index(),
                        timeout = ?self.options.send_timeout,
                        "send timed out, subscriber stalled"
                    );
                    return Ok(self.finish(log, ReplayOutcome::Stalled {
                        sent: session.sequence_index(),
                    }));
                }
            }
        }

        Ok(self.finish(log, ReplayOutcome::Completed {
            sent: session.sequence_index(),
        }))
    }

    /// Ждать `deadline`, параллельно следя за отменой и отключением sink'а.
    async fn wait_until(
        &self,
        deadline: Instant,
        sink: &mut dyn ReplaySink,
        token: &CancellationToken,
    ) -> Wake {
        loop {
            if token.is_cancelled() {
                return Wake::Cancelled;
            }
            if sink.is_closed() {
                return Wake::Disconnected;
            }

            let now = Instant::now();
            if now >= deadline {
                return Wake::Due;
            }

            let wake_at = match self.options.wait {
                WaitStrategy::Deadline => deadline,
                WaitStrategy::Poll => (now + self.options.poll_quantum).min(deadline),
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => return Wake::Cancelled,
                _ = sink.closed() => return Wake::Disconnected,
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    fn finish(&self, log: &SessionLog, outcome: ReplayOutcome) -> ReplayOutcome {
        tracing::info!(
            session = %log.session_id,
            sent = outcome.sent(),
            total = log.len(),
            reason = %outcome.close_reason(),
            "replay finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use serde_json::json;
    use source_memory::MemorySource;

    use replay_api::Record;

    use super::*;

    // ── Test sink ──

    #[derive(Default)]
    struct RecordingSink {
        /// (момент отправки, ts_ms записи)
        sent: Vec<(Instant, i64)>,
        attempts: usize,
        disconnected: CancellationToken,
        close_after: Option<usize>,
        stall_at: Option<usize>,
        send_delay: Duration,
        fail_encode: bool,
    }

    impl ReplaySink for RecordingSink {
        fn send<'a>(
            &'a mut self,
            record: &'a Record,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
            Box::pin(async move {
                self.attempts += 1;
                if self.disconnected.is_cancelled() {
                    return Err(SinkError::Closed);
                }
                if self.fail_encode {
                    return Err(SinkError::Encode("boom".into()));
                }
                if self.stall_at == Some(self.sent.len()) {
                    std::future::pending::<()>().await;
                }
                self.sent.push((Instant::now(), record.ts_ms()));
                if !self.send_delay.is_zero() {
                    tokio::time::sleep(self.send_delay).await;
                }
                if self.close_after == Some(self.sent.len()) {
                    self.disconnected.cancel();
                }
                Ok(())
            })
        }

        fn closed(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(self.disconnected.cancelled())
        }

        fn is_closed(&self) -> bool {
            self.disconnected.is_cancelled()
        }
    }

    impl RecordingSink {
        fn offsets_ms(&self, start: Instant) -> Vec<u128> {
            self.sent
                .iter()
                .map(|(at, _)| at.duration_since(start).as_millis())
                .collect()
        }

        fn timestamps(&self) -> Vec<i64> {
            self.sent.iter().map(|(_, ts)| *ts).collect()
        }
    }

    // ── Helpers ──

    fn log_of(ts: &[i64]) -> Vec<Record> {
        ts.iter()
            .enumerate()
            .map(|(i, ts_ms)| Record::from_value(json!({ "ts_ms": ts_ms, "seq": i })).unwrap())
            .collect()
    }

    fn scheduler(records: Vec<Record>, wait: WaitStrategy) -> ReplayScheduler {
        let source = MemorySource::new().with_session("s", records);
        ReplayScheduler::new(
            Arc::new(source),
            PacingOptions {
                wait,
                ..PacingOptions::default()
            },
        )
    }

    fn rate(r: f64) -> Rate {
        Rate::new(r).unwrap()
    }

    async fn run(
        sched: &ReplayScheduler,
        r: f64,
        sink: &mut RecordingSink,
    ) -> (Instant, Result<ReplayOutcome, ReplayError>) {
        let token = CancellationToken::new();
        let start = Instant::now();
        let outcome = sched.replay("s", rate(r), sink, &token).await;
        (start, outcome)
    }

    fn assert_close(actual: &[u128], expected: &[u128], tolerance: u128) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!(*a >= *e, "sent too early: {actual:?} vs {expected:?}");
            assert!(*a - *e <= tolerance, "sent too late: {actual:?} vs {expected:?}");
        }
    }

    // ── Scenarios ──

    #[tokio::test(start_paused = true)]
    async fn realtime_replay_matches_capture_offsets() {
        for wait in [WaitStrategy::Deadline, WaitStrategy::Poll] {
            let sched = scheduler(log_of(&[0, 1000, 2000]), wait);
            let mut sink = RecordingSink::default();

            let (start, outcome) = run(&sched, 1.0, &mut sink).await;

            assert_eq!(outcome.unwrap(), ReplayOutcome::Completed { sent: 3 });
            assert_eq!(sink.timestamps(), vec![0, 1000, 2000]);
            assert_close(&sink.offsets_ms(start), &[0, 1000, 2000], 15);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn double_rate_halves_offsets() {
        let sched = scheduler(log_of(&[0, 1000, 2000]), WaitStrategy::Deadline);
        let mut sink = RecordingSink::default();

        let (start, outcome) = run(&sched, 2.0, &mut sink).await;

        assert_eq!(outcome.unwrap(), ReplayOutcome::Completed { sent: 3 });
        assert_close(&sink.offsets_ms(start), &[0, 500, 1000], 15);
    }

    #[tokio::test(start_paused = true)]
    async fn half_rate_doubles_offsets() {
        let sched = scheduler(log_of(&[100, 350, 600]), WaitStrategy::Poll);
        let mut sink = RecordingSink::default();

        let (start, outcome) = run(&sched, 0.5, &mut sink).await;

        assert_eq!(outcome.unwrap(), ReplayOutcome::Completed { sent: 3 });
        assert_close(&sink.offsets_ms(start), &[0, 500, 1000], 15);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_session_sends_nothing() {
        let sched = ReplayScheduler::new(Arc::new(MemorySource::new()), PacingOptions::default());
        let mut sink = RecordingSink::default();

        let (_, outcome) = run(&sched, 1.0, &mut sink).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome, ReplayOutcome::NotFound);
        assert_eq!(outcome.close_reason(), CloseReason::NoSuchSession);
        assert_eq!(sink.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_session_sends_nothing() {
        let sched = scheduler(Vec::new(), WaitStrategy::Deadline);
        let mut sink = RecordingSink::default();

        let (_, outcome) = run(&sched, 1.0, &mut sink).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome, ReplayOutcome::Empty);
        assert_eq!(outcome.close_reason(), CloseReason::EmptySession);
        assert_eq!(sink.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_after_first_record_stops_loop() {
        for wait in [WaitStrategy::Deadline, WaitStrategy::Poll] {
            let sched = scheduler(log_of(&[0, 1000, 2000]), wait);
            let mut sink = RecordingSink {
                close_after: Some(1),
                ..Default::default()
            };

            let (start, outcome) = run(&sched, 1.0, &mut sink).await;

            assert_eq!(outcome.unwrap(), ReplayOutcome::PeerDisconnected { sent: 1 });
            assert_eq!(sink.attempts, 1);
            assert_eq!(sink.timestamps(), vec![0]);
            // Отключение замечено сразу, без ожидания deadline второй записи.
            assert!(start.elapsed() < Duration::from_millis(15));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_wait_is_observed_promptly() {
        let sched = scheduler(log_of(&[0, 5000]), WaitStrategy::Poll);
        let mut sink = RecordingSink::default();
        let disconnected = sink.disconnected.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1234)).await;
            disconnected.cancel();
        });

        let (start, outcome) = run(&sched, 1.0, &mut sink).await;

        assert_eq!(outcome.unwrap(), ReplayOutcome::PeerDisconnected { sent: 1 });
        assert_eq!(sink.attempts, 1);
        let elapsed = start.elapsed().as_millis();
        assert!((1234..=1234 + 10).contains(&elapsed), "{elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn identical_timestamps_go_back_to_back() {
        let sched = scheduler(log_of(&[0, 700, 700, 900]), WaitStrategy::Poll);
        let mut sink = RecordingSink::default();

        let (start, outcome) = run(&sched, 1.0, &mut sink).await;

        assert_eq!(outcome.unwrap(), ReplayOutcome::Completed { sent: 4 });
        let offsets = sink.offsets_ms(start);
        assert_close(&offsets, &[0, 700, 700, 900], 10);
        assert!(offsets[2] - offsets[1] <= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn late_records_are_sent_immediately_not_dropped() {
        let sched = scheduler(log_of(&[0, 1000, 2000, 2100]), WaitStrategy::Deadline);
        let mut sink = RecordingSink {
            send_delay: Duration::from_millis(1500),
            ..Default::default()
        };

        let (start, outcome) = run(&sched, 1.0, &mut sink).await;

        assert_eq!(outcome.unwrap(), ReplayOutcome::Completed { sent: 4 });
        assert_eq!(sink.timestamps(), vec![0, 1000, 2000, 2100]);
        assert_close(&sink.offsets_ms(start), &[0, 1500, 3000, 4500], 5);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_timestamp_does_not_wait() {
        let sched = scheduler(log_of(&[1000, 2000, 1500]), WaitStrategy::Deadline);
        let mut sink = RecordingSink::default();

        let (start, outcome) = run(&sched, 1.0, &mut sink).await;

        assert_eq!(outcome.unwrap(), ReplayOutcome::Completed { sent: 3 });
        assert_eq!(sink.timestamps(), vec![1000, 2000, 1500]);
        assert_close(&sink.offsets_ms(start), &[0, 1000, 1000], 5);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_runs_have_same_delays() {
        let sched = scheduler(log_of(&[0, 120, 480, 1000, 1003]), WaitStrategy::Poll);

        let mut deltas = Vec::new();
        for _ in 0..2 {
            let mut sink = RecordingSink::default();
            let (start, outcome) = run(&sched, 1.0, &mut sink).await;
            assert!(matches!(outcome.unwrap(), ReplayOutcome::Completed { sent: 5 }));
            let offsets = sink.offsets_ms(start);
            deltas.push(offsets.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>());
        }

        for (a, b) in deltas[0].iter().zip(&deltas[1]) {
            assert!(a.abs_diff(*b) <= 15, "{deltas:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn doubling_rate_halves_inter_record_delays() {
        let sched = scheduler(log_of(&[0, 400, 1000, 2200]), WaitStrategy::Deadline);

        let mut normal = RecordingSink::default();
        let (start_normal, _) = run(&sched, 1.0, &mut normal).await;
        let mut fast = RecordingSink::default();
        let (start_fast, _) = run(&sched, 2.0, &mut fast).await;

        let normal = normal.offsets_ms(start_normal);
        let fast = fast.offsets_ms(start_fast);
        for i in 1..normal.len() {
            let slow_delta = normal[i] - normal[i - 1];
            let fast_delta = fast[i] - fast[i - 1];
            assert!((slow_delta / 2).abs_diff(fast_delta) <= 15, "{normal:?} vs {fast:?}");
        }
    }

    // ── Lifecycle ──

    #[tokio::test(start_paused = true)]
    async fn upstream_cancellation_stops_loop() {
        let sched = scheduler(log_of(&[0, 1000, 2000]), WaitStrategy::Deadline);
        let mut sink = RecordingSink::default();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome = sched.replay("s", rate(1.0), &mut sink, &token).await.unwrap();

        assert_eq!(outcome, ReplayOutcome::Cancelled { sent: 2 });
        assert_eq!(outcome.close_reason(), CloseReason::ServerShutdown);
        assert_eq!(sink.attempts, 2);
        let elapsed = start.elapsed().as_millis();
        assert!((1500..=1505).contains(&elapsed), "{elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_send_is_bounded() {
        let sched = scheduler(log_of(&[0, 100, 200]), WaitStrategy::Deadline);
        let mut sink = RecordingSink {
            stall_at: Some(1),
            ..Default::default()
        };

        let (start, outcome) = run(&sched, 1.0, &mut sink).await;

        assert_eq!(outcome.unwrap(), ReplayOutcome::Stalled { sent: 1 });
        let expected = (Duration::from_millis(100) + PacingOptions::default().send_timeout).as_millis();
        let elapsed = start.elapsed().as_millis();
        assert!((expected..=expected + 5).contains(&elapsed), "{elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn encode_failure_is_an_error() {
        let sched = scheduler(log_of(&[0, 100]), WaitStrategy::Deadline);
        let mut sink = RecordingSink {
            fail_encode: true,
            ..Default::default()
        };

        let (_, outcome) = run(&sched, 1.0, &mut sink).await;

        assert!(matches!(outcome, Err(ReplayError::Sink(SinkError::Encode(_)))));
    }

    struct BrokenSource;

    impl RecordSource for BrokenSource {
        fn load_session(
            &self,
            _session_id: &str,
        ) -> Pin<Box<dyn Future<Output = Result<SessionLog, SourceError>> + Send + '_>> {
            Box::pin(async { Err(SourceError::Io("disk on fire".into())) })
        }

        fn sessions(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, SourceError>> + Send + '_>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn source_failure_is_terminal_error() {
        let sched = ReplayScheduler::new(Arc::new(BrokenSource), PacingOptions::default());
        let mut sink = RecordingSink::default();

        let (_, outcome) = run(&sched, 1.0, &mut sink).await;

        assert!(matches!(outcome, Err(ReplayError::Source(SourceError::Io(_)))));
        assert_eq!(sink.attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_independent() {
        let sched = scheduler(log_of(&[0, 300, 600]), WaitStrategy::Deadline);

        let a = {
            let sched = sched.clone();
            tokio::spawn(async move {
                let mut sink = RecordingSink::default();
                let (start, outcome) = run(&sched, 1.0, &mut sink).await;
                (sink.offsets_ms(start), outcome.unwrap())
            })
        };
        let b = {
            let sched = sched.clone();
            tokio::spawn(async move {
                let mut sink = RecordingSink {
                    close_after: Some(1),
                    ..Default::default()
                };
                let (_, outcome) = run(&sched, 3.0, &mut sink).await;
                outcome.unwrap()
            })
        };

        let (offsets, outcome_a) = a.await.unwrap();
        let outcome_b = b.await.unwrap();
        assert_eq!(outcome_a, ReplayOutcome::Completed { sent: 3 });
        assert_eq!(outcome_b, ReplayOutcome::PeerDisconnected { sent: 1 });
        assert_close(&offsets, &[0, 300, 600], 15);
    }
}
