//! SMS code polling state machine.

use super::config::WaitConfig;
use super::traits::CodeSource;
use crate::errors::{Result, VakSmsError};
use crate::types::{NumberId, SmsCode};
use crate::utils::clock::{SharedClock, TokioClock};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// State of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Delivery requested, no code yet.
    Waiting,
    /// A code arrived; holds the most recent one.
    CodeReceived(SmsCode),
    /// The timeout elapsed without a code.
    TimedOut,
}

/// Final state of a finished wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitReport {
    /// `CodeReceived` or `TimedOut`.
    pub state: PollState,
    /// Status checks issued.
    pub poll_count: u32,
    pub elapsed: Duration,
}

impl WaitReport {
    /// The received code, `None` on timeout.
    pub fn into_code(self) -> Option<SmsCode> {
        match self.state {
            PollState::CodeReceived(code) => Some(code),
            PollState::Waiting | PollState::TimedOut => None,
        }
    }
}

/// Waits for an SMS code by polling a [`CodeSource`].
///
/// The wait first requests delivery (status `send`), then alternates sleeping
/// and checking until a code arrives, the timeout elapses, or the
/// cancellation token fires. Errors from the source end the wait
/// immediately.
///
/// # Example
///
/// ```rust,ignore
/// use vak_sms::{SmsCodePoller, VakSms, WaitConfig};
///
/// let client = VakSms::with_api_key("api_key")?;
/// let poller = SmsCodePoller::new(client, WaitConfig::fast());
/// let report = poller.run(&"3adb61376b8f4adb90d6e758cf8c5db8".into()).await?;
/// println!("{:?} after {} polls", report.state, report.poll_count);
/// ```
#[derive(Debug, Clone)]
pub struct SmsCodePoller<S: CodeSource> {
    source: S,
    config: WaitConfig,
    clock: SharedClock,
}

impl<S: CodeSource> SmsCodePoller<S> {
    pub fn new(source: S, config: WaitConfig) -> Self {
        Self {
            source,
            config,
            clock: Arc::new(TokioClock),
        }
    }

    /// Use another time source.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Wait until a code arrives or the timeout elapses.
    pub async fn run(&self, number: &NumberId) -> Result<WaitReport> {
        self.run_cancellable(number, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but stops with [`VakSmsError::Cancelled`]
    /// as soon as `cancel` fires.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "vak_sms.wait_sms_code",
            skip_all,
            fields(number = %number)
        )
    )]
    pub async fn run_cancellable(
        &self,
        number: &NumberId,
        cancel: CancellationToken,
    ) -> Result<WaitReport> {
        self.config.validate()?;

        let timeout = self.config.timeout;
        let start = self.clock.now();
        let mut delays = self.config.strategy.delays();
        let mut poll_count = 0u32;

        let cancelled = |poll_count| VakSmsError::Cancelled {
            number: number.clone(),
            elapsed: self.clock.now().saturating_duration_since(start),
            poll_count,
        };

        self.until_cancelled(&cancel, self.source.request_delivery(number))
            .await
            .ok_or_else(|| cancelled(poll_count))??;

        #[cfg(feature = "tracing")]
        debug!(timeout_secs = %timeout.as_secs_f64(), "Delivery requested, waiting for SMS code");

        let mut state = PollState::Waiting;
        while state == PollState::Waiting {
            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= timeout {
                #[cfg(feature = "tracing")]
                warn!(
                    timeout_secs = %timeout.as_secs_f64(),
                    poll_count,
                    "Timeout reached without SMS code"
                );
                state = PollState::TimedOut;
                continue;
            }

            // Never sleep past the deadline; a poll always follows a sleep.
            let delay = delays
                .next()
                .unwrap_or_else(|| self.config.strategy.first_delay())
                .min(timeout - elapsed);

            self.until_cancelled(&cancel, self.clock.sleep(delay))
                .await
                .ok_or_else(|| cancelled(poll_count))?;

            poll_count += 1;
            let field = self
                .until_cancelled(&cancel, self.source.check_code(number))
                .await
                .ok_or_else(|| cancelled(poll_count))??;

            if let Some(code) = field.into_latest() {
                #[cfg(feature = "tracing")]
                info!(
                    poll_count,
                    elapsed_secs = %self.clock.now().saturating_duration_since(start).as_secs_f64(),
                    "SMS code received"
                );
                state = PollState::CodeReceived(code);
            }
        }

        Ok(WaitReport {
            state,
            poll_count,
            elapsed: self.clock.now().saturating_duration_since(start),
        })
    }

    /// Run `future` unless `cancel` fires first.
    async fn until_cancelled<F: Future>(
        &self,
        cancel: &CancellationToken,
        future: F,
    ) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            output = future => Some(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::VakSmsServiceError;
    use crate::polling::config::PollStrategy;
    use crate::types::SmsCodeField;
    use crate::utils::clock::ManualClock;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory source replaying scripted answers; empty once exhausted.
    #[derive(Debug, Default)]
    struct ScriptedSource {
        answers: Mutex<VecDeque<Result<SmsCodeField>>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedSource {
        fn new(answers: Vec<Result<SmsCodeField>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CodeSource for ScriptedSource {
        async fn request_delivery(&self, _number: &NumberId) -> Result<()> {
            self.calls.lock().unwrap().push("send");
            Ok(())
        }

        async fn check_code(&self, _number: &NumberId) -> Result<SmsCodeField> {
            self.calls.lock().unwrap().push("check");
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(SmsCodeField::default()))
        }
    }

    fn codes(codes: &[&str]) -> SmsCodeField {
        SmsCodeField::new(codes.iter().map(|c| SmsCode::new(*c)))
    }

    fn poller(
        source: Arc<ScriptedSource>,
        timeout: u64,
        interval: u64,
    ) -> (SmsCodePoller<Arc<ScriptedSource>>, ManualClock) {
        let clock = ManualClock::new();
        let config = WaitConfig::default()
            .with_timeout(Duration::from_secs(timeout))
            .with_poll_interval(Duration::from_secs(interval));
        let poller = SmsCodePoller::new(source, config).with_clock(Arc::new(clock.clone()));
        (poller, clock)
    }

    #[tokio::test]
    async fn test_timeout_equal_to_interval_polls_once() {
        let source = Arc::new(ScriptedSource::default());
        let (poller, clock) = poller(source.clone(), 5, 5);

        let report = poller.run(&NumberId::new("n1")).await.unwrap();

        assert_eq!(report.state, PollState::TimedOut);
        assert_eq!(report.poll_count, 1);
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
        assert_eq!(source.calls(), vec!["send", "check"]);
        assert_eq!(report.into_code(), None);
    }

    #[tokio::test]
    async fn test_interval_longer_than_timeout_is_clamped() {
        let source = Arc::new(ScriptedSource::default());
        let (poller, clock) = poller(source.clone(), 5, 60);

        let report = poller.run(&NumberId::new("n1")).await.unwrap();

        assert_eq!(report.poll_count, 1);
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_poll_count_is_ceiling_of_timeout_over_interval() {
        let source = Arc::new(ScriptedSource::default());
        let (poller, clock) = poller(source, 10, 3);

        let report = poller.run(&NumberId::new("n1")).await.unwrap();

        // Sleeps of 3, 3, 3 and a final 1.
        assert_eq!(report.poll_count, 4);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_zero_timeout_never_polls() {
        let source = Arc::new(ScriptedSource::default());
        let (poller, _clock) = poller(source.clone(), 0, 5);

        let report = poller.run(&NumberId::new("n1")).await.unwrap();

        assert_eq!(report.state, PollState::TimedOut);
        assert_eq!(report.poll_count, 0);
        assert_eq!(source.calls(), vec!["send"]);
    }

    #[tokio::test]
    async fn test_code_received_returns_latest() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(SmsCodeField::default()),
            Ok(codes(&["1111", "2222"])),
        ]));
        let (poller, clock) = poller(source.clone(), 60, 5);

        let report = poller.run(&NumberId::new("n1")).await.unwrap();

        assert_eq!(report.poll_count, 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
        assert_eq!(report.into_code(), Some(SmsCode::new("2222")));
        assert_eq!(source.calls(), vec!["send", "check", "check"]);
    }

    #[tokio::test]
    async fn test_source_error_ends_wait() {
        let source = Arc::new(ScriptedSource::new(vec![Err(VakSmsError::from(
            VakSmsServiceError::new("idNumNotFound"),
        ))]));
        let (poller, _clock) = poller(source.clone(), 60, 5);

        let error = poller.run(&NumberId::new("n1")).await.unwrap_err();

        assert_eq!(error.service_message(), Some("idNumNotFound"));
        assert_eq!(source.calls(), vec!["send", "check"]);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_polling() {
        let source = Arc::new(ScriptedSource::default());
        let (poller, _clock) = poller(source.clone(), 60, 5);
        let token = CancellationToken::new();
        token.cancel();

        let error = poller
            .run_cancellable(&NumberId::new("n1"), token)
            .await
            .unwrap_err();

        assert!(matches!(error, VakSmsError::Cancelled { poll_count: 0, .. }));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_sleep() {
        let source = Arc::new(ScriptedSource::default());
        let config = WaitConfig::default()
            .with_timeout(Duration::from_secs(3600))
            .with_poll_interval(Duration::from_secs(3600));
        let poller = SmsCodePoller::new(source.clone(), config);
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            })
        };

        let error = poller
            .run_cancellable(&NumberId::new("n1"), token)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(error, VakSmsError::Cancelled { poll_count: 0, .. }));
        assert_eq!(source.calls(), vec!["send"]);
    }

    #[tokio::test]
    async fn test_exponential_strategy_is_clamped_to_deadline() {
        let source = Arc::new(ScriptedSource::default());
        let clock = ManualClock::new();
        let config = WaitConfig::default()
            .with_timeout(Duration::from_secs(10))
            .with_strategy(PollStrategy::Exponential {
                initial: Duration::from_secs(4),
                factor: 2.0,
                max: Duration::from_secs(60),
            });
        let poller = SmsCodePoller::new(source, config).with_clock(Arc::new(clock.clone()));

        let report = poller.run(&NumberId::new("n1")).await.unwrap();

        // Sleeps of 4 and then 6 (8 clamped to the remaining budget).
        assert_eq!(report.poll_count, 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_delivery() {
        let source = Arc::new(ScriptedSource::default());
        let (poller, _clock) = poller(source.clone(), 5, 0);

        let error = poller.run(&NumberId::new("n1")).await.unwrap_err();

        assert!(matches!(error, VakSmsError::InvalidWaitConfig { .. }));
        assert!(source.calls().is_empty());
    }
}
