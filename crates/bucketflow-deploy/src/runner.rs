//! CDK subprocess execution with live event streaming

use crate::consumer::{RunResult, RunState};
use crate::diagnose::{Analyzer, Diagnosis};
use crate::error::{DeployError, Result};
use crate::event::{DeployEvent, ResultStatus};
use crate::line::EventDecoder;
use crate::request::{CdkCommand, DeployRequest, Invocation};
use crate::session::DeploySession;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const READ_CHUNK: usize = 8192;
const TAIL_LINES: usize = 200;

/// Final state of one run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub last_error_message: Option<String>,
    pub cancelled: bool,
    pub diagnosis: Option<Diagnosis>,
    pub events: Vec<DeployEvent>,
}

impl RunOutcome {
    pub fn result(&self) -> RunResult {
        RunResult {
            success: self.success,
            last_error_message: self.last_error_message.clone(),
        }
    }
}

/// Which pipe a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Bookkeeping shared by both pipes while a run is live
struct Tracker<'a> {
    session: &'a DeploySession,
    state: RunState,
    tail: VecDeque<String>,
    last_stderr: Option<String>,
}

impl<'a> Tracker<'a> {
    fn new(session: &'a DeploySession) -> Self {
        let mut state = RunState::new();
        state.start();
        Self {
            session,
            state,
            tail: VecDeque::with_capacity(TAIL_LINES),
            last_stderr: None,
        }
    }

    fn emit(&mut self, stream: Stream, event: DeployEvent) {
        if self.tail.len() == TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(event.message.clone());
        if stream == Stream::Stderr {
            self.last_stderr = Some(event.message.clone());
        }
        self.state.observe(&event);
        self.session.push(event);
    }

    fn tail_text(&self) -> String {
        self.tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Runs CDK invocations and records their output into a session
#[derive(Clone, Default)]
pub struct Runner {
    analyzer: Arc<Analyzer>,
}

impl Runner {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Validate `request`, build the CDK call and run it
    pub async fn execute(
        &self,
        cdk: &CdkCommand,
        request: &DeployRequest,
        session: &DeploySession,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let invocation = cdk.invocation(request)?;
        self.run(&invocation, session, cancel).await
    }

    /// Spawn `invocation` and stream its output until it exits or `cancel`
    /// fires. Both pipes are decoded into events as they arrive.
    pub async fn run(
        &self,
        invocation: &Invocation,
        session: &DeploySession,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let shown = invocation.display();
        tracing::debug!("Running: {}", shown);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| DeployError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        session.open();
        let mut tracker = Tracker::new(session);
        tracker.emit(Stream::Stdout, DeployEvent::command_line(&shown));

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out_decoder = EventDecoder::new();
        let mut err_decoder = EventDecoder::new();
        let mut out_buf = vec![0u8; READ_CHUNK];
        let mut err_buf = vec![0u8; READ_CHUNK];
        let mut out_open = stdout.is_some();
        let mut err_open = stderr.is_some();
        let mut cancelled = false;

        while out_open || err_open {
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                r = read_chunk(&mut stdout, &mut out_buf), if out_open => (Stream::Stdout, r),
                r = read_chunk(&mut stderr, &mut err_buf), if err_open => (Stream::Stderr, r),
            };

            let (stream, decoder, buf, open) = match read.0 {
                Stream::Stdout => (Stream::Stdout, &mut out_decoder, &out_buf, &mut out_open),
                Stream::Stderr => (Stream::Stderr, &mut err_decoder, &err_buf, &mut err_open),
            };
            match read.1 {
                Ok(0) => *open = false,
                Ok(n) => {
                    for event in decoder.push(&buf[..n]) {
                        tracker.emit(stream, event);
                    }
                }
                Err(source) => {
                    tracing::warn!("Lost output of {}: {}", invocation.program, source);
                    if let Err(e) = child.kill().await {
                        tracing::debug!("Kill after read failure: {}", e);
                    }
                    return Err(DeployError::StreamBroken {
                        source,
                        captured: session.events(),
                    });
                }
            }
        }

        // Partial final lines are still events
        if let Some(event) = out_decoder.finish() {
            tracker.emit(Stream::Stdout, event);
        }
        if let Some(event) = err_decoder.finish() {
            tracker.emit(Stream::Stderr, event);
        }

        if cancelled {
            if let Err(e) = child.kill().await {
                tracing::debug!("Kill on cancel: {}", e);
            }
            tracker.state.cancel();
            session.push(DeployEvent::warn(format!("Cancelled: {}", shown)));
            tracing::info!("Run cancelled: {}", shown);
            return Ok(RunOutcome {
                success: false,
                exit_code: None,
                last_error_message: tracker.state.last_error_message().map(str::to_string),
                cancelled: true,
                diagnosis: None,
                events: session.events(),
            });
        }

        let status = child.wait().await.map_err(|source| DeployError::StreamBroken {
            source,
            captured: session.events(),
        })?;
        let exit_code = status.code();
        let result = tracker.state.finish(status.success());

        if result.success {
            session.push(DeployEvent::result(
                ResultStatus::Ok,
                format!("{} completed", shown),
            ));
            tracing::info!("Run succeeded: {}", shown);
            return Ok(RunOutcome {
                success: true,
                exit_code,
                last_error_message: result.last_error_message,
                cancelled: false,
                diagnosis: None,
                events: session.events(),
            });
        }

        let last_error_message = result
            .last_error_message
            .or_else(|| tracker.last_stderr.clone())
            .or_else(|| exit_code.map(|c| format!("exited with code {}", c)))
            .unwrap_or_else(|| "terminated by signal".to_string());
        tracing::warn!("Run failed ({:?}): {}", exit_code, last_error_message);

        session.push(DeployEvent::result(
            ResultStatus::Error,
            last_error_message.clone(),
        ));
        let diagnosis = self.analyzer.analyze(&tracker.tail_text(), Some(&shown));
        session.push(diagnosis.to_event());

        Ok(RunOutcome {
            success: false,
            exit_code,
            last_error_message: Some(last_error_message),
            cancelled: false,
            diagnosis: Some(diagnosis),
            events: session.events(),
        })
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => Ok(0),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::event::{EventType, Level};
    use std::time::Duration;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").arg("-c").arg(script)
    }

    async fn run(script: &str) -> RunOutcome {
        Runner::default()
            .run(&sh(script), &DeploySession::new(), CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_json_and_plain_lines() {
        let outcome = run(r#"echo '{"message":"Synthesizing","level":"info"}'; echo plain text"#).await;
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));

        let events = &outcome.events;
        assert_eq!(events[0].level, Level::Command);
        assert_eq!(events[1].message, "Synthesizing");
        assert_eq!(events[2].message, "plain text");
        let last = events.last().unwrap();
        assert_eq!(last.event_type, Some(EventType::Result));
        assert_eq!(last.status, Some(ResultStatus::Ok));
    }

    #[tokio::test]
    async fn test_failed_result_line_fails_clean_exit() {
        let outcome = run(
            r#"echo '{"type":"result","status":"error","level":"error","message":"Stack failed"}'; exit 0"#,
        )
        .await;
        assert!(!outcome.success);
        assert_eq!(outcome.last_error_message.as_deref(), Some("Stack failed"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_gets_intelligence() {
        let outcome = run("echo 'Unable to locate credentials' >&2; exit 3").await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(
            outcome.last_error_message.as_deref(),
            Some("Unable to locate credentials")
        );

        let intelligence = outcome
            .events
            .iter()
            .find(|e| e.event_type == Some(EventType::ErrorIntelligence))
            .unwrap();
        assert_eq!(intelligence.command.as_deref(), Some("aws sts get-caller-identity"));
        assert_eq!(outcome.diagnosis.unwrap().rule, "credentials");
    }

    #[tokio::test]
    async fn test_silent_failure_reports_exit_code() {
        let outcome = run("exit 7").await;
        assert_eq!(outcome.last_error_message.as_deref(), Some("exited with code 7"));
        assert_eq!(outcome.diagnosis.unwrap().rule, "fallback");
    }

    #[tokio::test]
    async fn test_unterminated_line_is_kept() {
        let outcome = run("printf 'no newline'").await;
        assert!(outcome.events.iter().any(|e| e.message == "no newline"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = Runner::default()
            .run(
                &Invocation::new("bucketflow-no-such-program"),
                &DeploySession::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Spawn { .. }));
        assert!(err.user_message().contains("not found"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_run() {
        let session = DeploySession::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = Runner::default()
            .run(&sh("echo started; sleep 30"), &session, cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(!outcome.success);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.events.last().unwrap().level, Level::Warn);
    }

    #[tokio::test]
    async fn test_subscriber_sees_live_events() {
        let session = DeploySession::new();
        let mut rx = session.subscribe();
        Runner::default()
            .run(&sh("echo hello"), &session, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().level, Level::Command);
        assert_eq!(rx.recv().await.unwrap().message, "hello");
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn test_invalid_request_never_spawns() {
        let mut request = DeployRequest::deploy("site-assets", "us-east-1");
        request.region = None;
        let session = DeploySession::new();
        let err = Runner::default()
            .execute(&CdkCommand::default(), &request, &session, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidRequest(_)));
        assert!(session.is_empty());
    }
}
