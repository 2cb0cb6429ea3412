use std::convert::TryFrom;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use futures_util::stream::StreamExt;
use http::header::{HeaderMap, HeaderValue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants;
use crate::demuxer::{DemuxMode, FrameDemuxer};
use crate::error::ErrorDetail;
use crate::frame::Frame;
use crate::helpers::{self, ContentClass};
use crate::polling;
use crate::transport::{FetchRequest, FetchResponse, Transport};

/// Receives everything a session produces.
///
/// Callbacks are invoked from the session task, strictly serialized and in
/// order; a slow sink backpressures the whole session.
pub trait FrameSink: Send + 'static {
    /// One decoded-part worth of image bytes, in arrival order.
    fn on_frame(&mut self, frame: Frame);

    /// A streaming run began (fired by [`StreamSession::start`], not by
    /// snapshots).
    fn on_start(&mut self) {}

    /// A streaming run ended, whether caller-initiated or terminal. Fired
    /// exactly once per run.
    fn on_stop(&mut self) {}

    /// The current attempt failed. `status` is the HTTP status when a
    /// response head was seen, `-1` otherwise; `detail.code` distinguishes
    /// the failure classes. Caller-initiated cancellation is never
    /// reported here.
    fn on_error(&mut self, status: i32, detail: ErrorDetail) {
        let _ = (status, detail);
    }
}

/// Credentials applied to the `Authorization` header. Exactly one scheme
/// is ever used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl Credentials {
    /// Resolves loose username/password/token inputs the way camera
    /// frontends supply them: Basic wins when both username and password
    /// are non-empty, otherwise a non-empty token means Bearer.
    pub fn from_parts(username: &str, password: &str, token: &str) -> Credentials {
        if !username.is_empty() && !password.is_empty() {
            Credentials::Basic {
                username: username.to_owned(),
                password: password.to_owned(),
            }
        } else if !token.is_empty() {
            Credentials::Bearer { token: token.to_owned() }
        } else {
            Credentials::None
        }
    }

    fn authorization(&self) -> Option<HeaderValue> {
        let value = match self {
            Credentials::None => return None,
            Credentials::Basic { username, password } => {
                format!("Basic {}", BASE64_STANDARD.encode(format!("{}:{}", username, password)))
            }
            Credentials::Bearer { token } => format!("Bearer {}", token),
        };

        match HeaderValue::try_from(value) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("credentials produce an invalid Authorization header: {}", err);
                None
            }
        }
    }
}

/// Configuration for one stream source.
///
/// # Examples
///
/// ```
/// use mjpeg_stream::{Credentials, StreamConfig};
///
/// let config = StreamConfig::new("http://camera.local/stream")
///     .credentials(Credentials::from_parts("admin", "hunter2", ""))
///     .connect_timeout_ms(5_000)
///     .refresh_interval_ms(1_000);
/// # let _ = config;
/// ```
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub(crate) url: String,
    pub(crate) credentials: Credentials,
    pub(crate) connect_timeout_ms: u64,
    pub(crate) refresh_interval_ms: u64,
}

impl StreamConfig {
    pub fn new<U: Into<String>>(url: U) -> StreamConfig {
        StreamConfig {
            url: url.into(),
            credentials: Credentials::None,
            connect_timeout_ms: constants::DEFAULT_CONNECT_TIMEOUT_MS,
            refresh_interval_ms: constants::DEFAULT_REFRESH_INTERVAL_MS,
        }
    }

    pub fn credentials(mut self, credentials: Credentials) -> StreamConfig {
        self.credentials = credentials;
        self
    }

    /// Bounds initial connection latency only, never total streaming
    /// duration. `0` disables the timer.
    pub fn connect_timeout_ms(mut self, millis: u64) -> StreamConfig {
        self.connect_timeout_ms = millis;
        self
    }

    /// Re-fetch interval after a single-image (non-multipart) response.
    /// `0` disables automatic refresh.
    pub fn refresh_interval_ms(mut self, millis: u64) -> StreamConfig {
        self.refresh_interval_ms = millis;
        self
    }
}

pub(crate) fn build_request(config: &StreamConfig) -> FetchRequest {
    let mut headers = HeaderMap::new();

    if let Some(value) = config.credentials.authorization() {
        headers.insert(http::header::AUTHORIZATION, value);
    }

    FetchRequest {
        url: config.url.clone(),
        headers,
    }
}

type SharedSink = Arc<Mutex<dyn FrameSink>>;

struct ActiveRun {
    run_id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct RunState {
    next_run_id: u64,
    active: Option<ActiveRun>,
}

/// One camera stream: owns the in-flight request handle, the demuxer of
/// the current attempt, and the connect/refresh timers.
///
/// `Idle -> Connecting -> Streaming -> (Idle | Connecting)`; [`stop`](StreamSession::stop)
/// is reachable from any non-idle state and cancels cooperatively. Each
/// attempt gets a fresh [`FrameDemuxer`]; nothing is shared between
/// attempts.
///
/// Must be used from within a tokio runtime.
pub struct StreamSession {
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    sink: SharedSink,
    state: Arc<Mutex<RunState>>,
}

impl StreamSession {
    pub fn new<T, S>(config: StreamConfig, transport: T, sink: S) -> StreamSession
    where
        T: Transport + 'static,
        S: FrameSink,
    {
        StreamSession {
            config,
            transport: Arc::new(transport),
            sink: Arc::new(Mutex::new(sink)),
            state: Arc::new(Mutex::new(RunState {
                next_run_id: 0,
                active: None,
            })),
        }
    }

    /// Begins streaming. Fires `on_start`, then runs attempts until the
    /// stream ends, an error is reported, or [`stop`](StreamSession::stop)
    /// is called. No-op while a run is already active.
    pub fn start(&self) {
        self.spawn(false);
    }

    /// One-shot: fetch exactly one frame, bypass refresh scheduling, and
    /// return to idle. No-op while a run is already active; does not fire
    /// `on_start`/`on_stop`.
    pub fn snapshot(&self) {
        self.spawn(true);
    }

    /// Cancels the active run, if any, and waits for it to wind down.
    /// Cancellation is expected, not exceptional: it produces `on_stop`
    /// but never `on_error`, and no frames are delivered after it.
    pub async fn stop(&self) {
        let active = match self.state.lock() {
            Ok(mut state) => state.active.take(),
            Err(err) => {
                log::error!("session state lock poisoned in stop: {}", err);
                return;
            }
        };

        if let Some(run) = active {
            run.cancel.cancel();
            let _ = run.handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.active.is_some())
            .unwrap_or(false)
    }

    fn spawn(&self, snapshot: bool) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(err) => {
                log::error!("session state lock poisoned in spawn: {}", err);
                return;
            }
        };

        if state.active.is_some() {
            log::debug!("session already running, ignoring {}", if snapshot { "snapshot" } else { "start" });
            return;
        }

        state.next_run_id += 1;
        let run_id = state.next_run_id;
        let cancel = CancellationToken::new();

        if !snapshot {
            with_sink(&self.sink, |sink| sink.on_start());
        }

        let handle = tokio::spawn(run_loop(
            self.config.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.sink),
            Arc::clone(&self.state),
            cancel.clone(),
            run_id,
            snapshot,
        ));

        state.active = Some(ActiveRun { run_id, cancel, handle });
    }
}

fn with_sink<F: FnOnce(&mut dyn FrameSink)>(sink: &SharedSink, f: F) {
    match sink.lock() {
        Ok(mut sink) => f(&mut *sink),
        Err(err) => log::error!("frame sink lock poisoned: {}", err),
    }
}

fn report(sink: &SharedSink, status: i32, err: crate::Error) {
    log::warn!("stream attempt failed (status {}): {}", status, err);
    let detail = err.detail();
    with_sink(sink, move |sink| sink.on_error(status, detail));
}

enum Outcome {
    /// Re-fetch after the refresh interval (single-image mode only).
    Refresh,
    /// The run is over: stream end, error already reported, or cancelled.
    Done,
}

async fn run_loop(
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    sink: SharedSink,
    state: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
    run_id: u64,
    snapshot: bool,
) {
    loop {
        match attempt(&config, &*transport, &sink, &cancel, snapshot).await {
            Outcome::Done => break,
            Outcome::Refresh => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(config.refresh_interval_ms)) => {}
                }
            }
        }
    }

    if !snapshot {
        with_sink(&sink, |sink| sink.on_stop());
    }

    // Return to idle unless stop() already took the slot or a newer run
    // replaced it.
    if let Ok(mut state) = state.lock() {
        if state.active.as_ref().map(|run| run.run_id) == Some(run_id) {
            state.active = None;
        }
    }
}

/// One streaming attempt: a single `GET`, dispatched on its content type.
async fn attempt(
    config: &StreamConfig,
    transport: &dyn Transport,
    sink: &SharedSink,
    cancel: &CancellationToken,
    snapshot: bool,
) -> Outcome {
    let fetch = transport.fetch(build_request(config));

    // The connect timer is disarmed as soon as the response head arrives;
    // it never bounds streaming duration.
    let fetched = tokio::select! {
        _ = cancel.cancelled() => return Outcome::Done,
        fetched = async {
            if config.connect_timeout_ms > 0 {
                match tokio::time::timeout(Duration::from_millis(config.connect_timeout_ms), fetch).await {
                    Ok(fetched) => fetched.map_err(crate::Error::Transport),
                    Err(_) => Err(crate::Error::ConnectTimeout),
                }
            } else {
                fetch.await.map_err(crate::Error::Transport)
            }
        } => fetched,
    };

    let response = match fetched {
        Ok(response) => response,
        Err(err) => {
            report(sink, -1, err);
            return Outcome::Done;
        }
    };

    let status = response.status.as_u16();

    if !response.status.is_success() {
        report(sink, i32::from(status), crate::Error::HttpStatus { status });
        return Outcome::Done;
    }

    let status = i32::from(status);

    match helpers::classify_content_type(response.content_type()) {
        ContentClass::Multipart { boundary, .. } => {
            let mode = match boundary {
                Some(boundary) => DemuxMode::Boundary(boundary),
                None => DemuxMode::BareJpeg,
            };
            demux_stream(response, mode, sink, cancel, snapshot, status).await
        }
        ContentClass::Image(mime) => {
            let data = tokio::select! {
                _ = cancel.cancelled() => return Outcome::Done,
                data = polling::drain_body(response.body) => data,
            };

            match data {
                Ok(data) => {
                    if cancel.is_cancelled() {
                        return Outcome::Done;
                    }
                    with_sink(sink, move |sink| sink.on_frame(Frame::new(mime, data)));

                    if snapshot || config.refresh_interval_ms == 0 {
                        Outcome::Done
                    } else {
                        Outcome::Refresh
                    }
                }
                Err(err) => {
                    report(sink, status, err);
                    Outcome::Done
                }
            }
        }
        ContentClass::Text { raw, mime } => {
            let data = tokio::select! {
                _ = cancel.cancelled() => return Outcome::Done,
                data = polling::drain_body(response.body) => data,
            };

            match data {
                Ok(data) => {
                    let text = helpers::decode_text(mime.as_ref(), &data);
                    report(sink, status, crate::Error::NonImagePayload { content_type: raw, text });
                }
                Err(err) => report(sink, status, err),
            }
            Outcome::Done
        }
        ContentClass::Unrecognized(content_type) => {
            report(sink, status, crate::Error::UnrecognizedContentType { content_type });
            Outcome::Done
        }
    }
}

/// Feeds the response body through a fresh demuxer until the stream ends,
/// something fails, or the run is cancelled.
async fn demux_stream(
    response: FetchResponse,
    mode: DemuxMode,
    sink: &SharedSink,
    cancel: &CancellationToken,
    snapshot: bool,
    status: i32,
) -> Outcome {
    let mut demuxer = FrameDemuxer::new(mode);
    let mut body = response.body;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Outcome::Done,
            chunk = body.next() => chunk,
        };

        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                report(sink, status, crate::Error::StreamReadFailed(err));
                return Outcome::Done;
            }
            // Server closed the stream.
            None => return Outcome::Done,
        };

        let frames = match demuxer.push(&chunk) {
            Ok(frames) => frames,
            Err(err) => {
                report(sink, status, err);
                return Outcome::Done;
            }
        };

        for frame in frames {
            if cancel.is_cancelled() {
                return Outcome::Done;
            }

            with_sink(sink, move |sink| sink.on_frame(frame));

            if snapshot {
                return Outcome::Done;
            }
        }

        if let Some(err) = demuxer.take_error() {
            report(sink, status, err);
            return Outcome::Done;
        }
    }
}
