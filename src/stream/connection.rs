//! Reader loop and reconnect coordination for one event source.
//!
//! [`StreamConnection`] owns the task that opens the connection, reads it
//! line by line and reopens it whenever it ends. It is also the
//! [`Coordinator`] its watchdog talks to.
//!
//! Lines are read as raw bytes. A line that is not valid UTF-8 is dropped;
//! only I/O errors and end of stream close the connection.
//!
//! # Reconnect
//!
//! `reconnect()` cancels the read of the current connection. Calls made while
//! a reconnect is already pending are counted but otherwise coalesce into it.
//! The pending flag clears once the next connection is established.
//!
//! # Lifecycle
//!
//! ```text
//! connect ──ok──▶ serve ──eof/error/reconnect──▶ sleep(initial) ──▶ connect
//!    │
//!    └─err──▶ sleep(backoff(failures)) ──▶ connect
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::Provider;
use crate::watchdog::{StreamWatchdog, WatchdogConfig};
use crate::worker::{Work, WorkQueue};

use super::backoff::ReconnectConfig;
use super::connector::Connector;
use super::{ConnectionListener, ConnectionState, Coordinator};

/// Handle to the stream reader. Cloning yields another handle to the same
/// connection.
pub struct StreamConnection<C: Connector> {
    inner: Arc<ConnectionInner<C>>,
}

impl<C: Connector> Clone for StreamConnection<C> {
    fn clone(&self) -> Self {
        StreamConnection {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ConnectionInner<C: Connector> {
    connector: C,
    provider: Provider,
    queue: WorkQueue<Work>,
    watchdog: WatchdogConfig,
    backoff: ReconnectConfig,
    listeners: RwLock<Vec<Arc<dyn ConnectionListener>>>,
    /// Cancels the read of the connection currently being served.
    current: Mutex<Option<CancellationToken>>,
    reconnect_pending: AtomicBool,
    state: ConnectionState,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connector> StreamConnection<C> {
    pub fn new(
        connector: C,
        provider: Provider,
        queue: WorkQueue<Work>,
        watchdog: WatchdogConfig,
        backoff: ReconnectConfig,
    ) -> Self {
        StreamConnection {
            inner: Arc::new(ConnectionInner {
                connector,
                provider,
                queue,
                watchdog,
                backoff,
                listeners: RwLock::new(Vec::new()),
                current: Mutex::new(None),
                reconnect_pending: AtomicBool::new(false),
                state: ConnectionState::new(),
                shutdown: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Starts the reader task. Calling it again while running does nothing.
    pub fn start(&self) {
        let mut task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.is_none() && !self.inner.shutdown.is_cancelled() {
            *task = Some(tokio::spawn(Arc::clone(&self.inner).run()));
        }
    }

    /// Stops reading and closes the connection. Work already queued is left
    /// for the workers.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Stream reader task failed");
            }
        }
        self.inner.state.set_connected(false);
        info!(provider = %self.inner.provider, "Stream connection shut down");
    }

    pub fn provider(&self) -> &Provider {
        &self.inner.provider
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.clone()
    }

    /// The queue lines are posted to.
    pub fn work_queue(&self) -> &WorkQueue<Work> {
        &self.inner.queue
    }

    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn remove_connection_listener(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
        listeners.len() != before
    }
}

impl<C: Connector> Coordinator for StreamConnection<C> {
    fn reconnect(&self) {
        self.inner.reconnect();
    }
}

impl<C: Connector> Coordinator for ConnectionInner<C> {
    fn reconnect(&self) {
        self.state.record_reconnect();
        if self.reconnect_pending.swap(true, Ordering::SeqCst) {
            debug!("Reconnect already pending");
            return;
        }
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match current {
            Some(token) => {
                info!(provider = %self.provider, "Reconnect requested; closing connection");
                token.cancel();
            }
            None => debug!("Reconnect requested while not connected"),
        }
    }
}

impl<C: Connector> ConnectionInner<C> {
    fn listeners(&self) -> Vec<Arc<dyn ConnectionListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sleeps unless shut down first. Returns false on shutdown.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    #[instrument(skip(self), fields(provider = %self.provider))]
    async fn run(self: Arc<Self>) {
        let mut failures: u32 = 0;
        loop {
            let connected = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                result = self.connector.connect() => result,
            };

            let delay = match connected {
                Ok(stream) => {
                    failures = 0;
                    self.serve(stream).await;
                    self.backoff.initial_delay
                }
                Err(e) => {
                    let delay = self.backoff.delay_for_attempt(failures);
                    failures = failures.saturating_add(1);
                    warn!(
                        error = %e,
                        attempt = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "Could not connect to event stream"
                    );
                    delay
                }
            };

            if self.shutdown.is_cancelled() || !self.pause(delay).await {
                break;
            }
        }
        debug!("Stream reader stopped");
    }

    async fn serve(self: &Arc<Self>, mut stream: C::Stream) {
        let token = self.shutdown.child_token();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        self.reconnect_pending.store(false, Ordering::SeqCst);

        let watchdog = self.watchdog.is_enabled().then(|| {
            let coordinator: Arc<dyn Coordinator> = Arc::clone(self) as Arc<dyn Coordinator>;
            StreamWatchdog::spawn(coordinator, self.watchdog.clone())
        });

        self.state.set_connected(true);
        info!("Connection established");
        for listener in self.listeners() {
            listener.connection_established(&self.provider);
        }

        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Connection closed on request");
                    break;
                }
                read = stream.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    info!("Event stream ended");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Error reading event stream");
                    break;
                }
            }

            if let Some(watchdog) = &watchdog {
                watchdog.signal();
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim_end_matches('\n').trim_end_matches('\r'),
                Err(e) => {
                    debug!(error = %e, bytes = buf.len(), "Dropping line that is not UTF-8");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let work = Work::StreamLine {
                line: line.to_string(),
                provider: self.provider.clone(),
            };
            let submitted = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = self.queue.submit(work) => result,
            };
            if let Err(e) = submitted {
                warn!(error = %e, "Dropping line");
            }
        }

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if let Some(watchdog) = watchdog {
            watchdog.shutdown();
        }
        self.state.set_connected(false);
        for listener in self.listeners() {
            listener.connection_down(&self.provider);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ConnectionError;
    use crate::watchdog::WatchTimeExceptions;
    use crate::worker::WorkReceiver;
    use crate::worker::queue::bounded;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
    use tokio::time::Instant;

    // ─── Test Helpers ─────────────────────────────────────────────────────────

    enum Session {
        Fail,
        /// Sends the text, then closes.
        Lines(&'static str),
        /// Sends the text and stays open.
        Open(&'static str),
        /// Sends raw bytes and stays open.
        OpenBytes(&'static [u8]),
    }

    /// Plays back scripted sessions; once exhausted, every connection stays
    /// open and silent.
    #[derive(Default)]
    struct ScriptedConnector {
        sessions: Mutex<VecDeque<Session>>,
        connects: AtomicUsize,
        held: Mutex<Vec<DuplexStream>>,
    }

    impl ScriptedConnector {
        fn new(sessions: Vec<Session>) -> Self {
            ScriptedConnector {
                sessions: Mutex::new(sessions.into()),
                ..Default::default()
            }
        }
    }

    impl Connector for Arc<ScriptedConnector> {
        type Stream = BufReader<DuplexStream>;

        async fn connect(&self) -> Result<Self::Stream, ConnectionError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let session = self
                .sessions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Session::Open(""));
            let (reader, mut writer) = tokio::io::duplex(64 * 1024);
            match session {
                Session::Fail => {
                    return Err(ConnectionError::Refused {
                        host: "test".into(),
                        port: 1,
                    });
                }
                Session::Lines(text) => {
                    writer.write_all(text.as_bytes()).await?;
                }
                Session::Open(text) => {
                    writer.write_all(text.as_bytes()).await?;
                    self.held.lock().unwrap().push(writer);
                }
                Session::OpenBytes(bytes) => {
                    writer.write_all(bytes).await?;
                    self.held.lock().unwrap().push(writer);
                }
            }
            Ok(BufReader::new(reader))
        }
    }

    #[derive(Default)]
    struct UpDown {
        calls: Mutex<Vec<&'static str>>,
    }

    impl ConnectionListener for UpDown {
        fn connection_established(&self, _provider: &Provider) {
            self.calls.lock().unwrap().push("up");
        }

        fn connection_down(&self, _provider: &Provider) {
            self.calls.lock().unwrap().push("down");
        }
    }

    fn provider() -> Provider {
        Provider::new("gerrit", "review.example.com", 29418)
    }

    fn connection(
        connector: &Arc<ScriptedConnector>,
        watchdog: WatchdogConfig,
    ) -> (StreamConnection<Arc<ScriptedConnector>>, WorkReceiver<Work>) {
        let (queue, rx) = bounded(64);
        let connection = StreamConnection::new(
            Arc::clone(connector),
            provider(),
            queue,
            watchdog,
            ReconnectConfig::DEFAULT,
        );
        (connection, rx)
    }

    async fn next_line(rx: &mut WorkReceiver<Work>) -> String {
        match rx.recv().await {
            Some(Work::StreamLine { line, provider: p }) => {
                assert_eq!(p, provider());
                line
            }
            other => panic!("expected a stream line, got {other:?}"),
        }
    }

    // ─── Reading ──────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn posts_each_non_empty_line() {
        let connector = Arc::new(ScriptedConnector::new(vec![Session::Open("a\n\n  \nb\n")]));
        let (connection, mut rx) = connection(&connector, WatchdogConfig::default());
        connection.start();

        assert_eq!(next_line(&mut rx).await, "a");
        assert_eq!(next_line(&mut rx).await, "b");
        assert!(connection.state().is_connected());
        connection.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_utf8_line_is_skipped_without_reconnecting() {
        let connector = Arc::new(ScriptedConnector::new(vec![Session::OpenBytes(
            b"\xff\xfe garbage\n{\"ok\":1}\n",
        )]));
        let (connection, mut rx) = connection(&connector, WatchdogConfig::default());
        connection.start();

        assert_eq!(next_line(&mut rx).await, r#"{"ok":1}"#);
        assert!(connection.state().is_connected());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        connection.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn crlf_line_endings_are_stripped() {
        let connector = Arc::new(ScriptedConnector::new(vec![Session::Open("a\r\nb\r\n")]));
        let (connection, mut rx) = connection(&connector, WatchdogConfig::default());
        connection.start();

        assert_eq!(next_line(&mut rx).await, "a");
        assert_eq!(next_line(&mut rx).await, "b");
        connection.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reopens_after_stream_ends() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            Session::Lines("a\n"),
            Session::Open("b\n"),
        ]));
        let (connection, mut rx) = connection(&connector, WatchdogConfig::default());
        let started = Instant::now();
        connection.start();

        assert_eq!(next_line(&mut rx).await, "a");
        assert_eq!(next_line(&mut rx).await, "b");
        assert!(started.elapsed() >= ReconnectConfig::DEFAULT.initial_delay);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        connection.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_back_off_exponentially() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            Session::Fail,
            Session::Fail,
            Session::Open("x\n"),
        ]));
        let (connection, mut rx) = connection(&connector, WatchdogConfig::default());
        let started = Instant::now();
        connection.start();

        assert_eq!(next_line(&mut rx).await, "x");
        assert!(started.elapsed() >= Duration::from_secs(2 + 4));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        connection.shutdown().await;
    }

    // ─── Reconnect ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn reconnect_closes_current_connection() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            Session::Open("a\n"),
            Session::Open("b\n"),
        ]));
        let (connection, mut rx) = connection(&connector, WatchdogConfig::default());
        connection.start();

        assert_eq!(next_line(&mut rx).await, "a");
        connection.reconnect();
        assert_eq!(next_line(&mut rx).await, "b");

        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(connection.state().reconnect_count(), 1);
        connection.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_reconnects_coalesce() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            Session::Open("a\n"),
            Session::Open("b\n"),
        ]));
        let (connection, mut rx) = connection(&connector, WatchdogConfig::default());
        connection.start();

        assert_eq!(next_line(&mut rx).await, "a");
        connection.reconnect();
        connection.reconnect();
        connection.reconnect();
        assert_eq!(next_line(&mut rx).await, "b");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(connection.state().reconnect_count(), 3);
        connection.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_stream_is_reopened_by_watchdog() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            Session::Open("a\n"),
            Session::Open("b\n"),
        ]));
        let watchdog = WatchdogConfig::new(Duration::from_secs(5), WatchTimeExceptions::default())
            .with_check_schedule(Duration::from_secs(1), Duration::from_secs(1));
        let (connection, mut rx) = connection(&connector, watchdog);
        connection.start();

        assert_eq!(next_line(&mut rx).await, "a");
        assert_eq!(next_line(&mut rx).await, "b");
        assert!(connection.state().reconnect_count() >= 1);
        connection.shutdown().await;
    }

    // ─── Listeners and shutdown ───────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn listeners_see_connection_going_up_and_down() {
        let connector = Arc::new(ScriptedConnector::new(vec![Session::Lines("a\n")]));
        let (connection, mut rx) = connection(&connector, WatchdogConfig::default());
        let listener = Arc::new(UpDown::default());
        connection.add_connection_listener(listener.clone());
        connection.start();

        assert_eq!(next_line(&mut rx).await, "a");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*listener.calls.lock().unwrap(), vec!["up", "down"]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*listener.calls.lock().unwrap(), vec!["up", "down", "up"]);
        connection.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_reader_and_disconnects() {
        let connector = Arc::new(ScriptedConnector::new(vec![Session::Open("a\n")]));
        let (connection, mut rx) = connection(&connector, WatchdogConfig::default());
        connection.start();
        assert_eq!(next_line(&mut rx).await, "a");

        connection.shutdown().await;
        assert!(!connection.state().is_connected());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        connection.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }
}
