//! The single-connection dispatcher: owns the transport, allocates stream
//! ids, multiplexes in-flight requests, and fans server-pushed events out
//! to subscribers.
//!
//! The dispatcher is the real read loop for a connection rather than an
//! action log a caller must replay against a socket themselves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use wirebolt_proto::{CodecError, Compressor, Event, EventType, Frame, Opcode, Payload};

use crate::config::DispatcherConfig;
use crate::error::DriverError;
use crate::stream_id::StreamIdPool;

/// The handshake/lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No `STARTUP` has been sent yet.
    Connecting,
    /// `STARTUP` was sent; awaiting `READY` or `AUTHENTICATE`.
    StartupSent,
    /// The handshake completed; requests may be submitted.
    Ready,
    /// The server demanded authentication this core does not implement.
    /// Terminal: every subsequent `submit` fails with
    /// [`DriverError::Unsupported`].
    AuthRequired,
    /// The connection has failed or been closed. Terminal.
    Closed,
}

type Waiter = oneshot::Sender<Result<Payload, DriverError>>;

struct Shared<W> {
    write_half: tokio::sync::Mutex<W>,
    waiters: StdMutex<HashMap<i16, Waiter>>,
    event_subs: StdMutex<HashMap<EventType, Vec<mpsc::UnboundedSender<Event>>>>,
    stream_ids: StreamIdPool,
    state: StdMutex<ConnectionState>,
    compressor: Option<Arc<dyn Compressor>>,
    config: DispatcherConfig,
}

impl<W> Shared<W> {
    #[allow(clippy::expect_used)]
    fn state(&self) -> ConnectionState {
        *self.state.lock().expect("dispatcher state mutex poisoned")
    }

    #[allow(clippy::expect_used)]
    fn set_state(&self, new: ConnectionState) {
        let mut state = self.state.lock().expect("dispatcher state mutex poisoned");
        tracing::info!(from = ?*state, to = ?new, "connection state transition");
        *state = new;
    }

    /// Fails every outstanding waiter with `err` and transitions to
    /// `Closed`. Idempotent: calling this more than once (e.g. a write
    /// error after the read loop already closed the connection) is safe.
    #[allow(clippy::expect_used)]
    fn fail_all(&self, err: &DriverError) {
        let waiters: Vec<Waiter> = {
            let mut waiters = self.waiters.lock().expect("waiter map mutex poisoned");
            waiters.drain().map(|(_, sender)| sender).collect()
        };
        let count = waiters.len();
        for sender in waiters {
            let _ = sender.send(Err(err.clone()));
        }
        if count > 0 {
            tracing::error!(waiters_failed = count, error = %err, "connection closed, failing outstanding requests");
        }
        self.set_state(ConnectionState::Closed);
    }

    #[allow(clippy::expect_used)]
    fn dispatch_event(&self, event: Event) {
        let category = event_category(&event);
        let mut subs = self.event_subs.lock().expect("event subscriber map mutex poisoned");
        if let Some(senders) = subs.get_mut(&category) {
            senders.retain(|s| s.send(event.clone()).is_ok());
        }
    }
}

fn event_category(event: &Event) -> EventType {
    match event {
        Event::TopologyChange { .. } => EventType::TopologyChange,
        Event::StatusChange { .. } => EventType::StatusChange,
        Event::SchemaChange { .. } => EventType::SchemaChange,
    }
}

/// A handle to a running dispatcher. Cheaply `Clone`; every clone shares
/// the same underlying connection.
pub struct Dispatcher<W> {
    shared: Arc<Shared<W>>,
}

impl<W> Clone for Dispatcher<W> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T> Dispatcher<WriteHalf<T>>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Splits `transport` and spawns the read loop, returning a handle
    /// whose `submit` can be called from any task.
    #[must_use]
    pub fn spawn(
        transport: T,
        config: DispatcherConfig,
        compressor: Option<Arc<dyn Compressor>>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let shared = Arc::new(Shared {
            write_half: tokio::sync::Mutex::new(write_half),
            waiters: StdMutex::new(HashMap::new()),
            event_subs: StdMutex::new(HashMap::new()),
            stream_ids: StreamIdPool::new(config.stream_id_pool_size),
            state: StdMutex::new(ConnectionState::Connecting),
            compressor,
            config,
        });
        let read_loop_shared = Arc::clone(&shared);
        tokio::spawn(run_read_loop(read_loop_shared, read_half));
        Self { shared }
    }
}

impl<W> Dispatcher<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Advances the connection state. Used by [`crate::session::Session`]
    /// once it has interpreted the `STARTUP` response; not meant to be
    /// called by ordinary request/response flows.
    pub(crate) fn set_state(&self, new: ConnectionState) {
        self.shared.set_state(new);
    }

    /// Submits one request and awaits its response.
    ///
    /// Requests are only accepted in `Connecting` (for `STARTUP`/
    /// `OPTIONS`) or `Ready` (everything else); submitting in any other
    /// state fails immediately without performing I/O. Once a `STARTUP`
    /// frame is actually written, the connection moves from `Connecting`
    /// to `StartupSent`; the caller is responsible for advancing it to
    /// `Ready`/`AuthRequired` once the response arrives.
    #[allow(clippy::expect_used)]
    pub async fn submit(&self, opcode: Opcode, body: bytes::Bytes) -> Result<Payload, DriverError> {
        let state = self.shared.state();
        match state {
            ConnectionState::Closed => return Err(DriverError::ConnectionClosed),
            ConnectionState::AuthRequired => {
                return Err(DriverError::Unsupported(
                    "server demanded authentication, which this core does not implement".to_owned(),
                ));
            },
            ConnectionState::Ready => {},
            ConnectionState::Connecting | ConnectionState::StartupSent
                if matches!(opcode, Opcode::Startup | Opcode::Options) => {},
            _ => {
                return Err(DriverError::ProtocolViolation(format!(
                    "cannot submit opcode {opcode:?} before the handshake completes"
                )));
            },
        }

        let id = self.shared.stream_ids.acquire().await;
        let (tx, rx) = oneshot::channel();
        self.shared.waiters.lock().expect("waiter map mutex poisoned").insert(id, tx);

        let frame = Frame::request(id, opcode, body);
        // READY is only ever sent uncompressed; by extension this core
        // only compresses requests once the handshake has fully
        // completed.
        let compressor = if state == ConnectionState::Ready {
            self.shared.compressor.as_deref()
        } else {
            None
        };

        {
            let mut write_half = self.shared.write_half.lock().await;
            if let Err(err) = frame.write(&mut *write_half, compressor).await {
                let driver_err = DriverError::from(err);
                drop(write_half);
                self.shared.fail_all(&driver_err);
                return Err(driver_err);
            }
        }

        if opcode == Opcode::Startup && state == ConnectionState::Connecting {
            self.shared.set_state(ConnectionState::StartupSent);
        }

        rx.await.unwrap_or(Err(DriverError::ConnectionClosed))
    }

    /// Subscribes to a set of event categories, returning a receiver
    /// that yields events as they arrive. Call sites are expected to
    /// have already sent a matching `REGISTER` request via `submit`.
    #[allow(clippy::expect_used)]
    pub fn subscribe(&self, categories: &[EventType]) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = self.shared.event_subs.lock().expect("event subscriber map mutex poisoned");
        for category in categories {
            subs.entry(*category).or_default().push(tx.clone());
        }
        rx
    }

    /// Closes the connection from the caller's side, cancelling every
    /// outstanding waiter with [`DriverError::ConnectionClosed`].
    pub async fn close(&self) {
        let mut write_half = self.shared.write_half.lock().await;
        let _ = tokio::io::AsyncWriteExt::shutdown(&mut *write_half).await;
        drop(write_half);
        self.shared.fail_all(&DriverError::ConnectionClosed);
    }
}

#[allow(clippy::expect_used)]
async fn run_read_loop<R, W>(shared: Arc<Shared<W>>, mut read_half: R)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match Frame::read(
            &mut read_half,
            shared.config.max_frame_body_len,
            shared.compressor.as_deref(),
        )
        .await
        {
            Ok(frame) => frame,
            Err(err) => {
                shared.fail_all(&DriverError::from(err));
                return;
            },
        };

        if !frame.header.is_response() || !frame.header.opcode.is_response() {
            shared.fail_all(&DriverError::ProtocolViolation(format!(
                "inbound frame is not a response: version {:#04x} opcode {:?}",
                frame.header.version, frame.header.opcode
            )));
            return;
        }

        if frame.header.stream == -1 {
            match Payload::decode(frame.header.opcode, &frame.body) {
                Ok(Payload::Event(event)) => shared.dispatch_event(event),
                Ok(other) => {
                    tracing::warn!(opcode = ?other.opcode(), "non-event payload arrived on stream -1");
                },
                Err(err) => {
                    shared.fail_all(&DriverError::from(err));
                    return;
                },
            }
            continue;
        }

        let waiter = shared.waiters.lock().expect("waiter map mutex poisoned").remove(&frame.header.stream);
        shared.stream_ids.release(frame.header.stream);

        let Some(waiter) = waiter else {
            shared.fail_all(&DriverError::ProtocolViolation(format!(
                "response on unallocated stream {}",
                frame.header.stream
            )));
            return;
        };

        let result = decode_response_payload(frame);
        let _ = waiter.send(result);
    }
}

fn decode_response_payload(frame: Frame) -> Result<Payload, DriverError> {
    let payload = Payload::decode(frame.header.opcode, &frame.body).map_err(codec_to_driver_error)?;
    if let Payload::Error(err) = payload {
        return Err(DriverError::ServerError { code: err.code, message: err.message });
    }
    Ok(payload)
}

fn codec_to_driver_error(err: CodecError) -> DriverError {
    DriverError::from(err)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::duplex;
    use wirebolt_proto::{ErrorBody, Query, QueryParams, ResultBody, Startup};

    use super::*;
    use crate::config::DispatcherConfig;

    async fn write_frame<W: AsyncWrite + Unpin>(
        writer: &mut W,
        stream: i16,
        opcode: Opcode,
        payload: &Payload,
    ) {
        let mut header = Frame::request(stream, opcode, payload.encode());
        header.header.version |= 0x80;
        header.write(writer, None).await.expect("writes");
    }

    #[tokio::test]
    async fn submit_before_startup_only_allows_startup_and_options() {
        let (client, _server) = duplex(4096);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);

        let result = dispatcher.submit(Opcode::Query, Query {
            text: "SELECT 1".to_owned(),
            consistency: wirebolt_proto::Consistency::One,
            params: QueryParams::default(),
        }.encode()).await;

        assert!(matches!(result, Err(DriverError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn fatal_error_fails_every_outstanding_waiter_exactly_once() {
        let (client, mut server) = duplex(8192);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);
        dispatcher.set_state(ConnectionState::Ready);

        let d1 = dispatcher.clone();
        let d2 = dispatcher.clone();
        let d3 = dispatcher.clone();
        let fut1 = tokio::spawn(async move {
            d1.submit(Opcode::Query, Query {
                text: "A".to_owned(),
                consistency: wirebolt_proto::Consistency::One,
                params: QueryParams::default(),
            }.encode()).await
        });
        let fut2 = tokio::spawn(async move {
            d2.submit(Opcode::Query, Query {
                text: "B".to_owned(),
                consistency: wirebolt_proto::Consistency::One,
                params: QueryParams::default(),
            }.encode()).await
        });
        let fut3 = tokio::spawn(async move {
            d3.submit(Opcode::Query, Query {
                text: "C".to_owned(),
                consistency: wirebolt_proto::Consistency::One,
                params: QueryParams::default(),
            }.encode()).await
        });

        // Give the submits a moment to register their waiters, then drop
        // the server side of the duplex to simulate a transport failure.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(server);

        let (r1, r2, r3) = tokio::join!(fut1, fut2, fut3);
        for r in [r1, r2, r3] {
            let result = r.expect("task did not panic");
            assert!(matches!(result, Err(DriverError::ConnectionClosed) | Err(DriverError::BadData(_))));
        }
        assert_eq!(dispatcher.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn event_on_stream_negative_one_never_reaches_a_request_waiter() {
        let (client, mut server) = duplex(8192);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);
        dispatcher.set_state(ConnectionState::Ready);

        let mut events = dispatcher.subscribe(&[EventType::SchemaChange]);

        let d = dispatcher.clone();
        let query = tokio::spawn(async move {
            d.submit(Opcode::Query, Query {
                text: "USE system".to_owned(),
                consistency: wirebolt_proto::Consistency::One,
                params: QueryParams::default(),
            }.encode()).await
        });

        // Server pushes an event before answering the query.
        let event = Event::SchemaChange {
            change: "CREATED".to_owned(),
            target: "TABLE".to_owned(),
            names: vec!["ks".to_owned(), "t".to_owned()],
        };
        write_frame(&mut server, -1, Opcode::Event, &Payload::Event(event.clone())).await;

        let received = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event arrives")
            .expect("channel open");
        assert_eq!(received, event);

        // Now answer the actual query on its real stream id (0, the
        // first id handed out by the pool).
        write_frame(&mut server, 0, Opcode::Result, &Payload::Result(ResultBody::Void)).await;
        let result = tokio::time::timeout(Duration::from_secs(1), query)
            .await
            .expect("query task completes")
            .expect("task did not panic")
            .expect("query succeeds");
        assert_eq!(result, Payload::Result(ResultBody::Void));
    }

    #[tokio::test]
    async fn server_error_response_does_not_close_the_connection() {
        let (client, mut server) = duplex(8192);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);
        dispatcher.set_state(ConnectionState::Ready);

        let d = dispatcher.clone();
        let query = tokio::spawn(async move {
            d.submit(Opcode::Query, Query {
                text: "SELECT * FROM missing".to_owned(),
                consistency: wirebolt_proto::Consistency::One,
                params: QueryParams::default(),
            }.encode()).await
        });

        write_frame(
            &mut server,
            0,
            Opcode::Error,
            &Payload::Error(ErrorBody { code: 0x2200, message: "table missing not found".to_owned() }),
        )
        .await;

        let result = tokio::time::timeout(Duration::from_secs(1), query)
            .await
            .expect("completes")
            .expect("task did not panic");
        assert!(matches!(result, Err(DriverError::ServerError { code: 0x2200, .. })));
        assert_eq!(dispatcher.state(), ConnectionState::Ready);

        // The connection must still work after a non-fatal server error.
        let d2 = dispatcher.clone();
        let query2 = tokio::spawn(async move {
            d2.submit(Opcode::Query, Query {
                text: "USE system".to_owned(),
                consistency: wirebolt_proto::Consistency::One,
                params: QueryParams::default(),
            }.encode()).await
        });
        write_frame(&mut server, 1, Opcode::Result, &Payload::Result(ResultBody::Void)).await;
        let result2 = tokio::time::timeout(Duration::from_secs(1), query2)
            .await
            .expect("completes")
            .expect("task did not panic");
        assert_eq!(result2.expect("succeeds"), Payload::Result(ResultBody::Void));
    }

    #[tokio::test]
    async fn response_on_unallocated_stream_is_a_protocol_violation() {
        let (client, mut server) = duplex(8192);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);
        dispatcher.set_state(ConnectionState::Ready);

        write_frame(&mut server, 5, Opcode::Result, &Payload::Result(ResultBody::Void)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn malformed_version_byte_fails_every_outstanding_waiter() {
        let (client, mut server) = duplex(8192);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);
        dispatcher.set_state(ConnectionState::Ready);

        let d = dispatcher.clone();
        let query = tokio::spawn(async move {
            d.submit(Opcode::Query, Query {
                text: "SELECT 1".to_owned(),
                consistency: wirebolt_proto::Consistency::One,
                params: QueryParams::default(),
            }.encode()).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A v3 response header (0x83): version nibble matches but the
        // response-direction bit is set over the wrong base version.
        let header = [0x83_u8, 0x00, 0x00, 0x00, Opcode::Ready.as_u8(), 0x00, 0x00, 0x00, 0x00];
        tokio::io::AsyncWriteExt::write_all(&mut server, &header).await.expect("writes header");

        let result = tokio::time::timeout(Duration::from_secs(1), query)
            .await
            .expect("completes")
            .expect("task did not panic");
        assert!(matches!(result, Err(DriverError::BadData(_))));
        assert_eq!(dispatcher.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn startup_round_trips_through_connecting_state() {
        let (client, mut server) = duplex(8192);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);

        let d = dispatcher.clone();
        let startup = tokio::spawn(async move {
            d.submit(Opcode::Startup, Startup::new("3.4.4", None).encode()).await
        });

        write_frame(&mut server, 0, Opcode::Ready, &Payload::Ready).await;
        let result = tokio::time::timeout(Duration::from_secs(1), startup)
            .await
            .expect("completes")
            .expect("task did not panic")
            .expect("startup succeeds");
        assert_eq!(result, Payload::Ready);
    }

    #[tokio::test]
    async fn submitting_startup_moves_through_startup_sent_before_ready() {
        let (client, mut server) = duplex(8192);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);

        let d = dispatcher.clone();
        let startup = tokio::spawn(async move {
            d.submit(Opcode::Startup, Startup::new("3.4.4", None).encode()).await
        });

        // Give `submit` time to write the frame and transition state
        // before the server answers.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.state(), ConnectionState::StartupSent);

        write_frame(&mut server, 0, Opcode::Ready, &Payload::Ready).await;
        tokio::time::timeout(Duration::from_secs(1), startup)
            .await
            .expect("completes")
            .expect("task did not panic")
            .expect("startup succeeds");
    }

    #[tokio::test]
    async fn request_direction_frame_is_rejected_even_with_a_response_opcode() {
        let (client, mut server) = duplex(8192);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);
        dispatcher.set_state(ConnectionState::Ready);

        let d = dispatcher.clone();
        let query = tokio::spawn(async move {
            d.submit(Opcode::Query, Query {
                text: "SELECT 1".to_owned(),
                consistency: wirebolt_proto::Consistency::One,
                params: QueryParams::default(),
            }.encode()).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Version `0x04`: a well-formed opcode (`Ready`) but missing the
        // response-direction bit.
        let header = [0x04_u8, 0x00, 0x00, 0x00, Opcode::Ready.as_u8(), 0x00, 0x00, 0x00, 0x00];
        tokio::io::AsyncWriteExt::write_all(&mut server, &header).await.expect("writes header");

        let result = tokio::time::timeout(Duration::from_secs(1), query)
            .await
            .expect("completes")
            .expect("task did not panic");
        assert!(matches!(result, Err(DriverError::ProtocolViolation(_))));
        assert_eq!(dispatcher.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn response_direction_frame_with_a_request_opcode_is_rejected() {
        let (client, mut server) = duplex(8192);
        let dispatcher = Dispatcher::spawn(client, DispatcherConfig::default(), None);
        dispatcher.set_state(ConnectionState::Ready);

        let d = dispatcher.clone();
        let query = tokio::spawn(async move {
            d.submit(Opcode::Query, Query {
                text: "SELECT 1".to_owned(),
                consistency: wirebolt_proto::Consistency::One,
                params: QueryParams::default(),
            }.encode()).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Version `0x84`: correct response direction, but `Query` is a
        // request-only opcode.
        let header = [0x84_u8, 0x00, 0x00, 0x00, Opcode::Query.as_u8(), 0x00, 0x00, 0x00, 0x00];
        tokio::io::AsyncWriteExt::write_all(&mut server, &header).await.expect("writes header");

        let result = tokio::time::timeout(Duration::from_secs(1), query)
            .await
            .expect("completes")
            .expect("task did not panic");
        assert!(matches!(result, Err(DriverError::ProtocolViolation(_))));
        assert_eq!(dispatcher.state(), ConnectionState::Closed);
    }
}
