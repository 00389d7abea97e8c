//! The high-level coordinator: drives the startup handshake, owns the
//! prepared-statement cache, and exposes
//! `execute`/`prepare`/`register`/`close` to callers.
//!
//! This core's dispatcher already drives I/O as a spawned task, so the
//! session layer here is a thin coordinator over it rather than a log of
//! actions a caller must replay against a socket themselves.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use wirebolt_proto::{
    BindValue, Consistency, Event, EventType, Execute, Opcode, Payload, Prepare, Query,
    QueryParams, Register, ResultBody, ResultMetadata, Startup, Value, encode_value,
};

use crate::config::SessionConfig;
use crate::dispatcher::{ConnectionState, Dispatcher};
use crate::error::DriverError;

/// A cached prepared statement: the server-assigned id plus the column
/// metadata needed to bind parameters and to interpret the rows it
/// returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedHandle {
    /// Opaque id the server expects on every subsequent `EXECUTE`.
    pub id: Bytes,
    /// Bind-parameter column specs, in positional order.
    pub bind_metadata: ResultMetadata,
    /// Result-set column specs for rows this statement returns.
    pub result_metadata: ResultMetadata,
}

/// A handle to one connection. Cheaply `Clone`; every clone shares the
/// same dispatcher and prepared-statement cache, so callers can freely
/// pass a `Session` across tasks.
pub struct Session<T> {
    dispatcher: Dispatcher<WriteHalf<T>>,
    prepared: Arc<AsyncMutex<HashMap<String, Arc<PreparedHandle>>>>,
    config: SessionConfig,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            prepared: Arc::clone(&self.prepared),
            config: self.config.clone(),
        }
    }
}

fn compressor_for(name: &str) -> Result<Arc<dyn wirebolt_proto::Compressor>, DriverError> {
    wirebolt_proto::resolve_compressor(name).map_err(|_unknown| {
        DriverError::Unsupported(format!("compression algorithm {name} is not compiled into this build"))
    })
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Opens a connection over `transport`: spawns the dispatcher, sends
    /// `STARTUP` with `config`'s CQL version and optional compression,
    /// and waits for `READY`.
    ///
    /// Fails with [`DriverError::HandshakeTimeout`] if the handshake does
    /// not complete within `config.handshake_timeout`, with
    /// [`DriverError::Unsupported`] if the server demands authentication,
    /// and with [`DriverError::ProtocolViolation`] if it answers `STARTUP`
    /// with anything else.
    pub async fn connect(transport: T, config: SessionConfig) -> Result<Self, DriverError> {
        let compressor = match &config.compression {
            Some(name) => Some(compressor_for(name)?),
            None => None,
        };
        let dispatcher = Dispatcher::spawn(transport, config.dispatcher, compressor);

        let startup = Startup::new(&config.cql_version, config.compression.as_deref());
        let response = tokio::time::timeout(
            config.handshake_timeout,
            dispatcher.submit(Opcode::Startup, Payload::Startup(startup).encode()),
        )
        .await
        .map_err(|_elapsed| DriverError::HandshakeTimeout(config.handshake_timeout))??;

        match response {
            Payload::Ready => dispatcher.set_state(ConnectionState::Ready),
            Payload::Authenticate(_) => {
                dispatcher.set_state(ConnectionState::AuthRequired);
                return Err(DriverError::Unsupported(
                    "server demanded authentication, which this core does not implement".to_owned(),
                ));
            },
            other => {
                return Err(DriverError::ProtocolViolation(format!(
                    "unexpected response to STARTUP: {other:?}"
                )));
            },
        }

        Ok(Self { dispatcher, prepared: Arc::new(AsyncMutex::new(HashMap::new())), config })
    }

    /// Executes `query`. With no bind values this sends a plain `QUERY`;
    /// otherwise it prepares the statement (reusing a cached handle if
    /// one already exists for this exact text) and sends `EXECUTE`.
    ///
    /// A values/bind-metadata arity or type mismatch is reported as
    /// [`DriverError::BadParameter`] before any request is written.
    pub async fn execute(
        &self,
        query: &str,
        values: &[Value],
        consistency: Consistency,
    ) -> Result<ResultBody, DriverError> {
        if values.is_empty() {
            let payload = Payload::Query(Query {
                text: query.to_owned(),
                consistency,
                params: QueryParams::default(),
            });
            return self.submit_result(payload).await;
        }

        let handle = self.prepare(query).await?;
        let bind_values = bind_values_for(values, &handle.bind_metadata)?;
        let payload = Payload::Execute(Execute {
            prepared_id: handle.id.clone(),
            consistency,
            params: QueryParams { values: bind_values, ..QueryParams::default() },
        });
        self.submit_result(payload).await
    }

    /// Returns the cached prepared handle for `query`, sending `PREPARE`
    /// and populating the cache on a miss.
    pub async fn prepare(&self, query: &str) -> Result<Arc<PreparedHandle>, DriverError> {
        if let Some(handle) = self.prepared.lock().await.get(query) {
            return Ok(Arc::clone(handle));
        }

        let payload = Payload::Prepare(Prepare { text: query.to_owned() });
        let response = self.dispatcher.submit(Opcode::Prepare, payload.encode()).await?;
        let Payload::Result(ResultBody::Prepared { id, bind_metadata, result_metadata }) = response
        else {
            return Err(DriverError::ProtocolViolation(format!(
                "unexpected response to PREPARE: {response:?}"
            )));
        };
        let handle = Arc::new(PreparedHandle { id, bind_metadata, result_metadata });

        let mut cache = self.prepared.lock().await;
        Ok(Arc::clone(cache.entry(query.to_owned()).or_insert(handle)))
    }

    /// Sends `REGISTER` for `events` and returns a channel of matching
    /// server-pushed events. Subscribes before sending the request, so no
    /// event emitted after the server's `READY` can be missed.
    pub async fn register(
        &self,
        events: Vec<EventType>,
    ) -> Result<mpsc::UnboundedReceiver<Event>, DriverError> {
        let receiver = self.dispatcher.subscribe(&events);
        self.dispatcher.submit(Opcode::Register, Payload::Register(Register { events }).encode()).await?;
        Ok(receiver)
    }

    /// Closes the connection, cancelling every outstanding waiter with
    /// [`DriverError::ConnectionClosed`].
    pub async fn close(&self) {
        self.dispatcher.close().await;
    }

    /// The configuration this session was opened with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn submit_result(&self, payload: Payload) -> Result<ResultBody, DriverError> {
        let opcode = payload.opcode();
        let response = self.dispatcher.submit(opcode, payload.encode()).await?;
        match response {
            Payload::Result(result) => Ok(result),
            other => Err(DriverError::ProtocolViolation(format!(
                "unexpected response to {opcode:?}: {other:?}"
            ))),
        }
    }
}

fn bind_values_for(
    values: &[Value],
    bind_metadata: &ResultMetadata,
) -> Result<Vec<BindValue>, DriverError> {
    if values.len() != bind_metadata.columns.len() {
        return Err(DriverError::BadParameter(format!(
            "expected {} bind value(s), got {}",
            bind_metadata.columns.len(),
            values.len()
        )));
    }
    values
        .iter()
        .zip(&bind_metadata.columns)
        .map(|(value, spec)| {
            let encoded = encode_value(value, &spec.ty)
                .map_err(|err| DriverError::BadParameter(format!("column {}: {err}", spec.name)))?;
            Ok(BindValue { name: None, value: encoded })
        })
        .collect()
}
