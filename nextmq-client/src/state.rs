//! Shared state of a connection and its channels.
//!
//! The client api and the frame processing thread meet here. The api side encodes frames in the
//! write scope of a channel and registers what it waits for, the processor completes those
//! continuations and routes the unsolicited frames to the channel handlers.
use crate::config::ClientConfig;
use crate::confirm::{ConfirmReply, ConfirmationKeeper};
use crate::consumer::{ReturnCallback, Subscription};
use crate::continuation::{Continuations, PendingOp};
use crate::error::{self, ClientError, Interrupted};
use crate::model::{self, ChannelNumber, ClassMethod};
use crate::error::RingError;
use crate::transport::Outbound;
use anyhow::Result;
use bytes::BytesMut;
use log::{debug, trace};
use nextmq_codec::frame::MethodFrameArgs;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub type ErrorCallback = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Values agreed on during `Connection.Tune`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Tuning {
    pub(crate) channel_max: u16,
    pub(crate) frame_max: u32,
    pub(crate) heartbeat: u16,
}

pub(crate) struct ChannelState {
    pub(crate) number: ChannelNumber,
    outbound: Arc<Outbound>,
    /// Scratch buffer of the frame sequences, locking it serializes the outbound frames.
    write_scope: Mutex<BytesMut>,
    pub(crate) continuations: Continuations,
    pub(crate) confirms: OnceLock<ConfirmationKeeper>,
    pub(crate) subscriptions: RwLock<HashMap<String, Arc<Subscription>>>,
    flow_active: AtomicBool,
    closed: AtomicBool,
    pub(crate) on_return: RwLock<Option<ReturnCallback>>,
    pub(crate) on_error: RwLock<Option<ErrorCallback>>,
}

impl std::fmt::Debug for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelState")
            .field("number", &self.number)
            .field("pending", &self.continuations.len())
            .field("consumers", &self.subscriptions.read().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChannelState {
    pub(crate) fn new(number: ChannelNumber, outbound: Arc<Outbound>) -> Self {
        Self {
            number,
            outbound,
            write_scope: Mutex::new(BytesMut::with_capacity(4096)),
            continuations: Continuations::default(),
            confirms: OnceLock::new(),
            subscriptions: RwLock::new(HashMap::new()),
            flow_active: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            on_return: RwLock::new(None),
            on_error: RwLock::new(None),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn is_flow_active(&self) -> bool {
        self.flow_active.load(Ordering::Acquire)
    }

    pub(crate) fn set_flow_active(&self, active: bool) {
        self.flow_active.store(active, Ordering::Release);
    }

    fn check_open(&self, class_method: ClassMethod) -> Result<()> {
        if self.is_closed() {
            return crate::client_error!(
                self.scope(),
                model::ConnectionError::ChannelError as u16,
                "Channel is closed",
                class_method
            );
        }

        Ok(())
    }

    fn scope(&self) -> Option<ChannelNumber> {
        if self.number == 0 {
            None
        } else {
            Some(self.number)
        }
    }

    /// Encodes frames in the write scope and copies them to the outbound ring. It doesn't check
    /// if the channel is closed, close replies and heartbeats go through here.
    pub(crate) fn send<F>(&self, encode: F) -> Result<()>
    where
        F: FnOnce(&mut BytesMut) -> nextmq_codec::Result<()>,
    {
        let mut scope = self.write_scope.lock();

        self.encode_and_queue(&mut scope, encode)
    }

    pub(crate) fn send_checked<F>(&self, class_method: ClassMethod, encode: F) -> Result<()>
    where
        F: FnOnce(&mut BytesMut) -> nextmq_codec::Result<()>,
    {
        self.check_open(class_method)?;
        self.send(encode)
    }

    fn encode_and_queue<F>(&self, scope: &mut BytesMut, encode: F) -> Result<()>
    where
        F: FnOnce(&mut BytesMut) -> nextmq_codec::Result<()>,
    {
        scope.clear();

        encode(&mut *scope).map_err(error::from_codec)?;

        trace!("Outgoing {} bytes on channel {}", scope.len(), self.number);

        self.outbound.send(&scope[..]).map_err(outbound_error)
    }

    /// Registers the operation and sends its frame in one write scope, so the order of the
    /// continuations is the order of the requests on the wire.
    pub(crate) fn push_and_send<F>(&self, class_method: ClassMethod, op: PendingOp, encode: F) -> Result<()>
    where
        F: FnOnce(&mut BytesMut) -> nextmq_codec::Result<()>,
    {
        self.check_open(class_method)?;

        let mut scope = self.write_scope.lock();

        self.continuations.push(op);

        if let Err(e) = self.encode_and_queue(&mut scope, encode) {
            self.continuations.pop_last();

            return Err(e);
        }

        Ok(())
    }

    /// Sends a synchronous method, the receiver gets the reply.
    pub(crate) fn call<F>(
        &self,
        class_method: ClassMethod,
        expected: ClassMethod,
        encode: F,
    ) -> Result<oneshot::Receiver<Result<MethodFrameArgs>>>
    where
        F: FnOnce(&mut BytesMut) -> nextmq_codec::Result<()>,
    {
        let (tx, rx) = oneshot::channel();

        self.push_and_send(class_method, PendingOp::Method { expected, reply: tx }, encode)?;

        Ok(rx)
    }

    /// Sends a publish in confirm mode, the delivery tag is taken in the write scope.
    pub(crate) fn publish_confirmed<F>(
        &self,
        keeper: &ConfirmationKeeper,
        class_method: ClassMethod,
        reply: Option<ConfirmReply>,
        encode: F,
    ) -> Result<u64>
    where
        F: FnOnce(&mut BytesMut) -> nextmq_codec::Result<()>,
    {
        self.check_open(class_method)?;

        let mut scope = self.write_scope.lock();

        scope.clear();
        encode(&mut *scope).map_err(error::from_codec)?;

        let tag = keeper.register(reply);

        self.outbound.send(&scope[..]).map_err(outbound_error)?;

        Ok(tag)
    }

    /// Fails everything which waits on the channel and marks it closed.
    pub(crate) fn fail(&self, err: &ClientError) {
        self.closed.store(true, Ordering::Release);
        self.continuations.fail_all(err);

        if let Some(keeper) = self.confirms.get() {
            keeper.fail(err);
        }

        self.subscriptions.write().clear();
    }
}

pub(crate) struct ConnectionState {
    pub(crate) config: ClientConfig,
    outbound: Arc<Outbound>,
    pub(crate) cancel: CancellationToken,
    /// Channel 0 for the connection class methods.
    pub(crate) connection: Arc<ChannelState>,
    channels: RwLock<HashMap<ChannelNumber, Arc<ChannelState>>>,
    tuning: Mutex<Tuning>,
    blocked: AtomicBool,
    closed: AtomicBool,
    close_error: Mutex<Option<ClientError>>,
    pub(crate) runtime: Handle,
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("channels", &self.channels.read().len())
            .field("tuning", &*self.tuning.lock())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionState {
    pub(crate) fn new(
        config: ClientConfig,
        outbound: Arc<Outbound>,
        cancel: CancellationToken,
        runtime: Handle,
    ) -> Self {
        let tuning = Tuning {
            channel_max: config.channel_max,
            frame_max: config.effective_frame_max(),
            heartbeat: config.heartbeat,
        };

        Self {
            connection: Arc::new(ChannelState::new(0, outbound.clone())),
            config,
            outbound,
            cancel,
            channels: RwLock::new(HashMap::new()),
            tuning: Mutex::new(tuning),
            blocked: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_error: Mutex::new(None),
            runtime,
        }
    }

    pub(crate) fn channel(&self, number: ChannelNumber) -> Option<Arc<ChannelState>> {
        if number == 0 {
            return Some(self.connection.clone());
        }

        self.channels.read().get(&number).cloned()
    }

    /// Takes the lowest free channel number.
    pub(crate) fn allocate_channel(&self) -> Result<Arc<ChannelState>> {
        if self.is_closed() {
            return Err(anyhow::Error::new(self.close_error().unwrap_or_else(connection_closed)));
        }

        let channel_max = match self.tuning().channel_max {
            0 => u16::MAX,
            max => max,
        };

        let mut channels = self.channels.write();

        match (1..=channel_max).find(|n| !channels.contains_key(n)) {
            Some(number) => {
                let state = Arc::new(ChannelState::new(number, self.outbound.clone()));

                channels.insert(number, state.clone());

                Ok(state)
            }
            None => crate::client_error!(
                None,
                model::ConnectionError::ResourceError as u16,
                "Every channel number is in use",
                nextmq_codec::frame::CHANNEL_OPEN
            ),
        }
    }

    pub(crate) fn remove_channel(&self, number: ChannelNumber) -> Option<Arc<ChannelState>> {
        self.channels.write().remove(&number)
    }

    pub(crate) fn tuning(&self) -> Tuning {
        *self.tuning.lock()
    }

    pub(crate) fn set_tuning(&self, tuning: Tuning) {
        debug!("Connection tuned to {:?}", tuning);

        *self.tuning.lock() = tuning;
    }

    pub(crate) fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    pub(crate) fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close_error(&self) -> Option<ClientError> {
        self.close_error.lock().clone()
    }

    /// Marks the connection closed and fails every channel with the error. Only the first call
    /// has an effect.
    pub(crate) fn fail_all(&self, err: &ClientError) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        *self.close_error.lock() = Some(err.clone());

        self.connection.fail(err);

        let channels = std::mem::take(&mut *self.channels.write());

        for (_, channel) in channels {
            channel.fail(err);
        }
    }

    /// Stops the writer after the frames already in the outbound ring and cancels every wait.
    pub(crate) fn shutdown(&self) {
        self.outbound.close();
        self.cancel.cancel();
    }

    /// Waits for a reply with the rpc timeout, the connection cancellation interrupts it.
    pub(crate) async fn wait_reply<T>(&self, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        wait_reply(rx, self.config.rpc_timeout, &self.cancel).await
    }
}

pub(crate) async fn wait_reply<T>(
    rx: oneshot::Receiver<Result<T>>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T> {
    tokio::select! {
        biased;

        reply = tokio::time::timeout(timeout, rx) => match reply {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(anyhow::Error::new(connection_closed())),
            Err(_) => Err(Interrupted::TimedOut.into()),
        },
        _ = cancel.cancelled() => Err(Interrupted::Cancelled.into()),
    }
}

fn outbound_error(err: RingError) -> anyhow::Error {
    match err {
        RingError::Closed | RingError::Cancelled => anyhow::Error::new(connection_closed()),
        RingError::TimedOut => Interrupted::TimedOut.into(),
        other => anyhow::Error::new(other),
    }
}

pub(crate) fn connection_closed() -> ClientError {
    ClientError {
        channel: None,
        code: model::ConnectionError::ConnectionForced as u16,
        message: "Connection is closed".into(),
        class_method: 0,
    }
}
