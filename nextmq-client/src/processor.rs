//! The frame processing loop.
//!
//! One thread per connection reads the frames from the inbound ring and dispatches them: replies
//! complete the continuations of their channel, the unsolicited methods go to the channel
//! handlers, content frames are collected per channel until the delivery can be dispatched.
use crate::client_error;
use crate::confirm::Confirmation;
use crate::consumer::{self, ConsumeMode};
use crate::error::{self, ClientError};
use crate::message::{Body, GatedBody, MessageDelivery, ReturnedMessage};
use crate::model::{self, ChannelNumber};
use crate::reader::{FrameReader, InboundFrame};
use crate::state::{self, ConnectionState};
use anyhow::Result;
use bytes::Bytes;
use log::{debug, error, info, trace, warn};
use nextmq_codec::codec::encode_frame;
use nextmq_codec::frame::{self, AMQPFrame, BasicProperties, ContentHeaderFrame, MethodFrameArgs};
use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// The method which starts a content, the header and the body follow it.
#[derive(Debug)]
enum ContentMethod {
    Deliver(frame::BasicDeliverArgs),
    Return(frame::BasicReturnArgs),
}

/// A content being delivered by content frames, building step by step.
#[derive(Debug)]
struct DeliveredContent {
    method: ContentMethod,
    header: Option<(u64, BasicProperties)>,
}

pub(crate) struct Processor {
    conn: Arc<ConnectionState>,
    reader: FrameReader,
    in_delivery: HashMap<ChannelNumber, DeliveredContent>,
}

pub(crate) fn spawn(conn: Arc<ConnectionState>, reader: FrameReader) -> io::Result<JoinHandle<()>> {
    let processor = Processor {
        conn,
        reader,
        in_delivery: HashMap::new(),
    };

    thread::Builder::new()
        .name("nextmq-processor".into())
        .spawn(move || processor.run())
}

impl Processor {
    fn run(mut self) {
        loop {
            match self.reader.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(e) = self.handle_in_frame(frame) {
                        self.fatal(e);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.fatal(e);
                    break;
                }
            }
        }

        debug!("Frame processing stopped");

        self.conn.fail_all(&state::connection_closed());
        self.conn.shutdown();
    }

    /// Closes the connection with the reply code of the error.
    fn fatal(&self, err: anyhow::Error) {
        error!("Fatal error {:?}", err);

        let code = error::reply_code(&err);
        let class_method = err.downcast_ref::<ClientError>().map(|e| e.class_method).unwrap_or(0);
        let text = err
            .downcast_ref::<ClientError>()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| err.to_string());

        if !self.conn.is_closed() {
            let close = frame::connection_close(code, &text, class_method);

            if let Err(e) = self.conn.connection.send(|buf| encode_frame(buf, &close)) {
                debug!("Cannot send connection close {:?}", e);
            }
        }

        self.conn.fail_all(&ClientError {
            channel: None,
            code,
            message: text,
            class_method,
        });
        self.conn.shutdown();
    }

    fn handle_in_frame(&mut self, frame: InboundFrame) -> Result<()> {
        match frame {
            InboundFrame::Frame(AMQPFrame::Method(channel, _, args)) => self.handle_in_method_frame(channel, args),
            InboundFrame::Frame(AMQPFrame::ContentHeader(header)) => self.content_header(header),
            InboundFrame::Body { channel, position, len } => self.content_body(channel, position, len),
            InboundFrame::Frame(AMQPFrame::Heartbeat(_)) => {
                trace!("Heartbeat from server");
                Ok(())
            }
            InboundFrame::Frame(f) => client_error!(
                None,
                model::ConnectionError::UnexpectedFrame as u16,
                format!("Unexpected frame {:?}", f),
                0
            ),
        }
    }

    fn handle_in_method_frame(&mut self, channel: ChannelNumber, args: MethodFrameArgs) -> Result<()> {
        use MethodFrameArgs::*;

        debug!("Incoming frame channel={} {:?}", channel, args);

        match args {
            ConnectionClose(args) => self.connection_close(args),
            ConnectionBlocked(args) => {
                info!("Connection is blocked: {}", args.reason);
                self.conn.set_blocked(true);
                Ok(())
            }
            ConnectionUnblocked => {
                info!("Connection is unblocked");
                self.conn.set_blocked(false);
                Ok(())
            }
            ChannelClose(args) => self.channel_close(channel, args),
            ChannelFlow(args) => self.channel_flow(channel, args),
            BasicDeliver(args) => self.start_content(channel, ContentMethod::Deliver(args)),
            BasicReturn(args) => self.start_content(channel, ContentMethod::Return(args)),
            BasicAck(args) => self.confirm(channel, args.delivery_tag, args.multiple, Confirmation::Ack),
            BasicNack(args) => self.confirm(
                channel,
                args.delivery_tag,
                args.is_multiple(),
                Confirmation::Nack {
                    requeue: args.is_requeue(),
                },
            ),
            BasicCancel(args) => self.server_cancel(channel, args),
            reply => self.complete(channel, reply),
        }
    }

    fn complete(&self, channel: ChannelNumber, args: MethodFrameArgs) -> Result<()> {
        let state = match self.conn.channel(channel) {
            Some(state) => state,
            None => {
                return client_error!(
                    None,
                    model::ConnectionError::ChannelError as u16,
                    format!("Reply on unknown channel {}", channel),
                    args.class_method()
                )
            }
        };

        state.continuations.complete(channel, args, |tag, subscription| {
            debug!("Consumer {} subscribed on channel {}", tag, channel);

            state.subscriptions.write().insert(tag, subscription);
        })
    }

    fn connection_close(&self, args: frame::ConnectionCloseArgs) -> Result<()> {
        let err = ClientError {
            channel: None,
            code: args.code,
            message: args.text,
            class_method: frame::unify_class_method(args.class_id, args.method_id),
        };

        warn!("Server closed the connection {}", err);

        self.conn.connection.send(|buf| encode_frame(buf, &frame::connection_close_ok()))?;
        self.conn.fail_all(&err);
        self.conn.shutdown();

        Ok(())
    }

    fn channel_close(&mut self, channel: ChannelNumber, args: frame::ChannelCloseArgs) -> Result<()> {
        let err = ClientError {
            channel: Some(channel),
            code: args.code,
            message: args.text,
            class_method: frame::unify_class_method(args.class_id, args.method_id),
        };

        warn!("Server closed channel {}", err);

        self.in_delivery.remove(&channel);

        match self.conn.remove_channel(channel) {
            Some(state) => {
                state.fail(&err);

                let handler = state.on_error.read().clone();

                if let Some(handler) = handler {
                    if panic::catch_unwind(AssertUnwindSafe(|| handler(&err))).is_err() {
                        error!("Error handler panicked on channel {}", channel);
                    }
                }

                state.send(|buf| encode_frame(buf, &frame::channel_close_ok(channel)))
            }
            None => {
                warn!("Close of unknown channel {}", channel);

                self.conn
                    .connection
                    .send(|buf| encode_frame(buf, &frame::channel_close_ok(channel)))
            }
        }
    }

    fn channel_flow(&self, channel: ChannelNumber, args: frame::ChannelFlowArgs) -> Result<()> {
        let state = self.existing_channel(channel, frame::CHANNEL_FLOW)?;

        info!("Flow of channel {} is {}", channel, if args.active { "on" } else { "off" });

        state.set_flow_active(args.active);
        state.send(|buf| encode_frame(buf, &args.ok_frame(channel)))
    }

    fn confirm(&self, channel: ChannelNumber, delivery_tag: u64, multiple: bool, confirmation: Confirmation) -> Result<()> {
        match self.conn.channel(channel) {
            Some(state) => match state.confirms.get() {
                Some(keeper) => {
                    keeper.confirm(delivery_tag, multiple, confirmation);
                }
                None => warn!("{:?} of tag {} on channel {} without confirm mode", confirmation, delivery_tag, channel),
            },
            None => warn!("{:?} on unknown channel {}", confirmation, channel),
        }

        Ok(())
    }

    fn server_cancel(&self, channel: ChannelNumber, args: frame::BasicCancelArgs) -> Result<()> {
        let state = self.existing_channel(channel, frame::BASIC_CANCEL)?;

        info!("Server cancelled consumer {} on channel {}", args.consumer_tag, channel);

        state.subscriptions.write().remove(&args.consumer_tag);

        if args.no_wait {
            return Ok(());
        }

        let cancel_ok = frame::BasicCancelOkArgs::new(&args.consumer_tag).frame(channel);

        state.send(|buf| encode_frame(buf, &cancel_ok))
    }

    fn existing_channel(&self, channel: ChannelNumber, class_method: u32) -> Result<Arc<state::ChannelState>> {
        match self.conn.channel(channel) {
            Some(state) => Ok(state),
            None => client_error!(
                None,
                model::ConnectionError::ChannelError as u16,
                format!("Channel {} is not open", channel),
                class_method
            ),
        }
    }

    fn start_content(&mut self, channel: ChannelNumber, method: ContentMethod) -> Result<()> {
        if let Some(previous) = self.in_delivery.insert(channel, DeliveredContent { method, header: None }) {
            return client_error!(
                None,
                model::ConnectionError::UnexpectedFrame as u16,
                format!("Content of {:?} is not finished", previous.method),
                0
            );
        }

        Ok(())
    }

    fn content_header(&mut self, header: ContentHeaderFrame) -> Result<()> {
        let channel = header.channel;

        let content = match self.in_delivery.get_mut(&channel) {
            Some(content) if content.header.is_none() => content,
            _ => {
                return client_error!(
                    None,
                    model::ConnectionError::UnexpectedFrame as u16,
                    format!("Unexpected content header on channel {}", channel),
                    0
                )
            }
        };

        content.header = Some((header.body_size, header.properties));

        if header.body_size == 0 {
            if let Some(content) = self.in_delivery.remove(&channel) {
                self.dispatch(channel, content, None)?;
            }
        }

        Ok(())
    }

    fn content_body(&mut self, channel: ChannelNumber, position: u64, len: usize) -> Result<()> {
        let content = match self.in_delivery.remove(&channel) {
            Some(content) if content.header.is_some() => content,
            _ => {
                return client_error!(
                    None,
                    model::ConnectionError::UnexpectedFrame as u16,
                    format!("Unexpected content body on channel {}", channel),
                    0
                )
            }
        };

        let body_size = content.header.as_ref().map(|(size, _)| *size).unwrap_or_default();

        if (len as u64) < body_size {
            return client_error!(
                None,
                model::ConnectionError::NotImplemented as u16,
                format!("Body of {} bytes spans more than one frame", body_size),
                frame::BASIC_DELIVER
            );
        }

        if len as u64 > body_size {
            return client_error!(
                None,
                model::ConnectionError::FrameError as u16,
                format!("Body frame of {} bytes for a body of {}", len, body_size),
                0
            );
        }

        self.dispatch(channel, content, Some((position, len)))
    }

    /// Hands a complete content to its consumer or return handler. `body` is the position and the
    /// length of the body in the ring, `None` for empty bodies.
    fn dispatch(&self, channel: ChannelNumber, content: DeliveredContent, body: Option<(u64, usize)>) -> Result<()> {
        let properties = content.header.map(|(_, p)| p).unwrap_or_else(BasicProperties::empty);

        let state = match self.conn.channel(channel) {
            Some(state) => state,
            None => {
                warn!("Content on closed channel {} is dropped", channel);
                return Ok(());
            }
        };

        match content.method {
            ContentMethod::Deliver(args) => {
                let subscription = state.subscriptions.read().get(&args.consumer_tag).cloned();

                let subscription = match subscription {
                    Some(s) => s,
                    None => {
                        warn!(
                            "Delivery {} to unknown consumer {} is dropped",
                            args.delivery_tag, args.consumer_tag
                        );
                        return Ok(());
                    }
                };

                let mode = subscription.mode;
                let meta = (channel, args, properties);

                match mode {
                    ConsumeMode::SingleThreaded => {
                        consumer::run_inline(&subscription, delivery(meta, self.borrowed_body(body)));
                    }
                    ConsumeMode::ParallelCopy => {
                        let copied = self.borrowed_body(body).to_bytes();

                        consumer::run_on_pool(&self.conn.runtime, subscription, delivery(meta, Body::Copied(copied)));
                    }
                    ConsumeMode::ParallelBarrier => {
                        let gated = self.gated_body(body)?;

                        consumer::run_on_pool(&self.conn.runtime, subscription, delivery(meta, gated));
                    }
                }
            }
            ContentMethod::Return(args) => {
                let handler = state.on_return.read().clone();

                match handler {
                    Some(handler) => {
                        let message = ReturnedMessage {
                            channel,
                            reply_code: args.reply_code,
                            reply_text: args.reply_text,
                            exchange: args.exchange_name,
                            routing_key: args.routing_key,
                            properties,
                            body: self.borrowed_body(body),
                        };

                        consumer::run_return_handler(&handler, message);
                    }
                    None => debug!(
                        "Returned message {} {} on channel {} is dropped",
                        args.reply_code, args.reply_text, channel
                    ),
                }
            }
        }

        Ok(())
    }

    fn borrowed_body(&self, body: Option<(u64, usize)>) -> Body<'_> {
        match body {
            Some((position, len)) => {
                let (head, tail) = self.reader.body(position, len);

                Body::Borrowed { head, tail }
            }
            None => Body::Borrowed { head: &[], tail: &[] },
        }
    }

    /// Pins the body with a reading gate. Running out of gates is fatal right away.
    fn gated_body(&self, body: Option<(u64, usize)>) -> Result<Body<'static>> {
        match body {
            Some((position, len)) => {
                let gate = self.reader.ring().add_gate(position, len).map_err(anyhow::Error::new)?;

                Ok(Body::Gated(GatedBody::new(gate)))
            }
            None => Ok(Body::Copied(Bytes::new())),
        }
    }
}

fn delivery(
    (channel, args, properties): (ChannelNumber, frame::BasicDeliverArgs, BasicProperties),
    body: Body<'_>,
) -> MessageDelivery<'_> {
    MessageDelivery {
        channel,
        consumer_tag: args.consumer_tag,
        delivery_tag: args.delivery_tag,
        redelivered: args.redelivered,
        exchange: args.exchange_name,
        routing_key: args.routing_key,
        properties,
        body,
    }
}
