//! Pending synchronous operations of a channel.
//!
//! AMQP replies carry no correlation id, the server answers the synchronous methods of a channel
//! in order. So each channel keeps a FIFO of what it waits for and every reply completes the
//! oldest entry.
use crate::consumer::Subscription;
use crate::error::ClientError;
use crate::model::{self, ChannelNumber, ClassMethod};
use anyhow::Result;
use log::{error, trace};
use nextmq_codec::frame::{self, MethodFrameArgs};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

pub(crate) type MethodReply = oneshot::Sender<Result<MethodFrameArgs>>;
pub(crate) type ConsumeReply = oneshot::Sender<Result<String>>;

pub(crate) enum PendingOp {
    Method {
        expected: ClassMethod,
        reply: MethodReply,
    },
    /// A `Basic.Consume`, the subscription is registered when the consume-ok arrives.
    Consume {
        subscription: Arc<Subscription>,
        reply: ConsumeReply,
    },
}

impl PendingOp {
    fn expected(&self) -> ClassMethod {
        match self {
            PendingOp::Method { expected, .. } => *expected,
            PendingOp::Consume { .. } => frame::BASIC_CONSUME_OK,
        }
    }

    fn fail(self, err: &ClientError) {
        let err = anyhow::Error::new(err.clone());

        // the caller may have given up waiting
        match self {
            PendingOp::Method { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            PendingOp::Consume { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct Continuations {
    queue: Mutex<VecDeque<PendingOp>>,
}

impl Continuations {
    pub(crate) fn push(&self, op: PendingOp) {
        trace!("Waiting for {:08X}", op.expected());

        self.queue.lock().push_back(op);
    }

    /// Takes back the operation pushed last, when its frame couldn't be sent.
    pub(crate) fn pop_last(&self) {
        self.queue.lock().pop_back();
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Completes the oldest operation with the reply. A reply which is not the expected one fails
    /// that operation and is returned as an unexpected frame error of the connection.
    pub(crate) fn complete<F>(&self, channel: ChannelNumber, args: MethodFrameArgs, on_subscribe: F) -> Result<()>
    where
        F: FnOnce(String, Arc<Subscription>),
    {
        let class_method = args.class_method();
        let op = self.queue.lock().pop_front();

        let op = match op {
            Some(op) => op,
            None => {
                return Err(anyhow::Error::new(unexpected(
                    channel,
                    class_method,
                    format!("Nothing waits for {:08X}", class_method),
                )))
            }
        };

        if op.expected() != class_method {
            let err = unexpected(
                channel,
                class_method,
                format!("Expected {:08X} but got {:08X}", op.expected(), class_method),
            );

            error!("{}", err);
            op.fail(&err);

            return Err(anyhow::Error::new(err));
        }

        match (op, args) {
            (PendingOp::Consume { subscription, reply }, MethodFrameArgs::BasicConsumeOk(ok)) => {
                on_subscribe(ok.consumer_tag.clone(), subscription);

                let _ = reply.send(Ok(ok.consumer_tag));
            }
            (PendingOp::Method { reply, .. }, args) => {
                let _ = reply.send(Ok(args));
            }
            (PendingOp::Consume { reply, .. }, _) => {
                // a consume expects consume-ok, checked above
                let _ = reply.send(Err(anyhow::Error::new(unexpected(channel, class_method, "Consume-ok expected"))));
            }
        }

        Ok(())
    }

    pub(crate) fn fail_all(&self, err: &ClientError) {
        let ops = std::mem::take(&mut *self.queue.lock());

        for op in ops {
            op.fail(err);
        }
    }
}

fn unexpected(channel: ChannelNumber, class_method: ClassMethod, message: impl Into<String>) -> ClientError {
    ClientError {
        channel: if channel == 0 { None } else { Some(channel) },
        code: model::ConnectionError::UnexpectedFrame as u16,
        message: message.into(),
        class_method,
    }
}
