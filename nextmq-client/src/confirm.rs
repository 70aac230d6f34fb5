//! Publisher confirms.
//!
//! In confirm mode the server acks or nacks every publish by its sequence number. The keeper
//! hands out the numbers, keeps the pending publishes ordered by them and bounds how many can be
//! unconfirmed at the same time.
use crate::error::{ClientError, Interrupted};
use crate::model::{self, ChannelNumber};
use anyhow::Result;
use log::{trace, warn};
use nextmq_codec::frame;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;

/// Outcome of a publish in confirm mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Ack,
    Nack { requeue: bool },
}

pub(crate) type ConfirmReply = oneshot::Sender<Result<Confirmation>>;

struct Pending {
    enqueued_at: Instant,
    reply: Option<ConfirmReply>,
}

struct Unconfirmed {
    next_tag: u64,
    pending: BTreeMap<u64, Pending>,
}

pub(crate) struct ConfirmationKeeper {
    channel: ChannelNumber,
    window: Semaphore,
    unconfirmed: Mutex<Unconfirmed>,
}

impl ConfirmationKeeper {
    pub(crate) fn new(channel: ChannelNumber, max_unconfirmed: usize) -> Self {
        Self {
            channel,
            window: Semaphore::new(max_unconfirmed.max(1)),
            unconfirmed: Mutex::new(Unconfirmed {
                next_tag: 1,
                pending: BTreeMap::new(),
            }),
        }
    }

    /// Waits for a free place in the window of unconfirmed publishes.
    pub(crate) async fn acquire(&self, cancel: &CancellationToken, timeout: Duration) -> Result<()> {
        let permit = tokio::select! {
            permit = tokio::time::timeout(timeout, self.window.acquire()) => permit,
            _ = cancel.cancelled() => return Err(Interrupted::Cancelled.into()),
        };

        match permit {
            Ok(Ok(permit)) => {
                // given back by `confirm`
                permit.forget();
                Ok(())
            }
            Ok(Err(_)) => Err(anyhow::Error::new(ClientError {
                channel: Some(self.channel),
                code: model::ConnectionError::ChannelError as u16,
                message: "Channel is closed".into(),
                class_method: frame::BASIC_PUBLISH,
            })),
            Err(_) => Err(Interrupted::TimedOut.into()),
        }
    }

    /// Gives back a place which was acquired for a publish that couldn't be sent.
    pub(crate) fn release(&self) {
        self.window.add_permits(1);
    }

    /// Records the next publish and returns its delivery tag. Must be called in the write scope of
    /// the channel so tags follow the order on the wire.
    pub(crate) fn register(&self, reply: Option<ConfirmReply>) -> u64 {
        let mut unconfirmed = self.unconfirmed.lock();
        let tag = unconfirmed.next_tag;

        unconfirmed.next_tag += 1;
        unconfirmed.pending.insert(
            tag,
            Pending {
                enqueued_at: Instant::now(),
                reply,
            },
        );

        tag
    }

    /// Resolves the publishes confirmed by an ack or a nack. With `multiple` every tag up to and
    /// including `delivery_tag` is resolved, a multiple with tag 0 resolves everything.
    pub(crate) fn confirm(&self, delivery_tag: u64, multiple: bool, confirmation: Confirmation) -> usize {
        let resolved = {
            let mut unconfirmed = self.unconfirmed.lock();

            if multiple {
                match delivery_tag.checked_add(1) {
                    Some(after) if delivery_tag > 0 => {
                        let rest = unconfirmed.pending.split_off(&after);

                        std::mem::replace(&mut unconfirmed.pending, rest)
                    }
                    // tag 0 and the largest tag cover every pending publish
                    _ => std::mem::take(&mut unconfirmed.pending),
                }
            } else {
                unconfirmed
                    .pending
                    .remove(&delivery_tag)
                    .map(|p| BTreeMap::from([(delivery_tag, p)]))
                    .unwrap_or_default()
            }
        };

        if resolved.is_empty() {
            warn!(
                "Unknown delivery tag {} in {:?} on channel {}",
                delivery_tag, confirmation, self.channel
            );

            return 0;
        }

        let count = resolved.len();

        for (tag, pending) in resolved {
            trace!("Tag {} confirmed in {:?}", tag, pending.enqueued_at.elapsed());

            if let Some(reply) = pending.reply {
                let _ = reply.send(Ok(confirmation));
            }
        }

        self.window.add_permits(count);

        count
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.unconfirmed.lock().pending.len()
    }

    /// Fails every pending publish and closes the window.
    pub(crate) fn fail(&self, err: &ClientError) {
        let pending = std::mem::take(&mut self.unconfirmed.lock().pending);

        for (_, p) in pending {
            if let Some(reply) = p.reply {
                let _ = reply.send(Err(anyhow::Error::new(err.clone())));
            }
        }

        self.window.close();
    }
}
