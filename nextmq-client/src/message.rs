use crate::model::ChannelNumber;
use crate::ring::ReadingGate;
use bytes::{Buf, Bytes, BytesMut};
use nextmq_codec::frame::BasicProperties;
use std::fmt;

/// Message body handed to consumer callbacks.
///
/// Depending on the consume mode the bytes are still in the inbound ring (borrowed or pinned by a
/// gate) or they are copied out. Read it through [`bytes::Buf`] or copy it with `to_bytes`.
pub enum Body<'a> {
    /// Points into the ring, the parts of a wrapped range.
    Borrowed { head: &'a [u8], tail: &'a [u8] },
    Copied(Bytes),
    Gated(GatedBody),
}

/// A body kept in the ring by a reading gate. Dropping it lets the socket reader reuse the space.
#[derive(Debug)]
pub struct GatedBody {
    gate: ReadingGate,
}

impl GatedBody {
    pub(crate) fn new(gate: ReadingGate) -> Self {
        Self { gate }
    }
}

impl Body<'_> {
    pub fn empty() -> Body<'static> {
        Body::Copied(Bytes::new())
    }

    pub fn len(&self) -> usize {
        self.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the unread part of the body.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Body::Borrowed { head, tail } => concat(head, tail),
            Body::Copied(bytes) => bytes.clone(),
            Body::Gated(gated) => {
                let (head, tail) = gated.gate.view();

                concat(head, tail)
            }
        }
    }
}

fn concat(head: &[u8], tail: &[u8]) -> Bytes {
    if tail.is_empty() {
        return Bytes::copy_from_slice(head);
    }

    let mut buf = BytesMut::with_capacity(head.len() + tail.len());
    buf.extend_from_slice(head);
    buf.extend_from_slice(tail);
    buf.freeze()
}

impl Buf for Body<'_> {
    fn remaining(&self) -> usize {
        match self {
            Body::Borrowed { head, tail } => head.len() + tail.len(),
            Body::Copied(bytes) => bytes.remaining(),
            Body::Gated(gated) => gated.gate.remaining(),
        }
    }

    fn chunk(&self) -> &[u8] {
        match self {
            Body::Borrowed { head, tail } => {
                if head.is_empty() {
                    tail
                } else {
                    head
                }
            }
            Body::Copied(bytes) => bytes.chunk(),
            Body::Gated(gated) => gated.gate.chunk(),
        }
    }

    fn advance(&mut self, cnt: usize) {
        match self {
            Body::Borrowed { head, tail } => {
                let (h, t) = (*head, *tail);

                if cnt <= h.len() {
                    *head = &h[cnt..];
                } else {
                    *head = &[];
                    *tail = &t[cnt - h.len()..];
                }
            }
            Body::Copied(bytes) => bytes.advance(cnt),
            Body::Gated(gated) => gated.gate.advance(cnt),
        }
    }
}

impl fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Body::Borrowed { .. } => "Borrowed",
            Body::Copied(_) => "Copied",
            Body::Gated(_) => "Gated",
        };

        write!(f, "Body::{}({} bytes)", kind, self.len())
    }
}

/// A message delivered to a consumer.
#[derive(Debug)]
pub struct MessageDelivery<'a> {
    pub channel: ChannelNumber,
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    pub body: Body<'a>,
}

/// A mandatory or immediate message the server couldn't route.
#[derive(Debug)]
pub struct ReturnedMessage<'a> {
    pub channel: ChannelNumber,
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    pub body: Body<'a>,
}
