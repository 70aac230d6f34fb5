//! Frame reader on top of the inbound ring.
//!
//! Frames are decoded in place: the decoder gets a view chained from the one or two slices of
//! the frame. Body payloads are not decoded at all, the reader only hands out their position so
//! the consumer dispatch can borrow, copy or gate them.
use crate::error::{self, RingError};
use crate::model::ChannelNumber;
use crate::ring::RingBuffer;
use crate::{client_error, model};
use anyhow::Result;
use bytes::Buf;
use log::trace;
use nextmq_codec::codec::{decode_frame, FrameHeader, FRAME_AMQP_VERSION, FRAME_CONTENT_BODY, FRAME_END, FRAME_HEADER_SIZE};
use nextmq_codec::frame::AMQPFrame;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub(crate) enum InboundFrame {
    Frame(AMQPFrame),
    /// Payload of a body frame, readable by `FrameReader::body` until the next frame is asked.
    Body {
        channel: ChannelNumber,
        position: u64,
        len: usize,
    },
}

pub(crate) struct FrameReader {
    ring: Arc<RingBuffer>,
    /// Length of the last returned frame, it is released when the next one is read.
    pending_commit: usize,
    cancel: CancellationToken,
}

impl FrameReader {
    pub(crate) fn new(ring: Arc<RingBuffer>, cancel: CancellationToken) -> Self {
        Self {
            ring,
            pending_commit: 0,
            cancel,
        }
    }

    pub(crate) fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }

    /// Waits for the next complete frame. `None` means the stream ended or the connection was
    /// cancelled.
    pub(crate) fn next_frame(&mut self) -> Result<Option<InboundFrame>> {
        self.commit();

        if !self.wait_for(FRAME_HEADER_SIZE)? {
            return Ok(None);
        }

        let start = self.ring.read_position();
        let mut header_bytes = [0u8; FRAME_HEADER_SIZE];

        {
            // SAFETY: committed and pinned by the read cursor
            let (head, tail) = unsafe { self.ring.view(start, FRAME_HEADER_SIZE) };

            head.chain(tail).copy_to_slice(&mut header_bytes);
        }

        if header_bytes[0] == FRAME_AMQP_VERSION {
            return client_error!(
                None,
                model::ConnectionError::FrameError as u16,
                "Server refused the protocol version",
                0
            );
        }

        let header = FrameHeader::parse(&header_bytes);
        let frame_len = header.frame_len();

        if frame_len >= self.ring.capacity() {
            return Err(anyhow::Error::new(RingError::FrameTooLarge {
                size: frame_len,
                capacity: self.ring.capacity(),
            }));
        }

        if !self.wait_for(frame_len)? {
            return Ok(None);
        }

        // SAFETY: the whole frame is committed and pinned by the read cursor
        let (end, _) = unsafe { self.ring.view(start + frame_len as u64 - 1, 1) };
        let frame_end = end.first().copied();

        if frame_end != Some(FRAME_END) {
            return client_error!(
                None,
                model::ConnectionError::FrameError as u16,
                format!("Frame end is {:02X?} instead of CE", frame_end),
                0
            );
        }

        self.pending_commit = frame_len;

        let payload_at = start + FRAME_HEADER_SIZE as u64;
        let payload_len = header.size as usize;

        trace!("Frame {:?} at {}", header, start);

        if header.frame_type == FRAME_CONTENT_BODY {
            return Ok(Some(InboundFrame::Body {
                channel: header.channel,
                position: payload_at,
                len: payload_len,
            }));
        }

        // SAFETY: as above
        let (head, tail) = unsafe { self.ring.view(payload_at, payload_len) };
        let mut payload = head.chain(tail);

        let frame = decode_frame(&header, &mut payload).map_err(error::from_codec)?;

        Ok(Some(InboundFrame::Frame(frame)))
    }

    /// The payload of the last body frame.
    pub(crate) fn body(&self, position: u64, len: usize) -> (&[u8], &[u8]) {
        debug_assert!(position >= self.ring.read_position());

        // SAFETY: the range is inside the last frame which stays pinned while `self` is borrowed
        unsafe { self.ring.view(position, len) }
    }

    fn commit(&mut self) {
        if self.pending_commit > 0 {
            self.ring.commit_read(self.pending_commit);
            self.pending_commit = 0;
        }
    }

    fn wait_for(&self, n: usize) -> Result<bool> {
        match self.ring.wait_for_read(n, None, &self.cancel) {
            Ok(_) => Ok(true),
            Err(RingError::Closed) | Err(RingError::Cancelled) => Ok(false),
            Err(e) => Err(anyhow::Error::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaitingKind;
    use crate::error::ClientError;
    use bytes::BytesMut;
    use nextmq_codec::codec::{encode_content_body, encode_frame};
    use nextmq_codec::frame::{self, MethodFrameArgs, QueueBindArgs};

    fn reader(capacity: usize) -> FrameReader {
        let ring = Arc::new(RingBuffer::new(capacity, WaitingKind::Spin));

        FrameReader::new(ring, CancellationToken::new())
    }

    fn feed(reader: &FrameReader, bytes: &[u8]) {
        reader.ring().write_all(bytes, None, &CancellationToken::new()).unwrap();
    }

    #[test]
    fn frame_spanning_the_physical_end() {
        let mut reader = reader(64);
        let mut buf = BytesMut::new();

        for _ in 0..5 {
            encode_frame(&mut buf, &frame::heartbeat()).unwrap();
        }

        feed(&reader, &buf);

        for _ in 0..5 {
            assert!(matches!(
                reader.next_frame().unwrap(),
                Some(InboundFrame::Frame(AMQPFrame::Heartbeat(0)))
            ));
        }

        let mut buf = BytesMut::new();
        encode_frame(&mut buf, &QueueBindArgs::new("queue", "exchg", "key").frame(3)).unwrap();
        feed(&reader, &buf);

        match reader.next_frame().unwrap() {
            Some(InboundFrame::Frame(AMQPFrame::Method(3, frame::QUEUE_BIND, MethodFrameArgs::QueueBind(args)))) => {
                assert_eq!(args.queue_name, "queue");
                assert_eq!(args.exchange_name, "exchg");
                assert_eq!(args.routing_key, "key");
            }
            other => panic!("Unexpected frame {:?}", other),
        }
    }

    #[test]
    fn body_frames_are_not_copied() {
        let mut reader = reader(128);
        let mut buf = BytesMut::new();

        encode_content_body(&mut buf, 1, b"hello", 1024).unwrap();
        feed(&reader, &buf);

        match reader.next_frame().unwrap() {
            Some(InboundFrame::Body { channel, position, len }) => {
                assert_eq!(channel, 1);
                assert_eq!(position, FRAME_HEADER_SIZE as u64);

                let (head, tail) = reader.body(position, len);
                assert_eq!(head, b"hello");
                assert!(tail.is_empty());
            }
            other => panic!("Unexpected frame {:?}", other),
        }
    }

    #[test]
    fn frame_larger_than_the_ring() {
        let mut reader = reader(64);

        feed(&reader, &[1, 0, 0, 0, 0, 0, 100]);

        let err = reader.next_frame().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RingError>(),
            Some(RingError::FrameTooLarge { size: 108, capacity: 64 })
        ));
    }

    #[test]
    fn wrong_frame_end() {
        let mut reader = reader(64);

        feed(&reader, &[8, 0, 0, 0, 0, 0, 0, 0xCD]);

        let err = reader.next_frame().unwrap_err();
        let ce = err.downcast_ref::<ClientError>().unwrap();

        assert_eq!(ce.code, 501);
    }

    #[test]
    fn closed_ring_ends_the_stream() {
        let mut reader = reader(64);

        feed(&reader, &[8, 0, 0]);
        reader.ring().close();

        assert!(reader.next_frame().unwrap().is_none());
    }
}
