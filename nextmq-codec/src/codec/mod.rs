//! Encoding and decoding of AMQP frames.
//!
//! The frame envelope is `type | channel | size | payload | 0xCE`. Payload decoders accept any
//! `Buf`, the `AMQPCodec` wraps them into a `tokio_util` codec for stream based transports.
mod content;
mod method;
mod primitive;

pub use content::{
    decode_content_header, decode_properties, encode_content, encode_content_body, encode_content_header,
    encode_properties, FRAME_OVERHEAD,
};
pub use method::{decode_method_args, encode_method_args};
pub use primitive::{
    decode_field_table, decode_long_string, decode_short_string, encode_field_table, encode_long_string,
    encode_short_string, pack_bits, unpack_bits,
};

use crate::frame::*;
use crate::{frame_error, Result, FRAME_ERROR};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub const FRAME_METHOD_FRAME: u8 = 0x01;
pub const FRAME_CONTENT_HEADER: u8 = 0x02;
pub const FRAME_CONTENT_BODY: u8 = 0x03;
pub const FRAME_HEARTBEAT: u8 = 0x08;
pub const FRAME_AMQP_VERSION: u8 = 0x41;
pub const FRAME_END: u8 = 0xCE;

/// Length of the type, channel and size fields of a frame.
pub const FRAME_HEADER_SIZE: usize = 7;
/// The protocol header the client sends first.
pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x00\x00\x09\x01";

/// The fixed size part of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: u8,
    pub channel: Channel,
    pub size: u32,
}

impl FrameHeader {
    pub fn parse(bytes: &[u8; FRAME_HEADER_SIZE]) -> FrameHeader {
        FrameHeader {
            frame_type: bytes[0],
            channel: u16::from_be_bytes([bytes[1], bytes[2]]),
            size: u32::from_be_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]),
        }
    }

    /// Size of the whole frame including the header and the frame end octet.
    pub fn frame_len(&self) -> usize {
        self.size as usize + FRAME_OVERHEAD
    }
}

/// Frame codec for stream based transports, one `AMQPFrame` per item.
pub struct AMQPCodec {}

impl Encoder<AMQPFrame> for AMQPCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: AMQPFrame, buf: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        encode_frame(buf, &frame).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl Decoder for AMQPCodec {
    type Item = AMQPFrame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_SIZE || !is_full_frame(src) {
            return Ok(None);
        }

        if src[0] == FRAME_AMQP_VERSION {
            let head = src.split_to(PROTOCOL_HEADER.len());

            if &head[..] != PROTOCOL_HEADER {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Unsupported protocol header {:?}", &head[..]),
                ));
            }

            return Ok(Some(AMQPFrame::Header));
        }

        let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
        src.copy_to_slice(&mut header_bytes);

        let header = FrameHeader::parse(&header_bytes);
        let mut payload = src.split_to(header.size as usize);
        let frame_end = src.get_u8();

        if frame_end != FRAME_END {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Frame end is {:02X} instead of CE", frame_end),
            ));
        }

        let frame = match header.frame_type {
            FRAME_CONTENT_BODY => AMQPFrame::ContentBody(ContentBodyFrame {
                channel: header.channel,
                body: payload.freeze(),
            }),
            _ => decode_frame(&header, &mut payload)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
        };

        Ok(Some(frame))
    }
}

/// Check if the buffer contains the full frame. We can do that easily since
/// most of the time the frame contains the length information.
fn is_full_frame(src: &BytesMut) -> bool {
    match src[0] {
        FRAME_AMQP_VERSION => src.len() >= PROTOCOL_HEADER.len(),
        _ => {
            let mut bs = [0u8; 4];
            bs.copy_from_slice(&src[3..7]);

            let len = u32::from_be_bytes(bs) as usize;

            src.len() >= len + FRAME_OVERHEAD
        }
    }
}

/// Decode the payload of a method, header or heartbeat frame. Body frames are handled by the
/// caller since their payload is not copied.
pub fn decode_frame<B: Buf + ?Sized>(header: &FrameHeader, payload: &mut B) -> Result<AMQPFrame> {
    match header.frame_type {
        FRAME_METHOD_FRAME => {
            let (class_method, args) = decode_method_args(payload)?;

            Ok(AMQPFrame::Method(header.channel, class_method, args))
        }
        FRAME_CONTENT_HEADER => Ok(AMQPFrame::ContentHeader(decode_content_header(
            payload,
            header.channel,
        )?)),
        FRAME_HEARTBEAT => Ok(AMQPFrame::Heartbeat(header.channel)),
        f => frame_error!(FRAME_ERROR, format!("Unknown frame type {}", f)),
    }
}

/// Write the frame header with a placeholder size, returns the position of the size field.
pub(crate) fn begin_frame(buf: &mut BytesMut, frame_type: u8, channel: Channel) -> usize {
    buf.put_u8(frame_type);
    buf.put_u16(channel);

    let size_at = buf.len();
    buf.put_u32(0);

    size_at
}

/// Patch the frame size and close the frame with the frame end octet.
pub(crate) fn finish_frame(buf: &mut BytesMut, size_at: usize) {
    let size = (buf.len() - size_at - 4) as u32;

    buf[size_at..size_at + 4].copy_from_slice(&size.to_be_bytes());
    buf.put_u8(FRAME_END);
}

/// Encode a method frame with its arguments.
pub fn encode_method_frame(buf: &mut BytesMut, channel: Channel, args: &MethodFrameArgs) -> Result<()> {
    let start = begin_frame(buf, FRAME_METHOD_FRAME, channel);

    encode_method_args(buf, args)?;

    finish_frame(buf, start);

    Ok(())
}

pub fn encode_heartbeat_frame(buf: &mut BytesMut) {
    let start = begin_frame(buf, FRAME_HEARTBEAT, 0);

    finish_frame(buf, start);
}

pub fn encode_frame(buf: &mut BytesMut, frame: &AMQPFrame) -> Result<()> {
    match frame {
        AMQPFrame::Header => {
            buf.put_slice(PROTOCOL_HEADER);
            Ok(())
        }
        AMQPFrame::Method(ch, _, args) => encode_method_frame(buf, *ch, args),
        AMQPFrame::ContentHeader(header_frame) => encode_content_header(buf, header_frame),
        AMQPFrame::ContentBody(body_frame) => {
            let start = begin_frame(buf, FRAME_CONTENT_BODY, body_frame.channel);

            buf.put_slice(&body_frame.body);
            finish_frame(buf, start);

            Ok(())
        }
        AMQPFrame::Heartbeat(_) => {
            encode_heartbeat_frame(buf);
            Ok(())
        }
    }
}
