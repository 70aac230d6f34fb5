//! Content header properties and body chunking.
use super::primitive::*;
use super::{begin_frame, finish_frame, FRAME_CONTENT_BODY, FRAME_CONTENT_HEADER};
use crate::frame::{BasicProperties, Channel, ContentHeaderFrame, HeaderPropertyFlags, CLASS_BASIC};
use crate::{frame_error, Result, FRAME_ERROR};
use bytes::{Buf, BufMut, BytesMut};

/// Bytes of a frame which are not payload: type, channel, size and the frame end octet.
pub const FRAME_OVERHEAD: usize = 8;

/// Encode the presence word and the present properties in canonical order.
pub fn encode_properties(buf: &mut BytesMut, props: &BasicProperties) -> Result<()> {
    buf.put_u16(props.presence().bits());

    if let Some(v) = props.content_type() {
        encode_short_string(buf, v)?;
    }
    if let Some(v) = props.content_encoding() {
        encode_short_string(buf, v)?;
    }
    if let Some(v) = props.headers() {
        encode_field_table(buf, Some(v))?;
    }
    if let Some(v) = props.delivery_mode() {
        buf.put_u8(v);
    }
    if let Some(v) = props.priority() {
        buf.put_u8(v);
    }
    if let Some(v) = props.correlation_id() {
        encode_short_string(buf, v)?;
    }
    if let Some(v) = props.reply_to() {
        encode_short_string(buf, v)?;
    }
    if let Some(v) = props.expiration() {
        encode_short_string(buf, v)?;
    }
    if let Some(v) = props.message_id() {
        encode_short_string(buf, v)?;
    }
    if let Some(v) = props.timestamp() {
        buf.put_u64(v);
    }
    if let Some(v) = props.message_type() {
        encode_short_string(buf, v)?;
    }
    if let Some(v) = props.user_id() {
        encode_short_string(buf, v)?;
    }
    if let Some(v) = props.app_id() {
        encode_short_string(buf, v)?;
    }
    if let Some(v) = props.cluster_id() {
        encode_short_string(buf, v)?;
    }

    Ok(())
}

/// Decode the presence word and the properties it announces. The result is frozen.
pub fn decode_properties<B: Buf + ?Sized>(src: &mut B) -> Result<BasicProperties> {
    let presence = read_u16(src)?;

    if presence & 0x0001 != 0 {
        return frame_error!(FRAME_ERROR, "Property flag continuation is not supported");
    }

    let flags = HeaderPropertyFlags::from_bits_truncate(presence);
    let mut props = BasicProperties::default();

    if flags.contains(HeaderPropertyFlags::CONTENT_TYPE) {
        props.set_content_type(&decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::CONTENT_ENCODING) {
        props.set_content_encoding(&decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::HEADERS) {
        props.set_headers(decode_field_table(src)?.unwrap_or_default());
    }
    if flags.contains(HeaderPropertyFlags::DELIVERY_MODE) {
        props.set_delivery_mode(read_u8(src)?);
    }
    if flags.contains(HeaderPropertyFlags::PRIORITY) {
        props.set_priority(read_u8(src)?);
    }
    if flags.contains(HeaderPropertyFlags::CORRELATION_ID) {
        props.set_correlation_id(&decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::REPLY_TO) {
        props.set_reply_to(&decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::EXPIRATION) {
        props.set_expiration(&decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::MESSAGE_ID) {
        props.set_message_id(&decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::TIMESTAMP) {
        props.set_timestamp(read_u64(src)?);
    }
    if flags.contains(HeaderPropertyFlags::MESSAGE_TYPE) {
        props.set_message_type(&decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::USER_ID) {
        props.set_user_id(&decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::APP_ID) {
        props.set_app_id(&decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::CLUSTER_ID) {
        props.set_cluster_id(&decode_short_string(src)?);
    }

    props.freeze();

    Ok(props)
}

/// Decode the payload of a content header frame.
pub fn decode_content_header<B: Buf + ?Sized>(src: &mut B, channel: Channel) -> Result<ContentHeaderFrame> {
    let class_id = read_u16(src)?;
    let weight = read_u16(src)?;
    let body_size = read_u64(src)?;
    let properties = decode_properties(src)?;

    Ok(ContentHeaderFrame {
        channel,
        class_id,
        weight,
        body_size,
        properties,
    })
}

pub fn encode_content_header(buf: &mut BytesMut, header: &ContentHeaderFrame) -> Result<()> {
    put_header(
        buf,
        header.channel,
        header.class_id,
        header.weight,
        header.body_size,
        &header.properties,
    )
}

fn put_header(
    buf: &mut BytesMut,
    channel: Channel,
    class_id: u16,
    weight: u16,
    body_size: u64,
    properties: &BasicProperties,
) -> Result<()> {
    let start = begin_frame(buf, FRAME_CONTENT_HEADER, channel);

    buf.put_u16(class_id);
    buf.put_u16(weight);
    buf.put_u64(body_size);

    if properties.is_empty() {
        buf.put_u16(0);
    } else {
        encode_properties(buf, properties)?;
    }

    finish_frame(buf, start);

    Ok(())
}

/// Encode the body as one or more body frames, none of them bigger than `frame_max`.
pub fn encode_content_body(buf: &mut BytesMut, channel: Channel, body: &[u8], frame_max: usize) -> Result<()> {
    if frame_max <= FRAME_OVERHEAD {
        return frame_error!(FRAME_ERROR, format!("Frame max {} is too small", frame_max));
    }

    for chunk in body.chunks(frame_max - FRAME_OVERHEAD) {
        let start = begin_frame(buf, FRAME_CONTENT_BODY, channel);

        buf.put_slice(chunk);

        finish_frame(buf, start);
    }

    Ok(())
}

/// Encode the content header and the body frames which follow a `Basic.Publish`.
pub fn encode_content(
    buf: &mut BytesMut,
    channel: Channel,
    properties: &BasicProperties,
    body: &[u8],
    frame_max: usize,
) -> Result<()> {
    put_header(buf, channel, CLASS_BASIC, 0, body.len() as u64, properties)?;

    encode_content_body(buf, channel, body, frame_max)
}
