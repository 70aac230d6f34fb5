//! Encoding and decoding of the AMQP primitive types.
//!
//! Decoders accept any `Buf` (including `dyn Buf`) and never panic on short input, a truncated
//! value is reported as a frame error.
use crate::frame::{AMQPFieldValue, FieldTable};
use crate::{frame_error, Result, FRAME_ERROR, SYNTAX_ERROR};
use bytes::{Buf, BufMut, BytesMut};

fn ensure<B: Buf + ?Sized>(buf: &B, len: usize) -> Result<()> {
    if buf.remaining() < len {
        return frame_error!(
            FRAME_ERROR,
            format!("Truncated value, need {} bytes, have {}", len, buf.remaining())
        );
    }

    Ok(())
}

pub fn read_u8<B: Buf + ?Sized>(buf: &mut B) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn read_u16<B: Buf + ?Sized>(buf: &mut B) -> Result<u16> {
    ensure(buf, 2)?;
    Ok(buf.get_u16())
}

pub fn read_u32<B: Buf + ?Sized>(buf: &mut B) -> Result<u32> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

pub fn read_u64<B: Buf + ?Sized>(buf: &mut B) -> Result<u64> {
    ensure(buf, 8)?;
    Ok(buf.get_u64())
}

fn read_bytes<B: Buf + ?Sized>(buf: &mut B, len: usize) -> Result<Vec<u8>> {
    ensure(buf, len)?;

    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);

    Ok(bytes)
}

fn into_string(bytes: Vec<u8>) -> Result<String> {
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => frame_error!(SYNTAX_ERROR, format!("Invalid UTF-8 string {:?}", e)),
    }
}

pub fn decode_short_string<B: Buf + ?Sized>(buf: &mut B) -> Result<String> {
    let len = read_u8(buf)? as usize;

    into_string(read_bytes(buf, len)?)
}

pub fn decode_long_string<B: Buf + ?Sized>(buf: &mut B) -> Result<String> {
    let len = read_u32(buf)? as usize;

    into_string(read_bytes(buf, len)?)
}

/// Decode a field table
///
/// The buffer points to the beginning of the field table which is a `u32` length
/// information. An empty table is decoded as `None`.
pub fn decode_field_table<B: Buf + ?Sized>(buf: &mut B) -> Result<Option<FieldTable>> {
    let ft_len = read_u32(buf)? as usize;

    if ft_len == 0 {
        return Ok(None);
    }

    ensure(buf, ft_len)?;

    let mut limited = Buf::take(&mut *buf, ft_len);
    let ft_buf: &mut dyn Buf = &mut limited;
    let mut table = FieldTable::new();

    while ft_buf.has_remaining() {
        let field_name = decode_short_string(ft_buf)?;
        let field_value = decode_value(ft_buf)?;

        table.insert(field_name, field_value);
    }

    Ok(Some(table))
}

fn decode_field_array(buf: &mut dyn Buf) -> Result<Vec<AMQPFieldValue>> {
    let len = read_u32(buf)? as usize;

    ensure(buf, len)?;

    let mut limited = Buf::take(&mut *buf, len);
    let array_buf: &mut dyn Buf = &mut limited;
    let mut values = vec![];

    while array_buf.has_remaining() {
        values.push(decode_value(array_buf)?);
    }

    Ok(values)
}

fn decode_value(buf: &mut dyn Buf) -> Result<AMQPFieldValue> {
    let value = match read_u8(buf)? {
        b't' => AMQPFieldValue::Bool(read_u8(buf)? != 0),
        b'b' => AMQPFieldValue::I8(read_u8(buf)? as i8),
        b'B' => AMQPFieldValue::U8(read_u8(buf)?),
        b's' => AMQPFieldValue::I16(read_u16(buf)? as i16),
        b'u' => AMQPFieldValue::U16(read_u16(buf)?),
        b'I' => AMQPFieldValue::I32(read_u32(buf)? as i32),
        b'i' => AMQPFieldValue::U32(read_u32(buf)?),
        b'l' => AMQPFieldValue::I64(read_u64(buf)? as i64),
        b'f' => AMQPFieldValue::F32(f32::from_bits(read_u32(buf)?)),
        b'd' => AMQPFieldValue::F64(f64::from_bits(read_u64(buf)?)),
        b'D' => {
            let scale = read_u8(buf)?;
            let value = read_u32(buf)?;

            AMQPFieldValue::Decimal(scale, value)
        }
        b'S' => AMQPFieldValue::LongString(decode_long_string(buf)?),
        b'x' => {
            let len = read_u32(buf)? as usize;

            AMQPFieldValue::ByteArray(read_bytes(buf, len)?)
        }
        b'A' => AMQPFieldValue::FieldArray(decode_field_array(buf)?),
        b'T' => AMQPFieldValue::Timestamp(read_u64(buf)?),
        b'F' => match decode_field_table(buf)? {
            None => AMQPFieldValue::FieldTable(Box::default()),
            Some(table) => AMQPFieldValue::FieldTable(Box::new(table)),
        },
        b'V' => AMQPFieldValue::Void,
        t => return frame_error!(SYNTAX_ERROR, format!("Unknown field value type {}", t)),
    };

    Ok(value)
}

/// Encode a short string, strings longer than 255 bytes cannot be represented.
pub fn encode_short_string<B: BufMut + ?Sized>(buf: &mut B, s: &str) -> Result<()> {
    if s.len() > u8::MAX as usize {
        return frame_error!(
            SYNTAX_ERROR,
            format!("Short string is too long ({} bytes)", s.len())
        );
    }

    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());

    Ok(())
}

pub fn encode_long_string<B: BufMut + ?Sized>(buf: &mut B, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

pub fn encode_empty_field_table<B: BufMut + ?Sized>(buf: &mut B) {
    buf.put_u32(0);
}

pub fn encode_field_table<B: BufMut + ?Sized>(buf: &mut B, ft: Option<&FieldTable>) -> Result<()> {
    match ft {
        None => {
            encode_empty_field_table(buf);
            Ok(())
        }
        Some(t) => {
            let mut ft_buf = BytesMut::with_capacity(256);

            encode_field_entries(&mut ft_buf, t)?;

            buf.put_u32(ft_buf.len() as u32);
            buf.put_slice(&ft_buf);

            Ok(())
        }
    }
}

fn encode_field_entries(buf: &mut BytesMut, ft: &FieldTable) -> Result<()> {
    for (name, value) in ft {
        encode_short_string(buf, name)?;
        encode_value(buf, value)?;
    }

    Ok(())
}

fn encode_value(buf: &mut BytesMut, value: &AMQPFieldValue) -> Result<()> {
    match value {
        AMQPFieldValue::Bool(v) => {
            buf.put_u8(b't');
            buf.put_u8(if *v { 1 } else { 0 });
        }
        AMQPFieldValue::I8(v) => {
            buf.put_u8(b'b');
            buf.put_i8(*v);
        }
        AMQPFieldValue::U8(v) => {
            buf.put_u8(b'B');
            buf.put_u8(*v);
        }
        AMQPFieldValue::I16(v) => {
            buf.put_u8(b's');
            buf.put_i16(*v);
        }
        AMQPFieldValue::U16(v) => {
            buf.put_u8(b'u');
            buf.put_u16(*v);
        }
        AMQPFieldValue::I32(v) => {
            buf.put_u8(b'I');
            buf.put_i32(*v);
        }
        AMQPFieldValue::U32(v) => {
            buf.put_u8(b'i');
            buf.put_u32(*v);
        }
        AMQPFieldValue::I64(v) => {
            buf.put_u8(b'l');
            buf.put_i64(*v);
        }
        AMQPFieldValue::F32(v) => {
            buf.put_u8(b'f');
            buf.put_f32(*v);
        }
        AMQPFieldValue::F64(v) => {
            buf.put_u8(b'd');
            buf.put_f64(*v);
        }
        AMQPFieldValue::Decimal(scale, v) => {
            buf.put_u8(b'D');
            buf.put_u8(*scale);
            buf.put_u32(*v);
        }
        AMQPFieldValue::LongString(v) => {
            buf.put_u8(b'S');
            encode_long_string(buf, v);
        }
        AMQPFieldValue::ByteArray(v) => {
            buf.put_u8(b'x');
            buf.put_u32(v.len() as u32);
            buf.put_slice(v);
        }
        AMQPFieldValue::FieldArray(values) => {
            let mut array_buf = BytesMut::with_capacity(64);

            for v in values {
                encode_value(&mut array_buf, v)?;
            }

            buf.put_u8(b'A');
            buf.put_u32(array_buf.len() as u32);
            buf.put_slice(&array_buf);
        }
        AMQPFieldValue::Timestamp(v) => {
            buf.put_u8(b'T');
            buf.put_u64(*v);
        }
        AMQPFieldValue::FieldTable(v) => {
            buf.put_u8(b'F');
            encode_field_table(buf, Some(v.as_ref()))?;
        }
        AMQPFieldValue::Void => buf.put_u8(b'V'),
    }

    Ok(())
}

/// Pack consecutive boolean arguments into one octet, the first flag goes to the lowest bit.
pub fn pack_bits(flags: &[bool]) -> u8 {
    flags
        .iter()
        .take(8)
        .enumerate()
        .fold(0u8, |acc, (i, flag)| if *flag { acc | (1 << i) } else { acc })
}

/// Unpack the boolean arguments packed by [`pack_bits`].
pub fn unpack_bits<const N: usize>(octet: u8) -> [bool; N] {
    let mut flags = [false; N];

    for (i, flag) in flags.iter_mut().enumerate().take(8) {
        *flag = octet & (1 << i) != 0;
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_packed_from_the_lowest_bit() {
        assert_eq!(pack_bits(&[true]), 0b0000_0001);
        assert_eq!(pack_bits(&[false, true]), 0b0000_0010);
        assert_eq!(pack_bits(&[true, false, true]), 0b0000_0101);

        let [multiple, requeue] = unpack_bits::<2>(0b0000_0010);
        assert!(!multiple);
        assert!(requeue);
    }

    #[test]
    fn long_short_string_is_refused() {
        let mut buf = BytesMut::new();
        let long = "x".repeat(256);

        assert!(encode_short_string(&mut buf, &long).is_err());
        assert!(encode_short_string(&mut buf, &long[..255]).is_ok());
        assert_eq!(buf.len(), 256);
    }

    #[test]
    fn nested_tables_and_arrays() {
        let mut inner = FieldTable::new();
        inner.insert("flag".into(), AMQPFieldValue::Bool(true));
        inner.insert("big".into(), AMQPFieldValue::I64(-5_000_000_000));

        let mut table = FieldTable::new();
        table.insert("inner".into(), AMQPFieldValue::FieldTable(Box::new(inner)));
        table.insert(
            "list".into(),
            AMQPFieldValue::FieldArray(vec![AMQPFieldValue::U8(7), AMQPFieldValue::LongString("seven".into())]),
        );
        table.insert("ts".into(), AMQPFieldValue::Timestamp(1_700_000_000));
        table.insert("none".into(), AMQPFieldValue::Void);

        let mut buf = BytesMut::new();
        encode_field_table(&mut buf, Some(&table)).unwrap();

        let decoded = decode_field_table(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, table);
        assert!(buf.is_empty());
    }

    #[test]
    fn truncated_table_is_an_error() {
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        buf.put_u8(3);

        assert!(decode_field_table(&mut buf).is_err());
    }

    #[test]
    fn unknown_value_tag_is_an_error() {
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.put_u8(1);
        buf.put_u8(b'k');
        buf.put_u8(b'?');

        assert!(decode_field_table(&mut buf).is_err());
    }
}
