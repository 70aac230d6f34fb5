//! Data structures and converter functions for dealing with AMQP 0-9-1 frames.
//!
//! All the data types are in the `frame` module, the `codec` implements
//! the encoding and the decoding. Decoders work against any `bytes::Buf`, so
//! frames can be read from a contiguous `BytesMut` as well as from a view
//! which spans the wrap-around point of a ring buffer.
pub mod codec;
pub mod frame;


#[macro_use]
extern crate bitflags;

use std::fmt;

/// Type alias for a sync and send error.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
/// Type alias for a simplified Result with Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Reply code of malformed frames.
pub const FRAME_ERROR: u16 = 501;
/// Reply code of frames with invalid field values.
pub const SYNTAX_ERROR: u16 = 502;
/// Reply code of frames arriving out of the expected order.
pub const UNEXPECTED_FRAME: u16 = 505;
/// Reply code of valid but unsupported functionality.
pub const NOT_IMPLEMENTED: u16 = 540;

/// Error struct used by the crate.
#[derive(Debug)]
pub struct FrameError {
    pub code: u16,
    pub message: String,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self)
    }
}

impl std::error::Error for FrameError {}

/// Shorthand for making errors with error code and error message.
///
/// ```no_run
/// use nextmq_codec::frame_error;
/// use nextmq_codec::FrameError;
/// use nextmq_codec::frame::AMQPFieldValue;
///
/// fn as_string(val: AMQPFieldValue) -> Result<String, Box<dyn std::error::Error>> {
///     if let AMQPFieldValue::LongString(s) = val {
///         return Ok(s.clone())
///     }
///
///     frame_error!(502, "Value cannot be converted to string")
/// }
/// ```
#[macro_export]
macro_rules! frame_error {
    ($code:expr, $message:expr) => {
        ::std::result::Result::Err(Box::new($crate::FrameError {
            code: $code,
            message: ::std::string::String::from($message),
        }))
    };
}
