use crate::model;
use nextmq_codec::FrameError;
use std::fmt;

/// Represents a connection or channel error. If `channel` is `None` it is a
/// connection error.
#[derive(Clone, Debug)]
pub struct ClientError {
    pub channel: Option<model::ChannelNumber>,
    pub code: u16,
    pub message: String,
    pub class_method: model::ClassMethod,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientError")
            .field("channel", &self.channel)
            .field("code", &self.code)
            .field("message", &self.message)
            .field("class_method", &format!("{:08X}", &self.class_method))
            .finish()
    }
}

impl std::error::Error for ClientError {}

/// Shorthand for creating errors in async functions.
#[macro_export]
macro_rules! client_error {
    ($channel:expr, $code:expr, $message:expr, $cm:expr) => {
        ::std::result::Result::Err(anyhow::Error::new($crate::ClientError {
            channel: $channel,
            code: $code,
            message: ::std::string::String::from($message),
            class_method: $cm,
        }))
    };
}

/// A suspended operation gave up before its condition was met.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupted {
    /// The connection-wide cancellation token fired.
    Cancelled,
    /// The deadline of the operation passed.
    TimedOut,
}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupted::Cancelled => write!(f, "Operation is cancelled"),
            Interrupted::TimedOut => write!(f, "Operation timed out"),
        }
    }
}

impl std::error::Error for Interrupted {}

/// Errors of the ring buffer operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingError {
    /// Every reading gate slot is in use.
    GatesExhausted,
    /// A frame does not fit into the ring at all.
    FrameTooLarge { size: usize, capacity: usize },
    /// The producer side closed the ring.
    Closed,
    Cancelled,
    TimedOut,
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::GatesExhausted => write!(f, "All reading gates are in use"),
            RingError::FrameTooLarge { size, capacity } => {
                write!(f, "Frame of {} bytes does not fit into a ring of {} bytes", size, capacity)
            }
            RingError::Closed => write!(f, "Ring buffer is closed"),
            RingError::Cancelled => write!(f, "Ring operation is cancelled"),
            RingError::TimedOut => write!(f, "Ring operation timed out"),
        }
    }
}

impl std::error::Error for RingError {}

/// Converts a codec error to a connection level `ClientError` keeping the reply code.
pub(crate) fn from_codec(err: nextmq_codec::Error) -> anyhow::Error {
    match err.downcast::<FrameError>() {
        Ok(fe) => anyhow::Error::new(ClientError {
            channel: None,
            code: fe.code,
            message: fe.message,
            class_method: 0,
        }),
        Err(other) => anyhow::anyhow!(other),
    }
}

/// The reply code to report when a fatal error closes the connection.
pub(crate) fn reply_code(err: &anyhow::Error) -> u16 {
    if let Some(ce) = err.downcast_ref::<ClientError>() {
        return ce.code;
    }

    match err.downcast_ref::<RingError>() {
        Some(RingError::FrameTooLarge { .. }) => model::ConnectionError::FrameError as u16,
        _ => model::ConnectionError::InternalError as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextmq_codec::frame_error;

    #[test]
    fn codec_errors_keep_their_code() {
        let res: nextmq_codec::Result<()> = frame_error!(502, "Bad value");
        let err = from_codec(res.unwrap_err());

        let ce = err.downcast_ref::<ClientError>().unwrap();
        assert_eq!(ce.code, 502);
        assert_eq!(ce.channel, None);
        assert_eq!(reply_code(&err), 502);
    }

    #[test]
    fn ring_errors_map_to_reply_codes() {
        let too_large = anyhow::Error::new(RingError::FrameTooLarge { size: 10, capacity: 8 });
        let exhausted = anyhow::Error::new(RingError::GatesExhausted);

        assert_eq!(reply_code(&too_large), 501);
        assert_eq!(reply_code(&exhausted), 541);
    }
}
