//! AMQP 0.9.1 client engine.
//!
//! Inbound bytes land in a ring buffer and frames are decoded in place, message bodies are
//! handed to the consumers as views into the ring. See [`Client`] and [`Channel`].
mod dev;
pub use dev::setup_logger;

mod channel_api;
pub use channel_api::{Channel, QueueInfo};

mod client_api;
pub use client_api::{connect, Client};

mod config;
pub use config::{ClientConfig, WaitingKind};

mod confirm;
pub use confirm::Confirmation;

mod consumer;
pub use consumer::ConsumeMode;

mod continuation;

mod error;
pub use error::{ClientError, Interrupted, RingError};

mod message;
pub use message::{Body, GatedBody, MessageDelivery, ReturnedMessage};

mod model;
pub use model::{ChannelError, ChannelNumber, ConnectionError};

mod processor;
mod reader;

mod ring;

mod state;

mod transport;
pub use transport::Transport;

mod wait;
pub use wait::{BlockingWait, HybridWait, SpinWait, WaitOutcome, WaitingStrategy};

pub use nextmq_codec::frame::{
    AMQPFieldValue, BasicProperties, ExchangeDeclareFlags, FieldTable, QueueDeclareFlags, QueueDeleteFlags,
};
