use super::{AMQPFrame, Channel, FieldTable, MethodFrameArgs};

bitflags! {
    /// Bits of `Queue.Declare` in wire order.
    #[derive(Clone, Debug, Default)]
    pub struct QueueDeclareFlags: u8 {
        const PASSIVE = 1;
        const DURABLE = 1 << 1;
        const EXCLUSIVE = 1 << 2;
        const AUTO_DELETE = 1 << 3;
        const NO_WAIT = 1 << 4;
    }
}

bitflags! {
    /// Bits of `Queue.Delete` in wire order.
    #[derive(Clone, Debug, Default)]
    pub struct QueueDeleteFlags: u8 {
        const IF_UNUSED = 1;
        const IF_EMPTY = 1 << 1;
        const NO_WAIT = 1 << 2;
    }
}

#[derive(Debug, Default)]
pub struct QueueDeclareArgs {
    pub name: String,
    pub flags: QueueDeclareFlags,
    pub args: Option<FieldTable>,
}

/// Reply to a declare. The name is the generated one for server named queues.
#[derive(Debug, Default)]
pub struct QueueDeclareOkArgs {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

impl QueueDeclareOkArgs {
    pub fn new(name: &str, message_count: u32, consumer_count: u32) -> Self {
        Self {
            name: name.into(),
            message_count,
            consumer_count,
        }
    }
}

#[derive(Debug, Default)]
pub struct QueueBindArgs {
    pub queue_name: String,
    pub exchange_name: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub args: Option<FieldTable>,
}

impl QueueBindArgs {
    pub fn new(queue_name: &str, exchange_name: &str, routing_key: &str) -> Self {
        Self {
            queue_name: queue_name.into(),
            exchange_name: exchange_name.into(),
            routing_key: routing_key.into(),
            no_wait: false,
            args: None,
        }
    }
}

/// Unbind has no `no-wait` bit, the broker always replies.
#[derive(Debug, Default)]
pub struct QueueUnbindArgs {
    pub queue_name: String,
    pub exchange_name: String,
    pub routing_key: String,
    pub args: Option<FieldTable>,
}

impl QueueUnbindArgs {
    pub fn new(queue_name: &str, exchange_name: &str, routing_key: &str) -> Self {
        Self {
            queue_name: queue_name.into(),
            exchange_name: exchange_name.into(),
            routing_key: routing_key.into(),
            args: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct QueuePurgeArgs {
    pub queue_name: String,
    pub no_wait: bool,
}

#[derive(Debug, Default)]
pub struct QueueDeleteArgs {
    pub queue_name: String,
    pub flags: QueueDeleteFlags,
}

/// Number of messages removed by a purge.
#[derive(Debug, Default)]
pub struct QueuePurgeOkArgs {
    pub message_count: u32,
}

/// Number of messages dropped together with the queue.
#[derive(Debug, Default)]
pub struct QueueDeleteOkArgs {
    pub message_count: u32,
}

pub fn queue_bind_ok(channel: Channel) -> AMQPFrame {
    MethodFrameArgs::QueueBindOk.frame(channel)
}

pub fn queue_unbind_ok(channel: Channel) -> AMQPFrame {
    MethodFrameArgs::QueueUnbindOk.frame(channel)
}
