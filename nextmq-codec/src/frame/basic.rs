use super::{AMQPFrame, Channel, FieldTable, MethodFrameArgs};

bitflags! {
    /// Bits of `Basic.Consume` in wire order.
    #[derive(Clone, Debug, Default)]
    pub struct BasicConsumeFlags: u8 {
        const NO_LOCAL = 1;
        const NO_ACK = 1 << 1;
        const EXCLUSIVE = 1 << 2;
        const NO_WAIT = 1 << 3;
    }
}

bitflags! {
    #[derive(Clone, Debug, Default)]
    pub struct BasicPublishFlags: u8 {
        const MANDATORY = 1;
        const IMMEDIATE = 1 << 1;
    }
}

bitflags! {
    #[derive(Clone, Debug, Default)]
    pub struct BasicNackFlags: u8 {
        const MULTIPLE = 1;
        const REQUEUE = 1 << 1;
    }
}

/// Prefetch window of a channel, or of the whole connection when `global` is set.
#[derive(Clone, Debug, Default)]
pub struct BasicQosArgs {
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    pub global: bool,
}

#[derive(Debug, Default)]
pub struct BasicConsumeArgs {
    pub queue: String,
    pub consumer_tag: String,
    pub flags: BasicConsumeFlags,
    pub args: Option<FieldTable>,
}

#[derive(Clone, Debug, Default)]
pub struct BasicConsumeOkArgs {
    pub consumer_tag: String,
}

impl BasicConsumeOkArgs {
    pub fn new(consumer_tag: &str) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
        }
    }
}

/// Sent by the client to stop a consumer and by the broker when the queue went away.
#[derive(Clone, Debug, Default)]
pub struct BasicCancelArgs {
    pub consumer_tag: String,
    pub no_wait: bool,
}

impl BasicCancelArgs {
    pub fn new(consumer_tag: &str, no_wait: bool) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
            no_wait,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BasicCancelOkArgs {
    pub consumer_tag: String,
}

impl BasicCancelOkArgs {
    pub fn new(consumer_tag: &str) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BasicPublishArgs {
    pub exchange_name: String,
    pub routing_key: String,
    pub flags: BasicPublishFlags,
}

impl BasicPublishArgs {
    pub fn new(exchange_name: &str, routing_key: &str, mandatory: bool, immediate: bool) -> Self {
        let mut flags = BasicPublishFlags::empty();

        flags.set(BasicPublishFlags::MANDATORY, mandatory);
        flags.set(BasicPublishFlags::IMMEDIATE, immediate);

        Self {
            exchange_name: exchange_name.into(),
            routing_key: routing_key.into(),
            flags,
        }
    }

    pub fn is_mandatory(&self) -> bool {
        self.flags.contains(BasicPublishFlags::MANDATORY)
    }

    pub fn is_immediate(&self) -> bool {
        self.flags.contains(BasicPublishFlags::IMMEDIATE)
    }
}

/// An unroutable mandatory or undeliverable immediate publish coming back.
#[derive(Clone, Debug, Default)]
pub struct BasicReturnArgs {
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange_name: String,
    pub routing_key: String,
}

#[derive(Clone, Debug, Default)]
pub struct BasicDeliverArgs {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange_name: String,
    pub routing_key: String,
}

impl BasicDeliverArgs {
    pub fn new(consumer_tag: &str, delivery_tag: u64, exchange_name: &str, routing_key: &str) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
            delivery_tag,
            redelivered: false,
            exchange_name: exchange_name.into(),
            routing_key: routing_key.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BasicAckArgs {
    pub delivery_tag: u64,
    pub multiple: bool,
}

impl BasicAckArgs {
    pub fn new(delivery_tag: u64, multiple: bool) -> Self {
        Self { delivery_tag, multiple }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BasicRejectArgs {
    pub delivery_tag: u64,
    pub requeue: bool,
}

impl BasicRejectArgs {
    pub fn new(delivery_tag: u64, requeue: bool) -> Self {
        Self { delivery_tag, requeue }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BasicNackArgs {
    pub delivery_tag: u64,
    pub flags: BasicNackFlags,
}

impl BasicNackArgs {
    pub fn new(delivery_tag: u64, multiple: bool, requeue: bool) -> Self {
        let mut flags = BasicNackFlags::empty();

        flags.set(BasicNackFlags::MULTIPLE, multiple);
        flags.set(BasicNackFlags::REQUEUE, requeue);

        Self { delivery_tag, flags }
    }

    pub fn is_multiple(&self) -> bool {
        self.flags.contains(BasicNackFlags::MULTIPLE)
    }

    pub fn is_requeue(&self) -> bool {
        self.flags.contains(BasicNackFlags::REQUEUE)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BasicRecoverArgs {
    pub requeue: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ConfirmSelectArgs {
    pub no_wait: bool,
}

pub fn confirm_select(channel: Channel) -> AMQPFrame {
    ConfirmSelectArgs::default().frame(channel)
}

pub fn confirm_select_ok(channel: Channel) -> AMQPFrame {
    MethodFrameArgs::ConfirmSelectOk.frame(channel)
}
