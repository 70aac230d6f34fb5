use super::{AMQPFrame, Channel, FieldTable, MethodFrameArgs};

bitflags! {
    /// Bits of `Exchange.Declare` in wire order.
    #[derive(Clone, Debug, Default)]
    pub struct ExchangeDeclareFlags: u8 {
        const PASSIVE = 1;
        const DURABLE = 1 << 1;
        const AUTO_DELETE = 1 << 2;
        const INTERNAL = 1 << 3;
        const NO_WAIT = 1 << 4;
    }
}

bitflags! {
    #[derive(Clone, Debug, Default)]
    pub struct ExchangeDeleteFlags: u8 {
        const IF_UNUSED = 1;
        const NO_WAIT = 1 << 1;
    }
}

#[derive(Debug, Default)]
pub struct ExchangeDeclareArgs {
    pub exchange_name: String,
    pub exchange_type: String,
    pub flags: ExchangeDeclareFlags,
    pub args: Option<FieldTable>,
}

#[derive(Debug, Default)]
pub struct ExchangeDeleteArgs {
    pub exchange_name: String,
    pub flags: ExchangeDeleteFlags,
}

pub fn exchange_declare_ok(channel: Channel) -> AMQPFrame {
    MethodFrameArgs::ExchangeDeclareOk.frame(channel)
}

pub fn exchange_delete_ok(channel: Channel) -> AMQPFrame {
    MethodFrameArgs::ExchangeDeleteOk.frame(channel)
}
