mod basic;
mod channel;
mod connection;
mod exchange;
mod properties;
mod queue;

pub use self::{
    basic::{
        confirm_select, confirm_select_ok, BasicAckArgs, BasicCancelArgs, BasicCancelOkArgs, BasicConsumeArgs,
        BasicConsumeFlags, BasicConsumeOkArgs, BasicDeliverArgs, BasicNackArgs, BasicNackFlags, BasicPublishArgs,
        BasicPublishFlags, BasicQosArgs, BasicRecoverArgs, BasicRejectArgs, BasicReturnArgs, ConfirmSelectArgs,
    },
    channel::{
        channel_close, channel_close_ok, channel_open, channel_open_ok, ChannelCloseArgs, ChannelFlowArgs,
    },
    connection::{
        connection_close, connection_close_ok, connection_open_ok, ConnectionBlockedArgs, ConnectionCloseArgs,
        ConnectionOpenArgs, ConnectionStartArgs, ConnectionStartOkArgs, ConnectionTuneArgs, ConnectionTuneOkArgs,
    },
    exchange::{
        exchange_declare_ok, exchange_delete_ok, ExchangeDeclareArgs, ExchangeDeclareFlags, ExchangeDeleteArgs,
        ExchangeDeleteFlags,
    },
    properties::BasicProperties,
    queue::{
        queue_bind_ok, queue_unbind_ok, QueueBindArgs, QueueDeclareArgs, QueueDeclareFlags,
        QueueDeclareOkArgs, QueueDeleteArgs, QueueDeleteFlags, QueueDeleteOkArgs, QueuePurgeArgs, QueuePurgeOkArgs,
        QueueUnbindArgs,
    },
};
use bytes::Bytes;
use std::collections::HashMap;

pub const CONNECTION_START: u32 = 0x000A000A;
pub const CONNECTION_START_OK: u32 = 0x000A000B;
pub const CONNECTION_TUNE: u32 = 0x000A001E;
pub const CONNECTION_TUNE_OK: u32 = 0x000A001F;
pub const CONNECTION_OPEN: u32 = 0x000A0028;
pub const CONNECTION_OPEN_OK: u32 = 0x000A0029;
pub const CONNECTION_CLOSE: u32 = 0x000A0032;
pub const CONNECTION_CLOSE_OK: u32 = 0x000A0033;
pub const CONNECTION_BLOCKED: u32 = 0x000A003C;
pub const CONNECTION_UNBLOCKED: u32 = 0x000A003D;

pub const CHANNEL_OPEN: u32 = 0x0014000A;
pub const CHANNEL_OPEN_OK: u32 = 0x0014000B;
pub const CHANNEL_FLOW: u32 = 0x00140014;
pub const CHANNEL_FLOW_OK: u32 = 0x00140015;
pub const CHANNEL_CLOSE: u32 = 0x00140028;
pub const CHANNEL_CLOSE_OK: u32 = 0x00140029;

pub const EXCHANGE_DECLARE: u32 = 0x0028000A;
pub const EXCHANGE_DECLARE_OK: u32 = 0x0028000B;
pub const EXCHANGE_DELETE: u32 = 0x00280014;
pub const EXCHANGE_DELETE_OK: u32 = 0x00280015;

pub const QUEUE_DECLARE: u32 = 0x0032000A;
pub const QUEUE_DECLARE_OK: u32 = 0x0032000B;
pub const QUEUE_BIND: u32 = 0x00320014;
pub const QUEUE_BIND_OK: u32 = 0x00320015;
pub const QUEUE_PURGE: u32 = 0x0032001E;
pub const QUEUE_PURGE_OK: u32 = 0x0032001F;
pub const QUEUE_DELETE: u32 = 0x00320028;
pub const QUEUE_DELETE_OK: u32 = 0x00320029;
pub const QUEUE_UNBIND: u32 = 0x00320032;
pub const QUEUE_UNBIND_OK: u32 = 0x00320033;

pub const BASIC_QOS: u32 = 0x003C000A;
pub const BASIC_QOS_OK: u32 = 0x003C000B;
pub const BASIC_CONSUME: u32 = 0x003C0014;
pub const BASIC_CONSUME_OK: u32 = 0x003C0015;
pub const BASIC_CANCEL: u32 = 0x003C001E;
pub const BASIC_CANCEL_OK: u32 = 0x003C001F;
pub const BASIC_PUBLISH: u32 = 0x003C0028;
pub const BASIC_RETURN: u32 = 0x003C0032;
pub const BASIC_DELIVER: u32 = 0x003C003C;
pub const BASIC_ACK: u32 = 0x003C0050;
pub const BASIC_REJECT: u32 = 0x003C005A;
pub const BASIC_RECOVER: u32 = 0x003C006E;
pub const BASIC_RECOVER_OK: u32 = 0x003C006F;
pub const BASIC_NACK: u32 = 0x003C0078;

pub const CONFIRM_SELECT: u32 = 0x0055000A;
pub const CONFIRM_SELECT_OK: u32 = 0x0055000B;

/// Class id of the basic class, the only class which carries content.
pub const CLASS_BASIC: u16 = 0x003C;

pub type Channel = u16;
pub type ClassMethod = u32;
pub type ClassId = u16;
pub type Weight = u16;

/// Represents an AMQP frame.
pub enum AMQPFrame {
    /// Header is to be sent to the server at first, announcing the AMQP version we support
    Header,
    /// Represents the AMQP RPC frames. Connection based calls have a channel number 0, otherwise
    /// channel is the current channel on which the frames are sent. The RPC arguments are
    /// represented in `MethodFrameArgs`.
    Method(Channel, ClassMethod, MethodFrameArgs),
    ContentHeader(ContentHeaderFrame),
    ContentBody(ContentBodyFrame),
    Heartbeat(Channel),
}

impl std::fmt::Debug for AMQPFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AMQPFrame::Header => write!(f, "Header"),
            AMQPFrame::Method(ch, cm, args) => write!(f, "Method(channel={}, {:08X}, {:?})", ch, cm, args),
            AMQPFrame::ContentHeader(ch) => write!(f, "ContentHeader({:?})", ch),
            AMQPFrame::ContentBody(cb) => write!(f, "ContentBody({:?})", cb),
            AMQPFrame::Heartbeat(_) => write!(f, "Heartbeat"),
        }
    }
}

/// Represents all types of method frame arguments.
#[derive(Debug)]
pub enum MethodFrameArgs {
    ConnectionStart(ConnectionStartArgs),
    ConnectionStartOk(ConnectionStartOkArgs),
    ConnectionTune(ConnectionTuneArgs),
    ConnectionTuneOk(ConnectionTuneOkArgs),
    ConnectionOpen(ConnectionOpenArgs),
    ConnectionOpenOk,
    ConnectionClose(ConnectionCloseArgs),
    ConnectionCloseOk,
    ConnectionBlocked(ConnectionBlockedArgs),
    ConnectionUnblocked,
    ChannelOpen,
    ChannelOpenOk,
    ChannelFlow(ChannelFlowArgs),
    ChannelFlowOk(ChannelFlowArgs),
    ChannelClose(ChannelCloseArgs),
    ChannelCloseOk,
    ExchangeDeclare(ExchangeDeclareArgs),
    ExchangeDeclareOk,
    ExchangeDelete(ExchangeDeleteArgs),
    ExchangeDeleteOk,
    QueueDeclare(QueueDeclareArgs),
    QueueDeclareOk(QueueDeclareOkArgs),
    QueueBind(QueueBindArgs),
    QueueBindOk,
    QueuePurge(QueuePurgeArgs),
    QueuePurgeOk(QueuePurgeOkArgs),
    QueueDelete(QueueDeleteArgs),
    QueueDeleteOk(QueueDeleteOkArgs),
    QueueUnbind(QueueUnbindArgs),
    QueueUnbindOk,
    BasicQos(BasicQosArgs),
    BasicQosOk,
    BasicConsume(BasicConsumeArgs),
    BasicConsumeOk(BasicConsumeOkArgs),
    BasicCancel(BasicCancelArgs),
    BasicCancelOk(BasicCancelOkArgs),
    BasicPublish(BasicPublishArgs),
    BasicReturn(BasicReturnArgs),
    BasicDeliver(BasicDeliverArgs),
    BasicAck(BasicAckArgs),
    BasicReject(BasicRejectArgs),
    BasicRecover(BasicRecoverArgs),
    BasicRecoverOk,
    BasicNack(BasicNackArgs),
    ConfirmSelect(ConfirmSelectArgs),
    ConfirmSelectOk,
}

impl MethodFrameArgs {
    /// The combined class and method id of the arguments.
    pub fn class_method(&self) -> ClassMethod {
        use MethodFrameArgs::*;

        match self {
            ConnectionStart(_) => CONNECTION_START,
            ConnectionStartOk(_) => CONNECTION_START_OK,
            ConnectionTune(_) => CONNECTION_TUNE,
            ConnectionTuneOk(_) => CONNECTION_TUNE_OK,
            ConnectionOpen(_) => CONNECTION_OPEN,
            ConnectionOpenOk => CONNECTION_OPEN_OK,
            ConnectionClose(_) => CONNECTION_CLOSE,
            ConnectionCloseOk => CONNECTION_CLOSE_OK,
            ConnectionBlocked(_) => CONNECTION_BLOCKED,
            ConnectionUnblocked => CONNECTION_UNBLOCKED,
            ChannelOpen => CHANNEL_OPEN,
            ChannelOpenOk => CHANNEL_OPEN_OK,
            ChannelFlow(_) => CHANNEL_FLOW,
            ChannelFlowOk(_) => CHANNEL_FLOW_OK,
            ChannelClose(_) => CHANNEL_CLOSE,
            ChannelCloseOk => CHANNEL_CLOSE_OK,
            ExchangeDeclare(_) => EXCHANGE_DECLARE,
            ExchangeDeclareOk => EXCHANGE_DECLARE_OK,
            ExchangeDelete(_) => EXCHANGE_DELETE,
            ExchangeDeleteOk => EXCHANGE_DELETE_OK,
            QueueDeclare(_) => QUEUE_DECLARE,
            QueueDeclareOk(_) => QUEUE_DECLARE_OK,
            QueueBind(_) => QUEUE_BIND,
            QueueBindOk => QUEUE_BIND_OK,
            QueuePurge(_) => QUEUE_PURGE,
            QueuePurgeOk(_) => QUEUE_PURGE_OK,
            QueueDelete(_) => QUEUE_DELETE,
            QueueDeleteOk(_) => QUEUE_DELETE_OK,
            QueueUnbind(_) => QUEUE_UNBIND,
            QueueUnbindOk => QUEUE_UNBIND_OK,
            BasicQos(_) => BASIC_QOS,
            BasicQosOk => BASIC_QOS_OK,
            BasicConsume(_) => BASIC_CONSUME,
            BasicConsumeOk(_) => BASIC_CONSUME_OK,
            BasicCancel(_) => BASIC_CANCEL,
            BasicCancelOk(_) => BASIC_CANCEL_OK,
            BasicPublish(_) => BASIC_PUBLISH,
            BasicReturn(_) => BASIC_RETURN,
            BasicDeliver(_) => BASIC_DELIVER,
            BasicAck(_) => BASIC_ACK,
            BasicReject(_) => BASIC_REJECT,
            BasicRecover(_) => BASIC_RECOVER,
            BasicRecoverOk => BASIC_RECOVER_OK,
            BasicNack(_) => BASIC_NACK,
            ConfirmSelect(_) => CONFIRM_SELECT,
            ConfirmSelectOk => CONFIRM_SELECT_OK,
        }
    }

    /// Wraps the arguments into a method frame of the channel.
    pub fn frame(self, channel: Channel) -> AMQPFrame {
        AMQPFrame::Method(channel, self.class_method(), self)
    }
}

/// Lifts argument structs into their `MethodFrameArgs` variant and gives them a `frame` shortcut.
macro_rules! method_args {
    ($($args:ident => $variant:ident),+ $(,)?) => {
        $(
            impl From<$args> for MethodFrameArgs {
                fn from(args: $args) -> Self {
                    MethodFrameArgs::$variant(args)
                }
            }

            impl $args {
                pub fn frame(self, channel: Channel) -> AMQPFrame {
                    MethodFrameArgs::$variant(self).frame(channel)
                }
            }
        )+
    };
}

method_args! {
    ConnectionStartArgs => ConnectionStart,
    ConnectionStartOkArgs => ConnectionStartOk,
    ConnectionTuneArgs => ConnectionTune,
    ConnectionTuneOkArgs => ConnectionTuneOk,
    ConnectionOpenArgs => ConnectionOpen,
    ConnectionCloseArgs => ConnectionClose,
    ConnectionBlockedArgs => ConnectionBlocked,
    ChannelCloseArgs => ChannelClose,
    ExchangeDeclareArgs => ExchangeDeclare,
    ExchangeDeleteArgs => ExchangeDelete,
    QueueDeclareArgs => QueueDeclare,
    QueueDeclareOkArgs => QueueDeclareOk,
    QueueBindArgs => QueueBind,
    QueuePurgeArgs => QueuePurge,
    QueuePurgeOkArgs => QueuePurgeOk,
    QueueDeleteArgs => QueueDelete,
    QueueDeleteOkArgs => QueueDeleteOk,
    QueueUnbindArgs => QueueUnbind,
    BasicQosArgs => BasicQos,
    BasicConsumeArgs => BasicConsume,
    BasicConsumeOkArgs => BasicConsumeOk,
    BasicCancelArgs => BasicCancel,
    BasicCancelOkArgs => BasicCancelOk,
    BasicPublishArgs => BasicPublish,
    BasicReturnArgs => BasicReturn,
    BasicDeliverArgs => BasicDeliver,
    BasicAckArgs => BasicAck,
    BasicRejectArgs => BasicReject,
    BasicRecoverArgs => BasicRecover,
    BasicNackArgs => BasicNack,
    ConfirmSelectArgs => ConfirmSelect,
}

bitflags! {
    /// Presence bits of the basic content header properties. Bit 0 is the continuation flag of
    /// a following property word, it is never set by this crate.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct HeaderPropertyFlags: u16 {
        const CLUSTER_ID       = 0b0000_0000_0000_0100;
        const APP_ID           = 0b0000_0000_0000_1000;
        const USER_ID          = 0b0000_0000_0001_0000;
        const MESSAGE_TYPE     = 0b0000_0000_0010_0000;
        const TIMESTAMP        = 0b0000_0000_0100_0000;
        const MESSAGE_ID       = 0b0000_0000_1000_0000;
        const EXPIRATION       = 0b0000_0001_0000_0000;
        const REPLY_TO         = 0b0000_0010_0000_0000;
        const CORRELATION_ID   = 0b0000_0100_0000_0000;
        const PRIORITY         = 0b0000_1000_0000_0000;
        const DELIVERY_MODE    = 0b0001_0000_0000_0000;
        const HEADERS          = 0b0010_0000_0000_0000;
        const CONTENT_ENCODING = 0b0100_0000_0000_0000;
        const CONTENT_TYPE     = 0b1000_0000_0000_0000;
    }
}

/// The content header which follows a `Basic.Publish`, `Basic.Deliver` or `Basic.Return`.
#[derive(Debug, Default)]
pub struct ContentHeaderFrame {
    pub channel: Channel,
    pub class_id: ClassId,
    pub weight: Weight,
    pub body_size: u64,
    pub properties: BasicProperties,
}

impl ContentHeaderFrame {
    pub fn new(channel: Channel, body_size: u64, properties: BasicProperties) -> Self {
        Self {
            channel,
            class_id: CLASS_BASIC,
            weight: 0,
            body_size,
            properties,
        }
    }

    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::ContentHeader(self)
    }
}

pub struct ContentBodyFrame {
    pub channel: Channel,
    pub body: Bytes,
}

impl ContentBodyFrame {
    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::ContentBody(self)
    }
}

impl std::fmt::Debug for ContentBodyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = String::from_utf8_lossy(&self.body[..std::cmp::min(64usize, self.body.len())]);

        f.write_fmt(format_args!(
            "ContentBodyFrame {{ channel: {}, body: \"{}\" }}",
            &self.channel, body
        ))
    }
}

/// Type alias for inner type of field value.
pub type FieldTable = HashMap<String, AMQPFieldValue>;

/// Values of a field table, tagged on the wire by the octet in the comment.
#[derive(Clone, Debug, PartialEq)]
pub enum AMQPFieldValue {
    /// `t`
    Bool(bool),
    /// `b`
    I8(i8),
    /// `B`
    U8(u8),
    /// `s`
    I16(i16),
    /// `u`
    U16(u16),
    /// `I`
    I32(i32),
    /// `i`
    U32(u32),
    /// `l`
    I64(i64),
    /// `f`
    F32(f32),
    /// `d`
    F64(f64),
    /// `D`, scale and unscaled value
    Decimal(u8, u32),
    /// `S`
    LongString(String),
    /// `x`
    ByteArray(Vec<u8>),
    /// `A`
    FieldArray(Vec<AMQPFieldValue>),
    /// `T`
    Timestamp(u64),
    /// `F`
    FieldTable(Box<FieldTable>),
    /// `V`
    Void,
}

impl From<ContentHeaderFrame> for AMQPFrame {
    fn from(chf: ContentHeaderFrame) -> AMQPFrame {
        AMQPFrame::ContentHeader(chf)
    }
}

impl From<ContentBodyFrame> for AMQPFrame {
    fn from(cbf: ContentBodyFrame) -> AMQPFrame {
        AMQPFrame::ContentBody(cbf)
    }
}

/// Split class id and method id from `u32` combined code.
pub fn split_class_method(cm: u32) -> (u16, u16) {
    let method_id = (cm & 0x0000FFFF) as u16;
    let class_id = (cm >> 16) as u16;

    (class_id, method_id)
}

/// Combine class id and method id to a single `u32` value
pub fn unify_class_method(class: u16, method: u16) -> u32 {
    ((class as u32) << 16) | (method as u32)
}

pub fn heartbeat() -> AMQPFrame {
    AMQPFrame::Heartbeat(0)
}
