use super::{AMQPFrame, Channel, MethodFrameArgs};

/// Close reason of a channel, the class and method ids point to the failing method.
#[derive(Debug, Default)]
pub struct ChannelCloseArgs {
    pub code: u16,
    pub text: String,
    pub class_id: u16,
    pub method_id: u16,
}

/// Arguments of `Channel.Flow` and `Channel.FlowOk`.
#[derive(Clone, Debug, Default)]
pub struct ChannelFlowArgs {
    pub active: bool,
}

impl ChannelFlowArgs {
    /// The flow-ok frame echoing the requested state.
    pub fn ok_frame(self, channel: Channel) -> AMQPFrame {
        MethodFrameArgs::ChannelFlowOk(self).frame(channel)
    }
}

pub fn channel_open(channel: Channel) -> AMQPFrame {
    MethodFrameArgs::ChannelOpen.frame(channel)
}

pub fn channel_open_ok(channel: Channel) -> AMQPFrame {
    MethodFrameArgs::ChannelOpenOk.frame(channel)
}

pub fn channel_close(channel: Channel, code: u16, text: &str, class_method: u32) -> AMQPFrame {
    let (class_id, method_id) = super::split_class_method(class_method);
    let args = ChannelCloseArgs {
        code,
        text: text.into(),
        class_id,
        method_id,
    };

    MethodFrameArgs::ChannelClose(args).frame(channel)
}

pub fn channel_close_ok(channel: Channel) -> AMQPFrame {
    MethodFrameArgs::ChannelCloseOk.frame(channel)
}
