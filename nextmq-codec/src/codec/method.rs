//! Method frame arguments. One `encode_*` and one `decode_*` function per method, dispatched by
//! a single match on the class-method id.
use super::primitive::*;
use crate::frame::*;
use crate::{frame_error, Result, NOT_IMPLEMENTED};
use bytes::{Buf, BufMut, BytesMut};

/// Decode the payload of a method frame: class id, method id and the arguments.
pub fn decode_method_args<B: Buf + ?Sized>(src: &mut B) -> Result<(ClassMethod, MethodFrameArgs)> {
    let class_method = read_u32(src)?;

    let args = match class_method {
        CONNECTION_START => decode_connection_start(src)?,
        CONNECTION_START_OK => decode_connection_start_ok(src)?,
        CONNECTION_TUNE => MethodFrameArgs::ConnectionTune(ConnectionTuneArgs {
            channel_max: read_u16(src)?,
            frame_max: read_u32(src)?,
            heartbeat: read_u16(src)?,
        }),
        CONNECTION_TUNE_OK => MethodFrameArgs::ConnectionTuneOk(ConnectionTuneOkArgs {
            channel_max: read_u16(src)?,
            frame_max: read_u32(src)?,
            heartbeat: read_u16(src)?,
        }),
        CONNECTION_OPEN => decode_connection_open(src)?,
        CONNECTION_OPEN_OK => {
            let _ = decode_short_string(src)?;

            MethodFrameArgs::ConnectionOpenOk
        }
        CONNECTION_CLOSE => {
            let args = ConnectionCloseArgs {
                code: read_u16(src)?,
                text: decode_short_string(src)?,
                class_id: read_u16(src)?,
                method_id: read_u16(src)?,
            };

            MethodFrameArgs::ConnectionClose(args)
        }
        CONNECTION_CLOSE_OK => MethodFrameArgs::ConnectionCloseOk,
        CONNECTION_BLOCKED => MethodFrameArgs::ConnectionBlocked(ConnectionBlockedArgs {
            reason: decode_short_string(src)?,
        }),
        CONNECTION_UNBLOCKED => MethodFrameArgs::ConnectionUnblocked,
        CHANNEL_OPEN => {
            let _ = decode_short_string(src)?;

            MethodFrameArgs::ChannelOpen
        }
        CHANNEL_OPEN_OK => {
            let _ = decode_long_string(src)?;

            MethodFrameArgs::ChannelOpenOk
        }
        CHANNEL_FLOW => MethodFrameArgs::ChannelFlow(ChannelFlowArgs {
            active: read_u8(src)? & 0x01 != 0,
        }),
        CHANNEL_FLOW_OK => MethodFrameArgs::ChannelFlowOk(ChannelFlowArgs {
            active: read_u8(src)? & 0x01 != 0,
        }),
        CHANNEL_CLOSE => {
            let args = ChannelCloseArgs {
                code: read_u16(src)?,
                text: decode_short_string(src)?,
                class_id: read_u16(src)?,
                method_id: read_u16(src)?,
            };

            MethodFrameArgs::ChannelClose(args)
        }
        CHANNEL_CLOSE_OK => MethodFrameArgs::ChannelCloseOk,
        EXCHANGE_DECLARE => decode_exchange_declare(src)?,
        EXCHANGE_DECLARE_OK => MethodFrameArgs::ExchangeDeclareOk,
        EXCHANGE_DELETE => decode_exchange_delete(src)?,
        EXCHANGE_DELETE_OK => MethodFrameArgs::ExchangeDeleteOk,
        QUEUE_DECLARE => decode_queue_declare(src)?,
        QUEUE_DECLARE_OK => MethodFrameArgs::QueueDeclareOk(QueueDeclareOkArgs {
            name: decode_short_string(src)?,
            message_count: read_u32(src)?,
            consumer_count: read_u32(src)?,
        }),
        QUEUE_BIND => decode_queue_bind(src)?,
        QUEUE_BIND_OK => MethodFrameArgs::QueueBindOk,
        QUEUE_PURGE => decode_queue_purge(src)?,
        QUEUE_PURGE_OK => MethodFrameArgs::QueuePurgeOk(QueuePurgeOkArgs {
            message_count: read_u32(src)?,
        }),
        QUEUE_DELETE => decode_queue_delete(src)?,
        QUEUE_DELETE_OK => MethodFrameArgs::QueueDeleteOk(QueueDeleteOkArgs {
            message_count: read_u32(src)?,
        }),
        QUEUE_UNBIND => decode_queue_unbind(src)?,
        QUEUE_UNBIND_OK => MethodFrameArgs::QueueUnbindOk,
        BASIC_QOS => {
            let prefetch_size = read_u32(src)?;
            let prefetch_count = read_u16(src)?;
            let [global] = unpack_bits::<1>(read_u8(src)?);

            MethodFrameArgs::BasicQos(BasicQosArgs {
                prefetch_size,
                prefetch_count,
                global,
            })
        }
        BASIC_QOS_OK => MethodFrameArgs::BasicQosOk,
        BASIC_CONSUME => decode_basic_consume(src)?,
        BASIC_CONSUME_OK => MethodFrameArgs::BasicConsumeOk(BasicConsumeOkArgs {
            consumer_tag: decode_short_string(src)?,
        }),
        BASIC_CANCEL => {
            let consumer_tag = decode_short_string(src)?;
            let [no_wait] = unpack_bits::<1>(read_u8(src)?);

            MethodFrameArgs::BasicCancel(BasicCancelArgs { consumer_tag, no_wait })
        }
        BASIC_CANCEL_OK => MethodFrameArgs::BasicCancelOk(BasicCancelOkArgs {
            consumer_tag: decode_short_string(src)?,
        }),
        BASIC_PUBLISH => decode_basic_publish(src)?,
        BASIC_RETURN => MethodFrameArgs::BasicReturn(BasicReturnArgs {
            reply_code: read_u16(src)?,
            reply_text: decode_short_string(src)?,
            exchange_name: decode_short_string(src)?,
            routing_key: decode_short_string(src)?,
        }),
        BASIC_DELIVER => decode_basic_deliver(src)?,
        BASIC_ACK => {
            let delivery_tag = read_u64(src)?;
            let [multiple] = unpack_bits::<1>(read_u8(src)?);

            MethodFrameArgs::BasicAck(BasicAckArgs { delivery_tag, multiple })
        }
        BASIC_REJECT => {
            let delivery_tag = read_u64(src)?;
            let [requeue] = unpack_bits::<1>(read_u8(src)?);

            MethodFrameArgs::BasicReject(BasicRejectArgs { delivery_tag, requeue })
        }
        BASIC_RECOVER => {
            let [requeue] = unpack_bits::<1>(read_u8(src)?);

            MethodFrameArgs::BasicRecover(BasicRecoverArgs { requeue })
        }
        BASIC_RECOVER_OK => MethodFrameArgs::BasicRecoverOk,
        BASIC_NACK => {
            let delivery_tag = read_u64(src)?;
            let flags = BasicNackFlags::from_bits_truncate(read_u8(src)?);

            MethodFrameArgs::BasicNack(BasicNackArgs { delivery_tag, flags })
        }
        CONFIRM_SELECT => {
            let [no_wait] = unpack_bits::<1>(read_u8(src)?);

            MethodFrameArgs::ConfirmSelect(ConfirmSelectArgs { no_wait })
        }
        CONFIRM_SELECT_OK => MethodFrameArgs::ConfirmSelectOk,
        _ => {
            return frame_error!(
                NOT_IMPLEMENTED,
                format!("Unsupported class method {:08X}", class_method)
            )
        }
    };

    Ok((class_method, args))
}

fn decode_connection_start<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let args = ConnectionStartArgs {
        version_major: read_u8(src)?,
        version_minor: read_u8(src)?,
        properties: decode_field_table(src)?,
        mechanisms: decode_long_string(src)?,
        locales: decode_long_string(src)?,
    };

    Ok(MethodFrameArgs::ConnectionStart(args))
}

fn decode_connection_start_ok<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let args = ConnectionStartOkArgs {
        properties: decode_field_table(src)?,
        mechanism: decode_short_string(src)?,
        response: decode_long_string(src)?,
        locale: decode_short_string(src)?,
    };

    Ok(MethodFrameArgs::ConnectionStartOk(args))
}

fn decode_connection_open<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let virtual_host = decode_short_string(src)?;
    let _reserved = decode_short_string(src)?;
    let [insist] = unpack_bits::<1>(read_u8(src)?);

    Ok(MethodFrameArgs::ConnectionOpen(ConnectionOpenArgs { virtual_host, insist }))
}

fn decode_exchange_declare<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let _ = read_u16(src)?;

    let args = ExchangeDeclareArgs {
        exchange_name: decode_short_string(src)?,
        exchange_type: decode_short_string(src)?,
        flags: ExchangeDeclareFlags::from_bits_truncate(read_u8(src)?),
        args: decode_field_table(src)?,
    };

    Ok(MethodFrameArgs::ExchangeDeclare(args))
}

fn decode_exchange_delete<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let _ = read_u16(src)?;

    let args = ExchangeDeleteArgs {
        exchange_name: decode_short_string(src)?,
        flags: ExchangeDeleteFlags::from_bits_truncate(read_u8(src)?),
    };

    Ok(MethodFrameArgs::ExchangeDelete(args))
}

fn decode_queue_declare<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let _ = read_u16(src)?;

    let args = QueueDeclareArgs {
        name: decode_short_string(src)?,
        flags: QueueDeclareFlags::from_bits_truncate(read_u8(src)?),
        args: decode_field_table(src)?,
    };

    Ok(MethodFrameArgs::QueueDeclare(args))
}

fn decode_queue_bind<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let _ = read_u16(src)?;

    let queue_name = decode_short_string(src)?;
    let exchange_name = decode_short_string(src)?;
    let routing_key = decode_short_string(src)?;
    let [no_wait] = unpack_bits::<1>(read_u8(src)?);
    let args = decode_field_table(src)?;

    Ok(MethodFrameArgs::QueueBind(QueueBindArgs {
        queue_name,
        exchange_name,
        routing_key,
        no_wait,
        args,
    }))
}

fn decode_queue_purge<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let _ = read_u16(src)?;

    let queue_name = decode_short_string(src)?;
    let [no_wait] = unpack_bits::<1>(read_u8(src)?);

    Ok(MethodFrameArgs::QueuePurge(QueuePurgeArgs { queue_name, no_wait }))
}

fn decode_queue_delete<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let _ = read_u16(src)?;

    let args = QueueDeleteArgs {
        queue_name: decode_short_string(src)?,
        flags: QueueDeleteFlags::from_bits_truncate(read_u8(src)?),
    };

    Ok(MethodFrameArgs::QueueDelete(args))
}

fn decode_queue_unbind<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let _ = read_u16(src)?;

    let args = QueueUnbindArgs {
        queue_name: decode_short_string(src)?,
        exchange_name: decode_short_string(src)?,
        routing_key: decode_short_string(src)?,
        args: decode_field_table(src)?,
    };

    Ok(MethodFrameArgs::QueueUnbind(args))
}

fn decode_basic_consume<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let _ = read_u16(src)?;

    let args = BasicConsumeArgs {
        queue: decode_short_string(src)?,
        consumer_tag: decode_short_string(src)?,
        flags: BasicConsumeFlags::from_bits_truncate(read_u8(src)?),
        args: decode_field_table(src)?,
    };

    Ok(MethodFrameArgs::BasicConsume(args))
}

fn decode_basic_publish<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let _ = read_u16(src)?;

    let args = BasicPublishArgs {
        exchange_name: decode_short_string(src)?,
        routing_key: decode_short_string(src)?,
        flags: BasicPublishFlags::from_bits_truncate(read_u8(src)?),
    };

    Ok(MethodFrameArgs::BasicPublish(args))
}

fn decode_basic_deliver<B: Buf + ?Sized>(src: &mut B) -> Result<MethodFrameArgs> {
    let consumer_tag = decode_short_string(src)?;
    let delivery_tag = read_u64(src)?;
    let [redelivered] = unpack_bits::<1>(read_u8(src)?);
    let exchange_name = decode_short_string(src)?;
    let routing_key = decode_short_string(src)?;

    Ok(MethodFrameArgs::BasicDeliver(BasicDeliverArgs {
        consumer_tag,
        delivery_tag,
        redelivered,
        exchange_name,
        routing_key,
    }))
}

/// Encode the class-method id and the arguments of a method frame.
pub fn encode_method_args(buf: &mut BytesMut, args: &MethodFrameArgs) -> Result<()> {
    use MethodFrameArgs::*;

    buf.put_u32(args.class_method());

    match args {
        ConnectionStart(args) => {
            buf.put_u8(args.version_major);
            buf.put_u8(args.version_minor);
            encode_field_table(buf, args.properties.as_ref())?;
            encode_long_string(buf, &args.mechanisms);
            encode_long_string(buf, &args.locales);
        }
        ConnectionStartOk(args) => {
            encode_field_table(buf, args.properties.as_ref())?;
            encode_short_string(buf, &args.mechanism)?;
            encode_long_string(buf, &args.response);
            encode_short_string(buf, &args.locale)?;
        }
        ConnectionTune(args) => {
            buf.put_u16(args.channel_max);
            buf.put_u32(args.frame_max);
            buf.put_u16(args.heartbeat);
        }
        ConnectionTuneOk(args) => {
            buf.put_u16(args.channel_max);
            buf.put_u32(args.frame_max);
            buf.put_u16(args.heartbeat);
        }
        ConnectionOpen(args) => {
            encode_short_string(buf, &args.virtual_host)?;
            encode_short_string(buf, "")?;
            buf.put_u8(pack_bits(&[args.insist]));
        }
        // reserved short string
        ConnectionOpenOk | ChannelOpen => buf.put_u8(0),
        ConnectionClose(args) => {
            buf.put_u16(args.code);
            encode_short_string(buf, &args.text)?;
            buf.put_u16(args.class_id);
            buf.put_u16(args.method_id);
        }
        ConnectionBlocked(args) => encode_short_string(buf, &args.reason)?,
        // reserved long string
        ChannelOpenOk => buf.put_u32(0),
        ChannelFlow(args) | ChannelFlowOk(args) => buf.put_u8(pack_bits(&[args.active])),
        ChannelClose(args) => {
            buf.put_u16(args.code);
            encode_short_string(buf, &args.text)?;
            buf.put_u16(args.class_id);
            buf.put_u16(args.method_id);
        }
        ExchangeDeclare(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.exchange_type)?;
            buf.put_u8(args.flags.bits());
            encode_field_table(buf, args.args.as_ref())?;
        }
        ExchangeDelete(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.exchange_name)?;
            buf.put_u8(args.flags.bits());
        }
        QueueDeclare(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.name)?;
            buf.put_u8(args.flags.bits());
            encode_field_table(buf, args.args.as_ref())?;
        }
        QueueDeclareOk(args) => {
            encode_short_string(buf, &args.name)?;
            buf.put_u32(args.message_count);
            buf.put_u32(args.consumer_count);
        }
        QueueBind(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue_name)?;
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
            buf.put_u8(pack_bits(&[args.no_wait]));
            encode_field_table(buf, args.args.as_ref())?;
        }
        QueuePurge(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue_name)?;
            buf.put_u8(pack_bits(&[args.no_wait]));
        }
        QueuePurgeOk(args) => buf.put_u32(args.message_count),
        QueueDelete(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue_name)?;
            buf.put_u8(args.flags.bits());
        }
        QueueDeleteOk(args) => buf.put_u32(args.message_count),
        QueueUnbind(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue_name)?;
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
            encode_field_table(buf, args.args.as_ref())?;
        }
        BasicQos(args) => {
            buf.put_u32(args.prefetch_size);
            buf.put_u16(args.prefetch_count);
            buf.put_u8(pack_bits(&[args.global]));
        }
        BasicConsume(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue)?;
            encode_short_string(buf, &args.consumer_tag)?;
            buf.put_u8(args.flags.bits());
            encode_field_table(buf, args.args.as_ref())?;
        }
        BasicConsumeOk(args) => encode_short_string(buf, &args.consumer_tag)?,
        BasicCancel(args) => {
            encode_short_string(buf, &args.consumer_tag)?;
            buf.put_u8(pack_bits(&[args.no_wait]));
        }
        BasicCancelOk(args) => encode_short_string(buf, &args.consumer_tag)?,
        BasicPublish(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
            buf.put_u8(args.flags.bits());
        }
        BasicReturn(args) => {
            buf.put_u16(args.reply_code);
            encode_short_string(buf, &args.reply_text)?;
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
        }
        BasicDeliver(args) => {
            encode_short_string(buf, &args.consumer_tag)?;
            buf.put_u64(args.delivery_tag);
            buf.put_u8(pack_bits(&[args.redelivered]));
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
        }
        BasicAck(args) => {
            buf.put_u64(args.delivery_tag);
            buf.put_u8(pack_bits(&[args.multiple]));
        }
        BasicReject(args) => {
            buf.put_u64(args.delivery_tag);
            buf.put_u8(pack_bits(&[args.requeue]));
        }
        BasicRecover(args) => buf.put_u8(pack_bits(&[args.requeue])),
        BasicNack(args) => {
            buf.put_u64(args.delivery_tag);
            buf.put_u8(pack_bits(&[args.is_multiple(), args.is_requeue()]));
        }
        ConfirmSelect(args) => buf.put_u8(pack_bits(&[args.no_wait])),
        ConnectionCloseOk | ConnectionUnblocked | ChannelCloseOk | ExchangeDeclareOk | ExchangeDeleteOk
        | QueueBindOk | QueueUnbindOk | BasicQosOk | BasicRecoverOk | ConfirmSelectOk => (),
    }

    Ok(())
}
