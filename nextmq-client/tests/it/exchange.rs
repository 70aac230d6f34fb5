use crate::helper;
use nextmq_client::*;
use nextmq_codec::frame::{self, MethodFrameArgs};

#[tokio::test(flavor = "multi_thread")]
async fn declare_and_delete_exchange() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        let declared = match b.expect_method(frame::EXCHANGE_DECLARE) {
            (_, MethodFrameArgs::ExchangeDeclare(args)) => args,
            other => panic!("Unexpected declare {:?}", other),
        };

        b.send(frame::exchange_declare_ok(channel));

        let deleted = match b.expect_method(frame::EXCHANGE_DELETE) {
            (_, MethodFrameArgs::ExchangeDelete(args)) => args,
            other => panic!("Unexpected delete {:?}", other),
        };

        b.send(frame::exchange_delete_ok(channel));

        b.close_channel(channel);
        b.close_connection();

        (declared, deleted)
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    let mut args = FieldTable::new();
    args.insert("alternate-exchange".into(), AMQPFieldValue::LongString("unrouted".into()));

    channel
        .exchange_declare("prices", "topic", ExchangeDeclareFlags::DURABLE, Some(args))
        .await
        .unwrap();
    channel.exchange_delete("prices", true, false).await.unwrap();

    channel.close().await.unwrap();
    client.close().await.unwrap();

    let (declared, deleted) = broker.join().unwrap();

    assert_eq!(declared.exchange_name, "prices");
    assert_eq!(declared.exchange_type, "topic");
    assert!(declared.flags.contains(ExchangeDeclareFlags::DURABLE));
    assert!(matches!(
        declared.args.unwrap().get("alternate-exchange"),
        Some(AMQPFieldValue::LongString(s)) if s == "unrouted"
    ));

    assert_eq!(deleted.exchange_name, "prices");
    assert!(deleted.flags.contains(frame::ExchangeDeleteFlags::IF_UNUSED));
}

#[tokio::test(flavor = "multi_thread")]
async fn exchange_declare_no_wait() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        b.expect_method(frame::EXCHANGE_DECLARE);
        b.expect_method(frame::EXCHANGE_DELETE);

        b.close_channel(channel);
        b.close_connection();
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    channel
        .exchange_declare("events", "fanout", ExchangeDeclareFlags::NO_WAIT, None)
        .await
        .unwrap();
    channel.exchange_delete("events", false, true).await.unwrap();

    channel.close().await.unwrap();
    client.close().await.unwrap();
    broker.join().unwrap();
}
