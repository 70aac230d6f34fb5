use crate::helper;
use nextmq_client::*;
use nextmq_codec::frame::{self, MethodFrameArgs, QueueDeclareOkArgs, QueueDeleteOkArgs, QueuePurgeOkArgs};
use std::sync::mpsc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn queue_lifecycle() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        let declared = match b.expect_method(frame::QUEUE_DECLARE) {
            (_, MethodFrameArgs::QueueDeclare(args)) => args,
            other => panic!("Unexpected declare {:?}", other),
        };

        b.send(QueueDeclareOkArgs::new("amq.gen-1", 3, 1).frame(channel));

        b.expect_method(frame::QUEUE_BIND);
        b.send(frame::queue_bind_ok(channel));

        b.expect_method(frame::QUEUE_UNBIND);
        b.send(frame::queue_unbind_ok(channel));

        b.expect_method(frame::QUEUE_PURGE);
        b.send(QueuePurgeOkArgs { message_count: 3 }.frame(channel));

        b.expect_method(frame::QUEUE_DELETE);
        b.send(QueueDeleteOkArgs { message_count: 0 }.frame(channel));

        b.close_channel(channel);
        b.close_connection();

        declared
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    let info = channel
        .queue_declare("", QueueDeclareFlags::EXCLUSIVE | QueueDeclareFlags::AUTO_DELETE, None)
        .await
        .unwrap();

    assert_eq!(
        info,
        QueueInfo {
            name: "amq.gen-1".into(),
            message_count: 3,
            consumer_count: 1,
        }
    );

    channel.queue_bind(&info.name, "orders", "new", false).await.unwrap();
    channel.queue_unbind(&info.name, "orders", "new").await.unwrap();

    assert_eq!(channel.queue_purge(&info.name, false).await.unwrap(), 3);
    assert_eq!(
        channel.queue_delete(&info.name, QueueDeleteFlags::IF_EMPTY).await.unwrap(),
        0
    );

    channel.close().await.unwrap();
    client.close().await.unwrap();

    let declared = broker.join().unwrap();

    assert_eq!(declared.name, "");
    assert!(declared.flags.contains(QueueDeclareFlags::EXCLUSIVE));
    assert!(!declared.flags.contains(QueueDeclareFlags::DURABLE));
}

#[tokio::test(flavor = "multi_thread")]
async fn no_wait_skips_the_reply() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        b.expect_method(frame::QUEUE_DECLARE);
        b.expect_method(frame::QUEUE_BIND);

        // the qos reply completes the only waiting operation
        b.expect_method(frame::BASIC_QOS);
        b.send(MethodFrameArgs::BasicQosOk.frame(channel));

        b.close_channel(channel);
        b.close_connection();
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    let info = channel
        .queue_declare("orders", QueueDeclareFlags::DURABLE | QueueDeclareFlags::NO_WAIT, None)
        .await
        .unwrap();

    assert_eq!(info.name, "orders");

    channel.queue_bind("orders", "x", "", true).await.unwrap();
    channel.basic_qos(10, 0, false).await.unwrap();

    channel.close().await.unwrap();
    client.close().await.unwrap();
    broker.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn server_closes_the_channel() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        b.expect_method(frame::QUEUE_DECLARE);
        b.send(frame::channel_close(
            channel,
            404,
            "NOT_FOUND - no queue 'missing'",
            frame::QUEUE_DECLARE,
        ));
        b.expect_method(frame::CHANNEL_CLOSE_OK);

        b.close_connection();
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();
    let (tx, rx) = mpsc::channel();

    channel.on_error(move |err| {
        tx.send(err.code).unwrap();
    });

    let err = helper::to_client_error(channel.queue_declare("missing", QueueDeclareFlags::PASSIVE, None).await);

    assert_eq!(err.channel, Some(1));
    assert_eq!(err.code, 404);
    assert_eq!(err.class_method, frame::QUEUE_DECLARE);

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 404);
    assert!(channel.is_closed());
    assert!(!client.is_closed());

    client.close().await.unwrap();
    broker.join().unwrap();
}
