use crate::helper::{self, eventually};
use nextmq_client::*;
use nextmq_codec::frame::{self, ConnectionBlockedArgs, MethodFrameArgs};

#[tokio::test(flavor = "multi_thread")]
async fn connect_and_close() {
    let (client, broker) = helper::connect(|b| b.close_connection()).await.unwrap();

    assert!(!client.is_closed());

    client.close().await.unwrap();
    broker.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn channels_get_the_lowest_free_number() {
    let (client, broker) = helper::connect(|b| {
        let first = b.open_channel();
        let second = b.open_channel();

        b.close_channel(first);

        let third = b.open_channel();

        b.close_connection();

        (first, second, third)
    })
    .await
    .unwrap();

    let first = client.channel_open().await.unwrap();
    let second = client.channel_open().await.unwrap();

    assert_eq!((first.number(), second.number()), (1, 2));

    first.close().await.unwrap();
    assert!(first.is_closed());

    let third = client.channel_open().await.unwrap();
    assert_eq!(third.number(), 1);

    client.close().await.unwrap();

    assert_eq!(broker.join().unwrap(), (1, 2, 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn blocked_connection() {
    let (client, broker) = helper::connect(|b| {
        b.send(
            MethodFrameArgs::ConnectionBlocked(ConnectionBlockedArgs {
                reason: "low on memory".into(),
            })
            .frame(0),
        );
        b.close_connection();
    })
    .await
    .unwrap();

    assert!(eventually(|| client.is_blocked()).await);

    client.close().await.unwrap();
    broker.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn server_closes_the_connection() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        b.send(frame::connection_close(320, "CONNECTION_FORCED - shutdown", 0));
        b.expect_method(frame::CONNECTION_CLOSE_OK);

        channel
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    broker.join().unwrap();

    assert!(eventually(|| client.is_closed()).await);
    assert_eq!(client.close_error().unwrap().code, 320);
    assert!(channel.is_closed());

    let err = helper::to_client_error(channel.basic_qos(10, 0, false).await);
    assert_eq!(err.code, 504);

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn frame_larger_than_the_ring_is_fatal() {
    let config = ClientConfig::default().ring_capacity(1024);

    let (client, broker) = helper::connect_with(config, |b| {
        b.open_channel();

        // a method frame header announcing a 4096 byte payload
        b.send_raw(&[1, 0, 1, 0, 0, 0x10, 0]);

        b.expect_connection_close()
    })
    .await
    .unwrap();

    let _channel = client.channel_open().await.unwrap();

    assert_eq!(broker.join().unwrap(), 501);
    assert!(eventually(|| client.is_closed()).await);

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unexpected_reply_closes_the_connection() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        b.expect_method(frame::QUEUE_BIND);
        b.send(frame::queue_unbind_ok(channel));

        b.expect_connection_close()
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    let err = helper::to_client_error(channel.queue_bind("q", "x", "rk", false).await);
    assert_eq!(err.code, 505);

    assert_eq!(broker.join().unwrap(), 505);
    assert!(eventually(|| client.is_closed()).await);

    client.close().await.unwrap();
}
