use crate::helper;
use nextmq_client::*;
use nextmq_codec::frame::{self, BasicAckArgs, BasicNackArgs};

#[tokio::test(flavor = "multi_thread")]
async fn publish_without_confirm_mode() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();
        let published = b.expect_publish();

        b.close_channel(channel);
        b.close_connection();

        published
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();
    let mut properties = BasicProperties::default();

    properties.set_content_type("text/plain").set_delivery_mode(2);
    // decoded properties arrive frozen
    properties.freeze();

    let outcome = channel
        .basic_publish("orders", "new", &properties, b"order #1", true, false)
        .await
        .unwrap();

    assert_eq!(outcome, None);

    channel.close().await.unwrap();
    client.close().await.unwrap();

    let published = broker.join().unwrap();

    assert_eq!(published.args.exchange_name, "orders");
    assert_eq!(published.args.routing_key, "new");
    assert!(published.args.is_mandatory());
    assert!(!published.args.is_immediate());
    assert_eq!(published.properties, properties);
    assert_eq!(published.body, b"order #1");
}

#[tokio::test(flavor = "multi_thread")]
async fn cumulative_ack_and_nack() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        b.expect_method(frame::CONFIRM_SELECT);
        b.send(frame::confirm_select_ok(channel));

        let order: Vec<Vec<u8>> = (0..3).map(|_| b.expect_publish().body).collect();

        b.send(BasicAckArgs::new(2, true).frame(channel));
        b.send(BasicNackArgs::new(3, false, true).frame(channel));

        b.close_channel(channel);
        b.close_connection();

        order
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    channel.confirm_select(None).await.unwrap();

    let mut publishes = vec![];

    for body in ["first", "second", "third"] {
        let ch = channel.clone();

        publishes.push(tokio::spawn(async move {
            let outcome = ch
                .basic_publish("", "q", &BasicProperties::empty(), body.as_bytes(), false, false)
                .await;

            (body, outcome)
        }));
    }

    let mut outcomes = vec![];

    for p in publishes {
        let (body, outcome) = p.await.unwrap();

        outcomes.push((body, outcome.unwrap()));
    }

    assert_eq!(channel.unconfirmed(), 0);

    channel.close().await.unwrap();
    client.close().await.unwrap();

    // delivery tags follow the order on the wire
    let order = broker.join().unwrap();

    for (body, outcome) in outcomes {
        let tag = order.iter().position(|b| b == body.as_bytes()).unwrap() + 1;

        match tag {
            1 | 2 => assert_eq!(outcome, Some(Confirmation::Ack)),
            _ => assert_eq!(outcome, Some(Confirmation::Nack { requeue: true })),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn channel_close_fails_the_unconfirmed_publishes() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        b.expect_method(frame::CONFIRM_SELECT);
        b.send(frame::confirm_select_ok(channel));

        b.expect_publish();
        b.send(frame::channel_close(channel, 406, "PRECONDITION_FAILED - bad publish", frame::BASIC_PUBLISH));
        b.expect_method(frame::CHANNEL_CLOSE_OK);

        b.close_connection();
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    channel.confirm_select(Some(10)).await.unwrap();

    let err = helper::to_client_error(
        channel
            .basic_publish("", "q", &BasicProperties::empty(), b"body", false, false)
            .await,
    );

    assert_eq!(err.code, 406);
    assert_eq!(err.channel, Some(1));
    assert!(channel.is_closed());

    client.close().await.unwrap();
    broker.join().unwrap();
}
