use crate::helper::{self, eventually, Broker};
use nextmq_client::*;
use nextmq_codec::frame::{
    self, BasicConsumeFlags, BasicConsumeOkArgs, BasicDeliverArgs, BasicReturnArgs, MethodFrameArgs,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// Accepts the consume and returns the channel and the consumer tag.
fn accept_consume(b: &mut Broker) -> (u16, String) {
    match b.expect_method(frame::BASIC_CONSUME) {
        (channel, MethodFrameArgs::BasicConsume(args)) => {
            b.send(BasicConsumeOkArgs::new(&args.consumer_tag).frame(channel));

            (channel, args.consumer_tag)
        }
        other => panic!("Unexpected consume {:?}", other),
    }
}

fn deliver(b: &mut Broker, channel: u16, consumer_tag: &str, delivery_tag: u64, body: &[u8]) {
    let mut properties = BasicProperties::default();

    properties.set_content_type("text/plain");

    let deliver = BasicDeliverArgs::new(consumer_tag, delivery_tag, "orders", "new");

    b.send_content(channel, MethodFrameArgs::BasicDeliver(deliver), &properties, body);
}

/// Parks a consumer callback until the flag is set or five seconds pass.
fn park_until(released: &AtomicBool) {
    let until = Instant::now() + Duration::from_secs(5);

    while !released.load(Ordering::Acquire) && Instant::now() < until {
        thread::sleep(Duration::from_millis(5));
    }
}

async fn consume_and_ack(mode: ConsumeMode) {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();
        let (_, tag) = accept_consume(b);

        deliver(b, channel, &tag, 1, b"first order");
        deliver(b, channel, &tag, 2, b"second order");

        let acks: Vec<u64> = (0..2)
            .map(|_| match b.expect_method(frame::BASIC_ACK) {
                (_, MethodFrameArgs::BasicAck(args)) => args.delivery_tag,
                other => panic!("Unexpected ack {:?}", other),
            })
            .collect();

        b.close_channel(channel);
        b.close_connection();

        (tag, acks)
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();
    let acker = channel.clone();
    let (tx, rx) = mpsc::channel();

    let tag = channel
        .basic_consume(mode, "orders", "", false, false, false, move |delivery| {
            assert_eq!(delivery.exchange, "orders");
            assert_eq!(delivery.routing_key, "new");
            assert_eq!(delivery.properties.content_type(), Some("text/plain"));

            let body = delivery.body.to_bytes();

            acker.basic_ack(delivery.delivery_tag, false).unwrap();
            tx.send((delivery.delivery_tag, body)).unwrap();
        })
        .await
        .unwrap();

    assert!(tag.starts_with("nextmq-"));

    let mut received: Vec<_> = (0..2)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();

    received.sort_by_key(|(tag, _)| *tag);

    assert_eq!(&received[0].1[..], b"first order");
    assert_eq!(&received[1].1[..], b"second order");

    channel.close().await.unwrap();
    client.close().await.unwrap();

    let (broker_tag, mut acks) = broker.join().unwrap();

    acks.sort();

    assert_eq!(broker_tag, tag);
    assert_eq!(acks, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn single_threaded_consumer() {
    consume_and_ack(ConsumeMode::SingleThreaded).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn parallel_copy_consumer() {
    consume_and_ack(ConsumeMode::ParallelCopy).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn parallel_barrier_consumer() {
    consume_and_ack(ConsumeMode::ParallelBarrier).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn consumer_tag_is_kept() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();
        let (_, tag) = accept_consume(b);

        match b.expect_method(frame::BASIC_CANCEL) {
            (ch, MethodFrameArgs::BasicCancel(args)) => {
                b.send(frame::BasicCancelOkArgs::new(&args.consumer_tag).frame(ch))
            }
            other => panic!("Unexpected cancel {:?}", other),
        }

        b.close_channel(channel);
        b.close_connection();

        tag
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    let tag = channel
        .basic_consume(ConsumeMode::SingleThreaded, "orders", "order-handler", true, true, false, |_| {})
        .await
        .unwrap();

    assert_eq!(tag, "order-handler");

    channel.basic_cancel(&tag, false).await.unwrap();
    channel.close().await.unwrap();
    client.close().await.unwrap();

    assert_eq!(broker.join().unwrap(), "order-handler");
}

#[tokio::test(flavor = "multi_thread")]
async fn server_cancels_the_consumer() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();
        let (_, tag) = accept_consume(b);

        b.send(frame::BasicCancelArgs::new(&tag, false).frame(channel));

        let cancelled = match b.expect_method(frame::BASIC_CANCEL_OK) {
            (_, MethodFrameArgs::BasicCancelOk(args)) => args.consumer_tag,
            other => panic!("Unexpected cancel-ok {:?}", other),
        };

        // deliveries of a cancelled consumer are dropped
        deliver(b, channel, &tag, 1, b"late");

        b.close_channel(channel);
        b.close_connection();

        cancelled
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();
    let (tx, rx) = mpsc::channel();

    let tag = channel
        .basic_consume(ConsumeMode::SingleThreaded, "orders", "", false, false, false, move |d| {
            tx.send(d.delivery_tag).unwrap();
        })
        .await
        .unwrap();

    // the close-ok comes after the late delivery, the inline callback would have run by now
    channel.close().await.unwrap();
    assert!(rx.try_recv().is_err());

    client.close().await.unwrap();

    assert_eq!(broker.join().unwrap(), tag);
}

#[tokio::test(flavor = "multi_thread")]
async fn returned_message_goes_to_the_handler() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();
        let published = b.expect_publish();

        let returned = BasicReturnArgs {
            reply_code: 312,
            reply_text: "NO_ROUTE".into(),
            exchange_name: published.args.exchange_name.clone(),
            routing_key: published.args.routing_key.clone(),
        };

        b.send_content(
            channel,
            MethodFrameArgs::BasicReturn(returned),
            &published.properties,
            &published.body,
        );

        b.close_channel(channel);
        b.close_connection();
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();
    let (tx, rx) = mpsc::channel();

    channel.on_return(move |message| {
        tx.send((message.reply_code, message.routing_key.clone(), message.body.to_bytes()))
            .unwrap();
    });

    channel
        .basic_publish("orders", "nowhere", &BasicProperties::empty(), b"lost", true, false)
        .await
        .unwrap();

    let (code, routing_key, body) = rx.recv_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(code, 312);
    assert_eq!(routing_key, "nowhere");
    assert_eq!(&body[..], b"lost");

    channel.close().await.unwrap();
    client.close().await.unwrap();
    broker.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn body_in_more_frames_is_not_implemented() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();
        let (_, tag) = accept_consume(b);

        let deliver = BasicDeliverArgs::new(&tag, 1, "orders", "").frame(channel);

        b.send(deliver);
        b.send(frame::ContentHeaderFrame::new(channel, 10, BasicProperties::empty()).frame());
        b.send(
            frame::ContentBodyFrame {
                channel,
                body: bytes::Bytes::from_static(b"half"),
            }
            .frame(),
        );

        b.expect_connection_close()
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();
    let (tx, rx) = mpsc::channel();

    channel
        .basic_consume(ConsumeMode::SingleThreaded, "orders", "", true, false, false, move |d| {
            tx.send(d.delivery_tag).unwrap();
        })
        .await
        .unwrap();

    assert_eq!(broker.join().unwrap(), 540);
    assert!(eventually(|| client.is_closed()).await);
    assert!(rx.try_recv().is_err());

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn gated_body_survives_the_ring_wrapping() {
    let config = ClientConfig::default().waiting(WaitingKind::Blocking).ring_capacity(1024);
    let pinned: Vec<u8> = (0..64u8).map(|i| i ^ 0x5A).collect();
    let sent = pinned.clone();

    let (client, broker) = helper::connect_with(config, move |b| {
        let channel = b.open_channel();
        let (_, gated) = accept_consume(b);
        let (_, bulk) = accept_consume(b);

        // more than a turn of the ring, the frames after the gated body reuse its space
        for tag in 1..=8 {
            deliver(b, channel, &bulk, tag, &[0xBB; 64]);
        }

        deliver(b, channel, &gated, 9, &sent);

        // less than a turn past the gated body, the producer doesn't stall on the gate
        for tag in 10..=14 {
            deliver(b, channel, &bulk, tag, &[0xCC; 64]);
        }

        b.close_channel(channel);
        b.close_connection();
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();
    let released = Arc::new(AtomicBool::new(false));
    let parked = released.clone();
    let (gated_tx, gated_rx) = mpsc::channel();
    let (bulk_tx, bulk_rx) = mpsc::channel();

    channel
        .basic_consume(ConsumeMode::ParallelBarrier, "orders", "gated", true, false, false, move |delivery| {
            park_until(&parked);
            gated_tx.send(delivery.body.to_bytes()).unwrap();
        })
        .await
        .unwrap();
    channel
        .basic_consume(ConsumeMode::SingleThreaded, "orders", "bulk", true, false, false, move |delivery| {
            bulk_tx.send(delivery.delivery_tag).unwrap();
        })
        .await
        .unwrap();

    let bulk_tags: Vec<u64> = (0..13)
        .map(|_| bulk_rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();

    assert_eq!(bulk_tags.last(), Some(&14));
    assert!(gated_rx.try_recv().is_err());

    released.store(true, Ordering::Release);

    let body = gated_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(&body[..], &pinned[..]);

    channel.close().await.unwrap();
    client.close().await.unwrap();
    broker.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn running_out_of_gates_closes_the_connection_at_once() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();
        let (_, tag) = accept_consume(b);

        // each parked callback keeps a gate, the last delivery finds none
        for delivery_tag in 1..=33 {
            deliver(b, channel, &tag, delivery_tag, b"pinned");
        }

        let started = Instant::now();
        let code = b.expect_connection_close();

        (code, started.elapsed())
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();
    let released = Arc::new(AtomicBool::new(false));
    let parked = released.clone();

    channel
        .basic_consume(ConsumeMode::ParallelBarrier, "orders", "", true, false, false, move |_| {
            park_until(&parked);
        })
        .await
        .unwrap();

    let (code, elapsed) = broker.join().unwrap();

    released.store(true, Ordering::Release);

    assert_eq!(code, 541);
    assert!(elapsed < Duration::from_secs(2), "Closed after {:?}", elapsed);
    assert!(eventually(|| client.is_closed()).await);
    assert_eq!(client.close_error().unwrap().code, 541);

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn consume_and_cancel_without_waiting() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        let consume = match b.expect_method(frame::BASIC_CONSUME) {
            (_, MethodFrameArgs::BasicConsume(args)) => args,
            other => panic!("Unexpected consume {:?}", other),
        };

        // no consume-ok, the first delivery comes right away
        deliver(b, channel, &consume.consumer_tag, 1, b"early order");

        let cancel = match b.expect_method(frame::BASIC_CANCEL) {
            (_, MethodFrameArgs::BasicCancel(args)) => args,
            other => panic!("Unexpected cancel {:?}", other),
        };

        b.close_channel(channel);
        b.close_connection();

        (consume, cancel)
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();
    let (tx, rx) = mpsc::channel();

    let tag = channel
        .basic_consume(ConsumeMode::SingleThreaded, "orders", "early-bird", true, false, true, move |d| {
            tx.send(d.body.to_bytes()).unwrap();
        })
        .await
        .unwrap();

    assert_eq!(tag, "early-bird");
    assert_eq!(&rx.recv_timeout(Duration::from_secs(5)).unwrap()[..], b"early order");

    channel.basic_cancel(&tag, true).await.unwrap();
    channel.close().await.unwrap();
    client.close().await.unwrap();

    let (consume, cancel) = broker.join().unwrap();

    assert_eq!(consume.consumer_tag, "early-bird");
    assert!(consume.flags.contains(BasicConsumeFlags::NO_WAIT));
    assert_eq!(cancel.consumer_tag, "early-bird");
    assert!(cancel.no_wait);
}

#[tokio::test(flavor = "multi_thread")]
async fn consume_without_waiting_needs_a_tag() {
    let (client, broker) = helper::connect(|b| {
        let channel = b.open_channel();

        // the consume is refused before sending, the next frame is the close
        b.close_channel(channel);
        b.close_connection();
    })
    .await
    .unwrap();

    let channel = client.channel_open().await.unwrap();

    let err = helper::to_client_error(
        channel
            .basic_consume(ConsumeMode::SingleThreaded, "orders", "", true, false, true, |_| {})
            .await,
    );

    assert_eq!(err.code, 406);
    assert_eq!(err.channel, Some(1));
    assert_eq!(err.class_method, frame::BASIC_CONSUME);
    assert!(!channel.is_closed());

    channel.close().await.unwrap();
    client.close().await.unwrap();
    broker.join().unwrap();
}
