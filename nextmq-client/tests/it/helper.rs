//! A scripted broker on the other end of a socket pair.
use anyhow::Result;
use bytes::BytesMut;
use nextmq_client::{Client, ClientConfig, ClientError, WaitingKind};
use nextmq_codec::codec::{encode_content, encode_frame, encode_method_frame, AMQPCodec};
use nextmq_codec::frame::{self, AMQPFrame, BasicProperties, ClassMethod, MethodFrameArgs};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::codec::Decoder;

pub struct Broker {
    socket: UnixStream,
    codec: AMQPCodec,
    buf: BytesMut,
}

/// A publish as the broker received it.
#[derive(Debug)]
pub struct Published {
    pub args: frame::BasicPublishArgs,
    pub properties: BasicProperties,
    pub body: Vec<u8>,
}

impl Broker {
    fn new(socket: UnixStream) -> Self {
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("Read timeout");

        Self {
            socket,
            codec: AMQPCodec {},
            buf: BytesMut::with_capacity(65536),
        }
    }

    /// Next frame from the client, heartbeats are skipped.
    pub fn recv(&mut self) -> AMQPFrame {
        loop {
            match self.codec.decode(&mut self.buf).expect("Decodable frame") {
                Some(AMQPFrame::Heartbeat(_)) => continue,
                Some(frame) => return frame,
                None => {
                    let mut chunk = [0u8; 4096];
                    let n = self.socket.read(&mut chunk).expect("Readable socket");

                    assert!(n > 0, "Client closed the socket");

                    self.buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    pub fn expect_method(&mut self, expected: ClassMethod) -> (u16, MethodFrameArgs) {
        match self.recv() {
            AMQPFrame::Method(channel, cm, args) if cm == expected => (channel, args),
            other => panic!("Expected {:08X} but got {:?}", expected, other),
        }
    }

    pub fn send(&mut self, frame: AMQPFrame) {
        let mut buf = BytesMut::new();

        encode_frame(&mut buf, &frame).expect("Encodable frame");

        self.send_raw(&buf);
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.socket.write_all(bytes).expect("Writable socket");
    }

    /// Sends a method with its content header and body frames.
    pub fn send_content(&mut self, channel: u16, method: MethodFrameArgs, properties: &BasicProperties, body: &[u8]) {
        let mut buf = BytesMut::new();

        encode_method_frame(&mut buf, channel, &method).expect("Encodable method");
        encode_content(&mut buf, channel, properties, body, 131_072).expect("Encodable content");

        self.send_raw(&buf);
    }

    pub fn handshake(&mut self) {
        assert!(matches!(self.recv(), AMQPFrame::Header));

        self.send(frame::ConnectionStartArgs::new().frame(0));

        match self.expect_method(frame::CONNECTION_START_OK) {
            (0, MethodFrameArgs::ConnectionStartOk(args)) => {
                assert_eq!(args.mechanism, "PLAIN");
                assert_eq!(args.response, "\u{0}guest\u{0}guest");
            }
            other => panic!("Unexpected start-ok {:?}", other),
        }

        self.send(
            frame::ConnectionTuneArgs {
                channel_max: 2047,
                frame_max: 131_072,
                heartbeat: 0,
            }
            .frame(0),
        );

        self.expect_method(frame::CONNECTION_TUNE_OK);

        match self.expect_method(frame::CONNECTION_OPEN) {
            (0, MethodFrameArgs::ConnectionOpen(args)) => assert_eq!(args.virtual_host, "/"),
            other => panic!("Unexpected open {:?}", other),
        }

        self.send(frame::connection_open_ok());
    }

    pub fn open_channel(&mut self) -> u16 {
        let (channel, _) = self.expect_method(frame::CHANNEL_OPEN);

        self.send(frame::channel_open_ok(channel));

        channel
    }

    pub fn close_channel(&mut self, channel: u16) {
        let (ch, _) = self.expect_method(frame::CHANNEL_CLOSE);

        assert_eq!(ch, channel);

        self.send(frame::channel_close_ok(channel));
    }

    pub fn close_connection(&mut self) {
        self.expect_method(frame::CONNECTION_CLOSE);
        self.send(frame::connection_close_ok());
    }

    /// Reads the close the client sends after a fatal error and returns its reply code.
    pub fn expect_connection_close(&mut self) -> u16 {
        match self.expect_method(frame::CONNECTION_CLOSE) {
            (0, MethodFrameArgs::ConnectionClose(args)) => args.code,
            other => panic!("Unexpected close {:?}", other),
        }
    }

    pub fn expect_publish(&mut self) -> Published {
        let args = match self.expect_method(frame::BASIC_PUBLISH) {
            (_, MethodFrameArgs::BasicPublish(args)) => args,
            other => panic!("Unexpected publish {:?}", other),
        };

        let header = match self.recv() {
            AMQPFrame::ContentHeader(header) => header,
            other => panic!("Expected content header but got {:?}", other),
        };

        let mut body = Vec::with_capacity(header.body_size as usize);

        while (body.len() as u64) < header.body_size {
            match self.recv() {
                AMQPFrame::ContentBody(b) => body.extend_from_slice(&b.body),
                other => panic!("Expected content body but got {:?}", other),
            }
        }

        Published {
            args,
            properties: header.properties,
            body,
        }
    }
}

/// Starts the broker script on a thread and connects a client to it.
pub async fn connect<F, T>(script: F) -> Result<(Client, JoinHandle<T>)>
where
    F: FnOnce(&mut Broker) -> T + Send + 'static,
    T: Send + 'static,
{
    connect_with(ClientConfig::default().waiting(WaitingKind::Blocking), script).await
}

pub async fn connect_with<F, T>(config: ClientConfig, script: F) -> Result<(Client, JoinHandle<T>)>
where
    F: FnOnce(&mut Broker) -> T + Send + 'static,
    T: Send + 'static,
{
    let (client_side, broker_side) = UnixStream::pair()?;

    let broker = thread::spawn(move || {
        let mut broker = Broker::new(broker_side);

        broker.handshake();

        script(&mut broker)
    });

    let client = Client::with_transport(client_side, config.rpc_timeout(Duration::from_secs(5))).await?;

    Ok((client, broker))
}

/// Polls the condition until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

pub fn to_client_error<T: std::fmt::Debug>(result: Result<T>) -> ClientError {
    result.unwrap_err().downcast::<ClientError>().unwrap()
}
