use super::{AMQPFieldValue, AMQPFrame, FieldTable, MethodFrameArgs};

/// Broker greeting, the first method frame of a connection.
#[derive(Debug, Default)]
pub struct ConnectionStartArgs {
    pub version_major: u8,
    pub version_minor: u8,
    pub properties: Option<FieldTable>,
    pub mechanisms: String,
    pub locales: String,
}

#[derive(Debug, Default)]
pub struct ConnectionStartOkArgs {
    pub properties: Option<FieldTable>,
    pub mechanism: String,
    pub response: String,
    pub locale: String,
}

/// Limits proposed by the broker.
#[derive(Debug, Default)]
pub struct ConnectionTuneArgs {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

/// Limits the client settled on, never above the proposed ones.
#[derive(Debug, Default)]
pub struct ConnectionTuneOkArgs {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

#[derive(Debug, Default)]
pub struct ConnectionOpenArgs {
    pub virtual_host: String,
    pub insist: bool,
}

#[derive(Debug, Default)]
pub struct ConnectionCloseArgs {
    pub code: u16,
    pub text: String,
    pub class_id: u16,
    pub method_id: u16,
}

#[derive(Debug, Default)]
pub struct ConnectionBlockedArgs {
    pub reason: String,
}

fn flag_table(names: &[&str]) -> FieldTable {
    names
        .iter()
        .map(|name| (name.to_string(), AMQPFieldValue::Bool(true)))
        .collect()
}

impl ConnectionStartArgs {
    /// Start arguments of a broker offering the PLAIN mechanism.
    pub fn new() -> Self {
        let capabilities = flag_table(&[
            "publisher_confirms",
            "basic.nack",
            "consumer_cancel_notify",
            "connection.blocked",
        ]);

        let properties = FieldTable::from([
            ("capabilities".to_string(), AMQPFieldValue::FieldTable(Box::new(capabilities))),
            ("product".to_string(), AMQPFieldValue::LongString("nextmq".into())),
        ]);

        Self {
            version_major: 0,
            version_minor: 9,
            properties: Some(properties),
            mechanisms: "PLAIN".into(),
            locales: "en_US".into(),
        }
    }
}

impl ConnectionStartOkArgs {
    /// Start-ok with a PLAIN authentication response.
    pub fn new(username: &str, password: &str) -> Self {
        let capabilities = flag_table(&[
            "authentication_failure_close",
            "basic.nack",
            "publisher_confirms",
            "consumer_cancel_notify",
            "connection.blocked",
        ]);

        let properties = FieldTable::from([
            ("product".to_string(), AMQPFieldValue::LongString("nextmq-client".into())),
            ("platform".to_string(), AMQPFieldValue::LongString("Rust".into())),
            ("capabilities".to_string(), AMQPFieldValue::FieldTable(Box::new(capabilities))),
            (
                "version".to_string(),
                AMQPFieldValue::LongString(env!("CARGO_PKG_VERSION").into()),
            ),
        ]);

        Self {
            properties: Some(properties),
            mechanism: "PLAIN".into(),
            response: format!("\u{0}{username}\u{0}{password}"),
            locale: "en_US".into(),
        }
    }
}

impl ConnectionOpenArgs {
    pub fn new(virtual_host: &str) -> Self {
        Self {
            virtual_host: virtual_host.into(),
            insist: false,
        }
    }
}

pub fn connection_open_ok() -> AMQPFrame {
    MethodFrameArgs::ConnectionOpenOk.frame(0)
}

pub fn connection_close(code: u16, text: &str, class_method: u32) -> AMQPFrame {
    let (class_id, method_id) = super::split_class_method(class_method);
    let args = ConnectionCloseArgs {
        code,
        text: text.into(),
        class_id,
        method_id,
    };

    MethodFrameArgs::ConnectionClose(args).frame(0)
}

pub fn connection_close_ok() -> AMQPFrame {
    MethodFrameArgs::ConnectionCloseOk.frame(0)
}
