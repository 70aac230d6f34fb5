use super::{FieldTable, HeaderPropertyFlags};

/// Standard set of message properties of the basic class.
///
/// Every property is optional, the presence word of the content header is computed from the set
/// fields. A property set can be frozen, after that any setter call panics. Decoded property sets
/// arrive frozen since they describe what the server sent; use [`BasicProperties::thawed`] to get
/// a mutable copy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicProperties {
    content_type: Option<String>,
    content_encoding: Option<String>,
    headers: Option<FieldTable>,
    delivery_mode: Option<u8>,
    priority: Option<u8>,
    correlation_id: Option<String>,
    reply_to: Option<String>,
    expiration: Option<String>,
    message_id: Option<String>,
    timestamp: Option<u64>,
    message_type: Option<String>,
    user_id: Option<String>,
    app_id: Option<String>,
    cluster_id: Option<String>,
    frozen: bool,
}

macro_rules! string_property {
    ($field:ident, $setter:ident) => {
        pub fn $field(&self) -> Option<&str> {
            self.$field.as_deref()
        }

        pub fn $setter(&mut self, value: &str) -> &mut Self {
            self.check_frozen();
            self.$field = Some(value.to_string());
            self
        }
    };
}

macro_rules! octet_property {
    ($field:ident, $setter:ident) => {
        pub fn $field(&self) -> Option<u8> {
            self.$field
        }

        pub fn $setter(&mut self, value: u8) -> &mut Self {
            self.check_frozen();
            self.$field = Some(value);
            self
        }
    };
}

impl BasicProperties {
    /// An empty, frozen property set. Encodes to presence word 0.
    pub fn empty() -> Self {
        Self {
            frozen: true,
            ..Default::default()
        }
    }

    string_property!(content_type, set_content_type);
    string_property!(content_encoding, set_content_encoding);
    string_property!(correlation_id, set_correlation_id);
    string_property!(reply_to, set_reply_to);
    string_property!(expiration, set_expiration);
    string_property!(message_id, set_message_id);
    string_property!(message_type, set_message_type);
    string_property!(user_id, set_user_id);
    string_property!(app_id, set_app_id);
    string_property!(cluster_id, set_cluster_id);

    octet_property!(delivery_mode, set_delivery_mode);
    octet_property!(priority, set_priority);

    pub fn headers(&self) -> Option<&FieldTable> {
        self.headers.as_ref()
    }

    pub fn set_headers(&mut self, headers: FieldTable) -> &mut Self {
        self.check_frozen();
        self.headers = Some(headers);
        self
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, value: u64) -> &mut Self {
        self.check_frozen();
        self.timestamp = Some(value);
        self
    }

    /// The presence word of the set, one bit per present property.
    pub fn presence(&self) -> HeaderPropertyFlags {
        let mut flags = HeaderPropertyFlags::empty();

        flags.set(HeaderPropertyFlags::CONTENT_TYPE, self.content_type.is_some());
        flags.set(HeaderPropertyFlags::CONTENT_ENCODING, self.content_encoding.is_some());
        flags.set(HeaderPropertyFlags::HEADERS, self.headers.is_some());
        flags.set(HeaderPropertyFlags::DELIVERY_MODE, self.delivery_mode.is_some());
        flags.set(HeaderPropertyFlags::PRIORITY, self.priority.is_some());
        flags.set(HeaderPropertyFlags::CORRELATION_ID, self.correlation_id.is_some());
        flags.set(HeaderPropertyFlags::REPLY_TO, self.reply_to.is_some());
        flags.set(HeaderPropertyFlags::EXPIRATION, self.expiration.is_some());
        flags.set(HeaderPropertyFlags::MESSAGE_ID, self.message_id.is_some());
        flags.set(HeaderPropertyFlags::TIMESTAMP, self.timestamp.is_some());
        flags.set(HeaderPropertyFlags::MESSAGE_TYPE, self.message_type.is_some());
        flags.set(HeaderPropertyFlags::USER_ID, self.user_id.is_some());
        flags.set(HeaderPropertyFlags::APP_ID, self.app_id.is_some());
        flags.set(HeaderPropertyFlags::CLUSTER_ID, self.cluster_id.is_some());

        flags
    }

    pub fn is_empty(&self) -> bool {
        self.presence().is_empty()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// A mutable copy of the property set.
    pub fn thawed(&self) -> Self {
        Self {
            frozen: false,
            ..self.clone()
        }
    }

    fn check_frozen(&self) {
        if self.frozen {
            panic!("BasicProperties is frozen and cannot be modified");
        }
    }
}
