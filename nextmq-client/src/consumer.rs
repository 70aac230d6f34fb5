//! Consumer subscriptions and the ways a delivery reaches its callback.
use crate::message::{MessageDelivery, ReturnedMessage};
use crate::model::ChannelNumber;
use log::error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;

/// How deliveries of a consumer are handed to the callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsumeMode {
    /// The callback runs on the frame processing thread with the body borrowed from the ring.
    /// Nothing else is processed on the connection until it returns, so it must not wait for
    /// replies of the same connection (acking is fine).
    #[default]
    SingleThreaded,
    /// The body is copied, the callback runs on the blocking pool.
    ParallelCopy,
    /// A reading gate keeps the body in the ring, the callback runs on the blocking pool. The
    /// space is released when the body is dropped.
    ParallelBarrier,
}

pub type ConsumerCallback = Arc<dyn Fn(MessageDelivery<'_>) + Send + Sync>;
pub type ReturnCallback = Arc<dyn Fn(ReturnedMessage<'_>) + Send + Sync>;

pub(crate) struct Subscription {
    pub(crate) mode: ConsumeMode,
    pub(crate) callback: ConsumerCallback,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("mode", &self.mode).finish()
    }
}

/// Consumer tag for consumers which didn't name themselves.
pub(crate) fn generate_consumer_tag() -> String {
    format!("nextmq-{:032x}", rand::random::<u128>())
}

/// Calls the callback on the current thread, a panic is logged and swallowed.
pub(crate) fn run_inline(subscription: &Subscription, delivery: MessageDelivery<'_>) {
    let (channel, delivery_tag) = (delivery.channel, delivery.delivery_tag);

    if panic::catch_unwind(AssertUnwindSafe(|| (subscription.callback)(delivery))).is_err() {
        log_panic(channel, delivery_tag);
    }
}

/// Calls the callback on the blocking pool of the runtime.
pub(crate) fn run_on_pool(runtime: &Handle, subscription: Arc<Subscription>, delivery: MessageDelivery<'static>) {
    runtime.spawn_blocking(move || run_inline(&subscription, delivery));
}

pub(crate) fn run_return_handler(callback: &ReturnCallback, message: ReturnedMessage<'_>) {
    let channel = message.channel;

    if panic::catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
        error!("Return handler panicked on channel {}", channel);
    }
}

fn log_panic(channel: ChannelNumber, delivery_tag: u64) {
    error!(
        "Consumer callback panicked on channel {} delivery tag {}",
        channel, delivery_tag
    );
}
