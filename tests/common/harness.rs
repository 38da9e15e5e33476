//! tests/common/harness.rs
use async_trait::async_trait;
use osprey_protocol::error::Result;
use osprey_protocol::message::{Message, MessageType};
use osprey_protocol::uplink::{Uplink, UplinkEvent};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::broadcast;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "osprey_protocol=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// An uplink that records every message the connection sends to the relay.
pub struct RecordingUplink {
    sent: Mutex<Vec<Message>>,
    events: broadcast::Sender<UplinkEvent>,
}

impl RecordingUplink {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(8);
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            events,
        })
    }

    pub fn messages_of_kind(&self, kind: MessageType) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.header.kind == kind)
            .cloned()
            .collect()
    }

    pub fn count_kind(&self, kind: MessageType) -> usize {
        self.messages_of_kind(kind).len()
    }

    /// Polls until at least `count` messages of the given kind have been
    /// sent, panicking after the timeout.
    pub async fn wait_for_kind(&self, kind: MessageType, count: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count_kind(kind) >= count {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {} message(s) of type {}, got {}",
                    count,
                    kind,
                    self.count_kind(kind)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Uplink for RecordingUplink {
    async fn send(&self, msg: Message) -> Result<()> {
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<UplinkEvent> {
        self.events.subscribe()
    }
}
