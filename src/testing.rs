//! 测试辅助工具模块
//! Test utilities module

#![cfg(test)]

use crate::error::{Error, Result};
use crate::message::{ConnectionId, DeviceId, Message, MessageHeader, MessageType};
use crate::uplink::{Uplink, UplinkEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};

/// An uplink that records every sent message.
pub struct MockUplink {
    sent: StdMutex<Vec<Message>>,
    events: broadcast::Sender<UplinkEvent>,
}

impl MockUplink {
    pub fn new() -> std::sync::Arc<Self> {
        let (events, _) = broadcast::channel(8);
        std::sync::Arc::new(Self {
            sent: StdMutex::new(Vec::new()),
            events,
        })
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn count_kind(&self, kind: MessageType) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.header.kind == kind)
            .count()
    }
}

#[async_trait]
impl Uplink for MockUplink {
    async fn send(&self, msg: Message) -> Result<()> {
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<UplinkEvent> {
        self.events.subscribe()
    }
}

/// A local bridge backed by in-memory channels.
pub struct MockForwarder {
    data_tx: mpsc::Sender<Bytes>,
    err_tx: mpsc::Sender<Error>,
    streams: StdMutex<Option<(mpsc::Receiver<Bytes>, mpsc::Receiver<Error>)>>,
    delivered: StdMutex<Vec<Bytes>>,
    acked: StdMutex<Vec<u64>>,
    closed: AtomicBool,
}

impl MockForwarder {
    pub fn new() -> std::sync::Arc<Self> {
        let (data_tx, data_rx) = mpsc::channel(128);
        let (err_tx, err_rx) = mpsc::channel(1);
        std::sync::Arc::new(Self {
            data_tx,
            err_tx,
            streams: StdMutex::new(Some((data_rx, err_rx))),
            delivered: StdMutex::new(Vec::new()),
            acked: StdMutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Feeds outbound bytes, as if read from the local connection.
    pub async fn push_outbound(&self, data: Bytes) {
        self.data_tx.send(data).await.expect("forwarder not started");
    }

    /// Injects a local bridge error.
    pub async fn fail_local(&self, err: Error) {
        self.err_tx.send(err).await.expect("forwarder not started");
    }

    pub fn delivered(&self) -> Vec<Bytes> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.acked.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl crate::forwarder::Forwarder for MockForwarder {
    async fn start(&self) -> Result<(mpsc::Receiver<Bytes>, mpsc::Receiver<Error>)> {
        self.streams
            .lock()
            .unwrap()
            .take()
            .ok_or(Error::ConnectionAborted)
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        self.delivered.lock().unwrap().push(data);
        Ok(())
    }

    async fn ack(&self, seq: u64) {
        self.acked.lock().unwrap().push(seq);
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A data message of the given body length, for window bookkeeping tests.
pub fn data_message(len: usize) -> Message {
    Message {
        header: MessageHeader {
            from: DeviceId::from("local"),
            to: DeviceId::from("peer"),
            kind: MessageType::Data,
            cid: ConnectionId::from("test-cid"),
        },
        body: Bytes::from(vec![0u8; len]),
    }
}
