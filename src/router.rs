//! Routes inbound messages to the state machine of their connection.
//! 将入站消息路由到其连接的状态机。

use crate::adapter::ConnectionAdapter;
use crate::message::{ConnectionId, DeviceId, Message, MessageType};
use crate::uplink::Uplink;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Routes messages to per-connection adapters by connection ID.
///
/// Every registered connection gets its own task draining an in-order queue,
/// so message handling for one connection is strictly serialized while
/// different connections proceed independently. Messages for unknown
/// connection IDs are answered with connection-not-found.
///
/// 按连接ID将消息路由到各连接的适配器。
///
/// 每个注册的连接都有自己的任务按序消费队列，因此单个连接的消息处理
/// 严格串行，而不同连接相互独立。未知连接ID的消息以 connection-not-found 回应。
pub struct ConnectionRouter {
    uplink: Arc<dyn Uplink>,
    local_device: DeviceId,
    connections: DashMap<ConnectionId, mpsc::Sender<Message>>,
    channel_capacity: usize,
}

impl ConnectionRouter {
    pub fn new(uplink: Arc<dyn Uplink>, local_device: DeviceId, channel_capacity: usize) -> Self {
        Self {
            uplink,
            local_device,
            connections: DashMap::new(),
            channel_capacity,
        }
    }

    /// Registers a connection and spawns its handling task. The task starts
    /// the adapter, then drains the queue until the connection is
    /// deregistered, and finally stops the adapter.
    ///
    /// 注册一个连接并启动其处理任务。任务先启动适配器，然后持续消费队列
    /// 直到连接被注销，最后停止适配器。
    pub fn register(&self, mut adapter: ConnectionAdapter) {
        let cid = adapter.cid().clone();
        let (tx, mut rx) = mpsc::channel(self.channel_capacity);
        self.connections.insert(cid.clone(), tx);

        tokio::spawn(async move {
            if let Err(e) = adapter.start().await {
                error!(cid = %cid, error = %e, "failed to start connection");
                return;
            }
            while let Some(msg) = rx.recv().await {
                if let Err(e) = adapter.handle_message(msg).await {
                    // Handler errors are reported, but the connection stays up.
                    // 处理错误会被报告，但连接保持运行。
                    warn!(cid = %cid, error = %e, "error handling message");
                }
            }
            if let Err(e) = adapter.stop().await {
                warn!(cid = %cid, error = %e, "error stopping connection");
            }
        });
    }

    /// Dispatches one inbound message to its connection.
    /// 将一条入站消息分发给其连接。
    pub async fn dispatch(&self, msg: Message) {
        let tx = self
            .connections
            .get(&msg.header.cid)
            .map(|entry| entry.value().clone());
        match tx {
            Some(tx) => {
                if tx.send(msg).await.is_err() {
                    debug!("connection queue closed, message dropped");
                }
            }
            // Never answer a not-found with a not-found.
            // 绝不用 not-found 回应 not-found。
            None if msg.header.kind == MessageType::ConnectionNotFound => {}
            None => {
                debug!(cid = %msg.header.cid, kind = %msg.header.kind, "no connection for message");
                let reply = Message::control(
                    self.local_device.clone(),
                    msg.header.from.clone(),
                    msg.header.cid.clone(),
                    MessageType::ConnectionNotFound,
                );
                if let Err(e) = self.uplink.send(reply).await {
                    warn!(error = %e, "failed to send connection-not-found message");
                }
            }
        }
    }

    /// Deregisters a connection, closing its queue. The handling task then
    /// stops the adapter.
    /// 注销一个连接并关闭其队列。处理任务随后会停止适配器。
    pub fn deregister(&self, cid: &ConnectionId) {
        if self.connections.remove(cid).is_some() {
            debug!(cid = %cid, "connection deregistered");
        }
    }

    /// The number of registered connections.
    /// 已注册连接的数量。
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
