//! The per-connection state machine driving establishment, data transfer and
//! teardown.
//! 驱动建立、数据传输和拆除的每连接状态机。

use crate::config::Config;
use crate::error::Result;
use crate::message::payload::BridgeOptions;
use crate::message::{ConnectionId, DeviceId, Message, MessageHeader, MessageType};
use crate::uplink::Uplink;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

pub mod connected;
pub mod connecting;


pub use connected::Connected;
pub use connecting::ConnectingInbound;

/// Options identifying one bridged connection.
/// 标识一个被桥接连接的选项。
#[derive(Debug, Clone)]
pub struct ConnectionAdapterOptions {
    /// The connection ID, unique for the lifetime of the connection.
    /// 连接ID，在连接的生命周期内唯一。
    pub cid: ConnectionId,
    /// The device ID of this relay.
    /// 本侧中继的设备ID。
    pub local_device: DeviceId,
    /// The device ID of the peer relay.
    /// 对端中继的设备ID。
    pub peer_device: DeviceId,
    /// The bridge options received with the connection-open message.
    /// 随 connection-open 消息收到的桥接选项。
    pub bridge: BridgeOptions,
}

impl ConnectionAdapterOptions {
    /// Builds a message addressed to the peer on this connection.
    /// 构造一条发往对端、属于此连接的消息。
    pub fn message(&self, kind: MessageType, body: Bytes) -> Message {
        Message {
            header: MessageHeader {
                from: self.local_device.clone(),
                to: self.peer_device.clone(),
                kind,
                cid: self.cid.clone(),
            },
            body,
        }
    }

    /// Builds a body-less control message addressed to the peer.
    /// 构造一条发往对端的无消息体控制消息。
    pub fn control(&self, kind: MessageType) -> Message {
        self.message(kind, Bytes::new())
    }
}

/// One state of a connection.
///
/// `handle_message` returns the next state when a transition occurs and
/// `None` to remain in the current state. A returned error is reported to the
/// caller but does not by itself tear the connection down.
///
/// 连接的一个状态。
///
/// `handle_message` 在发生转换时返回下一个状态，返回 `None` 则保持当前状态。
/// 返回的错误会报告给调用方，但其本身不会拆除连接。
#[async_trait]
pub trait ConnectionState: Send {
    /// Starts the state's background work.
    /// 启动该状态的后台工作。
    async fn start(&mut self) -> Result<()>;

    /// Stops the state, releasing its resources. Idempotent.
    /// 停止该状态并释放其资源。幂等。
    async fn stop(&mut self) -> Result<()>;

    /// Handles one inbound message for this connection.
    /// 处理此连接的一条入站消息。
    async fn handle_message(&mut self, msg: Message) -> Result<Option<Box<dyn ConnectionState>>>;
}

/// Drives one connection's state machine, applying returned transitions.
///
/// 驱动单个连接的状态机，应用返回的状态转换。
pub struct ConnectionAdapter {
    cid: ConnectionId,
    state: Box<dyn ConnectionState>,
}

impl ConnectionAdapter {
    /// Wraps an initial state.
    /// 包装一个初始状态。
    pub fn new(cid: ConnectionId, state: Box<dyn ConnectionState>) -> Self {
        Self { cid, state }
    }

    /// Creates an adapter for an inbound connection request, starting in the
    /// accepting role.
    /// 为入站连接请求创建适配器，从接受角色开始。
    pub fn new_inbound(
        options: ConnectionAdapterOptions,
        config: Config,
        uplink: Arc<dyn Uplink>,
    ) -> Self {
        let cid = options.cid.clone();
        Self {
            cid,
            state: Box::new(ConnectingInbound::new(options, config, uplink)),
        }
    }

    /// The connection this adapter belongs to.
    /// 此适配器所属的连接。
    pub fn cid(&self) -> &ConnectionId {
        &self.cid
    }

    pub async fn start(&mut self) -> Result<()> {
        self.state.start().await
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.state.stop().await
    }

    /// Handles one inbound message, applying a state transition when the
    /// current state returns one.
    /// 处理一条入站消息，并在当前状态返回转换时应用它。
    pub async fn handle_message(&mut self, msg: Message) -> Result<()> {
        if let Some(next) = self.state.handle_message(msg).await? {
            self.state = next;
            debug!(cid = %self.cid, "state transition applied");
            self.state.start().await?;
        }
        Ok(())
    }
}
