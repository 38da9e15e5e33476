//! Traits for abstracting over the uplink to the relay.
//! 对中继上行链路进行抽象的trait。

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// A connectivity event observed on the uplink.
/// 在上行链路上观察到的连接事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkEvent {
    /// The uplink (re-)established its session to the relay.
    /// 上行链路（重新）建立了到中继的会话。
    Connected,
    /// The uplink lost its session to the relay.
    /// 上行链路丢失了到中继的会话。
    Disconnected,
}

/// The transport used to exchange messages with the relay.
///
/// Delivery is best-effort and unordered across send calls; send failures are
/// surfaced synchronously. Implementations must be safe for concurrent sends
/// from all connections sharing the uplink.
///
/// 用于与中继交换消息的传输。
///
/// 投递是尽力而为的，且各次发送之间不保证顺序；发送失败会同步返回。
/// 实现必须支持共享该上行链路的所有连接并发发送。
#[async_trait]
pub trait Uplink: Send + Sync + 'static {
    /// Sends a message to the relay.
    /// 向中继发送一条消息。
    async fn send(&self, msg: Message) -> Result<()>;

    /// Subscribes to connectivity events.
    /// 订阅连接事件。
    fn events(&self) -> broadcast::Receiver<UplinkEvent>;
}
