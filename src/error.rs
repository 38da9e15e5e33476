//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use crate::message::MessageType;
use thiserror::Error;

/// The primary error type for the relay connection protocol library.
/// 中继连接协议库的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying I/O error occurred.
    /// 发生了底层的I/O错误。
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The accepting side could not establish the requested local connection.
    /// The reason is also reported to the peer in a connection-failed message.
    ///
    /// 接受方无法建立所请求的本地连接。失败原因也会通过 connection-failed 消息告知对端。
    #[error("failed to open local connection to {target}: {source}")]
    LocalOpenFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The acknowledged sequence number precedes the oldest queued item or
    /// exceeds the newest one.
    /// 被确认的序号早于窗口中最旧的条目，或超过最新的条目。
    #[error("message {seq} is not in the window")]
    MessageNotInWindow { seq: u64 },

    /// The targeted window item was already marked as acknowledged.
    /// 目标窗口条目已被标记为确认。
    #[error("message {seq} has already been acked")]
    AlreadyAcked { seq: u64 },

    /// A message type that is not valid for the current connection state.
    /// 当前连接状态下不合法的消息类型。
    #[error("expected message type {expected}, but got {got}")]
    UnexpectedMessageType {
        expected: &'static str,
        got: MessageType,
    },

    /// A message body could not be decoded for its declared type tag.
    /// 消息体无法按其声明的类型标签解码。
    #[error("invalid message body for type {kind}")]
    InvalidMessage { kind: MessageType },

    /// The uplink could not deliver a message to the relay.
    /// 上行链路无法将消息投递给中继。
    #[error("uplink send failed: {reason}")]
    UplinkSendFailed { reason: String },

    /// The connection was stopped or is being torn down.
    /// 连接已停止或正在拆除。
    #[error("connection is closed or closing")]
    ConnectionAborted,

    /// An internal channel for communication between tasks was closed unexpectedly.
    /// 用于任务间通信的内部通道意外关闭。
    #[error("internal channel is broken")]
    ChannelClosed,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::Io(e) => e,
            Error::LocalOpenFailed { source, .. } => source,
            Error::MessageNotInWindow { .. } => ErrorKind::NotFound.into(),
            Error::AlreadyAcked { .. } => ErrorKind::AlreadyExists.into(),
            Error::UnexpectedMessageType { .. } => ErrorKind::InvalidData.into(),
            Error::InvalidMessage { .. } => ErrorKind::InvalidData.into(),
            Error::UplinkSendFailed { reason } => std::io::Error::other(reason),
            Error::ConnectionAborted => ErrorKind::ConnectionAborted.into(),
            Error::ChannelClosed => ErrorKind::BrokenPipe.into(),
        }
    }
}
