//! 定义了与中继交换的消息信封和类型标签。
//! Defines the message envelope and type tags exchanged with the relay.

use bytes::{Buf, BufMut, Bytes};
use std::fmt;

pub mod payload;

/// The type of a message. Determines how the body decodes.
/// 消息类型。决定消息体如何解码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// A request to open a connection, carrying the bridge options.
    /// 打开连接的请求，携带桥接选项。
    ConnectionOpen = 0x01,
    /// A notification that a connection is being closed.
    /// 连接正在关闭的通知。
    ConnectionClose = 0x02,
    /// Confirms that the accepting side established its local connection.
    /// 确认接受方已建立其本地连接。
    ConnectionAccept = 0x03,
    /// Sent after accept, confirming both sides of the connection are ready.
    /// 在 accept 之后发送，确认连接双方均已就绪。
    ConnectionReady = 0x04,
    /// A connection open attempt failed; the body carries the reason.
    /// 连接打开尝试失败；消息体携带失败原因。
    ConnectionFailed = 0x05,
    /// The recipient has no running connection for the given connection ID.
    /// 接收方没有与给定连接ID对应的运行中连接。
    ConnectionNotFound = 0x06,
    /// A sequenced data message.
    /// 带序号的数据消息。
    Data = 0x10,
    /// A connectionless datagram; no sequencing or windowing applies.
    /// 无连接数据报；不适用排序和窗口机制。
    Datagram = 0x11,
    /// Acknowledges a data message by sequence number.
    /// 按序号确认数据消息。
    DataAck = 0x12,
}

impl MessageType {
    /// 从一个字节尝试转换成 `MessageType`。
    /// Tries to convert a byte into a `MessageType`.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(MessageType::ConnectionOpen),
            0x02 => Some(MessageType::ConnectionClose),
            0x03 => Some(MessageType::ConnectionAccept),
            0x04 => Some(MessageType::ConnectionReady),
            0x05 => Some(MessageType::ConnectionFailed),
            0x06 => Some(MessageType::ConnectionNotFound),
            0x10 => Some(MessageType::Data),
            0x11 => Some(MessageType::Datagram),
            0x12 => Some(MessageType::DataAck),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::ConnectionOpen => "CO",
            MessageType::ConnectionClose => "CC",
            MessageType::ConnectionAccept => "CA",
            MessageType::ConnectionReady => "CR",
            MessageType::ConnectionFailed => "CF",
            MessageType::ConnectionNotFound => "NF",
            MessageType::Data => "D",
            MessageType::Datagram => "DG",
            MessageType::DataAck => "DA",
        };
        write!(f, "{}", s)
    }
}

/// An opaque device identifier.
/// 不透明的设备标识符。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        DeviceId(s.to_string())
    }
}

/// An opaque connection identifier. Unique for the lifetime of a connection
/// and never reused concurrently.
/// 不透明的连接标识符。在连接的生命周期内唯一，且绝不并发复用。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generates a fresh random connection ID.
    /// 生成一个新的随机连接ID。
    pub fn generate() -> Self {
        ConnectionId(format!("{:032x}", rand::random::<u128>()))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        ConnectionId(s.to_string())
    }
}

/// The authenticated plaintext header of a message.
/// 消息的已认证明文头。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// The device ID of the sender of the message.
    /// 消息发送方的设备ID。
    pub from: DeviceId,
    /// The device ID of the recipient of the message.
    /// 消息接收方的设备ID。
    pub to: DeviceId,
    /// The type of this message.
    /// 此消息的类型。
    pub kind: MessageType,
    /// The connection this message belongs to.
    /// 此消息所属的连接。
    pub cid: ConnectionId,
}

/// A message exchanged with the relay.
///
/// The header is authenticated but not encrypted; the body is opaque until
/// the type tag is known.
///
/// 与中继交换的消息。
///
/// 消息头经过认证但未加密；在类型标签已知之前，消息体是不透明的。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Bytes,
}

fn put_str<B: BufMut>(buf: &mut B, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn get_str<B: Buf>(buf: &mut B) -> Option<String> {
    if buf.remaining() < 2 {
        return None;
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return None;
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).ok()
}

impl MessageHeader {
    /// 将消息头编码到缓冲区。
    /// Encodes the header into a buffer.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.kind as u8);
        put_str(buf, &self.from.0);
        put_str(buf, &self.to.0);
        put_str(buf, &self.cid.0);
    }

    /// 从缓冲区解码消息头。
    /// Decodes a header from a buffer.
    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if !buf.has_remaining() {
            return None;
        }
        let kind = MessageType::from_u8(buf.get_u8())?;
        let from = DeviceId(get_str(buf)?);
        let to = DeviceId(get_str(buf)?);
        let cid = ConnectionId(get_str(buf)?);
        Some(MessageHeader {
            from,
            to,
            kind,
            cid,
        })
    }
}

impl Message {
    /// Creates a message with an empty body, for the body-less control types.
    /// 创建消息体为空的消息，用于无消息体的控制类型。
    pub fn control(from: DeviceId, to: DeviceId, cid: ConnectionId, kind: MessageType) -> Self {
        Message {
            header: MessageHeader {
                from,
                to,
                kind,
                cid,
            },
            body: Bytes::new(),
        }
    }

    /// 将整条消息编码到缓冲区。
    /// Encodes the whole message into a buffer.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.encode(buf);
        buf.put_slice(&self.body);
    }

    /// 从缓冲区解码整条消息。消息头之后剩余的所有字节构成消息体。
    /// Decodes a whole message from a buffer. Everything after the header is the body.
    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        let header = MessageHeader::decode(buf)?;
        let body = buf.copy_to_bytes(buf.remaining());
        Some(Message { header, body })
    }
}
