//! 定义了按消息类型标签解码的有类型载荷。
//! Defines the typed payloads decoded according to the message type tag.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

/// The options for the bridge, shared with the peer when a connection to the
/// other relay is opened.
/// 桥接选项，在向另一侧中继打开连接时与对端共享。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// The time the connection was opened, in microseconds since the epoch.
    /// 连接打开的时间，自纪元起的微秒数。
    pub timestamp_micros: u64,
    /// The remote address the accepting side should connect to locally.
    /// 接受方应在本地连接的远程地址。
    pub remote_addr: String,
}

impl BridgeOptions {
    /// Creates bridge options for the given target, stamped with the current time.
    /// 为给定目标创建桥接选项，并打上当前时间戳。
    pub fn new(remote_addr: impl Into<String>) -> Self {
        let timestamp_micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self {
            timestamp_micros,
            remote_addr: remote_addr.into(),
        }
    }
}

/// The payload of a connection-open message.
/// connection-open 消息的载荷。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOpen {
    pub bridge: BridgeOptions,
}

impl ConnectionOpen {
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64(self.bridge.timestamp_micros);
        buf.put_u16(self.bridge.remote_addr.len() as u16);
        buf.put_slice(self.bridge.remote_addr.as_bytes());
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < 8 {
            return None;
        }
        let timestamp_micros = buf.get_u64();
        let remote_addr = get_prefixed_str(buf)?;
        Some(ConnectionOpen {
            bridge: BridgeOptions {
                timestamp_micros,
                remote_addr,
            },
        })
    }

    pub fn to_body(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// The payload of a connection-failed message: a human-readable reason.
/// The body is the raw UTF-8 reason, with no framing.
/// connection-failed 消息的载荷：人类可读的失败原因。消息体就是原始的UTF-8文本，没有额外封装。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFailed {
    pub reason: String,
}

impl ConnectionFailed {
    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        let bytes = buf.copy_to_bytes(buf.remaining());
        Some(ConnectionFailed {
            reason: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    pub fn to_body(&self) -> Bytes {
        Bytes::copy_from_slice(self.reason.as_bytes())
    }
}

/// The payload of a data message.
/// 数据消息的载荷。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    /// The sequence number of the data, monotonic per connection from 0.
    /// 数据的序号，每个连接从0开始单调递增。
    pub seq: u64,
    /// Set when this send is a retransmission.
    /// 当此次发送为重传时置位。
    pub retransmitted: bool,
    /// The actual payload from the bridged connection.
    /// 来自被桥接连接的实际载荷。
    pub payload: Bytes,
}

impl Data {
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64(self.seq);
        buf.put_u8(self.retransmitted as u8);
        buf.put_slice(&self.payload);
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < 9 {
            return None;
        }
        let seq = buf.get_u64();
        let retransmitted = buf.get_u8() != 0;
        let payload = buf.copy_to_bytes(buf.remaining());
        Some(Data {
            seq,
            retransmitted,
            payload,
        })
    }

    pub fn to_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(9 + self.payload.len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// The payload of a data-ack message.
/// data-ack 消息的载荷。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataAck {
    /// The sequence number being acknowledged.
    /// 被确认的序号。
    pub seq: u64,
    /// Set when the ack is for a retransmitted send, meaning its RTT sample
    /// is unreliable.
    /// 当该确认对应一次重传发送时置位，表示其RTT样本不可靠。
    pub retransmitted: bool,
}

impl DataAck {
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64(self.seq);
        buf.put_u8(self.retransmitted as u8);
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < 9 {
            return None;
        }
        let seq = buf.get_u64();
        let retransmitted = buf.get_u8() != 0;
        Some(DataAck { seq, retransmitted })
    }

    pub fn to_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(9);
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// The payload of a datagram message, for connectionless forwarding.
/// No sequencing or windowing applies.
/// 数据报消息的载荷，用于无连接转发。不适用排序和窗口机制。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// The endpoint the datagram came from.
    /// 数据报的来源端点。
    pub source: String,
    /// The endpoint the datagram should be delivered to.
    /// 数据报应送达的端点。
    pub target: String,
    pub payload: Bytes,
}

impl Datagram {
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.source.len() as u16);
        buf.put_slice(self.source.as_bytes());
        buf.put_u16(self.target.len() as u16);
        buf.put_slice(self.target.as_bytes());
        buf.put_slice(&self.payload);
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        let source = get_prefixed_str(buf)?;
        let target = get_prefixed_str(buf)?;
        let payload = buf.copy_to_bytes(buf.remaining());
        Some(Datagram {
            source,
            target,
            payload,
        })
    }

    pub fn to_body(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

fn get_prefixed_str<B: Buf>(buf: &mut B) -> Option<String> {
    if buf.remaining() < 2 {
        return None;
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return None;
    }
    String::from_utf8(buf.copy_to_bytes(len).to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_codec_preserves_flag_and_payload() {
        let data = Data {
            seq: 42,
            retransmitted: true,
            payload: Bytes::from_static(b"hello"),
        };
        let mut body = data.to_body();
        let decoded = Data::decode(&mut body).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_data_decode_rejects_short_body() {
        let mut body = Bytes::from_static(&[0, 1, 2]);
        assert!(Data::decode(&mut body).is_none());
    }

    #[test]
    fn test_connection_failed_body_is_raw_reason() {
        let failed = ConnectionFailed {
            reason: "failed to open local connection to localhost:51222: connection refused"
                .to_string(),
        };
        // The body must be readable as plain UTF-8 without any framing.
        let body = failed.to_body();
        assert_eq!(std::str::from_utf8(&body).unwrap(), failed.reason);
    }

    #[test]
    fn test_connection_open_codec() {
        let open = ConnectionOpen {
            bridge: BridgeOptions {
                timestamp_micros: 1_000_000,
                remote_addr: "127.0.0.1:8080".to_string(),
            },
        };
        let mut body = open.to_body();
        assert_eq!(ConnectionOpen::decode(&mut body).unwrap(), open);
    }
}
