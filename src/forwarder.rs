//! The local bridge: moves bytes between the connection core and the real
//! local connection.
//! 本地桥接：在连接核心与真实的本地连接之间搬运字节。

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// The local side of a bridged connection.
///
/// `start` hands back the outbound data stream and the error stream of the
/// underlying connection; the read loop runs until the local side closes.
///
/// 被桥接连接的本地侧。
///
/// `start` 返回底层连接的出站数据流和错误流；读取循环持续运行，直到本地侧关闭。
#[async_trait]
pub trait Forwarder: Send + Sync + 'static {
    /// Starts reading from the local connection. Returns the outbound data
    /// stream and the error stream. Must be called at most once.
    /// 开始从本地连接读取。返回出站数据流和错误流。最多调用一次。
    async fn start(&self) -> Result<(mpsc::Receiver<Bytes>, mpsc::Receiver<Error>)>;

    /// Delivers a payload received from the peer to the local connection.
    /// 将从对端收到的载荷投递给本地连接。
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Notifies the bridge that the peer acknowledged the given sequence number.
    /// 通知桥接：对端已确认给定序号。
    async fn ack(&self, seq: u64);

    /// Closes the local connection.
    /// 关闭本地连接。
    async fn close(&self) -> Result<()>;
}

/// A `Forwarder` bridging to a local TCP connection.
/// 桥接到本地TCP连接的 `Forwarder`。
pub struct TcpForwarder {
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    chunk_size: usize,
    channel_capacity: usize,
}

impl TcpForwarder {
    /// Connects to the given local target.
    /// 连接到给定的本地目标。
    pub async fn connect(
        target: &str,
        chunk_size: usize,
        channel_capacity: usize,
    ) -> std::io::Result<Self> {
        let stream = TcpStream::connect(target).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(Some(read_half)),
            writer: Mutex::new(write_half),
            read_task: Mutex::new(None),
            chunk_size,
            channel_capacity,
        })
    }
}

#[async_trait]
impl Forwarder for TcpForwarder {
    async fn start(&self) -> Result<(mpsc::Receiver<Bytes>, mpsc::Receiver<Error>)> {
        let mut read_half = match self.reader.lock().await.take() {
            Some(r) => r,
            None => return Err(Error::ConnectionAborted),
        };

        let (data_tx, data_rx) = mpsc::channel(self.channel_capacity);
        let (err_tx, err_rx) = mpsc::channel(1);
        let chunk_size = self.chunk_size;

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; chunk_size];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        debug!("local connection closed by the local side");
                        let _ = err_tx
                            .send(Error::Io(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "local connection closed",
                            )))
                            .await;
                        break;
                    }
                    Ok(n) => {
                        trace!(bytes = n, "read from local connection");
                        if data_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = err_tx.send(Error::Io(e)).await;
                        break;
                    }
                }
            }
        });
        *self.read_task.lock().await = Some(task);

        Ok((data_rx, err_rx))
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        self.writer.lock().await.write_all(&data).await?;
        Ok(())
    }

    async fn ack(&self, seq: u64) {
        // TCP provides its own delivery guarantees; the peer ack is only of
        // diagnostic interest to this bridge.
        // TCP自带投递保证；对端确认对此桥接只有诊断意义。
        trace!(seq = seq, "peer acknowledged sequence number");
    }

    async fn close(&self) -> Result<()> {
        if let Some(task) = self.read_task.lock().await.take() {
            task.abort();
        }
        match self.writer.lock().await.shutdown().await {
            Ok(()) => Ok(()),
            // A repeated close of an already-dead socket is not an error.
            // 对已失效套接字的重复关闭不算错误。
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
