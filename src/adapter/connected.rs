//! The established state: moves data in both directions under the window's
//! flow control.
//! 已建立状态：在窗口流量控制下双向搬运数据。

use super::{ConnectionAdapterOptions, ConnectionState};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::forwarder::Forwarder;
use crate::message::payload::{Data, DataAck};
use crate::message::{Message, MessageType};
use crate::uplink::Uplink;
use crate::window::Window;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// An established connection.
///
/// Outbound bytes read from the local bridge are sequenced and admitted by
/// the window; inbound data messages are acknowledged and delivered to the
/// bridge. A connection-ready keepalive is re-sent until data flow begins,
/// and a background check resends window items whose retransmission deadline
/// has elapsed.
///
/// 一条已建立的连接。
///
/// 从本地桥接读取的出站字节由窗口编号并准入；入站数据消息被确认并投递给
/// 桥接。connection-ready 保活消息会重发，直到数据流动开始；后台检查会重发
/// 窗口中重传期限已过的条目。
pub struct Connected {
    options: ConnectionAdapterOptions,
    config: Config,
    uplink: Arc<dyn Uplink>,
    forwarder: Arc<dyn Forwarder>,
    window: Arc<Window>,
    ready_ticker: Option<JoinHandle<()>>,
    outbound_task: Option<JoinHandle<()>>,
    retransmit_task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl Connected {
    pub fn new(
        options: ConnectionAdapterOptions,
        config: Config,
        uplink: Arc<dyn Uplink>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        let window = Arc::new(Window::new(config.window.clone(), uplink.clone()));
        Self {
            options,
            config,
            uplink,
            forwarder,
            window,
            ready_ticker: None,
            outbound_task: None,
            retransmit_task: None,
            stopped: false,
        }
    }

    /// The window of this connection.
    /// 此连接的窗口。
    pub fn window(&self) -> Arc<Window> {
        self.window.clone()
    }

    /// Data flow confirms both ends are ready, so the keepalive stops with
    /// the first data or data-ack message.
    /// 数据流动证明两端均已就绪，因此保活随第一条 data 或 data-ack 消息停止。
    fn stop_keepalive(&mut self) {
        if let Some(ticker) = self.ready_ticker.take() {
            ticker.abort();
        }
    }

    fn abort_tasks(&mut self) {
        self.stop_keepalive();
        if let Some(task) = self.outbound_task.take() {
            task.abort();
        }
        if let Some(task) = self.retransmit_task.take() {
            task.abort();
        }
    }

    async fn resend(uplink: &dyn Uplink, mut msg: Message) -> Result<()> {
        let mut body = msg.body.clone();
        let mut data = Data::decode(&mut body).ok_or(Error::InvalidMessage {
            kind: MessageType::Data,
        })?;
        data.retransmitted = true;
        msg.body = data.to_body();
        uplink.send(msg).await
    }
}

#[async_trait]
impl ConnectionState for Connected {
    async fn start(&mut self) -> Result<()> {
        let (mut data_rx, mut err_rx) = self.forwarder.start().await?;

        // Outbound loop: sequence local bytes and admit them into the window.
        // 出站循环：为本地字节编号并将其纳入窗口。
        let window = self.window.clone();
        let options = self.options.clone();
        self.outbound_task = Some(tokio::spawn(async move {
            let mut seq: u64 = 0;
            loop {
                tokio::select! {
                    data = data_rx.recv() => {
                        let Some(payload) = data else { break };
                        let body = Data { seq, retransmitted: false, payload }.to_body();
                        let msg = options.message(MessageType::Data, body);
                        match window.add(msg, seq).await {
                            Ok(()) => {}
                            Err(Error::ConnectionAborted) => break,
                            // The item stays queued; the retransmission check
                            // will pick it up.
                            // 条目仍在队列中；重传检查会再次发送它。
                            Err(e) => warn!(cid = %options.cid, seq = seq, error = %e, "failed to send data message"),
                        }
                        seq += 1;
                    }
                    err = err_rx.recv() => {
                        if let Some(e) = err {
                            warn!(cid = %options.cid, error = %e, "local bridge error, outbound stream stopped");
                        }
                        break;
                    }
                }
            }
        }));

        // Keepalive until data flow begins.
        // 数据流动开始前的保活。
        let uplink = self.uplink.clone();
        let msg = self.options.control(MessageType::ConnectionReady);
        let cid = self.options.cid.clone();
        let period = self.config.connection.resend_interval;
        self.ready_ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = uplink.send(msg.clone()).await {
                    warn!(cid = %cid, error = %e, "failed to send connection-ready message");
                }
            }
        }));

        // Caller-driven retransmission check over the window.
        // 由调用方驱动的窗口重传检查。
        let window = self.window.clone();
        let uplink = self.uplink.clone();
        let cid = self.options.cid.clone();
        let period = self.config.connection.retransmit_interval;
        self.retransmit_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                for msg in window.take_expired().await {
                    if let Err(e) = Self::resend(uplink.as_ref(), msg).await {
                        warn!(cid = %cid, error = %e, "failed to retransmit data message");
                    }
                }
            }
        }));

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let msg = self.options.control(MessageType::ConnectionClose);
        if let Err(e) = self.uplink.send(msg).await {
            warn!(cid = %self.options.cid, error = %e, "failed to send connection-close message");
        }
        self.abort_tasks();
        self.window.close().await;
        self.forwarder.close().await
    }

    async fn handle_message(&mut self, msg: Message) -> Result<Option<Box<dyn ConnectionState>>> {
        match msg.header.kind {
            MessageType::Data => {
                self.stop_keepalive();
                let mut body = msg.body.clone();
                let data = Data::decode(&mut body).ok_or(Error::InvalidMessage {
                    kind: MessageType::Data,
                })?;

                // Always ack first, echoing the retransmission flag; delivery
                // failure is the bridge's concern.
                // 总是先确认并回显重传标志；投递失败由桥接负责。
                let ack = DataAck {
                    seq: data.seq,
                    retransmitted: data.retransmitted,
                };
                let reply = self.options.message(MessageType::DataAck, ack.to_body());
                self.uplink.send(reply).await?;

                if let Err(e) = self.forwarder.send(data.payload).await {
                    warn!(cid = %self.options.cid, seq = data.seq, error = %e, "failed to deliver payload to local bridge");
                }
                Ok(None)
            }
            MessageType::DataAck => {
                self.stop_keepalive();
                let mut body = msg.body.clone();
                let ack = DataAck::decode(&mut body).ok_or(Error::InvalidMessage {
                    kind: MessageType::DataAck,
                })?;
                match self.window.ack(ack.seq, ack.retransmitted).await {
                    Ok(()) => {}
                    // Expected races under retransmission and reordering.
                    // 重传与乱序下的预期竞争。
                    Err(e @ (Error::MessageNotInWindow { .. } | Error::AlreadyAcked { .. })) => {
                        debug!(cid = %self.options.cid, error = %e, "late or duplicate ack ignored");
                    }
                    Err(e) => return Err(e),
                }
                self.forwarder.ack(ack.seq).await;
                Ok(None)
            }
            MessageType::ConnectionClose => {
                debug!(cid = %self.options.cid, "connection closed by peer");
                self.stopped = true;
                self.abort_tasks();
                self.window.close().await;
                self.forwarder.close().await?;
                Ok(None)
            }
            // The peer's own keepalive; both ends are already ready.
            // 对端自己的保活；两端均已就绪。
            MessageType::ConnectionReady => Ok(None),
            got => Err(Error::UnexpectedMessageType {
                expected: "[D|DA|CC|CR]",
                got,
            }),
        }
    }
}
