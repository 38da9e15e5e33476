//! The inbound acceptance role: establishes the local side of the bridge and
//! negotiates readiness with the peer.
//! 入站接受角色：建立桥接的本地侧并与对端协商就绪。

use super::{Connected, ConnectionAdapterOptions, ConnectionState};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::forwarder::{Forwarder, TcpForwarder};
use crate::message::payload::ConnectionFailed;
use crate::message::{Message, MessageType};
use crate::uplink::Uplink;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// The accepting side of a connection that is being established.
///
/// On `start` it opens the local connection described by the bridge options.
/// Success is announced to the peer with connection-accept messages, re-sent
/// on a ticker until the peer confirms with connection-ready; failure is
/// announced once with a connection-failed message and surfaced to the
/// caller, with no retry.
///
/// 正在建立的连接的接受侧。
///
/// `start` 时打开桥接选项描述的本地连接。成功后通过 connection-accept 消息
/// 告知对端，并由定时器重发，直到对端以 connection-ready 确认；失败则发送
/// 一次 connection-failed 消息并将错误返回给调用方，不做重试。
pub struct ConnectingInbound {
    options: ConnectionAdapterOptions,
    config: Config,
    uplink: Arc<dyn Uplink>,
    forwarder: Option<Arc<TcpForwarder>>,
    accept_ticker: Option<JoinHandle<()>>,
    stopped: bool,
}

impl ConnectingInbound {
    pub fn new(options: ConnectionAdapterOptions, config: Config, uplink: Arc<dyn Uplink>) -> Self {
        Self {
            options,
            config,
            uplink,
            forwarder: None,
            accept_ticker: None,
            stopped: false,
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.accept_ticker.take() {
            ticker.abort();
        }
    }
}

#[async_trait]
impl ConnectionState for ConnectingInbound {
    async fn start(&mut self) -> Result<()> {
        let target = self.options.bridge.remote_addr.clone();
        let forwarder = match TcpForwarder::connect(
            &target,
            self.config.connection.read_chunk_size,
            self.config.connection.channel_capacity,
        )
        .await
        {
            Ok(forwarder) => Arc::new(forwarder),
            Err(e) => {
                let reason = format!("failed to open local connection to {}: {}", target, e);
                error!(cid = %self.options.cid, reason = %reason, "local open failed");
                let msg = self.options.message(
                    MessageType::ConnectionFailed,
                    ConnectionFailed { reason }.to_body(),
                );
                if let Err(send_err) = self.uplink.send(msg).await {
                    warn!(
                        cid = %self.options.cid,
                        error = %send_err,
                        "failed to send connection-failed message"
                    );
                }
                return Err(Error::LocalOpenFailed { target, source: e });
            }
        };
        self.forwarder = Some(forwarder);
        debug!(cid = %self.options.cid, target = %target, "local connection established");

        let uplink = self.uplink.clone();
        let msg = self.options.control(MessageType::ConnectionAccept);
        let cid = self.options.cid.clone();
        let period = self.config.connection.resend_interval;
        self.accept_ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = uplink.send(msg.clone()).await {
                    warn!(cid = %cid, error = %e, "failed to send connection-accept message");
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
        self.stop_ticker();

        let msg = self.options.control(MessageType::ConnectionClose);
        if let Err(e) = self.uplink.send(msg).await {
            warn!(cid = %self.options.cid, error = %e, "failed to send connection-close message");
        }
        match self.forwarder.take() {
            Some(forwarder) => forwarder.close().await,
            None => Ok(()),
        }
    }

    async fn handle_message(&mut self, msg: Message) -> Result<Option<Box<dyn ConnectionState>>> {
        match msg.header.kind {
            MessageType::ConnectionReady => {
                self.stop_ticker();
                let forwarder = match self.forwarder.take() {
                    Some(forwarder) => forwarder,
                    // Not started, or already aborted.
                    // 尚未启动，或已被中止。
                    None => return Err(Error::ConnectionAborted),
                };
                debug!(cid = %self.options.cid, "peer is ready, entering connected state");
                let connected = Connected::new(
                    self.options.clone(),
                    self.config.clone(),
                    self.uplink.clone(),
                    forwarder,
                );
                Ok(Some(Box::new(connected)))
            }
            MessageType::ConnectionClose => {
                // A close while connecting is a valid early abort.
                // 连接建立过程中的关闭是合法的提前中止。
                debug!(cid = %self.options.cid, "connection closed by peer while connecting");
                self.stopped = true;
                self.stop_ticker();
                if let Some(forwarder) = self.forwarder.take() {
                    forwarder.close().await?;
                }
                Ok(None)
            }
            MessageType::ConnectionOpen => {
                debug!(cid = %self.options.cid, "duplicate connection-open ignored");
                Ok(None)
            }
            MessageType::ConnectionAccept
            | MessageType::ConnectionFailed
            | MessageType::ConnectionNotFound => {
                debug!(cid = %self.options.cid, kind = %msg.header.kind, "control message ignored while connecting");
                Ok(None)
            }
            got => Err(Error::UnexpectedMessageType {
                expected: "[CR|CC|CO]",
                got,
            }),
        }
    }
}
