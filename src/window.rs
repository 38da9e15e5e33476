//! The flow/congestion window bounding in-flight unacknowledged data.
//! 限制在途未确认数据量的流量/拥塞窗口。

use crate::config::WindowConfig;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::rtt::RttEstimator;
use crate::uplink::Uplink;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, trace};

#[cfg(test)]
mod tests;

/// An item in the window.
/// 窗口中的一个条目。
#[derive(Debug)]
struct WindowItem {
    msg: Message,
    seq: u64,
    sent_at: Instant,
    /// The deadline after which this item is due for retransmission.
    /// 超过该期限后此条目应当重传。
    rto_at: Instant,
    acked: bool,
    retransmitted: bool,
}

struct WindowInner {
    /// Bytes currently in flight.
    /// 当前在途的字节数。
    size: usize,
    /// The admission ceiling, in bytes.
    /// 准入上限（字节）。
    cap: f64,
    /// The congestion baseline: the minimum recently observed RTT, in seconds.
    /// 拥塞基准：最近观察到的最小RTT（秒）。
    base_rtt: f64,
    /// In-flight items, FIFO by sequence number.
    /// 在途条目，按序号先进先出。
    queue: VecDeque<WindowItem>,
    stats: RttEstimator,
    closed: bool,
}

/// The flow/congestion window of one connection.
///
/// Admission blocks the calling task until enough in-flight bytes have been
/// acknowledged and evicted. The admission ceiling adapts to queuing delay:
/// when the smoothed RTT rises more than one deviation above the base RTT the
/// ceiling is scaled down, otherwise up — a delay-based scheme in the spirit
/// of TCP Vegas. The window runs no timer loop of its own; the owning
/// connection drives the retransmission check.
///
/// 单个连接的流量/拥塞窗口。
///
/// 准入会阻塞调用任务，直到足够多的在途字节被确认并逐出。准入上限随排队延迟
/// 自适应：当平滑RTT超出基准RTT一个偏差以上时上限按比例缩小，否则放大——
/// 一种与 TCP Vegas 同源的基于延迟的方案。窗口自身不运行定时器循环；
/// 重传检查由拥有它的连接驱动。
pub struct Window {
    inner: Mutex<WindowInner>,
    /// Signalled whenever head eviction frees capacity, and on close.
    /// 每当头部逐出释放容量时、以及关闭时发出信号。
    capacity_freed: Notify,
    uplink: Arc<dyn Uplink>,
    config: WindowConfig,
}

impl Window {
    pub fn new(config: WindowConfig, uplink: Arc<dyn Uplink>) -> Self {
        let stats = RttEstimator::new(&config);
        Self {
            inner: Mutex::new(WindowInner {
                size: 0,
                cap: config.initial_cap,
                base_rtt: 0.0,
                queue: VecDeque::new(),
                stats,
                closed: false,
            }),
            capacity_freed: Notify::new(),
            uplink,
            config,
        }
    }

    /// Admits a message into the window and sends it via the uplink.
    ///
    /// Blocks the calling task until the body fits under the admission
    /// ceiling. Returns `ConnectionAborted` once the window is closed, so
    /// teardown never leaves callers blocked.
    ///
    /// 将一条消息纳入窗口并通过上行链路发送。
    ///
    /// 阻塞调用任务，直到消息体能放入准入上限之内。窗口关闭后返回
    /// `ConnectionAborted`，因此拆除连接不会让调用者永久阻塞。
    pub async fn add(&self, msg: Message, seq: u64) -> Result<()> {
        loop {
            let notified = self.capacity_freed.notified();
            {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    return Err(Error::ConnectionAborted);
                }
                let len = msg.body.len();
                if inner.size + len <= inner.cap as usize {
                    let now = Instant::now();
                    let rto = inner.stats.rto();
                    inner.queue.push_back(WindowItem {
                        msg: msg.clone(),
                        seq,
                        sent_at: now,
                        rto_at: now + rto,
                        acked: false,
                        retransmitted: false,
                    });
                    inner.size += len;
                    trace!(seq = seq, bytes = len, in_flight = inner.size, "message admitted into window");
                    self.uplink.send(msg).await?;
                    return Ok(());
                }
                trace!(seq = seq, in_flight = inner.size, cap = inner.cap, "window full, admission blocked");
            }
            notified.await;
        }
    }

    /// Processes an acknowledgment from the peer.
    ///
    /// On a clean (non-retransmitted) ack the RTT sample feeds the estimator
    /// and the admission ceiling is rescaled; a retransmitted ack taints this
    /// and every later-queued item instead, so their samples are discarded
    /// when they arrive. Acked items are evicted from the head strictly in
    /// order, which is what frees capacity for blocked admissions.
    ///
    /// 处理来自对端的确认。
    ///
    /// 对于干净（非重传）的确认，RTT样本会喂给估算器并重新调整准入上限；
    /// 重传确认则污染此条目及其后排队的所有条目，其样本到达时会被丢弃。
    /// 已确认条目严格按顺序从头部逐出，这正是为被阻塞的准入释放容量的机制。
    pub async fn ack(&self, seq: u64, retransmitted: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let first = match inner.queue.front() {
            Some(item) => item.seq,
            None => return Err(Error::MessageNotInWindow { seq }),
        };
        if seq < first {
            return Err(Error::MessageNotInWindow { seq });
        }
        let index = (seq - first) as usize;
        if index >= inner.queue.len() {
            return Err(Error::MessageNotInWindow { seq });
        }

        let item = &mut inner.queue[index];
        if item.acked {
            return Err(Error::AlreadyAcked { seq });
        }
        item.acked = true;
        let rtt = item.sent_at.elapsed();
        let item_tainted = item.retransmitted;

        if retransmitted {
            // The peer saw a retransmitted send; every later item may have
            // been reordered behind it, so none of their samples can be trusted.
            // 对端收到的是一次重传发送；其后的所有条目都可能被重排到它之后，
            // 因此它们的样本都不可信。
            for it in inner.queue.range_mut(index..) {
                it.retransmitted = true;
            }
            debug!(seq = seq, "ack for retransmitted send, RTT sample discarded");
        } else if item_tainted {
            debug!(seq = seq, "item was retransmitted locally, RTT sample discarded");
        } else {
            self.update_stats(&mut inner, seq, rtt);
        }

        let mut freed = 0usize;
        while inner.queue.front().is_some_and(|item| item.acked) {
            if let Some(item) = inner.queue.pop_front() {
                freed += item.msg.body.len();
            }
        }
        if freed > 0 {
            inner.size -= freed;
            trace!(freed = freed, in_flight = inner.size, "acked run evicted from window head");
            self.capacity_freed.notify_waiters();
        }
        Ok(())
    }

    /// Marks every unacknowledged item whose retransmission deadline has
    /// elapsed, pushes the deadline forward by the current RTO, and returns
    /// the stored messages for the caller to resend.
    ///
    /// 标记所有重传期限已过的未确认条目，将其期限按当前RTO顺延，
    /// 并返回存储的消息供调用者重新发送。
    pub async fn take_expired(&self) -> Vec<Message> {
        let mut inner = self.inner.lock().await;
        let rto = inner.stats.rto();
        let now = Instant::now();
        let mut expired = Vec::new();
        for item in inner
            .queue
            .iter_mut()
            .filter(|item| !item.acked && item.rto_at <= now)
        {
            item.retransmitted = true;
            item.rto_at = now + rto;
            debug!(seq = item.seq, "retransmission deadline elapsed");
            expired.push(item.msg.clone());
        }
        expired
    }

    /// Closes the window, releasing every blocked admission. Idempotent.
    /// 关闭窗口，释放所有被阻塞的准入。幂等。
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if !inner.closed {
            inner.closed = true;
            debug!(in_flight = inner.size, "window closed");
        }
        drop(inner);
        self.capacity_freed.notify_waiters();
    }

    /// Bytes currently in flight.
    /// 当前在途字节数。
    pub async fn in_flight_bytes(&self) -> usize {
        self.inner.lock().await.size
    }

    /// The current admission ceiling, in bytes.
    /// 当前准入上限（字节）。
    pub async fn capacity(&self) -> f64 {
        self.inner.lock().await.cap
    }

    fn update_stats(&self, inner: &mut WindowInner, seq: u64, rtt: std::time::Duration) {
        if inner.stats.is_initialized() {
            inner.stats.update(rtt);
        } else {
            inner.stats.init(rtt);
        }

        // During the bootstrap phase the baseline is refreshed on every ack;
        // afterwards only every base_rtt_interval-th sequence number.
        // 引导阶段每次确认都刷新基准；之后仅每 base_rtt_interval 个序号刷新一次。
        if seq < self.config.base_rtt_init_phase || seq % self.config.base_rtt_interval == 0 {
            inner.base_rtt = inner.stats.base_rtt();
        }

        if inner.base_rtt < inner.stats.srtt() - inner.stats.rttvar() {
            // The path shows queuing delay beyond the clean baseline.
            // 路径显示出超过干净基准的排队延迟。
            inner.cap = (inner.cap * self.config.downscale_factor).max(self.config.initial_cap);
            debug!(
                cap = inner.cap,
                base_rtt = inner.base_rtt,
                srtt = inner.stats.srtt(),
                "congestion detected, window capacity reduced"
            );
        } else {
            inner.cap = (inner.cap * self.config.upscale_factor).min(self.config.max_cap);
            trace!(cap = inner.cap, "window capacity increased");
        }
    }
}
