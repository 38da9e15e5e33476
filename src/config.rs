//! 定义了连接和协议的可配置参数。
//! Defines configurable parameters for connections and the protocol.

use std::time::Duration;

/// A structure containing all configurable parameters for a connection.
///
/// 包含所有连接可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// Flow/congestion window parameters.
    /// 流量/拥塞窗口参数。
    pub window: WindowConfig,

    /// Connection lifecycle parameters.
    /// 连接生命周期参数。
    pub connection: ConnectionConfig,
}

/// Flow/congestion window parameters.
///
/// 流量/拥塞窗口参数。
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// The initial admission ceiling of the window, in bytes. The ceiling
    /// never shrinks below this value.
    /// 窗口的初始准入上限（字节）。上限永远不会收缩到该值以下。
    pub initial_cap: f64,
    /// The maximum admission ceiling of the window, in bytes.
    /// 窗口的最大准入上限（字节）。
    pub max_cap: f64,
    /// The minimum RTO value. The RTO will not be allowed to fall below this.
    /// 最小RTO值。RTO不允许低于此值。
    pub min_rto: Duration,
    /// The retransmission timeout before any RTT sample has been observed.
    /// 在观察到任何RTT样本之前使用的重传超时。
    pub initial_rto: Duration,
    /// The variance multiplier in the RTO formula `SRTT + factor * RTTVAR`.
    /// RTO公式 `SRTT + factor * RTTVAR` 中的方差系数。
    pub rtt_factor: f64,
    /// EWMA smoothing factor for SRTT.
    /// SRTT的EWMA平滑系数。
    pub ewma_alpha: f64,
    /// EWMA smoothing factor for RTTVAR.
    /// RTTVAR的EWMA平滑系数。
    pub ewma_beta: f64,
    /// The factor applied to the ceiling when queuing delay is detected.
    /// 检测到排队延迟时应用于上限的系数。
    pub downscale_factor: f64,
    /// The factor applied to the ceiling when the path shows no queuing delay.
    /// 路径未显示排队延迟时应用于上限的系数。
    pub upscale_factor: f64,
    /// The number of recent RTT samples kept for the base-RTT minimum.
    /// 为计算基准RTT最小值而保留的最近RTT样本数。
    pub rtt_hist_size: usize,
    /// How often (in sequence numbers) the base RTT is refreshed once the
    /// bootstrap phase is over.
    /// 引导阶段结束后，基准RTT的刷新频率（以序号计）。
    pub base_rtt_interval: u64,
    /// The number of leading sequence numbers during which the base RTT is
    /// refreshed on every acknowledgment.
    /// 引导阶段的序号数量，在此期间每次确认都会刷新基准RTT。
    pub base_rtt_init_phase: u64,
}

/// Connection lifecycle parameters.
///
/// 连接生命周期参数。
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// The interval at which connection-accept and connection-ready messages
    /// are re-sent until the peer confirms.
    /// 在对端确认之前，connection-accept 和 connection-ready 消息的重发间隔。
    pub resend_interval: Duration,
    /// The interval at which the connection checks the window for items whose
    /// retransmission deadline has elapsed.
    /// 连接检查窗口中重传期限已过条目的间隔。
    pub retransmit_interval: Duration,
    /// The read chunk size of the local bridge, in bytes.
    /// 本地桥接读取块的大小（字节）。
    pub read_chunk_size: usize,
    /// The capacity of the per-connection internal channels.
    /// 每个连接内部通道的容量。
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            initial_cap: 4096.0,
            max_cap: 1024.0 * 1024.0,
            min_rto: Duration::from_micros(5_000),
            initial_rto: Duration::from_micros(300_000),
            rtt_factor: 4.0,
            ewma_alpha: 0.125,
            ewma_beta: 0.25,
            downscale_factor: 0.5,
            upscale_factor: 1.5,
            rtt_hist_size: 100,
            base_rtt_interval: 100,
            base_rtt_init_phase: 50,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_millis(1000),
            retransmit_interval: Duration::from_millis(100),
            read_chunk_size: 4096,
            channel_capacity: 128,
        }
    }
}
