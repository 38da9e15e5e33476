//! An estimator for the round-trip time (RTT) and its no-congestion baseline.
//! RTT 估算器及其无拥塞基准。

use crate::config::WindowConfig;
use std::collections::VecDeque;
use std::time::Duration;

/// An estimator for the round-trip time, based on RFC 6298, extended with a
/// bounded history of recent samples whose minimum serves as the "base RTT":
/// an estimate of the RTT under no queuing delay.
///
/// 一个基于 RFC 6298 的 RTT 估算器，扩展了一个有界的最近样本历史，
/// 其最小值作为"基准RTT"：无排队延迟情况下的RTT估计。
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// The smoothed round-trip time, in seconds.
    /// 平滑的往返时间（秒）。
    srtt: f64,
    /// The round-trip time variation, in seconds.
    /// 往返时间变化量（秒）。
    rttvar: f64,
    /// The retransmission timeout.
    /// 重传超时时间。
    rto: Duration,
    /// Recent RTT samples, in seconds, oldest first.
    /// 最近的RTT样本（秒），最旧的在前。
    samples: VecDeque<f64>,
    initialized: bool,
    min_rto: Duration,
    rtt_factor: f64,
    alpha: f64,
    beta: f64,
    hist_size: usize,
}

impl RttEstimator {
    /// Creates an uninitialized estimator. Until the first sample arrives the
    /// RTO is the configured initial RTO.
    ///
    /// 创建一个未初始化的估算器。在第一个样本到来之前，RTO为配置的初始RTO。
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            srtt: 0.0,
            rttvar: 0.0,
            rto: config.initial_rto,
            samples: VecDeque::with_capacity(config.rtt_hist_size),
            initialized: false,
            min_rto: config.min_rto,
            rtt_factor: config.rtt_factor,
            alpha: config.ewma_alpha,
            beta: config.ewma_beta,
            hist_size: config.rtt_hist_size,
        }
    }

    /// Whether the estimator has seen its first sample.
    /// 估算器是否已经收到第一个样本。
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Seeds the estimator with its first sample.
    /// 用第一个样本初始化估算器。
    pub fn init(&mut self, sample: Duration) {
        let s = sample.as_secs_f64();
        self.srtt = s;
        self.rttvar = s / 2.0;
        self.initialized = true;
        self.push_sample(s);
        self.recompute_rto();
    }

    /// Updates the estimator with a subsequent sample.
    /// 用后续样本更新估算器。
    pub fn update(&mut self, sample: Duration) {
        if !self.initialized {
            self.init(sample);
            return;
        }
        let s = sample.as_secs_f64();
        // RTTVAR must be updated before SRTT, as it measures against the old SRTT.
        // RTTVAR必须在SRTT之前更新，因为它是相对旧的SRTT度量的。
        self.rttvar = (1.0 - self.beta) * self.rttvar + self.beta * (self.srtt - s).abs();
        self.srtt = (1.0 - self.alpha) * self.srtt + self.alpha * s;
        self.push_sample(s);
        self.recompute_rto();
    }

    /// The minimum of the recent sample history, in seconds. Zero until the
    /// first sample has been recorded.
    ///
    /// 最近样本历史的最小值（秒）。在记录第一个样本之前为零。
    pub fn base_rtt(&self) -> f64 {
        let min = self.samples.iter().copied().fold(f64::INFINITY, f64::min);
        if min.is_finite() { min } else { 0.0 }
    }

    /// The smoothed round-trip time, in seconds.
    /// 平滑往返时间（秒）。
    pub fn srtt(&self) -> f64 {
        self.srtt
    }

    /// The round-trip time variation, in seconds.
    /// 往返时间变化量（秒）。
    pub fn rttvar(&self) -> f64 {
        self.rttvar
    }

    /// Returns the current RTO value.
    /// 返回当前的 RTO 值。
    pub fn rto(&self) -> Duration {
        self.rto
    }

    fn push_sample(&mut self, sample: f64) {
        if self.samples.len() == self.hist_size {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn recompute_rto(&mut self) {
        let rto = self.srtt + self.rtt_factor * self.rttvar;
        self.rto = Duration::from_secs_f64(rto).max(self.min_rto);
    }
}
