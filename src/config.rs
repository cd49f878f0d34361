use std::time::Duration;

#[cfg(feature = "serde")]
use serde::Deserialize;

use sources::ProbationType;
use crate::transport::ReceiveMode;

/// Recognized session parameters (spec.md §6 "Session parameter
/// surface"), each with the documented default, following the same
/// per-field default-fn pattern as the teacher's `config::Turn`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct SessionParams {
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::max_packet_size"))]
    pub max_packet_size: usize,

    /// Units of the local RTP clock per second. No default: must be set
    /// by the caller (spec.md §6).
    pub own_timestamp_unit: u32,

    #[cfg_attr(feature = "serde", serde(default = "SessionParams::session_bandwidth"))]
    pub session_bandwidth: f64,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::control_traffic_fraction"))]
    pub control_traffic_fraction: f64,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::sender_control_bandwidth_fraction"))]
    pub sender_control_bandwidth_fraction: f64,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::min_rtcp_interval"))]
    pub min_rtcp_interval: Duration,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::use_half_at_startup"))]
    pub use_half_at_startup: bool,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::immediate_bye"))]
    pub immediate_bye: bool,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::sender_report_for_bye"))]
    pub sender_report_for_bye: bool,

    #[cfg_attr(feature = "serde", serde(default = "SessionParams::sender_timeout_multiplier"))]
    pub sender_timeout_multiplier: u32,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::source_timeout_multiplier"))]
    pub source_timeout_multiplier: u32,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::bye_timeout_multiplier"))]
    pub bye_timeout_multiplier: u32,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::collision_timeout_multiplier"))]
    pub collision_timeout_multiplier: u32,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::note_timeout_multiplier"))]
    pub note_timeout_multiplier: u32,

    #[cfg_attr(feature = "serde", serde(default))]
    pub receive_mode: ReceiveMode,
    #[cfg_attr(feature = "serde", serde(default))]
    pub accept_own_packets: bool,

    #[cfg_attr(feature = "serde", serde(default))]
    pub probation_type: ProbationType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub resolve_local_hostname: bool,

    #[cfg_attr(feature = "serde", serde(default))]
    pub use_predefined_ssrc: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub predefined_ssrc: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub cname: Option<String>,

    #[cfg_attr(feature = "serde", serde(default = "SessionParams::use_poll_thread"))]
    pub use_poll_thread: bool,
    #[cfg_attr(feature = "serde", serde(default = "SessionParams::need_thread_safety"))]
    pub need_thread_safety: bool,
}

impl SessionParams {
    fn max_packet_size() -> usize {
        1400
    }
    fn session_bandwidth() -> f64 {
        10_000.0
    }
    fn control_traffic_fraction() -> f64 {
        0.05
    }
    fn sender_control_bandwidth_fraction() -> f64 {
        0.25
    }
    fn min_rtcp_interval() -> Duration {
        Duration::from_secs(5)
    }
    fn use_half_at_startup() -> bool {
        true
    }
    fn immediate_bye() -> bool {
        true
    }
    fn sender_report_for_bye() -> bool {
        true
    }
    fn sender_timeout_multiplier() -> u32 {
        2
    }
    fn source_timeout_multiplier() -> u32 {
        5
    }
    fn bye_timeout_multiplier() -> u32 {
        1
    }
    fn collision_timeout_multiplier() -> u32 {
        10
    }
    fn note_timeout_multiplier() -> u32 {
        25
    }
    // threading is always available (std::thread); both default true.
    fn use_poll_thread() -> bool {
        true
    }
    fn need_thread_safety() -> bool {
        true
    }
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            max_packet_size: Self::max_packet_size(),
            own_timestamp_unit: 8000,
            session_bandwidth: Self::session_bandwidth(),
            control_traffic_fraction: Self::control_traffic_fraction(),
            sender_control_bandwidth_fraction: Self::sender_control_bandwidth_fraction(),
            min_rtcp_interval: Self::min_rtcp_interval(),
            use_half_at_startup: Self::use_half_at_startup(),
            immediate_bye: Self::immediate_bye(),
            sender_report_for_bye: Self::sender_report_for_bye(),
            sender_timeout_multiplier: Self::sender_timeout_multiplier(),
            source_timeout_multiplier: Self::source_timeout_multiplier(),
            bye_timeout_multiplier: Self::bye_timeout_multiplier(),
            collision_timeout_multiplier: Self::collision_timeout_multiplier(),
            note_timeout_multiplier: Self::note_timeout_multiplier(),
            receive_mode: ReceiveMode::default(),
            accept_own_packets: false,
            probation_type: ProbationType::default(),
            resolve_local_hostname: false,
            use_predefined_ssrc: false,
            predefined_ssrc: 0,
            cname: None,
            use_poll_thread: Self::use_poll_thread(),
            need_thread_safety: Self::need_thread_safety(),
        }
    }
}
