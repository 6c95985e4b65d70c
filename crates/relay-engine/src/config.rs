//! Relay configuration.

use relay_feed::FileFeedConfig;
use relay_transport::{RtmpConfig, TcpSinkConfig, UdpSinkConfig};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_FAILURE_ALARM_THRESHOLD, DEFAULT_METRICS_INTERVAL_MS};

/// Everything tunable about a relay, grouped per component.
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// UDP sink settings.
    pub udp: UdpSinkConfig,

    /// TCP sink settings.
    pub tcp: TcpSinkConfig,

    /// RTMP module settings.
    pub rtmp: RtmpConfig,

    /// File feed pacing.
    pub feed: FileFeedConfig,

    /// Back-to-back send failures before a warning is raised.
    pub failure_alarm_threshold: u64,

    /// Interval between metrics events while active, in milliseconds.
    pub metrics_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            udp: UdpSinkConfig::default(),
            tcp: TcpSinkConfig::default(),
            rtmp: RtmpConfig::default(),
            feed: FileFeedConfig::default(),
            failure_alarm_threshold: DEFAULT_FAILURE_ALARM_THRESHOLD,
            metrics_interval_ms: DEFAULT_METRICS_INTERVAL_MS,
        }
    }
}
