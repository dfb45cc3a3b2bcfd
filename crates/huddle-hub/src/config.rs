//! Per-connection configuration: queue depth, keepalive, and limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Configuration applied to every connection adapter.
///
/// The keepalive contract: the read loop gives the peer `read_timeout`
/// to answer with a pong, and the write loop pings every
/// `ping_interval`, which must stay strictly below `read_timeout` so a
/// healthy idle peer always gets pinged before its deadline lapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Capacity of the outbound queue. A full queue gets the connection
    /// evicted as a slow consumer.
    pub outbound_capacity: usize,

    /// How long the read loop waits for the next pong.
    pub read_timeout: Duration,

    /// How often the write loop sends a ping.
    pub ping_interval: Duration,

    /// Deadline for writing a single frame, pings included.
    pub write_timeout: Duration,

    /// Largest inbound frame accepted, in bytes.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::with_read_timeout(Self::DEFAULT_READ_TIMEOUT)
    }
}

impl ClientConfig {
    pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_MAX_FRAME_SIZE: usize = 4096;
    /// Shortest read timeout `validated` accepts.
    pub const MIN_READ_TIMEOUT: Duration = Duration::from_millis(10);
    /// Shortest ping interval `validated` accepts.
    pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);
    /// Longest read timeout `validated` accepts.
    pub const MAX_READ_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

    /// Creates a config with the given read timeout and a ping interval
    /// of 9/10 of it. Everything else is defaulted.
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        Self {
            outbound_capacity: Self::DEFAULT_OUTBOUND_CAPACITY,
            read_timeout,
            ping_interval: ping_interval_for(read_timeout),
            write_timeout: Self::DEFAULT_WRITE_TIMEOUT,
            max_frame_size: Self::DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Fixes out-of-range values so the config is safe to run with.
    ///
    /// - zero durations and sizes fall back to their defaults
    /// - `read_timeout` is kept within
    ///   [`MIN_READ_TIMEOUT`](Self::MIN_READ_TIMEOUT)..=[`MAX_READ_TIMEOUT`](Self::MAX_READ_TIMEOUT)
    /// - `ping_interval` is at least
    ///   [`MIN_PING_INTERVAL`](Self::MIN_PING_INTERVAL) and strictly
    ///   below `read_timeout`
    pub fn validated(mut self) -> Self {
        if self.outbound_capacity == 0 {
            tracing::warn!("outbound_capacity of 0 is unusable, using 1");
            self.outbound_capacity = 1;
        }
        if self.read_timeout.is_zero() {
            tracing::warn!("read_timeout of 0, using default");
            self.read_timeout = Self::DEFAULT_READ_TIMEOUT;
        }
        let clamped = self
            .read_timeout
            .clamp(Self::MIN_READ_TIMEOUT, Self::MAX_READ_TIMEOUT);
        if clamped != self.read_timeout {
            tracing::warn!(
                read_timeout = ?self.read_timeout,
                ?clamped,
                "read_timeout out of range, clamping"
            );
            self.read_timeout = clamped;
        }
        if self.ping_interval < Self::MIN_PING_INTERVAL
            || self.ping_interval >= self.read_timeout
        {
            let adjusted = ping_interval_for(self.read_timeout);
            tracing::warn!(
                ping_interval = ?self.ping_interval,
                read_timeout = ?self.read_timeout,
                ?adjusted,
                "ping_interval must be below read_timeout, adjusting"
            );
            self.ping_interval = adjusted;
        }
        if self.write_timeout.is_zero() {
            tracing::warn!("write_timeout of 0, using default");
            self.write_timeout = Self::DEFAULT_WRITE_TIMEOUT;
        }
        if self.max_frame_size == 0 {
            tracing::warn!("max_frame_size of 0, using default");
            self.max_frame_size = Self::DEFAULT_MAX_FRAME_SIZE;
        }
        self
    }
}

fn ping_interval_for(read_timeout: Duration) -> Duration {
    // Divide first: `Duration * 9` panics on overflow.
    read_timeout / 10 * 9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let config = ClientConfig::default();
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.read_timeout, Duration::from_secs(60));
        assert_eq!(config.ping_interval, Duration::from_secs(54));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_with_read_timeout_derives_ping_interval() {
        let config = ClientConfig::with_read_timeout(Duration::from_secs(10));
        assert_eq!(config.ping_interval, Duration::from_secs(9));
    }

    #[test]
    fn test_validated_keeps_sane_config() {
        let config = ClientConfig::default();
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn test_validated_pulls_ping_below_read_timeout() {
        let config = ClientConfig {
            ping_interval: Duration::from_secs(90),
            ..ClientConfig::default()
        }
        .validated();
        assert!(config.ping_interval < config.read_timeout);
        assert_eq!(config.ping_interval, Duration::from_secs(54));
    }

    #[test]
    fn test_validated_replaces_zero_values() {
        let config = ClientConfig {
            outbound_capacity: 0,
            read_timeout: Duration::ZERO,
            ping_interval: Duration::ZERO,
            write_timeout: Duration::ZERO,
            max_frame_size: 0,
        }
        .validated();
        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.read_timeout, ClientConfig::DEFAULT_READ_TIMEOUT);
        assert_eq!(config.ping_interval, Duration::from_secs(54));
        assert_eq!(config.write_timeout, ClientConfig::DEFAULT_WRITE_TIMEOUT);
        assert_eq!(config.max_frame_size, ClientConfig::DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_validated_never_yields_zero_ping_interval() {
        let config = ClientConfig::with_read_timeout(Duration::from_nanos(5))
            .validated();
        assert_eq!(config.read_timeout, ClientConfig::MIN_READ_TIMEOUT);
        assert!(!config.ping_interval.is_zero());
        assert!(config.ping_interval < config.read_timeout);
    }

    #[test]
    fn test_validated_raises_sub_millisecond_ping_interval() {
        let config = ClientConfig {
            ping_interval: Duration::from_nanos(1),
            ..ClientConfig::default()
        }
        .validated();
        assert_eq!(config.ping_interval, Duration::from_secs(54));
    }

    #[test]
    fn test_huge_read_timeout_does_not_overflow() {
        let config = ClientConfig::with_read_timeout(Duration::MAX).validated();
        assert_eq!(config.read_timeout, ClientConfig::MAX_READ_TIMEOUT);
        assert!(config.ping_interval < config.read_timeout);
        // The read loop adds the timeout to `Instant::now()`.
        assert!(
            tokio::time::Instant::now()
                .checked_add(config.read_timeout)
                .is_some()
        );
    }

    #[test]
    fn test_config_deserializes_from_json() {
        let json = serde_json::to_string(&ClientConfig::default()).unwrap();
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ClientConfig::default());
    }
}
