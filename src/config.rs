use std::time::Duration;

/// Preset tuning for a [`Client`](crate::Client).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientProfile {
    #[default]
    Standard,
    LowLatency,
    HighThroughput,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileDefaults {
    /// Bound on one transport attempt, up to the response head.
    pub attempt_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Largest body a content-encoding decode may produce.
    pub max_decoded_body_bytes: usize,
}

impl ClientProfile {
    pub fn defaults(self) -> ProfileDefaults {
        match self {
            Self::Standard => ProfileDefaults {
                attempt_timeout: Duration::from_secs(120),
                connect_timeout: Duration::from_secs(10),
                pool_idle_timeout: Duration::from_secs(90),
                pool_max_idle_per_host: 8,
                max_decoded_body_bytes: 8 * 1024 * 1024,
            },
            Self::LowLatency => ProfileDefaults {
                attempt_timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(2),
                pool_idle_timeout: Duration::from_secs(30),
                pool_max_idle_per_host: 16,
                max_decoded_body_bytes: 2 * 1024 * 1024,
            },
            Self::HighThroughput => ProfileDefaults {
                attempt_timeout: Duration::from_secs(60),
                connect_timeout: Duration::from_secs(10),
                pool_idle_timeout: Duration::from_secs(120),
                pool_max_idle_per_host: 64,
                max_decoded_body_bytes: 32 * 1024 * 1024,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ClientProfile;

    #[test]
    fn standard_profile_is_default() {
        let defaults = ClientProfile::default().defaults();
        assert_eq!(defaults.attempt_timeout, Duration::from_secs(120));
        assert_eq!(defaults, ClientProfile::Standard.defaults());
    }

    #[test]
    fn low_latency_is_tighter_than_high_throughput() {
        let low = ClientProfile::LowLatency.defaults();
        let high = ClientProfile::HighThroughput.defaults();
        assert!(low.attempt_timeout < high.attempt_timeout);
        assert!(low.connect_timeout <= high.connect_timeout);
        assert!(low.max_decoded_body_bytes < high.max_decoded_body_bytes);
    }
}
