//! Restart trigger for a network that stays down.

use std::time::{Duration, Instant};

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogStatus {
    Healthy,
    /// Disconnected, but still within the timeout
    Waiting,
    Expired,
}

#[derive(Debug)]
pub struct ConnectivityWatchdog {
    timeout: Option<Duration>,
    last_connected: Instant,
    waiting: bool,
}

impl ConnectivityWatchdog {
    /// `timeout_secs <= 0` disables the watchdog.
    pub fn new(timeout_secs: i64, now: Instant) -> Self {
        let timeout = u64::try_from(timeout_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        match timeout {
            Some(timeout) => info!("Network timeout set to {:?}", timeout),
            None => info!("Network timeout disabled"),
        }
        Self {
            timeout,
            last_connected: now,
            waiting: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.timeout.is_some()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn check(&mut self, connected: bool, now: Instant) -> WatchdogStatus {
        if connected {
            self.last_connected = now;
            self.waiting = false;
            return WatchdogStatus::Healthy;
        }

        let Some(timeout) = self.timeout else {
            return WatchdogStatus::Waiting;
        };

        let down_for = now.saturating_duration_since(self.last_connected);
        if down_for > timeout {
            warn!("Network down for {:?}, giving up", down_for);
            return WatchdogStatus::Expired;
        }
        if !self.waiting {
            warn!("Network down, restarting in {:?}", timeout - down_for);
            self.waiting = true;
        }
        WatchdogStatus::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_timeout_without_link() {
        let t0 = Instant::now();
        let mut watchdog = ConnectivityWatchdog::new(60, t0);
        assert_eq!(watchdog.check(true, t0), WatchdogStatus::Healthy);
        assert_eq!(
            watchdog.check(false, t0 + Duration::from_secs(30)),
            WatchdogStatus::Waiting
        );
        assert_eq!(
            watchdog.check(false, t0 + Duration::from_secs(60)),
            WatchdogStatus::Waiting
        );
        assert_eq!(
            watchdog.check(false, t0 + Duration::from_secs(61)),
            WatchdogStatus::Expired
        );
    }

    #[test]
    fn reconnect_resets_the_clock() {
        let t0 = Instant::now();
        let mut watchdog = ConnectivityWatchdog::new(10, t0);
        watchdog.check(false, t0 + Duration::from_secs(9));
        assert_eq!(
            watchdog.check(true, t0 + Duration::from_secs(9)),
            WatchdogStatus::Healthy
        );
        assert_eq!(
            watchdog.check(false, t0 + Duration::from_secs(15)),
            WatchdogStatus::Waiting
        );
    }

    #[test]
    fn non_positive_timeout_disables() {
        let t0 = Instant::now();
        for secs in [0, -1] {
            let mut watchdog = ConnectivityWatchdog::new(secs, t0);
            assert!(!watchdog.is_enabled());
            assert_eq!(
                watchdog.check(false, t0 + Duration::from_secs(86_400)),
                WatchdogStatus::Waiting
            );
        }
    }
}
