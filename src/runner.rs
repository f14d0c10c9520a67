//! Retry loop around [`Probe::exchange`].
use std::io::Write;
use std::time::Duration;

use crate::config::Schedule;
use crate::error::Result;
use crate::probe::Probe;

/// Attempt counts from a bounded run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Exchanges that completed.
    pub succeeded: u64,
    /// Exchanges that failed before or during the handshake or request.
    pub failed: u64,
}

impl RunSummary {
    /// Total attempts made.
    pub fn attempts(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Drives a probe according to its schedule.
pub struct Runner {
    probe: Probe,
}

impl Runner {
    /// Wrap a configured probe.
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }

    /// Run with real sleeps. Returns only once the schedule is exhausted.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<RunSummary> {
        self.run_with(out, std::thread::sleep)
    }

    /// Run, pausing through `sleep`. A single-shot schedule propagates the
    /// exchange error; a looping one logs it and tries again.
    pub fn run_with<W, S>(&self, out: &mut W, mut sleep: S) -> Result<RunSummary>
    where
        W: Write,
        S: FnMut(Duration),
    {
        let mut summary = RunSummary::default();
        let (interval, max_attempts) = match self.probe.config().schedule {
            Schedule::Once => {
                self.probe.exchange(out)?;
                summary.succeeded = 1;
                return Ok(summary);
            }
            Schedule::Every {
                interval,
                max_attempts,
            } => (interval, max_attempts),
        };

        loop {
            match self.probe.exchange(out) {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    log::warn!("attempt {} failed: {e}", summary.attempts());
                }
            }
            if max_attempts.is_some_and(|max| summary.attempts() >= max) {
                return Ok(summary);
            }
            log::debug!("sleeping {interval:?} before reconnecting");
            sleep(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Profile, ProbeConfig};
    use crate::error::Error;

    fn unreachable_config(schedule: Schedule) -> ProbeConfig {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = ProbeConfig::from_profile(Profile::KeyLog, ([127, 0, 0, 1], port).into());
        config.tls.key_log = None;
        config.schedule = schedule;
        config
    }

    #[test]
    fn loop_sleeps_fixed_interval_between_attempts() {
        let config = unreachable_config(Schedule::Every {
            interval: Duration::from_secs(1),
            max_attempts: Some(3),
        });
        let runner = Runner::new(Probe::new(config).unwrap());

        let mut sleeps = Vec::new();
        let summary = runner
            .run_with(&mut Vec::<u8>::new(), |d| sleeps.push(d))
            .unwrap();

        assert_eq!(summary, RunSummary { succeeded: 0, failed: 3 });
        assert_eq!(sleeps, vec![Duration::from_secs(1); 2]);
    }

    #[test]
    fn single_shot_propagates_failure() {
        let runner = Runner::new(Probe::new(unreachable_config(Schedule::Once)).unwrap());
        let mut slept = false;
        let result = runner.run_with(&mut Vec::<u8>::new(), |_| slept = true);
        assert!(matches!(result, Err(Error::Connect { .. })));
        assert!(!slept);
    }
}
