//! Synchronized capture scheduling.
//!
//! With a delay, every server receives the same absolute UTC trigger time.
//! That only yields simultaneous frames if the servers' clocks already agree;
//! nothing here measures or corrects clock offsets. Use
//! [`SkewReport`](crate::skew::SkewReport) on a status round to check.

use std::time::Duration;

use camfleet_core::{Error, Result, ServerAddress};
use camfleet_net::{DispatchOptions, FleetResult, ProtocolEngine};
use camfleet_protocol::{Command, Reply};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

pub struct CaptureScheduler<'a> {
    engine: &'a ProtocolEngine,
}

impl<'a> CaptureScheduler<'a> {
    pub fn new(engine: &'a ProtocolEngine) -> Self {
        Self { engine }
    }

    /// Build the capture command for a batch requested at `now`.
    ///
    /// `delay` is in seconds; without it the capture runs immediately and
    /// unsynchronized on each server.
    pub fn plan(
        count: u32,
        video_port: bool,
        delay: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Command> {
        let at = match delay {
            None => None,
            Some(delay) => {
                let offset = Duration::try_from_secs_f64(delay)
                    .ok()
                    .and_then(|d| TimeDelta::from_std(d).ok())
                    .ok_or_else(|| {
                        Error::Validation(format!(
                            "capture delay must be a non-negative number of seconds, got {delay}"
                        ))
                    })?;
                let at = now.checked_add_signed(offset).ok_or_else(|| {
                    Error::Validation(format!("capture delay {delay}s is out of range"))
                })?;
                Some(at)
            }
        };
        let command = Command::Capture {
            count,
            video_port,
            at,
        };
        command.validate()?;
        Ok(command)
    }

    /// Trigger a capture batch on every target. Outcomes are acks only; the
    /// images are fetched later through listing and download.
    ///
    /// The trigger time is taken when the round gets the command socket, so
    /// waiting behind another round never shortens the delay.
    pub async fn capture(
        &self,
        targets: &[ServerAddress],
        count: u32,
        video_port: bool,
        delay: Option<f64>,
    ) -> Result<FleetResult<()>> {
        Self::plan(count, video_port, delay, Utc::now())?;

        let build = || -> Result<Command> {
            let command = Self::plan(count, video_port, delay, Utc::now())?;
            if let Command::Capture { at: Some(at), .. } = &command {
                info!(
                    "Scheduling {} capture(s) on {} servers at {}",
                    count,
                    targets.len(),
                    at.to_rfc3339()
                );
            }
            Ok(command)
        };
        let result = self
            .engine
            .dispatch_with(targets, build, DispatchOptions::default())
            .await?;
        Ok(result.and_then(Reply::into_ack))
    }
}
