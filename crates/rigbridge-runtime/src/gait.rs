//! Crawl gait generator.
//!
//! [`CrawlGait`] is a pure step machine driving one hip/knee pair (channels 0
//! and 1) through a stride; channels 2 and 3 stay at zero.  [`run_crawl`]
//! plays it against a [`DeviceSink`] at a fixed tick.
//!
//! | Phase | Per tick | Leaves when |
//! |---|---|---|
//! | [`ExtendHip`](CrawlPhase::ExtendHip) | hip += 64 | hip ≥ 4095 |
//! | [`ExtendKnee`](CrawlPhase::ExtendKnee) | knee += 64 | knee ≥ 1536 |
//! | [`Sweep`](CrawlPhase::Sweep) | hip -= 128, knee += 64 | hip ≤ 0 or knee ≥ 4095 |
//! | [`RetractKnee`](CrawlPhase::RetractKnee) | knee -= 128 | knee ≤ 0 (that tick is not sent) |
//!
//! Positions are tracked unclamped and clamped to the 12-bit field only when
//! a command is built.

use std::time::Duration;

use rigbridge_middleware::DeviceSink;
use rigbridge_protocol::DeviceCommand;
use rigbridge_types::{CHANNEL_COUNT, FIELD_MAX, TargetMode, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Step sizes and bounds of a crawl stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlParams {
    pub hip_step: i32,
    pub knee_step: i32,
    /// Used for the hip in the sweep and for the knee on retraction.
    pub retract_step: i32,
    pub hip_limit: i32,
    /// Knee height at which the hip starts sweeping back.
    pub knee_lift: i32,
    pub knee_limit: i32,
}

impl Default for CrawlParams {
    fn default() -> Self {
        Self {
            hip_step: 64,
            knee_step: 64,
            retract_step: 128,
            hip_limit: i32::from(FIELD_MAX),
            knee_lift: 1536,
            knee_limit: i32::from(FIELD_MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    ExtendHip,
    ExtendKnee,
    Sweep,
    RetractKnee,
    Done,
}

/// One crawl stride in progress.
#[derive(Debug, Clone)]
pub struct CrawlGait {
    phase: CrawlPhase,
    hip: i32,
    knee: i32,
    params: CrawlParams,
}

impl Default for CrawlGait {
    fn default() -> Self {
        Self::with_params(CrawlParams::default())
    }
}

impl CrawlGait {
    /// Start a stride from hip = knee = 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps below 1 are raised to 1 so every phase terminates.
    pub fn with_params(mut params: CrawlParams) -> Self {
        params.hip_step = params.hip_step.max(1);
        params.knee_step = params.knee_step.max(1);
        params.retract_step = params.retract_step.max(1);
        Self {
            phase: CrawlPhase::ExtendHip,
            hip: 0,
            knee: 0,
            params,
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn hip(&self) -> i32 {
        self.hip
    }

    pub fn knee(&self) -> i32 {
        self.knee
    }

    /// Advance one tick.
    ///
    /// Returns the four channel values to send, or `None` once the stride is
    /// over.
    pub fn step(&mut self) -> Option<[u16; CHANNEL_COUNT]> {
        let p = self.params;
        match self.phase {
            CrawlPhase::ExtendHip => {
                self.hip += p.hip_step;
                if self.hip >= p.hip_limit {
                    self.phase = CrawlPhase::ExtendKnee;
                }
            }
            CrawlPhase::ExtendKnee => {
                self.knee += p.knee_step;
                if self.knee >= p.knee_lift {
                    self.phase = CrawlPhase::Sweep;
                }
            }
            CrawlPhase::Sweep => {
                self.hip -= p.retract_step;
                self.knee += p.knee_step;
                if self.hip <= 0 || self.knee >= p.knee_limit {
                    self.phase = CrawlPhase::RetractKnee;
                }
            }
            CrawlPhase::RetractKnee => {
                self.knee -= p.retract_step;
                if self.knee <= 0 {
                    self.phase = CrawlPhase::Done;
                    return None;
                }
            }
            CrawlPhase::Done => return None,
        }
        Some([clamp(self.hip), clamp(self.knee), 0, 0])
    }
}

impl Iterator for CrawlGait {
    type Item = [u16; CHANNEL_COUNT];

    fn next(&mut self) -> Option<Self::Item> {
        self.step()
    }
}

fn clamp(position: i32) -> u16 {
    position.clamp(0, i32::from(FIELD_MAX)) as u16
}

/// How a gait sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaitOutcome {
    Completed { ticks: u32 },
    /// Cancelled; the rig was sent home.
    Aborted { ticks: u32 },
}

/// Play `gait` against `sink`, one command-mode word per `tick`.
///
/// On cancellation the sequence stops before its next word and the home
/// word is sent instead.
pub async fn run_crawl(
    mut gait: CrawlGait,
    sink: &dyn DeviceSink,
    tick: Duration,
    cancel: &CancellationToken,
) -> Result<GaitOutcome, TransportError> {
    let mut ticks = 0u32;
    while let Some(values) = gait.step() {
        if cancel.is_cancelled() {
            return abort(sink, ticks).await;
        }
        sink.transmit(&DeviceCommand::SetTargets {
            mode: TargetMode::Command,
            values,
        })
        .await?;
        ticks += 1;
        debug!(tick = ticks, phase = ?gait.phase(), hip = gait.hip(), knee = gait.knee(), "crawl tick");

        tokio::select! {
            biased;
            () = cancel.cancelled() => return abort(sink, ticks).await,
            () = tokio::time::sleep(tick) => {}
        }
    }
    info!(ticks, "crawl sequence complete");
    Ok(GaitOutcome::Completed { ticks })
}

async fn abort(sink: &dyn DeviceSink, ticks: u32) -> Result<GaitOutcome, TransportError> {
    sink.transmit(&DeviceCommand::home()).await?;
    warn!(ticks, "crawl sequence aborted, rig sent home");
    Ok(GaitOutcome::Aborted { ticks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[test]
    fn crawl_terminates_after_fixed_tick_count() {
        let mut gait = CrawlGait::new();
        let sent: Vec<_> = gait.by_ref().collect();
        // 64 hip ticks, 24 knee ticks, 32 sweep ticks, 27 retract ticks.
        assert_eq!(sent.len(), 147);
        assert_eq!(gait.phase(), CrawlPhase::Done);
        assert_eq!(gait.step(), None);
    }

    #[test]
    fn phases_run_in_order() {
        let mut gait = CrawlGait::new();
        let mut seen = vec![gait.phase()];
        while gait.step().is_some() {
            if seen.last() != Some(&gait.phase()) {
                seen.push(gait.phase());
            }
        }
        seen.push(gait.phase());
        assert_eq!(
            seen,
            vec![
                CrawlPhase::ExtendHip,
                CrawlPhase::ExtendKnee,
                CrawlPhase::Sweep,
                CrawlPhase::RetractKnee,
                CrawlPhase::Done,
            ]
        );
    }

    #[test]
    fn commands_are_clamped_to_field_width() {
        let sent: Vec<_> = CrawlGait::new().collect();
        assert_eq!(sent[0], [64, 0, 0, 0]);
        // The last hip tick overshoots to 4096 internally.
        assert_eq!(sent[63], [4095, 0, 0, 0]);
        assert_eq!(sent[64], [4095, 64, 0, 0]);
        assert!(sent.iter().all(|v| v.iter().all(|&x| x <= FIELD_MAX)));
        assert!(sent.iter().all(|v| v[2] == 0 && v[3] == 0));
        assert_eq!(sent.last(), Some(&[0, 128, 0, 0]));
    }

    #[test]
    fn zero_steps_still_terminate() {
        let params = CrawlParams {
            hip_step: 0,
            knee_step: -5,
            retract_step: 0,
            hip_limit: 8,
            knee_lift: 4,
            knee_limit: 8,
        };
        let ticks = CrawlGait::with_params(params).count();
        assert!(ticks > 0 && ticks < 64, "got {ticks} ticks");
    }

    #[tokio::test(start_paused = true)]
    async fn run_crawl_sends_every_tick_in_command_mode() -> Result<(), Box<dyn std::error::Error>> {
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        let outcome =
            run_crawl(CrawlGait::new(), &sink, Duration::from_millis(300), &cancel).await?;
        assert_eq!(outcome, GaitOutcome::Completed { ticks: 147 });

        let sent = sink.sent();
        assert_eq!(sent.len(), 147);
        assert!(sent.iter().all(|cmd| matches!(
            cmd,
            DeviceCommand::SetTargets { mode: TargetMode::Command, .. }
        )));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_sends_home() -> Result<(), Box<dyn std::error::Error>> {
        let sink = std::sync::Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();

        let task = {
            let sink = sink.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_crawl(CrawlGait::new(), sink.as_ref(), Duration::from_millis(300), &cancel).await
            })
        };
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        cancel.cancel();

        let outcome = task.await??;
        let GaitOutcome::Aborted { ticks } = outcome else {
            panic!("expected an aborted sequence, got {outcome:?}");
        };
        assert!((1..147).contains(&ticks));

        let sent = sink.sent();
        assert_eq!(sent.len() as u32, ticks + 1);
        assert_eq!(sent.last(), Some(&DeviceCommand::home()));
        Ok(())
    }

    #[tokio::test]
    async fn transport_failure_ends_the_sequence() {
        let sink = RecordingSink::disconnected();
        let cancel = CancellationToken::new();
        let result = run_crawl(CrawlGait::new(), &sink, Duration::from_millis(1), &cancel).await;
        assert!(matches!(result, Err(TransportError::Disconnected(_))));
    }
}
