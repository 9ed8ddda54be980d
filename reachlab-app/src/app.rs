use std::time::Duration;

use anyhow::{bail, Result};
use reachlab_experiment::{SessionRunner, SessionSummary, TrialEvent};
use reachlab_timing::Timer;
use tracing::{debug, info, trace, warn, Level};

use crate::source::FrameSource;

/// Fixed-step drive loop: pulls device frames from the source, ticks the
/// session and sleeps out the rest of the tick on `timer`.
pub struct App<T: Timer<Timestamp = u64>> {
    runner: SessionRunner,
    timer: T,
    source: Box<dyn FrameSource>,
    tick: Duration,
    max_session: Duration,
}

impl<T: Timer<Timestamp = u64>> App<T> {
    pub fn new(
        runner: SessionRunner,
        timer: T,
        source: Box<dyn FrameSource>,
        tick_hz: f64,
        max_session: Duration,
    ) -> Self {
        Self {
            runner,
            timer,
            source,
            tick: Duration::from_secs_f64(1.0 / tick_hz.max(1.0)),
            max_session,
        }
    }

    pub fn run(&mut self) -> Result<SessionSummary> {
        let (_, total) = self.runner.sequencer().progress();
        info!(
            trials = total,
            tick_ms = self.tick.as_secs_f64() * 1000.0,
            platform = std::env::consts::OS,
            "session starting"
        );

        loop {
            let frame_start = self.timer.now();
            let now_s = self.timer.now_secs();

            for frame in self.source.poll(now_s) {
                self.runner.on_device_frame(&frame);
            }
            let events = self.runner.step(&self.timer);
            self.source
                .observe(now_s, &events, self.runner.machine().trial());
            self.report(&events);

            if tracing::enabled!(Level::TRACE) {
                let telemetry = self.runner.machine().telemetry(self.runner.tracker());
                trace!("{telemetry}");
            }

            if self.runner.is_complete() {
                break;
            }
            if self.source.is_exhausted() {
                warn!(
                    progress = ?self.runner.sequencer().progress(),
                    "frame source exhausted before the session finished"
                );
                break;
            }
            if now_s > self.max_session.as_secs_f64() {
                bail!(
                    "session exceeded {:.0} s without finishing (at trial {:?})",
                    self.max_session.as_secs_f64(),
                    self.runner.sequencer().progress()
                );
            }

            if let Some(rest) = self.tick.checked_sub(self.timer.elapsed(frame_start)) {
                self.timer.sleep(rest);
            }
            let frame_time = self.timer.elapsed(frame_start);
            self.timer.record_frame(frame_time);
        }

        let stats = self.timer.calibration_stats();
        info!(
            frames = self.timer.frame_count(),
            avg_ms = stats.average_frame_time_ns / 1_000_000.0,
            jitter_ms = stats.jitter_ns / 1_000_000.0,
            fps = stats.effective_fps,
            "tick statistics"
        );
        Ok(self.runner.summary())
    }

    fn report(&self, events: &[TrialEvent]) {
        let machine = self.runner.machine();
        for event in events {
            match event {
                TrialEvent::Ready | TrialEvent::Go => {
                    debug!(event = ?event, instruction = machine.instruction(), "cue");
                }
                TrialEvent::PulseFired => debug!(status = %machine.pulse_status(), "pulse"),
                TrialEvent::Feedback { success } => {
                    let (pos, total) = self.runner.sequencer().progress();
                    info!(position = pos, total, success, "reach complete");
                }
                _ => {}
            }
        }
    }

    pub fn runner(&self) -> &SessionRunner {
        &self.runner
    }
}
