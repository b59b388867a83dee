//! Gapless playback scheduling
//! Turns irregularly arriving frames into back-to-back chunks on the output graph clock.

use serde::Serialize;
use std::time::Duration;

use super::{frames_to_duration, AudioFrame, Channel, OutputGraph};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerSettings {
    /// Lead given to the first chunk after a channel is enabled
    pub safety_margin: Duration,
    /// Nothing is scheduled closer to the clock than this
    pub min_latency: Duration,
    /// Chunks starting further ahead of the clock than this are dropped (None = unbounded)
    pub max_horizon: Option<Duration>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_millis(30),
            min_latency: Duration::from_millis(20),
            max_horizon: Some(Duration::from_millis(500)),
        }
    }
}

/// Observable playback state of one channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChannelMode {
    Disabled,
    EnabledUnmuted,
    EnabledMuted,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ChannelPlaybackState {
    pub enabled: bool,
    pub muted: bool,
    /// Where the next chunk should start on the graph clock
    pub next_start_time: Duration,
    /// Set once a chunk has been scheduled since the last enable
    #[serde(skip)]
    primed: bool,
}

impl ChannelPlaybackState {
    pub fn mode(&self) -> ChannelMode {
        match (self.enabled, self.muted) {
            (false, _) => ChannelMode::Disabled,
            (true, false) => ChannelMode::EnabledUnmuted,
            (true, true) => ChannelMode::EnabledMuted,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Muted,
    Empty,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled {
        start_at: Duration,
        duration: Duration,
        /// The channel had fallen behind the clock and was clamped forward
        underrun: bool,
    },
    Skipped(SkipReason),
    /// The chunk would have started beyond the look-ahead horizon
    Dropped { start_at: Duration },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub scheduled_chunks: u64,
    pub underruns: u64,
    pub overruns: u64,
}

/// Normalize to [-1, 1) and soft clip with tanh so later gain staging saturates smoothly
pub fn normalize_and_soft_clip(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| (s as f32 / 32768.0).tanh())
        .collect()
}

/// Per-session scheduler owning each channel's playback state
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    settings: SchedulerSettings,
    channels: [ChannelPlaybackState; 2],
    stats: SchedulerStats,
}

impl PlaybackScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            channels: [ChannelPlaybackState::default(); 2],
            stats: SchedulerStats::default(),
        }
    }

    /// Flip enabled. Enabling restarts the channel's timeline at `now + safety_margin`.
    pub fn toggle_enabled(&mut self, channel: Channel, now: Duration) -> ChannelMode {
        let state = &mut self.channels[channel.index()];
        state.enabled = !state.enabled;
        if state.enabled {
            state.next_start_time = now + self.settings.safety_margin;
            state.primed = false;
        }
        tracing::info!("Channel {} is now {:?}", channel, state.mode());
        state.mode()
    }

    /// Flip muted. Ignored while the channel is disabled.
    pub fn toggle_mute(&mut self, channel: Channel) -> ChannelMode {
        let state = &mut self.channels[channel.index()];
        if !state.enabled {
            tracing::debug!("Channel {} is disabled, ignoring mute toggle", channel);
            return state.mode();
        }
        state.muted = !state.muted;
        tracing::info!("Channel {} mute set to: {}", channel, state.muted);
        state.mode()
    }

    pub fn channel(&self, channel: Channel) -> &ChannelPlaybackState {
        &self.channels[channel.index()]
    }

    pub fn channels(&self) -> &[ChannelPlaybackState; 2] {
        &self.channels
    }

    pub fn mode(&self, channel: Channel) -> ChannelMode {
        self.channels[channel.index()].mode()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Schedule both channels of a frame
    pub fn schedule_frame<G: OutputGraph + ?Sized>(
        &mut self,
        frame: &AudioFrame,
        graph: &mut G,
    ) -> [ScheduleOutcome; 2] {
        Channel::ALL.map(|channel| self.schedule_chunk(channel, frame.samples(channel), &mut *graph))
    }

    /// Schedule one channel's samples directly after the previous chunk, or as soon
    /// as the renderer allows if the channel has fallen behind.
    pub fn schedule_chunk<G: OutputGraph + ?Sized>(
        &mut self,
        channel: Channel,
        samples: &[i16],
        graph: &mut G,
    ) -> ScheduleOutcome {
        let state = &mut self.channels[channel.index()];
        match state.mode() {
            ChannelMode::Disabled => return ScheduleOutcome::Skipped(SkipReason::Disabled),
            ChannelMode::EnabledMuted => return ScheduleOutcome::Skipped(SkipReason::Muted),
            ChannelMode::EnabledUnmuted => {}
        }
        if samples.is_empty() {
            return ScheduleOutcome::Skipped(SkipReason::Empty);
        }

        let now = graph.current_time();
        let duration = frames_to_duration(samples.len() as u64);
        let earliest = now + self.settings.min_latency;
        let start_at = state.next_start_time.max(earliest);

        if let Some(horizon) = self.settings.max_horizon {
            if start_at.saturating_sub(now) > horizon {
                self.stats.overruns += 1;
                tracing::debug!(
                    "Channel {} ahead of clock by {:?}, dropping {} frames",
                    channel,
                    start_at.saturating_sub(now),
                    samples.len()
                );
                return ScheduleOutcome::Dropped { start_at };
            }
        }

        let underrun = state.primed && state.next_start_time < earliest;
        if underrun {
            self.stats.underruns += 1;
            tracing::debug!(
                "Channel {} underrun, clamped forward by {:?}",
                channel,
                earliest - state.next_start_time
            );
        }

        graph.submit(channel, normalize_and_soft_clip(samples), start_at);
        state.next_start_time = start_at + duration;
        state.primed = true;
        self.stats.scheduled_chunks += 1;

        ScheduleOutcome::Scheduled {
            start_at,
            duration,
            underrun,
        }
    }
}
