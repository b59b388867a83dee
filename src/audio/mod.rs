mod graph;
mod meter;
mod packet;
mod playback;
mod scheduler;
mod volume;

pub use graph::{
    GraphCommand, GraphHandle, GraphInitError, GraphRenderer, GraphSettings, OfflineGraph, OutputGraph,
    Submission,
};
pub use meter::{MeterReading, MeterZone};
pub use packet::{decode, AudioFrame, DecodeError, AUDIO_CHAR_UUID, AUDIO_SERVICE_UUID};
pub use playback::CpalOutputGraph;
pub use scheduler::{
    normalize_and_soft_clip, ChannelMode, ChannelPlaybackState, PlaybackScheduler, ScheduleOutcome,
    SchedulerSettings, SchedulerStats, SkipReason,
};
pub use volume::{VolumeController, VolumeState, MAX_GAIN, MIN_GAIN};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sample rate shared by the sensor and the output graph (no negotiation)
pub const SAMPLE_RATE: u32 = 16000;
/// Output device channels; the mono master is written to each of them
pub const OUTPUT_CHANNELS: u16 = 2;
/// Frames in the silent frame published on disconnect
pub const SILENCE_FRAMES: usize = 128;

/// One of the two microphone channels carried by every packet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Left, Channel::Right];

    /// Index into per-channel arrays
    pub fn index(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Left => f.write_str("left"),
            Channel::Right => f.write_str("right"),
        }
    }
}

/// Convert a frame count at `SAMPLE_RATE` to an exact duration
pub fn frames_to_duration(frames: u64) -> Duration {
    Duration::from_nanos(frames.saturating_mul(1_000_000_000) / SAMPLE_RATE as u64)
}

/// Convert a duration on the graph clock to a frame index at `SAMPLE_RATE`
pub fn duration_to_frames(at: Duration) -> u64 {
    (at.as_nanos() * SAMPLE_RATE as u128 / 1_000_000_000) as u64
}
