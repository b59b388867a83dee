use serde::{Deserialize, Serialize};

use super::{Channel, ChannelPlaybackState, OutputGraph};

/// Lowest accepted gain
pub const MIN_GAIN: f32 = 0.0;
/// Highest accepted gain (400%)
pub const MAX_GAIN: f32 = 4.0;

const DEFAULT_MASTER_GAIN: f32 = 2.5;
const DEFAULT_CHANNEL_GAIN: f32 = 1.0;

/// User-controlled gains for the session
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeState {
    pub master_gain: f32,
    pub channel_gain: [f32; 2],
}

impl Default for VolumeState {
    fn default() -> Self {
        Self {
            master_gain: DEFAULT_MASTER_GAIN,
            channel_gain: [DEFAULT_CHANNEL_GAIN; 2],
        }
    }
}

/// Clamp into [MIN_GAIN, MAX_GAIN]; NaN becomes silence
fn clamp_gain(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_GAIN;
    }
    value.clamp(MIN_GAIN, MAX_GAIN)
}

/// Holds gain parameters and pushes them to the graph's gain stages
#[derive(Debug, Default)]
pub struct VolumeController {
    state: VolumeState,
}

impl VolumeController {
    pub fn new(initial: VolumeState) -> Self {
        Self {
            state: VolumeState {
                master_gain: clamp_gain(initial.master_gain),
                channel_gain: initial.channel_gain.map(clamp_gain),
            },
        }
    }

    /// Set master gain, clamped. Returns the stored value.
    pub fn set_master(&mut self, value: f32) -> f32 {
        self.state.master_gain = clamp_gain(value);
        self.state.master_gain
    }

    /// Set a channel gain, clamped. Returns the stored value.
    pub fn set_channel_gain(&mut self, channel: Channel, value: f32) -> f32 {
        let clamped = clamp_gain(value);
        self.state.channel_gain[channel.index()] = clamped;
        clamped
    }

    pub fn master(&self) -> f32 {
        self.state.master_gain
    }

    pub fn channel_gain(&self, channel: Channel) -> f32 {
        self.state.channel_gain[channel.index()]
    }

    pub fn state(&self) -> VolumeState {
        self.state
    }

    /// Gain actually applied to a channel: zero while muted
    pub fn effective_gain(&self, channel: Channel, muted: bool) -> f32 {
        if muted {
            0.0
        } else {
            self.channel_gain(channel)
        }
    }

    /// Push current master and effective channel gains to the graph.
    /// The graph ramps towards them, so re-pushing unchanged values is harmless.
    pub fn apply<G: OutputGraph + ?Sized>(&self, graph: &mut G, channels: &[ChannelPlaybackState; 2]) {
        graph.set_master_gain(self.state.master_gain);
        for channel in Channel::ALL {
            let muted = channels[channel.index()].muted;
            graph.set_channel_gain(channel, self.effective_gain(channel, muted));
        }
    }
}
