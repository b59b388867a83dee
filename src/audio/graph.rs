//! Output signal graph
//! Per channel: low-pass filter -> channel gain, both channels summed into master gain -> sink

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

use super::{duration_to_frames, frames_to_duration, Channel, SAMPLE_RATE};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphInitError {
    #[error("No output device available")]
    NoOutputDevice,
    #[error("Output device '{0}' not found")]
    DeviceNotFound(String),
    #[error("Failed to enumerate output devices: {0}")]
    Enumerate(String),
    #[error("Failed to build output stream: {0}")]
    BuildStream(String),
    #[error("Failed to start output stream: {0}")]
    StartStream(String),
    #[error("Invalid filter parameters: {0}")]
    Filter(String),
}

/// Identity of a live graph; repeated activation returns an equal handle
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphHandle {
    pub device_name: String,
    pub sample_rate: u32,
    pub output_channels: u16,
}

/// Fixed parameters of the per-channel chain
#[derive(Clone, Debug, PartialEq)]
pub struct GraphSettings {
    pub lowpass_cutoff_hz: f32,
    pub lowpass_q: f32,
    pub gain_time_constant: Duration,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            lowpass_cutoff_hz: 7000.0,
            lowpass_q: 0.7,
            gain_time_constant: Duration::from_millis(10),
        }
    }
}

/// Work handed from the control side to the rendering side
#[derive(Debug)]
pub enum GraphCommand {
    Schedule {
        channel: Channel,
        start_frame: u64,
        samples: Vec<f32>,
    },
    SetChannelGain {
        channel: Channel,
        target: f32,
    },
    SetMasterGain {
        target: f32,
    },
}

/// The seam between scheduling/volume control and whatever renders audio.
///
/// All times are on the graph's own clock, which starts at zero when the
/// graph is activated and only advances while it renders.
pub trait OutputGraph {
    /// Build the graph on first call; later calls return the same handle
    fn activate(&mut self) -> Result<GraphHandle, GraphInitError>;

    fn is_active(&self) -> bool;

    /// Current position of the render clock
    fn current_time(&self) -> Duration;

    /// Queue already normalized samples to start playing at `start_at`. Never blocks.
    fn submit(&mut self, channel: Channel, samples: Vec<f32>, start_at: Duration);

    /// Ramp a channel gain stage towards `target`
    fn set_channel_gain(&mut self, channel: Channel, target: f32);

    /// Ramp the master gain stage towards `target`
    fn set_master_gain(&mut self, target: f32);
}

/// Gain stage with an exponential approach to its target
#[derive(Debug)]
struct SmoothedGain {
    current: f32,
    target: f32,
    coeff: f32,
}

impl SmoothedGain {
    fn new(value: f32, time_constant: Duration) -> Self {
        let tau_frames = time_constant.as_secs_f32() * SAMPLE_RATE as f32;
        let coeff = if tau_frames <= 0.0 {
            1.0
        } else {
            1.0 - (-1.0 / tau_frames).exp()
        };

        Self {
            current: value,
            target: value,
            coeff,
        }
    }

    fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    fn next(&mut self) -> f32 {
        let delta = self.target - self.current;
        if delta.abs() < 1e-6 {
            self.current = self.target;
        } else {
            self.current += delta * self.coeff;
        }
        self.current
    }
}

#[derive(Debug)]
struct ScheduledChunk {
    start_frame: u64,
    samples: Vec<f32>,
}

impl ScheduledChunk {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// One channel's filter and gain stage plus its queue of scheduled chunks
struct ChannelStrip {
    filter: DirectForm1<f32>,
    gain: SmoothedGain,
    queue: VecDeque<ScheduledChunk>,
}

impl ChannelStrip {
    fn schedule(&mut self, start_frame: u64, samples: Vec<f32>) {
        let at = self.queue.partition_point(|c| c.start_frame <= start_frame);
        self.queue.insert(at, ScheduledChunk { start_frame, samples });
    }

    /// Source sample at `position`, or silence between chunks
    fn source_sample(&mut self, position: u64) -> f32 {
        while let Some(chunk) = self.queue.front() {
            if position >= chunk.end_frame() {
                self.queue.pop_front();
                continue;
            }
            if position < chunk.start_frame {
                return 0.0;
            }
            return chunk.samples[(position - chunk.start_frame) as usize];
        }
        0.0
    }

    fn queued_frames(&self, position: u64) -> u64 {
        self.queue
            .iter()
            .map(|c| c.end_frame().saturating_sub(position.max(c.start_frame)))
            .sum()
    }
}

/// Renders the fixed topology one block at a time.
///
/// Owned by exactly one rendering context (a device callback or [`OfflineGraph`]).
pub struct GraphRenderer {
    strips: [ChannelStrip; 2],
    master: SmoothedGain,
    position: u64,
}

impl GraphRenderer {
    pub fn new(
        settings: &GraphSettings,
        master_gain: f32,
        channel_gain: [f32; 2],
    ) -> Result<Self, GraphInitError> {
        let coeffs = Coefficients::<f32>::from_params(
            Type::LowPass,
            (SAMPLE_RATE as f32).hz(),
            settings.lowpass_cutoff_hz.hz(),
            settings.lowpass_q,
        )
        .map_err(|e| GraphInitError::Filter(format!("{:?}", e)))?;

        let strip = |gain: f32| ChannelStrip {
            filter: DirectForm1::<f32>::new(coeffs),
            gain: SmoothedGain::new(gain, settings.gain_time_constant),
            queue: VecDeque::new(),
        };

        Ok(Self {
            strips: [strip(channel_gain[0]), strip(channel_gain[1])],
            master: SmoothedGain::new(master_gain, settings.gain_time_constant),
            position: 0,
        })
    }

    pub fn apply(&mut self, command: GraphCommand) {
        match command {
            GraphCommand::Schedule {
                channel,
                start_frame,
                samples,
            } => self.strips[channel.index()].schedule(start_frame, samples),
            GraphCommand::SetChannelGain { channel, target } => {
                self.strips[channel.index()].gain.set_target(target)
            }
            GraphCommand::SetMasterGain { target } => self.master.set_target(target),
        }
    }

    /// Render mono master output into `out`, advancing the clock by `out.len()` frames
    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            let mut mixed = 0.0f32;
            for strip in self.strips.iter_mut() {
                let source = strip.source_sample(self.position);
                let filtered = strip.filter.run(source);
                mixed += filtered * strip.gain.next();
            }
            *sample = mixed * self.master.next();
            self.position += 1;
        }
    }

    /// Frames rendered since activation
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Frames still waiting to be played on `channel`
    pub fn queued_frames(&self, channel: Channel) -> u64 {
        self.strips[channel.index()].queued_frames(self.position)
    }

    pub fn channel_gain(&self, channel: Channel) -> f32 {
        self.strips[channel.index()].gain.current
    }

    pub fn master_gain(&self) -> f32 {
        self.master.current
    }
}

/// Gain targets remembered before the graph exists
#[derive(Clone, Copy, Debug)]
pub(crate) struct GainTargets {
    pub master: f32,
    pub channel: [f32; 2],
}

impl Default for GainTargets {
    fn default() -> Self {
        Self {
            master: 1.0,
            channel: [1.0, 1.0],
        }
    }
}

/// A submitted chunk as seen by [`OfflineGraph`]
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub channel: Channel,
    pub start_at: Duration,
    pub frames: usize,
}

/// Device-less graph rendering into memory; the clock moves only on `render`
pub struct OfflineGraph {
    settings: GraphSettings,
    renderer: Option<GraphRenderer>,
    gains: GainTargets,
    submissions: Vec<Submission>,
}

impl OfflineGraph {
    pub fn new(settings: GraphSettings) -> Self {
        Self {
            settings,
            renderer: None,
            gains: GainTargets::default(),
            submissions: Vec::new(),
        }
    }

    /// Render `frames` frames of master output. Inactive graphs return silence without advancing.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render(&mut out);
        }
        out
    }

    /// Advance the clock by `elapsed`, discarding the output
    pub fn advance(&mut self, elapsed: Duration) {
        let frames = duration_to_frames(elapsed) as usize;
        self.render(frames);
    }

    /// Every chunk submitted so far, in submission order
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn renderer(&self) -> Option<&GraphRenderer> {
        self.renderer.as_ref()
    }
}

impl Default for OfflineGraph {
    fn default() -> Self {
        Self::new(GraphSettings::default())
    }
}

impl OutputGraph for OfflineGraph {
    fn activate(&mut self) -> Result<GraphHandle, GraphInitError> {
        if self.renderer.is_none() {
            self.renderer = Some(GraphRenderer::new(
                &self.settings,
                self.gains.master,
                self.gains.channel,
            )?);
            tracing::info!("Offline output graph built");
        }

        Ok(GraphHandle {
            device_name: "offline".to_string(),
            sample_rate: SAMPLE_RATE,
            output_channels: 1,
        })
    }

    fn is_active(&self) -> bool {
        self.renderer.is_some()
    }

    fn current_time(&self) -> Duration {
        self.renderer
            .as_ref()
            .map(|r| frames_to_duration(r.position()))
            .unwrap_or_default()
    }

    fn submit(&mut self, channel: Channel, samples: Vec<f32>, start_at: Duration) {
        let Some(renderer) = self.renderer.as_mut() else {
            tracing::debug!("Dropping {} chunk submitted before activation", channel);
            return;
        };

        self.submissions.push(Submission {
            channel,
            start_at,
            frames: samples.len(),
        });
        renderer.apply(GraphCommand::Schedule {
            channel,
            start_frame: duration_to_frames(start_at),
            samples,
        });
    }

    fn set_channel_gain(&mut self, channel: Channel, target: f32) {
        self.gains.channel[channel.index()] = target;
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.apply(GraphCommand::SetChannelGain { channel, target });
        }
    }

    fn set_master_gain(&mut self, target: f32) {
        self.gains.master = target;
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.apply(GraphCommand::SetMasterGain { target });
        }
    }
}
