use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream, StreamConfig};
use ringbuf::{traits::*, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::graph::GainTargets;
use super::{
    frames_to_duration, duration_to_frames, Channel, GraphCommand, GraphHandle, GraphInitError,
    GraphRenderer, GraphSettings, OutputGraph, OUTPUT_CHANNELS, SAMPLE_RATE,
};

/// Commands the render callback can lag behind before submissions are dropped
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Output graph rendered by a cpal output stream
pub struct CpalOutputGraph {
    host: Host,
    device_name: Option<String>,
    settings: GraphSettings,
    gains: GainTargets,
    stream: Option<Stream>,
    handle: Option<GraphHandle>,
    /// Feeds the render callback; lock-free so `submit` never waits on the audio thread
    commands: Option<HeapProd<GraphCommand>>,
    frames_rendered: Arc<AtomicU64>,
}

impl CpalOutputGraph {
    /// Create an inactive graph targeting `device_name` (None for the default device)
    pub fn new(settings: GraphSettings, device_name: Option<String>) -> Self {
        Self {
            host: cpal::default_host(),
            device_name,
            settings,
            gains: GainTargets::default(),
            stream: None,
            handle: None,
            commands: None,
            frames_rendered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// List available output devices
    pub fn list_devices() -> Result<Vec<String>, GraphInitError> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| GraphInitError::Enumerate(e.to_string()))?;

        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn find_device(&self) -> Result<Device, GraphInitError> {
        match self.device_name.as_deref() {
            Some(device_name) => {
                let mut devices = self
                    .host
                    .output_devices()
                    .map_err(|e| GraphInitError::Enumerate(e.to_string()))?;

                devices
                    .find(|d| d.name().map(|n| n == device_name).unwrap_or(false))
                    .ok_or_else(|| GraphInitError::DeviceNotFound(device_name.to_string()))
            }
            None => self
                .host
                .default_output_device()
                .ok_or(GraphInitError::NoOutputDevice),
        }
    }

    fn send(&mut self, command: GraphCommand) {
        let Some(producer) = self.commands.as_mut() else {
            return;
        };
        if let Err(rejected) = producer.try_push(command) {
            tracing::warn!("Output command queue full, dropping {}", summarize(&rejected));
        }
    }
}

fn summarize(command: &GraphCommand) -> String {
    match command {
        GraphCommand::Schedule {
            channel,
            start_frame,
            samples,
        } => format!("{} chunk of {} frames at frame {}", channel, samples.len(), start_frame),
        GraphCommand::SetChannelGain { channel, target } => {
            format!("{} gain {}", channel, target)
        }
        GraphCommand::SetMasterGain { target } => format!("master gain {}", target),
    }
}

impl OutputGraph for CpalOutputGraph {
    fn activate(&mut self) -> Result<GraphHandle, GraphInitError> {
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }

        let device = self.find_device()?;
        let device_name = device.name().unwrap_or_default();
        tracing::info!("Using output device: {}", device_name);

        let config = StreamConfig {
            channels: OUTPUT_CHANNELS,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut renderer = GraphRenderer::new(&self.settings, self.gains.master, self.gains.channel)?;
        let (producer, mut consumer) = HeapRb::<GraphCommand>::new(COMMAND_QUEUE_CAPACITY).split();
        let frames_rendered = self.frames_rendered.clone();
        let channels = config.channels as usize;
        let mut mono: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    while let Some(command) = consumer.try_pop() {
                        renderer.apply(command);
                    }

                    mono.resize(data.len() / channels, 0.0);
                    renderer.render(&mut mono);

                    for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        frame.fill(sample);
                    }
                    frames_rendered.store(renderer.position(), Ordering::Release);
                },
                move |err| {
                    tracing::error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| GraphInitError::BuildStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| GraphInitError::StartStream(e.to_string()))?;

        let handle = GraphHandle {
            device_name,
            sample_rate: SAMPLE_RATE,
            output_channels: OUTPUT_CHANNELS,
        };

        self.stream = Some(stream);
        self.commands = Some(producer);
        self.handle = Some(handle.clone());

        tracing::info!("Output graph started");
        Ok(handle)
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    fn current_time(&self) -> Duration {
        frames_to_duration(self.frames_rendered.load(Ordering::Acquire))
    }

    fn submit(&mut self, channel: Channel, samples: Vec<f32>, start_at: Duration) {
        if self.commands.is_none() {
            tracing::debug!("Dropping {} chunk submitted before activation", channel);
            return;
        }
        self.send(GraphCommand::Schedule {
            channel,
            start_frame: duration_to_frames(start_at),
            samples,
        });
    }

    fn set_channel_gain(&mut self, channel: Channel, target: f32) {
        self.gains.channel[channel.index()] = target;
        self.send(GraphCommand::SetChannelGain { channel, target });
    }

    fn set_master_gain(&mut self, target: f32) {
        self.gains.master = target;
        self.send(GraphCommand::SetMasterGain { target });
    }
}

// Safety: the stream is only created, held and dropped by the single task that owns the graph;
// the render callback reaches shared state through the ring buffer and an atomic only
unsafe impl Send for CpalOutputGraph {}
