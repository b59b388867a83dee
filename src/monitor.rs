//! Monitoring session
//! One task owns decoding, scheduling, volume and the output graph; everything else talks to it
//! through [`MonitorHandle`], so all state has a single writer.

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::audio::{
    decode, AudioFrame, Channel, ChannelMode, ChannelPlaybackState, CpalOutputGraph, DecodeError,
    GraphInitError, MeterReading, OutputGraph, PlaybackScheduler, SchedulerStats, VolumeController,
    VolumeState,
};
use crate::config::MonitorConfig;

/// Name reported when the sensor does not advertise one
const DEFAULT_DEVICE_NAME: &str = "ESP32 Audio";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Monitor task is not running")]
    Stopped,
}

/// A decoded frame with per-channel meter readings
#[derive(Clone, Debug)]
pub struct FrameEvent {
    pub frame: Arc<AudioFrame>,
    pub left: MeterReading,
    pub right: MeterReading,
}

impl FrameEvent {
    pub fn new(frame: Arc<AudioFrame>) -> Self {
        Self {
            left: MeterReading::for_channel(&frame, Channel::Left),
            right: MeterReading::for_channel(&frame, Channel::Right),
            frame,
        }
    }

    /// Metering reset used before the first packet and after disconnect
    pub fn silence() -> Self {
        Self::new(Arc::new(AudioFrame::default()))
    }

    pub fn meter(&self, channel: Channel) -> MeterReading {
        match channel {
            Channel::Left => self.left,
            Channel::Right => self.right,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub device_name: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PacketStats {
    pub received: u64,
    pub rejected: u64,
}

/// Published to every subscriber
#[derive(Clone, Debug)]
pub enum MonitorEvent {
    Frame(FrameEvent),
    PacketRejected { len: usize },
    ChannelChanged { channel: Channel, mode: ChannelMode },
    VolumeChanged(VolumeState),
    ConnectionChanged(ConnectionState),
    /// The output graph could not be created; playback controls should be disabled
    PlaybackUnavailable { reason: String },
}

/// Point-in-time view of the session
#[derive(Clone, Debug, Serialize)]
pub struct MonitorSnapshot {
    pub volume: VolumeState,
    pub channels: [ChannelPlaybackState; 2],
    /// Gain currently pushed to each channel stage (zero while muted)
    pub effective_gain: [f32; 2],
    pub scheduler: SchedulerStats,
    pub packets: PacketStats,
    pub connection: ConnectionState,
    pub playback_available: bool,
}

impl MonitorSnapshot {
    pub fn mode(&self, channel: Channel) -> ChannelMode {
        self.channels[channel.index()].mode()
    }

    /// Channels currently producing sound; empty means output is idle
    pub fn audible_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|&c| self.mode(c) == ChannelMode::EnabledUnmuted)
            .collect()
    }
}

#[derive(Debug)]
pub enum MonitorCommand {
    Packet(Bytes),
    Connected { device_name: Option<String> },
    Disconnected,
    SetMaster(f32),
    SetChannelGain(Channel, f32),
    ToggleMute(Channel),
    ToggleEnabled(Channel),
    Snapshot(oneshot::Sender<MonitorSnapshot>),
    Shutdown,
}

/// Session state. Drive it directly or move it onto a task with [`MonitorHandle::spawn`].
pub struct Monitor<G: OutputGraph> {
    graph: G,
    volume: VolumeController,
    scheduler: PlaybackScheduler,
    connection: ConnectionState,
    packets: PacketStats,
    playback_error: Option<GraphInitError>,
    latest_frame: Arc<Mutex<FrameEvent>>,
    events: broadcast::Sender<MonitorEvent>,
}

impl<G: OutputGraph> Monitor<G> {
    pub fn new(config: &MonitorConfig, mut graph: G) -> Self {
        let volume = VolumeController::new(config.volume());
        let scheduler = PlaybackScheduler::new(config.scheduler_settings());
        volume.apply(&mut graph, scheduler.channels());

        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            graph,
            volume,
            scheduler,
            connection: ConnectionState::default(),
            packets: PacketStats::default(),
            playback_error: None,
            latest_frame: Arc::new(Mutex::new(FrameEvent::silence())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_frame(&self, event: FrameEvent) {
        *self.latest_frame.lock() = event.clone();
        self.publish(MonitorEvent::Frame(event));
    }

    /// Decode a packet, schedule what is audible and publish the frame for metering.
    /// Malformed packets are dropped and the stream continues.
    pub fn on_packet(&mut self, buffer: &[u8]) -> Result<FrameEvent, DecodeError> {
        self.packets.received += 1;

        let frame = match decode(buffer) {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                self.packets.rejected += 1;
                tracing::warn!("Rejected packet: {}", e);
                self.publish(MonitorEvent::PacketRejected { len: buffer.len() });
                return Err(e);
            }
        };

        self.scheduler.schedule_frame(&frame, &mut self.graph);

        let event = FrameEvent::new(frame);
        self.publish_frame(event.clone());
        Ok(event)
    }

    pub fn connect(&mut self, device_name: Option<String>) {
        let device_name = device_name.unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());
        tracing::info!("Sensor connected: {}", device_name);

        self.connection = ConnectionState {
            is_connected: true,
            device_name: Some(device_name),
        };
        self.publish(MonitorEvent::ConnectionChanged(self.connection.clone()));
    }

    /// Forget the sensor and reset metering to silence
    pub fn disconnect(&mut self) {
        tracing::info!("Sensor disconnected");

        self.connection = ConnectionState::default();
        self.publish(MonitorEvent::ConnectionChanged(self.connection.clone()));
        self.publish_frame(FrameEvent::silence());
    }

    pub fn set_master(&mut self, value: f32) -> f32 {
        let applied = self.volume.set_master(value);
        self.push_volume();
        applied
    }

    pub fn set_channel_gain(&mut self, channel: Channel, value: f32) -> f32 {
        let applied = self.volume.set_channel_gain(channel, value);
        self.push_volume();
        applied
    }

    fn push_volume(&mut self) {
        self.volume.apply(&mut self.graph, self.scheduler.channels());
        self.publish(MonitorEvent::VolumeChanged(self.volume.state()));
    }

    /// Flip a channel's mute. Disabled channels are left untouched.
    pub fn toggle_mute(&mut self, channel: Channel) -> ChannelMode {
        if !self.scheduler.channel(channel).enabled {
            return self.scheduler.mode(channel);
        }
        let mode = self.scheduler.toggle_mute(channel);
        self.volume.apply(&mut self.graph, self.scheduler.channels());
        self.publish(MonitorEvent::ChannelChanged { channel, mode });
        mode
    }

    /// Flip a channel between disabled and enabled. The output graph is built on the
    /// first enable; if that fails the channel stays disabled for the rest of the session.
    pub fn toggle_enabled(&mut self, channel: Channel) -> ChannelMode {
        let enabling = !self.scheduler.channel(channel).enabled;
        if enabling && !self.ensure_graph() {
            return self.scheduler.mode(channel);
        }

        let mode = self
            .scheduler
            .toggle_enabled(channel, self.graph.current_time());
        self.publish(MonitorEvent::ChannelChanged { channel, mode });
        mode
    }

    fn ensure_graph(&mut self) -> bool {
        if let Some(e) = &self.playback_error {
            tracing::warn!("Playback unavailable: {}", e);
            self.publish(MonitorEvent::PlaybackUnavailable {
                reason: e.to_string(),
            });
            return false;
        }

        match self.graph.activate() {
            Ok(handle) => {
                tracing::debug!("Output graph active on {}", handle.device_name);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to start playback: {}", e);
                self.publish(MonitorEvent::PlaybackUnavailable {
                    reason: e.to_string(),
                });
                self.playback_error = Some(e);
                false
            }
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let channels = *self.scheduler.channels();
        MonitorSnapshot {
            volume: self.volume.state(),
            effective_gain: Channel::ALL
                .map(|c| self.volume.effective_gain(c, channels[c.index()].muted)),
            channels,
            scheduler: self.scheduler.stats(),
            packets: self.packets,
            connection: self.connection.clone(),
            playback_available: self.playback_error.is_none(),
        }
    }

    pub fn handle_command(&mut self, command: MonitorCommand) -> ControlFlow<()> {
        match command {
            MonitorCommand::Packet(buffer) => {
                // Rejections are already logged and published
                let _ = self.on_packet(&buffer);
            }
            MonitorCommand::Connected { device_name } => self.connect(device_name),
            MonitorCommand::Disconnected => self.disconnect(),
            MonitorCommand::SetMaster(value) => {
                self.set_master(value);
            }
            MonitorCommand::SetChannelGain(channel, value) => {
                self.set_channel_gain(channel, value);
            }
            MonitorCommand::ToggleMute(channel) => {
                self.toggle_mute(channel);
            }
            MonitorCommand::ToggleEnabled(channel) => {
                self.toggle_enabled(channel);
            }
            MonitorCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            MonitorCommand::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Process commands strictly in arrival order until shutdown or every handle is dropped
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<MonitorCommand>) {
        tracing::info!("Monitor started");
        while let Some(command) = commands.recv().await {
            if self.handle_command(command).is_break() {
                break;
            }
        }
        tracing::info!("Monitor stopped");
    }
}

/// Cloneable front end of a running monitor. Every control call returns immediately.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<MonitorCommand>,
    events: broadcast::Sender<MonitorEvent>,
    latest_frame: Arc<Mutex<FrameEvent>>,
}

impl MonitorHandle {
    /// Move a monitor onto its own task. Must be called within a tokio runtime.
    pub fn spawn<G>(config: &MonitorConfig, graph: G) -> Self
    where
        G: OutputGraph + Send + 'static,
    {
        let monitor = Monitor::new(config, graph);
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = Self {
            commands: tx,
            events: monitor.events.clone(),
            latest_frame: monitor.latest_frame.clone(),
        };

        tokio::spawn(monitor.run(rx));
        handle
    }

    /// Spawn a monitor playing through the configured (or default) output device
    pub fn spawn_with_device(config: &MonitorConfig) -> Self {
        let graph = CpalOutputGraph::new(config.graph_settings(), config.output_device.clone());
        Self::spawn(config, graph)
    }

    fn send(&self, command: MonitorCommand) -> Result<(), MonitorError> {
        self.commands.send(command).map_err(|_| MonitorError::Stopped)
    }

    /// Deliver a raw packet from the transport
    pub fn on_packet(&self, buffer: impl Into<Bytes>) -> Result<(), MonitorError> {
        self.send(MonitorCommand::Packet(buffer.into()))
    }

    pub fn connect(&self, device_name: Option<String>) -> Result<(), MonitorError> {
        self.send(MonitorCommand::Connected { device_name })
    }

    pub fn disconnect(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::Disconnected)
    }

    pub fn set_master(&self, value: f32) -> Result<(), MonitorError> {
        self.send(MonitorCommand::SetMaster(value))
    }

    pub fn set_channel_gain(&self, channel: Channel, value: f32) -> Result<(), MonitorError> {
        self.send(MonitorCommand::SetChannelGain(channel, value))
    }

    pub fn toggle_mute(&self, channel: Channel) -> Result<(), MonitorError> {
        self.send(MonitorCommand::ToggleMute(channel))
    }

    pub fn toggle_enabled(&self, channel: Channel) -> Result<(), MonitorError> {
        self.send(MonitorCommand::ToggleEnabled(channel))
    }

    /// Ask the monitor for its state once every previously sent command is processed
    pub async fn snapshot(&self) -> Result<MonitorSnapshot, MonitorError> {
        let (tx, rx) = oneshot::channel();
        self.send(MonitorCommand::Snapshot(tx))?;
        rx.await.map_err(|_| MonitorError::Stopped)
    }

    pub fn shutdown(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::Shutdown)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Most recent frame published, for polling consumers
    pub fn latest_frame(&self) -> FrameEvent {
        self.latest_frame.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{GraphHandle, OfflineGraph, ScheduleOutcome};
    use std::time::Duration;

    fn packet(left: &[i16], right: &[i16]) -> Vec<u8> {
        left.iter()
            .chain(right.iter())
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    fn monitor() -> Monitor<OfflineGraph> {
        let config = MonitorConfig::default();
        Monitor::new(&config, OfflineGraph::new(config.graph_settings()))
    }

    /// Graph whose device never opens
    #[derive(Default)]
    struct NoDeviceGraph {
        attempts: usize,
        submitted: usize,
    }

    impl OutputGraph for NoDeviceGraph {
        fn activate(&mut self) -> Result<GraphHandle, GraphInitError> {
            self.attempts += 1;
            Err(GraphInitError::NoOutputDevice)
        }

        fn is_active(&self) -> bool {
            false
        }

        fn current_time(&self) -> Duration {
            Duration::ZERO
        }

        fn submit(&mut self, _channel: Channel, _samples: Vec<f32>, _start_at: Duration) {
            self.submitted += 1;
        }

        fn set_channel_gain(&mut self, _channel: Channel, _target: f32) {}

        fn set_master_gain(&mut self, _target: f32) {}
    }

    #[test]
    fn test_packet_produces_metered_frame() {
        let mut monitor = monitor();
        let mut events = monitor.subscribe();

        let event = monitor.on_packet(&packet(&[100; 128], &[-100; 128])).unwrap();
        assert_eq!(event.frame.left, vec![100; 128]);
        assert_eq!(event.frame.right, vec![-100; 128]);
        assert!((event.left.rms - 100.0).abs() < 1e-9);
        assert!((event.right.rms - 100.0).abs() < 1e-9);
        assert!(matches!(events.try_recv(), Ok(MonitorEvent::Frame(_))));
        assert_eq!(*monitor.latest_frame.lock().frame, *event.frame);
    }

    #[test]
    fn test_malformed_packet_is_dropped_and_stream_continues() {
        let mut monitor = monitor();
        let mut events = monitor.subscribe();

        assert_eq!(
            monitor.on_packet(&[1, 2, 3]).unwrap_err(),
            DecodeError::MalformedLength { len: 3 }
        );
        assert!(matches!(
            events.try_recv(),
            Ok(MonitorEvent::PacketRejected { len: 3 })
        ));

        assert!(monitor.on_packet(&packet(&[1; 4], &[2; 4])).is_ok());
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.packets, PacketStats { received: 2, rejected: 1 });
    }

    #[test]
    fn test_graph_is_built_on_first_enable() {
        let mut monitor = monitor();
        monitor.on_packet(&packet(&[5; 8], &[5; 8])).unwrap();
        assert!(!monitor.graph().is_active());

        assert_eq!(monitor.toggle_enabled(Channel::Left), ChannelMode::EnabledUnmuted);
        assert!(monitor.graph().is_active());
    }

    #[test]
    fn test_consecutive_packets_play_back_to_back() {
        let mut monitor = monitor();
        monitor.toggle_enabled(Channel::Left);

        monitor.on_packet(&packet(&[100; 128], &[-100; 128])).unwrap();
        monitor.on_packet(&packet(&[100; 128], &[-100; 128])).unwrap();

        let submissions = monitor.graph().submissions();
        assert_eq!(submissions.len(), 2);
        assert!(submissions.iter().all(|s| s.channel == Channel::Left));
        assert_eq!(
            submissions[1].start_at,
            submissions[0].start_at + Duration::from_millis(8)
        );
    }

    #[test]
    fn test_audio_reaches_the_graph_output() {
        let mut monitor = monitor();
        monitor.toggle_enabled(Channel::Right);
        monitor.on_packet(&packet(&[0; 160], &[8000; 160])).unwrap();

        // 30 ms safety margin = 480 frames of silence first
        let out = monitor.graph_mut().render(640);
        assert!(out[..480].iter().all(|&s| s == 0.0));
        assert!(out[480..].iter().any(|&s| s.abs() > 0.1));
    }

    #[test]
    fn test_mute_zeroes_effective_gain() {
        let mut monitor = monitor();
        monitor.set_channel_gain(Channel::Left, 3.0);
        monitor.toggle_enabled(Channel::Left);
        assert_eq!(monitor.toggle_mute(Channel::Left), ChannelMode::EnabledMuted);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.volume.channel_gain[0], 3.0);
        assert_eq!(snapshot.effective_gain, [0.0, 1.0]);
        assert!(snapshot.audible_channels().is_empty());

        monitor.on_packet(&packet(&[100; 16], &[100; 16])).unwrap();
        assert!(monitor.graph().submissions().is_empty());
    }

    #[test]
    fn test_mute_while_disabled_leaves_graph_alone() {
        let mut monitor = monitor();
        monitor.set_channel_gain(Channel::Left, 2.0);
        let mut events = monitor.subscribe();

        assert_eq!(monitor.toggle_mute(Channel::Left), ChannelMode::Disabled);
        assert!(events.try_recv().is_err());
        assert_eq!(monitor.snapshot().effective_gain, [2.0, 1.0]);

        assert_eq!(monitor.toggle_enabled(Channel::Left), ChannelMode::EnabledUnmuted);
        monitor.on_packet(&packet(&[100; 16], &[100; 16])).unwrap();
        assert_eq!(monitor.graph().submissions().len(), 1);
    }

    #[test]
    fn test_volume_is_clamped_through_monitor() {
        let mut monitor = monitor();
        assert_eq!(monitor.set_master(5.0), 4.0);
        assert_eq!(monitor.set_master(-1.0), 0.0);
        assert_eq!(monitor.set_channel_gain(Channel::Right, 7.5), 4.0);
    }

    #[test]
    fn test_graph_failure_keeps_metering_alive() {
        let config = MonitorConfig::default();
        let mut monitor = Monitor::new(&config, NoDeviceGraph::default());
        let mut events = monitor.subscribe();

        assert_eq!(monitor.toggle_enabled(Channel::Left), ChannelMode::Disabled);
        assert!(matches!(
            events.try_recv(),
            Ok(MonitorEvent::PlaybackUnavailable { .. })
        ));

        let event = monitor.on_packet(&packet(&[300; 32], &[0; 32])).unwrap();
        assert!((event.left.rms - 300.0).abs() < 1e-9);
        assert_eq!(monitor.graph().submitted, 0);

        // No second attempt for the rest of the session
        monitor.toggle_enabled(Channel::Right);
        assert_eq!(monitor.graph().attempts, 1);
        assert!(!monitor.snapshot().playback_available);
    }

    #[test]
    fn test_disconnect_resets_metering() {
        let mut monitor = monitor();
        monitor.connect(None);
        assert_eq!(
            monitor.snapshot().connection.device_name.as_deref(),
            Some("ESP32 Audio")
        );

        monitor.on_packet(&packet(&[9000; 64], &[9000; 64])).unwrap();
        let mut events = monitor.subscribe();
        monitor.disconnect();

        assert!(matches!(
            events.try_recv(),
            Ok(MonitorEvent::ConnectionChanged(ConnectionState {
                is_connected: false,
                ..
            }))
        ));
        match events.try_recv() {
            Ok(MonitorEvent::Frame(frame)) => {
                assert_eq!(frame.frame.len(), 128);
                assert_eq!(frame.left.rms, 0.0);
                assert_eq!(frame.right.rms, 0.0);
            }
            other => panic!("expected silent frame, got {:?}", other),
        }
    }

    #[test]
    fn test_underruns_show_in_snapshot() {
        let mut monitor = monitor();
        monitor.toggle_enabled(Channel::Left);
        monitor.on_packet(&packet(&[1; 128], &[1; 128])).unwrap();

        monitor.graph_mut().advance(Duration::from_millis(300));
        monitor.on_packet(&packet(&[1; 128], &[1; 128])).unwrap();

        let stats = monitor.snapshot().scheduler;
        assert_eq!(stats.scheduled_chunks, 2);
        assert_eq!(stats.underruns, 1);
    }

    #[test]
    fn test_disable_stops_future_scheduling_only() {
        let mut monitor = monitor();
        monitor.toggle_enabled(Channel::Left);
        monitor.on_packet(&packet(&[1; 64], &[1; 64])).unwrap();
        monitor.toggle_enabled(Channel::Left);
        monitor.on_packet(&packet(&[1; 64], &[1; 64])).unwrap();

        assert_eq!(monitor.graph().submissions().len(), 1);
        let queued = monitor.graph().renderer().unwrap().queued_frames(Channel::Left);
        assert_eq!(queued, 64);

        let outcome = monitor
            .scheduler
            .schedule_chunk(Channel::Left, &[1; 4], &mut monitor.graph);
        assert!(matches!(outcome, ScheduleOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_handle_processes_commands_in_order() {
        let config = MonitorConfig::default();
        let handle = MonitorHandle::spawn(&config, OfflineGraph::new(config.graph_settings()));
        let mut events = handle.subscribe();

        handle.connect(Some("Bench Sensor".to_string())).unwrap();
        handle.toggle_enabled(Channel::Right).unwrap();
        handle.set_master(9.0).unwrap();
        handle.on_packet(packet(&[100; 128], &[-100; 128])).unwrap();
        handle.on_packet(vec![0u8; 5]).unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.volume.master_gain, 4.0);
        assert_eq!(snapshot.mode(Channel::Right), ChannelMode::EnabledUnmuted);
        assert_eq!(snapshot.audible_channels(), vec![Channel::Right]);
        assert_eq!(snapshot.packets, PacketStats { received: 2, rejected: 1 });
        assert_eq!(snapshot.scheduler.scheduled_chunks, 1);
        assert_eq!(
            snapshot.connection.device_name.as_deref(),
            Some("Bench Sensor")
        );

        assert!(matches!(
            events.recv().await.unwrap(),
            MonitorEvent::ConnectionChanged(_)
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            MonitorEvent::ChannelChanged {
                channel: Channel::Right,
                mode: ChannelMode::EnabledUnmuted
            }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            MonitorEvent::VolumeChanged(_)
        ));
        assert!(matches!(events.recv().await.unwrap(), MonitorEvent::Frame(_)));
        assert_eq!(handle.latest_frame().frame.left, vec![100; 128]);
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_after_shutdown() {
        let config = MonitorConfig::default();
        let handle = MonitorHandle::spawn(&config, OfflineGraph::default());

        handle.shutdown().unwrap();
        assert_eq!(handle.snapshot().await.unwrap_err(), MonitorError::Stopped);
        assert!(!handle.is_running());
        assert_eq!(handle.set_master(1.0), Err(MonitorError::Stopped));
    }
}
