//! Real-time monitor for a two-microphone wireless sensor.
//!
//! Raw packets go in through [`MonitorHandle::on_packet`]; decoded frames with meter
//! readings come out as [`MonitorEvent`]s, and enabled channels are played back
//! gaplessly through a filtered, gain-staged output graph.

pub mod audio;
pub mod config;
pub mod monitor;

pub use audio::{
    decode, AudioFrame, Channel, ChannelMode, CpalOutputGraph, DecodeError, GraphInitError,
    MeterReading, OfflineGraph, OutputGraph, SAMPLE_RATE,
};
pub use config::{ConfigError, MonitorConfig};
pub use monitor::{
    ConnectionState, FrameEvent, Monitor, MonitorCommand, MonitorError, MonitorEvent, MonitorHandle,
    MonitorSnapshot,
};

/// Install the fmt subscriber for `tracing` output. Later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().try_init();
}
