//! Wire packet decoding
//! A packet is `4 * N` bytes: N little-endian i16 left samples followed by N right samples.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::{Channel, SILENCE_FRAMES};

/// GATT service advertised by the sensor
pub const AUDIO_SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);
/// Characteristic whose notifications carry audio packets
pub const AUDIO_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Bytes per frame (one i16 per channel)
const BYTES_PER_FRAME: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed packet length {len} (must be a multiple of 4)")]
    MalformedLength { len: usize },
}

/// Dual-channel PCM decoded from one packet
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AudioFrame {
    pub left: Vec<i16>,
    pub right: Vec<i16>,
    pub left_rms: f64,
    pub right_rms: f64,
}

impl AudioFrame {
    /// All-zero frame used to reset metering
    pub fn silence(frames: usize) -> Self {
        Self {
            left: vec![0; frames],
            right: vec![0; frames],
            left_rms: 0.0,
            right_rms: 0.0,
        }
    }

    /// Number of frames (samples per channel)
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn samples(&self, channel: Channel) -> &[i16] {
        match channel {
            Channel::Left => &self.left,
            Channel::Right => &self.right,
        }
    }

    pub fn rms(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Left => self.left_rms,
            Channel::Right => self.right_rms,
        }
    }
}

impl Default for AudioFrame {
    fn default() -> Self {
        Self::silence(SILENCE_FRAMES)
    }
}

/// Decode a raw packet into an [`AudioFrame`].
///
/// Rejects buffers whose length is not a multiple of 4 instead of truncating.
/// An empty buffer is valid and yields an empty frame with zero RMS.
pub fn decode(buffer: &[u8]) -> Result<AudioFrame, DecodeError> {
    if buffer.len() % BYTES_PER_FRAME != 0 {
        return Err(DecodeError::MalformedLength { len: buffer.len() });
    }

    let (left_bytes, right_bytes) = buffer.split_at(buffer.len() / 2);
    let left = read_i16_le(left_bytes);
    let right = read_i16_le(right_bytes);

    Ok(AudioFrame {
        left_rms: calculate_rms(&left),
        right_rms: calculate_rms(&right),
        left,
        right,
    })
}

fn read_i16_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// RMS of raw samples; squares are summed as i64 so full-scale packets cannot overflow
fn calculate_rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: i64 = samples.iter().map(|&s| (s as i64) * (s as i64)).sum();
    (sum_squares as f64 / samples.len() as f64).sqrt()
}
