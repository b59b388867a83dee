use serde::Serialize;

use super::{AudioFrame, Channel};

/// RMS that maps to a full-scale meter
const FULL_SCALE_RMS: f64 = 10000.0;
/// Level (percent) above which the meter turns yellow
const YELLOW_THRESHOLD: f32 = 60.0;
/// Level (percent) above which the meter turns red
const RED_THRESHOLD: f32 = 80.0;
/// Level (percent) above which the channel counts as active
const ACTIVE_THRESHOLD: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterZone {
    Green,
    Yellow,
    Red,
}

/// Meter payload for one channel of a frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MeterReading {
    /// Raw RMS in sample units
    pub rms: f64,
    /// Level from 0 to 100
    pub level: f32,
    pub zone: MeterZone,
    /// Whether the channel carries signal worth highlighting
    pub active: bool,
}

impl MeterReading {
    pub fn from_rms(rms: f64) -> Self {
        let level = rms_to_level(rms);
        let zone = if level > RED_THRESHOLD {
            MeterZone::Red
        } else if level > YELLOW_THRESHOLD {
            MeterZone::Yellow
        } else {
            MeterZone::Green
        };

        Self {
            rms,
            level,
            zone,
            active: level > ACTIVE_THRESHOLD,
        }
    }

    pub fn for_channel(frame: &AudioFrame, channel: Channel) -> Self {
        Self::from_rms(frame.rms(channel))
    }
}

/// Convert RMS to a linear percentage of full scale
fn rms_to_level(rms: f64) -> f32 {
    if !rms.is_finite() || rms <= 0.0 {
        return 0.0;
    }
    ((rms / FULL_SCALE_RMS) * 100.0).min(100.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_silent() {
        let reading = MeterReading::from_rms(0.0);
        assert_eq!(reading.level, 0.0);
        assert_eq!(reading.zone, MeterZone::Green);
        assert!(!reading.active);
    }

    #[test]
    fn test_meter_zones() {
        assert_eq!(MeterReading::from_rms(5000.0).zone, MeterZone::Green);
        assert_eq!(MeterReading::from_rms(7000.0).zone, MeterZone::Yellow);
        assert_eq!(MeterReading::from_rms(9000.0).zone, MeterZone::Red);
    }

    #[test]
    fn test_meter_saturates() {
        let reading = MeterReading::from_rms(32768.0);
        assert_eq!(reading.level, 100.0);
        assert!(reading.active);
    }

    #[test]
    fn test_meter_activity_threshold() {
        assert!(!MeterReading::from_rms(400.0).active);
        assert!(MeterReading::from_rms(600.0).active);
    }
}
