//! Sensor frame protocol decoding.
//!
//! The time-of-flight sensor streams 9-byte frames:
//!
//! ```text
//! 0x59 0x59 | dist_lo dist_hi | strength_lo strength_hi | temp_lo temp_hi | checksum
//! ```
//!
//! [`FrameDecoder`] scans for the two marker bytes, reads the 7-byte body and
//! turns it into a [`DistanceSample`]. Every failure mode (timeout, short
//! read, closed stream, I/O error) becomes [`DistanceSample::NoReading`];
//! the decoder never panics and never returns an error to the caller.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, trace, warn};

use crate::types::DistanceSample;

/// Value of each of the two frame-start bytes.
pub const FRAME_MARKER: u8 = 0x59;

/// Number of bytes following the two marker bytes.
pub const FRAME_BODY_LEN: usize = 7;

/// A fully decoded sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorFrame {
    /// Distance in centimeters.
    pub distance_cm: u16,

    /// Signal strength (amplitude) reported by the sensor.
    pub strength: u16,

    /// Raw chip temperature word.
    pub temperature_raw: u16,

    /// Whether the trailing checksum byte matched.
    pub checksum_ok: bool,
}

impl SensorFrame {
    /// Chip temperature in degrees Celsius.
    #[must_use]
    pub fn temperature_celsius(&self) -> f32 {
        f32::from(self.temperature_raw) / 8.0 - 256.0
    }
}

/// Decode a frame body (the 7 bytes after the marker pair).
///
/// The checksum is the low byte of the sum of the two marker bytes and the
/// first six body bytes.
#[must_use]
pub fn decode_frame(body: &[u8; FRAME_BODY_LEN]) -> SensorFrame {
    let sum = body[..FRAME_BODY_LEN - 1]
        .iter()
        .fold(u32::from(FRAME_MARKER) * 2, |acc, b| acc + u32::from(*b));

    SensorFrame {
        distance_cm: u16::from_le_bytes([body[0], body[1]]),
        strength: u16::from_le_bytes([body[2], body[3]]),
        temperature_raw: u16::from_le_bytes([body[4], body[5]]),
        checksum_ok: (sum & 0xFF) as u8 == body[6],
    }
}

/// Pulls distance samples out of a raw sensor byte stream.
///
/// One decoder lives for one connection. Once the stream reports EOF or an
/// I/O error the decoder is closed and keeps returning
/// [`DistanceSample::NoReading`]; the caller reopens the source and builds a
/// new decoder.
pub struct FrameDecoder<R> {
    reader: BufReader<R>,
    read_timeout: Duration,
    verify_checksum: bool,
    closed: bool,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    /// Create a decoder over `reader`, bounding every byte read by `read_timeout`.
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(reader),
            read_timeout,
            verify_checksum: false,
            closed: false,
        }
    }

    /// Reject frames whose checksum byte does not match.
    #[must_use]
    pub const fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Whether the underlying stream has ended or failed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Decode the next sample.
    pub async fn next_sample(&mut self) -> DistanceSample {
        let Some(frame) = self.next_frame().await else {
            return DistanceSample::NoReading;
        };

        if self.verify_checksum && !frame.checksum_ok {
            debug!(distance_cm = frame.distance_cm, "Dropping frame with bad checksum");
            return DistanceSample::NoReading;
        }

        trace!(
            distance_cm = frame.distance_cm,
            strength = frame.strength,
            "Decoded sensor frame"
        );
        DistanceSample::Distance(frame.distance_cm)
    }

    /// Synchronise to the marker pair and read one frame body.
    pub async fn next_frame(&mut self) -> Option<SensorFrame> {
        if self.closed {
            return None;
        }

        let mut previous_was_marker = false;
        loop {
            let byte = self.read_byte().await?;
            if byte == FRAME_MARKER && previous_was_marker {
                break;
            }
            previous_was_marker = byte == FRAME_MARKER;
        }

        let mut body = [0u8; FRAME_BODY_LEN];
        for slot in &mut body {
            *slot = self.read_byte().await?;
        }

        Some(decode_frame(&body))
    }

    async fn read_byte(&mut self) -> Option<u8> {
        match tokio::time::timeout(self.read_timeout, self.reader.read_u8()).await {
            Ok(Ok(byte)) => Some(byte),
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Sensor stream closed");
                self.closed = true;
                None
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Sensor read failed");
                self.closed = true;
                None
            }
            Err(_) => {
                trace!(timeout_ms = self.read_timeout.as_millis(), "Sensor read timed out");
                None
            }
        }
    }
}
