// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//


//! Turns clip payloads into playable PCM.
//!
//! Clips are decoded entirely into memory so playback never touches the decoder.

use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use crate::error::SoundboardError;

/// Decoded clip audio: interleaved f32 samples at a known rate.
#[derive(Clone, PartialEq)]
pub struct DecodedAudio {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl DecodedAudio {
    /// Wraps interleaved samples.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Number of channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The playing time of the audio.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Returns the sample for the given frame, folding extra output channels onto the
    /// clip's last channel (mono clips play on every channel).
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channel = channel.min(self.channels as usize - 1);
        self.samples
            .get(frame * self.channels as usize + channel)
            .copied()
            .unwrap_or(0.0)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }

    /// Converts to another sample rate using linear interpolation. Good enough for one-shot
    /// soundboard clips.
    pub fn resampled(self, target_rate: u32) -> DecodedAudio {
        if self.sample_rate == target_rate || target_rate == 0 || self.sample_rate == 0 {
            return self;
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let channels = self.channels as usize;
        let source_frames = self.frames();
        let target_frames = (source_frames as f64 * ratio).ceil() as usize;

        let mut output = Vec::with_capacity(target_frames * channels);
        for target_frame in 0..target_frames {
            let source_pos = target_frame as f64 / ratio;
            let source_frame = source_pos.floor() as usize;
            let frac = source_pos.fract() as f32;

            for channel in 0..channels {
                let s0 = self
                    .samples
                    .get(source_frame * channels + channel)
                    .copied()
                    .unwrap_or(0.0);
                let s1 = self
                    .samples
                    .get((source_frame + 1) * channels + channel)
                    .copied()
                    .unwrap_or(s0);
                output.push(s0 + (s1 - s0) * frac);
            }
        }

        DecodedAudio {
            samples: output,
            channels: self.channels,
            sample_rate: target_rate,
        }
    }
}

impl std::fmt::Debug for DecodedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedAudio")
            .field("frames", &self.frames())
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Decodes a clip payload and converts it to the output sample rate.
pub fn decode(name: &str, bytes: &[u8], target_rate: u32) -> Result<DecodedAudio, SoundboardError> {
    let decode_error = |reason: String| SoundboardError::Decode {
        name: name.to_string(),
        reason,
    };

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let detected = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(e.to_string()))?;
    let mut format_reader = detected.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error("no audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(e.to_string()))?;

    let mut samples = Vec::new();
    let mut channels = 0u16;
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(decode_error(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = spec.channels.count() as u16;
                sample_rate = spec.rate;
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt frame; keep going with the rest of the stream.
                debug!(name, err = e, "Skipping undecodable packet");
            }
            Err(e) => return Err(decode_error(e.to_string())),
        }
    }

    if samples.is_empty() || channels == 0 {
        return Err(decode_error("no audio frames".to_string()));
    }

    let decoded = DecodedAudio::new(samples, channels, sample_rate);
    if decoded.sample_rate() != target_rate {
        debug!(
            name,
            source_rate = decoded.sample_rate(),
            target_rate,
            "Resampling clip"
        );
    }
    let decoded = decoded.resampled(target_rate);

    info!(
        name,
        channels = decoded.channels(),
        sample_rate = decoded.sample_rate(),
        duration_ms = decoded.duration().as_millis() as u64,
        memory_kb = decoded.memory_size() / 1024,
        "Clip decoded"
    );
    Ok(decoded)
}
