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

use std::{fmt, thread, time::Duration};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use tracing::{debug, error, info, span, Level};

use crate::audio::{ContextState, OutputContext, SourceEvent};
use crate::config;
use crate::error::SoundboardError;

/// How often the output thread checks whether the context has been closed.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn output_error(e: impl fmt::Display) -> SoundboardError {
    SoundboardError::Output(e.to_string())
}

/// An output device known to cpal.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
}

impl Device {
    /// Lists cpal output devices across every available host.
    pub fn list() -> Result<Vec<Device>, SoundboardError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout().map_err(output_error)?;
        let _shh_stderr = shh::stderr().map_err(output_error)?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(e) => {
                    error!(err = %e, host = host_id.name(), "Unable to open host");
                    continue;
                }
            };
            let host_devices = match host.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = %e,
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name().map_err(output_error)?,
                        max_channels,
                        host_id,
                    });
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Plays the output context through a cpal device.
pub struct Backend {
    config: config::Audio,
}

impl Backend {
    pub fn new(config: config::Audio) -> Backend {
        Backend { config }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpal ({})", self.config.device().unwrap_or("default"))
    }
}

impl super::Backend for Backend {
    /// Starts an output thread that owns the stream (cpal streams aren't Send) and keeps it
    /// alive until the context is closed.
    fn open(&self, events: Sender<SourceEvent>) -> Result<OutputContext, SoundboardError> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let config = self.config.clone();

        thread::Builder::new()
            .name("soundboard-output".to_string())
            .spawn(move || {
                let span = span!(Level::INFO, "audio output");
                let _enter = span.enter();

                let (stream, context) = match open_stream(&config, events) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(context.clone())).is_err() {
                    return;
                }

                while context.state() != ContextState::Closed {
                    thread::sleep(CLOSE_POLL_INTERVAL);
                }
                drop(stream);
                debug!("Output stream released");
            })
            .map_err(output_error)?;

        ready_rx
            .recv()
            .map_err(|_| output_error("output thread exited before the stream opened"))?
    }
}

fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, SoundboardError> {
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| output_error("no default output device")),
        Some(name) => {
            let mut devices = host.output_devices().map_err(output_error)?;
            devices
                .find(|device| device.name().is_ok_and(|n| n.trim() == name))
                .ok_or_else(|| output_error(format!("no output device named '{}'", name)))
        }
    }
}

fn open_stream(
    config: &config::Audio,
    events: Sender<SourceEvent>,
) -> Result<(cpal::Stream, OutputContext), SoundboardError> {
    let host = cpal::default_host();
    let device = find_device(&host, config.device())?;
    let default_config = device.default_output_config().map_err(output_error)?;

    let sample_rate = config
        .sample_rate()
        .unwrap_or(default_config.sample_rate().0);
    let channels = config.channels().unwrap_or(default_config.channels());
    let stream_config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let context = OutputContext::new(channels, sample_rate, events);
    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, context.clone()),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, context.clone()),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, context.clone()),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, context.clone()),
        other => {
            return Err(output_error(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(output_error)?;
    stream.play().map_err(output_error)?;

    info!(
        device = %device.name().unwrap_or_default(),
        channels,
        sample_rate,
        "Output stream started"
    );
    Ok((stream, context))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    context: OutputContext,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            context.render(&mut scratch);
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src.clamp(-1.0, 1.0));
            }
        },
        |err| error!(err = %err, "Output stream error"),
        None,
    )
}
