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

use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use tracing::{info, warn};

use crate::config;
use crate::error::SoundboardError;

pub mod automation;
pub mod clip;
pub mod context;
pub mod cpal;
pub mod decode;
pub mod mock;
pub mod tone;

pub use automation::Automation;
pub use clip::ClipHandle;
pub use context::{ContextError, ContextState, OutputContext, SourceEvent, SourceHandle, SourceId};
pub use decode::{decode, DecodedAudio};
pub use tone::{ToneHandle, ToneSynthesizer};

/// Something that can open the output context, usually backed by an audio device.
pub trait Backend: fmt::Display + Send {
    /// Opens a new context. Ended sources are reported on `events`.
    fn open(&self, events: Sender<SourceEvent>) -> Result<OutputContext, SoundboardError>;
}

/// Gets the backend for the configured device.
pub fn get_backend(config: &config::Audio) -> Box<dyn Backend> {
    match config.device() {
        Some(device) if device.starts_with("mock") => Box::new(mock::Backend::new(
            config.channels().unwrap_or(2),
            config.sample_rate().unwrap_or(44100),
        )),
        _ => Box::new(cpal::Backend::new(config.clone())),
    }
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::Device>, SoundboardError> {
    cpal::Device::list()
}

/// Holds the one output context of the process. The context is opened on first use and
/// resumed every time it is handed out.
pub struct AudioOutput {
    backend: Box<dyn Backend>,
    context: Option<OutputContext>,
    events_tx: Sender<SourceEvent>,
    events_rx: Receiver<SourceEvent>,
}

impl AudioOutput {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            backend,
            context: None,
            events_tx,
            events_rx,
        }
    }

    /// Source events of the context, whenever it gets opened.
    pub fn events(&self) -> Receiver<SourceEvent> {
        self.events_rx.clone()
    }

    /// Returns the running context, opening it first if needed. A closed context is returned
    /// as is; starting anything on it fails.
    pub fn context(&mut self) -> Result<&OutputContext, SoundboardError> {
        if self.context.is_none() {
            info!(backend = %self.backend, "Opening audio output");
            self.context = Some(self.backend.open(self.events_tx.clone())?);
        }
        let Some(context) = self.context.as_ref() else {
            return Err(SoundboardError::Output("audio output is unavailable".to_string()));
        };

        if context.state() == ContextState::Suspended {
            if let Err(e) = context.resume() {
                warn!(err = %e, "Unable to resume audio context");
            }
        }
        Ok(context)
    }

    /// The context, if it has been opened.
    pub fn current(&self) -> Option<&OutputContext> {
        self.context.as_ref()
    }

    /// Closes the context. It stays closed; nothing plays after this.
    pub fn close(&mut self) {
        if let Some(context) = self.context.as_ref() {
            context.close();
        }
    }
}

impl fmt::Debug for AudioOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioOutput")
            .field("backend", &self.backend.to_string())
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_lazy_and_resumed() {
        let backend = mock::Backend::new(2, 1000);
        let mut output = AudioOutput::new(Box::new(backend.clone()));
        assert!(output.current().is_none());
        assert_eq!(backend.opened(), 0);

        let context = output.context().unwrap().clone();
        assert_eq!(context.state(), ContextState::Running);

        // Reused, and resumed again after a suspend.
        context.suspend();
        assert_eq!(output.context().unwrap().state(), ContextState::Running);
        assert_eq!(backend.opened(), 1);
    }

    #[test]
    fn test_closed_output_stays_closed() {
        let backend = mock::Backend::new(2, 1000);
        let mut output = AudioOutput::new(Box::new(backend.clone()));
        output.context().unwrap();
        output.close();

        assert_eq!(output.context().unwrap().state(), ContextState::Closed);
        assert_eq!(backend.opened(), 1);
    }

    #[test]
    fn test_open_failure() {
        let backend = mock::Backend::new(2, 1000);
        backend.fail_open(true);
        let mut output = AudioOutput::new(Box::new(backend.clone()));

        assert!(matches!(output.context(), Err(SoundboardError::Output(_))));
        backend.fail_open(false);
        assert!(output.context().is_ok());
    }

    #[test]
    fn test_mock_backend_from_config() {
        let backend = get_backend(&config::Audio::new("mock-device"));
        assert_eq!(backend.to_string(), "mock (Channels=2) (44100 Hz)");
    }
}
