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
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::info;

use crate::audio::{OutputContext, SourceEvent};
use crate::error::SoundboardError;

/// A mock backend. Doesn't actually play anything: audio only advances when the context is
/// rendered by hand.
#[derive(Clone)]
pub struct Backend {
    channels: u16,
    sample_rate: u32,
    fail_open: Arc<AtomicBool>,
    opened: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<OutputContext>>>,
}

impl Backend {
    pub fn new(channels: u16, sample_rate: u32) -> Backend {
        Backend {
            channels,
            sample_rate,
            fail_open: Arc::new(AtomicBool::new(false)),
            opened: Arc::new(AtomicUsize::new(0)),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes the next opens fail.
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::Relaxed);
    }

    /// How many contexts have been opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// The most recently opened context.
    pub fn context(&self) -> Option<OutputContext> {
        self.last.lock().clone()
    }
}

impl super::Backend for Backend {
    fn open(&self, events: Sender<SourceEvent>) -> Result<OutputContext, SoundboardError> {
        if self.fail_open.load(Ordering::Relaxed) {
            return Err(SoundboardError::Output("mock device unavailable".to_string()));
        }

        info!(channels = self.channels, sample_rate = self.sample_rate, "Opening mock output");
        let context = OutputContext::new(self.channels, self.sample_rate, events);
        self.opened.fetch_add(1, Ordering::Relaxed);
        *self.last.lock() = Some(context.clone());
        Ok(context)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mock (Channels={}) ({} Hz)",
            self.channels, self.sample_rate
        )
    }
}
