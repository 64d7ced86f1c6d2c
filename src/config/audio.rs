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

use serde::Deserialize;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Audio {
    /// The output device. The system default when unset; names starting with "mock" select
    /// an output that plays nothing.
    device: Option<String>,

    /// Output sample rate in Hz (default: the device's).
    sample_rate: Option<u32>,

    /// Output channel count (default: the device's).
    channels: Option<u16>,
}

impl Audio {
    /// New will create a new Audio configuration for the named device.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            sample_rate: None,
            channels: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn channels(&self) -> Option<u16> {
        self.channels
    }
}
