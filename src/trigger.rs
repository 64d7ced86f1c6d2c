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


//! The fixed set of soundboard triggers and their fallback tone parameters.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SoundboardError;

/// Synthesis parameters for a trigger's fallback tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    /// The transient label shown while the tone plays.
    pub text: &'static str,
    /// Multiplier applied to the 440 Hz base frequency.
    pub pitch: f32,
    /// Total length of the tone in milliseconds.
    pub duration_ms: u32,
}

impl ToneSpec {
    /// The tone frequency in Hz.
    pub fn frequency(&self) -> f32 {
        440.0 * self.pitch
    }

    /// The tone length.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms.into())
    }
}

/// One named soundboard button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Trigger {
    /// "tor"
    Goal,
    /// "7meter"
    SevenMeter,
    /// "parade"
    Save,
    /// "rote-karte"
    RedCard,
    /// "2-minuten"
    TwoMinutes,
    /// "timeout"
    Timeout,
    /// "sieg"
    Victory,
}

const GOAL_TONES: [ToneSpec; 1] = [ToneSpec {
    text: "TOOOOOOR!",
    pitch: 1.2,
    duration_ms: 2000,
}];
const SEVEN_METER_TONES: [ToneSpec; 1] = [ToneSpec {
    text: "Sieben Meter!",
    pitch: 1.0,
    duration_ms: 1500,
}];
const SAVE_TONES: [ToneSpec; 1] = [ToneSpec {
    text: "Parade!",
    pitch: 1.1,
    duration_ms: 1000,
}];
const RED_CARD_TONES: [ToneSpec; 1] = [ToneSpec {
    text: "Rote Karte!",
    pitch: 0.7,
    duration_ms: 2000,
}];
const TWO_MINUTES_TONES: [ToneSpec; 1] = [ToneSpec {
    text: "Zwei Minuten!",
    pitch: 0.8,
    duration_ms: 1800,
}];
const TIMEOUT_TONES: [ToneSpec; 1] = [ToneSpec {
    text: "Timeout!",
    pitch: 0.9,
    duration_ms: 1200,
}];
const VICTORY_TONES: [ToneSpec; 1] = [ToneSpec {
    text: "SIEG!",
    pitch: 1.3,
    duration_ms: 2500,
}];

impl Trigger {
    /// Every trigger, in board order.
    pub const ALL: [Trigger; 7] = [
        Trigger::Goal,
        Trigger::SevenMeter,
        Trigger::Save,
        Trigger::RedCard,
        Trigger::TwoMinutes,
        Trigger::Timeout,
        Trigger::Victory,
    ];

    /// The stable key used in persisted libraries and on the command line.
    pub fn key(self) -> &'static str {
        match self {
            Trigger::Goal => "tor",
            Trigger::SevenMeter => "7meter",
            Trigger::Save => "parade",
            Trigger::RedCard => "rote-karte",
            Trigger::TwoMinutes => "2-minuten",
            Trigger::Timeout => "timeout",
            Trigger::Victory => "sieg",
        }
    }

    /// Looks up a trigger by its key.
    pub fn from_key(key: &str) -> Option<Trigger> {
        Trigger::ALL.into_iter().find(|trigger| trigger.key() == key)
    }

    /// The name shown in the status display.
    pub fn display_name(self) -> &'static str {
        match self {
            Trigger::Goal => "TOR!",
            Trigger::SevenMeter => "7-METER",
            Trigger::Save => "PARADE",
            Trigger::RedCard => "ROTE KARTE",
            Trigger::TwoMinutes => "2 MINUTEN",
            Trigger::Timeout => "TIMEOUT",
            Trigger::Victory => "SIEG!",
        }
    }

    /// The fallback tone variations for this trigger. Never empty.
    pub fn tones(self) -> &'static [ToneSpec] {
        match self {
            Trigger::Goal => &GOAL_TONES,
            Trigger::SevenMeter => &SEVEN_METER_TONES,
            Trigger::Save => &SAVE_TONES,
            Trigger::RedCard => &RED_CARD_TONES,
            Trigger::TwoMinutes => &TWO_MINUTES_TONES,
            Trigger::Timeout => &TIMEOUT_TONES,
            Trigger::Victory => &VICTORY_TONES,
        }
    }
}

impl FromStr for Trigger {
    type Err = SoundboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trigger::from_key(s).ok_or_else(|| SoundboardError::UnknownTrigger(s.to_string()))
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
