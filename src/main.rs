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

use clap::{crate_version, Parser, Subcommand};
use soundboard::audio::{self, AudioOutput};
use soundboard::config::Settings;
use soundboard::error::SoundboardError;
use soundboard::labels::{Control, LabelController};
use soundboard::library::{DirectoryStore, SoundLibrary, Upload};
use soundboard::playback::{PlaybackCoordinator, PlaybackOptions, PlaybackState};
use soundboard::soundboard::{Command, DecodePool, Notifier, Soundboard};
use soundboard::status::{file_count_label, Status, StatusProjector, StatusSink};
use soundboard::trigger::Trigger;
use std::error::Error;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::thread;
use tracing_subscriber::EnvFilter;

const DECODE_THREADS: usize = 2;

const CONSOLE_HELP: &str = r#"
Commands:
  <trigger>                  play a trigger (tor, 7meter, parade, rote-karte, 2-minuten, timeout, sieg)
  stop                       stop with a fade; twice in a row forces
  halt                       stop without a fade
  force                      mute and stop everything
  volume <0.0-1.0>           set the volume
  preview <trigger> <name>   play one clip alongside everything else
  add <trigger> <file>       add an MP3 file
  remove <trigger> <name>    remove a clip
  clear <trigger>            remove every clip of a trigger
  help                       show this text
  quit                       stop and exit
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A handball soundboard."
)]
struct Cli {
    /// The path to the soundboard config.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the triggers and their fallback tones.
    Triggers {},
    /// Prints the status of the sound library.
    Status {},
    /// Adds MP3 files to a trigger.
    Add {
        /// The trigger key, e.g. tor.
        trigger: String,
        /// The files to add.
        files: Vec<PathBuf>,
    },
    /// Removes a clip from a trigger.
    Remove {
        /// The trigger key.
        trigger: String,
        /// The clip name, without the .mp3 extension.
        name: String,
    },
    /// Removes every clip of a trigger.
    Clear {
        /// The trigger key.
        trigger: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Starts the soundboard, reading commands from stdin.
    Start {},
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = match cli.config.as_deref() {
        Some(path) => Settings::deserialize(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Triggers {} => {
            println!("Triggers:");
            for trigger in Trigger::ALL {
                for tone in trigger.tones() {
                    println!(
                        "- {} ({}): \"{}\" {:.0} Hz, {} ms",
                        trigger,
                        trigger.display_name(),
                        tone.text,
                        tone.frequency(),
                        tone.duration_ms
                    );
                }
            }
        }
        Commands::Status {} => {
            let library = load_library(&settings);
            let status =
                StatusProjector::project(&PlaybackState::new(settings.volume()), &library);
            println!("{}", status);
            for (trigger, count) in &status.library.per_trigger {
                println!("- {}: {}", trigger.display_name(), file_count_label(*count));
                for clip in library.clips(*trigger) {
                    println!("    {}", clip.name());
                }
            }
        }
        Commands::Add { trigger, files } => {
            let trigger: Trigger = trigger.parse()?;
            if files.is_empty() {
                return Err("no files given".into());
            }
            let uploads = files
                .iter()
                .map(|path| Upload::from_path(trigger, path))
                .collect::<Result<Vec<_>, _>>()?;

            let mut library = load_library(&settings);
            let persisted = library.add_clips(uploads);
            for error in &persisted.value.rejected {
                println!("Rejected: {}", error);
            }
            println!(
                "Added {} clip(s) to {}.",
                persisted.value.added.len(),
                trigger.display_name()
            );
            persisted.saved?;
        }
        Commands::Remove { trigger, name } => {
            let trigger: Trigger = trigger.parse()?;
            let mut library = load_library(&settings);
            let persisted = library.remove_clip(trigger, &name);
            if persisted.value.is_none() {
                return Err(SoundboardError::ClipNotFound { trigger, name }.into());
            }
            persisted.saved?;
            println!("Removed {} from {}.", name, trigger.display_name());
        }
        Commands::Clear { trigger } => {
            let trigger: Trigger = trigger.parse()?;
            let mut library = load_library(&settings);
            let cleared = library.clear_clips(trigger).into_result()?;
            println!(
                "Removed {} clip(s) from {}.",
                cleared.len(),
                trigger.display_name()
            );
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Start {} => start(&settings)?,
    }

    Ok(())
}

fn load_library(settings: &Settings) -> SoundLibrary {
    SoundLibrary::load(Box::new(DirectoryStore::new(settings.library_path())))
}

/// Runs the soundboard on its own thread and feeds it commands typed on stdin.
fn start(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let timings = settings.timings()?;

    let mut labels = LabelController::new(timings.label_restore);
    for trigger in Trigger::ALL {
        labels.bind(trigger, Box::new(ConsoleControl::new(trigger)));
    }
    let mut status = StatusProjector::new();
    status.subscribe(Box::new(ConsoleStatus));

    let coordinator = PlaybackCoordinator::new(
        load_library(settings),
        labels,
        status,
        AudioOutput::new(audio::get_backend(&settings.audio())),
        PlaybackOptions {
            volume: settings.volume(),
            tone_level: settings.tone_level(),
            fade_out: timings.fade_out,
        },
    );
    let board = Soundboard::new(
        coordinator,
        DecodePool::new(DECODE_THREADS)?,
        Box::new(ConsoleNotifier),
        timings.double_press,
    );

    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = thread::Builder::new()
        .name("soundboard".to_string())
        .spawn(move || board.run(rx))?;

    println!("{}", CONSOLE_HELP);
    for line in io::stdin().lock().lines() {
        let line = line?;
        match parse_command(&line) {
            Ok(Some(command)) => {
                let shutdown = matches!(command, Command::Shutdown);
                if tx.send(command).is_err() || shutdown {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
    }

    drop(tx);
    handle
        .join()
        .map_err(|_| "soundboard thread panicked".to_string())?;
    Ok(())
}

/// Parses one console line. Blank lines and `help` yield no command.
fn parse_command(line: &str) -> Result<Option<Command>, Box<dyn Error>> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(None);
    };
    let rest = words.collect::<Vec<_>>();

    let command = match (first, rest.as_slice()) {
        ("help", _) => {
            println!("{}", CONSOLE_HELP);
            return Ok(None);
        }
        ("quit" | "exit", _) => Command::Shutdown,
        ("stop", _) => Command::StopPressed,
        ("halt", _) => Command::StopImmediately,
        ("force", _) => Command::ForceStop,
        ("volume", [volume]) => Command::SetVolume(volume.parse()?),
        ("preview", [trigger, name @ ..]) if !name.is_empty() => {
            Command::Preview(trigger.parse()?, name.join(" "))
        }
        ("add", [trigger, path @ ..]) if !path.is_empty() => {
            let trigger: Trigger = trigger.parse()?;
            let path = path.join(" ");
            Command::AddClips(vec![Upload::from_path(trigger, Path::new(&path))?])
        }
        ("remove", [trigger, name @ ..]) if !name.is_empty() => {
            Command::RemoveClip(trigger.parse()?, name.join(" "))
        }
        ("clear", [trigger]) => Command::ClearClips(trigger.parse()?),
        ("volume" | "preview" | "add" | "remove" | "clear", _) => {
            return Err(format!("missing arguments for '{}', try 'help'", first).into())
        }
        (trigger, []) => Command::Activate(trigger.parse()?),
        _ => return Err(format!("unknown command '{}', try 'help'", line.trim()).into()),
    };
    Ok(Some(command))
}

/// Prints label changes of one trigger's control.
struct ConsoleControl {
    trigger: Trigger,
    label: String,
    active: bool,
}

impl ConsoleControl {
    fn new(trigger: Trigger) -> ConsoleControl {
        ConsoleControl {
            trigger,
            label: trigger.display_name().to_string(),
            active: false,
        }
    }
}

impl Control for ConsoleControl {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn set_label(&mut self, text: &str) {
        self.label = text.to_string();
        println!("[{}] {}", self.trigger, self.label);
    }

    fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            println!(
                "[{}] {}",
                self.trigger,
                if active { "aktiv" } else { "bereit" }
            );
        }
    }
}

struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn publish(&mut self, status: &Status) {
        println!("{}", status);
    }
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&mut self, error: &SoundboardError) {
        eprintln!("Error: {}", error);
    }
}
