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
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use autosampler::audio::SymphoniaDecoder;
use autosampler::autosampler::export::{write_take, write_wav};
use autosampler::autosampler::CapturePlan;
use autosampler::config::EngineConfig;
use autosampler::engine::{read_midi_file, NoteEvent, TimedEvent};
use autosampler::offline::OfflineHost;
use autosampler::util::{ms_to_samples, note_name};
use autosampler::zones::{LibraryHandle, ZoneLibrary, ZoneLoader, ZoneState};
use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A polyphonic sample player with an automatic multi-sampler."
)]
struct Cli {
    /// Engine configuration file (YAML). AUTOSAMPLER_* environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Loads zones and prints the resulting library.
    Zones {
        /// A folder of samples, or a zone state file saved with --save.
        path: PathBuf,
        /// Save the loaded zones as a state file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Prints the timeline of the configured auto-sampling run.
    Plan {},
    /// Plays notes through the zones and writes the result as a WAV file.
    Render {
        /// A folder of samples, or a zone state file.
        zones: PathBuf,
        /// The WAV file to write.
        output: PathBuf,
        /// Comma separated MIDI notes to play together.
        #[arg(long, default_value = "60")]
        notes: String,
        /// A standard MIDI file to play instead of --notes.
        #[arg(long)]
        midi_file: Option<PathBuf>,
        /// Velocity of every note.
        #[arg(long, default_value_t = 100)]
        velocity: u8,
        /// How long the notes are held.
        #[arg(long, default_value_t = 1000.0)]
        hold_ms: f32,
        /// How long to keep rendering after the notes are released.
        #[arg(long, default_value_t = 1000.0)]
        tail_ms: f32,
    },
    /// Auto-samples the zones through the engine itself and writes the takes.
    Sample {
        /// A folder of samples, or a zone state file.
        zones: PathBuf,
        /// The folder takes are written to.
        output: PathBuf,
        /// Save the zones plus the new takes as a state file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Zones { path, save } => {
            let loader = loader();
            let library = load_zones(&loader, &path)?;
            println!("{}", library.summary());
            if let Some(save) = save {
                ZoneState::from_library(&library).save(&save)?;
                println!("Saved zone state to {}.", save.display());
            }
        }
        Commands::Plan {} => {
            let plan = CapturePlan::new(&config.autosampler, config.sample_rate as f64)?;
            println!(
                "Takes: {} ({} frames each, {:.2}s total)",
                plan.expected_takes,
                plan.take_samples,
                plan.total_samples() as f64 / plan.sample_rate
            );
            for event in plan.events.iter().filter(|e| e.note_on) {
                let midi: Vec<String> = event
                    .note_event()
                    .to_midi_bytes()
                    .iter()
                    .map(|b| format!("{:02X}", b))
                    .collect();
                println!(
                    "- {:>10} {} V{} ({}-{}) RR{} velocity {} [{}]",
                    event.sample_position,
                    note_name(event.note),
                    event.velocity_layer,
                    event.velocity_low,
                    event.velocity_high,
                    event.round_robin,
                    event.velocity,
                    midi.join(" ")
                );
            }
        }
        Commands::Render {
            zones,
            output,
            notes,
            midi_file,
            velocity,
            hold_ms,
            tail_ms,
        } => {
            let loader = loader();
            load_zones(&loader, &zones)?;

            let sample_rate = config.sample_rate as f64;
            let events = match midi_file {
                Some(midi_file) => read_midi_file(&midi_file, sample_rate)?,
                None => chord(&notes, velocity, ms_to_samples(sample_rate, hold_ms))?,
            };
            let end = events.iter().map(|e| e.offset).max().unwrap_or(0);
            let frames = end + ms_to_samples(sample_rate, tail_ms);

            let mut host = OfflineHost::new(
                config.build_engine(loader.library().clone())?,
                config.block_size,
            );
            let audio = host.render(&events, frames);
            write_wav(&audio, &output)?;
            println!(
                "Wrote {} frames (peak {:.3}) to {}.",
                audio.frames(),
                audio.peak(),
                output.display()
            );
        }
        Commands::Sample {
            zones,
            output,
            save,
        } => {
            let loader = loader();
            load_zones(&loader, &zones)?;

            let mut host = OfflineHost::new(
                config.build_engine(loader.library().clone())?,
                config.block_size,
            );
            let takes = host.sample_loopback(&config.autosampler)?;

            std::fs::create_dir_all(&output)?;
            match save {
                Some(save) => {
                    let library = loader.import_takes(&takes, &output)?;
                    ZoneState::from_library(&library).save(&save)?;
                    println!("Saved zone state to {}.", save.display());
                }
                None => {
                    for take in takes.iter() {
                        write_take(take, &output)?;
                    }
                }
            }
            for take in takes.iter() {
                println!(
                    "- {} ({:.2}s)",
                    take.info.suggested_file_name(),
                    take.duration_secs()
                );
            }
            println!("Wrote {} takes to {}.", takes.len(), output.display());
        }
    }

    Ok(())
}

/// Note ons for every note at the start, and note offs after `hold` frames.
fn chord(notes: &str, velocity: u8, hold: usize) -> Result<Vec<TimedEvent>, Box<dyn Error>> {
    let notes = notes
        .split(',')
        .map(|note| note.trim().parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()?;

    let mut events: Vec<TimedEvent> = notes
        .iter()
        .map(|&note| {
            TimedEvent::new(
                0,
                NoteEvent::NoteOn {
                    channel: 1,
                    note,
                    velocity,
                },
            )
        })
        .collect();
    events.extend(
        notes
            .iter()
            .map(|&note| TimedEvent::new(hold, NoteEvent::NoteOff { channel: 1, note })),
    );
    Ok(events)
}

fn loader() -> ZoneLoader {
    ZoneLoader::new(Arc::new(SymphoniaDecoder), LibraryHandle::new())
}

/// Loads a sample folder, or restores a zone state file.
fn load_zones(loader: &ZoneLoader, path: &Path) -> Result<Arc<ZoneLibrary>, Box<dyn Error>> {
    if path.is_dir() {
        return Ok(loader.load_folder(path)?);
    }

    let library = ZoneState::load(path)?.restore(loader);
    if library.is_empty() {
        return Err(format!("no zones could be restored from {}", path.display()).into());
    }
    Ok(library)
}
