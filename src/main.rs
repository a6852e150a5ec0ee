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

use clap::{crate_version, Parser, Subcommand};
use tracing::info;

use midiseq::config::PlayerConfig;
use midiseq::sequence::Sequence;
use midiseq::transport::Transport;
use midiseq::{midi, smf};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI sequence player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints a summary of a MIDI file.
    Info {
        /// The path to the MIDI file.
        path: PathBuf,
    },
    /// Prints the bar, beat and remainder of a tick in a MIDI file.
    Position {
        /// The path to the MIDI file.
        path: PathBuf,
        /// The tick to map.
        tick: u64,
    },
    /// Lists the available MIDI output devices.
    Devices {},
    /// Plays a MIDI file through a MIDI output.
    Play {
        /// The path to the MIDI file.
        path: PathBuf,
        /// The MIDI device name to play through. Overrides the config.
        #[arg[short, long]]
        device: Option<String>,
        /// The tick to start playing from.
        #[arg[short, long, default_value_t = 0]]
        start: u64,
        /// The path to the player config.
        #[arg[short, long]]
        config: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { path } => {
            let sequence = smf::read_file(&path)?;
            print_info(&sequence);
        }
        Commands::Position { path, tick } => {
            let sequence = smf::read_file(&path)?;
            println!("{}", sequence.bar_beat_pulse_str(tick));
        }
        Commands::Devices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            path,
            device,
            start,
            config,
        } => play(&path, device, start, config.as_deref()).await?,
    }

    Ok(())
}

fn print_info(sequence: &Sequence) {
    println!("{}", sequence);
    for (index, track) in sequence.tracks().iter().enumerate() {
        println!("- {}: {}", index, track);
    }

    let controllers = sequence.controllers();
    let referenced: Vec<String> = controllers
        .referenced()
        .filter_map(|controller| controllers.info(controller))
        .map(|info| {
            let range = info.range();
            format!("{} ({}-{})", info.name(), range.start(), range.end())
        })
        .collect();
    if !referenced.is_empty() {
        println!("\nControllers (count: {}):", referenced.len());
        for name in referenced {
            println!("- {}", name);
        }
    }
}

async fn play(
    path: &Path,
    device: Option<String>,
    start: u64,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let mut config = PlayerConfig::load(config_path)?;
    if let Some(device) = device {
        config.set_device(device);
    }
    let device = config
        .device()
        .ok_or("no MIDI device given, use --device or the config file")?;

    let mut sequence = smf::read_file(path)?;
    sequence.set_play_cursor(start);
    let sequencer = midi::get_device(device, config.client_name())?;
    info!(device = sequencer.name(), "Playing.");

    let mut transport = Transport::new(sequence, sequencer, config.buffer_quarter_notes());
    transport
        .run(config.refill_interval()?, async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await?;

    println!("Stopped at {}", transport.position_string());
    Ok(())
}
