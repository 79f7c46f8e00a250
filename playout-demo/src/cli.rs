use crate::tone::ToneFeeder;
use anyhow::{Context, Result, bail};
use playout_core::*;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SAMPLE_RATE: u32 = 48_000;
const TONE_HZ: f32 = 440.0;
const TONE_SECS: f64 = 30.0;

/// Logs every notification the output stage delivers.
struct LoggingObserver;

impl OutputObserver for LoggingObserver {
    fn ready_to_play_changed(&self, ready: bool) {
        log::info!("Ready to play: {}", ready);
    }

    fn sample_rate_changed(&self, sample_rate: u32) {
        log::info!("Sample rate changed to {} Hz", sample_rate);
    }
}

fn streaming_stage(backend: Box<dyn AudioBackend>) -> Result<(OutputStage, ToneFeeder)> {
    let format = AudioFormat::stereo(SAMPLE_RATE);
    let (source, feeder) = ring_source(format, SAMPLE_RATE as usize / 2);
    let feeder = ToneFeeder::spawn(feeder, TONE_HZ, TONE_SECS)?;

    let desc = OutputStageDesc::default().format(format);
    let output = OutputStage::new(desc, Arc::new(Mutex::new(source)), backend)?;
    Ok((output, feeder))
}

pub fn list_devices() -> Result<()> {
    for name in CpalBackend::new().output_device_names()? {
        println!("{}", name);
    }
    Ok(())
}

pub fn run_script() -> Result<()> {
    let (mut output, _feeder) = streaming_stage(Box::new(CpalBackend::new()))?;
    let observer = Arc::new(LoggingObserver);
    output.set_observer(&observer);

    log::info!("Starting playback...");
    output.resume().context("Failed to start output")?;
    std::thread::sleep(Duration::from_secs(2));
    log::info!("Played {:.2}s", output.amount_played());

    log::info!("Pausing playback...");
    output.pause();
    std::thread::sleep(Duration::from_secs(1));
    log::info!("Still at {:.2}s", output.amount_played());

    log::info!("Resuming at half volume...");
    output.set_volume(0.5);
    output.resume()?;
    std::thread::sleep(Duration::from_secs(2));

    log::info!("Seeking to 10s...");
    output.seek(10.0);
    log::info!("Now at {:.2}s", output.amount_played());
    std::thread::sleep(Duration::from_secs(2));

    log::info!("Stopping playback...");
    output.stop();
    log::info!(
        "Done ({} underruns, {} frames of silence)",
        output.underrun_count(),
        output.underrun_frames()
    );
    Ok(())
}

pub fn run_offline() -> Result<()> {
    let format = AudioFormat::stereo(SAMPLE_RATE);
    let source = MemorySource::sine(format, TONE_HZ, 0.2, 5.0).shared();
    let backend = ManualBackend::new();
    let clock = backend.clock();
    let mut output = OutputStage::new(
        OutputStageDesc::default().format(format),
        source,
        Box::new(backend),
    )?;

    output.resume()?;
    let mut block = vec![0.0f32; 1024 * format.channels as usize];
    let mut peak = 0.0f32;
    while output.is_ready_to_play() {
        clock.render(&mut block);
        peak = block.iter().fold(peak, |m, s| m.max(s.abs()));
    }
    log::info!(
        "Rendered {:.3}s offline, peak {:.3}",
        output.amount_played(),
        peak
    );
    output.stop();
    Ok(())
}

pub fn run_interactive() -> Result<()> {
    let (mut output, _feeder) = streaming_stage(Box::new(CpalBackend::new()))?;
    let observer = Arc::new(LoggingObserver);
    output.set_observer(&observer);

    println!("commands: play | pause | stop | seek <secs> | volume <0..1> | rate <hz> | status | quit");
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "status" => print_status(&output),
            input => match parse_command(input) {
                Ok(command) => {
                    if let Err(e) = output.execute(command) {
                        log::error!("{:?} failed: {}", command, e);
                    }
                }
                Err(e) => println!("{}", e),
            },
        }
    }

    output.stop();
    Ok(())
}

fn print_status(output: &OutputStage) {
    println!(
        "{:?} | {} | {:.2}s played | volume {:.2} | ready {} | {} underruns",
        output.state(),
        output.format(),
        output.amount_played(),
        output.volume(),
        output.is_ready_to_play(),
        output.underrun_count()
    );
}

fn parse_command(input: &str) -> Result<TransportCommand> {
    let mut parts = input.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let arg = parts.next();

    let command = match (verb, arg) {
        ("play" | "resume", None) => TransportCommand::Resume,
        ("pause", None) => TransportCommand::Pause,
        ("stop", None) => TransportCommand::Stop,
        ("seek", Some(secs)) => TransportCommand::Seek(secs.parse().context("Invalid seek time")?),
        ("volume", Some(v)) => TransportCommand::SetVolume(v.parse().context("Invalid volume")?),
        ("rate", Some(hz)) => {
            TransportCommand::SetSampleRate(hz.parse().context("Invalid sample rate")?)
        }
        _ => bail!("Unknown command: {}", input),
    };
    Ok(command)
}
