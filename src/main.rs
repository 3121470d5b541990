//! modular-host - headless node-graph audio host
//!
//! Loads settings, builds a graph (from a patch file or a small demo) and
//! runs it on the system audio device, or renders it offline.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use modular_host::config::Settings;
use modular_host::engine::{
    self, AudioDriver, CpalDriver, MidiEngine, OfflineDriver, DEFAULT_MIDI_BUFFER_SIZE,
};
use modular_host::graph::PortRef;
use modular_host::persistence::Patch;
use modular_host::plugin::PluginDescriptor;
use modular_host::world::World;

#[derive(Parser)]
#[command(name = "modular-host")]
#[command(author, version, about = "Node-graph audio host", long_about = None)]
struct Cli {
    /// Settings file (default: the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Patch to load instead of the demo graph
    #[arg(long)]
    patch: Option<PathBuf>,

    /// How long to run on the audio device
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,

    /// List audio and MIDI devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Render this many blocks offline and print peak levels
    #[arg(long, value_name = "BLOCKS")]
    offline: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path),
        None => Settings::load_default(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("modular-host: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.level)),
        )
        .init();

    match run(cli, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "modular-host failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, settings: Settings) -> Result<(), Box<dyn Error>> {
    if cli.list_devices {
        list_devices();
        return Ok(());
    }

    if let Some(blocks) = cli.offline {
        return render_offline(&cli, settings, blocks);
    }

    let config = settings.device_config();
    let mut midi = None;
    let driver: Box<dyn AudioDriver> = Box::new(CpalDriver::new(settings.audio.output_device.clone()));
    let midi_port = settings.audio.midi_input.clone();
    let mut world = World::new(settings, driver);

    if let Some(port) = midi_port {
        let (mut midi_engine, feed) = MidiEngine::new(DEFAULT_MIDI_BUFFER_SIZE);
        match midi_engine.connect_by_name(&port) {
            Ok(()) => {
                world.engine_mut().set_midi_feed(feed);
                midi = Some(midi_engine);
            }
            Err(e) => warn!(port = %port, error = %e, "MIDI input unavailable"),
        }
    }

    build_graph(&mut world, cli.patch.as_ref())?;
    world.engine_mut().prepare(config)?;
    world.engine_mut().start()?;
    info!(seconds = cli.seconds, "running");

    let deadline = Instant::now() + Duration::from_secs_f64(cli.seconds.max(0.0));
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
        world.engine_mut().collect_garbage();
    }

    let metrics = world.engine_mut().collect_garbage();
    info!(
        callbacks = metrics.callbacks,
        plan_swaps = metrics.plan_swaps,
        dropped_events = metrics.dropped_events,
        "stopping"
    );
    world.engine_mut().stop()?;
    if let Some(mut midi) = midi {
        midi.disconnect();
    }
    Ok(())
}

fn render_offline(cli: &Cli, settings: Settings, blocks: usize) -> Result<(), Box<dyn Error>> {
    let config = settings.device_config();
    let driver = OfflineDriver::new();
    let mut world = World::new(settings, Box::new(driver.clone()));

    build_graph(&mut world, cli.patch.as_ref())?;
    world.engine_mut().prepare(config)?;
    world.engine_mut().start()?;
    let output = driver.render(blocks)?;
    world.engine_mut().stop()?;

    let channels = config.output_channels.max(1);
    let mut peaks = vec![0.0f32; channels];
    for frame in output.chunks(channels) {
        for (peak, sample) in peaks.iter_mut().zip(frame) {
            *peak = peak.max(sample.abs());
        }
    }
    println!(
        "rendered {} frames at {} Hz",
        output.len() / channels,
        config.sample_rate
    );
    for (channel, peak) in peaks.iter().enumerate() {
        let db = if *peak > 0.0 { 20.0 * peak.log10() } else { f32::NEG_INFINITY };
        println!("  channel {channel}: peak {peak:.4} ({db:.1} dBFS)");
    }
    Ok(())
}

/// Loads `patch`, or builds sine -> gain -> audio output.
fn build_graph(world: &mut World, patch: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    if let Some(path) = patch {
        let patch = Patch::load(path)?;
        world.load_patch(&patch)?;
        info!(patch = %patch.name, "patch loaded");
        return Ok(());
    }

    let osc = world.add_plugin(&PluginDescriptor::builtin("osc.sine"))?;
    let gain = world.add_plugin(&PluginDescriptor::builtin("util.gain"))?;
    let out = world.add_plugin(&PluginDescriptor::builtin("io.audio_out"))?;
    world.engine().set_parameter(gain, "level", 0.2)?;

    let engine = world.engine_mut();
    engine.connect(PortRef::new(osc, 0), PortRef::new(gain, 0))?;
    engine.connect(PortRef::new(gain, 0), PortRef::new(out, 0))?;
    info!("demo graph built");
    Ok(())
}

fn list_devices() {
    println!("Audio devices:");
    for device in engine::enumerate_devices() {
        println!(
            "  [{}] {} ({}){}",
            device.index,
            device.name,
            if device.is_input { "input" } else { "output" },
            if device.is_default { " (default)" } else { "" }
        );
    }

    println!("MIDI inputs:");
    match engine::midi_engine::enumerate_devices() {
        Ok(ports) if ports.is_empty() => println!("  (none)"),
        Ok(ports) => {
            for port in ports {
                println!("  [{}] {}", port.index, port.name);
            }
        }
        Err(e) => println!("  unavailable: {e}"),
    }
}
