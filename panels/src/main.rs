use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use cvpanel::config::config_dir;
use cvpanel::prelude::*;
use log::{info, warn};

mod pages;
use pages::{envelope, oscillator, scope, sequencer, unpatched};

/// Runs the panel headless against a recording surface, with a synthetic
/// controller turning dials and paging through the registered pages.
#[derive(Parser, Debug)]
#[command(name = "panels", version, about)]
struct Args {
    /// Page to show first. Defaults to the first page of the first mode.
    page: Option<String>,

    /// How long to run before shutting down.
    #[arg(short, long, default_value_t = 10.0)]
    seconds: f32,

    /// Synthetic hardware changes per second. 0 disables the simulator.
    #[arg(short, long, default_value_t = 30.0)]
    rate: f32,

    /// Where parameter values are persisted.
    #[arg(long)]
    storage_dir: Option<String>,

    /// MIDI input to listen on for control changes.
    #[arg(long)]
    midi_port: Option<String>,

    /// MIDI channel (0-15) mapped onto the synth controls.
    #[arg(long, default_value_t = 0)]
    midi_channel: u8,

    #[arg(long)]
    list_ports: bool,
}

fn main() {
    init_logger();
    let args = Args::parse();

    if args.list_ports {
        list_ports();
        return;
    }

    if let Err(err) = run(args) {
        eprintln!("panels failed: {}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let registry = register_pages! {
        { mode: "Synth", enabled: true, pages: [oscillator, envelope] },
        { mode: "Scope", enabled: true, pages: [scope] },
        { mode: "Seq", enabled: true, pages: [sequencer] },
        { mode: "FX", enabled: true, pages: [unpatched] },
    }?;

    let config = config_dir();
    let mut settings = match &config {
        Some(dir) => load_settings_if_exists(dir)?.unwrap_or_default(),
        None => PanelSettings::default(),
    };
    if let Some(dir) = args.storage_dir {
        settings.storage_dir = dir;
    }
    if args.midi_port.is_some() {
        settings.midi_input_port = args.midi_port;
    }

    let theme = match &config {
        Some(dir) => Theme::load_if_exists(&dir.join("theme.json"))?,
        None => Theme::dark(),
    };

    let (event_tx, events) = event_channel();
    let mut runtime =
        PanelRuntime::new(registry, settings, theme)?.with_events(event_tx);
    runtime.start(args.page.as_deref())?;

    let dispatcher = runtime.dispatcher().on_custom("log", |payload, ui| {
        info!("log event on {:?}: {}", ui.active_page, payload);
        Ok(())
    });
    runtime.start_workers_with(dispatcher)?;

    let _midi = connect_midi(&runtime, args.midi_channel);

    let simulator = if args.rate > 0.0 {
        Some(spawn_simulator(runtime.ingress(), args.rate)?)
    } else {
        None
    };

    let stop = StopSignal::new();
    let timer = {
        let stop = stop.clone();
        let duration = Duration::from_secs_f32(args.seconds.max(0.0));
        thread::spawn(move || {
            stop.wait_timeout(duration);
            stop.stop();
        })
    };

    let mut surface = RecordingSurface::new(
        runtime.settings().screen_width,
        runtime.settings().screen_height,
    )
    .with_history(8);

    let started = Instant::now();
    let result = runtime.run(&mut surface, &stop);
    if let Some(mut simulator) = simulator {
        simulator.stop(Duration::from_secs(1))?;
    }
    report(result?, &events, started.elapsed());

    stop.stop();
    if timer.join().is_err() {
        warn!("timer thread panicked");
    }
    Ok(())
}

#[cfg(feature = "midi")]
fn connect_midi(runtime: &PanelRuntime, channel: u8) -> Option<MidiListener> {
    let port = runtime.settings().midi_input_port.clone()?;
    let map = CcMap::standard(oscillator::PAGE_CONFIG.owner, channel);
    match MidiListener::connect(&port, map, runtime.ingress()) {
        Ok(listener) => Some(listener),
        Err(e) => {
            warn!("continuing without MIDI: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "midi"))]
fn connect_midi(runtime: &PanelRuntime, _channel: u8) -> Option<()> {
    if runtime.settings().midi_input_port.is_some() {
        warn!("built without the midi feature; ignoring the MIDI port");
    }
    None
}

#[cfg(feature = "midi")]
fn list_ports() {
    match cvpanel::hardware::list_input_ports() {
        Ok(ports) if ports.is_empty() => println!("no MIDI inputs"),
        Ok(ports) => {
            for (i, name) in ports {
                println!("{}: {}", i, name);
            }
        }
        Err(e) => eprintln!("{}", e),
    }
}

#[cfg(not(feature = "midi"))]
fn list_ports() {
    eprintln!("built without the midi feature");
}

/// Modes visited by the simulator, each with the owner whose dials it turns
/// while there.
const TOUR: [(&str, &str); 4] = [
    ("Synth", "synth"),
    ("Scope", "scope"),
    ("Seq", "seq"),
    ("FX", "fx"),
];

/// Turns dials from a background thread the way a hardware listener would,
/// moving to the next mode every three seconds.
fn spawn_simulator(ingress: HardwareIngress, rate: f32) -> Result<TaskHandle> {
    let period = Duration::from_secs_f32(1.0 / rate);
    let per_stop = (rate * 3.0).max(1.0) as u64;

    TaskHandle::spawn("panels-simulator", move |stop| {
        let mut tick: u64 = 0;
        let mut next = Instant::now() + period;
        while !stop.wait_until(next) {
            next += period;

            let stage = (tick / per_stop) as usize % TOUR.len();
            let (mode, owner) = TOUR[stage];
            let phase = tick % per_stop;
            if phase == 0 {
                ingress.request_mode(mode);
            } else if phase == per_stop / 2 && mode == "Synth" {
                ingress.next_page();
            }

            let dial = Slot::Dial((tick % 2) as u8 + 1);
            let value = ((tick * 7) % 128) as u8;
            ingress.on_control_change(owner, dial, RawValue::Midi(value));
            tick += 1;
        }
    })
}

fn report(
    stats: RuntimeStats,
    events: &RuntimeEventReceiver,
    elapsed: Duration,
) {
    let switches = events
        .try_iter()
        .filter(|e| matches!(e, RuntimeEvent::PageSwitched(_)))
        .count();

    println!("ran for {:.1}s", elapsed.as_secs_f32());
    println!(
        "frames: {} rendered ({} full, {} partial, {} idle), {} skipped, \
        {} fallbacks",
        stats.frames.rendered(),
        stats.frames.full,
        stats.frames.partial,
        stats.frames.idle,
        stats.frames.skipped,
        stats.frames.fallbacks
    );
    println!("average fps: {:.1}", stats.average_fps);
    println!("page switches: {}", switches);
    println!(
        "events: {} dispatched, {} failed in {} batches (largest {})",
        stats.worker.dispatched,
        stats.worker.failed,
        stats.worker.batches,
        stats.worker.largest_batch
    );
    println!(
        "queue high water: {}, backlog episodes: {}",
        stats.queue_high_water, stats.backlog_episodes
    );
}
