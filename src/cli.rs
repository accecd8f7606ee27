use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::color::{ChannelOrder, Color};
use crate::config::InstallationConfig;
use crate::controller::{AnimationController, ControllerSettings};
use crate::effect::EffectSpec;
use crate::geometry::GeometryCache;
use crate::point_cloud::{HelixLayout, PointCloud};
use crate::presets::{Animation, Catalogue};
use crate::sink::{NullSink, RenderSink, SinkWriter, StreamSink};

/// How often the control loop checks whether a timed run has ended.
const CONTROL_POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SinkKind {
    /// One line of hex triples per frame
    Stdout,
    /// Discard frames
    Null,
}

#[derive(clap::Args, Clone, Debug)]
struct OutputArgs {
    /// Coordinate JSON file (overrides the config)
    #[arg(long)]
    coords: Option<PathBuf>,

    /// Installation config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame sink
    #[arg(long, value_enum, default_value_t = SinkKind::Stdout)]
    sink: SinkKind,

    /// Wire channel order (overrides the config)
    #[arg(long)]
    order: Option<ChannelOrder>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named animation until stopped
    Run {
        /// Animation name (see `list`)
        name: String,

        #[command(flatten)]
        output: OutputArgs,

        /// Random seed for stochastic effects
        #[arg(long)]
        seed: Option<u64>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f32>,

        /// Frames per second (overrides the animation's own rate)
        #[arg(long)]
        fps: Option<f32>,
    },
    /// List available animations
    List {
        /// Installation config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Turn every light off
    Off {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Write helix coordinates as JSON
    Helix {
        #[arg(long, default_value_t = 500)]
        count: usize,

        #[arg(long, default_value_t = 84.0)]
        height: f32,

        #[arg(long, default_value_t = 27.0)]
        turns: f32,

        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Fill every light with one color
    Fill {
        r: u8,
        g: u8,
        b: u8,

        #[command(flatten)]
        output: OutputArgs,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f32>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            name,
            output,
            seed,
            duration,
            fps,
        } => {
            let setup = Setup::load(&output)?;
            let catalogue = setup.config.catalogue();
            run_interactive(setup, catalogue, &name, seed, duration, fps)?;
        }
        Commands::List { config } => {
            let config = load_config(config.as_ref())?;
            print_catalogue(&config.catalogue())?;
        }
        Commands::Off { output } => {
            let setup = Setup::load(&output)?;
            let mut writer = setup.writer();
            writer.blackout().context("Failed to turn lights off")?;
            log::info!("All {} lights off", writer.len());
        }
        Commands::Helix {
            count,
            height,
            turns,
            out,
        } => {
            let layout = HelixLayout {
                count,
                height,
                turns,
                ..Default::default()
            };
            let json = PointCloud::helix(&layout)?.to_json()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    log::info!("Wrote {} helix points to {}", count, path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Fill {
            r,
            g,
            b,
            output,
            duration,
        } => {
            let setup = Setup::load(&output)?;
            let mut catalogue = setup.config.catalogue();
            catalogue.insert(Animation {
                name: "fill".to_string(),
                description: "Solid fill".to_string(),
                interval: 0.1,
                effect: EffectSpec::Solid {
                    color: Color::new(r, g, b),
                },
            });
            run_interactive(setup, catalogue, "fill", None, duration, None)?;
        }
    }
    Ok(())
}

// ============================================================================
// Setup
// ============================================================================

struct Setup {
    config: InstallationConfig,
    cloud: PointCloud,
    sink: SinkKind,
    order: ChannelOrder,
}

impl Setup {
    fn load(output: &OutputArgs) -> Result<Self> {
        let config = load_config(output.config.as_ref())?;
        let cloud = match &output.coords {
            Some(path) => PointCloud::load(path)?,
            None => config.load_cloud()?,
        };
        let order = output.order.unwrap_or(config.channel_order);
        Ok(Self {
            config,
            cloud,
            sink: output.sink,
            order,
        })
    }

    fn writer(&self) -> SinkWriter<Box<dyn RenderSink>> {
        let n = self.cloud.len();
        let sink: Box<dyn RenderSink> = match self.sink {
            SinkKind::Stdout => Box::new(StreamSink::stdout(n)),
            SinkKind::Null => Box::new(NullSink::new(n)),
        };
        SinkWriter::new(sink, self.order).with_brightness(self.config.brightness)
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<InstallationConfig> {
    match path {
        Some(path) => InstallationConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(InstallationConfig::default()),
    }
}

fn print_catalogue(catalogue: &Catalogue) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for animation in catalogue.animations() {
        writeln!(
            out,
            "{:<16} {:>5.1} fps  {}",
            animation.name,
            1.0 / animation.interval,
            animation.description
        )?;
    }
    Ok(())
}

/// Seed from the wall clock when neither the CLI nor the config pins one.
fn clock_seed() -> u64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64
}

// ============================================================================
// Interactive control
// ============================================================================

/// Control lines read from stdin.
#[derive(Debug, PartialEq)]
enum Control {
    Start(String),
    Stop,
    Status,
    List,
    Unknown(String),
}

fn parse_control(line: &str) -> Option<Control> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    let control = match command {
        "stop" | "quit" | "exit" | "off" => Control::Stop,
        "status" => Control::Status,
        "list" => Control::List,
        "start" => match words.next() {
            Some(name) => Control::Start(name.to_string()),
            None => Control::Unknown(line.to_string()),
        },
        _ => Control::Unknown(line.to_string()),
    };
    Some(control)
}

/// Forward stdin lines; the channel closes on EOF.
fn spawn_stdin_reader() -> Receiver<Control> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if let Some(control) = parse_control(&line) {
                if tx.send(control).is_err() {
                    break;
                }
            }
        }
    });
    rx
}

fn run_interactive(
    setup: Setup,
    catalogue: Catalogue,
    name: &str,
    seed: Option<u64>,
    duration: Option<f32>,
    fps: Option<f32>,
) -> Result<()> {
    if let Some(fps) = fps {
        if !fps.is_finite() || fps <= 0.0 || !(1.0 / fps).is_finite() {
            bail!("--fps must be positive, got {}", fps);
        }
    }
    let writer = setup.writer();
    let geometry = Arc::new(GeometryCache::new(setup.cloud)?);
    let seed = seed.or(setup.config.seed).unwrap_or_else(clock_seed);
    let settings = ControllerSettings {
        seed,
        interval_override: fps.map(|f| 1.0 / f).or(setup.config.frame_interval()),
        duration,
    };
    log::info!("Seed {}", seed);

    let mut controller = AnimationController::new(geometry, catalogue, writer, settings);
    controller
        .start(name)
        .with_context(|| format!("Failed to start '{}'", name))?;

    let controls = spawn_stdin_reader();
    let mut stdin_open = true;
    loop {
        if duration.is_some() && !controller.is_running() {
            controller.wait()?;
            break;
        }
        if !stdin_open {
            thread::sleep(CONTROL_POLL);
            continue;
        }
        match controls.recv_timeout(CONTROL_POLL) {
            Ok(Control::Stop) => break,
            Ok(Control::Start(next)) => {
                if let Err(e) = controller.start(&next) {
                    log::warn!("Cannot start '{}': {}", next, e);
                }
            }
            Ok(Control::Status) => {
                eprintln!("running: {}", controller.current().unwrap_or("nothing"));
            }
            Ok(Control::List) => {
                for name in controller.catalogue().names() {
                    eprintln!("{}", name);
                }
            }
            Ok(Control::Unknown(line)) => log::warn!("Unknown command: {}", line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // Timed runs keep going without a terminal.
                if duration.is_none() {
                    break;
                }
                stdin_open = false;
            }
        }
    }

    controller.shutdown().context("Failed to stop animation")?;
    Ok(())
}
