//! Facegate CLI
//!
//! Usage:
//!   facegate --simulate capture               # Scripted capture run
//!   facegate --simulate liveness              # Turn right, back, turn left
//!   facegate --simulate liveness-no-neutral   # Turn without returning to center
//!   facegate --serve                          # HTTP + WebSocket session service
//!   facegate --simulate capture --json        # JSON events

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use facegate::core::{run_server, DetectionLoop, DetectionObserver, LoopHandle, ScriptedSource, SyntheticFace};
use facegate::types::{
    BoundingBox, ChallengeEvent, ChallengeKind, CountdownEvent, DetectionSnapshot, DetectionState, FrameSample,
    LoopEvent, SequenceResult,
};
use facegate::{GateConfig, VERSION};

/// Synthetic camera geometry
const FRAME_WIDTH: f64 = 640.0;
const FRAME_HEIGHT: f64 = 480.0;
const FRAME_STEP_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Subject walks in, settles, gets captured
    Capture,
    /// Completes turn_right then turn_left
    Liveness,
    /// Stays turned after the first challenge; the second times out
    LivenessNoNeutral,
}

#[derive(Parser, Debug)]
#[command(
    name = "facegate",
    version = VERSION,
    about = "Face-quality gating with auto-capture countdown and active liveness",
    long_about = "Facegate turns a stream of face detections into one user-facing state per tick\n\
                  and fires a capture after the face has been acceptable long enough.\n\n\
                  Modes:\n  \
                  --simulate     Run a scripted synthetic session\n  \
                  --serve        HTTP + WebSocket session service\n\n\
                  States:\n  \
                  NO_FACE / MULTIPLE_FACES / FACE_TOO_SMALL / FACE_TOO_LARGE\n  \
                  FACE_NOT_CENTERED / POOR_LIGHTING - guidance\n  \
                  READY      - Acceptable, waiting for stability\n  \
                  COUNTDOWN  - Capture imminent\n  \
                  CAPTURING  - Capture in progress"
)]
struct Args {
    /// Scripted synthetic session to run
    #[arg(long, value_enum)]
    simulate: Option<Scenario>,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// TOML config file; FACEGATE_* environment variables override it
    #[arg(short, long)]
    config: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("facegate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(2);
        }
    };

    if args.serve {
        run_serve(&args, config).await;
    } else {
        let scenario = args.simulate.unwrap_or(Scenario::Capture);
        run_simulation(scenario, config, &args).await;
    }
}

fn load_config(args: &Args) -> facegate::Result<GateConfig> {
    let config = match &args.config {
        Some(path) => GateConfig::from_toml_file(path)?,
        None => GateConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Run one scripted session through the real loop
async fn run_simulation(scenario: Scenario, mut config: GateConfig, args: &Args) {
    let frames = match scenario {
        Scenario::Capture => {
            config.challenges.clear();
            capture_script()
        }
        Scenario::Liveness | Scenario::LivenessNoNeutral => {
            if config.challenges.is_empty() {
                config.challenges = vec![ChallengeKind::TurnRight, ChallengeKind::TurnLeft];
            }
            let returns_to_center = scenario == Scenario::Liveness;
            liveness_script(returns_to_center, config.liveness_timeout_ms)
        }
    };

    let mut detection_loop = match DetectionLoop::new(config) {
        Ok(dl) => dl,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(2);
        }
    };

    if !args.json {
        print_header(scenario, args.no_color);
    }

    let mut printer = Printer {
        json: args.json,
        no_color: args.no_color,
        handle: detection_loop.handle(),
    };
    let mut source = ScriptedSource::new(frames);

    if let Err(e) = detection_loop.run(&mut source, &mut printer).await {
        eprintln!("Detection error: {}", e);
        std::process::exit(1);
    }

    if !args.json {
        if let Some(seq) = detection_loop.sequencer() {
            for err in seq.timeout_errors() {
                println!("  {}", err);
            }
        }
        println!();
        println!("Session ended after {} ticks in {}", detection_loop.current_detection().tick, detection_loop.state());
    }
}

/// No face, too far, off center, then settled in frame
fn capture_script() -> Vec<FrameSample> {
    let face = SyntheticFace::centered(FRAME_WIDTH, FRAME_HEIGHT);
    let far = SyntheticFace::new(BoundingBox::new(280.0, 200.0, 60.0, 60.0));
    let off = SyntheticFace::new(BoundingBox::new(20.0, 40.0, 256.0, 240.0));

    let mut frames = Vec::new();
    let mut t = 0;
    let mut push = |frame: &dyn Fn(u64) -> FrameSample, count: usize| {
        for _ in 0..count {
            frames.push(frame(t));
            t += FRAME_STEP_MS;
        }
    };
    push(&|ts: u64| FrameSample::empty(ts, FRAME_WIDTH, FRAME_HEIGHT), 5);
    push(&|ts: u64| far.frame(ts, FRAME_WIDTH, FRAME_HEIGHT), 5);
    push(&|ts: u64| off.frame(ts, FRAME_WIDTH, FRAME_HEIGHT), 5);
    push(&|ts: u64| face.frame(ts, FRAME_WIDTH, FRAME_HEIGHT), 60);
    frames
}

/// Turn right, optionally recenter, then turn left and settle
fn liveness_script(returns_to_center: bool, liveness_timeout_ms: u64) -> Vec<FrameSample> {
    let face = SyntheticFace::centered(FRAME_WIDTH, FRAME_HEIGHT);
    let right = face.with_yaw(-25.0);
    let left = face.with_yaw(25.0);

    let mut frames = Vec::new();
    let mut t = 0;
    let mut push = |pose: &SyntheticFace, count: usize| {
        for _ in 0..count {
            frames.push(pose.frame(t, FRAME_WIDTH, FRAME_HEIGHT));
            t += FRAME_STEP_MS;
        }
    };

    push(&face, 10);
    push(&right, 5);
    if returns_to_center {
        push(&face, 5);
        push(&left, 5);
        push(&face, 60);
    } else {
        // Held past the second challenge's timeout
        let held = (liveness_timeout_ms / FRAME_STEP_MS) as usize + 10;
        push(&right, held);
    }
    frames
}

/// Prints every notification; stops the loop once a capture fires
struct Printer {
    json: bool,
    no_color: bool,
    handle: LoopHandle,
}

impl Printer {
    fn emit(&self, event: LoopEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Failed to encode event: {}", e),
        }
    }

    fn paint(&self, color: &'static str) -> (&'static str, &'static str) {
        if self.no_color {
            ("", "")
        } else {
            (color, DetectionState::color_reset())
        }
    }
}

impl DetectionObserver for Printer {
    fn on_state_change(&mut self, snapshot: &DetectionSnapshot) {
        if self.json {
            self.emit(LoopEvent::StateChange(snapshot.clone()));
        } else if self.no_color {
            println!("{}", snapshot.to_parseable_string());
        } else {
            println!("{}", snapshot.to_terminal_string());
        }
    }

    fn on_countdown(&mut self, event: CountdownEvent) {
        if self.json {
            return self.emit(LoopEvent::Countdown(event));
        }
        let (color, reset) = self.paint("\x1b[36m");
        match event {
            CountdownEvent::Tick { remaining } => println!("{}  ⏱ {}...{}", color, remaining, reset),
            CountdownEvent::Complete => println!("{}  ⏱ now{}", color, reset),
            CountdownEvent::Cancelled => println!("{}  ⏱ cancelled{}", color, reset),
        }
    }

    fn on_challenge_event(&mut self, event: &ChallengeEvent) {
        if self.json {
            return self.emit(LoopEvent::Challenge(*event));
        }
        let (color, reset) = self.paint("\x1b[33m");
        println!(
            "{}  ▸ challenge {} ({}) {:?}: {}{}",
            color,
            event.index + 1,
            event.kind,
            event.outcome,
            event.kind.instruction(),
            reset
        );
    }

    fn on_sequence_complete(&mut self, result: &SequenceResult) {
        if self.json {
            return self.emit(LoopEvent::SequenceComplete(result.clone()));
        }
        if result.passed {
            let (color, reset) = self.paint("\x1b[32m");
            println!("{}  ✓ Liveness passed{}", color, reset);
        } else {
            let (color, reset) = self.paint("\x1b[31m");
            println!("{}  ✗ Liveness failed: {:?}{}", color, result.failed_kinds, reset);
        }
    }

    fn on_capture_ready(&mut self) {
        if self.json {
            self.emit(LoopEvent::CaptureReady);
        } else {
            let (color, reset) = self.paint("\x1b[35m");
            println!("{}  📸 CAPTURE{}", color, reset);
        }
        self.handle.stop();
    }
}

/// Print header
fn print_header(scenario: Scenario, no_color: bool) {
    let name = match scenario {
        Scenario::Capture => "Capture",
        Scenario::Liveness => "Liveness",
        Scenario::LivenessNoNeutral => "Liveness (no neutral return)",
    };
    if no_color {
        println!("========================================");
        println!("  Facegate v{} - {}", VERSION, name);
        println!("========================================");
    } else {
        println!("\x1b[1m╔════════════════════════════════════════╗\x1b[0m");
        println!("\x1b[1m  Facegate v{} - {}\x1b[0m", VERSION, name);
        println!("\x1b[1m╚════════════════════════════════════════╝\x1b[0m");
    }
    println!();
}

/// Run HTTP API server
async fn run_serve(args: &Args, config: GateConfig) {
    println!();
    println!("Facegate session service v{}", VERSION);
    println!();

    if let Err(e) = run_server(&args.addr, config).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
