use std::{f32::consts::TAU, path::PathBuf};

use clap::{Parser, Subcommand};
use feedback_visualiser_core::{
    compile, delete_shader, parse_diagnostics, AppConfig, AudioConfig, FeedbackRenderer,
    FragmentLineMap, FrameInput, HeadlessBackend, ShaderPackage, ShaderStage, Size2,
    SpectrumAnalyser, VisualiserError,
};
use tracing_subscriber::EnvFilter;

fn main() -> feedback_visualiser_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Headless {
            frames,
            width,
            height,
            fps,
            config,
        } => run_headless(frames, Size2::new(width, height), fps, config),
        Commands::Diagnose {
            log,
            fragments,
            path,
        } => run_diagnose(&log, &fragments, path),
        Commands::Check { shaders } => run_check(&shaders),
    }
}

fn run_headless(
    frames: u32,
    viewport: Size2,
    fps: f32,
    config: Option<PathBuf>,
) -> feedback_visualiser_core::Result<()> {
    let config = match config {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::default(),
    };
    tracing::info!(frames, %viewport, fps, "starting headless run");

    let mut backend = HeadlessBackend::new();
    let mut renderer = FeedbackRenderer::new(config.render.clone());
    let mut analyser = SpectrumAnalyser::new(&config.audio);
    let mut signal = SyntheticSignal::new(&config.audio);

    for frame in 0..frames {
        let spectrum = analyser.process_block(&signal.next_block())?;
        let input = FrameInput {
            viewport,
            display: viewport,
            time: frame as f32 / fps.max(1.0),
            spectrum,
        };
        match renderer.show(&mut backend, &input)? {
            Some(output) => tracing::info!(
                frame,
                texture = output.texture.get(),
                size = %output.size,
                bands = ?spectrum.bands(),
                "frame rendered"
            ),
            None => tracing::info!(frame, "frame skipped"),
        }
    }

    for message in renderer.program_messages() {
        println!("{message}");
    }
    renderer.close(&mut backend);
    tracing::info!(
        draws = backend.draws().len(),
        hazards = backend.feedback_hazards(),
        leaked = backend.live_objects(),
        "headless run finished"
    );
    Ok(())
}

fn run_diagnose(
    log: &PathBuf,
    fragments: &[PathBuf],
    path: Option<PathBuf>,
) -> feedback_visualiser_core::Result<()> {
    let path = path
        .or_else(|| fragments.last().cloned())
        .unwrap_or_else(|| PathBuf::from("shader"));
    tracing::info!(?log, fragments = fragments.len(), "remapping compiler log");

    let package = ShaderPackage::from_files(path.clone(), fragments)?;
    let text = std::fs::read_to_string(log)?;
    let line_map = FragmentLineMap::new(package.fragments());

    let mut messages = parse_diagnostics(package.path(), &text);
    for message in &mut messages {
        line_map.remap(message);
        let fragment = package
            .fragments()
            .get(message.fragment_index)
            .map(|fragment| fragment.name())
            .unwrap_or("?");
        println!(
            "{fragment}:{}: {:?}: {}",
            message.line + 1,
            message.severity,
            message.text
        );
    }
    tracing::info!(messages = messages.len(), "done");
    Ok(())
}

fn run_check(shaders: &[PathBuf]) -> feedback_visualiser_core::Result<()> {
    let mut backend = HeadlessBackend::new();
    let mut failed = 0;
    for path in shaders {
        let stage = ShaderStage::try_from_path(path)?;
        let result = compile(&mut backend, stage, &ShaderPackage::new(path));
        for message in result.messages() {
            println!("{message}");
        }
        tracing::info!(path = %path.display(), %stage, valid = result.is_valid(), "checked");
        if !result.is_valid() {
            failed += 1;
        }
        delete_shader(&mut backend, result);
    }

    if failed > 0 {
        return Err(VisualiserError::msg(format!(
            "{failed} of {} shaders failed to compile",
            shaders.len()
        )));
    }
    Ok(())
}

/// A tone gliding between 60 Hz and 8 kHz so every band lights up in turn.
struct SyntheticSignal {
    sample_rate: f32,
    block_size: usize,
    phase: f32,
    position: usize,
}

impl SyntheticSignal {
    fn new(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate.max(1) as f32,
            block_size: config.block_size.max(2),
            phase: 0.0,
            position: 0,
        }
    }

    fn next_block(&mut self) -> Vec<f32> {
        let mut block = Vec::with_capacity(self.block_size);
        for _ in 0..self.block_size {
            let seconds = self.position as f32 / self.sample_rate;
            let sweep = 0.5 - 0.5 * (seconds * 0.5 * TAU).cos();
            let frequency = 60.0 * (8_000.0f32 / 60.0).powf(sweep);
            self.phase = (self.phase + frequency / self.sample_rate).fract();
            block.push(0.8 * (self.phase * TAU).sin());
            self.position += 1;
        }
        block
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive feedback shader visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the feedback loop without a display on a synthetic signal.
    Headless {
        /// Number of frames to render.
        #[arg(short, long, default_value_t = 120)]
        frames: u32,
        #[arg(long, default_value_t = 640)]
        width: i32,
        #[arg(long, default_value_t = 360)]
        height: i32,
        /// Frame rate used to derive the effect time.
        #[arg(long, default_value_t = 60.0)]
        fps: f32,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Map a saved compiler log back onto the fragment files it was built from.
    Diagnose {
        /// File holding the raw compiler log.
        log: PathBuf,
        /// Fragment files in the order they were concatenated.
        #[arg(required = true)]
        fragments: Vec<PathBuf>,
        /// Path to report messages against. Defaults to the last fragment.
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
    /// Run the built-in syntax checker over shader files, inferring each
    /// stage from the file extension.
    Check {
        #[arg(required = true)]
        shaders: Vec<PathBuf>,
    },
}
