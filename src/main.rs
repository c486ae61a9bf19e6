//! Headless runner: boots a ROM, runs it for a number of frames, then
//! writes the save file and optionally the last frame as a PNG.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use emu::config::{DEFAULT_FRAMES, EmuConfig};
use emu::gba::Gba;
use png::{BitDepth, ColorType, Encoder, EncodingError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LCD_WIDTH: u32 = 240;
const LCD_HEIGHT: u32 = 160;

/// Runs a Game Boy Advance ROM without a window.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// ROM to run (.gba, .agb or .bin)
    rom: PathBuf,

    /// BIOS image to use instead of the built-in one
    #[arg(long)]
    bios: Option<PathBuf>,

    /// Run the boot sequence of the BIOS given with --bios
    #[arg(long, requires = "bios")]
    boot: bool,

    /// Number of frames to run
    #[arg(long, default_value_t = DEFAULT_FRAMES)]
    frames: u32,

    /// Also log to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Write the last frame to this PNG file
    #[arg(long)]
    dump_frame: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> EmuConfig {
        let config = EmuConfig {
            frames: self.frames,
            ..EmuConfig::default()
        };
        match &self.bios {
            Some(bios) => config.with_bios(bios.clone(), !self.boot),
            None => config,
        }
    }
}

/// Logs to stderr, and to a daily rolling file when `log_dir` is set.
/// The returned guard flushes the file writer when dropped.
fn init_logging(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gba-headless.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Encodes a 240x160 RGBA frame.
fn encode_png(writer: impl Write, rgba: &[u8]) -> Result<(), EncodingError> {
    let mut encoder = Encoder::new(writer, LCD_WIDTH, LCD_HEIGHT);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);

    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgba)?;
    writer.finish()
}

fn write_png(path: &Path, rgba: &[u8]) -> Result<(), EncodingError> {
    encode_png(BufWriter::new(File::create(path)?), rgba)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = args.config();

    let _guard = init_logging(args.log_dir.as_deref());

    let mut gba = match Gba::load(&args.rom, &config) {
        Ok(gba) => gba,
        Err(error) => {
            tracing::error!("{error}");
            return ExitCode::from(2);
        }
    };

    let save_path = args.rom.with_extension("sav");
    if let Ok(bytes) = std::fs::read(&save_path) {
        gba.load_backup(&bytes);
    }

    let mut status = ExitCode::SUCCESS;
    let mut samples = 0;
    for frame in 0..config.frames {
        if let Err(fault) = gba.run_frame_checked() {
            tracing::error!("stopped at frame {frame}");
            tracing::debug!("{}", fault.trace);
            status = ExitCode::from(3);
            break;
        }
        samples += gba.drain_audio().len();
    }
    tracing::info!("ran {} frames, {samples} audio samples", config.frames);

    if gba.save_required() {
        match std::fs::write(&save_path, gba.backup_data()) {
            Ok(()) => tracing::info!("saved {}", save_path.display()),
            Err(error) => tracing::error!("cannot write {}: {error}", save_path.display()),
        }
    }

    if let Some(path) = &args.dump_frame {
        if let Err(error) = write_png(path, &gba.frame_rgba()) {
            tracing::error!("cannot write {}: {error}", path.display());
        }
    }

    status
}
