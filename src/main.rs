//! zvp8 CLI - VP8 decoding to raw YUV
//!
//! Decodes a VP8 elementary stream from an IVF file and writes the
//! decoded pictures as planar YUV 4:2:0.

use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use zvp8_lib::format::Y4mWriter;
use zvp8_lib::Player;

#[derive(Parser)]
#[command(name = "zvp8")]
#[command(about = "VP8 decoder - IVF in, raw YUV 4:2:0 out", long_about = None)]
#[command(version)]
struct Cli {
    /// Input IVF file
    input: PathBuf,

    /// Output file for decoded frames (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Wrap output in a YUV4MPEG2 stream instead of raw planes
    #[arg(long)]
    y4m: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn run(cli: &Cli) -> zvp8_lib::Result<u64> {
    let mut player = Player::new(&cli.input)?;
    info!(
        "decoding {} ({}x{})",
        cli.input.display(),
        player.width(),
        player.height()
    );

    let mut writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut raster = player.new_raster()?;
    let mut shown = 0u64;

    if cli.y4m {
        let (fps_num, fps_den) = player.frame_rate();
        let mut y4m_out = Y4mWriter::new(
            writer,
            usize::from(player.width()),
            usize::from(player.height()),
            fps_num,
            fps_den,
        )?;
        while !player.eof() {
            if player.advance(&mut raster)? {
                y4m_out.write_raster(&raster)?;
                shown += 1;
            }
        }
    } else {
        while !player.eof() {
            if player.advance(&mut raster)? {
                raster.write_yuv420(&mut writer)?;
                shown += 1;
            }
        }
        writer.flush()?;
    }

    Ok(shown)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli) {
        Ok(frames) => {
            info!("decoded {frames} frames");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("zvp8: {err}");
            ExitCode::FAILURE
        }
    }
}
