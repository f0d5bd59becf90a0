use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use mosaicu::Reencoder;

#[derive(Parser)]
#[command(name = "mosaicu")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Unfilter, refilter and recompress a PNG, verifying the round trip")]
struct Cli {
    /// Source PNG
    #[arg(short, long)]
    input: PathBuf,

    /// Destination PNG, written only on success
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let buf = fs::read(&cli.input)
        .with_context(|| format!("cannot read {}", cli.input.display()))?;

    let (res, meta) = Reencoder::new()
        .reencode_meta_u8(&buf)
        .with_context(|| format!("cannot re-encode {}", cli.input.display()))?;

    info!("{}:\n{meta}", cli.input.display());

    fs::write(&cli.output, &res)
        .with_context(|| format!("cannot write {}", cli.output.display()))?;

    info!("{} bytes -> {} ({} bytes)", buf.len(), cli.output.display(), res.len());

    Ok(())
}
