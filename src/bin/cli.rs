//! retroplay CLI: inspect a GBA ROM's song table and render songs to WAV.
//!
//! Usage:
//!   rp-cli game.gba --table 0x08ABCDEF --list
//!   rp-cli game.gba --table 0x08ABCDEF --song 3 --wav song3.wav

use clap::Parser;
use rp_master::{render_to_wav, M4aRom, SongSource};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rp-cli")]
#[command(about = "Sequenced music player for handheld game images")]
#[command(version)]
struct Cli {
    /// ROM image
    rom: PathBuf,

    /// Song table address (bus address or file offset, hex with 0x)
    #[arg(short, long, value_parser = parse_address)]
    table: u32,

    /// List songs and exit
    #[arg(short, long)]
    list: bool,

    /// Song to render
    #[arg(short, long, default_value_t = 0)]
    song: usize,

    /// Write the rendered song here
    #[arg(short, long)]
    wav: Option<PathBuf>,

    /// Stop after this many loops
    #[arg(long, default_value_t = 1)]
    loops: u32,

    /// Hard time limit in seconds
    #[arg(long, default_value_t = 300)]
    seconds: u32,

    /// Output sample rate
    #[arg(long, default_value_t = 44100)]
    rate: u32,
}

fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("bad address {s:?}: {e}"))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            tracing::error!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let data = std::fs::read(&cli.rom)
        .map_err(|e| format!("failed to read {}: {e}", cli.rom.display()))?;
    let rom = M4aRom::new(data, cli.table).map_err(|e| format!("no song table: {e}"))?;

    println!("Title:  {}", rom.title().unwrap_or("?"));
    println!("Code:   {}", rom.game_code().unwrap_or("?"));
    println!("Table:  {:#x}", rom.table_offset());
    println!("Songs:  {}", rom.song_count());

    if cli.list {
        println!();
        for index in 0..rom.song_count() {
            match rom.track_count(index) {
                Ok(tracks) => println!("{index:4}  {tracks:2} tracks"),
                Err(e) => println!("{index:4}  unreadable ({e})"),
            }
        }
        return Ok(());
    }

    let Some(path) = &cli.wav else {
        return Err("nothing to do: pass --list or --wav <file>".into());
    };
    println!("Rendering song {} to {} at {} Hz...", cli.song, path.display(), cli.rate);
    let source = &rom as &dyn SongSource;
    let wav = render_to_wav(source, cli.song, cli.rate, Some(cli.loops), cli.seconds)
        .map_err(|e| format!("render failed: {e}"))?;
    std::fs::write(path, &wav).map_err(|e| format!("failed to write {}: {e}", path.display()))?;

    let seconds = (wav.len() - 44) as f64 / (cli.rate as f64 * 4.0);
    println!("Wrote {} bytes ({seconds:.1}s)", wav.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_accept_hex_and_decimal() {
        assert_eq!(parse_address("0x08001000"), Ok(0x0800_1000));
        assert_eq!(parse_address("4096"), Ok(4096));
        assert!(parse_address("0xZZ").is_err());
    }
}
