//! Polymath Render - run a YAML score through the engines offline
//!
//! Stands in for a host: builds the slots a score describes, feeds a
//! synthetic ramp block by block and prints every report the sequencer
//! produces.
//!
//! ## Usage
//!
//! ```text
//! polymath-render <score.yaml> [--json] [--config <sequencer.yaml>] [--save-config <path>]
//! ```
//!
//! - `--json`: one JSON object per report instead of aligned text
//! - `--config`: replace the score's `sequencer` section with a config file
//! - `--save-config`: write the effective sequencer config and exit

mod render;
mod score;

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use polymath_core::config::{load_config, save_config};
use render::{render, Format};
use score::Score;

const USAGE: &str =
    "usage: polymath-render <score.yaml> [--json] [--config <sequencer.yaml>] [--save-config <path>]";

struct Args {
    score: PathBuf,
    json: bool,
    config: Option<PathBuf>,
    save_config: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut score = None;
    let mut json = false;
    let mut config = None;
    let mut save_config = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--config" => config = Some(PathBuf::from(iter.next().context(USAGE)?)),
            "--save-config" => save_config = Some(PathBuf::from(iter.next().context(USAGE)?)),
            other if other.starts_with("--") => anyhow::bail!("unknown flag {}\n{}", other, USAGE),
            other => score = Some(PathBuf::from(other)),
        }
    }

    Ok(Args {
        score: score.context(USAGE)?,
        json,
        config,
        save_config,
    })
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(&args)?;
    let mut score = Score::load(&args.score)?;
    if let Some(path) = &args.config {
        score.sequencer = load_config(path);
    }
    if let Some(path) = &args.save_config {
        save_config(&score.sequencer, path)?;
        log::info!("Sequencer config written to {:?}", path);
        return Ok(());
    }

    log::info!("polymath-render: {}", display(&args.score));
    let format = if args.json { Format::Json } else { Format::Text };
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let stats = render(&score, &mut out, format)?;
    out.flush()?;

    log::info!(
        "Rendered {} samples in {} blocks, {} reports ({} dropped)",
        stats.samples,
        stats.blocks,
        stats.reports,
        stats.dropped
    );
    Ok(())
}

fn display(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("polymath-render")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(&args(&["--json", "score.yaml", "--config", "seq.yaml"])).unwrap();
        assert_eq!(parsed.score, PathBuf::from("score.yaml"));
        assert!(parsed.json);
        assert_eq!(parsed.config, Some(PathBuf::from("seq.yaml")));
        assert!(parsed.save_config.is_none());
    }

    #[test]
    fn test_parse_args_requires_score() {
        assert!(parse_args(&args(&["--json"])).is_err());
        assert!(parse_args(&args(&["score.yaml", "--config"])).is_err());
        assert!(parse_args(&args(&["score.yaml", "--loud"])).is_err());
    }
}
