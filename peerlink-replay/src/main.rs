// PeerLink replay host: runs a JSON-lines script of commands and platform events through a session.

mod config;
mod platform;
mod replay;
mod script;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut config_path = None;
    let mut script_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("peerlink-replay {}", VERSION);
                return Ok(());
            }
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            _ => script_path = Some(PathBuf::from(arg)),
        }
    }

    peerlink_core::process::init();
    let cfg = config::load(config_path.as_deref())?;
    info!(?cfg, "replay starting");

    let stdout = std::io::stdout().lock();
    let steps = match &script_path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            replay::run(&cfg, BufReader::new(file), stdout)?
        }
        None => replay::run(&cfg, std::io::stdin().lock(), stdout)?,
    };
    info!(steps, "replay finished");
    Ok(())
}
