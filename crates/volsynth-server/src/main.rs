use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use volsynth_server::spawn_server;
use volsynth_synth::{SynthesisConfig, SynthesisService};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve transfer-function synthesis over HTTP")]
struct ServerConfig {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:5000")]
    addr: String,

    /// Synthesis parameters as RON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for reproducible candidate sets. Overrides the config file.
    #[arg(long)]
    seed: Option<u64>,
}

fn load_synthesis_config(args: &ServerConfig) -> Result<SynthesisConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            SynthesisConfig::from_ron_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => SynthesisConfig::default(),
    };
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = ServerConfig::parse();
    let config = load_synthesis_config(&args)?;
    log::info!("Synthesis config: decay {}, seed {:?}", config.decay, config.seed);

    let service = Arc::new(Mutex::new(SynthesisService::new(config)));
    let (_, handle) = spawn_server(&args.addr, service)?;
    handle
        .join()
        .map_err(|_| anyhow!("server thread panicked"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = ServerConfig::parse_from(["volsynth-server"]);
        assert_eq!(args.addr, "127.0.0.1:5000");
        assert!(args.config.is_none());
        let config = load_synthesis_config(&args).unwrap();
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_seed_flag_overrides() {
        let args = ServerConfig::parse_from([
            "volsynth-server",
            "--seed",
            "42",
            "--addr",
            "0.0.0.0:8080",
        ]);
        assert_eq!(args.addr, "0.0.0.0:8080");
        let config = load_synthesis_config(&args).unwrap();
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_missing_config_file_reports_path() {
        let args = ServerConfig::parse_from([
            "volsynth-server",
            "--config",
            "/nonexistent/synth.ron",
        ]);
        let err = load_synthesis_config(&args).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/synth.ron"));
    }
}
