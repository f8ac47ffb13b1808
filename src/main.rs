use std::io;
use std::path::PathBuf;

use clap::Parser;
use log::{LevelFilter, info};

use parley::config::Config;
use parley::service::InferenceService;

#[derive(Debug, Parser)]
#[command(name = "parley", about = "OpenAI-compatible chat completion server")]
struct Args {
    /// Port to listen on (0 picks an ephemeral port).
    #[arg(long)]
    port: Option<u16>,

    /// Per-connection socket read timeout.
    #[arg(long = "read_timeout_millis")]
    read_timeout_millis: Option<u64>,

    /// Per-connection socket write timeout.
    #[arg(long = "write_timeout_millis")]
    write_timeout_millis: Option<u64>,

    /// Number of worker threads serving connections.
    #[arg(long)]
    workers: Option<usize>,

    /// Log at info level.
    #[arg(long)]
    info: bool,

    /// Log at warn level.
    #[arg(long)]
    warn: bool,

    /// Log at debug level.
    #[arg(long)]
    debug: bool,

    /// Model directory; defaults to the HuggingFace cache snapshot.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// TOML config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else if self.info {
            LevelFilter::Info
        } else if self.warn {
            LevelFilter::Warn
        } else {
            LevelFilter::Off
        }
    }

    fn into_config(self) -> Config {
        let mut config = self
            .config
            .as_deref()
            .map(Config::from_file)
            .unwrap_or_default();
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(millis) = self.read_timeout_millis {
            config.server.read_timeout_millis = millis;
        }
        if let Some(millis) = self.write_timeout_millis {
            config.server.write_timeout_millis = millis;
        }
        if let Some(workers) = self.workers {
            config.server.worker_threads = workers;
        }
        if self.model_dir.is_some() {
            config.model_dir = self.model_dir;
        }
        config
    }
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.log_level())
        .init();
    let config = args.into_config();
    info!("server config: {config:?}");

    let mut service = InferenceService::new(config)?;
    service.start()?;

    let trigger = service.shutdown_trigger();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        let trigger = trigger.clone();
        unsafe {
            signal_hook::low_level::register(signal, move || trigger.trigger())?;
        }
    }

    service.wait();
    Ok(())
}
