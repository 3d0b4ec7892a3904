use clap::{Parser, Subcommand};
use peercall_lib::config::DEFAULT_SIGNALING_URL;
use peercall_lib::{AppConfig, ControllerConfig, IceServer, IceServerConfig, MediaConstraints};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "peercall")]
#[command(version)]
#[command(about = "Peer-to-peer audio/video calls negotiated over a WebSocket relay", long_about = None)]
struct Cli {
    /// WebSocket relay that forwards messages to the other peer
    #[arg(long, env = "PEERCALL_SIGNALING_URL", default_value = DEFAULT_SIGNALING_URL, global = true)]
    signaling_url: String,

    /// STUN server URL; repeat for several
    #[arg(long = "stun", env = "PEERCALL_STUN", value_delimiter = ',', global = true)]
    stun: Vec<String>,

    /// JSON file with an `iceServers` list; overrides --stun
    #[arg(long, env = "PEERCALL_ICE_CONFIG", global = true)]
    ice_config: Option<PathBuf>,

    /// tracing filter directive, e.g. `peercall_lib=trace`
    #[arg(long, env = "PEERCALL_LOG", global = true)]
    log_filter: Option<String>,

    /// Answer refused offers with a reject message instead of dropping them
    #[arg(long, global = true)]
    announce_rejections: bool,

    #[arg(long, global = true)]
    no_audio: bool,

    #[arg(long, global = true)]
    no_video: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Place a call to whoever listens on the relay
    Call,
    /// Wait for an incoming call and answer it
    Listen,
    /// Check that ICE servers answer
    Probe {
        /// Servers to check instead of the configured ones
        urls: Vec<String>,
    },
}

impl Cli {
    fn ice_servers(&self) -> peercall_lib::Result<IceServerConfig> {
        if let Some(path) = &self.ice_config {
            return IceServerConfig::from_file(path);
        }
        if self.stun.is_empty() {
            return Ok(IceServerConfig::default());
        }
        Ok(IceServerConfig {
            ice_servers: self.stun.iter().map(IceServer::stun).collect(),
        })
    }

    fn app_config(&self, start_call: bool) -> peercall_lib::Result<AppConfig> {
        Ok(AppConfig {
            signaling_url: self.signaling_url.clone(),
            controller: ControllerConfig {
                ice: self.ice_servers()?,
                announce_rejections: self.announce_rejections,
            },
            media: MediaConstraints {
                audio: !self.no_audio,
                video: !self.no_video,
            },
            start_call,
        })
    }
}

async fn execute(cli: Cli) -> peercall_lib::Result<bool> {
    match cli.command {
        Command::Call => peercall_lib::run(cli.app_config(true)?).await.map(|_| true),
        Command::Listen => peercall_lib::run(cli.app_config(false)?).await.map(|_| true),
        Command::Probe { ref urls } if !urls.is_empty() => {
            let servers = IceServerConfig {
                ice_servers: urls.iter().map(IceServer::stun).collect(),
            };
            peercall_lib::probe(&servers).await
        }
        Command::Probe { .. } => peercall_lib::probe(&cli.ice_servers()?).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    peercall_lib::logger::init(cli.log_filter.as_deref());

    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
