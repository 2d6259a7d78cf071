use clap::Parser;
use log::{error, info};
use rampart::configuration::config::Config;
use rampart::controller::controller_handler::Controller;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rampart")]
#[command(version = "0.0.1")]
#[command(about = "Live network telemetry console with on-demand threat annotation")]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    config_file: Option<PathBuf>,

    /// Override the web console port
    #[arg(short, long, env = "RAMPART_PORT")]
    port: Option<u16>,

    /// Override the live table capacity
    #[arg(short, long)]
    capacity: Option<usize>,

    /// Capture interface at startup (wlan0, eth0, tun0)
    #[arg(short, long)]
    interface: Option<String>,
}

impl Args {
    fn load_config(&self) -> Result<Config, String> {
        let mut config = match self.config_file {
            Some(ref path) => Config::from_file(path).map_err(|e| e.to_string())?,
            None => Config::default(),
        };
        if let Some(port) = self.port {
            config.web.port = port;
        }
        if let Some(capacity) = self.capacity {
            config.monitor.capacity = capacity;
        }
        if let Some(ref interface) = self.interface {
            config.monitor.interface = interface.clone();
        }
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
██████╗  █████╗ ███╗   ███╗██████╗  █████╗ ██████╗ ████████╗
██╔══██╗██╔══██╗████╗ ████║██╔══██╗██╔══██╗██╔══██╗╚══██╔══╝
██████╔╝███████║██╔████╔██║██████╔╝███████║██████╔╝   ██║
██╔══██╗██╔══██║██║╚██╔╝██║██╔═══╝ ██╔══██║██╔══██╗   ██║
██║  ██║██║  ██║██║ ╚═╝ ██║██║     ██║  ██║██║  ██║   ██║
╚═╝  ╚═╝╚═╝  ╚═╝╚═╝     ╚═╝╚═╝     ╚═╝  ╚═╝╚═╝  ╚═╝   ╚═╝
===========================================================
        Live network telemetry console v0.0.1
===========================================================
"
    );

    let args = Args::parse();

    info!("Importing configuration");
    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    let mut controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("Error occured in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
}
