use asip_manager::{
    cli, config::Config, error::Error, logging, manager::AsipManager, serial,
    serial::SerialLink,
};
use clap::Parser;
use color_eyre::Result;
use itertools::Itertools;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tracing::{debug, info, warn, Level};

fn handle_command(command: cli::Commands) -> Result<()> {
    match command {
        cli::Commands::ListPorts => {
            for port in serial::enumerate_ports()? {
                println!("{port}");
            }
        }
        cli::Commands::Examples(cli::Examples::Config) => {
            println!("{}", Config::example().serialize_pretty()?);
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn hangup() -> Result<()> {
    signal(SignalKind::hangup())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn hangup() -> Result<()> {
    std::future::pending().await
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        return handle_command(command);
    }

    logging::init(
        cli.log_level,
        cli.log_dir.map(|log_dir| (Level::INFO, log_dir)),
    );

    let config = if let Some(config_path) = cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };

    let ports = serial::enumerate_ports()?;
    debug!("Available ports: {}", ports.iter().join(", "));

    let port = match cli.port.or_else(|| config.port.clone()) {
        Some(port) => port,
        None => ports.first().cloned().ok_or(Error::NoPortsAvailable)?,
    };

    let mut manager = AsipManager::new(SerialLink::default(), &port, config);
    manager.start().await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = hangup() => {
            info!("Told to hang up, quitting")
        }
        _ = manager.stopped() => {
            warn!("Manager shut itself down")
        }
    }

    manager.stop().await;
    logging::shutdown();

    Ok(())
}
