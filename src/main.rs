use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use fablock_statustool::console::{ConsoleCommand, HELP};
use fablock_statustool::serial::discover_ports;
use fablock_statustool::{ConnectionError, ConnectionManager, StatusEvent, ToolSettings};

const DEFAULT_SETTINGS_FILE: &str = "statustool.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let loaded = ToolSettings::try_load(&settings_path)?;
    let using_defaults = loaded.is_none();
    let settings = loaded.unwrap_or_default();

    // RUST_LOG wins over the settings file
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str())),
        )
        .init();
    if using_defaults {
        log::info!("No settings at {}, using defaults", settings_path.display());
    }

    let manager = ConnectionManager::with_connector(
        std::sync::Arc::new(fablock_statustool::serial::SerialportConnector),
        settings.reader_options(),
    );
    manager.set_sink(|event: StatusEvent| println!("{}", event));
    manager.set_error_sink(|error: &ConnectionError| {
        println!("Status: Offline ({})", error);
    });

    let config = settings.connection_config();
    match manager.connect(config.clone()).await {
        Ok(()) => println!("Status: Connected to {}", config.port_name),
        Err(e) => println!("Status: {}", e),
    }
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match ConsoleCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            ConsoleCommand::Door(door) => match manager.send_door_command(door).await {
                Ok(()) => println!("Status: {}", door),
                Err(e) => println!("Status: {}", e),
            },
            ConsoleCommand::Raw(_) => {
                let bytes = command.wire_bytes().unwrap_or_default();
                if let Err(e) = manager.send_command(&bytes).await {
                    println!("Status: {}", e);
                }
            }
            ConsoleCommand::Ports => match discover_ports() {
                Ok(ports) if ports.is_empty() => println!("No serial ports found"),
                Ok(ports) => {
                    for port in ports {
                        println!("{} {:?}", port.port_name, port.product);
                    }
                }
                Err(e) => println!("Port discovery failed: {}", e),
            },
            ConsoleCommand::Status => {
                println!("State: {:?}", manager.state());
                println!("{:#?}", manager.stats());
            }
            ConsoleCommand::Reconnect => {
                if let Err(e) = manager.disconnect().await {
                    println!("Status: {}", e);
                }
                match manager.connect(config.clone()).await {
                    Ok(()) => println!("Status: Connected to {}", config.port_name),
                    Err(e) => println!("Status: {}", e),
                }
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => break,
        }
    }

    manager.disconnect().await?;
    log::info!("Status tool stopped");
    Ok(())
}
