use valve_simulator::{config, opcua_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    tracing::info!("Starting OPC UA Valve Simulator");

    let path = config::config_path();
    tracing::info!("Loading configuration from {}", path.display());
    let config = config::SimulatorConfig::load(&path)?;

    opcua_server::start_valve_server(config).await?;

    tracing::info!("Server stopped");
    Ok(())
}
