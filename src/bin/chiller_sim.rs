use chiller_sim::config::{self, ServerConfig};
use chiller_sim::{modbus, ChillerSimulator, SharedRegisters};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = config::app().get_matches();
    let config = ServerConfig::from_matches(&matches)?;

    println!("🧊 Chiller Controller Simulator");
    println!("==============================");

    let socket_addr = config.socket_addr()?;
    let listener = modbus::bind(socket_addr).await?;
    let registers = SharedRegisters::new();

    let server_registers = registers.clone();
    let unit_id = config.unit_id;
    let server = tokio::spawn(async move {
        if let Err(e) = modbus::serve(listener, server_registers, unit_id).await {
            error!("Modbus server error: {}", e);
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let simulator = ChillerSimulator::new(registers);
    let simulation = tokio::spawn(simulator.run(config.tick_period(), shutdown_rx));
    info!(
        "Simulating on {} with unit {} every {} ms",
        socket_addr, config.unit_id, config.tick_period_ms
    );

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!("Unable to listen for shutdown signal: {}", e),
    }

    let _ = shutdown_tx.send(true);
    let stats = simulation.await?;
    server.abort();

    println!(
        "🛑 Chiller simulator stopped after {} ticks ({} published, {} paused, {} resets)",
        stats.ticks, stats.published_ticks, stats.paused_ticks, stats.resets
    );

    Ok(())
}
