use anyhow::Result;
use arrow::util::pretty::pretty_format_batches;
use colored::Colorize;
use futures::TryStreamExt;
use std::future::Future;
use std::time::Instant;
use tabula_core::FlightConfig;
use tabula_flight::{DatasetRegistry, FlightClient, FlightServer};
use tracing::{info, warn};

pub async fn serve(config: &FlightConfig) -> Result<()> {
    serve_until(config, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    })
    .await
}

/// Serve the constant datasets until `stop` completes
pub async fn serve_until(config: &FlightConfig, stop: impl Future<Output = ()>) -> Result<()> {
    let registry = DatasetRegistry::with_fixtures()?;
    let tickets: Vec<String> = registry
        .tickets()
        .map(|t| String::from_utf8_lossy(t).into_owned())
        .collect();

    let mut server = FlightServer::bind(config, registry).await?;

    println!(
        "{} Flight server listening on {}",
        "✓".bright_green(),
        server.url().bright_cyan()
    );
    println!("{} {}", "Tickets:".bright_yellow(), tickets.join(", "));
    println!("{}", "Press Ctrl-C to stop".bright_black());

    stop.await;

    server.shutdown().await?;
    println!("{} Server stopped", "✓".bright_green());
    Ok(())
}

pub async fn list_flights(address: &str, criteria: &str) -> Result<()> {
    let mut client = FlightClient::connect(address).await?;

    let flights: Vec<_> = client
        .list_flights(criteria.as_bytes().to_vec())
        .await?
        .try_collect()
        .await?;
    client.close();

    if flights.is_empty() {
        println!("{}", "No flights matched".bright_black());
        return Ok(());
    }

    for info in flights {
        let path = info
            .flight_descriptor
            .as_ref()
            .map(|d| d.path.join("/"))
            .unwrap_or_default();
        println!(
            "{}  records={} bytes={} endpoints={}",
            path.bright_cyan(),
            info.total_records,
            info.total_bytes,
            info.endpoint.len()
        );
    }

    Ok(())
}

pub async fn get_dataset(address: &str, ticket: &str) -> Result<()> {
    let start = Instant::now();
    let mut client = FlightClient::connect(address).await?;

    let dataset = client.fetch(ticket.as_bytes().to_vec()).await?;
    client.close();

    println!("{}", pretty_format_batches(dataset.batches())?);
    println!(
        "{} {} rows in {} batches ({:.2}ms)",
        "✓".bright_green(),
        dataset.num_rows(),
        dataset.num_batches(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(())
}
