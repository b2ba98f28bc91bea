use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tokio::runtime::Builder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dv_routing::display::format_tables;
use dv_routing::{AsyncTopology, RouterId, RoutingTable, Scenario, Step};

#[derive(Parser)]
#[command(name = "dv-routing", version, about = "Distance-vector routing simulator")]
struct Cli {
    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the built-in four-router scenario
    Demo {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run a scenario from a JSON file
    Run {
        scenario: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Print tables as JSON
    #[arg(long)]
    json: bool,

    /// Use one task per router instead of the synchronous engine
    #[arg(long)]
    concurrent: bool,

    /// Check the final tables against Dijkstra
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let (scenario, output) = match cli.command {
        Command::Demo { output } => (Scenario::demo(), output),
        Command::Run { scenario, output } => (Scenario::load(&scenario)?, output),
    };

    info!(
        nodes = scenario.nodes.len(),
        steps = scenario.steps.len(),
        concurrent = output.concurrent,
        "running scenario"
    );

    if output.concurrent {
        let rt = Builder::new_multi_thread().enable_all().build()?;
        rt.block_on(run_concurrent(&scenario, &output))
    } else {
        run_sync(&scenario, &output)
    }
}

fn run_sync(scenario: &Scenario, output: &OutputArgs) -> Result<()> {
    let topology = scenario.run(|topology| print_tables(&topology.tables(), output.json))?;

    if !scenario.steps.contains(&Step::Print) {
        print_tables(&topology.tables(), output.json);
    }
    let stats = topology.stats();
    info!(
        delivered = stats.delivered,
        dropped = stats.dropped,
        requests = stats.requests,
        coalesced = stats.coalesced,
        "scenario finished"
    );

    if output.verify {
        report(topology.mismatches())?;
    }
    Ok(())
}

async fn run_concurrent(scenario: &Scenario, output: &OutputArgs) -> Result<()> {
    let mut topology = AsyncTopology::with_config(scenario.config);
    for id in &scenario.nodes {
        topology.add_node(id.clone()).await?;
    }

    for step in &scenario.steps {
        match step {
            Step::AddNode { id } => topology.add_node(id.clone()).await?,
            Step::AddEdge { a, b, weight } => topology.add_edge(a, b, *weight).await?,
            Step::RemoveEdge { a, b } => topology.remove_edge(a, b).await?,
            Step::RemoveNode { id } => topology.remove_node(id).await?,
            Step::Print => print_tables(&topology.tables().await?, output.json),
        }
    }

    if !scenario.steps.contains(&Step::Print) {
        print_tables(&topology.tables().await?, output.json);
    }
    let stats = topology.stats();
    info!(
        delivered = stats.delivered,
        dropped = stats.dropped,
        requests = stats.requests,
        coalesced = stats.coalesced,
        "scenario finished"
    );

    let mismatches = if output.verify { Some(topology.mismatches().await?) } else { None };
    topology.shutdown().await?;

    match mismatches {
        Some(mismatches) => report(mismatches),
        None => Ok(()),
    }
}

fn print_tables(tables: &BTreeMap<RouterId, RoutingTable>, json: bool) {
    if json {
        match serde_json::to_string_pretty(tables) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to serialize tables: {}", e),
        }
    } else {
        println!("{}", format_tables(tables));
    }
}

fn report(mismatches: Vec<dv_routing::algorithms::RouteMismatch>) -> Result<()> {
    if mismatches.is_empty() {
        info!("all routes match the shortest paths");
        return Ok(());
    }
    for mismatch in &mismatches {
        error!("{}", mismatch);
    }
    bail!("{} routes differ from the shortest paths", mismatches.len())
}
