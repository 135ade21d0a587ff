use clap::Parser;
use provdag::prelude::*;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Parse result archives and print the lineage recorded inside them
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Archives (or saved graphs) to parse and union
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Skip checksum validation
    #[arg(long)]
    no_checksums: bool,

    /// Do not load metadata tables referenced by actions
    #[arg(long)]
    no_metadata: bool,

    /// Log every parsed node
    #[arg(short, long)]
    verbose: bool,

    /// Save the parsed graph to this file
    #[arg(short, long)]
    save: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::default()
        .with_checksum_validation(!cli.no_checksums)
        .with_study_metadata(!cli.no_metadata)
        .with_verbose(cli.verbose);

    let parse_start = Instant::now();
    let graph = parse_all(cli.inputs.iter().map(String::as_str), config)
        .unwrap_or_else(|e| exit_with_error(&e.to_string()));
    let parse_duration = parse_start.elapsed();

    print_summary(&graph);

    if let Some(path) = &cli.save {
        graph
            .save(path)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to save graph: {}", e)));
        println!("\nGraph saved to {}", path);
    }

    println!("\nParsed {} input(s) in {:?}", cli.inputs.len(), parse_duration);
}

fn print_summary(graph: &ProvenanceGraph) {
    println!("--- Provenance Summary ---");
    println!("Nodes:    {}", graph.len());
    println!("Edges:    {}", graph.edges().len());
    println!("Validity: {}", graph.validity());

    println!("\nOrigins:");
    for id in graph.origin_ids() {
        println!("  {}", id);
    }

    println!("\nTerminal results:");
    for id in graph.terminal_ids() {
        match graph.get_node(id).ok().flatten() {
            Some(node) => match node.action() {
                Some(action) => println!(
                    "  {} ({}) <- {}.{}",
                    id,
                    node.semantic_type(),
                    action.plugin_name,
                    action.action_name
                ),
                None => println!("  {} ({}) <- no provenance", id, node.semantic_type()),
            },
            None => println!("  {}", id),
        }
    }

    if let Some(diff) = graph.checksum_diff().filter(|d| !d.is_empty()) {
        println!("\nChecksum differences:");
        for path in diff.added.keys() {
            println!("  added:   {}", path);
        }
        for path in diff.removed.keys() {
            println!("  removed: {}", path);
        }
        for (path, change) in &diff.changed {
            println!(
                "  changed: {} (expected {}, observed {})",
                path, change.expected, change.observed
            );
        }
    }

    if !graph.warnings().is_empty() {
        println!("\nWarnings:");
        for warning in graph.warnings() {
            println!("  {}", warning);
        }
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
