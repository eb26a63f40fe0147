use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use pano::graph::InvestigationGraph;
use pano::{Config, PluginRegistry};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "inspect")]
#[command(about = "Print statistics of a saved Pano investigation graph")]
struct Args {
    /// Graph file (defaults to pano.graph_path from config)
    graph: Option<PathBuf>,

    /// List entities carrying conflict notes
    #[arg(short, long)]
    conflicts: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let path = args
        .graph
        .or_else(|| config.pano.graph_path.clone())
        .context("Usage: inspect <graph.json>")?;

    let registry = pano::registry::install_global(PluginRegistry::from_config(&config.plugins)?);
    let graph = InvestigationGraph::load_from_file(registry, &path)
        .with_context(|| format!("Failed to load graph from {}", path.display()))?;

    println!("\n=== Pano Graph Statistics: {} ===\n", path.display());

    if graph.is_empty() {
        println!("The graph is empty.");
        return Ok(());
    }

    println!("{:<24} {:>8}", "Entity type", "Count");
    println!("{:-<33}", "");
    for (entity_type, count) in graph.counts_by_type() {
        println!("{:<24} {:>8}", entity_type, count);
    }
    println!("{:<24} {:>8}\n", "Total", graph.entity_count());

    let mut kinds: IndexMap<&str, (usize, usize)> = IndexMap::new();
    for rel in graph.relationships() {
        let entry = kinds.entry(rel.kind.as_str()).or_default();
        if rel.directed {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }
    println!("{:<24} {:>8} {:>10}", "Relationship kind", "Directed", "Undirected");
    println!("{:-<44}", "");
    for (kind, (directed, undirected)) in &kinds {
        println!("{:<24} {:>8} {:>10}", kind, directed, undirected);
    }
    println!("{:<24} {:>8}\n", "Total", graph.relationship_count());

    let isolated = graph
        .all_entities(None)
        .iter()
        .filter(|e| graph.relationships_of(e.id()).is_empty())
        .count();
    println!("Isolated entities: {}", isolated);

    if args.conflicts {
        println!("\nConflicting values:");
        for entity in graph.all_entities(None) {
            for note in graph.conflicts(entity.id()) {
                println!(
                    "  {} [{}] {}: kept {} over {} (from {})",
                    entity.label(),
                    entity.entity_type(),
                    note.field,
                    note.existing,
                    note.incoming,
                    if note.source.is_empty() { "unknown" } else { &note.source }
                );
            }
        }
    }

    Ok(())
}
