use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pano::graph::InvestigationGraph;
use pano::schema::Properties;
use pano::{Config, Outcome, PluginRegistry, SharedGraph, StatusEvent, StatusReporter, TransformEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "pano")]
#[command(about = "OSINT investigation graph with pluggable transforms")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered entity types and their fields
    Types,

    /// List transforms, optionally only those accepting an entity type
    Transforms {
        #[arg(long)]
        entity_type: Option<String>,
    },

    /// Run a transform on one entity and save the graph back
    Run {
        /// Graph file (defaults to pano.graph_path from config)
        #[arg(long)]
        graph: Option<PathBuf>,
        #[arg(long)]
        transform: String,
        #[arg(long)]
        entity: String,
    },

    /// Add an entity, merging with an existing one of the same key
    Add {
        #[arg(long)]
        graph: Option<PathBuf>,
        #[arg(long)]
        entity_type: String,
        /// Property as field=value; repeatable
        #[arg(long = "prop", value_parser = parse_prop)]
        props: Vec<(String, String)>,
    },

    /// Run a helper over the graph and print its JSON result
    Helper {
        #[arg(long)]
        graph: Option<PathBuf>,
        #[arg(long)]
        name: String,
        /// JSON parameters
        #[arg(long, default_value = "{}")]
        params: String,
    },

    /// Print entities and relationships of a graph
    Summary {
        #[arg(long)]
        graph: Option<PathBuf>,
    },
}

fn parse_prop(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected field=value, got '{raw}'"))
}

fn graph_path(arg: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    arg.or_else(|| config.graph_path().map(Path::to_path_buf))
        .context("No graph file given. Pass --graph or set pano.graph_path in pano.toml.")
}

/// Load the graph file, or start an empty graph when it does not exist yet.
fn open_graph(registry: &Arc<PluginRegistry>, path: &Path) -> Result<InvestigationGraph> {
    if !path.exists() {
        log::info!("{} not found, starting a new investigation", path.display());
        return Ok(InvestigationGraph::new(registry.clone()));
    }
    InvestigationGraph::load_from_file(registry.clone(), path)
        .with_context(|| format!("Failed to load graph from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.pano.log_level),
    )
    .init();

    let args = Args::parse();
    let registry = pano::registry::install_global(PluginRegistry::from_config(&config.plugins)?);

    match args.command {
        Command::Types => list_types(&registry),
        Command::Transforms { entity_type } => list_transforms(&registry, entity_type.as_deref()),
        Command::Run {
            graph,
            transform,
            entity,
        } => {
            let path = graph_path(graph, &config)?;
            run_transform(&config, &registry, &path, &transform, &entity).await?
        }
        Command::Add {
            graph,
            entity_type,
            props,
        } => {
            let path = graph_path(graph, &config)?;
            add_entity(&registry, &path, &entity_type, props)?
        }
        Command::Helper {
            graph,
            name,
            params,
        } => {
            let path = graph_path(graph, &config)?;
            run_helper(&registry, &path, &name, &params)?
        }
        Command::Summary { graph } => {
            let path = graph_path(graph, &config)?;
            print_summary(&registry, &path)?
        }
    }

    Ok(())
}

fn list_types(registry: &PluginRegistry) {
    for entity_type in registry.entity_types() {
        println!("{} - {}", entity_type.name(), entity_type.description());
        for field in entity_type.schema().fields() {
            let hidden = if field.display { "" } else { " (hidden)" };
            println!("    {:<16} {}{}", field.name, field.kind.name(), hidden);
        }
    }
}

fn list_transforms(registry: &PluginRegistry, entity_type: Option<&str>) {
    let transforms = match entity_type {
        Some(t) => registry.transforms_for(t),
        None => registry.transforms().cloned().collect(),
    };
    if transforms.is_empty() {
        println!("No transforms available.");
        return;
    }
    for transform in transforms {
        let d = transform.descriptor();
        println!(
            "{:<28} {} -> {}{}",
            d.name,
            d.input_types.join(", "),
            d.output_types.join(", "),
            if d.network_bound { "  [network]" } else { "" }
        );
    }
}

async fn run_transform(
    config: &Config,
    registry: &Arc<PluginRegistry>,
    path: &Path,
    transform_name: &str,
    entity: &str,
) -> Result<()> {
    let transform = registry
        .transform(transform_name)
        .cloned()
        .with_context(|| format!("Unknown transform: {transform_name}"))?;
    let graph = SharedGraph::new(open_graph(registry, path)?);
    let status = StatusReporter::new(config.status_config());
    let engine = TransformEngine::new(graph.clone(), status.clone(), config.engine_config());

    let mut events = status.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                StatusEvent::Progress { text, .. } => println!("  {text}"),
                StatusEvent::Failed { message, .. } => eprintln!("  error: {message}"),
                _ => {}
            }
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let report = engine
        .execute_detailed(&transform, &entity.into(), cancel)
        .await;
    drop(engine);
    drop(status);
    let _ = printer.await;

    match &report.outcome {
        Outcome::Completed => {
            println!(
                "{}: {} entities ({} new, {} enriched), {} new relationships in {:?}",
                report.transform,
                report.entities.len(),
                report.created,
                report.enriched,
                report.relationships_added,
                report.elapsed
            );
            for e in &report.entities {
                println!("  {} [{}] {}", e.id(), e.entity_type(), e.label());
            }
            graph.read().save_to_file(path)?;
        }
        Outcome::Cancelled => println!("{} cancelled", report.transform),
        Outcome::TimedOut => println!("{} timed out", report.transform),
        Outcome::Failed(reason) | Outcome::Rejected(reason) => {
            anyhow::bail!("{} failed: {}", report.transform, reason)
        }
    }
    Ok(())
}

fn add_entity(
    registry: &Arc<PluginRegistry>,
    path: &Path,
    entity_type: &str,
    props: Vec<(String, String)>,
) -> Result<()> {
    let mut graph = open_graph(registry, path)?;
    let properties: Properties = props.into_iter().map(|(k, v)| (k, v.into())).collect();
    let (entity, upsert) = graph
        .upsert_entity(entity_type, properties, "")
        .with_context(|| format!("Failed to add {entity_type}"))?;
    graph.save_to_file(path)?;
    println!("{:?} {} [{}] {}", upsert, entity.id(), entity.entity_type(), entity.label());
    Ok(())
}

fn run_helper(registry: &Arc<PluginRegistry>, path: &Path, name: &str, params: &str) -> Result<()> {
    let helper = registry
        .helper(name)
        .with_context(|| format!("Unknown helper: {name}"))?;
    let params: serde_json::Value =
        serde_json::from_str(params).context("Helper parameters must be JSON")?;
    let graph = open_graph(registry, path)?;
    let result = helper.analyze(&graph, &params)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn print_summary(registry: &Arc<PluginRegistry>, path: &Path) -> Result<()> {
    let graph = open_graph(registry, path)?;
    println!(
        "\n=== {} ({} entities, {} relationships) ===\n",
        path.display(),
        graph.entity_count(),
        graph.relationship_count()
    );
    for entity in graph.all_entities(None) {
        println!("{} [{}] {}", entity.id(), entity.entity_type(), entity.label());
        for rel in graph.relationships_of(entity.id()) {
            if &rel.source_id != entity.id() {
                continue;
            }
            if let Some(target) = graph.entity(&rel.target_id) {
                println!("    --{}--> {}", rel.kind, target.label());
            }
        }
    }
    Ok(())
}
