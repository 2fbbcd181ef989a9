use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use permgraph::authz::{loader, types::Decision};
use permgraph::settings::Settings;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "permgraph",
    version,
    about = "Query a hierarchical authorization graph"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Seed directory, overrides `graph.seed_dir`
    #[arg(short, long)]
    seed: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide whether an identity holds a permission on a resource
    Check {
        identity: String,
        resource: String,
        permission: String,
    },
    /// List the effective roles of an identity on a resource
    Effective { identity: String, resource: String },
    /// List the ancestors of a resource, nearest first
    Ancestors { resource: String },
    /// List every resource an identity holds a role on, whether granted
    /// directly, through a group, or inherited from an ancestor resource
    Grants { identity: String },
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)?;
    if let Some(seed) = cli.seed {
        settings.graph.seed_dir = seed;
    }
    tracing::info!(?settings, "Loaded configuration");

    let graph = loader::load_access_graph(&settings.graph.seed_dir, settings.access_graph_config())?;

    match cli.command {
        Command::Check {
            identity,
            resource,
            permission,
        } => match graph.check(&identity, &resource, &permission) {
            Decision::Allow => println!("allow"),
            Decision::Deny { reason } => println!("deny: {reason}"),
        },
        Command::Effective { identity, resource } => {
            let roles = graph.effective_permissions(&identity, &resource)?;
            println!("{roles}");
        }
        Command::Ancestors { resource } => {
            for node in graph.snapshot().ancestors(&resource)? {
                println!("{}\t{}", node.kind, node.id);
            }
        }
        Command::Grants { identity } => {
            for entry in graph.grants_for(&identity)? {
                println!("{}\t{}\t{}", entry.role, entry.resource_kind, entry.resource_id);
            }
        }
    }
    Ok(())
}
