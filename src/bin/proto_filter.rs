//! Proto Filter CLI
//!
//! Lists discoverable message types, encodes schema payloads and inspects
//! payload files.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proto_filter::{FilterConfig, SchemaCodec, SchemaRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "proto-filter")]
#[command(about = "Inspect protobuf schema payloads for column filters")]
struct Cli {
    /// Explicit configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Directories to scan for descriptor sets (overrides configuration)
    #[arg(short, long)]
    root: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List message types found in descriptor sets
    Types,

    /// Encode the schema payload for a message type
    Payload {
        /// Fully-qualified message type, e.g. example.ExampleProto
        type_name: String,
        /// Write the payload to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a payload file and print its schema as JSON
    Inspect {
        file: PathBuf,
    },

    /// Show the effective configuration
    Config {
        /// Save it to this file instead
        #[arg(long)]
        save: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = FilterConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if !cli.root.is_empty() {
        config.discovery.roots = cli.root;
    }

    match cli.command {
        Commands::Types => {
            let registry = SchemaRegistry::from_config(&config)?;
            let names = registry.type_names()?;
            for name in &names {
                println!("{}", name);
            }
            println!();
            println!("{} types, bundle {}", names.len(), registry.digest()?);
        }

        Commands::Payload { type_name, output } => {
            let registry = SchemaRegistry::from_config(&config)?;
            let encoded = registry.encoded_for_name(&type_name)?;
            println!("Type:  {}", type_name);
            println!("Bytes: {}", encoded.payload.len());
            println!("Hash:  {}", encoded.hash);
            if let Some(path) = output {
                fs::write(&path, &encoded.payload).with_context(|| format!("writing {}", path.display()))?;
                println!("Wrote {}", path.display());
            }
        }

        Commands::Inspect { file } => {
            let payload = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let codec = SchemaCodec::new(config.codec.compression_level);
            let schema = codec.decode(&payload)?;
            println!("{}", serde_json::to_string_pretty(&schema.describe())?);
        }

        Commands::Config { save } => match save {
            Some(path) => {
                config.save(&path).with_context(|| format!("saving configuration to {}", path))?;
                println!("Saved configuration to {}", path);
            }
            None => println!("{}", toml::to_string_pretty(&config)?),
        },
    }

    Ok(())
}
