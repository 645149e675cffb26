//! Portal CLI
//!
//! Command-line interface for registering, exploring and updating
//! records on a data portal.

use clap::{Parser, Subcommand};
use portal_client::{ClientConfig, PortalClient};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "portal")]
#[command(version, about = "Data portal catalog CLI", long_about = None)]
struct Cli {
    /// Base address of the portal API
    #[arg(long, env = "PORTAL_URL", default_value = "http://localhost:5000/api/rest", global = true)]
    base_url: String,

    /// API key for write operations
    #[arg(long, env = "PORTAL_API_KEY", global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered package names
    List,

    /// Show a package record
    Show {
        /// Name of the package
        name: String,
    },

    /// Register a new package from a JSON file
    Register {
        /// Path to the package record
        file: String,
    },

    /// Update an existing package from a JSON file
    Update {
        /// Path to the package record
        file: String,
    },

    /// Delete a package
    Delete {
        /// Name of the package
        name: String,
    },

    /// Search packages
    Search {
        /// Search query
        query: String,

        /// Results per page
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Invoke an action endpoint
    Action {
        /// Action name, e.g. package_show
        name: String,

        /// Parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },

    /// Upload a file to blob storage
    Upload {
        /// Path to the file
        file: String,
    },

    /// Attach a resource to a package
    AddResource {
        /// Name of the package
        package: String,

        /// Local file path or remote URL
        resource: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = ClientConfig::builder(&cli.base_url);
    if let Some(ref api_key) = cli.api_key {
        builder = builder.api_key(api_key);
    }
    let client = PortalClient::new(builder.build()?)?;

    match cli.command {
        Commands::List => {
            let names = client.package_register_get().await?;
            for name in names.as_array().into_iter().flatten() {
                println!("{}", name.as_str().unwrap_or_default());
            }
        }
        Commands::Show { name } => {
            let package = client.package_entity_get(&name).await?;
            println!("{}", serde_json::to_string_pretty(&package)?);
        }
        Commands::Register { file } => {
            let package = read_record(&file)?;
            let created = client.package_register_post(&package).await?;
            let name = created["name"].as_str().unwrap_or("(unnamed)");
            println!("Registered package '{}'", name);
        }
        Commands::Update { file } => {
            let package = read_record(&file)?;
            let updated = client.package_entity_put(&package).await?;
            let name = updated["name"].as_str().unwrap_or("(unnamed)");
            println!("Updated package '{}'", name);
        }
        Commands::Delete { name } => {
            client.package_entity_delete(&name).await?;
            println!("Deleted package '{}'", name);
        }
        Commands::Search { query, limit } => {
            let options = limit.map(|limit| {
                let mut options = Map::new();
                options.insert("limit".to_string(), Value::from(limit));
                options
            });
            let found = client.package_search(&query, options).await?;
            println!("{} matches", found.count);

            let mut results = found.results;
            while let Some(item) = results.try_next().await? {
                match item {
                    Value::String(name) => println!("  {}", name),
                    other => println!("  {}", other),
                }
            }
        }
        Commands::Action { name, params } => {
            let params: Value = serde_json::from_str(&params)?;
            let result = client.action(&name, &params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Upload { file } => {
            let url = client.upload_file(&file).await?;
            println!("{}", url);
        }
        Commands::AddResource { package, resource } => {
            let updated = client
                .add_package_resource(&package, &resource, Map::new())
                .await?;
            let count = updated["resources"].as_array().map_or(0, |r| r.len());
            println!("Package '{}' now has {} resources", package, count);
        }
    }

    Ok(())
}

fn read_record(path: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let record: Value = serde_json::from_str(&text)?;
    Ok(record)
}
