//! sql-dal CLI - SQL Server catalog metadata at the command line.

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use sql_dal::config::{ConnectionProfile, ProfileStore};
use sql_dal::db::sqlserver::{SqlServerConfig, SqlServerDriver};
use sql_dal::db::Database;
use sql_dal::schema::SqlDatabase;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sql-dal")]
#[command(about = "Inspect SQL Server databases: tables, routines and foreign keys")]
#[command(version)]
struct Cli {
    /// Saved connection profile to use; DB_* environment variables otherwise
    #[arg(short, long)]
    profile: Option<String>,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "warn")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and print the metadata of a database
    Schema {
        /// Database to inspect
        database: String,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,

        /// Print the foreign key creation script instead
        #[arg(long)]
        script: bool,
    },

    /// List databases on the server
    Databases,

    /// Test the database connection
    HealthCheck,

    /// Manage saved connection profiles
    Profiles {
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List saved profiles, the default one marked with '*'
    List,

    /// Save a profile, replacing one with the same name
    Add {
        name: String,

        #[arg(long)]
        host: String,

        #[arg(long, default_value_t = 1433)]
        port: u16,

        #[arg(short, long)]
        user: String,

        #[arg(long, default_value = "")]
        password: String,

        #[arg(short, long, default_value = "master")]
        database: String,

        /// Encrypt the connection
        #[arg(long)]
        encrypt: bool,

        /// Verify the server certificate
        #[arg(long)]
        verify_cert: bool,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },

    /// Delete a saved profile
    Remove { name: String },

    /// Use a saved profile when --profile is not given
    Default { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(&cli.verbosity) {
        eprintln!("Failed to setup logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let store = ProfileStore::load()?;

    if let Commands::Profiles { action } = cli.command {
        return profiles(store, action.unwrap_or(ProfileAction::List));
    }

    let config = match store.resolve(cli.profile.as_deref()) {
        Some(profile) => profile.to_sql_server_config(),
        None => match &cli.profile {
            Some(name) => bail!("Connection profile '{}' not found", name),
            None => SqlServerConfig::from_env(),
        },
    };

    info!(host = %config.host, database = %config.database, "connecting");
    let db = Database::new(Box::new(SqlServerDriver::new(config).await?));

    match cli.command {
        Commands::Schema { database, json, script } => schema(&db, &database, json, script).await,
        Commands::Databases => {
            for name in db.driver().get_databases().await? {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::HealthCheck => {
            let version: Option<String> = db.scalar("SELECT @@VERSION", &mut []).await?;
            println!("OK: {}", version.unwrap_or_default().lines().next().unwrap_or_default());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Profiles { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn profiles(mut store: ProfileStore, action: ProfileAction) -> Result<ExitCode> {
    if let ProfileAction::List = action {
        for profile in &store.profiles {
            let marker = if store.default_profile.as_deref() == Some(profile.name.as_str()) {
                "*"
            } else {
                " "
            };
            println!("{} {}  {}@{}:{}/{}", marker, profile.name, profile.user, profile.host, profile.port, profile.database);
        }
        return Ok(ExitCode::SUCCESS);
    }

    apply_profile_action(&mut store, action)?;
    store.save()?;
    Ok(ExitCode::SUCCESS)
}

/// Apply a change to the profile store. Listing is a no-op.
fn apply_profile_action(store: &mut ProfileStore, action: ProfileAction) -> Result<()> {
    match action {
        ProfileAction::List => {}
        ProfileAction::Add {
            name,
            host,
            port,
            user,
            password,
            database,
            encrypt,
            verify_cert,
            default,
        } => {
            let profile = ConnectionProfile {
                name,
                host,
                port,
                user,
                password,
                database,
                encrypt,
                trust_cert: !verify_cert,
            };
            if !profile.is_valid() {
                bail!("Profile needs a name, host, port, user and database");
            }
            if default {
                store.default_profile = Some(profile.name.clone());
            }
            info!(profile = %profile.name, "saving profile");
            store.upsert(profile);
        }
        ProfileAction::Remove { name } => {
            if store.get(&name).is_none() {
                bail!("Connection profile '{}' not found", name);
            }
            store.remove(&name);
        }
        ProfileAction::Default { name } => {
            if store.get(&name).is_none() {
                bail!("Connection profile '{}' not found", name);
            }
            store.default_profile = Some(name);
        }
    }
    Ok(())
}

fn print_summary(metadata: &SqlDatabase) {
    println!("Database: {}", metadata.name);

    for table in metadata.tables.values() {
        println!();
        println!("{}", table.name);
        for column in table.ordered_columns() {
            let mut flags = Vec::new();
            if column.is_pk {
                flags.push("PK".to_string());
            }
            if column.is_identity {
                flags.push("IDENTITY".to_string());
            }
            flags.push(if column.is_nullable { "NULL" } else { "NOT NULL" }.to_string());
            if !column.default_value.is_empty() {
                flags.push(format!("DEFAULT {}", column.default_value));
            }
            println!(
                "  {:<32} {:<16} {:<10} {}",
                column.name,
                column.data_type,
                column.base_type(),
                flags.join(" ")
            );
        }
        for constraint in table.constraints(metadata) {
            println!("  {}  {}", constraint.name, constraint);
        }
    }

    println!();
    println!(
        "{} tables, {} stored procedures, {} functions, {} foreign keys",
        metadata.tables.len(),
        metadata.stored_procedures.len(),
        metadata.functions.len(),
        metadata.constraints.len()
    );
}

fn setup_logging(verbosity: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}
