//! oxide-filemigrate CLI
//!
//! Command-line tool for applying and rolling back SQL migration files.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use oxide_filemigrate::events::EventDispatcher;
use oxide_filemigrate::prelude::*;

/// File-based SQL migrations with batch rollback.
#[derive(Parser)]
#[command(name = "oxide-filemigrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (`sqlite:`, `postgres://` or `mysql://`).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Database dialect; inferred from the URL scheme when omitted.
    #[arg(long, env = "MIGRATE_DIALECT")]
    dialect: Option<Dialect>,

    /// Ledger storage: `db` or `json`.
    #[arg(short, long, env = "MIGRATE_LEDGER", default_value = "db")]
    ledger: LedgerKind,

    /// Prefix of the ledger tables.
    #[arg(long, env = "MIGRATE_TABLE_PREFIX", default_value = "oxide")]
    table_prefix: String,

    /// Migrations directory.
    #[arg(short, long, env = "MIGRATIONS_DIR", default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Directory for the JSON ledger documents (defaults to the migrations directory).
    #[arg(long)]
    document_dir: Option<PathBuf>,

    /// Rollback file naming: `suffix` or `marker`.
    #[arg(long, env = "MIGRATE_NAMING", default_value = "suffix")]
    naming: NamingConvention,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Database(DatabaseCommand),

    /// Create an empty migration file and its rollback file.
    Add {
        /// Text appended to the timestamp in the file names.
        #[arg(default_value = "")]
        name: String,
    },
}

/// Commands that run against the database and its ledger.
#[derive(Subcommand)]
enum DatabaseCommand {
    /// Create the ledger tables or documents.
    Init,

    /// Apply pending migrations.
    Migrate {
        /// Number of migrations to apply (all if 0).
        #[arg(default_value_t = 0)]
        count: usize,
    },

    /// Roll back migrations of the latest batch.
    Rollback {
        /// Number of migrations to roll back (whole batch if 0).
        #[arg(default_value_t = 0)]
        count: usize,

        /// Consider every applied migration, not just the latest batch.
        #[arg(long)]
        all: bool,
    },

    /// Roll back every migration, then apply all of them again.
    Refresh,

    /// Print the audit report.
    Report,

    /// Show applied and pending migrations.
    Status,

    /// Check applied migration files against their recorded checksums.
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let dialect = match cli.dialect {
        Some(dialect) => dialect,
        None => Dialect::from_url(&cli.database)?,
    };

    let mut config = MigratorConfig::new(dialect)
        .ledger(cli.ledger)
        .table_prefix(cli.table_prefix)
        .migrations_dir(cli.migrations_dir)
        .naming(cli.naming);
    if let Some(dir) = cli.document_dir {
        config = config.document_dir(dir);
    }

    match cli.command {
        // Scaffolding needs no database.
        Commands::Add { name } => {
            tokio::fs::create_dir_all(&config.migrations_dir).await?;
            let catalog = MigrationCatalog::new(&config.migrations_dir).naming(config.naming);
            catalog.scaffold(&name, &EventDispatcher::new()).await?;
        }

        Commands::Database(command) => {
            let connection = connect(dialect, &cli.database).await?;
            let migrator = Migrator::from_config(connection, &config)?;
            migrator.init().await?;
            run(&migrator, command).await?;
        }
    }

    Ok(())
}

async fn run(migrator: &Migrator, command: DatabaseCommand) -> anyhow::Result<()> {
    match command {
        DatabaseCommand::Init => {
            info!("Migration ledger is ready ({}).", migrator.ledger().kind());
        }

        DatabaseCommand::Migrate { count } => {
            migrator.migrate(count).await?;
        }

        DatabaseCommand::Rollback { count, all } => {
            let scope = if all {
                RollbackScope::All
            } else {
                RollbackScope::LatestBatch
            };
            migrator.rollback(count, scope).await?;
        }

        DatabaseCommand::Refresh => {
            let summary = migrator.refresh().await?;
            info!(
                "Refreshed: {} rolled back, {} migrated",
                summary.rolled_back, summary.migrated
            );
        }

        DatabaseCommand::Report => {
            print!("{}", migrator.report().await?);
        }

        DatabaseCommand::Status => {
            let applied = migrator.applied().await?;
            let pending = migrator.pending().await?;

            println!("\nApplied migrations:");
            println!("{:-<60}", "");
            for entry in applied.iter().rev() {
                println!(
                    " [X] {} ({})",
                    entry.file_name,
                    entry.applied_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            for file in &pending {
                println!(" [ ] {}", file.name);
            }
            println!();
        }

        DatabaseCommand::Validate => {
            let findings = migrator.checksum_validation().await;
            if !findings.is_empty() {
                for finding in &findings {
                    eprintln!("{finding}");
                }
                anyhow::bail!(
                    "{} migration file(s) failed checksum validation",
                    findings.len()
                );
            }
            info!("All applied migration files match their checksums.");
        }
    }

    Ok(())
}

/// Opens a single-connection pool for `dialect`.
///
/// Statements of a migration run in order on one session, so the pool is
/// capped at one connection.
async fn connect(dialect: Dialect, url: &str) -> anyhow::Result<Arc<dyn Connection>> {
    let connection: Arc<dyn Connection> = match dialect {
        Dialect::Sqlite => {
            let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
            Arc::new(
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect_with(options)
                    .await?,
            )
        }
        Dialect::Postgres => Arc::new(PgPoolOptions::new().max_connections(1).connect(url).await?),
        Dialect::MySql => Arc::new(
            MySqlPoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await?,
        ),
        Dialect::Firebird => anyhow::bail!(
            "no Firebird driver is bundled; embed the library and implement `Connection`"
        ),
    };
    Ok(connection)
}
