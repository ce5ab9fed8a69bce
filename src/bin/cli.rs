use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use amara_teams::authz::{EligibleTasks, Principal, ResourceContext};
use amara_teams::db::teams;

#[derive(Parser, Debug)]
#[command(author, version, about = "amara-teams maintenance tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Print a user's base and effective role in a team
    Role {
        team_id: Uuid,
        user_id: Uuid,
        #[arg(long)]
        project_id: Option<Uuid>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Print the tasks that could be created on a video, optionally for one user
    Eligible {
        team_id: Uuid,
        video_id: Uuid,
        #[arg(long)]
        user_id: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::Role { team_id, user_id, project_id, language } => {
            let pool = get_pool().await?;
            let mut conn = pool.acquire().await?;

            let project = match project_id {
                Some(id) => Some(teams::fetch_project(&mut conn, team_id, id).await?),
                None => None,
            };
            let membership = teams::fetch_membership(&mut conn, team_id, user_id).await?;
            let principal = Principal::new(user_id, team_id).with_membership(membership);
            let ctx = ResourceContext::new()
                .with_optional_project(project)
                .with_optional_language(language);

            println!("base:      {}", principal.base_role());
            println!("effective: {}", principal.role_for(team_id, &ctx));
        }
        Commands::Eligible { team_id, video_id, user_id } => {
            let pool = get_pool().await?;
            let mut conn = pool.acquire().await?;

            let loaded = teams::load_video(&mut conn, team_id, video_id).await?;
            let principal = match user_id {
                Some(user_id) => {
                    let membership = teams::fetch_membership(&mut conn, team_id, user_id).await?;
                    Some(Principal::new(user_id, team_id).with_membership(membership))
                }
                None => None,
            };

            let eligible = EligibleTasks::compute(&loaded.context(), principal.as_ref());
            println!("{}", serde_json::to_string_pretty(&eligible)?);
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let filename = format!("{}_{}.sql", timestamp, sanitize_name(name));
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if has_table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // ./migrations when run from the repo root, else the crate's own folder
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", display))
}
