//! CLI administration tool for redirector.
//!
//! Manages aliases directly against the store, without a running service.
//!
//! # Usage
//!
//! ```bash
//! # Create an alias (random when --alias is omitted)
//! cargo run --bin admin -- alias create --alias go --url https://go.dev/
//!
//! # Change its destination
//! cargo run --bin admin -- alias update go --url https://go.dev/doc/
//!
//! # List all aliases
//! cargo run --bin admin -- alias list
//!
//! # Resolve and count a visit
//! cargo run --bin admin -- resolve go
//! cargo run --bin admin -- visit go 203.0.113.7
//!
//! # Backup and restore
//! cargo run --bin admin -- dump aliases.json
//! cargo run --bin admin -- import aliases.json
//!
//! # Referer and user agent counts
//! cargo run --bin admin -- stats go
//!
//! # Check store connection
//! cargo run --bin admin -- db check
//! ```
//!
//! # Environment Variables
//!
//! - `REDIS_URL` or `REDIS_HOST` (required): store connection
//! - see [`redirector::config`] for the rest

use redirector::application::services::{RedirectService, VisitService};
use redirector::application::updater::OptimisticUpdater;
use redirector::config::{self, Config, mask_connection_string};
use redirector::domain::entities::{AliasKind, NewRedirect, Redirect, RedirectPatch};
use redirector::domain::repositories::RecordStore;
use redirector::domain::visit_event::VisitEvent;
use redirector::infrastructure::cache::NullCache;
use redirector::infrastructure::persistence::RedisStore;
use redirector::telemetry;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use std::sync::Arc;

/// CLI tool for managing redirector.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Top-level command groups.
#[derive(Subcommand)]
enum Commands {
    /// Manage aliases
    Alias {
        #[command(subcommand)]
        action: AliasAction,
    },

    /// Resolve an alias the way the redirect path does
    Resolve { alias: String },

    /// Record a visit to an alias
    Visit {
        alias: String,
        ip: String,

        /// Client user agent
        #[arg(long)]
        user_agent: Option<String>,

        /// Referring page
        #[arg(long)]
        referer: Option<String>,
    },

    /// Show referer and user agent counts for an alias
    Stats { alias: String },

    /// Import aliases from a JSON file, replacing existing ones
    Import {
        file: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Dump all aliases to a JSON file
    Dump { file: String },

    /// Store operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

/// Alias management subcommands.
#[derive(Subcommand)]
enum AliasAction {
    /// Create a new alias
    Create {
        /// Alias to use (random when omitted)
        #[arg(short, long)]
        alias: Option<String>,

        /// Destination URL
        #[arg(short, long)]
        url: String,

        /// Hide from public listings
        #[arg(long)]
        private: bool,

        /// Skip the interstitial warning page
        #[arg(long)]
        trust: bool,

        /// Activation time (RFC 3339), defaults to now
        #[arg(long)]
        valid_from: Option<DateTime<Utc>>,
    },

    /// Change an existing alias
    Update {
        alias: String,

        #[arg(short, long)]
        url: Option<String>,

        #[arg(long)]
        private: Option<bool>,

        #[arg(long)]
        trust: Option<bool>,

        #[arg(long)]
        valid_from: Option<DateTime<Utc>>,
    },

    /// Delete an alias
    Delete {
        alias: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show one alias
    Fetch { alias: String },

    /// List all aliases
    List,
}

/// Store operation subcommands.
#[derive(Subcommand)]
enum DbAction {
    /// Check store connection
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = config::load_from_env().context("Invalid configuration")?;
    telemetry::init(&config)?;

    let store = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to {}",
                    mask_connection_string(&config.redis_url)
                )
            })?,
    );

    // A one-shot process gains nothing from caching.
    let redirects = RedirectService::new(store.clone(), Arc::new(NullCache::new()))
        .with_retry_policy(config.retry_policy())
        .with_update_timeout(config.update_timeout())
        .with_random_alias_length(config.random_alias_length);

    match cli.command {
        Commands::Alias { action } => handle_alias_action(action, &redirects).await?,
        Commands::Resolve { alias } => resolve(&redirects, &alias).await?,
        Commands::Visit {
            alias,
            ip,
            user_agent,
            referer,
        } => {
            let event = VisitEvent::new(alias, ip)
                .with_client(user_agent.as_deref(), referer.as_deref());
            visit(visit_service(store, &config), &event).await?
        }
        Commands::Stats { alias } => stats(visit_service(store, &config), &alias).await?,
        Commands::Import { file, yes } => import(&redirects, &file, yes).await?,
        Commands::Dump { file } => dump(&redirects, &file).await?,
        Commands::Db { action } => handle_db_action(action, store.as_ref(), &config).await?,
    }

    Ok(())
}

/// Dispatches alias management commands.
async fn handle_alias_action(
    action: AliasAction,
    redirects: &RedirectService<RedisStore>,
) -> Result<()> {
    match action {
        AliasAction::Create {
            alias,
            url,
            private,
            trust,
            valid_from,
        } => {
            let kind = if alias.is_some() {
                AliasKind::Short
            } else {
                AliasKind::Random
            };
            let new_redirect = NewRedirect {
                alias,
                kind,
                url,
                private,
                trust,
                valid_from,
            };

            let redirect = redirects
                .create(new_redirect)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create alias: {}", e))?;

            println!("{}", "✅ Alias created".green().bold());
            print_redirect(&redirect);
        }
        AliasAction::Update {
            alias,
            url,
            private,
            trust,
            valid_from,
        } => {
            let patch = RedirectPatch {
                url,
                private,
                trust,
                valid_from,
            };

            let redirect = redirects
                .update(&alias, patch)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to update alias: {}", e))?;

            println!("{}", "✅ Alias updated".green().bold());
            print_redirect(&redirect);
        }
        AliasAction::Delete { alias, yes } => delete(redirects, &alias, yes).await?,
        AliasAction::Fetch { alias } => {
            let redirect = redirects
                .fetch(&alias)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to fetch alias: {}", e))?;
            print_redirect(&redirect);
        }
        AliasAction::List => list(redirects).await?,
    }

    Ok(())
}

/// Deletes an alias after confirmation (default: No).
async fn delete(redirects: &RedirectService<RedisStore>, alias: &str, skip_confirm: bool) -> Result<()> {
    println!("{}", "🗑️  Delete Alias".bright_blue().bold());
    println!();

    let redirect = redirects
        .fetch(alias)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to fetch alias: {}", e))?;
    print_redirect(&redirect);

    if !skip_confirm {
        let confirmed = Confirm::new()
            .with_prompt("Delete this alias?")
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "❌ Cancelled".red());
            return Ok(());
        }
    }

    redirects
        .delete(alias)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to delete alias: {}", e))?;

    println!("{}", "✅ Alias deleted".green().bold());
    Ok(())
}

/// Lists all aliases with their counters.
///
/// # Output Format
///
/// ```text
/// 📋 Aliases
///
///   Alias                Kind    PV       UV       Destination
///   ────────────────────────────────────────────────────────────────
///   go                   short   120      31       https://go.dev/
/// ```
async fn list(redirects: &RedirectService<RedisStore>) -> Result<()> {
    println!("{}", "📋 Aliases".bright_blue().bold());
    println!();

    let all = redirects
        .list()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list aliases: {}", e))?;

    if all.is_empty() {
        println!("{}", "  No aliases found".yellow());
        println!();
        println!(
            "  Create one with: {} admin alias create --url <URL>",
            "cargo run --bin".bright_cyan()
        );
        return Ok(());
    }

    println!(
        "  {:<20} {:<7} {:<8} {:<8} {}",
        "Alias".bright_white().bold(),
        "Kind".bright_white().bold(),
        "PV".bright_white().bold(),
        "UV".bright_white().bold(),
        "Destination".bright_white().bold()
    );
    println!("  {}", "─".repeat(75).bright_black());

    for redirect in &all {
        let alias = if redirect.is_active() {
            redirect.alias.cyan()
        } else {
            redirect.alias.bright_black()
        };

        println!(
            "  {:<20} {:<7} {:<8} {:<8} {}",
            alias,
            kind_label(redirect.kind),
            redirect.pv,
            redirect.uv,
            redirect.url
        );
    }

    println!();
    println!("  Total: {}", all.len().to_string().bright_white().bold());
    println!();

    Ok(())
}

async fn resolve(redirects: &RedirectService<RedisStore>, alias: &str) -> Result<()> {
    match redirects.resolve(alias).await {
        Ok(redirect) => {
            println!("{} {} {}", alias.cyan(), "→".bright_black(), redirect.url.green());
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            println!("{} {}", alias.cyan(), "not found".red());
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Failed to resolve alias: {}", e)),
    }
}

fn visit_service(store: Arc<RedisStore>, config: &Config) -> VisitService<RedisStore> {
    let updater = OptimisticUpdater::with_policy(store.clone(), config.retry_policy());
    VisitService::new(store, updater).with_update_timeout(config.update_timeout())
}

async fn visit(visits: VisitService<RedisStore>, event: &VisitEvent) -> Result<()> {
    let first = visits
        .record_event(event)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to record visit: {}", e))?;

    if first {
        println!("{}", "✅ Visit recorded (new visitor)".green().bold());
    } else {
        println!("{}", "✅ Visit recorded (returning visitor)".green().bold());
    }
    Ok(())
}

async fn stats(visits: VisitService<RedisStore>, alias: &str) -> Result<()> {
    let tally = visits
        .client_stats(alias)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load stats: {}", e))?;

    println!("{} {}", "📊 Clients of".bright_blue().bold(), alias.cyan());
    for (title, rows) in [
        ("Referers", tally.top_referers()),
        ("User agents", tally.top_user_agents()),
    ] {
        println!();
        println!("  {}", title.bold());
        if rows.is_empty() {
            println!("    {}", "none recorded".bright_black());
        }
        for row in rows {
            println!("    {:>8}  {}", row.count.to_string().bright_green(), row.name);
        }
    }
    println!();
    Ok(())
}

/// Imports aliases from a JSON array of redirects.
///
/// Existing aliases are overwritten, counters included.
async fn import(redirects: &RedirectService<RedisStore>, file: &str, skip_confirm: bool) -> Result<()> {
    println!("{}", "📥 Import Aliases".bright_blue().bold());
    println!();

    let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;
    let records: Vec<Redirect> =
        serde_json::from_str(&content).with_context(|| format!("Invalid alias file {}", file))?;

    println!("  File:    {}", file.cyan());
    println!("  Aliases: {}", records.len().to_string().bright_white().bold());
    println!();

    if !skip_confirm {
        let confirmed = Confirm::new()
            .with_prompt("Overwrite existing aliases with these records?")
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "❌ Cancelled".red());
            return Ok(());
        }
    }

    let mut failed = 0usize;
    for record in &records {
        if let Err(e) = redirects.overwrite(record).await {
            failed += 1;
            println!("  {} {}: {}", "✗".red(), record.alias, e);
        }
    }

    println!();
    println!(
        "{} {} imported, {} failed",
        "✅".green(),
        (records.len() - failed).to_string().bright_green().bold(),
        failed.to_string().bright_red()
    );
    Ok(())
}

async fn dump(redirects: &RedirectService<RedisStore>, file: &str) -> Result<()> {
    let all = redirects
        .list()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list aliases: {}", e))?;

    let content = serde_json::to_string_pretty(&all)?;
    std::fs::write(file, content).with_context(|| format!("Failed to write {}", file))?;

    println!(
        "{} {} aliases written to {}",
        "✅".green(),
        all.len().to_string().bright_white().bold(),
        file.cyan()
    );
    Ok(())
}

/// Handles store diagnostic commands.
async fn handle_db_action(action: DbAction, store: &RedisStore, config: &Config) -> Result<()> {
    match action {
        DbAction::Check => {
            println!("{}", "🔍 Checking store connection...".bright_blue());
            println!("  Redis: {}", mask_connection_string(&config.redis_url).bright_white());

            if !store.health_check().await {
                anyhow::bail!("Store health check failed");
            }

            println!("{}", "✅ Store connection OK".green().bold());
        }
    }

    Ok(())
}

fn print_redirect(redirect: &Redirect) {
    println!();
    println!("  Alias:      {}", redirect.alias.cyan());
    println!("  Kind:       {}", kind_label(redirect.kind));
    println!("  URL:        {}", redirect.url.bright_white());
    println!("  Private:    {}", redirect.private);
    println!("  Trust:      {}", redirect.trust);
    println!(
        "  Valid from: {}",
        redirect.valid_from.format("%Y-%m-%d %H:%M").to_string().bright_black()
    );
    println!(
        "  Visits:     {} pv / {} uv",
        redirect.pv.to_string().bright_green().bold(),
        redirect.uv.to_string().bright_green().bold()
    );
    println!();
}

fn kind_label(kind: AliasKind) -> &'static str {
    match kind {
        AliasKind::Short => "short",
        AliasKind::Random => "random",
    }
}
