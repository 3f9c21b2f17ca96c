//! Specscan CLI - inspect and maintain the local component store

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use specscan_core::config::Config;
use specscan_core::domain::components::CachedComponent;
use specscan_core::domain::history::ScanSummary;
use specscan_core::domain::saved::SavedComponent;
use specscan_core::domain::{ComponentCategory, ComponentSpecs, SourceType, SpecSource};
use specscan_core::storage::CURRENT_VERSION;
use specscan_core::{DatabaseStats, Store};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "specscan")]
#[command(author, version, about = "Local component store for the specscan scanner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (overrides storage.database_path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show statistics for every cache and log
    Stats,

    /// Remove expired cache entries
    Clean,

    /// Run health check
    Doctor,

    /// Delete the database and recreate it empty
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Component spec cache
    Components {
        #[command(subcommand)]
        action: ComponentAction,
    },

    /// Scan history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Saved components
    Saved {
        #[command(subcommand)]
        action: SavedAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ComponentAction {
    /// Cache components from a JSON array file, all or nothing
    Import { file: PathBuf },
    /// Search cached components by part number or manufacturer
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show a cached component
    Show {
        part_number: String,
        #[arg(short, long)]
        manufacturer: Option<String>,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List recent scans
    List {
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(short, long, default_value_t = 0)]
        offset: u32,
    },
    /// Show a scan with its components
    Show { id: i64 },
    /// Delete a scan
    Delete { id: i64 },
    /// Delete every scan
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SavedAction {
    /// List saved components
    List {
        #[arg(short, long)]
        tag: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Save a component, or update notes and tags of a saved one
    Add {
        part_number: String,
        manufacturer: String,
        #[arg(short, long)]
        category: String,
        #[arg(short, long)]
        notes: Option<String>,
        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Add a tag
    Tag { id: i64, tag: String },
    /// Remove a tag
    Untag { id: i64, tag: String },
    /// Remove a saved component
    Remove { id: i64 },
    /// List every tag in use
    Tags,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all configuration values
    Show,
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("specscan=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    if let Commands::Config { action } = cli.command {
        return cmd_config(action, format);
    }

    let config = load_config(cli.database)?;
    let store = Store::from_config(&config)?;

    let result = match cli.command {
        Commands::Stats => cmd_stats(&store, format).await,
        Commands::Clean => cmd_clean(&store, format).await,
        Commands::Doctor => cmd_doctor(&store, format).await,
        Commands::Reset { yes } => cmd_reset(&store, yes, format).await,
        Commands::Components { action } => cmd_components(&store, &config, action, format).await,
        Commands::History { action } => cmd_history(&store, &config, action, format).await,
        Commands::Saved { action } => cmd_saved(&store, action, format).await,
        Commands::Config { .. } => Ok(()),
    };

    store.database().close().await;
    result
}

fn load_config(database: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    if let Some(path) = database {
        config.storage.database_path = Some(path);
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_category(s: &str) -> anyhow::Result<ComponentCategory> {
    ComponentCategory::from_str(s).ok_or_else(|| {
        let valid: Vec<&str> = ComponentCategory::ALL.iter().map(|c| c.as_str()).collect();
        anyhow!("Unknown category '{}'. Valid categories: {}", s, valid.join(", "))
    })
}

fn timestamp(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_stats(store: &Store, format: OutputFormat) -> anyhow::Result<()> {
    let stats = store.stats().await;
    if format == OutputFormat::Json {
        return print_json(&stats);
    }
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &DatabaseStats) {
    println!("Component cache:");
    match &stats.components {
        Some(components) => {
            println!("  Entries: {} ({} expired)", components.total_count, components.expired_count);
            for (category, count) in &components.by_category {
                println!("    {}: {}", category, count);
            }
        }
        None => println!("  (unavailable)"),
    }

    println!("Datasheet cache:");
    match &stats.datasheets {
        Some(datasheets) => {
            println!("  Entries: {} ({} expired)", datasheets.total_count, datasheets.expired_count);
            println!("  Size: {} bytes", datasheets.total_size_bytes);
            if let Some(oldest) = &datasheets.oldest_entry {
                println!("  Oldest: {}", timestamp(oldest));
            }
        }
        None => println!("  (unavailable)"),
    }

    println!("Scan history:");
    match &stats.history {
        Some(history) => {
            println!("  Scans: {}", history.total_scans);
            for (verdict, count) in &history.by_verdict_type {
                println!("    {}: {}", verdict, count);
            }
            if let Some(last) = &history.last_scan_at {
                println!("  Last scan: {}", timestamp(last));
            }
        }
        None => println!("  (unavailable)"),
    }

    match stats.saved_count {
        Some(count) => println!("Saved components: {}", count),
        None => println!("Saved components: (unavailable)"),
    }
}

async fn cmd_clean(store: &Store, format: OutputFormat) -> anyhow::Result<()> {
    let report = store.clean_expired().await?;
    if format == OutputFormat::Json {
        return print_json(&report);
    }
    println!(
        "Removed {} expired component(s) and {} expired datasheet(s).",
        report.components, report.datasheets
    );
    Ok(())
}

async fn cmd_doctor(store: &Store, format: OutputFormat) -> anyhow::Result<()> {
    let db = store.database();
    let health = db.health_check().await;
    let migrations = db.migration_status().await;

    if format == OutputFormat::Json {
        print_json(&json!({
            "database": db.path().display().to_string(),
            "healthy": health.is_ok(),
            "error": health.as_ref().err().map(|e| e.to_string()),
            "schema_version": migrations.as_ref().ok().map(|s| s.current_version),
            "target_version": CURRENT_VERSION,
        }))?;
    } else {
        println!("Specscan Health Check");
        println!("=====================");
        println!();
        println!("Database: {}", db.path().display());

        match &health {
            Ok(()) => println!("[OK] Database: Reachable"),
            Err(e) => {
                println!("[!!] Database: Error - {}", e);
                if let Some(hint) = e.suggestion() {
                    println!("     Try: {}", hint);
                }
            }
        }

        match &migrations {
            Ok(status) if !status.needs_migration => {
                println!("[OK] Schema: v{}", status.current_version)
            }
            Ok(status) => println!(
                "[!!] Schema: v{} (expected v{})",
                status.current_version, status.target_version
            ),
            Err(e) => println!("[!!] Schema: Error - {}", e),
        }
    }

    if health.is_err() || migrations.map(|s| s.needs_migration).unwrap_or(true) {
        warn!("Health check found problems");
        bail!("Health check failed");
    }
    Ok(())
}

async fn cmd_reset(store: &Store, yes: bool, format: OutputFormat) -> anyhow::Result<()> {
    if !yes {
        bail!("Refusing to delete the database without --yes");
    }

    store.database().reset().await?;
    info!(path = %store.database().path().display(), "Store reset from CLI");

    if format == OutputFormat::Json {
        return print_json(&json!({ "reset": true }));
    }
    println!("Database reset: {}", store.database().path().display());
    Ok(())
}

async fn cmd_components(
    store: &Store,
    config: &Config,
    action: ComponentAction,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let components = store.components();

    match action {
        ComponentAction::Import { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let specs: Vec<ComponentSpecs> = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            let count = components.cache_many(&specs).await?;
            if format == OutputFormat::Json {
                return print_json(&json!({ "imported": count }));
            }
            println!("Imported {} component(s).", count);
        }
        ComponentAction::Search { query, limit } => {
            let limit = limit.unwrap_or(config.cache.search_limit);
            let results = components.search(&query, Some(limit)).await?;
            if format == OutputFormat::Json {
                return print_json(&results);
            }
            if results.is_empty() {
                println!("No cached components match '{}'.", query);
            }
            for component in &results {
                print_component_line(component);
            }
        }
        ComponentAction::Show {
            part_number,
            manufacturer,
        } => {
            let found = match manufacturer {
                Some(manufacturer) => {
                    components
                        .get_by_part_number_and_manufacturer(&part_number, &manufacturer)
                        .await?
                }
                None => components.get_by_part_number(&part_number).await?,
            };

            let Some(component) = found else {
                bail!("Component '{}' is not cached", part_number);
            };

            if format == OutputFormat::Json {
                return print_json(&component);
            }
            print_component(&component);
        }
    }
    Ok(())
}

fn print_component_line(component: &CachedComponent) {
    println!(
        "  {} ({}) - {} - {} spec(s)",
        component.part_number,
        component.manufacturer,
        component.category,
        component.specs.len()
    );
}

fn print_component(component: &CachedComponent) {
    println!("{} ({})", component.part_number, component.manufacturer);
    println!("  Category: {}", component.category);
    println!(
        "  Source: {} ({:.0}% confidence)",
        component.source.source_type,
        component.source.confidence * 100.0
    );
    if let Some(url) = &component.datasheet_url {
        println!("  Datasheet: {}", url);
    }
    println!("  Updated: {}", timestamp(&component.updated_at));
    if let Some(expires_at) = &component.expires_at {
        println!("  Expires: {}", timestamp(expires_at));
    }
    for (name, spec) in &component.specs {
        let value = match (spec.value, spec.min, spec.max) {
            (Some(v), _, _) => format!("{}", v),
            (None, Some(min), Some(max)) => format!("{}..{}", min, max),
            (None, Some(min), None) => format!(">= {}", min),
            (None, None, Some(max)) => format!("<= {}", max),
            (None, None, None) => "?".to_string(),
        };
        match &spec.conditions {
            Some(conditions) => println!("    {}: {} {} ({})", name, value, spec.unit, conditions),
            None => println!("    {}: {} {}", name, value, spec.unit),
        }
    }
}

async fn cmd_history(
    store: &Store,
    config: &Config,
    action: HistoryAction,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let history = store.history();

    match action {
        HistoryAction::List { limit, offset } => {
            let limit = limit.unwrap_or(config.history.page_size);
            let scans = history.get_recent(limit, offset).await?;
            if format == OutputFormat::Json {
                return print_json(&scans);
            }
            if scans.is_empty() {
                println!("No scans recorded.");
            }
            for scan in &scans {
                print_scan_line(scan);
            }
        }
        HistoryAction::Show { id } => {
            let Some(scan) = history.get_by_id(id).await? else {
                bail!("Scan {} not found", id);
            };
            if format == OutputFormat::Json {
                return print_json(&scan);
            }
            println!("Scan {} - {}", scan.id, timestamp(&scan.created_at));
            println!("  Claim: {}", scan.claim.raw);
            println!("  Verdict: {}", scan.verdict.verdict);
            if let Some(summary) = &scan.verdict.summary {
                println!("  Summary: {}", summary);
            }
            for component in &scan.components {
                println!(
                    "    {} ({}) - {} - {:.0}%",
                    component.part_number,
                    component.manufacturer,
                    component.category,
                    component.confidence * 100.0
                );
            }
        }
        HistoryAction::Delete { id } => {
            let deleted = history.delete(id).await?;
            if format == OutputFormat::Json {
                return print_json(&json!({ "deleted": deleted }));
            }
            if !deleted {
                bail!("Scan {} not found", id);
            }
            println!("Deleted scan {}.", id);
        }
        HistoryAction::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear scan history without --yes");
            }
            let removed = history.clear_all().await?;
            if format == OutputFormat::Json {
                return print_json(&json!({ "removed": removed }));
            }
            println!("Removed {} scan(s).", removed);
        }
    }
    Ok(())
}

fn print_scan_line(scan: &ScanSummary) {
    println!(
        "  {:>5}  {}  {:<12}  {} ({} component(s))",
        scan.id,
        timestamp(&scan.created_at),
        scan.verdict_type,
        scan.claim_raw,
        scan.component_count
    );
}

async fn cmd_saved(store: &Store, action: SavedAction, format: OutputFormat) -> anyhow::Result<()> {
    let saved = store.saved();

    match action {
        SavedAction::List { tag, category } => {
            let mut items = match (&tag, &category) {
                (Some(tag), _) => saved.get_by_tag(tag).await?,
                (None, Some(category)) => saved.get_by_category(parse_category(category)?).await?,
                (None, None) => saved.get_all().await?,
            };
            if let (Some(_), Some(category)) = (&tag, &category) {
                let category = parse_category(category)?;
                items.retain(|item| item.category == category);
            }

            if format == OutputFormat::Json {
                return print_json(&items);
            }
            if items.is_empty() {
                println!("No saved components.");
            }
            for item in &items {
                print_saved_line(item);
            }
        }
        SavedAction::Add {
            part_number,
            manufacturer,
            category,
            notes,
            tags,
        } => {
            let mut component = ComponentSpecs::new(
                part_number,
                manufacturer,
                parse_category(&category)?,
                SpecSource::new(SourceType::Manual, 1.0),
            );
            // Specs are not editable here; keep whatever was saved with them
            if let Some(existing) = saved
                .get_by_key(&component.part_number, &component.manufacturer)
                .await?
            {
                component.specs = existing.specs;
            }
            let tags = (!tags.is_empty()).then_some(tags);

            let id = saved
                .save(&component, notes.as_deref(), tags.as_deref())
                .await?;
            if format == OutputFormat::Json {
                return print_json(&json!({ "id": id }));
            }
            println!("Saved {} ({}) as #{}.", component.part_number, component.manufacturer, id);
        }
        SavedAction::Tag { id, tag } => {
            if !saved.add_tag(id, &tag).await? {
                bail!("Saved component {} not found", id);
            }
            if format == OutputFormat::Json {
                return print_json(&json!({ "id": id, "tag": tag.trim() }));
            }
            println!("Tagged #{} with '{}'.", id, tag.trim());
        }
        SavedAction::Untag { id, tag } => {
            if !saved.remove_tag(id, &tag).await? {
                bail!("Saved component {} not found", id);
            }
            if format == OutputFormat::Json {
                return print_json(&json!({ "id": id, "untagged": tag.trim() }));
            }
            println!("Removed tag '{}' from #{}.", tag.trim(), id);
        }
        SavedAction::Remove { id } => {
            let removed = saved.remove(id).await?;
            if format == OutputFormat::Json {
                return print_json(&json!({ "removed": removed }));
            }
            if !removed {
                bail!("Saved component {} not found", id);
            }
            println!("Removed #{}.", id);
        }
        SavedAction::Tags => {
            let tags = saved.get_all_tags().await?;
            if format == OutputFormat::Json {
                return print_json(&tags);
            }
            for tag in tags {
                println!("{}", tag);
            }
        }
    }
    Ok(())
}

fn print_saved_line(item: &SavedComponent) {
    let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
    println!(
        "  #{:<4} {} ({}) - {}{}",
        item.id,
        item.part_number,
        item.manufacturer,
        item.category,
        if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        }
    );
    if let Some(notes) = &item.notes {
        println!("         {}", notes);
    }
}

fn cmd_config(action: ConfigAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            if format == OutputFormat::Json {
                return print_json(&config);
            }
            println!("# {}", Config::config_path()?.display());
            for key in Config::keys() {
                println!("{} = {}", key, config.get(key)?);
            }
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            if format == OutputFormat::Json {
                return print_json(&json!({ "key": key, "value": value }));
            }
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if format == OutputFormat::Json {
                return print_json(&json!({ "key": key, "value": value }));
            }
            println!("Set {} = {}", key, value);
        }
    }
    Ok(())
}
