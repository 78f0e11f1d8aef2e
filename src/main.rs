use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

use daybook::article::{self, Article};
use daybook::config::Config;
use daybook::export;
use daybook::storage::{LoadSource, LocalStore, PersistenceManager, SaveOutcome};
use daybook::store::ArticleStore;
use daybook::sync::{AutoSync, StartupLoad, SyncConfig, SyncManager, GIST_FILENAME};
use daybook::util;

const THEME_KEY: &str = "theme";
const TOTAL_VISITS_KEY: &str = "total_visits";
const LAST_VISIT_KEY: &str = "last_visit";

/// Images above this size are re-encoded before being embedded.
const IMAGE_COMPRESS_THRESHOLD: usize = 500 * 1024;
const IMAGE_MAX_WIDTH: u32 = 1024;
const JPEG_QUALITY: u8 = 70;

/// Get the data directory path (~/.config/daybook/)
fn default_data_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("daybook"))
}

#[derive(Parser, Debug)]
#[command(name = "daybook", about = "Local-first article journal with gist backup")]
struct Args {
    /// Override the data directory (default ~/.config/daybook)
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Admin secret, when the config requires one (or DAYBOOK_ADMIN_SECRET)
    #[arg(long, global = true)]
    secret: Option<String>,

    /// Assume yes on confirmation prompts
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List articles, newest first
    List {
        /// Only show this category
        #[arg(long)]
        category: Option<String>,

        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Show one article in full
    Show {
        /// Article id (or unambiguous prefix)
        id: String,
    },
    /// Create an article
    New {
        title: String,

        #[arg(long, default_value = "")]
        summary: String,

        #[arg(long, default_value = article::DEFAULT_CATEGORY)]
        category: String,

        /// Inline content
        #[arg(long, default_value = "", conflicts_with = "content_file")]
        content: String,

        /// Read content from this file
        #[arg(long, value_name = "FILE")]
        content_file: Option<PathBuf>,

        /// Attach an image, embedded as a data URL
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,
    },
    /// Edit an article
    Edit {
        /// Article id (or unambiguous prefix)
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        summary: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,

        #[arg(long, value_name = "FILE")]
        content_file: Option<PathBuf>,

        #[arg(long, value_name = "FILE", conflicts_with = "remove_image")]
        image: Option<PathBuf>,

        /// Drop the attached image
        #[arg(long)]
        remove_image: bool,
    },
    /// Delete an article
    Delete {
        /// Article id (or unambiguous prefix)
        id: String,
    },
    /// Replace the collection with a document file
    Import { file: PathBuf },
    /// Write the collection to a document file
    Export {
        /// Destination (default daybook-export-<date>.json)
        file: Option<PathBuf>,
    },
    /// Collection, storage, and sync overview
    Status,
    /// Show or set the stored display theme
    Theme {
        /// "light" or "dark"
        value: Option<String>,
    },
    /// Gist backup operations
    #[command(subcommand)]
    Sync(SyncCommand),
}

#[derive(Subcommand, Debug)]
enum SyncCommand {
    /// Save the token, gist binding, or auto-sync flag
    Setup {
        /// GitHub personal access token with the gist scope
        #[arg(long)]
        token: Option<String>,

        /// Bind an existing gist by id
        #[arg(long)]
        gist: Option<String>,

        /// Push automatically after each save
        #[arg(long)]
        auto: Option<bool>,
    },
    /// Push the collection to the gist now
    Now,
    /// Replace the local collection from a gist
    Pull {
        /// Gist id (defaults to the bound gist)
        id: Option<String>,
    },
    /// List backup gists reachable with the token
    Find,
    /// Create a fresh backup gist and bind it
    Create,
    /// Forget the token and gist binding
    Clear,
    /// Verify the token and the bound gist
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let data_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };

    let config = Config::load(&data_dir.join("config.toml"))?;

    if is_mutating(&args.command) {
        let provided = args
            .secret
            .clone()
            .or_else(|| std::env::var("DAYBOOK_ADMIN_SECRET").ok());
        require_admin(&config, provided.as_deref())?;
    }

    let local = LocalStore::open(&data_dir)
        .with_context(|| format!("Could not open data directory '{}'", data_dir.display()))?;
    let persist = PersistenceManager::new(local.clone());
    record_visit(&local);

    let loaded = persist.load();
    if loaded.dropped > 0 {
        eprintln!(
            "Warning: dropped {} unreadable records while loading.",
            loaded.dropped
        );
    }
    if matches!(loaded.source, LoadSource::Sample) {
        println!("Welcome to Daybook. Seeded the journal with sample articles.");
    }
    let mut store = ArticleStore::from_vec(loaded.articles);
    let mut sync_config = SyncConfig::load(&local);

    if matches!(&args.command, Command::List { .. } | Command::Status) {
        startup_restore(&mut store, &persist, &mut sync_config, &config).await;
    }

    match args.command {
        Command::List { category, page } => cmd_list(&store, &config, category.as_deref(), page),
        Command::Show { id } => cmd_show(&store, &id),
        Command::New {
            title,
            summary,
            category,
            content,
            content_file,
            image,
        } => {
            cmd_new(
                &mut store,
                &persist,
                &sync_config,
                &config,
                &local,
                title,
                summary,
                category,
                content,
                content_file,
                image,
            )
            .await
        }
        Command::Edit {
            id,
            title,
            summary,
            category,
            content,
            content_file,
            image,
            remove_image,
        } => {
            cmd_edit(
                &mut store,
                &persist,
                &sync_config,
                &config,
                &local,
                id,
                title,
                summary,
                category,
                content,
                content_file,
                image,
                remove_image,
            )
            .await
        }
        Command::Delete { id } => {
            cmd_delete(
                &mut store,
                &persist,
                &sync_config,
                &config,
                &local,
                &id,
                args.yes,
            )
            .await
        }
        Command::Import { file } => {
            cmd_import(
                &mut store,
                &persist,
                &sync_config,
                &config,
                &local,
                &file,
                args.yes,
            )
            .await
        }
        Command::Export { file } => cmd_export(&store, &sync_config, file),
        Command::Status => cmd_status(&store, &local, &sync_config),
        Command::Theme { value } => cmd_theme(&local, value),
        Command::Sync(command) => match command {
            SyncCommand::Setup { token, gist, auto } => {
                cmd_sync_setup(
                    &mut store,
                    &persist,
                    &local,
                    &config,
                    &mut sync_config,
                    token,
                    gist,
                    auto,
                )
                .await
            }
            SyncCommand::Now => cmd_sync_now(&store, &local, &config, &mut sync_config).await,
            SyncCommand::Pull { id } => {
                cmd_sync_pull(&mut store, &persist, &config, &mut sync_config, id, args.yes).await
            }
            SyncCommand::Find => cmd_sync_find(&config, &sync_config).await,
            SyncCommand::Create => {
                cmd_sync_create(&store, &local, &config, &mut sync_config, args.yes).await
            }
            SyncCommand::Clear => cmd_sync_clear(&local, args.yes),
            SyncCommand::Status => cmd_sync_status(&local, &config, &mut sync_config).await,
        },
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_list(
    store: &ArticleStore,
    config: &Config,
    category: Option<&str>,
    page: usize,
) -> Result<()> {
    let items: Vec<&Article> = match category {
        Some(name) => store.in_category(name),
        None => store.iter().collect(),
    };

    if items.is_empty() {
        match category {
            Some(name) => println!("No articles in category '{name}'."),
            None => println!("No articles yet. Create one with `daybook new <TITLE>`."),
        }
        return Ok(());
    }

    let per_page = config.articles_per_page.max(1);
    let pages = items.len().div_ceil(per_page);
    let page = page.clamp(1, pages);
    let start = (page - 1) * per_page;

    for article in items.iter().skip(start).take(per_page) {
        println!(
            "{}  {:<12} {:<12} {}",
            short_id(&article.id),
            util::relative_from_now(&article.date),
            article.category,
            article.title
        );
    }
    println!("Page {page}/{pages} ({} articles)", items.len());
    Ok(())
}

fn cmd_show(store: &ArticleStore, id: &str) -> Result<()> {
    let article = store.resolve(id)?;
    println!("Title:    {}", article.title);
    println!("Id:       {}", article.id);
    println!("Category: {}", article.category);
    println!(
        "Date:     {} ({})",
        article.date,
        util::relative_from_now(&article.date)
    );
    if !article.summary.is_empty() {
        println!("Summary:  {}", article.summary);
    }
    if !article.image.is_empty() {
        // Data URLs carry ~4/3 of the raw size
        println!(
            "Image:    attached ({})",
            human_bytes(article.image.len() * 3 / 4)
        );
    }
    if !article.content.is_empty() {
        println!();
        println!("{}", article.content);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_new(
    store: &mut ArticleStore,
    persist: &PersistenceManager,
    sync_config: &SyncConfig,
    config: &Config,
    local: &LocalStore,
    title: String,
    summary: String,
    category: String,
    content: String,
    content_file: Option<PathBuf>,
    image: Option<PathBuf>,
) -> Result<()> {
    let content = match content_file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read content file '{}'", path.display()))?,
        None => content,
    };
    let image_data = match image {
        Some(path) => attach_image(&path)?,
        None => String::new(),
    };
    article::check_limits(&title, &summary)?;
    check_category(&category)?;

    let article = Article::new(title, summary, category, content, image_data);
    let id = article.id.clone();
    store.insert_front(article)?;
    save_collection(store, persist)?;
    println!("Created article {id}.");

    auto_push(store, sync_config, config, local).await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_edit(
    store: &mut ArticleStore,
    persist: &PersistenceManager,
    sync_config: &SyncConfig,
    config: &Config,
    local: &LocalStore,
    id: String,
    title: Option<String>,
    summary: Option<String>,
    category: Option<String>,
    content: Option<String>,
    content_file: Option<PathBuf>,
    image: Option<PathBuf>,
    remove_image: bool,
) -> Result<()> {
    let untouched = title.is_none()
        && summary.is_none()
        && category.is_none()
        && content.is_none()
        && content_file.is_none()
        && image.is_none()
        && !remove_image;
    if untouched {
        anyhow::bail!(
            "Nothing to change (pass --title, --summary, --category, --content, --content-file, --image, or --remove-image)"
        );
    }

    let full_id = store.resolve(&id)?.id.clone();
    let mut updated = store
        .get(&full_id)
        .cloned()
        .context("Article disappeared while editing")?;

    if let Some(value) = title {
        updated.title = value;
    }
    if let Some(value) = summary {
        updated.summary = value;
    }
    if let Some(value) = category {
        check_category(&value)?;
        updated.category = value;
    }
    if let Some(path) = content_file {
        updated.content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read content file '{}'", path.display()))?;
    } else if let Some(value) = content {
        updated.content = value;
    }
    if remove_image {
        updated.image.clear();
    } else if let Some(path) = image {
        updated.image = attach_image(&path)?;
    }
    article::check_limits(&updated.title, &updated.summary)?;

    store.update(&full_id, |article| {
        article.title = updated.title;
        article.summary = updated.summary;
        article.category = updated.category;
        article.content = updated.content;
        article.image = updated.image;
    })?;
    save_collection(store, persist)?;
    println!("Updated article {full_id}.");

    auto_push(store, sync_config, config, local).await;
    Ok(())
}

async fn cmd_delete(
    store: &mut ArticleStore,
    persist: &PersistenceManager,
    sync_config: &SyncConfig,
    config: &Config,
    local: &LocalStore,
    id: &str,
    assume_yes: bool,
) -> Result<()> {
    let target = store.resolve(id)?;
    let full_id = target.id.clone();
    let title = target.title.clone();

    if !confirm(&format!("Delete '{title}'?"), assume_yes)? {
        println!("Aborted.");
        return Ok(());
    }

    store.remove(&full_id)?;
    save_collection(store, persist)?;
    println!("Deleted '{title}' ({full_id}).");

    auto_push(store, sync_config, config, local).await;
    Ok(())
}

async fn cmd_import(
    store: &mut ArticleStore,
    persist: &PersistenceManager,
    sync_config: &SyncConfig,
    config: &Config,
    local: &LocalStore,
    file: &Path,
    assume_yes: bool,
) -> Result<()> {
    // SEC-008: Canonicalize to resolve symlinks before touching the file
    let canonical = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
    if !std::fs::metadata(&canonical)?.is_file() {
        anyhow::bail!("Import path must be a regular file");
    }

    let prompt = format!(
        "Replace all {} local articles with the contents of '{}'?",
        store.len(),
        canonical.display()
    );
    if !confirm(&prompt, assume_yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let batch = export::read_import_file(&canonical)?;
    let incoming = batch.articles.len();
    let dropped = batch.dropped;
    let outcome = export::apply_import(batch.articles, store, persist).context("Import failed")?;

    report_outcome(&outcome);
    if dropped > 0 {
        eprintln!("Warning: {dropped} entries in the file were unusable and were dropped.");
    }
    println!("Imported {incoming} articles.");

    auto_push(store, sync_config, config, local).await;
    Ok(())
}

fn cmd_export(store: &ArticleStore, sync_config: &SyncConfig, file: Option<PathBuf>) -> Result<()> {
    let path = file.unwrap_or_else(|| PathBuf::from(export::default_export_name()));
    let stamp = sync_config.last_sync.clone().unwrap_or_else(util::now_iso);

    let bytes = export::export_to_file(store.as_slice(), &stamp, &path)?;
    println!(
        "Exported {} articles to {} ({}).",
        store.len(),
        path.display(),
        human_bytes(bytes)
    );
    Ok(())
}

fn cmd_status(store: &ArticleStore, local: &LocalStore, sync_config: &SyncConfig) -> Result<()> {
    println!("Articles: {}", store.len());
    let counts = store.category_counts();
    if !counts.is_empty() {
        let parts: Vec<String> = counts
            .iter()
            .map(|(category, count)| format!("{category} {count}"))
            .collect();
        println!("          {}", parts.join(", "));
    }

    let usage = local.usage()?;
    println!(
        "Storage:  {} of {} ({:.0}%)",
        human_bytes(usage.used),
        human_bytes(usage.budget),
        usage.percent()
    );

    match (&sync_config.token, &sync_config.gist_id) {
        (Some(_), Some(gist)) => {
            let last = sync_config
                .last_sync
                .as_deref()
                .map(util::relative_from_now)
                .unwrap_or_else(|| "never".to_string());
            println!(
                "Sync:     gist {} bound, auto-sync {}, last sync {}",
                short_id(gist),
                if sync_config.auto_sync { "on" } else { "off" },
                last
            );
        }
        (Some(_), None) => {
            println!("Sync:     token saved, no gist bound yet (run `daybook sync now`)")
        }
        _ => println!("Sync:     not configured (run `daybook sync setup --token <TOKEN>`)"),
    }

    let visits: Option<u64> = local
        .get(TOTAL_VISITS_KEY)?
        .and_then(|raw| serde_json::from_str(&raw).ok());
    if let Some(days) = visits {
        println!("Visits:   {days} days");
    }
    Ok(())
}

fn cmd_theme(local: &LocalStore, value: Option<String>) -> Result<()> {
    match value {
        None => {
            let current: String = local
                .get(THEME_KEY)?
                .and_then(|raw| serde_json::from_str(&raw).ok())
                .unwrap_or_else(|| "light".to_string());
            println!("{current}");
        }
        Some(value) => {
            if value != "light" && value != "dark" {
                anyhow::bail!("Theme must be \"light\" or \"dark\"");
            }
            local.set(THEME_KEY, &serde_json::to_string(&value)?)?;
            println!("Theme set to {value}.");
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_sync_setup(
    store: &mut ArticleStore,
    persist: &PersistenceManager,
    local: &LocalStore,
    config: &Config,
    sync_config: &mut SyncConfig,
    token: Option<String>,
    gist: Option<String>,
    auto: Option<bool>,
) -> Result<()> {
    if token.is_none() && gist.is_none() && auto.is_none() {
        anyhow::bail!("Nothing to set (pass --token, --gist, or --auto)");
    }

    if let Some(token) = token {
        sync_config.token = Some(token);
    }
    if let Some(auto) = auto {
        sync_config.auto_sync = auto;
    }
    if let Some(gist) = gist {
        let manager = SyncManager::new(sync_config, config.api_base_url.as_deref())?;
        match manager.is_own_document(&gist).await {
            Ok(true) => {}
            Ok(false) => eprintln!(
                "Warning: gist {gist} has no {GIST_FILENAME} file yet; the next push will add it."
            ),
            Err(error) => anyhow::bail!("Could not check gist {gist}: {error}"),
        }
        sync_config.gist_id = Some(gist);
    }
    sync_config.save(local)?;
    println!("Sync settings saved.");

    if sync_config.is_configured() {
        let manager = SyncManager::new(sync_config, config.api_base_url.as_deref())?;
        match manager.test_connection(sync_config, local).await {
            Ok(report) => {
                println!("Connected as {}.", report.login);
                if report.unbound {
                    eprintln!("Warning: the bound gist was unreachable and has been unbound.");
                }
            }
            Err(error) => eprintln!("Warning: connection test failed: {error}"),
        }
        startup_restore(store, persist, sync_config, config).await;
    }
    Ok(())
}

async fn cmd_sync_now(
    store: &ArticleStore,
    local: &LocalStore,
    config: &Config,
    sync_config: &mut SyncConfig,
) -> Result<()> {
    let manager = SyncManager::new(sync_config, config.api_base_url.as_deref())?;
    let report = manager.push(store.as_slice(), sync_config, local).await?;
    let verb = if report.created {
        "Created gist"
    } else if report.adopted {
        "Adopted gist"
    } else {
        "Updated gist"
    };
    println!("{verb} {} with {} articles.", report.gist_id, report.articles);
    Ok(())
}

async fn cmd_sync_pull(
    store: &mut ArticleStore,
    persist: &PersistenceManager,
    config: &Config,
    sync_config: &mut SyncConfig,
    id: Option<String>,
    assume_yes: bool,
) -> Result<()> {
    let gist_id = id.or_else(|| sync_config.gist_id.clone()).ok_or_else(|| {
        anyhow::anyhow!("No gist to pull from (pass an id, or bind one with `sync setup --gist`)")
    })?;

    let prompt = format!(
        "Replace all {} local articles with gist {}?",
        store.len(),
        gist_id
    );
    if !confirm(&prompt, assume_yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let manager = SyncManager::new(sync_config, config.api_base_url.as_deref())?;
    let report = manager
        .pull_from(&gist_id, store, persist, sync_config)
        .await?;
    println!("Pulled {} articles from gist {gist_id}.", report.count);
    if report.dropped > 0 {
        eprintln!(
            "Warning: {} entries in the gist were unusable and were dropped.",
            report.dropped
        );
    }
    Ok(())
}

async fn cmd_sync_find(config: &Config, sync_config: &SyncConfig) -> Result<()> {
    let manager = SyncManager::new(sync_config, config.api_base_url.as_deref())?;
    let found = manager.discover().await?;
    if found.is_empty() {
        println!("No backup gists found for this token.");
        return Ok(());
    }
    for gist in &found {
        let updated = gist
            .updated_at
            .as_deref()
            .map(util::relative_from_now)
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{}  {:<12} {}",
            gist.id,
            updated,
            gist.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_sync_create(
    store: &ArticleStore,
    local: &LocalStore,
    config: &Config,
    sync_config: &mut SyncConfig,
    assume_yes: bool,
) -> Result<()> {
    if let Some(bound) = &sync_config.gist_id {
        let prompt = format!("A gist is already bound ({bound}). Create another and rebind?");
        if !confirm(&prompt, assume_yes)? {
            println!("Aborted.");
            return Ok(());
        }
    }
    let manager = SyncManager::new(sync_config, config.api_base_url.as_deref())?;
    let report = manager
        .create_new(store.as_slice(), sync_config, local)
        .await?;
    println!(
        "Created gist {} with {} articles.",
        report.gist_id, report.articles
    );
    Ok(())
}

fn cmd_sync_clear(local: &LocalStore, assume_yes: bool) -> Result<()> {
    if !confirm("Forget the sync token and gist binding?", assume_yes)? {
        println!("Aborted.");
        return Ok(());
    }
    SyncConfig::clear(local)?;
    println!("Sync configuration cleared.");
    Ok(())
}

async fn cmd_sync_status(
    local: &LocalStore,
    config: &Config,
    sync_config: &mut SyncConfig,
) -> Result<()> {
    if sync_config.token.is_none() {
        println!("Not configured (run `daybook sync setup --token <TOKEN>`).");
        return Ok(());
    }

    let last = sync_config
        .last_sync
        .as_deref()
        .map(util::relative_from_now)
        .unwrap_or_else(|| "never".to_string());
    println!(
        "Auto-sync {}, last sync {last}.",
        if sync_config.auto_sync { "on" } else { "off" }
    );

    let manager = SyncManager::new(sync_config, config.api_base_url.as_deref())?;
    match manager.test_connection(sync_config, local).await {
        Ok(report) => {
            println!("Token OK (authenticated as {}).", report.login);
            match report.gist_verified {
                Some(true) => println!("Bound gist verified."),
                Some(false) => println!("Bound gist was unreachable and has been unbound."),
                None => println!("No gist bound yet."),
            }
        }
        Err(error) => eprintln!("Connection test failed: {error}"),
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Restores from the bound gist when the local collection still looks
/// untouched. Failures are warnings: startup must work offline.
async fn startup_restore(
    store: &mut ArticleStore,
    persist: &PersistenceManager,
    sync_config: &mut SyncConfig,
    config: &Config,
) {
    if !sync_config.is_configured() {
        return;
    }
    let manager = match SyncManager::new(sync_config, config.api_base_url.as_deref()) {
        Ok(manager) => manager,
        Err(error) => {
            tracing::warn!(error = %error, "Startup restore skipped");
            return;
        }
    };
    match manager.load_on_startup(store, persist, sync_config).await {
        Ok(StartupLoad::Replaced { count, dropped }) => {
            println!("Restored {count} articles from the gist backup.");
            if dropped > 0 {
                eprintln!("Warning: {dropped} entries in the gist were unusable and were dropped.");
            }
        }
        Ok(StartupLoad::KeptLocal { .. }) | Ok(StartupLoad::RemoteEmpty) => {}
        Err(error) => {
            tracing::warn!(error = %error, "Startup restore failed");
        }
    }
}

/// Queue a push and wait it out. CLI invocations are one-shot, so the
/// background queue always gets drained before exit.
async fn auto_push(
    store: &ArticleStore,
    sync_config: &SyncConfig,
    config: &Config,
    local: &LocalStore,
) {
    if !sync_config.auto_sync_ready() {
        return;
    }
    let manager = match SyncManager::new(sync_config, config.api_base_url.as_deref()) {
        Ok(manager) => manager,
        Err(error) => {
            tracing::warn!(error = %error, "Auto-sync skipped");
            return;
        }
    };
    let auto = AutoSync::start(manager, sync_config.clone(), local.clone());
    auto.request(store.to_vec());
    for outcome in auto.drain().await {
        match outcome {
            Ok(report) => println!(
                "Auto-synced {} articles to gist {}.",
                report.articles, report.gist_id
            ),
            Err(error) => eprintln!("Warning: auto-sync failed: {error}"),
        }
    }
}

/// Persist the collection, surfacing reclaim warnings. On failure the
/// in-memory collection is reloaded from disk so it cannot drift from
/// whatever state the failed save left behind.
fn save_collection(store: &mut ArticleStore, persist: &PersistenceManager) -> Result<SaveOutcome> {
    match persist.save(store) {
        Ok(outcome) => {
            report_outcome(&outcome);
            Ok(outcome)
        }
        Err(error) => {
            let reloaded = persist.load();
            store.replace_all(reloaded.articles);
            Err(anyhow::anyhow!("Could not save the collection: {error}"))
        }
    }
}

fn report_outcome(outcome: &SaveOutcome) {
    for stage in &outcome.stages {
        eprintln!("Warning: storage pressure forced a {stage} pass.");
    }
    if outcome.near_capacity {
        eprintln!("Warning: the collection is close to the storage budget.");
    }
}

fn check_category(category: &str) -> Result<()> {
    if !article::CATEGORIES.contains(&category) {
        anyhow::bail!(
            "Unknown category '{}'. One of: {}",
            category,
            article::CATEGORIES.join(", ")
        );
    }
    Ok(())
}

fn require_admin(config: &Config, provided: Option<&str>) -> Result<()> {
    let Some(expected) = &config.admin_secret else {
        return Ok(());
    };
    match provided {
        Some(given) if given == expected => Ok(()),
        Some(_) => anyhow::bail!("Admin secret does not match"),
        None => anyhow::bail!(
            "This command needs the admin secret (pass --secret or set DAYBOOK_ADMIN_SECRET)"
        ),
    }
}

fn is_mutating(command: &Command) -> bool {
    match command {
        Command::New { .. }
        | Command::Edit { .. }
        | Command::Delete { .. }
        | Command::Import { .. } => true,
        Command::Theme { value } => value.is_some(),
        Command::Sync(sync) => !matches!(sync, SyncCommand::Find | SyncCommand::Status),
        _ => false,
    }
}

fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Once a day, bump the stored visit counter shown by `status`.
fn record_visit(local: &LocalStore) {
    let today = util::date_stamp();
    let last_seen: Option<String> = local
        .get(LAST_VISIT_KEY)
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str(&raw).ok());
    if let Some(last) = &last_seen {
        if util::parse_when(last).format("%Y-%m-%d").to_string() == today {
            return;
        }
    }

    let visits: u64 = local
        .get(TOTAL_VISITS_KEY)
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(0);
    let update = (|| -> Result<()> {
        local.set(TOTAL_VISITS_KEY, &serde_json::to_string(&(visits + 1))?)?;
        local.set(LAST_VISIT_KEY, &serde_json::to_string(&util::now_iso())?)?;
        Ok(())
    })();
    if let Err(error) = update {
        tracing::warn!(error = %error, "Could not record the visit");
    }
}

/// Embeds an image file as a data URL. Files above the compression
/// threshold are downscaled and re-encoded as JPEG so camera photos do not
/// eat the storage budget.
fn attach_image(path: &Path) -> Result<String> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve image file: {}", path.display()))?;
    let metadata = std::fs::metadata(&canonical)?;
    if !metadata.is_file() {
        anyhow::bail!("Image path must be a regular file");
    }
    if metadata.len() > article::MAX_IMAGE_BYTES as u64 {
        anyhow::bail!(
            "Image is {} (limit {})",
            human_bytes(metadata.len() as usize),
            human_bytes(article::MAX_IMAGE_BYTES)
        );
    }

    let bytes = std::fs::read(&canonical)
        .with_context(|| format!("Failed to read image file '{}'", canonical.display()))?;

    if bytes.len() > IMAGE_COMPRESS_THRESHOLD {
        let decoded = image::load_from_memory(&bytes).context("Could not decode the image")?;
        let resized = if decoded.width() > IMAGE_MAX_WIDTH {
            let height = (u64::from(decoded.height()) * u64::from(IMAGE_MAX_WIDTH)
                / u64::from(decoded.width()))
            .max(1) as u32;
            decoded.resize(IMAGE_MAX_WIDTH, height, image::imageops::FilterType::Triangle)
        } else {
            decoded
        };
        let mut jpeg = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
        // JPEG has no alpha, re-encode from RGB
        encoder
            .encode_image(&resized.to_rgb8())
            .context("Could not re-encode the image")?;
        tracing::debug!(
            original = bytes.len(),
            compressed = jpeg.len(),
            "Compressed attached image"
        );
        Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)))
    } else {
        let format = image::guess_format(&bytes).context("File does not look like an image")?;
        Ok(format!(
            "data:{};base64,{}",
            format.to_mime_type(),
            STANDARD.encode(&bytes)
        ))
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn human_bytes(n: usize) -> String {
    if n >= 1024 * 1024 {
        format!("{:.1} MiB", n as f64 / (1024.0 * 1024.0))
    } else if n >= 1024 {
        format!("{:.1} KiB", n as f64 / 1024.0)
    } else {
        format!("{n} B")
    }
}
