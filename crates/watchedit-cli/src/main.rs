use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use watchedit_cloud::{AniListClient, CloudClient, CloudError, CloudSync, SyncStatus};
use watchedit_core::backup::{self, AutoBackupStore, BackupFormat};
use watchedit_core::reminder;
use watchedit_core::{
    AppConfig, Database, Episode, EpisodeType, ExitCode, FuzzySearcher, NewWork, ProgressFilter,
    ReminderFrequency, WatchedItError, Work, WorkFilter, WorkPatch, WorkStatus, WorkType,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "watchedit",
    about = "Track the anime, series, films and books you are watching",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting WATCHEDIT_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr (overrides WATCHEDIT_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Operations on works.
    Work {
        #[command(subcommand)]
        action: WorkAction,
    },

    /// Operations on a work's episodes.
    Episode {
        #[command(subcommand)]
        action: EpisodeAction,
    },

    /// Tag management.
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Fuzzy search over titles, sources, tag names, reviews and notes.
    Search {
        query: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Look up anime metadata on AniList.
    Lookup {
        query: String,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "10")]
        per_page: u32,
        /// Add the candidate with this AniList id as a new work.
        #[arg(long)]
        add: Option<i64>,
    },

    /// Export, import and automatic backups.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Cloud sync.
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },

    /// List works whose watch reminder is due.
    Reminders {
        /// Mark the listed reminders as delivered.
        #[arg(long)]
        ack: bool,
    },

    /// Show library statistics.
    Stats,

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run diagnostics.
    Doctor,

    /// Show version information.
    Version,
}

// ─── Work Actions ───────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum WorkAction {
    /// List works, one page at a time.
    List {
        /// Case-insensitive substring of the title, review, note or a tag name.
        #[arg(long)]
        text: Option<String>,
        #[arg(long = "type")]
        work_type: Option<WorkType>,
        #[arg(long)]
        status: Option<WorkStatus>,
        #[arg(long)]
        year: Option<i32>,
        /// Match works carrying any of these tag ids.
        #[arg(long = "tag", action = clap::ArgAction::Append)]
        tags: Vec<u32>,
        /// Unrated works are not excluded by the rating range.
        #[arg(long)]
        min_rating: Option<u8>,
        #[arg(long)]
        max_rating: Option<u8>,
        /// not-started, in-progress, completed, high (80%+) or low (under 20%).
        #[arg(long)]
        progress: Option<ProgressFilter>,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, default_value = "20")]
        size: usize,
    },

    /// Get a work by ID.
    Get { id: String },

    /// Add a work.
    Add {
        title: String,
        #[arg(long = "type", default_value = "anime")]
        work_type: WorkType,
        /// Generate this many season episodes.
        #[arg(long, default_value = "0")]
        episodes: u32,
        #[arg(long, default_value = "1")]
        season: u32,
        #[command(flatten)]
        fields: WorkFields,
    },

    /// Update a work.
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        changes: PatchArgs,
    },

    /// Apply the same update to several works.
    UpdateMany {
        #[arg(required = true)]
        ids: Vec<String>,
        #[command(flatten)]
        changes: PatchArgs,
    },

    /// Delete a work.
    Delete {
        id: String,
        #[arg(long)]
        confirm: bool,
    },

    /// Delete several works.
    DeleteMany {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ClearField {
    Year,
    Rating,
    Review,
    Note,
    Source,
}

#[derive(Args)]
struct PatchArgs {
    #[arg(long = "type")]
    work_type: Option<WorkType>,
    /// Turn the watch reminder off.
    #[arg(long, conflicts_with = "reminder")]
    no_reminder: bool,
    /// Remove an optional field; wins over a value given for the same field.
    #[arg(long, value_enum, action = clap::ArgAction::Append)]
    clear: Vec<ClearField>,
    #[command(flatten)]
    fields: WorkFields,
}

impl PatchArgs {
    fn into_patch(self, title: Option<String>) -> WorkPatch {
        let fields = self.fields;
        let clear = &self.clear;
        fn set_or_clear<T>(
            clear: &[ClearField],
            field: ClearField,
            value: Option<T>,
        ) -> Option<Option<T>> {
            if clear.contains(&field) {
                Some(None)
            } else {
                value.map(Some)
            }
        }

        WorkPatch {
            title,
            work_type: self.work_type,
            status: fields.status,
            year: set_or_clear(clear, ClearField::Year, fields.year),
            rating: set_or_clear(clear, ClearField::Rating, fields.rating),
            review: set_or_clear(clear, ClearField::Review, fields.review),
            note: set_or_clear(clear, ClearField::Note, fields.note),
            source: set_or_clear(clear, ClearField::Source, fields.source),
            reminder_enabled: if self.no_reminder {
                Some(false)
            } else {
                fields.reminder.map(|_| true)
            },
            reminder_frequency: fields.reminder,
            tag_ids: (!fields.tags.is_empty()).then_some(fields.tags),
        }
    }
}

#[derive(Args)]
struct WorkFields {
    #[arg(long)]
    status: Option<WorkStatus>,
    #[arg(long)]
    year: Option<i32>,
    /// 1 to 5.
    #[arg(long)]
    rating: Option<u8>,
    #[arg(long)]
    review: Option<String>,
    #[arg(long)]
    note: Option<String>,
    #[arg(long)]
    source: Option<String>,
    /// Enable a watch reminder: daily, weekly, monthly or custom.
    #[arg(long)]
    reminder: Option<ReminderFrequency>,
    #[arg(long = "tag", action = clap::ArgAction::Append)]
    tags: Vec<u32>,
}

// ─── Episode Actions ────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum EpisodeAction {
    /// Add an episode to a work.
    Add {
        work_id: String,
        #[arg(long)]
        number: u32,
        #[arg(long, default_value = "1")]
        season: u32,
        #[arg(long = "type", default_value = "episode")]
        episode_type: EpisodeType,
        #[arg(long)]
        title: Option<String>,
    },
    /// Mark an episode watched (or unwatched with --unwatch).
    Watch {
        work_id: String,
        episode_id: String,
        #[arg(long)]
        unwatch: bool,
    },
    /// Remove an episode from a work.
    Remove { work_id: String, episode_id: String },
}

// ─── Tag Actions ────────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum TagAction {
    /// List all tags.
    List,
    /// Create a tag.
    Create {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// Rename or recolor a tag (works carrying it are updated).
    Update {
        id: u32,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a tag (removes it from all works).
    Delete {
        id: u32,
        #[arg(long)]
        confirm: bool,
    },
}

// ─── Backup Actions ─────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum BackupAction {
    /// Write a backup file; the codec follows the file extension.
    Export {
        path: Option<PathBuf>,
        /// Codec for the default file name when no path is given.
        #[arg(long, default_value = "json", conflicts_with = "path")]
        format: BackupFormat,
    },
    /// Replace the whole library with a backup file.
    Import {
        path: PathBuf,
        #[arg(long)]
        confirm: bool,
    },
    /// Summarize the library as a backup would see it.
    Info,
    /// Take an automatic backup if one is due.
    Auto {
        /// Ignore the schedule and back up now.
        #[arg(long)]
        force: bool,
    },
    /// List automatic backups, newest first.
    ListAuto,
    /// Restore the automatic backup taken on a date (YYYY-MM-DD).
    RestoreAuto {
        date: NaiveDate,
        #[arg(long)]
        confirm: bool,
    },
}

// ─── Sync Actions ───────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum SyncAction {
    /// Download, merge and upload.
    Run,
    /// Show device id and last sync time.
    Status,
    /// Check that the endpoint answers.
    Health,
}

// ─── Config Actions ─────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all config values.
    List,
    /// Get a specific config key.
    Get { key: String },
}

// ─── Main ───────────────────────────────────────────────────────────────────

struct Context {
    config: AppConfig,
    json: bool,
    start: Instant,
}

impl Context {
    fn open_db(&self) -> Result<Database> {
        Ok(Database::open(&self.config.database_path())?)
    }

    fn print_ok(&self, data: impl Serialize) -> Result<()> {
        print_json(&serde_json::json!({
            "status": "ok",
            "data": data,
            "meta": { "duration_ms": self.start.elapsed().as_millis() }
        }))
    }

    /// Destructive commands need `--confirm`; exits with `ConfirmRequired` otherwise.
    fn require_confirm(&self, confirm: bool, what: &str) {
        if confirm {
            return;
        }
        let message = format!("Add --confirm to {what}.");
        if self.json {
            let _ = print_json(&serde_json::json!({
                "status": "error",
                "error": "confirm_required",
                "message": message,
            }));
        } else {
            eprintln!("{message}");
        }
        std::process::exit(ExitCode::ConfirmRequired as i32);
    }
}

fn main() {
    let start = Instant::now();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = cli.json || std::env::var("WATCHEDIT_JSON").as_deref() == Ok("1");

    if let Err(err) = run(cli.command, json, start) {
        let code = exit_code_for(&err);
        if json {
            let _ = print_json(&serde_json::json!({
                "status": "error",
                "error": error_kind(&code),
                "message": format!("{err:#}"),
                "meta": { "duration_ms": start.elapsed().as_millis() }
            }));
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(code as i32);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("WATCHEDIT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Commands, json: bool, start: Instant) -> Result<()> {
    let config = AppConfig::load()?;
    tracing::debug!(data_dir = %config.data_dir().display(), "config loaded");
    let ctx = Context { config, json, start };

    match command {
        Commands::Work { action } => run_work(&ctx, action),
        Commands::Episode { action } => run_episode(&ctx, action),
        Commands::Tag { action } => run_tag(&ctx, action),
        Commands::Backup { action } => run_backup(&ctx, action),
        Commands::Sync { action } => run_sync(&ctx, action),
        Commands::Config { action } => run_config(&ctx, action),

        // ── Search ─────────────────────────────────────────────────────────
        Commands::Search { query, limit } => {
            let db = ctx.open_db()?;
            let works = db.all_works()?;
            let mut searcher = FuzzySearcher::new();
            let matches = searcher.search(&query, &works, limit);

            if ctx.json {
                ctx.print_ok(serde_json::json!({
                    "items": matches, "total": matches.len(), "query": query
                }))?;
            } else if matches.is_empty() {
                println!("No results for: {query}");
            } else {
                println!("Found {} results:", matches.len());
                for m in &matches {
                    println!("  {}  {}  (score {})", short_id(&m.work.id), m.work.title, m.score);
                }
            }
            Ok(())
        }

        // ── Lookup ─────────────────────────────────────────────────────────
        Commands::Lookup { query, page, per_page, add } => {
            let client = AniListClient::new();
            let candidates = block_on(client.search_anime(&query, page, per_page))??;

            if let Some(anilist_id) = add {
                let candidate = candidates
                    .iter()
                    .find(|c| c.id == anilist_id)
                    .ok_or_else(|| {
                        WatchedItError::validation(format!(
                            "AniList id {anilist_id} is not among the results for {query:?}"
                        ))
                    })?;
                let db = ctx.open_db()?;
                let work = db.create_work(candidate.to_new_work())?;
                if ctx.json {
                    ctx.print_ok(&work)?;
                } else {
                    println!("Added: {} ({}, {} episodes)", work.title, work.id, work.episodes.len());
                }
                return Ok(());
            }

            if ctx.json {
                ctx.print_ok(serde_json::json!({ "items": candidates, "total": candidates.len() }))?;
            } else if candidates.is_empty() {
                println!("No AniList results for: {query}");
            } else {
                for c in &candidates {
                    let year = c.season_year.map(|y| y.to_string()).unwrap_or_default();
                    let eps = c.episodes.map(|e| format!("{e} eps")).unwrap_or_default();
                    println!(
                        "{id:>7}  {title:<40}  {format:<8}  {year:<4}  {eps}",
                        id = c.id,
                        title = c.preferred_title().unwrap_or("?"),
                        format = c.format.as_deref().unwrap_or(""),
                    );
                }
                println!("\nUse --add <id> to add one to the library.");
            }
            Ok(())
        }

        // ── Reminders ──────────────────────────────────────────────────────
        Commands::Reminders { ack } => {
            if !ctx.config.reminders.enabled {
                if ctx.json {
                    ctx.print_ok(serde_json::json!({ "items": [], "enabled": false }))?;
                } else {
                    println!("Reminders are disabled in config.");
                }
                return Ok(());
            }

            let db = ctx.open_db()?;
            let now = Utc::now();
            let due = reminder::due_reminders(&db, now)?;
            if ack {
                reminder::acknowledge(&db, &due, now)?;
            }

            if ctx.json {
                ctx.print_ok(serde_json::json!({ "items": due, "acknowledged": ack }))?;
            } else if due.is_empty() {
                println!("Nothing due.");
            } else {
                for r in &due {
                    let next = r
                        .next_episode
                        .map(|(season, number)| format!(" next S{season:02}E{number:02}"))
                        .unwrap_or_default();
                    println!("  {}  {}{next}", short_id(&r.work_id), r.message());
                }
            }
            Ok(())
        }

        // ── Stats ──────────────────────────────────────────────────────────
        Commands::Stats => {
            let db = ctx.open_db()?;
            let stats = db.stats()?;

            if ctx.json {
                ctx.print_ok(&stats)?;
            } else {
                println!("Library statistics:");
                println!("  Total works:     {}", stats.total_works);
                println!("  Total tags:      {}", stats.total_tags);
                println!(
                    "  Episodes:        {}/{} watched ({:.1}%)",
                    stats.watched_episodes, stats.total_episodes, stats.completion_rate
                );
                print_histogram("By type", &stats.type_stats);
                print_histogram("By status", &stats.status_stats);
                print_histogram("By year", &stats.year_stats);
            }
            Ok(())
        }

        // ── Doctor ─────────────────────────────────────────────────────────
        Commands::Doctor => {
            let config = &ctx.config;
            let config_path = AppConfig::config_path();
            if config_path.exists() {
                println!("✓ Config: {}", config_path.display());
            } else {
                println!("○ Config: not found (using defaults)");
            }

            let db_path = config.database_path();
            let mut issues = 0;
            match Database::open(&db_path) {
                Ok(db) => {
                    let count = db.count_works().unwrap_or(0);
                    let migrations = db.applied_migrations().unwrap_or_default();
                    println!(
                        "✓ Database: {} ({count} works, migrations {migrations:?})",
                        db_path.display()
                    );
                    match db.last_backup() {
                        Ok(Some(ts)) => println!("✓ Last backup: {}", ts.to_rfc3339()),
                        Ok(None) => println!("○ Last backup: never"),
                        Err(e) => {
                            issues += 1;
                            println!("✗ Last backup: {e}");
                        }
                    }
                }
                Err(e) => {
                    issues += 1;
                    println!("✗ Database: {e}");
                }
            }

            let backup_dir = config.backup_dir();
            if backup_dir.exists() {
                let count = AutoBackupStore::new(&backup_dir, config.backup.keep)
                    .list()
                    .map(|entries| entries.len())
                    .unwrap_or(0);
                println!("✓ Backups: {} ({count} automatic)", backup_dir.display());
            } else {
                println!("○ Backups: directory not created yet");
            }

            match config.cloud_endpoint() {
                Some(endpoint) => {
                    println!("✓ Cloud endpoint: {endpoint}");
                    if config.cloud_api_key().is_none() {
                        println!("○ Cloud API key: ${} is not set", config.cloud.api_key_env);
                    }
                }
                None => println!("○ Cloud endpoint: not configured"),
            }

            if issues == 0 {
                println!("\nAll checks passed ✓");
            } else {
                println!("\n{issues} issues found");
                std::process::exit(ExitCode::GeneralError as i32);
            }
            Ok(())
        }

        // ── Version ────────────────────────────────────────────────────────
        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            if ctx.json {
                ctx.print_ok(serde_json::json!({ "version": version }))?;
            } else {
                println!("watchedit v{version}");
            }
            Ok(())
        }
    }
}

// ─── Works ──────────────────────────────────────────────────────────────────

fn run_work(ctx: &Context, action: WorkAction) -> Result<()> {
    let db = ctx.open_db()?;

    match action {
        WorkAction::List {
            text,
            work_type,
            status,
            year,
            tags,
            min_rating,
            max_rating,
            progress,
            page,
            size,
        } => {
            let filter = WorkFilter {
                text,
                work_type,
                status,
                year,
                tag_ids: tags,
                min_rating,
                max_rating,
                progress,
                page,
                size,
            };
            let result = db.list_works(&filter)?;

            if ctx.json {
                ctx.print_ok(&result)?;
            } else if result.works.is_empty() {
                println!("No works found. Use `watchedit work add` to add one.");
            } else {
                for work in &result.works {
                    print_work_line(work);
                }
                println!("\nPage {} ({} works total)", result.page, result.total);
            }
        }

        WorkAction::Get { id } => {
            let work = db.get_work(&id)?;
            if ctx.json {
                ctx.print_ok(&work)?;
            } else {
                print_work_details(&work);
            }
        }

        WorkAction::Add { title, work_type, episodes, season, fields } => {
            let mut input = NewWork::new(title, work_type);
            input.status = fields.status.unwrap_or_default();
            input.year = fields.year;
            input.rating = fields.rating;
            input.review = fields.review;
            input.note = fields.note;
            input.source = fields.source;
            input.reminder_enabled = fields.reminder.is_some();
            input.reminder_frequency = fields.reminder;
            input.tag_ids = fields.tags;
            input.episodes = (1..=episodes)
                .map(|n| Episode::new(n, season, EpisodeType::Episode))
                .collect();

            let work = db.create_work(input)?;
            if ctx.json {
                ctx.print_ok(&work)?;
            } else {
                println!("Added: {} ({})", work.title, work.id);
            }
        }

        WorkAction::Update { id, title, changes } => {
            let work = db.update_work(&id, &changes.into_patch(title))?;
            if ctx.json {
                ctx.print_ok(&work)?;
            } else {
                println!("Updated: {}", work.title);
            }
        }

        WorkAction::UpdateMany { ids, changes } => {
            let works = db.update_works(&ids, &changes.into_patch(None))?;
            if ctx.json {
                ctx.print_ok(serde_json::json!({ "items": works, "total": works.len() }))?;
            } else {
                for work in &works {
                    println!("Updated: {}", work.title);
                }
                println!("{} works updated.", works.len());
            }
        }

        WorkAction::Delete { id, confirm } => {
            ctx.require_confirm(confirm, "delete the work");
            db.delete_work(&id)?;
            if ctx.json {
                ctx.print_ok(serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted work: {id}");
            }
        }

        WorkAction::DeleteMany { ids, confirm } => {
            ctx.require_confirm(confirm, &format!("delete {} works", ids.len()));
            let deleted = db.delete_works(&ids)?;
            if ctx.json {
                ctx.print_ok(serde_json::json!({ "deleted": ids, "count": deleted }))?;
            } else {
                println!("Deleted {deleted} works.");
            }
        }
    }
    Ok(())
}

// ─── Episodes ───────────────────────────────────────────────────────────────

fn run_episode(ctx: &Context, action: EpisodeAction) -> Result<()> {
    let db = ctx.open_db()?;

    let (work, message) = match action {
        EpisodeAction::Add { work_id, number, season, episode_type, title } => {
            let mut episode = Episode::new(number, season, episode_type);
            if let Some(title) = title {
                episode = episode.with_title(title);
            }
            let episode_id = episode.id.clone();
            let work = db.add_episode(&work_id, episode)?;
            (work, format!("Added episode S{season:02}E{number:02} ({episode_id})"))
        }
        EpisodeAction::Watch { work_id, episode_id, unwatch } => {
            let work = db.set_episode_watched(&work_id, &episode_id, !unwatch)?;
            let state = if unwatch { "unwatched" } else { "watched" };
            (work, format!("Marked {episode_id} {state}"))
        }
        EpisodeAction::Remove { work_id, episode_id } => {
            let work = db.remove_episode(&work_id, &episode_id)?;
            (work, format!("Removed episode {episode_id}"))
        }
    };

    if ctx.json {
        ctx.print_ok(&work)?;
    } else {
        let progress = work.progress();
        println!("{message}");
        println!("{}: {}/{} watched", work.title, progress.watched, progress.total);
    }
    Ok(())
}

// ─── Tags ───────────────────────────────────────────────────────────────────

fn run_tag(ctx: &Context, action: TagAction) -> Result<()> {
    let db = ctx.open_db()?;

    match action {
        TagAction::List => {
            let tags = db.all_tags()?;
            if ctx.json {
                ctx.print_ok(&tags)?;
            } else if tags.is_empty() {
                println!("No tags.");
            } else {
                for tag in &tags {
                    println!("  {:>3}  #{} ({})", tag.id, tag.name, tag.color);
                }
            }
        }
        TagAction::Create { name, color } => {
            let tag = db.create_tag(&name, color.as_deref())?;
            if ctx.json {
                ctx.print_ok(&tag)?;
            } else {
                println!("Created tag #{} ({})", tag.name, tag.id);
            }
        }
        TagAction::Update { id, name, color } => {
            let tag = db.update_tag(id, name.as_deref(), color.as_deref())?;
            if ctx.json {
                ctx.print_ok(&tag)?;
            } else {
                println!("Updated tag #{} ({})", tag.name, tag.color);
            }
        }
        TagAction::Delete { id, confirm } => {
            ctx.require_confirm(confirm, "delete the tag from every work");
            db.delete_tag(id)?;
            if ctx.json {
                ctx.print_ok(serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted tag {id}");
            }
        }
    }
    Ok(())
}

// ─── Backups ────────────────────────────────────────────────────────────────

fn run_backup(ctx: &Context, action: BackupAction) -> Result<()> {
    let db = ctx.open_db()?;
    let auto_store = AutoBackupStore::new(ctx.config.backup_dir(), ctx.config.backup.keep);

    match action {
        BackupAction::Export { path, format } => {
            let path = path.unwrap_or_else(|| {
                PathBuf::from(backup::default_file_name(format, Utc::now().date_naive()))
            });
            let doc = backup::export_to_path(&db, &path)?;
            if ctx.json {
                ctx.print_ok(serde_json::json!({
                    "path": path, "metadata": doc.metadata, "timestamp": doc.timestamp
                }))?;
            } else {
                println!(
                    "Exported {} works and {} tags to {}",
                    doc.works.len(),
                    doc.tags.len(),
                    path.display()
                );
            }
        }

        BackupAction::Import { path, confirm } => {
            let doc = backup::read_from_path(&path)?;
            ctx.require_confirm(confirm, "replace the whole library with this backup");
            backup::restore(&db, &doc)?;
            if ctx.json {
                ctx.print_ok(serde_json::json!({
                    "path": path, "version": doc.version, "metadata": doc.metadata
                }))?;
            } else {
                println!(
                    "Restored {} works and {} tags from {} (backup {})",
                    doc.works.len(),
                    doc.tags.len(),
                    path.display(),
                    doc.timestamp
                );
            }
        }

        BackupAction::Info => {
            let info = backup::database_info(&db)?;
            if ctx.json {
                ctx.print_ok(&info)?;
            } else {
                println!("Works:       {}", info.works_count);
                println!("Tags:        {}", info.tags_count);
                println!(
                    "Episodes:    {}/{} watched ({}%)",
                    info.watched_episodes, info.total_episodes, info.completion_rate
                );
                println!("Last backup: {}", info.last_backup.as_deref().unwrap_or("never"));
            }
        }

        BackupAction::Auto { force } => {
            let now = Utc::now();
            let due = ctx.config.backup.enabled
                && AutoBackupStore::is_due(db.last_backup()?, ctx.config.backup.interval_days, now);

            if !force && !due {
                if ctx.json {
                    ctx.print_ok(serde_json::json!({ "skipped": true }))?;
                } else {
                    println!("No automatic backup due.");
                }
                return Ok(());
            }

            let path = auto_store.run(&db, now)?;
            if ctx.json {
                ctx.print_ok(serde_json::json!({ "skipped": false, "path": path }))?;
            } else {
                println!("Backed up to {}", path.display());
            }
        }

        BackupAction::ListAuto => {
            let entries = auto_store.list()?;
            if ctx.json {
                ctx.print_ok(&entries)?;
            } else if entries.is_empty() {
                println!("No automatic backups in {}", auto_store.dir().display());
            } else {
                for entry in &entries {
                    println!("  {}  {:>8} bytes  {}", entry.date, entry.size, entry.path.display());
                }
            }
        }

        BackupAction::RestoreAuto { date, confirm } => {
            ctx.require_confirm(confirm, "replace the whole library with this backup");
            auto_store.restore(&db, date)?;
            if ctx.json {
                ctx.print_ok(serde_json::json!({ "restored": date }))?;
            } else {
                println!("Restored automatic backup from {date}");
            }
        }
    }
    Ok(())
}

// ─── Sync ───────────────────────────────────────────────────────────────────

fn run_sync(ctx: &Context, action: SyncAction) -> Result<()> {
    let db = ctx.open_db()?;

    match action {
        SyncAction::Run => {
            let client = CloudClient::from_config(&ctx.config)?;
            let sync = CloudSync::new(client, &db);
            let outcome = block_on(sync.run())??;

            if ctx.json {
                ctx.print_ok(&outcome)?;
            } else {
                let report = &outcome.report;
                println!(
                    "Synced {} works and {} tags ({} added, {} replaced, {} kept local, {} tags added)",
                    outcome.works,
                    outcome.tags,
                    report.added_works,
                    report.replaced_works,
                    report.kept_local,
                    report.added_tags
                );
            }
        }

        SyncAction::Status => {
            let status = SyncStatus::load(&db, &ctx.config)?;
            if ctx.json {
                ctx.print_ok(&status)?;
            } else {
                println!("Endpoint:  {}", status.endpoint.as_deref().unwrap_or("not configured"));
                println!("Device:    {}", status.device_id);
                println!(
                    "Last sync: {}",
                    status.last_sync.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".into())
                );
                if status.should_sync {
                    println!("A sync is suggested.");
                }
            }
        }

        SyncAction::Health => {
            let client = CloudClient::from_config(&ctx.config)?;
            let endpoint = client.base_url().to_string();
            block_on(client.health())??;
            if ctx.json {
                ctx.print_ok(serde_json::json!({ "endpoint": endpoint, "healthy": true }))?;
            } else {
                println!("✓ {endpoint} is reachable");
            }
        }
    }
    Ok(())
}

// ─── Config ─────────────────────────────────────────────────────────────────

fn run_config(ctx: &Context, action: ConfigAction) -> Result<()> {
    let values = config_key_values(&ctx.config);

    match action {
        ConfigAction::List => {
            if ctx.json {
                ctx.print_ok(&values)?;
            } else {
                for (key, value) in &values {
                    println!("{key:<28} = {value}");
                }
            }
        }
        ConfigAction::Get { key } => match values.get(key.as_str()) {
            Some(value) => {
                if ctx.json {
                    ctx.print_ok(serde_json::json!({ "key": key, "value": value }))?;
                } else {
                    println!("{value}");
                }
            }
            None => {
                return Err(WatchedItError::ConfigError(format!("Unknown config key: {key}")).into());
            }
        },
    }
    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn print_work_line(work: &Work) {
    let progress = work.progress();
    let year = work.year.map(|y| y.to_string()).unwrap_or_default();
    println!(
        "{id}  {title:<40}  {kind:<7}  {status:<10}  {year:<4}  {watched}/{total}",
        id = short_id(&work.id),
        title = work.title,
        kind = work.work_type.to_string(),
        status = work.status.to_string(),
        watched = progress.watched,
        total = progress.total,
    );
}

fn print_work_details(work: &Work) {
    let progress = work.progress();
    println!("{} ({})", work.title, work.id);
    println!("  Type:     {}", work.work_type);
    println!("  Status:   {}", work.status);
    if let Some(year) = work.year {
        println!("  Year:     {year}");
    }
    if let Some(rating) = work.rating {
        println!("  Rating:   {rating}/5");
    }
    if let Some(source) = &work.source {
        println!("  Source:   {source}");
    }
    if !work.tags.is_empty() {
        let names: Vec<String> = work.tags.iter().map(|t| format!("#{}", t.name)).collect();
        println!("  Tags:     {}", names.join(" "));
    }
    if work.reminder_enabled
        && let Some(freq) = work.reminder_frequency
    {
        println!("  Reminder: {freq}");
    }
    println!("  Progress: {}/{}", progress.watched, progress.total);
    for ep in &work.episodes {
        let mark = if ep.watched { "✓" } else { " " };
        let title = ep.title.as_deref().unwrap_or("");
        println!(
            "    [{mark}] S{:02}E{:02} {:<8} {title}  ({})",
            ep.season,
            ep.number,
            ep.episode_type.to_string(),
            ep.id
        );
    }
}

fn print_histogram(label: &str, counts: &BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    println!("  {label}:");
    for (key, count) in counts {
        println!("    {key:<12} {count}");
    }
}

fn config_key_values(config: &AppConfig) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    map.insert("config_path", AppConfig::config_path().to_string_lossy().to_string());
    map.insert("data_dir", config.data_dir().to_string_lossy().to_string());
    map.insert("database_path", config.database_path().to_string_lossy().to_string());
    map.insert("backup_dir", config.backup_dir().to_string_lossy().to_string());
    map.insert("cloud.endpoint", config.cloud_endpoint().unwrap_or_default());
    map.insert("cloud.api_key_env", config.cloud.api_key_env.clone());
    map.insert("cloud.auto_sync", config.cloud.auto_sync.to_string());
    map.insert(
        "cloud.sync_interval_minutes",
        config.cloud.sync_interval_minutes.to_string(),
    );
    map.insert("backup.enabled", config.backup.enabled.to_string());
    map.insert("backup.interval_days", config.backup.interval_days.to_string());
    map.insert("backup.keep", config.backup.keep.to_string());
    map.insert("reminders.enabled", config.reminders.enabled.to_string());
    map
}

// ─── Exit codes ─────────────────────────────────────────────────────────────

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(cloud) = err.downcast_ref::<CloudError>() {
        return match cloud {
            CloudError::Core(core) => core_exit_code(core),
            CloudError::NotConfigured(_) => ExitCode::InvalidArgs,
            _ => ExitCode::NetworkError,
        };
    }
    if let Some(core) = err.downcast_ref::<WatchedItError>() {
        return core_exit_code(core);
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return ExitCode::FileSystemError;
    }
    ExitCode::GeneralError
}

fn core_exit_code(err: &WatchedItError) -> ExitCode {
    match err {
        e if e.is_not_found() => ExitCode::NotFound,
        WatchedItError::ValidationError(_) | WatchedItError::ConfigError(_) => ExitCode::InvalidArgs,
        WatchedItError::DuplicateTag(_) => ExitCode::Conflict,
        WatchedItError::Io(_) => ExitCode::FileSystemError,
        _ => ExitCode::GeneralError,
    }
}

fn error_kind(code: &ExitCode) -> &'static str {
    match code {
        ExitCode::NotFound => "not_found",
        ExitCode::InvalidArgs => "invalid_args",
        ExitCode::FileSystemError => "filesystem",
        ExitCode::NetworkError => "network",
        ExitCode::Conflict => "conflict",
        ExitCode::ConfirmRequired => "confirm_required",
        ExitCode::Success | ExitCode::GeneralError => "error",
    }
}
