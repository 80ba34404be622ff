use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use clippings::capture::{self, SurfaceLauncher};
use clippings::config::{AppPaths, Settings};
use clippings::engine::{Capabilities, Coordinator, Engine};
use clippings::errors::{ClipError, Result};
use clippings::export::downloads::DownloadsSink;
use clippings::export::fs::{FsFolderAuthority, PathPicker};
use clippings::export::{PermissionPrompt, PromptAnswer};
use clippings::host::{self, HostChannel};
use clippings::protocol::{CaptureData, ContextId, Message, Notifier, Response};
use clippings::storage::models::ClippingPayload;
use clippings::storage::sqlite::SqliteKvStore;
use clippings::surface::{EditorParams, folder_status_text};

const LOG_ENV: &str = "CLIPPINGS_LOG";

#[derive(Parser)]
#[command(
    name = "clippings",
    version,
    about = "Collect annotated text selections into a per-site Markdown document"
)]
struct Cli {
    /// Output results as JSON
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a clipping and export the updated document
    Save {
        /// Selected text
        #[arg(short, long, default_value = "")]
        text: String,

        /// Free-form note
        #[arg(short, long)]
        note: Option<String>,

        /// Tag to attach (repeatable, or comma separated)
        #[arg(long = "tag", value_delimiter = ',')]
        tags: Vec<String>,

        /// Page title
        #[arg(long)]
        title: Option<String>,

        /// Page URL
        #[arg(short, long)]
        url: Option<String>,

        /// Capture time (RFC 3339), defaults to now
        #[arg(long)]
        date: Option<DateTime<Utc>>,
    },

    /// Print the rendered document
    Render,

    /// Write the current document to the chosen folder or downloads
    Export,

    /// List sites and their clippings
    List,

    /// List every tag in use
    Tags,

    /// Show collection statistics
    Stats,

    /// Manage the export folder
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Open the terminal editor
    Edit {
        /// Prefilled selection text
        #[arg(short, long, default_value = "")]
        text: String,

        /// Page URL
        #[arg(short, long, default_value = "")]
        url: String,

        /// Page title
        #[arg(long, default_value = "")]
        title: String,

        /// Write the stored collection to the folder on open
        #[arg(long)]
        auto_write: bool,

        /// Tab to notify about the result
        #[arg(long)]
        tab_id: Option<ContextId>,

        /// Editor query string, as sent by the browser
        #[arg(long, conflicts_with_all = ["text", "url", "title", "auto_write", "tab_id"])]
        query: Option<String>,
    },

    /// Serve the browser over native messaging (stdin/stdout)
    Host {
        /// Arguments the browser appends (extension origin, window id)
        #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
        browser_args: Vec<String>,
    },
}

#[derive(Subcommand)]
enum FolderAction {
    /// Choose the folder exports are written into
    Pick {
        /// Folder path; a "Clippings" subfolder is created inside it
        path: PathBuf,
    },
    /// Show the chosen folder
    Status,
    /// Forget the chosen folder
    Forget,
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    message: String,
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            eprintln!("{}", serde_json::json!({"error": e.to_string()}));
        } else {
            eprintln!("error: {}", e);
        }
        process::exit(1);
    }
}

fn init_logging(paths: &AppPaths, host_mode: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let log_file = host_mode
        .then(|| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&paths.log_file)
                .ok()
        })
        .flatten();

    match log_file {
        Some(file) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .init(),
        None => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init(),
    }
}

/// Everything a command needs, opened once per invocation.
struct Runtime {
    kv: SqliteKvStore,
    handles: SqliteKvStore,
    settings: Settings,
    authority: FsFolderAuthority,
    downloads: DownloadsSink,
}

impl Runtime {
    fn open(paths: &AppPaths) -> Result<Self> {
        paths.ensure_base_dir()?;
        let settings = Settings::load(&paths.settings_file)?;
        Ok(Self {
            kv: SqliteKvStore::open(&paths.store_db)?,
            handles: SqliteKvStore::open(&paths.handles_db)?,
            downloads: DownloadsSink::new(settings.downloads_root(paths)),
            authority: FsFolderAuthority,
            settings,
        })
    }

    fn engine<'a>(
        &'a self,
        notifier: &'a dyn Notifier,
        launcher: &'a dyn SurfaceLauncher,
    ) -> Engine<'a> {
        Engine::new(
            Capabilities {
                store: &self.kv,
                handles: &self.handles,
                authority: &self.authority,
                downloads: &self.downloads,
                notifier,
                launcher,
            },
            self.settings.render_policy(),
        )
    }
}

/// Outside the browser there are no tabs to notify.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, target: ContextId, message: Message) {
        tracing::debug!(tab = target, message = ?message, "notification without a browser");
    }
}

/// Outside the browser the only surface is the terminal editor.
struct TerminalLauncher;

impl SurfaceLauncher for TerminalLauncher {
    fn show_overlay(&self, _tab: ContextId, _data: &CaptureData) -> Result<()> {
        Err(ClipError::Protocol("no page overlay outside the browser".into()))
    }

    fn open_editor(&self, params: &EditorParams) -> Result<()> {
        eprintln!("run `clippings edit --query '{}'` to continue", params.to_query());
        Ok(())
    }
}

/// y/N confirmation on stdin.
struct StdinPrompt;

impl PermissionPrompt for StdinPrompt {
    fn confirm(&self, folder_name: &str) -> PromptAnswer {
        eprint!("Clippings needs permission to write into \"{}\". Grant? [y/N] ", folder_name);
        let _ = io::stderr().flush();
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) if matches!(answer.trim(), "y" | "Y" | "yes") => PromptAnswer::Grant,
            _ => PromptAnswer::Cancel,
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::new()?;
    let json = cli.json;
    init_logging(&paths, matches!(cli.command, Some(Commands::Host { .. })));

    let runtime = Runtime::open(&paths)?;
    let engine = runtime.engine(&LogNotifier, &TerminalLauncher);

    match cli.command {
        None | Some(Commands::List) => cmd_list(&engine, json),
        Some(Commands::Save {
            text,
            note,
            tags,
            title,
            url,
            date,
        }) => {
            let payload = ClippingPayload {
                text: Some(text),
                note,
                tags: Some(tags),
                title,
                url,
                date,
            };
            let response = engine.save_clipping(&payload, None, Some(&StdinPrompt));
            print_response(&response, &runtime, json)
        }
        Some(Commands::Render) => {
            print!("{}", engine.render()?);
            Ok(())
        }
        Some(Commands::Export) => {
            let response = engine.export_now(None, Some(&StdinPrompt));
            print_response(&response, &runtime, json)
        }
        Some(Commands::Tags) => cmd_tags(&engine, json),
        Some(Commands::Stats) => cmd_stats(&engine, json),
        Some(Commands::Folder { action }) => cmd_folder(&engine, action, json),
        Some(Commands::Edit {
            text,
            url,
            title,
            auto_write,
            tab_id,
            query,
        }) => {
            let params = match query {
                Some(query) => EditorParams::from_query(&query),
                None => EditorParams {
                    text,
                    url,
                    title,
                    auto_write,
                    origin: tab_id,
                },
            };
            let coordinator = Coordinator::new(&engine);
            if let Some(status) = clippings::tui::run(&engine, &coordinator, params)? {
                println!("{}", status);
            }
            Ok(())
        }
        Some(Commands::Host { browser_args }) => cmd_host(&runtime, &browser_args),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_response(response: &Response, runtime: &Runtime, json: bool) -> Result<()> {
    if json {
        return print_json(response);
    }
    if !response.ok {
        return Err(ClipError::InvalidInput(
            response.error.clone().unwrap_or_else(|| "save failed".into()),
        ));
    }
    if let Some(error) = &response.error {
        eprintln!("Could not write to the folder: {}", error);
    }
    if response.written_to_vault {
        println!("Saved to folder.");
    } else if response.written_to_downloads {
        println!("Saved to {}.", runtime.downloads.target().display());
    } else {
        println!("Saved. Folder write was not confirmed.");
    }
    Ok(())
}

fn cmd_list(engine: &Engine<'_>, json: bool) -> Result<()> {
    let collection = engine.collection().get()?;

    if json {
        return print_json(&collection);
    }

    if collection.is_empty() {
        println!("No clippings yet.");
        return Ok(());
    }

    for (identity, site) in &collection.sites {
        println!("{}  ({} clipping(s))  {}", identity, site.clippings.len(), site.title);
        for clip in &site.clippings {
            let oneline = clip.text.replace('\n', "\\n");
            let preview: String = oneline.chars().take(60).collect();
            let tags = if clip.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", clip.tags.join(", "))
            };
            println!("    {}  {}{}", clip.date.format("%Y-%m-%d %H:%M"), preview, tags);
        }
    }
    Ok(())
}

fn cmd_tags(engine: &Engine<'_>, json: bool) -> Result<()> {
    let tags = engine.tag_suggestions()?;
    if json {
        return print_json(&tags);
    }
    if tags.is_empty() {
        println!("No tags yet.");
    }
    for tag in tags {
        println!("{}", tag);
    }
    Ok(())
}

fn cmd_stats(engine: &Engine<'_>, json: bool) -> Result<()> {
    let stats = engine.collection().get()?.stats();
    if json {
        return print_json(&stats);
    }

    println!("Clippings Statistics");
    println!("────────────────────");
    println!("Sites:      {}", stats.sites);
    println!("Clippings:  {}", stats.clippings);
    println!("Tags:       {}", stats.tags);
    if let Some(newest) = stats.newest {
        println!("Newest:     {}", newest.format("%Y-%m-%d %H:%M"));
    }
    println!("Folder:     {}", folder_status_text(&engine.folder_record()));
    Ok(())
}

fn cmd_folder(engine: &Engine<'_>, action: FolderAction, json: bool) -> Result<()> {
    let record = engine.folder_record();
    let message = match action {
        FolderAction::Pick { path } => {
            let mut flow = engine.folder_flow()?;
            match flow.authorize(&PathPicker::new(path))? {
                Some(handle) => format!("Folder chosen: {}", handle.path.display()),
                None => "Folder selection cancelled".to_string(),
            }
        }
        FolderAction::Status => {
            if json {
                let handle = record.load_handle()?;
                return print_json(&serde_json::json!({
                    "chosen": record.chosen()?,
                    "name": record.display_name()?,
                    "path": handle.map(|h| h.path),
                    "lastWrite": record.last_write()?,
                }));
            }
            let mut text = folder_status_text(&record);
            if let Some(at) = record.last_write()? {
                text.push_str(&format!("\nLast write: {}", at.format("%Y-%m-%d %H:%M:%S")));
            }
            text
        }
        FolderAction::Forget => {
            record.invalidate()?;
            "Folder forgotten. Exports go to downloads.".to_string()
        }
    };

    if json {
        print_json(&StatusResponse {
            success: true,
            message,
        })
    } else {
        println!("{}", message);
        Ok(())
    }
}

fn cmd_host(runtime: &Runtime, browser_args: &[String]) -> Result<()> {
    tracing::info!(args = ?browser_args, "native messaging host started");
    let stdout = io::stdout();
    let channel = HostChannel::new(stdout.lock());
    capture::register_menu(&channel)?;

    let engine = runtime.engine(&channel, &channel);
    let coordinator = Coordinator::new(&engine);
    let mut stdin = io::stdin().lock();
    host::serve(&mut stdin, &channel, &coordinator)
}
