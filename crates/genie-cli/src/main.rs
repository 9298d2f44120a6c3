//! Genie for Excel CLI - natural-language automation of Excel workbooks

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use genie::logging::{self, BlackboxLog};
use genie::{
    AppPaths, ChatEvent, GenieConfig, RecentFiles, Session, Settings, UndoOutcome,
};
use genie_excel::{ExcelBridge, ExcelService, WorkbookSource};
use genie_foundry::{CancellationToken, FoundryClient};
use tracing::warn;

#[derive(Parser)]
#[command(name = "genie")]
#[command(author, version, about = "Ask for changes to an Excel workbook in plain language")]
struct Cli {
    /// Configuration file (default: genie.toml in the config folder)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a workbook, ask for a change and run the resulting plan
    Ask {
        /// The request, e.g. "add a total row to the sales table"
        prompt: String,

        /// Workbook to open
        #[arg(short, long, required_unless_present = "new", conflicts_with = "new")]
        workbook: Option<PathBuf>,

        /// Start from a blank workbook
        #[arg(long)]
        new: bool,

        /// Save kept changes to this file instead of the workbook
        #[arg(short, long, required_if_eq("new", "true"))]
        output: Option<PathBuf>,

        /// Range the request refers to (default: current selection)
        #[arg(short, long)]
        range: Option<String>,

        /// Supporting document (docx, pptx, pdf, xlsx, xls)
        #[arg(short, long)]
        attach: Option<PathBuf>,

        /// Keep the changes without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Send a workbook's structure, cells and charts to Foundry
    Mirror {
        workbook: PathBuf,
    },

    /// List the worksheets of a workbook
    Sheets {
        workbook: PathBuf,
    },

    /// List the charts of a worksheet
    Charts {
        workbook: PathBuf,
        sheet: String,
    },

    /// Run a VBA module's Main sub in a workbook
    RunVba {
        workbook: PathBuf,

        /// File containing the VBA code
        code: PathBuf,

        /// Leave the injected module in the workbook
        #[arg(long)]
        keep_module: bool,
    },

    /// Show recently opened workbooks
    Recent {
        /// Forget all entries
        #[arg(long)]
        clear: bool,
    },

    /// Show or change user settings
    Settings {
        #[arg(long)]
        email: Option<String>,

        /// Instructions sent with every prompt
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Check connectivity to Foundry
    Status,
}

struct AskOptions<'a> {
    range: Option<&'a str>,
    attach: Option<&'a Path>,
    output: Option<&'a Path>,
    yes: bool,
}

struct App {
    paths: AppPaths,
    config: GenieConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = AppPaths::resolve().context("Failed to locate application folders")?;
    let blackbox = match BlackboxLog::create(&paths.logs_folder) {
        Ok(log) => Some(log),
        Err(e) => {
            eprintln!("Warning: blackbox log disabled: {e}");
            None
        }
    };
    logging::init(cli.verbose, blackbox).context("Failed to initialize logging")?;

    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file.clone());
    let config = GenieConfig::load(&config_path)
        .with_context(|| format!("Failed to read '{}'", config_path.display()))?;
    let app = App { paths, config };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match cli.command {
        Commands::Ask {
            prompt,
            workbook,
            new,
            output,
            range,
            attach,
            yes,
        } => {
            let source = match (&workbook, new) {
                (Some(path), _) => WorkbookSource::File(path.as_path()),
                (None, true) => WorkbookSource::New,
                (None, false) => bail!("Either --workbook or --new is required"),
            };
            let options = AskOptions {
                range: range.as_deref(),
                attach: attach.as_deref(),
                output: output.as_deref(),
                yes,
            };
            runtime.block_on(ask(&app, source, &prompt, options))
        }
        Commands::Mirror { workbook } => runtime.block_on(mirror(&app, &workbook)),
        Commands::Sheets { workbook } => list_sheets(&app, &workbook),
        Commands::Charts { workbook, sheet } => list_charts(&app, &workbook, &sheet),
        Commands::RunVba {
            workbook,
            code,
            keep_module,
        } => run_vba(&app, &workbook, &code, keep_module),
        Commands::Recent { clear } => show_recent(&app, clear),
        Commands::Settings {
            email,
            instructions,
        } => update_settings(&app, email, instructions),
        Commands::Status => runtime.block_on(status(&app)),
    }
}

fn open_excel(app: &App) -> Result<ExcelService<ExcelBridge>> {
    let bridge = ExcelBridge::spawn(app.config.bridge_config())
        .context("Failed to start the Excel bridge")?;
    let mut excel = ExcelService::new(bridge, app.config.service_config());
    excel.initialize().context("Failed to start Excel")?;
    Ok(excel)
}

fn open_session(app: &App) -> Result<Session<ExcelBridge>> {
    let foundry = FoundryClient::connect(app.config.foundry_config()?, app.config.token()?);
    let mut session = Session::new(open_excel(app)?, foundry, app.paths.clone());
    let settings = Settings::load(&app.paths).context("Failed to read settings")?;
    session.apply_settings(&settings);
    Ok(session)
}

async fn ask(
    app: &App,
    source: WorkbookSource<'_>,
    prompt: &str,
    options: AskOptions<'_>,
) -> Result<()> {
    let mut session = open_session(app)?;
    let events = session.chat_mut().subscribe();

    if let Some(path) = options.attach {
        let attachment = session
            .attach_file(path)
            .with_context(|| format!("Error processing file '{}'", path.display()))?;
        eprintln!("Attached {} ({} chars)", attachment.name, attachment.text.len());
    }

    let report = session.load_workbook(source).await.context("Failed to load workbook")?;
    eprintln!(
        "Mirrored {} worksheet(s), {} cell(s), {} chart(s)",
        report.worksheets, report.cells, report.charts
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = session.generate(prompt, options.range, &cancel).await;
    print_events(&events);
    let outcome = outcome.context("Error processing request")?;

    if outcome.undo_snapshot.is_some() && outcome.execution_error.is_none() {
        if options.yes || confirm("Keep these changes?")? {
            save_changes(session.excel_mut(), options.output)?;
        } else {
            match session.undo() {
                UndoOutcome::Reverted(path) => eprintln!("Reverted to {}", path.display()),
                other => warn!(outcome = ?other, "undo did not revert"),
            }
            print_events(&events);
        }
    }

    session.close();
    Ok(())
}

fn save_changes(excel: &mut ExcelService<ExcelBridge>, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => excel
            .save_as(path)
            .with_context(|| format!("Failed to save '{}'", path.display()))?,
        None => excel.save().context("Failed to save workbook")?,
    }
    if let Some(path) = excel.current_workbook_path() {
        eprintln!("Saved {}", path.display());
    }
    Ok(())
}

fn print_events(events: &Receiver<ChatEvent>) {
    for event in events.try_iter() {
        match event {
            ChatEvent::MessageAdded {
                message,
                is_user: false,
            } if message != genie::LOADING_TEXT => println!("{message}\n"),
            ChatEvent::SystemResponseAdded { description, code } => {
                println!("{description}");
                if !code.is_empty() {
                    println!("{code}");
                }
                println!();
            }
            _ => {}
        }
    }
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [Y/n] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(!matches!(answer.trim().to_lowercase().as_str(), "n" | "no"))
}

async fn mirror(app: &App, workbook: &Path) -> Result<()> {
    let mut session = open_session(app)?;
    let report = session
        .load_workbook(WorkbookSource::File(workbook))
        .await
        .with_context(|| format!("Failed to mirror '{}'", workbook.display()))?;

    println!("Workbook: {}", report.workbook_key);
    println!("Worksheets: {}", report.worksheets);
    println!("Cells: {}", report.cells);
    println!("Charts: {}", report.charts);
    for sheet in &report.skipped_worksheets {
        println!("Skipped: {sheet}");
    }
    session.close();
    Ok(())
}

fn open_workbook(app: &App, workbook: &Path) -> Result<ExcelService<ExcelBridge>> {
    let mut excel = open_excel(app)?;
    excel
        .load_workbook(WorkbookSource::File(workbook))
        .with_context(|| format!("Failed to open '{}'", workbook.display()))?;
    Ok(excel)
}

fn list_sheets(app: &App, workbook: &Path) -> Result<()> {
    let mut excel = open_workbook(app, workbook)?;
    for (i, name) in excel.worksheet_names()?.iter().enumerate() {
        println!("{}: {}", i, name);
    }
    excel.close();
    Ok(())
}

fn list_charts(app: &App, workbook: &Path, sheet: &str) -> Result<()> {
    let mut excel = open_workbook(app, workbook)?;
    let charts = excel.charts_in_worksheet(sheet);
    if charts.is_empty() {
        eprintln!("No charts in '{sheet}'");
    }
    for name in charts {
        println!("{name}");
    }
    excel.close();
    Ok(())
}

fn run_vba(app: &App, workbook: &Path, code: &Path, keep_module: bool) -> Result<()> {
    let code = std::fs::read_to_string(code)
        .with_context(|| format!("Failed to read '{}'", code.display()))?;
    let mut excel = open_workbook(app, workbook)?;
    excel
        .execute_vba(&code, !keep_module)
        .context("Failed to execute VBA")?;
    excel.save().context("Failed to save workbook")?;
    eprintln!("Macro completed, saved {}", workbook.display());
    excel.close();
    Ok(())
}

fn show_recent(app: &App, clear: bool) -> Result<()> {
    let mut recent = RecentFiles::load(&app.paths.recent_files_file);
    if clear {
        recent.clear().context("Failed to clear recent files")?;
        return Ok(());
    }
    for file in recent.files() {
        let accessed = file
            .last_accessed
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{:<16} {}", accessed, file.full_path.display());
    }
    Ok(())
}

fn update_settings(
    app: &App,
    email: Option<String>,
    instructions: Option<String>,
) -> Result<()> {
    let mut settings = Settings::load(&app.paths).context("Failed to read settings")?;
    let changed = email.is_some() || instructions.is_some();
    if let Some(email) = email {
        settings.user_email = email;
    }
    if let Some(instructions) = instructions {
        settings.custom_instructions = instructions;
    }
    if changed {
        settings.save(&app.paths).context("Failed to save settings")?;
    }

    println!("Email: {}", settings.user_email);
    println!("Custom instructions: {}", settings.custom_instructions);
    println!("Config: {}", app.paths.config_file.display());
    Ok(())
}

async fn status(app: &App) -> Result<()> {
    let foundry = FoundryClient::connect(app.config.foundry_config()?, app.config.token()?);
    if foundry.check_connection().await {
        println!("Foundry: connected ({})", foundry.config().base_url);
        Ok(())
    } else {
        bail!("Foundry: not reachable at {}", foundry.config().base_url)
    }
}
