//! Command-line surface for `certbatch`.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crate::export::{
    ExportController, ExportEvent, ExportJob, JobStatus, ResvgRasterizer, SvgCertificateRenderer,
};
use crate::paths::AppPaths;
use crate::record_store::{RecordSelection, RecordStore};
use crate::session::{Role, SessionContext, User};
use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "certbatch", version, about = "Training certificate exporter", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import students from a CSV file
    Import { csv: PathBuf },
    /// Render every student's certificate into one ZIP archive
    Export {
        /// Only the students from the most recent import
        #[arg(long)]
        latest: bool,
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
        /// Open the archive when done
        #[arg(long)]
        open: bool,
    },
    /// List stored students
    List {
        /// Filter by name, serial number, PAN or LIC number
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Delete a student by PAN
    Delete { pan: String },
    /// Render one student's certificate
    Single {
        pan: String,
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },
    /// Store a session token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        token: String,
        #[arg(long, value_enum, default_value_t = RoleArg::User)]
        role: RoleArg,
    },
    /// Forget the stored session
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Admin,
    User,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Admin => Role::Admin,
            RoleArg::User => Role::User,
        }
    }
}

pub fn run(cli: &Cli, settings: &Settings, paths: &AppPaths) -> Result<()> {
    let mut session = SessionContext::hydrate(&paths.session_file);

    match &cli.command {
        Commands::Login {
            username,
            token,
            role,
        } => {
            session.login(
                token,
                User {
                    username: username.clone(),
                    role: (*role).into(),
                },
            )?;
            println!("Logged in as {username}");
        }
        Commands::Logout => {
            session.invalidate()?;
            println!("Logged out");
        }
        Commands::Import { csv } => {
            session.require_admin()?;
            let mut store = RecordStore::load_from_file(&paths.store_file)?;
            let report = store
                .import_csv_file(csv)
                .with_context(|| format!("Failed to import {}", csv.display()))?;
            store.save()?;

            println!(
                "Imported {} students ({} rejected)",
                report.imported,
                report.rejected.len()
            );
            for (line, reason) in &report.rejected {
                println!("  line {line}: {reason}");
            }
        }
        Commands::List { search } => {
            session.require_admin()?;
            let store = RecordStore::load_from_file(&paths.store_file)?;
            let matches = store.search(search.as_deref().unwrap_or(""));
            if matches.is_empty() {
                println!("No students found");
            }
            for r in &matches {
                println!(
                    "{:>5}  {:<30}  {}  {:<14}  {:<16}  {} to {}",
                    r.sr_no,
                    r.name,
                    r.pan_number,
                    r.lic_regd_number,
                    r.branch,
                    r.start_date,
                    r.end_date
                );
            }
        }
        Commands::Delete { pan } => {
            session.require_admin()?;
            let mut store = RecordStore::load_from_file(&paths.store_file)?;
            let removed = store
                .remove_by_pan(pan)
                .ok_or_else(|| anyhow!("No student with PAN {pan}"))?;
            store.save()?;
            println!("Deleted {} ({})", removed.name, removed.pan_number);
        }
        Commands::Export {
            latest,
            output,
            open,
        } => {
            session.require_admin()?;
            let store = RecordStore::load_from_file(&paths.store_file)?;
            let selection = if *latest {
                RecordSelection::LastUploaded
            } else {
                RecordSelection::All
            };
            let records = selection.fetch(&store)?;

            let controller = build_controller(settings);
            let job = controller.start_export(records)?;
            if let Err(e) = cancel_on_interrupt(job.clone(), tokio::signal::ctrl_c()) {
                warn!("Ctrl+C will not cancel the export: {e}");
            }
            follow_progress(&job);
            let archive_path = write_result(&job, output)?;
            if *open {
                open::that(&archive_path)
                    .with_context(|| format!("Failed to open {}", archive_path.display()))?;
            }
        }
        Commands::Single { pan, output } => {
            session.require_admin()?;
            let store = RecordStore::load_from_file(&paths.store_file)?;
            let record = store
                .find_by_pan(pan)
                .ok_or_else(|| anyhow!("No student with PAN {pan}"))?;

            let certificate = build_controller(settings).export_single(record)?;
            let path = write_file(output, &certificate.file_name, &certificate.bytes)?;
            println!("Saved {}", path.display());
        }
    }
    Ok(())
}

/// Wire the renderer and rasterizer from settings.
pub fn build_controller(settings: &Settings) -> ExportController {
    let mut renderer =
        SvgCertificateRenderer::new().with_date_format(settings.date_format.clone());
    if let Some(template) = settings.load_template() {
        renderer = renderer.with_template(template);
    }

    let mut rasterizer = ResvgRasterizer::with_system_fonts();
    if let Some(dir) = &settings.font_dir {
        rasterizer = rasterizer.with_font_dir(dir);
    }

    ExportController::new(
        Arc::new(renderer),
        Arc::new(rasterizer),
        settings.export_profile(),
    )
}

/// Cancels `job` once `interrupt` resolves. The watcher thread is left running when
/// the job finishes first; a late interrupt is then a no-op.
fn cancel_on_interrupt<F>(job: ExportJob, interrupt: F) -> io::Result<thread::JoinHandle<()>>
where
    F: Future<Output = io::Result<()>> + Send + 'static,
{
    thread::Builder::new()
        .name("interrupt-watcher".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Failed to start interrupt watcher: {e}");
                    return;
                }
            };
            if let Err(e) = runtime.block_on(interrupt) {
                warn!("Failed to install Ctrl+C handler: {e}");
                return;
            }
            info!("Received Ctrl+C, cancelling export {}", job.id());
            eprintln!("\nCancelling after the current certificate...");
            job.cancel();
        })
}

fn follow_progress(job: &ExportJob) {
    let mut stdout = io::stdout();
    for event in job.events().iter() {
        match event {
            ExportEvent::Started { total, .. } => {
                println!("Exporting {total} certificates");
            }
            ExportEvent::Progress(progress) => {
                let _ = write!(stdout, "\r[{:>3}%] {}", progress.percent, job.summary());
                let _ = write!(stdout, "\x1b[K");
                let _ = stdout.flush();
            }
            ExportEvent::Finished { .. } => {
                println!();
                break;
            }
        }
    }
}

fn write_result(job: &ExportJob, output: &Path) -> Result<PathBuf> {
    let summary = job.summary();
    for failure in job.errors() {
        warn!("{}: {}", failure.record, failure.message);
        println!("  {}: {}", failure.record, failure.message);
    }

    match (job.status(), job.result()) {
        (JobStatus::Done, Some(archive)) => {
            let path = write_file(output, &archive.file_name, &archive.bytes)?;
            println!("{summary}");
            println!("Saved {}", path.display());
            Ok(path)
        }
        _ => bail!(summary),
    }
}

fn write_file(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {dir:?}"))?;
    let path = dir.join(file_name);
    fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}
