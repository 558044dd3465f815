pub mod app;
pub mod calendar;
pub mod cli;
pub mod command_processor;
pub mod config;
pub mod env_manager;
pub mod services;

use anyhow::Result;
use log::*;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use crate::app::Application;
use crate::cli::{Cli, Commands};
use crate::command_processor::AppContext;
use crate::services::GoogleCalendarService;

/// Load configuration, start logging and run one command, or the REPL when
/// no command is given.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env_overrides()?;
    let settings = config.validate()?;
    init_logger(settings.log_file.as_deref());
    for warning in &settings.warnings {
        warn!("{}", warning);
    }

    let context = match env_manager::google_credentials_from_env(&settings.token_uri) {
        Ok(credentials) => {
            let service = GoogleCalendarService::new(credentials, settings.base_url.clone());
            let composer = calendar::EventComposer::new(
                Arc::new(service),
                settings.composer.clone(),
                settings.policy.clone(),
            );
            AppContext::new(settings, composer)
        }
        Err(e) if !needs_service(cli.command.as_ref()) => {
            debug!("Running without calendar service: {}", e);
            AppContext::offline(settings, e.to_string())
        }
        Err(e) => return Err(e),
    };

    let app = Application::new(context);
    info!("Initializing gcal-manager");
    match cli.command {
        Some(command) => app.execute(command).await,
        None => app.run_interactive().await,
    }
}

/// Commands that never talk to the calendar service
fn needs_service(command: Option<&Commands>) -> bool {
    !matches!(
        command,
        Some(Commands::Templates) | Some(Commands::CsvTemplate { .. }) | None
    )
}

/// Copies log lines to stderr and the log file
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize logging at `info` unless `RUST_LOG` says otherwise. With a log
/// file, lines go to stderr and the file.
pub fn init_logger(log_file: Option<&Path>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    let mut file_error = None;
    if let Some(path) = log_file {
        match open_log_file(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
            }
            Err(e) => file_error = Some((path.display().to_string(), e)),
        }
    }
    if builder.try_init().is_err() {
        return;
    }
    if let Some((path, e)) = file_error {
        warn!("Cannot write log file {}: {}; logging to stderr only", path, e);
    }
}

pub use config::Config;
