use crate::calendar::{
    BatchReport, CalendarError, EventComposer, EventDraft, SubmittedEvent, Warning,
};
use crate::cli::Commands;
use crate::config::RuntimeSettings;
use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod calendar_handler;
pub mod event_handler;
pub mod import_handler;
pub mod sync_handler;
pub mod template_handler;

/// Everything a handler needs to run a command
pub struct AppContext {
    pub settings: RuntimeSettings,
    composer: Result<EventComposer, String>,
}

impl AppContext {
    pub fn new(settings: RuntimeSettings, composer: EventComposer) -> Self {
        Self { settings, composer: Ok(composer) }
    }

    /// A context without a calendar service; commands that need one report
    /// `reason` instead of running.
    pub fn offline(settings: RuntimeSettings, reason: impl Into<String>) -> Self {
        Self { settings, composer: Err(reason.into()) }
    }

    pub fn composer(&self) -> Result<&EventComposer> {
        self.composer.as_ref().map_err(|reason| anyhow!("Calendar service unavailable: {}", reason))
    }
}

pub trait CommandHandler: Debug + Send + Sync {
    fn execute<'a>(
        &'a self,
        ctx: &'a AppContext,
        command: Commands,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>>;
    fn can_handle(&self, command: &Commands) -> bool;
}

#[derive(Debug)]
pub struct CommandProcessor {
    handlers: Vec<Box<dyn CommandHandler>>,
}

impl CommandProcessor {
    pub fn new() -> Self {
        let handlers: Vec<Box<dyn CommandHandler>> = vec![
            Box::new(calendar_handler::CalendarHandler),
            Box::new(event_handler::EventHandler),
            Box::new(import_handler::ImportHandler),
            Box::new(sync_handler::SyncHandler),
            Box::new(template_handler::TemplateHandler),
        ];
        Self { handlers }
    }

    pub async fn execute(&self, ctx: &AppContext, command: Commands) -> Result<()> {
        debug!("Attempting to execute command: {:?}", command);
        for handler in &self.handlers {
            if handler.can_handle(&command) {
                info!("Executing command with handler {:?}", handler);
                return match handler.execute(ctx, command).await {
                    Ok(()) => {
                        debug!("Command executed successfully");
                        Ok(())
                    }
                    Err(e) => {
                        error!("Failed to execute command: {:?}", e);
                        Err(e)
                    }
                };
            }
        }
        warn!("No handler for command: {:?}", command);
        println!("Unrecognized command. Type 'help' for a list of available commands.");
        Ok(())
    }
}

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its token on Ctrl-C while alive. Work already sent to the
/// calendar service still completes.
pub struct CancelOnCtrlC {
    token: CancellationToken,
    watcher: JoinHandle<()>,
}

impl CancelOnCtrlC {
    pub fn new() -> Self {
        let token = CancellationToken::new();
        let child = token.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; finishing in-flight requests and skipping the rest");
                child.cancel();
            }
        });
        Self { token, watcher }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Default for CancelOnCtrlC {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancelOnCtrlC {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// Submit `drafts` as one cancellable batch. A batch-wide `target` calendar
/// is resolved once up front; an unknown reference fails the whole command.
pub(crate) async fn submit_drafts(
    composer: &EventComposer,
    target: Option<&str>,
    drafts: Vec<EventDraft>,
) -> Result<(), CalendarError> {
    if let Some(reference) = target {
        let calendar = composer.resolve_calendar(reference).await?;
        debug!("Batch target '{}' resolved to {}", reference, calendar.id);
    }
    let cancel = CancelOnCtrlC::new();
    print_batch(&composer.submit_batch(drafts, cancel.token()).await?);
    Ok(())
}

/// Print a user-level failure and carry on; an unreachable service stops the command.
pub(crate) fn finish(result: Result<(), CalendarError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_unreachable() => Err(e.into()),
        Err(e) => {
            println!("❌ [{}] {}", e.kind(), e);
            Ok(())
        }
    }
}

pub(crate) fn print_warning(warning: &Warning) {
    println!("⚠️  [{}] {}", warning.kind(), warning);
}

pub(crate) fn print_created(created: &SubmittedEvent) {
    match &created.event.html_link {
        Some(link) => println!("✅ Event created: {}", link),
        None => println!("✅ Event created with id {}", created.event.id),
    }
}

pub(crate) fn print_batch(report: &BatchReport<SubmittedEvent>) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(created) => println!(
                "✅ {}: {}",
                outcome.label,
                created.event.html_link.as_deref().unwrap_or(&created.event.id)
            ),
            Err(e) => println!("❌ {}: [{}] {}", outcome.label, e.kind(), e),
        }
    }
    println!("\nCreated {} event(s), {} failed", report.succeeded(), report.failed());
    if let Some(kind) = report.kind() {
        println!("⚠️  [{}] {} of {} events failed", kind, report.failed(), report.outcomes.len());
    }
    if report.cancelled {
        println!("Cancelled: {} event(s) were not submitted", report.not_started);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;

    #[test]
    fn test_finish_keeps_going_on_user_errors() {
        assert!(finish(Err(CalendarError::TemplateNotFound("Gym".to_string()))).is_ok());
        assert!(finish(Err(ServiceError::NotFound("gone".to_string()).into())).is_ok());
    }

    #[test]
    fn test_finish_stops_when_service_is_unreachable() {
        let err = finish(Err(ServiceError::Unreachable("connection refused".to_string()).into()))
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_every_command_has_a_handler() {
        let processor = CommandProcessor::new();
        let commands = [
            Commands::Templates,
            Commands::CsvTemplate { file: "events.csv".into(), rows: Vec::new() },
            Commands::Calendar { action: crate::cli::CalendarActions::List },
        ];
        for command in &commands {
            assert!(processor.handlers.iter().any(|h| h.can_handle(command)), "{:?}", command);
        }
    }
}
