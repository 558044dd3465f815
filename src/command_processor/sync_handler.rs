//! Color sync command handler
//!
//! `sync <calendar>` recolors one calendar's events, `sync --all` every
//! calendar the color configuration names. `--dry-run` prints the plan only.
//
// # Examples
//
// ```
// let handler = SyncHandler;
// let command = Commands::Sync(SyncArgs { calendar: None, all: true, dry_run: false });
// handler.execute(&ctx, command).await?;
// ```

use super::{finish, print_warning, AppContext, CancelOnCtrlC, CommandHandler};
use crate::calendar::{
    CalendarError, EventComposer, EventSyncOutcome, SyncPlan, SyncReport, SyncStatus,
};
use crate::cli::{Commands, SyncArgs};
use anyhow::Result;
use log::info;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

/// Handler for color sync
#[derive(Debug)]
pub struct SyncHandler;

impl CommandHandler for SyncHandler {
    fn execute<'a>(
        &'a self,
        ctx: &'a AppContext,
        command: Commands,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            let Commands::Sync(args) = command else {
                return Ok(());
            };
            for warning in &ctx.settings.warnings {
                print_warning(warning);
            }
            finish(run(ctx.composer()?, args).await)
        })
    }

    fn can_handle(&self, command: &Commands) -> bool {
        matches!(command, Commands::Sync(_))
    }
}

async fn run(composer: &EventComposer, args: SyncArgs) -> Result<(), CalendarError> {
    match (args.calendar, args.all, args.dry_run) {
        (Some(calendar), _, true) => {
            print_plan(&composer.plan_calendar_sync(&calendar).await?);
        }
        (Some(calendar), _, false) => {
            let cancel = CancelOnCtrlC::new();
            print_report(&composer.sync_calendar(&calendar, cancel.token()).await?);
        }
        (None, _, true) => {
            let mut seen = BTreeSet::new();
            for key in composer.policy().calendar_keys() {
                match composer.plan_calendar_sync(key).await {
                    Ok(plan) if !seen.insert(plan.calendar_id().to_string()) => {}
                    Ok(plan) => print_plan(&plan),
                    Err(e) if e.is_unreachable() => return Err(e),
                    Err(e) => println!("❌ {}: [{}] {}", key, e.kind(), e),
                }
            }
        }
        (None, _, false) => {
            let cancel = CancelOnCtrlC::new();
            let reports = composer.sync_all(cancel.token()).await?;
            if reports.is_empty() {
                println!("No calendars are named in the color configuration");
            }
            for (key, result) in &reports {
                match result {
                    Ok(report) => print_report(report),
                    Err(e) => println!("❌ {}: [{}] {}", key, e.kind(), e),
                }
            }
        }
    }
    Ok(())
}

fn print_plan(plan: &SyncPlan) {
    match plan {
        SyncPlan::Skipped { warning, .. } => print_warning(warning),
        SyncPlan::Planned { calendar_id, color_id, updates, already_correct } => {
            println!(
                "{}: {} event(s) would be set to colorId {}, {} already correct",
                calendar_id,
                updates.len(),
                color_id,
                already_correct.len()
            );
            for update in updates {
                println!(
                    "  {} ({}): {} -> {}",
                    update.summary,
                    update.event_id,
                    update.current.as_deref().unwrap_or("none"),
                    update.color_id
                );
            }
        }
    }
}

fn print_report(report: &SyncReport) {
    match &report.status {
        SyncStatus::Skipped(warning) => print_warning(warning),
        SyncStatus::Completed(results) => {
            for result in results {
                if let EventSyncOutcome::Failed(e) = &result.outcome {
                    println!("❌ {}: [{}] {}", result.event_id, e.kind(), e);
                }
            }
            let mark = if report.failed() > 0 { "⚠️ " } else { "✅" };
            println!("{} {}", mark, report);
            if report.cancelled {
                println!("Cancelled: {} update(s) were not attempted", report.not_started);
            }
            info!("Color sync for {} done", report.calendar_id);
        }
    }
}
