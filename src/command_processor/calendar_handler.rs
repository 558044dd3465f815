//! Calendar command handler
//!
//! Handles `calendar list`, `calendar create` and `calendar color`.
//
// # Examples
//
// ```
// let handler = CalendarHandler;
// let command = Commands::Calendar { action: CalendarActions::List };
// handler.execute(&ctx, command).await?;
// ```

use super::{finish, AppContext, CommandHandler};
use crate::calendar::{CalendarError, ColorInspection, EventComposer};
use crate::cli::{CalendarActions, Commands};
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

/// Handler for calendar commands
#[derive(Debug)]
pub struct CalendarHandler;

impl CommandHandler for CalendarHandler {
    fn execute<'a>(
        &'a self,
        ctx: &'a AppContext,
        command: Commands,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            let Commands::Calendar { action } = command else {
                return Ok(());
            };
            finish(run(ctx.composer()?, action).await)
        })
    }

    fn can_handle(&self, command: &Commands) -> bool {
        matches!(command, Commands::Calendar { .. })
    }
}

async fn run(composer: &EventComposer, action: CalendarActions) -> Result<(), CalendarError> {
    match action {
        CalendarActions::List => {
            let calendars = composer.list_calendars().await?;
            println!("Available calendars:");
            for calendar in &calendars {
                let marker = if calendar.primary { " [primary]" } else { "" };
                println!("  📅 {} ({}){}", calendar.name(), calendar.id, marker);
            }
        }
        CalendarActions::Create { name } => {
            let calendar = composer.create_calendar(&name).await?;
            println!("✅ Calendar '{}' created with id {}", calendar.name(), calendar.id);
        }
        CalendarActions::Color { calendar } => {
            let inspection = composer.inspect_color(&calendar).await?;
            println!("{}", describe_colors(&inspection));
        }
    }
    Ok(())
}

fn describe_colors(inspection: &ColorInspection) -> String {
    let calendar = &inspection.calendar;
    let own = calendar.color_id.as_deref().unwrap_or("not set");
    let background = calendar.background_color.as_deref().unwrap_or("not set");
    let expected = match &inspection.expected {
        Ok(color_id) => format!("events should use colorId {}", color_id),
        Err(gap) => gap.to_string(),
    };
    format!("🎨 {}: colorId {}, background {}; {}", calendar.name(), own, background, expected)
}
