//! Event command handler
//!
//! Handles single, multi-slot, batch, recurring and templated event creation
//! as well as event search and update.
//
// # Examples
//
// ```
// let handler = EventHandler;
// let command = Commands::Event { action: EventActions::Search { query: Some("Twins".into()), .. } };
// handler.execute(&ctx, command).await?;
// ```

use super::{finish, print_created, print_warning, submit_drafts, AppContext, CommandHandler};
use crate::calendar::{
    expand, parse_date, parse_date_time, parse_event_entry, parse_slot, validate_date_range,
    validate_interval, CalendarError, EventComposer, EventDraft, EventTimeInterval, InputField,
    PartialEventDraft, RecurrenceResult, RecurrenceSpec, RecurrenceStrategy,
};
use crate::cli::{Commands, EventActions, IntervalArgs, TargetArgs};
use crate::services::{EventDateTime, EventPatch, EventQuery, RemoteEvent};
use anyhow::Result;
use chrono_tz::Tz;
use log::debug;
use std::future::Future;
use std::pin::Pin;

/// Handler for event commands
#[derive(Debug)]
pub struct EventHandler;

impl CommandHandler for EventHandler {
    fn execute<'a>(
        &'a self,
        ctx: &'a AppContext,
        command: Commands,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            let Commands::Event { action } = command else {
                return Ok(());
            };
            finish(run(ctx, ctx.composer()?, action).await)
        })
    }

    fn can_handle(&self, command: &Commands) -> bool {
        matches!(command, Commands::Event { .. })
    }
}

async fn run(
    ctx: &AppContext,
    composer: &EventComposer,
    action: EventActions,
) -> Result<(), CalendarError> {
    let tz = ctx.settings.timezone;
    match action {
        EventActions::Add { summary, times, target } => {
            let draft = draft_from(&summary, interval_from(&times, tz)?, target)?;
            print_created(&composer.submit(&draft).await?);
        }
        EventActions::AddMany { summary, slots, target } => {
            let mut drafts = Vec::with_capacity(slots.len());
            for (i, slot) in slots.iter().enumerate() {
                let draft = parse_slot(slot, tz)
                    .and_then(|interval| draft_from(&summary, interval, target.clone()));
                match draft {
                    Ok(draft) => drafts.push(draft),
                    Err(e) => println!("❌ Slot {}: [{}] {}", i + 1, e.kind(), e),
                }
            }
            if drafts.is_empty() {
                println!("No valid slots to create");
                return Ok(());
            }
            submit_drafts(composer, target.calendar.as_deref(), drafts).await?;
        }
        EventActions::AddBatch { entries, target } => {
            let mut drafts = Vec::with_capacity(entries.len());
            for (i, entry) in entries.iter().enumerate() {
                match parse_event_entry(entry, tz) {
                    Ok(draft) => drafts.push(with_target(draft, target.clone())),
                    Err(e) => println!("❌ Event {}: [{}] {}", i + 1, e.kind(), e),
                }
            }
            if drafts.is_empty() {
                println!("No valid events to create");
                return Ok(());
            }
            submit_drafts(composer, target.calendar.as_deref(), drafts).await?;
        }
        EventActions::Recurring {
            summary,
            times,
            frequency,
            interval,
            count,
            until,
            materialize,
            target,
        } => {
            let until = until
                .as_deref()
                .map(|until| parse_date(InputField::RecurrenceUntil, until))
                .transpose()?;
            let spec = RecurrenceSpec::from_parts(frequency.into(), interval, count, until)?;
            let first = interval_from(&times, tz)?;
            let strategy = recurrence_strategy(
                materialize,
                ctx.settings.strategy,
                ctx.settings.recurrence_cap,
            );
            debug!("Expanding {} with {:?}", spec, strategy);

            let calendar = target.calendar.clone();
            let template = draft_from(&summary, first, target)?;
            let expanded = expand(strategy, spec, first)?;
            let native = matches!(expanded, RecurrenceResult::Native { .. });
            let (drafts, warning) = expanded.into_drafts(&template);
            if let Some(warning) = &warning {
                print_warning(warning);
            }
            if native {
                for draft in &drafts {
                    print_created(&composer.submit(draft).await?);
                }
            } else {
                println!("Creating {} occurrences of '{}'", drafts.len(), summary);
                submit_drafts(composer, calendar.as_deref(), drafts).await?;
            }
        }
        EventActions::Template {
            name,
            start_date,
            start_time,
            end_date,
            end_time,
            summary,
            target,
        } => {
            let start = parse_date_time(
                InputField::StartDate,
                InputField::StartTime,
                &start_date,
                &start_time,
                tz,
            )?;
            let end = match (end_date, end_time) {
                (Some(date), Some(time)) => Some(parse_date_time(
                    InputField::EndDate,
                    InputField::EndTime,
                    &date,
                    &time,
                    tz,
                )?),
                _ => None,
            };
            let overrides = PartialEventDraft {
                summary,
                end,
                description: target.description,
                color_id: target.color,
                calendar_id: target.calendar,
                ..PartialEventDraft::starting_at(start)
            };
            let draft = ctx.settings.templates.resolve(&name, overrides)?;
            print_created(&composer.submit(&draft).await?);
        }
        EventActions::Search { query, from, to, calendar } => {
            let (time_min, time_max) = validate_date_range(from.as_deref(), to.as_deref(), tz)?;
            let query = EventQuery { text: query, time_min, time_max };
            let calendar =
                calendar.unwrap_or_else(|| composer.settings().default_calendar.clone());
            let events = composer.search_events(&calendar, &query).await?;
            print_events(&events);
        }
        EventActions::Update {
            event_id,
            calendar,
            summary,
            description,
            color,
            start_date,
            start_time,
            end_date,
            end_time,
        } => {
            let mut patch =
                EventPatch { summary, description, color_id: color, ..EventPatch::default() };
            if let (Some(start_date), Some(start_time), Some(end_date), Some(end_time)) =
                (start_date, start_time, end_date, end_time)
            {
                let times = IntervalArgs { start_date, start_time, end_date, end_time };
                let interval = interval_from(&times, tz)?;
                patch.start = Some(EventDateTime::zoned(interval.start()));
                patch.end = Some(EventDateTime::zoned(interval.end()));
            }
            if patch.is_empty() {
                println!("Nothing to update");
                return Ok(());
            }
            let calendar =
                calendar.unwrap_or_else(|| composer.settings().default_calendar.clone());
            let event = composer.update_event(&calendar, &event_id, &patch).await?;
            println!("✅ Event '{}' updated", event.display_summary());
        }
    }
    Ok(())
}

/// `--materialize` forces local expansion under the configured cap
fn recurrence_strategy(
    materialize: bool,
    configured: RecurrenceStrategy,
    cap: usize,
) -> RecurrenceStrategy {
    match (materialize, configured) {
        (true, RecurrenceStrategy::Native) => RecurrenceStrategy::Materialized { cap },
        (_, strategy) => strategy,
    }
}

fn interval_from(times: &IntervalArgs, tz: Tz) -> Result<EventTimeInterval, CalendarError> {
    validate_interval(&times.start_date, &times.start_time, &times.end_date, &times.end_time, tz)
}

fn draft_from(
    summary: &str,
    interval: EventTimeInterval,
    target: TargetArgs,
) -> Result<EventDraft, CalendarError> {
    Ok(with_target(EventDraft::new(summary, interval)?, target))
}

fn with_target(draft: EventDraft, target: TargetArgs) -> EventDraft {
    draft
        .with_description(target.description)
        .with_color(target.color)
        .with_calendar(target.calendar)
}

fn print_events(events: &[RemoteEvent]) {
    if events.is_empty() {
        println!("No events found");
        return;
    }
    println!("Found {} event(s):", events.len());
    for (i, event) in events.iter().enumerate() {
        let start = event.start.as_ref().map(ToString::to_string).unwrap_or_default();
        println!("{}. {} | {} | id: {}", i + 1, event.display_summary(), start, event.id);
        if let Some(link) = &event.html_link {
            println!("   {}", link);
        }
    }
}
