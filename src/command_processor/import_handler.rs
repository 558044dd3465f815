//! CSV import command handler
//
// # Examples
//
// ```
// let handler = ImportHandler;
// let command = Commands::Import(ImportArgs { file: "games.csv".into(), calendar: None, dry_run: true });
// handler.execute(&ctx, command).await?;
// ```

use super::{finish, submit_drafts, AppContext, CommandHandler};
use crate::calendar::{
    parse_event_entry, write_template, CsvImportResult, CsvImporter, EventDraft, CSV_HEADERS,
};
use crate::cli::{Commands, ImportArgs};
use anyhow::Result;
use chrono_tz::Tz;
use log::{info, warn};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// Handler for `import` and `csv-template`
#[derive(Debug)]
pub struct ImportHandler;

impl CommandHandler for ImportHandler {
    fn execute<'a>(
        &'a self,
        ctx: &'a AppContext,
        command: Commands,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            match command {
                Commands::Import(args) => import(ctx, args).await,
                Commands::CsvTemplate { file, rows } => {
                    csv_template(&file, &rows, ctx.settings.timezone);
                    Ok(())
                }
                _ => Ok(()),
            }
        })
    }

    fn can_handle(&self, command: &Commands) -> bool {
        matches!(command, Commands::Import(_) | Commands::CsvTemplate { .. })
    }
}

async fn import(ctx: &AppContext, args: ImportArgs) -> Result<()> {
    let importer = CsvImporter::new(ctx.settings.timezone).with_calendar(args.calendar.clone());
    let result = match importer.import_path(&args.file) {
        Ok(result) => result,
        Err(e) => {
            warn!("Import of {} failed: {}", args.file.display(), e);
            println!("❌ [{}] {}", e.kind(), e);
            return Ok(());
        }
    };
    print_rows(&result);

    if args.dry_run {
        info!("Dry run: nothing submitted");
        println!("Dry run: no events were created");
        return Ok(());
    }
    let drafts = result.into_drafts();
    if drafts.is_empty() {
        println!("No valid rows to import");
        return Ok(());
    }

    let composer = ctx.composer()?;
    finish(submit_drafts(composer, args.calendar.as_deref(), drafts).await)
}

fn csv_template(file: &Path, rows: &[String], tz: Tz) {
    let mut drafts: Vec<EventDraft> = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        match parse_event_entry(row, tz) {
            Ok(draft) => drafts.push(draft),
            Err(e) => println!("❌ Row {}: [{}] {}", i + 1, e.kind(), e),
        }
    }
    match write_template(file, &drafts) {
        Ok(()) => println!(
            "✅ CSV written to {} ({}) with {} row(s)",
            file.display(),
            CSV_HEADERS.join(", "),
            drafts.len()
        ),
        Err(e) => println!("❌ [{}] {}", e.kind(), e),
    }
}

fn print_rows(result: &CsvImportResult) {
    println!("CSV Headers: {}", result.headers.join(", "));
    for error in result.rejected() {
        println!("❌ {}", error);
    }
    println!("{}", result.summary());
}
