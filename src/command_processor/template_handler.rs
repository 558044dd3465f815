//! Template listing handler
//
// # Examples
//
// ```
// let handler = TemplateHandler;
// handler.execute(&ctx, Commands::Templates).await?;
// ```

use super::{AppContext, CommandHandler};
use crate::calendar::{EventTemplate, TemplateCatalog};
use crate::cli::Commands;
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

/// Handler for `templates`
#[derive(Debug)]
pub struct TemplateHandler;

impl CommandHandler for TemplateHandler {
    fn execute<'a>(
        &'a self,
        ctx: &'a AppContext,
        _command: Commands,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            print!("{}", render(&ctx.settings.templates));
            Ok(())
        })
    }

    fn can_handle(&self, command: &Commands) -> bool {
        matches!(command, Commands::Templates)
    }
}

fn render(catalog: &TemplateCatalog) -> String {
    if catalog.is_empty() {
        return "No templates configured\n".to_string();
    }
    catalog.iter().map(|template| format!("• {}\n", describe(template))).collect()
}

fn describe(template: &EventTemplate) -> String {
    let mut line = format!(
        "{}: \"{}\", {} min",
        template.name, template.summary, template.duration_minutes
    );
    if let Some(color_id) = &template.color_id {
        line.push_str(&format!(", colorId {}", color_id));
    }
    if let Some(description) = &template.description {
        line.push_str(&format!(" ({})", description));
    }
    line
}
