//! Named event templates: a default summary and duration plus optional
//! description and color, resolved against user overrides.

use super::calendar_types::{EventDraft, EventTimeInterval, PartialEventDraft};
use super::{CalendarError, InputField};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_TEMPLATE_SUMMARY: &str = "Untitled Event";
pub const DEFAULT_TEMPLATE_DURATION_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub name: String,
    pub summary: String,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
}

impl EventTemplate {
    pub fn new(
        name: &str,
        summary: Option<&str>,
        duration_minutes: Option<u32>,
    ) -> Result<Self, CalendarError> {
        let duration_minutes = duration_minutes.unwrap_or(DEFAULT_TEMPLATE_DURATION_MINUTES);
        if duration_minutes == 0 {
            return Err(CalendarError::invalid_format(
                InputField::Duration,
                format!("template '{}' must last at least one minute", name),
            ));
        }
        let summary = summary
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TEMPLATE_SUMMARY);
        Ok(Self {
            name: name.trim().to_string(),
            summary: summary.to_string(),
            duration_minutes,
            description: None,
            color_id: None,
        })
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_color(mut self, color_id: Option<String>) -> Self {
        self.color_id = color_id.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes as i64)
    }
}

/// Read-only set of templates keyed by unique name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, EventTemplate>,
}

impl TemplateCatalog {
    pub fn new(templates: impl IntoIterator<Item = EventTemplate>) -> Self {
        Self { templates: templates.into_iter().map(|t| (t.name.clone(), t)).collect() }
    }

    pub fn get(&self, name: &str) -> Result<&EventTemplate, CalendarError> {
        self.templates
            .get(name.trim())
            .ok_or_else(|| CalendarError::TemplateNotFound(name.trim().to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Build a draft from the named template. Fields present in `overrides`
    /// win; the end defaults to `start + duration`.
    pub fn resolve(
        &self,
        name: &str,
        overrides: PartialEventDraft,
    ) -> Result<EventDraft, CalendarError> {
        let template = self.get(name)?;
        let start = overrides.start.ok_or_else(|| {
            CalendarError::invalid_format(InputField::StartDate, "a start is required to use a template")
        })?;
        let end = overrides.end.unwrap_or(start + template.duration());
        let interval = EventTimeInterval::new(start, end)?;

        let summary = overrides.summary.as_deref().unwrap_or(&template.summary);
        let draft = EventDraft::new(summary, interval)?
            .with_description(overrides.description.or_else(|| template.description.clone()))
            .with_color(overrides.color_id.or_else(|| template.color_id.clone()))
            .with_calendar(overrides.calendar_id)
            .with_recurrence(overrides.recurrence);
        Ok(draft)
    }
}
