use crate::calendar::Frequency;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// gcal-manager - terminal tool for Google Calendar: bulk, recurring and templated events,
/// CSV import and color sync
#[derive(Debug, Parser)]
#[command(name = "gcal-manager")]
#[command(about = "Terminal tool for Google Calendar events, CSV import and color sync", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to GCAL_MANAGER_CONFIG or the per-user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Command to execute (if not specified, enters interactive mode)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Commands {
    /// Manage calendars
    #[command(alias = "calendars")]
    Calendar {
        #[command(subcommand)]
        action: CalendarActions,
    },

    /// Create, search and update events
    #[command(alias = "events")]
    Event {
        #[command(subcommand)]
        action: EventActions,
    },

    /// Import events from a CSV file
    Import(ImportArgs),

    /// Write a CSV file with the import header and any rows given
    CsvTemplate {
        /// Where to write the file
        #[arg(required = true)]
        file: PathBuf,

        /// "SUMMARY|START_DATE START_TIME END_DATE END_TIME", repeat for each row
        #[arg(long = "row")]
        rows: Vec<String>,
    },

    /// Make every event carry its calendar's configured color
    #[command(alias = "sync-colors")]
    Sync(SyncArgs),

    /// List configured event templates
    Templates,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum CalendarActions {
    /// List available calendars
    List,

    /// Create a new calendar in the default timezone
    #[command(alias = "add")]
    Create {
        /// Calendar name
        #[arg(required = true)]
        name: String,
    },

    /// Show a calendar's color id and the color its events should carry
    #[command(alias = "inspect")]
    Color {
        /// Calendar id or name
        #[arg(required = true)]
        calendar: String,
    },
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum EventActions {
    /// Create a single event
    #[command(alias = "create")]
    Add {
        /// Event title
        #[arg(required = true)]
        summary: String,

        #[command(flatten)]
        times: IntervalArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Create the same event in several time slots
    AddMany {
        /// Event title
        #[arg(required = true)]
        summary: String,

        /// "START_DATE START_TIME END_DATE END_TIME", repeat for each slot
        #[arg(long = "slot", required = true)]
        slots: Vec<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Create several different events at once
    #[command(alias = "add-unique")]
    AddBatch {
        /// "SUMMARY|START_DATE START_TIME END_DATE END_TIME", repeat for each event
        #[arg(long = "event", required = true)]
        entries: Vec<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Create a recurring event
    #[command(alias = "repeat")]
    Recurring {
        /// Event title
        #[arg(required = true)]
        summary: String,

        #[command(flatten)]
        times: IntervalArgs,

        /// Recurrence frequency
        #[arg(long, value_enum)]
        frequency: RecurrenceFreq,

        /// Repeat every N frequency units (e.g., every 2 weeks)
        #[arg(long)]
        interval: Option<u32>,

        /// Number of occurrences
        #[arg(long, conflicts_with = "until")]
        count: Option<u32>,

        /// Last date an occurrence may start on (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,

        /// Expand occurrences locally instead of sending a recurrence rule
        #[arg(long)]
        materialize: bool,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Create an event from a configured template
    Template {
        /// Template name
        #[arg(required = true)]
        name: String,

        /// Start date (YYYY-MM-DD)
        #[arg(required = true)]
        start_date: String,

        /// Start time (HH:MM:SS)
        #[arg(required = true)]
        start_time: String,

        /// End date (YYYY-MM-DD), instead of the template duration
        #[arg(long, requires = "end_time")]
        end_date: Option<String>,

        /// End time (HH:MM:SS), instead of the template duration
        #[arg(long, requires = "end_date")]
        end_time: Option<String>,

        /// Title, instead of the template summary
        #[arg(long)]
        summary: Option<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Search events by keyword and/or date range
    #[command(alias = "find")]
    Search {
        /// Text to look for
        #[arg(long, short)]
        query: Option<String>,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Calendar id or name
        #[arg(long)]
        calendar: Option<String>,
    },

    /// Update an existing event; unspecified fields stay unchanged
    #[command(alias = "edit")]
    Update {
        /// Event id, as shown by search
        #[arg(required = true)]
        event_id: String,

        /// Calendar id or name
        #[arg(long)]
        calendar: Option<String>,

        /// New title
        #[arg(long)]
        summary: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New color id
        #[arg(long)]
        color: Option<String>,

        /// New start date (YYYY-MM-DD)
        #[arg(long, requires_all = ["start_time", "end_date", "end_time"])]
        start_date: Option<String>,

        /// New start time (HH:MM:SS)
        #[arg(long, requires = "start_date")]
        start_time: Option<String>,

        /// New end date (YYYY-MM-DD)
        #[arg(long, requires = "start_date")]
        end_date: Option<String>,

        /// New end time (HH:MM:SS)
        #[arg(long, requires = "start_date")]
        end_time: Option<String>,
    },
}

/// Start and end of an event as typed by the user
#[derive(Debug, Clone, PartialEq, Args)]
pub struct IntervalArgs {
    /// Start date (YYYY-MM-DD)
    #[arg(required = true)]
    pub start_date: String,

    /// Start time (HH:MM:SS)
    #[arg(required = true)]
    pub start_time: String,

    /// End date (YYYY-MM-DD)
    #[arg(required = true)]
    pub end_date: String,

    /// End time (HH:MM:SS)
    #[arg(required = true)]
    pub end_time: String,
}

/// Where an event goes and its optional details
#[derive(Debug, Clone, Default, PartialEq, Args)]
pub struct TargetArgs {
    /// Calendar id or name (defaults to the configured default calendar)
    #[arg(long)]
    pub calendar: Option<String>,

    /// Event description
    #[arg(long)]
    pub description: Option<String>,

    /// Color id, instead of the calendar's configured color
    #[arg(long)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct ImportArgs {
    /// CSV file with Summary, Start Date, Start Time, End Date, End Time columns
    #[arg(required = true)]
    pub file: PathBuf,

    /// Calendar id or name for every imported event
    #[arg(long)]
    pub calendar: Option<String>,

    /// Validate and report without creating events
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct SyncArgs {
    /// Calendar id or name
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub calendar: Option<String>,

    /// Sync every calendar named in the color configuration
    #[arg(long)]
    pub all: bool,

    /// Show the updates without applying them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecurrenceFreq {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl From<RecurrenceFreq> for Frequency {
    fn from(freq: RecurrenceFreq) -> Self {
        match freq {
            RecurrenceFreq::Daily => Frequency::Daily,
            RecurrenceFreq::Weekly => Frequency::Weekly,
            RecurrenceFreq::Monthly => Frequency::Monthly,
            RecurrenceFreq::Yearly => Frequency::Yearly,
        }
    }
}
