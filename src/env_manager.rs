use crate::services::google::GoogleCredentials;
use anyhow::{bail, Result};
use log::info;
use secrecy::SecretString;
use std::env;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

pub const REQUIRED_ENV_VARS: &[&str] = &[
    "GOOGLE_CALENDAR_CLIENT_ID",
    "GOOGLE_CALENDAR_CLIENT_SECRET",
    "GOOGLE_CALENDAR_TOKEN",
    "GOOGLE_CALENDAR_REFRESH_TOKEN",
];

// Names of optional environment variables
pub const OPTIONAL_ENV_VARS: &[&str] = &[
    "GOOGLE_CALENDAR_TOKEN_URI",
    "DEFAULT_TIMEZONE",
    "CALENDAR_NAMES",
    "COLOR_MAP",
    "EVENT_TEMPLATES",
    "GCAL_MANAGER_CONFIG",
    "GCAL_MANAGER_LOG_FILE",
    "RUST_LOG",
];

pub fn load_env_file() -> io::Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            info!("Loaded environment from {:?}", path);
            Ok(())
        }
        Err(e) => {
            info!("No .env file found or error loading it: {}", e);
            create_env_template(Path::new(".env"))
        }
    }
}

/// Write an empty `.env` listing every variable the tool reads.
/// An existing file is never overwritten.
pub fn create_env_template(env_path: &Path) -> io::Result<()> {
    if env_path.exists() {
        return Ok(());
    }

    let mut file = File::create(env_path)?;
    for var in REQUIRED_ENV_VARS {
        writeln!(file, "{}=", var)?;
    }
    for var in OPTIONAL_ENV_VARS {
        writeln!(file, "# {}=", var)?;
    }
    info!("Created environment template at {}", env_path.display());
    Ok(())
}

/// Required variables that are unset or blank
pub fn missing_env_vars(lookup: impl Fn(&str) -> Option<String>) -> Vec<&'static str> {
    REQUIRED_ENV_VARS
        .iter()
        .copied()
        .filter(|var| lookup(var).map_or(true, |v| v.trim().is_empty()))
        .collect()
}

pub fn google_credentials_from_env(default_token_uri: &str) -> Result<GoogleCredentials> {
    google_credentials_from(|var| env::var(var).ok(), default_token_uri)
}

/// Read OAuth credentials, reporting every missing variable at once.
/// `GOOGLE_CALENDAR_TOKEN_URI` wins over `default_token_uri`.
pub fn google_credentials_from(
    lookup: impl Fn(&str) -> Option<String>,
    default_token_uri: &str,
) -> Result<GoogleCredentials> {
    let missing = missing_env_vars(&lookup);
    if !missing.is_empty() {
        bail!("Missing required environment variables: {}", missing.join(", "));
    }
    let get = |var: &str| lookup(var).unwrap_or_default().trim().to_string();
    let token_uri = lookup("GOOGLE_CALENDAR_TOKEN_URI")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default_token_uri.to_string());

    Ok(GoogleCredentials {
        client_id: get("GOOGLE_CALENDAR_CLIENT_ID"),
        client_secret: SecretString::from(get("GOOGLE_CALENDAR_CLIENT_SECRET")),
        access_token: SecretString::from(get("GOOGLE_CALENDAR_TOKEN")),
        refresh_token: SecretString::from(get("GOOGLE_CALENDAR_REFRESH_TOKEN")),
        token_uri,
    })
}
