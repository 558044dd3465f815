//! External service integrations

pub mod calendar;
pub mod google;

pub use calendar::*;
pub use google::{GoogleCalendarService, GoogleCredentials};
