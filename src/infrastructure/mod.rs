pub mod config;
pub mod credential_store;
pub mod error;
pub mod event_mapper;
pub mod gemini_client;
pub mod google_calendar_client;
pub mod logging;
pub mod oauth_client;
pub mod outcome_journal;
pub mod storage;
