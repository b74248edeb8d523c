pub mod error;
pub mod intent;
pub mod models;
pub mod outcome;
pub mod time;
