pub mod assistant;
pub mod bootstrap;
pub mod calendar_service;
pub mod commands;
pub mod oauth;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;
