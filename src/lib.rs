use crate::modules::session::orchestrator::ChatOrchestrator;
use crate::services::completion::CompletionClient;

pub mod config;
pub mod modules;
pub mod services;

#[derive(Clone)]
pub struct AppState {
    pub completion: CompletionClient,
    pub orchestrator: ChatOrchestrator,
}
