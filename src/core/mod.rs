pub mod config;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod orchestrator;
pub mod production;
pub mod stage;
pub mod terminal;

#[cfg(test)]
pub mod testing;
