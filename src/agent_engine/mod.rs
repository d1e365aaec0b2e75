pub mod engine;
pub mod history;
pub mod integration;
pub mod loop_control;
pub mod prompt;
pub mod state;
pub mod task;
pub mod verifier;

#[cfg(test)]
pub(crate) mod mock;
