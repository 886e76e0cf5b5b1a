//! HTTP API over the turn entry point

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::runtime::{CheckpointStore, TurnRunner};
use std::sync::Arc;

/// Turn runner over whichever checkpoint store the binary picked
pub type SharedRunner = TurnRunner<Arc<dyn CheckpointStore>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<SharedRunner>,
}

impl AppState {
    pub fn new(runner: SharedRunner) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }
}
