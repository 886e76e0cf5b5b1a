//! Vehicle intake assistant
//!
//! A conversational agent that collects a client's personal details and
//! vehicle details, has the user confirm each record, persists them through
//! an external CRUD service and reports whether the client is eligible.

pub mod api;
pub mod backend;
pub mod config;
pub mod db;
pub mod llm;
pub mod runtime;
pub mod state_machine;
pub mod steps;
pub mod tools;
