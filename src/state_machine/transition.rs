//! Pure node transition function
//!
//! A turn always runs router, then exactly one step, then response
//! generation. The step is whatever the router left in `next_step`.

use super::state::{NextStep, SessionState};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A node of the per-turn graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Router,
    CollectClient,
    ConfirmClient,
    CollectVehicle,
    ConfirmVehicle,
    CheckEligibility,
    Fallback,
    GenerateResponse,
    End,
}

impl Node {
    pub fn is_terminal(self) -> bool {
        matches!(self, Node::End)
    }
}

impl From<NextStep> for Node {
    fn from(step: NextStep) -> Self {
        match step {
            NextStep::CollectClientData => Node::CollectClient,
            NextStep::ConfirmClientData => Node::ConfirmClient,
            NextStep::CollectVehicleData => Node::CollectVehicle,
            NextStep::ConfirmVehicleData => Node::ConfirmVehicle,
            NextStep::CheckEligibility => Node::CheckEligibility,
            NextStep::GenerateResponse => Node::GenerateResponse,
            NextStep::Fallback => Node::Fallback,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Node::Router => "router",
            Node::CollectClient => "collect_client",
            Node::ConfirmClient => "confirm_client",
            Node::CollectVehicle => "collect_vehicle",
            Node::ConfirmVehicle => "confirm_vehicle",
            Node::CheckEligibility => "check_eligibility",
            Node::Fallback => "fallback",
            Node::GenerateResponse => "generate_response",
            Node::End => "end",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No transition out of terminal node")]
    Terminal,
}

/// Node that runs after `node`, given the state it produced
pub fn transition(node: Node, state: &SessionState) -> Result<Node, TransitionError> {
    match node {
        Node::Router => Ok(Node::from(state.next_step)),
        Node::CollectClient
        | Node::ConfirmClient
        | Node::CollectVehicle
        | Node::ConfirmVehicle
        | Node::CheckEligibility
        | Node::Fallback => Ok(Node::GenerateResponse),
        Node::GenerateResponse => Ok(Node::End),
        Node::End => Err(TransitionError::Terminal),
    }
}
