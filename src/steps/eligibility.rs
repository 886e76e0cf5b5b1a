//! Eligibility check step

use super::StepContext;
use crate::state_machine::{IntakeRecord, NextStep, SessionState, StateDelta};

const MISSING_DATA_NOTE: &str = "The data needed for the evaluation is missing. Please make \
     sure your client and vehicle details are complete and confirmed.";

const CHECK_FAILED_NOTE: &str =
    "The eligibility evaluation could not be completed right now. Please try again.";

/// Ask the persistence service for a verdict on the confirmed pair
pub async fn check_eligibility(state: &SessionState, ctx: &StepContext<'_>) -> StateDelta {
    let ids = match (state.client.id, state.vehicle.id) {
        (Some(client_id), Some(vehicle_id))
            if state.client.is_complete() && state.vehicle.is_complete() =>
        {
            Some((client_id, vehicle_id))
        }
        _ => None,
    };
    let Some((client_id, vehicle_id)) = ids else {
        tracing::warn!(session_id = %ctx.session_id, "Eligibility requested without confirmed records");
        return StateDelta::default()
            .with_note(MISSING_DATA_NOTE)
            .with_next(NextStep::Fallback);
    };

    match ctx.backend.check_eligibility(client_id, vehicle_id).await {
        Ok(report) => {
            tracing::info!(
                session_id = %ctx.session_id,
                %client_id,
                %vehicle_id,
                eligible = report.is_eligible,
                "Eligibility evaluated"
            );
            let mut delta = StateDelta::default().with_note(report.message);
            delta.eligibility_notified = Some(true);
            delta
        }
        Err(e) => {
            tracing::warn!(session_id = %ctx.session_id, error = %e, "Eligibility check failed");
            StateDelta::default().with_note(CHECK_FAILED_NOTE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IntakeBackend, MemoryBackend};
    use crate::runtime::testing::{complete_client, complete_vehicle, MockLlmClient};
    use crate::steps::Confirmable;
    use chrono::NaiveDate;
    use std::sync::Arc;

    async fn run(state: &SessionState, backend: Arc<dyn IntakeBackend>) -> StateDelta {
        let llm = MockLlmClient::new("mock");
        let ctx = StepContext {
            session_id: "s1",
            llm: &llm,
            backend: &backend,
        };
        check_eligibility(state, &ctx).await
    }

    async fn saved_state(backend: &MemoryBackend) -> SessionState {
        let mut client = complete_client();
        client.id = None;
        let client = client.save((), backend).await.unwrap();
        let mut vehicle = complete_vehicle();
        vehicle.id = None;
        let vehicle = vehicle
            .save(client.id.unwrap(), backend)
            .await
            .unwrap();
        SessionState {
            client,
            vehicle,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_eligible_pair_is_notified() {
        let backend =
            Arc::new(MemoryBackend::new().with_today(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()));
        let state = saved_state(&backend).await;
        let delta = run(&state, backend).await;

        assert_eq!(delta.eligibility_notified, Some(true));
        assert!(delta.notes[0].starts_with("Congratulations"));
    }

    #[tokio::test]
    async fn test_missing_ids_fall_back() {
        let mut vehicle = complete_vehicle();
        vehicle.id = None;
        let state = SessionState {
            client: complete_client(),
            vehicle,
            ..Default::default()
        };
        let delta = run(&state, Arc::new(MemoryBackend::new())).await;
        assert_eq!(delta.next_step, Some(NextStep::Fallback));
        assert_eq!(delta.notes, vec![MISSING_DATA_NOTE.to_string()]);
        assert_eq!(delta.eligibility_notified, None);
    }

    #[tokio::test]
    async fn test_unknown_ids_surface_service_message() {
        let state = SessionState {
            client: complete_client(),
            vehicle: complete_vehicle(),
            ..Default::default()
        };
        let delta = run(&state, Arc::new(MemoryBackend::new())).await;
        assert_eq!(delta.eligibility_notified, Some(true));
        assert!(!delta.notes[0].is_empty());
    }
}
