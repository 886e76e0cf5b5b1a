//! The eligibility business rule

use super::types::{EligibilityReport, StoredClient, StoredVehicle};
use chrono::{Datelike, NaiveDate};

pub const MINIMUM_AGE: i32 = 18;
pub const MINIMUM_VEHICLE_YEAR: i32 = 2015;
pub const MILEAGE_LIMIT: u32 = 100_000;

/// Whole years between `birth` and `today`
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let had_birthday = (today.month(), today.day()) >= (birth.month(), birth.day());
    today.year() - birth.year() - i32::from(!had_birthday)
}

/// Eligible iff the client is an adult, the vehicle is recent and has low mileage
pub fn evaluate_eligibility(
    client: &StoredClient,
    vehicle: &StoredVehicle,
    today: NaiveDate,
) -> EligibilityReport {
    let mut reasons = Vec::new();

    match client.birth_date {
        Some(birth) => {
            let age = age_on(birth, today);
            if age < MINIMUM_AGE {
                reasons.push(format!(
                    "The client is under {MINIMUM_AGE} (current age: {age})."
                ));
            }
        }
        None => reasons.push("The client's date of birth is not on record.".to_string()),
    }

    match vehicle.year {
        Some(year) if year >= MINIMUM_VEHICLE_YEAR => {}
        Some(year) => reasons.push(format!(
            "The vehicle is from {year} (must be {MINIMUM_VEHICLE_YEAR} or newer)."
        )),
        None => reasons.push("The vehicle's year is not on record.".to_string()),
    }

    match vehicle.mileage {
        Some(km) if km < MILEAGE_LIMIT => {}
        Some(km) => reasons.push(format!(
            "The vehicle has {km} km (the limit is {MILEAGE_LIMIT} km)."
        )),
        None => reasons.push("The vehicle's mileage is not on record.".to_string()),
    }

    let name = client.name.as_deref().unwrap_or("there");
    let is_eligible = reasons.is_empty();
    let message = if is_eligible {
        format!("Congratulations, {name}! You are eligible for the product.")
    } else {
        format!("We're sorry, {name}. You do not meet the eligibility criteria.")
    };

    EligibilityReport {
        is_eligible,
        message,
        reasons,
    }
}

/// Report for ids the service does not know
pub fn not_found_report() -> EligibilityReport {
    EligibilityReport {
        is_eligible: false,
        message: "The specified client or vehicle could not be found.".to_string(),
        reasons: vec!["Client or vehicle not found.".to_string()],
    }
}
