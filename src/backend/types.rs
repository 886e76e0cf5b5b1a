//! Wire types of the persistence service

use crate::state_machine::{ClientRecord, DocumentType, VehicleRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::BackendError;

/// Client create/update body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPayload {
    pub name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub documento: String,
    pub documento_type: DocumentType,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl TryFrom<&ClientRecord> for ClientPayload {
    type Error = BackendError;

    fn try_from(record: &ClientRecord) -> Result<Self, Self::Error> {
        let mut missing = Vec::new();
        let mut need = |value: Option<String>, name: &str| {
            if value.is_none() {
                missing.push(name.to_string());
            }
            value.unwrap_or_default()
        };
        let name = need(record.name.clone(), "name");
        let last_name = need(record.last_name.clone(), "last_name");
        let documento = need(record.document_number.clone(), "document_number");
        let email = need(record.email.clone(), "email");
        if record.birth_date.is_none() {
            missing.push("birth_date".to_string());
        }
        if record.document_type.is_none() {
            missing.push("document_type".to_string());
        }

        match (record.birth_date, record.document_type) {
            (Some(birth_date), Some(documento_type)) if missing.is_empty() => Ok(Self {
                name,
                last_name,
                birth_date,
                documento,
                documento_type,
                email,
                phone_number: record.phone.clone(),
            }),
            _ => Err(BackendError::Incomplete(missing.join(", "))),
        }
    }
}

/// Client as stored by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredClient {
    pub id: Uuid,
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub documento: Option<String>,
    pub documento_type: Option<DocumentType>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub vehicles: Vec<StoredVehicle>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredClient {
    pub fn to_record(&self) -> ClientRecord {
        ClientRecord {
            id: Some(self.id),
            name: self.name.clone(),
            last_name: self.last_name.clone(),
            birth_date: self.birth_date,
            document_number: self.documento.clone(),
            document_type: self.documento_type,
            email: self.email.clone(),
            phone: self.phone_number.clone(),
        }
    }
}

/// Vehicle create/update body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehiclePayload {
    pub client_id: Uuid,
    pub license_plate: String,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub mileage: u32,
}

impl VehiclePayload {
    pub fn from_record(client_id: Uuid, record: &VehicleRecord) -> Result<Self, BackendError> {
        match (
            &record.license_plate,
            &record.brand,
            &record.model,
            record.year,
            record.mileage,
        ) {
            (Some(plate), Some(brand), Some(model), Some(year), Some(mileage)) => Ok(Self {
                client_id,
                license_plate: plate.clone(),
                brand: brand.clone(),
                model: model.clone(),
                year,
                mileage,
            }),
            _ => {
                let missing: Vec<&str> = [
                    ("license_plate", record.license_plate.is_none()),
                    ("brand", record.brand.is_none()),
                    ("model", record.model.is_none()),
                    ("year", record.year.is_none()),
                    ("mileage", record.mileage.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(BackendError::Incomplete(missing.join(", ")))
            }
        }
    }
}

/// Vehicle as stored by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVehicle {
    pub id: Uuid,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub license_plate: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub mileage: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredVehicle {
    pub fn to_record(&self) -> VehicleRecord {
        VehicleRecord {
            id: Some(self.id),
            license_plate: self.license_plate.clone(),
            brand: self.brand.clone(),
            model: self.model.clone(),
            year: self.year,
            mileage: self.mileage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityRequest {
    pub client_id: Uuid,
    pub vehicle_id: Uuid,
}

/// Verdict of the business rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub is_eligible: bool,
    pub message: String,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ClientRecord {
        ClientRecord {
            id: None,
            name: Some("Ana".into()),
            last_name: Some("Gomez".into()),
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 2),
            document_number: Some("30111222".into()),
            document_type: Some(DocumentType::Cuil),
            email: Some("ana@example.com".into()),
            phone: None,
        }
    }

    #[test]
    fn test_client_payload_wire_names() {
        let payload = ClientPayload::try_from(&client()).unwrap();
        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire["documento"], "30111222");
        assert_eq!(wire["documento_type"], "cuil");
        assert_eq!(wire["birth_date"], "1990-04-02");
        assert!(wire["phone_number"].is_null());
    }

    #[test]
    fn test_client_payload_reports_missing() {
        let mut record = client();
        record.email = None;
        record.document_type = None;
        let err = ClientPayload::try_from(&record).unwrap_err();
        let BackendError::Incomplete(fields) = err else {
            panic!("expected Incomplete");
        };
        assert_eq!(fields, "email, document_type");
    }

    #[test]
    fn test_vehicle_payload_needs_mileage() {
        let record = VehicleRecord {
            id: None,
            license_plate: Some("AB123CD".into()),
            brand: Some("Fiat".into()),
            model: Some("Cronos".into()),
            year: Some(2021),
            mileage: None,
        };
        let err = VehiclePayload::from_record(Uuid::new_v4(), &record).unwrap_err();
        assert!(matches!(err, BackendError::Incomplete(ref f) if f == "mileage"));
    }

    #[test]
    fn test_stored_client_decodes_service_response() {
        let id = Uuid::new_v4();
        let stored: StoredClient = serde_json::from_value(json!({
            "id": id,
            "name": "Ana",
            "last_name": "Gomez",
            "birth_date": "1990-04-02",
            "documento": "30111222",
            "documento_type": "dni",
            "email": "ana@example.com",
            "phone_number": null,
            "vehicles": [],
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        let record = stored.to_record();
        assert_eq!(record.id, Some(id));
        assert_eq!(record.document_type, Some(DocumentType::Dni));
        assert_eq!(record.phone, None);
    }
}
