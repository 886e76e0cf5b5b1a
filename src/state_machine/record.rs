//! Intake records and the field-level operations shared by both entities

use super::delta::StateDelta;
use super::state::{ConfirmationRequest, ConfirmedField, SessionState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Which record a step or confirmation request refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Vehicle,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::Vehicle => "vehicle",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identification document kinds accepted by the persistence service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Dni,
    Cuit,
    Cuil,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Dni => "DNI",
            DocumentType::Cuit => "CUIT",
            DocumentType::Cuil => "CUIL",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dni" => Ok(DocumentType::Dni),
            "cuit" => Ok(DocumentType::Cuit),
            "cuil" => Ok(DocumentType::Cuil),
            other => Err(FieldError::new(
                "document_type",
                format!("unknown document type '{other}'"),
            )),
        }
    }
}

/// A value extracted by the model could not be stored in a field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for {field}: {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A collectible field: stable key, human description, and the group it is asked with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub group: &'static str,
}

/// Shared behavior of the client and vehicle records.
///
/// Collection, confirmation and routing are written once against this trait.
pub trait IntakeRecord: Clone + Default + fmt::Debug + PartialEq + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Collectible (non-id) fields in the order they are asked for
    fn field_specs() -> &'static [FieldSpec];

    fn id(&self) -> Option<Uuid>;

    /// Display string of a field, `None` when the field is null
    fn field_value(&self, name: &str) -> Option<String>;

    /// Parse and store one extracted value
    fn set_field(&mut self, name: &str, value: &Value) -> Result<(), FieldError>;

    fn clear_field(&mut self, name: &str);

    /// All required fields, id included, are present
    fn is_complete(&self) -> bool;

    /// This entity's record inside a session snapshot
    fn select(state: &SessionState) -> &Self;

    /// Record a replacement of this entity's record in a delta
    fn store(self, delta: StateDelta) -> StateDelta;

    /// Collectible fields that are still null, in asking order
    fn missing_fields(&self) -> Vec<&'static FieldSpec> {
        Self::field_specs()
            .iter()
            .filter(|spec| self.field_value(spec.name).is_none())
            .collect()
    }

    /// Every collectible field is present; the record can be shown for confirmation
    fn ready_for_confirmation(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Merge model-extracted values without ever nulling a present field.
    ///
    /// Nulls and blank strings are skipped. Values that fail to parse are
    /// dropped and reported; the rest of the extraction still applies.
    fn merge_extracted(&mut self, extracted: &Map<String, Value>) -> Vec<FieldError> {
        let mut rejected = Vec::new();
        for spec in Self::field_specs() {
            let Some(value) = extracted.get(spec.name) else {
                continue;
            };
            if is_blank(value) {
                continue;
            }
            if let Err(e) = self.set_field(spec.name, value) {
                rejected.push(e);
            }
        }
        rejected
    }

    /// Build the confirmation request from all non-null, non-id fields
    fn confirmation_request(&self) -> ConfirmationRequest {
        let fields = Self::field_specs()
            .iter()
            .filter_map(|spec| {
                self.field_value(spec.name).map(|value| ConfirmedField {
                    field: spec.name.to_string(),
                    label: spec.description.to_string(),
                    value,
                })
            })
            .collect();
        ConfirmationRequest {
            entity: Self::KIND,
            fields,
        }
    }

    fn clear_fields<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.clear_field(name);
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn text_value(field: &str, value: &Value) -> Result<String, FieldError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(FieldError::new(field, format!("expected text, got {other}"))),
    }
}

fn integer_value(field: &str, value: &Value) -> Result<i64, FieldError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                #[allow(clippy::cast_possible_truncation)]
                n.as_f64().map(|f| f.round() as i64)
            })
            .ok_or_else(|| FieldError::new(field, format!("not an integer: {n}"))),
        Value::String(s) => {
            // Thousands separators are common in free text ("85.000 km")
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits
                .parse()
                .map_err(|_| FieldError::new(field, format!("not an integer: '{s}'")))
        }
        other => Err(FieldError::new(field, format!("expected a number, got {other}"))),
    }
}

fn date_value(field: &str, value: &Value) -> Result<NaiveDate, FieldError> {
    let raw = text_value(field, value)?;
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&raw, fmt).ok())
        .ok_or_else(|| FieldError::new(field, format!("unrecognized date '{raw}'")))
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub document_number: Option<String>,
    pub document_type: Option<DocumentType>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

const CLIENT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "name",
        description: "first name",
        group: "full name",
    },
    FieldSpec {
        name: "last_name",
        description: "last name",
        group: "full name",
    },
    FieldSpec {
        name: "document_number",
        description: "document number",
        group: "identification",
    },
    FieldSpec {
        name: "document_type",
        description: "document type (DNI, CUIT or CUIL)",
        group: "identification",
    },
    FieldSpec {
        name: "birth_date",
        description: "date of birth",
        group: "date of birth",
    },
    FieldSpec {
        name: "email",
        description: "email address",
        group: "email address",
    },
    FieldSpec {
        name: "phone",
        description: "phone number",
        group: "phone number",
    },
];

impl IntakeRecord for ClientRecord {
    const KIND: EntityKind = EntityKind::Client;

    fn field_specs() -> &'static [FieldSpec] {
        CLIENT_FIELDS
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn field_value(&self, name: &str) -> Option<String> {
        match name {
            "name" => self.name.clone(),
            "last_name" => self.last_name.clone(),
            "birth_date" => self.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            "document_number" => self.document_number.clone(),
            "document_type" => self.document_type.map(|t| t.to_string()),
            "email" => self.email.clone(),
            "phone" => self.phone.clone(),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: &Value) -> Result<(), FieldError> {
        match name {
            "name" => self.name = Some(text_value(name, value)?),
            "last_name" => self.last_name = Some(text_value(name, value)?),
            "birth_date" => self.birth_date = Some(date_value(name, value)?),
            "document_number" => self.document_number = Some(text_value(name, value)?),
            "document_type" => {
                self.document_type = Some(text_value(name, value)?.parse()?);
            }
            "email" => {
                let email = text_value(name, value)?;
                if !email.contains('@') {
                    return Err(FieldError::new(name, format!("'{email}' is not an email")));
                }
                self.email = Some(email);
            }
            "phone" => self.phone = Some(text_value(name, value)?),
            other => return Err(FieldError::new(other, "unknown client field")),
        }
        Ok(())
    }

    fn clear_field(&mut self, name: &str) {
        match name {
            "name" => self.name = None,
            "last_name" => self.last_name = None,
            "birth_date" => self.birth_date = None,
            "document_number" => self.document_number = None,
            "document_type" => self.document_type = None,
            "email" => self.email = None,
            "phone" => self.phone = None,
            _ => {}
        }
    }

    fn is_complete(&self) -> bool {
        self.id.is_some() && self.ready_for_confirmation()
    }

    fn select(state: &SessionState) -> &Self {
        &state.client
    }

    fn store(self, delta: StateDelta) -> StateDelta {
        delta.with_client(self)
    }
}

impl ClientRecord {
    /// Name to address the user by; only known once the record is persisted
    pub fn display_name(&self) -> Option<&str> {
        match (&self.id, &self.name) {
            (Some(_), Some(name)) => Some(name.as_str()),
            _ => None,
        }
    }
}

// ============================================================================
// Vehicle
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub id: Option<Uuid>,
    pub license_plate: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub mileage: Option<u32>,
}

const VEHICLE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "license_plate",
        description: "license plate",
        group: "license plate",
    },
    FieldSpec {
        name: "brand",
        description: "brand",
        group: "brand",
    },
    FieldSpec {
        name: "model",
        description: "model",
        group: "model",
    },
    FieldSpec {
        name: "year",
        description: "year",
        group: "year",
    },
    FieldSpec {
        name: "mileage",
        description: "mileage (km)",
        group: "mileage",
    },
];

const MIN_VEHICLE_YEAR: i64 = 1886;
const MAX_VEHICLE_YEAR: i64 = 2100;

impl IntakeRecord for VehicleRecord {
    const KIND: EntityKind = EntityKind::Vehicle;

    fn field_specs() -> &'static [FieldSpec] {
        VEHICLE_FIELDS
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn field_value(&self, name: &str) -> Option<String> {
        match name {
            "license_plate" => self.license_plate.clone(),
            "brand" => self.brand.clone(),
            "model" => self.model.clone(),
            "year" => self.year.map(|y| y.to_string()),
            "mileage" => self.mileage.map(|m| m.to_string()),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: &Value) -> Result<(), FieldError> {
        match name {
            "license_plate" => {
                self.license_plate = Some(text_value(name, value)?.to_uppercase());
            }
            "brand" => self.brand = Some(text_value(name, value)?),
            "model" => self.model = Some(text_value(name, value)?),
            "year" => {
                let year = integer_value(name, value)?;
                if !(MIN_VEHICLE_YEAR..=MAX_VEHICLE_YEAR).contains(&year) {
                    return Err(FieldError::new(name, format!("implausible year {year}")));
                }
                self.year = i32::try_from(year).ok();
            }
            "mileage" => {
                let mileage = integer_value(name, value)?;
                self.mileage = Some(u32::try_from(mileage).map_err(|_| {
                    FieldError::new(name, format!("mileage out of range: {mileage}"))
                })?);
            }
            other => return Err(FieldError::new(other, "unknown vehicle field")),
        }
        Ok(())
    }

    fn clear_field(&mut self, name: &str) {
        match name {
            "license_plate" => self.license_plate = None,
            "brand" => self.brand = None,
            "model" => self.model = None,
            "year" => self.year = None,
            "mileage" => self.mileage = None,
            _ => {}
        }
    }

    /// Mileage is collected and persisted but deliberately not required here
    fn is_complete(&self) -> bool {
        self.id.is_some()
            && self.license_plate.is_some()
            && self.brand.is_some()
            && self.model.is_some()
            && self.year.is_some()
    }

    fn select(state: &SessionState) -> &Self {
        &state.vehicle
    }

    fn store(self, delta: StateDelta) -> StateDelta {
        delta.with_vehicle(self)
    }
}
