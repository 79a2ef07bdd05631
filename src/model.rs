//! Typed views over remote form entries.
//!
//! The forms backend addresses entry values by numeric field keys (`"21"`,
//! `"1.1"`, ...). Those keys are an artifact of the form definitions, so this
//! module is the only place they appear: everything else works with the typed
//! structs or logical field names.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

/// Raw entry body as the backend returns it: field key -> value.
pub type FieldMap = Map<String, Value>;

/// Numeric field keys of the workout form.
mod workout_keys {
    pub const REGION: &str = "21";
    pub const WORKOUT_NAME: &str = "2";
    pub const STREET_1: &str = "1.1";
    pub const STREET_2: &str = "1.2";
    pub const CITY: &str = "1.3";
    pub const STATE: &str = "1.4";
    pub const ZIP_CODE: &str = "1.5";
    pub const COUNTRY: &str = "1.6";
    pub const LATITUDE: &str = "13";
    pub const LONGITUDE: &str = "12";
    pub const WEEKDAY: &str = "14";
    pub const TIME: &str = "4";
    pub const WORKOUT_TYPE: &str = "5";
    pub const WEBSITE: &str = "17";
    pub const LOGO: &str = "16";
    pub const NOTES: &str = "15";
    pub const SUBMITTER_NAME: &str = "18";
    pub const SUBMITTER_EMAIL: &str = "19";
}

/// Numeric field keys of the delete-request form.
mod delete_keys {
    pub const REGION: &str = "7";
    pub const WORKOUT_NAME: &str = "1";
    pub const REASON: &str = "5";
    pub const SUBMITTER_NAME: &str = "4";
    pub const SUBMITTER_EMAIL: &str = "3";
    pub const WORKOUT_ENTRY_ID: &str = "6";
}

/// Fields an operator may change through the edit modal:
/// `(logical name, label, field key)`.
const EDITABLE_FIELDS: &[(&str, &str, &str)] = &[
    ("region", "Region", workout_keys::REGION),
    ("workout_name", "Workout Name", workout_keys::WORKOUT_NAME),
    ("street_1", "Street 1", workout_keys::STREET_1),
    ("street_2", "Street 2", workout_keys::STREET_2),
    ("city", "City", workout_keys::CITY),
    ("state", "State", workout_keys::STATE),
    ("zip_code", "ZIP Code", workout_keys::ZIP_CODE),
    ("country", "Country", workout_keys::COUNTRY),
    ("latitude", "Latitude", workout_keys::LATITUDE),
    ("longitude", "Longitude", workout_keys::LONGITUDE),
    ("weekday", "Weekday", workout_keys::WEEKDAY),
    ("time", "Time", workout_keys::TIME),
    ("workout_type", "Type", workout_keys::WORKOUT_TYPE),
    ("website", "Region Website", workout_keys::WEBSITE),
    ("logo", "Region Logo", workout_keys::LOGO),
    ("notes", "Notes", workout_keys::NOTES),
    ("submitter_name", "Submitter", workout_keys::SUBMITTER_NAME),
    ("submitter_email", "Submitter Email", workout_keys::SUBMITTER_EMAIL),
];

fn field(map: &FieldMap, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Lifecycle status the backend keeps per entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryStatus {
    #[default]
    Active,
    Trash,
}

impl EntryStatus {
    fn parse(s: &str) -> Self {
        if s == "trash" {
            EntryStatus::Trash
        } else {
            EntryStatus::Active
        }
    }
}

/// New submission or an update to an existing workout, inferred from the
/// backend timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    New,
    Update,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::New => "New",
            SubmissionKind::Update => "Update",
        }
    }
}

/// One workout map entry, fetched fresh from the backend per operation and
/// never cached across requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkoutEntry {
    pub id: String,
    pub form_id: String,
    pub region: String,
    pub workout_name: String,
    pub street_1: String,
    pub street_2: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub latitude: String,
    pub longitude: String,
    pub weekday: String,
    pub time: String,
    pub workout_type: String,
    pub website: String,
    pub logo: String,
    pub notes: String,
    pub submitter_name: String,
    pub submitter_email: String,
    pub is_approved: bool,
    pub is_read: bool,
    pub status: EntryStatus,
    pub date_created: String,
    pub date_updated: String,
}

impl WorkoutEntry {
    pub fn from_fields(map: &FieldMap) -> Self {
        Self {
            id: field(map, "id"),
            form_id: field(map, "form_id"),
            region: field(map, workout_keys::REGION),
            workout_name: field(map, workout_keys::WORKOUT_NAME),
            street_1: field(map, workout_keys::STREET_1),
            street_2: field(map, workout_keys::STREET_2),
            city: field(map, workout_keys::CITY),
            state: field(map, workout_keys::STATE),
            zip_code: field(map, workout_keys::ZIP_CODE),
            country: field(map, workout_keys::COUNTRY),
            latitude: field(map, workout_keys::LATITUDE),
            longitude: field(map, workout_keys::LONGITUDE),
            weekday: field(map, workout_keys::WEEKDAY),
            time: field(map, workout_keys::TIME),
            workout_type: field(map, workout_keys::WORKOUT_TYPE),
            website: field(map, workout_keys::WEBSITE),
            logo: field(map, workout_keys::LOGO),
            notes: field(map, workout_keys::NOTES),
            submitter_name: field(map, workout_keys::SUBMITTER_NAME),
            submitter_email: field(map, workout_keys::SUBMITTER_EMAIL),
            is_approved: field(map, "is_approved") == "1",
            is_read: field(map, "is_read") == "1",
            status: EntryStatus::parse(&field(map, "status")),
            date_created: field(map, "date_created"),
            date_updated: field(map, "date_updated"),
        }
    }

    pub fn submission_kind(&self) -> SubmissionKind {
        if self.date_created == self.date_updated {
            SubmissionKind::New
        } else {
            SubmissionKind::Update
        }
    }

    /// Street address as a single line, for geocoding and directions.
    pub fn street_address(&self) -> String {
        [
            self.street_1.as_str(),
            self.street_2.as_str(),
            self.city.as_str(),
            self.state.as_str(),
            self.zip_code.as_str(),
            self.country.as_str(),
        ]
        .iter()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
    }

    /// Current values of the editable fields, in modal display order.
    pub fn editable_values(&self) -> Vec<(&'static str, &'static str, String)> {
        EDITABLE_FIELDS
            .iter()
            .map(|(name, label, key)| (*name, *label, field_of(self, key)))
            .collect()
    }
}

fn field_of(entry: &WorkoutEntry, key: &str) -> String {
    match key {
        workout_keys::REGION => entry.region.clone(),
        workout_keys::WORKOUT_NAME => entry.workout_name.clone(),
        workout_keys::STREET_1 => entry.street_1.clone(),
        workout_keys::STREET_2 => entry.street_2.clone(),
        workout_keys::CITY => entry.city.clone(),
        workout_keys::STATE => entry.state.clone(),
        workout_keys::ZIP_CODE => entry.zip_code.clone(),
        workout_keys::COUNTRY => entry.country.clone(),
        workout_keys::LATITUDE => entry.latitude.clone(),
        workout_keys::LONGITUDE => entry.longitude.clone(),
        workout_keys::WEEKDAY => entry.weekday.clone(),
        workout_keys::TIME => entry.time.clone(),
        workout_keys::WORKOUT_TYPE => entry.workout_type.clone(),
        workout_keys::WEBSITE => entry.website.clone(),
        workout_keys::LOGO => entry.logo.clone(),
        workout_keys::NOTES => entry.notes.clone(),
        workout_keys::SUBMITTER_NAME => entry.submitter_name.clone(),
        workout_keys::SUBMITTER_EMAIL => entry.submitter_email.clone(),
        _ => String::new(),
    }
}

/// Flag an entry as approved and read, ahead of an update call.
pub fn mark_approved(map: &mut FieldMap) {
    map.insert("is_approved".to_string(), Value::String("1".to_string()));
    map.insert("is_read".to_string(), Value::String("1".to_string()));
}

/// Merge edits keyed by logical field name into the raw entry body.
/// Returns how many fields actually changed; unchanged values are not
/// written, so a no-op edit leads to zero update calls upstream.
pub fn apply_edits(map: &mut FieldMap, edits: &std::collections::HashMap<String, String>) -> usize {
    let mut changed = 0;
    for (name, _, key) in EDITABLE_FIELDS {
        if let Some(new_value) = edits.get(*name) {
            if field(map, key) != *new_value {
                map.insert(key.to_string(), Value::String(new_value.clone()));
                changed += 1;
            }
        }
    }
    changed
}

/// One delete request referencing the workout entry it wants removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteRequestEntry {
    pub id: String,
    pub form_id: String,
    pub region: String,
    pub workout_name: String,
    pub reason: String,
    pub submitter_name: String,
    pub submitter_email: String,
    pub workout_entry_id: String,
}

impl DeleteRequestEntry {
    pub fn from_fields(map: &FieldMap) -> Self {
        Self {
            id: field(map, "id"),
            form_id: field(map, "form_id"),
            region: field(map, delete_keys::REGION),
            workout_name: field(map, delete_keys::WORKOUT_NAME),
            reason: field(map, delete_keys::REASON),
            submitter_name: field(map, delete_keys::SUBMITTER_NAME),
            submitter_email: field(map, delete_keys::SUBMITTER_EMAIL),
            workout_entry_id: field(map, delete_keys::WORKOUT_ENTRY_ID),
        }
    }
}

/// Render a backend timestamp (UTC, `YYYY-MM-DD HH:MM:SS`) for operators.
/// The backend uses an all-zero date for entries predating its own history.
pub fn prettify_backend_date(date: &str) -> String {
    if date == "0000-00-00 00:00:00" {
        return "a long time ago".to_string();
    }
    match NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S") {
        Ok(dt) => format!("{} UTC", dt.format("%Y-%m-%d %H:%M:%S")),
        Err(_) => date.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn sample_workout_fields() -> FieldMap {
        let value = json!({
            "id": "55",
            "form_id": "2",
            "21": "Midtown",
            "2": "The Forge",
            "1.1": "100 Main St",
            "1.2": "",
            "1.3": "Springfield",
            "1.4": "VA",
            "1.5": "22150",
            "1.6": "United States",
            "13": "38.7775",
            "12": "-77.1836",
            "14": "Saturday",
            "4": "06:00",
            "5": "Bootcamp",
            "17": "https://example.org/midtown",
            "16": "https://example.org/midtown/logo.png",
            "15": "Meet at the flagpole",
            "18": "Sparky",
            "19": "sparky@example.org",
            "is_approved": "0",
            "is_read": "0",
            "status": "active",
            "date_created": "2024-05-01 10:00:00",
            "date_updated": "2024-05-01 10:00:00",
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn workout_entry_maps_numeric_keys() {
        let entry = WorkoutEntry::from_fields(&sample_workout_fields());
        assert_eq!(entry.id, "55");
        assert_eq!(entry.region, "Midtown");
        assert_eq!(entry.street_1, "100 Main St");
        assert_eq!(entry.zip_code, "22150");
        assert_eq!(entry.submitter_email, "sparky@example.org");
        assert_eq!(entry.status, EntryStatus::Active);
        assert!(!entry.is_approved);
    }

    #[test]
    fn submission_kind_from_timestamps() {
        let mut fields = sample_workout_fields();
        let entry = WorkoutEntry::from_fields(&fields);
        assert_eq!(entry.submission_kind(), SubmissionKind::New);

        fields.insert(
            "date_updated".to_string(),
            Value::String("2024-05-02 08:00:00".to_string()),
        );
        let entry = WorkoutEntry::from_fields(&fields);
        assert_eq!(entry.submission_kind(), SubmissionKind::Update);
    }

    #[test]
    fn trashed_status_parses() {
        let mut fields = sample_workout_fields();
        fields.insert("status".to_string(), Value::String("trash".to_string()));
        let entry = WorkoutEntry::from_fields(&fields);
        assert_eq!(entry.status, EntryStatus::Trash);
    }

    #[test]
    fn mark_approved_sets_both_flags() {
        let mut fields = sample_workout_fields();
        mark_approved(&mut fields);
        assert_eq!(fields["is_approved"], "1");
        assert_eq!(fields["is_read"], "1");
    }

    #[test]
    fn apply_edits_counts_only_real_changes() {
        let mut fields = sample_workout_fields();
        let mut edits = HashMap::new();
        edits.insert("region".to_string(), "Midtown".to_string());
        edits.insert("notes".to_string(), "Meet at the flagpole".to_string());
        assert_eq!(apply_edits(&mut fields, &edits), 0);

        edits.insert("notes".to_string(), "Meet at the shovel flag".to_string());
        assert_eq!(apply_edits(&mut fields, &edits), 1);
        assert_eq!(fields["15"], "Meet at the shovel flag");
    }

    #[test]
    fn edited_email_lands_on_the_email_key() {
        let mut fields = sample_workout_fields();
        let mut edits = HashMap::new();
        edits.insert("submitter_email".to_string(), "new@example.org".to_string());
        assert_eq!(apply_edits(&mut fields, &edits), 1);
        assert_eq!(fields["19"], "new@example.org");
        // the neighboring submitter-name key is untouched
        assert_eq!(fields["18"], "Sparky");
    }

    #[test]
    fn delete_request_maps_its_own_keys() {
        let value = json!({
            "id": "77",
            "form_id": "5",
            "7": "Midtown",
            "1": "The Forge",
            "5": "Workout moved locations",
            "4": "Sparky",
            "3": "sparky@example.org",
            "6": "55",
        });
        let map = match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let entry = DeleteRequestEntry::from_fields(&map);
        assert_eq!(entry.id, "77");
        assert_eq!(entry.workout_entry_id, "55");
        assert_eq!(entry.reason, "Workout moved locations");
    }

    #[test]
    fn street_address_skips_blank_parts() {
        let entry = WorkoutEntry::from_fields(&sample_workout_fields());
        assert_eq!(
            entry.street_address(),
            "100 Main St, Springfield, VA, 22150, United States"
        );
    }

    #[test]
    fn backend_dates_prettify() {
        assert_eq!(
            prettify_backend_date("2024-05-01 10:00:00"),
            "2024-05-01 10:00:00 UTC"
        );
        assert_eq!(
            prettify_backend_date("0000-00-00 00:00:00"),
            "a long time ago"
        );
        assert_eq!(prettify_backend_date("not a date"), "not a date");
    }
}
