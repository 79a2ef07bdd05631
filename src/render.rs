//! Notification renderer.
//!
//! Pure functions from typed entries to chat payloads. Geo details are
//! computed by the workflow (they need the mapping gateway) and passed in,
//! so everything here stays deterministic and directly testable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{ActionKind, ActionToken, TokenError};
use crate::model::{prettify_backend_date, DeleteRequestEntry, WorkoutEntry};
use crate::slack::blocks::{self, ButtonStyle};

/// Callback id of the edit modal, echoed back in view submissions.
pub const EDIT_VIEW_CALLBACK_ID: &str = "edit_workout";

/// Fallback text plus the Block Kit payload of one notification.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub text: String,
    pub blocks: Vec<Value>,
}

/// Derived location facts rendered alongside the submitted fields.
#[derive(Debug, Clone, Default)]
pub struct GeoDetails {
    pub address_at_pin: String,
    pub walking_distance: String,
    pub directions_url: String,
}

/// State a modal must carry to edit the message it was opened from.
/// Round-trips through the view's `private_metadata` string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewMetadata {
    pub entry_id: String,
    pub channel: String,
    pub ts: String,
}

fn unapproved_link(base_url: &str, form_id: &str) -> String {
    format!("{base_url}/wp-admin/admin.php?page=gf_entries&filter=gv_unapproved&id={form_id}")
}

fn entry_link(base_url: &str, form_id: &str, entry_id: &str) -> String {
    format!("{base_url}/wp-admin/admin.php?page=gf_entries&view=entry&id={form_id}&lid={entry_id}")
}

fn labeled(label: &str, value: &str) -> String {
    format!("*{label}:* {}", blocks::escape_mrkdwn(value))
}

/// Channel notification for a new or updated workout submission.
pub fn render_workout_message(
    entry: &WorkoutEntry,
    geo: &GeoDetails,
    base_url: &str,
) -> Result<RenderedMessage, TokenError> {
    let kind = entry.submission_kind();

    let fields = [
        labeled("Region", &entry.region),
        labeled("Workout Name", &entry.workout_name),
        String::new(),
        labeled("Street 1", &entry.street_1),
        labeled("Street 2", &entry.street_2),
        labeled("City", &entry.city),
        labeled("State", &entry.state),
        labeled("ZIP Code", &entry.zip_code),
        labeled("Country", &entry.country),
        String::new(),
        labeled("Latitude", &entry.latitude),
        labeled("Longitude", &entry.longitude),
        String::new(),
        labeled("Weekday", &entry.weekday),
        labeled("Time", &entry.time),
        labeled("Type", &entry.workout_type),
        String::new(),
        labeled("Region Website", &entry.website),
        labeled("Region Logo", &entry.logo),
        String::new(),
        labeled("Notes", &entry.notes),
        String::new(),
        labeled("Submitter", &entry.submitter_name),
        labeled("Submitter Email", &entry.submitter_email),
        labeled(
            "Original Submission",
            &prettify_backend_date(&entry.date_created),
        ),
    ]
    .join("\n");

    let geo_section = format!(
        "*Address at pin:* {}\n*Walking distance from street address:* {}\n<{}|Directions between address and pin>",
        blocks::escape_mrkdwn(&geo.address_at_pin),
        blocks::escape_mrkdwn(&geo.walking_distance),
        geo.directions_url,
    );

    let links = format!(
        "Helpful links: <{}|All unapproved requests>, <{}|This request>",
        unapproved_link(base_url, &entry.form_id),
        entry_link(base_url, &entry.form_id, &entry.id),
    );

    let buttons = vec![
        blocks::button(
            "Approve",
            ButtonStyle::Primary,
            &ActionToken::new(ActionKind::Approve, &entry.id).encode()?,
            false,
        ),
        blocks::button(
            "Edit",
            ButtonStyle::Default,
            &ActionToken::new(ActionKind::Edit, &entry.id).encode()?,
            false,
        ),
        blocks::button(
            "Refresh",
            ButtonStyle::Default,
            &ActionToken::new(ActionKind::Refresh, &entry.id).encode()?,
            false,
        ),
        blocks::button(
            "Mark Complete",
            ButtonStyle::Default,
            &ActionToken::new(ActionKind::MarkComplete, &entry.id).encode()?,
            false,
        ),
    ];

    Ok(RenderedMessage {
        text: format!("Map Request from {}", entry.region),
        blocks: vec![
            blocks::header(&format!("Map Request: {}", kind.as_str())),
            blocks::section(&fields),
            blocks::section(&geo_section),
            blocks::section(&links),
            blocks::divider(),
            blocks::actions(buttons),
        ],
    })
}

/// Channel notification for a delete request.
pub fn render_delete_message(
    entry: &DeleteRequestEntry,
    base_url: &str,
    workout_form_id: &str,
) -> Result<RenderedMessage, TokenError> {
    let fields = [
        labeled("Region", &entry.region),
        labeled("Workout Name", &entry.workout_name),
        String::new(),
        labeled("Reason", &entry.reason),
        String::new(),
        labeled("Submitter", &entry.submitter_name),
        labeled("Submitter Email", &entry.submitter_email),
    ]
    .join("\n");

    let links = format!(
        "Helpful links: <{}|Workout entry>",
        entry_link(base_url, workout_form_id, &entry.workout_entry_id),
    );

    let buttons = vec![
        blocks::button(
            "Delete (trash)",
            ButtonStyle::Danger,
            &ActionToken::with_secondary(ActionKind::Delete, &entry.workout_entry_id, &entry.id)
                .encode()?,
            true,
        ),
        blocks::button(
            "Reject Delete Request",
            ButtonStyle::Default,
            &ActionToken::new(ActionKind::RejectDelete, &entry.id).encode()?,
            false,
        ),
    ];

    Ok(RenderedMessage {
        text: format!("Map Delete Request from {}", entry.region),
        blocks: vec![
            blocks::header("Map Request: Delete"),
            blocks::section(&fields),
            blocks::section(&links),
            blocks::divider(),
            blocks::actions(buttons),
        ],
    })
}

/// Modal prefilled with the entry's current field values. Slack caps the
/// title and button texts at 24 characters.
pub fn render_edit_modal(entry: &WorkoutEntry, metadata: &ViewMetadata) -> Value {
    let inputs: Vec<Value> = entry
        .editable_values()
        .into_iter()
        .map(|(name, label, value)| blocks::input(name, label, &value, name == "notes"))
        .collect();

    serde_json::json!({
        "type": "modal",
        "callback_id": EDIT_VIEW_CALLBACK_ID,
        "title": { "type": "plain_text", "text": "Edit Map Request" },
        "submit": { "type": "plain_text", "text": "Save" },
        "close": { "type": "plain_text", "text": "Cancel" },
        "notify_on_close": false,
        "private_metadata": serde_json::to_string(metadata).expect("metadata serializes"),
        "blocks": inputs,
    })
}
