//! Approval workflow.
//!
//! The state of a record (`Pending`, `Approved`, `Trashed`, rejected delete)
//! is never stored here: it is re-derived from a fresh backend fetch on every
//! action, so what the operator acts on is always the authoritative copy.
//! Remote failures never propagate past an action; they turn into a
//! human-readable thread message asking someone to escalate.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::action::{ActionKind, ActionToken, TokenError};
use crate::config;
use crate::forms::FormsService;
use crate::mail::{self, MailService};
use crate::maps::{self, MapService};
use crate::model::{self, DeleteRequestEntry, EntryStatus, WorkoutEntry};
use crate::render::{self, GeoDetails, ViewMetadata, EDIT_VIEW_CALLBACK_ID};
use crate::slack::blocks;
use crate::slack::SlackService;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("payload is missing required field '{0}'")]
    MalformedPayload(&'static str),
    #[error(transparent)]
    MalformedToken(#[from] TokenError),
    #[error("unexpected view callback id '{0}'")]
    UnknownView(String),
}

/// Everything an operator click gives us: who clicked, where the message
/// lives, and the blocks to rewrite on a terminal transition.
#[derive(Debug, Clone)]
struct ActionContext {
    user_id: String,
    user_name: String,
    channel: String,
    message_ts: String,
    action_ts: String,
    blocks: Vec<Value>,
    trigger_id: Option<String>,
}

pub struct Workflow {
    forms: Arc<dyn FormsService>,
    slack: Arc<dyn SlackService>,
    maps: Arc<dyn MapService>,
    mail: Arc<dyn MailService>,
    forms_cfg: config::Forms,
}

impl Workflow {
    pub fn new(
        forms: Arc<dyn FormsService>,
        slack: Arc<dyn SlackService>,
        maps: Arc<dyn MapService>,
        mail: Arc<dyn MailService>,
        forms_cfg: config::Forms,
    ) -> Self {
        Self {
            forms,
            slack,
            maps,
            mail,
            forms_cfg,
        }
    }

    /// Inbound workout submission webhook: render and post the notification.
    #[instrument(skip_all)]
    pub async fn handle_submission(&self, payload: &Value) -> Result<()> {
        let map = payload
            .as_object()
            .ok_or(WorkflowError::MalformedPayload("body"))?;
        let form_id = map
            .get("form_id")
            .and_then(Value::as_str)
            .ok_or(WorkflowError::MalformedPayload("form_id"))?;
        if form_id != self.forms_cfg.workout_form_id {
            warn!(
                form_id,
                expected = %self.forms_cfg.workout_form_id,
                "submission for a different form; will not process"
            );
            return Ok(());
        }

        let entry = WorkoutEntry::from_fields(map);
        let geo = self.geo_details(&entry).await;
        let msg = render::render_workout_message(&entry, &geo, &self.forms_cfg.base_url)
            .map_err(WorkflowError::from)?;
        self.slack
            .post_message(&msg.text, Some(&msg.blocks), None)
            .await?;
        info!(entry_id = %entry.id, "posted workout notification");
        Ok(())
    }

    /// Inbound delete-request webhook: render and post the notification.
    #[instrument(skip_all)]
    pub async fn handle_delete_request(&self, payload: &Value) -> Result<()> {
        let map = payload
            .as_object()
            .ok_or(WorkflowError::MalformedPayload("body"))?;
        let form_id = map
            .get("form_id")
            .and_then(Value::as_str)
            .ok_or(WorkflowError::MalformedPayload("form_id"))?;
        if form_id != self.forms_cfg.delete_form_id {
            warn!(
                form_id,
                expected = %self.forms_cfg.delete_form_id,
                "delete request for a different form; will not process"
            );
            return Ok(());
        }

        let entry = DeleteRequestEntry::from_fields(map);
        let msg = render::render_delete_message(
            &entry,
            &self.forms_cfg.base_url,
            &self.forms_cfg.workout_form_id,
        )
        .map_err(WorkflowError::from)?;
        self.slack
            .post_message(&msg.text, Some(&msg.blocks), None)
            .await?;
        info!(entry_id = %entry.id, "posted delete-request notification");
        Ok(())
    }

    /// Operator clicked a button: decode the token and run the transition.
    #[instrument(skip_all)]
    pub async fn handle_action(&self, payload: &Value) -> Result<()> {
        let raw = payload
            .pointer("/actions/0/value")
            .and_then(Value::as_str)
            .ok_or(WorkflowError::MalformedPayload("actions[0].value"))?;
        let token = ActionToken::decode(raw).map_err(WorkflowError::from)?;
        let ctx = self.action_context(payload).await?;
        info!(kind = %token.kind, entry_id = %token.entry_id, user = %ctx.user_name, "handling operator action");

        match token.kind {
            ActionKind::Approve => self.approve(&ctx, &token.entry_id).await,
            ActionKind::Refresh => self.refresh(&ctx, &token.entry_id).await,
            ActionKind::MarkComplete => self.mark_complete(&ctx).await,
            ActionKind::Delete => {
                let request_id = token.secondary_id.as_deref().ok_or(
                    WorkflowError::MalformedToken(TokenError::MissingSecondaryId(
                        ActionKind::Delete,
                    )),
                )?;
                self.delete(&ctx, &token.entry_id, request_id).await
            }
            ActionKind::RejectDelete => self.reject_delete(&ctx, &token.entry_id).await,
            ActionKind::Edit => self.edit(&ctx, &token.entry_id).await,
        }
    }

    /// Operator saved the edit modal: diff, persist what changed, re-render.
    #[instrument(skip_all)]
    pub async fn handle_view_submission(&self, payload: &Value) -> Result<()> {
        let callback_id = payload
            .pointer("/view/callback_id")
            .and_then(Value::as_str)
            .ok_or(WorkflowError::MalformedPayload("view.callback_id"))?;
        if callback_id != EDIT_VIEW_CALLBACK_ID {
            return Err(WorkflowError::UnknownView(callback_id.to_string()).into());
        }
        let metadata: ViewMetadata = payload
            .pointer("/view/private_metadata")
            .and_then(Value::as_str)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .ok_or(WorkflowError::MalformedPayload("view.private_metadata"))?;
        let edits = view_state_values(payload);

        let mut fields = match self.forms.fetch_entry(&metadata.entry_id).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(?err, entry_id = %metadata.entry_id, "could not fetch entry for edit submission");
                self.post_thread_at(
                    &metadata.ts,
                    "Map Request Edit Failed! The system could not load the entry. Call admin.",
                )
                .await;
                return Ok(());
            }
        };

        let changed = model::apply_edits(&mut fields, &edits);
        if changed == 0 {
            info!(entry_id = %metadata.entry_id, "edit submitted with no visible changes; skipping update");
        } else {
            let updated = match self.forms.update_entry(&metadata.entry_id, &fields).await {
                Ok(updated) => updated,
                Err(err) => {
                    warn!(?err, entry_id = %metadata.entry_id, "edit update call failed");
                    false
                }
            };
            if !updated {
                self.post_thread_at(
                    &metadata.ts,
                    "Map Request Edit Failed! The system could not save the changes. Call admin.",
                )
                .await;
                return Ok(());
            }
            info!(entry_id = %metadata.entry_id, changed, "entry updated from edit modal");
        }

        let entry = WorkoutEntry::from_fields(&fields);
        let geo = self.geo_details(&entry).await;
        let msg = render::render_workout_message(&entry, &geo, &self.forms_cfg.base_url)
            .map_err(WorkflowError::from)?;
        if let Err(err) = self
            .slack
            .update_message(&metadata.channel, &metadata.ts, &msg.text, &msg.blocks)
            .await
        {
            warn!(?err, "could not refresh message after edit");
        }
        Ok(())
    }

    /// Periodic trigger: nudge the channel when approvals are piling up.
    #[instrument(skip_all)]
    pub async fn check_unapproved(&self) -> Result<()> {
        let updates = self
            .forms
            .unapproved_count(&self.forms_cfg.workout_form_id)
            .await?;
        let deletes = self
            .forms
            .unapproved_count(&self.forms_cfg.delete_form_id)
            .await?;
        if updates == 0 && deletes == 0 {
            info!("no unapproved requests");
            return Ok(());
        }

        let mut parts = Vec::new();
        if updates > 0 {
            parts.push(format!("{updates} updates"));
        }
        if deletes > 0 {
            parts.push(format!("{deletes} deletes"));
        }
        let link = format!(
            "{}/wp-admin/admin.php?page=gf_entries&filter=gv_unapproved&id={}",
            self.forms_cfg.base_url, self.forms_cfg.workout_form_id
        );
        let text = format!(
            "<!channel>, there are unapproved requests: {}. <{link}|Link>",
            parts.join(", ")
        );
        self.slack.post_message(&text, None, None).await?;
        info!(updates, deletes, "sent unapproved counts to the channel");
        Ok(())
    }

    async fn approve(&self, ctx: &ActionContext, entry_id: &str) -> Result<()> {
        let mut fields = match self.forms.fetch_entry(entry_id).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(?err, entry_id, "could not fetch entry for approval");
                self.post_approval_failure(ctx).await;
                return Ok(());
            }
        };
        let entry = WorkoutEntry::from_fields(&fields);
        model::mark_approved(&mut fields);

        let updated = match self.forms.update_entry(entry_id, &fields).await {
            Ok(updated) => updated,
            Err(err) => {
                warn!(?err, entry_id, "approval update call failed");
                false
            }
        };
        if !updated {
            error!(entry_id, "could not approve entry");
            self.post_approval_failure(ctx).await;
            return Ok(());
        }

        let status = blocks::section(&format!(
            "Request approved by <@{}> at {}",
            ctx.user_id,
            format_click_ts(&ctx.action_ts)
        ));
        let confirmation = format!("Map Request approved by {}.", ctx.user_name);
        self.replace_buttons_with(ctx, status, &confirmation).await;
        self.post_thread(ctx, &confirmation).await;

        if entry.submitter_email.trim().is_empty() {
            warn!(entry_id, "entry has no submitter email; skipping approval notice");
        } else if let Err(err) = self
            .mail
            .send(
                "Map Request Approved",
                &[entry.submitter_email.clone()],
                &mail::approval_body(&entry, entry.submission_kind(), &self.forms_cfg.base_url),
            )
            .await
        {
            warn!(?err, entry_id, "could not send approval notice");
        }
        info!(entry_id, "entry approved, message updated, submitter notified");
        Ok(())
    }

    async fn refresh(&self, ctx: &ActionContext, entry_id: &str) -> Result<()> {
        let fields = match self.forms.fetch_entry(entry_id).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(?err, entry_id, "could not fetch entry for refresh");
                return Ok(());
            }
        };
        let entry = WorkoutEntry::from_fields(&fields);
        let geo = self.geo_details(&entry).await;
        let msg = render::render_workout_message(&entry, &geo, &self.forms_cfg.base_url)
            .map_err(WorkflowError::from)?;
        if let Err(err) = self
            .slack
            .update_message(&ctx.channel, &ctx.message_ts, &msg.text, &msg.blocks)
            .await
        {
            warn!(?err, entry_id, "could not refresh message");
        }
        Ok(())
    }

    /// Local-only transition: no backend calls, just retire the buttons.
    async fn mark_complete(&self, ctx: &ActionContext) -> Result<()> {
        let status = blocks::section(&format!(
            "Manually marked complete by <@{}> at {}",
            ctx.user_id,
            format_click_ts(&ctx.action_ts)
        ));
        self.replace_buttons_with(ctx, status, "Manually marked complete.")
            .await;
        Ok(())
    }

    async fn delete(&self, ctx: &ActionContext, workout_id: &str, request_id: &str) -> Result<()> {
        let fields = match self.forms.fetch_entry(workout_id).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(?err, workout_id, "could not fetch entry for deletion");
                self.post_deletion_failure(ctx).await;
                self.mark_request_processed(request_id).await;
                return Ok(());
            }
        };
        let entry = WorkoutEntry::from_fields(&fields);

        // Double clicks and duplicate deliveries land here; the transition
        // already happened, so no trash call and no email.
        if entry.status == EntryStatus::Trash {
            warn!(workout_id, "entry already trashed; no action will be taken");
            let status = blocks::section("Workout already deleted; nothing left to do.");
            self.replace_buttons_with(ctx, status, "Workout already deleted.")
                .await;
            return Ok(());
        }

        let trashed = match self.forms.trash_entry(workout_id).await {
            Ok(trashed) => trashed,
            Err(err) => {
                warn!(?err, workout_id, "trash call failed");
                false
            }
        };

        if trashed {
            let status = blocks::section(&format!(
                "Workout sent to trash by <@{}> at {}",
                ctx.user_id,
                format_click_ts(&ctx.action_ts)
            ));
            let confirmation = format!("Workout sent to trash by {}.", ctx.user_name);
            self.replace_buttons_with(ctx, status, &confirmation).await;
            self.post_thread(ctx, &confirmation).await;
        } else {
            error!(workout_id, "could not trash entry");
            self.post_deletion_failure(ctx).await;
        }

        // The delete-request record is marked processed either way, so the
        // pending queue does not keep resurfacing it.
        let request = self.mark_request_processed(request_id).await;
        if trashed {
            if let Some(request) = request {
                if request.submitter_email.trim().is_empty() {
                    warn!(request_id, "delete request has no submitter email; skipping notice");
                } else if let Err(err) = self
                    .mail
                    .send(
                        "Map Delete Request Processed",
                        &[request.submitter_email.clone()],
                        &mail::deletion_body(&request.workout_name, &request.region),
                    )
                    .await
                {
                    warn!(?err, request_id, "could not send deletion notice");
                }
            }
        }
        Ok(())
    }

    async fn reject_delete(&self, ctx: &ActionContext, request_id: &str) -> Result<()> {
        // Only the delete-request record is touched; the workout stays live.
        let request = match self.forms.fetch_entry(request_id).await {
            Ok(fields) => Some(DeleteRequestEntry::from_fields(&fields)),
            Err(err) => {
                warn!(?err, request_id, "could not fetch delete request before rejection");
                None
            }
        };

        let trashed = match self.forms.trash_entry(request_id).await {
            Ok(trashed) => trashed,
            Err(err) => {
                warn!(?err, request_id, "trash call for delete request failed");
                false
            }
        };
        if !trashed {
            error!(request_id, "could not reject delete request");
            self.post_thread(
                ctx,
                &format!(
                    "Workout delete rejection failed! {} tried to not send it to trash, the system failed. Call admin.",
                    ctx.user_name
                ),
            )
            .await;
            return Ok(());
        }

        let status = blocks::section(&format!(
            "Workout will not be trashed, according to <@{}> at {}",
            ctx.user_id,
            format_click_ts(&ctx.action_ts)
        ));
        let confirmation = format!(
            "Workout will not be sent to trash, according to {}.",
            ctx.user_name
        );
        self.replace_buttons_with(ctx, status, &confirmation).await;
        self.post_thread(ctx, &confirmation).await;

        if let Some(request) = request {
            if request.submitter_email.trim().is_empty() {
                warn!(request_id, "delete request has no submitter email; skipping notice");
            } else if let Err(err) = self
                .mail
                .send(
                    "Map Delete Request Declined",
                    &[request.submitter_email.clone()],
                    &mail::rejection_body(&request.workout_name, &request.region),
                )
                .await
            {
                warn!(?err, request_id, "could not send rejection notice");
            }
        }
        Ok(())
    }

    async fn edit(&self, ctx: &ActionContext, entry_id: &str) -> Result<()> {
        let trigger_id = ctx
            .trigger_id
            .as_deref()
            .ok_or(WorkflowError::MalformedPayload("trigger_id"))?;
        let fields = match self.forms.fetch_entry(entry_id).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(?err, entry_id, "could not fetch entry for editing");
                return Ok(());
            }
        };
        let entry = WorkoutEntry::from_fields(&fields);
        let metadata = ViewMetadata {
            entry_id: entry_id.to_string(),
            channel: ctx.channel.clone(),
            ts: ctx.message_ts.clone(),
        };
        let view = render::render_edit_modal(&entry, &metadata);
        if let Err(err) = self.slack.open_modal(trigger_id, &view).await {
            warn!(?err, entry_id, "could not open edit modal");
        }
        Ok(())
    }

    /// Mark a delete-request record approved+read so it leaves the pending
    /// queue. Returns the typed request when the fetch succeeded.
    async fn mark_request_processed(&self, request_id: &str) -> Option<DeleteRequestEntry> {
        let mut fields = match self.forms.fetch_entry(request_id).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(?err, request_id, "could not fetch delete request to mark processed");
                return None;
            }
        };
        let request = DeleteRequestEntry::from_fields(&fields);
        model::mark_approved(&mut fields);
        match self.forms.update_entry(request_id, &fields).await {
            Ok(true) => info!(request_id, "delete request marked processed"),
            Ok(false) => warn!(request_id, "could not mark delete request processed"),
            Err(err) => warn!(?err, request_id, "could not mark delete request processed"),
        }
        Some(request)
    }

    async fn geo_details(&self, entry: &WorkoutEntry) -> GeoDetails {
        let address = entry.street_address();

        // Submissions sometimes arrive without a pin; derive one from the
        // street address so the message still shows the derived facts.
        let (lat, lon) = if entry.latitude.trim().is_empty() || entry.longitude.trim().is_empty() {
            match self.maps.geocode(&address).await {
                Ok(Some((lat, lon))) => (lat.to_string(), lon.to_string()),
                Ok(None) => (entry.latitude.clone(), entry.longitude.clone()),
                Err(err) => {
                    warn!(?err, "could not geocode street address");
                    (entry.latitude.clone(), entry.longitude.clone())
                }
            }
        } else {
            (entry.latitude.clone(), entry.longitude.clone())
        };

        let address_at_pin = match self.maps.reverse_geocode(&lat, &lon).await {
            Ok(address) => address,
            Err(err) => {
                warn!(?err, "reverse geocode failed");
                maps::INVALID_LATLONG.to_string()
            }
        };
        let walking_distance = match self.maps.walking_distance(&address, &lat, &lon).await {
            Ok(distance) => distance,
            Err(err) => {
                warn!(?err, "walking distance lookup failed");
                maps::NO_WALKABLE_PATH.to_string()
            }
        };
        GeoDetails {
            address_at_pin,
            walking_distance,
            directions_url: maps::directions_url(&address, &format!("{lat},{lon}")),
        }
    }

    async fn action_context(&self, payload: &Value) -> Result<ActionContext, WorkflowError> {
        let user_id = payload
            .pointer("/user/id")
            .and_then(Value::as_str)
            .ok_or(WorkflowError::MalformedPayload("user.id"))?
            .to_string();
        let channel = payload
            .pointer("/container/channel_id")
            .or_else(|| payload.pointer("/channel/id"))
            .and_then(Value::as_str)
            .ok_or(WorkflowError::MalformedPayload("container.channel_id"))?
            .to_string();
        let message_ts = payload
            .pointer("/container/message_ts")
            .and_then(Value::as_str)
            .ok_or(WorkflowError::MalformedPayload("container.message_ts"))?
            .to_string();
        let action_ts = payload
            .pointer("/actions/0/action_ts")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let blocks = payload
            .pointer("/message/blocks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let trigger_id = payload
            .pointer("/trigger_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let user_name = match self.slack.display_name(&user_id).await {
            Ok(name) => name,
            Err(err) => {
                warn!(?err, user_id, "could not resolve display name");
                format!("<@{user_id}>")
            }
        };

        Ok(ActionContext {
            user_id,
            user_name,
            channel,
            message_ts,
            action_ts,
            blocks,
            trigger_id,
        })
    }

    /// Swap the buttons block of the original message for a status section.
    async fn replace_buttons_with(&self, ctx: &ActionContext, status: Value, text: &str) {
        let new_blocks = blocks::replace_buttons(&ctx.blocks, status);
        if let Err(err) = self
            .slack
            .update_message(&ctx.channel, &ctx.message_ts, text, &new_blocks)
            .await
        {
            warn!(?err, "could not update original message");
        }
    }

    async fn post_thread(&self, ctx: &ActionContext, text: &str) {
        self.post_thread_at(&ctx.message_ts, text).await;
    }

    async fn post_thread_at(&self, thread_ts: &str, text: &str) {
        if let Err(err) = self.slack.post_message(text, None, Some(thread_ts)).await {
            warn!(?err, "could not post thread message");
        }
    }

    async fn post_approval_failure(&self, ctx: &ActionContext) {
        self.post_thread(
            ctx,
            &format!(
                "Map Request Approval Failed! {} tried to approve it, the system failed. Call admin.",
                ctx.user_name
            ),
        )
        .await;
    }

    async fn post_deletion_failure(&self, ctx: &ActionContext) {
        self.post_thread(
            ctx,
            &format!(
                "Workout deletion failed! {} tried to send it to trash, the system failed. Call admin.",
                ctx.user_name
            ),
        )
        .await;
    }
}

/// Flatten `view.state.values` into logical-name -> submitted value. Inputs
/// use the same id for block and action, so the block id is the field name.
fn view_state_values(payload: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(values) = payload
        .pointer("/view/state/values")
        .and_then(Value::as_object)
    {
        for (block_id, inputs) in values {
            if let Some(input) = inputs.get(block_id.as_str()) {
                let value = input.get("value").and_then(Value::as_str).unwrap_or_default();
                out.insert(block_id.clone(), value.to_string());
            }
        }
    }
    out
}

/// Render the click timestamp (UTC epoch seconds with a fractional part)
/// for the status line.
fn format_click_ts(ts: &str) -> String {
    let seconds = ts.split('.').next().and_then(|s| s.parse::<i64>().ok());
    match seconds.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)) {
        Some(dt) => format!("{} UTC", dt.format("%Y-%m-%d %H:%M:%S")),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn click_ts_formats_epoch_seconds() {
        assert_eq!(format_click_ts("1714560000.000100"), "2024-05-01 10:40:00 UTC");
        assert_eq!(format_click_ts("not-a-ts"), "not-a-ts");
        assert_eq!(format_click_ts(""), "");
    }

    #[test]
    fn view_state_values_flatten_by_block_id() {
        let payload = json!({
            "view": {
                "state": {
                    "values": {
                        "region": { "region": { "type": "plain_text_input", "value": "Midtown" } },
                        "notes": { "notes": { "type": "plain_text_input", "value": null } }
                    }
                }
            }
        });
        let values = view_state_values(&payload);
        assert_eq!(values["region"], "Midtown");
        assert_eq!(values["notes"], "");
    }
}
