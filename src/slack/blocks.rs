//! Block Kit builders.
//!
//! Pure functions producing the JSON fragments the Slack Web API expects.
//! The actions block always carries `block_id == "buttons"` so a terminal
//! workflow transition can find and replace it with a status section.

use serde_json::{json, Value};

/// Block id of the actions block holding the approval buttons.
pub const BUTTONS_BLOCK_ID: &str = "buttons";

/// Changes the color of a button. Default is gray, Primary is green,
/// Danger is red.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Default,
    Primary,
    Danger,
}

impl ButtonStyle {
    fn as_str(&self) -> &'static str {
        match self {
            ButtonStyle::Default => "default",
            ButtonStyle::Primary => "primary",
            ButtonStyle::Danger => "danger",
        }
    }
}

pub fn header(text: &str) -> Value {
    json!({
        "type": "header",
        "text": { "type": "plain_text", "text": text }
    })
}

pub fn section(mrkdwn: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": mrkdwn }
    })
}

pub fn divider() -> Value {
    json!({ "type": "divider" })
}

pub fn actions(elements: Vec<Value>) -> Value {
    json!({
        "type": "actions",
        "block_id": BUTTONS_BLOCK_ID,
        "elements": elements
    })
}

pub fn button(label: &str, style: ButtonStyle, value: &str, confirm: bool) -> Value {
    let mut button = json!({
        "type": "button",
        "text": { "type": "plain_text", "text": label },
        "value": value
    });

    if style != ButtonStyle::Default {
        button["style"] = Value::String(style.as_str().to_string());
    }

    if confirm {
        button["confirm"] = json!({
            "title": { "type": "plain_text", "text": "Are you sure?" },
            "text": {
                "type": "plain_text",
                "text": "This is reversible, but it is easier if you do not trash this by accident."
            },
            "confirm": { "type": "plain_text", "text": "Yes, trash it" },
            "deny": { "type": "plain_text", "text": "Nevermind, keep it." }
        });
    }

    button
}

/// Plain-text input for a modal. `id` doubles as block id and action id so
/// the submitted view state can be read back by the same name.
pub fn input(id: &str, label: &str, initial_value: &str, multiline: bool) -> Value {
    json!({
        "type": "input",
        "block_id": id,
        "label": { "type": "plain_text", "text": label },
        "element": {
            "type": "plain_text_input",
            "initial_value": initial_value,
            "action_id": id,
            "multiline": multiline
        },
        "optional": true
    })
}

/// Replace the block with `block_id == "buttons"` by `status`, leaving every
/// other block of the posted message untouched.
pub fn replace_buttons(blocks: &[Value], status: Value) -> Vec<Value> {
    blocks
        .iter()
        .map(|block| {
            if block.get("block_id").and_then(Value::as_str) == Some(BUTTONS_BLOCK_ID) {
                status.clone()
            } else {
                block.clone()
            }
        })
        .collect()
}

/// Neutralize the characters Slack mrkdwn treats as control sequences.
pub fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_button_has_no_style() {
        let b = button("Reject", ButtonStyle::Default, "RejectDelete_77", false);
        assert!(b.get("style").is_none());
        assert_eq!(b["value"], "RejectDelete_77");
    }

    #[test]
    fn styled_button_carries_style() {
        let b = button("Approve", ButtonStyle::Primary, "Approve_55", false);
        assert_eq!(b["style"], "primary");
        let b = button("Delete", ButtonStyle::Danger, "Delete_55_77", false);
        assert_eq!(b["style"], "danger");
    }

    #[test]
    fn confirm_dialog_is_optional() {
        let plain = button("Approve", ButtonStyle::Primary, "Approve_55", false);
        assert!(plain.get("confirm").is_none());
        let confirmed = button("Delete", ButtonStyle::Danger, "Delete_55_77", true);
        assert_eq!(confirmed["confirm"]["title"]["text"], "Are you sure?");
    }

    #[test]
    fn replace_buttons_swaps_only_the_actions_block() {
        let blocks = vec![
            header("Map Request: New"),
            section("*Region:* Midtown"),
            actions(vec![button("Approve", ButtonStyle::Primary, "Approve_55", false)]),
        ];
        let replaced = replace_buttons(&blocks, section("Request approved"));
        assert_eq!(replaced.len(), 3);
        assert_eq!(replaced[0]["type"], "header");
        assert_eq!(replaced[2]["type"], "section");
        assert_eq!(replaced[2]["text"]["text"], "Request approved");
    }

    #[test]
    fn escape_neutralizes_mrkdwn_characters() {
        assert_eq!(
            escape_mrkdwn("<Tom & Jerry>"),
            "&lt;Tom &amp; Jerry&gt;"
        );
    }

    #[test]
    fn input_uses_id_for_block_and_action() {
        let i = input("notes", "Notes", "flagpole", true);
        assert_eq!(i["block_id"], "notes");
        assert_eq!(i["element"]["action_id"], "notes");
        assert_eq!(i["element"]["initial_value"], "flagpole");
        assert_eq!(i["element"]["multiline"], true);
    }
}
