//! Prompt composition
//!
//! The instruction turn carries the command-emission contract. Each user
//! turn is the literal message, an optional map context annotation and a
//! short reminder of that contract, all in one turn's content.

use crate::session::Turn;
use serde::Deserialize;
use std::fmt::Write;

/// Behavioural contract given to the model as turn 0 of every session
pub const INSTRUCTION_PREAMBLE: &str = r#"You are a helpful AI assistant integrated into a map application called RealMapAI.

CRITICAL INSTRUCTION:
You have the ability to control the map! You can SEARCH for places or CONTROL THE CAMERA (zoom, rotate, tilt, map style).

COMMAND FORMATS (Append these to the end of your response):
1. To Search matches: [LOCATION_SEARCH: {"query": "exact place name"}]
2. To Control Camera: [CAMERA_ACTION: {"type": "ACTION_TYPE", "value": "optional_value"}]

SUPPORTED CAMERA ACTIONS:
- "ZOOM_IN" / "ZOOM_OUT"
- "ROTATE_LEFT" / "ROTATE_RIGHT"
- "TILT_UP" / "TILT_DOWN"
- "RESET"
- "SWITCH_MODE" (value: "SATELLITE", "ROAD", "HYBRID")

RULES:
1. If user says "find...", "search...", "show me...", use LOCATION_SEARCH.
2. If user mentions "nearby" or "around here", use the PROVIDED CURRENT LOCATION in your search query.
   - Example: User "find gas stations here" -> [LOCATION_SEARCH: {"query": "gas stations near [Lat, Lng]"}]
3. If user says "switch to satellite", "show roads", use SWITCH_MODE.
4. Keep the text response short (1 sentence) and friendly.

Examples:
User: "Search for Marvel Stadium"
Assistant: Heading to Marvel Stadium! [LOCATION_SEARCH: {"query": "Marvel Stadium"}]

User: "Show restaurants near here"
Assistant: Searching for restaurants in this area. [LOCATION_SEARCH: {"query": "restaurants near -37.81, 144.96"}]

User: "Show me the roads"
Assistant: Switching to road view. [CAMERA_ACTION: {"type": "SWITCH_MODE", "value": "ROAD"}]"#;

/// Appended to every user turn
const COMMAND_REMINDER: &str = r#"(SYSTEM REMINDER: If this is a request to search/find, return [LOCATION_SEARCH: ...]. If "nearby", use coordinates. If changing view, use [CAMERA_ACTION: ...].)"#;

/// Snapshot of the map viewport supplied with a message
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MapContext {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub zoom: Option<f64>,
}

/// Outbound prompt: the existing history plus the new user turn
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub history: Vec<Turn>,
    pub user_turn: Turn,
}

impl ComposedPrompt {
    /// All turns in send order
    pub fn outbound(&self) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(self.history.len() + 1);
        turns.extend_from_slice(&self.history);
        turns.push(self.user_turn.clone());
        turns
    }
}

pub fn compose(
    turns: &[Turn],
    user_message: &str,
    map_context: Option<&MapContext>,
) -> ComposedPrompt {
    ComposedPrompt {
        history: turns.to_vec(),
        user_turn: Turn::user(user_turn_content(user_message, map_context)),
    }
}

fn user_turn_content(user_message: &str, map_context: Option<&MapContext>) -> String {
    let mut content = String::from(user_message);

    if let Some(ctx) = map_context {
        let zoom = ctx
            .zoom
            .map_or_else(|| "unknown".to_string(), |z| z.to_string());
        let _ = write!(
            content,
            "\n[CURRENT MAP CONTEXT: Lat: {}, Lng: {}, Zoom: {zoom}]",
            ctx.lat, ctx.lng
        );
    }

    content.push('\n');
    content.push_str(COMMAND_REMINDER);
    content
}
