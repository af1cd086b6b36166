// Wingmate Engine — Command Protocol
// Typed request/response envelopes for any UI front-end. Every request is
// `{type, payload}` and every response is `{success, payload | error}`;
// handler failures are caught here and returned as error envelopes, never
// propagated as panics.

use log::error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::atoms::types::*;
use crate::engine::coordinator::Coordinator;

// ── Envelopes ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandRequest {
    // Feature toggles
    ToggleAutoDecide { enabled: bool },
    ToggleChatAssist { enabled: bool },
    ToggleLearnPreferences { enabled: bool },

    // State reads
    GetSettings,
    GetStats,
    GetChatStyle,
    GetPreferences,

    // Entity pipeline
    EntityDetected,
    AnalyzeEntity { entity: Entity },

    // Decisions taken on the surface
    RecordDecision { direction: Direction, entity: Entity },

    // Conversation lifecycle
    ConversationOpened,
    MessageReceived { text: String },
    MessageSent { text: String },

    // Generation requests
    GenerateSuggestion {
        #[serde(default)]
        is_opener: bool,
        #[serde(default)]
        is_follow_up: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok(payload: Value) -> Self {
        CommandResponse { success: true, payload: Some(payload), error: None }
    }

    pub fn ok_empty() -> Self {
        CommandResponse { success: true, payload: None, error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        CommandResponse { success: false, payload: None, error: Some(message.into()) }
    }
}

// ── Dispatch ───────────────────────────────────────────────────────────────

/// Route one command to the coordinator. Infallible at this boundary:
/// every handler error becomes an error envelope.
pub async fn dispatch(coordinator: &Coordinator, request: CommandRequest) -> CommandResponse {
    match handle(coordinator, request).await {
        Ok(response) => response,
        Err(e) => {
            error!("[commands] handler failed: {}", e);
            CommandResponse::err(e.to_string())
        }
    }
}

async fn handle(
    coordinator: &Coordinator,
    request: CommandRequest,
) -> crate::atoms::error::EngineResult<CommandResponse> {
    use CommandRequest::*;

    match request {
        ToggleAutoDecide { enabled } => {
            coordinator.set_auto_decide(enabled).await?;
            Ok(CommandResponse::ok_empty())
        }
        ToggleChatAssist { enabled } => {
            coordinator.set_chat_assist(enabled)?;
            Ok(CommandResponse::ok_empty())
        }
        ToggleLearnPreferences { enabled } => {
            coordinator.set_learn_preferences(enabled)?;
            Ok(CommandResponse::ok_empty())
        }

        GetSettings => {
            // The key itself stays server-side; the UI only needs presence.
            let mut settings = serde_json::to_value(coordinator.settings())?;
            if let Some(obj) = settings.as_object_mut() {
                let has_key = obj
                    .get("api_key")
                    .and_then(Value::as_str)
                    .is_some_and(|k| !k.is_empty());
                obj.insert("api_key_configured".to_string(), json!(has_key));
                obj.remove("api_key");
            }
            Ok(CommandResponse::ok(settings))
        }
        GetStats => Ok(CommandResponse::ok(serde_json::to_value(coordinator.stats())?)),
        GetChatStyle => Ok(CommandResponse::ok(serde_json::to_value(
            coordinator.style.profile(),
        )?)),
        GetPreferences => Ok(CommandResponse::ok(serde_json::to_value(
            coordinator.preferences.profile(),
        )?)),

        EntityDetected => {
            coordinator.check_for_change().await?;
            Ok(CommandResponse::ok_empty())
        }
        AnalyzeEntity { entity } => {
            let analysis = coordinator.analyze_entity(&entity).await?;
            match analysis {
                // Raw entity data rides along so the UI is never empty,
                // even when the analysis carries only an error.
                Some(analysis) => Ok(CommandResponse::ok(json!({
                    "entity": entity,
                    "analysis": analysis,
                }))),
                None => Ok(CommandResponse::err("analysis already in flight")),
            }
        }

        RecordDecision { direction, entity } => {
            coordinator.record_decision(direction, entity).await;
            Ok(CommandResponse::ok_empty())
        }

        ConversationOpened => {
            coordinator.open_conversation().await?;
            Ok(CommandResponse::ok_empty())
        }
        MessageReceived { text } => {
            let suggestion = coordinator.on_message_received(text).await;
            Ok(CommandResponse::ok(json!({ "suggestion": suggestion })))
        }
        MessageSent { text } => {
            let suggestion = coordinator.on_message_sent(text).await;
            Ok(CommandResponse::ok(json!({ "suggestion": suggestion })))
        }

        GenerateSuggestion { is_opener, is_follow_up } => {
            let outcome = coordinator.generate_suggestion(is_opener, is_follow_up).await?;
            match outcome {
                SuggestionOutcome::Completed(suggestion) => {
                    Ok(CommandResponse::ok(serde_json::to_value(suggestion)?))
                }
                SuggestionOutcome::Ignored => {
                    Ok(CommandResponse::err("generation already in flight"))
                }
                SuggestionOutcome::Stale => {
                    Ok(CommandResponse::err("conversation changed before completion"))
                }
                SuggestionOutcome::Suppressed => {
                    Ok(CommandResponse::err("conversation is still settling"))
                }
            }
        }
    }
}
