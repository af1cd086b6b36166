// Wingmate Engine — OpenAI-Compatible Inference Provider
// Handles OpenAI and any OpenAI-compatible REST API.
// Implements the InferenceService golden trait; all chat-completions
// request shaping, prompt text, and fenced-JSON extraction live here.
//
// The API key is read from settings at call time, so adding a key takes
// effect on the next call without restarting the coordinator. An empty key
// is the terminal `CredentialMissing` error, never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};

use crate::atoms::constants::{MIN_BIO_CHARS_FOR_ANALYSIS, PREFERENCE_PROMPT_WINDOW, STYLE_PROMPT_WINDOW};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::InferenceService;
use crate::atoms::types::*;
use crate::engine::storage::Storage;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// Cheap model for classification-style calls, richer model for generation.
const ANALYSIS_MODEL: &str = "gpt-4o-mini";
const GENERATION_MODEL: &str = "gpt-4o";

pub struct OpenAiInference {
    client: Client,
    storage: Arc<Storage>,
}

impl OpenAiInference {
    pub fn new(storage: Arc<Storage>) -> Self {
        OpenAiInference {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            storage,
        }
    }

    /// One chat-completions round trip. Returns the assistant text.
    async fn request(
        &self,
        capability: &str,
        model: &str,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> EngineResult<String> {
        let settings = self.storage.settings();
        if settings.api_key.trim().is_empty() {
            return Err(EngineError::CredentialMissing);
        }
        let base_url = settings
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let model = settings.model.as_deref().unwrap_or(model);

        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": max_tokens,
        });

        debug!("[inference] {} call via {}", capability, model);
        let response = self
            .client
            .post(format!("{}/chat/completions", base_url))
            .bearer_auth(settings.api_key.trim())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() {
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("API request failed")
                .to_string();
            return Err(EngineError::inference(capability, message));
        }

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| EngineError::inference(capability, "empty completion"))
    }
}

// ── Response parsing ───────────────────────────────────────────────────────

/// Models wrap JSON in prose or fences; take the outermost brace pair.
fn extract_json(content: &str) -> Option<Value> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value[key]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn opt_string(value: &Value, key: &str) -> Option<String> {
    value[key].as_str().map(String::from)
}

fn parse_direction(value: &Value) -> Option<Direction> {
    match value["decision"].as_str()? {
        "accept" | "right" => Some(Direction::Accept),
        "reject" | "left" => Some(Direction::Reject),
        "super" => Some(Direction::Super),
        _ => None,
    }
}

// ── Prompt payload helpers ─────────────────────────────────────────────────

fn entity_summary(entity: &Entity) -> Value {
    json!({
        "name": entity.name,
        "age": entity.age,
        "bio": entity.bio,
        "photo_count": entity.images.len(),
    })
}

fn history_payload(entries: &[HistoryEntry]) -> Value {
    let skip = entries.len().saturating_sub(PREFERENCE_PROMPT_WINDOW);
    let window: Vec<Value> = entries
        .iter()
        .skip(skip)
        .map(|e| entity_summary(&e.entity))
        .collect();
    json!(window)
}

fn conversation_transcript(context: &Context) -> String {
    context
        .messages
        .iter()
        .map(|m| {
            let who = match m.sender {
                Sender::Own => "You",
                Sender::Counterpart => context.counterpart_name.as_str(),
            };
            format!("{}: {}", who, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn mode_instruction(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::Opener => {
            "No messages have been exchanged yet. Write a personalized opening \
             message that references something specific from their profile, \
             shows genuine interest, and stays to 1-2 sentences. No corny \
             pickup lines."
        }
        GenerationMode::Reply => {
            "They sent the last message. Write a reply that responds to what \
             they said, keeps the conversation flowing, and shows genuine \
             interest."
        }
        GenerationMode::FollowUp => {
            "You sent the last message and have not gotten a reply yet. Write \
             a follow-up that re-engages the conversation, asks a question or \
             shares something interesting, does not repeat what was already \
             said, and stays light."
        }
    }
}

// ── Trait implementation ───────────────────────────────────────────────────

#[async_trait]
impl InferenceService for OpenAiInference {
    async fn analyze_entity(&self, entity: &Entity) -> EngineResult<AnalysisResult> {
        let Some(bio) = entity
            .bio
            .as_deref()
            .filter(|b| b.len() > MIN_BIO_CHARS_FOR_ANALYSIS)
        else {
            // Nothing to analyze: synthesize basic signals from what we have.
            return Ok(AnalysisResult {
                bio: Some(BioAnalysis {
                    personality: vec!["Unknown - no bio".to_string()],
                    green_flags: if entity.primary_image.is_some() {
                        vec!["Has photos".to_string()]
                    } else {
                        Vec::new()
                    },
                    red_flags: vec!["No bio provided".to_string()],
                    conversation_starters: vec![format!(
                        "Hey {}! What do you like to do for fun?",
                        entity.name
                    )],
                    ..Default::default()
                }),
                error: None,
            });
        };

        let system = "Analyze this dating profile bio and extract: \
            personality (array of traits), interests (array), looking_for \
            (string), red_flags (array, be objective), green_flags (array), \
            conversation_starters (2-3 topics based on the bio). \
            Return as JSON.";
        let content = self
            .request("analysis", ANALYSIS_MODEL, system, bio, 500)
            .await?;

        let Some(parsed) = extract_json(&content) else {
            warn!("[inference] analysis response was not JSON");
            return Ok(AnalysisResult::default());
        };
        Ok(AnalysisResult {
            bio: Some(BioAnalysis {
                personality: string_list(&parsed, "personality"),
                interests: string_list(&parsed, "interests"),
                looking_for: opt_string(&parsed, "looking_for"),
                green_flags: string_list(&parsed, "green_flags"),
                red_flags: string_list(&parsed, "red_flags"),
                conversation_starters: string_list(&parsed, "conversation_starters"),
            }),
            error: None,
        })
    }

    async fn decide(
        &self,
        entity: &Entity,
        analysis: &AnalysisResult,
        preferences: &PreferenceProfile,
    ) -> EngineResult<Decision> {
        let system = format!(
            "You are helping someone find matches. Based on their learned \
             preferences and the current profile, decide if they would like \
             this person.\n\nTheir preferences:\n{}\n\nReturn JSON with: \
             decision (\"accept\" | \"reject\" | \"super\"), confidence \
             (0-100), reasons (array of strings).",
            json!({
                "traits": preferences.traits,
                "interests": preferences.interests,
                "deal_breakers": preferences.deal_breakers,
                "must_haves": preferences.must_haves,
                "type_summary": preferences.type_summary,
            })
        );
        let user = format!(
            "Profile to evaluate:\n{}\nAnalysis:\n{}",
            entity_summary(entity),
            serde_json::to_string(analysis)?
        );
        let content = self.request("decision", ANALYSIS_MODEL, &system, &user, 300).await?;

        let Some(parsed) = extract_json(&content) else {
            return Ok(Decision::safe_default());
        };
        let Some(direction) = parse_direction(&parsed) else {
            return Ok(Decision::safe_default());
        };
        Ok(Decision {
            direction,
            confidence: parsed["confidence"].as_u64().unwrap_or(50).min(100) as u8,
            reasons: string_list(&parsed, "reasons"),
        })
    }

    async fn analyze_preferences(
        &self,
        liked: &[HistoryEntry],
        disliked: &[HistoryEntry],
    ) -> EngineResult<PreferenceDelta> {
        let system = "Analyze the user's dating preferences from their \
            decision history. Compare liked vs disliked profiles to find \
            patterns. Return JSON with: traits (preferred characteristics), \
            interests (common interests they respond to), deal_breakers \
            (what made them reject), must_haves (consistently present in \
            accepts), type_summary (one sentence describing their type).";
        let user = format!(
            "Liked profiles:\n{}\n\nDisliked profiles:\n{}",
            history_payload(liked),
            history_payload(disliked)
        );
        let content = self
            .request("preferences", GENERATION_MODEL, system, &user, 500)
            .await?;

        let parsed = extract_json(&content)
            .ok_or_else(|| EngineError::inference("preferences", "response was not JSON"))?;
        Ok(PreferenceDelta {
            traits: string_list(&parsed, "traits"),
            interests: string_list(&parsed, "interests"),
            deal_breakers: string_list(&parsed, "deal_breakers"),
            must_haves: string_list(&parsed, "must_haves"),
            type_summary: opt_string(&parsed, "type_summary"),
        })
    }

    async fn analyze_style(&self, samples: &[StyleSample]) -> EngineResult<StyleAnalysis> {
        let system = "Analyze this person's texting style from their message \
            samples. Return JSON with: tone (casual, flirty, funny, sincere, \
            witty), message_length (short, medium, long), emoji_usage (none, \
            minimal, moderate, heavy), patterns (array of notable patterns), \
            vocabulary (array of frequently used words/phrases).";
        let user = samples
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let content = self.request("style", ANALYSIS_MODEL, system, &user, 400).await?;

        let parsed = extract_json(&content)
            .ok_or_else(|| EngineError::inference("style", "response was not JSON"))?;
        Ok(StyleAnalysis {
            tone: opt_string(&parsed, "tone"),
            emoji_usage: opt_string(&parsed, "emoji_usage"),
            message_length: opt_string(&parsed, "message_length"),
            patterns: string_list(&parsed, "patterns"),
            vocabulary: string_list(&parsed, "vocabulary"),
        })
    }

    async fn generate_message(
        &self,
        context: &Context,
        style: &StyleProfile,
        mode: GenerationMode,
    ) -> EngineResult<String> {
        let sample_window: Vec<&str> = {
            let skip = style.samples.len().saturating_sub(STYLE_PROMPT_WINDOW);
            style.samples.iter().skip(skip).map(|s| s.text.as_str()).collect()
        };

        let system = format!(
            "You are helping someone chat on a dating app. Generate a message \
             that matches their texting style.\n\nTheir texting style \
             samples:\n{}\n\nStyle characteristics:\n- Tone: {}\n- Emoji \
             usage: {}\n\nCONTEXT: {}\n\nRules:\n- Match their typing style \
             (length, punctuation, emoji usage)\n- Be natural and \
             conversational\n- Don't be creepy or too forward too fast\n- \
             Return ONLY the message text, nothing else",
            sample_window.join("\n"),
            style.tone,
            style.emoji_usage,
            mode_instruction(mode),
        );
        let user = match mode {
            GenerationMode::Opener => format!(
                "Their name is {}. Generate my opening message:",
                context.counterpart_name
            ),
            _ => format!(
                "Conversation so far:\n{}\n\nGenerate my next message:",
                conversation_transcript(context)
            ),
        };

        let max_tokens = if mode == GenerationMode::Opener { 100 } else { 150 };
        self.request("generation", GENERATION_MODEL, &system, &user, max_tokens)
            .await
    }
}
