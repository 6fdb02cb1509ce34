//! Reasoning response parsing.
//!
//! The reasoning service returns text that is ideally JSON. This module
//! recovers a [`ReasoningDecision`] from it, tolerating code fences, trailing
//! commas, the service's `{"decision": {...}}` envelope and its older action
//! vocabulary.

use serde::Deserialize;

use crate::decision::{ActionKind, Direction};

use super::{ReasoningDecision, ReasoningError};

/// Bounds applied to intensity and confidence
pub const MIN_SCALAR: f32 = 0.1;
pub const MAX_SCALAR: f32 = 1.0;
const DEFAULT_SCALAR: f32 = 0.5;

#[derive(Debug, Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    intensity: Option<f32>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Parse a response body into a decision.
///
/// Strategies, in order: direct JSON, JSON inside a code fence, trailing
/// commas stripped, and finally the outermost `{...}` span.
pub fn parse_decision(raw: &str) -> Result<ReasoningDecision, ReasoningError> {
    let trimmed = raw.trim();
    let mut candidates: Vec<String> = vec![trimmed.to_string()];
    if let Some(inner) = extract_json_from_codeblock(trimmed) {
        candidates.push(inner.to_string());
    }
    if let Some(span) = outer_object(trimmed) {
        candidates.push(span.to_string());
    }
    let stripped: Vec<String> = candidates.iter().map(|c| strip_trailing_commas(c)).collect();
    candidates.extend(stripped);

    let mut last_error = None;
    for candidate in &candidates {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) else {
            continue;
        };
        match decision_from_value(value) {
            Ok(decision) => return Ok(decision),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        ReasoningError::Malformed(format!("no JSON object found in: {}", truncate(trimmed, 120)))
    }))
}

fn decision_from_value(value: serde_json::Value) -> Result<ReasoningDecision, ReasoningError> {
    let body = match value.get("decision") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => value,
    };
    let raw: RawDecision = serde_json::from_value(body)
        .map_err(|e| ReasoningError::Malformed(format!("unexpected decision shape: {}", e)))?;

    let action = parse_action(&raw.action)?;
    let direction = raw
        .direction
        .as_deref()
        .and_then(parse_direction)
        .unwrap_or_else(|| default_direction(action));

    Ok(ReasoningDecision {
        reasoning: raw.reasoning.unwrap_or_default(),
        action,
        intensity: bounded(raw.intensity),
        direction,
        confidence: bounded(raw.confidence),
    })
}

/// Map the service vocabulary onto the action contract
pub fn parse_action(s: &str) -> Result<ActionKind, ReasoningError> {
    match s.trim().to_lowercase().as_str() {
        "forage" | "collect" | "gather" => Ok(ActionKind::Forage),
        "avoid" | "flee" => Ok(ActionKind::Avoid),
        "reproduce" => Ok(ActionKind::Reproduce),
        "explore" => Ok(ActionKind::Explore),
        "rest" => Ok(ActionKind::Rest),
        "help" | "socialize" => Ok(ActionKind::Help),
        other => Err(ReasoningError::Malformed(format!("unknown action '{}'", other))),
    }
}

pub fn parse_direction(s: &str) -> Option<Direction> {
    match s.trim().to_lowercase().as_str() {
        "toward_resource" => Some(Direction::TowardResource),
        "away_from_infected" => Some(Direction::AwayFromInfected),
        "toward_agents" => Some(Direction::TowardAgents),
        "random" => Some(Direction::Random),
        _ => None,
    }
}

fn default_direction(action: ActionKind) -> Direction {
    match action {
        ActionKind::Forage => Direction::TowardResource,
        ActionKind::Avoid => Direction::AwayFromInfected,
        ActionKind::Help | ActionKind::Socialize | ActionKind::Trade => Direction::TowardAgents,
        _ => Direction::Random,
    }
}

fn bounded(value: Option<f32>) -> f32 {
    match value {
        Some(v) if v.is_finite() => v.clamp(MIN_SCALAR, MAX_SCALAR),
        _ => DEFAULT_SCALAR,
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// Extract JSON from a ```json ... ``` or ``` ... ``` block
fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    let fence = text.find("```")?;
    let after_fence = fence + 3;
    let body_start = text[after_fence..]
        .find('\n')
        .map_or(after_fence, |nl| after_fence + nl + 1);
    let remaining = text.get(body_start..)?;
    let end = remaining.find("```")?;
    remaining.get(..end).map(str::trim)
}

fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Strip trailing commas before closing braces and brackets
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        result.push(c);
    }
    result
}
