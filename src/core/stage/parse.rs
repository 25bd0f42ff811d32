//! Turns raw completion text into typed stage output.

use serde::Deserialize;

use crate::core::production::{
    FinalContent, NarrativeSkeleton, ResearchMap, Stage, StageOutput, Theme,
};

/// Extract a JSON block from LLM output. Tries fenced ```json ... ``` first,
/// then the outermost `{ ... }` span.
pub(crate) fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let content_start = start + 7;
        if let Some(end) = trimmed[content_start..].find("```") {
            let block = trimmed[content_start..content_start + end].trim();
            if !block.is_empty() {
                return Some(block);
            }
        }
    }
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

#[derive(Deserialize)]
struct AnalysisReply {
    themes: Vec<Theme>,
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("required field '{}' is empty", field))
    } else {
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(stage: Stage, raw: &str) -> Result<T, String> {
    let block = extract_json_block(raw)
        .ok_or_else(|| format!("{} reply contains no JSON object", stage))?;
    serde_json::from_str::<T>(block).map_err(|e| format!("{} reply does not match: {}", stage, e))
}

fn validate_themes(mut themes: Vec<Theme>) -> Result<Vec<Theme>, String> {
    if themes.is_empty() {
        return Err("analysis returned no themes".to_string());
    }
    for (i, t) in themes.iter().enumerate() {
        require(&format!("themes[{}].title", i), &t.title)?;
        require(&format!("themes[{}].justification", i), &t.justification)?;
    }
    // Unranked themes (rank 0) keep their reply order after the ranked ones.
    themes.sort_by_key(|t| if t.rank == 0 { u32::MAX } else { t.rank });
    for (i, t) in themes.iter_mut().enumerate() {
        t.rank = i as u32 + 1;
    }
    Ok(themes)
}

fn validate_research(map: ResearchMap) -> Result<ResearchMap, String> {
    require("centralMessageConnection", &map.central_message_connection)?;
    if map.numerical_data.is_empty() && map.cases.is_empty() {
        return Err("research map has neither numerical data nor cases".to_string());
    }
    Ok(map)
}

fn validate_skeleton(skeleton: NarrativeSkeleton) -> Result<NarrativeSkeleton, String> {
    if skeleton.blocks.is_empty() {
        return Err("narrative skeleton has no blocks".to_string());
    }
    if skeleton.angle_variations.is_empty() {
        return Err("narrative skeleton has no angle variations".to_string());
    }
    for (i, a) in skeleton.angle_variations.iter().enumerate() {
        require(&format!("angleVariations[{}].name", i), &a.name)?;
    }
    Ok(skeleton)
}

fn validate_content(content: FinalContent) -> Result<FinalContent, String> {
    let s = &content.full_script;
    require("fullScript.hook", &s.hook)?;
    require("fullScript.interest", &s.interest)?;
    require("fullScript.desire", &s.desire)?;
    require("fullScript.action", &s.action)?;
    Ok(content)
}

/// Parses and validates a stage reply. The error string explains what was
/// wrong with the content; callers report it as a malformed response.
pub(crate) fn parse_stage_output(stage: Stage, raw: &str) -> Result<StageOutput, String> {
    match stage {
        Stage::Analysis => {
            let reply: AnalysisReply = decode(stage, raw)?;
            validate_themes(reply.themes).map(StageOutput::Analysis)
        }
        Stage::Research => {
            let map: ResearchMap = decode(stage, raw)?;
            validate_research(map).map(StageOutput::Research)
        }
        Stage::Narrative => {
            let skeleton: NarrativeSkeleton = decode(stage, raw)?;
            validate_skeleton(skeleton).map(StageOutput::Narrative)
        }
        Stage::Writing => {
            let content: FinalContent = decode(stage, raw)?;
            validate_content(content).map(StageOutput::Writing)
        }
        Stage::Ideation | Stage::Completed => Err(format!("{} does not generate output", stage)),
    }
}
