//! Prompt builders, one per generating stage.

use crate::core::production::{Production, Stage};

const SYSTEM_BASE: &str = "You are a senior content strategist producing short-form video \
scripts for a brand. Always answer with a single JSON object and nothing else: no prose, \
no markdown outside the JSON.";

pub(crate) fn system_prompt(stage: Stage) -> String {
    let role = match stage {
        Stage::Analysis => {
            "Your job right now is ANALYSIS: read the client context and propose content themes."
        }
        Stage::Research => {
            "Your job right now is RESEARCH: gather verifiable facts, cases and cultural signals \
             that back the selected theme. Prefer recent, sourced data."
        }
        Stage::Narrative => {
            "Your job right now is NARRATIVE: outline an AIDA script skeleton and offer distinct \
             tonal angles for the final script."
        }
        Stage::Writing => {
            "Your job right now is WRITING: write the final script in the approved angle and \
             check it against the brand tone of voice."
        }
        Stage::Ideation | Stage::Completed => "",
    };
    format!("{}\n\n{}", SYSTEM_BASE, role)
}

fn brand_block(p: &Production) -> String {
    let tone = if p.tone_of_voice.trim().is_empty() {
        "(not specified; infer it from the context)"
    } else {
        p.tone_of_voice.trim()
    };
    format!(
        "## Client context\n{}\n\n## Tone of voice\n{}\n",
        p.client_context.trim(),
        tone
    )
}

pub(crate) fn analysis_prompt(p: &Production) -> String {
    format!(
        "{brand}\n\
         Propose exactly 10 content themes ranked from strongest (1) to weakest (10).\n\n\
         JSON schema:\n\
         {{\n\
           \"themes\": [\n\
             {{\n\
               \"rank\": 1,\n\
               \"title\": \"<short theme title>\",\n\
               \"justification\": \"<why this theme fits the client and audience>\",\n\
               \"suggestedFormat\": \"<reel | carousel | talking head | ...>\",\n\
               \"formatJustification\": \"<why that format>\"\n\
             }}\n\
           ]\n\
         }}",
        brand = brand_block(p),
    )
}

pub(crate) fn research_prompt(p: &Production) -> String {
    let theme = p
        .selected_theme()
        .map(|t| format!("{}\n{}", t.title, t.justification))
        .unwrap_or_default();
    format!(
        "{brand}\n\
         ## Selected theme\n{theme}\n\n\
         Build a research map for this theme.\n\n\
         JSON schema:\n\
         {{\n\
           \"numericalData\": [{{ \"value\": \"<figure>\", \"context\": \"<what it measures>\", \"source\": \"<url or publication>\" }}],\n\
           \"cases\": [{{ \"title\": \"<case>\", \"summary\": \"<what happened>\", \"source\": \"<url>\" }}],\n\
           \"narrativesMetaphors\": [\"<metaphor or narrative frame>\"],\n\
           \"socialVoice\": {{ \"summary\": \"<what people say>\", \"sentiment\": \"<positive | mixed | negative>\", \"quotes\": [\"<representative quote>\"] }},\n\
           \"antagonists\": [\"<belief, habit or actor the content pushes against>\"],\n\
           \"culturalTrends\": [\"<trend>\"],\n\
           \"centralMessageConnection\": \"<how all of this ties back to the client's central message>\"\n\
         }}",
        brand = brand_block(p),
        theme = theme,
    )
}

pub(crate) fn narrative_prompt(p: &Production) -> String {
    let theme = p
        .selected_theme()
        .map(|t| format!("{}\nJustification: {}", t.title, t.justification))
        .unwrap_or_default();
    let research = p
        .research_map
        .as_ref()
        .and_then(|m| serde_json::to_string_pretty(m).ok())
        .unwrap_or_else(|| "{}".to_string());
    format!(
        "{brand}\n\
         ## Selected theme\n{theme}\n\n\
         ## Research map\n{research}\n\n\
         Outline the script using the AIDA structure and propose three tonal angles \
         (for example journalistic, personal, provocative).\n\n\
         JSON schema:\n\
         {{\n\
           \"blocks\": [{{ \"phase\": \"attention | interest | desire | action\", \"title\": \"<block title>\", \"content\": \"<what this block says>\" }}],\n\
           \"angleVariations\": [{{ \"name\": \"<angle name>\", \"description\": \"<how the script sounds>\", \"sampleHook\": \"<opening line in this angle>\" }}],\n\
           \"validationNotes\": \"<risks, claims to double-check, brand-safety notes>\"\n\
         }}",
        brand = brand_block(p),
        theme = theme,
        research = research,
    )
}

pub(crate) fn writing_prompt(p: &Production) -> String {
    let skeleton = p
        .narrative_skeleton
        .as_ref()
        .and_then(|s| serde_json::to_string_pretty(&s.blocks).ok())
        .unwrap_or_else(|| "[]".to_string());
    let angle = p
        .narrative_skeleton
        .as_ref()
        .zip(p.selected_angle.as_deref())
        .and_then(|(s, name)| s.find_angle(name))
        .map(|a| format!("{}: {}", a.name, a.description))
        .unwrap_or_else(|| p.selected_angle.clone().unwrap_or_default());
    format!(
        "{brand}\n\
         ## AIDA skeleton\n{skeleton}\n\n\
         ## Approved angle\n{angle}\n\n\
         Write the final script following the skeleton in the approved angle.\n\n\
         JSON schema:\n\
         {{\n\
           \"fullScript\": {{ \"hook\": \"<attention>\", \"interest\": \"<interest>\", \"desire\": \"<desire>\", \"action\": \"<call to action>\" }},\n\
           \"styleChecker\": {{ \"approved\": true, \"notes\": [\"<tone-of-voice remarks>\"] }},\n\
           \"captionSuggestion\": \"<post caption>\",\n\
           \"hashtags\": [\"#tag\"]\n\
         }}",
        brand = brand_block(p),
        skeleton = skeleton,
        angle = angle,
    )
}

pub(crate) fn user_prompt(stage: Stage, p: &Production) -> Option<String> {
    match stage {
        Stage::Analysis => Some(analysis_prompt(p)),
        Stage::Research => Some(research_prompt(p)),
        Stage::Narrative => Some(narrative_prompt(p)),
        Stage::Writing => Some(writing_prompt(p)),
        Stage::Ideation | Stage::Completed => None,
    }
}
