use assessment_flow::AssessmentError;
use rig::{agent::Agent, client::CompletionClient, completion::Chat, providers::openrouter};

pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
const INFERENCE_MODEL: &str = "openai/gpt-4o-mini";

/// Whether the inference backend is reachable at all. Stages fall back to
/// knowledge-based heuristics when it is not.
pub fn inference_available() -> bool {
    std::env::var(OPENROUTER_API_KEY).is_ok()
}

pub fn get_llm_agent(preamble: &str) -> anyhow::Result<Agent<openrouter::CompletionModel>> {
    let api_key = std::env::var(OPENROUTER_API_KEY)
        .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;
    let client = openrouter::Client::new(&api_key);
    let agent = client.agent(INFERENCE_MODEL).preamble(preamble).build();
    Ok(agent)
}

/// One-shot completion against the inference backend.
pub async fn complete(preamble: &str, prompt: &str) -> assessment_flow::Result<String> {
    let agent =
        get_llm_agent(preamble).map_err(|e| AssessmentError::StageFailed(e.to_string()))?;
    agent
        .chat(prompt, Vec::new())
        .await
        .map_err(|e| AssessmentError::StageFailed(e.to_string()))
}

/// Slice out the JSON payload of a model response that may be wrapped in
/// markdown fences or prose.
pub fn extract_json(response: &str) -> Option<&str> {
    let start = response.find(['{', '['])?;
    let end = response.rfind(['}', ']'])?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_strips_fences_and_prose() {
        let response = "Here you go:\n```json\n[{\"disease\": \"Influenza\"}]\n```\nHope that helps.";
        assert_eq!(extract_json(response), Some("[{\"disease\": \"Influenza\"}]"));
    }

    #[test]
    fn extract_json_handles_bare_object() {
        assert_eq!(extract_json("{\"a\": 1}"), Some("{\"a\": 1}"));
    }

    #[test]
    fn extract_json_rejects_text_without_payload() {
        assert_eq!(extract_json("no structured content here"), None);
    }
}
