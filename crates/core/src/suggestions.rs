use crate::error::RagError;
use crate::models::{ChatTurn, TitleSuggestion};
use crate::traits::GenerationProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

pub const MAX_SAMPLE_CHARS: usize = 1000;

const SUGGESTION_FAILURE: &str = "Failed to get suggestions due to an internal error.";

const SUGGESTION_PROMPT: &str = "You are an AI assistant that generates helpful suggestions for document titles and descriptions.
- Suggest between 3 and 5 pairs of {title, description}.
- Each pair should be concise, relevant, and based on the content sample provided.
- If the document name is vague or unhelpful, rely solely on the content sample.
- Respond with a JSON array shaped like [{\"title\": \"Suggested Title\", \"description\": \"Suggested Description\"}].
- Do not include explanations, introductions, or any text besides the JSON array.";

/// Proposes titles and descriptions for a freshly uploaded document.
pub struct SuggestionService<G> {
    generator: Arc<G>,
    timeout: Duration,
}

impl<G> SuggestionService<G>
where
    G: GenerationProvider,
{
    pub fn new(generator: Arc<G>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn suggest(
        &self,
        file_name: &str,
        content_sample: &str,
    ) -> Result<Vec<TitleSuggestion>, RagError> {
        if file_name.trim().is_empty() {
            return Err(RagError::invalid("File name is required."));
        }
        if content_sample.trim().is_empty() {
            return Err(RagError::invalid("Content sample is required."));
        }
        if content_sample.chars().count() > MAX_SAMPLE_CHARS {
            return Err(RagError::invalid(format!(
                "Content sample must not exceed {MAX_SAMPLE_CHARS} characters."
            )));
        }

        let turns = suggestion_turns(file_name, content_sample);
        let raw = match timeout(self.timeout, self.generator.generate(&turns)).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => {
                error!(file_name, "suggestion generation returned no text");
                return Err(RagError::Internal(SUGGESTION_FAILURE.to_string()));
            }
            Ok(Err(cause)) => {
                error!(file_name, error = %cause, "suggestion generation failed");
                return Err(RagError::Internal(SUGGESTION_FAILURE.to_string()));
            }
            Err(_) => {
                error!(file_name, "suggestion generation timed out");
                return Err(RagError::Internal(SUGGESTION_FAILURE.to_string()));
            }
        };

        let suggestions = parse_suggestions(&raw)?;
        info!(file_name, suggestions = suggestions.len(), "title suggestions generated");
        Ok(suggestions)
    }
}

pub fn suggestion_turns(file_name: &str, content_sample: &str) -> Vec<ChatTurn> {
    vec![
        ChatTurn::system(SUGGESTION_PROMPT),
        ChatTurn::user(format!(
            "Based on the following document name: {}\nAnd the following content sample: {}\nGenerate 3 to 5 title and description suggestions.",
            file_name.trim(),
            content_sample.trim()
        )),
    ]
}

/// Parses the model output, accepting a JSON array optionally wrapped in a code fence.
pub fn parse_suggestions(raw: &str) -> Result<Vec<TitleSuggestion>, RagError> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str::<Vec<TitleSuggestion>>(unfenced).map_err(|cause| {
        error!(error = %cause, "invalid suggestion format");
        RagError::Internal("Invalid suggestion format.".to_string())
    })
}
