use crate::models::{ChatTurn, SearchHit};

/// The single phrase the model is told to use for off-topic questions.
pub const REFUSAL_PHRASE: &str = "This question is not related to the document.";

pub const NOTHING_TO_SAY: &str = "Nothing to say, try to say something different.";

const SYSTEM_PROMPT: &str = "You are an AI assistant that helps users extract insights from their documents. \
Base your responses solely on the provided document fragments. \
If the information in the fragments is insufficient, tell the user so and ask for more details about the document. \
Never describe how this assistant or the surrounding system works.";

/// Prior exchange replayed to the model as short-term memory.
#[derive(Debug, Clone, Copy)]
pub struct PreviousExchange<'a> {
    pub question: &'a str,
    pub response: &'a str,
}

impl<'a> PreviousExchange<'a> {
    /// Both halves must be present and non-blank for the exchange to be replayed.
    pub fn from_parts(question: Option<&'a str>, response: Option<&'a str>) -> Option<Self> {
        match (question, response) {
            (Some(question), Some(response))
                if !question.trim().is_empty() && !response.trim().is_empty() =>
            {
                Some(Self { question, response })
            }
            _ => None,
        }
    }
}

pub fn system_turn() -> ChatTurn {
    ChatTurn::system(format!(
        "{SYSTEM_PROMPT} If a question is not related to the fragments, refuse and reply exactly: {REFUSAL_PHRASE}"
    ))
}

pub fn render_fragments(fragments: &[SearchHit]) -> String {
    if fragments.is_empty() {
        return "No fragments were found for this document.".to_string();
    }

    fragments
        .iter()
        .enumerate()
        .map(|(index, fragment)| format!("{} - {}", index + 1, fragment.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn question_turn(fragments: &[SearchHit], question: &str) -> ChatTurn {
    ChatTurn::user(format!(
        "Based on the following document fragments:\n{fragments}\n\n\
Question: {question}\n\n\
Rules for your response:\n\
- Answer only the question, directly, without introducing the document or the fragments.\n\
- Respond only in English.\n\
- Do not explain how you are reasoning or mention that fragments were provided.\n\
- Use nothing besides the fragments above.\n\
- If the question is not related to the fragments, reply exactly: {REFUSAL_PHRASE}\n\
- If your answer relies on the previous question, say so.",
        fragments = render_fragments(fragments),
        question = question.trim(),
    ))
}

/// Ordered turns for one chat request: system, optional prior pair, then the question.
pub fn compose_turns(
    fragments: &[SearchHit],
    question: &str,
    previous: Option<PreviousExchange<'_>>,
) -> Vec<ChatTurn> {
    let mut turns = vec![system_turn()];
    if let Some(previous) = previous {
        turns.push(ChatTurn::user(previous.question));
        turns.push(ChatTurn::assistant(previous.response));
    }
    turns.push(question_turn(fragments, question));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRole;

    fn hit(page_number: u32, content: &str) -> SearchHit {
        SearchHit {
            document_id: 42,
            document_name: "summary.pdf".to_string(),
            page_number,
            content: content.to_string(),
            score: Some(1.5),
        }
    }

    #[test]
    fn turns_without_history_are_system_then_user() {
        let turns = compose_turns(&[hit(1, "Revenue grew.")], "What grew?", None);

        let roles: Vec<ChatRole> = turns.iter().map(|turn| turn.role).collect();
        assert_eq!(roles, vec![ChatRole::System, ChatRole::User]);
        assert!(turns[0].content.contains(REFUSAL_PHRASE));
        assert!(turns[1].content.contains("1 - Revenue grew."));
        assert!(turns[1].content.contains("Question: What grew?"));
        assert!(turns[1].content.contains("English"));
    }

    #[test]
    fn previous_exchange_sits_between_system_and_question() {
        let previous = PreviousExchange::from_parts(Some("Who wrote it?"), Some("The finance team."));
        let turns = compose_turns(&[], "When?", previous);

        let roles: Vec<ChatRole> = turns.iter().map(|turn| turn.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        assert_eq!(turns[1].content, "Who wrote it?");
        assert_eq!(turns[2].content, "The finance team.");
    }

    #[test]
    fn half_an_exchange_is_dropped() {
        assert!(PreviousExchange::from_parts(Some("q"), None).is_none());
        assert!(PreviousExchange::from_parts(Some("q"), Some("  ")).is_none());
    }

    #[test]
    fn fragments_are_numbered_in_retrieval_order() {
        let rendered = render_fragments(&[hit(7, "first"), hit(2, "second")]);
        assert_eq!(rendered, "1 - first\n2 - second");
        assert!(render_fragments(&[]).contains("No fragments"));
    }
}
