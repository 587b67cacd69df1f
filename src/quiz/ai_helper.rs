use async_trait::async_trait;
use chatgpt::prelude::*;
use chatgpt::types::CompletionResponse;

use crate::quiz::provider::{ProviderError, QuestionGenerator};
use crate::quiz::{Difficulty, Question, QuestionRequest};

/// Asks ChatGPT for one question per call. Every call is a fresh, stateless
/// conversation.
pub struct ChatGptGenerator {
    chat_gpt: ChatGPT,
}

/// Shape of the JSON object the prompt asks for.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedQuestion {
    question: String,
    correct_answer: f64,
    distractor1: f64,
    distractor2: f64,
    distractor3: f64,
    difficulty: Difficulty,
}

impl From<GeneratedQuestion> for Question {
    fn from(generated: GeneratedQuestion) -> Self {
        Question::new(
            generated.question,
            generated.correct_answer,
            [
                generated.distractor1,
                generated.distractor2,
                generated.distractor3,
            ],
            generated.difficulty,
        )
    }
}

impl ChatGptGenerator {
    pub fn new(chat_gpt: ChatGPT) -> Self {
        Self { chat_gpt }
    }
}

#[async_trait]
impl QuestionGenerator for ChatGptGenerator {
    async fn generate(&self, request: &QuestionRequest) -> std::result::Result<Question, ProviderError> {
        log::debug!(
            "Generating {} {} question for level {}",
            request.difficulty,
            request.category,
            request.level
        );
        let prompt = build_prompt(request);

        let response: CompletionResponse = self.chat_gpt.send_message(&prompt).await?;
        let content = response.message().clone().content;

        log::debug!("Completion: {:?}", content);

        parse_question(&content)
    }
}

pub fn build_prompt(request: &QuestionRequest) -> String {
    let QuestionRequest {
        level,
        category,
        difficulty,
    } = request;

    format!("You are a math question generator for a quiz game.
The player is at level {level}.
Generate a {difficulty} math question for the category of {category}.

The question MUST be appropriate for the requested '{difficulty}' difficulty.
The question must have exactly one correct numeric answer and three numeric distractors that are plausible but incorrect.

The question must be novel and clearly different from questions you may have generated before for level {level}, category {category} and difficulty {difficulty}. Do not repeat questions or use trivial variations of earlier ones.

Reply with a single JSON object and nothing else, using exactly these keys:
{{\"question\": string, \"correctAnswer\": number, \"distractor1\": number, \"distractor2\": number, \"distractor3\": number, \"difficulty\": \"{difficulty}\"}}
The \"difficulty\" field MUST be exactly \"{difficulty}\".")
}

/// Pulls the question out of a completion. The model sometimes wraps the JSON
/// in a code fence or a sentence, so only the outermost object is parsed.
pub fn parse_question(content: &str) -> std::result::Result<Question, ProviderError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            return Err(ProviderError::Malformed(format!(
                "no JSON object in reply: {:?}",
                content
            )))
        }
    };

    let generated: GeneratedQuestion =
        serde_json::from_str(json).map_err(|err| ProviderError::Malformed(err.to_string()))?;
    Ok(generated.into())
}
