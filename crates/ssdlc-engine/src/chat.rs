//! Replies for turns that do not advance the workflow.

use ssdlc_stage_api::StageId;

use crate::intent::{IntentDecision, IntentType};
use crate::workflow::SessionState;

pub const HELP_TEXT: &str = "I'm your secure development assistant. I can help with:\n\
- Application development: say \"create app\" or describe the application you need\n\
- General questions about software development\n\
- Security requirements and best practices\n\
- System design guidance\n\n\
To start, tell me what kind of application you want to build.";

pub const COMPLETION_TEXT: &str = "Your application development workflow is complete! \
All documents and code have been generated. How can I help you further?";

const GREETINGS: &[&str] = &["hi", "hello", "hey", "good morning", "good afternoon"];

/// Conversational reply for `intent`.
#[must_use]
pub fn chat_reply(user_text: &str, state: &SessionState, intent: &IntentDecision) -> String {
    match intent.intent_type {
        IntentType::Help => HELP_TEXT.to_string(),
        IntentType::Status => status_reply(state, intent),
        IntentType::AppDevelopment => format!(
            "I understand you want to develop a {} application (confidence: {:.0}%). \
             Say \"continue\" when you want me to run the next stage.",
            intent.app_type.as_deref().unwrap_or("new"),
            intent.confidence * 100.0
        ),
        IntentType::GeneralChat if is_greeting(user_text) => {
            "Hello! I'm here to help you with secure software development. \
             What would you like to work on today?"
                .to_string()
        }
        IntentType::GeneralChat => format!(
            "{}\n\nIf you'd like to create an application, tell me what kind of app \
             you want and I'll guide you through the process.",
            intent.reasoning
        ),
    }
}

fn is_greeting(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| GREETINGS.contains(&word))
        || GREETINGS
            .iter()
            .filter(|g| g.contains(' '))
            .any(|g| lower.contains(g))
}

fn names(stages: impl IntoIterator<Item = StageId>) -> String {
    let list: Vec<_> = stages.into_iter().map(|s| s.as_str()).collect();
    if list.is_empty() {
        "none".to_string()
    } else {
        list.join(", ")
    }
}

/// Progress report for status questions.
#[must_use]
pub fn status_reply(state: &SessionState, intent: &IntentDecision) -> String {
    if !state.active_workflow {
        let done = state.completed.completed();
        if done.is_empty() {
            return "No active workflow. Tell me what kind of app you want to create!".to_string();
        }
        return format!(
            "No active workflow. Completed stages: {}.",
            names(done)
        );
    }
    format!(
        "Workflow is active. Current stage: {}.\nCompleted stages: {}\nDegraded stages: {}\n\
         Intent confidence: {:.0}%",
        state.current_stage,
        names(state.completed.completed()),
        names(state.degraded.iter().copied()),
        intent.confidence * 100.0
    )
}
