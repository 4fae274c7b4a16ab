//! Prompt and reply shaping shared by every adapter.
//!
//! Wording here is deliberately generic: it frames the persona the user
//! picked, not a prompt-engineering strategy.

use parley_core::message::Message;
use parley_core::provider::ProviderRequest;

/// Role used for background conversation summaries. It gets its own system
/// prompt instead of a persona.
pub const SUMMARIZER_ROLE: &str = "conversation_summarizer";

const SUMMARIZER_PROMPT: &str = "You compress chat transcripts into faithful summaries. \
     Keep every decision, number, name and commitment. Do not add advice, \
     opinions or facts that are not in the transcript.";

/// Build the system prompt for a request: the persona prompt, or the
/// summarizer prompt for [`SUMMARIZER_ROLE`].
pub fn system_prompt(request: &ProviderRequest) -> String {
    if request.active_role == SUMMARIZER_ROLE {
        return SUMMARIZER_PROMPT.to_string();
    }

    let title = role_title(&request.active_role);
    let mut prompt = format!(
        "You are {title}, an assistant helping the user with their goals. \
         Stay in role, answer clearly, and use markdown for structure."
    );

    if request.business_related {
        prompt.push_str(
            "\nThe user's latest message is business-related: keep the answer practical and outcome-focused.",
        );
    } else {
        prompt.push_str(
            "\nThe user's latest message is not strictly business-related: still give a clear, helpful direction.",
        );
    }

    if let Some(context) = request.role_context() {
        prompt.push_str("\nAdditional role context from the user: ");
        prompt.push_str(context);
    }

    prompt.push_str(
        "\nEarlier parts of the conversation may appear as summaries. Treat their key data as established facts.",
    );
    prompt
}

/// "idea_validator" -> "The Idea Validator".
pub fn role_title(active_role: &str) -> String {
    let words: Vec<String> = active_role
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        "The Advisor".into()
    } else {
        format!("The {}", words.join(" "))
    }
}

/// Message content with any summary key data appended as a bullet list.
pub fn content_with_key_data(message: &Message) -> String {
    let key_data = message.key_data();
    if key_data.is_empty() {
        return message.content.clone();
    }
    let mut content = message.content.clone();
    content.push_str("\n\nKey data:");
    for item in key_data {
        content.push_str("\n- ");
        content.push_str(&item);
    }
    content
}

/// Trim a reply and strip `<think>...</think>` reasoning blocks.
///
/// An unterminated `<think>` drops everything after it.
pub fn clean_response(raw: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        match after_open.find(CLOSE) {
            Some(end) => rest = &after_open[end + CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}
