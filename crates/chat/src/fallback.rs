//! Locally synthesized reply for when every provider fails.

use parley_core::message::{Message, Role};
use parley_providers::prompt::role_title;

/// Confidence attached to a synthesized reply.
pub const FALLBACK_CONFIDENCE: u8 = 80;

/// Provider label reported for a synthesized reply.
pub const FALLBACK_PROVIDER: &str = "fallback";

/// Build the fallback answer. Never fails.
pub fn synthesize_reply(active_role: &str, messages: &[Message], business_related: bool) -> String {
    let title = role_title(active_role);
    let role = title.strip_prefix("The ").unwrap_or(&title);
    let last_question = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty());

    let asked = match last_question {
        Some(q) => format!("You asked: \"{q}\"."),
        None => "You haven't asked a specific question yet.".to_string(),
    };
    let framing = if business_related {
        "This looks business-related. I'll keep it practical and outcome-focused."
    } else {
        "This doesn't look strictly business-related, but I'll still give a clear, helpful direction."
    };

    format!(
        "As your {role}, here's a quick, actionable next step.\n\n{asked}\n\n{framing}\n\n\
         Next steps:\n\
         1) Clarify your goal in one sentence.\n\
         2) List 3 constraints (time, budget, resources).\n\
         3) Share any data you have; I'll turn it into a concrete plan."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_role_and_last_question() {
        let messages = vec![
            Message::user("first question"),
            Message::assistant("answer"),
            Message::user("How do I raise prices?"),
        ];
        let reply = synthesize_reply("pricing_coach", &messages, true);
        assert!(reply.starts_with("As your Pricing Coach"));
        assert!(reply.contains("You asked: \"How do I raise prices?\"."));
        assert!(reply.contains("business-related. I'll keep it practical"));
        assert!(reply.contains("1) Clarify your goal"));
    }

    #[test]
    fn no_question_and_non_business() {
        let reply = synthesize_reply("", &[], false);
        assert!(reply.starts_with("As your Advisor"));
        assert!(reply.contains("You haven't asked a specific question yet."));
        assert!(reply.contains("doesn't look strictly business-related"));
    }
}
