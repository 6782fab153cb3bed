//! Conversation preview lines ("Ana: see you at 8").

use crate::constants::PREVIEW_MAX_CHARS;
use crate::models::{Attachment, Message};

/// Short summary of a message body.
///
/// Precedence: text, then image, then file, then voice, else empty.
pub fn summarize(message: &Message) -> String {
    if let Some(text) = message.content.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return truncate(text, PREVIEW_MAX_CHARS);
    }

    match &message.attachment {
        Some(Attachment::Image { .. }) => "Sent a photo".to_string(),
        Some(Attachment::File { name, .. }) if !name.is_empty() => {
            format!("Sent a file: {}", truncate(name, PREVIEW_MAX_CHARS))
        }
        Some(Attachment::File { .. }) => "Sent a file".to_string(),
        Some(Attachment::Voice { duration_secs, .. }) => {
            format!("Voice message ({})", format_duration(*duration_secs))
        }
        None => String::new(),
    }
}

/// Summary prefixed with the sender's display name.
pub fn preview_line(message: &Message) -> String {
    let summary = summarize(message);
    match (message.sender_name.is_empty(), summary.is_empty()) {
        (_, true) => String::new(),
        (true, false) => summary,
        (false, false) => format!("{}: {summary}", message.sender_name),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// `m:ss` rendering of a voice clip length.
pub fn format_duration(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.round() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(content: Option<&str>, attachment: Option<Attachment>) -> Message {
        Message {
            id: "m".into(),
            conversation_id: "c".into(),
            sender_id: "u".into(),
            sender_name: "Ana".into(),
            sender_avatar: String::new(),
            content: content.map(str::to_string),
            attachment,
            timestamp: Utc::now(),
            ephemeral: None,
            starred: false,
        }
    }

    #[test]
    fn text_takes_precedence_over_attachment() {
        let m = message(
            Some("hello"),
            Some(Attachment::Image { src: "x".into() }),
        );
        assert_eq!(preview_line(&m), "Ana: hello");
    }

    #[test]
    fn attachment_kinds() {
        let image = message(None, Some(Attachment::Image { src: "x".into() }));
        assert_eq!(summarize(&image), "Sent a photo");

        let file = message(
            Some("   "),
            Some(Attachment::File {
                name: "plan.txt".into(),
                url: String::new(),
                mime_type: String::new(),
                size: 0,
            }),
        );
        assert_eq!(summarize(&file), "Sent a file: plan.txt");

        let voice = message(
            None,
            Some(Attachment::Voice {
                url: "v".into(),
                duration_secs: 75.4,
                mime_type: String::new(),
            }),
        );
        assert_eq!(summarize(&voice), "Voice message (1:15)");
    }

    #[test]
    fn empty_message_has_empty_preview() {
        assert_eq!(preview_line(&message(None, None)), "");
    }

    #[test]
    fn long_text_is_truncated() {
        let long = "x".repeat(PREVIEW_MAX_CHARS + 10);
        let summary = summarize(&message(Some(&long), None));
        assert_eq!(summary.chars().count(), PREVIEW_MAX_CHARS + 1);
        assert!(summary.ends_with('…'));
    }
}
