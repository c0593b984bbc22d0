//! Transition notifications. Best-effort: a failed send is logged and
//! dropped, never surfaced to the operation that caused it.

use office_core::{ReferenceZone, Transition, describe_transition};
use office_discord::MessagePayload;

use crate::platform::ChatPlatform;

/// Discord rejects message content longer than this.
const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct Notifier {
    channel_id: Option<String>,
    zone: ReferenceZone,
}

impl Notifier {
    pub fn new(channel_id: Option<String>, zone: ReferenceZone) -> Self {
        Self { channel_id, zone }
    }

    pub fn is_enabled(&self) -> bool {
        self.channel_id.is_some()
    }

    pub async fn emit(&self, platform: &dyn ChatPlatform, transitions: &[Transition]) {
        let Some(channel_id) = self.channel_id.as_deref() else {
            return;
        };
        if transitions.is_empty() {
            return;
        }

        let lines: Vec<String> = transitions
            .iter()
            .map(|t| describe_transition(t, self.zone))
            .collect();
        for chunk in chunk_lines(&lines, MAX_MESSAGE_CHARS) {
            if let Err(e) = platform
                .post_message(channel_id, &MessagePayload::text(chunk))
                .await
            {
                tracing::warn!(channel_id, "notification send failed: {e}");
            }
        }
    }
}

/// Pack lines into messages of at most `max` characters. A single line
/// longer than `max` is truncated.
fn chunk_lines(lines: &[String], max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in lines {
        let line: String = line.chars().take(max).collect();
        let len = line.chars().count();
        let needed = if current.is_empty() { len } else { len + 1 };
        if current_len + needed > max && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(&line);
        current_len += len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::at;
    use crate::platform::fake::FakePlatform;
    use office_core::HistoryEntry;

    fn left(name: &str) -> Transition {
        Transition::Left {
            history: HistoryEntry {
                user_id: name.to_string(),
                display_name: name.to_string(),
                start: at("2026-03-02T00:00:00Z"),
                ended_at: at("2026-03-02T09:00:00Z"),
                note: None,
            },
        }
    }

    #[test]
    fn chunks_respect_limit() {
        let lines: Vec<String> = (0..5).map(|i| format!("{i}").repeat(9)).collect();
        let chunks = chunk_lines(&lines, 20);
        assert_eq!(chunks, ["000000000\n111111111", "222222222\n333333333", "444444444"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn oversized_line_is_truncated() {
        let chunks = chunk_lines(&["x".repeat(30)], 10);
        assert_eq!(chunks, ["x".repeat(10)]);
    }

    #[tokio::test]
    async fn disabled_notifier_sends_nothing() {
        let platform = FakePlatform::default();
        let notifier = Notifier::new(None, ReferenceZone::default());
        notifier.emit(&platform, &[left("a")]).await;
        assert!(platform.calls().is_empty());
        assert!(!notifier.is_enabled());
    }

    #[tokio::test]
    async fn transitions_are_posted_together() {
        let platform = FakePlatform::default();
        let notifier = Notifier::new(Some("log".to_string()), ReferenceZone::default());
        notifier.emit(&platform, &[left("a"), left("b")]).await;
        let posts = platform.posts_to("log");
        assert_eq!(posts.len(), 1);
        let text = posts[0].content.clone().unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("a left"));
    }

    #[tokio::test]
    async fn send_failure_is_swallowed() {
        let platform = FakePlatform::default();
        platform.broken.lock().unwrap().insert("log".to_string());
        let notifier = Notifier::new(Some("log".to_string()), ReferenceZone::default());
        notifier.emit(&platform, &[left("a")]).await;
        assert!(platform.calls().is_empty());
    }
}
