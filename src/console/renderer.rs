use std::fmt::Write;

use crate::domain::{ClassificationResult, Snapshot};

const SNIPPET_WIDTH: usize = 72;

pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", render_summary(snapshot));
    if snapshot.messages.is_empty() {
        out.push_str("No unread emails found.\n");
        return out;
    }

    for message in &snapshot.messages {
        let verdict = render_verdict(snapshot.classification(&message.id));
        let _ = writeln!(out, "[{verdict}] {}  {}", message.id, message.from);
        let _ = writeln!(out, "    Subject: {}", message.subject);
        let _ = writeln!(out, "    {}", truncate(&message.snippet, SNIPPET_WIDTH));
        if let Some(result) = snapshot.classification(&message.id) {
            if let Some(kind) = result.spam_type.as_deref().filter(|kind| !kind.is_empty()) {
                let _ = writeln!(out, "    Type: {kind}");
            }
            if !result.description.is_empty() {
                let _ = writeln!(out, "    Description: {}", result.description);
            }
            if !result.summary.is_empty() {
                let _ = writeln!(out, "    Summary: {}", truncate(&result.summary, SNIPPET_WIDTH));
            }
        }
    }
    out
}

pub fn render_summary(snapshot: &Snapshot) -> String {
    format!(
        "sync #{} {:?}: {} unread, {} spam, {} not spam, {} pending",
        snapshot.generation,
        snapshot.state,
        snapshot.messages.len(),
        snapshot.stats.spam_count,
        snapshot.stats.non_spam_count,
        snapshot.pending(),
    )
}

/// A missing verdict renders as pending, never as "not spam".
fn render_verdict(result: Option<&ClassificationResult>) -> String {
    match result {
        Some(result) if result.is_spam => format!("SPAM {:.2}", result.spam_score),
        Some(result) => format!("ok   {:.2}", result.spam_score),
        None => "pending  ".to_string(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= width {
        return flattened;
    }
    let mut cut: String = flattened.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
