//! User-facing texts

use relaycore::delivery::{AbortReason, FailureKind, PartialFailure};
use relaycore::{BatchProgress, BatchSummary, DeliveryReport, RelayError};

pub const START_TEXT: &str = "👋 Hi! Send me a link to a video or an image post and I'll fetch the media for you.\n\
You can send several links in one message.";

pub const EXPIRED_TEXT: &str = "⌛ This request has expired or was already handled.";

pub fn help_text(descriptions: &str) -> String {
    format!(
        "{}\n\nSend one or more links in a message. Large albums are split into groups of 10.\n\
         If some media fail to send you can retry them, send only what is available, or cancel.",
        descriptions
    )
}

pub fn pending_text(count: usize) -> String {
    match count {
        0 => "Nothing is waiting for a decision.".to_string(),
        1 => "1 failed delivery is waiting for your decision.".to_string(),
        n => format!("{} failed deliveries are waiting for your decision.", n),
    }
}

pub fn processing_text(total: usize) -> String {
    if total == 1 {
        "⏳ Parsing your link...".to_string()
    } else {
        format!("⏳ Parsing {} links...", total)
    }
}

pub fn progress_text(progress: &BatchProgress) -> String {
    format!("⏳ Processing: {}", progress)
}

pub fn summary_text<T>(summary: &BatchSummary<T>) -> String {
    if summary.total == 1 {
        return if summary.succeeded == 1 {
            "✅ Done".to_string()
        } else {
            "❌ Failed".to_string()
        };
    }
    let mut text = format!("✅ Finished: {}/{} succeeded", summary.succeeded, summary.total);
    if summary.failed > 0 {
        text.push_str(&format!(", {} failed", summary.failed));
    }
    if summary.timed_out > 0 {
        text.push_str(&format!(" ({} timed out)", summary.timed_out));
    }
    text
}

fn failure_kind_text(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::ContentUnavailable => "the media is unavailable or could not be fetched",
        FailureKind::Generic => "Telegram refused the upload",
    }
}

pub fn partial_failure_text(partial: &PartialFailure) -> String {
    let attempt = if partial.round > 1 {
        format!(" (attempt {})", partial.round)
    } else {
        String::new()
    };
    format!(
        "⚠️ {}\n{} of {} groups failed to send{}. {}\n{} item(s) are missing. What should I do?",
        partial.source_url,
        partial.failed_batches,
        partial.failed_batches + partial.sent_batches,
        attempt,
        partial.error().user_message(),
        partial.failed_items
    )
}

/// Reply for the outcome of a recovery action. `PartialFailure` is rendered
/// with [`partial_failure_text`] instead.
pub fn report_text(report: &DeliveryReport) -> String {
    match report {
        DeliveryReport::Success {
            sent_items,
            skipped_items: 0,
        } => format!("✅ Sent {} item(s).", sent_items),
        DeliveryReport::Success {
            sent_items,
            skipped_items,
        } => format!("✅ Sent {} item(s), skipped {}.", sent_items, skipped_items),
        DeliveryReport::PartialFailure(partial) => format!("⚠️ {} item(s) still failed.", partial.failed_items),
        DeliveryReport::Aborted(AbortReason::Cancelled) => "✖️ Cancelled.".to_string(),
        DeliveryReport::Aborted(AbortReason::NothingAvailable) => {
            "Nothing else is available to send, all items were in failed groups.".to_string()
        }
        DeliveryReport::Aborted(AbortReason::RetriesExhausted { failed_items, kind }) => format!(
            "❌ Gave up after several retries, {} item(s) could not be sent: {}.",
            failed_items,
            failure_kind_text(*kind)
        ),
        DeliveryReport::Aborted(AbortReason::DeliveryFailed { kind }) => {
            format!("❌ Sending the available media failed too: {}.", failure_kind_text(*kind))
        }
    }
}

pub fn job_error_text(source_url: &str, error: &RelayError) -> String {
    format!("❌ {}\n{}", source_url, error.user_message())
}

pub fn job_crashed_text(source_url: &str) -> String {
    format!("❌ {}\nSomething went wrong while processing this link.", source_url)
}


#[cfg(test)]
mod tests {
    use super::*;
    use relaycore::extract::ExtractError;
    use pretty_assertions::assert_eq;
    use relaycore::RecoveryId;

    #[test]
    fn test_job_error_keeps_upstream_message() {
        let err = RelayError::Extraction(ExtractError::Upstream("作品已删除".to_string()));
        assert_eq!(job_error_text("https://x.example/1", &err), "❌ https://x.example/1\n作品已删除");
    }

    #[test]
    fn test_timeout_reply_uses_error_text() {
        let err = RelayError::Timeout(std::time::Duration::from_secs(180));
        assert_eq!(
            job_error_text("https://x.example/1", &err),
            "❌ https://x.example/1\nProcessing took too long and was stopped."
        );
    }

    #[test]
    fn test_partial_failure_text() {
        let partial = PartialFailure {
            recovery_id: RecoveryId::new(),
            source_url: "https://x.example/1".to_string(),
            sent_batches: 2,
            failed_batches: 1,
            failed_items: 3,
            kind: FailureKind::ContentUnavailable,
            reason: "Bad Request: failed to get HTTP URL content".to_string(),
            round: 1,
        };
        let text = partial_failure_text(&partial);
        assert!(text.starts_with("⚠️ https://x.example/1\n"));
        assert!(text.contains("1 of 3 groups failed"));
        assert!(text.contains("unavailable"));
        assert!(!text.contains("attempt"));
    }

    #[test]
    fn test_report_text_mentions_skipped() {
        let text = report_text(&DeliveryReport::Success {
            sent_items: 9,
            skipped_items: 3,
        });
        assert_eq!(text, "✅ Sent 9 item(s), skipped 3.");
    }

    #[test]
    fn test_pending_text() {
        assert_eq!(pending_text(0), "Nothing is waiting for a decision.");
        assert!(pending_text(4).starts_with("4 failed"));
    }
}
