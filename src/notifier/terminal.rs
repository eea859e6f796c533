use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::NotifyError;
use crate::notifier::Notifier;

/// Writes messages to the log instead of a chat. Used for dry runs.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), Report<NotifyError>>> {
        tracing::warn!(chars = text.chars().count(), "NOTIFY:\n{text}");
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminal_notifier_accepts_any_text() {
        let notifier = TerminalNotifier;
        assert!(notifier.send("📡 *Market scan*").await.is_ok());
        assert!(notifier.send("").await.is_ok());
    }
}
