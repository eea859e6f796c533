pub mod telegram;
pub mod terminal;

use error_stack::Report;
use futures::future::BoxFuture;
use tracing::warn;

use crate::error::NotifyError;

/// Sink for outgoing scan messages.
///
/// Uses `BoxFuture` so the scan loop can hold a `dyn Notifier`.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), Report<NotifyError>>>;
}

/// Send `text`, logging instead of propagating a failure.
///
/// Returns whether the message was accepted.
pub async fn deliver(notifier: &dyn Notifier, text: &str) -> bool {
    match notifier.send(text).await {
        Ok(()) => true,
        Err(e) => {
            warn!(notifier = notifier.name(), error = ?e, "notification failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Notifier for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn send<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<(), Report<NotifyError>>> {
            Box::pin(async { Err(Report::new(NotifyError::Rejected { status: 400 })) })
        }
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        assert!(!deliver(&Failing, "hello").await);
    }

    #[tokio::test]
    async fn terminal_delivery_succeeds() {
        assert!(deliver(&terminal::TerminalNotifier, "hello").await);
    }
}
