use async_trait::async_trait;
use tracing::info;

use crate::defs::Notifier;

/// Notifier that only writes messages to the log. Used for dry runs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel_name(&self) -> String {
        "log".to_owned()
    }

    async fn deliver(&self, message: &str) -> anyhow::Result<()> {
        // Nothing leaves the process; the message is the log line.
        info!(channel = "log", "{}", message);
        Ok(())
    }
}
