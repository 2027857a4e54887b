//! Out-of-band notifications about lease lifecycle events.

use async_trait::async_trait;
use pkg_types::lease::Lease;
use pkg_types::validate::validate_name;
use std::path::PathBuf;
use tracing::{info, warn};

/// Best-effort messaging channel. Failures are logged by the engine and
/// never block the operation that triggered them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, lease: &Lease, message: &str) -> anyhow::Result<()>;

    async fn notify_with_attachment(
        &self,
        lease: &Lease,
        message: &str,
        filename: &str,
        data: &[u8],
    ) -> anyhow::Result<()>;
}

/// Writes notifications to the log; attachments are saved to a directory
/// when one is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    attachments_dir: Option<PathBuf>,
}

impl LogNotifier {
    pub fn new(attachments_dir: Option<PathBuf>) -> Self {
        Self { attachments_dir }
    }
}

fn recipient(lease: &Lease) -> &str {
    lease.requested_by.as_deref().unwrap_or("unknown")
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, lease: &Lease, message: &str) -> anyhow::Result<()> {
        info!("[notify {}] lease {}: {}", recipient(lease), lease.name, message);
        Ok(())
    }

    async fn notify_with_attachment(
        &self,
        lease: &Lease,
        message: &str,
        filename: &str,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let Some(dir) = &self.attachments_dir else {
            info!(
                "[notify {}] lease {}: {} ({} dropped, {} bytes)",
                recipient(lease),
                lease.name,
                message,
                filename,
                data.len()
            );
            return Ok(());
        };
        validate_name(&lease.name)?;
        if std::path::Path::new(filename).file_name() != Some(std::ffi::OsStr::new(filename)) {
            anyhow::bail!("attachment name '{}' is not a plain file name", filename);
        }
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, data).await?;
        info!(
            "[notify {}] lease {}: {} (attachment {})",
            recipient(lease),
            lease.name,
            message,
            path.display()
        );
        Ok(())
    }
}

/// Send a notification, logging instead of propagating any failure.
pub(crate) async fn deliver(
    notifier: &dyn Notifier,
    lease: &Lease,
    message: &str,
    attachment: Option<(&str, &[u8])>,
) {
    let result = match attachment {
        Some((filename, data)) => {
            notifier
                .notify_with_attachment(lease, message, filename, data)
                .await
        }
        None => notifier.notify(lease, message).await,
    };
    if let Err(e) = result {
        warn!("Notification for lease {} failed: {}", lease.name, e);
    }
}

/// Captures notifications in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<Notification>>,
    fail: std::sync::atomic::AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub lease: String,
    pub message: String,
    pub attachment: Option<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail.
    pub fn fail_deliveries(&self) {
        self.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn push(&self, lease: &Lease, message: &str, attachment: Option<&str>) -> anyhow::Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("notification channel unavailable");
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Notification {
                lease: lease.name.clone(),
                message: message.to_string(),
                attachment: attachment.map(str::to_string),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, lease: &Lease, message: &str) -> anyhow::Result<()> {
        self.push(lease, message, None)
    }

    async fn notify_with_attachment(
        &self,
        lease: &Lease,
        message: &str,
        filename: &str,
        _data: &[u8],
    ) -> anyhow::Result<()> {
        self.push(lease, message, Some(filename))
    }
}
