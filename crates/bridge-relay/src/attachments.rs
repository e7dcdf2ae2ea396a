use std::sync::Arc;

use bridge_types::models::{Attachment, OutboundFile};
use bridge_types::platform::Platform;
use futures_util::future::join_all;
use tracing::warn;

use crate::call::CallGuard;

/// Oversized attachments are linked rather than re-uploaded.
pub fn oversized_footer(attachments: &[Attachment], max_bytes: u64) -> String {
    attachments
        .iter()
        .filter(|a| a.size > max_bytes)
        .fold(String::new(), |mut footer, a| {
            footer.push('\n');
            footer.push_str(&a.url);
            footer
        })
}

/// Downloads every attachment at or below the threshold, in order.
/// A failed download is logged and the attachment dropped.
pub async fn download_small(
    platform: &Arc<dyn Platform>,
    guard: &CallGuard,
    attachments: &[Attachment],
    max_bytes: u64,
) -> Vec<OutboundFile> {
    let downloads = attachments.iter().filter(|a| a.size <= max_bytes).map(|a| async move {
        match guard.run(platform.download(&a.url, max_bytes)).await {
            Ok(data) => Some(OutboundFile {
                filename: a.filename.clone(),
                description: a.description.clone(),
                data,
            }),
            Err(e) => {
                warn!(attachment_id = %a.id, filename = %a.filename, error = %e, "Failed to download attachment");
                None
            }
        }
    });

    join_all(downloads).await.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::AttachmentId;

    fn attachment(id: u64, size: u64) -> Attachment {
        Attachment {
            id: AttachmentId::new(id),
            filename: format!("f{}.bin", id),
            description: None,
            size,
            url: format!("https://cdn.example/{}", id),
            content_type: None,
        }
    }

    #[test]
    fn footer_lists_only_oversized() {
        let list = [attachment(1, 10), attachment(2, 100), attachment(3, 101)];
        assert_eq!(oversized_footer(&list, 100), "\nhttps://cdn.example/3");
        assert_eq!(oversized_footer(&list[..2], 100), "");
    }
}
