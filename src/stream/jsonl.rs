//! Newline-delimited JSON post source.

use super::{PostListener, RawPost, StreamError, StreamSource};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

/// Reads one JSON [`RawPost`] per line from `reader` until EOF or cancellation.
///
/// Blank lines are ignored and malformed lines are logged and skipped. When keywords are
/// configured, only posts whose text contains one of them (ignoring case) are forwarded.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    reader: R,
    keywords: Vec<String>,
}

impl<R> JsonLinesSource<R> {
    pub fn new(reader: R, keywords: &[String]) -> Self {
        Self { reader, keywords: keywords.iter().map(|k| k.to_lowercase()).collect() }
    }

    fn matches(&self, post: &RawPost) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let text = post.text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

#[async_trait]
impl<R> StreamSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn run(
        mut self: Box<Self>,
        listener: Arc<dyn PostListener>,
        cancel: CancellationToken,
    ) -> Result<(), StreamError> {
        tracing::info!(keywords = ?self.keywords, "started filtering post stream");
        let mut line = Vec::new();
        let mut line_no = 0u64;
        loop {
            line.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = self.reader.read_until(b'\n', &mut line) => read?,
            };
            if read == 0 {
                tracing::info!(lines = line_no, "post stream ended");
                break;
            }
            line_no += 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<RawPost>(&line) {
                Ok(post) if self.matches(&post) => listener.on_post(post),
                Ok(post) => tracing::debug!(post_id = post.id, "post filtered out"),
                Err(err) => tracing::warn!(line = line_no, error = %err, "skipping malformed post"),
            }
        }
        Ok(())
    }
}
