//! Line-oriented driver: one key in, one decision out.

use std::future::Future;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::Result;
use crate::ratelimit::{Clock, FixedWindowLimiter};

/// How decisions are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `<key>\tallowed` or `<key>\trejected`
    #[default]
    Text,
    /// `{"key":"<key>","admitted":true}`
    Json,
}

/// One decision as written in JSON output.
#[derive(Debug, Serialize)]
struct DecisionRecord<'a> {
    key: &'a str,
    admitted: bool,
}

/// Totals over a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub admitted: u64,
    pub rejected: u64,
}

impl ReplaySummary {
    /// Requests seen.
    pub fn total(&self) -> u64 {
        self.admitted + self.rejected
    }
}

/// Feed every non-blank line of `reader` through `limiter` as a key.
///
/// Stops at end of input or when `shutdown` resolves, whichever comes first.
/// Lines are trimmed before use.
pub async fn replay<C, R, W, F>(
    limiter: &FixedWindowLimiter<String, C>,
    reader: R,
    mut writer: W,
    format: OutputFormat,
    shutdown: F,
) -> Result<ReplaySummary>
where
    C: Clock,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let mut lines = reader.lines();
    let mut summary = ReplaySummary::default();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => {
                info!("Replay interrupted");
                break;
            }
        };
        let Some(line) = line else {
            debug!("End of input");
            break;
        };

        let key = line.trim();
        if key.is_empty() {
            continue;
        }

        let admitted = limiter.handle_request(&key.to_string());
        if admitted {
            summary.admitted += 1;
        } else {
            summary.rejected += 1;
        }

        let mut out = match format {
            OutputFormat::Text => {
                let verdict = if admitted { "allowed" } else { "rejected" };
                format!("{}\t{}", key, verdict)
            }
            OutputFormat::Json => serde_json::to_string(&DecisionRecord { key, admitted })?,
        };
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
    }

    writer.flush().await?;
    Ok(summary)
}
