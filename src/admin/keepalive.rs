use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant};

use crate::utils::Duration;

// Interval between keep-alive bursts while a slow admin operation holds
// a response stream open.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

// Whitespace a JSON reader skips over.
const KEEP_ALIVE_BYTES: &[u8] = b"\n\r";

// Keeps a held-open response stream alive while a slow operation runs.
// Races a periodic timer against the operation's completion signal:
// every period, whitespace is written and flushed; once the result
// arrives the timer stops and the result is returned for the caller to
// write, strictly after any keep-alive bytes and exactly once.
pub async fn keep_conn_live<W, T>(
    w: &mut W,
    period: Duration,
    mut result_rx: oneshot::Receiver<T>,
) -> anyhow::Result<T>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                w.write_all(KEEP_ALIVE_BYTES).await?;
                w.flush().await?;
            }
            res = &mut result_rx => {
                return res.map_err(|_| {
                    anyhow::anyhow!("operation dropped before producing a result")
                });
            }
        }
    }
}
