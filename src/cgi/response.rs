//! HTTP response → CGI document on stdout.

use axum::http::header::{HeaderName, CONNECTION, TRANSFER_ENCODING};
use axum::response::Response;
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Connection-level headers the web server owns.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == CONNECTION || *name == TRANSFER_ENCODING || name.as_str() == "keep-alive"
}

/// Write `Status:`, the headers, a blank line, then stream the body.
///
/// A body error after the head is written just ends the output; the status
/// is already committed.
pub async fn write_response<W>(response: Response, out: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (parts, body) = response.into_parts();

    let mut head = format!(
        "Status: {} {}\r\n",
        parts.status.as_u16(),
        parts.status.canonical_reason().unwrap_or("")
    )
    .into_bytes();
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    out.write_all(&head).await?;
    out.flush().await?;

    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => out.write_all(&bytes).await?,
            Err(e) => {
                tracing::debug!(error = %e, "Response body ended early");
                break;
            }
        }
    }
    out.flush().await
}
