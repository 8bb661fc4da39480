//! Server-sent events over a streaming HTTP response.
//!
//! Only `data:` lines matter to chat completion streams:
//!
//! ```text
//! data: {"choices":[...]}
//!
//! data: [DONE]
//! ```

use futures::stream::{self, Stream, StreamExt};

/// Extension trait turning a `reqwest::Response` into a stream of SSE data payloads.
pub trait SseResponseExt {
    /// Yields the payload of every `data:` line until `[DONE]` or end of body.
    fn sse(self) -> impl Stream<Item = Result<String, reqwest::Error>> + Send;
}

impl SseResponseExt for reqwest::Response {
    fn sse(self) -> impl Stream<Item = Result<String, reqwest::Error>> + Send {
        let bytes = Box::pin(self.bytes_stream());
        data_lines(bytes)
    }
}

/// Split a byte stream into SSE data payloads.
///
/// Chunks may end mid-line (or mid UTF-8 sequence), so bytes are buffered
/// until a newline arrives.
fn data_lines<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]>,
    E: Send,
{
    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut ended)| async move {
            loop {
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_data_line(&line) {
                        Some(data) if is_done_marker(data) => return None,
                        Some(data) => {
                            let data = data.to_string();
                            return Some((Ok(data), (bytes, buffer, ended)));
                        }
                        None => continue,
                    }
                }

                if ended {
                    if buffer.is_empty() {
                        return None;
                    }
                    let rest = std::mem::take(&mut buffer);
                    let line = String::from_utf8_lossy(&rest);
                    return match parse_data_line(&line) {
                        Some(data) if !is_done_marker(data) => {
                            let data = data.to_string();
                            Some((Ok(data), (bytes, buffer, ended)))
                        }
                        _ => None,
                    };
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        // The body is unusable after a transport error.
                        buffer.clear();
                        ended = true;
                        return Some((Err(e), (bytes, buffer, ended)));
                    }
                    None => ended = true,
                }
            }
        },
    )
}

/// Extract the payload of an SSE `data:` line.
pub fn parse_data_line(line: &str) -> Option<&str> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix("data:")
        .map(str::trim)
        .filter(|data| !data.is_empty())
}

/// Whether an SSE payload marks the end of the stream.
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}
