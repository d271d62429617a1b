//! NDJSON stream decoding (bytes -> typed chunks).

use super::api::GenerateResponse;
use crate::{BoxStream, Error};
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde::Deserialize;

/// In-band error frame the runtime emits instead of a chunk.
#[derive(Debug, Deserialize)]
struct ErrorFrame {
    error: String,
}

/// Decode an NDJSON byte stream into generation chunks.
///
/// One JSON object per line; blank lines are skipped. The stream ends after
/// the chunk carrying `done: true` even if the transport keeps the connection
/// open, and any trailing bytes are ignored. An in-band `{"error": ...}`
/// frame surfaces as a runtime error and also terminates the stream.
pub(crate) fn decode_chunks(input: BoxStream<'static, Bytes>) -> BoxStream<'static, GenerateResponse> {
    let stream = stream::unfold(
        (input, String::new(), false),
        move |(mut input, mut buf, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(idx) = buf.find('\n') {
                    let line = buf[..idx].trim().to_string();
                    buf = buf[idx + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }
                    return Some(decode_line(&line, input, buf));
                }

                match input.next().await {
                    Some(Ok(bytes)) => {
                        let s = String::from_utf8_lossy(&bytes);
                        buf.push_str(&s);
                        continue;
                    }
                    Some(Err(e)) => return Some((Err(e), (input, buf, false))),
                    None => {
                        // EOF without a newline: flush whatever is buffered.
                        let line = buf.trim().to_string();
                        if line.is_empty() {
                            return None;
                        }
                        return Some(decode_line(&line, input, String::new()));
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

type DecodeStep = (
    crate::Result<GenerateResponse>,
    (BoxStream<'static, Bytes>, String, bool),
);

fn decode_line(line: &str, input: BoxStream<'static, Bytes>, buf: String) -> DecodeStep {
    // Error frames must be checked first: every chunk field is defaulted, so
    // `{"error": ...}` would otherwise decode into an empty chunk.
    if let Ok(frame) = serde_json::from_str::<ErrorFrame>(line) {
        return (Err(Error::runtime(frame.error)), (input, buf, true));
    }
    match serde_json::from_str::<GenerateResponse>(line) {
        Ok(chunk) => {
            let done = chunk.done;
            (Ok(chunk), (input, buf, done))
        }
        Err(e) => (Err(Error::Serialization(e)), (input, buf, false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(parts: Vec<&'static str>) -> BoxStream<'static, Bytes> {
        Box::pin(tokio_stream::iter(
            parts.into_iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))),
        ))
    }

    async fn collect(input: BoxStream<'static, Bytes>) -> Vec<crate::Result<GenerateResponse>> {
        decode_chunks(input).collect().await
    }

    #[tokio::test]
    async fn test_decodes_one_chunk_per_line() {
        let chunks = collect(byte_stream(vec![
            "{\"response\":\"he\",\"done\":false}\n{\"response\":\"llo\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true,\"eval_count\":2}\n",
        ]))
        .await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_ref().unwrap().response, "he");
        assert_eq!(chunks[1].as_ref().unwrap().response, "llo");
        assert!(chunks[2].as_ref().unwrap().done);
    }

    #[tokio::test]
    async fn test_reassembles_lines_split_across_frames() {
        let chunks = collect(byte_stream(vec![
            "{\"response\":\"par",
            "tial\",\"done\":fal",
            "se}\n{\"response\":\"x\",\"done\":true}\n",
        ]))
        .await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap().response, "partial");
    }

    #[tokio::test]
    async fn test_stops_after_done_chunk() {
        let chunks = collect(byte_stream(vec![
            "{\"response\":\"a\",\"done\":true}\n{\"response\":\"ignored\",\"done\":false}\n",
        ]))
        .await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].as_ref().unwrap().done);
    }

    #[tokio::test]
    async fn test_flushes_final_line_without_newline() {
        let chunks = collect(byte_stream(vec!["{\"response\":\"tail\",\"done\":true}"])).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().response, "tail");
    }

    #[tokio::test]
    async fn test_error_frame_surfaces_and_terminates() {
        let chunks = collect(byte_stream(vec![
            "{\"response\":\"a\",\"done\":false}\n{\"error\":\"model not found\"}\n{\"response\":\"b\",\"done\":false}\n",
        ]))
        .await;
        assert_eq!(chunks.len(), 2);
        let err = chunks[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[tokio::test]
    async fn test_malformed_line_yields_error_but_stream_continues() {
        let chunks = collect(byte_stream(vec![
            "not json\n{\"response\":\"ok\",\"done\":true}\n",
        ]))
        .await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_err());
        assert_eq!(chunks[1].as_ref().unwrap().response, "ok");
    }

    #[tokio::test]
    async fn test_skips_blank_lines() {
        let chunks = collect(byte_stream(vec![
            "\n\n{\"response\":\"a\",\"done\":false}\n\n{\"response\":\"b\",\"done\":true}\n",
        ]))
        .await;
        assert_eq!(chunks.len(), 2);
    }
}
