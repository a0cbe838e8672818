//! Bounded buffering of origin response bodies
//!
//! Multimedia responses are only tiered into the content store when they fit
//! under the response size limit. Anything larger is handed back as a body
//! that replays the bytes already read and then streams the rest.

use crate::proxy::headers::CONTENT_LENGTH;
use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Outcome of [`buffer_up_to`]
pub enum Buffered {
    Complete(Bytes),
    /// The body exceeded the limit; the full body is still available
    TooLarge(Body),
}

/// Declared length of a response, when the origin sent a usable one
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Read `body` into memory as long as it stays within `limit` bytes.
///
/// Trailers are dropped from a completely buffered body.
pub async fn buffer_up_to(mut body: Body, limit: usize) -> Result<Buffered, axum::Error> {
    let mut buffer = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };
        buffer.extend_from_slice(&data);
        if buffer.len() > limit {
            let replay = ReplayBody::new(buffer.freeze(), body);
            return Ok(Buffered::TooLarge(Body::new(replay)));
        }
    }
    Ok(Buffered::Complete(buffer.freeze()))
}

pin_project! {
    /// Yields an already read prefix, then the remainder of the inner body
    pub struct ReplayBody<B> {
        prefix: Option<Bytes>,
        #[pin]
        rest: B,
    }
}

impl<B> ReplayBody<B> {
    pub fn new(prefix: Bytes, rest: B) -> Self {
        Self {
            prefix: Some(prefix).filter(|prefix| !prefix.is_empty()),
            rest,
        }
    }
}

impl<B> http_body::Body for ReplayBody<B>
where
    B: http_body::Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        if let Some(prefix) = this.prefix.take() {
            return Poll::Ready(Some(Ok(Frame::data(prefix))));
        }
        this.rest.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.prefix.is_none() && self.rest.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let rest = self.rest.size_hint();
        let prefix = self.prefix.as_ref().map_or(0, |prefix| prefix.len() as u64);
        let mut hint = SizeHint::new();
        hint.set_lower(rest.lower() + prefix);
        if let Some(upper) = rest.upper() {
            hint.set_upper(upper + prefix);
        }
        hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::test_utils::body_text;
    use futures_util::stream;
    use http::HeaderValue;

    fn chunked(chunks: &[&'static str]) -> Body {
        let frames: Vec<Result<Bytes, std::io::Error>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();
        Body::from_stream(stream::iter(frames))
    }

    #[tokio::test]
    async fn test_small_body_is_buffered() {
        let buffered = buffer_up_to(chunked(&["ab", "cd"]), 4).await.unwrap();
        assert!(matches!(buffered, Buffered::Complete(bytes) if bytes == "abcd"));
    }

    #[tokio::test]
    async fn test_large_body_is_replayed_in_full() {
        let buffered = buffer_up_to(chunked(&["ab", "cd", "ef", "gh"]), 3)
            .await
            .unwrap();
        let Buffered::TooLarge(body) = buffered else {
            panic!("body should not fit");
        };

        let response = http::Response::new(body);
        assert_eq!(body_text(response).await, "abcdefgh");
    }

    #[tokio::test]
    async fn test_replay_size_hint_includes_prefix() {
        let replay = ReplayBody::new(Bytes::from_static(b"abc"), Body::from("defg"));
        assert_eq!(http_body::Body::size_hint(&replay).exact(), Some(7));
    }

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));
        assert_eq!(declared_length(&headers), Some(1024));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("many"));
        assert_eq!(declared_length(&headers), None);
    }
}
