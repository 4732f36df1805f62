//! Chunked streaming of a file range out of a session reader.

use std::io::SeekFrom;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::range::{ByteRange, parse_range_header};
use super::{StreamingError, content_type};
use crate::engine::FileReader;
use crate::session::Session;

const X_FILENAME: HeaderName = HeaderName::from_static("x-filename");
const X_FILESIZE: HeaderName = HeaderName::from_static("x-filesize");
const X_CONTENT_TYPE: HeaderName = HeaderName::from_static("x-content-type");

/// Status, headers and lazily produced body of a stream request.
pub struct StreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl StreamResponse {
    /// Drains the body into memory. Intended for small files and tests.
    pub async fn collect(self) -> std::io::Result<Bytes> {
        let mut buffer = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

impl IntoResponse for StreamResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, Body::from_stream(self.body)).into_response()
    }
}

/// Opens a streaming response for one file of a session.
///
/// `file_index` falls back to the largest file when absent or out of range.
/// Chunks are read lazily, so the client starts receiving data before the
/// whole range is available.
///
/// # Errors
/// - `StreamingError::NoFiles` - Session has no files
/// - `StreamingError::RangeNotSatisfiable` - Range outside the file
/// - `StreamingError::Engine` - Reader could not be opened
/// - `StreamingError::Io` - Seek to the range start failed
pub async fn open_stream(
    session: &Session,
    file_index: Option<usize>,
    range_header: Option<&str>,
    chunk_size: usize,
) -> Result<StreamResponse, StreamingError> {
    let (index, file) = session
        .select_file(file_index)
        .ok_or_else(|| StreamingError::NoFiles {
            key: session.key().clone(),
        })?;

    let file_size = file.size;
    let file_name = file.file_name().to_string();
    let mime = content_type(&file_name);

    let range = match range_header {
        Some(value) => parse_range_header(value, file_size)?,
        None => None,
    };

    let (status, start, length) = match range {
        Some(ByteRange { start, end }) => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
        None => (StatusCode::OK, 0, file_size),
    };

    tracing::info!(
        "Streaming {} [{}] from {} ({} of {} bytes starting at {})",
        file_name,
        index,
        session.key(),
        length,
        file_size,
        start
    );

    let mut reader = session.open_reader(index).await?;
    if start > 0 {
        reader.seek(SeekFrom::Start(start)).await?;
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(range) = range
        && let Ok(value) = HeaderValue::from_str(&range.content_range(file_size))
    {
        headers.insert(header::CONTENT_RANGE, value);
    }
    let encoded_name = urlencoding::encode(&file_name);
    if let Ok(value) = HeaderValue::from_str(&format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        file_name.replace('"', ""),
        encoded_name
    )) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(X_FILENAME, header_text(&file_name));
    headers.insert(X_FILESIZE, HeaderValue::from(file_size));
    headers.insert(X_CONTENT_TYPE, HeaderValue::from_static(mime));

    Ok(StreamResponse {
        status,
        headers,
        body: chunked_body(reader, length, chunk_size, file_name),
    })
}

/// Header value for arbitrary text, percent-encoded when not plain ASCII.
fn header_text(text: &str) -> HeaderValue {
    HeaderValue::from_str(text)
        .or_else(|_| HeaderValue::from_str(&urlencoding::encode(text)))
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

struct ChunkState {
    reader: Box<dyn FileReader>,
    remaining: u64,
    chunk_size: usize,
    file_name: String,
}

fn chunked_body(
    reader: Box<dyn FileReader>,
    length: u64,
    chunk_size: usize,
    file_name: String,
) -> BoxStream<'static, std::io::Result<Bytes>> {
    let state = ChunkState {
        reader,
        remaining: length,
        chunk_size: chunk_size.max(1),
        file_name,
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        if state.remaining == 0 {
            return None;
        }

        let want = state.remaining.min(state.chunk_size as u64) as usize;
        let mut buffer = vec![0u8; want];

        match state.reader.read(&mut buffer).await {
            Ok(0) => {
                tracing::debug!(
                    "{} ended with {} bytes still expected",
                    state.file_name,
                    state.remaining
                );
                None
            }
            Ok(n) => {
                buffer.truncate(n);
                state.remaining -= n as u64;
                tracing::trace!("Sent {} bytes of {}", n, state.file_name);
                Some((Ok(Bytes::from(buffer)), Some(state)))
            }
            Err(e) => {
                tracing::error!("Error reading {}: {}", state.file_name, e);
                Some((Err(e), None))
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

    use super::*;
    use crate::engine::{ContentHandle, EngineError};
    use crate::session::test_support;
    use crate::session::{FileDescriptor, ProgressSnapshot, SessionKey};

    fn sample(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_range_request_returns_partial_content() {
        let data = sample(1000);
        let session = test_support::session(1, vec![("movie.mp4", data.clone())]);

        let response = open_stream(&session, Some(0), Some("bytes=100-199"), 64)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers[header::CONTENT_RANGE], "bytes 100-199/1000");
        assert_eq!(response.headers[header::CONTENT_LENGTH], "100");
        assert_eq!(response.headers[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers["x-filesize"], "1000");

        let body = response.collect().await.unwrap();
        assert_eq!(body.len(), 100);
        assert_eq!(body, data.slice(100..200));
    }

    #[tokio::test]
    async fn test_no_range_returns_whole_file() {
        let data = sample(1000);
        let session = test_support::session(1, vec![("movie.mkv", data.clone())]);

        let response = open_stream(&session, None, None, 64).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[header::CONTENT_LENGTH], "1000");
        assert_eq!(response.headers[header::ACCEPT_RANGES], "bytes");
        assert!(response.headers.get(header::CONTENT_RANGE).is_none());
        assert_eq!(response.collect().await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_invalid_index_selects_largest_file() {
        let session = test_support::session(
            1,
            vec![("a.srt", sample(10)), ("b.mkv", sample(300)), ("c.nfo", sample(5))],
        );

        let response = open_stream(&session, Some(9), None, 64).await.unwrap();
        assert_eq!(response.headers["x-filename"], "b.mkv");
        assert_eq!(response.collect().await.unwrap().len(), 300);
    }

    #[tokio::test]
    async fn test_out_of_bounds_range_is_rejected() {
        let session = test_support::session(1, vec![("movie.mp4", sample(1000))]);
        let result = open_stream(&session, Some(0), Some("bytes=1000-"), 64).await;
        assert!(matches!(
            result,
            Err(StreamingError::RangeNotSatisfiable { total_size: 1000 })
        ));
    }

    #[tokio::test]
    async fn test_empty_session_is_not_found() {
        let session = test_support::session(1, vec![]);
        let result = open_stream(&session, None, None, 64).await;
        assert!(matches!(result, Err(StreamingError::NoFiles { .. })));
    }

    struct FailingReader {
        served: bool,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.served {
                return Poll::Ready(Err(std::io::Error::other("engine dropped")));
            }
            self.served = true;
            buf.put_slice(&[7u8; 8]);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncSeek for FailingReader {
        fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> std::io::Result<()> {
            Ok(())
        }

        fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
            Poll::Ready(Ok(0))
        }
    }

    struct FailingHandle;

    #[async_trait]
    impl ContentHandle for FailingHandle {
        fn key(&self) -> SessionKey {
            test_support::key(9)
        }
        async fn wait_info(&self) {}
        fn display_name(&self) -> String {
            "failing".to_string()
        }
        fn files(&self) -> Vec<FileDescriptor> {
            vec![FileDescriptor::new("broken.mkv", 64)]
        }
        async fn open_reader(&self, _file_index: usize) -> Result<Box<dyn FileReader>, EngineError> {
            Ok(Box::new(FailingReader { served: false }))
        }
        fn progress(&self) -> ProgressSnapshot {
            ProgressSnapshot::default()
        }
        fn serialize_metadata(&self) -> Result<Vec<u8>, EngineError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let session = Session::from_handle(std::sync::Arc::new(FailingHandle));
        let response = open_stream(&session, None, None, 16).await.unwrap();

        let chunks: Vec<_> = response.body.collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap().len(), 8);
        assert!(chunks[1].is_err());
    }
}
