//! Length-prefixed framing
//!
//! Every message on a stream transport is one frame:
//!
//! ```text
//! [4-byte length as u32 big-endian] [payload]
//! ```
//!
//! A frame is all-or-nothing: a short read anywhere inside it is an error,
//! never a partial message. End of stream before the first header byte is a
//! clean close and is reported as `ConnectionClosed`.
//!
//! Both a blocking ([`read_frame`] / [`write_frame`]) and an async
//! ([`read_frame_async`] / [`write_frame_async`]) flavor are provided. The
//! server and the async transport use the async one.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, SigrpcError};

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = 4;

/// Default maximum payload size (100 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Payload buffers start at most this big and grow as bytes arrive.
const INITIAL_READ_CAPACITY: usize = 64 * 1024;

/// Map IO errors to frame-level errors
///
/// - Unexpected end of stream inside a frame -> `Connection`
/// - Reset/aborted/broken connections -> `Connection`
/// - Everything else, including timeouts, -> `Io`
///
/// Timeouts stay `Io` so that the owner of the stream, which knows the
/// configured limit, can report them as `Timeout`.
pub fn map_io_error(err: std::io::Error, context: &str) -> SigrpcError {
    match err.kind() {
        ErrorKind::UnexpectedEof => {
            SigrpcError::Connection(format!("{}: stream ended mid-frame", context))
        }
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe => SigrpcError::Connection(format!("{}: Connection lost", context)),
        _ => SigrpcError::Io(err),
    }
}

fn check_len(len: usize, max: usize) -> Result<()> {
    if len == 0 {
        return Err(SigrpcError::EmptyFrame);
    }
    if len > max {
        return Err(SigrpcError::FrameTooLarge { size: len, max });
    }
    Ok(())
}

fn encode_header(len: usize, max: usize) -> Result<[u8; HEADER_LEN]> {
    check_len(len, max)?;
    let len = u32::try_from(len).map_err(|_| SigrpcError::FrameTooLarge {
        size: len,
        max: u32::MAX as usize,
    })?;
    Ok(len.to_be_bytes())
}

/// Writes one frame.
///
/// # Errors
///
/// - `EmptyFrame` if `payload` is empty
/// - `FrameTooLarge` if `payload` exceeds `max_frame_size`
/// - `Connection` / `Io` if writing fails
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8], max_frame_size: usize) -> Result<()> {
    let header = encode_header(payload.len(), max_frame_size)?;

    writer
        .write_all(&header)
        .map_err(|e| map_io_error(e, "writing length prefix"))?;
    writer
        .write_all(payload)
        .map_err(|e| map_io_error(e, "writing data"))?;
    writer
        .flush()
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Reads one frame.
///
/// # Errors
///
/// - `ConnectionClosed` if the stream ends before the header starts
/// - `Connection` if the stream ends inside the header or the payload
/// - `EmptyFrame` / `FrameTooLarge` if the declared length is 0 or too big;
///   no payload bytes are read in that case
pub fn read_frame<R: Read>(reader: &mut R, max_frame_size: usize) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;

    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Err(SigrpcError::ConnectionClosed),
            Ok(0) => {
                return Err(SigrpcError::Connection(
                    "reading length prefix: stream ended mid-frame".into(),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(map_io_error(e, "reading length prefix")),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    check_len(len, max_frame_size)?;

    let mut buf = Vec::with_capacity(len.min(INITIAL_READ_CAPACITY));
    let read = reader
        .by_ref()
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|e| map_io_error(e, "reading data"))?;
    if read < len {
        return Err(SigrpcError::Connection("reading data: stream ended mid-frame".into()));
    }

    Ok(buf)
}

/// Async version of [`write_frame`].
pub async fn write_frame_async<W>(writer: &mut W, payload: &[u8], max_frame_size: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = encode_header(payload.len(), max_frame_size)?;

    writer
        .write_all(&header)
        .await
        .map_err(|e| map_io_error(e, "writing length prefix"))?;
    writer
        .write_all(payload)
        .await
        .map_err(|e| map_io_error(e, "writing data"))?;
    writer
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Async version of [`read_frame`].
///
/// Waiting for the first header byte is unbounded, since an idle connection
/// is legitimate. Once it has arrived, the rest of the header and the
/// payload must follow within `frame_timeout` if one is given, otherwise
/// `Timeout` is returned.
pub async fn read_frame_async<R>(
    reader: &mut R,
    max_frame_size: usize,
    frame_timeout: Option<Duration>,
) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];

    loop {
        match reader.read(&mut header[..1]).await {
            Ok(0) => return Err(SigrpcError::ConnectionClosed),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(map_io_error(e, "reading length prefix")),
        }
    }

    let rest = read_frame_rest(reader, header, max_frame_size);
    match frame_timeout {
        Some(limit) => tokio::time::timeout(limit, rest)
            .await
            .map_err(|_| SigrpcError::Timeout(limit.as_millis() as u64))?,
        None => rest.await,
    }
}

async fn read_frame_rest<R>(reader: &mut R, mut header: [u8; HEADER_LEN], max_frame_size: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    reader
        .read_exact(&mut header[1..])
        .await
        .map_err(|e| map_io_error(e, "reading length prefix"))?;

    let len = u32::from_be_bytes(header) as usize;
    check_len(len, max_frame_size)?;

    let mut buf = Vec::with_capacity(len.min(INITIAL_READ_CAPACITY));
    let read = (&mut *reader)
        .take(len as u64)
        .read_to_end(&mut buf)
        .await
        .map_err(|e| map_io_error(e, "reading data"))?;
    if read < len {
        return Err(SigrpcError::Connection("reading data: stream ended mid-frame".into()));
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        write_frame(&mut buf, payload, DEFAULT_MAX_FRAME_SIZE).unwrap();
        buf
    }

    #[test]
    fn test_header_is_big_endian_length() {
        let buf = framed(b"hello");
        assert_eq!(&buf[..4], &[0, 0, 0, 5]);
        assert_eq!(&buf[4..], b"hello");
    }

    #[test]
    fn test_read_back_consecutive_frames() {
        let mut buf = framed(b"first");
        buf.extend(framed(b"second"));
        let mut cursor = Cursor::new(buf);

        assert_eq!(read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).unwrap(), b"first");
        assert_eq!(read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).unwrap(), b"second");
        assert!(matches!(
            read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE),
            Err(SigrpcError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_empty_stream_is_clean_close() {
        let mut cursor = Cursor::new(Vec::new());
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, SigrpcError::ConnectionClosed));
    }

    #[test]
    fn test_partial_header_is_error() {
        let mut cursor = Cursor::new(vec![0u8, 0]);
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, SigrpcError::Connection(_)));
    }

    #[test]
    fn test_short_body_is_error() {
        // Header claims 100 bytes, only 3 follow.
        let mut buf = 100u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"abc");
        let err = read_frame(&mut Cursor::new(buf), DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, SigrpcError::Connection(_)));
    }

    #[test]
    fn test_zero_length_frame_rejected() {
        let buf = 0u32.to_be_bytes().to_vec();
        let err = read_frame(&mut Cursor::new(buf), DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, SigrpcError::EmptyFrame));

        let mut out = Vec::new();
        let err = write_frame(&mut out, b"", DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, SigrpcError::EmptyFrame));
        assert!(out.is_empty());
    }

    #[test]
    fn test_oversized_frame_rejected_without_reading_body() {
        let buf = 2048u32.to_be_bytes().to_vec();
        let err = read_frame(&mut Cursor::new(buf), 1024).unwrap_err();
        assert!(matches!(err, SigrpcError::FrameTooLarge { size: 2048, max: 1024 }));

        let mut out = Vec::new();
        let err = write_frame(&mut out, &[1u8; 2048], 1024).unwrap_err();
        assert!(matches!(err, SigrpcError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            write_frame_async(&mut a, "héllo wörld".as_bytes(), DEFAULT_MAX_FRAME_SIZE)
                .await
                .unwrap();
            a
        });

        let payload = read_frame_async(&mut b, DEFAULT_MAX_FRAME_SIZE, None).await.unwrap();
        assert_eq!(payload, "héllo wörld".as_bytes());

        drop(writer.await.unwrap());
        let err = read_frame_async(&mut b, DEFAULT_MAX_FRAME_SIZE, None).await.unwrap_err();
        assert!(matches!(err, SigrpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_async_body_timeout() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();

        let err = read_frame_async(&mut b, DEFAULT_MAX_FRAME_SIZE, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, SigrpcError::Timeout(50)));
        drop(a);
    }

    #[tokio::test]
    async fn test_async_stalled_header_times_out() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0, 0]).await.unwrap();

        let err = read_frame_async(&mut b, DEFAULT_MAX_FRAME_SIZE, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, SigrpcError::Timeout(50)));
        drop(a);
    }

    #[tokio::test]
    async fn test_async_idle_before_header_not_timed_out() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            write_frame_async(&mut a, b"late", DEFAULT_MAX_FRAME_SIZE).await.unwrap();
            a
        });

        let payload = read_frame_async(&mut b, DEFAULT_MAX_FRAME_SIZE, Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(payload, b"late");
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_async_short_body_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&100u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        let err = read_frame_async(&mut b, DEFAULT_MAX_FRAME_SIZE, None).await.unwrap_err();
        assert!(matches!(err, SigrpcError::Connection(_)));
    }

    #[test]
    fn test_large_claim_with_short_body() {
        let mut buf = (64u32 * 1024 * 1024).to_be_bytes().to_vec();
        buf.extend_from_slice(b"abc");
        let err = read_frame(&mut Cursor::new(buf), DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(matches!(err, SigrpcError::Connection(_)));
    }

    #[test]
    fn test_payload_larger_than_initial_buffer() {
        let payload = vec![7u8; INITIAL_READ_CAPACITY * 3 + 5];
        let mut cursor = Cursor::new(framed(&payload));
        assert_eq!(read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).unwrap(), payload);
    }

    #[test]
    fn test_sync_write_async_read_agree() {
        let buf = framed(b"[\"add\",2,3]");
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let payload = rt
            .block_on(async {
                let mut reader = &buf[..];
                read_frame_async(&mut reader, DEFAULT_MAX_FRAME_SIZE, None).await
            })
            .unwrap();
        assert_eq!(payload, b"[\"add\",2,3]");
    }
}
