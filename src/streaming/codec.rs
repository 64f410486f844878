use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::error::FrameError;

use super::protocol::ServerMessage;

const FRAME_LENGTH_BYTES: usize = 4;

enum ReadState {
    WaitingForLength,
    WaitingForPayload { expected_length: usize },
}

/// Reads `[u32 LE length][payload]` messages.
pub trait MessageReader: Send {
    /// `Ok(None)` when the peer closed the stream between messages.
    fn read<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, FrameError>> + Send + 'a>>;
}

pub trait MessageWriter: Send {
    fn write<'a>(
        &'a mut self,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), FrameError>> + Send + 'a>>;

    fn send<'a>(
        &'a mut self,
        message: &'a ServerMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), FrameError>> + Send + 'a>> {
        Box::pin(async move {
            let payload = serde_json::to_vec(message)?;
            self.write(&payload).await
        })
    }
}

pub struct FramedReader<T>
where
    T: AsyncRead + Unpin + Send,
{
    reader: BufReader<T>,
    max_length: usize,
}

impl<T: AsyncRead + Unpin + Send> FramedReader<T> {
    pub fn new(stream: T, max_length: usize) -> Self {
        Self {
            reader: BufReader::new(stream),
            max_length,
        }
    }

    async fn read_length(&mut self) -> Result<Option<usize>, FrameError> {
        let mut length_buffer = [0u8; FRAME_LENGTH_BYTES];
        match self.reader.read_exact(&mut length_buffer).await {
            Ok(_) => Ok(Some(u32::from_le_bytes(length_buffer) as usize)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(FrameError::Read(e)),
        }
    }
}

impl<T: AsyncRead + Unpin + Send> MessageReader for FramedReader<T> {
    fn read<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, FrameError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = ReadState::WaitingForLength;
            loop {
                match state {
                    ReadState::WaitingForLength => match self.read_length().await? {
                        Some(length) if length > self.max_length => {
                            return Err(FrameError::TooLarge(length, self.max_length));
                        }
                        Some(expected_length) => {
                            state = ReadState::WaitingForPayload { expected_length };
                        }
                        None => return Ok(None),
                    },
                    ReadState::WaitingForPayload { expected_length } => {
                        let mut payload = vec![0u8; expected_length];
                        self.reader
                            .read_exact(&mut payload)
                            .await
                            .map_err(FrameError::Read)?;
                        return Ok(Some(payload));
                    }
                }
            }
        })
    }
}

pub struct FramedWriter<T>
where
    T: AsyncWrite + Unpin + Send,
{
    writer: BufWriter<T>,
    max_length: usize,
}

impl<T: AsyncWrite + Unpin + Send> FramedWriter<T> {
    pub fn new(stream: T, max_length: usize) -> Self {
        Self {
            writer: BufWriter::new(stream),
            max_length,
        }
    }
}

impl<T: AsyncWrite + Unpin + Send> MessageWriter for FramedWriter<T> {
    fn write<'a>(
        &'a mut self,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), FrameError>> + Send + 'a>> {
        Box::pin(async move {
            if payload.len() > self.max_length || payload.len() > u32::MAX as usize {
                return Err(FrameError::TooLarge(payload.len(), self.max_length));
            }
            let length = (payload.len() as u32).to_le_bytes();
            self.writer
                .write_all(&length)
                .await
                .map_err(FrameError::Write)?;
            self.writer
                .write_all(payload)
                .await
                .map_err(FrameError::Write)?;
            self.writer.flush().await.map_err(FrameError::Write)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_survive_the_wire_in_order() {
        let (client, server) = tokio::io::duplex(256);
        let mut writer = FramedWriter::new(client, 1024);
        let mut reader = FramedReader::new(server, 1024);

        writer.write(br#"{"type":"ping"}"#).await.unwrap();
        writer.write(b"").await.unwrap();
        drop(writer);

        assert_eq!(
            reader.read().await.unwrap().as_deref(),
            Some(&br#"{"type":"ping"}"#[..])
        );
        assert_eq!(reader.read().await.unwrap(), Some(Vec::new()));
        assert_eq!(reader.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = FramedReader::new(server, 8);
        client.write_all(&100u32.to_le_bytes()).await.unwrap();
        assert!(matches!(
            reader.read().await,
            Err(FrameError::TooLarge(100, 8))
        ));
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = FramedReader::new(server, 64);
        client.write_all(&10u32.to_le_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);
        assert!(matches!(reader.read().await, Err(FrameError::Read(_))));
    }

    #[tokio::test]
    async fn writer_refuses_oversized_payloads() {
        let (client, _server) = tokio::io::duplex(64);
        let mut writer = FramedWriter::new(client, 4);
        assert!(matches!(
            writer.write(b"too long").await,
            Err(FrameError::TooLarge(8, 4))
        ));
    }
}
