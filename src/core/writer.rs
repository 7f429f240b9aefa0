use crate::core::codec::PacketCodec;
use crate::core::message::Message;
use crate::error::Result;
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Writes framed messages to an `AsyncWrite`, stamping each with the next sequence number.
///
/// The encode buffer is reused between writes.
pub struct PacketWriter<W> {
    inner: W,
    codec: Arc<dyn PacketCodec>,
    buf: BytesMut,
    next_sequence: u32,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    pub fn new(inner: W, codec: Arc<dyn PacketCodec>) -> Self {
        Self {
            inner,
            codec,
            buf: BytesMut::with_capacity(crate::config::DEFAULT_READ_BUFFER),
            next_sequence: 1,
        }
    }

    /// Encode and flush one message, returning the sequence number it was sent with.
    ///
    /// Encoding failures leave the stream untouched; I/O failures are connection-fatal.
    pub async fn write(&mut self, message: &dyn Message) -> Result<u32> {
        let sequence = self.next_sequence;
        self.buf.clear();
        self.codec.encode(message, sequence, &mut self.buf)?;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        trace!(sequence, bytes = self.buf.len(), "Frame written");
        Ok(sequence)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::core::codec::BinaryCodec;
    use crate::core::reader::PacketReader;
    use crate::protocol::method::MethodKey;
    use crate::protocol::rpc::Request;

    #[tokio::test]
    async fn test_sequences_increase() {
        let codec: Arc<dyn PacketCodec> = Arc::new(BinaryCodec::default());
        let mut writer = PacketWriter::new(Vec::new(), codec.clone());
        let key = MethodKey::new("svc", "Op");
        for i in 0..3 {
            let seq = writer.write(&Request::new(i, key, vec![1, 2])).await.unwrap();
            assert_eq!(seq as u64, i + 1);
        }

        let bytes = writer.into_inner();
        let mut reader = PacketReader::new(&bytes[..], codec);
        for expected in 1..=3u32 {
            assert_eq!(reader.read_frame().await.unwrap().sequence, expected);
        }
    }
}
