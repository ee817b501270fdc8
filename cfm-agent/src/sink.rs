//! Where transmitted CCMs go

use async_trait::async_trait;
use bytes::Bytes;
use cfm_core::{Error, MepKey, Result};
use tokio::sync::mpsc;

/// Egress for stamped CCM frames
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Send one complete Ethernet frame on the MEP's residence port
    async fn send(&self, key: &MepKey, frame: Bytes) -> Result<()>;
}

/// Forwards every frame into a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(MepKey, Bytes)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(MepKey, Bytes)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&self, key: &MepKey, frame: Bytes) -> Result<()> {
        self.tx
            .send((key.clone(), frame))
            .map_err(|_| Error::Shutdown("frame receiver dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut rx) = ChannelSink::new();
        let key = MepKey::new("md", "ma", 1);
        sink.send(&key, Bytes::from_static(&[1, 2, 3])).await.unwrap();

        let (got_key, frame) = rx.recv().await.unwrap();
        assert_eq!(got_key, key);
        assert_eq!(&frame[..], &[1, 2, 3]);

        drop(rx);
        assert!(sink.send(&key, Bytes::new()).await.is_err());
    }
}
