// src/infrastructure/push/mod.rs
// WebSocket reader feeding push events into the realtime bridge

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::application::realtime::RealtimeBridge;
use crate::domain::errors::{PushError, PushResult};

pub struct PushClient {
    url: String,
    bridge: Arc<RealtimeBridge>,
    reconnect_delay: Duration,
}

impl PushClient {
    pub fn new(url: &str, bridge: Arc<RealtimeBridge>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.to_string(),
            bridge,
            reconnect_delay,
        }
    }

    /// Run the reader until the task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(&self) {
        loop {
            match self.read_session().await {
                Ok(()) => log::info!("Push channel closed by server"),
                Err(e) => log::error!("Push channel error: {}", e),
            }

            self.bridge.set_connected(false);
            tokio::time::sleep(self.reconnect_delay).await;
            log::info!("Reconnecting push channel to {}", self.url);
        }
    }

    /// One connection's lifetime: returns when the socket closes
    pub async fn read_session(&self) -> PushResult<()> {
        let (mut ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| PushError::Connection(format!("WebSocket connection failed: {}", e)))?;

        self.bridge.set_connected(true);

        while let Some(msg) = ws_stream.next().await {
            match msg {
                Ok(Message::Text(txt)) => {
                    if let Err(e) = self.bridge.apply_text(&txt) {
                        log::warn!("Ignoring push frame: {}", e);
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(e) => return Err(PushError::Connection(e.to_string())),
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cache::{QueryCache, QueryKey};
    use crate::application::store::ClientStore;
    use crate::domain::models::TradingStatus;
    use futures_util::SinkExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn applies_frames_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text("not json".to_string())).await.unwrap();
            ws.send(Message::Text(
                r#"{"type":"STATUS_UPDATE","data":{"isActive":true,"symbol":"AUDUSD"}}"#
                    .to_string(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        });

        let cache = Arc::new(QueryCache::new());
        let store = Arc::new(ClientStore::new());
        let bridge = RealtimeBridge::new(cache.clone(), store.clone());
        let client = PushClient::new(
            &format!("ws://{}", addr),
            bridge,
            Duration::from_millis(10),
        );

        client.read_session().await.unwrap();

        let status = cache.get::<TradingStatus>(&QueryKey::TradingStatus).unwrap();
        assert!(status.value.is_active);
        assert_eq!(status.value.symbol.as_deref(), Some("AUDUSD"));
        assert!(store.is_push_connected());
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let bridge = RealtimeBridge::new(
            Arc::new(QueryCache::new()),
            Arc::new(ClientStore::new()),
        );
        let client = PushClient::new("ws://127.0.0.1:1", bridge, Duration::from_millis(10));
        assert!(matches!(
            client.read_session().await,
            Err(PushError::Connection(_))
        ));
    }
}
