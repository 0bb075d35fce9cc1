//! WebSocket gateway to a ledger
//!
//! Frames are JSON, tagged `{"type": ..., "data": ...}`. Every request
//! except `Ping` carries an id that its response echoes, so a client whose
//! earlier request was cancelled can discard the stale answer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::entity::TopicId;
use super::transaction::{FrozenTransaction, Receipt};
use super::{LedgerClient, LedgerError, LedgerResult, TopicMessage};

/// Client to gateway
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[allow(missing_docs)]
pub enum GatewayRequest {
    /// Execute a frozen transaction
    Execute { id: u64, transaction: FrozenTransaction },
    /// Page of topic messages after a sequence number
    TopicMessages {
        id: u64,
        topic_id: TopicId,
        after: u64,
        limit: usize,
    },
    /// Ping
    Ping,
}

/// Gateway to client
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[allow(missing_docs)]
pub enum GatewayResponse {
    /// Transaction reached consensus
    Receipt { id: u64, receipt: Receipt },
    /// Topic page
    Messages { id: u64, messages: Vec<TopicMessage> },
    /// Request failed
    Error { id: u64, error: LedgerError },
    /// Pong
    Pong,
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Ledger client speaking the gateway protocol
///
/// Requests on one client are serialized over a single socket.
pub struct GatewayClient {
    ws: Mutex<Socket>,
    next_id: AtomicU64,
    url: String,
}

impl GatewayClient {
    /// Connect to a gateway
    pub async fn connect(url: &str) -> LedgerResult<Self> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        info!(url, "Connected to ledger gateway");

        Ok(GatewayClient {
            ws: Mutex::new(ws),
            next_id: AtomicU64::new(1),
            url: url.to_string(),
        })
    }

    /// Gateway URL
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, build: impl FnOnce(u64) -> GatewayRequest) -> LedgerResult<GatewayResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&build(id))
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;

        let mut ws = self.ws.lock().await;
        ws.send(Message::Text(json))
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let response: GatewayResponse = serde_json::from_str(&text)
                        .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
                    match response_id(&response) {
                        Some(rid) if rid == id => return Ok(response),
                        other => {
                            debug!(expected = id, got = ?other, "Discarding stale gateway response");
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(LedgerError::Network("gateway closed the connection".to_string()));
                }
                Some(Err(e)) => return Err(LedgerError::Network(e.to_string())),
                _ => continue,
            }
        }
    }
}

fn response_id(response: &GatewayResponse) -> Option<u64> {
    match response {
        GatewayResponse::Receipt { id, .. }
        | GatewayResponse::Messages { id, .. }
        | GatewayResponse::Error { id, .. } => Some(*id),
        GatewayResponse::Pong => None,
    }
}

#[async_trait]
impl LedgerClient for GatewayClient {
    async fn execute(&self, transaction: &FrozenTransaction) -> LedgerResult<Receipt> {
        let transaction = transaction.clone();
        match self.request(|id| GatewayRequest::Execute { id, transaction }).await? {
            GatewayResponse::Receipt { receipt, .. } => Ok(receipt),
            GatewayResponse::Error { error, .. } => Err(error),
            other => Err(LedgerError::InvalidResponse(format!("unexpected {other:?}"))),
        }
    }

    async fn topic_messages(
        &self,
        topic_id: &TopicId,
        after: u64,
        limit: usize,
    ) -> LedgerResult<Vec<TopicMessage>> {
        let topic_id = *topic_id;
        let request = |id| GatewayRequest::TopicMessages {
            id,
            topic_id,
            after,
            limit,
        };
        match self.request(request).await? {
            GatewayResponse::Messages { messages, .. } => Ok(messages),
            GatewayResponse::Error { error, .. } => Err(error),
            other => Err(LedgerError::InvalidResponse(format!("unexpected {other:?}"))),
        }
    }
}

/// Accept connections forever, serving each against `ledger`
pub async fn serve(listener: TcpListener, ledger: Arc<dyn LedgerClient>) {
    while let Ok((stream, addr)) = listener.accept().await {
        tokio::spawn(serve_connection(stream, addr, ledger.clone()));
    }
}

/// Serve one gateway connection until the client goes away
pub async fn serve_connection(stream: TcpStream, addr: SocketAddr, ledger: Arc<dyn LedgerClient>) {
    info!("New gateway connection from: {}", addr);

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    loop {
        let response = match read.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<GatewayRequest>(&text) {
                Ok(request) => handle_request(request, ledger.as_ref()).await,
                Err(e) => {
                    warn!("Invalid request from {}: {}", addr, e);
                    continue;
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = write.send(Message::Pong(data)).await;
                continue;
            }
            Some(Ok(Message::Close(_))) | None => {
                info!("Client {} disconnected", addr);
                break;
            }
            Some(Err(e)) => {
                error!("WebSocket error from {}: {}", addr, e);
                break;
            }
            _ => continue,
        };

        if let Ok(json) = serde_json::to_string(&response) {
            if write.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    }
}

async fn handle_request(request: GatewayRequest, ledger: &dyn LedgerClient) -> GatewayResponse {
    match request {
        GatewayRequest::Execute { id, transaction } => {
            debug!(
                transaction = %transaction.transaction_id(),
                kind = transaction.body().name(),
                "Gateway execute"
            );
            match ledger.execute(&transaction).await {
                Ok(receipt) => GatewayResponse::Receipt { id, receipt },
                Err(error) => GatewayResponse::Error { id, error },
            }
        }
        GatewayRequest::TopicMessages {
            id,
            topic_id,
            after,
            limit,
        } => match ledger.topic_messages(&topic_id, after, limit).await {
            Ok(messages) => GatewayResponse::Messages { id, messages },
            Err(error) => GatewayResponse::Error { id, error },
        },
        GatewayRequest::Ping => GatewayResponse::Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::{InMemoryLedger, TRANSACTION_FEE};
    use crate::ledger::transaction::Transaction;

    async fn spawn_gateway() -> (String, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, ledger.clone()));
        (format!("ws://{addr}"), ledger)
    }

    #[test]
    fn test_frame_shape() {
        let request = GatewayRequest::TopicMessages {
            id: 4,
            topic_id: TopicId::new(0, 0, 9),
            after: 2,
            limit: 50,
        };
        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "TopicMessages");
        assert_eq!(json["data"]["topic_id"], "0.0.9");
        assert_eq!(json["data"]["after"], 2);

        let pong = serde_json::to_string(&GatewayResponse::Pong).unwrap();
        assert_eq!(pong, r#"{"type":"Pong"}"#);
    }

    #[test]
    fn test_error_frame_round_trip() {
        let response = GatewayResponse::Error {
            id: 3,
            error: LedgerError::TopicNotFound(TopicId::new(0, 0, 1)),
        };
        let json = serde_json::to_string(&response).unwrap();
        match serde_json::from_str::<GatewayResponse>(&json).unwrap() {
            GatewayResponse::Error { id, error } => {
                assert_eq!(id, 3);
                assert_eq!(error, LedgerError::TopicNotFound(TopicId::new(0, 0, 1)));
            }
            other => panic!("Wrong response type: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_and_query_over_socket() {
        let (url, ledger) = spawn_gateway().await;
        let op = ledger.create_operator(10 * TRANSACTION_FEE);
        let topic = ledger.create_topic("");

        let client = GatewayClient::connect(&url).await.unwrap();
        let tx = Transaction::topic_message_submit(topic, b"over the wire".to_vec())
            .freeze_with(&op)
            .unwrap();
        let receipt = client.execute(&tx).await.unwrap();
        assert_eq!(receipt.topic_sequence_number, Some(1));

        let messages = client.topic_messages(&topic, 0, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].contents, b"over the wire");
    }

    #[tokio::test]
    async fn test_ledger_errors_cross_the_socket() {
        let (url, ledger) = spawn_gateway().await;
        let op = ledger.create_operator(10 * TRANSACTION_FEE);
        let client = GatewayClient::connect(&url).await.unwrap();

        let missing = TopicId::new(0, 0, 4242);
        let tx = Transaction::topic_message_submit(missing, b"x".to_vec())
            .freeze_with(&op)
            .unwrap();
        assert_eq!(client.execute(&tx).await, Err(LedgerError::TopicNotFound(missing)));
    }

    #[tokio::test]
    async fn test_connect_failure_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let result = GatewayClient::connect(&format!("ws://{addr}")).await;
        assert!(matches!(result, Err(LedgerError::Network(_))));
    }
}
