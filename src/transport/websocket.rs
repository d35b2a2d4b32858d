//! WebSocket transport implementation.
//!
//! Requests and responses are JSON text frames; one response per request.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, Connector, MaybeTlsStream,
    WebSocketStream,
};
use tracing::debug;

use crate::connection::auth::Credentials;
use crate::error::TransportError;

use super::messages::{
    DisconnectRequest, EmptyResponse, ExecuteResponseData, FetchResponseData, LoginRequest,
    LoginResponseData, PrepareRequest, PrepareResponseData, PreparedStatement, Response,
    RowChunk, SessionInfo, StatementHandle, StatementRequest,
};
use super::protocol::{LoginTarget, TransportParams, TransportProtocol};

/// WebSocket transport implementation.
pub struct WebSocketTransport {
    /// WebSocket connection (None if not connected)
    ws_stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    /// Current session information (None if not authenticated)
    session_info: Option<SessionInfo>,
    /// Connection state
    state: ConnectionState,
}

/// Connection state tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connected but not authenticated
    Connected,
    /// Connected and authenticated
    Authenticated,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        Self {
            ws_stream: None,
            session_info: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Session information from the last successful login.
    pub fn session_info(&self) -> Option<&SessionInfo> {
        self.session_info.as_ref()
    }

    /// Send a message and receive a response.
    async fn send_receive<T, R>(&mut self, request: &T) -> Result<R, TransportError>
    where
        T: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let request_json = serde_json::to_string(request)?;

        let ws_stream = self
            .ws_stream
            .as_mut()
            .ok_or_else(|| TransportError::ProtocolError("Not connected".to_string()))?;

        ws_stream
            .send(Message::text(request_json))
            .await
            .map_err(|e| TransportError::SendError(e.to_string()))?;

        loop {
            let message = ws_stream
                .next()
                .await
                .ok_or_else(|| TransportError::ReceiveError("Connection closed".to_string()))?
                .map_err(|e| TransportError::ReceiveError(e.to_string()))?;

            match message {
                Message::Text(text) => {
                    let response: R = serde_json::from_str(&text).map_err(|e| {
                        TransportError::InvalidResponse(format!("Malformed response: {}", e))
                    })?;
                    return Ok(response);
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => {
                    return Err(TransportError::ReceiveError(
                        "Connection closed by server".to_string(),
                    ))
                }
                other => {
                    return Err(TransportError::ProtocolError(format!(
                        "Unexpected {} frame",
                        frame_kind(&other)
                    )))
                }
            }
        }
    }

    fn require_authenticated(&self, action: &str) -> Result<(), TransportError> {
        if self.state != ConnectionState::Authenticated {
            return Err(TransportError::ProtocolError(format!(
                "Must authenticate before {}",
                action
            )));
        }
        Ok(())
    }
}

fn frame_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "raw",
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportProtocol for WebSocketTransport {
    async fn connect(&mut self, params: &TransportParams) -> Result<(), TransportError> {
        if self.state != ConnectionState::Disconnected {
            return Err(TransportError::ProtocolError(
                "Already connected".to_string(),
            ));
        }

        let url = params.to_websocket_url();
        let connector = if params.use_tls {
            let tls = crate::driver::tls_connector(params.validate_server_certificate)
                .map_err(|e| TransportError::TlsError(e.to_string()))?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        debug!(%url, "opening websocket");
        let (ws_stream, _) = connect_async_tls_with_config(url.as_str(), None, false, connector)
            .await
            .map_err(|e| TransportError::WebSocketError(e.to_string()))?;

        self.ws_stream = Some(ws_stream);
        self.state = ConnectionState::Connected;

        Ok(())
    }

    async fn authenticate(
        &mut self,
        credentials: &Credentials,
        target: &LoginTarget,
    ) -> Result<SessionInfo, TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::ProtocolError(
                "Must connect before authenticating".to_string(),
            ));
        }

        let request = LoginRequest::new(
            credentials.username().to_string(),
            credentials.password().to_string(),
            target.database.clone(),
            target.service.clone(),
        )
        .with_client_info(target.client_name.clone(), target.client_version.clone())
        .with_attributes(target.attributes.clone());

        let response: Response<LoginResponseData> = self.send_receive(&request).await?;
        let session_info: SessionInfo = response.into_data()?.into();

        self.session_info = Some(session_info.clone());
        self.state = ConnectionState::Authenticated;

        Ok(session_info)
    }

    async fn prepare(
        &mut self,
        sql: &str,
        fetch_size: usize,
    ) -> Result<PreparedStatement, TransportError> {
        self.require_authenticated("preparing statements")?;

        let request = PrepareRequest::new(sql.to_string(), fetch_size);
        let response: Response<PrepareResponseData> = self.send_receive(&request).await?;
        let data = response.into_data()?;

        Ok(PreparedStatement {
            handle: StatementHandle::new(data.statement_id),
            columns: data.columns,
        })
    }

    async fn execute(&mut self, handle: StatementHandle) -> Result<Option<i64>, TransportError> {
        self.require_authenticated("executing statements")?;

        let request = StatementRequest::execute(handle.as_u64());
        let response: Response<ExecuteResponseData> = self.send_receive(&request).await?;

        Ok(response.into_result()?.and_then(|data| data.row_count))
    }

    async fn fetch(
        &mut self,
        handle: StatementHandle,
        max_rows: usize,
    ) -> Result<RowChunk, TransportError> {
        self.require_authenticated("fetching results")?;

        let request = StatementRequest::fetch(handle.as_u64(), max_rows);
        let response: Response<FetchResponseData> = self.send_receive(&request).await?;
        let data = response.into_data()?;

        if data.num_rows != data.data.len() {
            return Err(TransportError::InvalidResponse(format!(
                "Fetch announced {} rows but carried {}",
                data.num_rows,
                data.data.len()
            )));
        }

        Ok(RowChunk { rows: data.data })
    }

    async fn close_statement(&mut self, handle: StatementHandle) -> Result<(), TransportError> {
        self.require_authenticated("closing statements")?;

        let request = StatementRequest::close(handle.as_u64());
        let response: EmptyResponse = self.send_receive(&request).await?;
        response.into_result()?;

        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }

        let result = if self.state == ConnectionState::Authenticated {
            match self
                .send_receive::<_, EmptyResponse>(&DisconnectRequest::default())
                .await
            {
                Ok(response) => response.into_result().map(|_| ()),
                Err(e) => Err(e),
            }
        } else {
            Ok(())
        };

        if let Some(mut ws_stream) = self.ws_stream.take() {
            let _ = ws_stream.close(None).await; // peer may already be gone
        }

        self.state = ConnectionState::Disconnected;
        self.session_info = None;

        result
    }

    fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Authenticated
        )
    }
}
