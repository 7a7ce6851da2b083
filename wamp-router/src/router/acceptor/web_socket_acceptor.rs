use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    tungstenite::{
        handshake::server::{
            Callback,
            ErrorResponse,
            Request,
            Response,
        },
        http::{
            HeaderValue,
            StatusCode,
            header::SEC_WEBSOCKET_PROTOCOL,
        },
    },
};

use crate::router::{
    acceptor::acceptor::{
        Acceptance,
        Acceptor,
        AcceptorFactory,
    },
    binding::BindingRegistry,
    context::RouterContext,
};

struct WebSocketWampNegotiator {
    bindings: BindingRegistry,
    selected_protocol: Option<String>,
}

impl WebSocketWampNegotiator {
    fn new(bindings: BindingRegistry) -> Self {
        Self {
            bindings,
            selected_protocol: None,
        }
    }

    fn reject_response<S>(message: S) -> ErrorResponse
    where
        S: Into<String>,
    {
        let mut response = ErrorResponse::new(Some(message.into()));
        *response.status_mut() = StatusCode::BAD_REQUEST;
        response
    }

    fn callback(&mut self) -> impl Callback + use<'_> {
        |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let selected_protocol = request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|protocols| match protocols.to_str() {
                    Ok(protocols) => protocols
                        .split(',')
                        .map(|protocol| protocol.trim())
                        .find(|protocol| self.bindings.get(protocol).is_some()),
                    Err(_) => None,
                });
            let selected_protocol = match selected_protocol {
                Some(protocol) => protocol,
                None => return Err(Self::reject_response("no binding for requested subprotocols")),
            };
            self.selected_protocol = Some(selected_protocol.to_owned());
            let header = match HeaderValue::from_str(selected_protocol) {
                Ok(header) => header,
                Err(_) => return Err(Self::reject_response("failed to create response header")),
            };
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, header);
            Ok(response)
        }
    }
}

#[derive(Default)]
struct WebSocketAcceptor {}

#[async_trait]
impl Acceptor<WebSocketStream<MaybeTlsStream<TcpStream>>> for WebSocketAcceptor {
    async fn accept(
        &self,
        context: &RouterContext<WebSocketStream<MaybeTlsStream<TcpStream>>>,
        stream: MaybeTlsStream<TcpStream>,
    ) -> Result<Acceptance<WebSocketStream<MaybeTlsStream<TcpStream>>>> {
        let mut negotiator =
            WebSocketWampNegotiator::new(context.router().config.bindings.clone());
        let stream = tokio_tungstenite::accept_hdr_async(stream, negotiator.callback()).await?;
        let protocol = match negotiator.selected_protocol {
            Some(protocol) => protocol,
            None => return Err(Error::msg("expected protocol after negotiation")),
        };
        let binding = context
            .router()
            .config
            .bindings
            .get(&protocol)
            .cloned()
            .ok_or_else(|| Error::msg("negotiated protocol lost its binding"))?;
        Ok(Acceptance { stream, binding })
    }
}

/// A factory for an [`Acceptor`] for WebSocket connections.
#[derive(Default)]
pub struct WebSocketAcceptorFactory {}

#[async_trait]
impl AcceptorFactory<WebSocketStream<MaybeTlsStream<TcpStream>>> for WebSocketAcceptorFactory {
    fn new_acceptor(
        &self,
    ) -> Box<dyn Acceptor<WebSocketStream<MaybeTlsStream<TcpStream>>> + Send> {
        Box::new(WebSocketAcceptor::default())
    }
}
