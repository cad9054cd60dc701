//! The transport seam: a duplex, text-frame message channel.
//!
//! spec.md §1 treats the transport as an external collaborator named only
//! by the contract the core consumes: send one text frame, receive one
//! text frame, or observe close. [`Frame`] is that contract; [`WsTransport`]
//! is the bound the dispatch loops (client reader, server ingestion) are
//! generic over, mirrored on the teacher's
//! `services/receiver/src/session.rs::run_session_loop<S>` generic-over-
//! `Stream + Sink` shape. Concrete adapters wrap a real
//! `tokio-tungstenite` socket, an `axum` websocket, or (in `zonis-test-util`)
//! an in-memory pair.

use futures_util::{Sink, Stream};

/// One frame crossing the transport. Only `Text` carries protocol payload;
/// `Ping`/`Pong` are answered by the transport layer itself in the
/// concrete adapters (never surfaced to the dispatch loop), and `Close`
/// signals the peer end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

/// The bound a dispatch loop needs from its transport: a stream of
/// inbound frames (or transport errors, stringified — the core does not
/// need to distinguish transport error kinds, only "closed" vs "frame"),
/// paired with a sink to send outbound frames.
pub trait WsTransport:
    Stream<Item = Result<Frame, String>> + Sink<Frame, Error = String> + Unpin + Send
{
}

impl<T> WsTransport for T where
    T: Stream<Item = Result<Frame, String>> + Sink<Frame, Error = String> + Unpin + Send
{
}

#[cfg(feature = "axum-integration")]
pub mod axum_adapter {
    //! Adapts `axum::extract::ws::WebSocket` to [`super::WsTransport`].

    use super::Frame;
    use axum::extract::ws::{Message, WebSocket};
    use futures_util::{Sink, Stream};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Wraps an axum `WebSocket`, answering pings transparently and
    /// surfacing only `Text`/`Close` frames to the dispatch loop.
    pub struct AxumTransport(pub WebSocket);

    impl Stream for AxumTransport {
        type Item = Result<Frame, String>;

        fn poll_next(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Option<Self::Item>> {
            loop {
                match Pin::new(&mut self.0).poll_next(cx) {
                    Poll::Ready(Some(Ok(Message::Text(text)))) => {
                        return Poll::Ready(Some(Ok(Frame::Text(text.to_string()))));
                    }
                    Poll::Ready(Some(Ok(Message::Close(_)))) => {
                        return Poll::Ready(Some(Ok(Frame::Close)));
                    }
                    Poll::Ready(Some(Ok(_))) => continue,
                    Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e.to_string()))),
                    Poll::Ready(None) => return Poll::Ready(None),
                    Poll::Pending => return Poll::Pending,
                }
            }
        }
    }

    impl Sink<Frame> for AxumTransport {
        type Error = String;

        fn poll_ready(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Pin::new(&mut self.0).poll_ready(cx).map_err(|e| e.to_string())
        }

        fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
            let message = match item {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Close => Message::Close(None),
            };
            Pin::new(&mut self.0)
                .start_send(message)
                .map_err(|e| e.to_string())
        }

        fn poll_flush(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Pin::new(&mut self.0).poll_flush(cx).map_err(|e| e.to_string())
        }

        fn poll_close(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Pin::new(&mut self.0).poll_close(cx).map_err(|e| e.to_string())
        }
    }
}

pub mod tungstenite_adapter {
    //! Adapts a `tokio-tungstenite` client socket to [`super::WsTransport`].

    use super::Frame;
    use futures_util::{Sink, Stream};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::MaybeTlsStream;
    use tokio_tungstenite::WebSocketStream;

    type Inner = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    /// Wraps a client-side `tokio-tungstenite` socket, answering pings
    /// transparently and surfacing only `Text`/`Close` frames.
    pub struct TungsteniteTransport(pub Inner);

    impl Stream for TungsteniteTransport {
        type Item = Result<Frame, String>;

        fn poll_next(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Option<Self::Item>> {
            loop {
                match Pin::new(&mut self.0).poll_next(cx) {
                    Poll::Ready(Some(Ok(Message::Text(text)))) => {
                        return Poll::Ready(Some(Ok(Frame::Text(text.to_string()))));
                    }
                    Poll::Ready(Some(Ok(Message::Close(_)))) => {
                        return Poll::Ready(Some(Ok(Frame::Close)));
                    }
                    Poll::Ready(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                    Poll::Ready(Some(Ok(_))) => continue,
                    Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e.to_string()))),
                    Poll::Ready(None) => return Poll::Ready(None),
                    Poll::Pending => return Poll::Pending,
                }
            }
        }
    }

    impl Sink<Frame> for TungsteniteTransport {
        type Error = String;

        fn poll_ready(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Pin::new(&mut self.0).poll_ready(cx).map_err(|e| e.to_string())
        }

        fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
            let message = match item {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Close => Message::Close(None),
            };
            Pin::new(&mut self.0)
                .start_send(message)
                .map_err(|e| e.to_string())
        }

        fn poll_flush(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Pin::new(&mut self.0).poll_flush(cx).map_err(|e| e.to_string())
        }

        fn poll_close(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Pin::new(&mut self.0).poll_close(cx).map_err(|e| e.to_string())
        }
    }
}
