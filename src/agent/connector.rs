use reqwest::Client;
use tokio::task::AbortHandle;
use tracing::debug;
use url::Url;

use crate::error::AgentError;

use super::engine::{ConnectionEvent, ConnectionEventKind, Connector, EventSender};
use super::tracker::ConnectionToken;

/// Issues real HTTP GETs, one fresh TCP connection per request.
#[derive(Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    /// Builds a client with pooling disabled and Nagle off.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying TLS/HTTP stack cannot be built.
    pub fn new() -> Result<Self, AgentError> {
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .tcp_nodelay(true)
            .build()
            .map_err(|err| AgentError::BuildClient { source: err })?;
        Ok(Self { client })
    }
}

impl Connector for HttpConnector {
    type Handle = AbortHandle;

    fn open(&self, token: ConnectionToken, target: &Url, events: &EventSender) -> AbortHandle {
        let request = self.client.get(target.clone());
        let events = events.clone();
        let task = tokio::spawn(async move {
            let mut response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    debug!("Connection {} request failed: {}", token, err);
                    emit(&events, token, ConnectionEventKind::RequestFailed);
                    return;
                }
            };
            emit(&events, token, ConnectionEventKind::ResponseHeaders);

            loop {
                match response.chunk().await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        emit(&events, token, ConnectionEventKind::Completed);
                        break;
                    }
                    Err(err) => {
                        debug!("Connection {} response failed: {}", token, err);
                        emit(&events, token, ConnectionEventKind::ResponseFailed);
                        break;
                    }
                }
            }
        });
        task.abort_handle()
    }
}

/// A closed channel means the engine has stopped; the event no longer matters.
fn emit(events: &EventSender, token: ConnectionToken, kind: ConnectionEventKind) {
    if events.send(ConnectionEvent::new(token, kind)).is_err() {
        debug!("Engine gone, dropping event for connection {}", token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn emit_delivers_while_engine_listens() -> Result<(), String> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let token = ConnectionToken::from_raw(7);
        emit(&events_tx, token, ConnectionEventKind::ResponseHeaders);
        let event = events_rx
            .try_recv()
            .map_err(|err| format!("Event not delivered: {}", err))?;
        if event != ConnectionEvent::new(token, ConnectionEventKind::ResponseHeaders) {
            return Err(format!("Unexpected event: {:?}", event));
        }
        Ok(())
    }

    #[test]
    fn emit_after_engine_exit_is_quiet() -> Result<(), String> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        drop(events_rx);
        emit(&events_tx, ConnectionToken::from_raw(8), ConnectionEventKind::Completed);
        if !events_tx.is_closed() {
            return Err("Channel should report closed".to_owned());
        }
        Ok(())
    }
}
