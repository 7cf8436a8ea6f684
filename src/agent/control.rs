use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::shutdown::ShutdownSender;

use super::engine::{ControlCommand, ControlSender};
use super::http::{
    ControlError, HttpRequest, read_http_request, write_error_response, write_json_response,
    write_text_response,
};
use super::supervisor::Supervisor;

/// How long a control request waits for the engine loop to answer.
const ENGINE_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    Stats,
    Set(Vec<(String, String)>),
    Restart,
    NotFound,
}

#[must_use]
pub fn route(request: &HttpRequest) -> Route {
    if request.method != "GET" {
        return Route::NotFound;
    }
    match request.path() {
        "/" => Route::Stats,
        "/set" => Route::Set(request.query_pairs()),
        "/restart" => Route::Restart,
        _ => Route::NotFound,
    }
}

pub async fn serve_control(
    listener: TcpListener,
    control_tx: ControlSender,
    supervisor: Arc<dyn Supervisor>,
    shutdown_tx: ShutdownSender,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        let accepted = tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => accepted,
        };
        let (socket, peer) = match accepted {
            Ok(result) => result,
            Err(err) => {
                warn!("Failed to accept control connection: {}", err);
                continue;
            }
        };
        debug!("Control connection from {}", peer);
        let control_tx = control_tx.clone();
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            handle_control_connection(socket, &control_tx, supervisor.as_ref()).await;
        });
    }
}

pub async fn handle_control_connection<S>(
    mut socket: S,
    control_tx: &ControlSender,
    supervisor: &dyn Supervisor,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match read_http_request(&mut socket).await {
        Ok(request) => request,
        Err(err) => {
            if write_error_response(&mut socket, err.status, &err.message)
                .await
                .is_err()
            {
                // Socket closed while writing error response.
            }
            return;
        }
    };

    let written = match route(&request) {
        Route::Stats => {
            let (respond_to, response_rx) = oneshot::channel();
            match dispatch(control_tx, ControlCommand::Stats { respond_to }, response_rx).await {
                Ok(stats) => write_json_response(&mut socket, 200, &stats).await,
                Err(err) => write_error_response(&mut socket, err.status, &err.message).await,
            }
        }
        Route::Set(writes) => {
            let (respond_to, response_rx) = oneshot::channel();
            let command = ControlCommand::Set { writes, respond_to };
            match dispatch(control_tx, command, response_rx).await {
                Ok(Ok(config)) => write_json_response(&mut socket, 200, &config).await,
                Ok(Err(err)) => write_error_response(&mut socket, 400, &err.to_string()).await,
                Err(err) => write_error_response(&mut socket, err.status, &err.message).await,
            }
        }
        Route::Restart => match supervisor.request_restart() {
            Ok(()) => write_text_response(&mut socket, 200, "OK\n").await,
            Err(err) => {
                warn!("Restart request failed: {}", err);
                write_error_response(&mut socket, 503, &err.to_string()).await
            }
        },
        Route::NotFound => write_error_response(&mut socket, 404, "Not found").await,
    };

    if let Err(err) = written {
        debug!("Control response not delivered: {}", err);
    }
}

async fn dispatch<T>(
    control_tx: &ControlSender,
    command: ControlCommand,
    response_rx: oneshot::Receiver<T>,
) -> Result<T, ControlError> {
    if control_tx.send(command).is_err() {
        return Err(ControlError::new(
            503,
            AgentError::EngineUnavailable.to_string(),
        ));
    }
    tokio::time::timeout(ENGINE_REPLY_TIMEOUT, response_rx)
        .await
        .map_or_else(
            |_| Err(ControlError::new(504, "Engine response timed out")),
            |result| {
                result.map_err(|_| {
                    ControlError::new(503, AgentError::EngineUnavailable.to_string())
                })
            },
        )
}
