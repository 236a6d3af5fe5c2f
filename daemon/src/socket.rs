//! Line-delimited JSON transport over a Unix socket or stdio

use crate::protocol::{Envelope, Request, Response};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[async_trait::async_trait]
pub trait RequestHandler {
    async fn handle(&self, id: Option<String>, request: Request) -> Response;
}

fn encode(response: &Response) -> String {
    match serde_json::to_string(response) {
        Ok(json) => json + "\n",
        Err(e) => {
            error!("Failed to encode response: {}", e);
            "{\"type\":\"response\",\"id\":null,\"data\":{\"error\":\"failed to encode response\"}}\n".to_string()
        }
    }
}

/// Parses one request line and runs it on its own task; the response goes to `responses`.
fn dispatch<H>(line: &str, handler: &Arc<H>, responses: &mpsc::UnboundedSender<Response>)
where
    H: RequestHandler + Send + Sync + 'static,
{
    match serde_json::from_str::<Envelope>(line) {
        Ok(envelope) => {
            let handler = Arc::clone(handler);
            let responses = responses.clone();
            tokio::spawn(async move {
                let response = handler.handle(envelope.id, envelope.request).await;
                // The session may already be gone.
                let _ = responses.send(response);
            });
        }
        Err(e) => {
            warn!("Invalid request: {}", e);
            let _ = responses.send(Response::error(None, e));
        }
    }
}

/// Serves requests from `reader` until EOF, one response line per request line.
///
/// Requests run concurrently, so responses are written in completion order
/// and are matched to requests by `id`. Responses still in flight at EOF are
/// written before returning.
pub async fn handle_connection<R, W, H>(reader: R, mut writer: W, handler: Arc<H>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: RequestHandler + Send + Sync + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let mut tx = Some(tx);

    loop {
        tokio::select! {
            line = lines.next_line(), if tx.is_some() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(tx) = &tx {
                        dispatch(&line, &handler, tx);
                    }
                }
                Ok(None) => tx = None,
                Err(e) => {
                    error!("Read error: {}", e);
                    tx = None;
                }
            },
            response = rx.recv() => {
                // `None` once the reader is done and every request task has answered.
                let Some(response) = response else { break };
                if let Err(e) = writer.write_all(encode(&response).as_bytes()).await {
                    error!("Failed to write response: {}", e);
                    break;
                }
                if let Err(e) = writer.flush().await {
                    error!("Failed to flush response: {}", e);
                    break;
                }
            }
        }
    }
}

/// Serves a single session on stdin/stdout.
pub async fn serve_stdio<H>(handler: Arc<H>)
where
    H: RequestHandler + Send + Sync + 'static,
{
    info!("Serving requests on stdio");
    handle_connection(tokio::io::stdin(), tokio::io::stdout(), handler).await;
}

#[cfg(unix)]
pub use unix::SocketServer;

#[cfg(unix)]
mod unix {
    use super::*;
    use std::path::{Path, PathBuf};
    use tokio::net::{UnixListener, UnixStream};

    pub struct SocketServer {
        path: PathBuf,
        listener: UnixListener,
    }

    impl SocketServer {
        pub async fn bind(path: &Path) -> std::io::Result<Self> {
            let _ = std::fs::remove_file(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let listener = UnixListener::bind(path)?;
            info!("Socket server listening on {:?}", path);
            Ok(Self { path: path.to_path_buf(), listener })
        }

        pub async fn accept(&self) -> std::io::Result<UnixStream> {
            let (stream, _) = self.listener.accept().await?;
            Ok(stream)
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Accepts connections forever, one task per client.
        pub async fn serve<H>(&self, handler: Arc<H>)
        where
            H: RequestHandler + Send + Sync + 'static,
        {
            loop {
                match self.accept().await {
                    Ok(stream) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            handle_connection(reader, writer, handler).await;
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }

        pub fn socket_path() -> PathBuf {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/run/user/{}/pidwatch.sock", uid))
        }
    }

    impl Drop for SocketServer {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
