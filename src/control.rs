//! Control socket of a running `watch`.
//!
//! One-shot commands (`close`, `create`, `reconcile`, ...) connect to
//! `<state dir>/control.sock` and hand their request to the watch process,
//! so a project has one state writer and one set of lifecycle locks. When no
//! watch is listening the command runs in its own process instead.
//!
//! Wire format: one JSON object per line each way, one reply per request.

use crate::actions::{ActionOutcome, PaneAction};
use crate::reconcile::ReconcileOutcome;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How long a connected client may stay silent before it is dropped
#[cfg(unix)]
const CLIENT_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ControlRequest {
    Action { action: PaneAction },
    Reconcile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    Action { outcome: ActionOutcome },
    Reconciled { outcome: ReconcileOutcome },
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("another watch is already serving {}", .0.display())]
    AlreadyServing(PathBuf),

    #[error("control socket {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("bad control message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("watch closed the control socket without replying")]
    NoReply,

    #[error("control sockets need a unix platform")]
    Unsupported,
}

impl ControlError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>, ControlError> {
    let mut frame = serde_json::to_vec(message)?;
    frame.push(b'\n');
    Ok(frame)
}

#[cfg(unix)]
pub use unix::{ControlServer, forward};

#[cfg(not(unix))]
pub use fallback::{ControlServer, forward};

#[cfg(unix)]
mod unix {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{UnixListener, UnixStream};

    /// Listening end, owned by `watch`. Removes the socket file on drop.
    #[derive(Debug)]
    pub struct ControlServer {
        listener: UnixListener,
        path: PathBuf,
    }

    impl ControlServer {
        /// Bind `path`, replacing a socket file no process listens on.
        pub async fn bind(path: &Path) -> Result<Self, ControlError> {
            if path.exists() {
                if UnixStream::connect(path).await.is_ok() {
                    return Err(ControlError::AlreadyServing(path.to_path_buf()));
                }
                log::debug!("Removing stale control socket {}", path.display());
                std::fs::remove_file(path).map_err(|e| ControlError::io(path, e))?;
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ControlError::io(parent, e))?;
            }
            let listener = UnixListener::bind(path).map_err(|e| ControlError::io(path, e))?;
            log::info!("Control socket listening at {}", path.display());
            Ok(Self {
                listener,
                path: path.to_path_buf(),
            })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Answer clients one at a time until the future is dropped.
        pub async fn serve<H, F>(&self, handler: H)
        where
            H: Fn(ControlRequest) -> F,
            F: Future<Output = ControlReply>,
        {
            loop {
                let stream = match self.listener.accept().await {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        log::warn!("Control socket accept failed: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                        continue;
                    }
                };
                if let Err(e) = serve_client(stream, &handler).await {
                    log::debug!("Control client dropped: {}", e);
                }
            }
        }
    }

    impl Drop for ControlServer {
        fn drop(&mut self) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::debug!(
                    "Could not remove control socket {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }

    async fn serve_client<H, F>(stream: UnixStream, handler: &H) -> Result<(), ControlError>
    where
        H: Fn(ControlRequest) -> F,
        F: Future<Output = ControlReply>,
    {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            let read =
                tokio::time::timeout(CLIENT_IDLE_TIMEOUT, reader.read_until(b'\n', &mut line))
                    .await;
            let n = match read {
                Ok(result) => result.map_err(|e| ControlError::io(Path::new("client"), e))?,
                Err(_) => {
                    log::debug!("Control client idle; closing");
                    return Ok(());
                }
            };
            if n == 0 {
                return Ok(());
            }

            let reply = match serde_json::from_slice::<ControlRequest>(line.trim_ascii()) {
                Ok(request) => {
                    log::debug!("Control request: {:?}", request);
                    handler(request).await
                }
                Err(e) => ControlReply::Error {
                    message: format!("bad request: {}", e),
                },
            };
            writer
                .write_all(&encode_line(&reply)?)
                .await
                .map_err(|e| ControlError::io(Path::new("client"), e))?;
        }
    }

    /// Hand `request` to the watch listening on `path`.
    ///
    /// `Ok(None)` when nothing listens there, so the caller can run the
    /// request itself.
    pub async fn forward(
        path: &Path,
        request: &ControlRequest,
    ) -> Result<Option<ControlReply>, ControlError> {
        let stream = match UnixStream::connect(path).await {
            Ok(stream) => stream,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) =>
            {
                log::debug!("No watch at {} ({}); running locally", path.display(), e);
                return Ok(None);
            }
            Err(e) => return Err(ControlError::io(path, e)),
        };

        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(&encode_line(request)?)
            .await
            .map_err(|e| ControlError::io(path, e))?;

        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| ControlError::io(path, e))?;
        if n == 0 {
            return Err(ControlError::NoReply);
        }
        let reply = serde_json::from_slice(line.trim_ascii())?;
        log::debug!("Watch at {} replied {:?}", path.display(), reply);
        Ok(Some(reply))
    }
}

#[cfg(not(unix))]
mod fallback {
    use super::*;

    #[derive(Debug)]
    pub struct ControlServer {
        path: PathBuf,
    }

    impl ControlServer {
        pub async fn bind(_path: &Path) -> Result<Self, ControlError> {
            Err(ControlError::Unsupported)
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        pub async fn serve<H, F>(&self, _handler: H)
        where
            H: Fn(ControlRequest) -> F,
            F: Future<Output = ControlReply>,
        {
            std::future::pending::<()>().await;
        }
    }

    pub async fn forward(
        _path: &Path,
        _request: &ControlRequest,
    ) -> Result<Option<ControlReply>, ControlError> {
        Ok(None)
    }
}
