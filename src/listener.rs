//! Listener management: bind, accept, dispatch, shutdown

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ListenerConfig;
use crate::error::DecoyError;
use crate::handlers::HandlerKind;
use crate::log::Recorder;
use crate::supervisor;

/// Handle to one bound listener. Closing it stops the accept loop;
/// in-flight connection tasks finish or time out on their own.
pub struct ListenerHandle {
    port: u16,
    service: String,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl ListenerHandle {
    /// Port that was requested in the config
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Address actually bound (the resolved port when the config said 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Safe to call more than once; dropping the handle
    /// has the same effect.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Process-wide set of live listeners. Owns every handle and exposes the
/// single shutdown entry point the signal layer calls.
pub struct ListenerSet {
    handles: Vec<ListenerHandle>,
    failures: Vec<DecoyError>,
}

impl ListenerSet {
    /// Bind every configured listener. An individual bind failure is
    /// reported and collected, not fatal; partial startup is a normal
    /// outcome. Only zero successes against a non-empty config is an
    /// error worth stopping for.
    pub async fn start(
        host: &str,
        configs: &[ListenerConfig],
        recorder: Recorder,
    ) -> Result<Self, DecoyError> {
        let mut handles = Vec::new();
        let mut failures = Vec::new();

        for config in configs {
            match start_listener(host, config, recorder.clone()).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!("{}", e);
                    failures.push(e);
                }
            }
        }

        if handles.is_empty() && !configs.is_empty() {
            return Err(DecoyError::NoListeners);
        }

        Ok(Self { handles, failures })
    }

    pub fn handles(&self) -> &[ListenerHandle] {
        &self.handles
    }

    /// Bind failures encountered during startup, one per failed listener
    pub fn failures(&self) -> &[DecoyError] {
        &self.failures
    }

    /// Close every listener. Idempotent; in-flight connections are not
    /// forcibly killed.
    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.close();
        }
        info!("Closed {} listeners", self.handles.len());
    }
}

async fn start_listener(
    host: &str,
    config: &ListenerConfig,
    recorder: Recorder,
) -> Result<ListenerHandle, DecoyError> {
    let addr = format!("{}:{}", host, config.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => DecoyError::BindPermission {
            port: config.port,
            source: e,
        },
        _ => DecoyError::Bind {
            port: config.port,
            source: e,
        },
    })?;

    let local_addr = listener.local_addr().map_err(|e| DecoyError::Bind {
        port: config.port,
        source: e,
    })?;

    let bound_port = local_addr.port();
    let service = config.service_name(bound_port);
    let kind = Arc::new(HandlerKind::from_config(&config.handler));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!("Listening on {} (handler={})", local_addr, kind.label());

    tokio::spawn(accept_loop(
        listener,
        kind,
        service.clone(),
        bound_port,
        recorder,
        shutdown_rx,
    ));

    Ok(ListenerHandle {
        port: config.port,
        service,
        local_addr,
        shutdown: shutdown_tx,
    })
}

/// One accept loop per bound socket. Each accepted connection gets its own
/// task, so a hung peer never blocks further accepts.
async fn accept_loop(
    listener: TcpListener,
    kind: Arc<HandlerKind>,
    service: String,
    port: u16,
    recorder: Recorder,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Listener on port {} shutting down", port);
                break;
            }
            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    let kind = kind.clone();
                    let service = service.clone();
                    let recorder = recorder.clone();
                    tokio::spawn(async move {
                        supervisor::handle_connection(stream, kind, service, port, recorder).await;
                    });
                }
                Err(e) => {
                    warn!("Accept error on port {}: {}", port, e);
                }
            }
        }
    }
}
