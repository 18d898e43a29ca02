use crate::error::Result;
use crate::registry::Domain;
use crate::smtp::session::{SessionSettings, SmtpSession};
use crate::storage::MailStore;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Listener for one domain
pub struct SmtpServer {
    domain: String,
    listener: TcpListener,
    store: Arc<MailStore>,
    settings: SessionSettings,
}

impl SmtpServer {
    /// Bind `bind_addr:<domain.port>`
    pub async fn bind(
        domain: &Domain,
        bind_addr: &str,
        store: Arc<MailStore>,
        settings: SessionSettings,
    ) -> Result<Self> {
        let listener = TcpListener::bind((bind_addr, domain.port)).await?;
        Ok(Self {
            domain: domain.name.clone(),
            listener,
            store,
            settings,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown`; every session runs on its own task
    pub async fn run(self, shutdown: CancellationToken, tracker: TaskTracker) {
        info!(
            "SMTP server for {} listening on {}",
            self.domain,
            self.listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default()
        );

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, addr)) => {
                    info!("New SMTP connection from {} -> {}", addr, self.domain);

                    let session = SmtpSession::new(
                        self.domain.clone(),
                        self.store.clone(),
                        self.settings.clone(),
                    );
                    let shutdown = shutdown.clone();
                    let domain = self.domain.clone();

                    tracker.spawn(async move {
                        if let Err(e) = session.handle(socket, shutdown).await {
                            error!("Session error on {}: {}", domain, e);
                        }
                        debug!("SMTP connection from {} closed", addr);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection for {}: {}", self.domain, e);
                }
            }
        }

        info!("SMTP server for {} stopped", self.domain);
    }
}

/// All per-domain listeners of the process
pub struct ListenerSet {
    addrs: Vec<(String, SocketAddr)>,
    active: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl ListenerSet {
    /// Bind and start one listener per domain.
    ///
    /// A domain whose port cannot be bound is logged and skipped; the
    /// others keep serving.
    pub async fn start(
        domains: &[Domain],
        bind_addr: &str,
        store: Arc<MailStore>,
        settings: SessionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let tracker = TaskTracker::new();
        let active = Arc::new(AtomicUsize::new(0));
        let mut addrs = Vec::new();

        for domain in domains {
            let server = match SmtpServer::bind(domain, bind_addr, store.clone(), settings.clone()).await {
                Ok(server) => server,
                Err(e) => {
                    error!(
                        "Failed to start SMTP server for {} on port {}: {}",
                        domain.name, domain.port, e
                    );
                    continue;
                }
            };
            if let Ok(addr) = server.local_addr() {
                addrs.push((domain.name.clone(), addr));
            }

            active.fetch_add(1, Ordering::SeqCst);
            let active = active.clone();
            let shutdown = shutdown.clone();
            let sessions = tracker.clone();
            tracker.spawn(async move {
                server.run(shutdown, sessions).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }

        info!("Started {} SMTP server(s)", active.load(Ordering::SeqCst));
        ListenerSet {
            addrs,
            active,
            shutdown,
            tracker,
        }
    }

    /// Number of listeners currently accepting
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Shared counter behind [`ListenerSet::active_count`]
    pub fn active_counter(&self) -> Arc<AtomicUsize> {
        self.active.clone()
    }

    /// Bound address of a domain's listener
    pub fn addr_of(&self, domain: &str) -> Option<SocketAddr> {
        self.addrs
            .iter()
            .find(|(name, _)| name == domain)
            .map(|(_, addr)| *addr)
    }

    pub fn addrs(&self) -> &[(String, SocketAddr)] {
        &self.addrs
    }

    /// Stop accepting, tell open sessions to close, and wait up to `grace`
    /// for them to finish
    pub async fn shutdown(self, grace: Duration) {
        self.shutdown.cancel();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!("Sessions still open after {:?}, abandoning them", grace);
        } else {
            info!("All SMTP listeners and sessions closed");
        }
    }
}
