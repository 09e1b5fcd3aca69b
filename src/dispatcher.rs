//! Classifies inbound frames and routes them to services.

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::{
    asip::{Message, Request},
    services::{Outbox, Registry, Routes, Service, ServiceKind},
    transport::{Frame, FrameReader, Link, Transport},
};

/// Sends requests while the link is ready, and revokes readiness when a send fails.
pub struct Requester<L> {
    transport: Arc<Transport<L>>,
    ready: Arc<AtomicBool>,
}

impl<L> Clone for Requester<L> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            ready: self.ready.clone(),
        }
    }
}

impl<L: Link> Requester<L> {
    /// Not ready until [`Requester::set_ready`] says so.
    pub fn new(transport: Arc<Transport<L>>) -> Self {
        Self {
            transport,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether requests will be attempted.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Send `<service_id>,<tag>,<value>\n`. Returns whether it was written.
    pub async fn send_request(&self, service_id: &str, tag: &str, value: impl Display) -> bool {
        self.send(&Request::new(service_id, tag, value)).await
    }

    /// Send a prepared request.
    ///
    /// When not ready this fails without touching the link.
    /// A failed write closes the link and revokes readiness.
    pub async fn send(&self, request: &Request) -> bool {
        if !self.is_ready() {
            error!(%request, "Link is not ready, request not sent");
            return false;
        }

        debug!(%request, "Request for service {}", request.service_id);

        if self.transport.send(request.encode().as_bytes()).await {
            true
        } else {
            error!(%request, "Send failed, closing link");
            self.revoke().await;
            false
        }
    }

    /// Drop readiness and close the link.
    pub async fn revoke(&self) {
        self.set_ready(false);
        self.transport.close().await;
    }
}

/// What [`Dispatcher::dispatch`] did with a frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Dispatched {
    /// Handed to the registered service of this kind.
    Routed(ServiceKind),

    /// A system message, handled as information.
    Informational,

    /// The service id is known but nothing is registered for it.
    Unregistered(ServiceKind),

    /// Event for a service id nobody knows.
    Unrouted,

    /// Debug or error text, logged.
    Logged,

    /// Non-empty but unreadable, dropped.
    Ignored,

    /// Empty frame. Shutdown was signalled.
    Fatal,
}

/// Routes frames to services for one run of the manager.
pub struct Dispatcher<L> {
    registry: Arc<Mutex<Registry>>,
    routes: Routes,
    requester: Requester<L>,
    shutdown: CancellationToken,
}

impl<L: Link> Dispatcher<L> {
    /// A dispatcher which cancels `shutdown` when the link turns out to be out of sync.
    pub fn new(
        registry: Arc<Mutex<Registry>>,
        requester: Requester<L>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            routes: Routes::asip(),
            requester,
            shutdown,
        }
    }

    /// Register a service, let it initialize and send whatever it asked for.
    pub async fn register(&self, kind: ServiceKind, name: &str, service: Box<dyn Service>) {
        let mut outbox = Outbox::default();

        {
            let mut registry = self.registry.lock().await;
            registry.register(kind, name, service);

            if let Some(service) = registry.get_mut(kind) {
                service.initialize(&mut outbox);
            }
        }

        info!(%kind, %name, "Service registered");
        self.flush(outbox).await;
    }

    /// Initialize every registered service again and send what they ask for.
    pub async fn reinitialize(&self) {
        let mut outbox = Outbox::default();

        {
            let mut registry = self.registry.lock().await;
            if registry.is_empty() {
                return;
            }

            info!(services = ?registry.names(), "Initializing services again");
            registry.initialize_all(&mut outbox);
        }

        self.flush(outbox).await;
    }

    async fn flush(&self, mut outbox: Outbox) {
        for request in outbox.take() {
            self.requester.send(&request).await;
        }
    }

    async fn deliver(&self, kind: ServiceKind, frame: &Frame) -> bool {
        let mut outbox = Outbox::default();

        {
            let mut registry = self.registry.lock().await;
            let Some(service) = registry.get_mut(kind) else {
                return false;
            };

            service.process_response(frame, &mut outbox);
        }

        self.flush(outbox).await;
        true
    }

    /// Classify one frame and act on it.
    pub async fn dispatch(&self, frame: &Frame) -> Dispatched {
        match Message::parse(frame) {
            Message::Empty => {
                error!("Empty frame, link is out of sync. Shutting down");
                self.shutdown.cancel();
                self.requester.revoke().await;

                Dispatched::Fatal
            }
            Message::System(_) => {
                if !self.deliver(ServiceKind::SystemInfo, frame).await {
                    info!(%frame, "System message");
                }

                Dispatched::Informational
            }
            Message::Event { service_id, .. } => {
                let Some(kind) = self.routes.lookup(service_id) else {
                    debug!(%service_id, %frame, "No route for service, dropped");
                    return Dispatched::Unrouted;
                };

                if self.deliver(kind, frame).await {
                    trace!(%kind, %frame, "Routed");
                    Dispatched::Routed(kind)
                } else {
                    debug!(%kind, %frame, "No service registered, dropped");
                    Dispatched::Unregistered(kind)
                }
            }
            Message::Debug(text) => {
                debug!("Board: {text}");
                Dispatched::Logged
            }
            Message::Error(text) => {
                error!("Err: {text}");
                Dispatched::Logged
            }
            Message::Unknown(text) => {
                warn!(%text, "Unknown message header, dropped");
                Dispatched::Ignored
            }
        }
    }

    /// Dispatch fresh frames every `interval` until shutdown.
    pub async fn run(&self, mut frames: FrameReader, interval: Duration) {
        async move {
            info!("Dispatch loop running");

            while !self.shutdown.is_cancelled() {
                if let Some(frame) = frames.take_fresh() {
                    self.dispatch(&frame).await;
                }

                tokio::time::sleep(interval).await;
            }

            info!("Dispatch loop stopped");
        }
        .instrument(info_span!("dispatch"))
        .await
    }
}
