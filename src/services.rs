//! Services handle one category of traffic each.
//!
//! A service is told to [`Service::initialize`] once when registered,
//! and is then handed every inbound frame addressed to it.
//! Outbound traffic is queued on an [`Outbox`] which the dispatcher
//! flushes onto the link right after the call returns.

use std::{collections::HashMap, fmt::Display};

use tracing::warn;

use crate::{
    asip::{
        self, Request, ID_BUMP_SERVICE, ID_ENCODER_SERVICE, ID_IR_REFLECTANCE_SERVICE,
        ID_MOTOR_SERVICE,
    },
    transport::Frame,
};

/// Wheel encoders.
pub mod encoders;

/// Motors.
pub mod motors;

/// Board information.
pub mod system_info;

pub use encoders::{EncoderReadings, EncoderSample, Encoders};
pub use motors::{MotorState, Motors};
pub use system_info::SystemInfo;

/// The kinds of service the board offers.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum ServiceKind {
    /// Board information. Addressed by the reserved system id.
    SystemInfo,

    /// Wheel encoders.
    Encoders,

    /// Motors.
    Motors,

    /// Bump sensors.
    Bump,

    /// IR reflectance sensors.
    IrReflectance,
}

impl ServiceKind {
    /// The id the board uses for this service.
    pub fn service_id(self) -> &'static str {
        match self {
            ServiceKind::SystemInfo => asip::SYSTEM_MSG_HEADER,
            ServiceKind::Encoders => ID_ENCODER_SERVICE,
            ServiceKind::Motors => ID_MOTOR_SERVICE,
            ServiceKind::Bump => ID_BUMP_SERVICE,
            ServiceKind::IrReflectance => ID_IR_REFLECTANCE_SERVICE,
        }
    }

    /// Registry name.
    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::SystemInfo => "system",
            ServiceKind::Encoders => "encoders",
            ServiceKind::Motors => "motors",
            ServiceKind::Bump => "bump",
            ServiceKind::IrReflectance => "reflectance",
        }
    }
}

impl Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Maps service ids found in event frames to the service kind handling them.
///
/// The system id is not in here, system messages take their own path.
#[derive(Debug, Clone)]
pub struct Routes(HashMap<&'static str, ServiceKind>);

impl Routes {
    /// The routes of an ASIP board.
    pub fn asip() -> Self {
        Self(
            [
                ServiceKind::Encoders,
                ServiceKind::Motors,
                ServiceKind::Bump,
                ServiceKind::IrReflectance,
            ]
            .into_iter()
            .map(|kind| (kind.service_id(), kind))
            .collect(),
        )
    }

    /// Which kind of service handles `service_id`, if any.
    pub fn lookup(&self, service_id: &str) -> Option<ServiceKind> {
        self.0.get(service_id).copied()
    }
}

/// Outbound requests queued by a service.
#[derive(Debug, Default)]
pub struct Outbox {
    requests: Vec<Request>,
}

impl Outbox {
    /// Queue `<service_id>,<tag>,<value>` for sending.
    pub fn send(&mut self, service_id: &str, tag: &str, value: impl Display) {
        self.requests.push(Request::new(service_id, tag, value));
    }

    /// Take everything queued so far.
    pub fn take(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    /// Nothing queued.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Something which handles traffic for one kind of service.
pub trait Service: Send {
    /// One-time setup when registered. May queue requests.
    fn initialize(&mut self, outbox: &mut Outbox);

    /// Handle an inbound frame addressed to this service.
    /// Must not block.
    fn process_response(&mut self, frame: &Frame, outbox: &mut Outbox);
}

struct Entry {
    kind: ServiceKind,
    name: String,
    service: Box<dyn Service>,
}

/// The registered services, in registration order.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| (entry.kind, &entry.name)))
            .finish()
    }
}

impl Registry {
    /// Add a service under `kind`.
    /// A second registration for the same kind replaces the first.
    pub fn register(&mut self, kind: ServiceKind, name: &str, service: Box<dyn Service>) {
        let entry = Entry {
            kind,
            name: name.to_owned(),
            service,
        };

        if let Some(existing) = self.entries.iter_mut().find(|e| e.kind == kind) {
            warn!(%kind, %name, "Replacing registered service");
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// The service registered under `kind`.
    pub fn get_mut(&mut self, kind: ServiceKind) -> Option<&mut (dyn Service + 'static)> {
        self.entries
            .iter_mut()
            .find(|entry| entry.kind == kind)
            .map(|entry| entry.service.as_mut())
    }

    /// Let every service initialize again, in registration order.
    /// Used after the board was reset underneath them.
    pub fn initialize_all(&mut self, outbox: &mut Outbox) {
        for entry in &mut self.entries {
            entry.service.initialize(outbox);
        }
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Nothing registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
