use tokio::sync::watch;
use tracing::{debug, warn};

use super::{Outbox, Service};
use crate::{
    asip::{Message, ID_ENCODER_SERVICE, TAG_AUTOEVENT_REQUEST},
    transport::Frame,
};

/// One encoder's value from an event.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct EncoderSample {
    /// Time between the last two pulses, when the board reports it.
    pub pulse: Option<i64>,

    /// Accumulated count.
    pub count: i64,
}

impl EncoderSample {
    fn parse(field: &str) -> Option<Self> {
        match field.trim().split_once(':') {
            Some((pulse, count)) => Some(Self {
                pulse: Some(pulse.trim().parse().ok()?),
                count: count.trim().parse().ok()?,
            }),
            None => Some(Self {
                pulse: None,
                count: field.trim().parse().ok()?,
            }),
        }
    }
}

/// The most recent encoder event.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EncoderReadings {
    /// The frame as received.
    pub frame: Frame,

    /// One sample per encoder, in board order.
    pub samples: Vec<EncoderSample>,
}

/// The wheel encoders.
///
/// Turned on at registration by asking for auto events,
/// then every event is published to watchers.
#[derive(Debug)]
pub struct Encoders {
    autoevent: u32,
    readings: watch::Sender<Option<EncoderReadings>>,
}

impl Encoders {
    /// `autoevent` is sent as the auto event request value, zero turns events off.
    pub fn new(autoevent: u32, readings: watch::Sender<Option<EncoderReadings>>) -> Self {
        Self {
            autoevent,
            readings,
        }
    }
}

fn parse_samples(fields: &str) -> Option<Vec<EncoderSample>> {
    let fields = fields.trim();
    let fields = fields
        .strip_prefix('{')
        .and_then(|f| f.strip_suffix('}'))
        .unwrap_or(fields);

    fields.split(',').map(EncoderSample::parse).collect()
}

impl Service for Encoders {
    fn initialize(&mut self, outbox: &mut Outbox) {
        debug!(autoevent = self.autoevent, "Enabling encoder events");
        outbox.send(ID_ENCODER_SERVICE, TAG_AUTOEVENT_REQUEST, self.autoevent);
    }

    fn process_response(&mut self, frame: &Frame, _outbox: &mut Outbox) {
        let Message::Event { fields, .. } = Message::parse(frame) else {
            warn!(%frame, "Encoders got something other than an event");
            return;
        };

        match parse_samples(fields) {
            Some(samples) => {
                self.readings.send_replace(Some(EncoderReadings {
                    frame: frame.clone(),
                    samples,
                }));
            }
            None => warn!(%frame, "Could not read encoder values"),
        }
    }
}
