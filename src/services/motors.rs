use tokio::sync::watch;
use tracing::{debug, warn};

use super::{Outbox, Service};
use crate::{
    asip::{Message, Request, ID_MOTOR_SERVICE, TAG_SET_MOTOR},
    transport::Frame,
};

/// Index of the left motor.
pub const LEFT_MOTOR: usize = 0;

/// Index of the right motor.
pub const RIGHT_MOTOR: usize = 1;

/// Power of each motor as last reported by the board.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct MotorState {
    /// Indexed by [`LEFT_MOTOR`] and [`RIGHT_MOTOR`].
    pub power: [i32; 2],
}

/// The two drive motors.
#[derive(Debug)]
pub struct Motors {
    state: watch::Sender<MotorState>,
}

impl Motors {
    /// Publishes motor reports on `state`.
    pub fn new(state: watch::Sender<MotorState>) -> Self {
        Self { state }
    }

    /// The request setting `motor` to `power`.
    pub fn set_power(motor: usize, power: i32) -> Request {
        Request::new(ID_MOTOR_SERVICE, TAG_SET_MOTOR, format!("{motor},{power}"))
    }
}

fn parse_report(fields: &str) -> Option<(usize, i32)> {
    let (motor, power) = fields.split_once(',')?;
    let motor = motor.trim().parse().ok().filter(|&m| m <= RIGHT_MOTOR)?;

    Some((motor, power.trim().parse().ok()?))
}

impl Service for Motors {
    fn initialize(&mut self, _outbox: &mut Outbox) {
        debug!("Motors ready");
    }

    fn process_response(&mut self, frame: &Frame, _outbox: &mut Outbox) {
        let Message::Event { fields, .. } = Message::parse(frame) else {
            warn!(%frame, "Motors got something other than an event");
            return;
        };

        match parse_report(fields) {
            Some((motor, power)) => {
                self.state.send_modify(|state| state.power[motor] = power);
            }
            None => warn!(%frame, "Could not read motor report"),
        }
    }
}
