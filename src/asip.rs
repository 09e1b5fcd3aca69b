//! The ASIP wire protocol.
//!
//! Inbound lines start with a header character:
//!
//! - `E,<service id>[,<fields>...]` is an event from a service.
//! - `D<text>` is debug output from the board.
//! - `!<text>` is an error reported by the board.
//!
//! Outbound lines are `<service id>,<tag>,<value>\n`.

use std::fmt::Display;

use crate::transport::Frame;

/// Header of event messages.
pub const EVENT_HEADER: char = 'E';

/// Header of debug messages.
pub const DEBUG_MSG_HEADER: char = 'D';

/// Header of error messages.
pub const ERROR_MSG_HEADER: char = '!';

/// Reserved service id for system/info messages.
pub const SYSTEM_MSG_HEADER: &str = "#";

/// Service id of the wheel encoders.
pub const ID_ENCODER_SERVICE: &str = "2";

/// Service id of the motors.
pub const ID_MOTOR_SERVICE: &str = "3";

/// Service id of the bump sensors.
pub const ID_BUMP_SERVICE: &str = "4";

/// Service id of the IR reflectance sensors.
pub const ID_IR_REFLECTANCE_SERVICE: &str = "5";

/// Ask a service to start (non-zero value) or stop (zero) streaming events.
pub const TAG_AUTOEVENT_REQUEST: &str = "A";

/// Set the power of a motor.
pub const TAG_SET_MOTOR: &str = "m";

/// Ask the board to describe itself.
pub const TAG_SYSTEM_GET_INFO: &str = "?";

/// Sent once right after the link opens: `#,?\n`.
pub fn info_request() -> String {
    format!("{SYSTEM_MSG_HEADER},{TAG_SYSTEM_GET_INFO}\n")
}

/// A [`Frame`] classified by its header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Message<'a> {
    /// A service event. `fields` holds everything after the service id.
    Event {
        /// Which service sent it.
        service_id: &'a str,

        /// Remaining comma separated fields.
        fields: &'a str,
    },

    /// A system/info message, carried as an event with the reserved id.
    System(&'a str),

    /// Debug text.
    Debug(&'a str),

    /// Error text.
    Error(&'a str),

    /// The frame was empty.
    Empty,

    /// Non-empty, but not something we know how to read.
    Unknown(&'a str),
}

impl<'a> Message<'a> {
    /// Classify a frame.
    pub fn parse(frame: &'a Frame) -> Self {
        let text = frame.as_str();

        let mut chars = text.chars();
        let Some(header) = chars.next() else {
            return Self::Empty;
        };
        let rest = chars.as_str();

        match header {
            EVENT_HEADER => {
                let Some(payload) = rest.strip_prefix(',') else {
                    return Self::Unknown(text);
                };

                let (service_id, fields) = payload.split_once(',').unwrap_or((payload, ""));

                if service_id == SYSTEM_MSG_HEADER {
                    Self::System(fields)
                } else {
                    Self::Event { service_id, fields }
                }
            }
            DEBUG_MSG_HEADER => Self::Debug(rest),
            ERROR_MSG_HEADER => Self::Error(rest),
            _ => Self::Unknown(text),
        }
    }
}

/// An outbound command.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Request {
    /// Which service the command is for.
    pub service_id: String,

    /// What kind of command.
    pub tag: String,

    /// The argument. May itself contain commas.
    pub value: String,
}

impl Request {
    /// A new request.
    pub fn new(service_id: &str, tag: &str, value: impl Display) -> Self {
        Self {
            service_id: service_id.into(),
            tag: tag.into(),
            value: value.to_string(),
        }
    }

    /// The line as it goes on the wire, including the newline.
    pub fn encode(&self) -> String {
        format!("{},{},{}\n", self.service_id, self.tag, self.value)
    }

    /// Parse an encoded request. The trailing newline is optional.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);

        let mut parts = line.splitn(3, ',');
        let service_id = parts.next()?;
        let tag = parts.next()?;
        let value = parts.next()?;

        Some(Self::new(service_id, tag, value))
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.service_id, self.tag, self.value)
    }
}

/// What the board says about itself in a system message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BoardInfo {
    /// Protocol major version.
    pub major: String,

    /// Protocol minor version.
    pub minor: String,

    /// Board name.
    pub board: String,

    /// Name of the sketch running on the board.
    pub sketch: String,
}

impl BoardInfo {
    /// Parse the fields of a system message,
    /// `<major>,<minor>,<board>,<unused>,<sketch>`, optionally wrapped in braces.
    pub fn parse(fields: &str) -> Option<Self> {
        let fields = fields.trim();
        let fields = fields
            .strip_prefix('{')
            .and_then(|f| f.strip_suffix('}'))
            .unwrap_or(fields);

        let parts = fields.split(',').map(str::trim).collect::<Vec<_>>();

        match parts.as_slice() {
            [major, minor, board, _, sketch, ..] => Some(Self {
                major: major.to_string(),
                minor: minor.to_string(),
                board: board.to_string(),
                sketch: sketch.to_string(),
            }),
            _ => None,
        }
    }
}

impl Display for BoardInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ASIP version {}.{} running on {} using sketch: {}",
            self.major, self.minor, self.board, self.sketch
        )
    }
}
