use tokio::sync::watch;
use tracing::{info, warn};

use super::{Outbox, Service};
use crate::{
    asip::{BoardInfo, Message},
    transport::Frame,
};

/// Keeps what the board reported about itself.
#[derive(Debug)]
pub struct SystemInfo {
    board_info: watch::Sender<Option<BoardInfo>>,
}

impl SystemInfo {
    /// Publishes board info on `board_info`.
    pub fn new(board_info: watch::Sender<Option<BoardInfo>>) -> Self {
        Self { board_info }
    }
}

impl Service for SystemInfo {
    fn initialize(&mut self, _outbox: &mut Outbox) {}

    fn process_response(&mut self, frame: &Frame, _outbox: &mut Outbox) {
        let Message::System(fields) = Message::parse(frame) else {
            warn!(%frame, "System info got something other than a system message");
            return;
        };

        match BoardInfo::parse(fields) {
            Some(board_info) => {
                info!("{board_info}");
                self.board_info.send_replace(Some(board_info));
            }
            None => info!("Board says: {}", fields.trim()),
        }
    }
}
