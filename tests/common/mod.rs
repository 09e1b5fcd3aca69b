#![allow(dead_code)]

use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use asip_manager::{
    config::Config,
    manager::AsipManager,
    mock::MockLink,
    services::{Outbox, Service},
    transport::Frame,
};
use color_eyre::{eyre::eyre, Result};
use tokio::time::{sleep, timeout};

pub const PORT: &str = "/dev/ttyMOCK0";

/// Same as the default, but fast enough for tests.
pub fn config() -> Config {
    Config {
        read_timeout_ms: 5,
        write_timeout_ms: 50,
        reset_settle_ms: 0,
        receive_interval_ms: 1,
        dispatch_interval_ms: 1,
        startup_settle_ms: 5,
        shutdown_timeout_ms: Some(500),
        ..Config::default()
    }
}

/// A started manager, plus a clone of its link to poke at.
pub async fn start() -> Result<(AsipManager<MockLink>, MockLink)> {
    start_with(config()).await
}

pub async fn start_with(config: Config) -> Result<(AsipManager<MockLink>, MockLink)> {
    asip_manager::logging::init(tracing::Level::DEBUG, None);

    let link = MockLink::default();
    let mut manager = AsipManager::new(link.clone(), PORT, config);
    manager.start().await?;

    Ok((manager, link))
}

/// Poll `check` until it holds, or fail after a second.
pub async fn wait_for<F>(what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let polled = timeout(Duration::from_secs(1), async {
        while !check() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await;

    polled.map_err(|_| eyre!("Timed out waiting for: {what}"))
}

/// Run `fut`, failing after a second.
pub async fn within<T>(what: &str, fut: impl Future<Output = T>) -> Result<T> {
    timeout(Duration::from_secs(1), fut)
        .await
        .map_err(|_| eyre!("Timed out waiting for: {what}"))
}

/// Give the loops a few ticks.
pub async fn settle() {
    sleep(Duration::from_millis(30)).await;
}

/// Remembers every frame it is handed.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    frames: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().expect("not poisoned").clone()
    }
}

impl Service for Recorder {
    fn initialize(&mut self, _outbox: &mut Outbox) {}

    fn process_response(&mut self, frame: &Frame, _outbox: &mut Outbox) {
        self.frames
            .lock()
            .expect("not poisoned")
            .push(frame.as_str().to_owned());
    }
}
