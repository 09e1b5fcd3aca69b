//! The manager owns the run lifecycle.
//!
//! Starting opens the link, then launches the receive loop and the dispatch
//! loop as separate tasks, pausing after each so the board can finish its reset.
//! Services are registered once both loops run.

use std::{fmt::Display, sync::Arc};

use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    asip::{self, BoardInfo},
    config::Config,
    dispatcher::{Dispatcher, Requester},
    error::Error,
    services::{
        motors::{LEFT_MOTOR, RIGHT_MOTOR},
        EncoderReadings, Encoders, MotorState, Motors, Registry, Service, ServiceKind, SystemInfo,
    },
    transport::{Frame, FrameSlot, Link, Transport, TransportTiming},
};

/// Where the two loops are in their lifecycle.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RunState {
    /// Both loops are running.
    Running,

    /// Shutdown was signalled but the loops have not all exited.
    Stopping,

    /// No loops are running.
    Stopped,
}

struct Run<L> {
    token: CancellationToken,
    dispatcher: Arc<Dispatcher<L>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

/// Talks ASIP to one board over one link.
pub struct AsipManager<L> {
    config: Config,
    port: String,
    transport: Arc<Transport<L>>,
    requester: Requester<L>,
    registry: Arc<Mutex<Registry>>,

    encoder_readings: watch::Sender<Option<EncoderReadings>>,
    motor_state: watch::Sender<MotorState>,
    board_info: watch::Sender<Option<BoardInfo>>,

    run: Option<Run<L>>,
}

impl<L: Link> AsipManager<L> {
    /// A manager for the board at `port`. Nothing is opened until [`AsipManager::start`].
    pub fn new(link: L, port: &str, config: Config) -> Self {
        let transport = Arc::new(Transport::new(link, TransportTiming::from(&config)));
        let requester = Requester::new(transport.clone());

        Self {
            config,
            port: port.to_owned(),
            transport,
            requester,
            registry: Arc::new(Mutex::new(Registry::default())),
            encoder_readings: watch::channel(None).0,
            motor_state: watch::channel(MotorState::default()).0,
            board_info: watch::channel(None).0,
            run: None,
        }
    }

    /// The port this manager talks to.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Where inbound frames land. Storing a frame here is the same as the board sending it.
    pub fn frames(&self) -> &FrameSlot {
        self.transport.frames()
    }

    /// The most recent frame, whether dispatched yet or not.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.transport.latest_frame()
    }

    /// Whether the link is open and the handshake went out.
    pub fn is_ready(&self) -> bool {
        self.requester.is_ready()
    }

    /// Whether the link is open.
    pub fn is_link_open(&self) -> bool {
        self.transport.is_open()
    }

    /// See [`RunState`].
    pub fn run_state(&self) -> RunState {
        match &self.run {
            None => RunState::Stopped,
            Some(run) if !run.token.is_cancelled() => RunState::Running,
            Some(run) if run.tasks.iter().all(|(_, task)| task.is_finished()) => {
                RunState::Stopped
            }
            Some(_) => RunState::Stopping,
        }
    }

    /// Cancelled when the current run ends, either by [`AsipManager::stop`]
    /// or because the link went out of sync.
    pub fn shutdown_token(&self) -> Option<CancellationToken> {
        self.run.as_ref().map(|run| run.token.clone())
    }

    /// Watch encoder events.
    pub fn encoder_readings(&self) -> watch::Receiver<Option<EncoderReadings>> {
        self.encoder_readings.subscribe()
    }

    /// Watch motor reports.
    pub fn motor_state(&self) -> watch::Receiver<MotorState> {
        self.motor_state.subscribe()
    }

    /// Watch what the board says about itself.
    pub fn board_info(&self) -> watch::Receiver<Option<BoardInfo>> {
        self.board_info.subscribe()
    }

    /// Open the link and send the info request.
    /// The manager is ready once that request was written.
    ///
    /// Opening resets the board, so when reopening while running
    /// the registered services are initialized again.
    pub async fn open_link(&self) {
        let config = &self.config;
        self.transport
            .open(&self.port, config.baud, config.read_timeout())
            .await;

        if !self.transport.is_open() {
            error!(port = %self.port, "Failed to open serial port");
            return;
        }

        if !self.transport.send(asip::info_request().as_bytes()).await {
            error!(port = %self.port, "Info request failed, link not ready");
            return;
        }

        self.requester.set_ready(true);
        info!(port = %self.port, "Serial port opened successfully");

        if let Some(run) = self.run.as_ref().filter(|run| !run.token.is_cancelled()) {
            run.dispatcher.reinitialize().await;
        }
    }

    /// Close the link. The manager is not ready afterwards.
    pub async fn close_link(&self) {
        self.requester.revoke().await;
        info!(port = %self.port, "Closing serial port");
    }

    /// Close the link if open, open it otherwise.
    pub async fn toggle_link(&self) {
        if self.transport.is_open() {
            self.close_link().await;
        } else {
            self.open_link().await;
        }
    }

    /// Send `<service_id>,<tag>,<value>\n`.
    ///
    /// Fails without any I/O when not ready.
    /// A failed write closes the link, see [`AsipManager::open_link`] to recover.
    pub async fn send_request(&self, service_id: &str, tag: &str, value: impl Display) -> bool {
        self.requester.send_request(service_id, tag, value).await
    }

    /// Set one motor's power.
    pub async fn set_motor(&self, motor: usize, power: i32) -> bool {
        self.requester.send(&Motors::set_power(motor, power)).await
    }

    /// Set both motors' power to zero.
    pub async fn stop_motors(&self) -> bool {
        let left = self.set_motor(LEFT_MOTOR, 0).await;
        let right = self.set_motor(RIGHT_MOTOR, 0).await;

        left && right
    }

    /// Open the link, start both loops, then register the services.
    pub async fn start(&mut self) -> Result<(), Error> {
        match self.run_state() {
            RunState::Running => return Err(Error::AlreadyRunning),
            // Left over from a shutdown nobody collected yet.
            RunState::Stopping | RunState::Stopped if self.run.is_some() => self.stop().await,
            _ => {}
        }

        self.open_link().await;

        let token = CancellationToken::new();
        let dispatcher = Arc::new(Dispatcher::new(
            self.registry.clone(),
            self.requester.clone(),
            token.clone(),
        ));

        // Subscribed now, so nothing stored before the dispatch loop runs is missed.
        let frames = self.transport.frames().reader();

        let receive = tokio::spawn({
            let transport = self.transport.clone();
            let token = token.clone();
            async move { transport.receive_loop(token).await }
        });
        info!("Receive loop set up");
        tokio::time::sleep(self.config.startup_settle()).await;

        let dispatch = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let interval = self.config.dispatch_interval();
            async move { dispatcher.run(frames, interval).await }
        });
        info!("Dispatch loop set up");
        tokio::time::sleep(self.config.startup_settle()).await;

        self.run = Some(Run {
            token,
            dispatcher,
            tasks: vec![("receive", receive), ("dispatch", dispatch)],
        });

        self.initialize_services().await;

        Ok(())
    }

    /// Register the board's services: system info, encoders, motors.
    pub async fn initialize_services(&self) {
        let Some(run) = &self.run else {
            warn!("Services are registered after start");
            return;
        };

        let dispatcher = &run.dispatcher;

        dispatcher
            .register(
                ServiceKind::SystemInfo,
                "system",
                Box::new(SystemInfo::new(self.board_info.clone())),
            )
            .await;
        dispatcher
            .register(
                ServiceKind::Encoders,
                "encoders",
                Box::new(Encoders::new(
                    self.config.encoder_autoevent,
                    self.encoder_readings.clone(),
                )),
            )
            .await;
        dispatcher
            .register(
                ServiceKind::Motors,
                "motors",
                Box::new(Motors::new(self.motor_state.clone())),
            )
            .await;
    }

    /// Register an extra service, for example for the bump sensors.
    /// Only possible while running.
    pub async fn register_service(&self, kind: ServiceKind, name: &str, service: Box<dyn Service>) {
        match &self.run {
            Some(run) => run.dispatcher.register(kind, name, service).await,
            None => warn!(%kind, %name, "Not running, service not registered"),
        }
    }

    /// Signal both loops to stop, wait for them, then close the link.
    pub async fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.token.cancel();

            for (name, mut task) in run.tasks {
                let joined = match self.config.shutdown_timeout() {
                    Some(timeout) => tokio::time::timeout(timeout, &mut task).await.ok(),
                    None => Some((&mut task).await),
                };

                match joined {
                    Some(Ok(())) => info!(loop_name = name, "Loop stopped"),
                    Some(Err(e)) => error!(loop_name = name, ?e, "Loop ended abnormally"),
                    None => {
                        warn!(loop_name = name, "Loop did not stop in time, aborting it");
                        task.abort();
                    }
                }
            }
        }

        self.close_link().await;
    }

    /// Wait until the current run is told to stop.
    pub async fn stopped(&self) {
        if let Some(token) = self.shutdown_token() {
            token.cancelled().await;
        }
    }
}

impl<L> Drop for AsipManager<L> {
    fn drop(&mut self) {
        if let Some(run) = &self.run {
            run.token.cancel();
        }
    }
}
