use asip_manager::{
    error::Error,
    manager::{AsipManager, RunState},
    mock::MockLink,
    services::motors::{LEFT_MOTOR, RIGHT_MOTOR},
};
use color_eyre::Result;
use pretty_assertions::assert_eq;

mod common;

#[tokio::test]
async fn start_resets_board_and_sets_up_services() -> Result<()> {
    let (manager, link) = common::start().await?;

    assert_eq!(manager.run_state(), RunState::Running);
    assert_eq!(manager.port(), common::PORT);
    assert!(manager.is_ready());
    assert!(manager.is_link_open());
    assert_eq!(link.resets(), 1);

    assert_eq!(
        link.written_lines(),
        vec!["#,?\n".to_owned(), "2,A,1\n".to_owned()]
    );

    Ok(())
}

#[tokio::test]
async fn encoder_autoevent_comes_from_config() -> Result<()> {
    let (_manager, link) = common::start_with(asip_manager::config::Config {
        encoder_autoevent: 0,
        ..common::config()
    })
    .await?;

    assert_eq!(link.written_lines().last().map(String::as_str), Some("2,A,0\n"));

    Ok(())
}

#[tokio::test]
async fn cannot_start_twice() -> Result<()> {
    let (mut manager, link) = common::start().await?;

    assert!(matches!(manager.start().await, Err(Error::AlreadyRunning)));
    assert_eq!(link.resets(), 1);

    Ok(())
}

#[tokio::test]
async fn stop_closes_link() -> Result<()> {
    let (mut manager, _link) = common::start().await?;

    manager.stop().await;

    assert_eq!(manager.run_state(), RunState::Stopped);
    assert!(!manager.is_ready());
    assert!(!manager.is_link_open());

    // Again is fine.
    manager.stop().await;
    assert_eq!(manager.run_state(), RunState::Stopped);

    Ok(())
}

#[tokio::test]
async fn can_restart_after_stop() -> Result<()> {
    let (mut manager, link) = common::start().await?;
    let readings = manager.encoder_readings();

    manager.stop().await;
    manager.start().await?;

    assert_eq!(manager.run_state(), RunState::Running);
    assert!(manager.is_ready());
    assert_eq!(link.resets(), 2);

    link.push_line("E,2,3");
    common::wait_for("encoder readings", || readings.borrow().is_some()).await?;

    Ok(())
}

#[tokio::test]
async fn can_restart_after_link_went_out_of_sync() -> Result<()> {
    let (mut manager, link) = common::start().await?;

    link.push_line("");
    common::wait_for("loops to exit", || manager.run_state() == RunState::Stopped).await?;

    manager.start().await?;

    assert_eq!(manager.run_state(), RunState::Running);
    assert!(manager.is_ready());

    Ok(())
}

#[tokio::test]
async fn failed_write_closes_link() -> Result<()> {
    let (manager, link) = common::start().await?;
    let attempts = link.write_attempts();

    link.fail_writes(true);

    assert!(!manager.send_request("3", "1", "1").await);
    assert!(!manager.is_link_open());
    assert!(!manager.is_ready());
    assert_eq!(link.write_attempts(), attempts + 1);

    // Fails fast from now on.
    assert!(!manager.send_request("3", "1", "1").await);
    assert_eq!(link.write_attempts(), attempts + 1);

    Ok(())
}

#[tokio::test]
async fn reopening_recovers_from_failed_write() -> Result<()> {
    let (manager, link) = common::start().await?;

    link.fail_writes(true);
    assert!(!manager.set_motor(LEFT_MOTOR, 10).await);

    link.fail_writes(false);
    manager.open_link().await;

    assert!(manager.is_ready());
    assert!(manager.set_motor(LEFT_MOTOR, 10).await);
    assert_eq!(
        link.written_lines().last().map(String::as_str),
        Some("3,m,0,10\n")
    );

    Ok(())
}

#[tokio::test]
async fn toggle_link_closes_then_reopens() -> Result<()> {
    let (manager, link) = common::start().await?;

    manager.toggle_link().await;
    assert!(!manager.is_link_open());
    assert!(!manager.is_ready());
    assert!(!manager.set_motor(RIGHT_MOTOR, 50).await);

    manager.toggle_link().await;
    assert!(manager.is_link_open());
    assert!(manager.is_ready());
    assert_eq!(link.resets(), 2);
    // The board was reset, so the encoders are enabled again.
    assert_eq!(
        link.written_lines().last().map(String::as_str),
        Some("2,A,1\n")
    );

    // Still receiving.
    let state = manager.motor_state();
    link.push_line("E,3,0,15");
    common::wait_for("motor state", || state.borrow().power == [15, 0]).await?;

    Ok(())
}

#[tokio::test]
async fn motor_requests() -> Result<()> {
    let (manager, link) = common::start().await?;
    let before = link.written_lines().len();

    assert!(manager.set_motor(RIGHT_MOTOR, -40).await);
    assert!(manager.stop_motors().await);

    assert_eq!(
        link.written_lines()[before..].to_vec(),
        vec![
            "3,m,1,-40\n".to_owned(),
            "3,m,0,0\n".to_owned(),
            "3,m,1,0\n".to_owned(),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn unopenable_port_is_not_ready() -> Result<()> {
    asip_manager::logging::init(tracing::Level::DEBUG, None);

    let link = MockLink::default();
    link.fail_open(true);

    let mut manager = AsipManager::new(link.clone(), common::PORT, common::config());
    manager.start().await?;

    assert!(!manager.is_link_open());
    assert!(!manager.is_ready());
    assert_eq!(link.write_attempts(), 0);
    assert!(!manager.send_request("2", "A", 1).await);

    manager.stop().await;
    assert_eq!(manager.run_state(), RunState::Stopped);

    Ok(())
}

#[tokio::test]
async fn reopening_after_failed_open_receives() -> Result<()> {
    asip_manager::logging::init(tracing::Level::DEBUG, None);

    let link = MockLink::default();
    link.fail_open(true);

    let mut manager = AsipManager::new(link.clone(), common::PORT, common::config());
    manager.start().await?;
    assert!(!manager.is_ready());

    link.fail_open(false);
    manager.open_link().await;
    assert!(manager.is_ready());
    assert_eq!(
        link.written_lines(),
        vec!["#,?\n".to_owned(), "2,A,1\n".to_owned()]
    );

    let readings = manager.encoder_readings();
    link.push_line("E,2,5");
    common::wait_for("encoder readings", || readings.borrow().is_some()).await?;

    manager.stop().await;

    Ok(())
}

#[tokio::test]
async fn hung_write_is_given_up_on() -> Result<()> {
    let (manager, link) = common::start().await?;

    link.hang_writes(true);

    let sent = common::within("send to give up", manager.set_motor(LEFT_MOTOR, 10)).await?;

    assert!(!sent);
    assert!(!manager.is_ready());
    assert!(!manager.is_link_open());

    Ok(())
}
