use tapo_session::crypto::credential_hash;
use tapo_session::e2e_common::{InsecureTestRng, SimulatedDevice, UnreachableTransport};
use tapo_session::messages::device_info_request;
use tapo_session::{
    CommandError, CommandExecutor, Credentials, DeviceCommand, DeviceError, RetryPolicy,
    SessionConfig, TapoDevice, TapoSession,
};

const ADDRESS: &str = "10.0.7.21";

fn credentials() -> Credentials {
    Credentials::new("user@example.com", "secret")
}

fn device() -> SimulatedDevice {
    SimulatedDevice::new(credential_hash("user@example.com", "secret"))
}

async fn executor(
    device: SimulatedDevice,
    config: SessionConfig,
) -> CommandExecutor<SimulatedDevice, InsecureTestRng> {
    let mut session = TapoSession::with_rng(device, InsecureTestRng::counting(), config);
    session.handshake(ADDRESS, &credentials()).await.unwrap();
    CommandExecutor::new(session)
}

#[tokio::test]
async fn command_confirmed_on_first_attempt() {
    let device = device();
    let state = device.state();
    let mut exec = executor(device, SessionConfig::default()).await;

    let ok = exec
        .execute(
            &DeviceCommand::On.request(),
            Some(&DeviceCommand::On.expected_state()),
        )
        .await;

    assert!(ok);
    let state = state.lock();
    assert_eq!(state.set_calls, 1);
    assert_eq!(state.info_calls, 1);
    assert_eq!(state.handshake1_calls, 1);
    assert_eq!(state.info["device_on"], true);
}

#[tokio::test]
async fn unconfirmed_command_exhausts_budget() {
    let device = device();
    let state = device.state();
    state.lock().reflect_state = false;
    let mut exec = executor(device, SessionConfig::default()).await;

    let ok = exec
        .execute(
            &DeviceCommand::On.request(),
            Some(&DeviceCommand::On.expected_state()),
        )
        .await;

    assert!(!ok);
    let state = state.lock();
    assert_eq!(state.set_calls, 9);
    assert_eq!(state.info_calls, 9);
    // Initial handshake plus one per exhausted round.
    assert_eq!(state.handshake1_calls, 4);
    assert_eq!(state.handshake2_calls, 4);
}

#[tokio::test]
async fn failed_sends_skip_state_checks() {
    let device = device();
    let state = device.state();
    let mut exec = executor(device, SessionConfig::default()).await;
    state.lock().request_status = Some(500);

    let ok = exec
        .execute(
            &DeviceCommand::Brightness(30).request(),
            Some(&DeviceCommand::Brightness(30).expected_state()),
        )
        .await;

    assert!(!ok);
    let state = state.lock();
    assert_eq!(state.request_calls, 9);
    assert_eq!(state.info_calls, 0);
    assert_eq!(state.handshake1_calls, 4);
}

#[tokio::test]
async fn lost_device_session_recovers_after_rehandshake() {
    let device = device();
    let state = device.state();
    let mut exec = executor(device, SessionConfig::default()).await;
    state.lock().forget_session();

    let ok = exec
        .execute(
            &DeviceCommand::Brightness(64).request(),
            Some(&DeviceCommand::Brightness(64).expected_state()),
        )
        .await;

    assert!(ok);
    let state = state.lock();
    assert_eq!(state.handshake1_calls, 2);
    assert_eq!(state.set_calls, 1);
    // Three rejected sends, then the confirmed command and its state query.
    assert_eq!(state.request_calls, 5);
    assert_eq!(state.info["brightness"], 64);
}

#[tokio::test]
async fn failed_rehandshake_is_not_fatal() {
    let device = device();
    let state = device.state();
    let mut exec = executor(device, SessionConfig::default()).await;
    {
        let mut state = state.lock();
        state.forget_session();
        state.reject_handshakes = 1;
    }

    let ok = exec
        .execute(
            &DeviceCommand::Off.request(),
            Some(&DeviceCommand::Off.expected_state()),
        )
        .await;

    assert!(ok);
    let state = state.lock();
    assert_eq!(state.handshake1_calls, 3);
    assert_eq!(state.set_calls, 1);
}

#[tokio::test]
async fn delivery_without_expected_state_is_success() {
    let device = device();
    let state = device.state();
    state.lock().reflect_state = false;
    let mut exec = executor(device, SessionConfig::default()).await;

    assert!(exec.execute(&DeviceCommand::On.request(), None).await);
    let state = state.lock();
    assert_eq!(state.set_calls, 1);
    assert_eq!(state.info_calls, 0);
}

#[tokio::test]
async fn executor_fails_fast_without_handshake() {
    let transport = UnreachableTransport::default();
    let calls = transport.calls.clone();
    let session = TapoSession::new(transport, SessionConfig::default());
    let mut exec = CommandExecutor::new(session);

    assert!(!exec.execute(&DeviceCommand::On.request(), Some("x")).await);
    assert!(!exec.check_state("\"device_on\":true").await);
    assert_eq!(*calls.lock(), 0);
}

#[tokio::test]
async fn custom_policy_bounds_attempts() {
    let device = device();
    let state = device.state();
    state.lock().reflect_state = false;
    let config = SessionConfig {
        max_send_attempts: 2,
        max_reconnect_attempts: 1,
        ..SessionConfig::default()
    };
    let mut exec = executor(device, config.clone()).await;
    assert_eq!(exec.policy(), config.retry_policy());
    assert_eq!(exec.policy().total_send_budget(), 2);

    assert!(
        !exec
            .execute(
                &DeviceCommand::On.request(),
                Some(&DeviceCommand::On.expected_state())
            )
            .await
    );
    let state = state.lock();
    assert_eq!(state.set_calls, 2);
    assert_eq!(state.handshake1_calls, 2);
}

#[tokio::test]
async fn explicit_policy_overrides_session_config() {
    let device = device();
    let state = device.state();
    state.lock().reflect_state = false;
    let mut session = TapoSession::with_rng(
        device,
        InsecureTestRng::counting(),
        SessionConfig::default(),
    );
    session.handshake(ADDRESS, &credentials()).await.unwrap();
    let policy = RetryPolicy {
        max_send_attempts: 1,
        max_reconnect_attempts: 2,
    };
    let mut exec = CommandExecutor::with_policy(session, policy);

    assert_eq!(exec.policy(), policy);
    assert!(
        !exec
            .execute(
                &DeviceCommand::On.request(),
                Some(&DeviceCommand::On.expected_state())
            )
            .await
    );
    let state = state.lock();
    assert_eq!(state.set_calls, 2);
    assert_eq!(state.handshake1_calls, 3);
}

#[tokio::test]
async fn check_state_matches_reported_fragment() {
    let mut exec = executor(device(), SessionConfig::default()).await;

    assert!(exec.check_state("\"model\":\"L530\"").await);
    assert!(exec.check_state("\"brightness\":50").await);
    assert!(!exec.check_state("\"device_on\":true").await);
}

#[tokio::test]
async fn raw_session_reply_reflects_commands() {
    let mut exec = executor(device(), SessionConfig::default()).await;
    assert!(
        exec.execute(
            &DeviceCommand::ColorTemperature(4000).request(),
            Some(&DeviceCommand::ColorTemperature(4000).expected_state()),
        )
        .await
    );

    let reply = exec
        .session_mut()
        .send_message(&device_info_request())
        .await
        .unwrap();
    assert!(reply.contains(r#""color_temp":4000"#));
    assert!(reply.contains(r#""hue":0"#));
}

async fn tapo_device(sim: SimulatedDevice) -> TapoDevice<SimulatedDevice, InsecureTestRng> {
    let rng = InsecureTestRng::counting();
    let mut device = TapoDevice::with_transport(sim, rng, SessionConfig::default());
    device.begin(ADDRESS, &credentials()).await.unwrap();
    device
}

#[tokio::test]
async fn device_facade_applies_and_reads_state() {
    let sim = device();
    let mut bulb = tapo_device(sim).await;

    bulb.on().await.unwrap();
    bulb.set_brightness(75).await.unwrap();
    bulb.set_color(240, 90).await.unwrap();

    let info = bulb.device_info().await.unwrap();
    assert_eq!(info["device_on"], true);
    assert_eq!(info["brightness"], 75);
    assert_eq!(info["hue"], 240);
    assert_eq!(info["saturation"], 90);
    assert_eq!(info["color_temp"], 0);

    bulb.set_color_temperature(2700).await.unwrap();
    bulb.off().await.unwrap();
    let info = bulb.device_info().await.unwrap();
    assert_eq!(info["device_on"], false);
    assert_eq!(info["color_temp"], 2700);
    assert_eq!(info["saturation"], 0);
}

#[tokio::test]
async fn device_facade_rejects_invalid_params_locally() {
    let sim = device();
    let state = sim.state();
    let mut bulb = tapo_device(sim).await;

    let err = bulb.set_brightness(0).await.unwrap_err();
    assert!(matches!(
        err,
        DeviceError::InvalidCommand(CommandError::Brightness(0))
    ));
    let err = bulb.set_hue_saturation(400, 10).await.unwrap_err();
    assert!(matches!(
        err,
        DeviceError::InvalidCommand(CommandError::Hue(400))
    ));
    assert_eq!(state.lock().request_calls, 0);
}

#[tokio::test]
async fn device_facade_reports_unconfirmed_commands() {
    let sim = device();
    sim.state().lock().reflect_state = false;
    let mut bulb = tapo_device(sim).await;

    let err = bulb.on().await.unwrap_err();
    assert!(matches!(err, DeviceError::Unconfirmed(DeviceCommand::On)));
    assert!(err.to_string().contains("not confirmed"));
}

#[tokio::test]
async fn device_facade_surfaces_handshake_failure() {
    let sim = device();
    sim.state().lock().proof_hash = [0u8; 32];
    let rng = InsecureTestRng::counting();
    let mut bulb = TapoDevice::with_transport(sim, rng, SessionConfig::default());

    let err = bulb.begin(ADDRESS, &credentials()).await.unwrap_err();
    assert!(matches!(err, DeviceError::Handshake(_)));
    assert!(!bulb.session().is_established());
    assert!(matches!(
        bulb.device_info().await,
        Err(DeviceError::Session(_))
    ));
}
