//! Integration tests for the HTTP backend and the onboarding REST/SSE routes.
//!
//! Each test spins up an Axum server on a random port that plays the
//! installer backend, then drives the real reqwest client and onboarding
//! routes against it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::U256;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use raiden_onboarding::backend::{
    ConfigurationDetail, FaucetService, HttpBackend, OnboardingBackend, SwapQuote, SwapRequest,
    TaskStatusReport,
};
use raiden_onboarding::config::CoordinatorConfig;
use raiden_onboarding::error::BackendError;
use raiden_onboarding::onboarding::model::EndpointConstants;
use raiden_onboarding::onboarding::{
    CoordinatorDeps, Network, OnboardingCoordinator, OnboardingRouteState, SessionConstants,
    TaskStatus, fatal_routes, onboarding_routes,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const ADDRESS: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
const CONFIG_FILE: &str = "config-5aaeb605.toml";
const REQUIRED_WEI: u128 = 125_000_000_000_000_000;

/// Mutable state of the fake installer backend.
#[derive(Default)]
struct Installer {
    balance: U256,
    funding_error: Option<String>,
    faucet_requests: Vec<Value>,
    swaps: Vec<SwapRequest>,
    swap_status: Option<TaskStatusReport>,
}

type Shared = Arc<Mutex<Installer>>;

#[derive(serde::Deserialize)]
struct QuoteParams {
    token: String,
    amount: rust_decimal::Decimal,
}

fn installer_routes(state: Shared) -> Router {
    Router::new()
        .route(
            "/gas_price/{file}",
            get(|| async { Json(serde_json::json!({"gas_price": "20000000000"})) }),
        )
        .route(
            "/keystore/{file}",
            get(|| async {
                r#"{"address": "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", "version": 3}"#
            }),
        )
        .route(
            "/api/configuration/{file}",
            get(|State(state): State<Shared>| async move {
                let installer = state.lock().unwrap();
                Json(ConfigurationDetail {
                    eth_balance_wei: installer.balance,
                    funding_error: installer.funding_error.clone(),
                    network: Some("goerli".to_string()),
                })
            }),
        )
        .route(
            "/swap/{file}",
            get(|Query(params): Query<QuoteParams>| async move {
                Json(SwapQuote {
                    exchange: "kyber".to_string(),
                    token: params.token.clone(),
                    token_amount: params.amount,
                    exchange_rate: dec!(0.001),
                    gas_estimate: 200_000,
                    gas_price_wei: U256::from(10_000_000_000u64),
                    max_gas_price_wei: Some(U256::from(8_000_000_000u64)),
                    block_gas_limit: 10_000_000,
                    listed: params.token != "XYZ",
                })
            })
            .post(
                |State(state): State<Shared>, Json(request): Json<SwapRequest>| async move {
                    state.lock().unwrap().swaps.push(request);
                    Json(serde_json::json!({"tx_hash": "0xswap"}))
                },
            ),
        )
        .route(
            "/swap/{file}/{reference}",
            get(
                |State(state): State<Shared>,
                 Path((_file, reference)): Path<(String, String)>| async move {
                    if reference != "0xswap" {
                        return Err(StatusCode::NOT_FOUND);
                    }
                    let status = state
                        .lock()
                        .unwrap()
                        .swap_status
                        .clone()
                        .unwrap_or_else(TaskStatusReport::pending);
                    Ok(Json(status))
                },
            ),
        )
        .route(
            "/faucet",
            post(|State(state): State<Shared>, Json(body): Json<Value>| async move {
                state.lock().unwrap().faucet_requests.push(body);
                Json(serde_json::json!({"id": "faucet-42"}))
            }),
        )
        .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .with_state(state)
}

/// Serve `app` on a random port, return its base URL.
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

/// Start the fake installer, return (base url, shared state).
async fn start_installer() -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(Installer::default()));
    let base = serve(installer_routes(Arc::clone(&state))).await;
    (base, state)
}

fn constants(base: &str, network: &str, chain_id: u64, faucet: bool) -> SessionConstants {
    SessionConstants {
        address: Some(ADDRESS.to_string()),
        required_amount: Some("0.125 ETH".to_string()),
        required_amount_raw: Some(REQUIRED_WEI.to_string()),
        faucet_available: Some(faucet.to_string()),
        chain_id: Some(chain_id.to_string()),
        network: Some(network.to_string()),
        configuration_file: Some(CONFIG_FILE.to_string()),
        urls: EndpointConstants {
            gas_price: format!("{base}/gas_price/{CONFIG_FILE}"),
            keystore: format!("{base}/keystore/{CONFIG_FILE}"),
            configuration_detail: format!("{base}/api/configuration/{CONFIG_FILE}"),
            swap: format!("{base}/swap/{CONFIG_FILE}"),
            faucet: format!("{base}/faucet"),
        },
        acknowledgements: Vec::new(),
    }
}

fn backend_for(constants: SessionConstants) -> HttpBackend {
    let session = constants.into_session().unwrap();
    HttpBackend::new(session.urls, Duration::from_secs(2)).unwrap()
}

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        poll_interval: Duration::from_millis(10),
        max_transient_failures: 3,
        backoff_base: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        enable_swap: true,
        event_capacity: 64,
    }
}

/// Start the onboarding API for a testnet session backed by the fake installer.
async fn start_onboarding(installer: &str, keystore_dir: &std::path::Path) -> String {
    let consts = constants(installer, "goerli", 5, true);
    let backend = Arc::new(backend_for(consts.clone()));
    let deps = CoordinatorDeps {
        backend: backend.clone(),
        faucet: Some(backend),
        wallet: None,
    };
    let coordinator = OnboardingCoordinator::initialize(consts, deps, fast_config()).unwrap();
    let app = onboarding_routes(OnboardingRouteState {
        coordinator,
        keystore_dir: keystore_dir.to_path_buf(),
    });
    serve(app).await
}

/// Poll `/status` until `step` is reached.
async fn wait_for_step(client: &reqwest::Client, base: &str, step: &str) -> Value {
    loop {
        let status: Value = client
            .get(format!("{base}/api/onboarding/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if status["step"] == step {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── HttpBackend ─────────────────────────────────────────────────────────

#[tokio::test]
async fn http_backend_reads_installer_endpoints() {
    timeout(TEST_TIMEOUT, async {
        let (base, state) = start_installer().await;
        let backend = backend_for(constants(&base, "mainnet", 1, false));

        assert_eq!(backend.gas_price().await.unwrap(), U256::from(20_000_000_000u64));

        let keystore = backend.keystore().await.unwrap();
        assert!(String::from_utf8(keystore).unwrap().contains("\"version\": 3"));

        state.lock().unwrap().balance = U256::from(7u64);
        let detail = backend.configuration_detail().await.unwrap();
        assert_eq!(detail.eth_balance_wei, U256::from(7u64));
        assert_eq!(detail.funding_status(U256::from(REQUIRED_WEI)).status, TaskStatus::Pending);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_backend_swap_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let (base, state) = start_installer().await;
        let backend = backend_for(constants(&base, "mainnet", 1, false));

        let quote = backend.swap_quote("RDN", dec!(10)).await.unwrap();
        assert_eq!(quote.token, "RDN");
        assert_eq!(quote.token_amount, dec!(10));
        assert_eq!(quote.max_gas_price_wei, Some(U256::from(8_000_000_000u64)));
        assert!(quote.listed);
        assert!(!backend.swap_quote("XYZ", dec!(1)).await.unwrap().listed);

        let request = SwapRequest {
            account: ADDRESS.parse().unwrap(),
            token: "RDN".to_string(),
            amount: dec!(10),
        };
        let reference = backend.submit_swap(&request).await.unwrap();
        assert_eq!(reference, "0xswap");
        assert_eq!(state.lock().unwrap().swaps.len(), 1);

        assert_eq!(backend.swap_status(&reference).await.unwrap(), TaskStatusReport::pending());
        state.lock().unwrap().swap_status = Some(TaskStatusReport::failed("slippage"));
        let report = backend.swap_status(&reference).await.unwrap();
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.reason.as_deref(), Some("slippage"));

        assert!(matches!(
            backend.swap_status("unknown").await,
            Err(BackendError::Status { status: 404, .. })
        ));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_backend_requests_faucet_funds() {
    timeout(TEST_TIMEOUT, async {
        let (base, state) = start_installer().await;
        let backend = backend_for(constants(&base, "goerli", 5, true));

        let reference = backend
            .request_funds(ADDRESS.parse().unwrap(), Network::Goerli)
            .await
            .unwrap();
        assert_eq!(reference, "faucet-42");

        let requests = state.lock().unwrap().faucet_requests.clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["address"], ADDRESS);
        assert_eq!(requests[0]["network"], "goerli");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_backend_maps_failures() {
    timeout(TEST_TIMEOUT, async {
        let (base, _state) = start_installer().await;
        let mut consts = constants(&base, "goerli", 5, true);
        consts.urls.gas_price = format!("{base}/broken");
        // Nothing listens on port 9 locally.
        consts.urls.configuration_detail = "http://127.0.0.1:9/api/configuration".to_string();
        let backend = backend_for(consts);

        assert!(matches!(
            backend.gas_price().await,
            Err(BackendError::Status { status: 500, .. })
        ));
        assert!(matches!(
            backend.configuration_detail().await,
            Err(BackendError::RequestFailed { .. })
        ));
        // Swap URLs are dropped outside mainnet.
        assert!(matches!(
            backend.swap_quote("RDN", dec!(1)).await,
            Err(BackendError::NotConfigured(_))
        ));
    })
    .await
    .expect("test timed out");
}

// ── Onboarding routes ───────────────────────────────────────────────────

#[tokio::test]
async fn testnet_onboarding_completes_over_rest() {
    timeout(TEST_TIMEOUT, async {
        let (installer, state) = start_installer().await;
        let dir = tempfile::tempdir().unwrap();
        let base = start_onboarding(&installer, dir.path()).await;
        let client = reqwest::Client::new();

        let status = wait_for_step(&client, &base, "keystore_download").await;
        assert_eq!(status["address"], ADDRESS);
        assert_eq!(status["required_amount"], "0.125 ETH");
        assert_eq!(status["swap_available"], false);

        let resp = client
            .post(format!("{base}/api/onboarding/keystore"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["step"], "funding_request");
        assert!(dir.path().join(format!("{ADDRESS}.json")).exists());

        let resp = client
            .post(format!("{base}/api/onboarding/funding"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);
        let task: Value = resp.json().await.unwrap();
        assert_eq!(task["kind"], "funding");
        assert_eq!(task["status"], "pending");
        assert_eq!(task["reference"], "faucet-42");

        let ui: Value = client
            .get(format!("{base}/api/onboarding/ui"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ui["pending"], "funding");
        assert_eq!(ui["funding_button"]["enabled"], false);

        state.lock().unwrap().balance = U256::from(REQUIRED_WEI);
        let status = wait_for_step(&client, &base, "complete").await;
        assert_eq!(status["tasks"][0]["status"], "succeeded");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_errors_carry_kind_and_status() {
    timeout(TEST_TIMEOUT, async {
        let (installer, _state) = start_installer().await;
        let dir = tempfile::tempdir().unwrap();
        let base = start_onboarding(&installer, dir.path()).await;
        let client = reqwest::Client::new();

        // Funding before the keystore step.
        let resp = client
            .post(format!("{base}/api/onboarding/funding"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 409);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["kind"], "invalid_step");

        client
            .post(format!("{base}/api/onboarding/keystore"))
            .send()
            .await
            .unwrap();
        let first = client
            .post(format!("{base}/api/onboarding/funding"))
            .send()
            .await
            .unwrap();
        assert_eq!(first.status(), 202);
        let second = client
            .post(format!("{base}/api/onboarding/funding"))
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), 409);
        let body: Value = second.json().await.unwrap();
        assert_eq!(body["kind"], "task_in_progress");

        let resp = client
            .post(format!("{base}/api/onboarding/swap"))
            .json(&serde_json::json!({"token": "RDN", "amount": "10"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 409);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["kind"], "swap_unavailable");

        let resp = client
            .post(format!("{base}/api/onboarding/ack/nonsense"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = client
            .post(format!("{base}/api/onboarding/reset"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
        wait_for_step(&client, &base, "keystore_download").await;
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn events_stream_step_changes() {
    timeout(TEST_TIMEOUT, async {
        let (installer, _state) = start_installer().await;
        let dir = tempfile::tempdir().unwrap();
        let base = start_onboarding(&installer, dir.path()).await;
        let client = reqwest::Client::new();

        let mut events = client
            .get(format!("{base}/api/onboarding/events"))
            .send()
            .await
            .unwrap();
        assert_eq!(events.status(), 200);

        client
            .post(format!("{base}/api/onboarding/keystore"))
            .send()
            .await
            .unwrap();

        let mut received = String::new();
        while !received.contains("step_changed") {
            let chunk = events.chunk().await.unwrap().expect("event stream ended");
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
        assert!(received.contains("\"to\":\"funding_request\""));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn fatal_routes_disable_everything() {
    timeout(TEST_TIMEOUT, async {
        let base = serve(fatal_routes("address: invalid checksum".to_string())).await;
        let client = reqwest::Client::new();

        let ui: Value = client
            .get(format!("{base}/api/onboarding/ui"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ui["fatal"], true);
        assert_eq!(ui["no_web3"], true);
        assert_eq!(ui["error"]["message"], "address: invalid checksum");

        let resp = client
            .post(format!("{base}/api/onboarding/funding"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 503);
    })
    .await
    .expect("test timed out");
}
