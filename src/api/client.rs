use crate::core::config::TransferManagerConfig;
use crate::core::error::ClientError;
use crate::models::transfer::{RawTransfer, ShareLimit, Transfer};
use reqwest::header::REFERER;
use std::time::Duration;
use tracing::{debug, warn};

const LOGIN_OK: &str = "Ok.";

/// Remote operations the engine needs from the transfer manager
#[allow(async_fn_in_trait)]
pub trait TransferApi {
    /// Full list of current transfers; malformed records are dropped
    async fn fetch_transfers(&self) -> Result<Vec<Transfer>, ClientError>;

    async fn set_share_limits(&self, ids: &[String], limit: ShareLimit) -> Result<(), ClientError>;

    async fn delete_transfers(&self, ids: &[String], delete_files: bool) -> Result<(), ClientError>;

    /// Move the given transfers to the front of the download queue
    async fn move_to_top(&self, ids: &[String]) -> Result<(), ClientError>;
}

/// Authenticated qBittorrent Web API session, valid for one pass.
/// The `SID` cookie lives in the client's cookie store. There is no logout;
/// the cookie simply expires server-side.
pub struct Session {
    client: reqwest::Client,
    base_url: String,
}

impl Session {
    /// Log in; later calls on this session carry the session cookie
    pub async fn login(config: &TransferManagerConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()?;

        let base_url = config.url.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{}/api/v2/auth/login", base_url))
            .header(REFERER, &base_url)
            .form(&[
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Authentication(format!(
                "login returned status {}",
                status
            )));
        }

        if text != LOGIN_OK {
            return Err(ClientError::Authentication(text));
        }

        debug!(url = %base_url, "Logged in to transfer manager");

        Ok(Self { client, base_url })
    }

    fn request(&self, method: reqwest::Method, endpoint: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/api/v2/{}", self.base_url, endpoint))
            .header(REFERER, &self.base_url)
    }

    async fn post_form(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<(), ClientError> {
        let response = self
            .request(reqwest::Method::POST, endpoint)
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: response.status(),
            });
        }

        Ok(())
    }
}

impl TransferApi for Session {
    async fn fetch_transfers(&self) -> Result<Vec<Transfer>, ClientError> {
        let endpoint = "torrents/info";
        let response = self.request(reqwest::Method::GET, endpoint).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: response.status(),
            });
        }

        let records: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        Ok(parse_snapshot(records))
    }

    async fn set_share_limits(&self, ids: &[String], limit: ShareLimit) -> Result<(), ClientError> {
        if ids.is_empty() {
            return Ok(());
        }

        let hashes = ids.join("|");
        let ratio = limit.to_api().to_string();
        let unchanged = ShareLimit::GLOBAL_SENTINEL.to_string();

        self.post_form(
            "torrents/setShareLimits",
            &[
                ("hashes", hashes.as_str()),
                ("ratioLimit", ratio.as_str()),
                ("seedingTimeLimit", unchanged.as_str()),
                ("inactiveSeedingTimeLimit", unchanged.as_str()),
            ],
        )
        .await
    }

    async fn delete_transfers(&self, ids: &[String], delete_files: bool) -> Result<(), ClientError> {
        if ids.is_empty() {
            return Ok(());
        }

        let hashes = ids.join("|");
        let delete_files = if delete_files { "true" } else { "false" };

        self.post_form(
            "torrents/delete",
            &[("hashes", hashes.as_str()), ("deleteFiles", delete_files)],
        )
        .await
    }

    async fn move_to_top(&self, ids: &[String]) -> Result<(), ClientError> {
        if ids.is_empty() {
            return Ok(());
        }

        let hashes = ids.join("|");
        self.post_form("torrents/topPrio", &[("hashes", hashes.as_str())])
            .await
    }
}

/// Validate raw records at the boundary. Records that fail are logged and
/// dropped so they are never acted upon.
fn parse_snapshot(records: Vec<serde_json::Value>) -> Vec<Transfer> {
    let mut transfers = Vec::with_capacity(records.len());

    for record in records {
        let raw: RawTransfer = match serde_json::from_value(record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Malformed transfer record, skipping");
                continue;
            }
        };

        let hash = raw.hash.clone();
        match Transfer::try_from(raw) {
            Ok(transfer) => transfers.push(transfer),
            Err(e) => {
                warn!(hash = %hash, error = %e, "Invalid transfer record, skipping");
            }
        }
    }

    transfers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HASH_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[derive(Clone, Default)]
    struct MockState {
        calls: Arc<Mutex<Vec<(String, String)>>>,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "SID=test-sid")
    }

    async fn login(body: String) -> impl IntoResponse {
        match body.as_str() {
            "username=admin&password=secret" => (
                [("set-cookie", "SID=test-sid; HttpOnly; path=/")],
                "Ok.",
            )
                .into_response(),
            // Correct marker padded with whitespace
            "username=admin&password=padded" => (
                [("set-cookie", "SID=test-sid; HttpOnly; path=/")],
                "Ok.\n",
            )
                .into_response(),
            _ => "Fails.".into_response(),
        }
    }

    async fn info(headers: HeaderMap) -> impl IntoResponse {
        if !authorized(&headers) {
            return StatusCode::FORBIDDEN.into_response();
        }
        Json(serde_json::json!([
            {
                "hash": HASH_A,
                "name": "Good.Transfer",
                "uploaded": 10,
                "downloaded": 5,
                "progress": 0.5,
                "availability": 0.8,
                "state": "downloading",
                "ratio_limit": -2
            },
            { "hash": "not-a-hash", "name": "Broken" },
            { "name": "Missing hash" },
            {
                "hash": HASH_B,
                "name": "Seeding.Transfer",
                "progress": 1,
                "state": "uploading",
                "ratio_limit": 0
            }
        ]))
        .into_response()
    }

    fn record(path: &'static str) -> axum::routing::MethodRouter<MockState> {
        post(move |State(s): State<MockState>, headers: HeaderMap, body: String| async move {
            if !authorized(&headers) {
                return StatusCode::FORBIDDEN;
            }
            s.calls.lock().unwrap().push((path.to_string(), body));
            StatusCode::OK
        })
    }

    async fn spawn_mock() -> (String, MockState) {
        let state = MockState::default();
        let app = Router::new()
            .route("/api/v2/auth/login", post(login))
            .route("/api/v2/torrents/info", get(info))
            .route("/api/v2/torrents/setShareLimits", record("setShareLimits"))
            .route("/api/v2/torrents/delete", record("delete"))
            .route("/api/v2/torrents/topPrio", record("topPrio"))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/", addr), state)
    }

    fn config(url: &str, password: &str) -> TransferManagerConfig {
        TransferManagerConfig {
            url: url.to_string(),
            username: "admin".to_string(),
            password: password.to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_parse_snapshot_drops_invalid_records() {
        let transfers = parse_snapshot(vec![
            serde_json::json!({ "hash": HASH_A }),
            serde_json::json!({ "hash": 42 }),
            serde_json::json!({ "hash": HASH_B, "ratio_limit": -7 }),
        ]);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].id, HASH_A);
    }

    #[tokio::test]
    async fn test_login_and_fetch() {
        let (url, _) = spawn_mock().await;
        let session = Session::login(&config(&url, "secret")).await.unwrap();

        let transfers = session.fetch_transfers().await.unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].name, "Good.Transfer");
        assert_eq!(transfers[0].computed_ratio(), 2.0);
        assert!(transfers[1].share_limit.is_seeding_disabled());
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let (url, _) = spawn_mock().await;
        let result = Session::login(&config(&url, "wrong")).await;

        match result {
            Err(ClientError::Authentication(body)) => assert_eq!(body, "Fails."),
            other => panic!("expected authentication error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_login_requires_exact_marker() {
        let (url, _) = spawn_mock().await;
        let result = Session::login(&config(&url, "padded")).await;

        match result {
            Err(ClientError::Authentication(body)) => assert_eq!(body, "Ok.\n"),
            other => panic!("expected authentication error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_session_cookie_is_sent_on_commands() {
        let (url, state) = spawn_mock().await;
        let session = Session::login(&config(&url, "secret")).await.unwrap();

        // The mock answers 403 to any command without `SID=test-sid`
        session.move_to_top(&[HASH_A.to_string()]).await.unwrap();
        assert_eq!(state.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_login_transport_error() {
        // Nothing listens on port 9 locally
        let result = Session::login(&config("http://127.0.0.1:9", "secret")).await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    #[tokio::test]
    async fn test_batched_commands() {
        let (url, state) = spawn_mock().await;
        let session = Session::login(&config(&url, "secret")).await.unwrap();
        let ids = vec![HASH_A.to_string(), HASH_B.to_string()];

        session
            .set_share_limits(&ids, ShareLimit::Ratio(0.0))
            .await
            .unwrap();
        session.delete_transfers(&ids[..1], true).await.unwrap();
        session.delete_transfers(&ids[1..], false).await.unwrap();
        session.move_to_top(&ids[..1]).await.unwrap();

        let calls = state.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].0, "setShareLimits");
        assert_eq!(
            calls[0].1,
            format!(
                "hashes={}%7C{}&ratioLimit=0&seedingTimeLimit=-2&inactiveSeedingTimeLimit=-2",
                HASH_A, HASH_B
            )
        );
        assert_eq!(calls[1], ("delete".to_string(), format!("hashes={}&deleteFiles=true", HASH_A)));
        assert_eq!(calls[2], ("delete".to_string(), format!("hashes={}&deleteFiles=false", HASH_B)));
        assert_eq!(calls[3], ("topPrio".to_string(), format!("hashes={}", HASH_A)));
    }

    #[tokio::test]
    async fn test_empty_batches_send_nothing() {
        let (url, state) = spawn_mock().await;
        let session = Session::login(&config(&url, "secret")).await.unwrap();

        session.set_share_limits(&[], ShareLimit::Ratio(0.0)).await.unwrap();
        session.delete_transfers(&[], true).await.unwrap();
        session.move_to_top(&[]).await.unwrap();

        assert!(state.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_command_is_status_error() {
        let (url, _) = spawn_mock().await;
        // No login, so no session cookie
        let session = Session {
            client: reqwest::Client::builder().cookie_store(true).build().unwrap(),
            base_url: url.trim_end_matches('/').to_string(),
        };

        let result = session.fetch_transfers().await;
        assert!(matches!(result, Err(ClientError::Status { status, .. }) if status == reqwest::StatusCode::FORBIDDEN));
    }
}
