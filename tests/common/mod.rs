//! Shared test infrastructure for integration tests
//!
//! Provides TestServer (spawns the real binary on a private port with a
//! temp data directory), AWS SDK client factories, and a minimal SigV4
//! request signer for driving the JSON admin API with reqwest.

#![allow(dead_code)]

use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Region, RequestChecksumCalculation};
use aws_sdk_s3::Client;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

type HmacSha256 = Hmac<Sha256>;

/// Port counter to avoid conflicts between tests.
static PORT_COUNTER: AtomicU16 = AtomicU16::new(19000);

pub const ADMIN_ACCESS_KEY: &str = "sss-admin-integration";
pub const ADMIN_SECRET_KEY: &str = "integration-admin-secret-0123456789abcdef";
pub const REGION: &str = "us-east-1";

/// Test server wrapper that spawns a real sss binary
pub struct TestServer {
    process: Child,
    port: u16,
    _data_dir: TempDir,
}

impl TestServer {
    /// Start a server on a private port with a temp data directory.
    pub async fn start() -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let data_dir = TempDir::new().expect("Failed to create temp dir");

        let process = Command::new(env!("CARGO_BIN_EXE_sss"))
            .env("SSS_LISTEN_ADDR", format!("127.0.0.1:{}", port))
            .env("SSS_DATA_DIR", data_dir.path())
            .env("SSS_ADMIN_ACCESS_KEY_ID", ADMIN_ACCESS_KEY)
            .env("SSS_ADMIN_SECRET_ACCESS_KEY", ADMIN_SECRET_KEY)
            .env("RUST_LOG", "sss=warn")
            .spawn()
            .expect("Failed to start server");

        let mut server = Self {
            process,
            port,
            _data_dir: data_dir,
        };
        server.wait_ready().await;
        server
    }

    async fn wait_ready(&mut self) {
        let addr = format!("127.0.0.1:{}", self.port);
        for _ in 0..150 {
            if std::net::TcpStream::connect(&addr).is_ok() {
                sleep(Duration::from_millis(100)).await;
                return;
            }

            if let Ok(Some(status)) = self.process.try_wait() {
                panic!("Server exited before becoming ready: {}", status);
            }

            sleep(Duration::from_millis(100)).await;
        }

        let _ = self.process.kill();
        panic!("Timed out waiting for server on {}", addr);
    }

    /// HTTP endpoint URL
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn host(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// S3 client authenticated as the admin identity
    pub async fn s3_client(&self) -> Client {
        self.s3_client_as(ADMIN_ACCESS_KEY, ADMIN_SECRET_KEY).await
    }

    /// S3 client authenticated with arbitrary credentials
    pub async fn s3_client_as(&self, access_key: &str, secret_key: &str) -> Client {
        let credentials = Credentials::new(access_key, secret_key, None, None, "test");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .region(Region::new(REGION))
            .endpoint_url(self.endpoint())
            .credentials_provider(credentials)
            .force_path_style(true)
            // Plain signed bodies: no flexible-checksum trailers on the wire
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .build();

        Client::from_conf(config)
    }

    /// Send a SigV4-signed admin request (JSON body) as the admin identity.
    pub async fn admin_request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> reqwest::Response {
        let client = reqwest::Client::new();
        let url = format!("{}{}", self.endpoint(), path);
        let payload = body
            .as_ref()
            .map(|v| v.to_string().into_bytes())
            .unwrap_or_default();

        let headers = sign_request(
            method.as_str(),
            path,
            "",
            &self.host(),
            ADMIN_ACCESS_KEY,
            ADMIN_SECRET_KEY,
            &payload,
        );

        let mut request = client.request(method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if body.is_some() {
            request = request.header("content-type", "application/json");
        }
        request
            .body(payload)
            .send()
            .await
            .expect("admin request failed")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

// === SigV4 request signing (header form) ===

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, REGION.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    hmac_sha256(&k_service, b"aws4_request")
}

/// Sign a request the way an SDK would: Authorization header, payload hash
/// over the actual body, signed headers host;x-amz-content-sha256;x-amz-date.
/// Returns the headers to attach. `query` must already be in canonical
/// (sorted, encoded) form, or empty.
pub fn sign_request(
    method: &str,
    path: &str,
    query: &str,
    host: &str,
    access_key: &str,
    secret_key: &str,
    payload: &[u8],
) -> Vec<(String, String)> {
    let now = Utc::now();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{date}/{REGION}/s3/aws4_request");

    let payload_hash = hex::encode(Sha256::digest(payload));

    let canonical_headers = format!(
        "host:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n"
    );
    let signed_headers = "host;x-amz-content-sha256;x-amz-date";

    let canonical_request = format!(
        "{method}\n{path}\n{query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let signature = hex::encode(hmac_sha256(
        &signing_key(secret_key, &date),
        string_to_sign.as_bytes(),
    ));

    vec![
        (
            "authorization".to_string(),
            format!(
                "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, \
                 SignedHeaders={signed_headers}, Signature={signature}"
            ),
        ),
        ("x-amz-date".to_string(), amz_date),
        ("x-amz-content-sha256".to_string(), payload_hash),
    ]
}

// === Data generators ===

/// Generate deterministic binary data
pub fn generate_binary(size: usize, seed: u64) -> Vec<u8> {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; size];
    rng.fill(&mut data[..]);
    data
}
