//! HTTP adapter for the Snowflake SQL REST API.
//!
//! A [`WarehouseClient`] owns one authenticated connection profile. Password
//! profiles exchange credentials for a session token at the login gateway and
//! renew it transparently when it expires; token profiles pass their bearer
//! token straight through. Statement execution handles asynchronous polling
//! and multi-partition result assembly.

use std::{error::Error, fmt, time::Duration};

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod wire;

use wire::{
    LoginRequest,
    LoginRequestData,
    LoginResponse,
    StatementParameters,
    StatementRequest,
    StatementResponse,
};

const STATEMENTS_PATH: &str = "/api/v2/statements";
const LOGIN_PATH: &str = "/session/v1/login-request";
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";
const SESSION_EXPIRED_CODE: &str = "390112";
const PING_STATEMENT: &str = "SELECT 1";

#[derive(Debug)]
pub enum ClientError {
    Http(reqwest::Error),
    Api { code: String, message: String },
    Auth(String),
    Timeout { handle: String },
    Decode(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(err) => write!(f, "HTTP transport error: {err}"),
            Self::Api { code, message } => write!(f, "Snowflake error {code}: {message}"),
            Self::Auth(message) => write!(f, "Authentication failed: {message}"),
            Self::Timeout { handle } => {
                write!(f, "Statement {handle} did not finish within the polling budget")
            }
            Self::Decode(message) => write!(f, "Unexpected response shape: {message}"),
        }
    }
}

impl Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Bearer token flavors accepted by the statements API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    OAuth,
    KeyPairJwt,
}

impl TokenType {
    /// Value for the token type request header.
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::OAuth => "OAUTH",
            Self::KeyPairJwt => "KEYPAIR_JWT",
        }
    }

    /// Parses a configuration label such as `oauth` or `keypair_jwt`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "oauth" => Some(Self::OAuth),
            "keypair_jwt" | "jwt" => Some(Self::KeyPairJwt),
            _ => None,
        }
    }
}

/// How a profile proves its identity.
#[derive(Clone)]
pub enum Credentials {
    Password(String),
    Token { token: String, token_type: TokenType },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Credentials::Password(<redacted>)"),
            Self::Token { token_type, .. } => write!(f, "Credentials::Token({token_type:?})"),
        }
    }
}

/// Everything needed to reach one warehouse as one user.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    pub account: String,
    pub user: String,
    pub credentials: Credentials,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
}

/// Tunables for the HTTP client and statement polling.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Connection and login gateway timeout.
    pub login_timeout: Duration,
    /// Per-request timeout for statement calls.
    pub request_timeout: Duration,
    /// Server-side statement timeout, when set.
    pub statement_timeout: Option<Duration>,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            login_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(60),
            statement_timeout: None,
            poll_interval: Duration::from_millis(1000),
            max_polls: 120,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub const fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }
}

struct Pending {
    running: bool,
    response: StatementResponse,
}

pub struct WarehouseClient {
    http: reqwest::Client,
    base_url: String,
    profile: ConnectionProfile,
    options: ClientOptions,
    session: RwLock<Option<String>>,
}

impl WarehouseClient {
    /// Builds a client for `profile` without touching the network.
    ///
    /// Password profiles authenticate lazily on the first statement.
    ///
    /// # Errors
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(profile: ConnectionProfile, options: ClientOptions) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(options.login_timeout)
            .timeout(options.request_timeout)
            .build()?;
        let base_url = format!("https://{}.snowflakecomputing.com", profile.account);
        Ok(Self {
            http,
            base_url,
            profile,
            options,
            session: RwLock::new(None),
        })
    }

    /// Builds a client and verifies it can execute a statement.
    ///
    /// # Errors
    /// Returns an error when the client cannot be built or the probe
    /// statement fails.
    pub async fn connect(profile: ConnectionProfile, options: ClientOptions) -> ClientResult<Self> {
        let client = Self::new(profile, options)?;
        client.ping().await?;
        Ok(client)
    }

    #[must_use]
    pub const fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    #[must_use]
    pub const fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Verifies the session with a trivial statement.
    ///
    /// # Errors
    /// Returns an error when the probe statement fails.
    pub async fn ping(&self) -> ClientResult<()> {
        self.execute(PING_STATEMENT).await.map(|_| ())
    }

    /// Runs one SQL statement to completion and returns its response.
    ///
    /// Statements still running after submission are polled until they
    /// finish or the poll budget runs out; partitioned results are fetched
    /// and reassembled in order. An expired password session is renewed once
    /// and the statement retried.
    ///
    /// # Errors
    /// Returns an error for transport failures, API errors, or statements
    /// that outlive the polling budget.
    pub async fn execute(&self, statement: &str) -> ClientResult<StatementResponse> {
        match self.submit(statement).await {
            Err(err) if self.should_relogin(&err) => {
                warn!("Session expired, re-authenticating: {err}");
                self.session.write().await.take();
                self.login().await?;
                self.submit(statement).await
            }
            other => other,
        }
    }

    /// Runs `statement` and returns its rows decoded into JSON objects.
    ///
    /// # Errors
    /// Same failure modes as [`WarehouseClient::execute`].
    pub async fn query_rows(
        &self,
        statement: &str,
    ) -> ClientResult<Vec<serde_json::Map<String, serde_json::Value>>> {
        let response = self.execute(statement).await?;
        let columns = response
            .result_set_meta_data
            .as_ref()
            .map(|meta| meta.row_type.as_slice())
            .unwrap_or_default();
        Ok(wire::decode_rows(columns, response.data.as_deref().unwrap_or_default()))
    }

    async fn submit(&self, statement: &str) -> ClientResult<StatementResponse> {
        let (authorization, token_type) = self.authorization().await?;
        let request_id = Uuid::new_v4();
        let url = format!("{}{STATEMENTS_PATH}?requestId={request_id}", self.base_url);
        let body = StatementRequest {
            statement: statement.to_string(),
            timeout: self.options.statement_timeout.map(|timeout| timeout.as_secs()),
            database: self.profile.database.clone(),
            schema: self.profile.schema.clone(),
            warehouse: self.profile.warehouse.clone(),
            role: self.profile.role.clone(),
            parameters: Some(StatementParameters::utc()),
        };
        let mut request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, &authorization);
        if let Some(token_type) = token_type {
            request = request.header(TOKEN_TYPE_HEADER, token_type);
        }
        let response = request.json(&body).send().await?;

        let mut pending = Self::read_statement(response).await?;
        let mut polls = 0_u32;
        while pending.running {
            if polls >= self.options.max_polls {
                return Err(ClientError::Timeout {
                    handle: pending.response.statement_handle.unwrap_or_default(),
                });
            }
            polls += 1;
            let handle = pending.response.statement_handle.clone().ok_or_else(|| {
                ClientError::Decode("in-progress response missing statementHandle".to_string())
            })?;
            tokio::time::sleep(self.options.poll_interval).await;
            pending = self.poll(&handle, &authorization, token_type).await?;
        }
        self.fetch_partitions(pending.response, &authorization, token_type).await
    }

    async fn poll(
        &self,
        handle: &str,
        authorization: &str,
        token_type: Option<&'static str>,
    ) -> ClientResult<Pending> {
        let url = poll_url(&self.base_url, handle, Uuid::new_v4());
        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, authorization);
        if let Some(token_type) = token_type {
            request = request.header(TOKEN_TYPE_HEADER, token_type);
        }
        let response = request.send().await?;
        Self::read_statement(response).await
    }

    async fn fetch_partitions(
        &self,
        mut response: StatementResponse,
        authorization: &str,
        token_type: Option<&'static str>,
    ) -> ClientResult<StatementResponse> {
        let partition_count = response
            .result_set_meta_data
            .as_ref()
            .map_or(0, |meta| meta.partition_info.len());
        if partition_count <= 1 {
            return Ok(response);
        }
        let Some(handle) = response.statement_handle.clone() else {
            return Err(ClientError::Decode(
                "partitioned response missing statementHandle".to_string(),
            ));
        };
        debug!("Fetching {} result partitions for {handle}", partition_count - 1);
        let fetches = (1..partition_count).map(|partition| {
            let url =
                format!("{}{STATEMENTS_PATH}/{handle}?partition={partition}", self.base_url);
            let mut request = self
                .http
                .get(url)
                .header(ACCEPT, "application/json")
                .header(AUTHORIZATION, authorization);
            if let Some(token_type) = token_type {
                request = request.header(TOKEN_TYPE_HEADER, token_type);
            }
            async move {
                let response = request.send().await?;
                let status = response.status();
                if status.is_success() {
                    response.json::<StatementResponse>().await.map_err(ClientError::from)
                } else {
                    Err(Self::api_error(status, response).await)
                }
            }
        });
        let partitions = futures::future::try_join_all(fetches).await?;
        let mut data = response.data.take().unwrap_or_default();
        for mut partition in partitions {
            if let Some(rows) = partition.data.take() {
                data.extend(rows);
            }
        }
        response.data = Some(data);
        Ok(response)
    }

    async fn read_statement(response: reqwest::Response) -> ClientResult<Pending> {
        let status = response.status();
        if status == StatusCode::ACCEPTED {
            let body: StatementResponse = response.json().await?;
            return Ok(Pending { running: true, response: body });
        }
        if status.is_success() {
            let body: StatementResponse = response.json().await?;
            return Ok(Pending { running: false, response: body });
        }
        Err(Self::api_error(status, response).await)
    }

    async fn api_error(status: StatusCode, response: reqwest::Response) -> ClientError {
        match response.json::<StatementResponse>().await {
            Ok(body) => ClientError::Api {
                code: body.code.unwrap_or_else(|| status.as_str().to_string()),
                message: body.message.unwrap_or_else(|| status.to_string()),
            },
            Err(err) => ClientError::Api {
                code: status.as_str().to_string(),
                message: format!("unreadable error body: {err}"),
            },
        }
    }

    fn should_relogin(&self, err: &ClientError) -> bool {
        if !matches!(self.profile.credentials, Credentials::Password(_)) {
            return false;
        }
        match err {
            ClientError::Api { code, .. } => code == SESSION_EXPIRED_CODE || code == "401",
            ClientError::Http(err) => err.status() == Some(StatusCode::UNAUTHORIZED),
            _ => false,
        }
    }

    async fn authorization(&self) -> ClientResult<(String, Option<&'static str>)> {
        match &self.profile.credentials {
            Credentials::Token { token, token_type } => {
                Ok((format!("Bearer {token}"), Some(token_type.header_value())))
            }
            Credentials::Password(_) => {
                if let Some(token) = self.session.read().await.as_deref() {
                    return Ok((format!("Snowflake Token=\"{token}\""), None));
                }
                let token = self.login().await?;
                Ok((format!("Snowflake Token=\"{token}\""), None))
            }
        }
    }

    async fn login(&self) -> ClientResult<String> {
        let Credentials::Password(password) = &self.profile.credentials else {
            return Err(ClientError::Auth("profile has no password to log in with".to_string()));
        };
        let request_id = Uuid::new_v4();
        let url = format!("{}{LOGIN_PATH}?requestId={request_id}", self.base_url);
        let body = LoginRequest {
            data: LoginRequestData {
                login_name: self.profile.user.clone(),
                password: password.clone(),
                account_name: self.profile.account.clone(),
                client_app_id: env!("CARGO_PKG_NAME").to_string(),
                client_app_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let response = self
            .http
            .post(&url)
            .timeout(self.options.login_timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let login: LoginResponse = response
            .json()
            .await
            .map_err(|err| ClientError::Decode(format!("login response ({status}): {err}")))?;
        if !login.success {
            let code = login.code.unwrap_or_default();
            let message = login.message.unwrap_or_else(|| "login rejected".to_string());
            return Err(ClientError::Auth(format!("{code} {message}").trim().to_string()));
        }
        let Some(data) = login.data else {
            return Err(ClientError::Decode("login response missing session data".to_string()));
        };
        debug!("Authenticated {} against {}", self.profile.user, self.profile.account);
        *self.session.write().await = Some(data.token.clone());
        Ok(data.token)
    }
}

/// Status URL for a running statement.
fn poll_url(base_url: &str, handle: &str, request_id: Uuid) -> String {
    format!("{base_url}{STATEMENTS_PATH}/{handle}?requestId={request_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_profile() -> ConnectionProfile {
        ConnectionProfile {
            account: "myorg-acct1".to_string(),
            user: "ANALYST".to_string(),
            credentials: Credentials::Token {
                token: "tok-123".to_string(),
                token_type: TokenType::OAuth,
            },
            database: Some("ANALYTICS".to_string()),
            schema: None,
            warehouse: Some("COMPUTE_WH".to_string()),
            role: None,
        }
    }

    #[test]
    fn builds_without_network() {
        let client = WarehouseClient::new(token_profile(), ClientOptions::default()).unwrap();
        assert_eq!(client.profile().account, "myorg-acct1");
        assert_eq!(client.profile().database.as_deref(), Some("ANALYTICS"));
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let password = ConnectionProfile {
            credentials: Credentials::Password("hunter2".to_string()),
            ..token_profile()
        };
        let rendered = format!("{password:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redacted"));

        let rendered = format!("{:?}", token_profile());
        assert!(!rendered.contains("tok-123"));
    }

    #[test]
    fn token_labels_parse() {
        assert_eq!(TokenType::from_label("oauth"), Some(TokenType::OAuth));
        assert_eq!(TokenType::from_label(" KEYPAIR_JWT "), Some(TokenType::KeyPairJwt));
        assert_eq!(TokenType::from_label("jwt"), Some(TokenType::KeyPairJwt));
        assert_eq!(TokenType::from_label("basic"), None);
    }

    #[test]
    fn poll_urls_carry_a_request_id() {
        let request_id = Uuid::new_v4();
        let url = poll_url("https://acct.snowflakecomputing.com", "handle-1", request_id);
        assert_eq!(
            url,
            format!(
                "https://acct.snowflakecomputing.com/api/v2/statements/handle-1?requestId={request_id}"
            )
        );
    }

    #[test]
    fn session_expiry_triggers_relogin_only_for_passwords() {
        let with_password = WarehouseClient::new(
            ConnectionProfile {
                credentials: Credentials::Password("pw".to_string()),
                ..token_profile()
            },
            ClientOptions::default(),
        )
        .unwrap();
        let expired = ClientError::Api {
            code: "390112".to_string(),
            message: "Session no longer exists".to_string(),
        };
        assert!(with_password.should_relogin(&expired));
        assert!(!with_password.should_relogin(&ClientError::Auth("nope".to_string())));

        let with_token = WarehouseClient::new(token_profile(), ClientOptions::default()).unwrap();
        assert!(!with_token.should_relogin(&expired));
    }
}
