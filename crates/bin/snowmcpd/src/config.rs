use clap::{Parser, builder::BoolishValueParser};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use snowmcp_core::warehouse::{ClientOptions, ConnectionProfile, Credentials, TokenType};

const DEFAULT_PROFILE: &str = "default";
const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4021";
const DEFAULT_ERRLOG_HTTP_ADDR: &str = "127.0.0.1:4022";
const DEFAULT_ERRLOG_FILE: &str = "error_log.json";
const DEFAULT_REGISTRY_TTL_SECS: u64 = 300;
const DEFAULT_REGISTRY_REVALIDATE_SECS: u64 = 60;
const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_POLLS: u32 = 120;

#[derive(Parser, Debug)]
#[command(name = "snowmcpd", version, about = "Snowflake MCP daemon.")]
#[allow(clippy::struct_excessive_bools)]
struct CliArgs {
    #[arg(long, env = "SNOWFLAKE_ACCOUNT")]
    account: Option<String>,

    #[arg(long, env = "SNOWFLAKE_USER")]
    user: Option<String>,

    #[arg(long, env = "SNOWFLAKE_PASSWORD")]
    password: Option<String>,

    #[arg(long, env = "SNOWFLAKE_TOKEN")]
    token: Option<String>,

    #[arg(long, env = "SNOWFLAKE_TOKEN_TYPE")]
    token_type: Option<String>,

    #[arg(long, env = "SNOWFLAKE_DATABASE")]
    database: Option<String>,

    #[arg(long, env = "SNOWFLAKE_SCHEMA")]
    schema: Option<String>,

    #[arg(long, env = "SNOWFLAKE_WAREHOUSE")]
    warehouse: Option<String>,

    #[arg(long, env = "SNOWFLAKE_ROLE")]
    role: Option<String>,

    #[arg(long, env = "SNOWMCP_CONNECTIONS_FILE")]
    connections_file: Option<PathBuf>,

    #[arg(long, env = "SNOWMCP_PROFILE", default_value = DEFAULT_PROFILE)]
    profile: String,

    #[arg(
        long,
        env = "SNOWMCP_REGISTRY_TTL_SECS",
        default_value_t = DEFAULT_REGISTRY_TTL_SECS
    )]
    registry_ttl_secs: u64,

    #[arg(long, env = "SNOWMCP_REGISTRY_SWEEP_SECS")]
    registry_sweep_secs: Option<u64>,

    #[arg(
        long,
        env = "SNOWMCP_REGISTRY_REVALIDATE_SECS",
        default_value_t = DEFAULT_REGISTRY_REVALIDATE_SECS
    )]
    registry_revalidate_secs: u64,

    #[arg(long, env = "SNOWMCP_REGISTRY_MAX")]
    max_entries: Option<usize>,

    #[arg(
        long,
        env = "SNOWMCP_LOGIN_TIMEOUT_SECS",
        default_value_t = DEFAULT_LOGIN_TIMEOUT_SECS
    )]
    login_timeout_secs: u64,

    #[arg(
        long,
        env = "SNOWMCP_REQUEST_TIMEOUT_SECS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS
    )]
    request_timeout_secs: u64,

    #[arg(long, env = "SNOWMCP_STATEMENT_TIMEOUT_SECS")]
    statement_timeout_secs: Option<u64>,

    #[arg(
        long,
        env = "SNOWMCP_POLL_INTERVAL_MS",
        default_value_t = DEFAULT_POLL_INTERVAL_MS
    )]
    poll_interval_ms: u64,

    #[arg(long, env = "SNOWMCP_MAX_POLLS", default_value_t = DEFAULT_MAX_POLLS)]
    max_polls: u32,

    #[arg(
        long = "stdio",
        env = "SNOWMCP_ENABLE_STDIO",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    enable_stdio: bool,

    #[arg(
        long,
        env = "SNOWMCP_MCP_SERVE",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    mcp_serve: bool,

    #[arg(long, env = "SNOWMCP_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    mcp_http_addr: SocketAddr,

    #[arg(
        long,
        env = "SNOWMCP_ERRLOG_STDIO",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    errlog_stdio: bool,

    #[arg(
        long,
        env = "SNOWMCP_ERRLOG_SERVE",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    errlog_serve: bool,

    #[arg(
        long,
        env = "SNOWMCP_ERRLOG_HTTP_ADDR",
        default_value = DEFAULT_ERRLOG_HTTP_ADDR
    )]
    errlog_http_addr: SocketAddr,

    #[arg(long, env = "SNOWMCP_ERRLOG_FILE", default_value = DEFAULT_ERRLOG_FILE)]
    errlog_file: PathBuf,
}

/// Runtime configuration loaded from CLI arguments, environment variables,
/// and an optional connections file.
#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct Config {
    pub profiles: HashMap<String, ConnectionProfile>,
    pub profile: String,
    pub client_options: ClientOptions,
    pub registry_ttl: Option<Duration>,
    pub sweep_interval: Duration,
    pub revalidate_after: Option<Duration>,
    pub max_entries: Option<usize>,
    pub enable_stdio: bool,
    pub mcp_serve: bool,
    pub mcp_http_addr: SocketAddr,
    pub errlog_stdio: bool,
    pub errlog_serve: bool,
    pub errlog_http_addr: SocketAddr,
    pub errlog_file: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidProfile { profile: String, reason: String },
    ConflictingSettings(&'static str),
    NoServiceSelected,
    ConnectionsFile(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidProfile { profile, reason } => {
                write!(f, "invalid connection profile {profile}: {reason}")
            }
            Self::ConflictingSettings(what) => write!(f, "conflicting settings: {what}"),
            Self::NoServiceSelected => write!(
                f,
                "no service selected; enable one of --stdio, --mcp-serve, \
                 --errlog-stdio, --errlog-serve"
            ),
            Self::ConnectionsFile(message) => {
                write!(f, "cannot read connections file: {message}")
            }
        }
    }
}

impl Error for ConfigError {}

/// One profile table in the connections file. All fields are optional so
/// CLI and environment settings can fill the gaps.
#[derive(Debug, Default, Deserialize)]
struct ProfileFile {
    account: Option<String>,
    user: Option<String>,
    password: Option<String>,
    token: Option<String>,
    token_type: Option<String>,
    database: Option<String>,
    schema: Option<String>,
    warehouse: Option<String>,
    role: Option<String>,
}

impl Config {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }
}

impl TryFrom<CliArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.enable_stdio && args.errlog_stdio {
            return Err(ConfigError::ConflictingSettings("--stdio and --errlog-stdio"));
        }
        if !args.enable_stdio && !args.errlog_stdio && !args.mcp_serve && !args.errlog_serve {
            return Err(ConfigError::NoServiceSelected);
        }

        let mut file_profiles = match &args.connections_file {
            Some(path) => read_connections_file(path)?,
            None => HashMap::new(),
        };

        // CLI and environment settings overlay the selected profile.
        let selected = file_profiles.entry(args.profile.clone()).or_default();
        overlay(&mut selected.account, args.account);
        overlay(&mut selected.user, args.user);
        overlay(&mut selected.password, args.password);
        overlay(&mut selected.token, args.token);
        overlay(&mut selected.token_type, args.token_type);
        overlay(&mut selected.database, args.database);
        overlay(&mut selected.schema, args.schema);
        overlay(&mut selected.warehouse, args.warehouse);
        overlay(&mut selected.role, args.role);

        let mut profiles = HashMap::with_capacity(file_profiles.len());
        for (name, profile) in file_profiles {
            let connection = build_profile(&name, profile)?;
            profiles.insert(name, connection);
        }

        let registry_ttl = if args.registry_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(args.registry_ttl_secs))
        };
        let sweep_secs = args.registry_sweep_secs.unwrap_or(args.registry_ttl_secs);
        let sweep_interval = Duration::from_secs(sweep_secs);
        let revalidate_after = if args.registry_revalidate_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(args.registry_revalidate_secs))
        };

        let mut client_options = ClientOptions::default()
            .with_login_timeout(Duration::from_secs(args.login_timeout_secs))
            .with_request_timeout(Duration::from_secs(args.request_timeout_secs))
            .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
            .with_max_polls(args.max_polls);
        if let Some(secs) = args.statement_timeout_secs {
            client_options = client_options.with_statement_timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            profiles,
            profile: args.profile,
            client_options,
            registry_ttl,
            sweep_interval,
            revalidate_after,
            max_entries: args.max_entries,
            enable_stdio: args.enable_stdio,
            mcp_serve: args.mcp_serve,
            mcp_http_addr: args.mcp_http_addr,
            errlog_stdio: args.errlog_stdio,
            errlog_serve: args.errlog_serve,
            errlog_http_addr: args.errlog_http_addr,
            errlog_file: args.errlog_file,
        })
    }
}

fn overlay(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

fn read_connections_file(path: &Path) -> Result<HashMap<String, ProfileFile>, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::ConnectionsFile(format!("{}: {err}", path.display())))?;
    toml::from_str(&raw)
        .map_err(|err| ConfigError::ConnectionsFile(format!("{}: {err}", path.display())))
}

fn build_profile(name: &str, profile: ProfileFile) -> Result<ConnectionProfile, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidProfile {
        profile: name.to_string(),
        reason,
    };
    let non_blank = |value: Option<String>| value.filter(|text| !text.trim().is_empty());

    let account = non_blank(profile.account)
        .ok_or_else(|| invalid("missing account (SNOWFLAKE_ACCOUNT)".to_string()))?;
    let user = non_blank(profile.user)
        .ok_or_else(|| invalid("missing user (SNOWFLAKE_USER)".to_string()))?;
    let password = non_blank(profile.password);
    let token = non_blank(profile.token);
    let token_type = non_blank(profile.token_type);

    let credentials = match (password, token) {
        (Some(_), Some(_)) => {
            return Err(invalid(
                "both password and token set (SNOWFLAKE_PASSWORD conflicts with \
                 SNOWFLAKE_TOKEN)"
                    .to_string(),
            ));
        }
        (Some(password), None) => {
            if token_type.is_some() {
                return Err(invalid(
                    "token_type set without a token (SNOWFLAKE_TOKEN_TYPE requires \
                     SNOWFLAKE_TOKEN)"
                        .to_string(),
                ));
            }
            Credentials::Password(password)
        }
        (None, Some(token)) => {
            let token_type = match token_type {
                Some(label) => TokenType::from_label(&label)
                    .ok_or_else(|| invalid(format!("unknown token_type: {label}")))?,
                None => TokenType::OAuth,
            };
            Credentials::Token { token, token_type }
        }
        (None, None) => {
            return Err(invalid(
                "missing credentials (SNOWFLAKE_PASSWORD or SNOWFLAKE_TOKEN)".to_string(),
            ));
        }
    };

    Ok(ConnectionProfile {
        account,
        user,
        credentials,
        database: non_blank(profile.database),
        schema: non_blank(profile.schema),
        warehouse: non_blank(profile.warehouse),
        role: non_blank(profile.role),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn base_args() -> CliArgs {
        CliArgs {
            account: Some("testorg-test1".to_string()),
            user: Some("SVC_MCP".to_string()),
            password: Some("hunter2".to_string()),
            token: None,
            token_type: None,
            database: None,
            schema: None,
            warehouse: None,
            role: None,
            connections_file: None,
            profile: DEFAULT_PROFILE.to_string(),
            registry_ttl_secs: DEFAULT_REGISTRY_TTL_SECS,
            registry_sweep_secs: None,
            registry_revalidate_secs: DEFAULT_REGISTRY_REVALIDATE_SECS,
            max_entries: None,
            login_timeout_secs: DEFAULT_LOGIN_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            statement_timeout_secs: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_polls: DEFAULT_MAX_POLLS,
            enable_stdio: false,
            mcp_serve: true,
            mcp_http_addr: DEFAULT_MCP_HTTP_ADDR.parse().expect("valid MCP addr"),
            errlog_stdio: false,
            errlog_serve: false,
            errlog_http_addr: DEFAULT_ERRLOG_HTTP_ADDR.parse().expect("valid errlog addr"),
            errlog_file: PathBuf::from(DEFAULT_ERRLOG_FILE),
        }
    }

    #[test]
    fn environment_profile_parses_with_password() {
        let config = Config::try_from(base_args()).expect("config should parse");

        let profile = config.profiles.get("default").expect("default profile");
        assert_eq!(profile.account, "testorg-test1");
        assert_eq!(profile.user, "SVC_MCP");
        assert!(matches!(profile.credentials, Credentials::Password(_)));
    }

    #[test]
    fn password_and_token_conflict() {
        let mut args = base_args();
        args.token = Some("tok".to_string());

        let result = Config::try_from(args);

        match result {
            Err(ConfigError::InvalidProfile { profile, reason }) => {
                assert_eq!(profile, "default");
                assert!(reason.contains("password and token"));
            }
            _ => panic!("expected a credentials conflict"),
        }
    }

    #[test]
    fn missing_account_is_rejected() {
        let mut args = base_args();
        args.account = None;

        let result = Config::try_from(args);

        match result {
            Err(ConfigError::InvalidProfile { reason, .. }) => {
                assert!(reason.contains("account"));
            }
            _ => panic!("expected a missing account error"),
        }
    }

    #[test]
    fn token_type_requires_token() {
        let mut args = base_args();
        args.token_type = Some("oauth".to_string());

        let result = Config::try_from(args);

        assert!(matches!(result, Err(ConfigError::InvalidProfile { .. })));
    }

    #[test]
    fn token_without_label_defaults_to_oauth() {
        let mut args = base_args();
        args.password = None;
        args.token = Some("tok".to_string());

        let config = Config::try_from(args).expect("config should parse");

        let profile = config.profiles.get("default").expect("default profile");
        assert!(matches!(
            profile.credentials,
            Credentials::Token {
                token_type: TokenType::OAuth,
                ..
            }
        ));
    }

    #[test]
    fn unknown_token_type_is_rejected() {
        let mut args = base_args();
        args.password = None;
        args.token = Some("tok".to_string());
        args.token_type = Some("basic".to_string());

        let result = Config::try_from(args);

        match result {
            Err(ConfigError::InvalidProfile { reason, .. }) => {
                assert!(reason.contains("basic"));
            }
            _ => panic!("expected an unknown token_type error"),
        }
    }

    #[test]
    fn stdio_services_conflict() {
        let mut args = base_args();
        args.enable_stdio = true;
        args.errlog_stdio = true;

        let result = Config::try_from(args);

        assert!(matches!(result, Err(ConfigError::ConflictingSettings(_))));
    }

    #[test]
    fn some_service_must_be_selected() {
        let mut args = base_args();
        args.mcp_serve = false;

        let result = Config::try_from(args);

        assert!(matches!(result, Err(ConfigError::NoServiceSelected)));
    }

    #[test]
    fn ttl_zero_disables_expiry() {
        let mut args = base_args();
        args.registry_ttl_secs = 0;

        let config = Config::try_from(args).expect("config should parse");

        assert!(config.registry_ttl.is_none());
        assert_eq!(
            config.revalidate_after,
            Some(Duration::from_secs(DEFAULT_REGISTRY_REVALIDATE_SECS))
        );
    }

    #[test]
    fn blank_optional_settings_are_dropped() {
        let mut args = base_args();
        args.database = Some("  ".to_string());
        args.warehouse = Some("COMPUTE_WH".to_string());

        let config = Config::try_from(args).expect("config should parse");

        let profile = config.profiles.get("default").expect("default profile");
        assert!(profile.database.is_none());
        assert_eq!(profile.warehouse.as_deref(), Some("COMPUTE_WH"));
    }

    #[test]
    fn connections_file_profiles_merge_with_environment() {
        let mut file = tempfile::NamedTempFile::new().expect("temp connections file");
        writeln!(
            file,
            r#"
[default]
account = "fileorg-file1"
user = "FILE_USER"
password = "file-secret"
database = "RAW"

[analytics]
account = "fileorg-file1"
user = "ANALYST"
token = "tok"
token_type = "jwt"
"#
        )
        .expect("write connections file");

        let mut args = base_args();
        args.connections_file = Some(file.path().to_path_buf());
        args.password = None;
        args.database = None;

        let config = Config::try_from(args).expect("config should parse");

        // Environment account wins, file fills the rest.
        let selected = config.profiles.get("default").expect("default profile");
        assert_eq!(selected.account, "testorg-test1");
        assert_eq!(selected.database.as_deref(), Some("RAW"));
        assert!(matches!(selected.credentials, Credentials::Password(_)));

        let analytics = config.profiles.get("analytics").expect("analytics profile");
        assert!(matches!(
            analytics.credentials,
            Credentials::Token {
                token_type: TokenType::KeyPairJwt,
                ..
            }
        ));
    }
}
