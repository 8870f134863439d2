//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_STORAGE_DIR: &str = "uploads";
const DEFAULT_MARKDOWN_BUCKET: &str = "posts";
const DEFAULT_IMAGES_BUCKET: &str = "images";
const DEFAULT_FILESYSTEM_PUBLIC_BASE: &str = "/uploads";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_AUTH_PROVIDER: &str = "google";
const DEFAULT_SITE_TITLE: &str = "Folio";
const DEFAULT_SITE_DESCRIPTION: &str = "A multilingual blog";
const DEFAULT_SWEEP_HOURS: u64 = 24;

/// Command-line arguments for the Folio binary.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Folio multilingual blog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Write every public page as static HTML.
    Prerender(PrerenderArgs),
    /// Delete uploaded images that no published post references.
    #[command(name = "sweep-uploads")]
    SweepUploads(SweepUploadsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Remote bucket API (`<backend.url>/storage/v1`).
    Http,
    /// Local directory served under `/uploads`.
    Filesystem,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the storage backend.
    #[arg(long = "storage-backend", value_name = "BACKEND")]
    pub storage_backend: Option<StorageBackend>,

    /// Override the filesystem storage directory.
    #[arg(long = "storage-directory", value_name = "PATH")]
    pub storage_directory: Option<PathBuf>,

    /// Override the maximum accepted image size in bytes.
    #[arg(long = "storage-max-upload-bytes", value_name = "BYTES")]
    pub storage_max_upload_bytes: Option<u64>,

    /// Override the public URL the site is served from.
    #[arg(long = "site-public-url", value_name = "URL")]
    pub site_public_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct PrerenderArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Directory the HTML tree is written to.
    #[arg(value_name = "OUT", value_hint = ValueHint::DirPath)]
    pub out: PathBuf,

    /// Maximum number of pages rendered concurrently.
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(usize))]
    pub concurrency: usize,
}

#[derive(Debug, Args, Clone)]
pub struct SweepUploadsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Only delete uploads left unclaimed for at least this many hours.
    #[arg(long = "older-than-hours", default_value_t = DEFAULT_SWEEP_HOURS)]
    pub older_than_hours: u64,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub backend: BackendSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub deploy: DeploySettings,
    pub site: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

/// The hosted backend providing object storage and the identity API.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub url: Option<Url>,
    /// Public key sent with identity requests.
    pub anon_key: Option<String>,
    /// Privileged key used for storage writes when present.
    pub service_role_key: Option<String>,
}

impl BackendSettings {
    /// Key used for storage calls: the privileged one when configured.
    pub fn storage_key(&self) -> Option<&str> {
        self.service_role_key
            .as_deref()
            .or(self.anon_key.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub directory: PathBuf,
    pub markdown_bucket: String,
    pub images_bucket: String,
    pub public_base_url: String,
    pub max_upload_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub default_provider: String,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub hook_url: Option<Url>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub title: String,
    pub description: String,
    pub public_url: Url,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Prerender(args)) => raw.apply_database_override(&args.database),
        Some(Command::SweepUploads(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    backend: RawBackendSettings,
    storage: RawStorageSettings,
    auth: RawAuthSettings,
    deploy: RawDeploySettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.storage_backend {
            self.storage.backend = Some(backend);
        }
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.storage_max_upload_bytes {
            self.storage.max_upload_bytes = Some(limit);
        }
        if let Some(url) = overrides.site_public_url.as_ref() {
            self.site.public_url = Some(url.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            backend,
            storage,
            auth,
            deploy,
            site,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let backend = build_backend_settings(backend)?;
        let storage = build_storage_settings(storage, &backend)?;
        let auth = build_auth_settings(auth);
        let deploy = build_deploy_settings(deploy)?;
        let site = build_site_settings(site, &server)?;

        Ok(Self {
            server,
            logging,
            database,
            backend,
            storage,
            auth,
            deploy,
            site,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let url = non_blank(backend.url)
        .map(|value| parse_url(&value, "backend.url"))
        .transpose()?;

    Ok(BackendSettings {
        url,
        anon_key: non_blank(backend.anon_key),
        service_role_key: non_blank(backend.service_role_key),
    })
}

fn build_storage_settings(
    storage: RawStorageSettings,
    backend: &BackendSettings,
) -> Result<StorageSettings, LoadError> {
    let kind = storage.backend.unwrap_or(StorageBackend::Filesystem);
    if kind == StorageBackend::Http && backend.url.is_none() {
        return Err(LoadError::invalid(
            "backend.url",
            "required when storage.backend is `http`",
        ));
    }

    let directory = storage
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "storage.directory",
            "path must not be empty",
        ));
    }

    let markdown_bucket = bucket_name(storage.markdown_bucket, DEFAULT_MARKDOWN_BUCKET)
        .map_err(|reason| LoadError::invalid("storage.markdown_bucket", reason))?;
    let images_bucket = bucket_name(storage.images_bucket, DEFAULT_IMAGES_BUCKET)
        .map_err(|reason| LoadError::invalid("storage.images_bucket", reason))?;

    let public_base_url = non_blank(storage.public_base_url)
        .unwrap_or_else(|| DEFAULT_FILESYSTEM_PUBLIC_BASE.to_string())
        .trim_end_matches('/')
        .to_string();

    let max_upload_bytes_value = storage
        .max_upload_bytes
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
    let max_upload_bytes = NonZeroU64::new(max_upload_bytes_value).ok_or_else(|| {
        LoadError::invalid("storage.max_upload_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_upload_bytes_value).map_err(|_| {
        LoadError::invalid(
            "storage.max_upload_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(StorageSettings {
        backend: kind,
        directory,
        markdown_bucket,
        images_bucket,
        public_base_url,
        max_upload_bytes,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> AuthSettings {
    AuthSettings {
        default_provider: non_blank(auth.default_provider)
            .unwrap_or_else(|| DEFAULT_AUTH_PROVIDER.to_string()),
        cookie_secure: auth.cookie_secure.unwrap_or(true),
    }
}

fn build_deploy_settings(deploy: RawDeploySettings) -> Result<DeploySettings, LoadError> {
    let hook_url = non_blank(deploy.hook_url)
        .map(|value| parse_url(&value, "deploy.hook_url"))
        .transpose()?;

    Ok(DeploySettings {
        hook_url,
        webhook_secret: non_blank(deploy.webhook_secret),
    })
}

fn build_site_settings(
    site: RawSiteSettings,
    server: &ServerSettings,
) -> Result<SiteSettings, LoadError> {
    let public_url = match non_blank(site.public_url) {
        Some(value) => parse_url(&value, "site.public_url")?,
        None => parse_url(&format!("http://{}", server.addr), "site.public_url")?,
    };

    Ok(SiteSettings {
        title: non_blank(site.title).unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string()),
        description: non_blank(site.description)
            .unwrap_or_else(|| DEFAULT_SITE_DESCRIPTION.to_string()),
        public_url,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    url: Option<String>,
    anon_key: Option<String>,
    service_role_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<StorageBackend>,
    directory: Option<PathBuf>,
    markdown_bucket: Option<String>,
    images_bucket: Option<String>,
    public_base_url: Option<String>,
    max_upload_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    default_provider: Option<String>,
    cookie_secure: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDeploySettings {
    hook_url: Option<String>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    title: Option<String>,
    description: Option<String>,
    public_url: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value).map_err(|err| LoadError::invalid(key, format!("{err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LoadError::invalid(
            key,
            format!("unsupported scheme `{other}`"),
        )),
    }
}

fn bucket_name(value: Option<String>, default: &str) -> Result<String, String> {
    let name = non_blank(value).unwrap_or_else(|| default.to_string());
    if name.contains('/') || name.contains("..") {
        return Err(format!("bucket `{name}` must be a single path segment"));
    }
    Ok(name)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
