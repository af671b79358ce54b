use std::env;
use std::time::Duration;

const ENV_PREFIX: &str = "PRODUCER_";

/// Listening socket configuration
#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Bind host (default: "0.0.0.0")
    pub host: String,

    /// Bind port (default: 8140)
    pub port: u16,
}

impl ListenConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upload behaviour configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum request body size in bytes (default: 1 GiB)
    pub body_limit: usize,

    /// Prefix of the links handed back to uploaders, without trailing slash
    pub base_url: String,

    /// Default expiration time in seconds (default: 1800)
    pub default_expiration_secs: u64,

    /// Bearer secret allowed to override expiration. Empty disables overrides.
    pub admin_token: String,
}

/// Object store configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Candidate endpoints, `host:port` or full URLs
    pub endpoints: Vec<String>,

    /// Use https for endpoints given without a scheme
    pub secure: bool,

    pub key_id: String,
    pub secret: String,

    /// Bucket holding every uploaded object (default: "producer")
    pub bucket_name: String,

    /// Signing region (default: "us-east-1")
    pub region: String,

    /// Upper bound for a single probe round
    pub probe_timeout: Duration,

    /// How long to wait for a faster endpoint once one has answered
    pub probe_grace: Duration,

    /// Delay between background re-probes
    pub probe_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub listen: ListenConfig,
    pub upload: UploadConfig,
    pub s3: S3Config,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        let listen = ListenConfig {
            host: "0.0.0.0".to_string(),
            port: 8140,
        };
        let base_url = format!("http://{}", listen.addr());

        Self {
            listen,
            upload: UploadConfig {
                body_limit: 1024 * 1024 * 1024, // 1 GiB
                base_url,
                default_expiration_secs: 1800,
                admin_token: String::new(),
            },
            s3: S3Config {
                endpoints: Vec::new(),
                secure: false,
                key_id: String::new(),
                secret: String::new(),
                bucket_name: "producer".to_string(),
                region: "us-east-1".to_string(),
                probe_timeout: Duration::from_secs(5),
                probe_grace: Duration::from_millis(500),
                probe_interval: Duration::from_secs(60),
            },
        }
    }
}

fn var(section: &str, key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{section}_{key}"))
        .ok()
        .filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(section: &str, key: &str) -> Option<T> {
    var(section, key).and_then(|v| v.parse().ok())
}

fn parse_bool(value: &str) -> bool {
    !value.is_empty() && value.to_lowercase() != "false" && value != "0"
}

/// Splits the space-separated endpoint list, ignoring repeated separators.
pub fn parse_endpoints(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

impl ProducerConfig {
    /// Load configuration from `PRODUCER_*` environment variables
    pub fn from_env() -> Self {
        Self::load(None)
    }

    /// Like [`from_env`](Self::from_env), with a command-line port taking
    /// precedence. The implicit base URL follows the effective port.
    pub fn load(port_override: Option<u16>) -> Self {
        let default = Self::default();

        let listen = ListenConfig {
            host: var("LISTEN", "HOST").unwrap_or(default.listen.host),
            port: port_override
                .or_else(|| parsed("LISTEN", "PORT"))
                .unwrap_or(default.listen.port),
        };

        let base_url = match var("UPLOAD", "BASE_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let url = format!("http://{}", listen.addr());
                tracing::info!("Base URL implicitly set to {}", url);
                url
            }
        };

        let upload = UploadConfig {
            body_limit: parsed("UPLOAD", "BODY_LIMIT").unwrap_or(default.upload.body_limit),
            base_url,
            default_expiration_secs: parsed("UPLOAD", "DEFAULT_EXPIRATION_TIME")
                .unwrap_or(default.upload.default_expiration_secs),
            admin_token: var("UPLOAD", "ADMIN_TOKEN").unwrap_or_default(),
        };

        let s3 = S3Config {
            endpoints: var("S3", "ENDPOINT")
                .map(|v| parse_endpoints(&v))
                .unwrap_or_default(),
            secure: var("S3", "SECURE")
                .map(|v| parse_bool(&v))
                .unwrap_or(default.s3.secure),
            key_id: var("S3", "KEYID").unwrap_or_default(),
            secret: var("S3", "SECRET").unwrap_or_default(),
            bucket_name: var("S3", "BUCKET_NAME").unwrap_or(default.s3.bucket_name),
            region: var("S3", "REGION").unwrap_or(default.s3.region),
            probe_timeout: parsed("S3", "PROBE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.s3.probe_timeout),
            probe_grace: parsed("S3", "PROBE_GRACE_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.s3.probe_grace),
            probe_interval: parsed("S3", "PROBE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.s3.probe_interval),
        };

        Self {
            listen,
            upload,
            s3,
        }
    }

    /// Config for tests and local runs: short probe windows, no admin token.
    pub fn development() -> Self {
        let mut config = Self::default();
        config.listen.host = "127.0.0.1".to_string();
        config.upload.base_url = "http://127.0.0.1:8140".to_string();
        config.s3.probe_timeout = Duration::from_secs(1);
        config.s3.probe_grace = Duration::from_millis(100);
        config
    }
}
