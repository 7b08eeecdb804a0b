use slog::o;
use slog::Drain;
use std::io::Read;
use std::{env, fs};

#[macro_use]
mod macros;

pub mod client;
pub mod cors;
pub mod crypto;
pub mod logging;
pub mod models;
pub mod player;
pub mod render;
pub mod service;
pub mod spotify;
pub mod store;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

/// A plain message error, built with `se!`
#[derive(Debug)]
pub struct StrError(pub String);

impl std::fmt::Display for StrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StrError {}

fn env_or(k: &str, default: &str) -> String {
    env::var(k).unwrap_or_else(|_| default.to_string())
}

lazy_static::lazy_static! {
    pub static ref CONFIG: Config = Config::load();

    // The "base" logger that all crates should branch off of
    pub static ref BASE_LOG: slog::Logger = {
        let level: slog::Level = CONFIG.log_level
                .parse()
                .unwrap_or(slog::Level::Info);
        if CONFIG.log_format == "pretty" {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::CompactFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        } else {
            let drain = slog_json::Json::default(std::io::stderr()).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            slog::Logger::root(drain, o!())
        }
    };

    // Base logger
    pub static ref LOG: slog::Logger = BASE_LOG.new(slog::o!("app" => "spot-remote"));
}

#[derive(serde::Deserialize, Debug)]
pub struct Config {
    pub version: String,
    pub ssl: bool,
    pub host: String,
    pub port: u16,
    pub log_format: String,
    pub log_level: String,
    pub spotify_client_id: String,
    pub spotify_secret_id: String,
    pub spotify_redirect_uri: String,
    // where the auth callback sends the browser once it's done,
    // the backend serves these pages itself by default.
    pub frontend_url: String,
    pub db_url: String,
    pub enc_key: String,
    // pending logins without a refresh token are deleted after this long
    pub session_token_ttl_seconds: u64,
    pub access_token_cache_seconds: u64,
    pub backend_url: String,
    pub lyrics_api_url: String,
    pub player_store_path: String,
}
impl Config {
    pub fn load() -> Self {
        let version = fs::File::open("commit_hash.txt")
            .ok()
            .and_then(|mut f| {
                let mut s = String::new();
                f.read_to_string(&mut s).ok().map(|_| s.trim().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());
        let ssl = env_or("SSL", "false") == "true";
        let host = env_or("HOST", "localhost");
        let port = env_or("PORT", "3000").parse().unwrap_or(3000);
        let origin = format!("{}://{}:{}", if ssl { "https" } else { "http" }, host, port);
        Self {
            version,
            ssl,
            host,
            port,
            log_format: env_or("LOG_FORMAT", "json")
                .to_lowercase()
                .trim()
                .to_string(),
            log_level: env_or("LOG_LEVEL", "INFO"),
            spotify_client_id: env_or("SPOTIFY_CLIENT_ID", "fake"),
            spotify_secret_id: env_or("SPOTIFY_CLIENT_SECRET", "fake"),
            spotify_redirect_uri: env_or(
                "SPOTIFY_REDIRECT_URI",
                &format!("{}/auth/callback", origin),
            ),
            frontend_url: env_or("FRONTEND_URL", &origin),
            db_url: env_or("DATABASE_URL", "memory"),
            enc_key: env_or("ENC_KEY", "01234567890123456789012345678901"),
            session_token_ttl_seconds: env_or("SESSION_TOKEN_TTL_SECONDS", "900")
                .parse()
                .unwrap_or(900),
            access_token_cache_seconds: env_or("ACCESS_TOKEN_CACHE_SECONDS", "3000")
                .parse()
                .unwrap_or(3000),
            backend_url: env_or("BACKEND_URL", &origin),
            lyrics_api_url: env_or(
                "LYRICS_API_URL",
                "https://spotify-lyric-api-984e7b4face0.herokuapp.com/",
            ),
            player_store_path: env_or("PLAYER_STORE_PATH", ".spot-remote.json"),
        }
    }
    pub fn initialize(&self) -> Result<()> {
        if self.enc_key.len() != 32 {
            return Err(se!("ENC_KEY must be 32 bytes, got {}", self.enc_key.len()).into());
        }
        slog::info!(
            LOG, "initialized config";
            "version" => &self.version,
            "ssl" => &self.ssl,
            "host" => &self.host,
            "port" => &self.port,
            "log_format" => &self.log_format,
            "log_level" => &self.log_level,
            "frontend_url" => &self.frontend_url,
            "spotify_redirect_uri" => &self.spotify_redirect_uri,
            "session_token_ttl_seconds" => &self.session_token_ttl_seconds,
        );
        Ok(())
    }
    pub fn host(&self) -> String {
        let p = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", p, self.host, self.port)
    }
    pub fn uses_memory_store(&self) -> bool {
        self.db_url == "memory"
    }
}

/// Try sourcing a `.env` if one exists
pub fn load_dotenv() {
    dotenv::dotenv().ok();
}

/// Milliseconds since the unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
