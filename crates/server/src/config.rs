use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use uci_engine::EngineSettings;

use crate::session::DriverSettings;

#[derive(Clone, Debug)]
pub struct Config {
    /// Enables remote rating sync when set
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub stockfish_path: String,
    pub engine_move_depth: u32,
    pub engine_move_timeout_secs: u64,
    pub engine_move_retries: u32,
    pub bot_move_delay_ms: u64,
    pub rating_floor: u32,
    /// One rating file per identity lives here
    pub ratings_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            jwt_secret: env::var("JWT_SECRET_KEY")
                .unwrap_or_else(|_| "dev-secret-key-change-in-production".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed("PORT", 8000),
            stockfish_path: env::var("STOCKFISH_PATH")
                .unwrap_or_else(|_| "/usr/local/bin/stockfish".to_string()),
            engine_move_depth: parsed("ENGINE_MOVE_DEPTH", 10),
            engine_move_timeout_secs: parsed("ENGINE_MOVE_TIMEOUT_SECS", 15),
            engine_move_retries: parsed("ENGINE_MOVE_RETRIES", 1),
            bot_move_delay_ms: parsed("BOT_MOVE_DELAY_MS", 500),
            rating_floor: parsed("RATING_FLOOR", 800),
            ratings_dir: env::var("RATINGS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ratings")),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            move_depth: self.engine_move_depth,
            move_timeout: Duration::from_secs(self.engine_move_timeout_secs),
            ..EngineSettings::default()
        }
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            bot_move_delay: Duration::from_millis(self.bot_move_delay_ms),
        }
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
