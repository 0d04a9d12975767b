//! # config — everything tunable, read once from the environment
//!
//! Every knob has an env var and a default matching the trading rules the
//! manager was tuned with.  Invalid values stop start-up with a contextual
//! error instead of silently falling back.
//!
//! Credentials come from `APCA_API_KEY_ID` / `APCA_API_SECRET_KEY`, or from
//! a JSON file named by `ALPACA_CREDENTIALS_FILE`:
//!
//! ```json
//! { "baseUrl": "https://paper-api.alpaca.markets", "apiKey": "…", "secretKey": "…" }
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::engine::monitor::{ExitConfig, LadderStep};
use crate::engine::rotation::RotationConfig;
use crate::engine::scanner::ScanConfig;
use crate::gateway::alpaca::{AlpacaConfig, ALPACA_DATA_URL, ALPACA_PAPER_URL};
use crate::gateway::retry::RetryPolicy;

const DEFAULT_BLACKLIST: &str = "LCID,PLTR,NVDA,BABA,RIVN,NFLX,COIN";
const DEFAULT_STRONG_PERFORMERS: &str = "SLV,GLD,XLB,XLE";
const DEFAULT_LADDER: &str = "0.05:0.33,0.10:0.50,0.15:1.0";
const MAX_SPAN_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct TraderConfig {
    pub alpaca: AlpacaConfig,
    pub scan: ScanConfig,
    pub exits: ExitConfig,
    pub rotation: RotationConfig,
    pub scan_interval: Duration,
    /// Sleep after a failed cycle.
    pub error_backoff: Duration,
    pub quote_timeout: Duration,
    pub history_window: chrono::Duration,
    pub universe_refresh: chrono::Duration,
    pub blacklist: HashSet<String>,
    /// Log an account summary every N cycles.
    pub summary_every: u64,
    /// `None` disables the monitor server.
    pub monitor_bind: Option<SocketAddr>,
    pub monitor_api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsFile {
    #[serde(default)]
    base_url: Option<String>,
    api_key: String,
    secret_key: String,
}

// ─── Env helpers ──────────────────────────────────────────────────────────────

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{key} has an invalid value: '{raw}'")),
            None => Ok(default),
        }
    }

    fn secs(&self, key: &str, default: u64) -> anyhow::Result<Duration> {
        self.parse(key, default).map(Duration::from_secs)
    }

    /// Whole seconds as a `chrono::Duration`, positive and at most a week.
    fn span(&self, key: &str, default: u64) -> anyhow::Result<chrono::Duration> {
        let secs: u64 = self.parse(key, default)?;
        if secs == 0 || secs > MAX_SPAN_SECS {
            bail!("{key} must be between 1 and {MAX_SPAN_SECS} seconds, got {secs}");
        }
        chrono::Duration::from_std(Duration::from_secs(secs))
            .with_context(|| format!("{key} is out of range: {secs}"))
    }

    fn fraction(&self, key: &str, default: f64) -> anyhow::Result<f64> {
        let v: f64 = self.parse(key, default)?;
        if !(v > 0.0 && v < 1.0) {
            bail!("{key} must be between 0 and 1 (exclusive), got {v}");
        }
        Ok(v)
    }

    fn symbols(&self, key: &str, default: &str) -> HashSet<String> {
        // An explicitly empty list is allowed: "BLACKLIST=" clears it
        let raw = match (self.lookup)(key) {
            Some(v) => v,
            None => default.to_string(),
        };
        raw.split(',')
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// `"0.05:0.33,0.10:0.50"` → ladder steps, validated.
pub fn parse_ladder(raw: &str) -> anyhow::Result<Vec<LadderStep>> {
    let mut ladder = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (threshold, fraction) = part
            .split_once(':')
            .with_context(|| format!("ladder step '{part}' must look like gain:fraction"))?;
        let threshold: f64 = threshold.trim().parse().with_context(|| format!("bad gain in '{part}'"))?;
        let fraction: f64 = fraction.trim().parse().with_context(|| format!("bad fraction in '{part}'"))?;
        ladder.push(LadderStep { threshold, fraction });
    }

    if ladder.is_empty() {
        bail!("profit ladder is empty");
    }
    for step in &ladder {
        if !(step.threshold > 0.0) {
            bail!("ladder gain must be positive, got {}", step.threshold);
        }
        if !(step.fraction > 0.0 && step.fraction <= 1.0) {
            bail!("ladder fraction must be in (0, 1], got {}", step.fraction);
        }
    }
    if ladder.windows(2).any(|w| w[1].threshold <= w[0].threshold) {
        bail!("ladder gains must be strictly increasing");
    }
    Ok(ladder)
}

impl TraderConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let env = Env { lookup };

        // ── Credentials ──────────────────────────────────────────────────────
        let file = match env.get("ALPACA_CREDENTIALS_FILE") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read credentials file {path}"))?;
                let creds: CredentialsFile = serde_json::from_str(&raw)
                    .with_context(|| format!("credentials file {path} is not valid JSON"))?;
                Some(creds)
            }
            None => None,
        };

        let (key_id, secret_key, file_base) = match (env.get("APCA_API_KEY_ID"), env.get("APCA_API_SECRET_KEY"), file) {
            (Some(id), Some(secret), file) => (id, secret, file.and_then(|f| f.base_url)),
            (_, _, Some(f)) => (f.api_key, f.secret_key, f.base_url),
            _ => bail!("APCA_API_KEY_ID and APCA_API_SECRET_KEY (or ALPACA_CREDENTIALS_FILE) are required"),
        };

        let base_url = env
            .get("ALPACA_BASE_URL")
            .or(file_base)
            .unwrap_or_else(|| ALPACA_PAPER_URL.to_string());
        let data_url = env.get("ALPACA_DATA_URL").unwrap_or_else(|| ALPACA_DATA_URL.to_string());
        let quote_timeout = env.secs("QUOTE_TIMEOUT_SECS", 5)?;

        let alpaca = AlpacaConfig {
            base_url,
            data_url,
            key_id,
            secret_key,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        };

        // ── Lists ────────────────────────────────────────────────────────────
        let blacklist = env.symbols("BLACKLIST", DEFAULT_BLACKLIST);
        let strong_performers = env.symbols("STRONG_PERFORMERS", DEFAULT_STRONG_PERFORMERS);

        // ── Entries ──────────────────────────────────────────────────────────
        let min_price: f64 = env.parse("MIN_ENTRY_PRICE", 2.0)?;
        let max_price: f64 = env.parse("MAX_ENTRY_PRICE", 10_000.0)?;
        if !(min_price > 0.0 && max_price > min_price) {
            bail!("entry price band is invalid: {min_price}..{max_price}");
        }

        let scan = ScanConfig {
            max_positions: env.parse("MAX_POSITIONS", 50)?,
            max_new_per_scan: env.parse("MAX_NEW_PER_SCAN", 3)?,
            crypto_size: env.parse("CRYPTO_POSITION_SIZE", 600.0)?,
            stock_size: env.parse("STOCK_POSITION_SIZE", 1_200.0)?,
            strong_size: env.parse("STRONG_POSITION_SIZE", 2_000.0)?,
            min_price,
            strong_performers: strong_performers.clone(),
            blacklist: blacklist.clone(),
            order_pause: Duration::from_secs(1),
        };
        if [scan.crypto_size, scan.stock_size, scan.strong_size].iter().any(|s| !(*s > 0.0)) {
            bail!("position sizes must be positive");
        }

        // ── Exits ────────────────────────────────────────────────────────────
        let ladder_raw = env.get("PROFIT_LADDER").unwrap_or_else(|| DEFAULT_LADDER.to_string());
        let exits = ExitConfig {
            ladder: parse_ladder(&ladder_raw).context("PROFIT_LADDER is invalid")?,
            stop_loss_crypto: env.fraction("STOP_LOSS_CRYPTO", 0.10)?,
            stop_loss_etf: env.fraction("STOP_LOSS_ETF", 0.05)?,
            stop_loss_stock: env.fraction("STOP_LOSS_STOCK", 0.08)?,
            trailing_stop_pct: env.fraction("TRAILING_STOP_PCT", 0.03)?,
            trail_activation_pct: env.fraction("TRAIL_ACTIVATION_PCT", 0.005)?,
            min_order_qty: 0.01,
        };

        // ── Rotation ─────────────────────────────────────────────────────────
        let threshold: f64 = env.parse("ROTATION_THRESHOLD", -0.025)?;
        if threshold >= 0.0 {
            bail!("ROTATION_THRESHOLD must be negative, got {threshold}");
        }
        let margin: f64 = env.parse("ROTATION_MARGIN", 1.5)?;
        if margin < 1.0 {
            bail!("ROTATION_MARGIN must be at least 1.0, got {margin}");
        }
        let cap_multiple: f64 = env.parse("SWAP_SIZE_CAP_MULTIPLE", 1.5)?;

        let rotation = RotationConfig {
            interval: env.span("ROTATION_INTERVAL_SECS", 600)?,
            threshold,
            margin,
            sample_size: env.parse("ROTATION_SAMPLE_SIZE", 20)?,
            max_actions: env.parse("ROTATION_MAX_ACTIONS", 5)?,
            min_price,
            max_price,
            swap_notional_cap: scan.stock_size * cap_multiple,
            max_reopen_attempts: env.parse("MAX_REOPEN_ATTEMPTS", 3)?,
            order_pause: Duration::from_secs(1),
            strong_performers,
            blacklist: blacklist.clone(),
        };

        // ── Monitor API ──────────────────────────────────────────────────────
        let monitor_bind = match (env.lookup)("MONITOR_BIND_ADDR") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().parse().with_context(|| format!("MONITOR_BIND_ADDR is invalid: '{raw}'"))?),
            None => Some(SocketAddr::from(([0, 0, 0, 0], 3000))),
        };

        let scan_interval = env.secs("SCAN_INTERVAL_SECS", 30)?;
        let history_window = env.span("HISTORY_WINDOW_SECS", 600)?;
        if history_window.to_std().map_or(true, |w| w <= scan_interval) {
            bail!("HISTORY_WINDOW_SECS must be longer than SCAN_INTERVAL_SECS or momentum never builds");
        }

        Ok(Self {
            alpaca,
            scan,
            exits,
            rotation,
            scan_interval,
            error_backoff: env.secs("ERROR_BACKOFF_SECS", 60)?,
            quote_timeout,
            history_window,
            universe_refresh: env.span("UNIVERSE_REFRESH_SECS", 1_800)?,
            blacklist,
            summary_every: env.parse("ACCOUNT_SUMMARY_EVERY", 10u64)?.max(1),
            monitor_bind,
            monitor_api_key: env.get("MONITOR_API_KEY"),
        })
    }
}
