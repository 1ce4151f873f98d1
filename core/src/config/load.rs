use std::path::Path;

use super::types::HarnessConfig;

pub fn load_default() -> anyhow::Result<HarnessConfig> {
    let mut cfg: HarnessConfig = if Path::new("testwatch.toml").exists() {
        let s = std::fs::read_to_string("testwatch.toml")?;
        toml::from_str::<HarnessConfig>(&s)?
    } else {
        HarnessConfig::default()
    };

    if let Ok(v) = std::env::var("TESTWATCH_SUITE_NAME") {
        if !v.trim().is_empty() {
            cfg.suite_name = v;
        }
    }
    if let Ok(v) = std::env::var("TESTWATCH_TIMEOUT_SECS") {
        if let Ok(secs) = v.trim().parse() {
            cfg.timeout_secs = secs;
        }
    }
    if let Ok(v) = std::env::var("TESTWATCH_FLUSH_INTERVAL_MS") {
        if let Ok(ms) = v.trim().parse() {
            cfg.flush_interval_ms = ms;
        }
    }
    if let Ok(v) = std::env::var("TESTWATCH_EXCLUDE_TAGS") {
        if !v.trim().is_empty() {
            cfg.exclude_tags = v
                .split(',')
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect();
        }
    }

    Ok(cfg)
}
