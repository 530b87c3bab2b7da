//! Engine configuration.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Bounds applied to every traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraversalLimits {
    /// Maximum number of edges on a path (`0` allows only the empty path).
    pub max_hops: Option<u32>,
    /// Maximum number of visited (vertex, state) pairs.
    pub max_visited: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads; `None` means `max(2, available_parallelism + 1)`.
    pub workers: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: None,
            thread_name_prefix: "pathwise-worker".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers),
            ..Self::default()
        }
    }

    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) => n.max(1),
            None => {
                let parallelism = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                (parallelism + 1).max(2)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_hops: Option<u32>,
    pub max_visited: Option<usize>,
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    pub fn limits(&self) -> TraversalLimits {
        TraversalLimits {
            max_hops: self.max_hops,
            max_visited: self.max_visited,
        }
    }

    /// Defaults overlaid with `PATHWISE_MAX_HOPS`, `PATHWISE_MAX_VISITED` and
    /// `PATHWISE_WORKERS`.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply environment-style overrides read through `get`.
    pub fn overlay(mut self, get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = get("PATHWISE_MAX_HOPS") {
            self.max_hops = Some(parse_var("PATHWISE_MAX_HOPS", &v)?);
        }
        if let Some(v) = get("PATHWISE_MAX_VISITED") {
            self.max_visited = Some(parse_var("PATHWISE_MAX_VISITED", &v)?);
        }
        if let Some(v) = get("PATHWISE_WORKERS") {
            self.scheduler.workers = Some(parse_var("PATHWISE_WORKERS", &v)?);
        }
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("invalid value for {key}: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_worker_count_is_at_least_two() {
        assert!(SchedulerConfig::default().worker_count() >= 2);
        assert_eq!(SchedulerConfig::with_workers(3).worker_count(), 3);
        assert_eq!(SchedulerConfig::with_workers(0).worker_count(), 1);
    }

    #[test]
    fn json_fields_default_when_missing() {
        let cfg = EngineConfig::from_json_str(r#"{"max_hops": 4, "scheduler": {"workers": 2}}"#)
            .unwrap();
        assert_eq!(cfg.max_hops, Some(4));
        assert_eq!(cfg.max_visited, None);
        assert_eq!(cfg.scheduler.workers, Some(2));
        assert_eq!(cfg.scheduler.thread_name_prefix, "pathwise-worker");
        assert!(EngineConfig::from_json_str("{\"max_hops\": \"x\"}").is_err());
    }

    #[test]
    fn environment_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PATHWISE_MAX_HOPS", "3"),
            ("PATHWISE_WORKERS", " 5 "),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::default()
            .overlay(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.limits().max_hops, Some(3));
        assert_eq!(cfg.scheduler.workers, Some(5));
        assert_eq!(cfg.max_visited, None);

        let bad = EngineConfig::default().overlay(|k| {
            (k == "PATHWISE_MAX_VISITED").then(|| "lots".to_string())
        });
        assert!(bad.is_err());
    }
}
