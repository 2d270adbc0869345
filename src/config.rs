use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Core configuration, covering the knobs a deployment may want to tune
/// without touching request payloads.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub solver: SolverConfig,
}

/// MILP solver defaults. A request's `solver_timeout_ms` overrides
/// `timeout_ms` for that run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_mip_rel_gap")]
    pub mip_rel_gap: f64,

    #[serde(default = "default_threads")]
    pub threads: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            mip_rel_gap: default_mip_rel_gap(),
            threads: default_threads(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_mip_rel_gap() -> f64 {
    0.01
}

fn default_threads() -> u32 {
    1
}

impl CoreConfig {
    /// Load configuration from `config/dispatch.toml` (if present) overlaid
    /// with `DISPATCH__`-prefixed environment variables
    /// (`DISPATCH__SOLVER__TIMEOUT_MS` maps to `solver.timeout_ms`).
    pub fn load() -> Result<Self> {
        Figment::new()
            .merge(Toml::file("config/dispatch.toml"))
            .merge(Env::prefixed("DISPATCH__").split("__"))
            .extract()
            .context("Failed to parse dispatch configuration")
    }
}
