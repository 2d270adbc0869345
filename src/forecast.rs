//! PV forecast collaborator boundary.
//!
//! The core never fetches forecasts itself; when a request omits
//! `pv_forecast_kw`, the service asks an implementation of
//! [`ForecastProvider`] for the horizon. A failed fetch rejects the request
//! with `pv_forecast_unavailable` — it is not a fallback trigger.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Supplies a PV power forecast for a site over a half-open window
/// `[start, end)` at the requested resolution and quantile.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn fetch_pv(
        &self,
        site_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution_minutes: u32,
        quantile: f64,
    ) -> Result<Vec<f64>>;
}

/// Provider that returns a fixed series regardless of the window. Useful for
/// tests and for callers that resolve forecasts ahead of time.
#[derive(Debug, Clone, Default)]
pub struct StaticForecast {
    pub pv_kw: Vec<f64>,
}

impl StaticForecast {
    pub fn new(pv_kw: Vec<f64>) -> Self {
        Self { pv_kw }
    }
}

#[async_trait]
impl ForecastProvider for StaticForecast {
    async fn fetch_pv(
        &self,
        _site_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _resolution_minutes: u32,
        _quantile: f64,
    ) -> Result<Vec<f64>> {
        Ok(self.pv_kw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_echoes_series() {
        let provider = StaticForecast::new(vec![1.0, 2.0]);
        let pv = provider
            .fetch_pv("site-1", Utc::now(), Utc::now(), 15, 0.5)
            .await
            .unwrap();
        assert_eq!(pv, vec![1.0, 2.0]);
    }
}
