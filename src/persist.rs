//! Persistence collaborator boundary.
//!
//! Runs, schedules and KPIs are written best-effort after a dispatch
//! completes: a failed write is logged by the service but never changes the
//! returned result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DispatchStatus, SchedulePoint, SolverLabel};
use crate::optimizer::kpi::Kpis;

/// Metadata describing one dispatch run, written before its schedule rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub site_id: String,
    pub status: DispatchStatus,
    pub solver: SolverLabel,
    pub fallback_used: bool,
    pub objective_value: Option<f64>,
    pub solver_time_ms: u64,
    pub timeout_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Store for dispatch runs and their derived artifacts. `write_run` assigns
/// and returns the run id the other writes key on.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn write_run(&self, meta: &RunMetadata) -> Result<Uuid>;
    async fn write_schedule(&self, run_id: Uuid, schedule: &[SchedulePoint]) -> Result<()>;
    async fn write_kpis(&self, run_id: Uuid, kpis: &Kpis) -> Result<()>;
}

#[async_trait]
impl<T: RunStore + ?Sized> RunStore for Arc<T> {
    async fn write_run(&self, meta: &RunMetadata) -> Result<Uuid> {
        (**self).write_run(meta).await
    }

    async fn write_schedule(&self, run_id: Uuid, schedule: &[SchedulePoint]) -> Result<()> {
        (**self).write_schedule(run_id, schedule).await
    }

    async fn write_kpis(&self, run_id: Uuid, kpis: &Kpis) -> Result<()> {
        (**self).write_kpis(run_id, kpis).await
    }
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    runs: Vec<(Uuid, RunMetadata)>,
    schedules: HashMap<Uuid, Vec<SchedulePoint>>,
    kpis: HashMap<Uuid, Kpis>,
}

/// In-memory store used in tests and as a stand-in when no database is
/// wired up.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<(Uuid, RunMetadata)> {
        self.inner.lock().expect("store lock").runs.clone()
    }

    pub fn schedule(&self, run_id: Uuid) -> Option<Vec<SchedulePoint>> {
        self.inner
            .lock()
            .expect("store lock")
            .schedules
            .get(&run_id)
            .cloned()
    }

    pub fn kpis(&self, run_id: Uuid) -> Option<Kpis> {
        self.inner.lock().expect("store lock").kpis.get(&run_id).cloned()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn write_run(&self, meta: &RunMetadata) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        self.inner
            .lock()
            .expect("store lock")
            .runs
            .push((run_id, meta.clone()));
        Ok(run_id)
    }

    async fn write_schedule(&self, run_id: Uuid, schedule: &[SchedulePoint]) -> Result<()> {
        self.inner
            .lock()
            .expect("store lock")
            .schedules
            .insert(run_id, schedule.to_vec());
        Ok(())
    }

    async fn write_kpis(&self, run_id: Uuid, kpis: &Kpis) -> Result<()> {
        self.inner
            .lock()
            .expect("store lock")
            .kpis
            .insert(run_id, kpis.clone());
        Ok(())
    }
}
