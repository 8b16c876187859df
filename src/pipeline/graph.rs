// ABOUTME: Validated stage graph and its dependency-ordered parallel executor.
// ABOUTME: A stage starts once every dependency is terminal and a worker slot is free.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::context::PipelineRun;
use super::error::{GraphError, StageError};
use super::report::{RunReport, StageRecord};
use super::stage::{Stage, StageStatus};
use crate::diagnostics::{Diagnostics, Warning};
use crate::types::StageId;

/// Worker pool size and the whole-run escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_parallel: usize,
    /// Cancels the run once elapsed.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            timeout: None,
        }
    }
}

/// Stages with validated, acyclic dependencies.
#[derive(Debug)]
pub struct StageGraph {
    stages: Vec<Stage>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

type StageOutcome = (usize, StageStatus, Option<String>, Duration);

/// How long stages may keep running once the run is cancelled before their tasks are aborted.
pub const CANCEL_GRACE: Duration = Duration::from_secs(30);

impl StageGraph {
    /// Validate ids, dependency references and acyclicity.
    pub fn new(stages: Vec<Stage>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(stages.len());
        for (i, stage) in stages.iter().enumerate() {
            if index.insert(stage.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateStage(stage.id.clone()));
            }
        }

        let mut deps = Vec::with_capacity(stages.len());
        for stage in &stages {
            let mut resolved = Vec::with_capacity(stage.depends_on.len());
            for dependency in &stage.depends_on {
                let Some(&j) = index.get(dependency) else {
                    return Err(GraphError::UnknownDependency {
                        stage: stage.id.clone(),
                        dependency: dependency.clone(),
                    });
                };
                if !resolved.contains(&j) {
                    resolved.push(j);
                }
            }
            deps.push(resolved);
        }

        let mut dependents = vec![Vec::new(); stages.len()];
        for (i, stage_deps) in deps.iter().enumerate() {
            for &j in stage_deps {
                dependents[j].push(i);
            }
        }

        let order = topological_order(&deps, &dependents)
            .ok_or_else(|| GraphError::Cycle(find_cycle(&stages, &deps)))?;

        Ok(Self {
            stages,
            deps,
            dependents,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages in a valid execution order.
    pub fn ordered(&self) -> impl Iterator<Item = &Stage> {
        self.order.iter().map(|&i| &self.stages[i])
    }

    /// Run every stage to a terminal status and report.
    pub async fn execute(&self, run: PipelineRun, settings: PipelineSettings) -> RunReport {
        let start = Instant::now();
        let n = self.stages.len();
        let statuses = Arc::new(Mutex::new(vec![StageStatus::Pending; n]));
        let mut records: Vec<StageRecord> = self
            .stages
            .iter()
            .map(|s| StageRecord::pending(s.id.clone(), s.best_effort))
            .collect();

        let mut remaining: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = self
            .order
            .iter()
            .copied()
            .filter(|&i| remaining[i] == 0)
            .collect();
        let semaphore = Arc::new(Semaphore::new(settings.max_parallel.max(1)));
        let mut active = FuturesUnordered::new();
        let mut aborts: HashMap<usize, AbortHandle> = HashMap::new();
        let mut deadline = settings.timeout.map(|t| (start + t, t));
        let mut abandon_at: Option<Instant> = None;
        let mut abandoned = false;

        let mut terminal = 0;
        let mut first_error = None;
        let mut diagnostics = Diagnostics::default();

        tracing::info!(
            run = %run.trigger.run_id,
            event = %run.trigger.event,
            stages = n,
            max_parallel = settings.max_parallel,
            "pipeline started"
        );

        loop {
            while let Some(i) = ready.pop_front() {
                let blocked = self.blocked(i, &statuses.lock(), &run);
                match blocked {
                    Some((status, detail)) => {
                        let outcome = (i, status, Some(detail), Duration::ZERO);
                        self.settle(outcome, &statuses, &mut records, &mut first_error, &mut diagnostics);
                        terminal += 1;
                        self.release_dependents(i, &mut remaining, &mut ready);
                    }
                    None => {
                        let handle = self.spawn_stage(i, &run, &semaphore, &statuses);
                        aborts.insert(i, handle.abort_handle());
                        active.push(handle.map(move |joined| (i, joined)));
                    }
                }
            }

            if terminal == n {
                break;
            }

            if run.cancel.is_cancelled() {
                deadline = None;
                if abandon_at.is_none() && !abandoned {
                    abandon_at = Some(Instant::now() + CANCEL_GRACE);
                }
            }

            let (i, joined) = tokio::select! {
                joined = active.next() => match joined {
                    Some(joined) => joined,
                    None => break,
                },
                _ = sleep_until(deadline.map(|(at, _)| at)) => {
                    if let Some((_, limit)) = deadline {
                        tracing::warn!(timeout = ?limit, "pipeline timeout elapsed, cancelling run");
                        run.cancel.cancel(format!("run exceeded its {limit:?} timeout"));
                    }
                    continue;
                }
                _ = sleep_until(abandon_at) => {
                    tracing::warn!(
                        grace = ?CANCEL_GRACE,
                        stages = aborts.len(),
                        "stages still running after cancellation, aborting"
                    );
                    for handle in aborts.values() {
                        handle.abort();
                    }
                    abandon_at = None;
                    abandoned = true;
                    continue;
                }
            };
            aborts.remove(&i);

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(stage = %self.stages[i].id, error = %e, "stage task aborted");
                    let reason = run
                        .cancel
                        .reason()
                        .unwrap_or_else(|| "run cancelled".to_string());
                    let detail = if e.is_panic() {
                        "stage task panicked".to_string()
                    } else {
                        format!("abandoned {CANCEL_GRACE:?} after cancellation: {reason}")
                    };
                    (i, StageStatus::Cancelled, Some(detail), Duration::ZERO)
                }
            };
            self.settle(outcome, &statuses, &mut records, &mut first_error, &mut diagnostics);
            terminal += 1;
            self.release_dependents(i, &mut remaining, &mut ready);
        }

        // Only reachable if the runtime dropped a task without reporting it.
        for record in records.iter_mut().filter(|r| !r.status.is_terminal()) {
            record.status = StageStatus::Cancelled;
            record.detail = Some("stage task aborted".to_string());
        }

        let report = RunReport {
            trigger: (*run.trigger).clone(),
            duration: start.elapsed(),
            stages: self.order.iter().map(|&i| records[i].clone()).collect(),
            verdict: run.verdict.get().cloned(),
            first_error,
            cancelled: run.cancel.reason(),
            outputs: run.outputs.snapshot(),
            warnings: diagnostics.into_warnings(),
        };
        tracing::info!(
            run = %report.trigger.run_id,
            success = report.is_success(),
            "pipeline finished"
        );
        report
    }

    /// Why stage `i` must not run, if it must not.
    fn blocked(
        &self,
        i: usize,
        statuses: &[StageStatus],
        run: &PipelineRun,
    ) -> Option<(StageStatus, String)> {
        let stage = &self.stages[i];
        if run.cancel.is_cancelled() {
            let reason = run.cancel.reason().unwrap_or_else(|| "run cancelled".to_string());
            return Some((StageStatus::Cancelled, reason));
        }
        if !stage.runs_on(run.trigger.event) {
            return Some((
                StageStatus::Skipped,
                format!("not run for {} trigger", run.trigger.event),
            ));
        }
        for &dep in &self.deps[i] {
            let dependency = &self.stages[dep];
            if !dependency.best_effort && statuses[dep] != StageStatus::Succeeded {
                return Some((
                    StageStatus::Skipped,
                    format!("dependency {} {}", dependency.id, statuses[dep]),
                ));
            }
        }
        None
    }

    fn spawn_stage(
        &self,
        i: usize,
        run: &PipelineRun,
        semaphore: &Arc<Semaphore>,
        statuses: &Arc<Mutex<Vec<StageStatus>>>,
    ) -> tokio::task::JoinHandle<StageOutcome> {
        let stage = self.stages[i].clone();
        let ctx = run.stage_context(&stage.id);
        let semaphore = Arc::clone(semaphore);
        let statuses = Arc::clone(statuses);

        tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                let reason = ctx
                    .cancel_token()
                    .reason()
                    .unwrap_or_else(|| "run cancelled".to_string());
                return (i, StageStatus::Cancelled, Some(reason), Duration::ZERO);
            };

            statuses.lock()[i] = StageStatus::Running;
            tracing::info!(stage = %stage.id, "stage started");
            let started = Instant::now();

            let work = AssertUnwindSafe(stage.runner.run(&ctx)).catch_unwind();
            let result = match stage.timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Ok(Err(StageError::Timeout(limit))),
                },
                None => work.await,
            };
            drop(permit);

            let (status, detail) = match result {
                Ok(Ok(())) => (StageStatus::Succeeded, None),
                Ok(Err(e)) if e.is_cancelled() || ctx.is_cancelled() => {
                    (StageStatus::Cancelled, Some(e.to_string()))
                }
                Ok(Err(e)) => (StageStatus::Failed, Some(e.to_string())),
                Err(_) => (StageStatus::Failed, Some("stage panicked".to_string())),
            };
            (i, status, detail, started.elapsed())
        })
    }

    fn settle(
        &self,
        (i, status, detail, duration): StageOutcome,
        statuses: &Mutex<Vec<StageStatus>>,
        records: &mut [StageRecord],
        first_error: &mut Option<String>,
        diagnostics: &mut Diagnostics,
    ) {
        let stage = &self.stages[i];
        statuses.lock()[i] = status;

        match status {
            StageStatus::Succeeded => {
                tracing::info!(stage = %stage.id, elapsed = ?duration, "stage succeeded");
            }
            StageStatus::Failed if stage.best_effort => {
                diagnostics.warn(Warning::best_effort_failure(
                    stage.id.clone(),
                    detail.as_deref().unwrap_or("failed"),
                ));
            }
            StageStatus::Cancelled if stage.best_effort && duration > Duration::ZERO => {
                diagnostics.warn(Warning::best_effort_cancelled(
                    stage.id.clone(),
                    detail.as_deref().unwrap_or("cancelled"),
                ));
            }
            StageStatus::Failed => {
                tracing::error!(stage = %stage.id, error = detail.as_deref().unwrap_or(""), "stage failed");
                if first_error.is_none() {
                    *first_error =
                        Some(format!("{}: {}", stage.id, detail.as_deref().unwrap_or("failed")));
                }
            }
            other => {
                tracing::info!(stage = %stage.id, status = %other, reason = detail.as_deref().unwrap_or(""), "stage not run");
            }
        }

        let record = &mut records[i];
        record.status = status;
        record.detail = detail;
        record.duration = duration;
    }

    fn release_dependents(&self, i: usize, remaining: &mut [usize], ready: &mut VecDeque<usize>) {
        for &d in &self.dependents[i] {
            remaining[d] -= 1;
            if remaining[d] == 0 {
                ready.push_back(d);
            }
        }
    }
}

/// Sleep until `at`, or forever when there is no deadline.
async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Kahn's algorithm, preferring declaration order among ready stages.
fn topological_order(deps: &[Vec<usize>], dependents: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..deps.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                queue.push_back(d);
            }
        }
    }

    (order.len() == deps.len()).then_some(order)
}

fn find_cycle(stages: &[Stage], deps: &[Vec<usize>]) -> Vec<StageId> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(
        node: usize,
        deps: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::Active;
        path.push(node);
        for &dep in &deps[node] {
            match marks[dep] {
                Mark::New => {
                    if let Some(cycle) = visit(dep, deps, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Active => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Mark::Done => {}
            }
        }
        path.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::New; deps.len()];
    let mut path = Vec::new();
    for node in 0..deps.len() {
        if marks[node] == Mark::New
            && let Some(cycle) = visit(node, deps, &mut marks, &mut path)
        {
            return cycle.into_iter().map(|i| stages[i].id.clone()).collect();
        }
    }
    Vec::new()
}
