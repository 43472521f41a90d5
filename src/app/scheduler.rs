// app/scheduler.rs
//
// Adaptive concurrency scheduler (C7): picks a SchedulingMode from file
// count and system load, runs the batch under that mode, and in Adaptive
// mode re-samples load and consults a bounded performance history between
// batches to decide whether to switch modes.
//
// Grounded on `app/dir_watcher.rs`'s background-thread idiom: an
// `Arc<AtomicBool>` cancel flag checked on a sub-interval, an mpsc channel
// carrying results back to the calling thread. `rayon` (present in the
// teacher's manifest but unused there) is wired in here for Parallel mode.

use crate::core::model::{PerformanceMetrics, PerformanceRecord, ResourceSample, SchedulingMode};
use crate::util::constants::*;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Select the scheduling mode a plain count/load reading implies. Used both
/// as the initial pick and, in Adaptive mode, re-evaluated every batch.
pub fn select_mode(file_count: usize, load: ResourceSample) -> SchedulingMode {
    let system_load = load.system_load();

    if file_count <= SEQUENTIAL_MAX_LOGS
        || load.memory_usage_fraction >= SEQUENTIAL_LOAD_MEMORY_THRESHOLD
        || load.cpu_usage_fraction >= SEQUENTIAL_LOAD_CPU_THRESHOLD
    {
        return SchedulingMode::Sequential;
    }
    if file_count <= PARALLEL_MAX_LOGS && system_load < PARALLEL_LOAD_THRESHOLD {
        return SchedulingMode::Parallel;
    }
    if file_count >= PRODUCER_CONSUMER_MIN_LOGS && system_load < PRODUCER_CONSUMER_LOAD_THRESHOLD {
        return SchedulingMode::ProducerConsumer;
    }
    SchedulingMode::Adaptive
}

/// Worker count for a mode: hardware-thread count times the mode's
/// multiplier, halved under CPU/memory pressure, clamped to
/// `[MIN_WORKERS, hw_threads * WORKER_HW_THREAD_CAP_MULTIPLIER]`.
pub fn worker_count(mode: SchedulingMode, hw_threads: usize, load: ResourceSample) -> usize {
    let multiplier = match mode {
        SchedulingMode::Sequential => WORKER_MULTIPLIER_SEQUENTIAL,
        SchedulingMode::Parallel => WORKER_MULTIPLIER_PARALLEL,
        SchedulingMode::ProducerConsumer => WORKER_MULTIPLIER_PRODUCER_CONSUMER,
        SchedulingMode::Adaptive => WORKER_MULTIPLIER_ADAPTIVE,
    };
    let mut workers = (hw_threads as f64 * multiplier).round() as usize;

    if load.memory_usage_fraction >= WORKER_PRESSURE_MEMORY_THRESHOLD
        || load.cpu_usage_fraction >= WORKER_PRESSURE_CPU_THRESHOLD
    {
        workers /= 2;
    }

    workers.clamp(MIN_WORKERS, (hw_threads * WORKER_HW_THREAD_CAP_MULTIPLIER).max(MIN_WORKERS))
}

/// Batch size: the requested default, halved or quartered under memory
/// pressure, clamped to `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`.
pub fn batch_size(requested: usize, load: ResourceSample) -> usize {
    let mut size = requested.max(1);
    if load.memory_usage_fraction >= BATCH_QUARTER_MEMORY_THRESHOLD {
        size /= 4;
    } else if load.memory_usage_fraction >= BATCH_HALVE_MEMORY_THRESHOLD {
        size /= 2;
    }
    size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}

/// Read a coarse system-load snapshot. Falls back to a fixed moderate
/// estimate on platforms without `/proc/loadavg` rather than failing --
/// the scheduler only needs a directional signal, not an exact reading.
pub fn sample_system_load(active_workers: usize, total_workers: usize) -> ResourceSample {
    let idle_worker_fraction = if total_workers == 0 {
        1.0
    } else {
        1.0 - (active_workers as f64 / total_workers as f64)
    };
    let (cpu_usage_fraction, memory_usage_fraction) = read_loadavg_fractions();
    ResourceSample {
        cpu_usage_fraction,
        memory_usage_fraction,
        idle_worker_fraction,
    }
}

#[cfg(target_os = "linux")]
fn read_loadavg_fractions() -> (f64, f64) {
    let hw_threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) as f64;
    let cpu = std::fs::read_to_string("/proc/loadavg")
        .ok()
        .and_then(|s| s.split_whitespace().next().map(|s| s.to_string()))
        .and_then(|s| s.parse::<f64>().ok())
        .map(|one_min_load| (one_min_load / hw_threads).clamp(0.0, 1.0))
        .unwrap_or(0.3);
    (cpu, 0.3)
}

#[cfg(not(target_os = "linux"))]
fn read_loadavg_fractions() -> (f64, f64) {
    (0.3, 0.3)
}

/// Cancellation token shared between the caller and a running scheduler.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `worker` over `items` under the scheduling mode implied by
/// `preferred_mode` (or auto-selected from count/load when `None`),
/// returning results in input order alongside the performance metrics
/// accumulated while running.
///
/// Adaptive mode processes `items` in batches of `batch_size_hint`
/// (adjusted for memory pressure), re-selecting the mode for each batch
/// from a freshly sampled load reading and recording a `PerformanceRecord`
/// per batch in a bounded history.
pub fn run<T, R, F>(
    items: Vec<T>,
    preferred_mode: Option<SchedulingMode>,
    batch_size_hint: usize,
    cancel: &CancelToken,
    worker: F,
) -> (Vec<Option<R>>, PerformanceMetrics)
where
    T: Send + Sync,
    R: Send,
    F: Fn(&T) -> R + Send + Sync,
{
    let started = Instant::now();
    let hw_threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let initial_sample = sample_system_load(0, hw_threads);
    let mode = preferred_mode.unwrap_or_else(|| select_mode(items.len(), initial_sample));

    let mut metrics = PerformanceMetrics::default();

    let results = match mode {
        SchedulingMode::Sequential => run_sequential(&items, cancel, &worker),
        SchedulingMode::Parallel => run_parallel(&items, hw_threads, initial_sample, cancel, &worker),
        SchedulingMode::ProducerConsumer => {
            run_producer_consumer(items, hw_threads, initial_sample, cancel, worker)
        }
        SchedulingMode::Adaptive => {
            run_adaptive(items, hw_threads, batch_size_hint, cancel, &worker, &mut metrics)
        }
    };

    metrics.total_duration = started.elapsed();
    metrics.final_mode = Some(mode);
    (results, metrics)
}

fn run_sequential<T, R, F>(items: &[T], cancel: &CancelToken, worker: &F) -> Vec<Option<R>>
where
    F: Fn(&T) -> R,
{
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        if cancel.is_cancelled() {
            results.push(None);
            continue;
        }
        results.push(Some(worker(item)));
    }
    results
}

fn run_parallel<T, R, F>(
    items: &[T],
    hw_threads: usize,
    load: ResourceSample,
    cancel: &CancelToken,
    worker: &F,
) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = worker_count(SchedulingMode::Parallel, hw_threads, load);
    let build = rayon::ThreadPoolBuilder::new().num_threads(workers).build();

    let run_with = |pool: Option<&rayon::ThreadPool>| {
        let compute = || {
            items
                .par_iter()
                .map(|item| {
                    if cancel.is_cancelled() {
                        None
                    } else {
                        Some(worker(item))
                    }
                })
                .collect()
        };
        match pool {
            Some(p) => p.install(compute),
            None => compute(),
        }
    };

    match &build {
        Ok(pool) => run_with(Some(pool)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build a bounded thread pool; using the default pool");
            run_with(None)
        }
    }
}

fn run_producer_consumer<T, R, F>(
    items: Vec<T>,
    hw_threads: usize,
    load: ResourceSample,
    cancel: &CancelToken,
    worker: F,
) -> Vec<Option<R>>
where
    T: Send + Sync,
    R: Send,
    F: Fn(&T) -> R + Send + Sync,
{
    let workers = worker_count(SchedulingMode::ProducerConsumer, hw_threads, load).max(1);
    let total = items.len();
    let items = Arc::new(items);
    let next_index = Arc::new(AtomicUsize::new(0));
    let results: Arc<Mutex<Vec<Option<R>>>> = Arc::new(Mutex::new((0..total).map(|_| None).collect()));
    let worker = Arc::new(worker);

    std::thread::scope(|scope| {
        for _ in 0..workers.min(total.max(1)) {
            let items = Arc::clone(&items);
            let next_index = Arc::clone(&next_index);
            let results = Arc::clone(&results);
            let worker = Arc::clone(&worker);
            scope.spawn(move || loop {
                if cancel.is_cancelled() {
                    return;
                }
                let idx = next_index.fetch_add(1, Ordering::Relaxed);
                if idx >= items.len() {
                    return;
                }
                let outcome = worker(&items[idx]);
                results.lock().expect("producer-consumer results lock poisoned")[idx] = Some(outcome);
            });
        }
    });

    // `thread::scope` joins every spawned worker before returning, so no
    // other clone of `results` is still alive here.
    Arc::into_inner(results)
        .expect("all producer-consumer workers have joined")
        .into_inner()
        .expect("producer-consumer results lock poisoned")
}

/// A history record is "similar" to the current conditions when its
/// file-count is within 30%, its memory reading within 20 percentage
/// points, and its system load within 0.3 of the values passed in.
fn is_similar(record: &PerformanceRecord, file_count: usize, memory_usage_fraction: f64, system_load: f64) -> bool {
    let count_tolerance = (file_count as f64 * HISTORY_FILE_COUNT_BAND).max(1.0);
    let count_diff = (record.file_count as f64 - file_count as f64).abs();
    count_diff <= count_tolerance
        && (record.memory_usage_fraction - memory_usage_fraction).abs() <= HISTORY_MEMORY_BAND_PP
        && (record.system_load - system_load).abs() <= HISTORY_LOAD_BAND
}

/// Find the best-observed mode among history records similar to the current
/// conditions, and the confidence that mode is actually better: the share of
/// similar records it accounts for, weighted by its average efficiency.
/// Returns `None` when there is no similar history to consult.
fn consult_history(
    history: &VecDeque<PerformanceRecord>,
    file_count: usize,
    memory_usage_fraction: f64,
    system_load: f64,
) -> Option<(SchedulingMode, f64)> {
    let similar: Vec<&PerformanceRecord> = history
        .iter()
        .filter(|r| is_similar(r, file_count, memory_usage_fraction, system_load))
        .collect();
    if similar.is_empty() {
        return None;
    }

    let modes = [
        SchedulingMode::Sequential,
        SchedulingMode::Parallel,
        SchedulingMode::ProducerConsumer,
        SchedulingMode::Adaptive,
    ];

    let mut best_mode = None;
    let mut best_avg_efficiency = -1.0;
    let mut best_count = 0usize;
    for mode in modes {
        let records: Vec<&&PerformanceRecord> = similar.iter().filter(|r| r.mode == mode).collect();
        if records.is_empty() {
            continue;
        }
        let avg_efficiency = records.iter().map(|r| r.efficiency).sum::<f64>() / records.len() as f64;
        if avg_efficiency > best_avg_efficiency {
            best_avg_efficiency = avg_efficiency;
            best_mode = Some(mode);
            best_count = records.len();
        }
    }

    let best_mode = best_mode?;
    let confidence = (best_count as f64 / similar.len() as f64) * (best_avg_efficiency / 100.0).clamp(0.0, 1.0);
    Some((best_mode, confidence))
}

fn run_adaptive<T, R, F>(
    items: Vec<T>,
    hw_threads: usize,
    batch_size_hint: usize,
    cancel: &CancelToken,
    worker: &F,
    metrics: &mut PerformanceMetrics,
) -> Vec<Option<R>>
where
    T: Send + Sync,
    R: Send,
    F: Fn(&T) -> R + Send + Sync,
{
    let mut history: VecDeque<PerformanceRecord> = VecDeque::with_capacity(PERFORMANCE_HISTORY_SIZE);
    let mut results = Vec::with_capacity(items.len());
    let mut current_mode: Option<SchedulingMode> = None;
    let mut forced_next_mode: Option<SchedulingMode> = None;
    let total = items.len();
    let mut items = items;

    while !items.is_empty() && !cancel.is_cancelled() {
        let sample = sample_system_load(0, hw_threads.max(1));
        let batch_len = batch_size(batch_size_hint, sample).min(items.len()).max(1);
        let batch: Vec<T> = items.splice(0..batch_len, std::iter::empty()).collect();
        let remaining_plus_batch = items.len() + batch.len();
        let mode = forced_next_mode.take().unwrap_or_else(|| select_mode(remaining_plus_batch, sample));

        if let Some(prev) = current_mode {
            if prev != mode {
                metrics.mode_switches += 1;
            }
        }
        current_mode = Some(mode);

        let batch_started = Instant::now();
        let batch_results = match mode {
            SchedulingMode::Sequential => run_sequential(&batch, cancel, worker),
            SchedulingMode::Parallel => run_parallel(&batch, hw_threads, sample, cancel, worker),
            SchedulingMode::ProducerConsumer => {
                run_producer_consumer(batch, hw_threads, sample, cancel, worker)
            }
            SchedulingMode::Adaptive => run_sequential(&batch, cancel, worker),
        };
        let elapsed = batch_started.elapsed().as_secs_f64().max(0.001);
        let completed = batch_results.iter().filter(|r| r.is_some()).count();
        let efficiency = (completed as f64 / elapsed).min(total.max(1) as f64) / total.max(1) as f64 * 100.0;

        if history.len() >= PERFORMANCE_HISTORY_SIZE {
            history.pop_front();
        }
        history.push_back(PerformanceRecord {
            mode,
            file_count: batch_results.len(),
            memory_usage_fraction: sample.memory_usage_fraction,
            system_load: sample.system_load(),
            efficiency,
        });

        if efficiency < ADAPTIVE_EFFICIENCY_THRESHOLD {
            if let Some((best_mode, confidence)) =
                consult_history(&history, remaining_plus_batch, sample.memory_usage_fraction, sample.system_load())
            {
                if confidence >= ADAPTIVE_SWITCH_CONFIDENCE && best_mode != mode {
                    forced_next_mode = Some(best_mode);
                }
            }
        }

        results.extend(batch_results);
    }

    // Any items left unprocessed because of cancellation still need a slot.
    while results.len() < total {
        results.push(None);
    }

    results
}
