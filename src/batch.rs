//! Chunked, order-preserving batch processing.
//!
//! Input is cut into fixed-size batches; every batch is one unit of work on
//! a bounded pool.  Items carry their input index through the pool and the
//! gathered results are sorted on it, so output order always matches input
//! order even though batches finish out of order.
//!
//! Two pool flavours:
//!
//! | Mode                         | Pool                                          |
//! |------------------------------|-----------------------------------------------|
//! | [`ParallelMode::Threads`]      | scoped OS threads pulling from a shared queue |
//! | [`ParallelMode::WorkStealing`] | rayon pool, once input exceeds the threshold  |

use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, Mutex,
    },
    time::Instant,
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    config::{BatchConfig, ParallelMode},
    processor::{panic_message, BatchOptions, ProcessedTextResult, TextProcessor},
};

/// `(processed_count, total_count)`, called after each finished batch.
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

type Indexed = Vec<(usize, ProcessedTextResult)>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_items: usize,
    pub processed_items: usize,
    pub error_count: usize,
    /// Seconds spent in the last run.
    pub processing_time: f64,
    pub completion_percentage: f64,
    pub items_per_second: f64,
}

pub struct BatchProcessor {
    processor: Arc<TextProcessor>,
    config: BatchConfig,
    progress: Option<ProgressCallback>,
    stats: Mutex<BatchStats>,
}

impl BatchProcessor {
    pub fn new(processor: Arc<TextProcessor>, config: BatchConfig) -> Self {
        Self { processor, config, progress: None, stats: Mutex::new(BatchStats::default()) }
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
    }

    pub fn processor(&self) -> &Arc<TextProcessor> {
        &self.processor
    }

    fn stats_mut(&self) -> std::sync::MutexGuard<'_, BatchStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Process `texts` through [`TextProcessor::process_single`].
    pub fn process_texts(&self, texts: &[String], opts: &BatchOptions) -> Vec<ProcessedTextResult> {
        let processor = Arc::clone(&self.processor);
        self.process_with(texts, move |text| processor.process_single(text, opts))
    }

    /// Run `work` over every text.  A panic in `work` becomes that item's
    /// `error` entry; a panic escaping a whole batch marks all its items.
    pub fn process_with<F>(&self, texts: &[String], work: F) -> Vec<ProcessedTextResult>
    where
        F: Fn(&str) -> ProcessedTextResult + Sync,
    {
        {
            let mut stats = self.stats_mut();
            *stats = BatchStats { total_items: texts.len(), ..BatchStats::default() };
        }
        if texts.is_empty() {
            return Vec::new();
        }

        let started = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let batches: Vec<(usize, &[String])> = texts
            .chunks(batch_size)
            .enumerate()
            .map(|(i, chunk)| (i * batch_size, chunk))
            .collect();

        let work_stealing = self.config.parallel_mode == ParallelMode::WorkStealing
            && texts.len() > self.config.work_stealing_threshold;
        debug!(
            items = texts.len(),
            batches = batches.len(),
            work_stealing,
            "starting batch run"
        );

        let mut gathered = if work_stealing {
            self.run_work_stealing(&batches, texts.len(), &work)
        } else {
            self.run_threads(batches, texts.len(), &work)
        };
        gathered.sort_by_key(|(index, _)| *index);

        let mut stats = self.stats_mut();
        stats.processing_time = started.elapsed().as_secs_f64();
        gathered.into_iter().map(|(_, result)| result).collect()
    }

    /// One batch; always yields exactly one entry per item.
    fn run_batch<F>(&self, start: usize, batch: &[String], work: &F) -> Indexed
    where
        F: Fn(&str) -> ProcessedTextResult + Sync,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            batch
                .iter()
                .enumerate()
                .map(|(offset, text)| {
                    let result = match panic::catch_unwind(AssertUnwindSafe(|| work(text))) {
                        Ok(result) => result,
                        Err(payload) => {
                            let msg = panic_message(payload.as_ref());
                            warn!(index = start + offset, error = %msg, "item failed");
                            ProcessedTextResult::failed(text, msg)
                        }
                    };
                    (start + offset, result)
                })
                .collect::<Indexed>()
        }));

        match outcome {
            Ok(results) => results,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(start, size = batch.len(), error = %msg, "batch failed");
                batch
                    .iter()
                    .enumerate()
                    .map(|(offset, text)| (start + offset, ProcessedTextResult::failed(text, msg.clone())))
                    .collect()
            }
        }
    }

    /// Book-keeping after a batch completes.
    fn record(&self, results: &Indexed, done: usize, total: usize) {
        {
            let mut stats = self.stats_mut();
            stats.processed_items = done;
            stats.error_count += results.iter().filter(|(_, r)| r.error.is_some()).count();
        }
        if let Some(callback) = &self.progress {
            callback(done, total);
        }
    }

    fn run_threads<F>(&self, batches: Vec<(usize, &[String])>, total: usize, work: &F) -> Indexed
    where
        F: Fn(&str) -> ProcessedTextResult + Sync,
    {
        let workers = self.config.max_workers.max(1).min(batches.len());
        let queue = Mutex::new(VecDeque::from(batches));
        let (tx, rx) = mpsc::channel::<Indexed>();
        let mut gathered = Vec::with_capacity(total);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || loop {
                    let next = queue.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
                    let Some((start, batch)) = next else { break };
                    if tx.send(self.run_batch(start, batch, work)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            // as completed
            for results in rx {
                let done = gathered.len() + results.len();
                self.record(&results, done, total);
                gathered.extend(results);
            }
        });
        gathered
    }

    fn run_work_stealing<F>(&self, batches: &[(usize, &[String])], total: usize, work: &F) -> Indexed
    where
        F: Fn(&str) -> ProcessedTextResult + Sync,
    {
        let done = AtomicUsize::new(0);
        let run = || -> Indexed {
            batches
                .par_iter()
                .flat_map_iter(|&(start, batch)| {
                    let results = self.run_batch(start, batch, work);
                    let now = done.fetch_add(results.len(), Ordering::SeqCst) + results.len();
                    self.record(&results, now, total);
                    results
                })
                .collect()
        };

        match rayon::ThreadPoolBuilder::new().num_threads(self.config.max_workers.max(1)).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(error = %e, "work-stealing pool unavailable; using the global pool");
                run()
            }
        }
    }

    /// Counters of the last run plus completion percentage and throughput.
    pub fn get_stats(&self) -> BatchStats {
        let mut stats = self.stats_mut().clone();
        stats.completion_percentage = if stats.total_items > 0 {
            stats.processed_items as f64 / stats.total_items as f64 * 100.0
        } else {
            0.0
        };
        stats.items_per_second = if stats.processing_time > 0.0 && stats.processed_items > 0 {
            stats.processed_items as f64 / stats.processing_time
        } else {
            0.0
        };
        stats
    }

    /// Process the `text_key` field of each tweet object.
    ///
    /// With `add_results` each tweet is returned with its result (minus
    /// `original`) under `processed_text`; otherwise the bare results are
    /// returned.  A missing or non-string field counts as empty text.
    pub fn process_tweets(
        &self,
        tweets: &[Value],
        text_key: &str,
        opts: &BatchOptions,
        add_results: bool,
    ) -> Vec<Value> {
        if tweets.is_empty() {
            return Vec::new();
        }
        let texts: Vec<String> = tweets
            .iter()
            .map(|t| t.get(text_key).and_then(Value::as_str).unwrap_or_default().to_string())
            .collect();
        let results = self.process_texts(&texts, opts);

        let as_value = |r: &ProcessedTextResult| serde_json::to_value(r).unwrap_or(Value::Null);
        if !add_results {
            return results.iter().map(as_value).collect();
        }

        tweets
            .iter()
            .zip(&results)
            .map(|(tweet, result)| {
                let mut tweet = tweet.clone();
                let mut attached = as_value(result);
                if let Some(map) = attached.as_object_mut() {
                    map.remove("original");
                }
                if let Some(obj) = tweet.as_object_mut() {
                    obj.insert("processed_text".to_string(), attached);
                }
                tweet
            })
            .collect()
    }
}
