//! Inference Engine Pool
//!
//! Serves concurrent scoring requests against one immutable model. Engines
//! are not safe for concurrent use, so each request checks one out:
//! - A semaphore bounds the number of engines checked out at once
//! - Idle engines wait on a free list and are reused, never discarded
//! - Engines are built lazily, only when the free list is empty
//!
//! A checked-out engine is wrapped in a [`PooledEngine`] guard that returns
//! it to the free list when dropped, on success, error and panic paths alike.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use super::model::{ScoringEngine, TrainedModel};
use super::preprocess::PixelBuffer;
use crate::config::InferenceConfig;
use crate::error::{ClassifyError, Result};
use crate::utils::math::argmax;

/// Pool sizing and waiting policy
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum engines checked out at once, and so the most ever built
    pub max_engines: usize,
    /// How long `acquire` waits for a free engine; `None` waits indefinitely
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_engines: 4,
            acquire_timeout: None,
        }
    }
}

impl From<&InferenceConfig> for PoolConfig {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            max_engines: config.max_engines.max(1),
            acquire_timeout: config.acquire_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub max_engines: usize,
    pub engines_created: usize,
    pub idle: usize,
    pub in_use: usize,
    pub acquires: u64,
    pub acquire_timeouts: u64,
}

/// Outcome of one pooled prediction
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// Per-class probabilities indexed by label key
    pub scores: Vec<f32>,
    pub predicted_key: u32,
    pub predicted_label: String,
    pub score: f32,
    pub latency: Duration,
}

struct PoolInner<M: TrainedModel> {
    model: Arc<M>,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<M::Engine>>,
    engines_created: AtomicUsize,
    acquires: AtomicU64,
    acquire_timeouts: AtomicU64,
    closed: AtomicBool,
}

impl<M: TrainedModel> PoolInner<M> {
    fn release(&self, engine: M::Engine) {
        self.idle.lock().push(engine);
    }
}

/// Bounded pool of scoring engines bound to one model
pub struct EnginePool<M: TrainedModel> {
    inner: Arc<PoolInner<M>>,
}

impl<M: TrainedModel> Clone for EnginePool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: TrainedModel> EnginePool<M> {
    /// Create a pool; no engine is built until the first acquire
    pub fn new(model: Arc<M>, config: PoolConfig) -> Self {
        let max_engines = config.max_engines.max(1);
        Self {
            inner: Arc::new(PoolInner {
                model,
                config: PoolConfig {
                    max_engines,
                    ..config
                },
                semaphore: Arc::new(Semaphore::new(max_engines)),
                idle: Mutex::new(Vec::with_capacity(max_engines)),
                engines_created: AtomicUsize::new(0),
                acquires: AtomicU64::new(0),
                acquire_timeouts: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn model(&self) -> &Arc<M> {
        &self.inner.model
    }

    /// Check out an engine, waiting while all engines are in use.
    ///
    /// Fails with [`ClassifyError::PoolTimeout`] when the configured timeout
    /// elapses first.
    pub async fn acquire(&self) -> Result<PooledEngine<M>> {
        self.acquire_with_timeout(self.inner.config.acquire_timeout).await
    }

    /// Like [`acquire`](Self::acquire) with a caller-supplied deadline
    pub async fn acquire_with_timeout(&self, timeout: Option<Duration>) -> Result<PooledEngine<M>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ClassifyError::PoolClosed);
        }

        let permit_fut = Arc::clone(&self.inner.semaphore).acquire_owned();
        let permit = match timeout {
            Some(limit) => match tokio::time::timeout(limit, permit_fut).await {
                Ok(permit) => permit,
                Err(_) => {
                    self.inner.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                    return Err(ClassifyError::PoolTimeout(limit));
                }
            },
            None => permit_fut.await,
        }
        .map_err(|_| ClassifyError::PoolClosed)?;

        let engine = self.take_or_create()?;
        self.inner.acquires.fetch_add(1, Ordering::Relaxed);

        Ok(PooledEngine {
            engine: Some(engine),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Pop an idle engine or build one. Caller must hold a permit, which keeps
    /// the number of engines at or below `max_engines`.
    fn take_or_create(&self) -> Result<M::Engine> {
        if let Some(engine) = self.inner.idle.lock().pop() {
            debug!("Reusing pooled engine");
            return Ok(engine);
        }

        let start = Instant::now();
        let engine = self.inner.model.create_engine()?;
        let total = self.inner.engines_created.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Created inference engine {}/{} in {:?}",
            total,
            self.inner.config.max_engines,
            start.elapsed()
        );
        Ok(engine)
    }

    /// Score one preprocessed image and map the best key back to its label.
    ///
    /// Scoring runs on the blocking thread pool with the engine guard moved
    /// into the task, so the engine is returned however the call ends.
    pub async fn predict(&self, input: PixelBuffer) -> Result<PredictionResult> {
        let start = Instant::now();
        let mut engine = self.acquire().await?;
        let model = Arc::clone(&self.inner.model);

        let (scores, best) = tokio::task::spawn_blocking(move || -> Result<_> {
            let scores = engine.score(&input)?;
            drop(engine);
            let best = argmax(&scores).ok_or_else(|| ClassifyError::model("model returned no scores"))?;
            Ok((scores, best))
        })
        .await
        .map_err(|e| ClassifyError::model(format!("scoring task failed: {}", e)))??;

        let (index, score) = best;
        let predicted_key = index as u32;
        let predicted_label = model.schema().labels.to_label(predicted_key)?.to_string();

        Ok(PredictionResult {
            scores,
            predicted_key,
            predicted_label,
            score,
            latency: start.elapsed(),
        })
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.inner.idle.lock().len();
        let max_engines = self.inner.config.max_engines;
        PoolStats {
            max_engines,
            engines_created: self.inner.engines_created.load(Ordering::Relaxed),
            idle,
            in_use: max_engines - self.inner.semaphore.available_permits(),
            acquires: self.inner.acquires.load(Ordering::Relaxed),
            acquire_timeouts: self.inner.acquire_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Stop handing out engines; waiters fail with [`ClassifyError::PoolClosed`]
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            info!("Inference engine pool shutting down");
            self.inner.semaphore.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Scoped engine checkout; returns the engine to the pool on drop
pub struct PooledEngine<M: TrainedModel> {
    engine: Option<M::Engine>,
    pool: Arc<PoolInner<M>>,
    // Dropped after `Drop::drop` has pushed the engine back
    _permit: OwnedSemaphorePermit,
}

impl<M: TrainedModel> Deref for PooledEngine<M> {
    type Target = M::Engine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref().expect("engine present until drop")
    }
}

impl<M: TrainedModel> DerefMut for PooledEngine<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine.as_mut().expect("engine present until drop")
    }
}

impl<M: TrainedModel> Drop for PooledEngine<M> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.release(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ImageFormat, KeyOrdinality, LabelKeyMapper};
    use crate::engine::model::ModelSchema;
    use std::collections::HashSet;

    /// One-hot on the class whose index equals the first pixel modulo the class count
    struct EchoModel {
        schema: ModelSchema,
        constructed: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    struct EchoEngine {
        id: usize,
        classes: usize,
        busy: bool,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl EchoModel {
        fn new(classes: usize) -> Self {
            let labels: Vec<String> = (0..classes).map(|i| format!("class-{}", i)).collect();
            Self {
                schema: ModelSchema {
                    input_width: 1,
                    input_height: 1,
                    channels: 1,
                    labels: LabelKeyMapper::build(labels, KeyOrdinality::ByOccurrence),
                },
                constructed: Arc::new(AtomicUsize::new(0)),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl TrainedModel for EchoModel {
        type Engine = EchoEngine;

        fn schema(&self) -> &ModelSchema {
            &self.schema
        }

        fn create_engine(&self) -> Result<EchoEngine> {
            let id = self.constructed.fetch_add(1, Ordering::SeqCst);
            Ok(EchoEngine {
                id,
                classes: self.schema.num_classes(),
                busy: false,
                in_flight: Arc::clone(&self.in_flight),
                max_in_flight: Arc::clone(&self.max_in_flight),
            })
        }
    }

    impl ScoringEngine for EchoEngine {
        fn score(&mut self, input: &PixelBuffer) -> Result<Vec<f32>> {
            assert!(!self.busy, "engine used concurrently");
            self.busy = true;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));

            let value = input.pixels()[0];
            let result = if value == 255 {
                Err(ClassifyError::UnsupportedFormat(ImageFormat::Unknown))
            } else {
                let mut scores = vec![0.0; self.classes];
                scores[value as usize % self.classes] = 1.0;
                Ok(scores)
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.busy = false;
            result
        }
    }

    fn pixel(value: u8) -> PixelBuffer {
        PixelBuffer::new(1, 1, 1, vec![value]).unwrap()
    }

    fn pool(max_engines: usize, timeout: Option<Duration>) -> EnginePool<EchoModel> {
        EnginePool::new(
            Arc::new(EchoModel::new(10)),
            PoolConfig {
                max_engines,
                acquire_timeout: timeout,
            },
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_predictions_are_bounded() {
        let pool = pool(4, None);

        let handles: Vec<_> = (0..50u8)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { (i, pool.predict(pixel(i)).await) })
            })
            .collect();

        for handle in handles {
            let (i, result) = handle.await.unwrap();
            let result = result.unwrap();
            let expected = (i % 10) as u32;
            assert_eq!(result.predicted_key, expected);
            assert_eq!(result.predicted_label, format!("class-{}", expected));
            assert_eq!(result.score, 1.0);
        }

        let model = pool.model();
        assert!(model.constructed.load(Ordering::SeqCst) <= 4);
        assert!(model.max_in_flight.load(Ordering::SeqCst) <= 4);

        let stats = pool.stats();
        assert_eq!(stats.acquires, 50);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.idle, stats.engines_created);
    }

    #[tokio::test]
    async fn test_engine_returns_after_error() {
        let pool = pool(1, Some(Duration::from_millis(200)));

        let err = pool.predict(pixel(255)).await.unwrap_err();
        assert!(matches!(err, ClassifyError::UnsupportedFormat(_)));

        let engine = pool.acquire().await.unwrap();
        assert_eq!(engine.id, 0);
        drop(engine);

        let ok = pool.predict(pixel(3)).await.unwrap();
        assert_eq!(ok.predicted_key, 3);
        assert_eq!(pool.stats().engines_created, 1);
    }

    #[tokio::test]
    async fn test_engines_are_reused() {
        let pool = pool(2, None);
        let mut ids = HashSet::new();
        for _ in 0..5 {
            let engine = pool.acquire().await.unwrap();
            ids.insert(engine.id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(pool.stats().engines_created, 1);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let pool = pool(1, None);
        let held = pool.acquire().await.unwrap();

        let err = pool
            .acquire_with_timeout(Some(Duration::from_millis(20)))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClassifyError::PoolTimeout(_)));
        assert_eq!(pool.stats().acquire_timeouts, 1);

        drop(held);
        assert!(pool.acquire_with_timeout(Some(Duration::from_millis(20))).await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let pool = pool(1, None);
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.predict(pixel(7)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result.predicted_key, 7);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_acquire() {
        let pool = pool(2, None);
        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire().await.err(), Some(ClassifyError::PoolClosed)));
    }

    #[test]
    fn test_pool_config_from_inference_config() {
        let config = InferenceConfig {
            max_engines: 0,
            acquire_timeout_ms: Some(250),
            device: "CPU".into(),
        };
        let pool_config = PoolConfig::from(&config);
        assert_eq!(pool_config.max_engines, 1);
        assert_eq!(pool_config.acquire_timeout, Some(Duration::from_millis(250)));
    }
}
