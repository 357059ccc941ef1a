//! Sequential batch crop generation.
//!
//! A batch walks the requested images in order, regenerating only the ones
//! whose cached result is absent, and reports progress through a tracked
//! task. Generation is sequential: surfaces are interactive resources and
//! hammering them in parallel starves the UI they also serve.
//!
//! A failing image does not stop the batch; it is recorded and the walk
//! continues. What the final task status says about recorded failures is
//! the [`FailurePolicy`]'s call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument, warn};

use cropdeck_core::CropConfig;

use crate::cache::CropResultCache;
use crate::events::EngineEvent;
use crate::images::ImageId;
use crate::state::EngineState;
use crate::sync::mutex_lock;
use crate::task::{Task, TaskStatus, TaskTracker};

/// How a finished batch translates per-image failures into a task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The batch completes; failed images are simply missing from the
    /// results.
    #[default]
    CompleteWithFailures,
    /// Any failed image marks the whole task failed.
    FailOnAnyFailure,
}

impl FailurePolicy {
    fn final_status(self, failed: usize) -> TaskStatus {
        match self {
            FailurePolicy::CompleteWithFailures => TaskStatus::Completed,
            FailurePolicy::FailOnAnyFailure if failed > 0 => TaskStatus::Failed,
            FailurePolicy::FailOnAnyFailure => TaskStatus::Completed,
        }
    }
}

/// Snapshot of an in-flight batch.
#[derive(Debug, Clone)]
pub struct BatchState {
    /// Crop configurations captured when the batch started.
    pub configs: HashMap<ImageId, CropConfig>,
    pub completed: Vec<ImageId>,
    pub failed: Vec<ImageId>,
    /// Set by [`BatchOrchestrator::cancel`]; the walk stops before the next
    /// image once this is observed.
    pub cancelled: bool,
}

/// Outcome of a finished batch run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub task: Task,
    pub completed: Vec<ImageId>,
    pub failed: Vec<ImageId>,
    pub cancelled: bool,
}

/// Drives batch crop generation over the result cache.
pub struct BatchOrchestrator {
    state: Arc<EngineState>,
    cache: Arc<CropResultCache>,
    tracker: Arc<TaskTracker>,
    policy: FailurePolicy,
    current: Mutex<Option<BatchState>>,
}

impl BatchOrchestrator {
    pub fn new(
        state: Arc<EngineState>,
        cache: Arc<CropResultCache>,
        tracker: Arc<TaskTracker>,
        policy: FailurePolicy,
    ) -> Self {
        BatchOrchestrator {
            state,
            cache,
            tracker,
            policy,
            current: Mutex::new(None),
        }
    }

    /// Generate crops for every image in `images` whose result is not
    /// already cached, in order.
    ///
    /// Progress is `round(100 * attempted / pending)` where failed attempts
    /// count as attempted. When everything is already cached the task jumps
    /// straight to completed and no results reveal is announced.
    #[instrument(skip(self, images), fields(requested = images.len()))]
    pub async fn crop_all(&self, images: &[ImageId]) -> BatchOutcome {
        let pending: Vec<ImageId> = images
            .iter()
            .copied()
            .filter(|id| !self.cache.contains(*id))
            .collect();

        let task = self.tracker.create_task();

        if pending.is_empty() {
            info!("every crop already cached, nothing to generate");
            self.tracker.update_task(task.id, 100, TaskStatus::Completed);
            return BatchOutcome {
                task: self.tracker.task(task.id).unwrap_or(task),
                completed: Vec::new(),
                failed: Vec::new(),
                cancelled: false,
            };
        }

        *mutex_lock(&self.current) = Some(BatchState {
            configs: self.state.configs.snapshot(&pending),
            completed: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
        });
        self.tracker.update_task(task.id, 0, TaskStatus::InProgress);

        let total = pending.len();
        let mut attempted = 0usize;
        let mut cancelled = false;

        for id in pending {
            let cancel_requested = mutex_lock(&self.current)
                .as_ref()
                .is_none_or(|batch| batch.cancelled);
            if cancel_requested {
                info!("batch cancelled, stopping before remaining images");
                cancelled = true;
                break;
            }

            let request = self.state.settings.raster_request_for(id);
            match self.cache.get(id, &request).await {
                Ok(Some(_)) => {
                    debug!(image = %id, "crop generated");
                    self.record(id, true);
                }
                Ok(None) => {
                    warn!(image = %id, "no surface bound, crop skipped");
                    self.record(id, false);
                }
                Err(error) => {
                    warn!(image = %id, %error, "crop generation failed, continuing");
                    self.record(id, false);
                }
            }

            attempted += 1;
            let progress = ((attempted * 100) as f64 / total as f64).round() as u8;
            self.tracker.update_task(task.id, progress, TaskStatus::InProgress);
        }

        let (completed, failed) = match mutex_lock(&self.current).take() {
            Some(batch) => (batch.completed, batch.failed),
            None => (Vec::new(), Vec::new()),
        };

        if cancelled {
            // A cancelled batch keeps the progress it reached and never
            // reveals partial results.
            let progress = ((attempted * 100) as f64 / total as f64).round() as u8;
            self.tracker
                .update_task(task.id, progress, self.policy.final_status(failed.len()));
        } else {
            self.tracker
                .update_task(task.id, 100, self.policy.final_status(failed.len()));
            self.state.events.emit(EngineEvent::RevealResults);
        }

        info!(
            completed = completed.len(),
            failed = failed.len(),
            cancelled,
            "batch finished"
        );

        BatchOutcome {
            task: self.tracker.task(task.id).unwrap_or(task),
            completed,
            failed,
            cancelled,
        }
    }

    /// Cancel the in-flight batch, if any. Already-generated results stay
    /// cached and already-recorded outcomes are kept; no further images are
    /// started.
    pub fn cancel(&self) {
        if let Some(batch) = mutex_lock(&self.current).as_mut() {
            batch.cancelled = true;
            info!("batch cancel requested");
        }
    }

    /// Snapshot of the in-flight batch for observers.
    pub fn batch_state(&self) -> Option<BatchState> {
        mutex_lock(&self.current).clone()
    }

    fn record(&self, id: ImageId, succeeded: bool) {
        if let Some(batch) = mutex_lock(&self.current).as_mut() {
            if succeeded {
                batch.completed.push(id);
            } else {
                batch.failed.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::surface::RasterRequest;
    use crate::testing::{MockHandle, MockSurface};

    struct Fixture {
        state: Arc<EngineState>,
        cache: Arc<CropResultCache>,
        orchestrator: BatchOrchestrator,
    }

    fn fixture(policy: FailurePolicy) -> Fixture {
        let state = EngineState::new();
        let cache = Arc::new(CropResultCache::new(Arc::clone(&state)));
        let tracker = Arc::new(TaskTracker::new(state.events.clone()));
        let orchestrator = BatchOrchestrator::new(
            Arc::clone(&state),
            Arc::clone(&cache),
            tracker,
            policy,
        );
        Fixture {
            state,
            cache,
            orchestrator,
        }
    }

    fn add_image(fixture: &Fixture) -> (ImageId, MockHandle) {
        let id = fixture.state.images.add("photo.jpg");
        let (mock, handle) = MockSurface::new();
        fixture.state.surfaces.register(id, mock.shared());
        (id, handle)
    }

    #[tokio::test]
    async fn test_batch_generates_all_uncached() {
        let fixture = fixture(FailurePolicy::default());
        let ids: Vec<ImageId> = (0..4).map(|_| add_image(&fixture).0).collect();

        let outcome = fixture.orchestrator.crop_all(&ids).await;

        assert_eq!(outcome.task.status, TaskStatus::Completed);
        assert_eq!(outcome.task.progress, 100);
        assert_eq!(outcome.completed, ids);
        assert!(outcome.failed.is_empty());
        assert_eq!(fixture.cache.len(), 4);
    }

    #[tokio::test]
    async fn test_batch_skips_cached_entries() {
        let fixture = fixture(FailurePolicy::default());
        let (cached_id, cached_handle) = add_image(&fixture);
        let (fresh_id, fresh_handle) = add_image(&fixture);

        fixture
            .cache
            .get(cached_id, &RasterRequest::default())
            .await
            .unwrap();
        assert_eq!(cached_handle.lock().unwrap().raster_calls, 1);

        let outcome = fixture.orchestrator.crop_all(&[cached_id, fresh_id]).await;

        // N images with one cached: only N-1 rasterizations happen.
        assert_eq!(cached_handle.lock().unwrap().raster_calls, 1);
        assert_eq!(fresh_handle.lock().unwrap().raster_calls, 1);
        assert_eq!(outcome.completed, vec![fresh_id]);
    }

    #[tokio::test]
    async fn test_fully_cached_batch_completes_without_reveal() {
        let fixture = fixture(FailurePolicy::default());
        let (id, _) = add_image(&fixture);
        fixture.cache.get(id, &RasterRequest::default()).await.unwrap();

        let mut rx = fixture.state.events.subscribe();
        let outcome = fixture.orchestrator.crop_all(&[id]).await;

        assert_eq!(outcome.task.status, TaskStatus::Completed);
        assert_eq!(outcome.task.progress, 100);
        assert!(outcome.completed.is_empty());

        // Only task events; no RevealResults announcement.
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, EngineEvent::TaskProgress { .. }));
        }
    }

    #[tokio::test]
    async fn test_failed_image_does_not_stop_batch() {
        let fixture = fixture(FailurePolicy::default());
        let (good_a, _) = add_image(&fixture);
        let (bad, bad_handle) = add_image(&fixture);
        let (good_b, _) = add_image(&fixture);
        bad_handle.lock().unwrap().fail_rasterize = true;

        let outcome = fixture.orchestrator.crop_all(&[good_a, bad, good_b]).await;

        assert_eq!(outcome.completed, vec![good_a, good_b]);
        assert_eq!(outcome.failed, vec![bad]);
        assert_eq!(outcome.task.status, TaskStatus::Completed);
        assert_eq!(outcome.task.progress, 100);
        assert_eq!(fixture.cache.len(), 2);
    }

    #[tokio::test]
    async fn test_fail_on_any_failure_policy() {
        let fixture = fixture(FailurePolicy::FailOnAnyFailure);
        let (good, _) = add_image(&fixture);
        let (bad, bad_handle) = add_image(&fixture);
        bad_handle.lock().unwrap().fail_rasterize = true;

        let outcome = fixture.orchestrator.crop_all(&[good, bad]).await;
        assert_eq!(outcome.task.status, TaskStatus::Failed);
        assert_eq!(outcome.failed, vec![bad]);
    }

    #[tokio::test]
    async fn test_unbound_image_counts_as_failed() {
        let fixture = fixture(FailurePolicy::default());
        let unbound = fixture.state.images.add("ghost.jpg");
        let (bound, _) = add_image(&fixture);

        let outcome = fixture.orchestrator.crop_all(&[unbound, bound]).await;
        assert_eq!(outcome.failed, vec![unbound]);
        assert_eq!(outcome.completed, vec![bound]);
    }

    #[tokio::test]
    async fn test_progress_is_rounded_percentage() {
        let fixture = fixture(FailurePolicy::default());
        let ids: Vec<ImageId> = (0..3).map(|_| add_image(&fixture).0).collect();

        let mut rx = fixture.state.events.subscribe();
        fixture.orchestrator.crop_all(&ids).await;

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::TaskProgress {
                progress,
                status: TaskStatus::InProgress,
                ..
            } = event
            {
                seen.push(progress);
            }
        }
        // 1/3, 2/3, 3/3 rounded.
        assert_eq!(seen, vec![0, 33, 67, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_remaining_images() {
        let fixture = fixture(FailurePolicy::default());
        let (first, first_handle) = add_image(&fixture);
        let (second, second_handle) = add_image(&fixture);
        first_handle.lock().unwrap().raster_delay = std::time::Duration::from_millis(50);

        let orchestrator = Arc::new(fixture.orchestrator);
        let run = {
            let orchestrator = Arc::clone(&orchestrator);
            let ids = vec![first, second];
            tokio::spawn(async move { orchestrator.crop_all(&ids).await })
        };

        // Cancel while the first image is still rasterizing.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        orchestrator.cancel();

        let outcome = run.await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(first_handle.lock().unwrap().raster_calls, 1);
        assert_eq!(second_handle.lock().unwrap().raster_calls, 0);
        assert!(outcome.task.progress < 100);
        // The in-flight image ran to completion and stays recorded.
        assert_eq!(outcome.completed, vec![first]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_batch_keeps_recorded_failures() {
        let fixture = fixture(FailurePolicy::FailOnAnyFailure);
        let (bad, bad_handle) = add_image(&fixture);
        let (slow, slow_handle) = add_image(&fixture);
        let (never, never_handle) = add_image(&fixture);
        bad_handle.lock().unwrap().fail_rasterize = true;
        slow_handle.lock().unwrap().raster_delay = std::time::Duration::from_millis(50);

        let orchestrator = Arc::new(fixture.orchestrator);
        let run = {
            let orchestrator = Arc::clone(&orchestrator);
            let ids = vec![bad, slow, never];
            tokio::spawn(async move { orchestrator.crop_all(&ids).await })
        };

        // The first image fails immediately; cancel while the second is
        // still rasterizing.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        orchestrator.cancel();

        let outcome = run.await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.failed, vec![bad]);
        assert_eq!(outcome.completed, vec![slow]);
        assert_eq!(never_handle.lock().unwrap().raster_calls, 0);
        // The pre-cancel failure still drives the policy.
        assert_eq!(outcome.task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_batch_reveals_results_on_completion() {
        let fixture = fixture(FailurePolicy::default());
        let (id, _) = add_image(&fixture);

        let mut rx = fixture.state.events.subscribe();
        fixture.orchestrator.crop_all(&[id]).await;

        let mut revealed = false;
        while let Ok(event) = rx.try_recv() {
            if event == EngineEvent::RevealResults {
                revealed = true;
            }
        }
        assert!(revealed);
    }
}
