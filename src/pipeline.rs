use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::extract::{AiError, DishImageGenerator, MenuExtractor};
use crate::models::Menu;
use crate::signal::StopSignal;
use crate::upload::StagedUpload;
use crate::worker::{WorkerError, WorkerPool};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("{0}")]
    Extraction(#[from] AiError),
    #[error("menu extraction worker failed: {0}")]
    Worker(String),
}

#[derive(Debug)]
pub enum Outcome {
    Completed(Menu),
    /// The client went away; there is nobody to answer.
    Disconnected,
}

enum Guarded<T> {
    Done(Result<T, WorkerError>),
    Disconnected,
}

#[derive(Clone)]
pub struct MenuProcessor {
    extractor: Arc<dyn MenuExtractor>,
    images: Arc<dyn DishImageGenerator>,
    pool: WorkerPool,
    grace: Duration,
}

impl MenuProcessor {
    pub fn new(
        extractor: Arc<dyn MenuExtractor>,
        images: Arc<dyn DishImageGenerator>,
        pool: WorkerPool,
        grace: Duration,
    ) -> Self {
        Self {
            extractor,
            images,
            pool,
            grace,
        }
    }

    /// Run the whole menu pipeline for one upload. The staged file is
    /// removed before this returns, whatever the outcome.
    pub async fn process(
        &self,
        upload: StagedUpload,
        disconnect: StopSignal,
    ) -> Result<Outcome, ProcessError> {
        tracing::debug!(path = %upload.path().display(), "processing staged menu");
        let outcome = self.run(&upload, &disconnect).await;
        upload.discard();
        outcome
    }

    async fn run(
        &self,
        upload: &StagedUpload,
        disconnect: &StopSignal,
    ) -> Result<Outcome, ProcessError> {
        let extractor = self.extractor.clone();
        let image = upload.to_path_buf();
        let kind = upload.kind();

        let extracted = self
            .guarded(disconnect, async move {
                extractor.extract_menu(&image, kind).await
            })
            .await;

        let mut menu = match extracted {
            Guarded::Disconnected => {
                tracing::info!("client disconnected during menu extraction");
                return Ok(Outcome::Disconnected);
            }
            Guarded::Done(Ok(Ok(menu))) => menu,
            Guarded::Done(Ok(Err(e))) => {
                tracing::error!(error = %e, "menu extraction failed");
                return Err(ProcessError::Extraction(e));
            }
            Guarded::Done(Err(e)) => {
                tracing::error!(error = %e, "menu extraction worker failed");
                return Err(ProcessError::Worker(e.to_string()));
            }
        };

        tracing::info!(
            dishes = menu.dishes.len(),
            drinks = menu.drinks.len(),
            "menu extracted"
        );

        for dish in menu.dishes.iter_mut() {
            tracing::info!(dish = %dish.name, "generating dish image");

            let images = self.images.clone();
            let name = dish.name.clone();
            let description = dish.description.clone().unwrap_or_default();

            let generated = self
                .guarded(disconnect, async move {
                    images.generate_dish_image(&name, &description).await
                })
                .await;

            let url = match generated {
                Guarded::Disconnected => {
                    tracing::info!(dish = %dish.name, "client disconnected during image generation");
                    return Ok(Outcome::Disconnected);
                }
                Guarded::Done(Ok(Ok(url))) => url,
                Guarded::Done(Ok(Err(e))) => {
                    tracing::warn!(dish = %dish.name, error = %e, "image generation failed");
                    String::new()
                }
                Guarded::Done(Err(e)) => {
                    tracing::warn!(dish = %dish.name, error = %e, "image generation worker failed");
                    String::new()
                }
            };

            tracing::debug!(dish = %dish.name, url = %url, "dish image attached");
            dish.image_url = Some(url);
        }

        Ok(Outcome::Completed(menu))
    }

    /// Dispatch `work` to the pool unless the client is already gone, then
    /// race its completion against disconnection. On disconnection the task
    /// is asked to stop and aborted after the grace period.
    async fn guarded<F, T>(&self, disconnect: &StopSignal, work: F) -> Guarded<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if disconnect.is_stopped() {
            return Guarded::Disconnected;
        }

        tracing::debug!(free_workers = self.pool.available(), "dispatching model call");
        let mut task = self.pool.spawn(work);
        tokio::select! {
            biased;
            result = task.wait() => Guarded::Done(result),
            _ = disconnect.stopped() => {
                task.cancel(self.grace).await;
                Guarded::Disconnected
            }
        }
    }
}
