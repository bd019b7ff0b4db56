//! Background texture decoding
//!
//! Textures found by a rescan are decoded on a tokio runtime so the frame
//! loop never waits on file I/O. Results are drained without blocking and
//! applied to the registry on the main thread.

use std::collections::HashSet;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::asset::decode::decode_source;
use crate::asset::registry::AssetRegistry;
use crate::asset::texture::{DecodedImage, LoadingState, TextureFault, TextureId, TextureSource};
use crate::core::Result;

/// Texture to decode
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    pub id: TextureId,
    pub source: TextureSource,
}

/// Outcome of one background decode
#[derive(Debug)]
pub struct DecodeResult {
    pub id: TextureId,
    pub outcome: std::result::Result<DecodedImage, TextureFault>,
}

/// Concurrent decoder with its own runtime
pub struct DecodeQueue {
    request_tx: mpsc::UnboundedSender<DecodeRequest>,
    result_rx: mpsc::UnboundedReceiver<DecodeResult>,
    pending: HashSet<TextureId>,
    /// Kept alive for the worker task
    _runtime: Runtime,
}

impl DecodeQueue {
    /// Start the worker with at most `max_concurrent` decodes in flight
    pub fn new(max_concurrent: usize) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<DecodeRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<DecodeResult>();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("texture-decode")
            .build()?;
        runtime.spawn(Self::worker_loop(max_concurrent.max(1), request_rx, result_tx));

        Ok(Self {
            request_tx,
            result_rx,
            pending: HashSet::new(),
            _runtime: runtime,
        })
    }

    async fn worker_loop(
        max_concurrent: usize,
        mut request_rx: mpsc::UnboundedReceiver<DecodeRequest>,
        result_tx: mpsc::UnboundedSender<DecodeResult>,
    ) {
        let mut active = JoinSet::new();
        let mut queued: Vec<DecodeRequest> = Vec::new();
        let mut open = true;

        loop {
            tokio::select! {
                request = request_rx.recv(), if open => match request {
                    Some(request) => queued.push(request),
                    None => open = false,
                },

                Some(joined) = active.join_next(), if !active.is_empty() => match joined {
                    Ok(result) => {
                        let _ = result_tx.send(result);
                    }
                    Err(e) => log::error!("Texture decode task failed: {e}"),
                },

                else => break,
            }

            // FIFO keeps decode order equal to scan order
            while active.len() < max_concurrent && !queued.is_empty() {
                let request = queued.remove(0);
                active.spawn_blocking(move || DecodeResult {
                    id: request.id,
                    outcome: decode_source(&request.source),
                });
            }
        }
    }

    /// Queue one texture. Returns `false` if it is already pending.
    pub fn request(&mut self, id: TextureId, source: TextureSource) -> bool {
        if !self.pending.insert(id) {
            return false;
        }
        if self.request_tx.send(DecodeRequest { id, source }).is_err() {
            log::error!("Texture decode worker is gone, dropping request for {id}");
            self.pending.remove(&id);
            return false;
        }
        true
    }

    /// Mark every texture still awaiting load as `Loading` and queue it
    pub fn submit_pending<H>(&mut self, registry: &mut AssetRegistry<H>) -> usize {
        let mut submitted = 0;
        for texture in registry.textures_mut().iter_mut() {
            if texture.loading() != LoadingState::AwaitingLoad || texture.fault().is_some() {
                continue;
            }
            if texture.begin_loading().is_ok() {
                submitted += 1;
            }
        }
        let loading: Vec<(TextureId, TextureSource)> = registry
            .textures()
            .filter(|(id, t)| t.loading() == LoadingState::Loading && !self.pending.contains(id))
            .map(|(id, t)| (id, t.source().clone()))
            .collect();
        for (id, source) in loading {
            self.request(id, source);
        }
        if submitted > 0 {
            log::info!("Queued {submitted} textures for background decoding");
        }
        submitted
    }

    /// Drain finished decodes without blocking
    pub fn poll_results(&mut self) -> Vec<DecodeResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            self.pending.remove(&result.id);
            results.push(result);
        }
        results
    }

    /// Move finished decodes into the registry; returns how many loaded
    pub fn apply<H>(&mut self, registry: &mut AssetRegistry<H>) -> usize {
        let mut loaded = 0;
        for DecodeResult { id, outcome } in self.poll_results() {
            let Some(texture) = registry.texture_mut(id) else {
                log::error!("Decoded unknown texture {id}");
                continue;
            };
            let transition = match outcome {
                Ok(image) => {
                    loaded += 1;
                    texture.finish_loading(image)
                }
                Err(fault) => {
                    log::warn!("Texture '{}': {}", texture.name(), fault);
                    texture.fail_loading(fault)
                }
            };
            if let Err(e) = transition {
                log::error!("{e}");
            }
        }
        loaded
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: TextureId) -> bool {
        self.pending.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::texture::TextureCategory;
    use std::time::{Duration, Instant};

    fn wait_for(queue: &mut DecodeQueue, registry: &mut AssetRegistry<()>) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while queue.pending_count() > 0 && Instant::now() < deadline {
            queue.apply(registry);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_background_decode_applies_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Wall_ALB.png");
        image::RgbaImage::new(4, 4).save(&path).unwrap();

        let mut registry: AssetRegistry<()> = AssetRegistry::new();
        let (good, _) = registry.register_texture(TextureSource::new(&path, TextureCategory::Uncompressed));
        let (gone, _) = registry.register_texture(TextureSource::new(dir.path().join("Gone.png"), TextureCategory::Ui));

        let mut queue = DecodeQueue::new(2).unwrap();
        assert_eq!(queue.submit_pending(&mut registry), 2);
        assert!(queue.is_pending(good));
        assert_eq!(registry.texture(good).unwrap().loading(), LoadingState::Loading);

        wait_for(&mut queue, &mut registry);
        assert_eq!(queue.pending_count(), 0);
        assert!(registry.texture(good).unwrap().is_bake_candidate());
        let missing = registry.texture(gone).unwrap();
        assert_eq!(missing.loading(), LoadingState::AwaitingLoad);
        assert!(missing.fault().is_some());

        // Faulted textures are not resubmitted
        assert_eq!(queue.submit_pending(&mut registry), 0);
    }

    #[test]
    fn test_duplicate_request_is_ignored() {
        let mut queue = DecodeQueue::new(1).unwrap();
        let source = TextureSource::new("nowhere/X.png", TextureCategory::Ui);
        assert!(queue.request(TextureId(0), source.clone()));
        assert!(!queue.request(TextureId(0), source));
    }
}
