//! Bulk texture loading on the rayon pool
//!
//! Used for the initial load: every texture awaiting load is decoded in
//! parallel and the call returns only once all of them are done. Per-frame
//! streaming never goes through here.

use rayon::prelude::*;

use crate::asset::decode::decode_source;
use crate::asset::registry::AssetRegistry;
use crate::asset::texture::{LoadingState, TextureFault};

/// Counts from one bulk load
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub missing: usize,
    pub failed: usize,
}

/// Decode every texture that is still awaiting load, blocking until done
///
/// Failed textures are logged and go back to `AwaitingLoad` with the fault
/// recorded; they are not attempted again by later loads.
pub fn load_pending<H: Send>(registry: &mut AssetRegistry<H>) -> LoadSummary {
    let started = std::time::Instant::now();

    // Claim the batch on this thread so workers only see their own resource
    let mut claimed = 0;
    for texture in registry.textures_mut().iter_mut() {
        if texture.loading() == LoadingState::AwaitingLoad && texture.fault().is_none() {
            if texture.begin_loading().is_ok() {
                claimed += 1;
            }
        }
    }
    if claimed == 0 {
        return LoadSummary::default();
    }

    let summary = registry
        .textures_mut()
        .par_iter_mut()
        .filter(|t| t.loading() == LoadingState::Loading)
        .map(|texture| {
            let outcome = decode_source(texture.source());
            let mut summary = LoadSummary::default();
            let result = match outcome {
                Ok(image) => {
                    summary.loaded = 1;
                    texture.finish_loading(image)
                }
                Err(fault) => {
                    match &fault {
                        TextureFault::MissingSource(path) => {
                            log::warn!("Texture '{}' missing: {}", texture.name(), path.display());
                            summary.missing = 1;
                        }
                        other => {
                            log::warn!("Texture '{}' failed to decode: {}", texture.name(), other);
                            summary.failed = 1;
                        }
                    }
                    texture.fail_loading(fault)
                }
            };
            if let Err(e) = result {
                log::error!("{e}");
            }
            summary
        })
        .reduce(LoadSummary::default, |a, b| LoadSummary {
            loaded: a.loaded + b.loaded,
            missing: a.missing + b.missing,
            failed: a.failed + b.failed,
        });

    log::info!(
        "Loaded {} textures in {:.1?} ({} missing, {} failed)",
        summary.loaded,
        started.elapsed(),
        summary.missing,
        summary.failed
    );
    summary
}
