//! Texture streaming scheduler
//!
//! Called once per frame. Each tick first releases finished transfers, then
//! admits at most one new texture into the staging pool. Uploads compete
//! with rendering for the frame budget, so admission is spread over frames
//! instead of bursting when many textures finish decoding at once.
//!
//! A separate mipmap step renders the mip chain of at most one baked
//! texture per frame.

use crate::asset::registry::AssetRegistry;
use crate::asset::texture::{LoadingState, TextureCategory, TextureFault, TextureId};
use crate::asset::transfer::TransferFormat;
use crate::core::config::StreamingConfig;
use crate::streaming::backend::{TextureDesc, UploadBackend};
use crate::streaming::staging::StagingPool;

/// What the admission step did this tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// No texture is ready to bake
    Idle,
    /// Texture entered the staging pool
    Admitted(TextureId),
    /// Texture is ready but every slot is in flight
    Backpressure(TextureId),
    /// Texture was uploaded synchronously
    BakedImmediately(TextureId),
    /// Texture could not be allocated and is now faulted
    Skipped(TextureId),
}

/// Result of one scheduler tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Textures whose transfer finished this tick
    pub completed: Vec<TextureId>,
    pub outcome: TickOutcome,
}

/// Running totals since startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamingStats {
    pub admitted: usize,
    pub completed: usize,
    pub backpressure_ticks: usize,
    pub immediate_bakes: usize,
    pub mipmaps_generated: usize,
    pub faults: usize,
}

/// Drives textures from `Loaded` to GPU-resident
pub struct TextureStreamer<B: UploadBackend> {
    backend: B,
    pool: StagingPool<B::Staging>,
    mipmaps_enabled: bool,
    all_mipmaps_done: bool,
    loading_complete_logged: bool,
    stats: StreamingStats,
}

impl<B: UploadBackend> TextureStreamer<B> {
    pub fn new(backend: B, config: &StreamingConfig) -> Self {
        Self::with_pool(backend, config.staging_slots, config.slot_capacity, config.generate_mipmaps)
    }

    pub fn with_pool(mut backend: B, slots: usize, slot_capacity: u64, mipmaps_enabled: bool) -> Self {
        let pool = StagingPool::new(&mut backend, slots, slot_capacity);
        Self {
            backend,
            pool,
            mipmaps_enabled,
            all_mipmaps_done: false,
            loading_complete_logged: false,
            stats: StreamingStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn pool(&self) -> &StagingPool<B::Staging> {
        &self.pool
    }

    pub fn stats(&self) -> StreamingStats {
        self.stats
    }

    /// One streaming step: release finished transfers, admit one texture
    pub fn tick(&mut self, registry: &mut AssetRegistry<B::Texture>) -> TickReport {
        let completed = self.pool.poll_completions(registry, &mut self.backend);
        self.stats.completed += completed.len();
        for id in &completed {
            if let Some(texture) = registry.texture(*id) {
                log::debug!("Texture '{}' baked", texture.name());
            }
        }

        let outcome = self.admit_next(registry);
        TickReport { completed, outcome }
    }

    fn admit_next(&mut self, registry: &mut AssetRegistry<B::Texture>) -> TickOutcome {
        let Some(id) = registry.first_bake_candidate() else {
            return TickOutcome::Idle;
        };
        let Some(texture) = registry.texture(id) else {
            return TickOutcome::Idle;
        };

        let staged = texture
            .pixels()
            .map(|image| TransferFormat::staged_size(&image.format.copy_regions(image.width, image.height, image.levels)))
            .unwrap_or(0);
        if texture.category().bakes_immediately() || staged > self.pool.capacity() {
            if staged > self.pool.capacity() {
                log::warn!(
                    "Texture '{}' needs {} staging bytes, more than a slot holds; uploading synchronously",
                    texture.name(),
                    staged
                );
            }
            return match self.bake_immediate(registry, id) {
                Ok(()) => TickOutcome::BakedImmediately(id),
                Err(_) => TickOutcome::Skipped(id),
            };
        }

        let Some(slot) = self.pool.acquire_free_slot() else {
            log::debug!("No free staging slot for '{}', retrying next frame", texture.name());
            self.stats.backpressure_ticks += 1;
            return TickOutcome::Backpressure(id);
        };

        if self.allocate(registry, id).is_err() {
            return TickOutcome::Skipped(id);
        }

        match self.pool.begin_transfer(slot, id, registry, &mut self.backend) {
            Ok(bytes) => {
                self.stats.admitted += 1;
                log::debug!("Admitted texture {id} into slot {} ({bytes} bytes)", slot.0);
                TickOutcome::Admitted(id)
            }
            Err(e) => {
                log::error!("{e}");
                self.fault(registry, id, TextureFault::Allocation(e.to_string()));
                TickOutcome::Skipped(id)
            }
        }
    }

    /// Allocate the GPU texture and move the resource to `BakingInProgress`
    fn allocate(&mut self, registry: &mut AssetRegistry<B::Texture>, id: TextureId) -> Result<(), TextureFault> {
        let Some(texture) = registry.texture(id) else {
            return Err(TextureFault::Allocation(format!("unknown texture {id}")));
        };
        let Some(format) = texture.transfer() else {
            let fault = TextureFault::UnsupportedFormat(format!("'{}' has no transfer format", texture.name()));
            self.fault(registry, id, fault.clone());
            return Err(fault);
        };
        let desc = TextureDesc {
            label: texture.name().to_owned(),
            width: texture.width(),
            height: texture.height(),
            mip_level_count: texture.allocation_levels(self.mipmaps_enabled),
            format,
        };

        let handle = match desc.validate().and_then(|()| self.backend.allocate_texture(&desc)) {
            Ok(handle) => handle,
            Err(fault) => {
                self.fault(registry, id, fault.clone());
                return Err(fault);
            }
        };
        if let Some(texture) = registry.texture_mut(id) {
            if let Err(e) = texture.begin_baking(handle, self.mipmaps_enabled) {
                log::error!("{e}");
                return Err(TextureFault::Allocation(e.to_string()));
            }
        }
        Ok(())
    }

    fn fault(&mut self, registry: &mut AssetRegistry<B::Texture>, id: TextureId, fault: TextureFault) {
        if let Some(texture) = registry.texture_mut(id) {
            log::warn!("Texture '{}' will not be baked: {}", texture.name(), fault);
            texture.set_fault(fault);
            self.stats.faults += 1;
        }
    }

    /// Upload one texture synchronously, bypassing the staging pool
    pub fn bake_immediate(&mut self, registry: &mut AssetRegistry<B::Texture>, id: TextureId) -> Result<(), TextureFault> {
        self.allocate(registry, id)?;

        let Some(texture) = registry.texture(id) else {
            return Err(TextureFault::Allocation(format!("unknown texture {id}")));
        };
        if let (Some(image), Some(handle)) = (texture.pixels(), texture.gpu()) {
            let regions = image.format.copy_regions(image.width, image.height, image.levels);
            let mut staged = vec![0u8; TransferFormat::staged_size(&regions) as usize];
            image.format.write_staged(image, &regions, &mut staged);
            self.backend.upload_immediate(handle, &regions, &staged);
        }

        if let Some(texture) = registry.texture_mut(id) {
            if let Err(e) = texture.finish_baking() {
                log::error!("{e}");
            }
        }
        self.stats.immediate_bakes += 1;
        Ok(())
    }

    /// Synchronously bake every candidate of one category
    ///
    /// Used right after the bulk load so fonts are usable on the first frame.
    pub fn bake_category_now(&mut self, registry: &mut AssetRegistry<B::Texture>, category: TextureCategory) -> usize {
        let ids: Vec<TextureId> = registry
            .textures()
            .filter(|(_, t)| t.category() == category && t.is_bake_candidate())
            .map(|(id, _)| id)
            .collect();
        ids.into_iter()
            .filter(|&id| self.bake_immediate(registry, id).is_ok())
            .count()
    }

    /// Render the mip chain of one baked texture, if any is waiting
    pub fn generate_next_mipmap(&mut self, registry: &mut AssetRegistry<B::Texture>) -> Option<TextureId> {
        if !self.mipmaps_enabled || self.all_mipmaps_done {
            return None;
        }

        let next = registry
            .textures()
            .find(|(_, t)| t.needs_mipmap_generation())
            .map(|(id, _)| id);
        let Some(id) = next else {
            if self.streaming_settled(registry) {
                self.all_mipmaps_done = true;
                log::info!("All mipmaps generated");
            }
            return None;
        };

        let texture = registry.texture_mut(id)?;
        let result = match texture.gpu() {
            Some(handle) => self.backend.generate_mipmaps(handle),
            None => Err(TextureFault::Mipmaps("no GPU texture".into())),
        };
        match result {
            Ok(()) => {
                if let Err(e) = texture.finish_mipmaps() {
                    log::error!("{e}");
                }
                self.stats.mipmaps_generated += 1;
                log::trace!("Mipmaps generated for '{}'", texture.name());
            }
            Err(fault) => {
                log::warn!("Texture '{}': {}", texture.name(), fault);
                texture.abandon_mipmaps(fault);
            }
        }
        Some(id)
    }

    /// Nothing left to load, bake or admit
    fn streaming_settled(&mut self, registry: &AssetRegistry<B::Texture>) -> bool {
        let pending_load = registry.textures().any(|(_, t)| {
            t.fault().is_none() && t.loading() != LoadingState::Loaded
        });
        !pending_load && self.loading_complete(registry)
    }

    /// Whether every loaded, unfaulted texture is GPU-resident
    ///
    /// Logged once each time it becomes true.
    pub fn loading_complete(&mut self, registry: &AssetRegistry<B::Texture>) -> bool {
        let complete = registry
            .textures()
            .filter(|(_, t)| t.loading() == LoadingState::Loaded && t.fault().is_none())
            .all(|(_, t)| t.is_resident());
        if complete && !self.loading_complete_logged {
            log::info!(
                "Texture streaming complete: {} baked, {} immediate, {} faulted",
                self.stats.completed,
                self.stats.immediate_bakes,
                self.stats.faults
            );
        }
        self.loading_complete_logged = complete;
        complete
    }

    /// Allow the mipmap step to scan again, e.g. after a rescan found new textures
    pub fn reset_mipmap_flag(&mut self) {
        self.all_mipmaps_done = false;
    }

    pub fn all_mipmaps_done(&self) -> bool {
        self.all_mipmaps_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::texture::tests::rgba_image;
    use crate::asset::texture::{BakingState, MipmapState, TextureSource};
    use crate::streaming::headless::{HeadlessTexture, HeadlessUploadBackend};

    type Registry = AssetRegistry<HeadlessTexture>;

    fn streamer(slots: usize) -> TextureStreamer<HeadlessUploadBackend> {
        TextureStreamer::with_pool(HeadlessUploadBackend::new(), slots, 1 << 20, true)
    }

    fn add_loaded(registry: &mut Registry, name: &str, category: TextureCategory) -> TextureId {
        let (id, _) = registry.register_texture(TextureSource::new(format!("{name}.png"), category));
        let texture = registry.texture_mut(id).unwrap();
        texture.begin_loading().unwrap();
        texture.finish_loading(rgba_image(32, 32)).unwrap();
        id
    }

    fn baking(registry: &Registry) -> usize {
        registry
            .textures()
            .filter(|(_, t)| t.baking() == BakingState::BakingInProgress)
            .count()
    }

    #[test]
    fn test_five_textures_four_slots() {
        let mut registry = Registry::new();
        let ids: Vec<_> = (0..5)
            .map(|i| add_loaded(&mut registry, &format!("T{i}"), TextureCategory::Uncompressed))
            .collect();
        let mut streamer = streamer(4);

        let report = streamer.tick(&mut registry);
        assert_eq!(report.outcome, TickOutcome::Admitted(ids[0]));
        assert_eq!(baking(&registry), 1);

        streamer.backend_mut().signal_all();
        let report = streamer.tick(&mut registry);
        assert_eq!(report.completed, vec![ids[0]]);
        assert_eq!(registry.texture(ids[0]).unwrap().baking(), BakingState::BakeComplete);
        assert_eq!(report.outcome, TickOutcome::Admitted(ids[1]));
        assert_eq!(registry.texture(ids[1]).unwrap().baking(), BakingState::BakingInProgress);
        assert_eq!(baking(&registry), 1);
    }

    #[test]
    fn test_one_admission_per_tick_and_bounded_in_flight() {
        let mut registry = Registry::new();
        for i in 0..10 {
            add_loaded(&mut registry, &format!("T{i}"), TextureCategory::Ui);
        }
        let mut streamer = streamer(3);

        for tick in 1..=6 {
            let before = baking(&registry);
            let report = streamer.tick(&mut registry);
            assert!(baking(&registry) <= before + 1);
            assert!(streamer.pool().in_flight() <= 3);
            if tick > 3 {
                assert!(matches!(report.outcome, TickOutcome::Backpressure(_)));
            }
        }
        assert_eq!(streamer.stats().admitted, 3);
        assert_eq!(streamer.stats().backpressure_ticks, 3);
    }

    #[test]
    fn test_drains_everything_with_latency() {
        let mut registry = Registry::new();
        for i in 0..6 {
            add_loaded(&mut registry, &format!("T{i}"), TextureCategory::Ui);
        }
        let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::with_latency(2), 2, 1 << 20, true);

        for _ in 0..40 {
            streamer.tick(&mut registry);
        }
        assert!(registry.textures().all(|(_, t)| t.is_resident() && t.pixels().is_none()));
        assert!(streamer.loading_complete(&registry));
        assert_eq!(streamer.stats().completed, 6);
    }

    #[test]
    fn test_never_bakes_unloaded() {
        let mut registry = Registry::new();
        let (pending, _) = registry.register_texture(TextureSource::new("Pending.png", TextureCategory::Ui));
        let (loading, _) = registry.register_texture(TextureSource::new("Loading.png", TextureCategory::Ui));
        registry.texture_mut(loading).unwrap().begin_loading().unwrap();
        let mut streamer = streamer(4);

        for _ in 0..5 {
            assert_eq!(streamer.tick(&mut registry).outcome, TickOutcome::Idle);
        }
        for id in [pending, loading] {
            let texture = registry.texture(id).unwrap();
            assert_eq!(texture.baking(), BakingState::AwaitingBake);
            assert!(texture.gpu().is_none());
        }
        assert!(streamer.backend().allocations().is_empty());
    }

    #[test]
    fn test_missing_file_stays_awaiting_load() {
        let mut registry = Registry::new();
        let (id, _) = registry.register_texture(TextureSource::new("/missing/Gone_ALB.png", TextureCategory::Uncompressed));
        crate::asset::loader::load_pending(&mut registry);
        let mut streamer = streamer(4);

        for _ in 0..20 {
            streamer.tick(&mut registry);
        }
        let texture = registry.texture(id).unwrap();
        assert_eq!(texture.loading(), LoadingState::AwaitingLoad);
        assert_eq!(texture.baking(), BakingState::AwaitingBake);
    }

    #[test]
    fn test_allocation_failure_skips_texture() {
        let mut registry = Registry::new();
        let bad = add_loaded(&mut registry, "Bad", TextureCategory::Ui);
        let good = add_loaded(&mut registry, "Good", TextureCategory::Ui);
        let mut streamer = streamer(4);
        streamer.backend_mut().fail_allocation_for("Bad");

        assert_eq!(streamer.tick(&mut registry).outcome, TickOutcome::Skipped(bad));
        assert_eq!(streamer.tick(&mut registry).outcome, TickOutcome::Admitted(good));
        assert!(matches!(registry.texture(bad).unwrap().fault(), Some(TextureFault::Allocation(_))));

        streamer.backend_mut().signal_all();
        streamer.tick(&mut registry);
        assert!(streamer.loading_complete(&registry));
    }

    #[test]
    fn test_fonts_and_oversized_bake_immediately() {
        let mut registry = Registry::new();
        let font = add_loaded(&mut registry, "Glyphs", TextureCategory::Font);
        let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::new(), 1, 1024, true);
        let big = add_loaded(&mut registry, "Big", TextureCategory::Ui);

        assert_eq!(streamer.bake_category_now(&mut registry, TextureCategory::Font), 1);
        assert!(registry.texture(font).unwrap().is_resident());

        assert_eq!(streamer.tick(&mut registry).outcome, TickOutcome::BakedImmediately(big));
        assert!(registry.texture(big).unwrap().is_resident());
        assert!(streamer.backend().transfers().iter().all(|t| t.immediate));
        assert_eq!(streamer.pool().in_flight(), 0);
    }

    #[test]
    fn test_one_mipmap_per_step_then_cached_done() {
        let mut registry = Registry::new();
        let a = add_loaded(&mut registry, "A_ALB", TextureCategory::Uncompressed);
        let b = add_loaded(&mut registry, "B_ALB", TextureCategory::Uncompressed);
        let ui = add_loaded(&mut registry, "Cursor", TextureCategory::Ui);
        let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::with_latency(1), 4, 1 << 20, true);

        for _ in 0..5 {
            streamer.tick(&mut registry);
        }
        assert_eq!(registry.texture(ui).unwrap().mipmap(), MipmapState::NoMipmapsRequired);

        assert_eq!(streamer.generate_next_mipmap(&mut registry), Some(a));
        assert_eq!(registry.texture(b).unwrap().mipmap(), MipmapState::AwaitingMipmapGeneration);
        assert_eq!(streamer.generate_next_mipmap(&mut registry), Some(b));
        assert_eq!(streamer.generate_next_mipmap(&mut registry), None);
        assert!(streamer.all_mipmaps_done());
        assert_eq!(streamer.backend().mipmaps(), ["A_ALB", "B_ALB"]);

        // New work after a rescan needs an explicit reset
        let c = add_loaded(&mut registry, "C_ALB", TextureCategory::Uncompressed);
        for _ in 0..3 {
            streamer.tick(&mut registry);
        }
        assert_eq!(streamer.generate_next_mipmap(&mut registry), None);
        streamer.reset_mipmap_flag();
        assert_eq!(streamer.generate_next_mipmap(&mut registry), Some(c));
    }

    #[test]
    fn test_mipmaps_disabled() {
        let mut registry = Registry::new();
        let id = add_loaded(&mut registry, "A_ALB", TextureCategory::Uncompressed);
        assert_eq!(registry.texture(id).unwrap().mip_levels(), 6);
        let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::new(), 1, 1 << 20, false);
        streamer.tick(&mut registry);
        streamer.backend_mut().signal_all();
        streamer.tick(&mut registry);

        let texture = registry.texture(id).unwrap();
        assert_eq!(texture.mipmap(), MipmapState::NoMipmapsRequired);
        assert_eq!(texture.mip_levels(), 1);
        assert_eq!(texture.gpu().unwrap().mip_level_count, 1);
        assert_eq!(streamer.backend().allocations()[0].mip_level_count, 1);
        assert_eq!(streamer.backend().transfers()[0].regions.len(), 1);
        assert!(texture.is_resident() && !texture.mipmaps_missing());
        assert_eq!(streamer.generate_next_mipmap(&mut registry), None);
    }

    #[test]
    fn test_mipmaps_enabled_allocates_full_chain() {
        let mut registry = Registry::new();
        add_loaded(&mut registry, "A_ALB", TextureCategory::Uncompressed);
        let mut streamer = streamer(1);
        streamer.tick(&mut registry);
        assert_eq!(streamer.backend().allocations()[0].mip_level_count, 6);
    }

    #[test]
    fn test_failed_mipmaps_leave_chain_missing() {
        let mut registry = Registry::new();
        let id = add_loaded(&mut registry, "A_ALB", TextureCategory::Uncompressed);
        let mut streamer = streamer(1);
        streamer.backend_mut().fail_mipmaps_for("A_ALB");
        streamer.tick(&mut registry);
        streamer.backend_mut().signal_all();
        streamer.tick(&mut registry);

        assert_eq!(streamer.generate_next_mipmap(&mut registry), Some(id));
        let texture = registry.texture(id).unwrap();
        assert_eq!(texture.mipmap(), MipmapState::NoMipmapsRequired);
        assert!(matches!(texture.fault(), Some(TextureFault::Mipmaps(_))));
        assert!(texture.mipmaps_missing());
    }
}
