//! Fenced staging buffer pool
//!
//! A fixed set of host-visible buffers recycled forever:
//! acquire -> copy -> submit -> await fence -> release. Running out of free
//! slots is backpressure, not an error; the caller simply tries again next
//! frame.

use thiserror::Error;

use crate::asset::registry::AssetRegistry;
use crate::asset::texture::TextureId;
use crate::asset::transfer::TransferFormat;
use crate::streaming::backend::UploadBackend;

/// Index of a slot in the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotIndex(pub usize);

/// GPU completion state of a slot's last transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    /// Never used
    Unused,
    /// Copy submitted, scratch memory must not be touched
    Pending,
    /// Copy finished on the GPU
    Signaled,
}

/// Why a transfer could not start
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("staging slot {0:?} is still in flight")]
    SlotBusy(SlotIndex),

    #[error("texture {0} is not registered")]
    UnknownTexture(TextureId),

    #[error("texture '{0}' has no decoded pixels")]
    NotDecoded(String),

    #[error("texture '{0}' has no GPU allocation")]
    NotAllocated(String),

    #[error("texture '{name}' needs {size} staging bytes, slot holds {capacity}")]
    TooLarge { name: String, size: u64, capacity: u64 },
}

/// One staging buffer with its fence and owner tag
pub struct StagingSlot<S> {
    scratch: S,
    fence: FenceState,
    owner: Option<TextureId>,
}

impl<S> StagingSlot<S> {
    fn is_free(&self) -> bool {
        self.fence != FenceState::Pending && self.owner.is_none()
    }
}

/// Fixed-size pool of staging slots
pub struct StagingPool<S> {
    slots: Vec<StagingSlot<S>>,
    capacity: u64,
}

impl<S> StagingPool<S> {
    /// Allocate `count` slots of `capacity` bytes each
    pub fn new<B>(backend: &mut B, count: usize, capacity: u64) -> Self
    where
        B: UploadBackend<Staging = S>,
    {
        let slots = (0..count.max(1))
            .map(|_| StagingSlot {
                scratch: backend.create_staging(capacity),
                fence: FenceState::Unused,
                owner: None,
            })
            .collect::<Vec<_>>();
        log::info!(
            "Staging pool: {} slots x {:.1} MiB",
            slots.len(),
            capacity as f64 / (1024.0 * 1024.0)
        );
        Self { slots, capacity }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Bytes each slot can stage
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn fence(&self, slot: SlotIndex) -> Option<FenceState> {
        self.slots.get(slot.0).map(|s| s.fence)
    }

    pub fn owner(&self, slot: SlotIndex) -> Option<TextureId> {
        self.slots.get(slot.0).and_then(|s| s.owner)
    }

    /// Slots whose transfer has not been released yet
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.owner.is_some()).count()
    }

    /// First slot that was never used or whose fence signaled, with no owner
    pub fn acquire_free_slot(&self) -> Option<SlotIndex> {
        self.slots.iter().position(StagingSlot::is_free).map(SlotIndex)
    }

    /// Copy a texture's decoded pixels into `slot` and queue the GPU copy
    ///
    /// The resource must already own its GPU texture. Returns the number of
    /// staged bytes.
    pub fn begin_transfer<B>(
        &mut self,
        slot: SlotIndex,
        id: TextureId,
        registry: &AssetRegistry<B::Texture>,
        backend: &mut B,
    ) -> Result<u64, TransferError>
    where
        B: UploadBackend<Staging = S>,
    {
        let capacity = self.capacity;
        let entry = self
            .slots
            .get_mut(slot.0)
            .filter(|s| s.is_free())
            .ok_or(TransferError::SlotBusy(slot))?;

        let texture = registry.texture(id).ok_or(TransferError::UnknownTexture(id))?;
        let image = texture
            .pixels()
            .ok_or_else(|| TransferError::NotDecoded(texture.name().to_owned()))?;
        let handle = texture
            .gpu()
            .ok_or_else(|| TransferError::NotAllocated(texture.name().to_owned()))?;

        let regions = image.format.copy_regions(image.width, image.height, image.levels);
        let size = TransferFormat::staged_size(&regions);
        if size > capacity {
            return Err(TransferError::TooLarge {
                name: texture.name().to_owned(),
                size,
                capacity,
            });
        }

        let format = image.format;
        backend.begin_transfer(&mut entry.scratch, handle, &regions, &mut |dst: &mut [u8]| {
            format.write_staged(image, &regions, dst);
        });

        entry.owner = Some(id);
        entry.fence = FenceState::Pending;
        log::trace!("Slot {} <- '{}' ({} bytes)", slot.0, texture.name(), size);
        Ok(size)
    }

    /// Refresh every fence and release slots whose transfer finished
    ///
    /// Owners of released slots are marked `BakeComplete` and lose their
    /// CPU pixels. Returns the textures completed by this call.
    pub fn poll_completions<B>(
        &mut self,
        registry: &mut AssetRegistry<B::Texture>,
        backend: &mut B,
    ) -> Vec<TextureId>
    where
        B: UploadBackend<Staging = S>,
    {
        if self.in_flight() == 0 {
            return Vec::new();
        }
        backend.poll();

        let mut completed = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.fence == FenceState::Pending && backend.fence_signaled(&mut slot.scratch) {
                slot.fence = FenceState::Signaled;
            }
            if slot.fence != FenceState::Signaled {
                continue;
            }
            let Some(owner) = slot.owner.take() else {
                continue;
            };
            match registry.texture_mut(owner).map(|t| t.finish_baking()) {
                Some(Ok(())) => completed.push(owner),
                Some(Err(e)) => log::error!("Slot {index}: {e}"),
                None => log::error!("Slot {index} owned by unknown texture {owner}"),
            }
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::texture::tests::rgba_image;
    use crate::asset::texture::{BakingState, TextureCategory, TextureSource};
    use crate::streaming::backend::TextureDesc;
    use crate::streaming::headless::{HeadlessTexture, HeadlessUploadBackend};

    fn loaded_texture(registry: &mut AssetRegistry<HeadlessTexture>, backend: &mut HeadlessUploadBackend, name: &str) -> TextureId {
        let (id, _) = registry.register_texture(TextureSource::new(format!("{name}.png"), TextureCategory::Ui));
        let texture = registry.texture_mut(id).unwrap();
        texture.begin_loading().unwrap();
        texture.finish_loading(rgba_image(16, 16)).unwrap();
        let handle = backend
            .allocate_texture(&TextureDesc {
                label: name.to_owned(),
                width: 16,
                height: 16,
                mip_level_count: 1,
                format: TransferFormat::Uncompressed { channels: 4 },
            })
            .unwrap();
        texture.begin_baking(handle, false).unwrap();
        id
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let mut backend = HeadlessUploadBackend::new();
        let mut registry = AssetRegistry::new();
        let mut pool = StagingPool::new(&mut backend, 2, 1 << 16);

        for name in ["A", "B"] {
            let id = loaded_texture(&mut registry, &mut backend, name);
            let slot = pool.acquire_free_slot().unwrap();
            pool.begin_transfer(slot, id, &registry, &mut backend).unwrap();
        }
        assert_eq!(pool.in_flight(), 2);
        assert_eq!(pool.acquire_free_slot(), None);
    }

    #[test]
    fn test_poll_without_signal_changes_nothing() {
        let mut backend = HeadlessUploadBackend::new();
        let mut registry = AssetRegistry::new();
        let mut pool = StagingPool::new(&mut backend, 1, 1 << 16);
        let id = loaded_texture(&mut registry, &mut backend, "A");
        pool.begin_transfer(SlotIndex(0), id, &registry, &mut backend).unwrap();

        for _ in 0..3 {
            assert!(pool.poll_completions(&mut registry, &mut backend).is_empty());
            assert_eq!(pool.fence(SlotIndex(0)), Some(FenceState::Pending));
            assert_eq!(pool.owner(SlotIndex(0)), Some(id));
            assert_eq!(registry.texture(id).unwrap().baking(), BakingState::BakingInProgress);
        }
    }

    #[test]
    fn test_signal_releases_slot_and_pixels() {
        let mut backend = HeadlessUploadBackend::new();
        let mut registry = AssetRegistry::new();
        let mut pool = StagingPool::new(&mut backend, 1, 1 << 16);
        let id = loaded_texture(&mut registry, &mut backend, "A");
        pool.begin_transfer(SlotIndex(0), id, &registry, &mut backend).unwrap();

        backend.signal_all();
        assert_eq!(pool.poll_completions(&mut registry, &mut backend), vec![id]);
        let texture = registry.texture(id).unwrap();
        assert_eq!(texture.baking(), BakingState::BakeComplete);
        assert!(texture.pixels().is_none());
        assert_eq!(pool.acquire_free_slot(), Some(SlotIndex(0)));

        // A second poll finds nothing new
        assert!(pool.poll_completions(&mut registry, &mut backend).is_empty());
    }

    #[test]
    fn test_busy_slot_is_rejected() {
        let mut backend = HeadlessUploadBackend::new();
        let mut registry = AssetRegistry::new();
        let mut pool = StagingPool::new(&mut backend, 1, 1 << 16);
        let a = loaded_texture(&mut registry, &mut backend, "A");
        let b = loaded_texture(&mut registry, &mut backend, "B");
        pool.begin_transfer(SlotIndex(0), a, &registry, &mut backend).unwrap();

        assert_eq!(
            pool.begin_transfer(SlotIndex(0), b, &registry, &mut backend),
            Err(TransferError::SlotBusy(SlotIndex(0)))
        );
        assert_eq!(backend.transfers().len(), 1);
    }

    #[test]
    fn test_oversized_texture_is_rejected() {
        let mut backend = HeadlessUploadBackend::new();
        let mut registry = AssetRegistry::new();
        let mut pool = StagingPool::new(&mut backend, 1, 1024);
        let id = loaded_texture(&mut registry, &mut backend, "Big");

        let err = pool.begin_transfer(SlotIndex(0), id, &registry, &mut backend).unwrap_err();
        assert!(matches!(err, TransferError::TooLarge { size: 4096, capacity: 1024, .. }));
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_staged_bytes_are_padded() {
        let mut backend = HeadlessUploadBackend::new();
        let mut registry = AssetRegistry::new();
        let mut pool = StagingPool::new(&mut backend, 1, 1 << 16);
        let id = loaded_texture(&mut registry, &mut backend, "A");

        let size = pool.begin_transfer(SlotIndex(0), id, &registry, &mut backend).unwrap();
        assert_eq!(size, 256 * 16);
        let record = &backend.transfers()[0];
        assert_eq!(record.label, "A");
        assert_eq!(record.regions[0].bytes_per_row, 256);
        assert_eq!(record.staged[0..64], [127u8; 64]);
    }
}
