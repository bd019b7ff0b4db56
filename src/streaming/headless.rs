//! CPU-only upload backend
//!
//! Records every call instead of talking to a GPU. Fences stay pending
//! until explicitly signaled (or until a configured number of polls has
//! passed), which makes streaming behavior fully deterministic.

use std::collections::HashSet;

use crate::asset::texture::TextureFault;
use crate::asset::transfer::{CopyRegion, TransferFormat};
use crate::streaming::backend::{TextureDesc, UploadBackend};

/// Texture "allocated" by the headless backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadlessTexture {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
    pub format: TransferFormat,
}

/// Staging buffer: scratch bytes plus the ticket of its last transfer
#[derive(Debug)]
pub struct HeadlessStaging {
    data: Vec<u8>,
    ticket: Option<u64>,
}

/// A transfer as seen by the backend
#[derive(Clone, Debug)]
pub struct TransferRecord {
    pub ticket: u64,
    pub label: String,
    pub regions: Vec<CopyRegion>,
    /// Snapshot of the staged bytes at submit time
    pub staged: Vec<u8>,
    /// Whether this went through the immediate path
    pub immediate: bool,
}

#[derive(Debug, Default)]
pub struct HeadlessUploadBackend {
    next_ticket: u64,
    /// Submitted tickets with the poll count at which they signal on their own
    pending: Vec<(u64, Option<u64>)>,
    signaled: HashSet<u64>,
    polls: u64,
    latency: Option<u64>,
    transfers: Vec<TransferRecord>,
    allocations: Vec<TextureDesc>,
    mipmaps: Vec<String>,
    failing: HashSet<String>,
    failing_mipmaps: HashSet<String>,
}

impl HeadlessUploadBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fences signal by themselves after `polls` calls to `poll`
    pub fn with_latency(polls: u64) -> Self {
        Self {
            latency: Some(polls),
            ..Self::default()
        }
    }

    /// Make allocation fail for textures with this label
    pub fn fail_allocation_for(&mut self, label: impl Into<String>) {
        self.failing.insert(label.into());
    }

    /// Make mipmap generation fail for textures with this label
    pub fn fail_mipmaps_for(&mut self, label: impl Into<String>) {
        self.failing_mipmaps.insert(label.into());
    }

    /// Signal every submitted transfer
    pub fn signal_all(&mut self) {
        for (ticket, _) in self.pending.drain(..) {
            self.signaled.insert(ticket);
        }
    }

    /// Signal one transfer by ticket
    pub fn signal(&mut self, ticket: u64) {
        self.pending.retain(|(t, _)| *t != ticket);
        self.signaled.insert(ticket);
    }

    pub fn transfers(&self) -> &[TransferRecord] {
        &self.transfers
    }

    pub fn allocations(&self) -> &[TextureDesc] {
        &self.allocations
    }

    /// Labels of textures whose mipmaps were generated, in order
    pub fn mipmaps(&self) -> &[String] {
        &self.mipmaps
    }

    pub fn poll_count(&self) -> u64 {
        self.polls
    }
}

impl UploadBackend for HeadlessUploadBackend {
    type Texture = HeadlessTexture;
    type Staging = HeadlessStaging;

    fn create_staging(&mut self, capacity: u64) -> HeadlessStaging {
        HeadlessStaging {
            data: vec![0; capacity as usize],
            ticket: None,
        }
    }

    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<HeadlessTexture, TextureFault> {
        if self.failing.contains(&desc.label) {
            return Err(TextureFault::Allocation(format!("{} rejected", desc.label)));
        }
        self.allocations.push(desc.clone());
        Ok(HeadlessTexture {
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
            mip_level_count: desc.mip_level_count,
            format: desc.format,
        })
    }

    fn begin_transfer(
        &mut self,
        staging: &mut HeadlessStaging,
        texture: &HeadlessTexture,
        regions: &[CopyRegion],
        fill: &mut dyn FnMut(&mut [u8]),
    ) {
        let size = TransferFormat::staged_size(regions) as usize;
        fill(&mut staging.data[..size]);

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        staging.ticket = Some(ticket);
        self.pending.push((ticket, self.latency.map(|l| self.polls + l)));
        self.transfers.push(TransferRecord {
            ticket,
            label: texture.label.clone(),
            regions: regions.to_vec(),
            staged: staging.data[..size].to_vec(),
            immediate: false,
        });
    }

    fn poll(&mut self) {
        self.polls += 1;
        let polls = self.polls;
        let signaled = &mut self.signaled;
        self.pending.retain(|&(ticket, due)| {
            if due.is_some_and(|d| polls >= d) {
                signaled.insert(ticket);
                false
            } else {
                true
            }
        });
    }

    fn fence_signaled(&mut self, staging: &mut HeadlessStaging) -> bool {
        staging.ticket.is_some_and(|t| self.signaled.contains(&t))
    }

    fn upload_immediate(&mut self, texture: &HeadlessTexture, regions: &[CopyRegion], staged: &[u8]) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.transfers.push(TransferRecord {
            ticket,
            label: texture.label.clone(),
            regions: regions.to_vec(),
            staged: staged.to_vec(),
            immediate: true,
        });
    }

    fn generate_mipmaps(&mut self, texture: &HeadlessTexture) -> Result<(), TextureFault> {
        if texture.mip_level_count < 2 {
            return Err(TextureFault::Mipmaps(format!("{} has a single level", texture.label)));
        }
        if self.failing_mipmaps.contains(&texture.label) {
            return Err(TextureFault::Mipmaps(format!("{} rejected", texture.label)));
        }
        self.mipmaps.push(texture.label.clone());
        Ok(())
    }
}
