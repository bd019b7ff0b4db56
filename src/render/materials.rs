//! Material bind groups over streamed textures
//!
//! A slot only binds a texture once it is resident. Until then it uses a
//! 1x1 fallback, and a texture whose rendered mip chain is not written yet
//! (or failed to generate) is bound through a base-level view so unwritten
//! levels are never sampled. Bind
//! groups are rebuilt only when a slot's binding changes.

use std::collections::HashMap;

use crate::asset::material::{Material, MaterialId};
use crate::asset::registry::AssetRegistry;
use crate::asset::texture::{TextureId, TextureResource};
use crate::render::upload::GpuTexture;

/// Fallback colors in slot order: base color, normal, RMA, SSS
const FALLBACK_TEXELS: [[u8; 4]; 4] = [
    [255, 255, 255, 255],
    [128, 128, 255, 255],
    [128, 0, 255, 255],
    [0, 0, 0, 255],
];

const SLOT_LABELS: [&str; 4] = ["basecolor", "normal", "rma", "sss"];

/// What a material slot currently binds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotBinding {
    Fallback,
    /// Resident, mips not generated yet
    BaseOnly(TextureId),
    Full(TextureId),
}

impl SlotBinding {
    pub fn of<H>(id: Option<TextureId>, registry: &AssetRegistry<H>) -> Self {
        let Some(id) = id else {
            return SlotBinding::Fallback;
        };
        match registry.texture(id) {
            Some(texture) if texture.is_resident() && texture.mipmaps_missing() => SlotBinding::BaseOnly(id),
            Some(texture) if texture.is_resident() => SlotBinding::Full(id),
            _ => SlotBinding::Fallback,
        }
    }
}

/// Bindings of all four slots of a material
pub fn material_signature<H>(material: &Material, registry: &AssetRegistry<H>) -> [SlotBinding; 4] {
    material.slots().map(|slot| SlotBinding::of(slot, registry))
}

struct CachedGroup {
    signature: [SlotBinding; 4],
    bind_group: wgpu::BindGroup,
}

/// Group 2 of the lighting and peel pipelines
pub struct MaterialBindings {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fallback_views: Vec<wgpu::TextureView>,
    _fallbacks: Vec<wgpu::Texture>,
    default_group: wgpu::BindGroup,
    cache: HashMap<MaterialId, CachedGroup>,
}

impl MaterialBindings {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material_bind_group_layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let fallbacks: Vec<wgpu::Texture> = FALLBACK_TEXELS
            .iter()
            .zip(SLOT_LABELS)
            .map(|(texel, label)| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("fallback_{label}")),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                queue.write_texture(
                    texture.as_image_copy(),
                    texel,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4),
                        rows_per_image: Some(1),
                    },
                    wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                );
                texture
            })
            .collect();
        let fallback_views: Vec<wgpu::TextureView> = fallbacks
            .iter()
            .map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();

        let default_group = Self::create_group(
            device,
            &layout,
            &sampler,
            [&fallback_views[0], &fallback_views[1], &fallback_views[2], &fallback_views[3]],
            "material_default_bind_group",
        );

        Self {
            layout,
            sampler,
            fallback_views,
            _fallbacks: fallbacks,
            default_group,
            cache: HashMap::new(),
        }
    }

    fn create_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        views: [&wgpu::TextureView; 4],
        label: &str,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(views[0]),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(views[1]),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(views[2]),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(views[3]),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Rebuild bind groups whose slot bindings changed since the last call
    ///
    /// Returns the number of rebuilt groups.
    pub fn update(&mut self, device: &wgpu::Device, registry: &AssetRegistry<GpuTexture>) -> usize {
        let mut rebuilt = 0;
        for (id, material) in registry.materials() {
            let signature = material_signature(material, registry);
            if self.cache.get(&id).is_some_and(|c| c.signature == signature) {
                continue;
            }

            let resolve = |binding: SlotBinding| -> Option<wgpu::TextureView> {
                let texture = match binding {
                    SlotBinding::Fallback => return None,
                    SlotBinding::BaseOnly(t) | SlotBinding::Full(t) => registry.texture(t).and_then(TextureResource::gpu)?,
                };
                Some(match binding {
                    SlotBinding::BaseOnly(_) => texture.base_level_view(),
                    _ => texture.view.clone(),
                })
            };
            let owned: Vec<Option<wgpu::TextureView>> = signature.iter().map(|&b| resolve(b)).collect();
            let views: [&wgpu::TextureView; 4] =
                std::array::from_fn(|slot| owned[slot].as_ref().unwrap_or(&self.fallback_views[slot]));

            let bind_group = Self::create_group(
                device,
                &self.layout,
                &self.sampler,
                views,
                &format!("material_{}_bind_group", material.name),
            );
            log::trace!("Material '{}' bound as {:?}", material.name, signature);
            self.cache.insert(id, CachedGroup { signature, bind_group });
            rebuilt += 1;
        }
        rebuilt
    }

    /// Bind group for `material`, or the all-fallback group
    pub fn bind_group(&self, material: Option<MaterialId>) -> &wgpu::BindGroup {
        material
            .and_then(|id| self.cache.get(&id))
            .map_or(&self.default_group, |c| &c.bind_group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::texture::tests::rgba_image;
    use crate::asset::texture::{TextureCategory, TextureSource};
    use crate::streaming::headless::{HeadlessTexture, HeadlessUploadBackend};
    use crate::streaming::scheduler::TextureStreamer;

    fn loaded(registry: &mut AssetRegistry<HeadlessTexture>, name: &str) -> TextureId {
        let (id, _) = registry.register_texture(TextureSource::new(format!("{name}.png"), TextureCategory::Uncompressed));
        let texture = registry.texture_mut(id).unwrap();
        texture.begin_loading().unwrap();
        texture.finish_loading(rgba_image(8, 8)).unwrap();
        id
    }

    #[test]
    fn test_signature_follows_residency_and_mips() {
        let mut registry = AssetRegistry::new();
        let alb = loaded(&mut registry, "Hair_ALB");
        let mut material = Material::named("Hair");
        material.basecolor = Some(alb);

        let fallback = [SlotBinding::Fallback; 4];
        assert_eq!(material_signature(&material, &registry), fallback);

        let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::new(), 1, 1 << 16, true);
        streamer.tick(&mut registry);
        // In flight: still not resident
        assert_eq!(material_signature(&material, &registry), fallback);

        streamer.backend_mut().signal_all();
        streamer.tick(&mut registry);
        assert_eq!(material_signature(&material, &registry)[0], SlotBinding::BaseOnly(alb));

        streamer.generate_next_mipmap(&mut registry);
        assert_eq!(material_signature(&material, &registry)[0], SlotBinding::Full(alb));
        assert_eq!(material_signature(&material, &registry)[3], SlotBinding::Fallback);
    }

    #[test]
    fn test_failed_mipmaps_bind_base_level() {
        let mut registry = AssetRegistry::new();
        let alb = loaded(&mut registry, "Hair_ALB");
        let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::new(), 1, 1 << 16, true);
        streamer.backend_mut().fail_mipmaps_for("Hair_ALB");
        streamer.tick(&mut registry);
        streamer.backend_mut().signal_all();
        streamer.tick(&mut registry);

        assert_eq!(streamer.generate_next_mipmap(&mut registry), Some(alb));
        assert_eq!(SlotBinding::of(Some(alb), &registry), SlotBinding::BaseOnly(alb));
    }

    #[test]
    fn test_disabled_mipmaps_bind_single_level() {
        let mut registry = AssetRegistry::new();
        let alb = loaded(&mut registry, "Hair_ALB");
        let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::new(), 1, 1 << 16, false);
        streamer.tick(&mut registry);
        streamer.backend_mut().signal_all();
        streamer.tick(&mut registry);

        assert_eq!(registry.texture(alb).unwrap().gpu().unwrap().mip_level_count, 1);
        assert_eq!(SlotBinding::of(Some(alb), &registry), SlotBinding::Full(alb));
    }

    #[test]
    fn test_single_level_texture_binds_fully() {
        let mut registry = AssetRegistry::new();
        let (id, _) = registry.register_texture(TextureSource::new("Logo.png", TextureCategory::Ui));
        let texture = registry.texture_mut(id).unwrap();
        texture.begin_loading().unwrap();
        texture.finish_loading(rgba_image(8, 8)).unwrap();

        let mut streamer = TextureStreamer::with_pool(HeadlessUploadBackend::new(), 1, 1 << 16, true);
        streamer.tick(&mut registry);
        streamer.backend_mut().signal_all();
        streamer.tick(&mut registry);
        assert_eq!(SlotBinding::of(Some(id), &registry), SlotBinding::Full(id));
        assert_eq!(SlotBinding::of(None, &registry), SlotBinding::Fallback);
    }
}
