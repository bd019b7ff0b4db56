//! Frame renderer
//!
//! A frame is recorded into one command encoder:
//! 1. scene pass: opaque and alpha-tested geometry, then blended geometry
//! 2. hair: the peel plan, step by step, into the accumulation targets
//! 3. final composite of scene color and hair into the output target
//! 4. display blit of the output onto the surface

use crate::asset::registry::AssetRegistry;
use crate::core::camera::Camera;
use crate::core::config::{AppConfig, HairConfig, WaterConfig};
use crate::core::types::Vec3;
use crate::core::Result;
use crate::render::buffer::{GlobalsBuffer, GlobalsUniform, ObjectBuffer, ObjectUniform};
use crate::render::context::GpuContext;
use crate::render::hair::{plan_peel, LayerSet, LayerSetPlan, PeelCount, PeelPlan, PeelStep, FAR_SENTINEL};
use crate::render::materials::MaterialBindings;
use crate::render::mesh::{GpuMesh, MeshLibrary};
use crate::render::pipeline::{
    DepthPeelPipeline, DepthSeedPipeline, DisplayPipeline, FinalCompositePipeline, FinalParams,
    LayerCompositePipeline, LightingPipelines, SceneLayouts,
};
use crate::render::scene::{BlendingMode, RenderItem, Scene};
use crate::render::shaders::{ShaderLibrary, ShaderRole};
use crate::render::targets::RenderTargets;
use crate::render::upload::GpuTexture;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.03,
    a: 1.0,
};

/// Per-pass draw lists, refilled every frame without reallocating
#[derive(Default)]
struct DrawLists {
    opaque: Vec<RenderItem>,
    cutout: Vec<RenderItem>,
    blended: Vec<RenderItem>,
    /// Indexed like `LayerSet::ALL`
    hair: [Vec<RenderItem>; 2],
}

impl DrawLists {
    fn hair(&self, set: LayerSet) -> &[RenderItem] {
        match set {
            LayerSet::Top => &self.hair[0],
            LayerSet::Under => &self.hair[1],
        }
    }
}

pub struct Renderer {
    targets: RenderTargets,
    globals: GlobalsBuffer,
    objects: ObjectBuffer,
    object_uniforms: Vec<ObjectUniform>,
    materials: MaterialBindings,
    meshes: Vec<GpuMesh>,
    shaders: ShaderLibrary,
    lighting: LightingPipelines,
    depth_seed: DepthSeedPipeline,
    depth_peel: DepthPeelPipeline,
    layer_composite: LayerCompositePipeline,
    final_composite: FinalCompositePipeline,
    display: DisplayPipeline,
    display_bind_group: wgpu::BindGroup,
    draw_lists: DrawLists,
    plan: PeelPlan,
    peel_count: PeelCount,
    hair: HairConfig,
    water: WaterConfig,
    light_dir: Vec3,
}

impl Renderer {
    pub fn new(ctx: &GpuContext, meshes: &MeshLibrary, shaders: ShaderLibrary, config: &AppConfig) -> Self {
        let device = &ctx.device;
        let (width, height) = ctx.size();
        let targets = RenderTargets::new(device, width, height);

        let globals = GlobalsBuffer::new(device);
        let objects = ObjectBuffer::new(device, 64);
        let materials = MaterialBindings::new(device, &ctx.queue);
        let layouts = SceneLayouts {
            globals: globals.bind_group_layout(),
            object: objects.bind_group_layout(),
            material: materials.layout(),
        };

        let lighting = LightingPipelines::new(device, layouts, shaders.source(ShaderRole::Lighting));
        let depth_seed = DepthSeedPipeline::new(device, &targets, shaders.source(ShaderRole::DepthSeed));
        let depth_peel = DepthPeelPipeline::new(device, layouts, &targets, shaders.source(ShaderRole::HairDepthPeel));
        let layer_composite =
            LayerCompositePipeline::new(device, &targets, shaders.source(ShaderRole::HairLayerComposite));
        let final_composite =
            FinalCompositePipeline::new(device, &targets, shaders.source(ShaderRole::HairFinalComposite));
        let display = DisplayPipeline::new(device, ctx.format(), shaders.source(ShaderRole::Display));
        let display_bind_group = display.create_bind_group(device, &targets.output.view);

        log::info!("Renderer initialized at {}x{}", width, height);

        Self {
            targets,
            globals,
            objects,
            object_uniforms: Vec::new(),
            materials,
            meshes: GpuMesh::upload_library(device, meshes),
            shaders,
            lighting,
            depth_seed,
            depth_peel,
            layer_composite,
            final_composite,
            display,
            display_bind_group,
            draw_lists: DrawLists::default(),
            plan: PeelPlan::default(),
            peel_count: PeelCount::new(config.hair.peel_count),
            hair: config.hair.clone(),
            water: config.water.clone(),
            light_dir: Vec3::new(-0.4, -1.0, -0.3),
        }
    }

    pub fn peel_count(&self) -> PeelCount {
        self.peel_count
    }

    pub fn peel_count_mut(&mut self) -> &mut PeelCount {
        &mut self.peel_count
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    /// Recreate the screen-sized targets and everything bound to them
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if (width, height) == self.targets.size() || width == 0 || height == 0 {
            return;
        }
        self.targets = RenderTargets::new(device, width, height);
        self.depth_seed.resize(device, &self.targets);
        self.depth_peel.resize(device, &self.targets);
        self.layer_composite.resize(device, &self.targets);
        self.final_composite.resize(device, &self.targets);
        self.display_bind_group = self.display.create_bind_group(device, &self.targets.output.view);
        log::debug!("Render targets resized to {}x{}", width, height);
    }

    /// Re-read and validate every shader, then rebuild all pipelines
    ///
    /// On error nothing is rebuilt and the current pipelines stay active.
    pub fn reload_shaders(&mut self, device: &wgpu::Device) -> Result<()> {
        self.shaders.reload()?;
        let shaders = &self.shaders;
        self.lighting.rebuild(device, shaders.source(ShaderRole::Lighting));
        self.depth_seed.rebuild(device, shaders.source(ShaderRole::DepthSeed));
        self.depth_peel.rebuild(device, shaders.source(ShaderRole::HairDepthPeel));
        self.layer_composite.rebuild(device, shaders.source(ShaderRole::HairLayerComposite));
        self.final_composite.rebuild(device, shaders.source(ShaderRole::HairFinalComposite));
        self.display.rebuild(device, shaders.source(ShaderRole::Display));
        Ok(())
    }

    /// Refresh per-frame buffers and draw lists
    fn prepare(&mut self, ctx: &GpuContext, scene: &Scene, registry: &AssetRegistry<GpuTexture>, camera: &Camera, time: f32) {
        self.materials.update(&ctx.device, registry);

        let globals = GlobalsUniform::from_camera(camera, self.targets.size(), time, self.light_dir);
        self.globals.update(&ctx.queue, &globals);

        self.object_uniforms.clear();
        self.object_uniforms.extend(
            scene
                .objects
                .iter()
                .map(|o| ObjectUniform::new(o.transform, o.tint, o.blending.alpha_cutoff())),
        );
        self.objects.update(&ctx.device, &ctx.queue, &self.object_uniforms);

        let lists = &mut self.draw_lists;
        scene.collect_items(BlendingMode::None, &mut lists.opaque);
        scene.collect_items(BlendingMode::AlphaDiscarded, &mut lists.cutout);
        scene.collect_items(BlendingMode::Blended, &mut lists.blended);
        for (set, items) in LayerSet::ALL.iter().zip(lists.hair.iter_mut()) {
            scene.collect_items(set.blending(), items);
        }

        let sets = [
            LayerSetPlan {
                set: LayerSet::Top,
                order: self.hair.top_order,
                items: lists.hair(LayerSet::Top).len(),
            },
            LayerSetPlan {
                set: LayerSet::Under,
                order: self.hair.under_order,
                items: lists.hair(LayerSet::Under).len(),
            },
        ];
        plan_peel(self.peel_count, &sets, &mut self.plan);

        self.final_composite
            .update_params(&ctx.queue, &FinalParams::new(&self.water, camera.is_underwater));
    }

    /// Render and present one frame
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        scene: &Scene,
        registry: &AssetRegistry<GpuTexture>,
        camera: &Camera,
        time: f32,
    ) -> Result<()> {
        self.prepare(ctx, scene, registry, camera, time);

        let frame = ctx.get_current_texture()?;
        let surface_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        self.encode_scene(&mut encoder);
        for step in &self.plan.steps {
            self.encode_step(&mut encoder, *step);
        }
        let (width, height) = self.targets.size();
        self.final_composite.dispatch(&mut encoder, self.plan.result, width, height);
        self.display.render(&mut encoder, &surface_view, &self.display_bind_group);

        ctx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn encode_scene(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.targets.scene_color.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.targets.scene_depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_bind_group(0, self.globals.bind_group(false), &[]);

        pass.set_pipeline(&self.lighting.opaque);
        self.draw_items(&mut pass, &self.draw_lists.opaque);
        self.draw_items(&mut pass, &self.draw_lists.cutout);

        pass.set_pipeline(&self.lighting.blended);
        self.draw_items(&mut pass, &self.draw_lists.blended);
    }

    fn encode_step(&self, encoder: &mut wgpu::CommandEncoder, step: PeelStep) {
        let targets = &self.targets;
        match step {
            PeelStep::ClearAccumulation { target } => {
                clear_color_target(encoder, "hair_accumulation_clear", &targets.accumulation[target].view, wgpu::Color::TRANSPARENT);
            }
            PeelStep::ResetPreviousDepth { target } => {
                let far = wgpu::Color {
                    r: FAR_SENTINEL as f64,
                    g: 0.0,
                    b: 0.0,
                    a: 1.0,
                };
                clear_color_target(encoder, "hair_view_depth_reset", &targets.view_depth[target].view, far);
            }
            PeelStep::SeedHairDepth => self.depth_seed.seed(encoder, targets),
            PeelStep::CarryPreviousDepth { from, to } => {
                encoder.copy_texture_to_texture(
                    targets.view_depth[from].texture.as_image_copy(),
                    targets.view_depth[to].texture.as_image_copy(),
                    targets.extent(),
                );
            }
            PeelStep::DepthPass { set, previous, current } => {
                let mut pass = hair_pass(encoder, "hair_depth_peel_pass", &targets.view_depth[current].view, None, &targets.hair_depth.view);
                pass.set_pipeline(self.depth_peel.pipeline());
                pass.set_bind_group(0, self.globals.bind_group(true), &[]);
                pass.set_bind_group(3, self.depth_peel.previous_bind_group(previous), &[]);
                self.draw_items(&mut pass, self.draw_lists.hair(set));
            }
            PeelStep::ColorPass { set } => {
                let mut pass = hair_pass(
                    encoder,
                    "hair_color_pass",
                    &targets.hair_color.view,
                    Some(wgpu::Color::TRANSPARENT),
                    &targets.hair_depth.view,
                );
                pass.set_pipeline(&self.lighting.hair_color);
                pass.set_bind_group(0, self.globals.bind_group(true), &[]);
                self.draw_items(&mut pass, self.draw_lists.hair(set));
            }
            PeelStep::CompositeLayer { source, .. } => {
                let (width, height) = targets.size();
                self.layer_composite.dispatch(encoder, source, width, height);
            }
        }
    }

    /// Bind object, material and mesh for each item and draw it
    fn draw_items(&self, pass: &mut wgpu::RenderPass<'_>, items: &[RenderItem]) {
        for item in items {
            let Some(mesh) = self.meshes.get(item.mesh.0 as usize) else {
                continue;
            };
            pass.set_bind_group(1, self.objects.bind_group(), &[ObjectBuffer::offset(item.object_slot)]);
            pass.set_bind_group(2, self.materials.bind_group(item.material), &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

fn clear_color_target(encoder: &mut wgpu::CommandEncoder, label: &str, view: &wgpu::TextureView, color: wgpu::Color) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}

/// Render pass over the hair depth buffer; `clear` of `None` loads the color target
fn hair_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    color: &wgpu::TextureView,
    clear: Option<wgpu::Color>,
    depth: &wgpu::TextureView,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color,
            resolve_target: None,
            ops: wgpu::Operations {
                load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    })
}
