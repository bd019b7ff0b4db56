//! Procedural meshes for the demo scene
//!
//! Geometry is generated on the CPU into [`MeshData`] and uploaded once
//! as a [`GpuMesh`]. Meshes are looked up by name, which is also how the
//! scene assigns materials and blending modes.

use std::collections::HashMap;
use std::f32::consts::{PI, TAU};

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::core::types::{Vec2, Vec3};

/// Interleaved vertex shared by every pipeline
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv: uv.to_array(),
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Indexed triangle list
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Square on the XZ plane facing +Y, centered at the origin
    pub fn plane(size: f32, uv_scale: f32) -> Self {
        let h = size * 0.5;
        let n = Vec3::Y;
        let vertices = vec![
            Vertex::new(Vec3::new(-h, 0.0, -h), n, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(-h, 0.0, h), n, Vec2::new(0.0, uv_scale)),
            Vertex::new(Vec3::new(h, 0.0, h), n, Vec2::new(uv_scale, uv_scale)),
            Vertex::new(Vec3::new(h, 0.0, -h), n, Vec2::new(uv_scale, 0.0)),
        ];
        Self {
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// UV sphere with `segments` around and `rings` from pole to pole
    pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Self::default();

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * TAU;
                let n = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                mesh.vertices.push(Vertex::new(n * radius, n, Vec2::new(u, v)));
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                mesh.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        mesh
    }

    /// Hair cards rooted on the upper part of a sphere
    ///
    /// Roots follow a golden-angle spiral so the coverage is even without
    /// any randomness. Each card is a strip of `segments` quads; `uv.y` runs
    /// from 0 at the root to 1 at the tip.
    pub fn hair_cards(params: &HairCardParams) -> Self {
        let mut mesh = Self::default();
        let golden = PI * (3.0 - 5.0_f32.sqrt());
        let segments = params.segments.max(1);

        for card in 0..params.count {
            let f = (card as f32 + 0.5) / params.count.max(1) as f32;
            let theta = params.polar_min + (params.polar_max - params.polar_min) * f;
            let phi = card as f32 * golden;
            let outward = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            let root = outward * params.radius;

            let side = outward.cross(Vec3::Y).try_normalize().unwrap_or(Vec3::X) * (params.width * 0.5);
            let base = mesh.vertices.len() as u32;
            for step in 0..=segments {
                let t = step as f32 / segments as f32;
                // Lift away from the scalp first, then fall under gravity
                let center = root + outward * (params.lift * (1.0 - (1.0 - t) * (1.0 - t))) - Vec3::Y * (params.length * t);
                mesh.vertices.push(Vertex::new(center - side, outward, Vec2::new(0.0, t)));
                mesh.vertices.push(Vertex::new(center + side, outward, Vec2::new(1.0, t)));
            }
            for step in 0..segments {
                let a = base + step * 2;
                mesh.indices.extend_from_slice(&[a, a + 2, a + 1, a + 1, a + 2, a + 3]);
            }
        }
        mesh
    }
}

/// Shape of a procedural hair card set
#[derive(Clone, Copy, Debug)]
pub struct HairCardParams {
    pub count: u32,
    /// Radius of the sphere the roots sit on
    pub radius: f32,
    /// Polar angle range of the roots, measured from +Y
    pub polar_min: f32,
    pub polar_max: f32,
    pub length: f32,
    pub width: f32,
    /// Outward offset reached at the tip
    pub lift: f32,
    pub segments: u32,
}

impl Default for HairCardParams {
    fn default() -> Self {
        Self {
            count: 160,
            radius: 0.105,
            polar_min: 0.05,
            polar_max: 1.9,
            length: 0.35,
            width: 0.03,
            lift: 0.04,
            segments: 6,
        }
    }
}

/// Index of a mesh in the library
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

/// Named CPU meshes
#[derive(Default)]
pub struct MeshLibrary {
    meshes: Vec<(String, MeshData)>,
    names: HashMap<String, MeshId>,
}

impl MeshLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh; a repeated name replaces the earlier geometry
    pub fn add(&mut self, name: impl Into<String>, data: MeshData) -> MeshId {
        let name = name.into();
        if let Some(&id) = self.names.get(&name) {
            self.meshes[id.0 as usize].1 = data;
            return id;
        }
        let id = MeshId(self.meshes.len() as u32);
        self.names.insert(name.clone(), id);
        self.meshes.push((name, data));
        id
    }

    pub fn id(&self, name: &str) -> Option<MeshId> {
        self.names.get(name).copied()
    }

    pub fn get(&self, id: MeshId) -> Option<&MeshData> {
        self.meshes.get(id.0 as usize).map(|(_, m)| m)
    }

    pub fn name(&self, id: MeshId) -> Option<&str> {
        self.meshes.get(id.0 as usize).map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &str, &MeshData)> {
        self.meshes
            .iter()
            .enumerate()
            .map(|(i, (n, m))| (MeshId(i as u32), n.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Room, head and the two hair card sets
    pub fn demo() -> Self {
        let mut library = Self::new();
        library.add("Floor", MeshData::plane(4.0, 4.0));
        library.add("Wall", MeshData::plane(4.0, 4.0));
        library.add("Ceiling", MeshData::plane(4.0, 2.0));
        library.add("Head", MeshData::uv_sphere(0.1, 32, 24));
        library.add("HairScalp", MeshData::uv_sphere(0.103, 32, 24));
        library.add("HairOutta", MeshData::hair_cards(&HairCardParams::default()));
        library.add(
            "HairInner",
            MeshData::hair_cards(&HairCardParams {
                count: 120,
                radius: 0.102,
                length: 0.3,
                lift: 0.02,
                ..HairCardParams::default()
            }),
        );
        library
    }
}

/// Mesh resident on the GPU
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, label: &str, data: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_vertices")),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_indices")),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        }
    }

    /// Upload a whole library; the result is indexed by `MeshId`
    pub fn upload_library(device: &wgpu::Device, library: &MeshLibrary) -> Vec<GpuMesh> {
        library
            .iter()
            .map(|(_, name, data)| Self::upload(device, name, data))
            .collect()
    }
}
