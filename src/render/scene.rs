//! Demo scene and per-frame draw lists

use crate::asset::material::MaterialId;
use crate::asset::registry::AssetRegistry;
use crate::core::types::{Mat4, Quat, Vec3, Vec4};
use crate::render::mesh::{MeshId, MeshLibrary};

/// How an object is drawn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendingMode {
    /// Opaque
    None,
    /// Alpha blended after the opaque pass
    Blended,
    /// Opaque with an alpha test
    AlphaDiscarded,
    /// Hair peeled in the second (inner) layer set
    HairUnderLayer,
    /// Hair peeled in the first (outer) layer set
    HairTopLayer,
    DoNotRender,
}

impl BlendingMode {
    pub fn is_hair(self) -> bool {
        matches!(self, BlendingMode::HairUnderLayer | BlendingMode::HairTopLayer)
    }

    /// Alpha-test threshold passed to the lighting shader
    pub fn alpha_cutoff(self) -> f32 {
        match self {
            BlendingMode::AlphaDiscarded => 0.5,
            _ => 0.0,
        }
    }
}

/// Something placed in the world
#[derive(Clone, Debug)]
pub struct GameObject {
    pub name: String,
    pub mesh: MeshId,
    pub material: Option<MaterialId>,
    pub blending: BlendingMode,
    pub transform: Mat4,
    pub tint: Vec4,
}

/// One draw in a pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderItem {
    pub mesh: MeshId,
    pub material: Option<MaterialId>,
    pub model: Mat4,
    /// Index of the object's uniform slot
    pub object_slot: usize,
}

/// Flat list of objects
#[derive(Default)]
pub struct Scene {
    pub objects: Vec<GameObject>,
}

/// Material and blending by mesh name
const DEMO_ASSIGNMENTS: &[(&str, &str, BlendingMode)] = &[
    ("Floor", "BathroomFloor", BlendingMode::None),
    ("Wall", "BathroomWall", BlendingMode::None),
    ("Ceiling", "Ceiling2", BlendingMode::None),
    ("Head", "Skin", BlendingMode::None),
    ("HairScalp", "MermaidHair", BlendingMode::Blended),
    ("HairOutta", "MermaidHair", BlendingMode::HairTopLayer),
    ("HairInner", "MermaidHair", BlendingMode::HairUnderLayer),
];

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: GameObject) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    /// Refill `out` with the objects drawn in `mode`
    ///
    /// `out` is cleared first and keeps its allocation between frames.
    pub fn collect_items(&self, mode: BlendingMode, out: &mut Vec<RenderItem>) {
        out.clear();
        out.extend(
            self.objects
                .iter()
                .enumerate()
                .filter(|(_, o)| o.blending == mode)
                .map(|(slot, o)| RenderItem {
                    mesh: o.mesh,
                    material: o.material,
                    model: o.transform,
                    object_slot: slot,
                }),
        );
    }

    /// Bathroom with a head and two hair card sets
    ///
    /// Objects whose mesh is missing from the library are skipped. Materials
    /// are resolved by name and left `None` when not registered.
    pub fn demo<H>(meshes: &MeshLibrary, registry: &AssetRegistry<H>) -> Self {
        let mut scene = Self::new();
        let head_at = Vec3::new(0.0, 1.5, 0.0);
        let half = 2.0;

        let mut place = |mesh_name: &str, transform: Mat4, tint: Vec4| {
            let Some(mesh) = meshes.id(mesh_name) else {
                log::warn!("Demo mesh '{}' missing", mesh_name);
                return;
            };
            let (material_name, blending) = DEMO_ASSIGNMENTS
                .iter()
                .find(|(m, _, _)| *m == mesh_name)
                .map(|&(_, material, blending)| (material, blending))
                .unwrap_or(("", BlendingMode::None));
            let material = registry.material_id(material_name);
            if material.is_none() && !material_name.is_empty() {
                log::debug!("Material '{}' not found for '{}'", material_name, mesh_name);
            }
            scene.add(GameObject {
                name: mesh_name.to_owned(),
                mesh,
                material,
                blending,
                transform,
                tint,
            });
        };

        place("Floor", Mat4::IDENTITY, Vec4::ONE);
        place(
            "Ceiling",
            Mat4::from_rotation_translation(Quat::from_rotation_x(std::f32::consts::PI), Vec3::new(0.0, 2.6, 0.0)),
            Vec4::ONE,
        );
        for i in 0..4 {
            let yaw = i as f32 * std::f32::consts::FRAC_PI_2;
            let rotation = Quat::from_rotation_y(yaw) * Quat::from_rotation_x(std::f32::consts::FRAC_PI_2);
            let position = Quat::from_rotation_y(yaw) * Vec3::new(0.0, 1.3, -half);
            place(
                "Wall",
                Mat4::from_scale_rotation_translation(Vec3::new(1.0, 1.0, 0.65), rotation, position),
                Vec4::ONE,
            );
        }
        let head = Mat4::from_translation(head_at);
        place("Head", head, Vec4::new(0.85, 0.68, 0.6, 1.0));
        place("HairScalp", head, Vec4::new(1.0, 1.0, 1.0, 0.9));
        place("HairInner", head, Vec4::ONE);
        place("HairOutta", head, Vec4::ONE);
        scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::material::Material;

    #[test]
    fn test_collect_items_filters_and_reuses() {
        let meshes = MeshLibrary::demo();
        let registry: AssetRegistry<()> = AssetRegistry::new();
        let scene = Scene::demo(&meshes, &registry);

        let mut items = Vec::with_capacity(16);
        scene.collect_items(BlendingMode::HairTopLayer, &mut items);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].mesh, meshes.id("HairOutta").unwrap());
        assert_eq!(scene.objects[items[0].object_slot].name, "HairOutta");

        let capacity = items.capacity();
        scene.collect_items(BlendingMode::HairUnderLayer, &mut items);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].mesh, meshes.id("HairInner").unwrap());
        assert_eq!(items.capacity(), capacity);

        scene.collect_items(BlendingMode::DoNotRender, &mut items);
        assert!(items.is_empty());
    }

    #[test]
    fn test_demo_assignments() {
        let meshes = MeshLibrary::demo();
        let mut registry: AssetRegistry<()> = AssetRegistry::new();
        let hair = registry.add_material(Material::named("MermaidHair"));
        let scene = Scene::demo(&meshes, &registry);

        let by_name = |name: &str| scene.objects.iter().find(|o| o.name == name).unwrap();
        assert_eq!(by_name("HairOutta").blending, BlendingMode::HairTopLayer);
        assert_eq!(by_name("HairInner").blending, BlendingMode::HairUnderLayer);
        assert_eq!(by_name("HairScalp").blending, BlendingMode::Blended);
        assert_eq!(by_name("HairOutta").material, Some(hair));
        assert_eq!(by_name("Floor").material, None);
        assert_eq!(scene.objects.iter().filter(|o| o.name == "Wall").count(), 4);
    }

    #[test]
    fn test_only_alpha_discarded_has_cutoff() {
        assert_eq!(BlendingMode::AlphaDiscarded.alpha_cutoff(), 0.5);
        assert_eq!(BlendingMode::HairTopLayer.alpha_cutoff(), 0.0);
        assert!(BlendingMode::HairUnderLayer.is_hair());
        assert!(!BlendingMode::Blended.is_hair());
    }
}
