//! Materials assembled from texture naming conventions
//!
//! `Foo_ALB` is the base color of material `Foo`; `Foo_NRM`, `Foo_RMA` and
//! `Foo_SSS` are picked up when present. Missing normal/RMA maps fall back
//! to `Empty_NRMRMA`, a missing SSS map to `Black`.

use crate::asset::registry::AssetRegistry;
use crate::asset::texture::TextureId;

const BASECOLOR_SUFFIX: &str = "_ALB";
const NORMAL_SUFFIX: &str = "_NRM";
const RMA_SUFFIX: &str = "_RMA";
const SSS_SUFFIX: &str = "_SSS";

/// Fallback for absent normal and roughness/metallic/AO maps
pub const EMPTY_NRMRMA: &str = "Empty_NRMRMA";
/// Fallback for absent subsurface maps
pub const BLACK: &str = "Black";

/// Stable index of a material in the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Texture slots of one material; `None` slots use the renderer's defaults
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Material {
    pub name: String,
    pub basecolor: Option<TextureId>,
    pub normal: Option<TextureId>,
    pub rma: Option<TextureId>,
    pub sss: Option<TextureId>,
}

impl Material {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            basecolor: None,
            normal: None,
            rma: None,
            sss: None,
        }
    }

    /// Slots in binding order
    pub fn slots(&self) -> [Option<TextureId>; 4] {
        [self.basecolor, self.normal, self.rma, self.sss]
    }
}

/// Create or refresh a material for every `*_ALB` texture
///
/// Safe to call again after a rescan: existing materials keep their ids and
/// only pick up companions that did not exist before. Returns the number of
/// materials created.
pub fn build_materials<H>(registry: &mut AssetRegistry<H>) -> usize {
    let names: Vec<String> = registry
        .textures()
        .filter_map(|(_, t)| t.name().strip_suffix(BASECOLOR_SUFFIX))
        .filter(|stem| !stem.is_empty())
        .map(str::to_owned)
        .collect();

    let mut created = 0;
    for name in names {
        let find = |suffix: &str, fallback: Option<&str>| {
            registry
                .texture_id(&format!("{name}{suffix}"))
                .or_else(|| fallback.and_then(|f| registry.texture_id(f)))
        };
        let resolved = Material {
            name: name.clone(),
            basecolor: find(BASECOLOR_SUFFIX, Some(EMPTY_NRMRMA)),
            normal: find(NORMAL_SUFFIX, Some(EMPTY_NRMRMA)),
            rma: find(RMA_SUFFIX, Some(EMPTY_NRMRMA)),
            sss: find(SSS_SUFFIX, Some(BLACK)),
        };

        match registry.material_id(&name) {
            Some(id) => {
                if let Some(existing) = registry.material_mut(id) {
                    *existing = resolved;
                }
            }
            None => {
                log::debug!("Material '{}' created", name);
                registry.add_material(resolved);
                created += 1;
            }
        }
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::texture::{TextureCategory, TextureSource};

    fn register(registry: &mut AssetRegistry<()>, name: &str) -> TextureId {
        registry
            .register_texture(TextureSource::new(format!("t/{name}.png"), TextureCategory::Uncompressed))
            .0
    }

    #[test]
    fn test_companions_and_fallbacks() {
        let mut registry = AssetRegistry::new();
        let empty = register(&mut registry, EMPTY_NRMRMA);
        let black = register(&mut registry, BLACK);
        let alb = register(&mut registry, "Hair_ALB");
        let nrm = register(&mut registry, "Hair_NRM");

        assert_eq!(build_materials(&mut registry), 1);
        let hair = registry.material(registry.material_id("Hair").unwrap()).unwrap();
        assert_eq!(hair.basecolor, Some(alb));
        assert_eq!(hair.normal, Some(nrm));
        assert_eq!(hair.rma, Some(empty));
        assert_eq!(hair.sss, Some(black));
    }

    #[test]
    fn test_rebuild_keeps_ids_and_picks_up_new_maps() {
        let mut registry = AssetRegistry::new();
        register(&mut registry, "Floor_ALB");
        assert_eq!(build_materials(&mut registry), 1);
        let id = registry.material_id("Floor").unwrap();
        assert_eq!(registry.material(id).unwrap().rma, None);

        let rma = register(&mut registry, "Floor_RMA");
        assert_eq!(build_materials(&mut registry), 0);
        assert_eq!(registry.material_id("Floor"), Some(id));
        assert_eq!(registry.material(id).unwrap().rma, Some(rma));
    }

    #[test]
    fn test_bare_suffix_is_not_a_material() {
        let mut registry = AssetRegistry::new();
        register(&mut registry, "_ALB");
        register(&mut registry, "Skin_ALB");

        assert_eq!(build_materials(&mut registry), 1);
        assert_eq!(registry.material_id(""), None);
        assert!(registry.material_id("Skin").is_some());
    }
}
