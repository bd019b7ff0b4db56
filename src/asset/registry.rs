//! Asset registry: the single owner of every texture and material
//!
//! Entries are only ever appended. A [`TextureId`] or [`MaterialId`] handed
//! out once stays valid and keeps pointing at the same asset for the life of
//! the registry.

use std::collections::HashMap;

use crate::asset::material::{Material, MaterialId};
use crate::asset::texture::{TextureId, TextureResource, TextureSource};

/// Textures and materials with name lookup tables
pub struct AssetRegistry<H> {
    textures: Vec<TextureResource<H>>,
    texture_names: HashMap<String, TextureId>,
    materials: Vec<Material>,
    material_names: HashMap<String, MaterialId>,
}

impl<H> AssetRegistry<H> {
    pub fn new() -> Self {
        Self {
            textures: Vec::new(),
            texture_names: HashMap::new(),
            materials: Vec::new(),
            material_names: HashMap::new(),
        }
    }

    /// Register a texture, or return the id already bound to its name
    ///
    /// The second value is `true` when a new entry was created.
    pub fn register_texture(&mut self, source: TextureSource) -> (TextureId, bool) {
        if let Some(&id) = self.texture_names.get(&source.name) {
            if self.textures[id.index()].source().path != source.path {
                log::warn!(
                    "Texture name '{}' already taken by {}, ignoring {}",
                    source.name,
                    self.textures[id.index()].source().path.display(),
                    source.path.display()
                );
            }
            return (id, false);
        }
        let id = TextureId(self.textures.len() as u32);
        self.texture_names.insert(source.name.clone(), id);
        self.textures.push(TextureResource::new(source));
        (id, true)
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureResource<H>> {
        self.textures.get(id.index())
    }

    pub fn texture_mut(&mut self, id: TextureId) -> Option<&mut TextureResource<H>> {
        self.textures.get_mut(id.index())
    }

    pub fn texture_id(&self, name: &str) -> Option<TextureId> {
        self.texture_names.get(name).copied()
    }

    pub fn texture_by_name(&self, name: &str) -> Option<&TextureResource<H>> {
        self.texture_id(name).and_then(|id| self.texture(id))
    }

    /// All textures in registration order
    pub fn textures(&self) -> impl Iterator<Item = (TextureId, &TextureResource<H>)> {
        self.textures
            .iter()
            .enumerate()
            .map(|(i, t)| (TextureId(i as u32), t))
    }

    /// Mutable access to the backing storage for parallel decoding
    pub fn textures_mut(&mut self) -> &mut [TextureResource<H>] {
        &mut self.textures
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// First texture, in registration order, that is ready to bake
    pub fn first_bake_candidate(&self) -> Option<TextureId> {
        self.textures().find(|(_, t)| t.is_bake_candidate()).map(|(id, _)| id)
    }

    /// Add a material, or return the existing id for its name
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        if let Some(&id) = self.material_names.get(&material.name) {
            return id;
        }
        let id = MaterialId(self.materials.len() as u32);
        self.material_names.insert(material.name.clone(), id);
        self.materials.push(material);
        id
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id.0 as usize)
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.material_names.get(name).copied()
    }

    pub fn materials(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials
            .iter()
            .enumerate()
            .map(|(i, m)| (MaterialId(i as u32), m))
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}

impl<H> Default for AssetRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::texture::TextureCategory;

    fn source(name: &str) -> TextureSource {
        TextureSource::new(format!("tex/{name}.png"), TextureCategory::Uncompressed)
    }

    #[test]
    fn test_ids_are_stable_and_sequential() {
        let mut registry: AssetRegistry<()> = AssetRegistry::new();
        let (a, new_a) = registry.register_texture(source("A"));
        let (b, _) = registry.register_texture(source("B"));
        let (a_again, new_again) = registry.register_texture(source("A"));

        assert!(new_a);
        assert!(!new_again);
        assert_eq!(a, TextureId(0));
        assert_eq!(b, TextureId(1));
        assert_eq!(a_again, a);
        assert_eq!(registry.texture_count(), 2);
        assert_eq!(registry.texture_id("B"), Some(b));
        assert_eq!(registry.texture(b).unwrap().name(), "B");
    }

    #[test]
    fn test_material_names_are_unique() {
        let mut registry: AssetRegistry<()> = AssetRegistry::new();
        let first = registry.add_material(Material::named("Hair"));
        let second = registry.add_material(Material::named("Hair"));
        assert_eq!(first, second);
        assert_eq!(registry.material_count(), 1);
        assert_eq!(registry.material_id("Hair"), Some(first));
    }
}
