//! Shader sources by role, with validated hot reload
//!
//! Sources are read from the shader directory when present and fall back to
//! the copies embedded at build time. A reload parses and validates every
//! source with naga first; if any of them fails, nothing is replaced and the
//! running pipelines stay as they are.

use std::path::{Path, PathBuf};

use crate::core::error::Error;
use crate::core::Result;

/// Fixed shader programs, one per rendering effect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderRole {
    Lighting,
    DepthSeed,
    HairDepthPeel,
    HairLayerComposite,
    HairFinalComposite,
    Display,
    Mipmap,
}

impl ShaderRole {
    pub const ALL: [ShaderRole; 7] = [
        ShaderRole::Lighting,
        ShaderRole::DepthSeed,
        ShaderRole::HairDepthPeel,
        ShaderRole::HairLayerComposite,
        ShaderRole::HairFinalComposite,
        ShaderRole::Display,
        ShaderRole::Mipmap,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ShaderRole::Lighting => "lighting.wgsl",
            ShaderRole::DepthSeed => "depth_seed.wgsl",
            ShaderRole::HairDepthPeel => "hair_depth_peel.wgsl",
            ShaderRole::HairLayerComposite => "hair_layer_composite.wgsl",
            ShaderRole::HairFinalComposite => "hair_final_composite.wgsl",
            ShaderRole::Display => "display.wgsl",
            ShaderRole::Mipmap => "mipmap.wgsl",
        }
    }

    /// Source compiled into the binary
    pub fn embedded(self) -> &'static str {
        match self {
            ShaderRole::Lighting => include_str!("../../shaders/lighting.wgsl"),
            ShaderRole::DepthSeed => include_str!("../../shaders/depth_seed.wgsl"),
            ShaderRole::HairDepthPeel => include_str!("../../shaders/hair_depth_peel.wgsl"),
            ShaderRole::HairLayerComposite => include_str!("../../shaders/hair_layer_composite.wgsl"),
            ShaderRole::HairFinalComposite => include_str!("../../shaders/hair_final_composite.wgsl"),
            ShaderRole::Display => include_str!("../../shaders/display.wgsl"),
            ShaderRole::Mipmap => include_str!("../../shaders/mipmap.wgsl"),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Parse and validate WGSL without a device
pub fn validate_wgsl(name: &str, source: &str) -> Result<()> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| Error::Shader {
        name: name.to_owned(),
        message: e.emit_to_string(source),
    })?;
    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
        .validate(&module)
        .map_err(|e| Error::Shader {
            name: name.to_owned(),
            message: e.emit_to_string(source),
        })?;
    Ok(())
}

/// Current source of every shader role
pub struct ShaderLibrary {
    dir: PathBuf,
    sources: Vec<String>,
    generation: u32,
}

impl ShaderLibrary {
    /// Load from `dir`, using embedded sources for missing or invalid files
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let sources = ShaderRole::ALL
            .iter()
            .map(|&role| match Self::read(&dir, role) {
                Ok(Some(source)) => source,
                Ok(None) => role.embedded().to_owned(),
                Err(e) => {
                    log::warn!("{e}; using built-in {}", role.file_name());
                    role.embedded().to_owned()
                }
            })
            .collect();
        Self {
            dir,
            sources,
            generation: 0,
        }
    }

    /// Embedded sources only
    pub fn embedded() -> Self {
        Self {
            dir: PathBuf::new(),
            sources: ShaderRole::ALL.iter().map(|r| r.embedded().to_owned()).collect(),
            generation: 0,
        }
    }

    /// Read and validate one role's file; `None` when the file does not exist
    fn read(dir: &Path, role: ShaderRole) -> Result<Option<String>> {
        let path = dir.join(role.file_name());
        if !path.is_file() {
            return Ok(None);
        }
        let source = std::fs::read_to_string(&path)?;
        validate_wgsl(role.file_name(), &source)?;
        Ok(Some(source))
    }

    /// Re-read every shader from disk
    ///
    /// All-or-nothing: returns the first error and keeps the previous
    /// sources when any file fails to parse or validate.
    pub fn reload(&mut self) -> Result<()> {
        let mut fresh = Vec::with_capacity(ShaderRole::ALL.len());
        for role in ShaderRole::ALL {
            let source = Self::read(&self.dir, role)?.unwrap_or_else(|| self.sources[role.index()].clone());
            fresh.push(source);
        }
        self.sources = fresh;
        self.generation += 1;
        log::info!("Reloaded {} shaders from {}", ShaderRole::ALL.len(), self.dir.display());
        Ok(())
    }

    pub fn source(&self, role: ShaderRole) -> &str {
        &self.sources[role.index()]
    }

    /// Number of successful reloads
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_shaders_validate() {
        for role in ShaderRole::ALL {
            if let Err(e) = validate_wgsl(role.file_name(), role.embedded()) {
                panic!("{e}");
            }
        }
    }

    #[test]
    fn test_missing_dir_uses_embedded() {
        let library = ShaderLibrary::load("/no/such/shader/dir");
        assert_eq!(library.source(ShaderRole::Display), ShaderRole::Display.embedded());
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = ShaderLibrary::load(dir.path());

        let edited = format!("// edited\n{}", ShaderRole::Mipmap.embedded());
        std::fs::write(dir.path().join("mipmap.wgsl"), &edited).unwrap();
        library.reload().unwrap();
        assert_eq!(library.source(ShaderRole::Mipmap), edited);
        assert_eq!(library.generation(), 1);
    }

    #[test]
    fn test_broken_reload_keeps_old_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = ShaderLibrary::load(dir.path());
        let before = library.source(ShaderRole::Lighting).to_owned();

        std::fs::write(dir.path().join("lighting.wgsl"), "fn broken( {").unwrap();
        let err = library.reload().unwrap_err();
        assert!(matches!(err, Error::Shader { ref name, .. } if name == "lighting.wgsl"));
        assert_eq!(library.source(ShaderRole::Lighting), before);
        assert_eq!(library.generation(), 0);
    }
}
