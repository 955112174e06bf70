//! Materials, texture units and the material cache

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bitflags::bitflags;
use glam::{Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::texture::TextureData;
use crate::resources::wat::{WatFile, WatResult, WAT_BLOCK_COUNT};

bitflags! {
    /// Texture maps a material provides
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUnit: u32 {
        const ALBEDO = 1;
        const AO = 2;
        const DEPTH = 4;
        const METALLIC = 8;
        const NORMAL = 16;
        const ROUGHNESS = 32;
        const BLOCK0 = 64;
        const BLOCK1 = 128;
        const BLOCK2 = 256;
    }
}

impl TextureUnit {
    /// Flag of packed block `index`
    pub fn block(index: usize) -> Self {
        match index {
            0 => TextureUnit::BLOCK0,
            1 => TextureUnit::BLOCK1,
            2 => TextureUnit::BLOCK2,
            _ => TextureUnit::empty(),
        }
    }
}

/// Surface description shared by models
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub unique_id: u64,
    pub albedo: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    /// 0 is fully opaque; alpha is `1 - transparency`
    pub transparency: f32,
    pub units: TextureUnit,
    pub parallax_height_scale: f32,
    pub sampler: SamplerDescriptor,
    pub blocks: [Option<TextureData>; WAT_BLOCK_COUNT],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            unique_id: 0,
            albedo: Vec3::ONE,
            metallic: 0.0,
            roughness: 0.5,
            transparency: 0.0,
            units: TextureUnit::empty(),
            parallax_height_scale: 0.0,
            sampler: SamplerDescriptor::default(),
            blocks: [None, None, None],
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_albedo(mut self, albedo: Vec3) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_transparency(mut self, transparency: f32) -> Self {
        self.transparency = transparency.clamp(0.0, 1.0);
        self
    }

    /// Drawn by the forward stage instead of the G-buffer
    pub fn is_blend(&self) -> bool {
        self.transparency > 0.0
    }

    pub fn has_unit(&self, unit: TextureUnit) -> bool {
        self.units.intersects(unit)
    }

    /// Albedo with alpha derived from transparency
    pub fn color(&self) -> Vec4 {
        self.albedo.extend(1.0 - self.transparency)
    }

    /// Metallic, roughness and parallax scale as packed into draw uniforms
    pub fn params(&self) -> Vec4 {
        Vec4::new(self.metallic, self.roughness, self.parallax_height_scale, 0.0)
    }

    pub fn from_wat(name: &str, file: &WatFile) -> Self {
        let mut blocks: [Option<TextureData>; WAT_BLOCK_COUNT] = [None, None, None];
        for (index, (slot, block)) in blocks.iter_mut().zip(&file.blocks).enumerate() {
            *slot = block.as_ref().and_then(|data| {
                TextureData::from_raw(
                    file.width as u32,
                    file.height as u32,
                    data.clone(),
                    &format!("{name}.block{index}"),
                )
            });
        }

        Self {
            name: name.to_string(),
            unique_id: file.unique_id,
            albedo: file.albedo,
            metallic: file.metallic,
            roughness: file.roughness,
            transparency: file.transparency,
            units: file.units,
            parallax_height_scale: file.parallax_height_scale,
            sampler: file.sampler,
            blocks,
        }
    }

    /// Upload the present blocks as sampled textures
    pub fn upload<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> BackendResult<MaterialTextures> {
        let mut textures = MaterialTextures {
            blocks: [None; WAT_BLOCK_COUNT],
            sampler: self.sampler,
        };
        for (slot, block) in textures.blocks.iter_mut().zip(&self.blocks) {
            if let Some(data) = block {
                *slot = Some(data.upload(backend)?);
            }
        }
        Ok(textures)
    }
}

/// GPU textures of one material
#[derive(Debug, Clone, Copy)]
pub struct MaterialTextures {
    pub blocks: [Option<TextureHandle>; WAT_BLOCK_COUNT],
    pub sampler: SamplerDescriptor,
}

impl MaterialTextures {
    /// Bind block `i` to texture unit `i`, clearing previous bindings
    pub fn bind<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> BackendResult<()> {
        backend.unbind_textures();
        for (unit, handle) in self.blocks.iter().enumerate() {
            if let Some(handle) = handle {
                backend.bind_texture(unit as u32, TextureSource::Texture(*handle), &self.sampler)?;
            }
        }
        Ok(())
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        for handle in self.blocks.iter().flatten() {
            backend.destroy_texture(*handle);
        }
    }
}

/// Where a material comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialDescriptor {
    Wat(PathBuf),
    Inline {
        name: String,
        albedo: Vec3,
        metallic: f32,
        roughness: f32,
        transparency: f32,
    },
}

/// Resolves descriptors to shared materials, caching by path, unique id and name
#[derive(Debug)]
pub struct MaterialCache {
    by_path: HashMap<PathBuf, Arc<Material>>,
    by_id: HashMap<u64, Arc<Material>>,
    by_name: HashMap<String, Arc<Material>>,
    default: Arc<Material>,
}

impl Default for MaterialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialCache {
    pub fn new() -> Self {
        Self {
            by_path: HashMap::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            default: Arc::new(Material::default()),
        }
    }

    pub fn default_material(&self) -> Arc<Material> {
        self.default.clone()
    }

    pub fn len(&self) -> usize {
        self.by_path.len() + self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_by_id(&self, unique_id: u64) -> Option<Arc<Material>> {
        self.by_id.get(&unique_id).cloned()
    }

    pub fn resolve(&mut self, descriptor: &MaterialDescriptor) -> WatResult<Arc<Material>> {
        match descriptor {
            MaterialDescriptor::Wat(path) => self.load_wat(path),
            MaterialDescriptor::Inline {
                name,
                albedo,
                metallic,
                roughness,
                transparency,
            } => {
                if let Some(material) = self.by_name.get(name) {
                    return Ok(material.clone());
                }
                let material = Arc::new(
                    Material::new(name)
                        .with_albedo(*albedo)
                        .with_metallic(*metallic)
                        .with_roughness(*roughness)
                        .with_transparency(*transparency),
                );
                self.by_name.insert(name.clone(), material.clone());
                Ok(material)
            }
        }
    }

    fn load_wat(&mut self, path: &Path) -> WatResult<Arc<Material>> {
        if let Some(material) = self.by_path.get(path) {
            return Ok(material.clone());
        }
        let file = WatFile::read(path)?;

        // Same id under another path shares one material.
        let material = match self.by_id.get(&file.unique_id) {
            Some(existing) if file.unique_id != 0 => existing.clone(),
            _ => {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("material");
                let material = Arc::new(Material::from_wat(name, &file));
                if file.unique_id != 0 {
                    self.by_id.insert(file.unique_id, material.clone());
                }
                log::debug!("Loaded material {} from {}", name, path.display());
                material
            }
        };
        self.by_path.insert(path.to_path_buf(), material.clone());
        Ok(material)
    }

    /// Resolve every descriptor, skipping files that fail recoverably
    pub fn load_all(&mut self, descriptors: &[MaterialDescriptor]) -> WatResult<Vec<Arc<Material>>> {
        let mut materials = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match self.resolve(descriptor) {
                Ok(material) => materials.push(material),
                Err(err) if err.is_recoverable() => {
                    log::warn!("Skipping material {:?}: {}", descriptor, err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(materials)
    }
}
