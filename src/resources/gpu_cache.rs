//! GPU copies of shared meshes and materials
//!
//! Entries are keyed by the address of the shared `Arc` and keep a clone of it
//! alive, so a key is never reused while its entry exists. Once the cache
//! holds the only reference, [`GpuCache::collect_garbage`] frees the GPU side.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::traits::*;
use crate::resources::material::{Material, MaterialTextures};
use crate::resources::mesh::Mesh;

fn key<T>(shared: &Arc<T>) -> usize {
    Arc::as_ptr(shared) as usize
}

#[derive(Debug, Default)]
pub struct GpuCache {
    meshes: HashMap<usize, (Arc<Mesh>, MeshHandle)>,
    materials: HashMap<usize, (Arc<Material>, MaterialTextures)>,
}

impl GpuCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Handle for `mesh`, uploading it on first use
    pub fn mesh<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mesh: &Arc<Mesh>,
    ) -> BackendResult<MeshHandle> {
        if let Some((_, handle)) = self.meshes.get(&key(mesh)) {
            return Ok(*handle);
        }
        let handle = backend.create_mesh(&mesh.descriptor())?;
        self.meshes.insert(key(mesh), (mesh.clone(), handle));
        Ok(handle)
    }

    /// Textures for `material`, uploading its blocks on first use
    pub fn material<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        material: &Arc<Material>,
    ) -> BackendResult<MaterialTextures> {
        if let Some((_, textures)) = self.materials.get(&key(material)) {
            return Ok(*textures);
        }
        let textures = material.upload(backend)?;
        self.materials.insert(key(material), (material.clone(), textures));
        Ok(textures)
    }

    /// Free entries nothing outside the cache refers to; returns how many
    pub fn collect_garbage<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let mut freed = 0;
        self.meshes.retain(|_, (mesh, handle)| {
            let alive = Arc::strong_count(mesh) > 1;
            if !alive {
                backend.destroy_mesh(*handle);
                freed += 1;
            }
            alive
        });
        self.materials.retain(|_, (material, textures)| {
            let alive = Arc::strong_count(material) > 1;
            if !alive {
                textures.destroy(backend);
                freed += 1;
            }
            alive
        });
        if freed > 0 {
            log::debug!("GpuCache: freed {} unused resources", freed);
        }
        freed
    }

    pub fn release_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, (_, handle)) in self.meshes.drain() {
            backend.destroy_mesh(handle);
        }
        for (_, (_, textures)) in self.materials.drain() {
            textures.destroy(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;

    #[test]
    fn test_mesh_uploaded_once() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut cache = GpuCache::new();
        let cube = Arc::new(Mesh::cube());

        let a = cache.mesh(&mut backend, &cube).unwrap();
        let b = cache.mesh(&mut backend, &cube).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.mesh_count(), 1);
    }

    #[test]
    fn test_garbage_collection_frees_dropped() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut cache = GpuCache::new();
        let kept = Arc::new(Mesh::cube());
        let dropped = Arc::new(Mesh::sphere(8, 6));
        let material = Arc::new(Material::default());

        cache.mesh(&mut backend, &kept).unwrap();
        cache.mesh(&mut backend, &dropped).unwrap();
        cache.material(&mut backend, &material).unwrap();
        drop(dropped);
        drop(material);

        assert_eq!(cache.collect_garbage(&mut backend), 2);
        assert_eq!(cache.mesh_count(), 1);
        assert_eq!(cache.material_count(), 0);
    }
}
