//! Chunked scene behaviour through the public API.

mod common;

use std::sync::Arc;

use glam::Vec3;
use rstest::rstest;

use common::cube;
use deferred_engine::resources::Material;
use deferred_engine::scene::{
    Camera, Category, Chunk, ChunkCoords, Order, Scene, SceneError, TerrainChunk,
};

fn scene_at_origin() -> Scene {
    let mut scene = Scene::new(32.0, 1);
    scene.set_camera(Camera::new(Vec3::ZERO, -Vec3::Z));
    scene
}

#[rstest]
#[case::single(0, 1)]
#[case::ring(1, 9)]
#[case::two_rings(2, 25)]
fn test_stream_fills_view_distance(#[case] view_distance: u32, #[case] expected: usize) {
    let mut scene = Scene::new(16.0, view_distance);
    let stats = scene.stream_chunks(Vec3::new(8.0, 0.0, 8.0), Chunk::new);
    assert_eq!(stats.loaded, expected);
    assert_eq!(scene.chunk_count(), expected);

    // Nothing new within range.
    let stats = scene.stream_chunks(Vec3::new(9.0, 0.0, 9.0), Chunk::new);
    assert_eq!(stats.loaded + stats.evicted, 0);
}

#[test]
fn test_stream_moves_with_center() {
    let mut scene = Scene::new(16.0, 1);
    scene.stream_chunks(Vec3::ZERO, Chunk::new);
    let stats = scene.stream_chunks(Vec3::new(16.0, 0.0, 0.0), Chunk::new);
    // One column leaves, one enters.
    assert_eq!(stats.evicted, 3);
    assert_eq!(stats.loaded, 3);
    assert!(scene.chunk(ChunkCoords::new(-1, 0)).is_none());
    assert!(scene.chunk(ChunkCoords::new(2, 0)).is_some());
}

#[test]
fn test_colliding_coordinates_are_rejected_while_streaming() {
    let mut scene = Scene::new(16.0, 0);
    scene.insert_chunk(Chunk::new(ChunkCoords::new(0, 1), 16.0)).unwrap();

    let far = ChunkCoords::new(-32_917_205, 0);
    assert!(matches!(
        scene.insert_chunk(Chunk::new(far, 16.0)),
        Err(SceneError::ChunkHashCollision { .. })
    ));
    assert!(scene.chunk(far).is_none());
    assert!(scene.chunk(ChunkCoords::new(0, 1)).is_some());
}

#[test]
fn test_terrain_stitched_to_loaded_neighbor() {
    let mut scene = Scene::new(16.0, 1);
    let west = ChunkCoords::new(0, 0);
    let east = ChunkCoords::new(1, 0);
    scene
        .insert_chunk(Chunk::new(west, 16.0).with_terrain(TerrainChunk::from_fn(west, 16.0, 5, |_, _| 0.0)))
        .unwrap();
    scene
        .insert_chunk(Chunk::new(east, 16.0).with_terrain(TerrainChunk::from_fn(east, 16.0, 5, |_, _| 5.0)))
        .unwrap();

    let west_terrain = scene.chunk(west).unwrap().terrain.as_ref().unwrap();
    let east_terrain = scene.chunk(east).unwrap().terrain.as_ref().unwrap();
    for i in 0..5 {
        // The late chunk adopts the loaded border; the loaded chunk is untouched.
        assert_eq!(east_terrain.height(0, i), west_terrain.height(4, i));
        assert_eq!(west_terrain.height(4, i), 0.0);
        assert_eq!(east_terrain.height(2, i), 5.0);
    }
}

#[test]
fn test_blend_models_traverse_back_to_front_across_chunks() {
    let mut scene = scene_at_origin();
    let glass = Arc::new(Material::new("glass").with_transparency(0.4));
    for z in [-3.0, -40.0, -6.0] {
        scene
            .add_model(cube(&format!("glass{z}"), Vec3::new(1.0, 0.0, z), 1.0, glass.clone()))
            .unwrap();
    }
    scene
        .add_model(cube("wall", Vec3::new(1.0, 0.0, -10.0), 1.0, Arc::new(Material::new("wall"))))
        .unwrap();
    scene.sort(Vec3::ZERO);

    let mut depths = Vec::new();
    let visited = scene.traverse_models(
        |m| depths.push(m.read().transform.position.z),
        |_| true,
        Order::BackToFront,
        Category::Blend,
    );
    assert_eq!(visited, 3);
    assert_eq!(depths, vec![-40.0, -6.0, -3.0]);

    let mut opaque = 0;
    scene.traverse_models(|_| opaque += 1, |_| true, Order::FrontToBack, Category::Opaque);
    assert_eq!(opaque, 1);
}

#[test]
fn test_predicate_filters_models() {
    let mut scene = scene_at_origin();
    let material = Arc::new(Material::new("stone"));
    let hidden = scene
        .add_model(cube("hidden", Vec3::new(0.0, 0.0, -4.0), 1.0, material.clone()))
        .unwrap();
    scene
        .add_model(cube("shown", Vec3::new(0.0, 0.0, -8.0), 1.0, material))
        .unwrap();
    hidden.write().visible = false;

    let visited = scene.traverse_models(|_| {}, |m| m.visible, Order::Irrelevant, Category::Irrelevant);
    assert_eq!(visited, 1);
    assert!(scene.remove_model(&hidden));
    assert_eq!(scene.model_count(), 1);
}
