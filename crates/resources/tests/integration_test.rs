//! Integration tests for fractal geometry and shader loading.

use std::path::{Path, PathBuf};

use fractal_resources::sierpinski::{DEFAULT_DEPTH, SEED_TRIANGLE, vertex_count};
use fractal_resources::{ResourceError, ShaderPair, sierpinski_points, sierpinski_vertices};
use pretty_assertions::assert_eq;

const SPIRV_MAGIC_LE: [u8; 4] = [0x03, 0x02, 0x23, 0x07];

/// A per-test scratch directory under the system temp dir.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "fractal-resources-{}-{}",
        name,
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("Failed to create scratch directory");
    dir
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write test file");
    path
}

fn minimal_spirv() -> Vec<u8> {
    let mut bytes = SPIRV_MAGIC_LE.to_vec();
    // Version, generator, bound, schema.
    bytes.extend_from_slice(&[0x00, 0x00, 0x01, 0x00]);
    bytes.extend_from_slice(&[0u8; 12]);
    bytes
}

#[test]
fn test_default_depth_vertex_count() {
    let vertices = sierpinski_vertices(DEFAULT_DEPTH).expect("Failed to generate fractal");

    assert_eq!(DEFAULT_DEPTH, 6);
    assert_eq!(vertices.len(), 3 * 3usize.pow(6));
    assert_eq!(vertices.len(), 2187);
    assert_eq!(vertices.len(), vertex_count(DEFAULT_DEPTH));
}

#[test]
fn test_vertex_count_per_depth() {
    for depth in 0..=7 {
        let points = sierpinski_points(SEED_TRIANGLE, depth).unwrap();
        assert_eq!(points.len(), vertex_count(depth), "depth {}", depth);
    }
}

#[test]
fn test_generation_is_deterministic() {
    let first = sierpinski_vertices(DEFAULT_DEPTH).unwrap();
    let second = sierpinski_vertices(DEFAULT_DEPTH).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_vertices_stay_inside_seed_bounds() {
    let vertices = sierpinski_vertices(4).unwrap();

    for vertex in &vertices {
        assert!((-0.7..=0.7).contains(&vertex.position.x));
        assert!((-0.7..=0.7).contains(&vertex.position.y));
    }
}

#[test]
fn test_vertex_colors_follow_position() {
    let vertices = sierpinski_vertices(3).unwrap();

    for vertex in &vertices {
        let expected_r = vertex.position.x / 2.0 + 0.5;
        let expected_g = vertex.position.y / 2.0 + 0.5;
        assert!((vertex.color.x - expected_r).abs() < 1e-6);
        assert!((vertex.color.y - expected_g).abs() < 1e-6);
        assert_eq!(vertex.color.z, 1.0);
    }
}

#[test]
fn test_first_vertex_is_top_corner() {
    let vertices = sierpinski_vertices(DEFAULT_DEPTH).unwrap();
    assert_eq!(vertices[0].position, SEED_TRIANGLE[0]);
}

#[test]
fn test_load_shader_pair() {
    let dir = scratch_dir("load");
    let spirv = minimal_spirv();
    let vert = write_file(&dir, "test.vert.spv", &spirv);
    let frag = write_file(&dir, "test.frag.spv", &spirv);

    let shaders = ShaderPair::load(&vert, &frag).expect("Failed to load shaders");
    assert_eq!(shaders.vertex, spirv);
    assert_eq!(shaders.fragment, spirv);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_missing_shader_reports_path() {
    let dir = scratch_dir("missing");
    let vert = write_file(&dir, "test.vert.spv", &minimal_spirv());
    let frag = dir.join("does_not_exist.frag.spv");

    let err = ShaderPair::load(&vert, &frag).unwrap_err();
    match err {
        ResourceError::ShaderRead { path, source } => {
            assert_eq!(path, frag);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("Unexpected error: {}", other),
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_invalid_shader_rejected() {
    let dir = scratch_dir("invalid");
    let vert = write_file(&dir, "bad.vert.spv", b"#version 450\n");
    let frag = write_file(&dir, "test.frag.spv", &minimal_spirv());

    let err = ShaderPair::load(&vert, &frag).unwrap_err();
    assert!(matches!(err, ResourceError::InvalidShader { ref path, .. } if *path == vert));

    let empty = write_file(&dir, "empty.vert.spv", &[]);
    assert!(matches!(
        ShaderPair::load(&empty, &frag),
        Err(ResourceError::InvalidShader { .. })
    ));

    std::fs::remove_dir_all(&dir).ok();
}
