//! End-to-end codec tests over the public API.

use glam::DVec3;
use promesh::{Completion, Compressor, Config, Decompressor, Error};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Closed quad torus, `major * minor` vertices.
fn quad_torus(major: usize, minor: usize) -> (Vec<DVec3>, Vec<Vec<u32>>) {
    let mut positions = Vec::new();
    for i in 0..major {
        let theta = std::f64::consts::TAU * i as f64 / major as f64;
        for j in 0..minor {
            let phi = std::f64::consts::TAU * j as f64 / minor as f64;
            let r = 3.0 + phi.cos();
            positions.push(DVec3::new(r * theta.cos(), r * theta.sin(), phi.sin()));
        }
    }
    let index = |i: usize, j: usize| ((i % major) * minor + j % minor) as u32;
    let mut faces = Vec::new();
    for i in 0..major {
        for j in 0..minor {
            faces.push(vec![
                index(i, j),
                index(i + 1, j),
                index(i + 1, j + 1),
                index(i, j + 1),
            ]);
        }
    }
    (positions, faces)
}

/// Same torus with every quad split into two triangles.
fn triangle_torus(major: usize, minor: usize) -> (Vec<DVec3>, Vec<Vec<u32>>) {
    let (positions, quads) = quad_torus(major, minor);
    let mut faces = Vec::new();
    for quad in quads {
        faces.push(vec![quad[0], quad[1], quad[2]]);
        faces.push(vec![quad[0], quad[2], quad[3]]);
    }
    (positions, faces)
}

/// Live quantized positions, sorted for order-free comparison.
fn sorted_cells(mesh: &promesh::HalfEdgeMesh) -> Vec<glam::IVec3> {
    let mut cells: Vec<glam::IVec3> = mesh
        .vertex_ids()
        .map(|v| mesh.position(v))
        .collect();
    cells.sort_by_key(|c| (c.x, c.y, c.z));
    cells
}

fn assert_lossless(positions: &[DVec3], faces: &[Vec<u32>], config: Config) {
    let bytes = Compressor::new(positions, faces, config)
        .unwrap()
        .into_bytes()
        .unwrap();
    let mut decompressor = Decompressor::new(&bytes, 100.0).unwrap();
    decompressor.complete().unwrap();
    decompressor.mesh().validate().unwrap();
    assert_eq!(decompressor.mesh().vertex_count(), positions.len());
    assert_eq!(decompressor.mesh().facet_count(), faces.len());

    // The codec is lossless in the quantized domain: decoded cells must
    // match the quantized input exactly, not just within tolerance.
    let quantizer = decompressor.quantizer();
    let mut expected: Vec<glam::IVec3> =
        positions.iter().map(|&p| quantizer.quantize(p)).collect();
    expected.sort_by_key(|c| (c.x, c.y, c.z));
    assert_eq!(sorted_cells(decompressor.mesh()), expected);
}

#[test]
fn quad_torus_round_trips_with_defaults() {
    init_tracing();
    let (positions, faces) = quad_torus(8, 8);
    assert_lossless(&positions, &faces, Config::default());
}

#[test]
fn triangle_torus_round_trips_with_defaults() {
    init_tracing();
    let (positions, faces) = triangle_torus(6, 6);
    assert_lossless(&positions, &faces, Config::default());
}

#[test]
fn round_trips_across_configurations() {
    init_tracing();
    let (positions, faces) = quad_torus(6, 6);
    let configs = [
        Config {
            lifting_scheme: false,
            ..Config::default()
        },
        Config {
            curvature_prediction: false,
            ..Config::default()
        },
        Config {
            face_prediction: false,
            edge_prediction: false,
            triangle_face_prediction: false,
            ..Config::default()
        },
        Config {
            adaptive_quantization: true,
            lifting_scheme: false,
            ..Config::default()
        },
        Config {
            allow_concave_facets: false,
            ..Config::default()
        },
        Config {
            quantization_bits: 4,
            ..Config::default()
        },
        Config {
            quantization_bits: 16,
            ..Config::default()
        },
    ];
    for config in configs {
        assert_lossless(&positions, &faces, config);
    }
}

#[test]
fn compression_is_deterministic() {
    init_tracing();
    let (positions, faces) = quad_torus(8, 8);
    let first = Compressor::new(&positions, &faces, Config::default())
        .unwrap()
        .into_bytes()
        .unwrap();
    let second = Compressor::new(&positions, &faces, Config::default())
        .unwrap()
        .into_bytes()
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn decoding_resumes_monotonically() {
    init_tracing();
    let (positions, faces) = quad_torus(8, 8);
    let bytes = Compressor::new(&positions, &faces, Config::default())
        .unwrap()
        .into_bytes()
        .unwrap();
    let mut decompressor = Decompressor::new(&bytes, 0.0).unwrap();
    decompressor.complete().unwrap();
    let mut last_applied = decompressor.applied_layers();
    let mut last_vertices = decompressor.mesh().vertex_count();
    assert_eq!(last_applied, 0);
    for percentage in [25.0, 50.0, 75.0, 100.0] {
        decompressor.decode_to(percentage).unwrap();
        decompressor.mesh().validate().unwrap();
        assert!(decompressor.applied_layers() >= last_applied);
        assert!(decompressor.mesh().vertex_count() >= last_vertices);
        last_applied = decompressor.applied_layers();
        last_vertices = decompressor.mesh().vertex_count();
    }
    assert_eq!(decompressor.mesh().vertex_count(), positions.len());
    // Lowering the target afterwards is a no-op, not an error.
    decompressor.decode_to(10.0).unwrap();
    assert_eq!(decompressor.applied_layers(), last_applied);
}

#[test]
fn every_intermediate_mesh_is_valid() {
    init_tracing();
    let (positions, faces) = quad_torus(6, 6);
    let bytes = Compressor::new(&positions, &faces, Config::default())
        .unwrap()
        .into_bytes()
        .unwrap();
    let mut decompressor = Decompressor::new(&bytes, 100.0).unwrap();
    loop {
        match decompressor.batch().unwrap() {
            promesh::Step::LayerComplete => {
                decompressor.mesh().validate().unwrap();
                assert!(decompressor.mesh().is_closed());
            }
            promesh::Step::Finished => break,
            promesh::Step::Progress => unreachable!("batch never reports progress"),
        }
    }
    decompressor.mesh().validate().unwrap();
}

#[test]
fn cancellation_between_layers_is_resumable() {
    init_tracing();
    let (positions, faces) = quad_torus(8, 8);
    let bytes = Compressor::new(&positions, &faces, Config::default())
        .unwrap()
        .into_bytes()
        .unwrap();
    let mut decompressor = Decompressor::new(&bytes, 100.0).unwrap();
    let total = decompressor.total_layers();
    assert!(total >= 2);

    // Cancel after the first layer, then resume to the end.
    let budget = std::cell::Cell::new(1usize);
    let completion = decompressor
        .complete_until(|| {
            if budget.get() == 0 {
                return true;
            }
            budget.set(budget.get() - 1);
            false
        })
        .unwrap();
    assert_eq!(completion, Completion::Cancelled { layers_applied: 1 });
    decompressor.mesh().validate().unwrap();

    let completion = decompressor.complete_until(|| false).unwrap();
    assert_eq!(completion, Completion::Finished);
    assert_eq!(decompressor.mesh().vertex_count(), positions.len());
}

#[test]
fn header_corruption_is_rejected() {
    init_tracing();
    let (positions, faces) = quad_torus(6, 6);
    let bytes = Compressor::new(&positions, &faces, Config::default())
        .unwrap()
        .into_bytes()
        .unwrap();

    let mut bad_magic = bytes.clone();
    bad_magic[0] ^= 0xFF;
    assert!(matches!(
        Decompressor::new(&bad_magic, 100.0),
        Err(Error::Corrupt(_))
    ));

    let mut bad_version = bytes.clone();
    bad_version[4] = 0xFF;
    assert!(matches!(
        Decompressor::new(&bad_version, 100.0),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn truncated_streams_are_rejected() {
    init_tracing();
    let (positions, faces) = quad_torus(6, 6);
    let bytes = Compressor::new(&positions, &faces, Config::default())
        .unwrap()
        .into_bytes()
        .unwrap();
    for len in [0, 4, bytes.len() / 2, bytes.len() - 1] {
        assert!(
            matches!(Decompressor::new(&bytes[..len], 100.0), Err(Error::Corrupt(_))),
            "prefix of {len} bytes parsed"
        );
    }
}

#[test]
fn corruption_never_leaves_a_partial_layer() {
    init_tracing();
    let (positions, faces) = quad_torus(6, 6);
    let bytes = Compressor::new(&positions, &faces, Config::default())
        .unwrap()
        .into_bytes()
        .unwrap();

    // The last frame holds the first layer the decompressor applies. Flip
    // each of its final bytes in turn: the flip either goes undetected and
    // still yields some valid mesh, or fails and rolls back to a whole
    // number of applied layers. A half-applied layer is never observable.
    for tail in 1..=4usize {
        let mut corrupted = bytes.clone();
        let index = corrupted.len() - tail;
        corrupted[index] ^= 0x55;
        let Ok(mut decompressor) = Decompressor::new(&corrupted, 100.0) else {
            continue;
        };
        let outcome = decompressor.complete();
        decompressor.mesh().validate().unwrap();
        assert!(decompressor.mesh().is_closed());
        if outcome.is_err() {
            assert!(decompressor.applied_layers() < decompressor.total_layers());
        }
    }
}
