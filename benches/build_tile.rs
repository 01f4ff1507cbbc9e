use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec3;
use voxel_navigation::{build_solo_mesh, find_path, BuildSettings, InputGeometry, NavMesh, QueryFilter};

fn flat_plane(half_extent: f32) -> InputGeometry {
    InputGeometry {
        vertices: vec![
            Vec3::new(-half_extent, 0.0, -half_extent),
            Vec3::new(half_extent, 0.0, -half_extent),
            Vec3::new(half_extent, 0.0, half_extent),
            Vec3::new(-half_extent, 0.0, half_extent),
        ],
        indices: vec![[0, 1, 2], [0, 2, 3]],
    }
}

fn cluttered_plane(half_extent: f32) -> InputGeometry {
    let mut vertices = flat_plane(half_extent).vertices;
    let mut indices = vec![[0, 1, 2], [0, 2, 3]];

    let boxes = [
        (Vec3::new(5.0, 0.0, 5.0), Vec3::new(1.0, 1.0, 1.0)),
        (Vec3::new(-5.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0)),
        (Vec3::new(-2.5, 0.0, 2.0), Vec3::new(1.0, 2.0, 1.0)),
        (Vec3::new(-2.5, 0.0, -2.0), Vec3::new(1.0, 2.0, 1.0)),
        (Vec3::new(2.0, 0.0, -4.0), Vec3::new(1.5, 1.0, 1.5)),
    ];
    for (center, half) in boxes {
        let base = vertices.len() as u32;
        vertices.push(center + Vec3::new(-half.x, half.y, -half.z));
        vertices.push(center + Vec3::new(half.x, half.y, -half.z));
        vertices.push(center + Vec3::new(half.x, half.y, half.z));
        vertices.push(center + Vec3::new(-half.x, half.y, half.z));
        indices.push([base, base + 1, base + 2]);
        indices.push([base, base + 2, base + 3]);
    }

    InputGeometry { vertices, indices }
}

fn bench_settings() -> BuildSettings {
    BuildSettings::from_agent_and_bounds(0.4, 1.8, Vec3::new(-20.0, -2.0, -20.0), Vec3::new(20.0, 2.0, 20.0))
}

fn build_simple() -> NavMesh {
    build_solo_mesh(&flat_plane(15.0), &bench_settings(), &[], &[]).expect("solo build should succeed")
}

fn build_cluttered() -> NavMesh {
    build_solo_mesh(&cluttered_plane(15.0), &bench_settings(), &[], &[]).expect("solo build should succeed")
}

fn criterion_benchmark(c: &mut Criterion) {
    let settings = bench_settings();
    let simple_geometry = flat_plane(15.0);
    let cluttered_geometry = cluttered_plane(15.0);

    c.bench_function("Build simple tile", |b| {
        b.iter(|| black_box(build_solo_mesh(&simple_geometry, &settings, &[], &[])))
    });
    c.bench_function("Build cluttered tile", |b| {
        b.iter(|| black_box(build_solo_mesh(&cluttered_geometry, &settings, &[], &[])))
    });

    let simple_mesh = build_simple();
    let cluttered_mesh = build_cluttered();
    let filter = QueryFilter::default();
    let start = Vec3::new(5.0, 0.0, 5.0);
    let end = Vec3::new(0.0, 0.0, 0.0);

    c.bench_function("Find path (simple)", |b| {
        b.iter(|| {
            let (_, start_ref, start_pos) = voxel_navigation::find_nearest_poly(
                &simple_mesh,
                start,
                Vec3::new(1.0, 1.0, 1.0),
                &filter,
            );
            let (_, end_ref, end_pos) =
                voxel_navigation::find_nearest_poly(&simple_mesh, end, Vec3::new(1.0, 1.0, 1.0), &filter);
            black_box(find_path(&simple_mesh, start_ref, end_ref, start_pos, end_pos, &filter, 256))
        })
    });
    c.bench_function("Find path (cluttered)", |b| {
        b.iter(|| {
            let (_, start_ref, start_pos) = voxel_navigation::find_nearest_poly(
                &cluttered_mesh,
                start,
                Vec3::new(1.0, 1.0, 1.0),
                &filter,
            );
            let (_, end_ref, end_pos) = voxel_navigation::find_nearest_poly(
                &cluttered_mesh,
                end,
                Vec3::new(1.0, 1.0, 1.0),
                &filter,
            );
            black_box(find_path(&cluttered_mesh, start_ref, end_ref, start_pos, end_pos, &filter, 256))
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
