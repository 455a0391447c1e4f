use docsim_augment::core_modules::mesh_warp::{MeshWarpConfig, MeshWarpEngine};
use docsim_augment::core_modules::operation::PolygonTransform;
use docsim_augment::{Point, RasterImage};
use image::{Rgb, RgbImage};
use rand::SeedableRng;
use rand::rngs::StdRng;

const SEED: u64 = 2024;

fn white_page() -> RasterImage {
    RasterImage::Rgb(RgbImage::from_pixel(100, 100, Rgb([255, 255, 255])))
}

fn centred_square() -> Vec<Vec<Point>> {
    vec![vec![
        Point::new(30.0, 30.0),
        Point::new(70.0, 30.0),
        Point::new(70.0, 70.0),
        Point::new(30.0, 70.0),
    ]]
}

fn single_crease() -> MeshWarpEngine {
    MeshWarpEngine::new(MeshWarpConfig {
        num_deform_rounds: 1,
        img_pad_ratio: 3,
        folding_prob: 0.0,
    })
}

#[test]
fn single_crease_on_white_page() {
    let engine = single_crease();
    let mut rng = StdRng::seed_from_u64(SEED);
    let (out, polygons) = engine.transform(white_page(), centred_square(), &mut rng).unwrap();

    // 100 px page plus 33 px of padding on each side.
    assert!(out.width() <= 166);
    assert!(out.height() <= 166);
    assert_eq!(out.channels(), 3);
    assert_eq!(polygons.len(), 1);
    assert_eq!(polygons[0].len(), 4);
    for point in &polygons[0] {
        assert!(point.x >= 0.0 && point.x <= out.width() as f64, "{point:?} outside {:?}", out.dimensions());
        assert!(point.y >= 0.0 && point.y <= out.height() as f64, "{point:?} outside {:?}", out.dimensions());
    }

    let mut rng = StdRng::seed_from_u64(SEED);
    let (again, polygons_again) = engine.transform(white_page(), centred_square(), &mut rng).unwrap();
    assert_eq!(out, again);
    assert_eq!(polygons, polygons_again);
}

#[test]
fn line_creases_keep_points_inside_the_crop() {
    let engine = MeshWarpEngine::new(MeshWarpConfig {
        num_deform_rounds: 2,
        img_pad_ratio: 3,
        folding_prob: 0.0,
    });
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (out, polygons) = engine.transform(white_page(), centred_square(), &mut rng).unwrap();
        for point in &polygons[0] {
            assert!(point.x >= 0.0 && point.x <= out.width() as f64, "seed {seed}: {point:?}");
            assert!(point.y >= 0.0 && point.y <= out.height() as f64, "seed {seed}: {point:?}");
        }
    }
}

#[test]
fn different_seeds_give_different_warps() {
    let engine = single_crease();
    let (a, _) = engine
        .transform(white_page(), centred_square(), &mut StdRng::seed_from_u64(1))
        .unwrap();
    let (b, _) = engine
        .transform(white_page(), centred_square(), &mut StdRng::seed_from_u64(2))
        .unwrap();
    assert_ne!(a, b);
}
