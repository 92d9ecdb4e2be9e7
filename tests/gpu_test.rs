#[cfg(feature = "integration-tests")]
use crate::common::test_utils::{TestAssets, program, with_uniforms};
#[cfg(feature = "integration-tests")]
use frame_ngin::{
    backend::gpu::WgpuDevice,
    config::EngineConfig,
    diagnostics::Logger,
    file::AssetPaths,
    level::{SceneType, builder::LevelBuilder, proto::LevelProto, proto::TextureProto},
    render::Renderer,
    resources::AssetLoader,
};

#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
const SIZE: [u32; 2] = [64, 64];

/// Loader over the shipped shaders, with a scratch cache.
#[cfg(feature = "integration-tests")]
fn shipped_loader(assets: &TestAssets) -> AssetLoader {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("asset");
    let paths = AssetPaths::new(root).with_cache_dir(assets.path("cache"));
    AssetLoader::new(paths, Logger::default())
}

#[cfg(feature = "integration-tests")]
fn headless() -> WgpuDevice {
    let config = EngineConfig {
        window_size: SIZE,
        ..Default::default()
    };
    WgpuDevice::headless(&config).expect("no headless adapter")
}

#[test]
#[cfg(feature = "integration-tests")]
fn should_render_clear_colour() {
    let assets = TestAssets::new();
    let loader = shipped_loader(&assets);
    let mut scene = with_uniforms(
        program("scene", SceneType::Scene, &[], &[]),
        &["projection", "view", "model", "camera_position", "light_position", "light_color"],
    );
    scene.shader = "basic".to_string();
    let proto = LevelProto {
        name: "empty".to_string(),
        programs: vec![scene],
        ..Default::default()
    };
    let level = LevelBuilder::new(&loader, "wgsl", SIZE).build(&proto).unwrap();

    let config = EngineConfig {
        window_size: SIZE,
        clear_color: [1.0, 1.0, 1.0, 1.0],
        ..Default::default()
    };
    let mut renderer = Renderer::new(headless(), Logger::default()).with_config(&config);
    renderer.load_level(level).unwrap();
    renderer.run_frame(0.016).unwrap();

    let screen = renderer.device().read_screen().unwrap();
    assert_eq!(screen.dimensions(), (SIZE[0], SIZE[1]));
    for pixel in screen.pixels() {
        assert_eq!(*pixel, image::Rgba([255, 255, 255, 255]));
    }
}

#[test]
#[cfg(feature = "integration-tests")]
fn should_present_a_sampled_texture() {
    let assets = TestAssets::new();
    assets.write_png("texture/white.png", [4, 4], [255, 255, 255, 255]);
    let loader = shipped_loader(&assets);
    let proto = LevelProto {
        name: "present".to_string(),
        textures: vec![TextureProto {
            name: "white".to_string(),
            file_name: assets.path("texture/white.png").display().to_string(),
            ..Default::default()
        }],
        programs: vec![program("present", SceneType::Quad, &["white"], &[])],
        ..Default::default()
    };
    let level = LevelBuilder::new(&loader, "wgsl", SIZE).build(&proto).unwrap();

    let mut renderer = Renderer::new(headless(), Logger::default());
    renderer.load_level(level).unwrap();
    renderer.run_frame(0.016).unwrap();

    let screen = renderer.device().read_screen().unwrap();
    let center = screen.get_pixel(SIZE[0] / 2, SIZE[1] / 2);
    assert_eq!(*center, image::Rgba([255, 255, 255, 255]));
}

#[test]
fn uniform_slices_never_overlap() {
    use frame_ngin::backend::gpu::{UNIFORM_SIZE, uniform_stride};

    for alignment in [1, 64, 256, 512] {
        let stride = uniform_stride(alignment);
        assert!(stride >= UNIFORM_SIZE, "stride {} for alignment {}", stride, alignment);
        assert_eq!(stride % u64::from(alignment), 0);
    }
    // Common desktop alignment: the block spans two 256 byte slots.
    assert_eq!(uniform_stride(256), 256 * UNIFORM_SIZE.div_ceil(256));
    assert!(uniform_stride(256) > 256);
}
