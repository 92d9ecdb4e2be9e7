use std::path::PathBuf;

use frame_ngin::{
    backend::recording::RecordingDevice,
    diagnostics::Logger,
    file::AssetPaths,
    level::{
        MeshEnum, SceneType,
        builder::LevelBuilder,
        proto::{LevelProto, MeshProto, SceneNodeProto, TransformProto},
        serialize::{save_level, to_proto},
    },
    render::Renderer,
    resources::AssetLoader,
    uniform::{UniformDecl, UniformValue},
};

use crate::common::test_utils::{TestAssets, WINDOW_SIZE, program, sized_texture, two_pass_level};

mod common;

fn rich_level(assets: &TestAssets) -> LevelProto {
    let mut proto = two_pass_level(assets);
    assets.write_shader("shadow");
    proto.default_camera_name = "eye".to_string();
    proto.textures.push(sized_texture("shadow_map", [16, 16]));
    let mut shadow = program("shadow", SceneType::Scene, &[], &["shadow_map"]);
    shadow.input_scene_root_name = "group".to_string();
    shadow.uniforms = vec![
        UniformDecl::builtin("model"),
        UniformDecl {
            name: "bias".to_string(),
            value: Some(UniformValue::Float(0.005)),
        },
    ];
    proto.programs.push(shadow);
    proto.meshes.push(MeshProto {
        name: "floor".to_string(),
        mesh_enum: Some(MeshEnum::Quad),
        material_name: "flat".to_string(),
        clear_depth: true,
        ..Default::default()
    });
    proto.scene_nodes.extend([
        SceneNodeProto {
            name: "group".to_string(),
            transform: TransformProto::Animated {
                translation: [0.0, 1.0, 0.0],
                rotation_axis: [0.0, 1.0, 0.0],
                rotation_rate: 0.5,
                scale: [1.0, 2.0, 1.0],
            },
            ..Default::default()
        },
        SceneNodeProto {
            name: "floor_node".to_string(),
            parent: "group".to_string(),
            mesh_name: "floor".to_string(),
            ..Default::default()
        },
        SceneNodeProto {
            name: "eye".to_string(),
            camera: Some(Default::default()),
            transform: TransformProto::Matrix {
                matrix: [
                    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 5.0, 1.0,
                ],
            },
            ..Default::default()
        },
    ]);
    proto
}

#[test]
fn a_built_level_writes_back_its_description() {
    let assets = TestAssets::new();
    let proto = rich_level(&assets);
    let loader = assets.loader();
    let level = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE).build(&proto).unwrap();

    let written = to_proto(&level).unwrap();
    assert_eq!(written, proto);
}

#[test]
fn written_descriptions_rebuild_the_same_level() {
    let assets = TestAssets::new();
    let loader = assets.loader();
    let builder = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE);
    let level = builder.build(&rich_level(&assets)).unwrap();

    let path = assets.path("level/saved.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    save_level(&level, &path).unwrap();
    let rebuilt = builder.build_file("level/saved.json").unwrap();

    assert_eq!(to_proto(&rebuilt).unwrap(), to_proto(&level).unwrap());
    assert_eq!(rebuilt.programs().len(), level.programs().len());
    assert_eq!(
        rebuilt.default_camera_id(),
        rebuilt.id_from_name("eye"),
    );
}

#[test]
fn saving_into_a_missing_directory_fails() {
    let assets = TestAssets::new();
    let loader = assets.loader();
    let level = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE)
        .build(&two_pass_level(&assets))
        .unwrap();
    let result = save_level(&level, assets.path("nowhere/saved.json"));
    assert!(matches!(result, Err(frame_ngin::error::BuildError::Io { .. })));
}

#[test]
fn the_shipped_level_builds_and_renders() {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("asset");
    let cache = tempfile::tempdir().unwrap();
    let paths = AssetPaths::new(root).with_cache_dir(cache.path());
    let loader = AssetLoader::new(paths, Logger::default());
    let level = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE)
        .build_file("level/simple.json")
        .unwrap();
    assert_eq!(level.name(), "simple");
    assert_eq!(level.default_camera_id(), level.id_from_name("camera"));

    let mut renderer = Renderer::new(RecordingDevice::new(WINDOW_SIZE), Logger::default());
    renderer.load_level(level).unwrap();
    renderer.device_mut().take_commands();
    renderer.run_frame(0.016).unwrap();
    renderer.run_frame(0.016).unwrap();
    assert_eq!(renderer.device().passes().len(), 4);
}
