use std::{cell::RefCell, rc::Rc};

use frame_ngin::{
    backend::{
        ColorAttachment, Device, RenderTarget,
        recording::{Command, RecordingDevice},
    },
    cgmath::{Matrix4, SquareMatrix, Vector3},
    diagnostics::Logger,
    error::{PluginError, RenderError},
    camera::Camera,
    config::EngineConfig,
    level::{
        EntityId, Level, PixelElementSize, PixelStructure, Program, SceneType, Texture, TextureFormat,
        builder::LevelBuilder,
        proto::{LevelProto, SceneNodeProto, TransformProto},
    },
    light::LightDesc,
    render::Renderer,
    uniform::{self, UniformValue},
};

use crate::common::test_utils::{
    RecordingPlugin, TestAssets, WINDOW_SIZE, file_mesh, material, node, program, sized_texture, texture,
    two_pass_level, with_uniforms,
};

mod common;

const CLEAR: [f64; 4] = [0.1, 0.2, 0.3, 1.0];

fn renderer(assets: &TestAssets, proto: &LevelProto) -> Renderer<RecordingDevice> {
    let loader = assets.loader();
    let level = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE).build(proto).unwrap();
    let mut renderer =
        Renderer::new(RecordingDevice::new(WINDOW_SIZE), Logger::default()).with_clear_color(CLEAR);
    renderer.load_level(level).unwrap();
    renderer.device_mut().take_commands();
    renderer
}

fn id(renderer: &Renderer<RecordingDevice>, name: &str) -> EntityId {
    renderer.level().unwrap().id_from_name(name)
}

fn translation(x: f32, y: f32, z: f32) -> TransformProto {
    let mut matrix = [0.0; 16];
    for i in 0..4 {
        matrix[i * 5] = 1.0;
    }
    matrix[12] = x;
    matrix[13] = y;
    matrix[14] = z;
    TransformProto::Matrix { matrix }
}

#[test]
fn upload_creates_dependencies_first() {
    let assets = TestAssets::new();
    let loader = assets.loader();
    let level = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE)
        .build(&two_pass_level(&assets))
        .unwrap();
    let expected = level.textures().len()
        + level.buffers().len()
        + level.programs().len()
        + level.static_meshes().len()
        + 2;
    let mut renderer = Renderer::new(RecordingDevice::new(WINDOW_SIZE), Logger::default());
    renderer.load_level(level).unwrap();

    let device = renderer.device();
    assert_eq!(device.live_count(), expected);
    let rank = |command: &Command| match command {
        Command::CreateTexture { .. } => 0,
        Command::CreateBuffer { .. } => 1,
        Command::CreateProgram { .. } => 2,
        Command::CreateStaticMesh { .. } => 3,
        other => panic!("unexpected command {:?}", other),
    };
    let ranks: Vec<i32> = device.commands().iter().map(rank).collect();
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]));

    let level = renderer.unload_level().unwrap();
    let mut device = RecordingDevice::new(WINDOW_SIZE);
    device.upload_level(&level).unwrap();
    device.release_level(&level).unwrap();
    assert_eq!(device.live_count(), 0);
    assert!(device.release_level(&level).is_err());
}

#[test]
fn programs_render_in_order() {
    let assets = TestAssets::new();
    let mut renderer = renderer(&assets, &two_pass_level(&assets));
    renderer.run_frame(0.016).unwrap();

    let albedo = id(&renderer, "albedo");
    let scene = id(&renderer, "scene");
    let present = id(&renderer, "present");
    let triangle = id(&renderer, "triangle");
    let quad = renderer.level().unwrap().default_static_mesh_quad_id();

    let commands = renderer.device().commands();
    assert_eq!(commands.first(), Some(&Command::BeginFrame));
    assert_eq!(commands.last(), Some(&Command::EndFrame));

    let passes = renderer.device().passes();
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].program, scene);
    assert_eq!(
        passes[0].attachments,
        vec![ColorAttachment {
            target: RenderTarget::Texture(albedo),
            clear: Some([0.0, 0.0, 0.0, 0.0]),
        }]
    );
    assert!(passes[0].clear_depth);
    assert_eq!(passes[1].program, present);
    assert_eq!(
        passes[1].attachments,
        vec![ColorAttachment {
            target: RenderTarget::Screen,
            clear: Some(CLEAR),
        }]
    );

    let draws = renderer.device().draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].mesh, triangle);
    assert!(draws[0].textures.is_empty());
    assert_eq!(
        draws[0].uniforms.get(uniform::MODEL),
        Some(&UniformValue::from(Matrix4::<f32>::identity()))
    );
    assert_eq!(draws[1].mesh, quad);
    assert_eq!(draws[1].textures, vec![albedo]);
}

#[test]
fn targets_clear_on_their_first_write() {
    let assets = TestAssets::new();
    for shader in ["split", "blend", "show"] {
        assets.write_shader(shader);
    }
    let proto = LevelProto {
        textures: vec![sized_texture("a", [16, 16]), sized_texture("b", [16, 16])],
        programs: vec![
            program("split", SceneType::Quad, &[], &["a", "b"]),
            program("blend", SceneType::Quad, &["a"], &["b"]),
            program("show", SceneType::Cube, &["b"], &[]),
        ],
        ..Default::default()
    };
    let mut renderer = renderer(&assets, &proto);
    let (a, b) = (id(&renderer, "a"), id(&renderer, "b"));

    renderer.run_frame(0.016).unwrap();
    let passes = renderer.device().passes();
    let clears: Vec<Vec<(RenderTarget, bool)>> = passes
        .iter()
        .map(|p| p.attachments.iter().map(|a| (a.target, a.clear.is_some())).collect())
        .collect();
    assert_eq!(
        clears,
        vec![
            vec![(RenderTarget::Texture(a), true), (RenderTarget::Texture(b), true)],
            vec![(RenderTarget::Texture(b), false)],
            vec![(RenderTarget::Screen, true)],
        ]
    );
    assert_eq!(
        passes.iter().map(|p| p.clear_depth).collect::<Vec<_>>(),
        vec![true, false, true]
    );

    // Every frame starts over.
    renderer.device_mut().take_commands();
    renderer.run_frame(0.016).unwrap();
    assert!(renderer.device().passes()[0].attachments.iter().all(|a| a.clear.is_some()));

    let cube = renderer.level().unwrap().default_static_mesh_cube_id();
    assert_eq!(renderer.device().draws()[2].mesh, cube);
}

#[test]
fn scene_passes_draw_their_own_materials() {
    let assets = TestAssets::new();
    let mut proto = two_pass_level(&assets);
    assets.write_shader("outline");
    proto.textures.push(sized_texture("pattern", [4, 4]));
    proto.programs.insert(1, program("outline", SceneType::Scene, &[], &["albedo"]));
    proto.programs[1].input_scene_root_name = "group".to_string();
    proto.materials.push(material("marked", "outline", &["pattern"]));
    proto.meshes.push(file_mesh("marked_triangle", "mesh/triangle.obj", "marked"));
    proto.meshes.push(file_mesh("bare_triangle", "mesh/triangle.obj", ""));
    proto.scene_nodes.extend([
        node("group", "", ""),
        node("in_group", "group", "marked_triangle"),
        node("flat_in_group", "group", "triangle"),
        node("bare", "group", "bare_triangle"),
        node("outside", "", "marked_triangle"),
    ]);
    let mut renderer = renderer(&assets, &proto);
    renderer.run_frame(0.016).unwrap();

    let scene = id(&renderer, "scene");
    let outline = id(&renderer, "outline");
    let draws = renderer.device().draws();
    let of = |program: EntityId| -> Vec<(EntityId, Vec<EntityId>)> {
        draws
            .iter()
            .filter(|d| d.program == program)
            .map(|d| (d.mesh, d.textures.clone()))
            .collect()
    };

    let triangle = id(&renderer, "triangle");
    let marked = id(&renderer, "marked_triangle");
    assert_eq!(of(scene), vec![(triangle, Vec::new()), (triangle, Vec::new())]);
    assert_eq!(of(outline), vec![(marked, vec![id(&renderer, "pattern")])]);

    // The outline pass writes albedo after the scene pass already did.
    let passes = renderer.device().passes();
    assert_eq!(passes[1].program, outline);
    assert_eq!(passes[1].attachments[0].clear, None);
    assert!(!passes[1].clear_depth);
}

#[test]
fn scene_draws_carry_world_transforms() {
    let assets = TestAssets::new();
    let mut proto = two_pass_level(&assets);
    proto.scene_nodes = vec![
        SceneNodeProto {
            name: "offset".to_string(),
            transform: translation(0.0, 2.0, 0.0),
            ..Default::default()
        },
        node("triangle_node", "offset", "triangle"),
    ];
    let mut renderer = renderer(&assets, &proto);
    renderer.run_frame(0.016).unwrap();

    let expected = Matrix4::from_translation(Vector3::new(0.0f32, 2.0, 0.0));
    assert_eq!(
        renderer.device().draws()[0].uniforms.get(uniform::MODEL),
        Some(&UniformValue::from(expected))
    );
}

fn lit_level(assets: &TestAssets) -> LevelProto {
    let mut proto = two_pass_level(assets);
    proto.programs[0] = with_uniforms(
        program("scene", SceneType::Scene, &[], &["albedo"]),
        &["model", "light_position", "light_color", "camera_position", "time"],
    );
    proto.scene_nodes.extend([
        SceneNodeProto {
            name: "lamp".to_string(),
            transform: translation(1.0, 2.0, 3.0),
            light: Some(LightDesc {
                color: [1.0, 0.0, 0.0],
                ..Default::default()
            }),
            ..Default::default()
        },
        SceneNodeProto {
            name: "eye".to_string(),
            transform: translation(0.0, 0.0, 4.0),
            camera: Some(Default::default()),
            ..Default::default()
        },
    ]);
    proto
}

#[test]
fn first_light_and_camera_feed_the_uniforms() {
    let assets = TestAssets::new();
    let mut renderer = renderer(&assets, &lit_level(&assets));
    assert_eq!(renderer.level().unwrap().default_camera_id(), id(&renderer, "eye"));

    renderer.run_frame(0.5).unwrap();
    renderer.device_mut().take_commands();
    renderer.run_frame(0.25).unwrap();

    let uniforms = &renderer.device().draws()[0].uniforms;
    assert_eq!(uniforms.get(uniform::LIGHT_POSITION), Some(&UniformValue::Vec3([1.0, 2.0, 3.0])));
    assert_eq!(uniforms.get(uniform::LIGHT_COLOR), Some(&UniformValue::Vec3([1.0, 0.0, 0.0])));
    assert_eq!(uniforms.get(uniform::CAMERA_POSITION), Some(&UniformValue::Vec3([0.0, 0.0, 4.0])));
    assert_eq!(uniforms.get(uniform::TIME), Some(&UniformValue::Float(0.75)));
    assert_eq!(renderer.elapsed(), 0.75);
}

#[test]
fn a_bad_light_slot_fails_the_frame_before_the_device() {
    let assets = TestAssets::new();
    let mut renderer = renderer(&assets, &lit_level(&assets));
    renderer.bind_light("scene", 4);

    match renderer.run_frame(0.016) {
        Err(RenderError::LightSlot { slot, count }) => {
            assert_eq!(slot, 4);
            assert_eq!(count, 1);
        }
        other => panic!("expected a light slot error, got {:?}", other),
    }
    assert!(renderer.device().commands().is_empty());

    renderer.unbind_light("scene");
    renderer.run_frame(0.016).unwrap();
    assert_eq!(renderer.device().passes().len(), 2);
}

#[test]
fn plugins_wrap_every_frame() {
    let assets = TestAssets::new();
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = renderer(&assets, &two_pass_level(&assets));
    renderer
        .add_plugin(Box::new(RecordingPlugin::new("first", &events)))
        .unwrap();
    renderer
        .add_plugin(Box::new(RecordingPlugin::new("second", &events)))
        .unwrap();
    assert!(matches!(
        renderer.add_plugin(Box::new(RecordingPlugin::new("first", &events))),
        Err(PluginError::Duplicate(_))
    ));
    assert_eq!(renderer.plugins().names(), vec!["first", "second"]);

    renderer.run_frame(0.016).unwrap();
    assert_eq!(
        *events.borrow(),
        vec![
            "first:startup",
            "second:startup",
            "first:pre_render",
            "second:pre_render",
            "first:post_render",
            "second:post_render",
        ]
    );
    assert_eq!(renderer.device().passes().len(), 2);

    events.borrow_mut().clear();
    renderer.remove_plugin("first").unwrap();
    assert!(matches!(renderer.remove_plugin("first"), Err(PluginError::NotFound(_))));
    drop(renderer);
    assert_eq!(*events.borrow(), vec!["first:end", "second:end"]);
}

#[test]
fn a_plugin_can_skip_the_passes() {
    let assets = TestAssets::new();
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = renderer(&assets, &two_pass_level(&assets));
    let mut skipper = RecordingPlugin::new("skipper", &events);
    skipper.render = false;
    renderer.add_plugin(Box::new(skipper)).unwrap();
    renderer
        .add_plugin(Box::new(RecordingPlugin::new("watcher", &events)))
        .unwrap();

    renderer.run_frame(0.016).unwrap();
    assert!(renderer.device().commands().is_empty());
    assert_eq!(
        events.borrow()[2..],
        [
            "skipper:pre_render",
            "watcher:pre_render",
            "skipper:post_render",
            "watcher:post_render",
        ]
    );
}

#[test]
fn rendering_needs_a_level() {
    let mut renderer = Renderer::new(RecordingDevice::new(WINDOW_SIZE), Logger::default());
    assert!(matches!(renderer.run_frame(0.016), Err(RenderError::NoLevel)));

    let assets = TestAssets::new();
    let mut renderer = self::renderer(&assets, &two_pass_level(&assets));
    let level = renderer.unload_level().unwrap();
    assert_eq!(level.name(), "two_pass");
    assert_eq!(renderer.device().live_count(), 0);
    assert!(matches!(renderer.run_frame(0.016), Err(RenderError::NoLevel)));
}

#[test]
fn a_failed_rebuild_keeps_the_current_level() {
    let assets = TestAssets::new();
    let mut renderer = renderer(&assets, &two_pass_level(&assets));
    let loader = assets.loader();
    let builder = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE);

    let mut broken = two_pass_level(&assets);
    broken.name = "broken".to_string();
    broken.programs[1].input_texture_names = vec!["nowhere".to_string()];
    assert!(matches!(
        renderer.reload_level(&builder, &broken),
        Err(RenderError::Build(_))
    ));
    assert_eq!(renderer.level().unwrap().name(), "two_pass");
    assert!(renderer.device().commands().is_empty());

    let mut renamed = two_pass_level(&assets);
    renamed.name = "renamed".to_string();
    renderer.reload_level(&builder, &renamed).unwrap();
    assert_eq!(renderer.level().unwrap().name(), "renamed");
    renderer.run_frame(0.016).unwrap();
}

#[test]
fn a_failed_upload_restores_the_previous_level() {
    let assets = TestAssets::new();
    let mut renderer = renderer(&assets, &two_pass_level(&assets));
    let live = renderer.device().live_count();

    // The builder accepts blank sources; the device refuses them.
    assets.write("shader/wgsl/blank.vert", "  \n");
    assets.write("shader/wgsl/blank.frag", "  \n");
    let mut blank = two_pass_level(&assets);
    blank.name = "blank".to_string();
    blank.programs[1].shader = "blank".to_string();
    let loader = assets.loader();
    let level = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE).build(&blank).unwrap();

    assert!(matches!(renderer.load_level(level), Err(RenderError::Device(_))));
    assert_eq!(renderer.level().unwrap().name(), "two_pass");
    assert_eq!(renderer.device().live_count(), live);

    renderer.device_mut().take_commands();
    renderer.run_frame(0.016).unwrap();
    assert_eq!(renderer.device().passes().len(), 2);
}

#[test]
fn resize_follows_window_sized_targets() {
    let assets = TestAssets::new();
    let mut proto = two_pass_level(&assets);
    proto.textures.push(sized_texture("fixed", [8, 8]));
    let mut renderer = renderer(&assets, &proto);
    let albedo = id(&renderer, "albedo");

    renderer.resize([0, 10]).unwrap();
    assert!(renderer.device().commands().is_empty());

    renderer.resize([100, 50]).unwrap();
    assert_eq!(
        renderer.device().commands(),
        &[
            Command::Resize([100, 50]),
            Command::Destroy(albedo),
            Command::CreateTexture {
                id: albedo,
                name: "albedo".to_string(),
                size: [100, 50],
            },
        ]
    );
    let level = renderer.level().unwrap();
    assert_eq!(level.texture(albedo).unwrap().size, [100, 50]);
    assert_eq!(level.texture(level.id_from_name("fixed")).unwrap().size, [8, 8]);
    assert_eq!(renderer.device().size(), [100, 50]);
}

#[test]
fn programs_reload_from_disk() {
    let assets = TestAssets::new();
    let mut renderer = renderer(&assets, &two_pass_level(&assets));
    let loader = assets.loader();
    let present = id(&renderer, "present");

    assets.write("shader/wgsl/present.vert", "// edited\n@vertex fn vs_main() {}\n");
    renderer.reload_program("present", &loader).unwrap();
    assert_eq!(
        renderer.device().commands(),
        &[
            Command::Destroy(present),
            Command::CreateProgram {
                id: present,
                name: "present".to_string(),
            },
        ]
    );
    let program = renderer.level().unwrap().program(present).unwrap();
    assert!(program.vertex_source.contains("edited"));

    renderer.device_mut().take_commands();
    assets.write("shader/wgsl/present.vert", "\n");
    assert!(renderer.reload_program("present", &loader).is_err());
    assert!(renderer.device().is_live(present));
    let program = renderer.level().unwrap().program(present).unwrap();
    assert!(program.vertex_source.contains("edited"));

    renderer.device_mut().take_commands();
    std::fs::remove_file(assets.path("shader/wgsl/present.frag")).unwrap();
    assert!(renderer.reload_program("present", &loader).is_err());
    assert!(renderer.device().commands().is_empty());

    assert!(renderer.reload_program("unknown", &loader).is_err());
}

#[test]
fn screen_program_declared_first_renders_first() {
    let assets = TestAssets::new();
    assets.write_shader("first");
    assets.write_shader("second");
    let proto = LevelProto {
        textures: vec![texture("Tex")],
        programs: vec![
            program("first", SceneType::Quad, &[], &[]),
            program("second", SceneType::Quad, &[], &["Tex"]),
        ],
        ..Default::default()
    };
    let mut renderer = renderer(&assets, &proto);
    renderer.run_frame(0.016).unwrap();
    let first = id(&renderer, "first");
    let second = id(&renderer, "second");

    let order: Vec<EntityId> = renderer
        .device()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::Draw(draw) => Some(draw.program),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec![first, second]);

    let passes = renderer.device().passes();
    assert_eq!(passes[0].attachments[0].target, RenderTarget::Screen);
    assert_eq!(passes[1].attachments[0].target, RenderTarget::Texture(id(&renderer, "Tex")));
}

fn rgba(name: &str, size: [u32; 2]) -> Texture {
    Texture::empty(
        name,
        TextureFormat::new(PixelElementSize::Byte, PixelStructure::Rgba),
        size,
    )
}

#[test]
fn live_edits_reach_the_device() {
    let assets = TestAssets::new();
    let mut renderer = renderer(&assets, &two_pass_level(&assets));
    let live = renderer.device().live_count();

    let extra = renderer
        .level_mut()
        .unwrap()
        .add_texture(rgba("extra", [4, 4]))
        .unwrap();
    renderer.run_frame(0.016).unwrap();
    assert!(renderer.device().is_live(extra));
    assert_eq!(renderer.device().live_count(), live + 1);

    // Swapping levels releases what the device holds, the edit included.
    let loader = assets.loader();
    let mut next = two_pass_level(&assets);
    next.name = "next".to_string();
    let level = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE).build(&next).unwrap();
    renderer.load_level(level).unwrap();
    assert_eq!(renderer.device().live_count(), live);
    renderer.run_frame(0.016).unwrap();
    assert_eq!(renderer.level().unwrap().name(), "next");

    let level = renderer.unload_level().unwrap();
    assert_eq!(level.name(), "next");
    assert_eq!(renderer.device().live_count(), 0);
}

#[test]
fn pass_targets_must_share_a_size() {
    let mut level = Level::new("mixed");
    let wide = level.add_texture(rgba("wide", [32, 16])).unwrap();
    let small = level.add_texture(rgba("small", [8, 8])).unwrap();
    let quad = level.default_static_mesh_quad_id();
    level
        .add_program(Program {
            name: "split".to_string(),
            shader: "split".to_string(),
            vertex_source: "vs".to_string(),
            fragment_source: "fs".to_string(),
            geometry_source: None,
            uniforms: Vec::new(),
            inputs: Vec::new(),
            outputs: vec![wide, small],
            scene_type: SceneType::Quad,
            scene_root: quad,
        })
        .unwrap();
    let mut renderer = Renderer::new(RecordingDevice::new(WINDOW_SIZE), Logger::default());
    renderer.load_level(level).unwrap();

    match renderer.run_frame(0.016) {
        Err(err @ RenderError::Device(_)) => assert!(err.to_string().contains("same size")),
        other => panic!("expected a device error, got {:?}", other),
    }
    // The frame is still closed.
    assert_eq!(renderer.device().commands().last(), Some(&Command::EndFrame));
}

#[test]
fn a_degenerate_camera_fails_the_frame_before_the_device() {
    let assets = TestAssets::new();
    let mut renderer = renderer(&assets, &two_pass_level(&assets));
    renderer.set_fallback_camera(Camera {
        near: 0.0,
        ..Camera::default()
    });

    assert!(matches!(renderer.run_frame(0.016), Err(RenderError::Camera(_))));
    assert!(renderer.device().commands().is_empty());

    renderer.set_fallback_camera(Camera::default());
    renderer.run_frame(0.016).unwrap();
}

#[test]
fn config_sets_the_screen_clear_color() {
    let assets = TestAssets::new();
    let loader = assets.loader();
    let level = LevelBuilder::new(&loader, "wgsl", WINDOW_SIZE)
        .build(&two_pass_level(&assets))
        .unwrap();
    let config = EngineConfig {
        clear_color: [0.5, 0.25, 0.0, 1.0],
        log_filter: "debug".to_string(),
        ..Default::default()
    };
    config.init_logging();
    let mut renderer =
        Renderer::new(RecordingDevice::new(WINDOW_SIZE), Logger::default()).with_config(&config);
    renderer.load_level(level).unwrap();
    renderer.run_frame(0.016).unwrap();

    let screen = &renderer.device().passes()[1].attachments[0];
    assert_eq!(screen.target, RenderTarget::Screen);
    assert_eq!(screen.clear, Some([0.5, 0.25, 0.0, 1.0]));
}
