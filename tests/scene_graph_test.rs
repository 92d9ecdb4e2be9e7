use frame_ngin::{
    camera::{Camera, CameraDesc},
    cgmath::{Matrix4, SquareMatrix, Vector3, Vector4},
    level::{EntityId, Level, NodeContent, SceneNode},
    light::{LightDesc, LightKind, LightManager},
    scene_graph::{self, NodeTransform},
    uniform::{self, FrameUniforms, UniformBlock, UniformDecl, UniformValue},
};

fn close(a: Matrix4<f32>, b: Matrix4<f32>) -> bool {
    let a: [[f32; 4]; 4] = a.into();
    let b: [[f32; 4]; 4] = b.into();
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .all(|(x, y)| (x - y).abs() < 1e-5)
}

fn translated(name: &str, parent: EntityId, offset: [f32; 3], content: NodeContent) -> SceneNode {
    SceneNode::new(
        name,
        parent,
        NodeTransform::Fixed(Matrix4::from_translation(Vector3::from(offset))),
        content,
    )
}

fn spinner(rate: f32) -> NodeTransform {
    NodeTransform::Animated {
        translation: Vector3::new(0.0, 0.0, 0.0),
        rotation_axis: Vector3::new(0.0, 1.0, 0.0),
        rotation_rate: rate,
        scale: Vector3::new(1.0, 1.0, 1.0),
    }
}

#[test]
fn animated_transforms_are_pure() {
    let transform = spinner(std::f32::consts::FRAC_PI_2);
    assert!(close(transform.local(0.0), Matrix4::identity()));
    assert_eq!(transform.local(1.25), transform.local(1.25));

    // A quarter turn about +y after one second takes +x to -z.
    let x = transform.local(1.0) * Vector4::new(1.0, 0.0, 0.0, 1.0);
    assert!((x.x).abs() < 1e-5);
    assert!((x.z + 1.0).abs() < 1e-5);
}

#[test]
fn zero_axis_means_no_rotation() {
    let transform = NodeTransform::Animated {
        translation: Vector3::new(1.0, 2.0, 3.0),
        rotation_axis: Vector3::new(0.0, 0.0, 0.0),
        rotation_rate: 10.0,
        scale: Vector3::new(2.0, 2.0, 2.0),
    };
    let expected = Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0)) * Matrix4::from_scale(2.0);
    assert!(close(transform.local(7.0), expected));
}

#[test]
fn world_transform_composes_from_the_root() {
    let mut level = Level::new("graph");
    let root = level.default_root_scene_node_id();
    let arm = level
        .add_scene_node(translated("arm", root, [1.0, 0.0, 0.0], NodeContent::Empty))
        .unwrap();
    let hand = level
        .add_scene_node(translated("hand", arm, [0.0, 2.0, 0.0], NodeContent::Empty))
        .unwrap();

    let world = scene_graph::world_transform(&level, hand, 0.0).unwrap();
    let origin = world * Vector4::new(0.0, 0.0, 0.0, 1.0);
    assert_eq!(origin, Vector4::new(1.0, 2.0, 0.0, 1.0));

    assert!(scene_graph::world_transform(&level, EntityId::NULL, 0.0).is_ok());
    assert!(scene_graph::world_transform(&level, level.default_static_mesh_quad_id(), 0.0).is_err());
}

#[test]
fn visit_is_pre_order_with_world_transforms() {
    let mut level = Level::new("graph");
    let root = level.default_root_scene_node_id();
    let a = level
        .add_scene_node(translated("a", root, [1.0, 0.0, 0.0], NodeContent::Empty))
        .unwrap();
    let b = level
        .add_scene_node(translated("b", a, [1.0, 0.0, 0.0], NodeContent::Empty))
        .unwrap();
    let c = level
        .add_scene_node(translated("c", root, [0.0, 0.0, 5.0], NodeContent::Empty))
        .unwrap();
    let d = level
        .add_scene_node(translated("d", a, [0.0, 1.0, 0.0], NodeContent::Empty))
        .unwrap();

    assert_eq!(scene_graph::subtree(&level, root).unwrap(), vec![root, a, b, d, c]);

    // Visiting a subtree still accounts for the ancestors above it.
    let mut seen = Vec::new();
    scene_graph::visit(&level, a, 0.0, &mut |id, node, world| {
        let origin = world * Vector4::new(0.0, 0.0, 0.0, 1.0);
        seen.push((id, node.name.clone(), [origin.x, origin.y, origin.z]));
        Ok(())
    })
    .unwrap();
    assert_eq!(
        seen,
        vec![
            (a, "a".to_string(), [1.0, 0.0, 0.0]),
            (b, "b".to_string(), [2.0, 0.0, 0.0]),
            (d, "d".to_string(), [1.0, 1.0, 0.0]),
        ]
    );
}

#[test]
fn visit_stops_at_the_first_error() {
    let mut level = Level::new("graph");
    let root = level.default_root_scene_node_id();
    for name in ["a", "b", "c"] {
        level
            .add_scene_node(translated(name, root, [0.0; 3], NodeContent::Empty))
            .unwrap();
    }
    let mut count = 0;
    let result = scene_graph::visit(&level, root, 0.0, &mut |id, _, _| {
        count += 1;
        if count == 2 {
            return Err(frame_ngin::error::LevelError::NotFound(id));
        }
        Ok(())
    });
    assert!(result.is_err());
    assert_eq!(count, 2);
}

#[test]
fn cameras_follow_their_node() {
    let mut level = Level::new("graph");
    let root = level.default_root_scene_node_id();
    let rig = level
        .add_scene_node(translated("rig", root, [0.0, 0.0, 4.0], NodeContent::Empty))
        .unwrap();
    let eye = level
        .add_scene_node(translated(
            "eye",
            rig,
            [0.0, 1.0, 0.0],
            NodeContent::Camera(CameraDesc::default()),
        ))
        .unwrap();

    let world = scene_graph::world_transform(&level, eye, 0.0).unwrap();
    let mut camera = Camera::from_desc(&CameraDesc::default(), &world, 1.0);
    assert_eq!(camera.position, Vector3::new(0.0, 1.0, 4.0));
    assert_eq!(camera.front, Vector3::new(0.0, 0.0, -1.0));
    assert_eq!(camera.right(), Vector3::new(1.0, 0.0, 0.0));

    camera.set_aspect([64, 32]);
    assert_eq!(camera.aspect, 2.0);
    camera.set_aspect([64, 0]);
    assert_eq!(camera.aspect, 64.0);

    // The view matrix brings the camera to the origin.
    let origin = camera.view() * Vector4::new(0.0, 1.0, 4.0, 1.0);
    assert!(origin.truncate().x.abs() < 1e-5 && origin.y.abs() < 1e-5 && origin.z.abs() < 1e-5);
}

#[test]
fn lights_are_collected_in_traversal_order() {
    let mut level = Level::new("graph");
    let root = level.default_root_scene_node_id();
    let lamp = LightDesc {
        color: [1.0, 0.5, 0.0],
        intensity: 2.0,
        ..Default::default()
    };
    let sun = LightDesc {
        kind: LightKind::Directional,
        ..Default::default()
    };
    let holder = level
        .add_scene_node(translated("holder", root, [0.0, 3.0, 0.0], NodeContent::Empty))
        .unwrap();
    level
        .add_scene_node(translated("lamp", holder, [1.0, 0.0, 0.0], NodeContent::Light(lamp)))
        .unwrap();
    level
        .add_scene_node(translated("sun", root, [9.0, 9.0, 9.0], NodeContent::Light(sun)))
        .unwrap();

    let lights = LightManager::from_level(&level, 0.0).unwrap();
    assert_eq!(lights.len(), 2);
    assert_eq!(lights.lights()[0].position, Vector3::new(1.0, 3.0, 0.0));
    assert_eq!(lights.lights()[0].color, Vector3::new(2.0, 1.0, 0.0));
    // Translation does not move a direction.
    assert_eq!(lights.lights()[1].position, Vector3::new(0.0, 0.0, -1.0));
}

#[test]
fn light_slots_write_declared_uniforms() {
    let mut manager = LightManager::new();
    let slot = manager.add_light(frame_ngin::light::Light {
        kind: LightKind::Point,
        position: Vector3::new(1.0, 2.0, 3.0),
        color: Vector3::new(0.5, 0.5, 0.5),
    });
    assert_eq!(slot, 0);

    let decls = vec![
        UniformDecl::builtin(uniform::LIGHT_POSITION),
        UniformDecl::builtin(uniform::LIGHT_COLOR),
    ];
    let mut block = UniformBlock::resolve(&decls, &FrameUniforms::default(), Matrix4::identity());
    assert_eq!(block.get(uniform::LIGHT_POSITION), Some(&UniformValue::Vec3([0.0; 3])));

    manager.apply(0, &mut block).unwrap();
    assert_eq!(block.get(uniform::LIGHT_POSITION), Some(&UniformValue::Vec3([1.0, 2.0, 3.0])));
    assert_eq!(block.get(uniform::LIGHT_COLOR), Some(&UniformValue::Vec3([0.5, 0.5, 0.5])));

    match manager.apply(3, &mut block) {
        Err(frame_ngin::error::RenderError::LightSlot { slot, count }) => {
            assert_eq!(slot, 3);
            assert_eq!(count, 1);
        }
        other => panic!("expected a light slot error, got {:?}", other),
    }
}

#[test]
fn uniform_blocks_follow_declarations() {
    let frame = FrameUniforms {
        time: 2.5,
        delta_time: 0.25,
        ..Default::default()
    };
    let model = Matrix4::from_scale(3.0);
    let decls = vec![
        UniformDecl::builtin(uniform::MODEL),
        UniformDecl {
            name: "tint".to_string(),
            value: Some(UniformValue::Vec4([1.0, 0.0, 0.0, 1.0])),
        },
        UniformDecl::builtin(uniform::TIME),
        UniformDecl::builtin("not_builtin"),
    ];
    let mut block = UniformBlock::resolve(&decls, &frame, model);

    let names: Vec<&str> = block.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["model", "tint", "time"]);
    assert_eq!(block.get(uniform::MODEL), Some(&UniformValue::from(model)));
    assert_eq!(block.get(uniform::TIME), Some(&UniformValue::Float(2.5)));
    assert!(!block.is_declared(uniform::DELTA_TIME));

    assert!(block.replace("tint", UniformValue::Vec4([0.0; 4])));
    assert!(!block.replace(uniform::VIEW, UniformValue::Float(1.0)));
    assert_eq!(block.len(), 3);
}
