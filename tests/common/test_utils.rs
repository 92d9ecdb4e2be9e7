use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use frame_ngin::{
    diagnostics::{CaptureSink, Logger},
    file::AssetPaths,
    level::{
        SceneType,
        proto::{LevelProto, MaterialProto, MeshProto, ProgramProto, SceneNodeProto, TextureProto},
    },
    plugin::{Plugin, PluginContext},
    resources::AssetLoader,
    uniform::UniformDecl,
};
use tempfile::TempDir;

pub const WINDOW_SIZE: [u32; 2] = [64, 48];

/// One triangle, normals up the z axis.
pub const TRIANGLE_OBJ: &str = "\
o triangle
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1
";

/// A unit square made of two triangles.
pub const SQUARE_OBJ: &str = "\
o square
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1 4/4/1
";

pub const POINTS_PLY: &str = "\
ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
end_header
0 0 0
1 0 0
0 1 0
";

/// A scratch asset tree with a shader pair for every program a test uses.
pub struct TestAssets {
    dir: TempDir,
    paths: AssetPaths,
}

impl TestAssets {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("could not create a temp dir");
        let root = dir.path().join("asset");
        std::fs::create_dir_all(&root).expect("could not create the asset root");
        let paths = AssetPaths::new(root);
        Self { dir, paths }
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn paths(&self) -> AssetPaths {
        self.paths.clone()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.paths.resolve(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().expect("no parent")).expect("could not create dirs");
        std::fs::write(&path, contents).expect("could not write fixture");
        path
    }

    /// Writes a solid color PNG.
    pub fn write_png(&self, relative: &str, size: [u32; 2], rgba: [u8; 4]) -> PathBuf {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().expect("no parent")).expect("could not create dirs");
        let image = image::RgbaImage::from_pixel(size[0], size[1], image::Rgba(rgba));
        image.save(&path).expect("could not write png");
        path
    }

    /// Writes `shader/wgsl/<name>.vert` and `.frag`.
    pub fn write_shader(&self, name: &str) {
        self.write(
            &format!("shader/wgsl/{}.vert", name),
            &format!("// {} vertex\n@vertex fn vs_main() {{}}\n", name),
        );
        self.write(
            &format!("shader/wgsl/{}.frag", name),
            &format!("// {} fragment\n@fragment fn fs_main() {{}}\n", name),
        );
    }

    pub fn loader(&self) -> AssetLoader {
        AssetLoader::new(self.paths(), Logger::default())
    }

    pub fn capturing_loader(&self) -> (AssetLoader, Arc<CaptureSink>) {
        let sink = CaptureSink::new();
        let loader = AssetLoader::new(self.paths(), Logger::new(sink.clone()));
        (loader, sink)
    }
}

impl Default for TestAssets {
    fn default() -> Self {
        Self::new()
    }
}

pub fn texture(name: &str) -> TextureProto {
    TextureProto {
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn sized_texture(name: &str, size: [u32; 2]) -> TextureProto {
    TextureProto {
        name: name.to_string(),
        size: Some(size),
        ..Default::default()
    }
}

pub fn program(name: &str, scene_type: SceneType, inputs: &[&str], outputs: &[&str]) -> ProgramProto {
    ProgramProto {
        name: name.to_string(),
        input_texture_names: inputs.iter().map(|s| s.to_string()).collect(),
        output_texture_names: outputs.iter().map(|s| s.to_string()).collect(),
        input_scene_type: scene_type,
        ..Default::default()
    }
}

pub fn with_uniforms(mut program: ProgramProto, names: &[&str]) -> ProgramProto {
    program.uniforms = names.iter().map(|n| UniformDecl::builtin(n)).collect();
    program
}

pub fn material(name: &str, program: &str, textures: &[&str]) -> MaterialProto {
    MaterialProto {
        name: name.to_string(),
        program_name: program.to_string(),
        texture_names: textures.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn file_mesh(name: &str, file_name: &str, material: &str) -> MeshProto {
    MeshProto {
        name: name.to_string(),
        file_name: file_name.to_string(),
        material_name: material.to_string(),
        ..Default::default()
    }
}

pub fn node(name: &str, parent: &str, mesh: &str) -> SceneNodeProto {
    SceneNodeProto {
        name: name.to_string(),
        parent: parent.to_string(),
        mesh_name: mesh.to_string(),
        ..Default::default()
    }
}

/// A two pass level: a scene rendered into `albedo`, then a screen quad
/// sampling it.
pub fn two_pass_level(assets: &TestAssets) -> LevelProto {
    assets.write_shader("scene");
    assets.write_shader("present");
    assets.write("mesh/triangle.obj", TRIANGLE_OBJ);
    LevelProto {
        name: "two_pass".to_string(),
        textures: vec![texture("albedo")],
        programs: vec![
            with_uniforms(
                program("scene", SceneType::Scene, &[], &["albedo"]),
                &["projection", "view", "model"],
            ),
            program("present", SceneType::Quad, &["albedo"], &[]),
        ],
        materials: vec![material("flat", "scene", &[])],
        meshes: vec![file_mesh("triangle", "mesh/triangle.obj", "flat")],
        scene_nodes: vec![node("triangle_node", "", "triangle")],
        ..Default::default()
    }
}

/// Records every hook call as `"<name>:<hook>"`.
pub struct RecordingPlugin {
    pub name: String,
    pub events: Rc<RefCell<Vec<String>>>,
    pub render: bool,
}

impl RecordingPlugin {
    pub fn new(name: &str, events: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            events: events.clone(),
            render: true,
        }
    }

    fn record(&self, hook: &str) {
        self.events.borrow_mut().push(format!("{}:{}", self.name, hook));
    }
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn startup(&mut self, _size: [u32; 2]) {
        self.record("startup");
    }

    fn pre_render(&mut self, _ctx: &mut PluginContext) -> bool {
        self.record("pre_render");
        self.render
    }

    fn post_render(&mut self, _ctx: &mut PluginContext) {
        self.record("post_render");
    }

    fn end(&mut self) {
        self.record("end");
    }
}
