//! The frame loop.
//!
//! A [`Renderer`] owns a [`Device`], the loaded [`Level`] and the plugins.
//! Every frame walks the level's programs in registration order. Each
//! program becomes one pass:
//!
//! - targets are the program's output textures, or the screen when it has
//!   none; a target is cleared on its first write of the frame
//! - `QUAD` and `CUBE` programs draw their built-in mesh once, sampling the
//!   program inputs
//! - `SCENE` programs draw every mesh node below their root whose material
//!   belongs to the program, sampling the material textures (or the program
//!   inputs when the material has none)
//!
//! The whole frame is planned before the device sees any of it, so a bad
//! light binding or a broken reference fails the frame without leaving a
//! pass half recorded.

use std::collections::{HashMap, HashSet};

use cgmath::{Matrix4, SquareMatrix};
use instant::Instant;

use crate::{
    backend::{self, ColorAttachment, Device, DrawCall, PassDescriptor, RenderTarget},
    camera::Camera,
    config::EngineConfig,
    diagnostics::Logger,
    error::{PluginError, RenderError},
    level::{EntityId, Level, NodeContent, Program, SceneType, Texture, builder::LevelBuilder, proto::LevelProto},
    light::LightManager,
    plugin::{Plugin, PluginContext, PluginRegistry},
    resources::AssetLoader,
    scene_graph,
    uniform::{self, FrameUniforms, UniformBlock},
};

/// Render targets that are not the screen start each frame transparent.
const TARGET_CLEAR: [f64; 4] = [0.0, 0.0, 0.0, 0.0];

/// Measures the time between frames.
#[derive(Debug)]
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self { last: Instant::now() }
    }

    /// Seconds since the previous tick.
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        dt
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A pass and its draws, ready to be handed to the device.
struct PlannedPass {
    pass: PassDescriptor,
    draws: Vec<DrawCall>,
}

pub struct Renderer<D: Device> {
    device: D,
    level: Option<Level>,
    plugins: PluginRegistry,
    logger: Logger,
    clear_color: [f64; 4],
    clock: FrameClock,
    elapsed: f64,
    /// Explicit light slots, by program name.
    light_slots: HashMap<String, usize>,
    fallback_camera: Camera,
    /// Ids the device holds, in release order.
    uploaded: Vec<EntityId>,
    /// Level revision the device mirrors.
    synced_revision: u64,
}

impl<D: Device> Renderer<D> {
    pub fn new(device: D, logger: Logger) -> Self {
        Self {
            device,
            level: None,
            plugins: PluginRegistry::new(),
            logger,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clock: FrameClock::new(),
            elapsed: 0.0,
            light_slots: HashMap::new(),
            fallback_camera: Camera::default(),
            uploaded: Vec::new(),
            synced_revision: 0,
        }
    }

    pub fn with_clear_color(mut self, clear_color: [f64; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    /// Applies the renderer settings of `config`.
    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_clear_color(config.clear_color)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn level(&self) -> Option<&Level> {
        self.level.as_ref()
    }

    pub fn level_mut(&mut self) -> Option<&mut Level> {
        self.level.as_mut()
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Seconds of frame time since the current level was loaded.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Camera used when the level has no camera node.
    pub fn set_fallback_camera(&mut self, camera: Camera) {
        self.fallback_camera = camera;
    }

    /// Uploads `level` and makes it current.
    ///
    /// Both levels number their entities from one, so the previous level
    /// leaves the device first. If the upload fails the previous level is
    /// uploaded again and keeps rendering.
    pub fn load_level(&mut self, level: Level) -> Result<(), RenderError> {
        self.release_uploaded();
        if let Err(e) = self.upload(&level) {
            self.logger
                .error(format!("could not upload level {}: {:#}", level.name(), e));
            if let Some(old) = self.level.take() {
                match self.upload(&old) {
                    Ok(()) => self.level = Some(old),
                    Err(restore) => self
                        .logger
                        .error(format!("could not restore level {}: {:#}", old.name(), restore)),
                }
            }
            return Err(RenderError::Device(e));
        }
        self.logger.info(format!(
            "loaded level {} ({} entities) on {}",
            level.name(),
            level.len(),
            self.device.backend_name()
        ));
        self.level = Some(level);
        self.elapsed = 0.0;
        Ok(())
    }

    /// Creates `level` on the device and records what it holds. A partial
    /// upload is destroyed again.
    fn upload(&mut self, level: &Level) -> anyhow::Result<()> {
        if let Err(e) = self.device.upload_level(level) {
            for id in backend::release_order(level) {
                // Whatever was not created yet is missing, which is fine.
                let _ = self.device.destroy(id);
            }
            return Err(e);
        }
        self.uploaded = backend::release_order(level);
        self.synced_revision = level.revision();
        Ok(())
    }

    /// Destroys every uploaded resource, carrying on past failures.
    fn release_uploaded(&mut self) {
        for id in std::mem::take(&mut self.uploaded) {
            if let Err(e) = self.device.destroy(id) {
                self.logger.warn(format!("could not release {}: {:#}", id, e));
            }
        }
    }

    /// Brings the device up to date after the level changed through
    /// [`Level::update`], [`Level::add`] or [`Level::remove`].
    fn sync_device(&mut self) -> Result<(), RenderError> {
        let Some(level) = self.level.take() else {
            return Ok(());
        };
        if level.revision() == self.synced_revision {
            self.level = Some(level);
            return Ok(());
        }
        self.logger
            .debug(format!("level {} changed, uploading it again", level.name()));
        self.release_uploaded();
        let result = self.upload(&level);
        self.level = Some(level);
        result.map_err(RenderError::Device)
    }

    /// Rebuilds the level from `proto`. A failed build leaves the current
    /// level in place.
    pub fn reload_level(&mut self, builder: &LevelBuilder, proto: &LevelProto) -> Result<(), RenderError> {
        match builder.build(proto) {
            Ok(level) => self.load_level(level),
            Err(e) => {
                self.logger
                    .warn(format!("keeping the current level, rebuild failed: {}", e));
                Err(RenderError::Build(e))
            }
        }
    }

    /// Releases the current level from the device and hands it back.
    pub fn unload_level(&mut self) -> Option<Level> {
        self.release_uploaded();
        self.level.take()
    }

    /// Re-reads the shader sources of program `name`. On failure the
    /// program keeps its previous sources.
    pub fn reload_program(&mut self, name: &str, loader: &AssetLoader) -> Result<(), RenderError> {
        self.sync_device()?;
        let level = self.level.as_mut().ok_or(RenderError::NoLevel)?;
        let id = level.id_from_name(name);
        let old = level.program(id)?.clone();
        let sources = match loader.load_shader(self.device.shader_dir(), &old.shader) {
            Ok(sources) => sources,
            Err(e) => {
                self.logger
                    .warn(format!("keeping program {}: {:#}", name, e));
                return Err(RenderError::Device(e));
            }
        };
        let program = Program {
            vertex_source: sources.vertex,
            fragment_source: sources.fragment,
            geometry_source: sources.geometry,
            ..old.clone()
        };
        self.device.destroy(id)?;
        if let Err(e) = self.device.create_program(id, &program) {
            self.logger
                .warn(format!("keeping program {}: {:#}", name, e));
            self.device.create_program(id, &old)?;
            return Err(RenderError::Device(e));
        }
        level.update(id, |stored: &mut Program| *stored = program)?;
        self.synced_revision = level.revision();
        self.logger.info(format!("reloaded program {}", name));
        Ok(())
    }

    /// Feeds light `slot` to program `program_name`. Checked every frame.
    pub fn bind_light(&mut self, program_name: &str, slot: usize) {
        self.light_slots.insert(program_name.to_string(), slot);
    }

    pub fn unbind_light(&mut self, program_name: &str) {
        self.light_slots.remove(program_name);
    }

    /// Resizes the default framebuffer and every window sized render target.
    pub fn resize(&mut self, size: [u32; 2]) -> Result<(), RenderError> {
        if size[0] == 0 || size[1] == 0 {
            return Ok(());
        }
        self.device.resize(size)?;
        self.sync_device()?;
        let Some(level) = self.level.as_mut() else {
            return Ok(());
        };
        let window_sized: Vec<EntityId> = level
            .textures()
            .iter()
            .copied()
            .filter(|id| level.texture(*id).is_ok_and(|t| t.is_window_sized()))
            .collect();
        for id in window_sized {
            level.update(id, |texture: &mut Texture| texture.size = size)?;
            self.device.destroy(id)?;
            self.device.create_texture(id, level.texture(id)?)?;
        }
        self.synced_revision = level.revision();
        self.logger.debug(format!("resized to {}x{}", size[0], size[1]));
        Ok(())
    }

    /// Starts `plugin` and adds it after the existing ones.
    pub fn add_plugin(&mut self, mut plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        if self.plugins.get(plugin.name()).is_some() {
            return Err(PluginError::Duplicate(plugin.name().to_string()));
        }
        plugin.startup(self.device.size());
        self.plugins.add(plugin)
    }

    pub fn remove_plugin(&mut self, name: &str) -> Result<Box<dyn Plugin>, PluginError> {
        self.plugins.remove(name)
    }

    /// Renders one frame, timing it with the renderer's own clock.
    pub fn render(&mut self) -> Result<(), RenderError> {
        let dt = self.clock.tick();
        self.run_frame(dt)
    }

    /// Renders one frame `dt` seconds after the previous one.
    pub fn run_frame(&mut self, dt: f64) -> Result<(), RenderError> {
        let level = self.level.as_mut().ok_or(RenderError::NoLevel)?;
        self.elapsed += dt;
        let size = self.device.size();
        let mut ctx = PluginContext {
            level,
            elapsed: self.elapsed,
            delta_time: dt,
            size,
        };
        let draw = self.plugins.pre_render(&mut ctx);

        let result = if draw {
            self.sync_device().and_then(|()| self.render_level(dt))
        } else {
            self.logger.debug("frame skipped by a plugin");
            Ok(())
        };

        if let Some(level) = self.level.as_mut() {
            let mut ctx = PluginContext {
                level,
                elapsed: self.elapsed,
                delta_time: dt,
                size,
            };
            self.plugins.post_render(&mut ctx);
        }
        result
    }

    fn render_level(&mut self, dt: f64) -> Result<(), RenderError> {
        let level = self.level.as_ref().ok_or(RenderError::NoLevel)?;
        let plan = self.plan_frame(level, dt)?;

        self.device.begin_frame()?;
        let mut in_pass = false;
        let result = (|| -> anyhow::Result<()> {
            for planned in &plan {
                self.device.begin_pass(&planned.pass)?;
                in_pass = true;
                for draw in &planned.draws {
                    self.device.draw(draw)?;
                }
                in_pass = false;
                self.device.end_pass()?;
            }
            Ok(())
        })();
        if in_pass {
            if let Err(e) = self.device.end_pass() {
                self.logger.warn(format!("could not close the pass: {:#}", e));
            }
        }
        let end = self.device.end_frame();
        result?;
        end?;
        Ok(())
    }

    fn plan_frame(&self, level: &Level, dt: f64) -> Result<Vec<PlannedPass>, RenderError> {
        let camera = self.frame_camera(level)?;
        let frame = FrameUniforms::new(&camera, dt, self.elapsed);
        let lights = LightManager::from_level(level, self.elapsed)?;

        let mut written: HashSet<RenderTarget> = HashSet::new();
        let mut plan = Vec::with_capacity(level.programs().len());
        for &program_id in level.programs() {
            let program = level.program(program_id)?;
            let targets: Vec<RenderTarget> = if program.outputs.is_empty() {
                vec![RenderTarget::Screen]
            } else {
                program.outputs.iter().map(|id| RenderTarget::Texture(*id)).collect()
            };
            let clear_depth = !written.contains(&targets[0]);
            let attachments = targets
                .iter()
                .map(|target| ColorAttachment {
                    target: *target,
                    clear: written.insert(*target).then_some(match target {
                        RenderTarget::Screen => self.clear_color,
                        RenderTarget::Texture(_) => TARGET_CLEAR,
                    }),
                })
                .collect();

            let mut draws = self.program_draws(level, program_id, program, &frame)?;
            for draw in &mut draws {
                self.apply_light(program, &lights, &mut draw.uniforms)?;
            }
            plan.push(PlannedPass {
                pass: PassDescriptor {
                    program: program_id,
                    attachments,
                    clear_depth,
                },
                draws,
            });
        }
        Ok(plan)
    }

    fn frame_camera(&self, level: &Level) -> Result<Camera, RenderError> {
        let camera = self.place_camera(level)?;
        camera.validate().map_err(RenderError::Camera)?;
        Ok(camera)
    }

    fn place_camera(&self, level: &Level) -> Result<Camera, RenderError> {
        let size = self.device.size();
        let aspect = size[0].max(1) as f32 / size[1].max(1) as f32;
        let camera_id = level.default_camera_id();
        if camera_id.is_null() {
            let mut camera = self.fallback_camera.clone();
            camera.set_aspect(size);
            return Ok(camera);
        }
        let node = level.scene_node(camera_id)?;
        let NodeContent::Camera(desc) = &node.content else {
            let mut camera = self.fallback_camera.clone();
            camera.set_aspect(size);
            return Ok(camera);
        };
        let world = scene_graph::world_transform(level, camera_id, self.elapsed)?;
        Ok(Camera::from_desc(desc, &world, aspect))
    }

    fn program_draws(
        &self,
        level: &Level,
        program_id: EntityId,
        program: &Program,
        frame: &FrameUniforms,
    ) -> Result<Vec<DrawCall>, RenderError> {
        match program.scene_type {
            SceneType::Quad | SceneType::Cube => {
                let mesh = if program.scene_root.is_null() {
                    match program.scene_type {
                        SceneType::Quad => level.default_static_mesh_quad_id(),
                        _ => level.default_static_mesh_cube_id(),
                    }
                } else {
                    program.scene_root
                };
                Ok(vec![DrawCall {
                    program: program_id,
                    mesh,
                    textures: program.inputs.clone(),
                    uniforms: UniformBlock::resolve(&program.uniforms, frame, Matrix4::identity()),
                    clear_depth: level.static_mesh(mesh)?.clear_depth,
                }])
            }
            SceneType::Scene => {
                let root = if program.scene_root.is_null() {
                    level.default_root_scene_node_id()
                } else {
                    program.scene_root
                };
                let mut draws = Vec::new();
                scene_graph::visit(level, root, self.elapsed, &mut |_, node, world| {
                    let NodeContent::Mesh(mesh_id) = node.content else {
                        return Ok(());
                    };
                    let mesh = level.static_mesh(mesh_id)?;
                    if mesh.material.is_null() {
                        return Ok(());
                    }
                    let material = level.material(mesh.material)?;
                    if material.program != program_id {
                        return Ok(());
                    }
                    let textures = if material.textures.is_empty() {
                        program.inputs.clone()
                    } else {
                        material.textures.clone()
                    };
                    draws.push(DrawCall {
                        program: program_id,
                        mesh: mesh_id,
                        textures,
                        uniforms: UniformBlock::resolve(&program.uniforms, frame, *world),
                        clear_depth: mesh.clear_depth,
                    });
                    Ok(())
                })?;
                Ok(draws)
            }
            SceneType::None => {
                self.logger
                    .debug(format!("program {} has no scene to draw", program.name));
                Ok(Vec::new())
            }
        }
    }

    fn apply_light(&self, program: &Program, lights: &LightManager, uniforms: &mut UniformBlock) -> Result<(), RenderError> {
        if let Some(slot) = self.light_slots.get(&program.name) {
            return lights.apply(*slot, uniforms);
        }
        let wants_light =
            uniforms.is_declared(uniform::LIGHT_POSITION) || uniforms.is_declared(uniform::LIGHT_COLOR);
        if wants_light && !lights.is_empty() {
            lights.apply(0, uniforms)?;
        }
        Ok(())
    }
}
