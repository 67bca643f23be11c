//! The audio-reactive feedback effect.
//!
//! [`FeedbackRenderer`] owns every GPU object the effect needs and is driven
//! one frame at a time by the UI layer through [`FeedbackRenderer::show`].

mod shaders;

use std::path::Path;

use tracing::{error, info, warn};

use crate::{
    compile, delete_program, delete_shader, link, BufferKind, BufferUsageHint, CompileMessage,
    CompiledShader, DynamicBuffer, FrameOutput, FrameTarget, FramebufferPair, GraphicsBackend,
    Primitive, RenderConfig, Result, ShaderPackage, ShaderStage, Size2, Spectrum, Uniform,
};

pub use shaders::{
    FEEDBACK_FRAGMENT, FEEDBACK_FRAGMENT_PATH, FEEDBACK_VERTEX, FEEDBACK_VERTEX_PATH,
};

/// Four vec3 corners followed by their four vec2 texture coordinates, drawn
/// as a triangle fan.
const QUAD: [f32; 20] = [
    -1.0, -1.0, 0.0, //
    1.0, -1.0, 0.0, //
    1.0, 1.0, 0.0, //
    -1.0, 1.0, 0.0, //
    0.0, 0.0, //
    1.0, 0.0, //
    1.0, 1.0, //
    0.0, 1.0,
];
const QUAD_VERTICES: i32 = 4;
const TEXCOORD_OFFSET: u32 = 4 * 3 * std::mem::size_of::<f32>() as u32;

/// Per-frame input from the UI layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub viewport: Size2,
    pub display: Size2,
    /// Seconds since the effect started.
    pub time: f32,
    pub spectrum: Spectrum,
}

#[derive(Debug)]
struct Uniforms<B: GraphicsBackend> {
    channel: Option<B::UniformLocation>,
    time: Option<B::UniformLocation>,
    resolution: Option<B::UniformLocation>,
    spectrum: Option<B::UniformLocation>,
}

impl<B: GraphicsBackend> Uniforms<B> {
    fn resolve(backend: &mut B, program: B::Program) -> Self {
        let mut find = |name: &str| {
            let location = backend.uniform_location(program, name);
            if location.is_none() {
                warn!(uniform = name, "uniform not found in feedback program");
            }
            location
        };
        Self {
            channel: find("iChannel0"),
            time: find("iTime"),
            resolution: find("iResolution"),
            spectrum: find("iSpectrum"),
        }
    }

    fn upload(&self, backend: &mut B, unit: u32, input: &FrameInput) {
        let values = [
            (&self.channel, Uniform::Int(unit as i32)),
            (&self.time, Uniform::Float(input.time)),
            (
                &self.resolution,
                Uniform::Vec2([input.viewport.width as f32, input.viewport.height as f32]),
            ),
            (&self.spectrum, Uniform::Vec4(input.spectrum.bands())),
        ];
        for (location, value) in values {
            if let Some(location) = location {
                backend.set_uniform(location, value);
            }
        }
    }
}

/// Program, uniform locations and quad geometry of a successful init.
#[derive(Debug)]
struct Pipeline<B: GraphicsBackend> {
    program: B::Program,
    uniforms: Uniforms<B>,
    vertex_array: B::VertexArray,
    quad: DynamicBuffer<B>,
}

impl<B: GraphicsBackend> Pipeline<B> {
    fn build(backend: &mut B, program: B::Program, config: &RenderConfig) -> Result<Self> {
        let uniforms = Uniforms::resolve(backend, program);
        let vertex_array = backend.create_vertex_array()?;
        let mut quad = match DynamicBuffer::new(
            backend,
            config.vertex_capacity,
            BufferKind::Vertex,
            BufferUsageHint::Static,
        ) {
            Ok(quad) => quad,
            Err(err) => {
                backend.delete_vertex_array(vertex_array);
                return Err(err);
            }
        };

        let offset = match fill_quad(&mut quad, backend) {
            Ok(offset) => offset as i32,
            Err(err) => {
                quad.destroy(backend);
                backend.delete_vertex_array(vertex_array);
                return Err(err);
            }
        };

        backend.bind_vertex_array(Some(vertex_array));
        quad.bind(backend);
        backend.vertex_attribute(0, 3, 0, offset);
        backend.vertex_attribute(1, 2, 0, offset + TEXCOORD_OFFSET as i32);
        backend.bind_vertex_array(None);
        quad.unbind(backend);

        Ok(Self {
            program,
            uniforms,
            vertex_array,
            quad,
        })
    }

    fn draw(&self, backend: &mut B, unit: u32, input: &FrameInput) {
        backend.use_program(Some(self.program));
        self.uniforms.upload(backend, unit, input);
        backend.bind_vertex_array(Some(self.vertex_array));
        backend.draw_arrays(Primitive::TriangleFan, 0, QUAD_VERTICES);
        backend.bind_vertex_array(None);
        backend.use_program(None);
    }

    fn destroy(self, backend: &mut B) {
        backend.delete_program(self.program);
        backend.delete_vertex_array(self.vertex_array);
        self.quad.destroy(backend);
    }
}

/// Renderer context for the feedback effect.
///
/// Nothing touches the backend until the first [`FeedbackRenderer::show`].
#[derive(Debug)]
pub struct FeedbackRenderer<B: GraphicsBackend> {
    config: RenderConfig,
    pair: FramebufferPair<B>,
    pipeline: Option<Pipeline<B>>,
    initialised: bool,
    skip_logged: bool,
    messages: Vec<CompileMessage>,
}

impl<B: GraphicsBackend> FeedbackRenderer<B> {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            pair: FramebufferPair::new(),
            pipeline: None,
            initialised: false,
            skip_logged: false,
            messages: Vec::new(),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Whether the last init produced a usable program.
    pub fn is_ready(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn framebuffers(&self) -> &FramebufferPair<B> {
        &self.pair
    }

    /// Diagnostics of every stage and the link step from the last init.
    pub fn program_messages(&self) -> &[CompileMessage] {
        &self.messages
    }

    /// Creates the framebuffers and builds the program. Called by
    /// [`FeedbackRenderer::show`] on first use.
    ///
    /// Shader errors are not returned: they are logged, kept in
    /// [`FeedbackRenderer::program_messages`] and leave the renderer in a
    /// state where frames are skipped.
    pub fn init(&mut self, backend: &mut B) -> Result<()> {
        if self.initialised {
            return Ok(());
        }
        self.pair.create(backend)?;
        self.messages.clear();
        self.skip_logged = false;

        let vertex = compile(
            backend,
            ShaderStage::Vertex,
            &stage_package(
                self.config.vertex_shader.as_deref(),
                FEEDBACK_VERTEX_PATH,
                FEEDBACK_VERTEX,
            ),
        );
        let fragment = compile(
            backend,
            ShaderStage::Pixel,
            &stage_package(
                self.config.fragment_shader.as_deref(),
                FEEDBACK_FRAGMENT_PATH,
                FEEDBACK_FRAGMENT,
            ),
        );
        let geometry = self
            .config
            .geometry_shader
            .as_deref()
            .map(|path| compile(backend, ShaderStage::Geometry, &ShaderPackage::new(path)));

        let program = link(backend, &vertex, geometry.as_ref(), &fragment);

        let stages: Vec<CompiledShader<B>> = [Some(vertex), geometry, Some(fragment)]
            .into_iter()
            .flatten()
            .collect();
        let all_compiled = stages.iter().all(|stage| stage.is_valid());
        for stage in &stages {
            self.messages.extend_from_slice(stage.messages());
        }
        if all_compiled {
            self.messages.extend_from_slice(program.messages());
        }
        for message in &self.messages {
            warn!(path = %message.path.display(), line = message.line + 1, "{}", message.text);
        }

        if let Some(handle) = program.handle() {
            for stage in &stages {
                if let Some(shader) = stage.handle() {
                    backend.detach_shader(handle, shader);
                }
            }
        }
        for stage in stages {
            delete_shader(backend, stage);
        }

        self.initialised = true;
        match program.handle() {
            Some(handle) => match Pipeline::build(backend, handle, &self.config) {
                Ok(pipeline) => {
                    self.pipeline = Some(pipeline);
                    info!("feedback renderer ready");
                    Ok(())
                }
                Err(err) => {
                    delete_program(backend, program);
                    self.initialised = false;
                    Err(err)
                }
            },
            None => {
                error!(error = %program.link_error(), "feedback program unavailable");
                Ok(())
            }
        }
    }

    /// Renders one frame of the effect and returns the texture holding it.
    ///
    /// Returns `None` when no frame was produced, either because the program
    /// is unavailable or because the render target could not be allocated.
    pub fn show(
        &mut self,
        backend: &mut B,
        input: &FrameInput,
    ) -> Result<Option<FrameOutput<B::Texture>>> {
        self.init(backend)?;
        let Some(pipeline) = self.pipeline.as_ref() else {
            if !self.skip_logged {
                warn!("skipping frames until the feedback program links");
                self.skip_logged = true;
            }
            return Ok(None);
        };

        let unit = self.config.feedback_texture_unit;
        let target = FrameTarget {
            viewport: input.viewport,
            display: input.display,
            texture_unit: unit,
            clear_color: self.config.clear_color,
        };
        self.pair.render_frame(backend, &target, |backend| {
            pipeline.draw(backend, unit, input);
            Ok(())
        })
    }

    /// Releases every backend object. The next [`FeedbackRenderer::show`]
    /// initialises again from scratch.
    pub fn close(&mut self, backend: &mut B) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(backend);
        }
        self.pair.destroy(backend);
        self.initialised = false;
        self.skip_logged = false;
        info!("feedback renderer closed");
    }
}

fn fill_quad<B: GraphicsBackend>(quad: &mut DynamicBuffer<B>, backend: &mut B) -> Result<u32> {
    let offset = quad.write(&QUAD)?;
    quad.upload(backend)?;
    Ok(offset)
}

fn stage_package(configured: Option<&Path>, builtin_path: &str, builtin: &str) -> ShaderPackage {
    match configured {
        Some(path) => ShaderPackage::new(path),
        None => ShaderPackage::from_source(builtin_path, "main", builtin),
    }
}
