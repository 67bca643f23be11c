//! Graphics backend abstraction.
//!
//! Every component in the crate talks to the GPU through [`GraphicsBackend`].
//! [`GlowBackend`] drives a real OpenGL 3.3 context owned by the host UI
//! layer, while [`HeadlessBackend`] simulates the same object model on the
//! CPU so the feedback loop can be exercised without a display.

mod glow_backend;
mod headless;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, ShaderStage};

pub use glow_backend::GlowBackend;
pub use headless::{DrawCall, HeadlessBackend, HeadlessId, HeadlessUniform, TextureContents};

/// Status reported by a complete framebuffer (`GL_FRAMEBUFFER_COMPLETE`).
pub const FRAMEBUFFER_COMPLETE: u32 = glow::FRAMEBUFFER_COMPLETE;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size2 {
    pub width: i32,
    pub height: i32,
}

impl Size2 {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl fmt::Display for Size2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pipeline input a buffer is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferKind {
    /// Element indices (`GL_ELEMENT_ARRAY_BUFFER`).
    Index,
    /// Vertex attributes (`GL_ARRAY_BUFFER`).
    Vertex,
}

/// Allocation hint passed through to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferUsageHint {
    Static,
    Dynamic,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Triangles,
    TriangleFan,
    TriangleStrip,
}

/// Value uploaded to a shader uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
}

/// Outcome of a backend compile or link call: the status flag plus the raw
/// info log, which may hold zero or more newline separated diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    pub success: bool,
    pub log: String,
}

impl BuildOutcome {
    pub fn success(log: impl Into<String>) -> Self {
        Self {
            success: true,
            log: log.into(),
        }
    }

    pub fn failure(log: impl Into<String>) -> Self {
        Self {
            success: false,
            log: log.into(),
        }
    }
}

/// Object lifetime, compile/link and draw primitives consumed by the
/// renderer.
///
/// Methods that operate on a specific object take its handle explicitly;
/// implementations are free to bind it internally.
pub trait GraphicsBackend {
    type Shader: Copy + fmt::Debug + PartialEq;
    type Program: Copy + fmt::Debug + PartialEq;
    type Buffer: Copy + fmt::Debug + PartialEq;
    type Texture: Copy + fmt::Debug + PartialEq;
    type Renderbuffer: Copy + fmt::Debug + PartialEq;
    type Framebuffer: Copy + fmt::Debug + PartialEq;
    type VertexArray: Copy + fmt::Debug + PartialEq;
    type UniformLocation: Clone + fmt::Debug;

    /// Creates a shader object for a resolved stage. `Unknown` and
    /// `Compute` are rejected.
    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader>;
    fn compile_shader(&mut self, shader: Self::Shader, source: &str) -> BuildOutcome;
    fn delete_shader(&mut self, shader: Self::Shader);

    fn create_program(&mut self) -> Result<Self::Program>;
    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn link_program(&mut self, program: Self::Program) -> BuildOutcome;
    fn use_program(&mut self, program: Option<Self::Program>);
    fn delete_program(&mut self, program: Self::Program);
    fn uniform_location(
        &mut self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;
    fn set_uniform(&mut self, location: &Self::UniformLocation, value: Uniform);

    fn create_buffer(&mut self) -> Result<Self::Buffer>;
    fn bind_buffer(&mut self, kind: BufferKind, buffer: Option<Self::Buffer>);
    /// (Re)allocates the GPU store of `buffer`, discarding its contents.
    fn allocate_buffer(
        &mut self,
        buffer: Self::Buffer,
        kind: BufferKind,
        size: u32,
        hint: BufferUsageHint,
    );
    /// Copies `data` into the GPU store of `buffer` starting at `offset`.
    fn write_buffer(&mut self, buffer: Self::Buffer, kind: BufferKind, offset: u32, data: &[u8]);
    fn delete_buffer(&mut self, buffer: Self::Buffer);

    fn create_vertex_array(&mut self) -> Result<Self::VertexArray>;
    fn bind_vertex_array(&mut self, vertex_array: Option<Self::VertexArray>);
    /// Enables float attribute `index` sourced from the bound vertex buffer.
    fn vertex_attribute(&mut self, index: u32, components: i32, stride: i32, offset: i32);
    fn delete_vertex_array(&mut self, vertex_array: Self::VertexArray);

    fn create_texture(&mut self) -> Result<Self::Texture>;
    fn allocate_texture(&mut self, texture: Self::Texture, size: Size2);
    /// Binds `texture` for sampling on `unit`, or clears the unit.
    fn bind_sampler(&mut self, unit: u32, texture: Option<Self::Texture>);
    fn delete_texture(&mut self, texture: Self::Texture);

    fn create_renderbuffer(&mut self) -> Result<Self::Renderbuffer>;
    fn allocate_depth_stencil(&mut self, renderbuffer: Self::Renderbuffer, size: Size2);
    fn delete_renderbuffer(&mut self, renderbuffer: Self::Renderbuffer);

    fn create_framebuffer(&mut self) -> Result<Self::Framebuffer>;
    fn attach_color(&mut self, framebuffer: Self::Framebuffer, texture: Self::Texture);
    fn attach_depth_stencil(
        &mut self,
        framebuffer: Self::Framebuffer,
        renderbuffer: Self::Renderbuffer,
    );
    /// Returns [`FRAMEBUFFER_COMPLETE`] or the backend's incompleteness code.
    fn framebuffer_status(&mut self, framebuffer: Self::Framebuffer) -> u32;
    fn bind_framebuffer(&mut self, framebuffer: Option<Self::Framebuffer>);
    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer);

    fn viewport(&mut self, size: Size2);
    /// Clears colour and depth of the bound framebuffer.
    fn clear(&mut self, color: [f32; 4]);
    fn draw_arrays(&mut self, primitive: Primitive, first: i32, count: i32);
}
