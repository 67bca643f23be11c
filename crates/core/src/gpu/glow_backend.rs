use std::{fmt, sync::Arc};

use glow::HasContext;

use super::{BufferKind, BufferUsageHint, BuildOutcome, GraphicsBackend, Primitive, Size2, Uniform};
use crate::{Result, ShaderStage, VisualiserError};

/// [`GraphicsBackend`] over an OpenGL 3.3 core context.
///
/// The context is created and made current by the host windowing layer; the
/// backend only borrows it for the render thread.
#[derive(Clone)]
pub struct GlowBackend {
    gl: Arc<glow::Context>,
}

impl GlowBackend {
    pub fn new(gl: Arc<glow::Context>) -> Self {
        Self { gl }
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

impl fmt::Debug for GlowBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlowBackend").finish_non_exhaustive()
    }
}

fn buffer_target(kind: BufferKind) -> u32 {
    match kind {
        BufferKind::Index => glow::ELEMENT_ARRAY_BUFFER,
        BufferKind::Vertex => glow::ARRAY_BUFFER,
    }
}

fn usage_hint(hint: BufferUsageHint) -> u32 {
    match hint {
        BufferUsageHint::Static => glow::STATIC_DRAW,
        BufferUsageHint::Dynamic => glow::DYNAMIC_DRAW,
        BufferUsageHint::Stream => glow::STREAM_DRAW,
    }
}

fn create_error(what: &str, err: String) -> VisualiserError {
    VisualiserError::Backend(format!("{what} failed: {err}"))
}

// All calls below require the context to be current on the calling thread,
// which the host guarantees for the render callback.
impl GraphicsBackend for GlowBackend {
    type Shader = glow::NativeShader;
    type Program = glow::NativeProgram;
    type Buffer = glow::NativeBuffer;
    type Texture = glow::NativeTexture;
    type Renderbuffer = glow::NativeRenderbuffer;
    type Framebuffer = glow::NativeFramebuffer;
    type VertexArray = glow::NativeVertexArray;
    type UniformLocation = glow::NativeUniformLocation;

    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Geometry => glow::GEOMETRY_SHADER,
            ShaderStage::Pixel => glow::FRAGMENT_SHADER,
            ShaderStage::Unknown | ShaderStage::Compute => {
                return Err(VisualiserError::Backend(format!(
                    "no shader object for stage {stage:?}"
                )))
            }
        };
        unsafe { self.gl.create_shader(kind) }.map_err(|err| create_error("create_shader", err))
    }

    fn compile_shader(&mut self, shader: Self::Shader, source: &str) -> BuildOutcome {
        unsafe {
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            BuildOutcome {
                success: self.gl.get_shader_compile_status(shader),
                log: self.gl.get_shader_info_log(shader),
            }
        }
    }

    fn delete_shader(&mut self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&mut self) -> Result<Self::Program> {
        unsafe { self.gl.create_program() }.map_err(|err| create_error("create_program", err))
    }

    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.attach_shader(program, shader) }
    }

    fn detach_shader(&mut self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.detach_shader(program, shader) }
    }

    fn link_program(&mut self, program: Self::Program) -> BuildOutcome {
        unsafe {
            self.gl.link_program(program);
            BuildOutcome {
                success: self.gl.get_program_link_status(program),
                log: self.gl.get_program_info_log(program),
            }
        }
    }

    fn use_program(&mut self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn delete_program(&mut self, program: Self::Program) {
        unsafe {
            self.gl.delete_program(program);
            // A failed link can leave an error flag behind; drop it so it is
            // not reported against an unrelated call later.
            let _ = self.gl.get_error();
        }
    }

    fn uniform_location(
        &mut self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn set_uniform(&mut self, location: &Self::UniformLocation, value: Uniform) {
        unsafe {
            match value {
                Uniform::Int(v) => self.gl.uniform_1_i32(Some(location), v),
                Uniform::Float(v) => self.gl.uniform_1_f32(Some(location), v),
                Uniform::Vec2([x, y]) => self.gl.uniform_2_f32(Some(location), x, y),
                Uniform::Vec4([x, y, z, w]) => self.gl.uniform_4_f32(Some(location), x, y, z, w),
            }
        }
    }

    fn create_buffer(&mut self) -> Result<Self::Buffer> {
        unsafe { self.gl.create_buffer() }.map_err(|err| create_error("create_buffer", err))
    }

    fn bind_buffer(&mut self, kind: BufferKind, buffer: Option<Self::Buffer>) {
        unsafe { self.gl.bind_buffer(buffer_target(kind), buffer) }
    }

    fn allocate_buffer(
        &mut self,
        buffer: Self::Buffer,
        kind: BufferKind,
        size: u32,
        hint: BufferUsageHint,
    ) {
        let target = buffer_target(kind);
        unsafe {
            self.gl.bind_buffer(target, Some(buffer));
            self.gl.buffer_data_size(target, size as i32, usage_hint(hint));
        }
    }

    fn write_buffer(&mut self, buffer: Self::Buffer, kind: BufferKind, offset: u32, data: &[u8]) {
        let target = buffer_target(kind);
        unsafe {
            self.gl.bind_buffer(target, Some(buffer));
            self.gl.buffer_sub_data_u8_slice(target, offset as i32, data);
        }
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn create_vertex_array(&mut self) -> Result<Self::VertexArray> {
        unsafe { self.gl.create_vertex_array() }
            .map_err(|err| create_error("create_vertex_array", err))
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<Self::VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vertex_array) }
    }

    fn vertex_attribute(&mut self, index: u32, components: i32, stride: i32, offset: i32) {
        unsafe {
            self.gl.enable_vertex_attrib_array(index);
            self.gl
                .vertex_attrib_pointer_f32(index, components, glow::FLOAT, false, stride, offset);
        }
    }

    fn delete_vertex_array(&mut self, vertex_array: Self::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vertex_array) }
    }

    fn create_texture(&mut self) -> Result<Self::Texture> {
        unsafe { self.gl.create_texture() }.map_err(|err| create_error("create_texture", err))
    }

    fn allocate_texture(&mut self, texture: Self::Texture, size: Size2) {
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGB as i32,
                size.width,
                size.height,
                0,
                glow::RGB,
                glow::UNSIGNED_BYTE,
                None,
            );
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    fn bind_sampler(&mut self, unit: u32, texture: Option<Self::Texture>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, texture);
            if texture.is_none() {
                return;
            }
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            // The source changed since the last bind, so the chain is stale.
            self.gl.generate_mipmap(glow::TEXTURE_2D);
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR_MIPMAP_LINEAR as i32,
            );
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
        }
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn create_renderbuffer(&mut self) -> Result<Self::Renderbuffer> {
        unsafe { self.gl.create_renderbuffer() }
            .map_err(|err| create_error("create_renderbuffer", err))
    }

    fn allocate_depth_stencil(&mut self, renderbuffer: Self::Renderbuffer, size: Size2) {
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::DEPTH24_STENCIL8,
                size.width,
                size.height,
            );
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: Self::Renderbuffer) {
        unsafe { self.gl.delete_renderbuffer(renderbuffer) }
    }

    fn create_framebuffer(&mut self) -> Result<Self::Framebuffer> {
        unsafe { self.gl.create_framebuffer() }
            .map_err(|err| create_error("create_framebuffer", err))
    }

    fn attach_color(&mut self, framebuffer: Self::Framebuffer, texture: Self::Texture) {
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            self.gl.draw_buffers(&[glow::COLOR_ATTACHMENT0]);
        }
    }

    fn attach_depth_stencil(
        &mut self,
        framebuffer: Self::Framebuffer,
        renderbuffer: Self::Renderbuffer,
    ) {
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_STENCIL_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(renderbuffer),
            );
        }
    }

    fn framebuffer_status(&mut self, framebuffer: Self::Framebuffer) -> u32 {
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            status
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<Self::Framebuffer>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer) }
    }

    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer) }
    }

    fn viewport(&mut self, size: Size2) {
        unsafe { self.gl.viewport(0, 0, size.width, size.height) }
    }

    fn clear(&mut self, color: [f32; 4]) {
        let [r, g, b, a] = color;
        unsafe {
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: i32, count: i32) {
        let mode = match primitive {
            Primitive::Triangles => glow::TRIANGLES,
            Primitive::TriangleFan => glow::TRIANGLE_FAN,
            Primitive::TriangleStrip => glow::TRIANGLE_STRIP,
        };
        unsafe { self.gl.draw_arrays(mode, first, count) }
    }
}
