use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    fmt::Write as _,
};

use super::{
    BufferKind, BufferUsageHint, BuildOutcome, GraphicsBackend, Primitive, Size2, Uniform,
    FRAMEBUFFER_COMPLETE,
};
use crate::{Result, ShaderStage, VisualiserError};

/// Handle to an object owned by [`HeadlessBackend`]. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeadlessId(u32);

impl HeadlessId {
    pub fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessUniform {
    program: HeadlessId,
    name: String,
}

/// What a simulated colour texture currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureContents {
    /// Storage was (re)allocated and never written.
    Undefined,
    Cleared,
    /// Written by the draw call with this index in [`HeadlessBackend::draws`].
    Drawn(usize),
}

/// A recorded `draw_arrays` call together with the state it observed.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: Option<HeadlessId>,
    pub framebuffer: Option<HeadlessId>,
    pub viewport: Size2,
    pub primitive: Primitive,
    pub first: i32,
    pub count: i32,
    /// Contents of every texture bound for sampling, keyed by unit.
    pub sampled: Vec<(u32, TextureContents)>,
}

#[derive(Debug)]
enum Object {
    Shader {
        stage: ShaderStage,
        source: String,
        compiled: bool,
    },
    Program {
        attached: Vec<HeadlessId>,
        linked: bool,
        /// Uniform names declared by the stages at the last successful link.
        declared: Vec<String>,
        uniforms: HashMap<String, Uniform>,
    },
    Buffer {
        data: Vec<u8>,
        hint: Option<BufferUsageHint>,
        allocations: usize,
        writes: Vec<(u32, usize)>,
    },
    Texture {
        size: Size2,
        allocations: usize,
        contents: TextureContents,
    },
    Renderbuffer {
        size: Size2,
        allocations: usize,
    },
    Framebuffer {
        color: Option<HeadlessId>,
        depth_stencil: Option<HeadlessId>,
    },
    VertexArray {
        attributes: Vec<(u32, i32, i32, i32)>,
    },
}

/// CPU-side simulation of the GL object model.
///
/// Compiles run a small source checker that reports diagnostics in the
/// `0(line, column) : error ...` shape real drivers emit; outcomes can also be
/// scripted with [`HeadlessBackend::script_compile`] and
/// [`HeadlessBackend::script_link`]. Draws record which textures they sampled
/// so feedback ordering can be verified.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u32,
    objects: BTreeMap<HeadlessId, Object>,
    compile_script: VecDeque<BuildOutcome>,
    link_script: VecDeque<BuildOutcome>,
    incomplete_framebuffers: bool,
    compile_calls: usize,
    bound_framebuffer: Option<HeadlessId>,
    bound_program: Option<HeadlessId>,
    bound_vertex_array: Option<HeadlessId>,
    bound_buffers: HashMap<BufferKind, HeadlessId>,
    samplers: BTreeMap<u32, HeadlessId>,
    viewport: Size2,
    draws: Vec<DrawCall>,
    clears: Vec<Option<HeadlessId>>,
    feedback_hazards: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next compile returns `outcome` instead of running the checker.
    pub fn script_compile(&mut self, outcome: BuildOutcome) {
        self.compile_script.push_back(outcome);
    }

    /// The next link returns `outcome` instead of running the checker.
    pub fn script_link(&mut self, outcome: BuildOutcome) {
        self.link_script.push_back(outcome);
    }

    /// Makes every completeness check fail until switched off again.
    pub fn set_framebuffers_incomplete(&mut self, incomplete: bool) {
        self.incomplete_framebuffers = incomplete;
    }

    pub fn compile_calls(&self) -> usize {
        self.compile_calls
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn is_live(&self, id: HeadlessId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    /// Framebuffer bound at each clear, in call order.
    pub fn clears(&self) -> &[Option<HeadlessId>] {
        &self.clears
    }

    /// Draws that sampled the texture they were rendering into.
    pub fn feedback_hazards(&self) -> usize {
        self.feedback_hazards
    }

    pub fn bound_framebuffer(&self) -> Option<HeadlessId> {
        self.bound_framebuffer
    }

    pub fn bound_program(&self) -> Option<HeadlessId> {
        self.bound_program
    }

    pub fn bound_sampler(&self, unit: u32) -> Option<HeadlessId> {
        self.samplers.get(&unit).copied()
    }

    pub fn viewport_size(&self) -> Size2 {
        self.viewport
    }

    pub fn texture_size(&self, id: HeadlessId) -> Option<Size2> {
        match self.objects.get(&id) {
            Some(Object::Texture { size, .. }) => Some(*size),
            _ => None,
        }
    }

    pub fn texture_allocations(&self, id: HeadlessId) -> usize {
        match self.objects.get(&id) {
            Some(Object::Texture { allocations, .. }) => *allocations,
            _ => 0,
        }
    }

    pub fn texture_contents(&self, id: HeadlessId) -> Option<TextureContents> {
        match self.objects.get(&id) {
            Some(Object::Texture { contents, .. }) => Some(*contents),
            _ => None,
        }
    }

    pub fn renderbuffer_allocations(&self, id: HeadlessId) -> usize {
        match self.objects.get(&id) {
            Some(Object::Renderbuffer { allocations, .. }) => *allocations,
            _ => 0,
        }
    }

    pub fn buffer_data(&self, id: HeadlessId) -> Option<&[u8]> {
        match self.objects.get(&id) {
            Some(Object::Buffer { data, .. }) => Some(data),
            _ => None,
        }
    }

    pub fn buffer_hint(&self, id: HeadlessId) -> Option<BufferUsageHint> {
        match self.objects.get(&id) {
            Some(Object::Buffer { hint, .. }) => *hint,
            _ => None,
        }
    }

    pub fn buffer_allocations(&self, id: HeadlessId) -> usize {
        match self.objects.get(&id) {
            Some(Object::Buffer { allocations, .. }) => *allocations,
            _ => 0,
        }
    }

    /// `(offset, len)` of every sub-range write to the buffer.
    pub fn buffer_writes(&self, id: HeadlessId) -> &[(u32, usize)] {
        match self.objects.get(&id) {
            Some(Object::Buffer { writes, .. }) => writes,
            _ => &[],
        }
    }

    pub fn bound_buffer(&self, kind: BufferKind) -> Option<HeadlessId> {
        self.bound_buffers.get(&kind).copied()
    }

    pub fn vertex_attributes(&self, id: HeadlessId) -> &[(u32, i32, i32, i32)] {
        match self.objects.get(&id) {
            Some(Object::VertexArray { attributes }) => attributes,
            _ => &[],
        }
    }

    pub fn attached_shaders(&self, program: HeadlessId) -> &[HeadlessId] {
        match self.objects.get(&program) {
            Some(Object::Program { attached, .. }) => attached,
            _ => &[],
        }
    }

    pub fn uniform(&self, program: HeadlessId, name: &str) -> Option<Uniform> {
        match self.objects.get(&program) {
            Some(Object::Program { uniforms, .. }) => uniforms.get(name).copied(),
            _ => None,
        }
    }

    fn allocate(&mut self, object: Object) -> HeadlessId {
        self.next_id += 1;
        let id = HeadlessId(self.next_id);
        self.objects.insert(id, object);
        id
    }

    fn framebuffer_color(&self, framebuffer: HeadlessId) -> Option<HeadlessId> {
        match self.objects.get(&framebuffer) {
            Some(Object::Framebuffer { color, .. }) => *color,
            _ => None,
        }
    }

    fn set_contents(&mut self, texture: HeadlessId, value: TextureContents) {
        if let Some(Object::Texture { contents, .. }) = self.objects.get_mut(&texture) {
            *contents = value;
        }
    }

    fn link_check(&self, attached: &[HeadlessId]) -> BuildOutcome {
        let mut log = String::new();
        for id in attached {
            match self.objects.get(id) {
                Some(Object::Shader {
                    stage,
                    source,
                    compiled,
                }) => {
                    if !compiled {
                        let _ = writeln!(log, "error: {} shader is not compiled", stage.label());
                    } else if !source.contains("main(") {
                        let _ = writeln!(log, "error: {} shader lacks `main'", stage.label());
                    }
                }
                _ => {
                    let _ = writeln!(log, "error: attached shader object {} is gone", id.0);
                }
            }
        }
        BuildOutcome {
            success: log.is_empty(),
            log,
        }
    }
}

/// Minimal syntax pass: flags characters GLSL never accepts and unbalanced
/// braces, reporting 1-based lines and columns.
fn check_source(source: &str) -> BuildOutcome {
    let mut log = String::new();
    let mut depth = 0i32;
    let mut last_line = 1;
    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        last_line = line_no;
        let code = line.split("//").next().unwrap_or_default();
        for (column, ch) in code.chars().enumerate() {
            let column = column + 1;
            match ch {
                '{' => depth += 1,
                '}' if depth == 0 => {
                    let _ = writeln!(
                        log,
                        "0({line_no}, {column}) : error C0000: syntax error, unexpected '}}'"
                    );
                }
                '}' => depth -= 1,
                '@' | '$' | '`' => {
                    let _ = writeln!(
                        log,
                        "0({line_no}, {column}) : error C0000: syntax error, unexpected '{ch}'"
                    );
                }
                _ => {}
            }
        }
    }
    if depth > 0 {
        let _ = writeln!(
            log,
            "0({last_line}) : error C0000: syntax error, unexpected end of file"
        );
    }
    BuildOutcome {
        success: log.is_empty(),
        log,
    }
}

/// Names declared by `uniform` lines, taken as the last identifier before
/// the `;`.
fn declared_uniforms(source: &str) -> Vec<String> {
    source
        .lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with("uniform"))
        .filter_map(|line| {
            line.split(';')
                .next()?
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .filter(|word| !word.is_empty())
                .last()
                .map(str::to_owned)
        })
        .collect()
}

impl GraphicsBackend for HeadlessBackend {
    type Shader = HeadlessId;
    type Program = HeadlessId;
    type Buffer = HeadlessId;
    type Texture = HeadlessId;
    type Renderbuffer = HeadlessId;
    type Framebuffer = HeadlessId;
    type VertexArray = HeadlessId;
    type UniformLocation = HeadlessUniform;

    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader> {
        match stage {
            ShaderStage::Unknown | ShaderStage::Compute => Err(VisualiserError::Backend(
                format!("no shader object for stage {stage:?}"),
            )),
            _ => Ok(self.allocate(Object::Shader {
                stage,
                source: String::new(),
                compiled: false,
            })),
        }
    }

    fn compile_shader(&mut self, shader: Self::Shader, text: &str) -> BuildOutcome {
        self.compile_calls += 1;
        let outcome = self
            .compile_script
            .pop_front()
            .unwrap_or_else(|| check_source(text));
        match self.objects.get_mut(&shader) {
            Some(Object::Shader {
                source, compiled, ..
            }) => {
                *source = text.to_owned();
                *compiled = outcome.success;
                outcome
            }
            _ => BuildOutcome::failure("error: invalid shader object\n"),
        }
    }

    fn delete_shader(&mut self, shader: Self::Shader) {
        self.objects.remove(&shader);
    }

    fn create_program(&mut self) -> Result<Self::Program> {
        Ok(self.allocate(Object::Program {
            attached: Vec::new(),
            linked: false,
            declared: Vec::new(),
            uniforms: HashMap::new(),
        }))
    }

    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader) {
        if let Some(Object::Program { attached, .. }) = self.objects.get_mut(&program) {
            if !attached.contains(&shader) {
                attached.push(shader);
            }
        }
    }

    fn detach_shader(&mut self, program: Self::Program, shader: Self::Shader) {
        if let Some(Object::Program { attached, .. }) = self.objects.get_mut(&program) {
            attached.retain(|id| *id != shader);
        }
    }

    fn link_program(&mut self, program: Self::Program) -> BuildOutcome {
        let attached = self.attached_shaders(program).to_vec();
        let outcome = match self.link_script.pop_front() {
            Some(outcome) => outcome,
            None => self.link_check(&attached),
        };
        let names: Vec<String> = attached
            .iter()
            .filter_map(|id| match self.objects.get(id) {
                Some(Object::Shader { source, .. }) => Some(declared_uniforms(source)),
                _ => None,
            })
            .flatten()
            .collect();
        match self.objects.get_mut(&program) {
            Some(Object::Program {
                linked, declared, ..
            }) => {
                *linked = outcome.success;
                *declared = if outcome.success { names } else { Vec::new() };
                outcome
            }
            _ => BuildOutcome::failure("error: invalid program object\n"),
        }
    }

    fn use_program(&mut self, program: Option<Self::Program>) {
        self.bound_program = program;
    }

    fn delete_program(&mut self, program: Self::Program) {
        self.objects.remove(&program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
    }

    fn uniform_location(
        &mut self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        // Linking fixes the uniform set; detaching stages afterwards keeps it.
        let declared = match self.objects.get(&program) {
            Some(Object::Program {
                declared,
                linked: true,
                ..
            }) => declared.iter().any(|declared| declared == name),
            _ => false,
        };
        declared.then(|| HeadlessUniform {
            program,
            name: name.to_owned(),
        })
    }

    fn set_uniform(&mut self, location: &Self::UniformLocation, value: Uniform) {
        // GL applies uniform uploads to the program in use.
        if self.bound_program != Some(location.program) {
            return;
        }
        if let Some(Object::Program { uniforms, .. }) = self.objects.get_mut(&location.program) {
            uniforms.insert(location.name.clone(), value);
        }
    }

    fn create_buffer(&mut self) -> Result<Self::Buffer> {
        Ok(self.allocate(Object::Buffer {
            data: Vec::new(),
            hint: None,
            allocations: 0,
            writes: Vec::new(),
        }))
    }

    fn bind_buffer(&mut self, kind: BufferKind, buffer: Option<Self::Buffer>) {
        match buffer {
            Some(buffer) => self.bound_buffers.insert(kind, buffer),
            None => self.bound_buffers.remove(&kind),
        };
    }

    fn allocate_buffer(
        &mut self,
        buffer: Self::Buffer,
        kind: BufferKind,
        size: u32,
        usage: BufferUsageHint,
    ) {
        self.bound_buffers.insert(kind, buffer);
        if let Some(Object::Buffer {
            data,
            hint,
            allocations,
            ..
        }) = self.objects.get_mut(&buffer)
        {
            *data = vec![0; size as usize];
            *hint = Some(usage);
            *allocations += 1;
        }
    }

    fn write_buffer(&mut self, buffer: Self::Buffer, kind: BufferKind, offset: u32, bytes: &[u8]) {
        self.bound_buffers.insert(kind, buffer);
        if let Some(Object::Buffer { data, writes, .. }) = self.objects.get_mut(&buffer) {
            let start = offset as usize;
            let end = start + bytes.len();
            // GL raises INVALID_VALUE and ignores writes past the store.
            if end <= data.len() {
                data[start..end].copy_from_slice(bytes);
                writes.push((offset, bytes.len()));
            }
        }
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        self.objects.remove(&buffer);
        self.bound_buffers.retain(|_, bound| *bound != buffer);
    }

    fn create_vertex_array(&mut self) -> Result<Self::VertexArray> {
        Ok(self.allocate(Object::VertexArray {
            attributes: Vec::new(),
        }))
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<Self::VertexArray>) {
        self.bound_vertex_array = vertex_array;
    }

    fn vertex_attribute(&mut self, index: u32, components: i32, stride: i32, offset: i32) {
        let Some(vertex_array) = self.bound_vertex_array else {
            return;
        };
        if let Some(Object::VertexArray { attributes }) = self.objects.get_mut(&vertex_array) {
            attributes.retain(|attribute| attribute.0 != index);
            attributes.push((index, components, stride, offset));
        }
    }

    fn delete_vertex_array(&mut self, vertex_array: Self::VertexArray) {
        self.objects.remove(&vertex_array);
        if self.bound_vertex_array == Some(vertex_array) {
            self.bound_vertex_array = None;
        }
    }

    fn create_texture(&mut self) -> Result<Self::Texture> {
        Ok(self.allocate(Object::Texture {
            size: Size2::default(),
            allocations: 0,
            contents: TextureContents::Undefined,
        }))
    }

    fn allocate_texture(&mut self, texture: Self::Texture, new_size: Size2) {
        if let Some(Object::Texture {
            size,
            allocations,
            contents,
        }) = self.objects.get_mut(&texture)
        {
            *size = new_size;
            *allocations += 1;
            *contents = TextureContents::Undefined;
        }
    }

    fn bind_sampler(&mut self, unit: u32, texture: Option<Self::Texture>) {
        match texture {
            Some(texture) => self.samplers.insert(unit, texture),
            None => self.samplers.remove(&unit),
        };
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        self.objects.remove(&texture);
        self.samplers.retain(|_, bound| *bound != texture);
    }

    fn create_renderbuffer(&mut self) -> Result<Self::Renderbuffer> {
        Ok(self.allocate(Object::Renderbuffer {
            size: Size2::default(),
            allocations: 0,
        }))
    }

    fn allocate_depth_stencil(&mut self, renderbuffer: Self::Renderbuffer, new_size: Size2) {
        if let Some(Object::Renderbuffer { size, allocations }) =
            self.objects.get_mut(&renderbuffer)
        {
            *size = new_size;
            *allocations += 1;
        }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: Self::Renderbuffer) {
        self.objects.remove(&renderbuffer);
    }

    fn create_framebuffer(&mut self) -> Result<Self::Framebuffer> {
        Ok(self.allocate(Object::Framebuffer {
            color: None,
            depth_stencil: None,
        }))
    }

    fn attach_color(&mut self, framebuffer: Self::Framebuffer, texture: Self::Texture) {
        if let Some(Object::Framebuffer { color, .. }) = self.objects.get_mut(&framebuffer) {
            *color = Some(texture);
        }
    }

    fn attach_depth_stencil(
        &mut self,
        framebuffer: Self::Framebuffer,
        renderbuffer: Self::Renderbuffer,
    ) {
        if let Some(Object::Framebuffer { depth_stencil, .. }) = self.objects.get_mut(&framebuffer)
        {
            *depth_stencil = Some(renderbuffer);
        }
    }

    fn framebuffer_status(&mut self, framebuffer: Self::Framebuffer) -> u32 {
        if self.incomplete_framebuffers {
            return glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT;
        }
        let (color, depth_stencil) = match self.objects.get(&framebuffer) {
            Some(Object::Framebuffer {
                color: Some(color),
                depth_stencil: Some(depth_stencil),
            }) => (*color, *depth_stencil),
            _ => return glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT,
        };
        let color_size = self.texture_size(color);
        let depth_size = match self.objects.get(&depth_stencil) {
            Some(Object::Renderbuffer { size, .. }) => Some(*size),
            _ => None,
        };
        match (color_size, depth_size) {
            (Some(color), Some(depth)) if !color.is_empty() && color == depth => {
                FRAMEBUFFER_COMPLETE
            }
            _ => glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT,
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<Self::Framebuffer>) {
        self.bound_framebuffer = framebuffer;
    }

    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer) {
        self.objects.remove(&framebuffer);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn viewport(&mut self, size: Size2) {
        self.viewport = size;
    }

    fn clear(&mut self, _color: [f32; 4]) {
        self.clears.push(self.bound_framebuffer);
        if let Some(texture) = self.bound_framebuffer.and_then(|fb| self.framebuffer_color(fb)) {
            self.set_contents(texture, TextureContents::Cleared);
        }
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: i32, count: i32) {
        let index = self.draws.len();
        let target = self
            .bound_framebuffer
            .and_then(|fb| self.framebuffer_color(fb));
        let sampled = self
            .samplers
            .iter()
            .map(|(unit, texture)| {
                let contents = self
                    .texture_contents(*texture)
                    .unwrap_or(TextureContents::Undefined);
                (*unit, contents)
            })
            .collect();
        if let Some(target) = target {
            if self.samplers.values().any(|bound| *bound == target) {
                self.feedback_hazards += 1;
            }
        }
        self.draws.push(DrawCall {
            program: self.bound_program,
            framebuffer: self.bound_framebuffer,
            viewport: self.viewport,
            primitive,
            first,
            count,
            sampled,
        });
        if let Some(target) = target {
            self.set_contents(target, TextureContents::Drawn(index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checker_reports_line_and_column() {
        let outcome = check_source("void main() {\n    float x = 1.0@;\n}\n");
        assert!(!outcome.success);
        assert_eq!(
            outcome.log.trim(),
            "0(2, 18) : error C0000: syntax error, unexpected '@'"
        );
    }

    #[test]
    fn checker_ignores_comments_and_accepts_balanced_source() {
        let outcome = check_source("// costs $5\nvoid main() { }\n");
        assert!(outcome.success);
        assert!(outcome.log.is_empty());
    }

    #[test]
    fn unclosed_brace_is_reported_on_last_line() {
        let outcome = check_source("void main() {\n\n");
        assert!(outcome.log.starts_with("0(2) :"));
    }

    #[test]
    fn draw_into_sampled_texture_is_a_hazard() {
        let mut gpu = HeadlessBackend::new();
        let fb = gpu.create_framebuffer().unwrap();
        let tex = gpu.create_texture().unwrap();
        gpu.attach_color(fb, tex);
        gpu.bind_framebuffer(Some(fb));
        gpu.bind_sampler(0, Some(tex));
        gpu.draw_arrays(Primitive::Triangles, 0, 3);

        assert_eq!(gpu.feedback_hazards(), 1);
        assert_eq!(gpu.texture_contents(tex), Some(TextureContents::Drawn(0)));
    }

    #[test]
    fn uniforms_only_apply_to_the_program_in_use() {
        let mut gpu = HeadlessBackend::new();
        let shader = gpu.create_shader(ShaderStage::Pixel).unwrap();
        assert!(
            gpu.compile_shader(shader, "uniform float iTime;\nvoid main() {}\n")
                .success
        );
        let program = gpu.create_program().unwrap();
        gpu.attach_shader(program, shader);
        assert!(gpu.link_program(program).success);

        let location = gpu.uniform_location(program, "iTime").unwrap();
        assert!(gpu.uniform_location(program, "iTim").is_none());

        gpu.set_uniform(&location, Uniform::Float(1.0));
        assert_eq!(gpu.uniform(program, "iTime"), None);

        gpu.use_program(Some(program));
        gpu.set_uniform(&location, Uniform::Float(2.0));
        assert_eq!(gpu.uniform(program, "iTime"), Some(Uniform::Float(2.0)));
    }

    #[test]
    fn uniforms_outlive_the_released_stages() {
        let mut gpu = HeadlessBackend::new();
        let shader = gpu.create_shader(ShaderStage::Pixel).unwrap();
        let source = "uniform vec4 iSpectrum;\nuniform sampler2D iChannel0; // feedback\nvoid main() {}\n";
        assert!(gpu.compile_shader(shader, source).success);
        let program = gpu.create_program().unwrap();
        gpu.attach_shader(program, shader);
        assert!(gpu.link_program(program).success);

        gpu.detach_shader(program, shader);
        gpu.delete_shader(shader);

        assert!(gpu.uniform_location(program, "iSpectrum").is_some());
        assert!(gpu.uniform_location(program, "iChannel0").is_some());
        assert!(gpu.uniform_location(program, "vec4").is_none());
        assert!(gpu.uniform_location(program, "sampler2D").is_none());
    }
}
