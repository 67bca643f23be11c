use std::path::{Path, PathBuf};

use tracing::debug;

use super::{
    compile, delete_shader, diagnostics::parse_diagnostics, CompileMessage, CompileResult,
    CompiledShader, LinkedProgram, ShaderPackage, ShaderStage,
};
use crate::GraphicsBackend;

/// Picks the source a link message most likely refers to. Link logs carry no
/// file information, so anything mentioning the vertex stage goes to the
/// vertex source and everything else to the fragment source.
fn attribute_message(raw_text: &str, vertex: &Path, fragment: &Path) -> PathBuf {
    if raw_text.to_ascii_lowercase().contains("vertex") {
        vertex.to_path_buf()
    } else {
        fragment.to_path_buf()
    }
}

/// Links compiled stages into a program.
///
/// An invalid input stage is handed back as the result, checked in the order
/// vertex, fragment, geometry. On success the stage objects stay alive and
/// remain owned by the caller.
pub fn link<B: GraphicsBackend>(
    backend: &mut B,
    vertex: &CompiledShader<B>,
    geometry: Option<&CompiledShader<B>>,
    fragment: &CompiledShader<B>,
) -> LinkedProgram<B> {
    let Some(vertex_shader) = vertex.handle() else {
        return vertex.clone().into_invalid();
    };
    let Some(fragment_shader) = fragment.handle() else {
        return fragment.clone().into_invalid();
    };
    let geometry_shader = match geometry {
        Some(geometry) => match geometry.handle() {
            Some(handle) => Some(handle),
            None => return geometry.clone().into_invalid(),
        },
        None => None,
    };

    let path = vertex.path();
    let program = match backend.create_program() {
        Ok(program) => program,
        Err(err) => {
            return CompileResult::invalid(path, vec![CompileMessage::error(path, err.to_string())])
        }
    };

    let stages: Vec<_> = [Some(vertex_shader), Some(fragment_shader), geometry_shader]
        .into_iter()
        .flatten()
        .collect();
    for shader in &stages {
        backend.attach_shader(program, *shader);
    }

    let outcome = backend.link_program(program);
    let mut messages = parse_diagnostics(path, &outcome.log);
    for message in &mut messages {
        message.path = attribute_message(&message.raw_text, vertex.path(), fragment.path());
        debug!(path = %message.path.display(), "{}", message.text);
    }

    if outcome.success {
        debug!(path = %path.display(), "program linked");
        CompileResult::valid(path, messages, program)
    } else {
        for shader in &stages {
            backend.detach_shader(program, *shader);
        }
        backend.delete_program(program);
        debug!(path = %path.display(), errors = messages.len(), "program failed to link");
        CompileResult::invalid(path, messages)
    }
}

/// Compiles a vertex and fragment shader from disk and links them. The stage
/// objects are released before returning, whatever the outcome.
pub fn load_program<B: GraphicsBackend>(
    backend: &mut B,
    vertex_path: &Path,
    fragment_path: &Path,
) -> LinkedProgram<B> {
    let vertex = compile(backend, ShaderStage::Vertex, &ShaderPackage::new(vertex_path));
    let fragment = compile(backend, ShaderStage::Pixel, &ShaderPackage::new(fragment_path));

    let program = link(backend, &vertex, None, &fragment);
    if let Some(handle) = program.handle() {
        for stage in [&vertex, &fragment] {
            if let Some(shader) = stage.handle() {
                backend.detach_shader(handle, shader);
            }
        }
    }

    delete_shader(backend, vertex);
    delete_shader(backend, fragment);
    program
}

/// Releases the backend object of a valid link result.
pub fn delete_program<B: GraphicsBackend>(backend: &mut B, program: LinkedProgram<B>) {
    if let Some(handle) = program.handle() {
        backend.delete_program(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuildOutcome, CompileState, HeadlessBackend, ShaderFragment};

    const VERTEX: &str = "#version 330\nin vec3 positionsIn;\nvoid main() {\n    gl_Position = vec4(positionsIn, 1.0);\n}\n";
    const FRAGMENT: &str = "#version 330\nout vec4 fragColor;\nvoid main() {\n    fragColor = vec4(1.0);\n}\n";

    fn stage(gpu: &mut HeadlessBackend, stage: ShaderStage, path: &str, source: &str) -> CompiledShader<HeadlessBackend> {
        compile(gpu, stage, &ShaderPackage::from_source(path, "main", source))
    }

    #[test]
    fn links_valid_stages() {
        let mut gpu = HeadlessBackend::new();
        let vs = stage(&mut gpu, ShaderStage::Vertex, "fx.vert", VERTEX);
        let fs = stage(&mut gpu, ShaderStage::Pixel, "fx.frag", FRAGMENT);

        let program = link(&mut gpu, &vs, None, &fs);
        assert_eq!(program.state(), CompileState::Valid);
        let handle = program.handle().unwrap();
        assert_eq!(gpu.attached_shaders(handle), [vs.handle().unwrap(), fs.handle().unwrap()]);
        assert!(gpu.is_live(vs.handle().unwrap()));
    }

    #[test]
    fn invalid_vertex_is_returned_unchanged() {
        let mut gpu = HeadlessBackend::new();
        let vs = stage(&mut gpu, ShaderStage::Vertex, "fx.vert", "void main() { @ }\n");
        let fs = stage(&mut gpu, ShaderStage::Pixel, "fx.frag", "void main() { $ }\n");
        assert!(!fs.is_valid());

        let program = link(&mut gpu, &vs, None, &fs);
        assert_eq!(program.state(), CompileState::Invalid);
        assert_eq!(program.path(), vs.path());
        assert_eq!(program.messages(), vs.messages());
    }

    #[test]
    fn invalid_fragment_is_returned_when_vertex_is_valid() {
        let mut gpu = HeadlessBackend::new();
        let vs = stage(&mut gpu, ShaderStage::Vertex, "fx.vert", VERTEX);
        let fs = stage(&mut gpu, ShaderStage::Pixel, "fx.frag", "void main() { $ }\n");

        let program = link(&mut gpu, &vs, None, &fs);
        assert_eq!(program.path(), fs.path());
        assert_eq!(program.messages(), fs.messages());
        assert!(program.handle().is_none());
    }

    #[test]
    fn invalid_geometry_is_checked_last() {
        let mut gpu = HeadlessBackend::new();
        let vs = stage(&mut gpu, ShaderStage::Vertex, "fx.vert", VERTEX);
        let gs = stage(&mut gpu, ShaderStage::Geometry, "fx.geom", "}\n");
        let fs = stage(&mut gpu, ShaderStage::Pixel, "fx.frag", FRAGMENT);

        let program = link(&mut gpu, &vs, Some(&gs), &fs);
        assert_eq!(program.path(), gs.path());
        assert!(!program.is_valid());
    }

    #[test]
    fn link_failure_attributes_messages_and_releases_the_program() {
        let mut gpu = HeadlessBackend::new();
        let vs = stage(&mut gpu, ShaderStage::Vertex, "fx.vert", "void entry() {}\n");
        let fs = stage(&mut gpu, ShaderStage::Pixel, "fx.frag", "void entry() {}\n");
        let live_before = gpu.live_objects();

        let program = link(&mut gpu, &vs, None, &fs);
        assert_eq!(program.state(), CompileState::Invalid);
        assert_eq!(gpu.live_objects(), live_before);

        let paths: Vec<_> = program.messages().iter().map(|m| m.path.clone()).collect();
        assert_eq!(paths, [PathBuf::from("fx.vert"), PathBuf::from("fx.frag")]);
        assert!(program.link_error().to_string().contains("lacks `main'"));
    }

    #[test]
    fn attribution_is_a_case_insensitive_substring_match() {
        let mut gpu = HeadlessBackend::new();
        let vs = stage(&mut gpu, ShaderStage::Vertex, "fx.vert", VERTEX);
        let fs = stage(&mut gpu, ShaderStage::Pixel, "fx.frag", FRAGMENT);
        gpu.script_link(BuildOutcome::failure(
            "error: VERTEX output 'uv' not read by fragment\nerror: too many uniforms\n",
        ));

        let program = link(&mut gpu, &vs, None, &fs);
        assert_eq!(program.messages()[0].path, PathBuf::from("fx.vert"));
        assert_eq!(program.messages()[1].path, PathBuf::from("fx.frag"));
    }

    #[test]
    fn load_program_releases_stage_objects() {
        let dir = std::env::temp_dir().join(format!("fv-link-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let vertex_path = dir.join("fx.vert");
        let fragment_path = dir.join("fx.frag");
        std::fs::write(&vertex_path, VERTEX).unwrap();
        std::fs::write(&fragment_path, FRAGMENT).unwrap();

        let mut gpu = HeadlessBackend::new();
        let program = load_program(&mut gpu, &vertex_path, &fragment_path);
        assert!(program.is_valid());
        assert!(gpu.attached_shaders(program.handle().unwrap()).is_empty());
        assert_eq!(gpu.live_objects(), 1);

        delete_program(&mut gpu, program);
        assert_eq!(gpu.live_objects(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn multi_fragment_stage_links() {
        let mut gpu = HeadlessBackend::new();
        let package = ShaderPackage::new("fx.frag")
            .with_fragment(ShaderFragment::new("header", "#version 330\n"))
            .with_fragment(ShaderFragment::new("main", "void main() {}\n"));
        let vs = stage(&mut gpu, ShaderStage::Vertex, "fx.vert", VERTEX);
        let fs = compile(&mut gpu, ShaderStage::Pixel, &package);

        assert!(link(&mut gpu, &vs, None, &fs).is_valid());
    }
}
