use std::borrow::Cow;

use tracing::debug;

use super::{
    diagnostics::{parse_diagnostics, FragmentLineMap},
    CompileMessage, CompileResult, CompiledShader, ShaderFragment, ShaderPackage, ShaderStage,
};
use crate::GraphicsBackend;

/// Compiles one stage from the fragments of `package`.
///
/// Every message in the result is attributed to the package path and carries
/// a line local to the fragment it came from. An empty package is read from
/// its path instead. Failure is reported through the result state; the
/// backend object is released before an invalid result is returned.
pub fn compile<B: GraphicsBackend>(
    backend: &mut B,
    stage: ShaderStage,
    package: &ShaderPackage,
) -> CompiledShader<B> {
    let path = package.path();
    match stage {
        ShaderStage::Unknown => {
            return CompileResult::invalid(
                path,
                vec![CompileMessage::error(
                    path,
                    "Shader type could not be determined. Missing stage extension?",
                )],
            )
        }
        ShaderStage::Compute => {
            return CompileResult::invalid(
                path,
                vec![CompileMessage::error(path, "Shader type not supported yet")],
            )
        }
        _ => {}
    }

    let fragments: Cow<'_, [ShaderFragment]> = if package.fragments().is_empty() {
        match std::fs::read_to_string(path) {
            Ok(source) => {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Cow::Owned(vec![ShaderFragment::new(name, source)])
            }
            Err(err) => {
                debug!(path = %path.display(), %err, "shader source unreadable");
                return CompileResult::invalid(
                    path,
                    vec![CompileMessage::error(path, "Couldn't open file")],
                );
            }
        }
    } else {
        Cow::Borrowed(package.fragments())
    };

    let source: String = fragments.iter().map(ShaderFragment::source).collect();
    let line_map = FragmentLineMap::new(&fragments);

    let shader = match backend.create_shader(stage) {
        Ok(shader) => shader,
        Err(err) => {
            return CompileResult::invalid(path, vec![CompileMessage::error(path, err.to_string())])
        }
    };

    let outcome = backend.compile_shader(shader, &source);
    let mut messages = parse_diagnostics(path, &outcome.log);
    for message in &mut messages {
        line_map.remap(message);
        debug!(
            fragment = fragments[message.fragment_index.min(fragments.len() - 1)].name(),
            line = message.line,
            "{}",
            message.text
        );
    }

    if outcome.success {
        debug!(path = %path.display(), %stage, "shader compiled");
        CompileResult::valid(path, messages, shader)
    } else {
        backend.delete_shader(shader);
        debug!(path = %path.display(), %stage, errors = messages.len(), "shader failed to compile");
        CompileResult::invalid(path, messages)
    }
}

/// Releases the backend object of a valid compile result.
pub fn delete_shader<B: GraphicsBackend>(backend: &mut B, shader: CompiledShader<B>) {
    if let Some(handle) = shader.handle() {
        backend.delete_shader(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuildOutcome, CompileState, HeadlessBackend, Severity};

    const HEADER: &str = "#version 330\nuniform float iTime;\n";
    const BODY: &str = "out vec4 fragColor;\nvoid main() {\n    fragColor = vec4(iTime);\n}\n";

    fn package(body: &str) -> ShaderPackage {
        ShaderPackage::new("effect.frag")
            .with_fragment(ShaderFragment::new("header", HEADER))
            .with_fragment(ShaderFragment::new("body", body))
    }

    #[test]
    fn valid_source_compiles_to_a_live_handle() {
        let mut gpu = HeadlessBackend::new();
        let result = compile(&mut gpu, ShaderStage::Pixel, &package(BODY));

        assert_eq!(result.state(), CompileState::Valid);
        assert!(result.messages().is_empty());
        assert!(gpu.is_live(result.handle().unwrap()));
    }

    #[test]
    fn syntax_error_in_single_fragment_is_invalid() {
        let mut gpu = HeadlessBackend::new();
        let package = ShaderPackage::from_source(
            "broken.frag",
            "main",
            "void main() {\n    vec4 c = vec4(1.0)@;\n}\n",
        );
        let result = compile(&mut gpu, ShaderStage::Pixel, &package);

        assert_eq!(result.state(), CompileState::Invalid);
        assert!(result.handle().is_none());
        assert!(!result.messages().is_empty());
        assert!(result.messages().iter().all(|m| m.fragment_index == 0));
        assert_eq!(result.messages()[0].line, 1);
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn errors_are_reported_against_the_owning_fragment() {
        let mut gpu = HeadlessBackend::new();
        let body = "out vec4 fragColor;\nvoid main() {\n    fragColor = $;\n}\n";
        let result = compile(&mut gpu, ShaderStage::Pixel, &package(body));

        let message = &result.messages()[0];
        assert_eq!(message.fragment_index, 1);
        assert_eq!(message.line, 2);
        assert_eq!(message.columns, Some((16, 17)));
        assert_eq!(message.path, std::path::PathBuf::from("effect.frag"));
        assert_eq!(message.severity, Severity::Error);
    }

    #[test]
    fn unknown_stage_never_reaches_the_backend() {
        let mut gpu = HeadlessBackend::new();
        let result = compile(&mut gpu, ShaderStage::Unknown, &package(BODY));

        assert_eq!(result.state(), CompileState::Invalid);
        assert_eq!(result.messages().len(), 1);
        assert_eq!(gpu.compile_calls(), 0);
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn unreadable_source_file_is_reported() {
        let mut gpu = HeadlessBackend::new();
        let package = ShaderPackage::new("/no/such/dir/effect.frag");
        let result = compile(&mut gpu, ShaderStage::Pixel, &package);

        assert_eq!(result.state(), CompileState::Invalid);
        assert_eq!(result.messages()[0].text, "Couldn't open file");
        assert_eq!(gpu.compile_calls(), 0);
    }

    #[test]
    fn warnings_survive_a_successful_compile() {
        let mut gpu = HeadlessBackend::new();
        gpu.script_compile(BuildOutcome::success(
            "0(4) : warning C7050: \"fragColor\" might be used before being initialized\n",
        ));
        let result = compile(&mut gpu, ShaderStage::Pixel, &package(BODY));

        assert!(result.is_valid());
        let warning = &result.messages()[0];
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!((warning.fragment_index, warning.line), (1, 1));
    }

    #[test]
    fn delete_only_releases_valid_results() {
        let mut gpu = HeadlessBackend::new();
        let good = compile(&mut gpu, ShaderStage::Pixel, &package(BODY));
        let bad = compile(&mut gpu, ShaderStage::Unknown, &package(BODY));
        assert_eq!(gpu.live_objects(), 1);

        delete_shader(&mut gpu, bad);
        assert_eq!(gpu.live_objects(), 1);
        delete_shader(&mut gpu, good);
        assert_eq!(gpu.live_objects(), 0);
    }
}
