//! Shader compilation and linking.
//!
//! A [`ShaderPackage`] is an ordered list of source fragments that are
//! concatenated into one compile unit. Backend diagnostics reported against
//! the concatenated text are mapped back to the fragment they came from, so a
//! message always points at a line the author actually wrote.

mod compiler;
mod diagnostics;
mod linker;

use std::{
    borrow::Cow,
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{GraphicsBackend, Result, VisualiserError};

pub use compiler::{compile, delete_shader};
pub use diagnostics::{parse_diagnostic_line, parse_diagnostics, FragmentLineMap, ParsedDiagnostic};
pub use linker::{delete_program, link, load_program};

/// Pipeline stage a compile unit targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    /// The stage could not be resolved; compiling it always fails.
    #[default]
    Unknown,
    Pixel,
    Vertex,
    Geometry,
    /// Recognised but not supported by the compiler.
    Compute,
}

impl ShaderStage {
    /// Infers the stage from a conventional file extension.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("vert" | "vs") => Self::Vertex,
            Some("geom" | "gs") => Self::Geometry,
            Some("frag" | "fs" | "ps") => Self::Pixel,
            Some("comp" | "cs") => Self::Compute,
            _ => Self::Unknown,
        }
    }

    /// Like [`ShaderStage::from_path`], but an unrecognised extension is an
    /// error.
    pub fn try_from_path(path: &Path) -> Result<Self> {
        match Self::from_path(path) {
            Self::Unknown => Err(VisualiserError::UnknownStageKind(path.to_path_buf())),
            stage => Ok(stage),
        }
    }

    /// Lower-case name as drivers spell it in their logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pixel => "fragment",
            Self::Vertex => "vertex",
            Self::Geometry => "geometry",
            Self::Compute => "compute",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Named chunk of shader source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderFragment {
    name: String,
    source: String,
}

impl ShaderFragment {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of newline characters, which is what shifts the line numbers
    /// of every later fragment in the compile unit.
    pub fn newline_count(&self) -> u32 {
        self.source.bytes().filter(|b| *b == b'\n').count() as u32
    }
}

/// One compile unit: fragments in submission order plus the path that
/// diagnostics are reported against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPackage {
    fragments: Vec<ShaderFragment>,
    main_fragment: usize,
    path: PathBuf,
}

impl ShaderPackage {
    /// A package with no fragments; compiling it reads `path` from disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            fragments: Vec::new(),
            main_fragment: 0,
            path: path.into(),
        }
    }

    /// A package holding a single in-memory fragment.
    pub fn from_source(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::new(path).with_fragment(ShaderFragment::new(name, source))
    }

    /// Reads every file into its own fragment, in order. The last file is
    /// treated as the main fragment.
    pub fn from_files(path: impl Into<PathBuf>, files: &[PathBuf]) -> Result<Self> {
        let mut package = Self::new(path);
        for file in files {
            let source = std::fs::read_to_string(file)
                .map_err(|_| VisualiserError::FileNotFound(file.clone()))?;
            let name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            package.push(ShaderFragment::new(name, source));
        }
        package.main_fragment = package.fragments.len().saturating_sub(1);
        Ok(package)
    }

    pub fn with_fragment(mut self, fragment: ShaderFragment) -> Self {
        self.push(fragment);
        self
    }

    pub fn push(&mut self, fragment: ShaderFragment) {
        self.fragments.push(fragment);
    }

    /// Marks which fragment holds the entry point. Out of range indices are
    /// clamped to the last fragment.
    pub fn set_main_fragment(&mut self, index: usize) {
        self.main_fragment = index.min(self.fragments.len().saturating_sub(1));
    }

    pub fn main_fragment(&self) -> usize {
        self.main_fragment
    }

    pub fn fragments(&self) -> &[ShaderFragment] {
        &self.fragments
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The exact text submitted to the backend.
    pub fn source(&self) -> Cow<'_, str> {
        match self.fragments.as_slice() {
            [single] => Cow::Borrowed(single.source()),
            fragments => Cow::Owned(fragments.iter().map(ShaderFragment::source).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
    Info,
}

/// A single compiler or linker diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileMessage {
    /// The log line exactly as the backend produced it.
    pub raw_text: String,
    pub text: String,
    pub path: PathBuf,
    /// 0-based line, local to `fragment_index` once remapped.
    pub line: u32,
    pub fragment_index: usize,
    /// 0-based, end-exclusive column range when the backend reported one.
    pub columns: Option<(u32, u32)>,
    pub severity: Severity,
}

impl CompileMessage {
    /// An error not tied to any source line.
    pub fn error(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw_text: text.clone(),
            text,
            path: path.into(),
            line: 0,
            fragment_index: 0,
            columns: None,
            severity: Severity::Error,
        }
    }
}

impl fmt::Display for CompileMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}[{}]: {:?}: {}",
            self.path.display(),
            self.line + 1,
            self.fragment_index,
            self.severity,
            self.text
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    Invalid,
    Valid,
}

/// Outcome of a compile or link call.
///
/// The state is derived from the handle, so an invalid result can never
/// carry a usable backend object.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult<H> {
    path: PathBuf,
    messages: Vec<CompileMessage>,
    handle: Option<H>,
}

/// A compiled shader stage for backend `B`.
pub type CompiledShader<B> = CompileResult<<B as GraphicsBackend>::Shader>;
/// A linked program for backend `B`.
pub type LinkedProgram<B> = CompileResult<<B as GraphicsBackend>::Program>;

impl<H: Copy> CompileResult<H> {
    pub fn valid(path: impl Into<PathBuf>, messages: Vec<CompileMessage>, handle: H) -> Self {
        Self {
            path: path.into(),
            messages,
            handle: Some(handle),
        }
    }

    pub fn invalid(path: impl Into<PathBuf>, messages: Vec<CompileMessage>) -> Self {
        Self {
            path: path.into(),
            messages,
            handle: None,
        }
    }

    pub fn state(&self) -> CompileState {
        if self.handle.is_some() {
            CompileState::Valid
        } else {
            CompileState::Invalid
        }
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<H> {
        self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn messages(&self) -> &[CompileMessage] {
        &self.messages
    }

    pub fn errors(&self) -> impl Iterator<Item = &CompileMessage> {
        self.messages
            .iter()
            .filter(|message| message.severity == Severity::Error)
    }

    /// Re-types an invalid result so it can be handed back from a call that
    /// produces a different kind of handle.
    pub(crate) fn into_invalid<G: Copy>(self) -> CompileResult<G> {
        debug_assert!(self.handle.is_none(), "only invalid results are passed through");
        CompileResult {
            path: self.path,
            messages: self.messages,
            handle: None,
        }
    }

    pub fn compile_error(&self) -> VisualiserError {
        VisualiserError::CompileFailure {
            path: self.path.clone(),
            message: self.first_error_text(),
        }
    }

    pub fn link_error(&self) -> VisualiserError {
        VisualiserError::LinkFailure {
            path: self.path.clone(),
            message: self.first_error_text(),
        }
    }

    fn first_error_text(&self) -> String {
        self.errors()
            .next()
            .or_else(|| self.messages.first())
            .map(|message| message.text.clone())
            .unwrap_or_else(|| "no diagnostics reported".to_owned())
    }
}
