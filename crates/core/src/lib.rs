//! Core library for the feedback visualiser.
//!
//! The crate renders an audio-reactive feedback effect: a fragment shader
//! samples its own previous frame through a pair of ping-pong framebuffers,
//! driven by a four-band spectrum of the incoming audio. Shader compilation
//! keeps diagnostics attributable to the source fragment that produced them.
//!
//! All GPU work goes through [`GraphicsBackend`], implemented by
//! [`GlowBackend`] for a live GL context and by [`HeadlessBackend`] for dry
//! runs and tests.

pub mod buffer;
pub mod config;
pub mod error;
pub mod framebuffer;
pub mod gpu;
pub mod render;
pub mod shader;
pub mod spectrum;

pub use buffer::DynamicBuffer;
pub use config::{AppConfig, AudioConfig, RenderConfig};
pub use error::{Result, VisualiserError};
pub use framebuffer::{FrameOutput, FrameTarget, Framebuffer, FramebufferPair, PRIMING_FRAMES};
pub use gpu::{
    BufferKind, BufferUsageHint, BuildOutcome, DrawCall, GlowBackend, GraphicsBackend,
    HeadlessBackend, HeadlessId, Primitive, Size2, TextureContents, Uniform,
    FRAMEBUFFER_COMPLETE,
};
pub use render::{FeedbackRenderer, FrameInput};
pub use shader::{
    compile, delete_program, delete_shader, link, load_program, parse_diagnostic_line,
    parse_diagnostics, CompileMessage, CompileResult, CompileState, CompiledShader,
    FragmentLineMap, LinkedProgram, ParsedDiagnostic, Severity, ShaderFragment, ShaderPackage,
    ShaderStage,
};
pub use spectrum::{Spectrum, SpectrumAnalyser, SpectrumSource, BAND_COUNT};
