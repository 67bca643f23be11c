//! Off-screen render targets and the ping-pong pair that drives the
//! feedback loop.
//!
//! Sampling the texture a draw is writing to is undefined, so the pair keeps
//! two targets and alternates them: each frame renders into one while the
//! other, holding the previous frame, is bound for sampling.

use tracing::{error, info, warn};

use crate::{GraphicsBackend, Result, Size2, VisualiserError, FRAMEBUFFER_COMPLETE};

/// A framebuffer with a colour texture and a combined depth/stencil
/// attachment.
#[derive(Debug)]
pub struct Framebuffer<B: GraphicsBackend> {
    framebuffer: B::Framebuffer,
    texture: B::Texture,
    depth_stencil: B::Renderbuffer,
    size: Size2,
    complete: bool,
}

impl<B: GraphicsBackend> Framebuffer<B> {
    /// Creates the backend objects. No storage is allocated until the first
    /// [`Framebuffer::resize`], so a new framebuffer is not yet usable.
    pub fn create(backend: &mut B) -> Result<Self> {
        let framebuffer = backend.create_framebuffer()?;
        let texture = backend.create_texture()?;
        let depth_stencil = backend.create_renderbuffer()?;
        Ok(Self {
            framebuffer,
            texture,
            depth_stencil,
            size: Size2::default(),
            complete: false,
        })
    }

    pub fn framebuffer(&self) -> B::Framebuffer {
        self.framebuffer
    }

    pub fn texture(&self) -> B::Texture {
        self.texture
    }

    pub fn depth_stencil(&self) -> B::Renderbuffer {
        self.depth_stencil
    }

    pub fn size(&self) -> Size2 {
        self.size
    }

    /// Whether the last resize produced a complete framebuffer.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Reallocates both attachments at `size`. Returns `false` without
    /// touching the backend when the size is unchanged.
    ///
    /// An incomplete result is logged and leaves the framebuffer unusable
    /// until a later resize succeeds.
    pub fn resize(&mut self, backend: &mut B, size: Size2) -> bool {
        if self.size == size {
            return false;
        }
        self.size = size;

        backend.allocate_texture(self.texture, size);
        backend.allocate_depth_stencil(self.depth_stencil, size);
        backend.attach_color(self.framebuffer, self.texture);
        backend.attach_depth_stencil(self.framebuffer, self.depth_stencil);

        let status = backend.framebuffer_status(self.framebuffer);
        self.complete = status == FRAMEBUFFER_COMPLETE;
        if !self.complete {
            error!(
                error = %VisualiserError::FramebufferIncomplete(status),
                %size,
                "framebuffer unusable until the next resize"
            );
        }
        true
    }

    /// Binds for drawing with a viewport covering the whole target.
    pub fn bind(&self, backend: &mut B) {
        backend.bind_framebuffer(Some(self.framebuffer));
        backend.viewport(self.size);
    }

    /// Restores the default framebuffer and the display viewport.
    pub fn unbind(&self, backend: &mut B, display: Size2) {
        backend.bind_framebuffer(None);
        backend.viewport(display);
    }

    pub fn bind_texture(&self, backend: &mut B, unit: u32) {
        backend.bind_sampler(unit, Some(self.texture));
    }

    pub fn unbind_texture(&self, backend: &mut B, unit: u32) {
        backend.bind_sampler(unit, None);
    }

    pub fn destroy(self, backend: &mut B) {
        backend.delete_framebuffer(self.framebuffer);
        backend.delete_renderbuffer(self.depth_stencil);
        backend.delete_texture(self.texture);
    }
}

/// Per-frame placement supplied by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTarget {
    /// Size of the area the effect is drawn into.
    pub viewport: Size2,
    /// Size of the window, restored once the frame is produced.
    pub display: Size2,
    /// Texture unit the previous frame is sampled from.
    pub texture_unit: u32,
    /// Colour used while priming the pair.
    pub clear_color: [f32; 4],
}

/// The texture a completed frame was rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutput<T> {
    pub texture: T,
    pub size: Size2,
}

/// Number of frames after creation whose write target is cleared first, so
/// each of the two targets is primed once.
pub const PRIMING_FRAMES: u32 = 2;

/// Two framebuffers alternating between write target and read source.
#[derive(Debug)]
pub struct FramebufferPair<B: GraphicsBackend> {
    targets: Option<[Framebuffer<B>; 2]>,
    write_index: usize,
    primed_frames: u32,
}

impl<B: GraphicsBackend> Default for FramebufferPair<B> {
    fn default() -> Self {
        Self {
            targets: None,
            write_index: 0,
            primed_frames: 0,
        }
    }
}

impl<B: GraphicsBackend> FramebufferPair<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_created(&self) -> bool {
        self.targets.is_some()
    }

    /// Creates both framebuffers the first time it is called.
    pub fn create(&mut self, backend: &mut B) -> Result<()> {
        if self.targets.is_some() {
            return Ok(());
        }
        let first = Framebuffer::create(backend)?;
        let second = match Framebuffer::create(backend) {
            Ok(second) => second,
            Err(err) => {
                first.destroy(backend);
                return Err(err);
            }
        };
        self.targets = Some([first, second]);
        self.write_index = 0;
        self.primed_frames = 0;
        info!("feedback framebuffers created");
        Ok(())
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    pub fn write_target(&self) -> Option<&Framebuffer<B>> {
        self.targets.as_ref().map(|targets| &targets[self.write_index])
    }

    pub fn read_target(&self) -> Option<&Framebuffer<B>> {
        self.targets
            .as_ref()
            .map(|targets| &targets[1 - self.write_index])
    }

    /// Frames that cleared their write target since creation.
    pub fn primed_frames(&self) -> u32 {
        self.primed_frames
    }

    /// Renders one frame of the feedback loop.
    ///
    /// The write target is resized to the viewport and bound, the read
    /// target's texture is bound for sampling, and `draw` issues the draw
    /// calls. Roles swap only after `draw` succeeds. Returns `None` when the
    /// write target is unusable, in which case nothing is drawn.
    pub fn render_frame<F>(
        &mut self,
        backend: &mut B,
        target: &FrameTarget,
        draw: F,
    ) -> Result<Option<FrameOutput<B::Texture>>>
    where
        F: FnOnce(&mut B) -> Result<()>,
    {
        self.create(backend)?;
        let Self {
            targets,
            write_index,
            primed_frames,
        } = self;
        let Some([first, second]) = targets.as_mut() else {
            return Ok(None);
        };
        let (write, read) = if *write_index == 0 {
            (first, second)
        } else {
            (second, first)
        };

        write.resize(backend, target.viewport);
        if !write.is_complete() {
            warn!(viewport = %target.viewport, "skipping frame, write target is incomplete");
            return Ok(None);
        }

        write.bind(backend);
        read.bind_texture(backend, target.texture_unit);
        let priming = *primed_frames < PRIMING_FRAMES;
        if priming {
            backend.clear(target.clear_color);
        }

        let drawn = draw(backend);

        write.unbind(backend, target.display);
        read.unbind_texture(backend, target.texture_unit);
        drawn?;

        if priming {
            *primed_frames += 1;
        }

        let output = FrameOutput {
            texture: write.texture(),
            size: write.size(),
        };
        *write_index = 1 - *write_index;
        Ok(Some(output))
    }

    /// Releases both framebuffers. A later frame recreates them and primes
    /// them again.
    pub fn destroy(&mut self, backend: &mut B) {
        if let Some(targets) = self.targets.take() {
            for target in targets {
                target.destroy(backend);
            }
            info!("feedback framebuffers destroyed");
        }
        self.write_index = 0;
        self.primed_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeadlessBackend, Primitive, TextureContents};

    const VIEW: Size2 = Size2::new(320, 200);
    const DISPLAY: Size2 = Size2::new(1280, 720);

    fn target(viewport: Size2) -> FrameTarget {
        FrameTarget {
            viewport,
            display: DISPLAY,
            texture_unit: 0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    fn quad(backend: &mut HeadlessBackend) -> Result<()> {
        backend.draw_arrays(Primitive::TriangleFan, 0, 4);
        Ok(())
    }

    #[test]
    fn create_is_lazy_and_happens_once() {
        let mut gpu = HeadlessBackend::new();
        let mut pair = FramebufferPair::new();
        assert!(!pair.is_created());

        pair.create(&mut gpu).unwrap();
        pair.create(&mut gpu).unwrap();
        assert_eq!(gpu.live_objects(), 6);
        let fb = pair.write_target().unwrap();
        assert_eq!(fb.size(), Size2::default());
        assert!(!fb.is_complete());
    }

    #[test]
    fn identical_resize_is_a_no_op() {
        let mut gpu = HeadlessBackend::new();
        let mut fb = Framebuffer::create(&mut gpu).unwrap();
        let texture = fb.texture();

        assert!(fb.resize(&mut gpu, VIEW));
        assert!(!fb.resize(&mut gpu, VIEW));
        assert_eq!(fb.texture(), texture);
        assert_eq!(gpu.texture_allocations(texture), 1);
        assert_eq!(gpu.renderbuffer_allocations(fb.depth_stencil()), 1);
        assert!(fb.is_complete());
    }

    #[test]
    fn only_the_first_two_frames_clear() {
        let mut gpu = HeadlessBackend::new();
        let mut pair = FramebufferPair::new();

        for _ in 0..5 {
            pair.render_frame(&mut gpu, &target(VIEW), quad).unwrap().unwrap();
        }

        assert_eq!(gpu.clears().len(), 2);
        assert_eq!(pair.primed_frames(), PRIMING_FRAMES);
        assert_ne!(gpu.clears()[0], gpu.clears()[1]);
        assert_eq!(gpu.draws().len(), 5);
    }

    #[test]
    fn each_frame_samples_the_previous_draw() {
        let mut gpu = HeadlessBackend::new();
        let mut pair = FramebufferPair::new();
        let mut outputs = Vec::new();

        for _ in 0..6 {
            outputs.push(pair.render_frame(&mut gpu, &target(VIEW), quad).unwrap().unwrap());
        }

        for (index, draw) in gpu.draws().iter().enumerate().skip(1) {
            assert_eq!(draw.sampled, vec![(0, TextureContents::Drawn(index - 1))]);
            assert_eq!(draw.viewport, VIEW);
        }
        assert_eq!(gpu.feedback_hazards(), 0);
        assert_ne!(outputs[0].texture, outputs[1].texture);
        assert_eq!(outputs[0].texture, outputs[2].texture);
    }

    #[test]
    fn frame_leaves_no_bindings_behind() {
        let mut gpu = HeadlessBackend::new();
        let mut pair = FramebufferPair::new();
        pair.render_frame(&mut gpu, &target(VIEW), quad).unwrap();

        assert_eq!(gpu.bound_framebuffer(), None);
        assert_eq!(gpu.bound_sampler(0), None);
        assert_eq!(gpu.viewport_size(), DISPLAY);
        assert_eq!(pair.write_index(), 1);
    }

    #[test]
    fn incomplete_target_skips_the_frame_until_a_good_resize() {
        let mut gpu = HeadlessBackend::new();
        let mut pair = FramebufferPair::new();
        gpu.set_framebuffers_incomplete(true);

        let output = pair.render_frame(&mut gpu, &target(VIEW), quad).unwrap();
        assert!(output.is_none());
        assert!(gpu.draws().is_empty());
        assert_eq!(pair.write_index(), 0);

        gpu.set_framebuffers_incomplete(false);
        let output = pair.render_frame(&mut gpu, &target(VIEW), quad).unwrap();
        assert!(output.is_none(), "same size does not retry the allocation");

        let bigger = Size2::new(640, 400);
        let output = pair.render_frame(&mut gpu, &target(bigger), quad).unwrap();
        assert_eq!(output.map(|o| o.size), Some(bigger));
        assert_eq!(pair.write_index(), 1);
    }

    #[test]
    fn failed_draw_does_not_swap() {
        let mut gpu = HeadlessBackend::new();
        let mut pair = FramebufferPair::new();
        let result = pair.render_frame(&mut gpu, &target(VIEW), |_| {
            Err(VisualiserError::msg("draw failed"))
        });

        assert!(result.is_err());
        assert_eq!(pair.write_index(), 0);
        assert_eq!(gpu.bound_framebuffer(), None);
    }

    #[test]
    fn failed_priming_draw_still_primes_both_targets() {
        let mut gpu = HeadlessBackend::new();
        let mut pair = FramebufferPair::new();
        let failed = pair.render_frame(&mut gpu, &target(VIEW), |_| {
            Err(VisualiserError::msg("draw failed"))
        });
        assert!(failed.is_err());
        assert_eq!(pair.primed_frames(), 0);

        for _ in 0..3 {
            pair.render_frame(&mut gpu, &target(VIEW), quad).unwrap().unwrap();
        }

        let cleared: Vec<_> = gpu.clears().iter().copied().flatten().collect();
        assert_eq!(cleared.len(), 3);
        assert_eq!(cleared[0], cleared[1], "retried frame clears the same target");
        assert_ne!(cleared[1], cleared[2]);
        assert_eq!(pair.primed_frames(), PRIMING_FRAMES);
    }

    #[test]
    fn destroy_releases_everything_and_allows_recreation() {
        let mut gpu = HeadlessBackend::new();
        let mut pair = FramebufferPair::new();
        pair.render_frame(&mut gpu, &target(VIEW), quad).unwrap();

        pair.destroy(&mut gpu);
        assert_eq!(gpu.live_objects(), 0);
        assert!(!pair.is_created());

        pair.render_frame(&mut gpu, &target(VIEW), quad).unwrap();
        assert_eq!(pair.primed_frames(), 1);
    }
}
