use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{AudioConfig, Result, VisualiserError};

pub const BAND_COUNT: usize = 4;

/// Upper edge in Hz of every band but the last, which runs to Nyquist.
const BAND_EDGES_HZ: [f32; BAND_COUNT - 1] = [250.0, 2_000.0, 6_000.0];
const LOWEST_HZ: f32 = 20.0;

/// Band energies in `[0, 1]`, lowest band first. Fed to the effect as the
/// `iSpectrum` uniform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrum(pub [f32; BAND_COUNT]);

impl Spectrum {
    pub fn bands(&self) -> [f32; BAND_COUNT] {
        self.0
    }
}

/// Anything that can hand the renderer the current spectrum.
pub trait SpectrumSource {
    fn spectrum(&self) -> Spectrum;
}

impl SpectrumSource for Spectrum {
    fn spectrum(&self) -> Spectrum {
        *self
    }
}

/// Four-band spectrum analyser over blocks of mono samples.
pub struct SpectrumAnalyser {
    sample_rate: u32,
    smoothing: f32,
    current: Spectrum,
    processed_samples: usize,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl SpectrumAnalyser {
    pub fn new(config: &AudioConfig) -> Self {
        Self::with_sample_rate(config.sample_rate, config.smoothing)
    }

    /// `smoothing` is the weight kept from the previous spectrum.
    pub fn with_sample_rate(sample_rate: u32, smoothing: f32) -> Self {
        Self {
            sample_rate,
            smoothing: smoothing.clamp(0.0, 0.99),
            current: Spectrum::default(),
            processed_samples: 0,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio consumed so far.
    pub fn elapsed_seconds(&self) -> f32 {
        self.processed_samples as f32 / self.sample_rate.max(1) as f32
    }

    /// Clears the accumulated state while preserving configuration.
    pub fn reset(&mut self) {
        self.current = Spectrum::default();
        self.processed_samples = 0;
    }

    /// Consumes a block of samples and returns the smoothed spectrum.
    pub fn process_block(&mut self, samples: &[f32]) -> Result<Spectrum> {
        if samples.len() < 2 {
            return Err(VisualiserError::InvalidInput(
                "spectrum analysis requires blocks with at least two samples",
            ));
        }

        let measured = self.measure(samples)?;
        let keep = self.smoothing;
        for (current, value) in self.current.0.iter_mut().zip(measured) {
            *current = *current * keep + value * (1.0 - keep);
        }
        self.processed_samples += samples.len();
        trace!(bands = ?self.current.0, "spectrum updated");
        Ok(self.current)
    }

    fn measure(&mut self, samples: &[f32]) -> Result<[f32; BAND_COUNT]> {
        let len = samples.len();
        let bin_hz = self.sample_rate as f32 / len as f32;
        let fft = self.prepare_fft(len);

        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        // A full-scale sine peaks at len/4 once Hann windowed.
        let full_scale = len as f32 / 4.0;
        let mut bands = [0.0f32; BAND_COUNT];
        for (i, bin) in fft.spectrum.iter().enumerate() {
            let hz = i as f32 * bin_hz;
            if hz < LOWEST_HZ {
                continue;
            }
            let band = band_for(hz);
            bands[band] = bands[band].max(bin.norm() / full_scale);
        }
        Ok(bands.map(|value| value.clamp(0.0, 1.0)))
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map_or(false, |fft| fft.size != size) {
            self.fft = None;
        }
        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                plan,
            }
        })
    }
}

impl SpectrumSource for SpectrumAnalyser {
    fn spectrum(&self) -> Spectrum {
        self.current
    }
}

fn band_for(hz: f32) -> usize {
    BAND_EDGES_HZ
        .iter()
        .position(|edge| hz < *edge)
        .unwrap_or(BAND_COUNT - 1)
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("sample_rate", &self.sample_rate)
            .field("smoothing", &self.smoothing)
            .field("current", &self.current)
            .field("processed_samples", &self.processed_samples)
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
