//! AudioTestSrc element for generating test tones.
//!
//! Produces interleaved signed 16-bit audio at whatever rate and channel
//! count the link negotiates, with timestamps derived from the sample
//! offset.

use crate::buffer::Buffer;
use crate::caps::{Caps, Structure, Value};
use crate::clock::ClockTime;
use crate::element::{
    Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, PropertyValue,
    StateChange, StateChangeSuccess,
};
use crate::elements::base::{BaseSrc, PushSrc};
use crate::error::{FlowError, PropertyError, StateChangeError};
use crate::metadata::Metadata;
use std::f64::consts::TAU;
use std::sync::Mutex;
use tracing::trace;

const DEFAULT_RATE: i64 = 44_100;
const DEFAULT_CHANNELS: i64 = 1;

/// Waveforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wave {
    /// Sine tone.
    #[default]
    Sine,
    /// Square tone.
    Square,
    /// All zeros.
    Silence,
}

impl Wave {
    fn nick(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Square => "square",
            Self::Silence => "silence",
        }
    }

    fn from_nick(nick: &str) -> Option<Self> {
        match nick {
            "sine" => Some(Self::Sine),
            "square" => Some(Self::Square),
            "silence" => Some(Self::Silence),
            _ => None,
        }
    }
}

/// Settings of an [`AudioTestSrc`].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTestSrcSettings {
    /// Tone frequency in Hz.
    pub freq: f64,
    /// Amplitude, 0.0 to 1.0.
    pub volume: f64,
    /// Waveform.
    pub wave: Wave,
    /// Samples (per channel) in each buffer.
    pub samples_per_buffer: u32,
    /// Buffers to produce before EOS, -1 for unlimited.
    pub num_buffers: i64,
    /// Produce in real time, only in PLAYING.
    pub is_live: bool,
}

impl Default for AudioTestSrcSettings {
    fn default() -> Self {
        Self {
            freq: 440.0,
            volume: 0.8,
            wave: Wave::Sine,
            samples_per_buffer: 1024,
            num_buffers: -1,
            is_live: false,
        }
    }
}

impl AudioTestSrcSettings {
    /// Set the frequency.
    pub fn freq(mut self, freq: f64) -> Self {
        self.freq = freq;
        self
    }

    /// Set the volume.
    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    /// Set the waveform.
    pub fn wave(mut self, wave: Wave) -> Self {
        self.wave = wave;
        self
    }

    /// Set the buffer length in samples.
    pub fn samples_per_buffer(mut self, samples: u32) -> Self {
        self.samples_per_buffer = samples;
        self
    }

    /// Set the number of buffers.
    pub fn num_buffers(mut self, num_buffers: i64) -> Self {
        self.num_buffers = num_buffers;
        self
    }

    /// Make the source live.
    pub fn is_live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), PropertyError> {
        if !(0.0..=20_000.0).contains(&self.freq) {
            return Err(PropertyError::invalid("freq", "must be within 0 to 20000 Hz"));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(PropertyError::invalid("volume", "must be within 0.0 to 1.0"));
        }
        if self.samples_per_buffer == 0 {
            return Err(PropertyError::invalid("samples-per-buffer", "must be at least 1"));
        }
        if self.num_buffers < -1 {
            return Err(PropertyError::invalid("num-buffers", "must be -1 or more"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Generator {
    buffers: u64,
    offset: u64,
    phase: f64,
}

/// An audio source generating a test tone.
///
/// # Properties
///
/// | Name | Type | Default |
/// |------|------|---------|
/// | `freq` | double | 440.0 |
/// | `volume` | double | 0.8 |
/// | `wave` | string (`sine`, `square`, `silence`) | `sine` |
/// | `samples-per-buffer` | int | 1024 |
/// | `num-buffers` | int | -1 |
/// | `is-live` | bool | false |
///
/// Output caps are `audio/x-raw, format=S16LE, layout=interleaved`; an
/// unconstrained rate fixates to 44100 Hz and channels to mono.
#[derive(Default)]
pub struct AudioTestSrc {
    base: BaseSrc,
    settings: Mutex<AudioTestSrcSettings>,
    generator: Mutex<Generator>,
}

impl AudioTestSrc {
    /// Create with the given settings.
    pub fn with_settings(settings: AudioTestSrcSettings) -> Result<Self, PropertyError> {
        settings.validate()?;
        Ok(Self {
            settings: Mutex::new(settings),
            ..Self::default()
        })
    }

    /// Pad templates.
    pub fn templates() -> Vec<PadTemplate> {
        let caps = Caps::builder("audio/x-raw")
            .field("format", "S16LE")
            .field("layout", "interleaved")
            .field("rate", 1..=i64::from(i32::MAX))
            .field("channels", 1..=2i64)
            .build();
        vec![PadTemplate::new("src", PadDirection::Src, PadPresence::Always, caps)]
    }

    fn format(element: &Element) -> (u64, usize) {
        let caps = element.pad_caps("src");
        let s = caps.as_ref().and_then(|c| c.structure(0));
        let rate = s.and_then(|s| s.get_int("rate")).unwrap_or(DEFAULT_RATE);
        let channels = s.and_then(|s| s.get_int("channels")).unwrap_or(DEFAULT_CHANNELS);
        (rate.max(1) as u64, channels.max(1) as usize)
    }

    fn render(settings: &AudioTestSrcSettings, state: &mut Generator, rate: u64, channels: usize) -> Vec<u8> {
        let samples = settings.samples_per_buffer as usize;
        let mut data = Vec::with_capacity(samples * channels * 2);
        let step = TAU * settings.freq / rate as f64;
        let amplitude = settings.volume * f64::from(i16::MAX);
        for _ in 0..samples {
            let value = match settings.wave {
                Wave::Sine => state.phase.sin() * amplitude,
                Wave::Square if state.phase < TAU / 2.0 => amplitude,
                Wave::Square => -amplitude,
                Wave::Silence => 0.0,
            } as i16;
            for _ in 0..channels {
                data.extend_from_slice(&value.to_le_bytes());
            }
            state.phase = (state.phase + step) % TAU;
        }
        data
    }
}

/// Narrow `field` to `target` when the current value allows it.
fn fixate_nearest(structure: &mut Structure, field: &str, target: i64) {
    let fits = structure
        .value(field)
        .is_some_and(|v| v.intersect(&Value::Int(target)).is_some());
    if fits {
        structure.set(field, target);
    }
}

impl PushSrc for AudioTestSrc {
    fn base_src(&self) -> &BaseSrc {
        &self.base
    }

    fn create(&self, element: &Element) -> Result<Option<Buffer>, FlowError> {
        let settings = self.settings.lock().unwrap().clone();
        let (rate, channels) = Self::format(element);
        let (data, offset) = {
            let mut state = self.generator.lock().unwrap();
            if settings.num_buffers >= 0 && state.buffers >= settings.num_buffers as u64 {
                return Ok(None);
            }
            let offset = state.offset;
            let data = Self::render(&settings, &mut state, rate, channels);
            state.buffers += 1;
            state.offset += u64::from(settings.samples_per_buffer);
            (data, offset)
        };
        let end = offset + u64::from(settings.samples_per_buffer);
        let pts = ClockTime::from_samples(offset, rate).ok_or(FlowError::Error)?;
        let next = ClockTime::from_samples(end, rate).ok_or(FlowError::Error)?;

        if settings.is_live {
            // Hand out each buffer once the clock has reached its end.
            if let Some(now) = element.running_time() {
                if next > now && !self.base.sleep((next - now).into()) {
                    return Err(FlowError::Flushing);
                }
            }
        }

        trace!(element = %element.name(), %pts, offset, "generated buffer");
        let metadata = Metadata::with_sequence(offset / u64::from(settings.samples_per_buffer))
            .with_pts(pts)
            .with_duration(next - pts)
            .with_offsets(offset, end);
        Ok(Some(Buffer::new(data, metadata)))
    }

    fn is_live(&self) -> bool {
        self.settings.lock().unwrap().is_live
    }

    fn start(&self, _element: &Element) {
        *self.generator.lock().unwrap() = Generator::default();
    }
}

impl ElementImpl for AudioTestSrc {
    fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> Result<StateChangeSuccess, StateChangeError> {
        BaseSrc::change_state(self, element, transition)
    }

    fn fixate_caps(&self, _element: &Element, _pad: &Pad, caps: Caps) -> Caps {
        let mut fixed = Caps::new_empty();
        for structure in caps.iter() {
            let mut structure = structure.clone();
            fixate_nearest(&mut structure, "rate", DEFAULT_RATE);
            fixate_nearest(&mut structure, "channels", DEFAULT_CHANNELS);
            fixed.append_structure(structure);
        }
        fixed.fixate()
    }

    fn set_property(
        &self,
        _element: &Element,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        let mut settings = self.settings.lock().unwrap().clone();
        match name {
            "freq" => settings.freq = value.get_f64(name)?,
            "volume" => settings.volume = value.get_f64(name)?,
            "wave" => {
                let nick = value.get_string(name)?;
                settings.wave = Wave::from_nick(&nick)
                    .ok_or_else(|| PropertyError::invalid(name, format!("unknown wave '{nick}'")))?;
            }
            "samples-per-buffer" => settings.samples_per_buffer = value.get_u32(name)?,
            "num-buffers" => settings.num_buffers = value.get_i64(name)?,
            "is-live" => settings.is_live = value.get_bool(name)?,
            _ => return Err(PropertyError::unknown(name)),
        }
        settings.validate()?;
        *self.settings.lock().unwrap() = settings;
        Ok(())
    }

    fn property(&self, _element: &Element, name: &str) -> Result<PropertyValue, PropertyError> {
        let settings = self.settings.lock().unwrap();
        Ok(match name {
            "freq" => PropertyValue::Double(settings.freq),
            "volume" => PropertyValue::Double(settings.volume),
            "wave" => PropertyValue::Str(settings.wave.nick().to_string()),
            "samples-per-buffer" => PropertyValue::Int(i64::from(settings.samples_per_buffer)),
            "num-buffers" => PropertyValue::Int(settings.num_buffers),
            "is-live" => PropertyValue::Bool(settings.is_live),
            _ => return Err(PropertyError::unknown(name)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::AppSinkImpl;
    use crate::element::State;
    use crate::pipeline::Pipeline;

    fn sink_with(caps: &str) -> Pad {
        let template = PadTemplate::new(
            "sink",
            PadDirection::Sink,
            PadPresence::Always,
            caps.parse().unwrap(),
        );
        Pad::from_template(&template, "sink")
    }

    #[test]
    fn test_fixates_to_defaults() {
        let src = Element::new("src", AudioTestSrc::templates(), AudioTestSrc::default());
        let pad = src.static_pad("src").unwrap();
        pad.link(&sink_with("audio/x-raw")).unwrap();
        let caps = pad.current_caps().unwrap();
        let s = caps.structure(0).unwrap();
        assert_eq!(s.get_int("rate"), Some(44_100));
        assert_eq!(s.get_int("channels"), Some(1));
        assert_eq!(s.get_str("format"), Some("S16LE"));
    }

    #[test]
    fn test_follows_downstream_constraints() {
        let src = Element::new("src", AudioTestSrc::templates(), AudioTestSrc::default());
        let pad = src.static_pad("src").unwrap();
        pad.link(&sink_with("audio/x-raw, rate=8000, channels=2")).unwrap();
        let caps = pad.current_caps().unwrap();
        assert_eq!(caps.structure(0).unwrap().get_int("rate"), Some(8000));
        assert_eq!(caps.structure(0).unwrap().get_int("channels"), Some(2));
    }

    #[test]
    fn test_timestamps_follow_sample_offsets() {
        let pipeline = Pipeline::new();
        let src = Element::new(
            "src",
            AudioTestSrc::templates(),
            AudioTestSrc::with_settings(
                AudioTestSrcSettings::default()
                    .num_buffers(3)
                    .samples_per_buffer(441),
            )
            .unwrap(),
        );
        let sink = Element::new("sink", AppSinkImpl::templates(), AppSinkImpl::default());
        sink.set_property("sync", false).unwrap();
        pipeline.add_many(&[&src, &sink]).unwrap();
        src.link(&sink).unwrap();
        pipeline.set_state(State::Playing).unwrap();

        let appsink = crate::elements::AppSink::from_element(&sink).unwrap();
        let mut pts = Vec::new();
        while let Some(sample) = appsink.pull_sample() {
            let buffer = sample.buffer();
            assert_eq!(buffer.len(), 441 * 2);
            assert_eq!(buffer.duration(), Some(ClockTime::from_mseconds(10)));
            pts.push(buffer.pts().unwrap().mseconds());
        }
        assert_eq!(pts, [0, 10, 20]);
        pipeline.set_state(State::Null).unwrap();
    }

    #[test]
    fn test_invalid_settings() {
        let src = Element::new("src", AudioTestSrc::templates(), AudioTestSrc::default());
        assert!(matches!(
            src.set_property("volume", 2.0),
            Err(PropertyError::Invalid { .. })
        ));
        assert!(src.set_property("wave", "sawtooth").is_err());
        src.set_property("wave", "silence").unwrap();
        assert_eq!(src.property("wave"), Ok(PropertyValue::Str("silence".into())));
        assert_eq!(src.property("volume"), Ok(PropertyValue::Double(0.8)));
    }
}
