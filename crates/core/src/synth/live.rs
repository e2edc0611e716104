use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::{config::PlaybackConfig, CantusError, Result};

use super::{Synthesizer, ToneSynth};

/// [`ToneSynth`] wired to the default output device.
///
/// Opening it starts the device stream, so only do that in response to the
/// user asking for sound.
pub struct LiveOutput {
    synth: ToneSynth,
    _stream: cpal::Stream,
}

impl LiveOutput {
    pub fn open(config: &PlaybackConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| CantusError::Audio("no output device available".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|err| CantusError::Audio(err.to_string()))?;

        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(CantusError::Audio(format!(
                "unsupported sample format {:?}",
                supported.sample_format()
            )));
        }

        let channels = usize::from(supported.channels().max(1));
        let sample_rate = supported.sample_rate().0;
        let stream_config: cpal::StreamConfig = supported.into();
        tracing::info!(?stream_config, "opening output stream");

        let synth = ToneSynth::new(sample_rate, config.envelope);
        synth.set_volume(config.volume_db);
        let voice = synth.clone();
        let mut mono = Vec::new();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / channels, 0.0);
                    if let Err(err) = voice.render(&mut mono) {
                        tracing::warn!(%err, "output callback rendered silence");
                        mono.fill(0.0);
                    }
                    for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        frame.fill(sample);
                    }
                },
                |err| tracing::warn!(%err, "output stream error"),
                None,
            )
            .map_err(|err| CantusError::Audio(err.to_string()))?;
        stream
            .play()
            .map_err(|err| CantusError::Audio(err.to_string()))?;

        Ok(Self {
            synth,
            _stream: stream,
        })
    }

    pub fn synth(&self) -> &ToneSynth {
        &self.synth
    }
}

impl Synthesizer for LiveOutput {
    fn now(&self) -> f64 {
        self.synth.now()
    }

    fn trigger_attack_release(&self, midi: i32, duration: f64, at: f64) {
        self.synth.trigger_attack_release(midi, duration, at);
    }

    fn release_all(&self) {
        self.synth.release_all();
    }

    fn set_volume(&self, db: f32) {
        self.synth.set_volume(db);
    }
}
