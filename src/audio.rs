// Audio engine - opens the cpal input/output streams and wires them to the
// modulator/demodulator rings. Adapted from this crate's original
// `AudioCapture`/`build_input_stream` (device enumeration, stream
// construction generic over the device's native sample format).
//
// The original So-Fi implementation used PortAudio's single full-duplex
// callback (`sofi_callback`), sending and receiving in one stream and one
// thread. cpal only exposes separate input and output streams with separate
// callbacks, so this engine opens up to two independent streams instead; the
// half-duplex gating the original's callback did
// (`data->sender.state == SEND_STATE_IDLE`) has no equivalent here since the
// streams run concurrently on cpal's own audio threads.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};

use crate::config::Config;
use crate::error::SofiError;
use crate::modulator::SenderModulator;
use crate::ring::Producer;

/// Owns whichever cpal streams are active for this `Config` (sender,
/// receiver, or both). Streams are stopped and dropped together.
pub struct AudioEngine {
    _output: Option<cpal::Stream>,
    _input: Option<cpal::Stream>,
}

impl AudioEngine {
    /// Open and start the audio streams this config calls for.
    ///
    /// `sender` drives playback from the send ring; `recv_producer` is where
    /// captured microphone samples land for the demodulator thread to drain.
    pub fn open(
        config: &Config,
        sender: Option<SenderModulator>,
        recv_producer: Option<Producer<f32>>,
    ) -> Result<Self, SofiError> {
        let host = cpal::default_host();

        let output = if let Some(modulator) = sender {
            let device = host
                .default_output_device()
                .ok_or_else(|| SofiError::ResourceUnavailable("no default output device".into()))?;
            let stream_config = matching_stream_config(&device, config, true)?;
            let stream = build_output_stream(&device, &stream_config, modulator)?;
            stream
                .play()
                .map_err(|e| SofiError::ResourceUnavailable(e.to_string()))?;
            Some(stream)
        } else {
            None
        };

        let input = if let Some(producer) = recv_producer {
            let device = host
                .default_input_device()
                .ok_or_else(|| SofiError::ResourceUnavailable("no default input device".into()))?;
            let stream_config = matching_stream_config(&device, config, false)?;
            let channels = stream_config.channels as usize;
            let stream = build_input_stream(&device, &stream_config, producer, channels)?;
            stream
                .play()
                .map_err(|e| SofiError::ResourceUnavailable(e.to_string()))?;
            Some(stream)
        } else {
            None
        };

        Ok(Self {
            _output: output,
            _input: input,
        })
    }
}

/// Build a `cpal::StreamConfig` pinned to `config.sample_rate`, using
/// whichever of the device's supported configs covers that rate.
fn matching_stream_config(
    device: &cpal::Device,
    config: &Config,
    output: bool,
) -> Result<cpal::StreamConfig, SofiError> {
    let supported = if output {
        device.supported_output_configs()
    } else {
        device.supported_input_configs()
    }
    .map_err(|e| SofiError::ResourceUnavailable(e.to_string()))?;

    let rate = cpal::SampleRate(config.sample_rate);
    let range = supported
        .filter(|c| c.channels() >= 1)
        .find(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
        .ok_or_else(|| {
            SofiError::ResourceUnavailable(format!("device does not support {} Hz", config.sample_rate))
        })?;

    Ok(cpal::StreamConfig {
        channels: range.channels(),
        sample_rate: rate,
        buffer_size: cpal::BufferSize::Default,
    })
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    modulator: SenderModulator,
) -> Result<cpal::Stream, SofiError> {
    let sample_format = device
        .default_output_config()
        .map_err(|e| SofiError::ResourceUnavailable(e.to_string()))?
        .sample_format();

    match sample_format {
        cpal::SampleFormat::F32 => build_output_stream_typed::<f32>(device, config, modulator),
        cpal::SampleFormat::I16 => build_output_stream_typed::<i16>(device, config, modulator),
        cpal::SampleFormat::U16 => build_output_stream_typed::<u16>(device, config, modulator),
        format => Err(SofiError::ResourceUnavailable(format!(
            "unsupported output sample format: {format:?}"
        ))),
    }
}

fn build_output_stream_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut modulator: SenderModulator,
) -> Result<cpal::Stream, SofiError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let mut mono_scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                mono_scratch.clear();
                mono_scratch.resize(frames, 0.0);
                modulator.fill(&mut mono_scratch);
                for (frame, &sample) in data.chunks_mut(channels).zip(mono_scratch.iter()) {
                    let value = T::from_sample(sample);
                    for out in frame {
                        *out = value;
                    }
                }
            },
            |err| log::error!("audio output stream error: {err}"),
            None,
        )
        .map_err(|e| SofiError::ResourceUnavailable(e.to_string()))
}

fn build_input_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: Producer<f32>,
    channels: usize,
) -> Result<cpal::Stream, SofiError> {
    let sample_format = device
        .default_input_config()
        .map_err(|e| SofiError::ResourceUnavailable(e.to_string()))?
        .sample_format();

    match sample_format {
        cpal::SampleFormat::F32 => build_input_stream_typed::<f32>(device, config, producer, channels),
        cpal::SampleFormat::I16 => build_input_stream_typed::<i16>(device, config, producer, channels),
        cpal::SampleFormat::U16 => build_input_stream_typed::<u16>(device, config, producer, channels),
        format => Err(SofiError::ResourceUnavailable(format!(
            "unsupported input sample format: {format:?}"
        ))),
    }
}

fn build_input_stream_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: Producer<f32>,
    channels: usize,
) -> Result<cpal::Stream, SofiError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let mut mono: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                for chunk in data.chunks(channels) {
                    let sum: f32 = chunk.iter().map(|s| f32::from_sample(*s)).sum();
                    mono.push(sum / channels as f32);
                }
                // Real-time constraint (spec.md §4.3): never block. If the
                // ring is momentarily full, the tail of this callback's
                // samples is dropped rather than waiting on the demodulator
                // thread to drain it.
                producer.write(&mono);
            },
            |err| log::error!("audio input stream error: {err}"),
            None,
        )
        .map_err(|e| SofiError::ResourceUnavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RawMessage;

    #[test]
    fn raw_message_is_usable_as_a_ring_element() {
        // modem.rs relies on RawMessage being Copy + Default for the send
        // ring's element bound; guard that assumption here rather than in
        // codec.rs, since this is the module that actually threads it
        // through a ring::channel.
        fn assert_copy_default<T: Copy + Default>() {}
        assert_copy_default::<RawMessage>();
    }
}
