use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::Result;

/// Writes mono samples as a 16-bit PCM WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let scale = f32::from(i16::MAX);
    for &sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * scale).round() as i16;
        writer.write_sample(quantized)?;
    }
    writer.finalize()?;

    tracing::info!(?path, samples = samples.len(), sample_rate, "wrote WAV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_readable_pcm() {
        let path = std::env::temp_dir().join(format!("cantus-export-{}.wav", std::process::id()));
        let samples = [0.0, 0.5, -0.5, 1.5];

        write_wav(&path, &samples, 8_000).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.spec().channels, 1);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, vec![0, 16_384, -16_384, i16::MAX]);

        std::fs::remove_file(&path).unwrap();
    }
}
