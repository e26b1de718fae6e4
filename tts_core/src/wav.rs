use std::io::Cursor;

use crate::error::TtsError;

/// Wrap raw mono 16-bit little-endian PCM in a RIFF/WAV container.
///
/// An odd trailing byte is not a whole sample and is dropped.
pub fn encode_pcm16_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, TtsError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let samples = pcm.len() / 2;
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| TtsError::EncodingError(e.to_string()))?;
        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| TtsError::EncodingError(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| TtsError::EncodingError(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}
