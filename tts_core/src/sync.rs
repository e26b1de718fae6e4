//! Interleaving of PCM windows with viseme events.
//!
//! Events are released no later than the audio window they start in, so a
//! renderer that plays messages in order never sees a mouth shape for audio
//! it has not received yet.

use bytes::Bytes;

use crate::message::{StreamMessage, VisemeEvent};

/// Duration of a 16-bit mono PCM buffer, in milliseconds.
pub fn chunk_duration_ms(byte_len: usize, sample_rate: u32) -> f64 {
    (byte_len as f64 / 2.0) / (sample_rate.max(1) as f64 / 1000.0)
}

/// Split a PCM buffer into fixed-size windows without copying.
///
/// The last window may be shorter. A zero `window` yields the whole buffer.
pub fn pcm_windows(audio: Bytes, window: usize) -> impl Iterator<Item = Bytes> {
    let window = if window == 0 { audio.len().max(1) } else { window };
    let len = audio.len();
    (0..len)
        .step_by(window)
        .map(move |start| audio.slice(start..(start + window).min(len)))
}

/// Single forward pass over windows and events, `O(windows + events)`.
///
/// Events must be sorted by `offset_ms`; unsorted input is not detected.
/// Emits no terminal message; the engine appends `Complete`.
pub struct StreamSynchronizer<I> {
    windows: I,
    events: std::iter::Peekable<std::vec::IntoIter<VisemeEvent>>,
    sample_rate: u32,
    audio_offset_ms: f64,
    current: Option<Bytes>,
}

impl<I> StreamSynchronizer<I>
where
    I: Iterator<Item = Bytes>,
{
    pub fn new(
        windows: impl IntoIterator<IntoIter = I>,
        events: Vec<VisemeEvent>,
        sample_rate: u32,
    ) -> Self {
        Self {
            windows: windows.into_iter(),
            events: events.into_iter().peekable(),
            sample_rate,
            audio_offset_ms: 0.0,
            current: None,
        }
    }
}

impl<I> Iterator for StreamSynchronizer<I>
where
    I: Iterator<Item = Bytes>,
{
    type Item = StreamMessage;

    fn next(&mut self) -> Option<StreamMessage> {
        loop {
            if let Some(window) = self.current.take() {
                let horizon =
                    self.audio_offset_ms + chunk_duration_ms(window.len(), self.sample_rate);
                if let Some(event) = self.events.next_if(|e| e.offset_ms as f64 <= horizon) {
                    self.current = Some(window);
                    return Some(StreamMessage::Viseme(event));
                }
                self.audio_offset_ms = horizon;
                return Some(StreamMessage::Audio(window));
            }
            match self.windows.next() {
                Some(window) => self.current = Some(window),
                // trailing events past the last window are still delivered
                None => return self.events.next().map(StreamMessage::Viseme),
            }
        }
    }
}
