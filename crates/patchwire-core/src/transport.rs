//! Transport broadcast and tempo helpers.
//!
//! The host broadcasts one read-only [`Transport`] per block. Units consume it
//! for tempo-synced free-running rates and for position display. [`TransportClock`]
//! is a minimal producer of those snapshots for offline rendering and tests.

use libm::floor;
use serde::{Deserialize, Serialize};

/// Musical note divisions for tempo sync.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteDivision {
    /// Four bars of 4/4 (16 beats)
    FourBars,
    /// One bar of 4/4 (4 beats)
    Bar,
    /// Half note (2 beats)
    Half,
    /// Quarter note (1 beat)
    #[default]
    Quarter,
    /// Eighth note (1/2 beat)
    Eighth,
    /// Sixteenth note (1/4 beat)
    Sixteenth,
    /// Dotted quarter note (1.5 beats)
    DottedQuarter,
    /// Dotted eighth note (3/4 beat)
    DottedEighth,
    /// Triplet eighth note (1/3 beat)
    TripletEighth,
}

impl NoteDivision {
    /// Number of beats this division spans.
    pub fn beats(&self) -> f64 {
        match self {
            NoteDivision::FourBars => 16.0,
            NoteDivision::Bar => 4.0,
            NoteDivision::Half => 2.0,
            NoteDivision::Quarter => 1.0,
            NoteDivision::Eighth => 0.5,
            NoteDivision::Sixteenth => 0.25,
            NoteDivision::DottedQuarter => 1.5,
            NoteDivision::DottedEighth => 0.75,
            NoteDivision::TripletEighth => 1.0 / 3.0,
        }
    }

    /// Cycles per second at the given tempo.
    ///
    /// # Example
    ///
    /// ```rust
    /// use patchwire_core::NoteDivision;
    ///
    /// // At 120 BPM a quarter note repeats twice a second.
    /// assert!((NoteDivision::Quarter.to_hz(120.0) - 2.0).abs() < 1e-9);
    /// // A full bar takes two seconds.
    /// assert!((NoteDivision::Bar.to_hz(120.0) - 0.5).abs() < 1e-9);
    /// ```
    pub fn to_hz(&self, bpm: f64) -> f64 {
        (bpm / 60.0) / self.beats()
    }

    /// Length in seconds at the given tempo.
    pub fn to_seconds(&self, bpm: f64) -> f64 {
        self.beats() * 60.0 / bpm
    }
}

/// Per-block transport snapshot supplied by the host.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    /// Whether the song is running.
    pub is_playing: bool,
    /// Tempo in beats per minute.
    pub tempo_bpm: f64,
    /// Song position in beats at the first sample of the block.
    pub song_position_beats: f64,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            is_playing: false,
            tempo_bpm: 120.0,
            song_position_beats: 0.0,
        }
    }
}

impl Transport {
    /// Fractional position within the current beat, `[0, 1)`.
    pub fn beat_phase(&self) -> f64 {
        self.song_position_beats - floor(self.song_position_beats)
    }

    /// Fractional position within a division, `[0, 1)`.
    pub fn division_phase(&self, division: NoteDivision) -> f64 {
        let cycles = self.song_position_beats / division.beats();
        cycles - floor(cycles)
    }

    /// Samples per beat at the given sample rate.
    pub fn samples_per_beat(&self, sample_rate: f32) -> f64 {
        f64::from(sample_rate) * 60.0 / self.tempo_bpm.max(1.0)
    }
}

/// Offline transport producer.
///
/// Advances song position by whole blocks while playing.
///
/// # Example
///
/// ```rust
/// use patchwire_core::TransportClock;
///
/// let mut clock = TransportClock::new(48000.0, 120.0);
/// clock.play();
/// for _ in 0..375 {
///     clock.advance(128); // 375 * 128 = 48000 samples = one second
/// }
/// assert!((clock.snapshot().song_position_beats - 2.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct TransportClock {
    sample_rate: f32,
    current: Transport,
}

impl TransportClock {
    /// Creates a stopped clock at beat zero.
    pub fn new(sample_rate: f32, bpm: f64) -> Self {
        Self {
            sample_rate,
            current: Transport {
                is_playing: false,
                tempo_bpm: bpm.max(1.0),
                song_position_beats: 0.0,
            },
        }
    }

    /// Start transport.
    pub fn play(&mut self) {
        self.current.is_playing = true;
    }

    /// Stop transport (position is kept).
    pub fn stop(&mut self) {
        self.current.is_playing = false;
    }

    /// Set the tempo in BPM.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.current.tempo_bpm = bpm.max(1.0);
    }

    /// Rewind to beat zero.
    pub fn rewind(&mut self) {
        self.current.song_position_beats = 0.0;
    }

    /// Snapshot for the block about to be processed.
    pub fn snapshot(&self) -> Transport {
        self.current
    }

    /// Advance past a block of `frames` samples.
    pub fn advance(&mut self, frames: usize) {
        if self.current.is_playing {
            let beats = frames as f64 / self.current.samples_per_beat(self.sample_rate);
            self.current.song_position_beats += beats;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_rates() {
        assert!((NoteDivision::Eighth.to_hz(120.0) - 4.0).abs() < 1e-9);
        assert!((NoteDivision::Sixteenth.to_hz(120.0) - 8.0).abs() < 1e-9);
        assert!((NoteDivision::DottedQuarter.to_seconds(120.0) - 0.75).abs() < 1e-9);
        assert!((NoteDivision::TripletEighth.to_seconds(120.0) - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn stopped_clock_does_not_advance() {
        let mut clock = TransportClock::new(48000.0, 120.0);
        clock.advance(48000);
        assert_eq!(clock.snapshot().song_position_beats, 0.0);
    }

    #[test]
    fn beat_phase_wraps() {
        let t = Transport {
            is_playing: true,
            tempo_bpm: 120.0,
            song_position_beats: 3.25,
        };
        assert!((t.beat_phase() - 0.25).abs() < 1e-12);
        assert!((t.division_phase(NoteDivision::Bar) - 0.8125).abs() < 1e-12);
    }

    #[test]
    fn samples_per_beat_at_120() {
        let t = Transport::default();
        assert!((t.samples_per_beat(48000.0) - 24000.0).abs() < 1e-9);
    }
}
