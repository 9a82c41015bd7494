//! Tuner readout math.
//!
//! Maps a detected frequency to the nearest equal-tempered note (A4 =
//! 440 Hz) so the panel can display note name plus cents offset.

const NOTES: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// Tuner readout for one detected frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerReading {
    /// Reference frequency of the nearest note.
    pub freq: f32,
    /// Note name with octave, e.g. `"A4"`.
    pub note: String,
    /// Offset from the reference in cents, negative when flat.
    pub cents: i32,
}

/// Nearest note and cents offset for a detected frequency.
///
/// Returns `None` for silence and out-of-band garbage from the detector.
pub fn find_freqnotecents(detected: f32) -> Option<TunerReading> {
    if !(20.0..=20_000.0).contains(&detected) {
        return None;
    }

    // Semitone distance from A4, rounded to the nearest note.
    let semitones = (12.0 * (detected / 440.0).log2()).round() as i32;
    let freq = 440.0 * 2f32.powf(semitones as f32 / 12.0);
    let cents = (1200.0 * (detected / freq).log2()).round() as i32;

    let name = NOTES[semitones.rem_euclid(12) as usize];
    let octave = 4 + (semitones + 9).div_euclid(12);

    Some(TunerReading {
        freq,
        note: format!("{}{}", name, octave),
        cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a440_is_dead_on() {
        let reading = find_freqnotecents(440.0).unwrap();
        assert_eq!(reading.note, "A4");
        assert_eq!(reading.cents, 0);
        assert!((reading.freq - 440.0).abs() < 0.01);
    }

    #[test]
    fn slightly_flat_e_reads_negative_cents() {
        // Low E guitar string is E2 at ~82.41 Hz.
        let reading = find_freqnotecents(82.0).unwrap();
        assert_eq!(reading.note, "E2");
        assert!(reading.cents < 0);
        assert!(reading.cents > -50);
    }

    #[test]
    fn sharp_pitches_round_to_the_next_note_past_fifty_cents() {
        // Halfway between A4 and A#4.
        let reading = find_freqnotecents(453.1).unwrap();
        assert!(reading.cents.abs() <= 50);
    }

    #[test]
    fn octave_boundaries_are_c_based() {
        // C5 is three semitones above A4.
        let reading = find_freqnotecents(523.25).unwrap();
        assert_eq!(reading.note, "C5");

        // B4 sits just below it.
        let reading = find_freqnotecents(493.88).unwrap();
        assert_eq!(reading.note, "B4");
    }

    #[test]
    fn silence_has_no_reading() {
        assert_eq!(find_freqnotecents(0.0), None);
        assert_eq!(find_freqnotecents(-3.0), None);
    }
}
