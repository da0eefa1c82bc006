//! # Notes and Matching
//!
//! Musical note tables and the cents-based target matcher. Handles note name
//! conversions, equal temperament frequency lookups and the tolerance policy
//! that decides whether a detected pitch counts as a hit on the target.
//!
//! ## Features
//! - 88-key note table (A0 to C8) computed once at startup
//! - Frequency to nearest-note mapping for display
//! - Cents deviation with octave folding into (-600, 600]
//! - Explicit tolerance policy: wider for low notes and root notes
//! - Target validation that rejects unknown note labels outright

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use crate::config::MatchThresholds;
use crate::error::PitchError;
use crate::stability::StableReading;

/// Note alphabet used for display names, C-based with sharps.
const NOTE_NAMES: [&str; 12] = [
    "C", "C♯", "D", "D♯", "E", "F", "F♯", "G", "G♯", "A", "A♯", "B",
];

/// Represents a single musical note with its name and frequency.
#[derive(Debug, Clone)]
pub struct Note {
    /// Note name with octave (e.g. "A4", "F♯3").
    pub name: String,
    /// Equal temperament frequency in Hz.
    pub frequency: f32,
}

/// Statically computed notes for the 88-key range A0 to C8, equal
/// temperament with A4 = 440 Hz. Computed once at startup.
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    let mut notes = Vec::with_capacity(88);
    for i in 0..88u32 {
        // A0 is MIDI note 21; A4 (440 Hz) is MIDI note 69.
        let midi = i + 21;
        let frequency = 440.0 * 2.0_f32.powf((midi as f32 - 69.0) / 12.0);
        let name = format!("{}{}", NOTE_NAMES[(midi % 12) as usize], midi / 12 - 1);
        notes.push(Note { name, frequency });
    }
    notes
});

/// Pitch-class lookup for note name spellings, sharps and flats included.
static PITCH_CLASSES: Lazy<BTreeMap<&'static str, u8>> = Lazy::new(|| {
    BTreeMap::from([
        ("C", 0), ("C♯", 1), ("D♭", 1), ("D", 2), ("D♯", 3), ("E♭", 3),
        ("E", 4), ("F", 5), ("F♯", 6), ("G♭", 6), ("G", 7), ("G♯", 8),
        ("A♭", 8), ("A", 9), ("A♯", 10), ("B♭", 10), ("B", 11),
    ])
});

/// Finds the closest note in the 88-key table to a given frequency.
///
/// Used to label detections for display and events.
pub fn find_nearest_note(freq: f32) -> (String, f32) {
    let closest = NOTES
        .iter()
        .min_by(|a, b| {
            let diff_a = (a.frequency - freq).abs();
            let diff_b = (b.frequency - freq).abs();
            // total_cmp keeps the lookup total for NaN input.
            diff_a.total_cmp(&diff_b)
        })
        .unwrap(); // Safe: NOTES is never empty.
    (closest.name.clone(), closest.frequency)
}

/// Looks a note up by its full name (e.g. "A4", "F♯3", "B♭2").
///
/// Returns the equal temperament frequency, or `None` for names outside the
/// table or with an unknown pitch class.
pub fn note_frequency(name: &str) -> Option<f32> {
    // Flat/sharp spellings alias the same key, so resolve via pitch class
    // and octave rather than a direct name lookup.
    let split = name.find(|c: char| c.is_ascii_digit() || c == '-')?;
    let (class_part, octave_part) = name.split_at(split);
    let class = *PITCH_CLASSES.get(class_part)? as i32;
    let octave: i32 = octave_part.parse().ok()?;
    let midi = (octave + 1) * 12 + class;
    if !(21..21 + 88).contains(&midi) {
        return None;
    }
    Some(440.0 * 2.0_f32.powf((midi as f32 - 69.0) / 12.0))
}

/// Returns the pitch class (0-11, C = 0) of a note label, ignoring any
/// trailing octave digits.
pub fn pitch_class(label: &str) -> Option<u8> {
    let class_part = match label.find(|c: char| c.is_ascii_digit() || c == '-') {
        Some(split) => &label[..split],
        None => label,
    };
    PITCH_CLASSES.get(class_part).copied()
}

/// Calculates the deviation of `freq` from `target_freq` in cents.
///
/// 100 cents is one semitone; positive means sharp, negative means flat.
pub fn cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Folds a cents value into (-600, 600] using octave symmetry, so a note one
/// octave off still compares against the nearest octave of the target.
pub fn fold_cents(cents: f32) -> f32 {
    let m = cents.rem_euclid(1200.0);
    if m > 600.0 { m - 1200.0 } else { m }
}

/// The note the player is supposed to hit, supplied by the exercise logic.
///
/// Read-only from the core's perspective; may change between windows as the
/// exercise advances.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPitch {
    /// Target frequency in Hz.
    pub frequency: f32,
    /// Display label such as "A4" or "F♯3".
    pub note_label: String,
    /// Whether this target is the root note of the exercise. Root notes get
    /// a wider match tolerance.
    pub is_root: bool,
}

/// Outcome of comparing a stable reading against the target.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// The reading that was compared.
    pub detected: StableReading,
    /// The target it was compared against.
    pub target: TargetPitch,
    /// Signed cents offset folded into (-600, 600].
    pub cents_offset: f32,
    /// Whether the offset is within the selected tolerance.
    pub is_match: bool,
}

/// Applies the cents tolerance policy to detected pitches.
pub struct NoteMatcher {
    thresholds: MatchThresholds,
}

impl NoteMatcher {
    /// Creates a matcher with the given tolerance table.
    pub fn new(thresholds: MatchThresholds) -> Self {
        NoteMatcher { thresholds }
    }

    /// Rejects targets the matcher cannot meaningfully compare against:
    /// non-positive or non-finite frequencies, and labels whose pitch class
    /// is not in the note alphabet. Guessing at a malformed target would
    /// silently mis-grade the exercise.
    pub fn validate_target(&self, target: &TargetPitch) -> Result<(), PitchError> {
        if !target.frequency.is_finite() || target.frequency <= 0.0 {
            return Err(PitchError::UnknownTarget(format!(
                "target '{}' has invalid frequency {}",
                target.note_label, target.frequency
            )));
        }
        if pitch_class(&target.note_label).is_none() {
            return Err(PitchError::UnknownTarget(format!(
                "unknown note label '{}'",
                target.note_label
            )));
        }
        Ok(())
    }

    /// Compares a stable reading against the target.
    pub fn match_against(&self, detected: &StableReading, target: &TargetPitch) -> MatchResult {
        let cents_offset = fold_cents(cents_deviation(detected.frequency, target.frequency));
        let threshold = self.select_threshold(detected.frequency, target.is_root);
        MatchResult {
            detected: *detected,
            target: target.clone(),
            cents_offset,
            is_match: cents_offset.abs() <= threshold,
        }
    }

    /// Threshold selection: low detections are granted the widest tolerance
    /// (period-length effects reduce precision down there), root notes the
    /// next widest, everything else the default.
    fn select_threshold(&self, detected_freq: f32, is_root: bool) -> f32 {
        if detected_freq < self.thresholds.low_freq_cutoff_hz {
            self.thresholds.low_freq_cents
        } else if is_root {
            self.thresholds.root_note_cents
        } else {
            self.thresholds.default_cents
        }
    }
}
