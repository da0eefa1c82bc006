//! # Stability Filter
//!
//! Temporal smoothing between the raw per-window candidates and the reported
//! pitch. A bounded history is median-filtered (median, not mean, so a single
//! octave jump cannot drag the output), and a hysteresis lock suppresses
//! flicker between adjacent semitones on held notes while still following a
//! genuine pitch change within a few windows.

use std::collections::VecDeque;

use crate::yin::PitchCandidate;

/// The filtered, reportable pitch. Replaced wholesale on each update, never
/// mutated in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StableReading {
    /// Reported frequency in Hz.
    pub frequency: f32,
    /// Mean confidence of the history entries contributing to the median.
    pub confidence: f32,
    /// Sequence number of the window that produced this reading. Readings
    /// from before a reset can be recognized and discarded by their
    /// sequence number.
    pub source_window_seq: u64,
}

/// Median-of-N smoothing with a hysteresis lock.
pub struct StabilityFilter {
    history: VecDeque<Option<PitchCandidate>>,
    capacity: usize,
    /// Relative tolerance for two frequencies to count as the same pitch.
    tolerance: f32,
    /// Consecutive agreeing medians required before (re)locking.
    lock_streak: u32,
    locked: Option<f32>,
    /// Median the agreement counter is currently tracking.
    pending: Option<f32>,
    agreement: u32,
    /// Scratch for the median computation, reused across updates.
    sorted: Vec<f32>,
}

impl StabilityFilter {
    /// Creates a filter keeping `capacity` recent candidates.
    pub fn new(capacity: usize, tolerance: f32, lock_streak: u32) -> Self {
        StabilityFilter {
            history: VecDeque::with_capacity(capacity),
            capacity,
            tolerance,
            lock_streak,
            locked: None,
            pending: None,
            agreement: 0,
            sorted: Vec::with_capacity(capacity),
        }
    }

    /// Pushes one window's fused candidate (`None` for silence or no-pitch)
    /// and returns the current stable reading, if any.
    ///
    /// While no lock is held the raw median is reported, so the early
    /// windows of a new note are not silent.
    pub fn push(
        &mut self,
        candidate: Option<PitchCandidate>,
        window_seq: u64,
    ) -> Option<StableReading> {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(candidate);

        let median = self.median()?;

        match self.locked {
            Some(lock) if self.agrees(median, lock) => {
                // Median still agrees with the lock: hold it and restart any
                // pending relock tracking.
                self.pending = None;
                self.agreement = 0;
            }
            _ => {
                // No lock, or the median has moved away from it. Count
                // consecutive agreeing medians before committing.
                match self.pending {
                    Some(pending) if self.agrees(median, pending) => self.agreement += 1,
                    _ => self.agreement = 1,
                }
                self.pending = Some(median);
                if self.agreement >= self.lock_streak {
                    self.locked = Some(median);
                    self.pending = None;
                    self.agreement = 0;
                }
            }
        }

        let frequency = self.locked.unwrap_or(median);
        let confidence = self.mean_confidence();
        Some(StableReading {
            frequency,
            confidence,
            source_window_seq: window_seq,
        })
    }

    /// Clears history, lock and agreement state. Called when a new exercise
    /// starts.
    pub fn reset(&mut self) {
        self.history.clear();
        self.locked = None;
        self.pending = None;
        self.agreement = 0;
    }

    fn agrees(&self, a: f32, b: f32) -> bool {
        let ratio = a / b;
        ratio >= 1.0 - self.tolerance && ratio <= 1.0 + self.tolerance
    }

    /// Median frequency of the non-null history entries. Even counts take
    /// the mean of the two middle values.
    fn median(&mut self) -> Option<f32> {
        self.sorted.clear();
        self.sorted
            .extend(self.history.iter().flatten().map(|c| c.frequency));
        if self.sorted.is_empty() {
            return None;
        }
        self.sorted
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = self.sorted.len() / 2;
        if self.sorted.len() % 2 == 1 {
            Some(self.sorted[mid])
        } else {
            Some((self.sorted[mid - 1] + self.sorted[mid]) / 2.0)
        }
    }

    fn mean_confidence(&self) -> f32 {
        let mut sum = 0.0;
        let mut count = 0;
        for candidate in self.history.iter().flatten() {
            sum += candidate.confidence;
            count += 1;
        }
        if count == 0 { 0.0 } else { sum / count as f32 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(frequency: f32) -> Option<PitchCandidate> {
        Some(PitchCandidate { frequency, confidence: 0.9 })
    }

    fn filter() -> StabilityFilter {
        StabilityFilter::new(8, 0.03, 4)
    }

    #[test]
    fn jitter_within_tolerance_locks_and_stops_oscillating() {
        let mut filter = filter();
        let mut outputs = Vec::new();
        for seq in 0..20u64 {
            let freq = if seq % 2 == 0 { 220.0 } else { 221.0 };
            if let Some(reading) = filter.push(candidate(freq), seq) {
                outputs.push(reading.frequency);
            }
        }
        // After the lock streak the reported value must be constant.
        let settled = &outputs[4..];
        let first = settled[0];
        assert!(
            settled.iter().all(|&f| (f - first).abs() < f32::EPSILON),
            "output still oscillates: {settled:?}"
        );
        assert!((first - 220.0).abs() / 220.0 < 0.01);
    }

    #[test]
    fn single_outlier_does_not_move_the_median() {
        let mut filter = filter();
        for seq in 0..6u64 {
            filter.push(candidate(220.0), seq);
        }
        // One octave jump in the history.
        let reading = filter.push(candidate(440.0), 6).unwrap();
        assert!((reading.frequency - 220.0).abs() < 1.0, "got {}", reading.frequency);
    }

    #[test]
    fn genuine_pitch_change_relocks_within_streak() {
        let mut filter = filter();
        for seq in 0..10u64 {
            filter.push(candidate(220.0), seq);
        }
        let mut last = 0.0;
        for seq in 10..30u64 {
            if let Some(reading) = filter.push(candidate(330.0), seq) {
                last = reading.frequency;
            }
        }
        assert!((last - 330.0).abs() < 1.0, "did not follow pitch change, got {last}");
    }

    #[test]
    fn early_windows_report_the_raw_median() {
        let mut filter = filter();
        let reading = filter.push(candidate(196.0), 0).unwrap();
        assert!((reading.frequency - 196.0).abs() < f32::EPSILON);
    }

    #[test]
    fn silence_only_history_reports_nothing() {
        let mut filter = filter();
        assert!(filter.push(None, 0).is_none());
        assert!(filter.push(None, 1).is_none());
    }

    #[test]
    fn reset_forgets_lock_and_history() {
        let mut filter = filter();
        for seq in 0..10u64 {
            filter.push(candidate(220.0), seq);
        }
        filter.reset();
        assert!(filter.push(None, 11).is_none());
        let reading = filter.push(candidate(330.0), 12).unwrap();
        assert!((reading.frequency - 330.0).abs() < f32::EPSILON);
    }

    #[test]
    fn readings_carry_their_window_sequence() {
        let mut filter = filter();
        let reading = filter.push(candidate(220.0), 41).unwrap();
        assert_eq!(reading.source_window_seq, 41);
    }
}
