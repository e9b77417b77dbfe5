//! Anti-paralysis decision window.

use std::collections::VecDeque;

use parliament_constitution::AntiParalysisConfig;
use parliament_types::Verdict;

/// Emitted when the halt rate first rises above the threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowSignal {
    pub halt_rate: f64,
    pub halt_count: usize,
    pub window_size: usize,
}

/// Trailing ring of the most recent verdicts.
///
/// The rate is `halts / window_size` and is evaluated only once
/// `min_samples` verdicts have been collected. Signalling is edge-triggered:
/// one signal per excursion above the threshold, re-armed when the rate
/// returns to or below it.
#[derive(Clone, Debug)]
pub struct DecisionWindow {
    window_size: usize,
    min_samples: usize,
    threshold: f64,
    entries: VecDeque<Verdict>,
    halt_count: usize,
    armed: bool,
}

impl DecisionWindow {
    pub fn new(config: &AntiParalysisConfig) -> Self {
        let window_size = config.window_size.max(1);
        Self {
            window_size,
            min_samples: config.min_samples.clamp(1, window_size),
            threshold: config.halt_threshold,
            entries: VecDeque::with_capacity(window_size),
            halt_count: 0,
            armed: true,
        }
    }

    /// Append a verdict, dropping the oldest when full, and evaluate the rate.
    pub fn record(&mut self, verdict: Verdict) -> Option<WindowSignal> {
        if self.entries.len() == self.window_size {
            if let Some(oldest) = self.entries.pop_front() {
                if oldest.is_halting() {
                    self.halt_count -= 1;
                }
            }
        }
        self.entries.push_back(verdict);
        if verdict.is_halting() {
            self.halt_count += 1;
        }

        if self.entries.len() < self.min_samples {
            return None;
        }

        let halt_rate = self.halt_rate();
        if halt_rate > self.threshold {
            if self.armed {
                self.armed = false;
                return Some(WindowSignal {
                    halt_rate,
                    halt_count: self.halt_count,
                    window_size: self.window_size,
                });
            }
        } else {
            self.armed = true;
        }
        None
    }

    pub fn halt_rate(&self) -> f64 {
        self.halt_count as f64 / self.window_size as f64
    }

    pub fn halt_count(&self) -> usize {
        self.halt_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn window(window_size: usize, min_samples: usize, halt_threshold: f64) -> DecisionWindow {
        DecisionWindow::new(&AntiParalysisConfig {
            window_size,
            min_samples,
            halt_threshold,
        })
    }

    #[test]
    fn six_halts_then_four_approvals_signal_once() {
        let mut w = window(10, 5, 0.5);
        let mut signals = Vec::new();
        for i in 0..10 {
            let verdict = if i < 6 { Verdict::Halt } else { Verdict::Approve };
            if let Some(signal) = w.record(verdict) {
                signals.push((i, signal));
            }
        }

        assert_eq!(signals.len(), 1);
        let (index, signal) = &signals[0];
        assert_eq!(*index, 5, "signal follows the sixth decision");
        assert_eq!(signal.halt_count, 6);
        assert!((signal.halt_rate - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn nothing_is_evaluated_before_min_samples() {
        let mut w = window(4, 3, 0.1);
        assert!(w.record(Verdict::Halt).is_none());
        assert!(w.record(Verdict::Halt).is_none());
        assert!(w.record(Verdict::Halt).is_some());
    }

    #[test]
    fn rearms_after_rate_recovers() {
        let mut w = window(2, 1, 0.5);
        assert!(w.record(Verdict::Escalate).is_none()); // 0.5, not above
        assert!(w.record(Verdict::Halt).is_some()); // 1.0
        assert!(w.record(Verdict::Halt).is_none()); // still above
        assert!(w.record(Verdict::Approve).is_none()); // 0.5, re-armed
        assert!(w.record(Verdict::Approve).is_none());
        assert!(w.record(Verdict::Halt).is_none()); // 0.5
        assert!(w.record(Verdict::Halt).is_some());
    }

    fn verdicts() -> impl Strategy<Value = Vec<Verdict>> {
        prop::collection::vec(
            prop_oneof![
                Just(Verdict::Approve),
                Just(Verdict::Halt),
                Just(Verdict::Escalate)
            ],
            0..80,
        )
    }

    proptest! {
        #[test]
        fn matches_a_recomputed_trailing_window(
            history in verdicts(),
            size in 1usize..15,
            min in 1usize..15,
            threshold in 0.05f64..1.0,
        ) {
            let min = min.min(size);
            let mut w = window(size, min, threshold);
            let mut above = false;

            for (i, verdict) in history.iter().enumerate() {
                let signal = w.record(*verdict);

                let start = (i + 1).saturating_sub(size);
                let tail = &history[start..=i];
                let halts = tail.iter().filter(|v| v.is_halting()).count();
                prop_assert_eq!(w.len(), tail.len());
                prop_assert_eq!(w.halt_count(), halts);

                let expected = if tail.len() < min {
                    false
                } else {
                    let now_above = halts as f64 / size as f64 > threshold;
                    let rising = now_above && !above;
                    above = now_above;
                    rising
                };
                prop_assert_eq!(signal.is_some(), expected);
            }
        }
    }
}
