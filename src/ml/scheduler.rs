// ============================================================
// Layer 5 — Learning-Rate Schedule
// ============================================================
// Cosine annealing, stepped once per epoch:
//
//   lr(t) = eta_min + (base_lr - eta_min) · (1 + cos(π · t / t_max)) / 2
//
// t starts at 0, so the first epoch trains at base_lr and epoch
// t_max trains at eta_min. Past t_max the curve keeps following
// the cosine back up, matching the usual closed form.
//
// The whole struct is the scheduler state: it is serialised as
// JSON into the checkpoint bundle and restored on resume.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CosineAnnealingLr {
    pub base_lr:    f64,
    pub eta_min:    f64,
    pub t_max:      usize,
    /// Number of `step()` calls so far
    pub last_epoch: usize,
}

impl CosineAnnealingLr {
    pub fn new(base_lr: f64, eta_min: f64, t_max: usize) -> Self {
        Self { base_lr, eta_min, t_max, last_epoch: 0 }
    }

    /// Learning rate for the current epoch.
    pub fn lr(&self) -> f64 {
        self.lr_at(self.last_epoch)
    }

    pub fn lr_at(&self, t: usize) -> f64 {
        if self.t_max == 0 {
            return self.base_lr;
        }
        let progress = t as f64 / self.t_max as f64;
        self.eta_min + (self.base_lr - self.eta_min) * (1.0 + (PI * progress).cos()) / 2.0
    }

    /// Advance to the next epoch.
    pub fn step(&mut self) {
        self.last_epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn starts_at_base_and_ends_at_minimum() {
        let s = CosineAnnealingLr::new(1e-4, 1e-6, 50);
        assert!(close(s.lr_at(0), 1e-4));
        assert!(close(s.lr_at(50), 1e-6));
        // Halfway is the midpoint of the range
        assert!(close(s.lr_at(25), (1e-4 + 1e-6) / 2.0));
    }

    #[test]
    fn decreases_monotonically_until_t_max() {
        let s = CosineAnnealingLr::new(1e-3, 0.0, 10);
        for t in 0..10 {
            assert!(s.lr_at(t + 1) < s.lr_at(t));
        }
    }

    #[test]
    fn step_moves_current_rate() {
        let mut s = CosineAnnealingLr::new(1e-4, 1e-6, 4);
        let first = s.lr();
        s.step();
        assert_eq!(s.last_epoch, 1);
        assert!(s.lr() < first);
        assert!(close(s.lr(), s.lr_at(1)));
    }

    #[test]
    fn state_survives_json() {
        let mut s = CosineAnnealingLr::new(1e-4, 1e-6, 50);
        for _ in 0..7 {
            s.step();
        }
        let json     = serde_json::to_string(&s).unwrap();
        let restored: CosineAnnealingLr = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, s);
        assert!(close(restored.lr(), s.lr()));
    }
}
