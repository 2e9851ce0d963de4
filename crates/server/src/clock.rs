//! Per-side countdown clock in whole seconds.

use serde::{Deserialize, Serialize};
use shakmaty::Color;

/// Total time per side plus increment per completed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    pub total_seconds: u32,
    #[serde(default)]
    pub increment_seconds: u32,
}

impl TimeControl {
    pub fn new(total_seconds: u32, increment_seconds: u32) -> Self {
        Self {
            total_seconds,
            increment_seconds,
        }
    }
}

/// Countdown state for both sides. An untimed clock never ticks.
#[derive(Debug, Clone)]
pub struct Clock {
    white: u32,
    black: u32,
    active: Option<Color>,
    increment: u32,
    timed: bool,
    flagged: Option<Color>,
}

impl Clock {
    pub fn new(time_control: Option<TimeControl>) -> Self {
        let mut clock = Self {
            white: 0,
            black: 0,
            active: None,
            increment: 0,
            timed: false,
            flagged: None,
        };
        clock.reset(time_control);
        clock
    }

    /// Give both sides the full time again and stop ticking.
    pub fn reset(&mut self, time_control: Option<TimeControl>) {
        let total = time_control.map(|tc| tc.total_seconds).unwrap_or(0);
        self.white = total;
        self.black = total;
        self.increment = time_control.map(|tc| tc.increment_seconds).unwrap_or(0);
        self.timed = time_control.is_some();
        self.active = None;
        self.flagged = None;
    }

    /// Switch the ticking side, or suspend with `None`.
    pub fn set_active_side(&mut self, side: Option<Color>) {
        self.active = if self.timed && self.flagged.is_none() {
            side
        } else {
            None
        };
    }

    /// Advance one second for the active side. Returns the side that ran out
    /// of time, exactly once; the clock then freezes at zero.
    pub fn tick(&mut self) -> Option<Color> {
        let side = self.active?;
        let remaining = match side {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.flagged = Some(side);
            self.active = None;
            return Some(side);
        }
        None
    }

    /// Credit the increment to `side` after it completed a move. Saturates
    /// at `u32::MAX`.
    pub fn add_increment(&mut self, side: Color) {
        if !self.timed || self.increment == 0 || self.flagged.is_some() {
            return;
        }
        let remaining = match side {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        };
        *remaining = remaining.saturating_add(self.increment);
    }

    pub fn remaining(&self, side: Color) -> u32 {
        match side {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    pub fn active_side(&self) -> Option<Color> {
        self.active
    }

    pub fn is_ticking(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_timed(&self) -> bool {
        self.timed
    }
}

/// `m:ss`
pub fn format_time(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_ticks_time_out_once() {
        let mut clock = Clock::new(Some(TimeControl::new(10, 0)));
        clock.set_active_side(Some(Color::White));

        let mut timeouts = Vec::new();
        for _ in 0..10 {
            if let Some(side) = clock.tick() {
                timeouts.push(side);
            }
        }
        assert_eq!(clock.remaining(Color::White), 0);
        assert_eq!(timeouts, vec![Color::White]);

        assert_eq!(clock.tick(), None);
        assert_eq!(clock.remaining(Color::White), 0);
        assert_eq!(clock.remaining(Color::Black), 10);
    }

    #[test]
    fn test_only_active_side_ticks() {
        let mut clock = Clock::new(Some(TimeControl::new(60, 0)));
        clock.set_active_side(Some(Color::Black));
        clock.tick();
        clock.tick();
        assert_eq!(clock.remaining(Color::Black), 58);
        assert_eq!(clock.remaining(Color::White), 60);

        clock.set_active_side(None);
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.remaining(Color::Black), 58);
    }

    #[test]
    fn test_untimed_never_ticks() {
        let mut clock = Clock::new(None);
        clock.set_active_side(Some(Color::White));
        assert!(!clock.is_ticking());
        assert_eq!(clock.tick(), None);
    }

    #[test]
    fn test_increment_and_reset() {
        let mut clock = Clock::new(Some(TimeControl::new(180, 2)));
        clock.set_active_side(Some(Color::White));
        clock.tick();
        clock.add_increment(Color::White);
        assert_eq!(clock.remaining(Color::White), 181);

        clock.reset(Some(TimeControl::new(300, 0)));
        assert_eq!(clock.remaining(Color::White), 300);
        assert_eq!(clock.remaining(Color::Black), 300);
        assert_eq!(clock.active_side(), None);
        clock.add_increment(Color::Black);
        assert_eq!(clock.remaining(Color::Black), 300);
    }

    #[test]
    fn test_flagged_clock_stays_frozen() {
        let mut clock = Clock::new(Some(TimeControl::new(1, 5)));
        clock.set_active_side(Some(Color::White));
        assert_eq!(clock.tick(), Some(Color::White));
        clock.set_active_side(Some(Color::White));
        clock.add_increment(Color::White);
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.remaining(Color::White), 0);
    }

    #[test]
    fn test_increment_saturates_on_huge_budget() {
        let mut clock = Clock::new(Some(TimeControl::new(u32::MAX, 5)));
        clock.add_increment(Color::White);
        assert_eq!(clock.remaining(Color::White), u32::MAX);

        clock.set_active_side(Some(Color::White));
        clock.tick();
        clock.add_increment(Color::White);
        assert_eq!(clock.remaining(Color::White), u32::MAX);
        assert_eq!(clock.remaining(Color::Black), u32::MAX);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(300), "5:00");
        assert_eq!(format_time(65), "1:05");
        assert_eq!(format_time(0), "0:00");
    }
}
