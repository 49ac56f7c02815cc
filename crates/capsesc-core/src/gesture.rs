// Capsesc Gesture State Machine
// Decides when a Caps Lock tap becomes an Escape

use std::time::{Duration, Instant};

use crate::event::{EventKind, EventRecord};
use crate::Key;

/// Key whose uninterrupted tap triggers the substitute emission
pub const GESTURE_KEY: Key = Key::CAPSLOCK;

/// Key emitted in place of the tap
pub const SUBSTITUTE_KEY: Key = Key::ESC;

/// A release at or after this long since the press does not count as a tap
pub const GESTURE_TIMEOUT: Duration = Duration::from_millis(500);

/// Per-daemon gesture state. Shared across all devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    /// The gesture key is down and has not been released yet
    Armed {
        pressed_at: Instant,
        /// Another key went down while armed
        interrupted: bool,
    },
}

/// What the daemon should do after a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Nothing,
    /// Tap the given key on the virtual device
    Emit(Key),
}

/// Pure decision logic over the interleaved record stream of every
/// keyboard.
///
/// `now` is supplied by the caller from a monotonic clock at processing
/// time. Device timestamps are never consulted, since different devices may
/// report against different clocks.
#[derive(Debug, Clone)]
pub struct GestureMachine {
    state: GestureState,
}

impl GestureMachine {
    pub fn new() -> Self {
        Self {
            state: GestureState::Idle,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, GestureState::Armed { .. })
    }

    /// Feed one record through the machine
    pub fn process(&mut self, record: &EventRecord, now: Instant) -> Decision {
        match (record.kind, self.state) {
            (EventKind::KeyDown, _) if record.code == GESTURE_KEY => {
                // A second press before the release re-arms from the latest press
                self.state = GestureState::Armed {
                    pressed_at: now,
                    interrupted: false,
                };
                Decision::Nothing
            }
            (EventKind::KeyDown, GestureState::Armed { pressed_at, .. }) => {
                self.state = GestureState::Armed {
                    pressed_at,
                    interrupted: true,
                };
                Decision::Nothing
            }
            (
                EventKind::KeyUp,
                GestureState::Armed {
                    pressed_at,
                    interrupted,
                },
            ) if record.code == GESTURE_KEY => {
                self.state = GestureState::Idle;
                let elapsed = now.saturating_duration_since(pressed_at);
                if elapsed < GESTURE_TIMEOUT && !interrupted {
                    Decision::Emit(SUBSTITUTE_KEY)
                } else {
                    log::debug!(
                        "{} released after {:?} (interrupted: {}), not a tap",
                        GESTURE_KEY,
                        elapsed,
                        interrupted
                    );
                    Decision::Nothing
                }
            }
            _ => Decision::Nothing,
        }
    }
}

impl Default for GestureMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DeviceId;

    fn kbd() -> DeviceId {
        DeviceId::from("/dev/input/event3")
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    fn down(key: Key) -> EventRecord {
        EventRecord::key_down(kbd(), key)
    }

    fn up(key: Key) -> EventRecord {
        EventRecord::key_up(kbd(), key)
    }

    #[test]
    fn test_quick_tap_emits_once() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        assert_eq!(machine.process(&down(GESTURE_KEY), t0), Decision::Nothing);
        assert_eq!(
            machine.process(&up(GESTURE_KEY), at(t0, 300)),
            Decision::Emit(Key::ESC)
        );
        assert_eq!(machine.state(), GestureState::Idle);
        // A stray second release must not emit again
        assert_eq!(machine.process(&up(GESTURE_KEY), at(t0, 310)), Decision::Nothing);
    }

    #[test]
    fn test_slow_release_does_not_emit() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        machine.process(&down(GESTURE_KEY), t0);
        assert_eq!(machine.process(&up(GESTURE_KEY), at(t0, 600)), Decision::Nothing);
        assert_eq!(machine.state(), GestureState::Idle);
    }

    #[test]
    fn test_release_exactly_at_timeout_does_not_emit() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        machine.process(&down(GESTURE_KEY), t0);
        assert_eq!(machine.process(&up(GESTURE_KEY), at(t0, 500)), Decision::Nothing);
    }

    #[test]
    fn test_other_key_interrupts() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        machine.process(&down(GESTURE_KEY), t0);
        machine.process(&down(Key::A), at(t0, 100));
        assert_eq!(
            machine.state(),
            GestureState::Armed {
                pressed_at: t0,
                interrupted: true
            }
        );
        assert_eq!(machine.process(&up(GESTURE_KEY), at(t0, 200)), Decision::Nothing);
        assert_eq!(machine.state(), GestureState::Idle);
    }

    #[test]
    fn test_repress_measures_from_latest_press() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        machine.process(&down(GESTURE_KEY), t0);
        machine.process(&down(GESTURE_KEY), at(t0, 100));
        assert_eq!(
            machine.process(&up(GESTURE_KEY), at(t0, 450)),
            Decision::Emit(Key::ESC)
        );
    }

    #[test]
    fn test_repress_ignores_first_press_age() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        machine.process(&down(GESTURE_KEY), t0);
        machine.process(&down(GESTURE_KEY), at(t0, 400));
        // 700ms after the first press, 300ms after the second
        assert_eq!(
            machine.process(&up(GESTURE_KEY), at(t0, 700)),
            Decision::Emit(Key::ESC)
        );
    }

    #[test]
    fn test_repress_clears_interruption() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        machine.process(&down(GESTURE_KEY), t0);
        machine.process(&down(Key::A), at(t0, 50));
        machine.process(&down(GESTURE_KEY), at(t0, 100));
        assert_eq!(
            machine.process(&up(GESTURE_KEY), at(t0, 200)),
            Decision::Emit(Key::ESC)
        );
    }

    #[test]
    fn test_release_while_idle_is_ignored() {
        let mut machine = GestureMachine::new();
        assert_eq!(machine.process(&up(GESTURE_KEY), Instant::now()), Decision::Nothing);
        assert_eq!(machine.state(), GestureState::Idle);
    }

    #[test]
    fn test_other_keys_while_idle_leave_state() {
        let now = Instant::now();
        let mut machine = GestureMachine::new();
        machine.process(&down(Key::A), now);
        machine.process(&up(Key::A), now);
        assert_eq!(machine.state(), GestureState::Idle);
    }

    #[test]
    fn test_non_transitions_do_not_interrupt() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        machine.process(&down(GESTURE_KEY), t0);

        let sync = EventRecord::new(kbd(), EventKind::Other, Key(0), Duration::ZERO);
        let repeat = EventRecord::new(kbd(), EventKind::Other, GESTURE_KEY, Duration::ZERO);
        machine.process(&sync, at(t0, 10));
        machine.process(&repeat, at(t0, 40));
        // Releasing another key is not a press
        machine.process(&up(Key::LEFT_SHIFT), at(t0, 60));

        assert_eq!(
            machine.process(&up(GESTURE_KEY), at(t0, 100)),
            Decision::Emit(Key::ESC)
        );
    }

    #[test]
    fn test_interleaved_devices_share_state() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        let laptop = DeviceId::from("/dev/input/event3");
        let external = DeviceId::from("/dev/input/event17");

        machine.process(&EventRecord::key_down(laptop.clone(), GESTURE_KEY), t0);
        machine.process(&EventRecord::key_down(external, Key::A), at(t0, 20));
        assert_eq!(
            machine.process(&EventRecord::key_up(laptop, GESTURE_KEY), at(t0, 80)),
            Decision::Nothing
        );
    }

    #[test]
    fn test_device_timestamps_are_ignored() {
        let t0 = Instant::now();
        let mut machine = GestureMachine::new();
        let mut press = down(GESTURE_KEY);
        press.timestamp = Duration::from_secs(1);
        let mut release = up(GESTURE_KEY);
        release.timestamp = Duration::from_secs(100);

        machine.process(&press, t0);
        assert_eq!(machine.process(&release, at(t0, 50)), Decision::Emit(Key::ESC));
    }
}
