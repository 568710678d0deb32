//! Change-detecting command publisher.
//!
//! Holds the desired base velocity and decides, on each 20 Hz tick, whether
//! a `publish` frame is due. A frame goes out once per detected change, not
//! as a heartbeat: the dirty flag is cleared after every publish.

use navlink_types::Twist;

/// Changes below this threshold on linear-x / angular-z are not republished.
pub const COMMAND_EPSILON: f64 = 1e-4;

/// Tick period of the command publisher (20 Hz).
pub const PUBLISH_PERIOD_MS: u64 = 50;

/// Desired/last-published command pair with change tracking.
#[derive(Debug)]
pub struct CommandPublisher {
    desired: Twist,
    last_published: Twist,
    dirty: bool,
    enabled: bool,
}

impl Default for CommandPublisher {
    fn default() -> Self {
        Self {
            desired: Twist::default(),
            last_published: Twist::default(),
            dirty: false,
            enabled: true,
        }
    }
}

impl CommandPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the desired command and re-evaluate the dirty flag.
    ///
    /// The comparison is against the previous *desired* value, on linear-x
    /// and angular-z only. An exactly-zero twist that does not differ from
    /// the previous desired value hard-resets the flag, so an idle joystick
    /// can never leave a stale publish pending. `last_published` is never
    /// touched here.
    pub fn set_desired(&mut self, twist: Twist) {
        let prev = self.desired;
        self.desired = twist;

        if twist.is_zero() && prev == twist {
            self.dirty = false;
            return;
        }

        let linear_changed = (twist.linear.x - prev.linear.x).abs() > COMMAND_EPSILON;
        let angular_changed = (twist.angular.z - prev.angular.z).abs() > COMMAND_EPSILON;
        if linear_changed || angular_changed {
            self.dirty = true;
        }
    }

    /// Gate the tick without losing the desired value or the dirty flag.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// One tick of the fixed-rate timer. Returns the twist to publish, or
    /// `None` when disconnected, disabled or clean. A returned twist is
    /// recorded as published and the dirty flag is cleared.
    pub fn on_tick(&mut self, connected: bool) -> Option<Twist> {
        if !connected || !self.enabled || !self.dirty {
            return None;
        }
        self.last_published = self.desired;
        self.dirty = false;
        Some(self.desired)
    }

    pub fn desired(&self) -> Twist {
        self.desired
    }

    pub fn last_published(&self) -> Twist {
        self.last_published
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
