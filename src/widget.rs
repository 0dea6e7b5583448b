//! One Nest status widget instance: owns its state and timers and reacts to
//! host notifications, poll outcomes and timer expiry.
//!
//! Nothing here performs I/O. Requests for the host (poll, broadcast, redraw,
//! hide/show) are queued as [`Effect`]s and drained by the dashboard.

use log::{debug, info, warn};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::change::has_changed;
use crate::client::PollOutcome;
use crate::config::{Units, WidgetConfig};
use crate::host::{DashboardModule, Effect, Notification};
use crate::leader::{SiblingDirectory, elect};
use crate::models::nest::{AwayState, NestSnapshot};
use crate::normalize::{AlarmStatus, ThermostatStatus, normalize};
use crate::render::{RenderError, Renderer};
use crate::timer::Timer;

/// Fixed back-off after the API reports its rate limit.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(10 * 60);

pub const MISSING_TOKEN_MESSAGE: &str = "Please add your Nest API token to the dashboard configuration.";
pub const RATE_LIMITED_MESSAGE: &str =
    "The Nest API rate limit has been exceeded. This module will try to load data again in 10 minutes.";
pub const NO_DEVICES_MESSAGE: &str = "There are no Nest Thermostats or Protects in this account.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleState {
    pub loaded: bool,
    /// Empty when there is nothing to report.
    pub error: String,
    pub sleeping: bool,
    pub leader: bool,
    pub thermostats: Vec<ThermostatStatus>,
    pub alarms: Vec<AlarmStatus>,
    pub away: AwayState,
}

pub struct NestWidget {
    identifier: String,
    config: WidgetConfig,
    units: Units,
    siblings: Rc<dyn SiblingDirectory>,
    state: ModuleState,
    poll_timer: Timer,
    sleep_timer: Timer,
    outbox: Vec<Effect>,
}

impl NestWidget {
    pub fn new(
        identifier: impl Into<String>,
        config: WidgetConfig,
        dashboard_units: Units,
        siblings: Rc<dyn SiblingDirectory>,
    ) -> Self {
        let units = config.units.unwrap_or(dashboard_units);
        NestWidget {
            identifier: identifier.into(),
            config: config.adjusted(),
            units,
            siblings,
            state: ModuleState::default(),
            poll_timer: Timer::default(),
            sleep_timer: Timer::default(),
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn poll_deadline(&self) -> Option<Instant> {
        self.poll_timer.deadline()
    }

    pub fn sleep_deadline(&self) -> Option<Instant> {
        self.sleep_timer.deadline()
    }

    fn update_dom(&mut self) {
        // hidden widgets are redrawn by the host when shown again
        if self.state.sleeping {
            return;
        }
        self.outbox.push(Effect::UpdateDom {
            speed: self.config.animation_speed(),
        });
    }

    fn set_error(&mut self, message: impl Into<String>) {
        self.state.error = message.into();
        self.update_dom();
    }

    /// Ask the helper for fresh data, unless hidden.
    fn get_data(&mut self) {
        if self.state.sleeping {
            debug!("{}: sleeping, skipping poll", self.identifier);
            return;
        }
        if self.config.token.is_empty() {
            warn!("{}: no API token configured", self.identifier);
            self.set_error(MISSING_TOKEN_MESSAGE);
            return;
        }
        self.outbox.push(Effect::Poll {
            token: self.config.token.clone(),
        });
    }

    fn arm_sleep_timer(&mut self, now: Instant) {
        self.sleep_timer.arm(now, self.config.motion_sleep_timeout());
    }

    /// Normalize a snapshot (own poll or a leader's broadcast) and redraw if it changed.
    fn process(&mut self, snapshot: &NestSnapshot) {
        let next = normalize(snapshot, self.config.display_mode, self.units);

        let error = if next.device_count == 0 {
            NO_DEVICES_MESSAGE
        } else {
            ""
        };
        let redraw = has_changed(&self.state, &next) || self.state.error != error;

        self.state.loaded = true;
        self.state.thermostats = next.thermostats;
        self.state.alarms = next.alarms;
        self.state.away = next.away;

        if redraw {
            debug!(
                "{}: data changed (thermostats={}, alarms={}, away={:?})",
                self.identifier,
                self.state.thermostats.len(),
                self.state.alarms.len(),
                self.state.away
            );
            self.set_error(error);
        }
    }
}

impl DashboardModule for NestWidget {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn start(&mut self, _now: Instant) {
        info!(
            "Starting module {} ({}, units={:?}, motion_sleep={})",
            self.identifier,
            env!("CARGO_PKG_VERSION"),
            self.units,
            self.config.motion_sleep
        );
        self.state = ModuleState::default();
    }

    fn stop(&mut self) {
        self.poll_timer.cancel();
        self.sleep_timer.cancel();
        self.outbox.clear();
        debug!("{}: stopped", self.identifier);
    }

    fn notification_received(&mut self, notification: &Notification, now: Instant) {
        match notification {
            Notification::AllModulesStarted => {
                let leader = elect(&self.identifier, &self.config.token, self.siblings.siblings());
                self.state.leader = leader;
                if leader {
                    info!(
                        "{}: polling for {} instance(s), first poll in {}ms",
                        self.identifier,
                        self.siblings.siblings().len().max(1),
                        self.config.initial_load_delay
                    );
                    self.poll_timer.arm(now, self.config.initial_load_delay());
                } else {
                    info!("{}: not polling, waiting for shared updates", self.identifier);
                }
            }
            Notification::DataUpdate(snapshot) => self.process(snapshot),
            Notification::UserPresence(present) => {
                if !self.config.motion_sleep || !*present {
                    return;
                }
                if self.state.sleeping {
                    self.outbox.push(Effect::Show {
                        speed: self.config.animation_speed(),
                    });
                } else {
                    self.arm_sleep_timer(now);
                }
            }
        }
    }

    fn socket_notification_received(&mut self, outcome: PollOutcome, now: Instant) {
        match outcome {
            PollOutcome::Data(snapshot) => {
                self.process(&snapshot);
                self.outbox.push(Effect::Broadcast(snapshot));
                self.poll_timer.arm(now, self.config.update_interval());
            }
            PollOutcome::Error(e) => {
                self.set_error(format!("Nest API Error: {}", e));
                self.poll_timer.arm(now, self.config.update_interval());
            }
            PollOutcome::RateLimited => {
                self.set_error(RATE_LIMITED_MESSAGE);
                self.poll_timer.arm(now, RATE_LIMIT_COOLDOWN);
            }
        }
    }

    fn suspend(&mut self) {
        debug!("{}: suspended", self.identifier);
        self.state.sleeping = true;
    }

    fn resume(&mut self, now: Instant) {
        if !self.state.sleeping {
            return;
        }
        debug!("{}: resumed", self.identifier);
        self.state.sleeping = false;
        if self.state.leader {
            self.get_data();
        }
        if self.config.motion_sleep {
            self.arm_sleep_timer(now);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        [self.poll_timer.deadline(), self.sleep_timer.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    fn on_timer(&mut self, now: Instant) {
        if self.poll_timer.fire_if_due(now) {
            self.get_data();
        }
        if self.sleep_timer.fire_if_due(now) {
            info!("{}: no presence for {}s, hiding", self.identifier, self.config.motion_sleep_seconds);
            self.outbox.push(Effect::Hide {
                speed: self.config.animation_speed(),
            });
        }
    }

    fn get_dom(&self, renderer: &Renderer) -> Result<String, RenderError> {
        renderer.render(&self.state, &self.config)
    }

    fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.outbox)
    }
}
