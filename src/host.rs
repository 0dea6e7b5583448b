//! Dashboard host: the lifecycle contract widgets implement and the
//! single-threaded loop that drives them.
//!
//! - Widgets never call each other or the network. They queue [`Effect`]s; the
//!   dashboard executes them (poll through the [`NestApi`], broadcast to siblings,
//!   render, hide/show).
//! - Timers are deadlines owned by the widgets. The loop waits for the earliest
//!   one or for an external event (presence signal), then fires whatever is due.

use indexmap::IndexMap;
use log::{debug, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::client::{NestApi, PollOutcome};
use crate::config::DashboardConfig;
use crate::leader::{Roster, Sibling};
use crate::models::nest::NestSnapshot;
use crate::render::{RenderError, Renderer};
use crate::widget::NestWidget;

/// Messages the host delivers to every widget.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Fired once, after every widget has started.
    AllModulesStarted,
    UserPresence(bool),
    /// A snapshot polled by the leader on behalf of its siblings.
    DataUpdate(NestSnapshot),
}

/// Requests a widget makes of its host.
#[derive(Debug)]
pub enum Effect {
    Poll { token: String },
    Broadcast(NestSnapshot),
    UpdateDom { speed: Duration },
    Hide { speed: Duration },
    Show { speed: Duration },
}

/// What the dashboard needs from a widget.
pub trait DashboardModule {
    fn identifier(&self) -> &str;
    fn start(&mut self, now: Instant);
    fn stop(&mut self);
    fn notification_received(&mut self, notification: &Notification, now: Instant);
    fn socket_notification_received(&mut self, outcome: PollOutcome, now: Instant);
    /// Called once the widget has been hidden.
    fn suspend(&mut self);
    /// Called once the widget is visible again.
    fn resume(&mut self, now: Instant);
    fn next_deadline(&self) -> Option<Instant>;
    fn on_timer(&mut self, now: Instant);
    fn get_dom(&self, renderer: &Renderer) -> Result<String, RenderError>;
    fn take_effects(&mut self) -> Vec<Effect>;
}

/// External input fed into the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Presence(bool),
}

pub struct Dashboard<A: NestApi> {
    modules: Vec<Box<dyn DashboardModule>>,
    api: A,
    renderer: Renderer,
    output_dir: Option<PathBuf>,
    /// Latest fragment per widget; empty while hidden.
    rendered: IndexMap<String, String>,
}

impl<A: NestApi> Dashboard<A> {
    pub fn new(modules: Vec<Box<dyn DashboardModule>>, api: A, output_dir: Option<PathBuf>) -> Result<Self, String> {
        let renderer = Renderer::new().map_err(|e| format!("loading templates failed: {}", e))?;
        if let Some(dir) = &output_dir {
            std::fs::create_dir_all(dir).map_err(|e| format!("failed to create {}: {}", dir.display(), e))?;
        }
        Ok(Dashboard {
            modules,
            api,
            renderer,
            output_dir,
            rendered: IndexMap::new(),
        })
    }

    /// Build one widget per configured module, sharing a roster of all of them.
    pub fn from_config(config: &DashboardConfig, api: A, output_dir: Option<PathBuf>) -> Result<Self, String> {
        let siblings = config
            .modules
            .iter()
            .enumerate()
            .map(|(i, m)| Sibling {
                identifier: config.identifier(i),
                token: m.config.token.clone(),
            })
            .collect::<Vec<_>>();
        let roster = Rc::new(Roster::new(siblings));

        let modules = config
            .modules
            .iter()
            .enumerate()
            .map(|(i, m)| {
                Box::new(NestWidget::new(
                    config.identifier(i),
                    m.config.clone(),
                    config.units,
                    roster.clone(),
                )) as Box<dyn DashboardModule>
            })
            .collect();

        Self::new(modules, api, output_dir)
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn rendered(&self, identifier: &str) -> Option<&str> {
        self.rendered.get(identifier).map(String::as_str)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Start every widget, then announce that all of them are up.
    pub fn start(&mut self, now: Instant) {
        for module in self.modules.iter_mut() {
            module.start(now);
        }
        for idx in 0..self.modules.len() {
            self.render(idx);
        }
        self.notify_all(&Notification::AllModulesStarted, now);
    }

    pub fn stop(&mut self) {
        for module in self.modules.iter_mut() {
            module.stop();
        }
    }

    pub fn notify_all(&mut self, notification: &Notification, now: Instant) {
        for module in self.modules.iter_mut() {
            module.notification_received(notification, now);
        }
        self.pump(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.modules.iter().filter_map(|m| m.next_deadline()).min()
    }

    /// Fire due timers and run the resulting work to completion.
    pub fn tick(&mut self, now: Instant) {
        for module in self.modules.iter_mut() {
            module.on_timer(now);
        }
        self.pump(now);
    }

    /// Execute queued effects until no widget has anything left to ask for.
    fn pump(&mut self, now: Instant) {
        loop {
            let mut progressed = false;
            for idx in 0..self.modules.len() {
                for effect in self.modules[idx].take_effects() {
                    progressed = true;
                    self.apply(idx, effect, now);
                }
            }
            if !progressed {
                break;
            }
        }
    }

    fn apply(&mut self, idx: usize, effect: Effect, now: Instant) {
        match effect {
            Effect::Poll { token } => {
                debug!("{}: polling", self.modules[idx].identifier());
                let outcome = self.api.poll(&token);
                self.modules[idx].socket_notification_received(outcome, now);
            }
            Effect::Broadcast(snapshot) => {
                let notification = Notification::DataUpdate(snapshot);
                for (j, module) in self.modules.iter_mut().enumerate() {
                    if j != idx {
                        module.notification_received(&notification, now);
                    }
                }
            }
            Effect::UpdateDom { speed } => {
                debug!("{}: redraw ({}ms)", self.modules[idx].identifier(), speed.as_millis());
                self.render(idx);
            }
            Effect::Hide { speed } => {
                info!("{}: hiding ({}ms)", self.modules[idx].identifier(), speed.as_millis());
                self.modules[idx].suspend();
                let identifier = self.modules[idx].identifier().to_string();
                self.publish(identifier, String::new());
            }
            Effect::Show { speed } => {
                info!("{}: showing ({}ms)", self.modules[idx].identifier(), speed.as_millis());
                self.render(idx);
                self.modules[idx].resume(now);
            }
        }
    }

    fn render(&mut self, idx: usize) {
        let module = &self.modules[idx];
        let identifier = module.identifier().to_string();
        match module.get_dom(&self.renderer) {
            Ok(html) => self.publish(identifier, html),
            Err(e) => warn!("{}: render failed: {}", identifier, e),
        }
    }

    fn publish(&mut self, identifier: String, html: String) {
        if let Some(dir) = &self.output_dir {
            let path = dir.join(format!("{}.html", identifier));
            if let Err(e) = std::fs::write(&path, &html) {
                warn!("failed to write {}: {}", path.display(), e);
            }
        }
        self.rendered.insert(identifier, html);
    }

    /// Drive the dashboard until there is nothing left to wait for.
    ///
    /// Presence events arrive on `events`; once that channel closes the loop
    /// keeps serving timers on its own.
    pub fn run(&mut self, events: Receiver<HostEvent>) -> Result<(), String> {
        self.start(Instant::now());
        let mut input_open = true;

        loop {
            let deadline = self.next_deadline();
            let event = match (deadline, input_open) {
                (None, false) => {
                    info!("No timers pending and no input; stopping");
                    break;
                }
                (None, true) => events.recv().map_err(|_| RecvTimeoutError::Disconnected),
                (Some(d), true) => events.recv_timeout(d.saturating_duration_since(Instant::now())),
                (Some(d), false) => {
                    thread::sleep(d.saturating_duration_since(Instant::now()));
                    Err(RecvTimeoutError::Timeout)
                }
            };

            match event {
                Ok(HostEvent::Presence(present)) => {
                    debug!("Presence changed: {}", present);
                    self.notify_all(&Notification::UserPresence(present), Instant::now());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if input_open {
                        debug!("Presence input closed");
                    }
                    input_open = false;
                }
            }

            self.tick(Instant::now());
        }

        self.stop();
        Ok(())
    }
}

/// Interpret one line of presence input.
pub fn parse_presence(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "present" | "1" | "true" | "on" => Some(true),
        "absent" | "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// Read presence signals from stdin on a background thread.
pub fn spawn_presence_reader() -> Receiver<HostEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_presence(&line) {
                Some(present) => {
                    if tx.send(HostEvent::Presence(present)).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Ignoring presence input {:?}", line.trim()),
            }
        }
    });
    rx
}
