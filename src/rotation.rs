//! Now-playing overlay panel rotation.
//!
//! The overlay cycles between a "current track" panel, a "next track"
//! panel, and a "how to request" panel. Which panels are enabled depends on
//! data availability and settings; how they cycle depends on the display
//! mode. The machine is pure: callers feed it inputs and drive time through
//! [`RotationMachine::tick`], sleeping for [`RotationMachine::next_deadline`]
//! between ticks.
//!
//! Restart rules: the rotation restarts from the first panel when the
//! enabled-panel set or any timing setting changes, or when the identity of
//! the playing item changes. Cosmetic updates (elapsed-time ticking within
//! the same item) must not restart rotation or reset the hide timer.

use std::time::Duration;

use crate::config::DisplayMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Panel {
    Current,
    Next,
    Instruction,
}

/// Everything the panel-set computation depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RotationInputs {
    pub has_current: bool,
    /// A second queue entry exists to preview.
    pub has_next: bool,
    pub show_next: bool,
    pub show_add_message: bool,
    pub display_mode: DisplayMode,
    pub panel_duration: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotationView {
    Hidden,
    Showing(Panel),
}

/// The dynamic enabled-panel set: current iff something is playing, next
/// iff enabled and available, instruction iff enabled; a current item
/// force-includes its panel when the set would otherwise be empty, and the
/// instruction panel is the last resort.
pub fn enabled_panels(inputs: &RotationInputs) -> Vec<Panel> {
    let mut panels = Vec::new();
    if inputs.has_current {
        panels.push(Panel::Current);
    }
    if inputs.show_next && inputs.has_next {
        panels.push(Panel::Next);
    }
    if inputs.show_add_message {
        panels.push(Panel::Instruction);
    }
    if panels.is_empty() && inputs.has_current {
        panels.push(Panel::Current);
    }
    if panels.is_empty() {
        panels.push(Panel::Instruction);
    }
    panels
}

#[derive(Clone, Debug)]
pub struct RotationMachine {
    panels: Vec<Panel>,
    index: usize,
    mode: DisplayMode,
    duration: Duration,
    hidden: bool,
    last_inputs: Option<RotationInputs>,
}

impl Default for RotationMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationMachine {
    pub fn new() -> Self {
        Self {
            panels: Vec::new(),
            index: 0,
            mode: DisplayMode::Always,
            duration: Duration::from_secs(3),
            hidden: true,
            last_inputs: None,
        }
    }

    pub fn view(&self) -> RotationView {
        if self.hidden {
            RotationView::Hidden
        } else {
            RotationView::Showing(self.panels[self.index])
        }
    }

    /// How long the current panel stays up before [`tick`](Self::tick)
    /// should be called. `None` means the view is stable (hidden, or a
    /// single always-mode panel shown indefinitely).
    pub fn next_deadline(&self) -> Option<Duration> {
        if self.hidden {
            return None;
        }
        if self.mode == DisplayMode::Always && self.panels.len() == 1 {
            return None;
        }
        Some(self.duration)
    }

    /// Feed fresh inputs. Restarts only when the enabled set or timing
    /// changed, or when the caller observed a playing-item identity change;
    /// anything else leaves the rotation untouched.
    pub fn update(&mut self, inputs: RotationInputs, identity_changed: bool) {
        let set_changed = match &self.last_inputs {
            Some(prev) => {
                enabled_panels(prev) != enabled_panels(&inputs)
                    || prev.display_mode != inputs.display_mode
                    || prev.panel_duration != inputs.panel_duration
            }
            None => true,
        };
        self.last_inputs = Some(inputs);
        if set_changed || identity_changed {
            self.restart(inputs);
        }
    }

    fn restart(&mut self, inputs: RotationInputs) {
        self.panels = enabled_panels(&inputs);
        self.index = 0;
        self.mode = inputs.display_mode;
        self.duration = inputs.panel_duration;
        self.hidden = false;
    }

    /// The per-panel timer fired: advance, wrapping forever in always mode,
    /// hiding after the last panel in once mode.
    pub fn tick(&mut self) {
        if self.hidden {
            return;
        }
        match self.mode {
            DisplayMode::Always => {
                if self.panels.len() > 1 {
                    self.index = (self.index + 1) % self.panels.len();
                }
            }
            DisplayMode::Once => {
                if self.index + 1 < self.panels.len() {
                    self.index += 1;
                } else {
                    self.hidden = true;
                }
            }
        }
    }
}
