//! Value-reconciliation controller for a device text field.
//!
//! [`TextFieldController`] owns the field's local edit state and merges it
//! with two asynchronous collaborators: a live-value feed (delivered as
//! [`PvUpdate`] events) and a set endpoint (dispatched as [`SetRequest`]s,
//! answered later as [`SetResponse`]s). All state transitions are discrete
//! reactions to events; nothing here blocks or spawns.
//!
//! The one correctness property everything hinges on: while `editing` is
//! true, a live update must never overwrite text the user is actively
//! typing. Live updates always refresh the non-editing fallback, so the
//! field snaps back to the device's truth the moment the edit session ends
//! without a commit.
//!
//! Stale set responses are a real hazard here - a commit dispatched and then
//! superseded by a newer one still answers eventually. Responses carry the
//! sequence number of the request they answer, and the controller ignores
//! any response that is not for its most recent dispatch.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::FieldDefaults;
use crate::error::FieldFault;
use crate::numfmt::{ceil_float, floor_float, formatted_round_float};
use crate::pv::{PvDescription, PvUpdate, PvValue, SetRequest, SetResponse};

/// Unit-conversion callback, device units in, display units out (or the
/// reverse).
pub type UnitConvert = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Dispatch callback for set requests. The sequence number identifies the
/// request so the eventual response can be correlated.
pub type SetDispatcher = Arc<dyn Fn(u64, SetRequest) -> Result<()> + Send + Sync>;

/// Input type the field accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputType {
    /// Numeric input (the default).
    #[default]
    Number,
    /// Free text input.
    Text,
}

/// Keys the controller distinguishes. Everything except Enter only matters
/// for its side effect of opening an edit session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    /// The commit key.
    Enter,
    /// Any other key.
    Other,
}

/// Per-instance configuration surface. All fields are optional with the
/// stated defaults; construct with [`FieldOptions::default`] and the
/// builder methods.
#[derive(Clone, Default)]
pub struct FieldOptions {
    /// Explicit label, overriding the name from the channel description.
    pub label: Option<String>,
    /// Suppress the label entirely.
    pub hide_label: bool,
    /// Suppress the unit everywhere.
    pub hide_unit: bool,
    /// Suppress the rendered limits band.
    pub hide_limits: bool,
    /// Append the unit to the label instead of the end adornment.
    pub unit_with_label: bool,
    /// Forward unit conversion (device units to display units).
    pub unit_convert: Option<UnitConvert>,
    /// Reverse unit conversion (display units back to device units).
    pub unit_reverse: Option<UnitConvert>,
    /// Significant figures override; negative disables rounding. Falls back
    /// to the configured global default when absent.
    pub signif_figures: Option<i32>,
    /// Explicit end-adornment text, overriding the unit.
    pub end_adornment: Option<String>,
    /// Write to this channel instead of the subscribed one.
    pub set_target: Option<String>,
    /// Input type, numeric or text.
    pub input_type: InputType,
    /// Rendered width in pixels.
    pub width: u32,
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOptions")
            .field("label", &self.label)
            .field("hide_label", &self.hide_label)
            .field("hide_unit", &self.hide_unit)
            .field("hide_limits", &self.hide_limits)
            .field("unit_with_label", &self.unit_with_label)
            .field("unit_convert", &self.unit_convert.is_some())
            .field("unit_reverse", &self.unit_reverse.is_some())
            .field("signif_figures", &self.signif_figures)
            .field("end_adornment", &self.end_adornment)
            .field("set_target", &self.set_target)
            .field("input_type", &self.input_type)
            .field("width", &self.width)
            .finish()
    }
}

impl FieldOptions {
    /// Default rendered width in pixels.
    pub const DEFAULT_WIDTH: u32 = 240;

    /// Create options with defaults (numeric input, width 240, nothing
    /// hidden, no overrides).
    pub fn new() -> Self {
        Self {
            width: Self::DEFAULT_WIDTH,
            ..Self::default()
        }
    }

    /// Set an explicit label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Suppress the label.
    pub fn hide_label(mut self) -> Self {
        self.hide_label = true;
        self
    }

    /// Suppress the unit.
    pub fn hide_unit(mut self) -> Self {
        self.hide_unit = true;
        self
    }

    /// Suppress the limits band.
    pub fn hide_limits(mut self) -> Self {
        self.hide_limits = true;
        self
    }

    /// Append the unit to the label instead of the end adornment.
    pub fn unit_with_label(mut self) -> Self {
        self.unit_with_label = true;
        self
    }

    /// Install a unit-conversion callback pair.
    pub fn with_unit_conversion(
        mut self,
        convert: impl Fn(f64) -> f64 + Send + Sync + 'static,
        reverse: impl Fn(f64) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.unit_convert = Some(Arc::new(convert));
        self.unit_reverse = Some(Arc::new(reverse));
        self
    }

    /// Override the significant-figures setting for this instance.
    pub fn with_signif_figures(mut self, decimals: i32) -> Self {
        self.signif_figures = Some(decimals);
        self
    }

    /// Set explicit end-adornment text.
    pub fn with_end_adornment(mut self, adornment: impl Into<String>) -> Self {
        self.end_adornment = Some(adornment.into());
        self
    }

    /// Write to an explicit channel instead of the subscribed one.
    pub fn with_set_target(mut self, target: impl Into<String>) -> Self {
        self.set_target = Some(target.into());
        self
    }

    /// Set the input type.
    pub fn with_input_type(mut self, input_type: InputType) -> Self {
        self.input_type = input_type;
        self
    }

    /// Set the rendered width in pixels.
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }
}

/// The field's state machine.
///
/// Drive it by calling the `on_*` event methods from whatever delivers the
/// events (an input widget, a subscription task, a test). Read the derived
/// state back through the accessor methods.
pub struct TextFieldController {
    /// Default write target (the subscribed channel identifier).
    target: String,
    opts: FieldOptions,
    default_signif_figures: Option<i32>,

    /// The user's in-progress, unvalidated text.
    temp_value: String,
    /// The non-editing fallback: the latest formatted live value.
    displaying_value: String,
    editing: bool,
    fault: Option<FieldFault>,

    lower_limit: Option<f64>,
    upper_limit: Option<f64>,
    pv_name: String,
    dtype: String,
    unit: String,

    fetch_loading: bool,
    commit_in_flight: bool,
    commit_seq: u64,

    dispatcher: Option<SetDispatcher>,
}

impl TextFieldController {
    /// Create a controller for the given channel.
    ///
    /// `defaults` carries the global configuration (default significant
    /// figures); the per-instance option in `opts` takes precedence.
    pub fn new(target: impl Into<String>, opts: FieldOptions, defaults: &FieldDefaults) -> Self {
        Self {
            target: target.into(),
            opts,
            default_signif_figures: defaults.default_signif_figures,
            temp_value: String::new(),
            displaying_value: String::new(),
            editing: false,
            fault: None,
            lower_limit: None,
            upper_limit: None,
            pv_name: String::new(),
            dtype: String::new(),
            unit: String::new(),
            fetch_loading: false,
            commit_in_flight: false,
            commit_seq: 0,
            dispatcher: None,
        }
    }

    /// Connect the set-request dispatcher.
    ///
    /// Commits are fire-and-forget from the controller's perspective: the
    /// dispatcher hands the request to the endpoint and the verdict arrives
    /// later via [`Self::on_set_response`]. A dispatcher error counts as a
    /// dispatch failure and faults the field immediately.
    pub fn connect_dispatcher(
        &mut self,
        dispatcher: impl Fn(u64, SetRequest) -> Result<()> + Send + Sync + 'static,
    ) {
        self.dispatcher = Some(Arc::new(dispatcher));
    }

    // -------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------

    /// Live-update event from the subscription feed.
    ///
    /// Numeric values run through the formatting pipeline (unit conversion,
    /// then significant-figure rounding when configured); strings pass
    /// through verbatim. The edit buffer is only overwritten outside an
    /// edit session; the fallback always is.
    pub fn on_update(&mut self, update: &PvUpdate) {
        let text = match &update.value {
            PvValue::Number(n) => self.format_live(*n),
            PvValue::Text(s) => s.clone(),
        };
        self.assign_live(text);
        self.apply_description(&update.description);
        self.revalidate();
    }

    /// Focus event: open an edit session and clear any fault.
    pub fn on_focus(&mut self) {
        self.editing = true;
        self.clear_fault();
    }

    /// Change event: overwrite the edit buffer with the typed text.
    ///
    /// Unconditional on purpose - input methods can deliver a change before
    /// the focus transition, and that keystroke still edits the buffer.
    pub fn on_change(&mut self, text: impl Into<String>) {
        self.temp_value = text.into();
        self.revalidate();
    }

    /// Key-down event.
    ///
    /// Any key opens an edit session if one is not already active (clearing
    /// the fault, exactly as focus does). Enter additionally commits, unless
    /// a fault is set, in which case it is a no-op.
    pub fn on_key_down(&mut self, key: Key) {
        if !self.editing {
            self.editing = true;
            self.clear_fault();
        }

        if key == Key::Enter {
            if self.fault.is_some() {
                debug!(pv = %self.target, "commit blocked by fault");
                return;
            }
            self.commit();
            self.editing = false;
        }
    }

    /// Blur event: end the edit session and silently discard unsaved edits.
    pub fn on_blur(&mut self) {
        self.editing = false;
        self.temp_value = self.displaying_value.clone();
        self.revalidate();
    }

    /// Commit-response event.
    ///
    /// Responses for anything but the most recent dispatch are stale and
    /// ignored. An absent or successful response clears the fault; a
    /// rejection faults the field with the device's message.
    pub fn on_set_response(&mut self, seq: u64, response: Option<SetResponse>) {
        if seq != self.commit_seq {
            debug!(
                pv = %self.target,
                seq,
                latest = self.commit_seq,
                "ignoring stale set response"
            );
            return;
        }
        self.commit_in_flight = false;

        match response {
            None => self.fault = None,
            Some(r) if r.success => self.fault = None,
            Some(r) => {
                self.fault = Some(match r.message {
                    Some(message) => FieldFault::Rejected(message),
                    None => FieldFault::Dispatch,
                });
            }
        }
    }

    /// Fetch-error event from the subscription feed.
    pub fn on_fetch_error(&mut self) {
        self.fault = Some(FieldFault::Fetch);
    }

    /// Feed-reported loading flag; ORed with the commit-in-flight flag in
    /// [`Self::is_loading`].
    pub fn set_fetch_loading(&mut self, loading: bool) {
        self.fetch_loading = loading;
    }

    // -------------------------------------------------------------------
    // Derived state
    // -------------------------------------------------------------------

    /// The text the field renders: the edit buffer during an edit session,
    /// the formatted live value otherwise.
    pub fn display_value(&self) -> &str {
        if self.editing {
            &self.temp_value
        } else {
            &self.displaying_value
        }
    }

    /// The edit buffer, regardless of editing state.
    pub fn edit_buffer(&self) -> &str {
        &self.temp_value
    }

    /// Whether an edit session is active.
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Whether a fetch or a commit is in flight.
    pub fn is_loading(&self) -> bool {
        self.fetch_loading || self.commit_in_flight
    }

    /// Current fault, if any.
    pub fn fault(&self) -> Option<&FieldFault> {
        self.fault.as_ref()
    }

    /// Rendered fault message, if any.
    pub fn fault_message(&self) -> Option<String> {
        self.fault.as_ref().map(FieldFault::to_string)
    }

    /// The limits band after unit conversion and outward rounding.
    pub fn limits(&self) -> (Option<f64>, Option<f64>) {
        (self.lower_limit, self.upper_limit)
    }

    /// The rendered label, if any.
    ///
    /// Suppressed by the hide-label flag; otherwise the explicit override
    /// or the channel name, with the unit appended in parentheses when the
    /// unit-with-label flag is set and the unit is non-empty and not hidden.
    pub fn label_text(&self) -> Option<String> {
        if self.opts.hide_label {
            return None;
        }
        let base = self
            .opts
            .label
            .clone()
            .unwrap_or_else(|| self.pv_name.clone());
        if self.opts.unit_with_label && !self.unit.is_empty() && !self.opts.hide_unit {
            Some(format!("{} ({})", base, self.unit))
        } else {
            Some(base)
        }
    }

    /// The end-adornment text: the explicit override if set, else the unit
    /// when it is neither moved to the label nor hidden.
    pub fn end_adornment(&self) -> Option<String> {
        if let Some(adornment) = &self.opts.end_adornment {
            return Some(adornment.clone());
        }
        if !self.opts.unit_with_label && !self.opts.hide_unit && !self.unit.is_empty() {
            return Some(self.unit.clone());
        }
        None
    }

    /// Whether the limits band should be rendered: not hidden, at least one
    /// bound defined, and the pair not both exactly zero.
    pub fn limits_visible(&self) -> bool {
        if self.opts.hide_limits {
            return false;
        }
        if self.lower_limit.is_none() && self.upper_limit.is_none() {
            return false;
        }
        !(self.lower_limit == Some(0.0) && self.upper_limit == Some(0.0))
    }

    /// The options this controller was built with.
    pub fn options(&self) -> &FieldOptions {
        &self.opts
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    /// Effective significant figures: instance override, else the global
    /// default. Negative disables rounding.
    fn effective_signif_figures(&self) -> Option<i32> {
        self.opts
            .signif_figures
            .or(self.default_signif_figures)
            .filter(|d| *d >= 0)
    }

    fn convert(&self, value: f64) -> f64 {
        match &self.opts.unit_convert {
            Some(cb) => cb(value),
            None => value,
        }
    }

    fn reverse(&self, value: f64) -> f64 {
        match &self.opts.unit_reverse {
            Some(cb) => cb(value),
            None => value,
        }
    }

    /// Formatting pipeline for a numeric live value: convert, then round to
    /// significant figures when configured, then render.
    fn format_live(&self, value: f64) -> String {
        let converted = self.convert(value);
        match self.effective_signif_figures() {
            Some(decimals) => formatted_round_float(converted, decimals),
            None => converted.to_string(),
        }
    }

    /// While editing, the live value must not clobber the edit buffer; the
    /// fallback is always refreshed.
    fn assign_live(&mut self, text: String) {
        if !self.editing {
            self.temp_value.clone_from(&text);
        }
        self.displaying_value = text;
    }

    fn apply_description(&mut self, description: &PvDescription) {
        self.pv_name.clone_from(&description.name);
        self.dtype.clone_from(&description.dtype);
        self.unit.clone_from(&description.units);

        self.lower_limit = self.convert_bound(description.lower_limit(), Bound::Lower);
        self.upper_limit = self.convert_bound(description.upper_limit(), Bound::Upper);
    }

    /// Bounds run through the same pipeline as live values, rounded inward
    /// (lower ceiled, upper floored) so the displayed band never admits a
    /// value the device would reject.
    fn convert_bound(&self, raw: Option<f64>, bound: Bound) -> Option<f64> {
        let converted = self.convert(raw?);
        match self.effective_signif_figures() {
            Some(decimals) => match bound {
                Bound::Lower => ceil_float(converted, decimals),
                Bound::Upper => floor_float(converted, decimals),
            },
            None => Some(converted),
        }
    }

    /// Validation pass, run whenever the edit buffer or the limits change.
    ///
    /// Skipped entirely when no limits are configured - both bounds absent,
    /// or both exactly zero (a zero/zero pair means "no limits", not a
    /// [0, 0] range). An unparseable buffer compares out of nothing, so it
    /// clears the fault just as an in-band value does.
    fn revalidate(&mut self) {
        let configured = match (self.lower_limit, self.upper_limit) {
            (None, None) => false,
            (Some(lo), Some(hi)) => lo != 0.0 || hi != 0.0,
            _ => true,
        };
        if !configured {
            return;
        }

        let Ok(parsed) = self.temp_value.trim().parse::<f64>() else {
            self.fault = None;
            return;
        };

        if let Some(lo) = self.lower_limit {
            if parsed < lo {
                self.fault = Some(FieldFault::TooLow);
                return;
            }
        }
        if let Some(hi) = self.upper_limit {
            if parsed > hi {
                self.fault = Some(FieldFault::TooHigh);
                return;
            }
        }
        self.fault = None;
    }

    /// Build and dispatch the set request.
    ///
    /// String channels send the edit buffer verbatim; numeric channels send
    /// the reverse-converted parsed float. An unparseable numeric buffer is
    /// treated as a dispatch failure.
    fn commit(&mut self) {
        let value = if self.dtype == "string" {
            PvValue::Text(self.temp_value.clone())
        } else {
            match self.temp_value.trim().parse::<f64>() {
                Ok(parsed) => PvValue::Number(self.reverse(parsed)),
                Err(_) => {
                    warn!(
                        pv = %self.target,
                        buffer = %self.temp_value,
                        "commit aborted: buffer does not parse as a number"
                    );
                    self.fault = Some(FieldFault::Dispatch);
                    return;
                }
            }
        };

        let target = self
            .opts
            .set_target
            .clone()
            .unwrap_or_else(|| self.target.clone());
        let request = SetRequest { target, value };

        self.commit_seq += 1;
        self.commit_in_flight = true;
        debug!(seq = self.commit_seq, request = ?request, "dispatching set request");

        match &self.dispatcher {
            Some(dispatch) => {
                if let Err(err) = dispatch(self.commit_seq, request) {
                    warn!(error = %err, "set dispatch failed");
                    self.commit_in_flight = false;
                    self.fault = Some(FieldFault::Dispatch);
                }
            }
            None => {
                warn!(pv = %self.target, "no dispatcher connected, dropping set request");
                self.commit_in_flight = false;
            }
        }
    }

    fn clear_fault(&mut self) {
        self.fault = None;
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Lower,
    Upper,
}
