//! Request/response bridge over the printer's command stream
//!
//! The host owns a single line-oriented command stream. A [`RequestChannel`] injects
//! a diagnostic request into it and blocks until the host's stream hooks have seen
//! the matching response, or until a timeout elapses.
//!
//! Three locks are involved:
//! - the cycle lock, held for a whole send/wait cycle so requests never interleave
//! - the slot lock, held only while the pending request is read or written
//! - the signal lock, internal to [`ResponseSignal`]
//!
//! The slot lock is never held across the host send call or the wait. Locks are
//! always taken slot first, then signal.

use arcprobe_core::ChannelError;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Span;

/// Tag added to every command this crate sends
pub const MARKER_TAG: &str = "arc_welder";

/// Predicate over a command or a response line
pub type LinePredicate = fn(&str) -> bool;

/// Boundary to the printer host
///
/// Implemented by whatever owns the command stream. The host calls back into
/// [`RequestChannel::on_command_about_to_send`] and
/// [`RequestChannel::on_response_line`] from its own threads.
pub trait PrinterHost: Send + Sync {
    /// Queue commands on the command stream
    fn send_commands(&self, commands: &[String], tags: &BTreeSet<String>);

    /// Whether a print job is running
    fn is_printing(&self) -> bool;
}

/// True if the line is the generic `ok` acknowledgement
pub fn is_acknowledgement(line: &str) -> bool {
    line.trim().to_uppercase().starts_with("OK")
}

/// A request in flight and the response collected so far
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub name: String,
    pub commands: Vec<String>,
    /// Recognises the request's own command on its way out
    pub sent_check: LinePredicate,
    /// Recognises the first line of the response
    pub response_check: LinePredicate,
    /// Keep collecting until `ok` after the first matching line
    pub wait_for_ok: bool,
    /// Append the line that ends the response
    pub append_final_response: bool,
    pub tags: BTreeSet<String>,
    pub gcode_sent: bool,
    pub response: Vec<String>,
    pub response_started: bool,
    pub response_ended: bool,
}

impl PendingRequest {
    pub fn new(
        name: impl Into<String>,
        commands: Vec<String>,
        sent_check: LinePredicate,
        response_check: LinePredicate,
    ) -> Self {
        Self {
            name: name.into(),
            commands,
            sent_check,
            response_check,
            wait_for_ok: false,
            append_final_response: false,
            tags: BTreeSet::new(),
            gcode_sent: false,
            response: Vec::new(),
            response_started: false,
            response_ended: false,
        }
    }

    pub fn wait_for_ok(mut self, wait_for_ok: bool) -> Self {
        self.wait_for_ok = wait_for_ok;
        self
    }

    pub fn append_final_response(mut self, append: bool) -> Self {
        self.append_final_response = append;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// True once the response was sealed rather than cut off by a timeout
    pub fn is_complete(&self) -> bool {
        self.response_ended
    }

    fn is_waiting_for_send(&self) -> bool {
        !self.gcode_sent
    }

    /// Feed one trimmed response line; returns true when the response ends
    fn accept(&mut self, line: &str) -> bool {
        let matched = if !self.response_started {
            if (self.response_check)(line) {
                tracing::trace!("Response found for request: {}", self.name);
                self.response_started = true;
                if !self.wait_for_ok {
                    self.response_ended = true;
                }
                true
            } else {
                false
            }
        } else {
            if is_acknowledgement(line) {
                tracing::trace!("OK found, response ended.");
                self.response_ended = true;
            }
            true
        };

        if matched && (!self.response_ended || self.append_final_response) {
            self.response.push(line.to_string());
        }
        matched && self.response_ended
    }
}

/// One-shot binary signal
#[derive(Debug)]
struct ResponseSignal {
    set: Mutex<bool>,
    condvar: Condvar,
}

impl ResponseSignal {
    fn new() -> Self {
        Self {
            set: Mutex::new(true),
            condvar: Condvar::new(),
        }
    }

    fn set(&self) {
        *self.set.lock() = true;
        self.condvar.notify_all();
    }

    fn clear(&self) {
        *self.set.lock() = false;
    }

    /// Wait until set or until `timeout` elapses; returns whether it was set
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.set.lock();
        while !*set {
            if self.condvar.wait_until(&mut set, deadline).timed_out() {
                return *set;
            }
        }
        true
    }
}

/// Clears the pending slot however the cycle ends
struct SlotGuard<'a> {
    slot: &'a Mutex<Option<PendingRequest>>,
}

impl SlotGuard<'_> {
    fn take(self) -> Option<PendingRequest> {
        self.slot.lock().take()
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

/// Synchronous request/response bridge over the host's command stream
pub struct RequestChannel {
    host: Arc<dyn PrinterHost>,
    cycle: Mutex<()>,
    pending: Mutex<Option<PendingRequest>>,
    signal: ResponseSignal,
    span: Span,
}

impl std::fmt::Debug for RequestChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestChannel")
            .field("pending", &self.pending.lock().as_ref().map(|r| r.name.clone()))
            .finish()
    }
}

impl RequestChannel {
    pub fn new(host: Arc<dyn PrinterHost>) -> Self {
        Self {
            host,
            cycle: Mutex::new(()),
            pending: Mutex::new(None),
            signal: ResponseSignal::new(),
            span: tracing::info_span!("request_channel"),
        }
    }

    /// Log under `span` instead of the default channel span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_printing(&self) -> bool {
        self.host.is_printing()
    }

    /// True while a request occupies the slot
    pub fn has_pending_request(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Send a request and wait for its response
    ///
    /// Blocks behind any cycle already in progress. The returned request carries
    /// whatever response was collected; [`PendingRequest::is_complete`] is false when
    /// the wait timed out.
    pub fn send(
        &self,
        request: PendingRequest,
        timeout: Duration,
    ) -> Result<PendingRequest, ChannelError> {
        let _enter = self.span.enter();
        let _cycle = self.cycle.lock();

        tracing::info!(
            "Sending a {} request to the printer with a {}ms timeout.",
            request.name,
            timeout.as_millis()
        );

        if self.host.is_printing() {
            tracing::error!("Cannot send a request while printing");
            return Err(ChannelError::PrintingInProgress);
        }

        let mut request = request.with_tag(MARKER_TAG);
        let commands = request.commands.clone();
        let tags = request.tags.clone();
        request.gcode_sent = false;
        let template = request.clone();

        {
            let mut slot = self.pending.lock();
            *slot = Some(request);
            self.signal.clear();
        }
        let guard = SlotGuard {
            slot: &self.pending,
        };

        tracing::info!(
            "Sending the following commands for the {} request: {}",
            template.name,
            commands.join(", ")
        );
        self.host.send_commands(&commands, &tags);

        if !self.signal.wait(timeout) {
            tracing::error!("A timeout occurred while waiting for a response from the printer.");
            self.signal.set();
        }

        // The slot is only emptied by this cycle, so the template is never used in practice.
        Ok(guard.take().unwrap_or(template))
    }

    /// Hook: the host is about to put `command` on the wire
    pub fn on_command_about_to_send(&self, command: &str) {
        let _enter = self.span.enter();
        self.guarded("on_command_about_to_send", || {
            let mut slot = self.pending.lock();
            let Some(request) = slot.as_mut() else {
                return;
            };
            if request.response_ended || !request.is_waiting_for_send() {
                return;
            }
            let command = command.trim();
            if (request.sent_check)(command) {
                request.gcode_sent = true;
                tracing::trace!("Gcode sent for request: {}, gcode: {}", request.name, command);
            } else {
                tracing::trace!(
                    "Gcode sent check failed for request: {}, gcode: {}",
                    request.name,
                    command
                );
            }
        });
    }

    /// Hook: the host received `line` from the printer
    ///
    /// Always hands the line back unchanged.
    pub fn on_response_line<'a>(&self, line: &'a str) -> &'a str {
        let _enter = self.span.enter();
        self.guarded("on_response_line", || {
            let mut slot = self.pending.lock();
            let Some(request) = slot.as_mut() else {
                return;
            };
            if request.response_ended {
                return;
            }
            let clean = line.trim();
            tracing::trace!("Response received: {}", clean);
            if request.is_waiting_for_send() {
                tracing::trace!("Waiting for request to be sent, discarding: {}", clean);
                return;
            }
            // Signalled under the slot lock so a late set cannot reach the next cycle.
            if request.accept(clean) {
                tracing::trace!("Response complete, triggering signal.");
                self.signal.set();
            }
        });
        line
    }

    /// Run a hook body, logging instead of unwinding into the host
    fn guarded(&self, hook: &str, body: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
            tracing::error!(
                "{}: an error occurred while checking the printer response: {}",
                hook,
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m115_sent(command: &str) -> bool {
        command == "M115"
    }

    fn m115_response(line: &str) -> bool {
        line.contains("FIRMWARE_NAME")
    }

    #[test]
    fn test_acknowledgement() {
        assert!(is_acknowledgement("ok"));
        assert!(is_acknowledgement("  OK T:20.0 /0.0"));
        assert!(!is_acknowledgement("echo:Unknown command"));
    }

    #[test]
    fn test_accept_waits_for_ok() {
        let mut request =
            PendingRequest::new("M115", vec!["M115".into()], m115_sent, m115_response)
                .wait_for_ok(true);
        assert!(!request.accept("echo: busy"));
        assert!(request.response.is_empty());
        assert!(!request.accept("FIRMWARE_NAME:Marlin 2.0.7.2"));
        assert!(!request.accept("Cap:ARCS:1"));
        assert!(request.accept("ok"));
        assert_eq!(request.response, vec!["FIRMWARE_NAME:Marlin 2.0.7.2", "Cap:ARCS:1"]);
        assert!(request.is_complete());
    }

    #[test]
    fn test_accept_first_match_ends_and_keeps_final_line() {
        let mut request = PendingRequest::new(
            "G2",
            vec!["G2".into()],
            |c| c == "G2",
            |l| l.starts_with("echo:Unknown"),
        )
        .append_final_response(true);
        assert!(request.accept("echo:Unknown command: \"G2\""));
        assert_eq!(request.response, vec!["echo:Unknown command: \"G2\""]);
    }

    #[test]
    fn test_signal_wait_times_out() {
        let signal = ResponseSignal::new();
        signal.clear();
        assert!(!signal.wait(Duration::from_millis(20)));
        signal.set();
        assert!(signal.wait(Duration::from_millis(20)));
    }

    struct IdleHost;

    impl PrinterHost for IdleHost {
        fn send_commands(&self, _commands: &[String], _tags: &BTreeSet<String>) {}

        fn is_printing(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_only_the_open_request_sets_the_signal() {
        let channel = RequestChannel::new(Arc::new(IdleHost));
        channel.signal.clear();

        // Cycle already over: the slot is empty
        channel.on_response_line("ok");
        assert!(!channel.signal.wait(Duration::ZERO));

        let mut request =
            PendingRequest::new("M115", vec!["M115".into()], m115_sent, m115_response)
                .wait_for_ok(true);
        request.gcode_sent = true;
        *channel.pending.lock() = Some(request);

        channel.on_response_line("FIRMWARE_NAME:Marlin 2.0.7.2");
        assert!(!channel.signal.wait(Duration::ZERO));
        channel.on_response_line("ok");
        assert!(channel.signal.wait(Duration::ZERO));

        // A completed request in the slot ignores further lines
        channel.signal.clear();
        channel.on_response_line("ok");
        assert!(!channel.signal.wait(Duration::ZERO));
        assert_eq!(
            channel.pending.lock().as_ref().map(|r| r.response.clone()),
            Some(vec!["FIRMWARE_NAME:Marlin 2.0.7.2".to_string()])
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
