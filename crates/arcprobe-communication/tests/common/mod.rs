#![allow(dead_code)]

use arcprobe_communication::{PrinterHost, RequestChannel};
use arcprobe_settings::CheckerConfig;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

/// A command the fake printer was asked to send
#[derive(Debug, Clone)]
pub struct SentCommand {
    pub command: String,
    pub tags: BTreeSet<String>,
}

/// Fake host: answers commands from a reply table on its own thread
pub struct FakePrinter {
    channel: Mutex<Weak<RequestChannel>>,
    replies: Mutex<HashMap<String, Vec<String>>>,
    stale: Mutex<Vec<String>>,
    printing: AtomicBool,
    sent: Mutex<Vec<SentCommand>>,
}

impl FakePrinter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channel: Mutex::new(Weak::new()),
            replies: Mutex::new(HashMap::new()),
            stale: Mutex::new(Vec::new()),
            printing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Lines sent back after `command` goes out
    pub fn reply(&self, command: &str, lines: &[&str]) {
        self.replies.lock().unwrap().insert(
            command.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    /// Lines that arrive before any command goes out
    pub fn stale_lines(&self, lines: &[&str]) {
        *self.stale.lock().unwrap() = lines.iter().map(|l| l.to_string()).collect();
    }

    pub fn set_printing(&self, printing: bool) {
        self.printing.store(printing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_commands(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.command).collect()
    }
}

impl PrinterHost for FakePrinter {
    fn send_commands(&self, commands: &[String], tags: &BTreeSet<String>) {
        let channel = self.channel.lock().unwrap().clone();
        for command in commands {
            self.sent.lock().unwrap().push(SentCommand {
                command: command.clone(),
                tags: tags.clone(),
            });
            let stale = self.stale.lock().unwrap().clone();
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get(command)
                .cloned()
                .unwrap_or_default();
            let channel = channel.clone();
            let command = command.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                let Some(channel) = channel.upgrade() else {
                    return;
                };
                for line in &stale {
                    channel.on_response_line(line);
                }
                channel.on_command_about_to_send(&command);
                for line in &reply {
                    channel.on_response_line(line);
                }
            });
        }
    }

    fn is_printing(&self) -> bool {
        self.printing.load(Ordering::SeqCst)
    }
}

/// A channel wired to `printer`'s hooks
pub fn connect(printer: &Arc<FakePrinter>) -> Arc<RequestChannel> {
    let channel = Arc::new(RequestChannel::new(printer.clone()));
    *printer.channel.lock().unwrap() = Arc::downgrade(&channel);
    channel
}

/// Config rooted at `dir` with short timeouts
pub fn test_config(dir: &Path) -> CheckerConfig {
    CheckerConfig {
        request_timeout_ms: 2_000,
        probe_timeout_ms: 2_000,
        ..CheckerConfig::with_data_directory(dir)
    }
}
