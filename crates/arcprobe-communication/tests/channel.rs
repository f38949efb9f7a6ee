mod common;

use arcprobe_communication::{identification_request, probe_request, PendingRequest, MARKER_TAG};
use arcprobe_core::ChannelError;
use common::{connect, FakePrinter};
use std::thread;
use std::time::Duration;

#[test]
fn test_collects_until_ok() {
    let printer = FakePrinter::new();
    printer.reply(
        "M115",
        &["FIRMWARE_NAME:Marlin 2.0.7.2", "Cap:ARCS:1", "ok", "T:21.0 /0.0"],
    );
    let channel = connect(&printer);

    let request = channel
        .send(identification_request(), Duration::from_secs(2))
        .unwrap();
    assert!(request.is_complete());
    assert_eq!(request.response, vec!["FIRMWARE_NAME:Marlin 2.0.7.2", "Cap:ARCS:1"]);
    assert!(!channel.has_pending_request());

    let sent = printer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].command, "M115");
    assert!(sent[0].tags.contains(MARKER_TAG));
}

#[test]
fn test_lines_before_send_are_discarded() {
    let printer = FakePrinter::new();
    printer.stale_lines(&["FIRMWARE_NAME:Stale 1.0", "ok"]);
    printer.reply("M115", &["FIRMWARE_NAME:Marlin 2.0.7.2", "ok"]);
    let channel = connect(&printer);

    let request = channel
        .send(identification_request(), Duration::from_secs(2))
        .unwrap();
    assert!(request.is_complete());
    assert_eq!(request.response, vec!["FIRMWARE_NAME:Marlin 2.0.7.2"]);
}

#[test]
fn test_probe_keeps_final_line() {
    let printer = FakePrinter::new();
    printer.reply("G2", &["echo:busy: processing", "G2/G3 bad parameters", "ok"]);
    let channel = connect(&printer);

    let request = channel
        .send(probe_request(), Duration::from_secs(2))
        .unwrap();
    assert!(request.is_complete());
    assert_eq!(request.response, vec!["G2/G3 bad parameters"]);
}

#[test]
fn test_timeout_returns_partial_response() {
    let printer = FakePrinter::new();
    printer.reply("M115", &["FIRMWARE_NAME:Marlin 2.0.7.2"]);
    let channel = connect(&printer);

    let request = channel
        .send(identification_request(), Duration::from_millis(200))
        .unwrap();
    assert!(!request.is_complete());
    assert_eq!(request.response, vec!["FIRMWARE_NAME:Marlin 2.0.7.2"]);
    assert!(!channel.has_pending_request());
}

#[test]
fn test_refuses_while_printing() {
    let printer = FakePrinter::new();
    printer.set_printing(true);
    let channel = connect(&printer);

    let err = channel
        .send(identification_request(), Duration::from_secs(2))
        .unwrap_err();
    assert_eq!(err, ChannelError::PrintingInProgress);
    assert!(printer.sent().is_empty());
}

#[test]
fn test_hooks_without_request_pass_lines_through() {
    let printer = FakePrinter::new();
    let channel = connect(&printer);

    channel.on_command_about_to_send("G28");
    assert_eq!(channel.on_response_line("ok\n"), "ok\n");
    assert!(!channel.has_pending_request());
}

fn is_m115(command: &str) -> bool {
    command == "M115"
}

fn malformed_line(_line: &str) -> bool {
    panic!("malformed response line")
}

#[test]
fn test_panic_in_response_check_is_contained() {
    let printer = FakePrinter::new();
    let channel = connect(&printer);
    let request = PendingRequest::new("M115", vec!["M115".into()], is_m115, malformed_line);

    thread::scope(|scope| {
        let sender = scope.spawn(|| channel.send(request, Duration::from_millis(500)));
        while !channel.has_pending_request() {
            thread::sleep(Duration::from_millis(1));
        }
        channel.on_command_about_to_send("M115");
        assert_eq!(
            channel.on_response_line("FIRMWARE_NAME:Marlin 2.0.7.2\n"),
            "FIRMWARE_NAME:Marlin 2.0.7.2\n"
        );

        let request = sender.join().unwrap().unwrap();
        assert!(!request.is_complete());
        assert!(request.response.is_empty());
    });
    assert!(!channel.has_pending_request());

    printer.reply("M115", &["FIRMWARE_NAME:Marlin 2.0.7.2", "ok"]);
    let request = channel
        .send(identification_request(), Duration::from_secs(2))
        .unwrap();
    assert!(request.is_complete());
    assert_eq!(request.response, vec!["FIRMWARE_NAME:Marlin 2.0.7.2"]);
}
