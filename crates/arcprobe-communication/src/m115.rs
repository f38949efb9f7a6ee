//! M115 identification response parser
//!
//! The first line carries `KEY:value` pairs separated by whitespace, e.g.
//! `FIRMWARE_NAME:Marlin 2.0.7.2 SOURCE_CODE_URL:github.com/MarlinFirmware/Marlin`.
//! Following lines may carry `Cap:NAME:VALUE` extended capabilities, which are
//! merged over any found on line 1 unless line 1 has its own
//! `EXTENDED_CAPABILITIES_REPORT` field.
//!
//! Smoothieware instead reports comma separated pairs on one line, with extended
//! capabilities prefixed by `X-`. Malyan firmware reports `NAME.` instead of
//! `NAME:`.

use arcprobe_core::{ParsedResponse, CAPABILITIES_KEY};
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

fn key_regex() -> &'static Regex {
    static KEY_REGEX: OnceLock<Regex> = OnceLock::new();
    KEY_REGEX.get_or_init(|| Regex::new(r"\s*([A-Z0-9_]+):\s*").expect("invalid regex pattern"))
}

fn capability_regex() -> &'static Regex {
    static CAPABILITY_REGEX: OnceLock<Regex> = OnceLock::new();
    CAPABILITY_REGEX.get_or_init(|| {
        Regex::new(r"Cap:([A-Z0-9_]+):([A-Z0-9_]+)\s*").expect("invalid regex pattern")
    })
}

/// Parse the raw lines of an M115 response
///
/// Returns an empty [`ParsedResponse`] when nothing could be extracted.
pub fn parse_response(lines: &[String]) -> ParsedResponse {
    let mut parsed = ParsedResponse::new();
    let Some(first) = lines.first() else {
        return parsed;
    };

    let first = malyan_fix(first.trim());
    if first.contains("FIRMWARE_NAME:Smoothieware") {
        parse_comma_separated(&first, &mut parsed);
    } else {
        parse_key_values(&first, &mut parsed);
    }

    if lines.len() > 1 && !parsed.fields.contains_key(CAPABILITIES_KEY) {
        let rest = lines[1..].join("\n");
        for caps in capability_regex().captures_iter(&rest) {
            if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
                parsed
                    .capabilities
                    .insert(key.as_str().to_string(), value.as_str().to_string());
            }
        }
    }

    parsed
}

fn malyan_fix(line: &str) -> Cow<'_, str> {
    match line.strip_prefix("NAME.") {
        Some(rest) => Cow::Owned(format!("NAME:{rest}")),
        None => Cow::Borrowed(line),
    }
}

/// Split on `KEY:` tokens; each value runs to the next key. Text before the first
/// key is dropped.
fn parse_key_values(line: &str, parsed: &mut ParsedResponse) {
    let keys: Vec<_> = key_regex().captures_iter(line).collect();
    for (index, caps) in keys.iter().enumerate() {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = keys
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map_or(line.len(), |next| next.start());
        let value = line[whole.end()..end].trim();
        parsed
            .fields
            .insert(key.as_str().to_string(), value.to_string());
    }
}

fn parse_comma_separated(line: &str, parsed: &mut ParsedResponse) {
    for param in line.split(',') {
        let (key, value) = match param.split_once(':') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (param.trim(), ""),
        };
        if key.is_empty() {
            continue;
        }
        match key.strip_prefix("X-") {
            Some(capability) if !capability.trim().is_empty() => {
                parsed
                    .capabilities
                    .insert(capability.trim().to_string(), value.to_string());
            }
            _ => {
                parsed.fields.insert(key.to_string(), value.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_marlin_with_capabilities() {
        let parsed = parse_response(&lines(&[
            "FIRMWARE_NAME:Marlin 2.0.7.2 SOURCE_CODE_URL:github.com/MarlinFirmware/Marlin PROTOCOL_VERSION:1.0 MACHINE_TYPE:Ender-3 EXTRUDER_COUNT:1",
            "Cap:SERIAL_XON_XOFF:0",
            "Cap:ARCS:1",
        ]));
        assert_eq!(parsed.get("FIRMWARE_NAME"), Some("Marlin 2.0.7.2"));
        assert_eq!(
            parsed.get("SOURCE_CODE_URL"),
            Some("github.com/MarlinFirmware/Marlin")
        );
        assert_eq!(parsed.get("MACHINE_TYPE"), Some("Ender-3"));
        assert_eq!(parsed.get("EXTRUDER_COUNT"), Some("1"));
        assert_eq!(parsed.capability_flag("ARCS"), Some(true));
        assert_eq!(parsed.capability("SERIAL_XON_XOFF"), Some("0"));
    }

    #[test]
    fn test_prefix_text_is_dropped() {
        let parsed = parse_response(&lines(&["echo: FIRMWARE_NAME:Klipper"]));
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.get("FIRMWARE_NAME"), Some("Klipper"));
    }

    #[test]
    fn test_malyan_name_prefix() {
        let parsed = parse_response(&lines(&["NAME. Malyan VER: 4.0 MODEL: M200"]));
        assert_eq!(parsed.get("NAME"), Some("Malyan"));
        assert_eq!(parsed.get("VER"), Some("4.0"));
        assert_eq!(parsed.get("MODEL"), Some("M200"));
    }

    #[test]
    fn test_smoothieware_comma_separated() {
        let parsed = parse_response(&lines(&[
            "FIRMWARE_NAME:Smoothieware, FIRMWARE_URL:http%3A//smoothieware.org, X-SOURCE_CODE_URL:https://github.com/Smoothieware/Smoothieware, FIRMWARE_VERSION:edge-3332442, X-FIRMWARE_BUILD_DATE:Apr 22 2021 08:53:23, X-SYSTEM_CLOCK:100MHz, X-AXES:5, X-GRBL_MODE:0, X-ARCS:1",
        ]));
        assert_eq!(parsed.get("FIRMWARE_NAME"), Some("Smoothieware"));
        assert_eq!(parsed.get("FIRMWARE_VERSION"), Some("edge-3332442"));
        assert_eq!(parsed.get("FIRMWARE_URL"), Some("http%3A//smoothieware.org"));
        assert_eq!(
            parsed.capability("FIRMWARE_BUILD_DATE"),
            Some("Apr 22 2021 08:53:23")
        );
        assert_eq!(
            parsed.capability("SOURCE_CODE_URL"),
            Some("https://github.com/Smoothieware/Smoothieware")
        );
        assert_eq!(parsed.capability_flag("ARCS"), Some(true));
    }

    #[test]
    fn test_cap_lines_merge_with_line_one_capabilities() {
        let parsed = parse_response(&lines(&[
            "FIRMWARE_NAME:Smoothieware, X-AXES:5, X-ARCS:0",
            "Cap:ARCS:1",
            "Cap:EEPROM:1",
        ]));
        assert_eq!(parsed.capability("AXES"), Some("5"));
        assert_eq!(parsed.capability_flag("ARCS"), Some(true));
        assert_eq!(parsed.capability("EEPROM"), Some("1"));
    }

    #[test]
    fn test_cap_lines_skipped_with_report_field() {
        let parsed = parse_response(&lines(&[
            "FIRMWARE_NAME:Marlin 2.0.7.2 EXTENDED_CAPABILITIES_REPORT:1",
            "Cap:ARCS:1",
        ]));
        assert_eq!(parsed.get("EXTENDED_CAPABILITIES_REPORT"), Some("1"));
        assert_eq!(parsed.capability("ARCS"), None);
    }

    #[test]
    fn test_unparsable_and_empty() {
        assert!(parse_response(&[]).is_empty());
        assert!(parse_response(&lines(&["start", "echo:busy processing"])).is_empty());
    }
}
