use anyhow::{Context, Result};

/// Status words returned by PC/SC part 3 readers for storage card commands
const STATUS_WORDS: &[((u8, u8), &str)] = &[
    ((0x90, 0x00), "Success"),
    ((0x62, 0x81), "Warning: Part of returned data may be corrupted"),
    ((0x62, 0x82), "Warning: End of data reached before Le bytes"),
    ((0x63, 0x00), "Error: Operation failed"),
    ((0x65, 0x81), "Error: Memory failure"),
    ((0x67, 0x00), "Error: Wrong length"),
    ((0x68, 0x00), "Error: Class byte not supported"),
    ((0x69, 0x81), "Error: Command incompatible"),
    ((0x69, 0x82), "Error: Security status not satisfied"),
    ((0x69, 0x83), "Error: Authentication method blocked"),
    ((0x69, 0x86), "Error: Command not allowed"),
    ((0x6A, 0x81), "Error: Function not supported"),
    ((0x6A, 0x82), "Error: Block not found"),
    ((0x6B, 0x00), "Error: Wrong parameter(s) P1-P2"),
    ((0x6D, 0x00), "Error: Instruction code not supported"),
    ((0x6E, 0x00), "Error: Class not supported"),
];

/// Parse hex input such as a configured key.
///
/// Whitespace and `:`, `-`, `,` separators are ignored, as is a `0x` prefix
/// on each byte: "FFFFFFFFFFFF", "FF FF FF FF FF FF", "ff:ff:..", "0xFF,0xFF,..".
pub fn parse_hex(hex_str: &str) -> Result<Vec<u8>> {
    let digits: String = hex_str
        .split(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | ','))
        .map(|part| {
            part.strip_prefix("0x")
                .or_else(|| part.strip_prefix("0X"))
                .unwrap_or(part)
        })
        .collect();

    hex::decode(&digits).with_context(|| format!("Invalid hex string: '{hex_str}'"))
}

/// Format bytes as a hex string with spaces
pub fn format_hex_spaced(bytes: &[u8]) -> String {
    join_hex(bytes, " ")
}

/// Format a card UID as upper-case byte pairs joined by '-'
pub fn format_uid(bytes: &[u8]) -> String {
    join_hex(bytes, "-")
}

fn join_hex(bytes: &[u8], separator: &str) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Human-readable description of a reader status word, for logs
pub fn describe_status_word(sw1: u8, sw2: u8) -> String {
    if let Some((_, text)) = STATUS_WORDS.iter().find(|(sw, _)| *sw == (sw1, sw2)) {
        return (*text).to_string();
    }

    match (sw1, sw2) {
        (0x61, n) => format!("Success, {n} bytes available"),
        (0x6C, n) => format!("Error: Wrong Le field, exact length: {n}"),
        _ => format!("Unknown status: {sw1:02X} {sw2:02X}"),
    }
}
