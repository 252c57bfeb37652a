/// Formats minutes since midnight as `H:MM` (no leading zero on the hour).
pub fn format_minutes(minutes_from_midnight: u32) -> String {
    let hours = minutes_from_midnight / 60;
    let minutes = minutes_from_midnight % 60;
    format!("{hours}:{minutes:02}")
}

/// `H:MM–H:MM` span used in reminder bodies.
pub fn format_span(start_minute: u32, end_minute: u32) -> String {
    format!("{}–{}", format_minutes(start_minute), format_minutes(end_minute))
}
