// src/services/format.rs
//! Display formatting shared by the summary text and the workbook sheets.

pub const PLACEHOLDER: &str = "—";

/// `1234567.8` -> `"1,234,568"` with `decimals = 0`.
pub fn with_commas(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let nonzero = formatted.chars().any(|c| c != '0' && c != '.');
    let sign = if value < 0.0 && nonzero { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

/// Short currency: `$74.6M`, `$850K`, `$125`.
pub fn currency_short(value: Option<f64>) -> String {
    match value {
        None => PLACEHOLDER.to_string(),
        Some(v) if v.abs() >= 1_000_000.0 => format!("${:.1}M", v / 1_000_000.0),
        Some(v) if v.abs() >= 1000.0 => format!("${:.0}K", v / 1000.0),
        Some(v) => format!("${:.0}", v),
    }
}

pub fn percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v),
        None => PLACEHOLDER.to_string(),
    }
}

pub fn multiple(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}x", v),
        None => PLACEHOLDER.to_string(),
    }
}

/// Value column of the assumption sheets. Large dollar amounts get `$` and separators.
pub fn field_value(value: f64, unit: &str) -> String {
    if value.abs() >= 1_000_000.0 {
        format!("${}", with_commas(value, 0))
    } else if value.abs() >= 1000.0 {
        if unit == "$" {
            format!("${}", with_commas(value, 0))
        } else {
            with_commas(value, 2)
        }
    } else if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
