//! Conversions between Kubernetes quantity strings and plain integers
//!
//! Memory and disk sizes travel as byte counts and CPU as millicpu on the
//! external side. Custom resources accept quantity strings with several
//! suffix systems, so reads must understand all of them. Writes never add a
//! suffix back: bytes are stored as a plain decimal string and CPU as `<n>m`.

use crate::Error;

/// Milli suffix, a valid but odd Kubernetes suffix for memory
const MILLI_SUFFIX: &str = "m";

/// Byte suffixes and their multipliers
///
/// Decimal (`K`, `M`, ...) or binary (`Ki`, `Mi`, ...). Milli is handled
/// separately as a division so whole results stay exact.
const BYTE_SUFFIXES: &[(&str, f64)] = &[
    ("", 1.0),
    ("K", 1e3),
    ("Ki", 1024.0),
    ("M", 1e6),
    ("Mi", 1024.0 * 1024.0),
    ("G", 1e9),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("T", 1e12),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
];

/// Normalize the case of a byte suffix.
///
/// The scale letter is case-insensitive except for a lone `m`, which stays
/// milli; `M`/`Mi` are mega/mebi. The binary marker is always lower-case `i`.
fn normalize_byte_suffix(suffix: &str) -> String {
    if suffix == MILLI_SUFFIX {
        return suffix.to_string();
    }
    let mut chars = suffix.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (None, _, _) => String::new(),
        (Some(scale), None, _) => scale.to_ascii_uppercase().to_string(),
        (Some(scale), Some(binary), None) if binary.eq_ignore_ascii_case(&'i') => {
            format!("{}i", scale.to_ascii_uppercase())
        }
        _ => suffix.to_string(),
    }
}

/// Split a quantity into its numeric prefix and trailing suffix
fn split_quantity(s: &str) -> (&str, &str) {
    let idx = s
        .rfind(|c: char| c.is_ascii_digit() || c == '.')
        .map(|i| i + 1)
        .unwrap_or(0);
    s.split_at(idx)
}

/// Parse a memory or disk quantity into bytes.
///
/// Accepts "1073741824", "1Gi", "1G", "512Mi", "1.5Gi", "100m". The result
/// is rounded up to the next whole byte. An empty string is rejected; call
/// sites that tolerate absent values substitute `"0"` before parsing.
pub fn bytes_from_str(s: &str) -> Result<u64, Error> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::validation("empty byte quantity"));
    }

    let (number, suffix) = split_quantity(s);
    let normalized = normalize_byte_suffix(suffix);
    let coefficient = if normalized == MILLI_SUFFIX {
        None
    } else {
        let known = BYTE_SUFFIXES
            .iter()
            .find(|(known, _)| *known == normalized)
            .map(|(_, c)| *c)
            .ok_or_else(|| {
                Error::validation(format!("unknown byte suffix {suffix:?} in quantity {s:?}"))
            })?;
        Some(known)
    };

    if number.is_empty() {
        return Err(Error::validation(format!(
            "missing number in byte quantity {s:?}"
        )));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| Error::validation(format!("invalid number in byte quantity {s:?}")))?;

    let bytes = match coefficient {
        Some(c) => value * c,
        None => value / 1000.0,
    }
    .ceil();
    if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
        return Err(Error::validation(format!(
            "byte quantity {s:?} is out of range"
        )));
    }
    Ok(bytes as u64)
}

/// Parse a CPU quantity into millicpu.
///
/// "500m" is taken as millicpu directly; "1", "0.5" and "2.25" are whole or
/// fractional CPUs, scaled by 1000 and rounded to the nearest millicpu.
pub fn milli_cpu_from_str(s: &str) -> Result<u64, Error> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::validation("empty cpu quantity"));
    }

    if let Some(millis) = s.strip_suffix('m') {
        return millis
            .parse::<u64>()
            .map_err(|_| Error::validation(format!("invalid millicpu quantity {s:?}")));
    }

    if s.matches('.').count() > 1 {
        return Err(Error::validation(format!(
            "invalid cpu quantity {s:?}: more than one decimal point"
        )));
    }
    let cpus: f64 = s
        .parse()
        .map_err(|_| Error::validation(format!("invalid cpu quantity {s:?}")))?;

    let millis = (cpus * 1000.0).round();
    if !millis.is_finite() || millis < 0.0 || millis >= u64::MAX as f64 {
        return Err(Error::validation(format!(
            "cpu quantity {s:?} is out of range"
        )));
    }
    Ok(millis as u64)
}

/// Format a byte count the way custom resources store it: plain decimal
pub fn str_from_bytes(bytes: u64) -> String {
    bytes.to_string()
}

/// Format millicpu as a Kubernetes CPU quantity
pub fn str_from_milli_cpu(millis: u64) -> String {
    format!("{millis}m")
}
