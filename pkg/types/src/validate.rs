use anyhow::{Result, bail};
use std::time::Duration;

/// Validate a lease name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("lease name must not be empty");
    }
    if name.len() > 63 {
        bail!("lease name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("lease name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "lease name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Parse a duration such as `90s`, `30m`, `1h30m10s` or `250ms`.
/// A bare `0` is accepted as zero. Signs are rejected.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        bail!("duration must not be empty");
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') || s.starts_with('+') {
        bail!("duration '{}' must not carry a sign", raw);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            bail!("duration '{}' is missing a number before '{}'", raw, rest);
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|e| anyhow::anyhow!("duration '{}': {}", raw, e))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "s" => Some(Duration::from_secs(value)),
            "ms" => Some(Duration::from_millis(value)),
            "" => bail!("duration '{}' is missing a unit (h, m, s, ms)", raw),
            other => bail!("duration '{}' has unknown unit '{}'", raw, other),
        };
        total = part
            .and_then(|p| total.checked_add(p))
            .ok_or_else(|| anyhow::anyhow!("duration '{}' overflows", raw))?;
    }
    Ok(total)
}

/// Render a duration compactly, e.g. `2h`, `1h30m`, `45s`, `0s`.
/// Sub-second precision is dropped.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 {
        out.push_str(&format!("{}s", s));
    }
    out
}
