use crate::error::GatewayError;

/// 1 KiB.
pub const BODY_LIMIT_MIN: usize = 1024;
/// 100 MiB.
pub const BODY_LIMIT_MAX: usize = 104_857_600;

/// Parses a body-size-limit string into bytes.
///
/// Accepted forms: plain bytes (`"104857600"`), or a number with a
/// case-insensitive `K`/`KB`/`M`/`MB`/`G`/`GB` suffix. The parsed value must
/// land in `[BODY_LIMIT_MIN, BODY_LIMIT_MAX]`; anything else is a startup
/// failure.
pub fn parse_body_size_limit(input: &str) -> Result<usize, GatewayError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input));
    }

    let upper = trimmed.to_ascii_uppercase();
    let (digits, multiplier) = if let Some(rest) = strip_suffix(&upper, &["GB", "G"]) {
        (rest, 1024 * 1024 * 1024)
    } else if let Some(rest) = strip_suffix(&upper, &["MB", "M"]) {
        (rest, 1024 * 1024)
    } else if let Some(rest) = strip_suffix(&upper, &["KB", "K"]) {
        (rest, 1024)
    } else {
        (upper.as_str(), 1)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid(input))?;
    let bytes = value.checked_mul(multiplier).ok_or_else(|| invalid(input))?;
    let bytes = usize::try_from(bytes).map_err(|_| invalid(input))?;

    if !(BODY_LIMIT_MIN..=BODY_LIMIT_MAX).contains(&bytes) {
        return Err(GatewayError::invalid_request(format!(
            "body size limit {input:?} out of range [{BODY_LIMIT_MIN}, {BODY_LIMIT_MAX}]"
        ))
        .with_param("body_size_limit"));
    }
    Ok(bytes)
}

fn strip_suffix<'a>(value: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes
        .iter()
        .find_map(|suffix| value.strip_suffix(suffix))
}

fn invalid(input: &str) -> GatewayError {
    GatewayError::invalid_request(format!("invalid body size limit: {input:?}"))
        .with_param("body_size_limit")
}
