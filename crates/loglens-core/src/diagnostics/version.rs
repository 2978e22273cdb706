use semver::Version;

fn leading_number(part: &str) -> Option<u64> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Parse dotted versions that are not strict semver (`4.3`, `v0.0.5`,
/// `4.84`). Missing components are zero and extra components are ignored.
pub fn parse_lenient(value: &str) -> Option<Version> {
    let value = value.trim();
    let value = value
        .strip_prefix('v')
        .or_else(|| value.strip_prefix('V'))
        .unwrap_or(value);

    let mut parts = value.split('.').map(leading_number);
    let major = parts.next()??;
    let minor = parts.next().unwrap_or(Some(0))?;
    let patch = parts.next().unwrap_or(Some(0)).unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// `major.minor` of a driver version as a number (`"431.60"` is 431.6).
pub fn driver_major_minor(value: &str) -> Option<f64> {
    let mut parts = value.trim().split('.');
    let major = leading_number(parts.next()?)?;
    // Keep the minor digits as written, "05" is not "5".
    let minor: String = parts
        .next()
        .map(|p| p.chars().take_while(|c| c.is_ascii_digit()).collect())
        .unwrap_or_default();
    if minor.is_empty() {
        return Some(major as f64);
    }
    format!("{}.{}", major, minor).parse().ok()
}
