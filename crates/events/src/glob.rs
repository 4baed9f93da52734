//! Colon-segment glob matching for pattern subscriptions (§4.4).
//!
//! Channels are colon-delimited (e.g. `workflow:arb_btc:events`, mirroring
//! `stratum_core::keys`'s state-key layout). `*` matches exactly one
//! segment; `**` matches any number of trailing segments, including zero.

/// Validate that `pattern` contains only non-empty segments (`*`, `**`, or
/// a literal), rejecting the empty string.
pub fn validate(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Err("pattern must not be empty".to_string());
    }
    if pattern.split(':').any(str::is_empty) {
        return Err("pattern must not contain empty segments".to_string());
    }
    Ok(())
}

/// Whether `channel` matches `pattern`.
#[must_use]
pub fn matches(pattern: &str, channel: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split(':').collect();
    let channel_segs: Vec<&str> = channel.split(':').collect();
    matches_segments(&pattern_segs, &channel_segs)
}

fn matches_segments(pattern: &[&str], channel: &[&str]) -> bool {
    match pattern.first() {
        None => channel.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=channel.len()).any(|skip| matches_segments(&pattern[1..], &channel[skip..]))
        }
        Some(&"*") => !channel.is_empty() && matches_segments(&pattern[1..], &channel[1..]),
        Some(seg) => {
            channel.first() == Some(seg) && matches_segments(&pattern[1..], &channel[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_exact_channel_only() {
        assert!(matches("workflow:arb_btc:events", "workflow:arb_btc:events"));
        assert!(!matches("workflow:arb_btc:events", "workflow:eth_usd:events"));
    }

    #[test]
    fn single_star_matches_one_segment() {
        assert!(matches("workflow:*:events", "workflow:arb_btc:events"));
        assert!(!matches("workflow:*:events", "workflow:arb_btc:sub:events"));
    }

    #[test]
    fn double_star_matches_any_suffix_including_empty() {
        assert!(matches("workflow:**", "workflow:arb_btc:events"));
        assert!(matches("workflow:**", "workflow:arb_btc"));
        assert!(matches("**", "anything:at:all"));
    }

    #[test]
    fn double_star_matches_zero_segments() {
        assert!(matches("workflow:arb_btc:**", "workflow:arb_btc"));
    }

    #[test]
    fn double_star_in_middle_matches_any_span() {
        assert!(matches("workflow:**:status", "workflow:a:b:c:status"));
        assert!(!matches("workflow:**:status", "workflow:a:b:c:result"));
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(validate("workflow::events").is_err());
        assert!(validate("").is_err());
        assert!(validate("workflow:*:events").is_ok());
    }
}
