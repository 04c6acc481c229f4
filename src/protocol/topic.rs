//! Topic filter matching for MQTT subscriptions.
//!
//! Filters are compared segment-wise against concrete topics: `+` stands in
//! for exactly one segment, a trailing `#` for any remainder including none.
//! Matching is case-sensitive and byte-exact, with no backtracking.

/// Tests whether `topic` falls under the subscription `filter`.
///
/// Assumes the filter obeys MQTT grammar (at most one `#`, only as the last
/// segment); [`valid_filter`] checks that where the filter comes from
/// configuration.
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut patterns = filter.split('/');
    let mut segments = topic.split('/');

    for pattern in patterns.by_ref() {
        if pattern == "#" {
            return true;
        }
        match segments.next() {
            Some(_) if pattern == "+" => continue,
            Some(segment) if segment == pattern => continue,
            _ => return false,
        }
    }

    // Filter exhausted; only a full segment-for-segment match counts.
    segments.next().is_none()
}

/// Checks MQTT filter grammar: non-empty, `#` only as the final segment,
/// wildcards only as whole segments.
pub fn valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let segments: Vec<&str> = filter.split('/').collect();
    let last = segments.len() - 1;
    segments.iter().enumerate().all(|(i, segment)| match *segment {
        "#" => i == last,
        "+" => true,
        other => !other.contains('#') && !other.contains('+'),
    })
}

/// Checks that a publish destination is concrete: non-empty, no wildcards.
pub fn valid_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains('#') && !topic.contains('+')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("phone", "phone"));
        assert!(matches("phone/events/call", "phone/events/call"));
        assert!(!matches("phone/events", "phone/event"));
        assert!(!matches("phone/events", "phone/events/call"));
        assert!(!matches("phone/events/call", "phone/events"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches("phone/+", "phone/status"));
        assert!(matches("a/+/c", "a/b/c"));
        assert!(matches("+/events", "phone/events"));
        assert!(!matches("phone/+", "phone/a/b"));
        assert!(!matches("phone/+", "phone"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches("phone/#", "phone/status"));
        assert!(matches("phone/#", "phone/a/b/c"));
        assert!(matches("a/#", "a"));
        assert!(matches("#", "anything/at/all"));
        assert!(!matches("phone/#", "ups/status"));
    }

    #[test]
    fn empty_segments_are_real_segments() {
        assert!(matches("phone/+", "phone/"));
        assert!(matches("phone//call", "phone//call"));
        assert!(!matches("phone/call", "phone//call"));
    }

    #[test]
    fn filter_validity() {
        assert!(valid_filter("phone"));
        assert!(valid_filter("phone/+/status"));
        assert!(valid_filter("phone/#"));
        assert!(valid_filter("#"));
        assert!(!valid_filter(""));
        assert!(!valid_filter("phone/#/status"));
        assert!(!valid_filter("phone/st#tus"));
        assert!(!valid_filter("phone/st+tus"));
    }

    #[test]
    fn topic_validity() {
        assert!(valid_topic("phone/events"));
        assert!(!valid_topic(""));
        assert!(!valid_topic("phone/#"));
        assert!(!valid_topic("phone/+/x"));
    }
}
