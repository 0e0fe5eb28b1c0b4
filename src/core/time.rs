use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

pub(crate) fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub(crate) fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// Parses a submission timestamp as sent by the host. Besides RFC 3339 this
/// accepts the space-separated form the host's datetime printer produces;
/// anything else (including the literal `None`) yields `None`.
pub(crate) fn parse_submission_time(raw: &str) -> Option<OffsetDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "None" || trimmed == "null" {
        return None;
    }

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(parsed.to_offset(UtcOffset::UTC));
    }

    let normalized = trimmed.replacen(' ', "T", 1);
    match OffsetDateTime::parse(&normalized, &Rfc3339) {
        Ok(parsed) => Some(parsed.to_offset(UtcOffset::UTC)),
        Err(err) => {
            tracing::debug!(error = %err, raw = %trimmed, "Ignoring unparseable submission time");
            None
        }
    }
}
