//! Input checks that run before any store access.

use pathway_core::PointId;

use crate::error::{PathError, Result};

/// Parse a numeric point id.
pub fn parse_point_id(raw: &str) -> Option<PointId> {
    raw.trim().parse::<i64>().ok().map(PointId)
}

/// Parse an origin/destination pair as received from a caller.
///
/// Both must be present, numeric, and different.
pub fn parse_point_pair(
    origin: Option<&str>,
    destination: Option<&str>,
) -> Result<(PointId, PointId)> {
    let (Some(raw_origin), Some(raw_destination)) = (origin, destination) else {
        return Err(PathError::NullPoints {
            origin: origin.map(str::to_string),
            destination: destination.map(str::to_string),
        });
    };

    let (Some(origin), Some(destination)) =
        (parse_point_id(raw_origin), parse_point_id(raw_destination))
    else {
        return Err(PathError::InvalidNumericIds {
            origin: raw_origin.to_string(),
            destination: raw_destination.to_string(),
        });
    };

    ensure_distinct(&[origin, destination])?;
    Ok((origin, destination))
}

/// Parse an optional endpoint; `None` stays `None`.
pub fn parse_optional_point(raw: Option<&str>, field: &'static str) -> Result<Option<PointId>> {
    match raw {
        None => Ok(None),
        Some(text) => match parse_point_id(text) {
            Some(id) => Ok(Some(id)),
            None => Err(invalid_single(field, text)),
        },
    }
}

fn invalid_single(field: &'static str, raw: &str) -> PathError {
    let (origin, destination) = if field == "destination" {
        (String::new(), raw.to_string())
    } else {
        (raw.to_string(), String::new())
    };
    PathError::InvalidNumericIds {
        origin,
        destination,
    }
}

/// Reject any repeated id.
pub fn ensure_distinct(ids: &[PointId]) -> Result<()> {
    for (i, id) in ids.iter().enumerate() {
        if ids[i + 1..].contains(id) {
            return Err(PathError::SamePoints { point: *id });
        }
    }
    Ok(())
}

/// Trim a title; empty titles are rejected.
pub fn normalize_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(PathError::NullInput { field: "title" });
    }
    Ok(title.to_string())
}

/// Trim a summary; an empty summary clears it.
pub fn normalize_summary(raw: &str) -> Option<String> {
    let summary = raw.trim();
    (!summary.is_empty()).then(|| summary.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn pair_parses() {
        let pair = parse_point_pair(Some("1"), Some(" 2 ")).unwrap();
        assert_eq!(pair, (PointId(1), PointId(2)));
    }

    #[test]
    fn pair_rejections_have_codes() {
        let cases = [
            (None, Some("2"), ErrorCode::NullPoints),
            (Some("1"), None, ErrorCode::NullPoints),
            (Some("a"), Some("2"), ErrorCode::InvalidNumericIds),
            (Some("1"), Some("2.5"), ErrorCode::InvalidNumericIds),
            (Some("3"), Some("3"), ErrorCode::SamePoints),
        ];
        for (origin, destination, code) in cases {
            let err = parse_point_pair(origin, destination).unwrap_err();
            assert_eq!(err.code(), code, "{origin:?} {destination:?}");
        }
    }

    #[test]
    fn optional_point() {
        assert_eq!(parse_optional_point(None, "origin").unwrap(), None);
        assert_eq!(
            parse_optional_point(Some("12"), "origin").unwrap(),
            Some(PointId(12))
        );
        let err = parse_optional_point(Some("x"), "destination").unwrap_err();
        assert!(err.to_string().ends_with("destination: x"));
    }

    #[test]
    fn distinct_ids() {
        ensure_distinct(&[PointId(1), PointId(2), PointId(3)]).unwrap();
        let err = ensure_distinct(&[PointId(1), PointId(2), PointId(1)]).unwrap_err();
        assert!(matches!(err, PathError::SamePoints { point } if point == PointId(1)));
    }

    #[test]
    fn titles_are_trimmed() {
        assert_eq!(normalize_title("  Intro ").unwrap(), "Intro");
        assert_eq!(
            normalize_title("   ").unwrap_err().code(),
            ErrorCode::NullInput
        );
        assert_eq!(normalize_summary("  "), None);
        assert_eq!(normalize_summary(" s ").as_deref(), Some("s"));
    }
}
