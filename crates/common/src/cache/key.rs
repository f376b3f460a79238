use crate::domain::TelemetryFilters;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fmt;

/// Logical cache a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Summary,
    Page,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Summary => "summary",
            CacheKind::Page => "page",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic fingerprint of a filter set.
///
/// Equal filters always give equal keys. Any differing field, including a
/// timestamp differing only in its nanoseconds, gives a different key. Each
/// field is length-prefixed so values containing the delimiter cannot shift
/// into a neighbouring field.
pub fn canonical_key(filters: &TelemetryFilters, kind: CacheKind) -> String {
    let from = filters.from.as_ref().map(format_instant);
    let to = filters.to.as_ref().map(format_instant);
    let canonical = [
        filters.country.as_deref(),
        filters.city.as_deref(),
        filters.service.as_deref(),
        filters.version.as_deref(),
        from.as_deref(),
        to.as_deref(),
    ]
    .iter()
    .map(|field| encode_field(*field))
    .collect::<Vec<_>>()
    .join("|");

    let digest = Sha256::digest(canonical.as_bytes());
    format!("{}:{}", kind, hex::encode(digest))
}

/// `-` when absent, `<byte length>:<value>` otherwise.
fn encode_field(field: Option<&str>) -> String {
    match field {
        Some(value) => format!("{}:{}", value.len(), value),
        None => "-".to_string(),
    }
}

fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn filters() -> TelemetryFilters {
        TelemetryFilters {
            from: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap()),
            country: Some("Kenya".to_string()),
            city: Some("Nairobi".to_string()),
            version: Some("0.14.0".to_string()),
            service: Some("users".to_string()),
        }
    }

    #[test]
    fn test_equal_filters_give_equal_keys() {
        assert_eq!(
            canonical_key(&filters(), CacheKind::Summary),
            canonical_key(&filters(), CacheKind::Summary)
        );
    }

    #[test]
    fn test_key_format() {
        let key = canonical_key(&TelemetryFilters::default(), CacheKind::Page);
        let (prefix, digest) = key.split_once(':').unwrap();
        assert_eq!(prefix, "page");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_kind_separates_keys() {
        assert_ne!(
            canonical_key(&filters(), CacheKind::Summary),
            canonical_key(&filters(), CacheKind::Page)
        );
    }

    #[test]
    fn test_every_field_changes_the_key() {
        let base = canonical_key(&filters(), CacheKind::Summary);

        let variants = [
            TelemetryFilters {
                country: Some("Serbia".to_string()),
                ..filters()
            },
            TelemetryFilters {
                city: None,
                ..filters()
            },
            TelemetryFilters {
                service: Some("things".to_string()),
                ..filters()
            },
            TelemetryFilters {
                version: Some("0.15.0".to_string()),
                ..filters()
            },
            TelemetryFilters {
                from: filters().from.map(|t| t + Duration::nanoseconds(1)),
                ..filters()
            },
            TelemetryFilters {
                to: filters().to.map(|t| t - Duration::nanoseconds(1)),
                ..filters()
            },
        ];

        for variant in variants {
            assert_ne!(canonical_key(&variant, CacheKind::Summary), base);
        }
    }

    #[test]
    fn test_shifted_values_do_not_collide() {
        let a = TelemetryFilters {
            country: Some("Kenya".to_string()),
            ..Default::default()
        };
        let b = TelemetryFilters {
            city: Some("Kenya".to_string()),
            ..Default::default()
        };
        assert_ne!(
            canonical_key(&a, CacheKind::Summary),
            canonical_key(&b, CacheKind::Summary)
        );
    }

    #[test]
    fn test_delimiter_in_value_does_not_collide() {
        let a = TelemetryFilters {
            country: Some("a|".to_string()),
            city: Some("b".to_string()),
            ..Default::default()
        };
        let b = TelemetryFilters {
            country: Some("a".to_string()),
            city: Some("|b".to_string()),
            ..Default::default()
        };
        assert_ne!(
            canonical_key(&a, CacheKind::Summary),
            canonical_key(&b, CacheKind::Summary)
        );
    }

    #[test]
    fn test_empty_value_differs_from_absent() {
        let empty = TelemetryFilters {
            country: Some(String::new()),
            ..Default::default()
        };
        assert_ne!(
            canonical_key(&empty, CacheKind::Page),
            canonical_key(&TelemetryFilters::default(), CacheKind::Page)
        );
    }
}
