use crate::domain::telemetry::{CountrySummary, TelemetrySummary};
use std::collections::BTreeSet;

/// One grouped row of the summary query: a country with its distinct
/// deployment count and the distinct names observed there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryRow {
    pub country: String,
    pub deployments: u64,
    pub cities: Vec<String>,
    pub services: Vec<String>,
    pub versions: Vec<String>,
}

/// Folds per-country rows into the global summary.
///
/// Countries keep the order the rows arrived in. Empty names are skipped.
pub fn aggregate<I>(rows: I) -> TelemetrySummary
where
    I: IntoIterator<Item = SummaryRow>,
{
    let mut summary = TelemetrySummary::default();

    for row in rows {
        summary.total_deployments += row.deployments;
        summary.countries.push(CountrySummary {
            country: row.country,
            deployments: row.deployments,
        });

        extend_non_empty(&mut summary.cities, row.cities);
        extend_non_empty(&mut summary.services, row.services);
        extend_non_empty(&mut summary.versions, row.versions);
    }

    summary
}

fn extend_non_empty(set: &mut BTreeSet<String>, values: Vec<String>) {
    set.extend(values.into_iter().filter(|value| !value.is_empty()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(country: &str, deployments: u64, cities: &[&str]) -> SummaryRow {
        SummaryRow {
            country: country.to_string(),
            deployments,
            cities: cities.iter().map(|c| c.to_string()).collect(),
            services: vec!["users".to_string()],
            versions: vec!["0.14.0".to_string()],
        }
    }

    #[test]
    fn test_total_matches_country_counts() {
        let summary = aggregate(vec![row("Kenya", 5, &["X", "Nairobi"]), row("Serbia", 3, &["X"])]);

        assert_eq!(summary.total_deployments, 8);
        assert_eq!(
            summary.total_deployments,
            summary.countries.iter().map(|c| c.deployments).sum::<u64>()
        );
    }

    #[test]
    fn test_overlapping_city_appears_once() {
        let summary = aggregate(vec![
            row("Kenya", 5, &["X"]),
            row("Serbia", 3, &["X", "Novi Sad"]),
        ]);

        assert_eq!(summary.cities.len(), 2);
        assert!(summary.cities.contains("X"));
        assert!(summary.cities.contains("Novi Sad"));
        assert_eq!(summary.services.len(), 1);
        assert_eq!(summary.versions.len(), 1);
    }

    #[test]
    fn test_country_order_follows_input() {
        let summary = aggregate(vec![
            row("Serbia", 1, &[]),
            row("Kenya", 2, &[]),
            row("Austria", 4, &[]),
        ]);

        let countries: Vec<&str> = summary
            .countries
            .iter()
            .map(|c| c.country.as_str())
            .collect();
        assert_eq!(countries, vec!["Serbia", "Kenya", "Austria"]);
    }

    #[test]
    fn test_empty_names_are_skipped() {
        let summary = aggregate(vec![SummaryRow {
            country: "Kenya".to_string(),
            deployments: 1,
            cities: vec![String::new(), "Nairobi".to_string()],
            services: vec![String::new()],
            versions: vec![],
        }]);

        assert_eq!(summary.cities.len(), 1);
        assert!(summary.services.is_empty());
        assert!(summary.versions.is_empty());
    }

    #[test]
    fn test_no_rows_yields_empty_summary() {
        let summary = aggregate(Vec::new());
        assert_eq!(summary, TelemetrySummary::default());
    }

    #[test]
    fn test_aggregation_is_idempotent_over_a_snapshot() {
        let rows = vec![row("Kenya", 5, &["Nairobi", "Mombasa"]), row("Serbia", 3, &["Novi Sad"])];

        let first = aggregate(rows.clone());
        let second = aggregate(rows);

        assert_eq!(first.total_deployments, second.total_deployments);
        assert_eq!(first.cities, second.cities);
        assert_eq!(first.services, second.services);
        assert_eq!(first.versions, second.versions);
    }
}
