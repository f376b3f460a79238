use crate::domain::template::{TemplateContext, TemplateValue};
use chrono::{DateTime, SecondsFormat, Utc};
use common::domain::{DomainError, DomainResult, TelemetryFilters, TelemetryPage, TelemetrySummary};

/// Values the dashboard template is rendered with
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardView {
    /// JSON array of per-country deployment counts for the filtered window
    pub countries: String,
    /// JSON page of latest heartbeats per deployment, plotted on the map
    pub map_data: String,
    pub no_deployments: u64,
    pub no_countries: u64,
    /// Dropdown options, always taken from the unfiltered summary
    pub filter_countries: Vec<String>,
    pub filter_cities: Vec<String>,
    pub filter_services: Vec<String>,
    pub filter_versions: Vec<String>,
    pub from: String,
    pub to: String,
    pub selected_country: String,
    pub selected_city: String,
    pub selected_service: String,
    pub selected_version: String,
}

impl DashboardView {
    pub fn build(
        filters: &TelemetryFilters,
        summary: &TelemetrySummary,
        unfiltered: &TelemetrySummary,
        page: &TelemetryPage,
    ) -> DomainResult<Self> {
        let countries = script_json(&summary.countries)
            .map_err(|e| DomainError::RenderError(format!("failed to encode countries: {}", e)))?;
        let map_data = script_json(page)
            .map_err(|e| DomainError::RenderError(format!("failed to encode map data: {}", e)))?;

        Ok(Self {
            countries,
            map_data,
            no_deployments: summary.total_deployments,
            no_countries: summary.countries.len() as u64,
            filter_countries: unfiltered
                .countries
                .iter()
                .map(|c| c.country.clone())
                .collect(),
            filter_cities: unfiltered.cities.iter().cloned().collect(),
            filter_services: unfiltered.services.iter().cloned().collect(),
            filter_versions: unfiltered.versions.iter().cloned().collect(),
            from: form_time(filters.from),
            to: form_time(filters.to),
            selected_country: filters.country.clone().unwrap_or_default(),
            selected_city: filters.city.clone().unwrap_or_default(),
            selected_service: filters.service.clone().unwrap_or_default(),
            selected_version: filters.version.clone().unwrap_or_default(),
        })
    }

    pub fn to_context(&self) -> TemplateContext {
        let mut context = TemplateContext::new();
        context
            .insert("Countries", TemplateValue::Raw(self.countries.clone()))
            .insert("MapData", TemplateValue::Raw(self.map_data.clone()))
            .insert("NoDeployments", TemplateValue::Number(self.no_deployments))
            .insert("NoCountries", TemplateValue::Number(self.no_countries))
            .insert(
                "FilterCountries",
                options(&self.filter_countries, &self.selected_country),
            )
            .insert("FilterCities", options(&self.filter_cities, &self.selected_city))
            .insert(
                "FilterServices",
                options(&self.filter_services, &self.selected_service),
            )
            .insert(
                "FilterVersions",
                options(&self.filter_versions, &self.selected_version),
            )
            .insert("From", TemplateValue::Text(self.from.clone()))
            .insert("To", TemplateValue::Text(self.to.clone()))
            .insert("SelectedCountry", TemplateValue::Text(self.selected_country.clone()))
            .insert("SelectedCity", TemplateValue::Text(self.selected_city.clone()))
            .insert("SelectedService", TemplateValue::Text(self.selected_service.clone()))
            .insert("SelectedVersion", TemplateValue::Text(self.selected_version.clone()));
        context
    }
}

/// JSON safe to embed inside a `<script>` element.
fn script_json<T: serde::Serialize>(value: &T) -> serde_json::Result<String> {
    Ok(serde_json::to_string(value)?
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026"))
}

fn options(values: &[String], selected: &str) -> TemplateValue {
    TemplateValue::Options {
        values: values.to_vec(),
        selected: (!selected.is_empty()).then(|| selected.to_string()),
    }
}

/// RFC 3339 at second precision without the zone suffix, as
/// `<input type="datetime-local">` expects.
fn form_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true).replace('Z', ""))
        .unwrap_or_default()
}
