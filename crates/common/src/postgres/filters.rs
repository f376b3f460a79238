use crate::domain::TelemetryFilters;
use tokio_postgres::types::ToSql;

/// Parameterized `WHERE` clause built from telemetry filters.
///
/// Placeholders are numbered from `$1` in field order; further parameters
/// (limit, offset) can be appended with [`FilterQuery::push`].
pub struct FilterQuery<'a> {
    conditions: Vec<String>,
    params: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> FilterQuery<'a> {
    pub fn new(filters: &'a TelemetryFilters) -> Self {
        let mut query = Self {
            conditions: Vec::new(),
            params: Vec::new(),
        };

        if let Some(ref from) = filters.from {
            let idx = query.push(from);
            query.conditions.push(format!("time >= ${}", idx));
        }
        if let Some(ref to) = filters.to {
            let idx = query.push(to);
            query.conditions.push(format!("time <= ${}", idx));
        }
        if let Some(ref country) = filters.country {
            let idx = query.push(country);
            query.conditions.push(format!("country = ${}", idx));
        }
        if let Some(ref city) = filters.city {
            let idx = query.push(city);
            query.conditions.push(format!("city = ${}", idx));
        }
        if let Some(ref version) = filters.version {
            let idx = query.push(version);
            query.conditions.push(format!("mg_version = ${}", idx));
        }
        if let Some(ref service) = filters.service {
            let idx = query.push(service);
            query.conditions.push(format!("service = ${}", idx));
        }

        query
    }

    /// Appends a parameter and returns its placeholder index.
    pub fn push(&mut self, param: &'a (dyn ToSql + Sync)) -> usize {
        self.params.push(param);
        self.params.len()
    }

    /// Empty when no filter is set, otherwise `WHERE a AND b ...`
    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn params(&self) -> &[&'a (dyn ToSql + Sync)] {
        &self.params
    }
}
