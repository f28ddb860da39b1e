use chrono::{DateTime, Utc};

/// Filter over the whole event log.
///
/// Used by read-side scans that have no aggregate id to start from, such as
/// enumerating registered tables or pending deferred payments.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by stream family.
    pub aggregate_type: Option<String>,

    /// Filter by event types (any of these types).
    pub event_types: Option<Vec<String>>,

    /// Events at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Events at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of events to return.
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query for one event type within a stream family.
    pub fn of(aggregate_type: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: Some(aggregate_type.into()),
            event_types: Some(vec![event_type.into()]),
            ..Default::default()
        }
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if an event with these attributes passes the filter.
    pub fn matches(&self, aggregate_type: &str, event_type: &str, timestamp: DateTime<Utc>) -> bool {
        if let Some(ref wanted) = self.aggregate_type
            && wanted != aggregate_type
        {
            return false;
        }
        if let Some(ref types) = self.event_types
            && !types.iter().any(|t| t == event_type)
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && timestamp > to
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn of_sets_family_and_type() {
        let query = EventQuery::of("Table", "TableRegistered");
        assert_eq!(query.aggregate_type.as_deref(), Some("Table"));
        assert_eq!(query.event_types, Some(vec!["TableRegistered".to_string()]));
    }

    #[test]
    fn matches_applies_every_filter() {
        let now = Utc::now();
        let query = EventQuery::of("DeferredPayment", "DeferredPaymentOpened")
            .from_timestamp(now - Duration::hours(1))
            .to_timestamp(now + Duration::hours(1));

        assert!(query.matches("DeferredPayment", "DeferredPaymentOpened", now));
        assert!(!query.matches("Order", "DeferredPaymentOpened", now));
        assert!(!query.matches("DeferredPayment", "DeferredPaymentResolved", now));
        assert!(!query.matches(
            "DeferredPayment",
            "DeferredPaymentOpened",
            now - Duration::hours(2)
        ));
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(EventQuery::new().matches("Anything", "AtAll", Utc::now()));
    }
}
