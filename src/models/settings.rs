//! Per-user preferences

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub id: String,
    pub user_id: String,
    pub theme: Theme,
    pub language: String,
    pub timezone: String,
    pub email_notifications: bool,
    pub sms_notifications: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortDirection::Asc)
    }
}

/// How the patients table is laid out for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientViewSettings {
    pub id: String,
    pub user_id: String,
    pub visible_columns: Vec<String>,
    pub column_order: Vec<String>,
    pub sort_column: String,
    pub sort_direction: SortDirection,
    /// Saved filter object, in the same JSON shape `Filters::from_json` reads
    #[serde(default)]
    pub filters: Map<String, Value>,
    pub page_size: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientViewSettings {
    pub fn saved_filters(&self) -> crate::db::Filters {
        crate::db::Filters::from_json(&Value::Object(self.filters.clone()))
    }

    /// Select options reproducing the saved sort and page size. Page numbers
    /// past the addressable range clamp to the last representable offset.
    pub fn select_options(&self, page: u64) -> crate::db::SelectOptions {
        let page_size = u64::from(self.page_size);
        let order = crate::db::OrderBy {
            column: self.sort_column.clone(),
            ascending: self.sort_direction.is_ascending(),
        };
        crate::db::SelectOptions::default()
            .order_by(order)
            .limit(page_size)
            .offset(page.saturating_mul(page_size))
    }
}
