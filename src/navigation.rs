//! Navigation links for the portal sidebar
//!
//! Labels are i18n keys resolved by the UI. Lists render in the order given.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Link {
    pub label: &'static str,
    pub path: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'static str>,
}

impl Link {
    pub const fn new(label: &'static str, path: &'static str) -> Self {
        Self { label, path, icon: None }
    }

    pub const fn with_icon(self, icon: &'static str) -> Self {
        Self { icon: Some(icon), ..self }
    }
}

pub const PLATFORM_LINKS: &[Link] = &[
    Link::new("common.dashboard", "/"),
    Link::new("common.patients", "/patients"),
    Link::new("common.integrations", "/integrations"),
    Link::new("common.settings", "/settings"),
];

pub const SUPPORT_LINKS: &[Link] = &[
    Link::new("common.pricing", "/plan"),
    Link::new("common.documentation", "/documentation"),
    Link::new("common.help_center", "/help"),
    Link::new("common.contact_support", "/contact_support"),
];
