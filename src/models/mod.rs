//! Record types stored in the portal database

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::Table;

pub mod patient;
pub mod settings;
pub mod user;

pub use patient::{Gender, NewPatient, Patient};
pub use settings::{PatientViewSettings, SortDirection, Theme, UserSettings};
pub use user::User;

/// A row type and the table it lives in
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: Table;
}

impl Record for User {
    const TABLE: Table = Table::Users;
}

impl Record for UserSettings {
    const TABLE: Table = Table::UsersSettings;
}

impl Record for Patient {
    const TABLE: Table = Table::Patients;
}

impl Record for PatientViewSettings {
    const TABLE: Table = Table::PatientsViewSettings;
}
