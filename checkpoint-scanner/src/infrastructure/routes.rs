//! Registry endpoints, relative to the configured base URL.

pub mod auth {
    pub const LOGIN: &str = "auth-service/auth/login";
    pub const REFRESH: &str = "auth-service/auth/refresh-token";
}

pub mod workers {
    /// Validates a document number against the nominal roll.
    pub const VALIDATE_DOCUMENT: &str = "trabajadores-service/operario/document-number";
    /// Records an entry/exit for a roll entry.
    pub const REGISTER_EVENT: &str = "trabajadores-service/ingreso/";
    /// Establishment history, paged with `sort`, `page` and `size`.
    pub const HISTORY: &str = "trabajadores-service/ingreso/district";
}

pub mod headers {
    pub const ESTABLISHMENT: &str = "X-Establecimiento-Id";
    pub const ROLE: &str = "X-Rol";
}
