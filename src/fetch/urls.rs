use std::fmt;

/// Years the raw-export archive actually covers.
pub const YEARS: std::ops::RangeInclusive<u16> = 2009..=2020;

/// The four kinds of employer publicpay.ca.gov publishes exports for.
///
/// The variant spelling matters: it appears verbatim in the export file
/// names on the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityType {
    City,
    County,
    SpecialDistrict,
    StateDepartment,
}

pub const ENTITY_TYPES: [EntityType; 4] = [
    EntityType::City,
    EntityType::County,
    EntityType::SpecialDistrict,
    EntityType::StateDepartment,
];

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::City => "City",
            EntityType::County => "County",
            EntityType::SpecialDistrict => "SpecialDistrict",
            EntityType::StateDepartment => "StateDepartment",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL of one year's raw export for one employer type.
pub fn export_url(year: u16, entity: EntityType) -> String {
    format!("https://publicpay.ca.gov/RawExport/{year}_{entity}.zip")
}

/// Every export URL in the archive, year-major.
pub fn all_export_urls() -> Vec<String> {
    YEARS
        .flat_map(|year| ENTITY_TYPES.iter().map(move |entity| export_url(year, *entity)))
        .collect()
}
