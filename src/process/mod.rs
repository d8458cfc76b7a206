pub mod adjust;
pub mod aggregate;
pub mod filter;
pub mod title;

pub use adjust::{adjust_table, parse_pay, parse_year, AdjustedRecord};
pub use aggregate::{aggregate_files, discover_source_files};
pub use filter::filter_file;
pub use title::normalize_title;

/// The seven columns consumed from each raw export, in extraction order.
/// Header matching is case-insensitive; these are the lowercased names.
pub const SOURCE_COLUMNS: [&str; 7] = [
    "year",
    "employertype",
    "employercounty",
    "employername",
    "departmentorsubdivision",
    "position",
    "overtimepay",
];

/// One retained payroll row.
///
/// Free-text fields are kept verbatim from the source except `position`,
/// which holds the normalized title the row matched on. `year` and
/// `department_or_subdivision` stay text at this stage: the raw exports mix
/// representations ("2009" vs "2009.0") that early numeric coercion would
/// mangle.
#[derive(Debug, Clone, PartialEq)]
pub struct PayrollRecord {
    pub year: String,
    pub employer_type: String,
    pub employer_county: String,
    pub employer_name: String,
    pub department_or_subdivision: String,
    pub position: String,
    pub overtime_pay: String,
}
