//! End-to-end pipeline for California firefighter payroll data.
//!
//! Pulls the yearly raw-export archives from publicpay.ca.gov, keeps the
//! rows whose normalized position title says firefighter, restates each
//! row's overtime pay in reference-year dollars using the BLS CPI-U
//! series, and writes the combined table as one CSV artifact.

pub mod cpi;
pub mod error;
pub mod fetch;
pub mod output;
pub mod process;
