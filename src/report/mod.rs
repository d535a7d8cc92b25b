//! Report rendering for the CLI views.

pub mod generator;

pub use generator::{
    generate_json_report, generate_markdown_report, write_report, Report, ReportBody, ReportMetadata,
};
