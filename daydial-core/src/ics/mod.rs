//! ICS file generation and parsing.
//!
//! Used by the calendar directory store to read and write one event per
//! .ics file according to RFC 5545.

mod generate;
mod parse;

pub use generate::generate_ics;
pub use parse::parse_ics;
