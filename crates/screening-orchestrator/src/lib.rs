pub mod listing;
pub mod run;

pub use listing::{normalize_market, parse_listing, CsvInstrumentListing};
pub use run::{RunReport, ScreeningRun};
