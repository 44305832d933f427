pub mod danger;
pub mod dispatcher;
pub mod ingestion;
