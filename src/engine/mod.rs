pub mod assignment;
pub mod housekeeping;
pub mod ingest;
pub mod intake;
pub mod status;
