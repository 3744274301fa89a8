mod ffmetadata;

pub use ffmetadata::build_ffmetadata;
