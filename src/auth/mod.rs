mod extractors;

pub use extractors::{ApiKey, API_KEY_HEADER};
