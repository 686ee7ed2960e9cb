// Core modules implementing rows, paging, scanning, envelopes, and error modeling.
pub mod envelope;
pub mod error;
pub mod row;
pub mod scan;
pub mod source;
