mod request_id;

pub use request_id::{request_id_layer, RequestSpan, X_REQUEST_ID};
