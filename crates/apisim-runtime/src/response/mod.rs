//! HTTP response construction shared by mock instances and the admin API.

mod builder;

pub use builder::{
    error_response, json_response, not_found, ErrorDetail, ErrorResponse, ResponseBuilder,
    JSON_CONTENT_TYPE,
};
