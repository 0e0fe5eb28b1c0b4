pub mod gateway;
pub mod grading;
pub mod http_gateway;
pub mod modal;
pub mod upload;
