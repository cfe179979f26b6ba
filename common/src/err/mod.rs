use crate::err::client_error::ClientError;

pub mod client_error;

pub type CResult<T> = Result<T, ClientError>;
