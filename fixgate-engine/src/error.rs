/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Default error handling.
//!
//! Workers never let an error unwind across a thread boundary: everything
//! runtime goes through the [`ErrorHandler`] and the offending session is
//! disconnected. The default handler logs and moves on.

use fixgate_core::error::{ErrorHandler, GatewayError};
use tracing::error;

/// Error handler that reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn on_error(&self, err: &GatewayError) {
        error!(%err, "gateway error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::error::DecodeError;

    #[test]
    fn test_logging_handler_does_not_panic() {
        LoggingErrorHandler.on_error(&GatewayError::Decode(DecodeError::Incomplete));
    }
}
