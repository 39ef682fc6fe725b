//! Console command dispatch used by the graceful-stop path.

use std::future::Future;
use std::pin::Pin;

use crate::rcon::RconClient;
use crate::Result;

/// Delivers console commands to the running worker.
///
/// The supervisor only needs "send this line and tell me whether it got
/// through", so it depends on this trait rather than on the RCON client
/// directly.
pub trait CommandSink: Send + Sync {
    /// Send `command` and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns an error when the command could not be delivered.
    fn dispatch<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

impl CommandSink for RconClient {
    fn dispatch<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.send_command(command))
    }
}
