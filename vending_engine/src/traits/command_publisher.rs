use crate::dispense_objects::DispenseCommand;

/// Delivers commands to a machine.
#[allow(async_fn_in_trait)]
pub trait CommandPublisher {
    /// Whether the transport currently has a live connection to the broker.
    fn is_connected(&self) -> bool;

    /// Publishes a dispense command to the given machine.
    ///
    /// Returns `false` if the command could not be handed to the transport (e.g. the broker connection is down).
    /// This method never fails with an error; callers decide from the return value whether to park the order.
    async fn publish_dispense_command(&self, machine_id: &str, command: &DispenseCommand) -> bool;
}
