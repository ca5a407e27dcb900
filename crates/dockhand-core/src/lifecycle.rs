use crate::poll::{wait_for_specific, PollPolicy};
use crate::CoreError;
use dockhand_driver::{Driver, DriverError, MachineState};
use tracing::{debug, warn};

/// Predicate that is true once the driver reports `desired`. Shared by the
/// guard and the poller.
pub fn machine_in_state(
    driver: &dyn Driver,
    desired: MachineState,
) -> impl FnMut() -> Result<bool, DriverError> + '_ {
    move || Ok(driver.get_state()? == desired)
}

/// Refuse a transition the machine has already made. A failed state query
/// is treated as "not in state" and the transition goes ahead.
pub fn guard_transition(
    name: &str,
    driver: &dyn Driver,
    desired: MachineState,
) -> Result<(), CoreError> {
    match machine_in_state(driver, desired)() {
        Ok(true) => {
            debug!("{name} is already {desired}; refusing transition");
            Err(CoreError::AlreadyInState {
                name: name.to_owned(),
                state: desired,
            })
        }
        Ok(false) => {
            debug!("{name} is not {desired}; proceeding");
            Ok(())
        }
        Err(e) => {
            warn!("state query for {name} failed before transition to {desired}: {e}");
            Ok(())
        }
    }
}

/// Guard, dispatch `action`, then poll until `desired` is observed.
/// An action error is returned as-is and no polling happens.
pub fn run_action_for_state<F>(
    name: &str,
    driver: &dyn Driver,
    desired: MachineState,
    policy: PollPolicy,
    action: F,
) -> Result<(), CoreError>
where
    F: FnOnce(&dyn Driver) -> Result<(), DriverError>,
{
    guard_transition(name, driver, desired)?;
    action(driver)?;
    wait_for_specific(policy, machine_in_state(driver, desired))?;
    Ok(())
}
