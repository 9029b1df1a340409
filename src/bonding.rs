//! Bonding with remote devices

use std::sync::{Arc, Mutex};

use async_channel::Sender;
use tracing::{debug, info, warn};

use crate::error::ErrorKind;
use crate::platform::RemoteDevice;
use crate::util::defer;
use crate::{Address, BondState, Error, Result};

struct BondSlot {
    token: u64,
    target: Address,
    outcome: Sender<Result<bool>>,
}

#[derive(Default)]
struct SlotState {
    next_token: u64,
    active: Option<BondSlot>,
}

/// Runs bonding attempts, at most one at a time for the whole host.
///
/// The outcome of an attempt arrives asynchronously as a bond state change for the target device; the slot holding the
/// attempt is released exactly once, when the outcome arrives, when starting the bond fails or when the waiting future
/// is dropped.
#[derive(Default)]
pub struct BondCoordinator {
    slot: Mutex<SlotState>,
}

impl std::fmt::Debug for BondCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock().unwrap();
        f.debug_struct("BondCoordinator")
            .field("target", &slot.active.as_ref().map(|s| &s.target))
            .finish()
    }
}

impl BondCoordinator {
    /// Creates a coordinator with no bonding attempt outstanding.
    pub fn new() -> Self {
        Default::default()
    }

    /// Bonds with `device`.
    ///
    /// Resolves to `true` once the device reports [`BondState::Bonded`] and `false` if it falls back to
    /// [`BondState::None`]. Fails with [`BondError`][ErrorKind::BondError] while another bonding attempt is
    /// outstanding or if the OS refuses to start bonding.
    pub async fn bond(&self, device: Arc<dyn RemoteDevice>) -> Result<bool> {
        let address = device.address();
        let (sender, outcome) = async_channel::bounded(1);
        let token = {
            let mut slot = self.slot.lock().unwrap();
            if slot.active.is_some() {
                return Err(Error::new(
                    ErrorKind::BondError,
                    None,
                    "another bonding process is ongoing from local device",
                ));
            }
            slot.next_token += 1;
            let token = slot.next_token;
            slot.active = Some(BondSlot {
                token,
                target: address.clone(),
                outcome: sender,
            });
            token
        };
        debug!("registered bond state observer for {address}");

        let release = defer(|| self.release(token));

        if !device.create_bond() {
            return Err(Error::new(ErrorKind::BondError, None, "error starting bonding process"));
        }

        let outcome = outcome.recv().await;
        release.defuse();
        match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::new(
                ErrorKind::BondError,
                None,
                "bonding process was abandoned",
            )),
        }
    }

    fn release(&self, token: u64) {
        let mut slot = self.slot.lock().unwrap();
        if slot.active.as_ref().is_some_and(|s| s.token == token) {
            let released = slot.active.take();
            drop(slot);
            if let Some(released) = released {
                debug!("unregistered bond state observer for {}", released.target);
            }
        }
    }

    /// Feeds a bond state change reported by the OS. Returns `true` if it completed the outstanding attempt.
    ///
    /// Changes for devices other than the target, and the intermediate [`BondState::Bonding`], are ignored.
    pub fn on_bond_state_changed(&self, address: &Address, state: BondState) -> bool {
        let completed = {
            let mut slot = self.slot.lock().unwrap();
            let targeted = slot.active.as_ref().is_some_and(|s| s.target == *address);
            if !targeted || state == BondState::Bonding {
                return false;
            }
            slot.active.take()
        };
        let Some(completed) = completed else {
            return false;
        };

        let outcome = match state {
            BondState::Bonded => {
                info!("bonded with {address}");
                Ok(true)
            }
            BondState::None => {
                info!("bonding with {address} did not succeed");
                Ok(false)
            }
            state => {
                warn!("unexpected bond state {} for {address}", state.code());
                Err(Error::new(
                    ErrorKind::BondError,
                    None,
                    "invalid bond state while bonding",
                ))
            }
        };
        debug!("unregistered bond state observer for {address}");
        // the waiting future may already be gone
        let _ = completed.outcome.try_send(outcome);
        true
    }

    /// Whether a bonding attempt is outstanding
    pub fn is_bonding(&self) -> bool {
        self.slot.lock().unwrap().active.is_some()
    }

    /// Removes the bonding record of `device`.
    pub fn unbond(&self, device: &dyn RemoteDevice) -> Result<bool> {
        device
            .remove_bond()
            .map_err(|e| Error::new(ErrorKind::BondError, Some(Box::new(e)), "error while unbonding"))
    }
}
