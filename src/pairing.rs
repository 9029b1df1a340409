//! Pairing request handling.
//!
//! When the OS asks for pairing input, the platform layer hands the request together with the suspended OS broadcast
//! to [`Adapter::handle_pairing_request`][crate::Adapter::handle_pairing_request].
//! Variants that need an answer are put to the application's [`PairingAuthority`]; a concrete answer is applied to the
//! device, anything else falls back to the system pairing UI.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::ErrorKind;
use crate::platform::RemoteDevice;
use crate::{Address, Error, Result};

/// The sub-protocol the remote device uses to establish trust, as numbered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum PairingVariant {
    /// The user must enter a PIN
    Pin = 0,
    /// The user must confirm that a passkey matches the one shown on the remote device
    PasskeyConfirmation = 2,
    /// The user must consent to pairing, no key is involved
    Consent = 3,
    /// A passkey must be shown to the user, who enters it on the remote device
    DisplayPasskey = 4,
    /// A PIN must be shown to the user, who enters it on the remote device
    DisplayPin = 5,
    /// A variant this crate does not handle
    #[num_enum(catch_all)]
    Unknown(i32),
}

impl PairingVariant {
    /// The platform's numeric code for this variant
    pub fn code(self) -> i32 {
        match self {
            PairingVariant::Pin => 0,
            PairingVariant::PasskeyConfirmation => 2,
            PairingVariant::Consent => 3,
            PairingVariant::DisplayPasskey => 4,
            PairingVariant::DisplayPin => 5,
            PairingVariant::Unknown(code) => code,
        }
    }

    /// Whether a local answer can influence pairing with this variant
    pub fn needs_decision(self) -> bool {
        matches!(
            self,
            PairingVariant::Pin | PairingVariant::PasskeyConfirmation | PairingVariant::Consent
        )
    }
}

/// A pairing request as presented to the [`PairingAuthority`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairingRequest {
    /// The device asking to pair
    pub address: Address,
    /// How the device wants to pair
    pub variant: PairingVariant,
    /// The passkey or PIN involved, for the confirmation and display variants
    pub pairing_key: Option<u32>,
}

/// The answer of a [`PairingAuthority`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PairingDecision {
    /// Answer a [`Pin`][PairingVariant::Pin] request with this PIN
    Pin(String),
    /// Accept or reject a confirmation or consent request
    Confirm(bool),
    /// Let the system pairing UI handle the request
    Defer,
}

/// An error indicating the pairing authority could not come to a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[non_exhaustive]
pub struct DecisionUnavailable;

impl std::fmt::Display for DecisionUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("pairing decision unavailable")
    }
}

impl std::error::Error for DecisionUnavailable {}

/// The application side of pairing, usually a prompt in the application's UI.
#[async_trait]
pub trait PairingAuthority: Send + Sync {
    /// Decide how to answer `request`.
    ///
    /// Called for the [`Pin`][PairingVariant::Pin], [`PasskeyConfirmation`][PairingVariant::PasskeyConfirmation] and
    /// [`Consent`][PairingVariant::Consent] variants. An answer that doesn't fit the variant, `Defer` or an error all
    /// hand the request to the system pairing UI.
    async fn decide(&self, _request: &PairingRequest) -> Result<PairingDecision, DecisionUnavailable> {
        Ok(PairingDecision::Defer)
    }

    /// Informs the application of a display-only request, which needs no answer.
    fn notify(&self, _request: &PairingRequest) {}
}

/// The simplest possible pairing authority.
///
/// Every request is left to the system pairing UI.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPairingUi;

#[async_trait]
impl PairingAuthority for SystemPairingUi {}

/// The OS pairing-request broadcast, suspended while the bridge decides how to answer it.
pub trait PairingBroadcast: Send {
    /// Keeps the system pairing UI from handling the request.
    fn abort(&mut self);

    /// Shows the system pairing UI for the request.
    fn launch_system_ui(&mut self);

    /// Resumes the broadcast. The bridge calls this exactly once for every broadcast it is given; the OS pairing
    /// subsystem stalls until it happens.
    fn finish(self: Box<Self>);
}

/// Owns a suspended [`PairingBroadcast`] and finishes it exactly once, at the latest when dropped.
pub struct PendingDecision {
    broadcast: Option<Box<dyn PairingBroadcast>>,
}

impl PendingDecision {
    /// Takes ownership of `broadcast`.
    pub fn new(broadcast: Box<dyn PairingBroadcast>) -> Self {
        PendingDecision {
            broadcast: Some(broadcast),
        }
    }

    fn abort(&mut self) {
        if let Some(broadcast) = &mut self.broadcast {
            broadcast.abort();
        }
    }

    fn launch_system_ui(&mut self) {
        if let Some(broadcast) = &mut self.broadcast {
            broadcast.launch_system_ui();
        }
    }

    /// Finishes the broadcast now.
    pub fn finish(mut self) {
        if let Some(broadcast) = self.broadcast.take() {
            broadcast.finish();
        }
    }
}

impl Drop for PendingDecision {
    fn drop(&mut self) {
        if let Some(broadcast) = self.broadcast.take() {
            broadcast.finish();
        }
    }
}

impl std::fmt::Debug for PendingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDecision")
            .field("finished", &self.broadcast.is_none())
            .finish()
    }
}

/// Where a pairing negotiation stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairingState {
    /// The request arrived
    Received,
    /// The pairing authority has been asked
    AwaitingDecision,
    /// The authority's answer was applied to the device
    Applied,
    /// The request was handed to the system pairing UI
    Deferred,
    /// A display-only request was passed on to the authority
    Notified,
    /// The request was dropped: handling is disabled or the variant is unknown
    Ignored,
}

/// One pairing request moving through [`PairingState`]s
#[derive(Debug, Clone)]
pub(crate) struct PairingNegotiation {
    request: PairingRequest,
    state: PairingState,
}

impl PairingNegotiation {
    fn new(request: PairingRequest) -> Self {
        PairingNegotiation {
            request,
            state: PairingState::Received,
        }
    }

    fn transition(&mut self, state: PairingState) {
        debug!(
            "pairing with {} (variant {}): {:?} -> {:?}",
            self.request.address,
            self.request.variant.code(),
            self.state,
            state
        );
        self.state = state;
    }

    fn request(&self) -> &PairingRequest {
        &self.request
    }

    fn state(&self) -> PairingState {
        self.state
    }
}

/// Answers OS pairing requests on behalf of the application while request handling is enabled.
pub struct PairingCoordinator {
    enabled: Mutex<bool>,
    authority: Arc<dyn PairingAuthority>,
}

impl std::fmt::Debug for PairingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingCoordinator")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl PairingCoordinator {
    /// Creates a coordinator, initially disabled, that consults `authority`.
    pub fn new(authority: Arc<dyn PairingAuthority>) -> Self {
        PairingCoordinator {
            enabled: Mutex::new(false),
            authority,
        }
    }

    /// Starts handling pairing requests. Fails with [`LogicError`][ErrorKind::LogicError] if already enabled.
    pub fn enable(&self) -> Result<()> {
        let mut enabled = self.enabled.lock().unwrap();
        if *enabled {
            return Err(Error::new(
                ErrorKind::LogicError,
                None,
                "pairing request handling is already enabled",
            ));
        }
        *enabled = true;
        info!("registered the pairing request observer");
        Ok(())
    }

    /// Stops handling pairing requests. Does nothing if not enabled.
    pub fn disable(&self) {
        if std::mem::replace(&mut *self.enabled.lock().unwrap(), false) {
            info!("unregistered the pairing request observer");
        }
    }

    /// Whether pairing requests are being handled
    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock().unwrap()
    }

    /// Drives one pairing request to completion and returns the state it ended in.
    ///
    /// `broadcast` is finished exactly once before this returns, or when the returned future is dropped.
    pub async fn handle(
        &self,
        device: Arc<dyn RemoteDevice>,
        variant: PairingVariant,
        pairing_key: Option<u32>,
        broadcast: Box<dyn PairingBroadcast>,
    ) -> PairingState {
        let mut pending = PendingDecision::new(broadcast);
        let mut negotiation = PairingNegotiation::new(PairingRequest {
            address: device.address(),
            variant,
            pairing_key,
        });

        if !self.is_enabled() {
            negotiation.transition(PairingState::Ignored);
            return negotiation.state();
        }
        debug!(
            "pairing request (variant {}) incoming from {}",
            variant.code(),
            negotiation.request().address
        );

        match variant {
            PairingVariant::Pin | PairingVariant::PasskeyConfirmation | PairingVariant::Consent => {
                negotiation.transition(PairingState::AwaitingDecision);
                let decision = self.authority.decide(negotiation.request()).await;
                let applied = match (variant, decision) {
                    (PairingVariant::Pin, Ok(PairingDecision::Pin(pin))) => Some(device.set_pin(pin.as_bytes())),
                    (
                        PairingVariant::PasskeyConfirmation | PairingVariant::Consent,
                        Ok(PairingDecision::Confirm(confirm)),
                    ) => Some(device.set_pairing_confirmation(confirm)),
                    (_, Ok(_)) => None,
                    (_, Err(e)) => {
                        warn!("no pairing decision for {}: {e}", negotiation.request().address);
                        None
                    }
                };
                match applied {
                    Some(Ok(())) => {
                        pending.abort();
                        negotiation.transition(PairingState::Applied);
                    }
                    Some(Err(e)) => {
                        error!(
                            "error handling pairing request from {}: {e}",
                            negotiation.request().address
                        );
                        pending.launch_system_ui();
                        negotiation.transition(PairingState::Deferred);
                    }
                    None => {
                        pending.launch_system_ui();
                        negotiation.transition(PairingState::Deferred);
                    }
                }
            }
            PairingVariant::DisplayPasskey | PairingVariant::DisplayPin => {
                self.authority.notify(negotiation.request());
                negotiation.transition(PairingState::Notified);
            }
            PairingVariant::Unknown(code) => {
                warn!("unknown pairing variant: {code}");
                negotiation.transition(PairingState::Ignored);
            }
        }

        pending.finish();
        negotiation.state()
    }
}
