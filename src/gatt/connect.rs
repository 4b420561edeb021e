//! Connection establishment with address-type fallback.
//!
//! Consumer peripherals often advertise with one address type but only
//! accept connections on the other, depending on firmware and privacy mode.
//! A disconnect-class failure therefore flips the address type before the
//! next attempt.

use crate::address::{AddressType, MacAddress};
use crate::radio::{LinkError, Radio};

/// Maximum number of connection attempts per call.
pub const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Connect to `address`, starting with `address_type`.
///
/// Returns `Ok(None)` when every attempt ended in a disconnect-class error.
/// Any other error is returned immediately.
pub async fn connect<R: Radio>(
    radio: &R,
    address: MacAddress,
    address_type: AddressType,
) -> Result<Option<R::Link>, LinkError> {
    let mut address_type = address_type;

    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        tracing::debug!(%address, %address_type, attempt, "connecting");
        match radio.connect(address, address_type).await {
            Ok(link) => return Ok(Some(link)),
            Err(error) if error.is_disconnect() => {
                tracing::debug!(%address, %address_type, %error, "connection attempt failed");
                address_type = address_type.flipped();
            }
            Err(error) => return Err(error),
        }
    }

    tracing::info!(%address, attempts = MAX_CONNECT_ATTEMPTS, "giving up connecting");
    Ok(None)
}
