//! One-shot battery level read used by the scan scheduler.

use super::client::GattClient;
use super::connect::{MAX_CONNECT_ATTEMPTS, connect};
use super::driver::BatteryService;
use super::GattError;
use crate::address::{AddressType, MacAddress};
use crate::radio::Radio;
use futures::FutureExt;

/// Outcome of a battery read.
#[derive(Debug, Clone, PartialEq)]
pub enum BatteryReading {
    /// Battery level in percent
    Level(u8),
    /// The device does not offer a readable battery level
    ServiceUnavailable(GattError),
    /// The read failed for a reason that may not repeat
    TransientFailure(String),
}

/// Connect, read the Battery Level characteristic and disconnect.
///
/// The connection is closed before returning on every path.
pub async fn read_battery_level<R: Radio>(
    radio: &R,
    address: MacAddress,
    address_type: AddressType,
) -> BatteryReading {
    let link = match connect(radio, address, address_type).await {
        Ok(Some(link)) => link,
        Ok(None) => {
            return BatteryReading::TransientFailure(format!(
                "no connection after {MAX_CONNECT_ATTEMPTS} attempts"
            ));
        }
        Err(error) => return BatteryReading::TransientFailure(error.to_string()),
    };

    let result = GattClient::new(link)
        .run(|client| {
            async move {
                let mut battery = BatteryService::open(client).await?;
                battery.level().await
            }
            .boxed()
        })
        .await;

    match result {
        Ok(level) => BatteryReading::Level(level),
        Err(error) if error.is_unsupported() => BatteryReading::ServiceUnavailable(error),
        Err(error) => BatteryReading::TransientFailure(error.to_string()),
    }
}
