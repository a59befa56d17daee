//! Advertising Payload
//!
//! Assembles the legacy advertising PDU (flags, device name, appearance and the
//! advertised 16-bit service) from an [`AdvertisingConfig`] with the
//! SoftDevice's `LegacyAdvertisementBuilder`. The builder panics on overflow,
//! so the encoded size is checked first and reported as an error instead: a bad
//! configuration only costs discoverability.

use core::fmt;

use defmt::{debug, Format};
use nrf_softdevice::ble::advertisement_builder::{
    AdvertisementDataType, Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload, ServiceList, ServiceUuid16,
};

use crate::config::AdvertisingConfig;
use crate::error::AdvertisingConfigurationError;

/// Maximum legacy advertising data length
pub const MAX_ADV_DATA_LEN: usize = 31;

/// Length and type bytes in front of every AD structure
const AD_HEADER_LEN: usize = 2;

/// Flags, appearance and one 16-bit service, headers included
const FIXED_FIELDS_LEN: usize = (AD_HEADER_LEN + 1) + (AD_HEADER_LEN + 2) + (AD_HEADER_LEN + 2);

/// Encoded legacy advertising data
pub struct AdvertisingPayload {
    payload: LegacyAdvertisementPayload,
}

impl AdvertisingPayload {
    /// Bytes the payload for `device_name` occupies on air
    pub const fn encoded_len(device_name: &str) -> usize {
        FIXED_FIELDS_LEN + AD_HEADER_LEN + device_name.len()
    }

    /// Build the payload advertised at start-up
    pub fn from_config(config: &AdvertisingConfig) -> Result<Self, AdvertisingConfigurationError> {
        if config.device_name.is_empty() {
            return Err(AdvertisingConfigurationError::EmptyName);
        }
        if Self::encoded_len(config.device_name) > MAX_ADV_DATA_LEN {
            return Err(AdvertisingConfigurationError::PayloadTooLarge);
        }

        let payload = LegacyAdvertisementBuilder::new()
            .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
            .full_name(config.device_name)
            .raw(AdvertisementDataType::APPEARANCE, &config.appearance.to_le_bytes())
            .services_16(ServiceList::Complete, &[ServiceUuid16::from_u16(config.service_uuid)])
            .build();

        let payload = Self { payload };
        debug!("ADV: payload assembled, {} bytes", payload.len());
        Ok(payload)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl PartialEq for AdvertisingPayload {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for AdvertisingPayload {}

impl fmt::Debug for AdvertisingPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AdvertisingPayload").field(&self.as_bytes()).finish()
    }
}

impl Format for AdvertisingPayload {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:#x}", self.as_bytes())
    }
}
