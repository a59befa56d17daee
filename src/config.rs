//! Compile-time Configuration
//!
//! Defaults for the sensor, the advertising payload and the SoftDevice. Each
//! config is a plain struct so tests and alternative boards can build variants.

use embassy_time::Duration;
use nrf_softdevice::raw;

/// 8-bit read form of the sensor's bus address
pub const SENSOR_READ_ADDRESS: u8 = 0xEF;

/// 8-bit write form of the sensor's bus address
pub const SENSOR_WRITE_ADDRESS: u8 = 0xEE;

/// Identity byte the sensor reports from its who-am-I register
pub const SENSOR_IDENTITY: u8 = 0x55;

/// Environmental Sensing service
pub const ENVIRONMENTAL_SENSING_SERVICE: u16 = 0x181A;

/// Temperature characteristic
pub const TEMPERATURE_CHARACTERISTIC: u16 = 0x2A6E;

/// Generic Thermometer appearance
pub const APPEARANCE_GENERIC_THERMOMETER: u16 = 0x0300;

/// Acquisition loop configuration
#[derive(Debug, Clone, Copy)]
pub struct SensorConfig {
    pub read_address: u8,
    pub write_address: u8,
    pub expected_identity: u8,
    /// Wait between triggering a measurement and reading it back
    pub settle: Duration,
    /// Wait between the end of one cycle and the next trigger
    pub interval: Duration,
}

impl SensorConfig {
    pub const fn new() -> Self {
        Self {
            read_address: SENSOR_READ_ADDRESS,
            write_address: SENSOR_WRITE_ADDRESS,
            expected_identity: SENSOR_IDENTITY,
            settle: Duration::from_millis(5),
            interval: Duration::from_millis(5000),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How long a single advertising run lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AdvDuration {
    /// Advertise until a peer connects or advertising is stopped
    Forever,
    /// Stop after the given time if nobody connects
    Limited(Duration),
}

impl AdvDuration {
    /// SoftDevice advertising timeout in 10ms units, `None` for unbounded
    pub fn as_timeout(&self) -> Option<u16> {
        match self {
            AdvDuration::Forever => None,
            AdvDuration::Limited(d) => Some((d.as_millis() / 10).clamp(1, u16::MAX as u64) as u16),
        }
    }
}

/// Advertising payload and timing
#[derive(Debug, Clone, Copy)]
pub struct AdvertisingConfig {
    pub device_name: &'static str,
    pub appearance: u16,
    pub service_uuid: u16,
    /// Advertising interval in 0.625ms units
    pub interval: u32,
    pub duration: AdvDuration,
}

impl AdvertisingConfig {
    pub const fn new() -> Self {
        Self {
            device_name: "nRF Thermo",
            appearance: APPEARANCE_GENERIC_THERMOMETER,
            service_uuid: ENVIRONMENTAL_SENSING_SERVICE,
            interval: 400, // 250ms
            duration: AdvDuration::Forever,
        }
    }
}

impl Default for AdvertisingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// SoftDevice configuration for a single peripheral link
pub fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        ..Default::default()
    }
}
