//! Sensor register map

/// Who-am-I register (read-only)
pub const IDENTITY: u8 = 0xD0;

/// Control register 1: enable and output byte order
pub const CTRL1: u8 = 0x20;

/// Control register 2: measurement trigger
pub const CTRL2: u8 = 0xF4;

/// Measurement result, most significant byte
pub const RESULT_HIGH: u8 = 0xF6;

/// Measurement result, least significant byte
pub const RESULT_LOW: u8 = 0xF7;

/// CTRL1 value: sensor on, high byte first
pub const CTRL1_ENABLE_MSB_FIRST: u8 = 0x84;

/// CTRL2 value: start a single temperature measurement
pub const CTRL2_ONE_SHOT: u8 = 0x2E;
