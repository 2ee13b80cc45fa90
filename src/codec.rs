//! # MCP4728 Register Codec
//!
//! Pure functions that turn channel state into the bytes the MCP4728 expects
//! on the wire, and turn the 24-byte status block back into channel state.
//!
//! Nothing in here touches the bus. The functions assume their inputs have
//! already been validated by the caller (raw values are masked to 12 bits so
//! a bad value can never corrupt the flag bits, but it will be truncated).

use crate::{Channel, ChannelState, Gain, PowerDown, Vref};

//
// Public Data
//

/// Length of the block returned by a plain read of the device.
///
/// Four groups of six bytes, one group per channel in the order A, B, C, D.
pub const STATUS_BLOCK_LEN: usize = 24;

/// Length of one channel's group within the status block.
///
/// Three bytes of output register followed by three bytes of EEPROM mirror.
pub const STATUS_GROUP_LEN: usize = 6;

/// Length of the payload written by [`build_multi_eeprom_payload`].
pub const MULTI_EEPROM_PAYLOAD_LEN: usize = 9;

/// Leading byte of a multi-channel EEPROM write, starting at channel A.
///
/// This is the *Sequential Write* command `0 1 0 1 0 DAC1 DAC0 UDAC` with
/// channel A selected and UDAC clear.
pub const CHANNEL_A_MULTI_EEPROM: u8 = 0x50;

/// The reserved I²C address that all devices listening for General Calls
/// respond to.
pub const GENERAL_CALL_ADDRESS: u8 = 0x00;

/// Largest 12-bit value a channel accepts.
pub const MAX_RAW_VALUE: u16 = 0x0FFF;

//
// Private Data
//

/// `0 1 0 0 0 DAC1 DAC0 UDAC`
const COMMAND_SINGLE_WRITE: u8 = 0b0100_0000;
/// `1 0 0 X VA VB VC VD`
const COMMAND_WRITE_VREF: u8 = 0b1000_0000;
/// `1 1 0 X GA GB GC GD`
const COMMAND_WRITE_GAIN: u8 = 0b1100_0000;

const VREF_BIT: u8 = 1 << 7;
const POWER_DOWN_MASK: u8 = 0b11 << 5;
const GAIN_BIT: u8 = 1 << 4;
const VALUE_HIGH_MASK: u8 = 0x0F;

//
// Public Types
//

/// Commands sent as the single payload byte of a General Call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GeneralCall {
    /// Reload every register from EEPROM, as on power-up.
    Reset = 0x06,
    /// Clear the power-down bits of every channel.
    WakeUp = 0x09,
    /// Latch every input register into its output.
    SoftwareUpdate = 0x08,
    /// Ask the device to report its own I²C address.
    ReadAddress = 0x0C,
}

//
// Public Functions
//

/// Decode the output-register half of each group in a status block.
///
/// In each group the first byte carries the flags (VREF in bit 7, power-down
/// in bits 6-5, gain in bit 4) and the value is
/// `((group[1] & 0x0F) << 8) | group[2]`. The EEPROM mirror in bytes 3-5 is
/// skipped; see [`decode_eeprom_mirror`].
pub fn decode_status_block(bytes: &[u8; STATUS_BLOCK_LEN]) -> [ChannelState; 4] {
    let mut states = [ChannelState::default(); 4];
    for (state, group) in states.iter_mut().zip(bytes.chunks_exact(STATUS_GROUP_LEN)) {
        *state = decode_fields(group[0], group[1], group[2]);
    }
    states
}

/// Decode the EEPROM mirror half (bytes 3-5) of each group in a status block.
///
/// Uses the same layout as [`decode_status_block`].
pub fn decode_eeprom_mirror(bytes: &[u8; STATUS_BLOCK_LEN]) -> [ChannelState; 4] {
    let mut states = [ChannelState::default(); 4];
    for (state, group) in states.iter_mut().zip(bytes.chunks_exact(STATUS_GROUP_LEN)) {
        *state = decode_fields(group[3], group[4], group[5]);
    }
    states
}

/// Decode the two bytes produced by [`encode_channel_value`].
pub fn decode_channel_value(bytes: [u8; 2]) -> ChannelState {
    decode_fields(bytes[0], bytes[0], bytes[1])
}

/// Pack a channel's value, VREF and gain into the two-byte header+value
/// layout. The power-down bits are always written as zero.
pub fn encode_channel_value(state: &ChannelState) -> [u8; 2] {
    let mut bytes = (state.raw_value & MAX_RAW_VALUE).to_be_bytes();
    bytes[0] |= (state.vref as u8) << 7;
    bytes[0] |= (state.gain as u8) << 4;
    bytes
}

/// Prefix an encoded value with the command byte that writes it to one
/// channel and updates the output immediately (UDAC clear).
pub fn build_single_write_command(channel: Channel, encoded: [u8; 2]) -> [u8; 3] {
    [
        COMMAND_SINGLE_WRITE | ((channel as u8) << 1),
        encoded[0],
        encoded[1],
    ]
}

/// Build the one-byte command that sets the VREF bit of all four channels.
pub fn build_sync_vref_command(a: Vref, b: Vref, c: Vref, d: Vref) -> u8 {
    COMMAND_WRITE_VREF | ((a as u8) << 3) | ((b as u8) << 2) | ((c as u8) << 1) | (d as u8)
}

/// Build the one-byte command that sets the gain bit of all four channels.
pub fn build_sync_gain_command(a: Gain, b: Gain, c: Gain, d: Gain) -> u8 {
    COMMAND_WRITE_GAIN | ((a as u8) << 3) | ((b as u8) << 2) | ((c as u8) << 1) | (d as u8)
}

/// Build the payload that writes all four channels to their input registers
/// and EEPROM in one transaction.
pub fn build_multi_eeprom_payload(states: &[ChannelState; 4]) -> [u8; MULTI_EEPROM_PAYLOAD_LEN] {
    let mut payload = [0; MULTI_EEPROM_PAYLOAD_LEN];
    payload[0] = CHANNEL_A_MULTI_EEPROM;
    for (chunk, state) in payload[1..].chunks_exact_mut(2).zip(states.iter()) {
        chunk.copy_from_slice(&encode_channel_value(state));
    }
    payload
}

/// Interpret the reply to [`GeneralCall::ReadAddress`].
///
/// The device answers `1 1 0 0 A2 A1 A0 1`. Returns the 7-bit address it
/// reported, or `None` if the byte doesn't have that shape.
pub fn decode_address_response(response: u8) -> Option<u8> {
    if response & 0xF1 == 0xC1 {
        Some(response >> 1)
    } else {
        None
    }
}

//
// Private Functions
//

fn decode_fields(flags: u8, high: u8, low: u8) -> ChannelState {
    ChannelState {
        raw_value: u16::from_be_bytes([high & VALUE_HIGH_MASK, low]),
        vref: if flags & VREF_BIT != 0 {
            Vref::Internal
        } else {
            Vref::Supply
        },
        gain: if flags & GAIN_BIT != 0 {
            Gain::X2
        } else {
            Gain::X1
        },
        power_state: PowerDown::from_bits((flags & POWER_DOWN_MASK) >> 5),
    }
}


//
// End of file
//
