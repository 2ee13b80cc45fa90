//! # MCP4728 Driver
//!
//! This is a driver for the Microchip MCP4728 quad-channel, 12-bit
//! digital-to-analog converter, controlled over I²C.
//!
//! Each of the four channels (A to D) has:
//!
//! * A 12-bit output value
//! * A voltage reference: either VDD or the internal 2.048V reference
//! * A gain of x1 or x2, which only applies to the internal reference
//! * A power-down mode, which this driver reads back but does not set
//!
//! The [`Mcp4728`] object reads the device's registers once when it is
//! created and keeps a cache of each channel's state. Every setter writes to
//! the chip straight away, and the cache is only updated once the bus reports
//! that the write succeeded.
//!
//! The byte-level encoding lives in the [`codec`] module, which has no I/O.
//!
//! # Example
//!
//! You might drive the DAC like this:
//!
//! ```rust
//! # use embedded_hal::blocking::i2c::{Read, Write};
//! # struct I2c;
//! # impl Write for I2c {
//! #     type Error = ();
//! #     fn write(&mut self, _address: u8, _bytes: &[u8]) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! # impl Read for I2c {
//! #     type Error = ();
//! #     fn read(&mut self, _address: u8, _buffer: &mut [u8]) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! # struct Delay;
//! # impl embedded_hal::blocking::delay::DelayMs<u8> for Delay {
//! #     fn delay_ms(&mut self, _ms: u8) {}
//! # }
//! # let i2c = I2c;
//! # let mut delay = Delay;
//! use mcp4728::{BusAddress, Channel, Gain, Mcp4728, Vref};
//!
//! let mut dac = match Mcp4728::new(i2c, BusAddress::Default) {
//!     Ok(dac) => dac,
//!     Err(_e) => {
//!         // DAC didn't respond
//!         return;
//!     }
//! };
//! // Full scale on A, half of VDD on B
//! dac.set_scaled_value(Channel::A, 65535).unwrap();
//! dac.set_normalized_value(Channel::B, 0.5).unwrap();
//! // 0 to 4.096V on C
//! dac.set_vref(Channel::C, Vref::Internal).unwrap();
//! dac.set_gain(Channel::C, Gain::X2).unwrap();
//! dac.set_raw_value(Channel::C, 1000).unwrap();
//! // Keep these settings across power cycles
//! dac.save_settings(&mut delay).unwrap();
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]

use embedded_hal::blocking::{delay::DelayMs, i2c};

pub mod codec;

pub use codec::MAX_RAW_VALUE;

//
// Public Types
//

/// The MCP4728 leaves the factory at one of two I²C addresses, depending on
/// the part number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusAddress {
    /// The address of a standard MCP4728
    Default = 0x60,
    /// The address of an MCP4728A4
    A4 = 0x64,
}

/// Selects one of the four DAC outputs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Output A
    A = 0,
    /// Output B
    B = 1,
    /// Output C
    C = 2,
    /// Output D
    D = 3,
}

/// Where a channel gets its full-scale voltage from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Vref {
    /// Full scale tracks the supply voltage (VDD). Gain is ignored.
    Supply = 0,
    /// Full scale is the internal 2.048V reference, times the gain.
    Internal = 1,
}

/// The output gain of a channel.
///
/// Only has an effect when the channel uses [`Vref::Internal`]. With a gain
/// of x1 the output spans 0 to 2.048V, with x2 it spans 0 to 4.096V.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    /// Gain of x1
    X1 = 0,
    /// Gain of x2
    X2 = 1,
}

/// The power-down mode reported for a channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerDown {
    /// Powered on
    Normal = 0,
    /// Powered down, output pulled to ground through 1 kΩ
    Pulldown1K = 1,
    /// Powered down, output pulled to ground through 100 kΩ
    Pulldown100K = 2,
    /// Powered down, output pulled to ground through 500 kΩ
    Pulldown500K = 3,
}

/// Everything we know about one channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelState {
    /// The 12-bit output value, from 0 to [`MAX_RAW_VALUE`]
    pub raw_value: u16,
    /// The voltage reference
    pub vref: Vref,
    /// The output gain
    pub gain: Gain,
    /// The power-down mode, as last reported by the device
    pub power_state: PowerDown,
}

/// Both halves of the device's status block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusBlock {
    /// What each channel is currently outputting, indexed by [`Channel`]
    pub output: [ChannelState; 4],
    /// What each channel will load from EEPROM on reset, indexed by [`Channel`]
    pub eeprom: [ChannelState; 4],
}

/// A number could not be turned into a [`Gain`] or [`Vref`].
///
/// Holds the value that was rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidEnum(pub u8);

/// The errors this driver can report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// A value was outside the range the field accepts. Nothing was sent.
    OutOfRange,
    /// A gain or reference wasn't one of the recognised values. Nothing was
    /// sent.
    InvalidEnum,
    /// The I²C bus reported an error. Not retried.
    Communication(E),
    /// The device reported a different address to the one we expected.
    DeviceNotFound,
}

/// Represents an MCP4728 on an I²C bus.
pub struct Mcp4728<I2C> {
    i2c: I2C,
    bus_address: u8,
    channels: [ChannelState; 4],
}

//
// Public Data
//

/// How long the device is busy after an EEPROM write, in milliseconds.
///
/// The device ignores commands until this has elapsed.
pub const EEPROM_WRITE_TIME_MS: u8 = 15;

//
// Private Data
//

/// The lowest and highest addresses the A2..A0 EEPROM bits can select.
const ADDRESS_RANGE: core::ops::RangeInclusive<u8> = 0x60..=0x67;

/// Largest value accepted by [`Mcp4728::set_scaled_value`].
const MAX_SCALED_VALUE: u32 = 0xFFFF;

//
// impls on Public Types
//

impl From<BusAddress> for u8 {
    fn from(addr: BusAddress) -> u8 {
        addr as u8
    }
}

impl Channel {
    /// All four channels, in wire order.
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];

    fn index(self) -> usize {
        self as usize
    }
}

impl Vref {
    /// Returns true if `value` is the wire encoding of a [`Vref`].
    pub fn is_valid(value: u8) -> bool {
        Vref::try_from(value).is_ok()
    }

    /// A human-readable name for this reference.
    pub fn description(self) -> &'static str {
        match self {
            Vref::Supply => "VDD",
            Vref::Internal => "Internal 2.048V",
        }
    }
}

impl TryFrom<u8> for Vref {
    type Error = InvalidEnum;

    /// Accepts the wire encoding: 0 for VDD, 1 for internal.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Vref::Supply),
            1 => Ok(Vref::Internal),
            _ => Err(InvalidEnum(value)),
        }
    }
}

impl Gain {
    /// The multiplication factor, 1 or 2.
    pub fn multiplier(self) -> u8 {
        match self {
            Gain::X1 => 1,
            Gain::X2 => 2,
        }
    }
}

impl TryFrom<u8> for Gain {
    type Error = InvalidEnum;

    /// Accepts the multiplication factor, 1 or 2.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Gain::X1),
            2 => Ok(Gain::X2),
            _ => Err(InvalidEnum(value)),
        }
    }
}

impl PowerDown {
    /// Decode the two PD1/PD0 bits. Anything above bit 1 is ignored.
    pub fn from_bits(bits: u8) -> PowerDown {
        match bits & 0b11 {
            0b00 => PowerDown::Normal,
            0b01 => PowerDown::Pulldown1K,
            0b10 => PowerDown::Pulldown100K,
            _ => PowerDown::Pulldown500K,
        }
    }
}

impl ChannelState {
    /// The value scaled to the 16-bit range, so 4095 reads as 65535.
    ///
    /// Passing this to [`Mcp4728::set_scaled_value`] gives back the same
    /// raw value.
    pub fn scaled_value(&self) -> u16 {
        let raw = u32::from(self.raw_value);
        // Round to nearest
        ((raw * MAX_SCALED_VALUE + u32::from(MAX_RAW_VALUE) / 2) / u32::from(MAX_RAW_VALUE))
            as u16
    }

    /// The value as a fraction of full scale, from 0.0 to 1.0.
    pub fn normalized_value(&self) -> f32 {
        f32::from(self.raw_value) / f32::from(MAX_RAW_VALUE)
    }

    /// The nominal output voltage in millivolts, given the supply voltage.
    ///
    /// This ignores the power-down mode.
    pub fn output_millivolts(&self, supply_mv: u32) -> u32 {
        let full_scale_mv = match self.vref {
            Vref::Supply => supply_mv,
            Vref::Internal => 2048 * u32::from(self.gain.multiplier()),
        };
        // The product can exceed 32 bits
        (u64::from(full_scale_mv) * u64::from(self.raw_value) / 4096) as u32
    }
}

impl Default for ChannelState {
    /// Zero output on VDD, gain x1, powered on.
    fn default() -> Self {
        ChannelState {
            raw_value: 0,
            vref: Vref::Supply,
            gain: Gain::X1,
            power_state: PowerDown::Normal,
        }
    }
}

impl<E> From<InvalidEnum> for Error<E> {
    fn from(_: InvalidEnum) -> Self {
        Error::InvalidEnum
    }
}

impl<I2C> Mcp4728<I2C> {
    /// Get the I²C address this driver talks to.
    pub fn bus_address(&self) -> u8 {
        self.bus_address
    }

    /// Get a copy of the cached state of one channel.
    pub fn channel(&self, channel: Channel) -> ChannelState {
        self.channels[channel.index()]
    }

    /// Get a copy of the cached state of all four channels.
    pub fn channels(&self) -> [ChannelState; 4] {
        self.channels
    }

    /// Get the cached 12-bit value of a channel.
    pub fn raw_value(&self, channel: Channel) -> u16 {
        self.channel(channel).raw_value
    }

    /// Get the cached value of a channel, scaled to 16 bits.
    ///
    /// See [`ChannelState::scaled_value`].
    pub fn scaled_value(&self, channel: Channel) -> u16 {
        self.channel(channel).scaled_value()
    }

    /// Get the cached value of a channel, from 0.0 to 1.0.
    pub fn normalized_value(&self, channel: Channel) -> f32 {
        self.channel(channel).normalized_value()
    }

    /// Get the cached gain of a channel.
    pub fn gain(&self, channel: Channel) -> Gain {
        self.channel(channel).gain
    }

    /// Get the cached voltage reference of a channel.
    pub fn vref(&self, channel: Channel) -> Vref {
        self.channel(channel).vref
    }

    /// Get the power-down mode of a channel, as last read from the device.
    pub fn power_state(&self, channel: Channel) -> PowerDown {
        self.channel(channel).power_state
    }

    /// Destroy the driver and hand back the I²C bus.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> Mcp4728<I2C>
where
    I2C: i2c::Read<Error = E> + i2c::Write<Error = E>,
{
    /// Create a driver for an MCP4728 at one of its factory addresses.
    ///
    /// Reads the device's registers to fill the cache, so the device must be
    /// on the bus.
    pub fn new(i2c: I2C, bus_address: BusAddress) -> Result<Self, Error<E>> {
        Self::new_with_address(i2c, bus_address.into())
    }

    /// Create a driver for an MCP4728 whose address bits have been
    /// reprogrammed. Accepts 0x60 to 0x67.
    pub fn new_with_address(i2c: I2C, bus_address: u8) -> Result<Self, Error<E>> {
        if !ADDRESS_RANGE.contains(&bus_address) {
            return Err(Error::OutOfRange);
        }
        let mut dac = Mcp4728 {
            i2c,
            bus_address,
            channels: [ChannelState::default(); 4],
        };
        dac.refresh()?;
        Ok(dac)
    }

    /// Re-read the device's output registers and replace the cache with them.
    ///
    /// Useful after [`Mcp4728::reset`], which reloads the outputs from EEPROM.
    /// The cache is untouched if the read fails.
    pub fn refresh(&mut self) -> Result<(), Error<E>> {
        let block = self.read_status_block()?;
        self.channels = codec::decode_status_block(&block);
        Ok(())
    }

    /// Read both the output registers and the EEPROM contents of every
    /// channel. Does not touch the cache.
    pub fn read_status(&mut self) -> Result<StatusBlock, Error<E>> {
        let block = self.read_status_block()?;
        Ok(StatusBlock {
            output: codec::decode_status_block(&block),
            eeprom: codec::decode_eeprom_mirror(&block),
        })
    }

    /// Set the 12-bit output value of a channel, from 0 to [`MAX_RAW_VALUE`].
    ///
    /// The output changes as soon as the write completes. The channel's VREF
    /// and gain are written alongside the value, and the channel is powered
    /// up.
    pub fn set_raw_value(&mut self, channel: Channel, value: u16) -> Result<(), Error<E>> {
        if value > MAX_RAW_VALUE {
            return Err(Error::OutOfRange);
        }
        let mut state = self.channel(channel);
        state.raw_value = value;
        let command =
            codec::build_single_write_command(channel, codec::encode_channel_value(&state));
        self.write_bytes(self.bus_address, &command)?;
        // The write carries PD1 = PD0 = 0
        state.power_state = PowerDown::Normal;
        self.channels[channel.index()] = state;
        Ok(())
    }

    /// Set the output of a channel using a 16-bit value.
    ///
    /// The MCP4728 is a 12-bit part, so the bottom four bits are dropped.
    pub fn set_scaled_value(&mut self, channel: Channel, value: u16) -> Result<(), Error<E>> {
        self.set_raw_value(channel, value >> 4)
    }

    /// Set the output of a channel as a fraction of full scale, from 0.0 to
    /// 1.0. Rounds to the nearest step.
    pub fn set_normalized_value(&mut self, channel: Channel, value: f32) -> Result<(), Error<E>> {
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::OutOfRange);
        }
        // `value` is non-negative, so adding a half and truncating rounds
        let raw_value = (value * f32::from(MAX_RAW_VALUE) + 0.5) as u16;
        self.set_raw_value(channel, raw_value)
    }

    /// Set the gain of one channel.
    ///
    /// The gain bits of all four channels are sent in one command, so the
    /// other three channels are rewritten from the cache.
    pub fn set_gain(&mut self, channel: Channel, gain: Gain) -> Result<(), Error<E>> {
        let mut gains = self.channels.map(|state| state.gain);
        gains[channel.index()] = gain;
        self.write_gains(gains)
    }

    /// Set the voltage reference of one channel.
    ///
    /// As with [`Mcp4728::set_gain`], the other three channels are rewritten
    /// from the cache.
    pub fn set_vref(&mut self, channel: Channel, vref: Vref) -> Result<(), Error<E>> {
        let mut vrefs = self.channels.map(|state| state.vref);
        vrefs[channel.index()] = vref;
        self.write_vrefs(vrefs)
    }

    /// Send the cached gain of every channel to the device.
    pub fn sync_gains(&mut self) -> Result<(), Error<E>> {
        self.write_gains(self.channels.map(|state| state.gain))
    }

    /// Send the cached voltage reference of every channel to the device.
    pub fn sync_vrefs(&mut self) -> Result<(), Error<E>> {
        self.write_vrefs(self.channels.map(|state| state.vref))
    }

    /// Store the cached value, VREF and gain of every channel in EEPROM, so
    /// the device starts up with them.
    ///
    /// All four channels are written in one transaction. The device is then
    /// busy for [`EEPROM_WRITE_TIME_MS`], and this function blocks on `delay`
    /// until it is ready again.
    pub fn save_settings<D>(&mut self, delay: &mut D) -> Result<(), Error<E>>
    where
        D: DelayMs<u8>,
    {
        let payload = codec::build_multi_eeprom_payload(&self.channels);
        self.write_bytes(self.bus_address, &payload)?;
        delay.delay_ms(EEPROM_WRITE_TIME_MS);
        for state in self.channels.iter_mut() {
            state.power_state = PowerDown::Normal;
        }
        Ok(())
    }

    /// Reset the device as if it had been power-cycled. Every channel is
    /// reloaded from EEPROM.
    ///
    /// This is a General Call, so every device on the bus that listens for
    /// them will reset. The cache is not updated; call
    /// [`Mcp4728::refresh`] afterwards to pick up the EEPROM values.
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        self.general_call(codec::GeneralCall::Reset)
    }

    /// Power up every channel.
    ///
    /// This is a General Call, so it affects every device on the bus that
    /// listens for them.
    pub fn wakeup(&mut self) -> Result<(), Error<E>> {
        self.general_call(codec::GeneralCall::WakeUp)?;
        for state in self.channels.iter_mut() {
            state.power_state = PowerDown::Normal;
        }
        Ok(())
    }

    /// Update every analog output from its input register at the same time.
    ///
    /// This is a General Call, so it affects every device on the bus that
    /// listens for them.
    pub fn soft_update(&mut self) -> Result<(), Error<E>> {
        self.general_call(codec::GeneralCall::SoftwareUpdate)
    }

    fn write_gains(&mut self, gains: [Gain; 4]) -> Result<(), Error<E>> {
        let command = codec::build_sync_gain_command(gains[0], gains[1], gains[2], gains[3]);
        self.write_bytes(self.bus_address, &[command])?;
        for (state, gain) in self.channels.iter_mut().zip(gains) {
            state.gain = gain;
        }
        Ok(())
    }

    fn write_vrefs(&mut self, vrefs: [Vref; 4]) -> Result<(), Error<E>> {
        let command = codec::build_sync_vref_command(vrefs[0], vrefs[1], vrefs[2], vrefs[3]);
        self.write_bytes(self.bus_address, &[command])?;
        for (state, vref) in self.channels.iter_mut().zip(vrefs) {
            state.vref = vref;
        }
        Ok(())
    }

    fn general_call(&mut self, command: codec::GeneralCall) -> Result<(), Error<E>> {
        self.write_bytes(codec::GENERAL_CALL_ADDRESS, &[command as u8])
    }

    fn read_status_block(&mut self) -> Result<[u8; codec::STATUS_BLOCK_LEN], Error<E>> {
        let mut buffer = [0; codec::STATUS_BLOCK_LEN];
        self.i2c.read(self.bus_address, &mut buffer).map_err(|e| {
            #[cfg(feature = "defmt")]
            defmt::warn!("MCP4728 0x{:02x} status read failed", self.bus_address);
            Error::Communication(e)
        })?;
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "MCP4728 0x{:02x} status {:02x}",
            self.bus_address,
            &buffer[..]
        );
        Ok(buffer)
    }

    fn write_bytes(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error<E>> {
        #[cfg(feature = "defmt")]
        defmt::debug!("MCP4728 write 0x{:02x} <- {:02x}", address, bytes);
        self.i2c.write(address, bytes).map_err(|e| {
            #[cfg(feature = "defmt")]
            defmt::warn!("MCP4728 write to 0x{:02x} failed", address);
            Error::Communication(e)
        })
    }
}

impl<I2C, E> Mcp4728<I2C>
where
    I2C: i2c::Read<Error = E> + i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
{
    /// Like [`Mcp4728::new_with_address`], but first asks the device on the
    /// bus to report its address and fails with [`Error::DeviceNotFound`] if
    /// it doesn't match.
    ///
    /// The MCP4728 only answers this query while its LDAC pin is driven
    /// through the sequence in the datasheet, so this check is best-effort.
    pub fn new_checked(mut i2c: I2C, bus_address: u8) -> Result<Self, Error<E>> {
        if !ADDRESS_RANGE.contains(&bus_address) {
            return Err(Error::OutOfRange);
        }
        let response = Self::read_reported_address(&mut i2c)?;
        match codec::decode_address_response(response) {
            Some(reported) if reported == bus_address => {}
            _ => {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "MCP4728 expected at 0x{:02x}, got reply 0x{:02x}",
                    bus_address,
                    response
                );
                return Err(Error::DeviceNotFound);
            }
        }
        Self::new_with_address(i2c, bus_address)
    }

    /// Send the General Call read-address command and return the raw reply.
    fn read_reported_address(i2c: &mut I2C) -> Result<u8, Error<E>> {
        let command = [codec::GeneralCall::ReadAddress as u8];
        let mut response = [0; 1];
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "MCP4728 write 0x{:02x} <- {:02x}, read 1",
            codec::GENERAL_CALL_ADDRESS,
            &command[..]
        );
        i2c.write_read(codec::GENERAL_CALL_ADDRESS, &command, &mut response)
            .map_err(|e| {
                #[cfg(feature = "defmt")]
                defmt::warn!("MCP4728 address query failed");
                Error::Communication(e)
            })?;
        #[cfg(feature = "defmt")]
        defmt::debug!("MCP4728 address reply 0x{:02x}", response[0]);
        Ok(response[0])
    }
}

//
// impls on Private Types
//

// None


//
// End of file
//
