//! Linux `/dev/i2c-N` bus handle.
//!
//! The slave address is bound once when the device is opened; every write
//! and read on the handle is then one bus transaction with that device.

use std::io;
use std::path::Path;

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;

use super::I2cBus;

/// An I2C character device bound to one slave address.
pub struct LinuxI2cBus {
    device: LinuxI2CDevice,
}

impl LinuxI2cBus {
    /// Open `device` and bind it to `address`.
    pub fn open(device: &Path, address: u16) -> io::Result<Self> {
        let device = LinuxI2CDevice::new(device, address).map_err(io::Error::from)?;
        Ok(Self { device })
    }
}

impl I2cBus for LinuxI2cBus {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        I2CDevice::write(&mut self.device, bytes).map_err(io::Error::from)
    }

    fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> io::Result<()> {
        I2CDevice::write(&mut self.device, bytes).map_err(io::Error::from)?;
        I2CDevice::read(&mut self.device, buf).map_err(io::Error::from)
    }
}
