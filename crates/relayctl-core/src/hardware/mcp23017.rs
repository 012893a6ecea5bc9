//! MCP23017 16-bit I/O expander driver.
//!
//! Register map with `IOCON.BANK = 0` (the power-on default), where each
//! A/B register pair sits at consecutive addresses. Pins 0-7 are port A,
//! pins 8-15 port B.
//!
//! Output levels are written to the OLAT latch and read back from GPIO,
//! so a read after a write reports what the line is actually doing.

use std::io;

use super::{HardwareError, RelayHardware, check_pin};

const IODIRA: u8 = 0x00;
const GPIOA: u8 = 0x12;
const OLATA: u8 = 0x14;

/// Register-level access to a device on an I2C bus.
///
/// The device address is bound when the bus handle is opened.
pub trait I2cBus: Send {
    /// Write `bytes` in a single transaction.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Write `bytes`, then read `buf.len()` bytes back.
    fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> io::Result<()>;
}

/// MCP23017 expander on a bus handle.
pub struct Mcp23017<B> {
    bus: B,
}

impl<B: I2cBus> Mcp23017<B> {
    /// Wrap an open bus handle. No registers are touched, so outputs keep
    /// whatever levels they were latched at.
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    fn read_register(&mut self, register: u8) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.bus.write_read(&[register], &mut buf)?;
        Ok(buf[0])
    }

    fn update_bit(&mut self, port_a_register: u8, pin: u8, set: bool) -> io::Result<()> {
        let (register, mask) = locate(port_a_register, pin);
        let current = self.read_register(register)?;
        let next = if set { current | mask } else { current & !mask };
        if next != current {
            self.bus.write(&[register, next])?;
        }
        Ok(())
    }
}

/// Register address and bit mask for `pin` within an A/B register pair.
fn locate(port_a_register: u8, pin: u8) -> (u8, u8) {
    if pin < 8 {
        (port_a_register, 1 << pin)
    } else {
        (port_a_register + 1, 1 << (pin - 8))
    }
}

impl<B: I2cBus> RelayHardware for Mcp23017<B> {
    fn name(&self) -> &str {
        "mcp23017"
    }

    fn configure_as_output(&mut self, pin: u8) -> Result<(), HardwareError> {
        check_pin(pin)?;
        // IODIR bit clear = output.
        self.update_bit(IODIRA, pin, false)?;
        Ok(())
    }

    fn write(&mut self, pin: u8, energized: bool) -> Result<(), HardwareError> {
        check_pin(pin)?;
        self.update_bit(OLATA, pin, energized)?;
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<bool, HardwareError> {
        check_pin(pin)?;
        let (register, mask) = locate(GPIOA, pin);
        Ok(self.read_register(register)? & mask != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Register file standing in for the chip. GPIO mirrors OLAT for
    /// output pins, as on the real device with nothing loading the lines.
    #[derive(Default)]
    struct FakeChip {
        registers: [u8; 0x16],
        writes: Vec<(u8, u8)>,
    }

    impl FakeChip {
        fn powered_on() -> Self {
            let mut chip = Self::default();
            chip.registers[IODIRA as usize] = 0xff;
            chip.registers[IODIRA as usize + 1] = 0xff;
            chip
        }

        fn sync_gpio(&mut self) {
            for port in 0..2 {
                let iodir = self.registers[IODIRA as usize + port];
                let olat = self.registers[OLATA as usize + port];
                self.registers[GPIOA as usize + port] = olat & !iodir;
            }
        }
    }

    impl I2cBus for FakeChip {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.registers[bytes[0] as usize] = bytes[1];
            self.writes.push((bytes[0], bytes[1]));
            self.sync_gpio();
            Ok(())
        }

        fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> io::Result<()> {
            buf[0] = self.registers[bytes[0] as usize];
            Ok(())
        }
    }

    struct DeadBus;

    impl I2cBus for DeadBus {
        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::other("remote I/O error"))
        }

        fn write_read(&mut self, _bytes: &[u8], _buf: &mut [u8]) -> io::Result<()> {
            Err(io::Error::other("remote I/O error"))
        }
    }

    #[test]
    fn test_locate_ports() {
        assert_eq!(locate(OLATA, 0), (0x14, 0b0000_0001));
        assert_eq!(locate(OLATA, 7), (0x14, 0b1000_0000));
        assert_eq!(locate(OLATA, 8), (0x15, 0b0000_0001));
        assert_eq!(locate(GPIOA, 11), (0x13, 0b0000_1000));
    }

    #[test]
    fn test_configure_clears_only_direction_bit() {
        let mut mcp = Mcp23017::new(FakeChip::powered_on());
        mcp.configure_as_output(10).unwrap();
        let chip = mcp.into_inner();
        assert_eq!(chip.registers[0x01], 0b1111_1011);
        assert_eq!(chip.registers[0x00], 0xff);
        // The output latch is never written during configuration.
        assert!(chip.writes.iter().all(|(reg, _)| *reg != 0x14 && *reg != 0x15));
    }

    #[test]
    fn test_write_then_read_back() {
        let mut mcp = Mcp23017::new(FakeChip::powered_on());
        mcp.configure_as_output(5).unwrap();
        mcp.configure_as_output(11).unwrap();

        mcp.write(5, true).unwrap();
        mcp.write(11, true).unwrap();
        assert!(mcp.read(5).unwrap());
        assert!(mcp.read(11).unwrap());

        mcp.write(5, false).unwrap();
        assert!(!mcp.read(5).unwrap());
        assert!(mcp.read(11).unwrap());
    }

    #[test]
    fn test_latched_levels_survive_reconfiguration() {
        let mut chip = FakeChip::powered_on();
        chip.registers[0x15] = 0b0000_0100; // pin 10 latched high
        let mut mcp = Mcp23017::new(chip);
        mcp.configure_as_output(10).unwrap();
        assert!(mcp.read(10).unwrap());
    }

    #[test]
    fn test_redundant_write_skips_bus_write() {
        let mut mcp = Mcp23017::new(FakeChip::powered_on());
        mcp.configure_as_output(2).unwrap();
        mcp.write(2, false).unwrap();
        let chip = mcp.into_inner();
        assert_eq!(chip.writes.len(), 1); // only the IODIR update
    }

    #[test]
    fn test_bus_errors_surface() {
        let mut mcp = Mcp23017::new(DeadBus);
        assert!(matches!(mcp.read(0), Err(HardwareError::Bus(_))));
        assert!(matches!(mcp.write(0, true), Err(HardwareError::Bus(_))));
    }

    #[test]
    fn test_rejects_out_of_range_pin() {
        let mut mcp = Mcp23017::new(FakeChip::powered_on());
        assert!(matches!(mcp.write(16, true), Err(HardwareError::InvalidPin(16))));
    }
}
