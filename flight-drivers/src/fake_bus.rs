// Register-file I2C target for driver tests.
use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

pub struct FakeBus {
    pub address: u8,
    pub regs: [u8; 256],
    pub fail: bool,
    /// Called after every register write, to emulate device side effects.
    pub on_write: fn(&mut [u8; 256], u8, u8),
    pointer: u8,
}

impl FakeBus {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            regs: [0; 256],
            fail: false,
            on_write: |_, _, _| {},
            pointer: 0,
        }
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fail {
            return Err(ErrorKind::Bus);
        }
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    if let Some((&reg, data)) = bytes.split_first() {
                        self.pointer = reg;
                        for (i, &value) in data.iter().enumerate() {
                            let r = reg.wrapping_add(i as u8);
                            self.regs[r as usize] = value;
                            let hook = self.on_write;
                            hook(&mut self.regs, r, value);
                        }
                    }
                }
                Operation::Read(buf) => {
                    for (i, b) in buf.iter_mut().enumerate() {
                        *b = self.regs[self.pointer.wrapping_add(i as u8) as usize];
                    }
                }
            }
        }
        Ok(())
    }
}
