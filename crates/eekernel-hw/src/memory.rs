use crate::error::MemoryError;
use bytemuck::Pod;

/// Base of main RAM in the kernel's (unmapped) view of the address space.
pub const RAM_BASE: u32 = 0x0000_0000;

pub trait Memory {
    fn read_bytes(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError>;

    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError>;

    fn read_word(&self, addr: u32) -> Result<u32, MemoryError> {
        if addr % 4 != 0 {
            return Err(MemoryError::Misaligned { addr, alignment: 4 });
        }
        let mut bytes = [0u8; 4];
        self.read_bytes(addr, &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn write_word(&mut self, addr: u32, val: u32) -> Result<(), MemoryError> {
        if addr % 4 != 0 {
            return Err(MemoryError::Misaligned { addr, alignment: 4 });
        }
        self.write_bytes(addr, &val.to_le_bytes())
    }
}

/// Reads a guest structure laid out exactly as `T`.
pub fn read_pod<T: Pod>(mem: &dyn Memory, addr: u32) -> Result<T, MemoryError> {
    let mut value = T::zeroed();
    mem.read_bytes(addr, bytemuck::bytes_of_mut(&mut value))?;
    Ok(value)
}

pub fn write_pod<T: Pod>(mem: &mut dyn Memory, addr: u32, value: &T) -> Result<(), MemoryError> {
    mem.write_bytes(addr, bytemuck::bytes_of(value))
}

/// Flat, bounds-checked guest RAM.
pub struct Ram {
    data: Vec<u8>,
}

impl Ram {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn range(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>, MemoryError> {
        let start = addr.wrapping_sub(RAM_BASE) as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(MemoryError::OutOfBounds { addr, len }),
        }
    }
}

impl Memory for Ram {
    fn read_bytes(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(addr, data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Pair {
        a: u32,
        b: u32,
    }

    #[test]
    fn words_are_little_endian() {
        let mut ram = Ram::new(64);
        ram.write_word(8, 0x1122_3344).unwrap();
        let mut bytes = [0u8; 4];
        ram.read_bytes(8, &mut bytes).unwrap();
        assert_eq!(bytes, [0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn accesses_past_the_end_fail() {
        let mut ram = Ram::new(16);
        assert_eq!(
            ram.write_word(16, 1),
            Err(MemoryError::OutOfBounds { addr: 16, len: 4 })
        );
        assert!(ram.read_word(12).is_ok());
        assert!(matches!(ram.read_word(2), Err(MemoryError::Misaligned { .. })));
    }

    #[test]
    fn pod_structures_keep_guest_layout() {
        let mut ram = Ram::new(64);
        write_pod(&mut ram, 16, &Pair { a: 1, b: 2 }).unwrap();
        assert_eq!(ram.read_word(20).unwrap(), 2);
        assert_eq!(read_pod::<Pair>(&ram, 16).unwrap(), Pair { a: 1, b: 2 });
    }
}
