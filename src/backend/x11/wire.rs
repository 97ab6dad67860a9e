// Copyright 2023 the Druid Authors
// SPDX-License-Identifier: Apache-2.0

//! Byte order aware views over the fixed-layout buffers used by the Motif protocol.
//!
//! Motif structures declare the byte order of their multi-byte fields in their first byte.
//! Reads honour the declared order; writes always use the host order, and the writer
//! declares it.

/// The byte order of a Motif structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    /// Declared as `'l'`.
    Little,
    /// Declared as `'B'`.
    Big,
}

impl ByteOrder {
    pub const fn native() -> ByteOrder {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn from_byte(byte: u8) -> Option<ByteOrder> {
        match byte {
            b'l' => Some(ByteOrder::Little),
            b'B' => Some(ByteOrder::Big),
            _ => None,
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            ByteOrder::Little => b'l',
            ByteOrder::Big => b'B',
        }
    }
}

/// Read-only view of a byte buffer in a given byte order.
///
/// Reads past the end of the buffer return `None`.
#[derive(Clone, Copy, Debug)]
pub struct ByteView<'a> {
    bytes: &'a [u8],
    order: ByteOrder,
}

impl<'a> ByteView<'a> {
    pub fn new(bytes: &'a [u8], order: ByteOrder) -> Self {
        ByteView { bytes, order }
    }

    /// A view whose byte order is declared by its first byte.
    pub fn declared(bytes: &'a [u8]) -> Option<Self> {
        let order = ByteOrder::from_byte(*bytes.first()?)?;
        Some(ByteView::new(bytes, order))
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn u8(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }

    pub fn u16(&self, offset: usize) -> Option<u16> {
        let raw: [u8; 2] = self.bytes.get(offset..offset + 2)?.try_into().ok()?;
        Some(match self.order {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        })
    }

    pub fn i16(&self, offset: usize) -> Option<i16> {
        self.u16(offset).map(|value| value as i16)
    }

    pub fn u32(&self, offset: usize) -> Option<u32> {
        let raw: [u8; 4] = self.bytes.get(offset..offset + 4)?.try_into().ok()?;
        Some(match self.order {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        })
    }
}

/// Mutable view of a byte buffer that writes in host order.
///
/// Writes past the end of the buffer are dropped.
#[derive(Debug)]
pub struct ByteViewMut<'a> {
    bytes: &'a mut [u8],
    order: ByteOrder,
}

impl<'a> ByteViewMut<'a> {
    pub fn new(bytes: &'a mut [u8], order: ByteOrder) -> Self {
        ByteViewMut { bytes, order }
    }

    /// A view that writes in host order and declares it in the first byte.
    pub fn native(bytes: &'a mut [u8]) -> Self {
        let order = ByteOrder::native();
        if let Some(first) = bytes.first_mut() {
            *first = order.to_byte();
        }
        ByteViewMut { bytes, order }
    }

    /// A view that writes in the order the buffer already declares.
    ///
    /// Used to patch single fields of a structure another client wrote.
    pub fn declared(bytes: &'a mut [u8]) -> Option<Self> {
        let order = ByteOrder::from_byte(*bytes.first()?)?;
        Some(ByteViewMut { bytes, order })
    }

    pub fn set_u8(&mut self, offset: usize, value: u8) {
        if let Some(byte) = self.bytes.get_mut(offset) {
            *byte = value;
        }
    }

    pub fn set_u16(&mut self, offset: usize, value: u16) {
        let raw = match self.order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        if let Some(dst) = self.bytes.get_mut(offset..offset + 2) {
            dst.copy_from_slice(&raw);
        }
    }

    pub fn set_u32(&mut self, offset: usize, value: u32) {
        let raw = match self.order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        if let Some(dst) = self.bytes.get_mut(offset..offset + 4) {
            dst.copy_from_slice(&raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn declared_order_is_honoured() {
        let little = [b'l', 0, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let big = [b'B', 0, 0x12, 0x34, 0x12, 0x34, 0x56, 0x78];
        for bytes in [&little[..], &big[..]] {
            let view = ByteView::declared(bytes).unwrap();
            assert_eq!(view.u16(2), Some(0x1234));
            assert_eq!(view.u32(4), Some(0x1234_5678));
            assert_eq!(view.u32(6), None);
        }
        assert!(ByteView::declared(&[b'?', 0]).is_none());
    }

    #[test]
    fn host_order_writes_read_back_identically() {
        let mut buf = [0u8; 8];
        let mut writer = ByteViewMut::native(&mut buf);
        writer.set_u16(2, 0xBEEF);
        writer.set_u32(4, 0xDEAD_BEEF);
        writer.set_u32(6, 1);

        let reader = ByteView::declared(&buf).unwrap();
        assert_eq!(reader.order(), ByteOrder::native());
        assert_eq!(reader.u16(2), Some(0xBEEF));
        assert_eq!(reader.u32(4), Some(0xDEAD_BEEF));
    }

    #[test]
    fn foreign_order_is_swapped_and_patched_in_place() {
        let foreign = match ByteOrder::native() {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        };
        let mut buf = [foreign.to_byte(), 0, 0, 0, 0, 0, 0, 0];
        {
            let mut writer = ByteViewMut::declared(&mut buf).unwrap();
            writer.set_u32(4, 0x0102_0304);
        }
        assert_eq!(ByteView::declared(&buf).unwrap().u32(4), Some(0x0102_0304));
        let raw = if foreign == ByteOrder::Big {
            [1, 2, 3, 4]
        } else {
            [4, 3, 2, 1]
        };
        assert_eq!(buf[4..8], raw);
    }
}
