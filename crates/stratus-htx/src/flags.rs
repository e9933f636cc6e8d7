//! Message-level flags of an HTX message

/// HTX message flags (stored as 4 bytes in the message header)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HtxFlags(pub u32);

impl HtxFlags {
    pub const NONE: HtxFlags = HtxFlags(0);

    // Flag bits
    pub const PARSING_ERROR: u32 = 0x0000_0001;
    pub const PROCESSING_ERROR: u32 = 0x0000_0002;
    pub const EOM: u32 = 0x0000_0010;

    /// Either error bit; keeps an otherwise empty message alive on finalize
    pub const ANY_ERROR: u32 = Self::PARSING_ERROR | Self::PROCESSING_ERROR;

    #[inline]
    pub fn new(bits: u32) -> Self {
        HtxFlags(bits)
    }

    #[inline]
    pub fn is_eom(self) -> bool {
        self.0 & Self::EOM != 0
    }

    #[inline]
    pub fn is_parsing_error(self) -> bool {
        self.0 & Self::PARSING_ERROR != 0
    }

    #[inline]
    pub fn is_processing_error(self) -> bool {
        self.0 & Self::PROCESSING_ERROR != 0
    }

    #[inline]
    pub fn has_error(self) -> bool {
        self.0 & Self::ANY_ERROR != 0
    }

    #[inline]
    pub fn set_eom(&mut self, value: bool) {
        if value {
            self.0 |= Self::EOM;
        } else {
            self.0 &= !Self::EOM;
        }
    }

    #[inline]
    pub fn set_parsing_error(&mut self, value: bool) {
        if value {
            self.0 |= Self::PARSING_ERROR;
        } else {
            self.0 &= !Self::PARSING_ERROR;
        }
    }

    #[inline]
    pub fn set_processing_error(&mut self, value: bool) {
        if value {
            self.0 |= Self::PROCESSING_ERROR;
        } else {
            self.0 &= !Self::PROCESSING_ERROR;
        }
    }
}

impl From<u32> for HtxFlags {
    fn from(bits: u32) -> Self {
        HtxFlags(bits)
    }
}

impl From<HtxFlags> for u32 {
    fn from(flags: HtxFlags) -> Self {
        flags.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_operations() {
        let mut flags = HtxFlags::NONE;

        assert!(!flags.is_eom());
        flags.set_eom(true);
        assert!(flags.is_eom());
        assert!(!flags.has_error());

        flags.set_parsing_error(true);
        assert!(flags.is_parsing_error());
        assert!(flags.has_error());
        assert!(flags.is_eom());

        flags.set_eom(false);
        assert!(!flags.is_eom());
        assert!(flags.is_parsing_error());
    }

    #[test]
    fn test_flag_bits() {
        let flags = HtxFlags(HtxFlags::PROCESSING_ERROR | HtxFlags::EOM);

        assert!(flags.is_eom());
        assert!(flags.is_processing_error());
        assert!(!flags.is_parsing_error());
        assert!(flags.has_error());
        assert_eq!(u32::from(flags), 0x12);
    }
}
